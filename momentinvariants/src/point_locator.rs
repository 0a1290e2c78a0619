use crate::uniform_grid::{UniformGrid, EDGE_TOLERANCE};
use kd_tree::{KdPoint, KdTree};

/// A grid point with its id, as stored in the locator's kd-tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedPoint {
    pub id: usize,
    pub coordinates: [f64; 3],
}

impl KdPoint for LocatedPoint {
    type Scalar = f64;
    type Dim = typenum::U3;
    fn at(&self, k: usize) -> f64 {
        self.coordinates[k]
    }
}

/// Finds the grid points inside a ball, used for integration over the native
/// grid resolution.
///
/// Backed by a [KdTree] over all grid points. 2D grids have every z coordinate
/// equal, so the three-dimensional search covers both cases.
pub struct PointLocator {
    tree: KdTree<LocatedPoint>,
}

impl PointLocator {
    pub fn new(grid: &UniformGrid) -> Self {
        let points = (0..grid.number_of_points())
            .map(|id| LocatedPoint {
                id,
                coordinates: grid.point(id),
            })
            .collect();
        PointLocator {
            tree: KdTree::build_by_ordered_float(points),
        }
    }

    /// Ids of all points within `radius` of `center`, in ascending id order.
    pub fn find_points_within_radius(&self, center: &[f64; 3], radius: f64) -> Vec<usize> {
        let query = LocatedPoint {
            id: usize::MAX,
            coordinates: *center,
        };
        let radius2 = radius * radius + EDGE_TOLERANCE;
        // the tree compares squared distances; filter again with the tolerance
        let mut ids: Vec<usize> = self
            .tree
            .within_radius(&query, radius + EDGE_TOLERANCE)
            .into_iter()
            .filter(|p| squared_distance(&p.coordinates, center) <= radius2)
            .map(|p| p.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|k| (a[k] - b[k]).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_disk_on_unit_grid() {
        let grid = UniformGrid::new([5, 5, 1], [0.0; 3], [1.0; 3]).unwrap();
        let locator = PointLocator::new(&grid);
        let ids = locator.find_points_within_radius(&[2.0, 2.0, 0.0], 1.0);
        assert_eq!(ids, vec![7, 11, 12, 13, 17]);
    }

    #[test]
    fn matches_brute_force_in_3d() {
        let grid = UniformGrid::new([4, 5, 3], [0.5, -1.0, 2.0], [0.5, 0.25, 1.0]).unwrap();
        let locator = PointLocator::new(&grid);
        let center = [1.2, -0.4, 3.0];
        let radius = 0.8;
        let expected: Vec<usize> = (0..grid.number_of_points())
            .filter(|&id| squared_distance(&grid.point(id), &center) <= radius * radius + EDGE_TOLERANCE)
            .collect();
        assert_eq!(locator.find_points_within_radius(&center, radius), expected);
    }
}
