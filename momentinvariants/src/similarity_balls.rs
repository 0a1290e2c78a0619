//! Local maxima of similarity fields, and the balls they stand for.

use crate::error::{MomentsError, Result};
use crate::moment_array_name::similarity_array_name;
use crate::point_locator::PointLocator;
use crate::uniform_grid::{PointArray, UniformGrid};
use log::debug;

pub const LOCAL_MAX_SIMILARITY_NAME: &str = "localMaxSimilarity";
pub const BALLS_NAME: &str = "balls";

#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityBalls {
    /// Highest similarity over all radii at points that are a local maximum
    /// for some radius, 0 elsewhere.
    pub local_max_similarity: PointArray,
    /// Every point within the radius of a local maximum carries that
    /// maximum's similarity; overlapping balls keep the larger value.
    pub balls: PointArray,
}

/// `true` when `value` is positive and not smaller than any of the up to
/// `3^d - 1` grid neighbours of `point_id`.
fn is_local_maximum(grid: &UniformGrid, values: &[f64], point_id: usize) -> bool {
    let value = values[point_id];
    if !(value > 0.0) {
        return false;
    }
    let dims = grid.dimensions();
    let ijk = grid.point_ijk(point_id);
    let reach = |a: usize| if a < grid.dimension() { 1i64 } else { 0 };
    for dk in -reach(2)..=reach(2) {
        for dj in -reach(1)..=reach(1) {
            for di in -reach(0)..=reach(0) {
                if (di, dj, dk) == (0, 0, 0) {
                    continue;
                }
                let neighbour = [
                    ijk[0] as i64 + di,
                    ijk[1] as i64 + dj,
                    ijk[2] as i64 + dk,
                ];
                if (0..3).any(|a| neighbour[a] < 0 || neighbour[a] >= dims[a] as i64) {
                    continue;
                }
                let id = grid.point_id(neighbour.map(|n| n as usize));
                if values[id] > value {
                    return false;
                }
            }
        }
    }
    true
}

/// Finds the local maxima of the similarity arrays (one per radius, named by
/// the printed radius, in the order of `radii`).
pub fn similarity_balls(grid: &UniformGrid, radii: &[f64], similarities: &[PointArray]) -> Result<SimilarityBalls> {
    if radii.len() != similarities.len() {
        return Err(MomentsError::Mismatch(format!(
            "{} radii but {} similarity arrays",
            radii.len(),
            similarities.len()
        )));
    }
    let n = grid.number_of_points();
    for (radius, array) in radii.iter().zip(similarities) {
        if array.name != similarity_array_name(*radius) || array.values.len() != n || array.components != 1 {
            return Err(MomentsError::Mismatch(format!(
                "array {} is not the similarity for radius {radius} on {n} points",
                array.name
            )));
        }
    }

    let locator = PointLocator::new(grid);
    let mut local_max = vec![0.0; n];
    let mut balls = vec![0.0; n];
    for (&radius, array) in radii.iter().zip(similarities) {
        let mut count = 0usize;
        for point_id in 0..n {
            if !is_local_maximum(grid, &array.values, point_id) {
                continue;
            }
            count += 1;
            let value = array.values[point_id];
            local_max[point_id] = f64::max(local_max[point_id], value);
            for id in locator.find_points_within_radius(&grid.point(point_id), radius) {
                balls[id] = f64::max(balls[id], value);
            }
        }
        debug!("{count} local similarity maxima for radius {}", array.name);
    }

    Ok(SimilarityBalls {
        local_max_similarity: PointArray::scalars(LOCAL_MAX_SIMILARITY_NAME, local_max),
        balls: PointArray::scalars(BALLS_NAME, balls),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_peak_becomes_a_ball() {
        let grid = UniformGrid::new([7, 7, 1], [0.0; 3], [1.0; 3]).unwrap();
        let mut values = vec![0.0; 49];
        values[grid.point_id([3, 3, 0])] = 5.0;
        values[grid.point_id([3, 4, 0])] = 2.0;
        let similarity = PointArray::scalars("1.500000", values);
        let result = similarity_balls(&grid, &[1.5], &[similarity]).unwrap();

        let maxima: Vec<usize> = (0..49)
            .filter(|&id| result.local_max_similarity.values[id] > 0.0)
            .collect();
        assert_eq!(maxima, vec![grid.point_id([3, 3, 0])]);
        // 3x3 block around the peak lies within 1.5
        let in_ball = result.balls.values.iter().filter(|&&v| v == 5.0).count();
        assert_eq!(in_ball, 9);
        assert_eq!(result.balls.name, BALLS_NAME);
    }

    #[test]
    fn misnamed_arrays_are_rejected() {
        let grid = UniformGrid::new([3, 3, 1], [0.0; 3], [1.0; 3]).unwrap();
        let similarity = PointArray::scalars("radius", vec![0.0; 9]);
        assert!(similarity_balls(&grid, &[1.0], &[similarity]).is_err());
    }
}
