use crate::error::{MomentsError, Result};

/// Tolerance, in grid index units, for locating a point inside the grid.
const LOCATE_TOLERANCE: f64 = 1e-5;

/// Tolerance for deciding whether a support ball leaves a box.
pub const EDGE_TOLERANCE: f64 = 1e-10;

/// A named attribute with `components` values per grid point, stored point by point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointArray {
    pub name: String,
    pub components: usize,
    pub values: Vec<f64>,
}

impl PointArray {
    pub fn new(name: impl Into<String>, components: usize, values: Vec<f64>) -> Self {
        PointArray {
            name: name.into(),
            components,
            values,
        }
    }

    /// A single-component array.
    pub fn scalars(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, 1, values)
    }

    pub fn number_of_tuples(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.values.len() / self.components
        }
    }

    pub fn tuple(&self, point_id: usize) -> &[f64] {
        &self.values[point_id * self.components..(point_id + 1) * self.components]
    }
}

/// Axis-aligned bounds; unused axes of a 2D grid are flat (`min == max`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    /// Smallest box containing both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut result = *self;
        for a in 0..3 {
            result.min[a] = result.min[a].min(other.min[a]);
            result.max[a] = result.max[a].max(other.max[a]);
        }
        result
    }

    /// `true` when the ball of `radius` around `center` is not contained in the
    /// box along the first `dimension` axes.
    pub fn ball_crosses(&self, center: &[f64; 3], radius: f64, dimension: usize) -> bool {
        (0..dimension).any(|a| {
            center[a] - radius < self.min[a] - EDGE_TOLERANCE
                || center[a] + radius > self.max[a] + EDGE_TOLERANCE
        })
    }

    /// `true` when the ball of `radius` around `center` reaches into the box.
    pub fn intersects_ball(&self, center: &[f64; 3], radius: f64, dimension: usize) -> bool {
        let squared: f64 = (0..dimension)
            .map(|a| {
                let nearest = center[a].clamp(self.min[a], self.max[a]);
                (center[a] - nearest).powi(2)
            })
            .sum();
        squared <= radius * radius + EDGE_TOLERANCE
    }
}

/// A structured field on a uniform grid of `dimensions[0] × dimensions[1] ×
/// dimensions[2]` points. Point ids run fastest along x, then y, then z. A grid
/// with a single layer along z is two-dimensional.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformGrid {
    dimensions: [usize; 3],
    origin: [f64; 3],
    spacing: [f64; 3],
    point_data: Vec<PointArray>,
}

impl UniformGrid {
    /// Creates a grid without attributes.
    ///
    /// # Examples
    /// ```
    /// use momentinvariants::uniform_grid::UniformGrid;
    /// let grid = UniformGrid::new([5, 5, 1], [0.0; 3], [1.0; 3]).unwrap();
    /// assert_eq!(grid.dimension(), 2);
    /// assert_eq!(grid.number_of_points(), 25);
    /// assert_eq!(grid.min_extent(), 4.0);
    /// ```
    pub fn new(dimensions: [usize; 3], origin: [f64; 3], spacing: [f64; 3]) -> Result<Self> {
        if dimensions[0] < 2 || dimensions[1] < 2 || dimensions[2] < 1 {
            return Err(MomentsError::InvalidGrid(format!(
                "dimensions {dimensions:?} need at least two points along x and y"
            )));
        }
        if spacing.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(MomentsError::InvalidGrid(format!("spacing {spacing:?} must be positive")));
        }
        Ok(UniformGrid {
            dimensions,
            origin,
            spacing,
            point_data: Vec::new(),
        })
    }

    /// Attaches an attribute; its length must match the number of points.
    pub fn add_point_array(&mut self, array: PointArray) -> Result<()> {
        if array.components == 0 || array.values.len() != array.components * self.number_of_points() {
            return Err(MomentsError::InvalidGrid(format!(
                "array {} holds {} values, expected {} components for each of {} points",
                array.name,
                array.values.len(),
                array.components,
                self.number_of_points()
            )));
        }
        self.point_data.retain(|a| a.name != array.name);
        self.point_data.push(array);
        Ok(())
    }

    /// Builder form of [`UniformGrid::add_point_array`].
    pub fn with_point_array(mut self, array: PointArray) -> Result<Self> {
        self.add_point_array(array)?;
        Ok(self)
    }

    pub fn point_data(&self) -> &[PointArray] {
        &self.point_data
    }

    pub fn point_array(&self, name: &str) -> Option<&PointArray> {
        self.point_data.iter().find(|a| a.name == name)
    }

    /// The named attribute, or the first one when no name is given.
    pub fn select_point_data(&self, name: Option<&str>) -> Result<&PointArray> {
        match name {
            Some(name) => self
                .point_array(name)
                .ok_or_else(|| MomentsError::MissingPointData(name.to_string())),
            None => self
                .point_data
                .first()
                .ok_or_else(|| MomentsError::MissingPointData("grid has no point data".to_string())),
        }
    }

    pub fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 2 for a single z layer, 3 otherwise.
    pub fn dimension(&self) -> usize {
        if self.dimensions[2] == 1 {
            2
        } else {
            3
        }
    }

    pub fn number_of_points(&self) -> usize {
        self.dimensions.iter().product()
    }

    pub fn point_id(&self, ijk: [usize; 3]) -> usize {
        ijk[0] + self.dimensions[0] * (ijk[1] + self.dimensions[1] * ijk[2])
    }

    pub fn point_ijk(&self, point_id: usize) -> [usize; 3] {
        let i = point_id % self.dimensions[0];
        let j = (point_id / self.dimensions[0]) % self.dimensions[1];
        let k = point_id / (self.dimensions[0] * self.dimensions[1]);
        [i, j, k]
    }

    pub fn point(&self, point_id: usize) -> [f64; 3] {
        let ijk = self.point_ijk(point_id);
        [0, 1, 2].map(|a| self.origin[a] + ijk[a] as f64 * self.spacing[a])
    }

    pub fn bounds(&self) -> Bounds {
        let max = [0, 1, 2].map(|a| self.origin[a] + (self.dimensions[a] - 1) as f64 * self.spacing[a]);
        Bounds {
            min: self.origin,
            max,
        }
    }

    pub fn center(&self) -> [f64; 3] {
        let bounds = self.bounds();
        [0, 1, 2].map(|a| 0.5 * (bounds.min[a] + bounds.max[a]))
    }

    /// Smallest spatial extent over the grid's axes.
    pub fn min_extent(&self) -> f64 {
        (0..self.dimension())
            .map(|a| (self.dimensions[a] - 1) as f64 * self.spacing[a])
            .fold(f64::INFINITY, f64::min)
    }

    /// Volume (area in 2D) represented by one grid point.
    pub fn cell_volume(&self) -> f64 {
        self.spacing[..self.dimension()].iter().product()
    }

    /// `true` when the support ball of a point leaves the grid.
    pub fn is_close_to_edge(&self, center: &[f64; 3], radius: f64) -> bool {
        self.bounds().ball_crosses(center, radius, self.dimension())
    }

    /// Locates the cell containing `point` and interpolates every component of
    /// `array` (bi-/trilinear). Returns `None` when the point lies outside.
    pub fn interpolate(&self, array: &PointArray, point: &[f64; 3]) -> Option<Vec<f64>> {
        let dimension = self.dimension();
        let mut base = [0usize; 3];
        let mut fraction = [0.0f64; 3];
        for a in 0..dimension {
            let t = (point[a] - self.origin[a]) / self.spacing[a];
            let last = (self.dimensions[a] - 1) as f64;
            if t < -LOCATE_TOLERANCE || t > last + LOCATE_TOLERANCE {
                return None;
            }
            let t = t.clamp(0.0, last);
            let cell = (t.floor() as usize).min(self.dimensions[a] - 2);
            base[a] = cell;
            fraction[a] = t - cell as f64;
        }

        let mut result = vec![0.0; array.components];
        for corner in 0..(1usize << dimension) {
            let mut weight = 1.0;
            let mut ijk = base;
            for a in 0..dimension {
                if corner & (1 << a) != 0 {
                    ijk[a] += 1;
                    weight *= fraction[a];
                } else {
                    weight *= 1.0 - fraction[a];
                }
            }
            if weight == 0.0 {
                continue;
            }
            let tuple = array.tuple(self.point_id(ijk));
            for (value, &v) in result.iter_mut().zip(tuple) {
                *value += weight * v;
            }
        }
        Some(result)
    }

    /// Extracts the points with index ranges `min..=max` per axis, with their attributes.
    pub fn sub_grid(&self, min: [usize; 3], max: [usize; 3]) -> Result<UniformGrid> {
        if (0..3).any(|a| min[a] > max[a] || max[a] >= self.dimensions[a]) {
            return Err(MomentsError::InvalidGrid(format!(
                "sub-grid {min:?}..={max:?} outside {:?}",
                self.dimensions
            )));
        }
        let dimensions = [0, 1, 2].map(|a| max[a] - min[a] + 1);
        let origin = [0, 1, 2].map(|a| self.origin[a] + min[a] as f64 * self.spacing[a]);
        let mut grid = UniformGrid::new(dimensions, origin, self.spacing)?;
        for array in &self.point_data {
            let mut values = Vec::with_capacity(grid.number_of_points() * array.components);
            for k in min[2]..=max[2] {
                for j in min[1]..=max[1] {
                    for i in min[0]..=max[0] {
                        values.extend_from_slice(array.tuple(self.point_id([i, j, k])));
                    }
                }
            }
            grid.add_point_array(PointArray::new(array.name.clone(), array.components, values))?;
        }
        Ok(grid)
    }
}

/// Field rank (0 scalar, 1 vector, 2 matrix) implied by a component count.
///
/// 2D grids accept 1, 2 or 3 (z ignored) and 4 components; 3D grids accept 1,
/// 3, 6 (symmetric XX, YY, ZZ, XY, YZ, XZ) and 9 components.
pub fn field_rank_for(components: usize, dimension: usize) -> Result<usize> {
    match (dimension, components) {
        (_, 1) => Ok(0),
        (2, 2) | (2, 3) | (3, 3) => Ok(1),
        (2, 4) | (3, 6) | (3, 9) => Ok(2),
        _ => Err(MomentsError::UnsupportedComponentCount {
            components,
            dimension,
        }),
    }
}

/// Component of a tuple addressed by the field indices of a tensor component.
pub fn field_component(tuple: &[f64], dimension: usize, field_indices: &[usize]) -> f64 {
    const SYMMETRIC: [[usize; 3]; 3] = [[0, 3, 5], [3, 1, 4], [5, 4, 2]];
    match field_indices {
        [] => tuple[0],
        [i] => tuple[*i],
        [i, j] if tuple.len() == 6 => tuple[SYMMETRIC[*i][*j]],
        [i, j] => tuple[i + dimension * j],
        _ => 0.0,
    }
}

/// A grid together with the attribute being integrated and its interpretation.
#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    pub grid: &'a UniformGrid,
    pub array: &'a PointArray,
    pub dimension: usize,
    pub field_rank: usize,
}

impl<'a> FieldView<'a> {
    /// Selects the attribute `name` (or the first one) and derives its field rank.
    pub fn new(grid: &'a UniformGrid, name: Option<&str>) -> Result<Self> {
        let array = grid.select_point_data(name)?;
        let dimension = grid.dimension();
        let field_rank = field_rank_for(array.components, dimension)?;
        Ok(FieldView {
            grid,
            array,
            dimension,
            field_rank,
        })
    }
}
