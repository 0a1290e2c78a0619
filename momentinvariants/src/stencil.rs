use crate::error::{MomentsError, Result};
use crate::uniform_grid::FieldView;

/// A uniform sampling lattice of `steps^dimension` nodes spanning
/// `[-radius, radius]` on every axis, centered at the origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
    dimension: usize,
    radius: f64,
    steps: usize,
    spacing: f64,
    offsets: Vec<[f64; 3]>,
}

/// A stencil translated to a query point with the field resampled on every node.
#[derive(Debug, Clone, PartialEq)]
pub struct CenteredStencil<'s> {
    pub stencil: &'s Stencil,
    pub center: [f64; 3],
    /// One tuple of field components per lattice node.
    pub values: Vec<Vec<f64>>,
}

impl Stencil {
    /// Builds the lattice; `steps` must be at least 2.
    ///
    /// # Examples
    /// ```
    /// use momentinvariants::stencil::Stencil;
    /// let stencil = Stencil::build(2, 1.0, 5).unwrap();
    /// assert_eq!(stencil.offsets().len(), 25);
    /// assert_eq!(stencil.spacing(), 0.5);
    /// ```
    pub fn build(dimension: usize, radius: f64, steps: usize) -> Result<Self> {
        if steps < 2 {
            return Err(MomentsError::InvalidConfig(format!(
                "a stencil needs at least 2 integration steps per axis, got {steps}"
            )));
        }
        if !(radius > 0.0) || !radius.is_finite() {
            return Err(MomentsError::InvalidRadius(radius));
        }
        let spacing = 2.0 * radius / (steps - 1) as f64;
        let layers = if dimension == 3 { steps } else { 1 };
        let mut offsets = Vec::with_capacity(steps * steps * layers);
        for k in 0..layers {
            for j in 0..steps {
                for i in 0..steps {
                    let z = if dimension == 3 { -radius + k as f64 * spacing } else { 0.0 };
                    offsets.push([-radius + i as f64 * spacing, -radius + j as f64 * spacing, z]);
                }
            }
        }
        Ok(Stencil {
            dimension,
            radius,
            steps,
            spacing,
            offsets,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn offsets(&self) -> &[[f64; 3]] {
        &self.offsets
    }

    /// Volume (area in 2D) represented by one lattice node.
    pub fn cell_volume(&self) -> f64 {
        self.spacing.powi(self.dimension as i32)
    }

    /// Translates the lattice to `center` and interpolates the field onto every
    /// node. Returns `None` as soon as a node falls outside the field's grid.
    pub fn center(&self, field: &FieldView, center: &[f64; 3]) -> Option<CenteredStencil<'_>> {
        let mut values = Vec::with_capacity(self.offsets.len());
        for offset in &self.offsets {
            let node = [0, 1, 2].map(|a| center[a] + offset[a]);
            values.push(field.grid.interpolate(field.array, &node)?);
        }
        Some(CenteredStencil {
            stencil: self,
            center: *center,
            values,
        })
    }
}
