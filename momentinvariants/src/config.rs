//! Options recognised by the moment computation and the invariant pipeline.
//!
//! [`MomentsConfig`] deserializes from a configuration file (missing fields
//! take their defaults) and is validated before every request.

use crate::error::{MomentsError, Result};
use serde::{Deserialize, Serialize};

/// Highest supported moment order.
pub const MAX_ORDER: usize = 5;

/// Integration radii, either in world units or relative to the smallest spatial
/// extent of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Radii {
    Absolute(Vec<f64>),
    Relative(Vec<f64>),
}

impl Default for Radii {
    fn default() -> Self {
        Radii::Relative(vec![0.1])
    }
}

impl Radii {
    /// Radii in world units for a grid whose smallest extent is `min_extent`.
    pub fn resolve(&self, min_extent: f64) -> Vec<f64> {
        match self {
            Radii::Absolute(radii) => radii.clone(),
            Radii::Relative(radii) => radii.iter().map(|r| r * min_extent).collect(),
        }
    }

    fn values(&self) -> &[f64] {
        match self {
            Radii::Absolute(radii) | Radii::Relative(radii) => radii,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentsConfig {
    /// Maximum moment order, `0..=5`.
    pub order: usize,
    /// Lattice nodes per axis of the integration stencil; 0 integrates exactly
    /// over the grid's own points.
    pub number_of_integration_steps: usize,
    pub radii: Radii,
    /// Attribute to integrate; the first point array when absent.
    pub name_of_point_data: Option<String>,
    pub is_translation: bool,
    pub is_scaling: bool,
    pub is_rotation: bool,
    pub is_reflection: bool,
    /// Number of samples per full turn of the exhaustive orientation search.
    pub angle_resolution: usize,
    /// Norm below which a contraction is considered zero.
    pub eps: f64,
    /// Radius at which the pattern is integrated; half its smallest extent when absent.
    pub pattern_radius: Option<f64>,
}

impl Default for MomentsConfig {
    fn default() -> Self {
        MomentsConfig {
            order: 2,
            number_of_integration_steps: 0,
            radii: Radii::default(),
            name_of_point_data: None,
            is_translation: true,
            is_scaling: true,
            is_rotation: true,
            is_reflection: false,
            angle_resolution: 10,
            eps: 1e-3,
            pattern_radius: None,
        }
    }
}

impl MomentsConfig {
    /// Checks every option; the first violation is returned.
    ///
    /// # Examples
    /// ```
    /// use momentinvariants::config::MomentsConfig;
    /// let mut config = MomentsConfig::default();
    /// assert!(config.validate().is_ok());
    /// config.order = 6;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.order > MAX_ORDER {
            return Err(MomentsError::InvalidOrder(self.order));
        }
        if self.number_of_integration_steps == 1 {
            return Err(MomentsError::InvalidConfig(
                "number_of_integration_steps must be 0 or at least 2".into(),
            ));
        }
        if self.radii.values().is_empty() {
            return Err(MomentsError::InvalidConfig("at least one radius is required".into()));
        }
        if let Some(&bad) = self.radii.values().iter().find(|r| !(**r > 0.0) || !r.is_finite()) {
            return Err(MomentsError::InvalidRadius(bad));
        }
        if let Some(radius) = self.pattern_radius {
            if !(radius > 0.0) || !radius.is_finite() {
                return Err(MomentsError::InvalidRadius(radius));
            }
        }
        if self.angle_resolution == 0 {
            return Err(MomentsError::InvalidConfig("angle_resolution must be positive".into()));
        }
        if !(self.eps > 0.0) {
            return Err(MomentsError::InvalidConfig(format!("eps {} must be positive", self.eps)));
        }
        Ok(())
    }
}
