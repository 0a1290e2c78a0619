use crate::config::MomentsConfig;
use crate::error::{MomentsError, Result};
use crate::moment_array_name::{format_radius, similarity_array_name};
use crate::moment_integrator::{MomentField, MomentIntegrator};
use crate::moment_normalizer::{MomentNormalizer, StandardPositions};
use crate::moment_set::MomentSet;
use crate::point_locator::PointLocator;
use crate::stencil::Stencil;
use crate::translation_factor::TranslationFactorTable;
use crate::uniform_grid::{FieldView, PointArray, UniformGrid};
use log::{debug, info};

/// Output of a detection run.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Normalized pattern, every orientation it is compared in.
    pub pattern: StandardPositions,
    /// Normalized moments of every field point, per radius.
    pub normalized_field: MomentField,
    /// One similarity array per radius, named by the printed radius.
    pub similarities: Vec<PointArray>,
}

impl DetectionResult {
    pub fn similarity(&self, radius_index: usize) -> Option<&PointArray> {
        self.similarities.get(radius_index)
    }
}

/// Compares the moments of a pattern with the moments at every point of a
/// field, after both have been normalized the same way.
///
/// # Example
/// ```
/// use momentinvariants::config::{MomentsConfig, Radii};
/// use momentinvariants::pattern_detector::PatternDetector;
/// use momentinvariants::uniform_grid::{PointArray, UniformGrid};
///
/// let field = UniformGrid::new([9, 9, 1], [0.0; 3], [1.0; 3])
///     .unwrap()
///     .with_point_array(PointArray::scalars("f", (0..81).map(|i| (i % 9) as f64).collect()))
///     .unwrap();
/// let pattern = field.sub_grid([2, 2, 0], [6, 6, 0]).unwrap();
/// let config = MomentsConfig {
///     radii: Radii::Absolute(vec![2.0]),
///     ..MomentsConfig::default()
/// };
/// let result = PatternDetector::new(config).detect(&pattern, &field).unwrap();
/// assert_eq!(result.similarities[0].name, "2.000000");
/// ```
#[derive(Debug, Clone)]
pub struct PatternDetector {
    config: MomentsConfig,
    normalizer: MomentNormalizer,
}

impl PatternDetector {
    pub fn new(config: MomentsConfig) -> Self {
        let normalizer = MomentNormalizer::new(&config);
        PatternDetector { config, normalizer }
    }

    pub fn config(&self) -> &MomentsConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &MomentNormalizer {
        &self.normalizer
    }

    /// Moments of the pattern around its center, with the translation factors
    /// matching the quadrature that produced them.
    pub fn pattern_moments(&self, pattern_grid: &UniformGrid) -> Result<(MomentSet, f64, TranslationFactorTable)> {
        let field = FieldView::new(pattern_grid, self.config.name_of_point_data.as_deref())?;
        let integrator = MomentIntegrator::for_field(&field, &self.config);
        let radius = self
            .config
            .pattern_radius
            .unwrap_or(0.5 * pattern_grid.min_extent());
        if !(radius > 0.0) {
            return Err(MomentsError::InvalidRadius(radius));
        }
        let center = pattern_grid.center();
        let locator = PointLocator::new(pattern_grid);
        let stencil = if integrator.uses_native_grid() {
            None
        } else {
            Some(Stencil::build(field.dimension, radius, integrator.number_of_integration_steps())?)
        };
        let moments = integrator
            .moments_at(&field, &locator, stencil.as_ref(), &center, radius)?
            .ok_or_else(|| {
                MomentsError::InvalidConfig(format!(
                    "pattern radius {} exceeds the pattern grid",
                    format_radius(radius)
                ))
            })?;
        let quadrature = integrator.quadrature_at(&field, &locator, &center, radius)?;
        let table = TranslationFactorTable::sampled(field.dimension, self.config.order, &[quadrature]);
        Ok((moments, radius, table))
    }

    /// Computes the moments of pattern and field and the similarity of every
    /// field point to the pattern, per radius.
    pub fn detect(&self, pattern_grid: &UniformGrid, field_grid: &UniformGrid) -> Result<DetectionResult> {
        self.config.validate()?;
        if pattern_grid.dimension() != field_grid.dimension() {
            return Err(MomentsError::Mismatch(format!(
                "pattern is {}D, field is {}D",
                pattern_grid.dimension(),
                field_grid.dimension()
            )));
        }
        let (pattern, pattern_radius, pattern_table) = self.pattern_moments(pattern_grid)?;
        let field = MomentIntegrator::compute(field_grid, &self.config)?;
        let field_view = FieldView::new(field_grid, self.config.name_of_point_data.as_deref())?;
        let integrator = MomentIntegrator::for_field(&field_view, &self.config);
        let field_table = integrator.translation_factor_table(field_grid, field.radii())?;
        self.detect_with_tables(&pattern, pattern_radius, &pattern_table, &field, &field_table)
    }

    /// Similarity of precomputed pattern moments to a precomputed moment field,
    /// for instance one rebuilt with [`MomentField::from_named_arrays`]. The
    /// quadrature behind those moments is unknown, so translation factors
    /// are the analytic ball integrals.
    pub fn detect_with_moments(
        &self,
        pattern: &MomentSet,
        pattern_radius: f64,
        field: &MomentField,
    ) -> Result<DetectionResult> {
        self.config.validate()?;
        let dimension = pattern.dimension();
        let pattern_table = TranslationFactorTable::analytic(dimension, pattern.order(), &[pattern_radius])?;
        let field_table = TranslationFactorTable::analytic(dimension, field.basis().order(), field.radii())?;
        self.detect_with_tables(pattern, pattern_radius, &pattern_table, field, &field_table)
    }

    fn detect_with_tables(
        &self,
        pattern: &MomentSet,
        pattern_radius: f64,
        pattern_table: &TranslationFactorTable,
        field: &MomentField,
        field_table: &TranslationFactorTable,
    ) -> Result<DetectionResult> {
        let basis = field.basis();
        if pattern.dimension() != basis.dimension()
            || pattern.field_rank() != basis.field_rank()
            || pattern.order() != basis.order()
        {
            return Err(MomentsError::Mismatch(format!(
                "pattern has dimension {}, field rank {}, order {}; field has dimension {}, field rank {}, order {}",
                pattern.dimension(),
                pattern.field_rank(),
                pattern.order(),
                basis.dimension(),
                basis.field_rank(),
                basis.order()
            )));
        }

        let standard = self
            .normalizer
            .normalize_pattern(pattern, pattern_table, 0, pattern_radius)?;
        info!("pattern normalized into {} standard positions", standard.positions.len());

        let mut normalized_field = MomentField::zeros(basis, field.radii().to_vec(), field.number_of_points());
        let mut similarities = Vec::with_capacity(field.radii().len());
        for (radius_index, &radius) in field.radii().iter().enumerate() {
            let mut values = vec![0.0; field.number_of_points()];
            let mut unsupported = 0usize;
            for (point_id, value) in values.iter_mut().enumerate() {
                let moments = field.moment_set(radius_index, point_id)?;
                if moments.norm() == 0.0 {
                    unsupported += 1;
                    continue;
                }
                let normalized =
                    self.normalizer
                        .normalize_field_point(&moments, field_table, radius_index, radius, &standard)?;
                *value = self.normalizer.similarity(&normalized, &standard)?;
                normalized_field.set_point_vector(radius_index, point_id, &normalized.to_basis_vector());
            }
            debug!(
                "radius {}: {unsupported} points without moments left at similarity 0",
                format_radius(radius)
            );
            similarities.push(PointArray::scalars(similarity_array_name(radius), values));
        }

        Ok(DetectionResult {
            pattern: standard,
            normalized_field,
            similarities,
        })
    }
}
