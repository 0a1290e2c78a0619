//! The invariant pipeline: translation, scale and rotation/reflection
//! normalization of moment sets.

use crate::config::MomentsConfig;
use crate::dominant_contraction::{calculate_dominant_contractions, reproduce_contractions, DominantContraction};
use crate::error::{MomentsError, Result};
use crate::moment_set::MomentSet;
use crate::rotation::{align_2d, align_3d, align_to_x, sample_rolls, sample_rotations_2d, sample_rotations_3d};
use crate::tensor::flat_index;
use crate::translation_factor::TranslationFactorTable;
use log::{debug, warn};
use nalgebra::DMatrix;

/// Norm at or below which scale normalization leaves the moments unchanged.
pub const MIN_SCALE_NORM: f64 = 1e-10;

const PERFECT_MATCH_DISTANCE: f64 = 1e-12;

/// How a field point has to be rotated before it is compared with the
/// standard positions of the pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRotation {
    Identity,
    Dominant(DominantContraction),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandardPositions {
    pub positions: Vec<MomentSet>,
    pub field_rotation: FieldRotation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MomentNormalizer {
    pub is_translation: bool,
    pub is_scaling: bool,
    pub is_rotation: bool,
    pub is_reflection: bool,
    pub angle_resolution: usize,
    pub eps: f64,
}

impl MomentNormalizer {
    pub fn new(config: &MomentsConfig) -> Self {
        MomentNormalizer {
            is_translation: config.is_translation,
            is_scaling: config.is_scaling,
            is_rotation: config.is_rotation,
            is_reflection: config.is_reflection,
            angle_resolution: config.angle_resolution,
            eps: config.eps,
        }
    }

    /// Removes the contribution a constant field with the same zeroth moment
    /// would have: `m_c -= m0[field indices of c] · TF(orders of c) / TF(0, 0, 0)`.
    pub fn normalize_t(
        &self,
        moments: &MomentSet,
        table: &TranslationFactorTable,
        radius_index: usize,
    ) -> Result<MomentSet> {
        if !self.is_translation {
            return Ok(moments.clone());
        }
        let volume = table.get(radius_index, [0, 0, 0])?;
        if volume == 0.0 {
            return Ok(moments.clone());
        }
        let zeroth = moments.tensor(0).clone();
        let mut result = moments.clone();
        for tensor in result.tensors_mut() {
            for index in 0..tensor.size() {
                let field_indices = tensor.get_field_indices(index);
                let constant = zeroth.get(flat_index(zeroth.dimension(), &field_indices));
                let factor = table.get(radius_index, tensor.get_orders(index))?;
                tensor.set(index, tensor.get(index) - constant * factor / volume);
            }
        }
        Ok(result)
    }

    /// Divides order `k` by `radius^(k + dimension)`, then scales all orders
    /// together to unit norm. A set whose norm does not exceed
    /// [`MIN_SCALE_NORM`] is only rescaled by the radius.
    pub fn normalize_s(&self, moments: &MomentSet, radius: f64) -> MomentSet {
        if !self.is_scaling {
            return moments.clone();
        }
        let mut result = moments.clone();
        let dimension = moments.dimension() as i32;
        for (k, tensor) in result.tensors_mut().iter_mut().enumerate() {
            let divisor = radius.powi(k as i32 + dimension);
            tensor.data_mut().iter_mut().for_each(|v| *v /= divisor);
        }
        let norm = result.norm();
        if norm > MIN_SCALE_NORM {
            for tensor in result.tensors_mut() {
                tensor.data_mut().iter_mut().for_each(|v| *v /= norm);
            }
        }
        result
    }

    /// Rotation into standard orientation, `None` when the replayed directions are degenerate.
    pub fn rotation_for(&self, moments: &MomentSet, contraction: &DominantContraction) -> Result<Option<DMatrix<f64>>> {
        let reproduced = reproduce_contractions(moments, contraction)?;
        let first = reproduced.first.data();
        Ok(match (moments.dimension(), &reproduced.second) {
            (2, _) => align_2d(first),
            (_, Some(second)) => align_3d(first, second.data()).or_else(|| {
                debug!("second direction degenerate at this point, aligning the first direction only");
                align_to_x(first)
            }),
            (_, None) => align_to_x(first),
        })
    }

    /// Rotates `moments` into the standard orientation defined by `contraction`.
    /// A 3D contraction without a second direction leaves a free roll about x,
    /// which is swept with `angle_resolution` samples.
    pub fn normalize_r(&self, moments: &MomentSet, contraction: &DominantContraction) -> Result<Option<Vec<MomentSet>>> {
        let rotation = match self.rotation_for(moments, contraction)? {
            Some(rotation) => rotation,
            None => {
                warn!("rotation to the dominant directions could not be constructed");
                return Ok(None);
            }
        };
        let aligned = moments.rotate(&rotation)?;
        if moments.dimension() == 3 && contraction.second.is_none() {
            let rolled = sample_rolls(self.angle_resolution)
                .iter()
                .map(|roll| aligned.rotate(roll))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Some(rolled));
        }
        Ok(Some(vec![aligned]))
    }

    pub fn look_everywhere(&self, moments: &MomentSet) -> Result<Vec<MomentSet>> {
        let rotations = if moments.dimension() == 2 {
            sample_rotations_2d(self.angle_resolution)
        } else {
            sample_rotations_3d(self.angle_resolution)
        };
        rotations.iter().map(|r| moments.rotate(r)).collect()
    }

    fn with_reflections(&self, positions: Vec<MomentSet>) -> Vec<MomentSet> {
        if !self.is_reflection {
            return positions;
        }
        let mirrored: Vec<MomentSet> = positions.iter().map(|p| p.reflect_last_axis()).collect();
        positions.into_iter().chain(mirrored).collect()
    }

    /// Standard positions of translation- and scale-normalized pattern moments.
    pub fn standard_positions(&self, pattern: &MomentSet) -> Result<StandardPositions> {
        if !self.is_rotation {
            return Ok(StandardPositions {
                positions: self.with_reflections(vec![pattern.clone()]),
                field_rotation: FieldRotation::Identity,
            });
        }

        let alternatives = calculate_dominant_contractions(pattern, self.eps)?;
        let mut positions = Vec::new();
        for alternative in &alternatives {
            match self.normalize_r(pattern, alternative)? {
                Some(rotated) => positions.extend(rotated),
                None => {
                    positions.clear();
                    break;
                }
            }
        }

        if positions.is_empty() {
            debug!("no usable dominant contraction, sampling all orientations");
            return Ok(StandardPositions {
                positions: self.with_reflections(self.look_everywhere(pattern)?),
                field_rotation: FieldRotation::Identity,
            });
        }
        debug!(
            "{} dominant contraction alternatives, {} standard positions",
            alternatives.len(),
            positions.len()
        );
        Ok(StandardPositions {
            positions: self.with_reflections(positions),
            field_rotation: FieldRotation::Dominant(alternatives[0].clone()),
        })
    }

    pub fn normalize_pattern(
        &self,
        moments: &MomentSet,
        table: &TranslationFactorTable,
        radius_index: usize,
        radius: f64,
    ) -> Result<StandardPositions> {
        let translated = self.normalize_t(moments, table, radius_index)?;
        let scaled = self.normalize_s(&translated, radius);
        self.standard_positions(&scaled)
    }

    /// Normalizes raw field moments the same way the pattern was normalized.
    pub fn normalize_field_point(
        &self,
        moments: &MomentSet,
        table: &TranslationFactorTable,
        radius_index: usize,
        radius: f64,
        standard: &StandardPositions,
    ) -> Result<MomentSet> {
        let translated = self.normalize_t(moments, table, radius_index)?;
        let scaled = self.normalize_s(&translated, radius);
        match &standard.field_rotation {
            FieldRotation::Identity => Ok(scaled),
            FieldRotation::Dominant(contraction) => match self.rotation_for(&scaled, contraction)? {
                Some(rotation) => scaled.rotate(&rotation),
                None => Ok(scaled),
            },
        }
    }

    /// `1 / distance` to the closest standard position; [`f64::MAX`] for a
    /// perfect match.
    pub fn similarity(&self, normalized: &MomentSet, standard: &StandardPositions) -> Result<f64> {
        let mut closest = f64::INFINITY;
        for position in &standard.positions {
            closest = closest.min(normalized.distance(position)?);
        }
        if !closest.is_finite() {
            return Err(MomentsError::Mismatch("no standard positions to compare with".into()));
        }
        Ok(if closest < PERFECT_MATCH_DISTANCE {
            f64::MAX
        } else {
            1.0 / closest
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::MomentTensor;
    use proptest::prelude::*;

    fn normalizer() -> MomentNormalizer {
        MomentNormalizer::new(&MomentsConfig::default())
    }

    fn set(dimension: usize, tensors: Vec<Vec<f64>>) -> MomentSet {
        let tensors = tensors
            .into_iter()
            .enumerate()
            .map(|(k, data)| MomentTensor::from_data(dimension, k, 0, data).unwrap())
            .collect();
        MomentSet::from_tensors(tensors).unwrap()
    }

    #[test]
    fn translation_removes_constant_part() {
        let table = TranslationFactorTable::analytic(2, 2, &[1.0]).unwrap();
        let area = table.get(0, [0, 0, 0]).unwrap();
        let xx = table.get(0, [2, 0, 0]).unwrap();
        // moments of the constant field 3
        let moments = set(2, vec![vec![3.0 * area], vec![0.0, 0.0], vec![3.0 * xx, 0.0, 0.0, 3.0 * xx]]);
        let translated = normalizer().normalize_t(&moments, &table, 0).unwrap();
        assert!(translated.norm() < 1e-12);
    }

    #[test]
    fn zero_moments_survive_scaling() {
        let moments = MomentSet::zeros(3, 2, 0);
        assert_eq!(normalizer().normalize_s(&moments, 2.0), moments);
    }

    #[test]
    fn rotated_2d_moments_share_a_standard_position() {
        let moments = set(2, vec![vec![0.0], vec![0.3, 0.1], vec![1.0, 0.2, 0.2, -0.4]]);
        let r = crate::rotation::rotation_2d(0.7);
        let rotated = moments.rotate(&r).unwrap();
        let n = normalizer();
        let standard = n.standard_positions(&moments).unwrap();
        let other = n.standard_positions(&rotated).unwrap();
        let closest = other
            .positions
            .iter()
            .map(|p| standard.positions[0].distance(p).unwrap())
            .fold(f64::INFINITY, f64::min);
        assert!(closest < 1e-3);
    }

    #[test]
    fn degenerate_pattern_samples_all_orientations() {
        let n = MomentNormalizer {
            is_reflection: true,
            ..normalizer()
        };
        let standard = n.standard_positions(&MomentSet::zeros(2, 2, 0)).unwrap();
        assert_eq!(standard.field_rotation, FieldRotation::Identity);
        assert_eq!(standard.positions.len(), 2 * n.angle_resolution);
    }

    #[test]
    fn perfect_match_is_guarded() {
        let moments = set(2, vec![vec![0.0], vec![1.0, 0.0], vec![0.0; 4]]);
        let standard = StandardPositions {
            positions: vec![moments.clone()],
            field_rotation: FieldRotation::Identity,
        };
        assert_eq!(normalizer().similarity(&moments, &standard).unwrap(), f64::MAX);
        let other = set(2, vec![vec![0.0], vec![0.5, 0.0], vec![0.0; 4]]);
        assert!((normalizer().similarity(&other, &standard).unwrap() - 2.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn scaled_moments_have_unit_norm(values in proptest::collection::vec(-10.0f64..10.0, 13), radius in 0.1f64..5.0) {
            let moments = MomentSet::from_basis_vector(&crate::basis_indexing::BasisIndexing::new(3, 2, 0), &values).unwrap();
            let scaled = normalizer().normalize_s(&moments, radius);
            let before: f64 = moments
                .tensors()
                .iter()
                .enumerate()
                .map(|(k, t)| t.norm().powi(2) / radius.powi(2 * (k as i32 + 3)))
                .sum::<f64>()
                .sqrt();
            if before > MIN_SCALE_NORM {
                prop_assert!((scaled.norm() - 1.0).abs() < 1e-10);
            }
        }
    }
}
