use crate::basis_indexing::BasisIndexing;
use crate::error::{MomentsError, Result};
use crate::tensor::MomentTensor;
use nalgebra::DMatrix;

/// The moments of a field at one point and radius: one tensor per moment
/// order `0..=order`, the tensor of order `k` having rank `k + field_rank`.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentSet {
    dimension: usize,
    field_rank: usize,
    tensors: Vec<MomentTensor>,
}

impl MomentSet {
    /// A moment set with all moments zero.
    ///
    /// # Examples
    /// ```
    /// use momentinvariants::moment_set::MomentSet;
    /// let moments = MomentSet::zeros(2, 2, 0);
    /// assert_eq!(moments.order(), 2);
    /// assert_eq!(moments.tensor(2).rank(), 2);
    /// assert_eq!(moments.norm(), 0.0);
    /// ```
    pub fn zeros(dimension: usize, order: usize, field_rank: usize) -> Self {
        MomentSet {
            dimension,
            field_rank,
            tensors: (0..=order)
                .map(|k| MomentTensor::new(dimension, k + field_rank, field_rank))
                .collect(),
        }
    }

    /// Builds a moment set from per-order tensors; tensor `k` must have rank `k + field_rank`.
    pub fn from_tensors(tensors: Vec<MomentTensor>) -> Result<Self> {
        let first = tensors
            .first()
            .ok_or_else(|| MomentsError::InvalidConfig("a moment set needs at least one tensor".into()))?;
        let dimension = first.dimension();
        let field_rank = first.field_rank();
        for (k, tensor) in tensors.iter().enumerate() {
            if tensor.rank() != k + field_rank || tensor.dimension() != dimension {
                return Err(MomentsError::RankMismatch {
                    expected: k + field_rank,
                    found: tensor.rank(),
                });
            }
        }
        Ok(MomentSet {
            dimension,
            field_rank,
            tensors,
        })
    }

    /// Reassembles a moment set from its values in basis-function order.
    pub fn from_basis_vector(basis: &BasisIndexing, values: &[f64]) -> Result<Self> {
        if values.len() != basis.number_of_basis_functions() {
            return Err(MomentsError::RankMismatch {
                expected: basis.number_of_basis_functions(),
                found: values.len(),
            });
        }
        let mut moments = MomentSet::zeros(basis.dimension(), basis.order(), basis.field_rank());
        for (k, tensor) in moments.tensors.iter_mut().enumerate() {
            let offset = basis.offset_of_order(k);
            tensor
                .data_mut()
                .copy_from_slice(&values[offset..offset + basis.tensor_size(k)]);
        }
        Ok(moments)
    }

    /// All components concatenated in basis-function order.
    pub fn to_basis_vector(&self) -> Vec<f64> {
        self.tensors
            .iter()
            .flat_map(|t| t.data().iter().copied())
            .collect()
    }

    pub fn basis(&self) -> BasisIndexing {
        BasisIndexing::new(self.dimension, self.order(), self.field_rank)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn field_rank(&self) -> usize {
        self.field_rank
    }

    pub fn order(&self) -> usize {
        self.tensors.len() - 1
    }

    pub fn tensors(&self) -> &[MomentTensor] {
        &self.tensors
    }

    pub fn tensors_mut(&mut self) -> &mut [MomentTensor] {
        &mut self.tensors
    }

    pub fn tensor(&self, k: usize) -> &MomentTensor {
        &self.tensors[k]
    }

    pub fn tensor_mut(&mut self, k: usize) -> &mut MomentTensor {
        &mut self.tensors[k]
    }

    /// `true` when both sets have the same dimension, order and field rank.
    pub fn is_compatible(&self, other: &MomentSet) -> bool {
        self.dimension == other.dimension
            && self.field_rank == other.field_rank
            && self.tensors.len() == other.tensors.len()
    }

    /// L2 norm of all orders concatenated.
    pub fn norm(&self) -> f64 {
        self.tensors
            .iter()
            .flat_map(|t| t.data().iter())
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
    }

    /// Euclidean distance summed across all orders.
    pub fn distance(&self, other: &MomentSet) -> Result<f64> {
        if !self.is_compatible(other) {
            return Err(MomentsError::Mismatch(format!(
                "cannot compare moments of dimension {}, order {}, field rank {} with dimension {}, order {}, field rank {}",
                self.dimension,
                self.order(),
                self.field_rank,
                other.dimension,
                other.order(),
                other.field_rank
            )));
        }
        Ok(self
            .tensors
            .iter()
            .zip(&other.tensors)
            .map(|(a, b)| a.squared_distance(b))
            .sum::<f64>()
            .sqrt())
    }

    /// Applies `r` to every order's tensor.
    pub fn rotate(&self, r: &DMatrix<f64>) -> Result<MomentSet> {
        let tensors = self
            .tensors
            .iter()
            .map(|t| t.rotate(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(MomentSet {
            tensors,
            ..self.clone()
        })
    }

    /// Mirror image across the plane orthogonal to the last axis.
    pub fn reflect_last_axis(&self) -> MomentSet {
        MomentSet {
            tensors: self.tensors.iter().map(|t| t.reflect_last_axis()).collect(),
            ..self.clone()
        }
    }
}
