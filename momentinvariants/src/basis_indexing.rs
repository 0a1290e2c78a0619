use crate::error::{MomentsError, Result};
use crate::tensor::{flat_index, multi_index};

/// Enumerates the basis functions of a moment set: every component of the
/// order-0 tensor, then every component of the order-1 tensor, and so on,
/// each tensor in its flat-index order.
///
/// The mapping from a basis function index to the tensor multi-index is
/// bijective and fixes the order of the output arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasisIndexing {
    dimension: usize,
    order: usize,
    field_rank: usize,
}

impl BasisIndexing {
    /// # Examples
    /// ```
    /// use momentinvariants::basis_indexing::BasisIndexing;
    /// let basis = BasisIndexing::new(2, 2, 0);
    /// assert_eq!(basis.number_of_basis_functions(), 1 + 2 + 4);
    /// assert_eq!(basis.get_tensor_indices_from_field_index(4).unwrap(), vec![1, 0]);
    /// ```
    pub fn new(dimension: usize, order: usize, field_rank: usize) -> Self {
        BasisIndexing {
            dimension,
            order,
            field_rank,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn field_rank(&self) -> usize {
        self.field_rank
    }

    /// Number of components of the tensor of moment order `k`.
    pub fn tensor_size(&self, k: usize) -> usize {
        self.dimension.pow((k + self.field_rank) as u32)
    }

    /// `Σ_{o=0}^{order} dimension^{o + field_rank}`.
    pub fn number_of_basis_functions(&self) -> usize {
        (0..=self.order).map(|k| self.tensor_size(k)).sum()
    }

    /// Offset of the first basis function of moment order `k`.
    pub fn offset_of_order(&self, k: usize) -> usize {
        (0..k).map(|o| self.tensor_size(o)).sum()
    }

    /// Moment order and flat index within that order's tensor.
    pub fn locate(&self, field_index: usize) -> Result<(usize, usize)> {
        let mut remaining = field_index;
        for k in 0..=self.order {
            let size = self.tensor_size(k);
            if remaining < size {
                return Ok((k, remaining));
            }
            remaining -= size;
        }
        Err(MomentsError::InvalidConfig(format!(
            "basis function {field_index} out of range {}",
            self.number_of_basis_functions()
        )))
    }

    /// Moment order of basis function `field_index`.
    pub fn order_of(&self, field_index: usize) -> Result<usize> {
        self.locate(field_index).map(|(k, _)| k)
    }

    /// Moment and field indices (moment indices first) of basis function `field_index`.
    pub fn get_tensor_indices_from_field_index(&self, field_index: usize) -> Result<Vec<usize>> {
        let (k, index) = self.locate(field_index)?;
        Ok(multi_index(self.dimension, k + self.field_rank, index))
    }

    /// Inverse of [`BasisIndexing::get_tensor_indices_from_field_index`].
    pub fn get_field_index_from_tensor_indices(&self, indices: &[usize]) -> Result<usize> {
        if indices.len() < self.field_rank || indices.len() - self.field_rank > self.order {
            return Err(MomentsError::RankMismatch {
                expected: self.order + self.field_rank,
                found: indices.len(),
            });
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.dimension) {
            return Err(MomentsError::InvalidConfig(format!(
                "tensor index {bad} out of range for dimension {}",
                self.dimension
            )));
        }
        let k = indices.len() - self.field_rank;
        Ok(self.offset_of_order(k) + flat_index(self.dimension, indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn enumeration_of_2d_scalar_order_2() {
        let basis = BasisIndexing::new(2, 2, 0);
        let all: Vec<Vec<usize>> = (0..basis.number_of_basis_functions())
            .map(|i| basis.get_tensor_indices_from_field_index(i).unwrap())
            .collect();
        assert_eq!(
            all,
            vec![
                vec![],
                vec![0],
                vec![1],
                vec![0, 0],
                vec![1, 0],
                vec![0, 1],
                vec![1, 1],
            ]
        );
    }

    #[test]
    fn vector_field_counts() {
        let basis = BasisIndexing::new(3, 2, 1);
        assert_eq!(basis.number_of_basis_functions(), 3 + 9 + 27);
        assert_eq!(basis.order_of(3).unwrap(), 1);
        assert_eq!(basis.get_tensor_indices_from_field_index(0).unwrap(), vec![0]);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let basis = BasisIndexing::new(2, 1, 0);
        assert!(basis.get_tensor_indices_from_field_index(3).is_err());
        assert!(basis.get_field_index_from_tensor_indices(&[0, 0]).is_err());
        assert!(basis.get_field_index_from_tensor_indices(&[2]).is_err());
    }

    proptest! {
        #[test]
        fn field_index_round_trip(
            dimension in 2usize..=3,
            order in 0usize..=5,
            field_rank in 0usize..=2,
            seed in 0usize..100_000,
        ) {
            let basis = BasisIndexing::new(dimension, order, field_rank);
            let index = seed % basis.number_of_basis_functions();
            let indices = basis.get_tensor_indices_from_field_index(index).unwrap();
            prop_assert_eq!(basis.get_field_index_from_tensor_indices(&indices).unwrap(), index);
        }
    }
}
