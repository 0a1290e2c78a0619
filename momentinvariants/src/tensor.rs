use crate::error::{MomentsError, Result};
use log::warn;
use nalgebra::{DMatrix, SymmetricEigen};

/// One operation applied to a tensor after it was formed as a (possibly
/// trivial) tensor product of moment tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeStep {
    /// Sum over the index pair `(first, second)`, `first < second`, of the tensor
    /// as it was at this point of the recipe.
    Contract { first: usize, second: usize },

    /// Replace the rank-2 tensor by its weighted eigenvector number `index`
    /// (eigenvalues sorted descending), sign-flipped when `negated` is set.
    Eigenvector { index: usize, negated: bool },
}

/// Records how a tensor was derived from a [`crate::moment_set::MomentSet`]:
/// the ranks of the moment tensors multiplied together, in product order,
/// followed by the contractions and eigenvector picks applied to the product.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContractionRecipe {
    pub product_ranks: Vec<usize>,
    pub steps: Vec<RecipeStep>,
}

impl ContractionRecipe {
    pub fn leaf(rank: usize) -> Self {
        ContractionRecipe {
            product_ranks: vec![rank],
            steps: Vec::new(),
        }
    }

    pub fn is_uncontracted(&self) -> bool {
        self.steps.is_empty()
    }

    /// `true` when the last step selected an eigenvector. Such a vector has no
    /// canonical sign, so its negated twin is an equally valid candidate.
    pub fn ends_with_eigenvector(&self) -> bool {
        matches!(self.steps.last(), Some(RecipeStep::Eigenvector { .. }))
    }

    /// The same recipe with the sign of the final eigenvector pick flipped.
    pub fn negated(&self) -> Self {
        let mut recipe = self.clone();
        if let Some(RecipeStep::Eigenvector { negated, .. }) = recipe.steps.last_mut() {
            *negated = !*negated;
        }
        recipe
    }
}

/// A dense tensor with `dimension^rank` entries, `dimension` being 2 or 3.
///
/// The first `moment_rank` indices belong to the monomial basis (powers of the
/// spatial offset), the trailing `field_rank` indices to the components of the
/// sampled field. The flat storage index of the multi-index `(i0, i1, ...)` is
/// `Σ iₖ·dimensionᵏ`.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentTensor {
    dimension: usize,
    rank: usize,
    field_rank: usize,
    data: Vec<f64>,
    recipe: ContractionRecipe,
}

impl MomentTensor {
    /// Creates a zero tensor.
    ///
    /// # Examples
    /// ```
    /// use momentinvariants::tensor::MomentTensor;
    /// let t = MomentTensor::new(3, 2, 0);
    /// assert_eq!(t.size(), 9);
    /// assert_eq!(t.moment_rank(), 2);
    /// ```
    pub fn new(dimension: usize, rank: usize, field_rank: usize) -> Self {
        MomentTensor {
            dimension,
            rank,
            field_rank: field_rank.min(rank),
            data: vec![0.0; dimension.pow(rank as u32)],
            recipe: ContractionRecipe::leaf(rank),
        }
    }

    /// Wraps existing data; fails when the length is not `dimension^rank`.
    pub fn from_data(dimension: usize, rank: usize, field_rank: usize, data: Vec<f64>) -> Result<Self> {
        let expected = dimension.pow(rank as u32);
        if data.len() != expected {
            return Err(MomentsError::RankMismatch {
                expected,
                found: data.len(),
            });
        }
        Ok(MomentTensor {
            dimension,
            rank,
            field_rank: field_rank.min(rank),
            data,
            recipe: ContractionRecipe::leaf(rank),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn field_rank(&self) -> usize {
        self.field_rank
    }

    pub fn moment_rank(&self) -> usize {
        self.rank - self.field_rank
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn recipe(&self) -> &ContractionRecipe {
        &self.recipe
    }

    pub fn get(&self, index: usize) -> f64 {
        self.data[index]
    }

    pub fn set(&mut self, index: usize, value: f64) {
        self.data[index] = value;
    }

    pub fn get_by_indices(&self, indices: &[usize]) -> f64 {
        self.data[self.get_index(indices)]
    }

    pub fn get_index(&self, indices: &[usize]) -> usize {
        flat_index(self.dimension, indices)
    }

    pub fn get_indices(&self, index: usize) -> Vec<usize> {
        multi_index(self.dimension, self.rank, index)
    }

    pub fn get_moment_indices(&self, index: usize) -> Vec<usize> {
        let mut indices = self.get_indices(index);
        indices.truncate(self.moment_rank());
        indices
    }

    pub fn get_field_indices(&self, index: usize) -> Vec<usize> {
        let indices = self.get_indices(index);
        indices[self.moment_rank()..].to_vec()
    }

    /// Exponents `(p, q, r)` of the monomial `x^p y^q z^r` that component
    /// `index` projects onto: the number of moment indices equal to 0, 1 and 2.
    pub fn get_orders(&self, index: usize) -> [usize; 3] {
        let mut orders = [0usize; 3];
        for i in self.get_moment_indices(index) {
            orders[i] += 1;
        }
        orders
    }

    pub fn norm(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Returns a copy whose indices are permuted so that `i` and `j` occupy the
    /// last two slots (in that order), the rest keeping their relative order.
    pub fn transpose(&self, i: usize, j: usize) -> MomentTensor {
        let order: Vec<usize> = (0..self.rank)
            .filter(|&k| k != i && k != j)
            .chain([i, j])
            .collect();
        let mut result = self.clone();
        for (index, value) in result.data.iter_mut().enumerate() {
            let target = multi_index(self.dimension, self.rank, index);
            // target[k] is the value of source index order[k]
            let mut source = vec![0usize; self.rank];
            for (k, &from) in order.iter().enumerate() {
                source[from] = target[k];
            }
            *value = self.data[flat_index(self.dimension, &source)];
        }
        result
    }

    /// Sums over the index pair `(i, j)`, reducing the rank by two.
    pub fn contract(&self, i: usize, j: usize) -> Result<MomentTensor> {
        if self.rank < 2 {
            warn!("cannot contract a tensor of rank {}", self.rank);
            return Err(MomentsError::RankMismatch {
                expected: 2,
                found: self.rank,
            });
        }
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        if i == j || j >= self.rank {
            return Err(MomentsError::InvalidConfig(format!(
                "contraction indices ({i}, {j}) invalid for rank {}",
                self.rank
            )));
        }

        let moved = self.transpose(i, j);
        let rank = self.rank - 2;
        let inner = self.dimension.pow(rank as u32);
        let mut data = vec![0.0; inner];
        for (index, value) in data.iter_mut().enumerate() {
            for k in 0..self.dimension {
                *value += moved.data[index + k * inner + k * inner * self.dimension];
            }
        }

        let moment_rank = self.moment_rank();
        let contracted_field = [i, j].iter().filter(|&&k| k >= moment_rank).count();
        let mut recipe = self.recipe.clone();
        recipe.steps.push(RecipeStep::Contract { first: i, second: j });

        Ok(MomentTensor {
            dimension: self.dimension,
            rank,
            field_rank: (self.field_rank - contracted_field).min(rank),
            data,
            recipe,
        })
    }

    pub fn apply_step(&self, step: RecipeStep) -> Result<MomentTensor> {
        match step {
            RecipeStep::Contract { first, second } => self.contract(first, second),
            RecipeStep::Eigenvector { index, negated } => {
                let vectors = self.eigen_vectors()?;
                let vector = vectors.into_iter().nth(index).ok_or(MomentsError::RankMismatch {
                    expected: index + 1,
                    found: self.dimension,
                })?;
                Ok(if negated { vector.negated() } else { vector })
            }
        }
    }

    pub fn contract_recipe(&self, steps: &[RecipeStep]) -> Result<MomentTensor> {
        let mut current = self.clone();
        for &step in steps {
            current = current.apply_step(step)?;
        }
        Ok(current)
    }

    pub fn contract_all(&self) -> Vec<MomentTensor> {
        let mut result = Vec::new();
        if self.rank < 2 {
            return result;
        }
        for i in 0..self.rank {
            for j in i + 1..self.rank {
                if let Ok(contracted) = self.contract(i, j) {
                    result.push(contracted);
                }
            }
        }
        result
    }

    /// Outer product; the indices of `a` precede those of `b`.
    pub fn tensor_product(a: &MomentTensor, b: &MomentTensor) -> MomentTensor {
        let mut data = Vec::with_capacity(a.size() * b.size());
        for &vb in &b.data {
            for &va in &a.data {
                data.push(va * vb);
            }
        }
        let mut product_ranks = a.recipe.product_ranks.clone();
        product_ranks.extend_from_slice(&b.recipe.product_ranks);
        MomentTensor {
            dimension: a.dimension,
            rank: a.rank + b.rank,
            field_rank: a.field_rank + b.field_rank,
            data,
            recipe: ContractionRecipe {
                product_ranks,
                steps: Vec::new(),
            },
        }
    }

    /// Weighted eigenvectors of a rank-2 tensor, eigenvalues sorted descending.
    ///
    /// The tensor is symmetrized first. Each eigenvector is scaled by the
    /// smallest gap between its eigenvalue and any other one, so a degenerate
    /// eigenvalue yields a zero vector. In 2D the weight is also multiplied by
    /// the eigenvalue itself.
    pub fn eigen_vectors(&self) -> Result<Vec<MomentTensor>> {
        if self.rank != 2 {
            return Err(MomentsError::RankMismatch {
                expected: 2,
                found: self.rank,
            });
        }
        let d = self.dimension;
        let matrix = DMatrix::from_fn(d, d, |r, c| {
            0.5 * (self.data[r + d * c] + self.data[c + d * r])
        });
        let eigen = SymmetricEigen::new(matrix);

        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let mut result = Vec::with_capacity(d);
        for (position, &column) in order.iter().enumerate() {
            let value = eigen.eigenvalues[column];
            let mut weight = order
                .iter()
                .filter(|&&other| other != column)
                .map(|&other| (value - eigen.eigenvalues[other]).abs())
                .fold(f64::INFINITY, f64::min);
            if d == 2 {
                weight *= value;
            }
            let data = (0..d).map(|r| weight * eigen.eigenvectors[(r, column)]).collect();
            let mut recipe = self.recipe.clone();
            recipe.steps.push(RecipeStep::Eigenvector {
                index: position,
                negated: false,
            });
            result.push(MomentTensor {
                dimension: d,
                rank: 1,
                field_rank: 0,
                data,
                recipe,
            });
        }
        Ok(result)
    }

    /// Sign-flipped copy whose recipe selects the negated eigenvector twin.
    pub fn negated(&self) -> MomentTensor {
        MomentTensor {
            data: self.data.iter().map(|v| -v).collect(),
            recipe: self.recipe.negated(),
            ..self.clone()
        }
    }

    /// Applies the rotation (or reflection) `r` to every index:
    /// `T'_i = Σ_j (Π_k R[iₖ, jₖ]) · T_j`.
    pub fn rotate(&self, r: &DMatrix<f64>) -> Result<MomentTensor> {
        let d = self.dimension;
        if r.nrows() != d || r.ncols() != d {
            return Err(MomentsError::Mismatch(format!(
                "{}x{} rotation applied to a {d}D tensor",
                r.nrows(),
                r.ncols()
            )));
        }
        let mut current = self.data.clone();
        let mut next = vec![0.0; current.len()];
        let mut stride = 1;
        for _axis in 0..self.rank {
            for (index, value) in next.iter_mut().enumerate() {
                let digit = (index / stride) % d;
                let base = index - digit * stride;
                *value = (0..d)
                    .map(|m| r[(digit, m)] * current[base + m * stride])
                    .sum();
            }
            std::mem::swap(&mut current, &mut next);
            stride *= d;
        }
        Ok(MomentTensor {
            data: current,
            ..self.clone()
        })
    }

    /// Mirrors the last spatial axis: every component is multiplied by
    /// `(-1)^(number of indices equal to dimension - 1)`.
    pub fn reflect_last_axis(&self) -> MomentTensor {
        let last = self.dimension - 1;
        let mut result = self.clone();
        for (index, value) in result.data.iter_mut().enumerate() {
            let flips = multi_index(self.dimension, self.rank, index)
                .into_iter()
                .filter(|&i| i == last)
                .count();
            if flips % 2 == 1 {
                *value = -*value;
            }
        }
        result
    }

    pub fn squared_distance(&self, other: &MomentTensor) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

/// `Σ iₖ·dimensionᵏ`.
pub fn flat_index(dimension: usize, indices: &[usize]) -> usize {
    indices
        .iter()
        .rev()
        .fold(0, |acc, &i| acc * dimension + i)
}

/// Inverse of [`flat_index`] for a tensor of the given rank.
pub fn multi_index(dimension: usize, rank: usize, mut index: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity(rank);
    for _ in 0..rank {
        indices.push(index % dimension);
        index /= dimension;
    }
    indices
}
