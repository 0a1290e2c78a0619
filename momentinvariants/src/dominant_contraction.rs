//! Search for the dominant contractions of a moment set: rank-1 tensors
//! derived from the moments by products, contractions and eigenvector picks
//! that are large enough to serve as canonical directions.
//!
//! Every tensor carries its [`ContractionRecipe`], so the same directions can
//! be rebuilt from any other moment set of the same shape with
//! [`reproduce_contraction`].

use crate::error::{MomentsError, Result};
use crate::moment_set::MomentSet;
use crate::tensor::{ContractionRecipe, MomentTensor};
use log::{debug, warn};
use std::collections::VecDeque;

/// Largest difference tolerated between a dominant contraction and its
/// reproduction from the same moments.
pub const REPRODUCTION_TOLERANCE: f64 = 1e-3;

/// Normalized cross product magnitude below which two directions are
/// treated as parallel.
pub const MIN_CROSS: f64 = 1e-3;

/// One candidate pair of directions. In 2D only `first` is used; in 3D
/// `second` is `None` when no direction independent of `first` exists.
#[derive(Debug, Clone, PartialEq)]
pub struct DominantContraction {
    pub first: MomentTensor,
    pub second: Option<MomentTensor>,
}

/// Replays `recipe` on `moments`: the moment tensors named by the product
/// ranks are multiplied in order, then the contraction steps are applied.
pub fn reproduce_contraction(moments: &MomentSet, recipe: &ContractionRecipe) -> Result<MomentTensor> {
    let mut product: Option<MomentTensor> = None;
    for &rank in &recipe.product_ranks {
        let order = rank
            .checked_sub(moments.field_rank())
            .filter(|&k| k <= moments.order())
            .ok_or(MomentsError::RankMismatch {
                expected: moments.order() + moments.field_rank(),
                found: rank,
            })?;
        let factor = moments.tensor(order);
        product = Some(match product {
            None => factor.clone(),
            Some(acc) => MomentTensor::tensor_product(&acc, factor),
        });
    }
    let product = product.ok_or_else(|| MomentsError::InvalidConfig("empty contraction recipe".into()))?;
    product.contract_recipe(&recipe.steps)
}

/// Rebuilds both directions of `contraction` from `moments`.
pub fn reproduce_contractions(moments: &MomentSet, contraction: &DominantContraction) -> Result<DominantContraction> {
    let first = reproduce_contraction(moments, contraction.first.recipe())?;
    let second = contraction
        .second
        .as_ref()
        .map(|s| reproduce_contraction(moments, s.recipe()))
        .transpose()?;
    Ok(DominantContraction { first, second })
}

/// Every tensor reachable from the moments, processed breadth first.
///
/// Uncontracted tensors (the moments themselves and their products) with a
/// norm above `eps` and positive rank are multiplied with each other as long
/// as the product rank stays below the rank of the highest order. Tensors of
/// rank above 2 are contracted over every index pair, tensors of rank 2 are
/// replaced by their weighted eigenvectors.
fn explore(moments: &MomentSet, eps: f64) -> Result<Vec<MomentTensor>> {
    let max_rank = moments.order() + moments.field_rank();
    let mut arena: Vec<MomentTensor> = moments.tensors().to_vec();
    let mut queue: VecDeque<usize> = (0..arena.len()).collect();
    let mut factors: Vec<usize> = Vec::new();

    while let Some(current) = queue.pop_front() {
        let tensor = arena[current].clone();
        let mut derived = Vec::new();

        if tensor.recipe().is_uncontracted() && tensor.rank() > 0 && tensor.norm() > eps {
            factors.push(current);
            for &other in &factors {
                let other = &arena[other];
                if other.rank() + tensor.rank() < max_rank {
                    derived.push(MomentTensor::tensor_product(other, &tensor));
                }
            }
        }

        if tensor.rank() > 2 {
            derived.extend(tensor.contract_all());
        } else if tensor.rank() == 2 && tensor.norm() > eps {
            derived.extend(tensor.eigen_vectors()?);
        }

        for t in derived {
            queue.push_back(arena.len());
            arena.push(t);
        }
    }
    Ok(arena)
}

fn cross_norm(a: &[f64], b: &[f64]) -> f64 {
    let c = [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ];
    c.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// The direction and its negated twin when the direction came from an
/// eigenvector pick, whose sign is arbitrary.
fn with_sign_alternative(vector: MomentTensor) -> Vec<MomentTensor> {
    if vector.recipe().ends_with_eigenvector() {
        let negated = vector.negated();
        vec![vector, negated]
    } else {
        vec![vector]
    }
}

/// Finds the dominant contractions of `moments`.
///
/// The first direction is the rank-1 tensor of largest norm. In 3D the second
/// maximizes the cross product with the first. Each returned alternative
/// combines one sign choice per direction. An empty result means no usable
/// direction exists (all candidates below `eps`, or the directions could not
/// be reproduced from the moments) and the caller has to search all
/// orientations.
pub fn calculate_dominant_contractions(moments: &MomentSet, eps: f64) -> Result<Vec<DominantContraction>> {
    let candidates: Vec<MomentTensor> = explore(moments, eps)?
        .into_iter()
        .filter(|t| t.rank() == 1)
        .collect();
    debug!("dominant contraction search produced {} vectors", candidates.len());

    let first = match candidates.iter().max_by(|a, b| a.norm().total_cmp(&b.norm())) {
        Some(first) if first.norm() >= eps => first.clone(),
        _ => {
            debug!("no dominant contraction above {eps}");
            return Ok(Vec::new());
        }
    };

    let mut second = None;
    if moments.dimension() == 3 {
        let best = candidates
            .iter()
            .max_by(|a, b| cross_norm(first.data(), a.data()).total_cmp(&cross_norm(first.data(), b.data())));
        if let Some(candidate) = best {
            let norm = candidate.norm();
            let usable = norm >= eps && cross_norm(first.data(), candidate.data()) / (first.norm() * norm) >= MIN_CROSS;
            if usable {
                second = Some(candidate.clone());
            } else {
                debug!("no second direction independent of the first one");
            }
        }
    }

    let firsts = with_sign_alternative(first);
    let seconds = second.map(with_sign_alternative);
    let alternatives: Vec<DominantContraction> = match seconds {
        None => firsts
            .into_iter()
            .map(|first| DominantContraction { first, second: None })
            .collect(),
        Some(seconds) => firsts
            .iter()
            .flat_map(|first| {
                seconds.iter().map(move |second| DominantContraction {
                    first: first.clone(),
                    second: Some(second.clone()),
                })
            })
            .collect(),
    };

    for alternative in &alternatives {
        let reproduced = reproduce_contractions(moments, alternative)?;
        if !matches_within(&reproduced, alternative, REPRODUCTION_TOLERANCE) {
            warn!("dominant contraction could not be reproduced from its recipe, searching all orientations instead");
            return Ok(Vec::new());
        }
    }
    Ok(alternatives)
}

fn matches_within(a: &DominantContraction, b: &DominantContraction, tolerance: f64) -> bool {
    let close = |x: &MomentTensor, y: &MomentTensor| {
        x.rank() == y.rank() && x.squared_distance(y).sqrt() <= tolerance
    };
    let second = match (&a.second, &b.second) {
        (Some(x), Some(y)) => close(x, y),
        (None, None) => true,
        _ => false,
    };
    close(&a.first, &b.first) && second
}
