//! Integrals of monomials over a ball, removed from the moments during
//! translation normalization.
//!
//! The translation factor of `(p, q, r)` is the moment `x^p y^q z^r` of the
//! constant field 1, i.e. `∫_{|x| ≤ radius} x^p y^q z^r`.

use crate::error::{MomentsError, Result};
use crate::stencil::Stencil;
use std::collections::HashMap;
use std::f64::consts::PI;

/// Integration steps per axis of the numeric fallback.
const NUMERIC_STEPS: usize = 25;

/// Highest total order with a closed form: 8 in 2D, 6 in 3D.
fn max_analytic_order(dimension: usize) -> usize {
    if dimension == 2 {
        8
    } else {
        6
    }
}

/// `Γ(n / 2)` for `n ≥ 1`.
fn gamma_half(n: usize) -> f64 {
    if n % 2 == 0 {
        (1..n / 2).map(|k| k as f64).product()
    } else {
        PI.sqrt() * (1..=(n - 1) / 2).map(|k| k as f64 - 0.5).product::<f64>()
    }
}

/// Closed-form `∫ x^p y^q z^r` over a ball (disk in 2D, where `r` must be 0).
///
/// Zero whenever an exponent is odd. Returns `None` for orders beyond the
/// tabulated range.
///
/// # Examples
/// ```
/// use momentinvariants::translation_factor::translation_factor_analytic;
/// let area = translation_factor_analytic(2.0, 2, 0, 0, 0).unwrap();
/// assert!((area - std::f64::consts::PI * 4.0).abs() < 1e-12);
/// assert_eq!(translation_factor_analytic(1.0, 3, 1, 2, 0), Some(0.0));
/// ```
pub fn translation_factor_analytic(radius: f64, dimension: usize, p: usize, q: usize, r: usize) -> Option<f64> {
    if dimension == 2 && r != 0 {
        return Some(0.0);
    }
    if p + q + r > max_analytic_order(dimension) {
        return None;
    }
    if p % 2 == 1 || q % 2 == 1 || r % 2 == 1 {
        return Some(0.0);
    }
    if dimension == 2 {
        let n = p + q + 2;
        Some(2.0 * gamma_half(p + 1) * gamma_half(q + 1) / gamma_half(n) * radius.powi(n as i32) / n as f64)
    } else {
        let n = p + q + r + 3;
        Some(
            2.0 * gamma_half(p + 1) * gamma_half(q + 1) * gamma_half(r + 1) / gamma_half(n)
                * radius.powi(n as i32)
                / n as f64,
        )
    }
}

/// Sum of `cell_volume · x^p y^q z^r` over the given offsets.
pub fn translation_factor_sampled(offsets: &[[f64; 3]], cell_volume: f64, p: usize, q: usize, r: usize) -> f64 {
    offsets
        .iter()
        .map(|o| cell_volume * o[0].powi(p as i32) * o[1].powi(q as i32) * o[2].powi(r as i32))
        .sum()
}

/// Numeric `∫ x^p y^q z^r` over a ball on a 25-node-per-axis stencil.
pub fn translation_factor_numeric(radius: f64, dimension: usize, p: usize, q: usize, r: usize) -> Result<f64> {
    let stencil = Stencil::build(dimension, radius, NUMERIC_STEPS)?;
    let inside = offsets_within_radius(stencil.offsets(), radius);
    Ok(translation_factor_sampled(&inside, stencil.cell_volume(), p, q, r))
}

/// Closed form where tabulated, numeric integration otherwise.
pub fn translation_factor(radius: f64, dimension: usize, p: usize, q: usize, r: usize) -> Result<f64> {
    match translation_factor_analytic(radius, dimension, p, q, r) {
        Some(value) => Ok(value),
        None => translation_factor_numeric(radius, dimension, p, q, r),
    }
}

/// Offsets whose distance from the origin does not exceed `radius`.
pub fn offsets_within_radius(offsets: &[[f64; 3]], radius: f64) -> Vec<[f64; 3]> {
    let limit = radius * radius + crate::uniform_grid::EDGE_TOLERANCE;
    offsets
        .iter()
        .filter(|o| o.iter().map(|v| v * v).sum::<f64>() <= limit)
        .copied()
        .collect()
}

/// All exponent triples `(p, q, r)` with `p + q + r ≤ order` (`r = 0` in 2D).
fn exponent_triples(dimension: usize, order: usize) -> Vec<[usize; 3]> {
    let max_r = if dimension == 3 { order } else { 0 };
    let mut triples = Vec::new();
    for r in 0..=max_r {
        for q in 0..=order - r {
            for p in 0..=order - r - q {
                triples.push([p, q, r]);
            }
        }
    }
    triples
}

/// Translation factors for every radius of a request and every exponent triple
/// up to the moment order, keyed by `(radius index, [p, q, r])`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationFactorTable {
    factors: Vec<HashMap<[usize; 3], f64>>,
}

impl TranslationFactorTable {
    /// Closed-form factors (numeric beyond the tabulated orders).
    pub fn analytic(dimension: usize, order: usize, radii: &[f64]) -> Result<Self> {
        let triples = exponent_triples(dimension, order);
        let factors = radii
            .iter()
            .map(|&radius| {
                triples
                    .iter()
                    .map(|&[p, q, r]| translation_factor(radius, dimension, p, q, r).map(|v| ([p, q, r], v)))
                    .collect::<Result<HashMap<_, _>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TranslationFactorTable { factors })
    }

    /// Factors computed with the quadrature used for the moments themselves:
    /// for every radius, the sample offsets inside the ball and their cell volume.
    /// Removing these factors cancels an additive constant exactly.
    pub fn sampled(dimension: usize, order: usize, samples: &[(Vec<[f64; 3]>, f64)]) -> Self {
        let triples = exponent_triples(dimension, order);
        let factors = samples
            .iter()
            .map(|(offsets, cell_volume)| {
                triples
                    .iter()
                    .map(|&[p, q, r]| ([p, q, r], translation_factor_sampled(offsets, *cell_volume, p, q, r)))
                    .collect()
            })
            .collect();
        TranslationFactorTable { factors }
    }

    pub fn number_of_radii(&self) -> usize {
        self.factors.len()
    }

    pub fn get(&self, radius_index: usize, orders: [usize; 3]) -> Result<f64> {
        self.factors
            .get(radius_index)
            .and_then(|f| f.get(&orders))
            .copied()
            .ok_or_else(|| {
                MomentsError::InvalidConfig(format!(
                    "no translation factor for radius {radius_index} and exponents {orders:?}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ball_volume_and_second_moments() {
        let v = translation_factor_analytic(1.5, 3, 0, 0, 0).unwrap();
        assert!((v - 4.0 / 3.0 * PI * 1.5f64.powi(3)).abs() < 1e-12);
        // ∫ x² over the unit ball is 4π/15
        let x2 = translation_factor_analytic(1.0, 3, 2, 0, 0).unwrap();
        assert!((x2 - 4.0 * PI / 15.0).abs() < 1e-12);
        // ∫ x² over the unit disk is π/4
        let d2 = translation_factor_analytic(1.0, 2, 0, 2, 0).unwrap();
        assert!((d2 - PI / 4.0).abs() < 1e-12);
    }

    #[test]
    fn odd_exponents_vanish_and_high_orders_fall_back() {
        assert_eq!(translation_factor_analytic(1.0, 2, 3, 2, 0), Some(0.0));
        assert_eq!(translation_factor_analytic(1.0, 3, 4, 4, 0), None);
        let numeric = translation_factor(1.0, 3, 4, 4, 0).unwrap();
        assert!(numeric > 0.0);
    }

    #[test]
    fn numeric_integration_approximates_closed_form() {
        let analytic = translation_factor_analytic(1.0, 2, 2, 2, 0).unwrap();
        let numeric = translation_factor_numeric(1.0, 2, 2, 2, 0).unwrap();
        assert!((analytic - numeric).abs() / analytic < 0.1);
    }

    #[test]
    fn table_lookup() {
        let table = TranslationFactorTable::analytic(2, 2, &[1.0, 2.0]).unwrap();
        assert_eq!(table.number_of_radii(), 2);
        assert!((table.get(1, [0, 0, 0]).unwrap() - 4.0 * PI).abs() < 1e-12);
        assert!(table.get(0, [3, 0, 0]).is_err());
        assert!(table.get(2, [0, 0, 0]).is_err());
    }

    #[test]
    fn sampled_table_sums_offsets() {
        let offsets = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]];
        let table = TranslationFactorTable::sampled(2, 2, &[(offsets, 0.5)]);
        assert_eq!(table.get(0, [0, 0, 0]).unwrap(), 1.5);
        assert_eq!(table.get(0, [1, 0, 0]).unwrap(), 0.0);
        assert_eq!(table.get(0, [2, 0, 0]).unwrap(), 1.0);
    }
}
