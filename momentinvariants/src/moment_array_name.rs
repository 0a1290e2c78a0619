//! Names of the output arrays.
//!
//! A moment array is named `radius<R>index<digits>`: `<R>` is the radius
//! printed with six decimals and `<digits>` holds one digit (0, 1 or 2) per
//! moment and field index of the component, in basis-function order. Other
//! components parse these names back, so the format is fixed.

use crate::error::{MomentsError, Result};

const RADIUS_PREFIX: &str = "radius";
const INDEX_MARKER: &str = "index";

/// Prints a radius the way it appears in array names: `1.000000`.
pub fn format_radius(radius: f64) -> String {
    format!("{radius:.6}")
}

/// Name of the similarity array for one radius: the printed radius alone.
pub fn similarity_array_name(radius: f64) -> String {
    format_radius(radius)
}

/// Structured form of a moment array name.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentArrayKey {
    pub radius: f64,
    /// Moment indices followed by field indices.
    pub indices: Vec<usize>,
}

impl MomentArrayKey {
    pub fn new(radius: f64, indices: Vec<usize>) -> Self {
        MomentArrayKey { radius, indices }
    }

    /// # Examples
    /// ```
    /// use momentinvariants::moment_array_name::MomentArrayKey;
    /// let key = MomentArrayKey::new(2.5, vec![1, 0]);
    /// assert_eq!(key.to_name(), "radius2.500000index10");
    /// assert_eq!(MomentArrayKey::parse("radius2.500000index10").unwrap(), key);
    /// ```
    pub fn to_name(&self) -> String {
        let digits: String = self.indices.iter().map(|i| i.to_string()).collect();
        format!("{RADIUS_PREFIX}{}{INDEX_MARKER}{digits}", format_radius(self.radius))
    }

    pub fn parse(name: &str) -> Result<Self> {
        let rest = name
            .strip_prefix(RADIUS_PREFIX)
            .ok_or_else(|| MomentsError::ArrayName(name.to_string()))?;
        let marker = rest
            .find(INDEX_MARKER)
            .ok_or_else(|| MomentsError::ArrayName(name.to_string()))?;
        let radius: f64 = rest[..marker]
            .parse()
            .map_err(|_| MomentsError::ArrayName(name.to_string()))?;
        let indices = rest[marker + INDEX_MARKER.len()..]
            .chars()
            .map(|c| match c {
                '0'..='2' => Ok(c as usize - '0' as usize),
                _ => Err(MomentsError::ArrayName(name.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MomentArrayKey { radius, indices })
    }

    /// Moment order of the component, given the field rank.
    pub fn order(&self, field_rank: usize) -> Result<usize> {
        self.indices
            .len()
            .checked_sub(field_rank)
            .ok_or(MomentsError::RankMismatch {
                expected: field_rank,
                found: self.indices.len(),
            })
    }
}

/// Field rank of a complete set of moment arrays: the order-0 arrays carry
/// only field indices, so it is the shortest index string.
pub fn infer_field_rank(keys: &[MomentArrayKey]) -> Option<usize> {
    keys.iter().map(|k| k.indices.len()).min()
}
