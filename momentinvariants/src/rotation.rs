//! Rotation matrices used to bring moments into a standard orientation.
//!
//! All matrices act on column vectors, `x' = R · x`, and are handed to
//! [`crate::tensor::MomentTensor::rotate`] as `dimension × dimension`
//! [`DMatrix`] values.
//!
//! Two families are provided:
//!
//! - alignments, which map one or two direction vectors onto canonical axes
//!   (`+x`, then the `x-y` half plane with positive `y`);
//! - orientation samples, which enumerate a discrete set of rotations for the
//!   exhaustive search used when no usable direction exists.

use nalgebra::{DMatrix, Vector3};
use std::f64::consts::PI;

/// Vectors shorter than this cannot define a direction.
const MIN_DIRECTION_NORM: f64 = 1e-10;

/// Counter-clockwise rotation by `angle` in the plane.
pub fn rotation_2d(angle: f64) -> DMatrix<f64> {
    let (s, c) = angle.sin_cos();
    DMatrix::from_row_slice(2, 2, &[c, -s, s, c])
}

/// Rotation by `angle` about the x axis.
pub fn rotation_about_x(angle: f64) -> DMatrix<f64> {
    let (s, c) = angle.sin_cos();
    DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c])
}

/// Rotation by `angle` about the z axis.
pub fn rotation_about_z(angle: f64) -> DMatrix<f64> {
    let (s, c) = angle.sin_cos();
    DMatrix::from_row_slice(3, 3, &[c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0])
}

/// Rotation mapping `v` onto the positive x axis in 2D.
///
/// Returns `None` when `v` is too short to define a direction.
///
/// # Examples
/// ```
/// use momentinvariants::rotation::align_2d;
/// let r = align_2d(&[0.0, 2.0]).unwrap();
/// let v = &r * nalgebra::DVector::from_vec(vec![0.0, 2.0]);
/// assert!((v[0] - 2.0).abs() < 1e-12 && v[1].abs() < 1e-12);
/// ```
pub fn align_2d(v: &[f64]) -> Option<DMatrix<f64>> {
    if v[0].hypot(v[1]) < MIN_DIRECTION_NORM {
        return None;
    }
    Some(rotation_2d(-v[1].atan2(v[0])))
}

fn to_vector3(v: &[f64]) -> Vector3<f64> {
    Vector3::new(v[0], v[1], v[2])
}

/// Rotation mapping `v` onto the positive x axis in 3D: the half turn about
/// the bisector `normalize(v̂ + x̂)`, i.e. `2nnᵀ − I`.
///
/// When `v̂` points along `−x` the bisector vanishes and the half turn about z
/// is used instead.
pub fn align_to_x(v: &[f64]) -> Option<DMatrix<f64>> {
    let v = to_vector3(v);
    let norm = v.norm();
    if norm < MIN_DIRECTION_NORM {
        return None;
    }
    let bisector = v / norm + Vector3::x();
    let length = bisector.norm();
    if length < MIN_DIRECTION_NORM {
        return Some(DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![-1.0, -1.0, 1.0])));
    }
    let n = bisector / length;
    let r = 2.0 * n * n.transpose() - nalgebra::Matrix3::identity();
    Some(DMatrix::from_iterator(3, 3, r.iter().copied()))
}

/// Rotation mapping `first` onto `+x` and then turning about x until `second`
/// lies in the x-y plane with a positive y component.
///
/// Returns `None` when either vector is too short or the two are parallel.
pub fn align_3d(first: &[f64], second: &[f64]) -> Option<DMatrix<f64>> {
    let align = align_to_x(first)?;
    let turned = &align * nalgebra::DVector::from_column_slice(&second[..3]);
    if turned[1].hypot(turned[2]) < MIN_DIRECTION_NORM {
        return None;
    }
    let roll = rotation_about_x(-turned[2].atan2(turned[1]));
    Some(roll * align)
}

/// `resolution` evenly spaced in-plane rotations, starting with the identity.
pub fn sample_rotations_2d(resolution: usize) -> Vec<DMatrix<f64>> {
    (0..resolution)
        .map(|i| rotation_2d(2.0 * PI * i as f64 / resolution as f64))
        .collect()
}

/// `resolution` evenly spaced rotations about the x axis, starting with the identity.
pub fn sample_rolls(resolution: usize) -> Vec<DMatrix<f64>> {
    (0..resolution)
        .map(|i| rotation_about_x(2.0 * PI * i as f64 / resolution as f64))
        .collect()
}

/// Discrete cover of all 3D rotations, `R = Rx(roll) · Rz(polar) · Rx(azimuth)`.
///
/// Azimuth and roll take `resolution` steps of `2π / resolution`, the polar
/// angle runs over `0..=π` in steps of the same size. At the poles the azimuth
/// and the roll describe the same freedom, so only azimuth 0 is kept there.
pub fn sample_rotations_3d(resolution: usize) -> Vec<DMatrix<f64>> {
    let step = 2.0 * PI / resolution as f64;
    let polar_steps = resolution / 2;
    let mut rotations = Vec::new();
    for j in 0..=polar_steps {
        let polar = (j as f64 * step).min(PI);
        let at_pole = j == 0 || (PI - polar).abs() < 1e-12;
        let azimuths = if at_pole { 1 } else { resolution };
        for i in 0..azimuths {
            let base = rotation_about_z(polar) * rotation_about_x(i as f64 * step);
            for k in 0..resolution {
                rotations.push(rotation_about_x(k as f64 * step) * &base);
            }
        }
    }
    rotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn apply(r: &DMatrix<f64>, v: &[f64]) -> DVector<f64> {
        r * DVector::from_column_slice(v)
    }

    fn assert_rotation(r: &DMatrix<f64>) {
        let identity = DMatrix::<f64>::identity(r.nrows(), r.ncols());
        assert!((r.transpose() * r - identity).norm() < 1e-12);
        assert!((r.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn alignment_to_x_in_3d() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let v: Vec<f64> = (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let r = align_to_x(&v).unwrap();
            assert_rotation(&r);
            let mapped = apply(&r, &v);
            let norm = DVector::from_column_slice(&v).norm();
            assert!((mapped[0] - norm).abs() < 1e-12);
            assert!(mapped[1].abs() < 1e-12 && mapped[2].abs() < 1e-12);
        }
    }

    #[test]
    fn antiparallel_vector_uses_half_turn_about_z() {
        let r = align_to_x(&[-3.0, 0.0, 0.0]).unwrap();
        assert_rotation(&r);
        assert!((apply(&r, &[-3.0, 0.0, 0.0])[0] - 3.0).abs() < 1e-12);
        assert!(align_to_x(&[0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn second_vector_lands_in_positive_half_plane() {
        let first = [0.3, -1.2, 0.5];
        let second = [1.0, 0.4, -0.7];
        let r = align_3d(&first, &second).unwrap();
        assert_rotation(&r);
        let a = apply(&r, &first);
        let b = apply(&r, &second);
        assert!(a[1].abs() < 1e-12 && a[2].abs() < 1e-12 && a[0] > 0.0);
        assert!(b[2].abs() < 1e-12 && b[1] > 0.0);
        assert!(align_3d(&first, &[0.6, -2.4, 1.0]).is_none());
    }

    #[test]
    fn sample_counts() {
        assert_eq!(sample_rotations_2d(10).len(), 10);
        assert_eq!(sample_rolls(6).len(), 6);
        // 2 poles with a single azimuth, 4 inner polar rings with 10 azimuths
        let rotations = sample_rotations_3d(10);
        assert_eq!(rotations.len(), (2 + 4 * 10) * 10);
        rotations.iter().for_each(assert_rotation);
    }
}
