use momentinvariants::basis_indexing::BasisIndexing;
use momentinvariants::config::{MomentsConfig, Radii};
use momentinvariants::dominant_contraction::{calculate_dominant_contractions, reproduce_contractions};
use momentinvariants::moment_integrator::MomentIntegrator;
use momentinvariants::moment_normalizer::{FieldRotation, MomentNormalizer};
use momentinvariants::moment_set::MomentSet;
use momentinvariants::pattern_detector::PatternDetector;
use momentinvariants::rotation::{align_3d, rotation_2d, sample_rotations_3d};
use momentinvariants::translation_factor::TranslationFactorTable;
use momentinvariants::uniform_grid::{PointArray, UniformGrid};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Moments of weighted point masses: `Σ w · x_{i1} ... x_{ik}`.
fn point_mass_moments(dimension: usize, order: usize, masses: &[(Vec<f64>, f64)]) -> MomentSet {
    let basis = BasisIndexing::new(dimension, order, 0);
    let values: Vec<f64> = (0..basis.number_of_basis_functions())
        .map(|b| {
            let indices = basis.get_tensor_indices_from_field_index(b).unwrap();
            masses
                .iter()
                .map(|(p, w)| w * indices.iter().map(|&i| p[i]).product::<f64>())
                .sum()
        })
        .collect();
    MomentSet::from_basis_vector(&basis, &values).unwrap()
}

fn random_masses(rng: &mut StdRng, dimension: usize, count: usize) -> Vec<(Vec<f64>, f64)> {
    (0..count)
        .map(|_| {
            let p = (0..dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
            (p, rng.gen_range(0.1..1.0))
        })
        .collect()
}

fn rotate_masses(r: &DMatrix<f64>, masses: &[(Vec<f64>, f64)]) -> Vec<(Vec<f64>, f64)> {
    masses
        .iter()
        .map(|(p, w)| ((r * DVector::from_column_slice(p)).iter().copied().collect(), *w))
        .collect()
}

fn random_rotation_3d(rng: &mut StdRng) -> DMatrix<f64> {
    let a: Vec<f64> = (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let b: Vec<f64> = (0..3).map(|_| rng.gen_range(-1.0..1.0)).collect();
    align_3d(&a, &b).unwrap()
}

/// Normalizes both moment sets with `normalizer` and returns the distance of
/// the rotated copy, normalized as a field point, to the closest standard
/// position of the original.
fn normalized_distance(normalizer: &MomentNormalizer, original: &MomentSet, rotated: &MomentSet, radius: f64) -> f64 {
    let table = TranslationFactorTable::analytic(original.dimension(), original.order(), &[radius]).unwrap();
    let standard = normalizer.normalize_pattern(original, &table, 0, radius).unwrap();
    let field_point = normalizer
        .normalize_field_point(rotated, &table, 0, radius, &standard)
        .unwrap();
    standard
        .positions
        .iter()
        .map(|p| field_point.distance(p).unwrap())
        .fold(f64::INFINITY, f64::min)
}

#[test]
fn rotated_2d_pattern_matches_a_standard_position() {
    let mut rng = StdRng::seed_from_u64(11);
    let normalizer = MomentNormalizer::new(&MomentsConfig::default());
    for _ in 0..10 {
        let masses = random_masses(&mut rng, 2, 6);
        let r = rotation_2d(rng.gen_range(0.0..std::f64::consts::TAU));
        let original = point_mass_moments(2, 3, &masses);
        let rotated = point_mass_moments(2, 3, &rotate_masses(&r, &masses));
        assert!(normalized_distance(&normalizer, &original, &rotated, 1.0) < 1e-3);
    }
}

#[test]
fn rotated_3d_pattern_matches_a_standard_position() {
    let mut rng = StdRng::seed_from_u64(5);
    let normalizer = MomentNormalizer::new(&MomentsConfig::default());
    for _ in 0..10 {
        let masses = random_masses(&mut rng, 3, 8);
        let r = random_rotation_3d(&mut rng);
        let original = point_mass_moments(3, 2, &masses);
        let rotated = point_mass_moments(3, 2, &rotate_masses(&r, &masses));
        assert!(normalized_distance(&normalizer, &original, &rotated, 1.0) < 1e-3);
    }
}

#[test]
fn mirrored_pattern_needs_reflection_invariance() {
    let mut rng = StdRng::seed_from_u64(3);
    let masses = random_masses(&mut rng, 2, 5);
    let mirrored: Vec<(Vec<f64>, f64)> = masses.iter().map(|(p, w)| (vec![-p[0], p[1]], *w)).collect();
    let original = point_mass_moments(2, 3, &masses);
    let mirror_image = point_mass_moments(2, 3, &mirrored);

    let config = MomentsConfig {
        is_reflection: true,
        ..MomentsConfig::default()
    };
    let with_reflection = MomentNormalizer::new(&config);
    assert!(normalized_distance(&with_reflection, &original, &mirror_image, 1.0) < 1e-3);

    let without_reflection = MomentNormalizer::new(&MomentsConfig::default());
    assert!(normalized_distance(&without_reflection, &original, &mirror_image, 1.0) > 1e-3);
}

#[test]
fn mirrored_3d_pattern_needs_reflection_invariance() {
    let mut rng = StdRng::seed_from_u64(29);
    let masses = vec![
        (vec![0.6, 0.1, 0.0], 1.0),
        (vec![-0.3, 0.5, 0.2], 0.7),
        (vec![0.1, -0.4, 0.6], 0.5),
        (vec![-0.2, -0.1, -0.5], 0.9),
    ];
    let mirrored: Vec<(Vec<f64>, f64)> = masses.iter().map(|(p, w)| (vec![p[0], p[1], -p[2]], *w)).collect();
    let r = random_rotation_3d(&mut rng);
    let original = point_mass_moments(3, 2, &masses);
    let mirror_image = point_mass_moments(3, 2, &rotate_masses(&r, &mirrored));

    let config = MomentsConfig {
        is_reflection: true,
        ..MomentsConfig::default()
    };
    let with_reflection = MomentNormalizer::new(&config);
    assert!(normalized_distance(&with_reflection, &original, &mirror_image, 1.0) < 1e-3);

    let without_reflection = MomentNormalizer::new(&MomentsConfig::default());
    assert!(normalized_distance(&without_reflection, &original, &mirror_image, 1.0) > 1e-3);
}

#[test]
fn axial_3d_pattern_sweeps_the_roll() {
    let mut rng = StdRng::seed_from_u64(17);
    let normalizer = MomentNormalizer::new(&MomentsConfig::default());
    let masses = vec![
        (vec![0.5, 0.0, 0.0], 1.0),
        (vec![-0.2, 0.0, 0.0], 0.6),
        (vec![0.8, 0.0, 0.0], 0.3),
    ];
    let original = point_mass_moments(3, 2, &masses);
    let table = TranslationFactorTable::analytic(3, 2, &[1.0]).unwrap();
    let standard = normalizer.normalize_pattern(&original, &table, 0, 1.0).unwrap();
    match &standard.field_rotation {
        FieldRotation::Dominant(contraction) => assert!(contraction.second.is_none()),
        FieldRotation::Identity => panic!("axial pattern has a dominant direction"),
    }
    assert_eq!(standard.positions.len() % normalizer.angle_resolution, 0);

    for _ in 0..5 {
        let r = random_rotation_3d(&mut rng);
        let rotated = point_mass_moments(3, 2, &rotate_masses(&r, &masses));
        assert!(normalized_distance(&normalizer, &original, &rotated, 1.0) <= 1e-10);
    }
}

#[test]
fn dominant_contractions_are_reproducible() {
    let mut rng = StdRng::seed_from_u64(23);
    for dimension in [2, 3] {
        let moments = point_mass_moments(dimension, 3, &random_masses(&mut rng, dimension, 7));
        let found = calculate_dominant_contractions(&moments, 1e-2).unwrap();
        assert!(!found.is_empty());
        for alternative in &found {
            let reproduced = reproduce_contractions(&moments, alternative).unwrap();
            assert!(reproduced.first.squared_distance(&alternative.first).sqrt() < 1e-3);
        }
    }
}

#[test]
fn degenerate_pattern_falls_back() {
    let grid = UniformGrid::new([7, 7, 1], [0.0; 3], [1.0; 3])
        .unwrap()
        .with_point_array(PointArray::scalars("zero", vec![0.0; 49]))
        .unwrap();
    let detector = PatternDetector::new(MomentsConfig::default());
    let (moments, radius, table) = detector.pattern_moments(&grid).unwrap();
    assert_eq!(moments.norm(), 0.0);
    assert!(calculate_dominant_contractions(&moments, 1e-2).unwrap().is_empty());

    let normalizer = detector.normalizer();
    let translated = normalizer.normalize_t(&moments, &table, 0).unwrap();
    let scaled = normalizer.normalize_s(&translated, radius);
    assert_eq!(scaled, moments);
    let standard = normalizer.standard_positions(&scaled).unwrap();
    assert_eq!(standard.positions.len(), normalizer.angle_resolution);
}

#[test]
fn degenerate_3d_pattern_samples_mirrored_orientations() {
    let grid = UniformGrid::new([5, 5, 5], [0.0; 3], [1.0; 3])
        .unwrap()
        .with_point_array(PointArray::scalars("zero", vec![0.0; 125]))
        .unwrap();
    let config = MomentsConfig {
        is_reflection: true,
        ..MomentsConfig::default()
    };
    let detector = PatternDetector::new(config);
    let (moments, radius, table) = detector.pattern_moments(&grid).unwrap();
    let normalizer = detector.normalizer();
    let standard = normalizer.normalize_pattern(&moments, &table, 0, radius).unwrap();
    assert_eq!(standard.field_rotation, FieldRotation::Identity);
    let samples = sample_rotations_3d(normalizer.angle_resolution).len();
    assert_eq!(standard.positions.len(), 2 * samples);
}

fn translation_invariance_with(steps: usize) {
    let grid = UniformGrid::new([15, 15, 1], [0.0; 3], [0.25, 0.25, 1.0]).unwrap();
    let values: Vec<f64> = (0..grid.number_of_points())
        .map(|id| {
            let p = grid.point(id);
            (p[0] * 2.0).cos() * p[1] + 0.3 * p[0] * p[0]
        })
        .collect();
    let shifted: Vec<f64> = values.iter().map(|v| v + 4.0).collect();
    let field = grid.clone().with_point_array(PointArray::scalars("f", values)).unwrap();
    let field_shifted = grid.with_point_array(PointArray::scalars("f", shifted)).unwrap();

    let config = MomentsConfig {
        order: 3,
        number_of_integration_steps: steps,
        radii: Radii::Absolute(vec![1.0]),
        ..MomentsConfig::default()
    };
    let moments = MomentIntegrator::compute(&field, &config).unwrap();
    let moments_shifted = MomentIntegrator::compute(&field_shifted, &config).unwrap();
    let integrator = MomentIntegrator::new(2, config.order, 0, steps);
    let table = integrator.translation_factor_table(&field, &[1.0]).unwrap();
    let normalizer = MomentNormalizer::new(&config);

    let center = field.point_id([7, 7, 0]);
    let a = normalizer
        .normalize_t(&moments.moment_set(0, center).unwrap(), &table, 0)
        .unwrap();
    let b = normalizer
        .normalize_t(&moments_shifted.moment_set(0, center).unwrap(), &table, 0)
        .unwrap();
    assert!(a.distance(&b).unwrap() < 1e-9);
    assert!(moments.moment_set(0, center).unwrap().distance(&moments_shifted.moment_set(0, center).unwrap()).unwrap() > 1.0);
}

#[test]
fn additive_constant_is_removed_on_native_grid() {
    translation_invariance_with(0);
}

#[test]
fn additive_constant_is_removed_on_stencil() {
    translation_invariance_with(9);
}

#[test]
fn quarter_turned_pattern_is_found() {
    let field = UniformGrid::new([25, 25, 1], [0.0; 3], [0.5; 3]).unwrap();
    let values: Vec<f64> = (0..field.number_of_points())
        .map(|id| {
            let p = field.point(id);
            let (x, y) = (p[0] - 6.0, p[1] - 6.0);
            (-(x * x + 3.0 * y * y)).exp() + 0.5 * (-((x - 1.0).powi(2) + (y - 0.5).powi(2)) * 4.0).exp()
        })
        .collect();
    let field = field.with_point_array(PointArray::scalars("f", values)).unwrap();

    // pattern: the 9x9 block around (6, 6) turned by a quarter
    let block = field.sub_grid([8, 8, 0], [16, 16, 0]).unwrap();
    let source = &block.point_data()[0];
    let mut turned = vec![0.0; 81];
    for j in 0..9 {
        for i in 0..9 {
            turned[(8 - j) + 9 * i] = source.values[i + 9 * j];
        }
    }
    let pattern = UniformGrid::new([9, 9, 1], [0.0; 3], [0.5; 3])
        .unwrap()
        .with_point_array(PointArray::scalars("f", turned))
        .unwrap();

    let config = MomentsConfig {
        radii: Radii::Absolute(vec![2.0]),
        order: 3,
        ..MomentsConfig::default()
    };
    let result = PatternDetector::new(config).detect(&pattern, &field).unwrap();
    let similarity = &result.similarities[0].values;
    let best = (0..similarity.len())
        .max_by(|&a, &b| similarity[a].total_cmp(&similarity[b]))
        .unwrap();
    assert_eq!(best, field.point_id([12, 12, 0]));
    assert!(similarity[best] > 1e3);
}
