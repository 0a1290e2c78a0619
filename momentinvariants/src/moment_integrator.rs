use crate::basis_indexing::BasisIndexing;
use crate::config::MomentsConfig;
use crate::error::{MomentsError, Result};
use crate::moment_array_name::{format_radius, infer_field_rank, MomentArrayKey};
use crate::moment_set::MomentSet;
use crate::point_locator::PointLocator;
use crate::stencil::{CenteredStencil, Stencil};
use crate::translation_factor::{offsets_within_radius, TranslationFactorTable};
use crate::uniform_grid::{field_component, FieldView, PointArray, UniformGrid, EDGE_TOLERANCE};
use log::{debug, info};

/// Moment and field indices of one basis function, split once up front.
#[derive(Debug, Clone)]
struct BasisComponent {
    moment_indices: Vec<usize>,
    field_indices: Vec<usize>,
}

/// Integrates field values against the monomial basis `x^p y^q z^r` over a
/// ball, producing the moments of every order up to `order`.
///
/// With `number_of_integration_steps == 0` the integral runs over the grid's
/// own points inside the ball; otherwise the field is resampled on a
/// [`Stencil`] around every query point.
#[derive(Debug, Clone)]
pub struct MomentIntegrator {
    basis: BasisIndexing,
    number_of_integration_steps: usize,
    components: Vec<BasisComponent>,
}

impl MomentIntegrator {
    pub fn new(dimension: usize, order: usize, field_rank: usize, number_of_integration_steps: usize) -> Self {
        let basis = BasisIndexing::new(dimension, order, field_rank);
        let components = (0..basis.number_of_basis_functions())
            .filter_map(|i| basis.get_tensor_indices_from_field_index(i).ok())
            .map(|indices| {
                let split = indices.len() - field_rank;
                BasisComponent {
                    moment_indices: indices[..split].to_vec(),
                    field_indices: indices[split..].to_vec(),
                }
            })
            .collect();
        MomentIntegrator {
            basis,
            number_of_integration_steps,
            components,
        }
    }

    /// Integrator matching a field and the configured order and integration mode.
    pub fn for_field(field: &FieldView, config: &MomentsConfig) -> Self {
        Self::new(field.dimension, config.order, field.field_rank, config.number_of_integration_steps)
    }

    pub fn basis(&self) -> BasisIndexing {
        self.basis
    }

    pub fn number_of_integration_steps(&self) -> usize {
        self.number_of_integration_steps
    }

    pub fn uses_native_grid(&self) -> bool {
        self.number_of_integration_steps == 0
    }

    /// Adds `weight · Π(offset[moment index]) · field component` to every basis
    /// function of `out`.
    fn accumulate(&self, out: &mut [f64], offset: &[f64; 3], tuple: &[f64], weight: f64) {
        let dimension = self.basis.dimension();
        for (value, component) in out.iter_mut().zip(&self.components) {
            let monomial: f64 = component.moment_indices.iter().map(|&i| offset[i]).product();
            *value += weight * monomial * field_component(tuple, dimension, &component.field_indices);
        }
    }

    /// Moments from a centered stencil: every lattice node within `radius` of
    /// the center contributes.
    pub fn all_moments(&self, centered: &CenteredStencil, radius: f64) -> Result<MomentSet> {
        let mut values = vec![0.0; self.basis.number_of_basis_functions()];
        let weight = centered.stencil.cell_volume();
        let limit = radius * radius + EDGE_TOLERANCE;
        for (offset, tuple) in centered.stencil.offsets().iter().zip(&centered.values) {
            if offset.iter().map(|v| v * v).sum::<f64>() <= limit {
                self.accumulate(&mut values, offset, tuple, weight);
            }
        }
        MomentSet::from_basis_vector(&self.basis, &values)
    }

    /// Adds the contribution of the grid points of `field` inside the ball to
    /// `out` (basis-function order). Points of other grid pieces are not seen,
    /// which makes this the partial sum of one domain piece.
    pub fn accumulate_orig_res(
        &self,
        field: &FieldView,
        locator: &PointLocator,
        center: &[f64; 3],
        radius: f64,
        out: &mut [f64],
    ) {
        let weight = field.grid.cell_volume();
        for id in locator.find_points_within_radius(center, radius) {
            let point = field.grid.point(id);
            let offset = [0, 1, 2].map(|a| point[a] - center[a]);
            self.accumulate(out, &offset, field.array.tuple(id), weight);
        }
    }

    /// Exact moments over the grid's own points inside the ball.
    pub fn all_moments_orig_res(
        &self,
        field: &FieldView,
        locator: &PointLocator,
        center: &[f64; 3],
        radius: f64,
    ) -> Result<MomentSet> {
        let mut values = vec![0.0; self.basis.number_of_basis_functions()];
        self.accumulate_orig_res(field, locator, center, radius, &mut values);
        MomentSet::from_basis_vector(&self.basis, &values)
    }

    /// Moments at an arbitrary point, `None` when the support leaves the grid.
    ///
    /// `locator` is used for native-grid integration, `stencil` (built for
    /// `radius`) for resampled integration.
    pub fn moments_at(
        &self,
        field: &FieldView,
        locator: &PointLocator,
        stencil: Option<&Stencil>,
        center: &[f64; 3],
        radius: f64,
    ) -> Result<Option<MomentSet>> {
        match stencil {
            Some(stencil) if !self.uses_native_grid() => match stencil.center(field, center) {
                Some(centered) => self.all_moments(&centered, radius).map(Some),
                None => Ok(None),
            },
            _ => {
                if field.grid.is_close_to_edge(center, radius) {
                    Ok(None)
                } else {
                    self.all_moments_orig_res(field, locator, center, radius).map(Some)
                }
            }
        }
    }

    /// Sample offsets and cell volume of the quadrature used at `center`.
    pub fn quadrature_at(
        &self,
        field: &FieldView,
        locator: &PointLocator,
        center: &[f64; 3],
        radius: f64,
    ) -> Result<(Vec<[f64; 3]>, f64)> {
        if self.uses_native_grid() {
            let offsets = locator
                .find_points_within_radius(center, radius)
                .into_iter()
                .map(|id| {
                    let p = field.grid.point(id);
                    [0, 1, 2].map(|a| p[a] - center[a])
                })
                .collect();
            Ok((offsets, field.grid.cell_volume()))
        } else {
            let stencil = Stencil::build(self.basis.dimension(), radius, self.number_of_integration_steps)?;
            Ok((offsets_within_radius(stencil.offsets(), radius), stencil.cell_volume()))
        }
    }

    /// Sample offsets and cell volume of the quadrature used at any grid point
    /// of `grid`: the lattice of grid spacings inside the ball for native
    /// integration, the stencil nodes inside the ball otherwise.
    pub fn grid_point_quadrature(&self, grid: &UniformGrid, radius: f64) -> Result<(Vec<[f64; 3]>, f64)> {
        if self.uses_native_grid() {
            let spacing = grid.spacing();
            let dimension = self.basis.dimension();
            let reach = [0, 1, 2].map(|a| {
                if a < dimension {
                    (radius / spacing[a]).floor() as i64 + 1
                } else {
                    0
                }
            });
            let mut lattice = Vec::new();
            for k in -reach[2]..=reach[2] {
                for j in -reach[1]..=reach[1] {
                    for i in -reach[0]..=reach[0] {
                        lattice.push([
                            i as f64 * spacing[0],
                            j as f64 * spacing[1],
                            k as f64 * spacing[2],
                        ]);
                    }
                }
            }
            Ok((offsets_within_radius(&lattice, radius), grid.cell_volume()))
        } else {
            let stencil = Stencil::build(self.basis.dimension(), radius, self.number_of_integration_steps)?;
            Ok((offsets_within_radius(stencil.offsets(), radius), stencil.cell_volume()))
        }
    }

    /// Translation factors matching the quadrature at grid points, per radius.
    pub fn translation_factor_table(&self, grid: &UniformGrid, radii: &[f64]) -> Result<TranslationFactorTable> {
        let samples = radii
            .iter()
            .map(|&r| self.grid_point_quadrature(grid, r))
            .collect::<Result<Vec<_>>>()?;
        Ok(TranslationFactorTable::sampled(
            self.basis.dimension(),
            self.basis.order(),
            &samples,
        ))
    }

    /// Computes the moments at every grid point for every configured radius.
    ///
    /// Points whose support leaves the grid are zero-filled.
    pub fn compute(grid: &UniformGrid, config: &MomentsConfig) -> Result<MomentField> {
        config.validate()?;
        let field = FieldView::new(grid, config.name_of_point_data.as_deref())?;
        let integrator = MomentIntegrator::for_field(&field, config);
        let radii = config.radii.resolve(grid.min_extent());
        if let Some(&bad) = radii.iter().find(|r| !(**r > 0.0)) {
            return Err(MomentsError::InvalidRadius(bad));
        }
        let locator = PointLocator::new(grid);
        let mut moments = MomentField::zeros(integrator.basis(), radii.clone(), grid.number_of_points());

        for (radius_index, &radius) in radii.iter().enumerate() {
            info!(
                "computing {} moments for radius {} on {} points",
                integrator.basis().number_of_basis_functions(),
                format_radius(radius),
                grid.number_of_points()
            );
            let stencil = if integrator.uses_native_grid() {
                None
            } else {
                Some(Stencil::build(field.dimension, radius, integrator.number_of_integration_steps)?)
            };
            let mut zero_filled = 0usize;
            for point_id in 0..grid.number_of_points() {
                let center = grid.point(point_id);
                match integrator.moments_at(&field, &locator, stencil.as_ref(), &center, radius)? {
                    Some(set) => moments.set_point_vector(radius_index, point_id, &set.to_basis_vector()),
                    None => zero_filled += 1,
                }
            }
            debug!(
                "radius {}: {zero_filled} points zero-filled, support outside the grid",
                format_radius(radius)
            );
        }
        Ok(moments)
    }
}

/// Moments of every grid point for every radius, stored as one scalar array
/// per `(radius index, basis function index)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentField {
    basis: BasisIndexing,
    radii: Vec<f64>,
    number_of_points: usize,
    arrays: Vec<Vec<f64>>,
}

impl MomentField {
    pub fn zeros(basis: BasisIndexing, radii: Vec<f64>, number_of_points: usize) -> Self {
        let count = radii.len() * basis.number_of_basis_functions();
        MomentField {
            basis,
            radii,
            number_of_points,
            arrays: vec![vec![0.0; number_of_points]; count],
        }
    }

    pub fn basis(&self) -> BasisIndexing {
        self.basis
    }

    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    pub fn number_of_points(&self) -> usize {
        self.number_of_points
    }

    pub fn number_of_arrays(&self) -> usize {
        self.arrays.len()
    }

    /// Position of the array for `(radius_index, basis_index)`.
    pub fn array_index(&self, radius_index: usize, basis_index: usize) -> usize {
        radius_index * self.basis.number_of_basis_functions() + basis_index
    }

    pub fn array(&self, radius_index: usize, basis_index: usize) -> &[f64] {
        &self.arrays[self.array_index(radius_index, basis_index)]
    }

    /// Moments of one point in basis-function order.
    pub fn point_vector(&self, radius_index: usize, point_id: usize) -> Vec<f64> {
        (0..self.basis.number_of_basis_functions())
            .map(|b| self.arrays[self.array_index(radius_index, b)][point_id])
            .collect()
    }

    pub fn set_point_vector(&mut self, radius_index: usize, point_id: usize, values: &[f64]) {
        for (b, &value) in values.iter().enumerate() {
            let index = self.array_index(radius_index, b);
            self.arrays[index][point_id] = value;
        }
    }

    pub fn add_point_vector(&mut self, radius_index: usize, point_id: usize, values: &[f64]) {
        for (b, &value) in values.iter().enumerate() {
            let index = self.array_index(radius_index, b);
            self.arrays[index][point_id] += value;
        }
    }

    pub fn moment_set(&self, radius_index: usize, point_id: usize) -> Result<MomentSet> {
        MomentSet::from_basis_vector(&self.basis, &self.point_vector(radius_index, point_id))
    }

    /// Output arrays named `radius<R>index<digits>`, radius-major, each in
    /// basis-function order.
    pub fn to_named_arrays(&self) -> Result<Vec<PointArray>> {
        let mut result = Vec::with_capacity(self.arrays.len());
        for (radius_index, &radius) in self.radii.iter().enumerate() {
            for b in 0..self.basis.number_of_basis_functions() {
                let indices = self.basis.get_tensor_indices_from_field_index(b)?;
                let name = MomentArrayKey::new(radius, indices).to_name();
                result.push(PointArray::scalars(name, self.array(radius_index, b).to_vec()));
            }
        }
        Ok(result)
    }

    /// Rebuilds a moment field from arrays named in the `radius<R>index<digits>`
    /// format. Arrays whose names do not parse are ignored; every basis
    /// function must be present for every radius found.
    pub fn from_named_arrays(arrays: &[PointArray], dimension: usize) -> Result<MomentField> {
        let parsed: Vec<(MomentArrayKey, &PointArray)> = arrays
            .iter()
            .filter_map(|a| MomentArrayKey::parse(&a.name).ok().map(|k| (k, a)))
            .collect();
        let keys: Vec<MomentArrayKey> = parsed.iter().map(|(k, _)| k.clone()).collect();
        let field_rank = infer_field_rank(&keys)
            .ok_or_else(|| MomentsError::MissingPointData("no moment arrays".into()))?;
        let max_len = keys.iter().map(|k| k.indices.len()).max().unwrap_or(field_rank);
        let basis = BasisIndexing::new(dimension, max_len - field_rank, field_rank);

        let mut radii_text: Vec<String> = Vec::new();
        let mut radii: Vec<f64> = Vec::new();
        for key in &keys {
            let text = format_radius(key.radius);
            match radii_text.iter().position(|t| *t == text) {
                Some(i) if radii[i] != key.radius => {
                    return Err(MomentsError::Mismatch(format!(
                        "radii {} and {} share the array name radius{text}",
                        radii[i], key.radius
                    )));
                }
                Some(_) => {}
                None => {
                    radii_text.push(text);
                    radii.push(key.radius);
                }
            }
        }

        let number_of_points = parsed[0].1.values.len();
        let mut field = MomentField::zeros(basis, radii, number_of_points);
        let mut seen = vec![false; field.arrays.len()];
        for (key, array) in &parsed {
            if array.values.len() != number_of_points || array.components != 1 {
                return Err(MomentsError::InvalidGrid(format!(
                    "moment array {} does not hold one value per point",
                    array.name
                )));
            }
            let text = format_radius(key.radius);
            let radius_index = radii_text
                .iter()
                .position(|t| *t == text)
                .ok_or_else(|| MomentsError::Mismatch(format!("moment array {} has an unknown radius", array.name)))?;
            let b = basis.get_field_index_from_tensor_indices(&key.indices)?;
            let index = field.array_index(radius_index, b);
            field.arrays[index].copy_from_slice(&array.values);
            seen[index] = true;
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(MomentsError::Mismatch(format!(
                "moment array {missing} of {} missing",
                seen.len()
            )));
        }
        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Radii;

    fn constant_grid(value: f64) -> UniformGrid {
        UniformGrid::new([9, 9, 1], [0.0; 3], [0.5, 0.5, 1.0])
            .unwrap()
            .with_point_array(PointArray::scalars("f", vec![value; 81]))
            .unwrap()
    }

    #[test]
    fn native_moments_of_a_constant_field() {
        let grid = constant_grid(2.0);
        let field = FieldView::new(&grid, None).unwrap();
        let integrator = MomentIntegrator::new(2, 2, 0, 0);
        let locator = PointLocator::new(&grid);
        let center = grid.center();
        let moments = integrator
            .all_moments_orig_res(&field, &locator, &center, 1.0)
            .unwrap();
        // 13 points within radius 1 on a 0.5 lattice, each of area 0.25
        assert!((moments.tensor(0).get(0) - 2.0 * 13.0 * 0.25).abs() < 1e-12);
        // symmetric support: first moments vanish
        assert!(moments.tensor(1).norm() < 1e-12);
        let xx = moments.tensor(2).get_by_indices(&[0, 0]);
        let yy = moments.tensor(2).get_by_indices(&[1, 1]);
        assert!((xx - yy).abs() < 1e-12);
    }

    #[test]
    fn first_moment_of_a_ramp_points_uphill() {
        let grid = UniformGrid::new([9, 9, 1], [0.0; 3], [0.5, 0.5, 1.0]).unwrap();
        let values = (0..81).map(|id| grid.point(id)[0]).collect();
        let grid = grid.with_point_array(PointArray::scalars("ramp", values)).unwrap();
        let field = FieldView::new(&grid, Some("ramp")).unwrap();
        let integrator = MomentIntegrator::new(2, 1, 0, 0);
        let locator = PointLocator::new(&grid);
        let moments = integrator
            .all_moments_orig_res(&field, &locator, &grid.center(), 1.5)
            .unwrap();
        assert!(moments.tensor(1).get(0) > 0.0);
        assert!(moments.tensor(1).get(1).abs() < 1e-12);
    }

    #[test]
    fn stencil_moments_approximate_native_ones() {
        let grid = constant_grid(1.0);
        let field = FieldView::new(&grid, None).unwrap();
        let integrator = MomentIntegrator::new(2, 0, 0, 41);
        let stencil = Stencil::build(2, 1.0, 41).unwrap();
        let centered = stencil.center(&field, &grid.center()).unwrap();
        let area = integrator.all_moments(&centered, 1.0).unwrap().tensor(0).get(0);
        assert!((area - std::f64::consts::PI).abs() < 0.05);
    }

    #[test]
    fn edge_points_are_zero_filled() {
        let grid = constant_grid(1.0);
        let config = MomentsConfig {
            order: 1,
            radii: Radii::Absolute(vec![1.0]),
            ..MomentsConfig::default()
        };
        let moments = MomentIntegrator::compute(&grid, &config).unwrap();
        assert_eq!(moments.number_of_arrays(), 3);
        let corner = grid.point_id([0, 0, 0]);
        let inner = grid.point_id([4, 4, 0]);
        assert_eq!(moments.point_vector(0, corner), vec![0.0; 3]);
        assert!(moments.point_vector(0, inner)[0] > 0.0);
    }

    #[test]
    fn named_arrays_round_trip() {
        let grid = constant_grid(1.0);
        let config = MomentsConfig {
            order: 2,
            radii: Radii::Absolute(vec![1.0, 1.5]),
            ..MomentsConfig::default()
        };
        let moments = MomentIntegrator::compute(&grid, &config).unwrap();
        let arrays = moments.to_named_arrays().unwrap();
        assert_eq!(arrays[0].name, "radius1.000000index");
        assert_eq!(arrays[7].name, "radius1.500000index");
        let rebuilt = MomentField::from_named_arrays(&arrays, 2).unwrap();
        assert_eq!(rebuilt, moments);
        assert!(MomentField::from_named_arrays(&arrays[1..], 2).is_err());
    }

    #[test]
    fn radii_printed_alike_are_rejected() {
        let grid = constant_grid(1.0);
        let config = MomentsConfig {
            order: 1,
            radii: Radii::Absolute(vec![1.0]),
            ..MomentsConfig::default()
        };
        let mut arrays = MomentIntegrator::compute(&grid, &config).unwrap().to_named_arrays().unwrap();
        let close: Vec<PointArray> = arrays
            .iter()
            .map(|a| PointArray::scalars(a.name.replace("radius1.000000", "radius1.0000001"), a.values.clone()))
            .collect();
        arrays.extend(close);
        assert!(matches!(
            MomentField::from_named_arrays(&arrays, 2),
            Err(MomentsError::Mismatch(_))
        ));
    }

    #[test]
    fn sampled_translation_factor_matches_constant_field() {
        let grid = constant_grid(1.0);
        let field = FieldView::new(&grid, None).unwrap();
        let integrator = MomentIntegrator::new(2, 2, 0, 0);
        let table = integrator.translation_factor_table(&grid, &[1.0]).unwrap();
        let locator = PointLocator::new(&grid);
        let moments = integrator
            .all_moments_orig_res(&field, &locator, &grid.center(), 1.0)
            .unwrap();
        assert!((table.get(0, [0, 0, 0]).unwrap() - moments.tensor(0).get(0)).abs() < 1e-12);
        assert!((table.get(0, [2, 0, 0]).unwrap() - moments.tensor(2).get(0)).abs() < 1e-12);
    }
}
