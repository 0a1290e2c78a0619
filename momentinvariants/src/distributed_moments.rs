//! Moments of a field split into disjoint grid pieces, one piece per rank.
//!
//! Every rank integrates its own points. Points whose support ball leaves the
//! local piece send their center to every rank whose piece the ball reaches;
//! that rank integrates its own points inside the ball and returns the
//! partial sums, which are added to the local result.
//!
//! Phases, per request:
//!
//! 1. bounds of every piece are exchanged; their union is the global domain;
//! 2. per radius, each rank integrates its points and collects, per peer, the
//!    centers whose ball crosses its own bounds and intersects the peer's;
//! 3. per radius and pair of ranks `a < b`: `a` sends its centers and receives
//!    those of `b`, answers `b`'s request and receives the answer to its own,
//!    while `b` mirrors these steps;
//! 4. received partial sums are added into the owner's moment arrays.
//!
//! Points whose ball leaves the global domain are zero-filled.

use crate::config::MomentsConfig;
use crate::error::{MomentsError, Result};
use crate::moment_array_name::format_radius;
use crate::moment_integrator::{MomentField, MomentIntegrator};
use crate::point_locator::PointLocator;
use crate::transport::{ExchangeMessage, Transport};
use crate::uniform_grid::{Bounds, FieldView, UniformGrid};
use log::{debug, info};

pub struct DistributedMomentField<T: Transport> {
    config: MomentsConfig,
    transport: T,
}

/// Centers one rank asks a peer to integrate, with the local point ids they
/// belong to.
#[derive(Debug, Default)]
struct PeerRequest {
    point_ids: Vec<usize>,
    centers: Vec<[f64; 3]>,
}

impl<T: Transport> DistributedMomentField<T> {
    pub fn new(config: MomentsConfig, transport: T) -> Self {
        DistributedMomentField { config, transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Bounds of every rank's piece, indexed by rank.
    pub fn exchange_bounds(&self, local: Bounds) -> Result<Vec<Bounds>> {
        let me = self.transport.rank();
        let mut all = vec![local; self.transport.size()];
        for peer in (0..self.transport.size()).filter(|&p| p != me) {
            let request = ExchangeMessage::BoundsRequest { bounds: local };
            if me < peer {
                self.transport.send(peer, request)?;
                all[peer] = self.receive_bounds(peer)?;
            } else {
                all[peer] = self.receive_bounds(peer)?;
                self.transport.send(peer, request)?;
            }
        }
        Ok(all)
    }

    fn receive_bounds(&self, peer: usize) -> Result<Bounds> {
        match self.transport.receive(peer)? {
            ExchangeMessage::BoundsRequest { bounds } => Ok(bounds),
            other => Err(unexpected(peer, "BoundsRequest", &other)),
        }
    }

    /// Sends the centers of `request` to `peer` as a count followed by the list.
    fn send_centers(&self, peer: usize, radius_index: usize, request: &PeerRequest) -> Result<()> {
        self.transport.send(
            peer,
            ExchangeMessage::CenterCount {
                radius_index,
                count: request.centers.len(),
            },
        )?;
        self.transport.send(
            peer,
            ExchangeMessage::CenterList {
                radius_index,
                centers: request.centers.clone(),
            },
        )
    }

    fn receive_centers(&self, peer: usize, radius_index: usize) -> Result<Vec<[f64; 3]>> {
        let count = match self.transport.receive(peer)? {
            ExchangeMessage::CenterCount { radius_index: r, count } if r == radius_index => count,
            other => return Err(unexpected(peer, "CenterCount", &other)),
        };
        match self.transport.receive(peer)? {
            ExchangeMessage::CenterList { radius_index: r, centers } if r == radius_index && centers.len() == count => {
                Ok(centers)
            }
            other => Err(unexpected(peer, "CenterList", &other)),
        }
    }

    fn receive_reply(&self, peer: usize, radius_index: usize, expected: usize) -> Result<Vec<Vec<f64>>> {
        match self.transport.receive(peer)? {
            ExchangeMessage::PartialMomentsReply { radius_index: r, moments }
                if r == radius_index && moments.len() == expected =>
            {
                Ok(moments)
            }
            other => Err(unexpected(peer, "PartialMomentsReply", &other)),
        }
    }

    /// Computes the moments of the local piece, completed with the
    /// contributions of every other rank.
    ///
    /// Requires native-grid integration; all ranks must call this with the
    /// same configuration.
    pub fn compute(&self, local_grid: &UniformGrid) -> Result<MomentField> {
        self.config.validate()?;
        if self.config.number_of_integration_steps != 0 {
            return Err(MomentsError::InvalidConfig(
                "distributed moments require number_of_integration_steps = 0".into(),
            ));
        }
        let me = self.transport.rank();
        let field = FieldView::new(local_grid, self.config.name_of_point_data.as_deref())?;
        let integrator = MomentIntegrator::for_field(&field, &self.config);
        let dimension = field.dimension;

        let local_bounds = local_grid.bounds();
        let all_bounds = self.exchange_bounds(local_bounds)?;
        let global = all_bounds.iter().fold(local_bounds, |acc, b| acc.union(b));
        let global_min_extent = (0..dimension)
            .map(|a| global.max[a] - global.min[a])
            .fold(f64::INFINITY, f64::min);
        let radii = self.config.radii.resolve(global_min_extent);
        debug!("rank {me}: global bounds {:?} .. {:?}", global.min, global.max);

        let locator = PointLocator::new(local_grid);
        let basis = integrator.basis();
        let mut moments = MomentField::zeros(basis, radii.clone(), local_grid.number_of_points());

        for (radius_index, &radius) in radii.iter().enumerate() {
            info!("rank {me}: computing moments for radius {}", format_radius(radius));
            let mut requests: Vec<PeerRequest> = (0..self.transport.size()).map(|_| PeerRequest::default()).collect();
            let mut zero_filled = 0usize;
            let mut values = vec![0.0; basis.number_of_basis_functions()];

            for point_id in 0..local_grid.number_of_points() {
                let center = local_grid.point(point_id);
                if global.ball_crosses(&center, radius, dimension) {
                    zero_filled += 1;
                    continue;
                }
                values.iter_mut().for_each(|v| *v = 0.0);
                integrator.accumulate_orig_res(&field, &locator, &center, radius, &mut values);
                moments.set_point_vector(radius_index, point_id, &values);

                if local_bounds.ball_crosses(&center, radius, dimension) {
                    for (peer, bounds) in all_bounds.iter().enumerate() {
                        if peer != me && bounds.intersects_ball(&center, radius, dimension) {
                            requests[peer].point_ids.push(point_id);
                            requests[peer].centers.push(center);
                        }
                    }
                }
            }
            debug!("rank {me}: {zero_filled} points zero-filled, support outside the global domain");

            for peer in (0..self.transport.size()).filter(|&p| p != me) {
                let request = &requests[peer];
                let reply_to = |centers: &[[f64; 3]]| -> ExchangeMessage {
                    let partial = centers
                        .iter()
                        .map(|center| {
                            let mut sums = vec![0.0; basis.number_of_basis_functions()];
                            integrator.accumulate_orig_res(&field, &locator, center, radius, &mut sums);
                            sums
                        })
                        .collect();
                    ExchangeMessage::PartialMomentsReply {
                        radius_index,
                        moments: partial,
                    }
                };

                let received = if me < peer {
                    self.send_centers(peer, radius_index, request)?;
                    let theirs = self.receive_centers(peer, radius_index)?;
                    self.transport.send(peer, reply_to(&theirs))?;
                    self.receive_reply(peer, radius_index, request.centers.len())?
                } else {
                    let theirs = self.receive_centers(peer, radius_index)?;
                    self.send_centers(peer, radius_index, request)?;
                    let received = self.receive_reply(peer, radius_index, request.centers.len())?;
                    self.transport.send(peer, reply_to(&theirs))?;
                    received
                };
                debug!(
                    "rank {me}: exchanged {} boundary centers with rank {peer}",
                    request.centers.len()
                );
                for (&point_id, partial) in request.point_ids.iter().zip(&received) {
                    moments.add_point_vector(radius_index, point_id, partial);
                }
            }
        }
        Ok(moments)
    }
}

fn unexpected(peer: usize, expected: &str, found: &ExchangeMessage) -> MomentsError {
    MomentsError::Protocol(format!(
        "expected {expected} from rank {peer}, received {}",
        found.kind()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Radii;
    use crate::transport::ChannelTransport;
    use crate::uniform_grid::PointArray;
    use std::thread;

    fn field() -> UniformGrid {
        let grid = UniformGrid::new([12, 7, 1], [0.0; 3], [0.5, 0.5, 1.0]).unwrap();
        let values = (0..grid.number_of_points())
            .map(|id| {
                let p = grid.point(id);
                (p[0] * 1.3).sin() + p[1] * p[1] * 0.2
            })
            .collect();
        grid.with_point_array(PointArray::scalars("f", values)).unwrap()
    }

    #[test]
    fn two_pieces_match_the_serial_result() {
        let grid = field();
        let config = MomentsConfig {
            order: 2,
            radii: Radii::Absolute(vec![1.0]),
            ..MomentsConfig::default()
        };
        let serial = MomentIntegrator::compute(&grid, &config).unwrap();
        let pieces = [
            grid.sub_grid([0, 0, 0], [5, 6, 0]).unwrap(),
            grid.sub_grid([6, 0, 0], [11, 6, 0]).unwrap(),
        ];

        let handles: Vec<_> = ChannelTransport::mesh(2)
            .into_iter()
            .zip(pieces.clone())
            .map(|(transport, piece)| {
                let config = config.clone();
                thread::spawn(move || DistributedMomentField::new(config, transport).compute(&piece))
            })
            .collect();
        let results: Vec<MomentField> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();

        for (piece_index, (piece, result)) in pieces.iter().zip(&results).enumerate() {
            let offset = piece_index * 6;
            for point_id in 0..piece.number_of_points() {
                let [i, j, k] = piece.point_ijk(point_id);
                let serial_id = grid.point_id([i + offset, j, k]);
                let expected = serial.point_vector(0, serial_id);
                let found = result.point_vector(0, point_id);
                for (a, b) in expected.iter().zip(&found) {
                    assert!((a - b).abs() < 1e-12, "point {serial_id}: {a} != {b}");
                }
            }
        }
    }

    #[test]
    fn stencil_integration_is_rejected() {
        let mut mesh = ChannelTransport::mesh(1);
        let config = MomentsConfig {
            number_of_integration_steps: 5,
            ..MomentsConfig::default()
        };
        let distributed = DistributedMomentField::new(config, mesh.remove(0));
        assert!(matches!(distributed.compute(&field()), Err(MomentsError::InvalidConfig(_))));
    }
}
