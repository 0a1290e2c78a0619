//! Point-to-point messaging between the ranks of a distributed computation.
//!
//! [`ChannelTransport`] connects ranks running as threads of one process; a
//! multi-process transport implements the same [`Transport`] trait.

use crate::error::{MomentsError, Result};
use crate::uniform_grid::Bounds;
use std::sync::mpsc::{self, Receiver, Sender};

/// Messages of the boundary exchange, one variant per protocol phase.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeMessage {
    /// Bounds of the sender's grid piece.
    BoundsRequest { bounds: Bounds },
    /// Number of centers the sender is about to request for a radius.
    CenterCount { radius_index: usize, count: usize },
    /// Centers whose support reaches into the receiver's piece.
    CenterList { radius_index: usize, centers: Vec<[f64; 3]> },
    /// Partial moments of the requested centers, in request order, each in
    /// basis-function order.
    PartialMomentsReply { radius_index: usize, moments: Vec<Vec<f64>> },
}

impl ExchangeMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeMessage::BoundsRequest { .. } => "BoundsRequest",
            ExchangeMessage::CenterCount { .. } => "CenterCount",
            ExchangeMessage::CenterList { .. } => "CenterList",
            ExchangeMessage::PartialMomentsReply { .. } => "PartialMomentsReply",
        }
    }
}

/// Blocking point-to-point messaging; messages between two ranks arrive in
/// the order they were sent.
pub trait Transport {
    /// Index of this rank, `0..size()`.
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send(&self, to: usize, message: ExchangeMessage) -> Result<()>;

    /// Waits for the next message from `from`.
    fn receive(&self, from: usize) -> Result<ExchangeMessage>;
}

/// In-process transport: one channel per ordered pair of ranks.
pub struct ChannelTransport {
    rank: usize,
    size: usize,
    senders: Vec<Option<Sender<ExchangeMessage>>>,
    receivers: Vec<Option<Receiver<ExchangeMessage>>>,
}

impl ChannelTransport {
    /// Fully connected transports for `size` ranks; element `r` belongs to rank `r`.
    pub fn mesh(size: usize) -> Vec<ChannelTransport> {
        let mut transports: Vec<ChannelTransport> = (0..size)
            .map(|rank| ChannelTransport {
                rank,
                size,
                senders: (0..size).map(|_| None).collect(),
                receivers: (0..size).map(|_| None).collect(),
            })
            .collect();
        for from in 0..size {
            for to in 0..size {
                if from == to {
                    continue;
                }
                let (tx, rx) = mpsc::channel();
                transports[from].senders[to] = Some(tx);
                transports[to].receivers[from] = Some(rx);
            }
        }
        transports
    }
}

impl Transport for ChannelTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, to: usize, message: ExchangeMessage) -> Result<()> {
        let sender = self
            .senders
            .get(to)
            .and_then(Option::as_ref)
            .ok_or_else(|| MomentsError::Transport(format!("rank {} has no channel to rank {to}", self.rank)))?;
        sender
            .send(message)
            .map_err(|e| MomentsError::Transport(format!("rank {to} hung up before {}", e.0.kind())))
    }

    fn receive(&self, from: usize) -> Result<ExchangeMessage> {
        let receiver = self
            .receivers
            .get(from)
            .and_then(Option::as_ref)
            .ok_or_else(|| MomentsError::Transport(format!("rank {} has no channel from rank {from}", self.rank)))?;
        receiver
            .recv()
            .map_err(|_| MomentsError::Transport(format!("rank {from} hung up")))
    }
}
