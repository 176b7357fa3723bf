//! Master node: bootstraps the workers and collects their progress.
//!
//! # Bootstrap
//!
//! 1. Accept exactly `nodes` connections. Rank is accept order.
//! 2. Send METADATA to each worker in rank order. Rank `r` gets x offset
//!    `r * width`, the address of rank `r + 1` as its right neighbor, and the
//!    seed cell if `r == 0`.
//! 3. Send START to every worker.
//!
//! After that the master only counts FRAMEMARK and DONE. Workers never wait
//! on it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use petri_protocols::{ControlMessage, Error as ProtocolError, FrameChannel, Metadata};
use petri_transfer::bind_listener;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::ClusterConfig;
use crate::error::{Error, Result};

/// Master-side view of one worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Not yet accepted.
    Listening,
    /// Accepted, no metadata yet.
    Connected,
    /// Metadata sent.
    Initialized,
    /// START sent.
    Running,
    /// DONE received.
    Done,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening => write!(f, "Listening"),
            Self::Connected => write!(f, "Connected"),
            Self::Initialized => write!(f, "Initialized"),
            Self::Running => write!(f, "Running"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// Final bookkeeping for one worker.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub rank: usize,
    pub address: SocketAddr,
    pub frames: u32,
    pub done: u32,
    pub state: WorkerState,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub workers: Vec<WorkerSummary>,
}

impl ClusterReport {
    /// Every worker reported DONE.
    pub fn is_complete(&self) -> bool {
        self.workers.iter().all(|w| w.state == WorkerState::Done)
    }
}

struct WorkerConnection {
    rank: usize,
    address: SocketAddr,
    ip: Ipv4Addr,
    channel: FrameChannel,
    state: WorkerState,
}

impl WorkerConnection {
    fn advance(&mut self, next: WorkerState) {
        info!(rank = self.rank, from = %self.state, to = %next, "Worker state");
        self.state = next;
    }
}

/// The master.
pub struct Cluster {
    config: ClusterConfig,
    listener: TcpListener,
}

impl Cluster {
    /// Validate the config and start listening.
    pub async fn bind(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let listener = bind_listener(config.listen_addr)?;
        info!(addr = %config.listen_addr, nodes = config.nodes, "Master listening");
        Ok(Self { config, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Bootstrap every worker and wait for all of them to finish.
    pub async fn run(self) -> Result<ClusterReport> {
        let Self { config, listener } = self;

        let mut workers = Vec::with_capacity(config.nodes);
        for rank in 0..config.nodes {
            let (stream, address) = listener.accept().await?;
            stream.set_nodelay(true)?;
            let ip = match address.ip() {
                IpAddr::V4(ip) => ip,
                IpAddr::V6(_) => return Err(Error::UnsupportedAddress(address)),
            };
            info!(rank, %address, "Worker connected");
            workers.push(WorkerConnection {
                rank,
                address,
                ip,
                channel: FrameChannel::new(stream),
                state: WorkerState::Listening,
            });
            if let Some(worker) = workers.last_mut() {
                worker.advance(WorkerState::Connected);
            }
        }
        drop(listener);
        info!("All workers connected, initializing");

        let right_neighbors: Vec<Option<Ipv4Addr>> = (0..workers.len())
            .map(|rank| workers.get(rank + 1).map(|w| w.ip))
            .collect();
        for (worker, right_address) in workers.iter_mut().zip(right_neighbors) {
            let metadata = metadata_for(&config, worker.rank, right_address)?;
            worker
                .channel
                .send(ControlMessage::Metadata(metadata).to_frame()?)
                .await?;
            worker.advance(WorkerState::Initialized);
        }

        info!("All workers initialized, starting simulation");
        for worker in &mut workers {
            worker
                .channel
                .send(ControlMessage::Start.to_frame()?)
                .await?;
            worker.advance(WorkerState::Running);
        }

        let handles: Vec<_> = workers
            .into_iter()
            .map(|worker| tokio::spawn(track_worker(worker, config.frames as u32)))
            .collect();

        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.await?);
        }
        info!(
            done = summaries.iter().filter(|s| s.state == WorkerState::Done).count(),
            total = summaries.len(),
            "Simulation finished"
        );
        Ok(ClusterReport { workers: summaries })
    }
}

/// Metadata for the worker at `rank`.
pub fn metadata_for(
    config: &ClusterConfig,
    rank: usize,
    right_address: Option<Ipv4Addr>,
) -> Result<Metadata> {
    let x_offset = i32::try_from(rank)
        .ok()
        .and_then(|r| r.checked_mul(config.width))
        .ok_or_else(|| Error::Config(format!("x offset of rank {} overflows", rank)))?;
    let metadata = Metadata {
        width: config.width,
        height: config.height,
        seed: config.seed,
        seed_cell: if rank == 0 { config.seed_cell } else { None },
        right_address,
        x_offset,
        steps_per_frame: config.steps_per_frame,
        frames_to_simulate: config.frames,
        has_left: rank > 0,
        has_right: right_address.is_some(),
        balancing: config.balancing,
    };
    metadata.validate()?;
    Ok(metadata)
}

/// Count progress messages until DONE or disconnect.
async fn track_worker(mut worker: WorkerConnection, frames: u32) -> WorkerSummary {
    let mut frame_marks = 0u32;
    let mut done = 0u32;

    loop {
        let message = match worker.channel.recv().await {
            Ok(frame) => ControlMessage::from_frame(&frame),
            Err(e) => Err(e),
        };
        match message {
            Ok(ControlMessage::FrameMark) => {
                frame_marks += 1;
                info!(rank = worker.rank, frame = frame_marks, frames, "Frame mark");
            }
            Ok(ControlMessage::Done) => {
                done += 1;
                worker.advance(WorkerState::Done);
                break;
            }
            Ok(other) => {
                error!(rank = worker.rank, opcode = %other.opcode(), "Unexpected message from worker");
                break;
            }
            Err(ProtocolError::ChannelClosed) => {
                warn!(rank = worker.rank, "Worker disconnected before finishing");
                break;
            }
            Err(e) => {
                error!(rank = worker.rank, "Worker channel failed: {}", e);
                break;
            }
        }
    }

    if let Err(e) = worker.channel.close().await {
        tracing::debug!(rank = worker.rank, "Worker channel already closed: {}", e);
    }

    WorkerSummary {
        rank: worker.rank,
        address: worker.address,
        frames: frame_marks,
        done,
        state: worker.state,
    }
}
