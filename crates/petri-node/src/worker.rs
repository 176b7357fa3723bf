//! Worker node: owns one fragment and drives its frame loop.
//!
//! The worker connects to the master, waits for METADATA (builds the
//! fragment and its neighbor links) and START (runs every frame), then
//! reports DONE and disconnects.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use petri_automaton::{Fragment, HashWork, Population, StepCost, MAX_MASS};
use petri_protocols::{ControlMessage, FrameChannel, FrameSender, Metadata};
use petri_transfer::{dial_with_retry, BorderExchange, LinkPlan};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::render::{NullRenderer, Renderer};

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerReport {
    pub frames: u32,
    pub steps: u64,
    /// Final fragment width, halos included
    pub width: usize,
    pub x_offset: i64,
    pub simulation_ms: u128,
    pub network_ms: u128,
    pub population: Population,
}

/// A fragment with its links, ready to run.
struct Session {
    fragment: Fragment,
    exchange: BorderExchange,
    metadata: Metadata,
}

/// A worker node.
pub struct Worker {
    config: WorkerConfig,
    renderer: Box<dyn Renderer>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            renderer: Box::new(NullRenderer),
        }
    }

    /// Hand each frame to `renderer`.
    #[must_use]
    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    /// Connect to the master and serve it until the run is done.
    pub async fn run(mut self) -> Result<WorkerReport> {
        info!(master = %self.config.master_addr, "Connecting to master");
        let stream = dial_with_retry(
            self.config.master_addr,
            &self.config.retry_policy(),
            self.config.bind_ip,
        )
        .await?;
        let mut control = FrameChannel::new(stream);
        info!("Connected to master, waiting for metadata");

        let mut session = None;
        loop {
            let frame = control.recv().await?;
            match ControlMessage::from_frame(&frame)? {
                ControlMessage::Metadata(metadata) if session.is_none() => {
                    session = Some(Self::initialize(&self.config, metadata).await?);
                }
                ControlMessage::Start => {
                    let session = session.take().ok_or(Error::NotInitialized)?;
                    let report = self.simulate(session, control.sender()).await?;
                    if let Err(e) = control.close().await {
                        debug!("Master channel already closed: {}", e);
                    }
                    return Ok(report);
                }
                other => {
                    return Err(petri_protocols::Error::UnexpectedOpcode {
                        state: if session.is_some() {
                            "initialized".to_string()
                        } else {
                            "connected".to_string()
                        },
                        opcode: other.opcode().code(),
                    }
                    .into());
                }
            }
        }
    }

    async fn initialize(config: &WorkerConfig, metadata: Metadata) -> Result<Session> {
        info!(
            width = metadata.width,
            height = metadata.height,
            x_offset = metadata.x_offset,
            has_left = metadata.has_left,
            has_right = metadata.has_right,
            balancing = metadata.balancing,
            "Received metadata"
        );

        let height = metadata.height as usize;
        let mut fragment = Fragment::new(
            metadata.width as usize,
            height,
            i64::from(metadata.x_offset),
        )?;
        if let Some(difficulty) = config.step_cost_difficulty {
            let cost: Arc<dyn StepCost> = Arc::new(HashWork::new(difficulty));
            fragment = fragment.with_step_cost(cost);
        }

        let plan = LinkPlan {
            balancing: metadata.balancing,
            height,
            left_listen: metadata.has_left.then(|| config.neighbor_listen_addr()),
            right_dial: metadata
                .right_address
                .map(|ip| SocketAddr::new(IpAddr::V4(ip), config.neighbor_port)),
            retry: config.retry_policy(),
            bind_ip: config.bind_ip,
        };
        let exchange = BorderExchange::establish(&plan).await?;

        if let Some((x, y)) = metadata.seed_cell {
            fragment.set_cell(x as usize, y as usize, MAX_MASS)?;
            debug!(x, y, "Placed seed cell");
        }

        info!("Fragment initialized");
        Ok(Session {
            fragment,
            exchange,
            metadata,
        })
    }

    async fn simulate(&mut self, session: Session, master: FrameSender) -> Result<WorkerReport> {
        let mut master = Some(master);
        let Session {
            mut fragment,
            mut exchange,
            metadata,
        } = session;
        let frames = metadata.frames_to_simulate as u32;
        let steps_per_frame = metadata.steps_per_frame as u32;
        info!(frames, steps_per_frame, "Simulation started");

        let mut total_sim = Duration::ZERO;
        let mut total_net = Duration::ZERO;
        let mut steps = 0u64;

        for frame in 0..frames {
            let mut frame_sim = Duration::ZERO;
            let mut frame_net = Duration::ZERO;

            for step in 0..steps_per_frame {
                let started = Instant::now();
                fragment = tokio::task::spawn_blocking(move || {
                    fragment.step();
                    fragment
                })
                .await?;
                let step_time = started.elapsed();
                frame_sim += step_time;
                steps += 1;

                if frame + 1 == frames && step + 1 == steps_per_frame {
                    break;
                }

                let started = Instant::now();
                let step_nanos = u64::try_from(step_time.as_nanos()).unwrap_or(u64::MAX);
                let exchanged = exchange.exchange(fragment.grid(), step_nanos).await?;
                fragment.replace_grid(exchanged.grid, exchanged.x_shift)?;
                frame_net += started.elapsed();
            }

            total_sim += frame_sim;
            total_net += frame_net;
            notify_master(&mut master, ControlMessage::FrameMark).await?;
            self.renderer.render(frame, fragment.grid(), fragment.x_offset());
            info!(
                frame,
                frames,
                net_ms = frame_net.as_millis() as u64,
                sim_ms = frame_sim.as_millis() as u64,
                width = fragment.width(),
                x_offset = fragment.x_offset(),
                "Frame complete"
            );
        }

        info!(
            net_ms = total_net.as_millis() as u64,
            sim_ms = total_sim.as_millis() as u64,
            "Simulation done"
        );
        notify_master(&mut master, ControlMessage::Done).await?;
        if let Err(e) = exchange.close().await {
            warn!("Failed to close neighbor links: {}", e);
        }

        Ok(WorkerReport {
            frames,
            steps,
            width: fragment.width(),
            x_offset: fragment.x_offset(),
            simulation_ms: total_sim.as_millis(),
            network_ms: total_net.as_millis(),
            population: fragment.grid().population(),
        })
    }
}

/// Progress reports are bookkeeping only. Once the master is gone the
/// fragment keeps running for its neighbors' sake.
async fn notify_master(master: &mut Option<FrameSender>, message: ControlMessage) -> Result<()> {
    let Some(sender) = master.as_ref() else {
        return Ok(());
    };
    match sender.send(message.to_frame()?).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_disconnect() => {
            warn!(opcode = %message.opcode(), "Master disconnected, continuing without it");
            *master = None;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
