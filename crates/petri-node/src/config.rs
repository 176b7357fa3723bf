//! Master and worker configuration.
//!
//! Both configs load from `PETRI_*` environment variables with defaults, and
//! also deserialize from JSON for tests and tooling.

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use petri_protocols::{DEFAULT_PORT, MIN_BALANCING_WIDTH};
use petri_transfer::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Master-side run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Where workers connect
    pub listen_addr: SocketAddr,

    /// Workers to wait for before starting
    pub nodes: usize,

    /// Initial width of every fragment
    pub width: i32,

    /// Height of the whole grid
    pub height: i32,

    /// Food field seed
    pub seed: i32,

    pub steps_per_frame: i32,

    pub frames: i32,

    /// Use the balancing border exchange
    pub balancing: bool,

    /// Initial organism on rank 0, in its local coordinates
    pub seed_cell: Option<(i32, i32)>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            nodes: 3,
            width: 500,
            height: 500,
            seed: 1,
            steps_per_frame: 50,
            frames: 500,
            balancing: false,
            seed_cell: Some((250, 100)),
        }
    }
}

impl ClusterConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            listen_addr: env_or("PETRI_LISTEN_ADDR", defaults.listen_addr)?,
            nodes: env_or("PETRI_NODES", defaults.nodes)?,
            width: env_or("PETRI_WIDTH", defaults.width)?,
            height: env_or("PETRI_HEIGHT", defaults.height)?,
            seed: env_or("PETRI_SEED", defaults.seed)?,
            steps_per_frame: env_or("PETRI_STEPS_PER_FRAME", defaults.steps_per_frame)?,
            frames: env_or("PETRI_FRAMES", defaults.frames)?,
            balancing: env_or("PETRI_BALANCING", defaults.balancing)?,
            seed_cell: match std::env::var("PETRI_SEED_CELL") {
                Ok(value) => parse_seed_cell(&value)?,
                Err(_) => defaults.seed_cell,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(Error::Config("at least one node is required".to_string()));
        }
        if self.width < 3 || self.height < 3 {
            return Err(Error::Config(format!(
                "fragments must be at least 3x3, got {}x{}",
                self.width, self.height
            )));
        }
        if self.steps_per_frame < 1 || self.frames < 1 {
            return Err(Error::Config(
                "steps per frame and frames must be positive".to_string(),
            ));
        }
        if self.balancing && self.nodes > 1 && self.width <= MIN_BALANCING_WIDTH {
            return Err(Error::Config(format!(
                "balancing needs fragments wider than {}, got {}",
                MIN_BALANCING_WIDTH, self.width
            )));
        }
        if let Some((x, y)) = self.seed_cell {
            if x < 0 || y < 0 || x >= self.width || y >= self.height {
                return Err(Error::Config(format!(
                    "seed cell ({}, {}) is outside a {}x{} fragment",
                    x, y, self.width, self.height
                )));
            }
        }
        Ok(())
    }
}

/// Worker-side connection parameters. Run parameters come from the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub master_addr: SocketAddr,

    /// Port neighbors listen on and dial
    pub neighbor_port: u16,

    /// Local address for the master connection and the neighbor listener
    pub bind_ip: Option<IpAddr>,

    pub connect_attempts: u32,

    pub connect_delay_ms: u64,

    /// Enables the hash-work step cost at this difficulty
    pub step_cost_difficulty: Option<i8>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            master_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            neighbor_port: DEFAULT_PORT,
            bind_ip: None,
            connect_attempts: 5,
            connect_delay_ms: 1000,
            step_cost_difficulty: None,
        }
    }
}

impl WorkerConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            master_addr: env_or("PETRI_MASTER_ADDR", defaults.master_addr)?,
            neighbor_port: env_or("PETRI_NEIGHBOR_PORT", defaults.neighbor_port)?,
            bind_ip: env_opt("PETRI_BIND_IP")?,
            connect_attempts: env_or("PETRI_CONNECT_ATTEMPTS", defaults.connect_attempts)?,
            connect_delay_ms: env_or("PETRI_CONNECT_DELAY_MS", defaults.connect_delay_ms)?,
            step_cost_difficulty: env_opt("PETRI_STEP_COST_DIFFICULTY")?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.connect_attempts,
            delay: Duration::from_millis(self.connect_delay_ms),
        }
    }

    /// Where this worker listens for its left neighbor.
    pub fn neighbor_listen_addr(&self) -> SocketAddr {
        let ip = self.bind_ip.unwrap_or(IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.neighbor_port)
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_opt(name)?.unwrap_or(default))
}

fn env_opt<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => parse_value(name, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{}={:?}: {}", name, value, e)))
}

/// `x,y` or `none`.
fn parse_seed_cell(value: &str) -> Result<Option<(i32, i32)>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") || value.is_empty() {
        return Ok(None);
    }
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| Error::Config(format!("PETRI_SEED_CELL={:?}: expected x,y", value)))?;
    Ok(Some((
        parse_value("PETRI_SEED_CELL", x)?,
        parse_value("PETRI_SEED_CELL", y)?,
    )))
}
