//! Petri worker binary
//!
//! Connects to the master at `PETRI_MASTER_ADDR` and runs one fragment.

use petri_node::{LogRenderer, Worker, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petri=info,petri_node=info,petri_transfer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Petri worker");

    let config = WorkerConfig::from_env()?;
    let report = Worker::new(config)
        .with_renderer(LogRenderer)
        .run()
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
