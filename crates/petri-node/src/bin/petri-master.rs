//! Petri master binary
//!
//! Waits for `PETRI_NODES` workers, bootstraps them and prints the run report
//! as JSON.

use petri_node::{Cluster, ClusterConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petri=info,petri_node=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Petri master");

    let config = ClusterConfig::from_env()?;
    let cluster = Cluster::bind(config).await?;
    let report = cluster.run().await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_complete() {
        anyhow::bail!("not every worker finished the simulation");
    }
    Ok(())
}
