//! swarm-registryd - runs one shard of the agent swarm registry.
//!
//! Transport (how operator-interface calls actually reach this process)
//! is out of scope here; this binary only brings a shard up, wires its
//! collaborators from [`RegistryConfig::production`], and keeps the
//! maintenance loop running.

use std::sync::Arc;

use swarm_registry::config::RegistryConfig;
use swarm_registry::dispatcher::ReqwestDeliveryClient;
use swarm_registry::namespace::StaticNamespaceDirectory;
use swarm_registry::shard::Shard;
use swarm_registry::store::{InMemoryStateStore, SqliteStateStore, StateStore};
use swarm_registry::telemetry::Telemetry;
use swarm_registry::time::SystemClock;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swarm_registry=info".parse()?),
        )
        .init();

    info!("starting swarm-registryd");

    let config = RegistryConfig::production();
    config.validate()?;

    let store: Arc<dyn StateStore> = match &config.storage_path {
        Some(path) => Arc::new(SqliteStateStore::open(path).await?),
        None => Arc::new(InMemoryStateStore::new()),
    };

    let shard = Shard::load(
        Arc::new(SystemClock),
        Arc::new(Telemetry::new()),
        Arc::new(StaticNamespaceDirectory::new()),
        Arc::new(ReqwestDeliveryClient::default()),
        store,
        config,
        Some("shard-self".to_string()),
    )
    .await?;

    let maintenance = shard.spawn_maintenance();
    info!("shard ready, maintenance loop running");

    maintenance.await?;
    Ok(())
}
