//! Maintenance Loop (C9): the shard's only self-driven activity, firing
//! dispatch and staleness pruning on a fixed period and persisting the
//! result.
//!
//! Grounded on the teacher's `hot_reload_manager.rs` self-rescheduling
//! watch loop: an async task that does its work, sleeps through the
//! injected [`Clock`], and loops forever rather than being driven by an
//! external scheduler. Unlike that teacher loop this one never exits on
//! error — a failed pass is recorded and swallowed, and the next firing is
//! always scheduled (spec §4.9: "the loop must always reschedule itself,
//! even after an error").

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::dispatcher::{self, DeliveryClient, DispatchResult};
use crate::directory::{self, PruneResult};
use crate::domain::RegistryState;
use crate::namespace::NamespaceDirectory;
use crate::store::StateStore;
use crate::telemetry::Telemetry;
use crate::time::Clock;

/// Everything one maintenance firing needs beyond the shared state itself.
/// Bundled so `run_once`/`spawn` do not grow an unwieldy argument list as
/// the shard's collaborators accumulate.
pub struct MaintenanceDeps {
    /// Wall clock / id source.
    pub clock: Arc<dyn Clock>,
    /// Metric sink for `maintenance_errors_total` and the dispatcher's own
    /// counters.
    pub telemetry: Arc<Telemetry>,
    /// Resolves an agent type to its inbound delivery endpoint.
    pub namespaces: Arc<dyn NamespaceDirectory>,
    /// Outbound delivery transport.
    pub delivery: Arc<dyn DeliveryClient>,
    /// Persists `RegistryState` after each firing.
    pub store: Arc<dyn StateStore>,
    /// Tunables: dispatch batch size, heartbeat staleness, backoff cap,
    /// maintenance period.
    pub config: RegistryConfig,
}

/// What one firing accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceOutcome {
    /// Result of the dispatch pass.
    pub dispatched: DispatchResult,
    /// Result of the pruning pass.
    pub pruned: PruneResult,
    /// Whether the post-pass persistence write succeeded.
    pub persisted: bool,
}

/// Multiple of `heartbeat_stale_ms` used as the automatic staleness
/// threshold for the maintenance loop's own pruning pass (spec §4.9).
/// An operator-invoked `prune_stale_agents` call uses its own explicit
/// threshold instead; this constant only governs the unattended loop.
const AUTO_PRUNE_STALE_FACTOR: i64 = 3;

/// Run one dispatch + prune + persist pass against `state`.
///
/// Persistence failure is recorded (`maintenance_errors_total` with
/// `reason = "persist_failed"`) and swallowed — the in-memory effects of
/// this pass stand regardless, matching the spec's framing of the store
/// as durability on top of, not a precondition for, shard operation.
pub async fn run_once(state: &Mutex<RegistryState>, deps: &MaintenanceDeps) -> MaintenanceOutcome {
    let now = deps.clock.now_ms();
    let heartbeat_stale_ms = u64::from(deps.config.heartbeat_stale_ms) as i64;
    let backoff_cap_ms = u64::from(deps.config.backoff_cap_ms) as i64;
    let delivery_timeout_ms = u64::from(deps.config.delivery_timeout_ms);
    let dispatch_limit = u32::from(deps.config.dispatch_default_limit) as usize;

    let mut guard = state.lock().await;

    let dispatched = dispatcher::dispatch(
        &mut guard,
        deps.clock.as_ref(),
        &deps.telemetry,
        deps.namespaces.as_ref(),
        deps.delivery.as_ref(),
        dispatch_limit,
        heartbeat_stale_ms,
        backoff_cap_ms,
        delivery_timeout_ms,
    )
    .await;

    let pruned = directory::prune_stale(&mut guard, heartbeat_stale_ms * AUTO_PRUNE_STALE_FACTOR, now);

    let persisted = match deps.store.save(&guard).await {
        Ok(()) => true,
        Err(e) => {
            deps.telemetry.increment(
                "maintenance_errors_total",
                1.0,
                &[("reason", "persist_failed")],
            );
            warn!("Maintenance pass failed to persist state: {e}");
            false
        }
    };

    info!(
        "Maintenance tick: delivered={} failed={} pruned={}",
        dispatched.delivered, dispatched.failed, pruned.removed
    );

    MaintenanceOutcome { dispatched, pruned, persisted }
}

/// Spawn the maintenance loop: fire immediately, then repeat every
/// `config.maintenance_interval_ms` forever. The returned handle is a
/// background task; dropping or aborting it is the only way to stop the
/// loop, since nothing inside ever chooses to exit.
pub fn spawn(state: Arc<Mutex<RegistryState>>, deps: MaintenanceDeps) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let _outcome = run_once(&state, &deps).await;
            let interval_ms = u64::from(deps.config.maintenance_interval_ms);
            deps.clock.sleep(std::time::Duration::from_millis(interval_ms)).await;
        }
    })
}
