//! Data model (spec §3): the types every component reads and mutates.
//!
//! Grounded on the teacher's domain-types idiom (`domain_types.rs`,
//! `message_router/domain_types.rs`): `nutype`-validated newtypes for
//! values with a real invariant, plain enums for closed sets, and
//! "make illegal states unrepresentable" constructors where a
//! combination of fields could otherwise be inconsistent.

use std::collections::{HashMap, HashSet, VecDeque};

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Opaque, non-empty agent identifier.
#[nutype(
    sanitize(trim),
    validate(not_empty),
    derive(
        Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
        AsRef, Into
    )
)]
pub struct AgentId(String);

/// Closed set of agent kinds this core knows how to route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Observes external signals and raises events.
    Scout,
    /// Produces analysis from scout output.
    Analyst,
    /// Executes trades.
    Trader,
    /// Evaluates and constrains risk.
    RiskManager,
    /// Learns from historical outcomes.
    Learning,
    /// The registry's own reserved type; never self-registered (§9).
    Registry,
}

impl AgentType {
    /// Parse from the lowercase wire form (`scout`, `risk_manager`, ...).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scout" => Some(Self::Scout),
            "analyst" => Some(Self::Analyst),
            "trader" => Some(Self::Trader),
            "risk_manager" => Some(Self::RiskManager),
            "learning" => Some(Self::Learning),
            "registry" => Some(Self::Registry),
            _ => None,
        }
    }

    /// The lowercase wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scout => "scout",
            Self::Analyst => "analyst",
            Self::Trader => "trader",
            Self::RiskManager => "risk_manager",
            Self::Learning => "learning",
            Self::Registry => "registry",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Liveness/availability status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Healthy and accepting deliveries.
    #[default]
    Active,
    /// Healthy but momentarily overloaded; still counts as active for
    /// delivery purposes (the activity predicate is heartbeat-only).
    Busy,
    /// Reporting an error condition.
    Error,
    /// Explicitly withdrawn from service.
    Offline,
}

/// The four message kinds the wire format distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Imperative: do this.
    Command,
    /// Informational: this happened.
    Event,
    /// Interrogative: what is this.
    Query,
    /// Answer to a prior query or command.
    Response,
}

/// Declared but unused for scheduling (spec §9): accepted, stored, and
/// round-tripped, never consulted for ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Lowest declared priority.
    Low,
    /// Default priority.
    Normal,
    /// Elevated priority.
    High,
    /// Highest declared priority.
    Critical,
}

/// A known agent's directory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Unique identifier.
    pub id: AgentId,
    /// Agent kind, used for abstract-target routing.
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    /// Current liveness status.
    pub status: AgentStatus,
    /// Wall time, in milliseconds, of the last heartbeat seen.
    pub last_heartbeat_ms: i64,
    /// Free-form declared capabilities.
    pub capabilities: HashSet<String>,
    /// Opaque numeric metrics the agent reports about itself.
    pub metrics: HashMap<String, f64>,
    /// Monotonically increasing registration order, used only to give the
    /// router's round-robin pool a deterministic candidate order (spec
    /// §4.7, "stable ordering of pool"). Not part of the wire format.
    pub registered_seq: u64,
}

/// A target string parsed into its concrete or abstract form.
///
/// Concrete targets are agent ids; abstract targets name an
/// [`AgentType`] via the `type:` or `role:` prefix (treated identically).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTarget {
    /// A literal agent id.
    Concrete(String),
    /// `type:<AgentType>` or `role:<AgentType>`.
    Abstract(AgentType),
}

/// Parse a raw `target` string per spec §3/§4.7.
///
/// # Errors
/// Returns the unparsed suffix as `Err` if the target carries an
/// abstract-target prefix but names an unknown [`AgentType`].
pub fn parse_target(target: &str) -> Result<ParsedTarget, String> {
    for prefix in ["type:", "role:"] {
        if let Some(suffix) = target.strip_prefix(prefix) {
            return AgentType::parse(suffix)
                .map(ParsedTarget::Abstract)
                .ok_or_else(|| suffix.to_string());
        }
    }
    Ok(ParsedTarget::Concrete(target.to_string()))
}

/// A message as submitted by a caller or stored inside a [`QueuedMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Caller-supplied or generated id; need not be unique across shards.
    pub id: String,
    /// Sending agent id, or the literal string `"system"`.
    pub source: String,
    /// A concrete agent id or an abstract target (`type:X`/`role:X`).
    pub target: String,
    /// Message kind.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Pub/sub topic; also carried on point-to-point messages for
    /// informational purposes.
    pub topic: String,
    /// Opaque application payload.
    pub payload: serde_json::Value,
    /// Sender clock timestamp in milliseconds, used only for TTL.
    pub timestamp_ms: i64,
    /// Groups a request/response exchange.
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Where a response to this message should be sent.
    #[serde(rename = "replyTo", skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Accepted and stored; never used for ordering (spec §9).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Time-to-live measured from `timestamp_ms`, not from enqueue.
    #[serde(rename = "ttlMs", skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<i64>,
    /// Free-form string headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Whether this message's TTL, measured from `timestamp_ms`, has
    /// elapsed as of `now_ms`.
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.ttl_ms {
            Some(ttl) => now_ms > self.timestamp_ms.saturating_add(ttl),
            None => false,
        }
    }
}

/// Delivery status of a [`QueuedMessage`].
///
/// The source this is derived from transitions through `Failed` on every
/// retry bump before immediately returning to `Pending`; that transition
/// is preserved here even though no caller can observe it mid-operation
/// (spec §9 explicitly permits dropping or keeping it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for `available_at_ms` and a matching poll/dispatch pass.
    Pending,
    /// Reserved for a future in-flight delivery model; unused by the
    /// single-pass dispatcher, which delivers synchronously within one
    /// scan iteration.
    Inflight,
    /// Momentary state during a retry bump; see the type doc above.
    Failed,
}

/// A message plus its queue bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Generated, unique within the shard.
    pub queue_id: String,
    /// The message itself, possibly rewritten by the Router.
    pub message: Message,
    /// When this entry was enqueued.
    pub enqueued_at_ms: i64,
    /// Not eligible for poll/dispatch before this time.
    pub available_at_ms: i64,
    /// Number of delivery attempts made so far.
    pub attempts: i32,
    /// Attempts allowed before moving to the dead letter area.
    pub max_attempts: i32,
    /// Current delivery status.
    pub status: QueueStatus,
    /// Reason for the most recent failure, if any.
    pub last_error: Option<String>,
}

/// Monotonic lifetime counters (spec invariant 6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Total messages accepted via `enqueue` (including `publish` fanout).
    pub enqueued: u64,
    /// Total messages successfully delivered via `poll` or `dispatch`.
    pub delivered: u64,
    /// Total delivery attempts that failed (each retry bump, not just
    /// terminal failures).
    pub failed: u64,
    /// Total messages moved into the dead letter area.
    pub dead_lettered: u64,
}

/// The persistent entity for one shard (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryState {
    /// Known agents by id.
    pub agents: HashMap<String, AgentRecord>,
    /// Live queue entries by `queue_id`.
    pub queue: HashMap<String, QueuedMessage>,
    /// FIFO scan order; defines dispatch/poll precedence.
    pub queue_order: VecDeque<String>,
    /// Parked, permanently-failed or expired entries by `queue_id`.
    pub dead_letter: HashMap<String, QueuedMessage>,
    /// Topic to ordered, duplicate-free subscriber list.
    pub subscriptions: HashMap<String, Vec<String>>,
    /// Lifetime delivery counters.
    pub delivery_stats: DeliveryStats,
    /// Round-robin cursor per agent type.
    pub routing_state: HashMap<AgentType, i32>,
    /// Wall time of the most recent dispatch pass.
    pub last_dispatch_at_ms: i64,
    /// Source of [`AgentRecord::registered_seq`] values; incremented on
    /// every new (not re-registered) agent id.
    pub next_agent_seq: u64,
}

impl RegistryState {
    /// An empty shard state, as created on first access (spec "Lifecycle").
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
