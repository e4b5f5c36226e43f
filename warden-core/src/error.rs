use std::sync::Arc;

use crate::rules::AuthorityRule;
use crate::rules::DegradeRule;
use crate::rules::FlowRule;
use crate::rules::ParamFlowRule;

/// A rejection raised by a slot in the chain.
///
/// Mirrors the `FlowException | DegradeException | AuthorityException |
/// ParamFlowException | SystemBlockException` family: every rejection is
/// modeled, never a panic, and carries the rule (and, for parameter flow,
/// the offending value) that triggered it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlockError {
    #[error("flow control triggered by rule on resource {}", .rule.resource)]
    Flow { rule: Arc<FlowRule> },

    #[error("circuit breaker open for resource {}", .rule.resource)]
    Degrade { rule: Arc<DegradeRule> },

    #[error("authority rule rejected origin for resource {}", .rule.resource)]
    Authority { rule: Arc<AuthorityRule> },

    #[error("hot-parameter flow control triggered on resource {}", .rule.resource)]
    ParamFlow {
        rule: Arc<ParamFlowRule>,
        triggered_value: String,
    },

    #[error("system protection triggered: {reason}")]
    System { reason: &'static str },
}

impl BlockError {
    /// The resource-facing name of the rule kind, used for metrics labels
    /// and log fields without cloning the whole rule.
    pub fn kind(&self) -> &'static str {
        match self {
            BlockError::Flow { .. } => "flow",
            BlockError::Degrade { .. } => "degrade",
            BlockError::Authority { .. } => "authority",
            BlockError::ParamFlow { .. } => "param_flow",
            BlockError::System { .. } => "system",
        }
    }
}

/// Raised when `Entry::exit` is called on an entry that is not the current
/// top of its `Context`'s stack. The context recovers by exiting every
/// intermediate entry before surfacing this to the caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("exit called on entry for resource {expected} while current entry is {actual}")]
pub struct ErrorEntryFreeError {
    pub expected: String,
    pub actual: String,
}

/// Entry/exit point classification: inbound calls vs. outbound calls a
/// resource makes to something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EntryType {
    In,
    Out,
}

/// Opaque resource-type classifier. Kept as a newtype over `u8` rather than
/// a closed enum so callers can define their own categories, with a handful
/// of well-known constants pre-defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ResourceType(pub u8);

impl ResourceType {
    pub const COMMON: ResourceType = ResourceType(0);
    pub const WEB: ResourceType = ResourceType(1);
    pub const RPC: ResourceType = ResourceType(2);
    pub const API_GATEWAY: ResourceType = ResourceType(3);
    pub const DB_SQL: ResourceType = ResourceType(4);
}

impl Default for ResourceType {
    fn default() -> Self {
        ResourceType::COMMON
    }
}
