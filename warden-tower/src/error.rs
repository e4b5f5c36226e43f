use warden_core::BlockError;
use warden_core::ErrorEntryFreeError;

/// Errors produced by the `warden-tower` middleware stack.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WardenError {
    /// Rejected by a flow rule (QPS/THREAD threshold exceeded).
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`.
    #[error("flow control triggered by rule on resource {resource}")]
    FlowLimited { resource: String },

    /// Rejected because the resource's circuit breaker is open.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`.
    #[error("circuit breaker open for resource {resource}")]
    CircuitOpen { resource: String },

    /// Rejected by an authority (allow/deny-list) rule.
    ///
    /// When the `axum` feature is enabled, this converts to `403 Forbidden`.
    #[error("caller origin rejected by authority rule on resource {resource}")]
    AuthorityRejected { resource: String },

    /// Rejected by a hot-parameter flow rule for a specific argument value.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`.
    #[error("hot-parameter flow control triggered on resource {resource} for value {value}")]
    ParamLimited { resource: String, value: String },

    /// Rejected by process-wide system protection.
    ///
    /// When the `axum` feature is enabled, this converts to `503 Service Unavailable`.
    #[error("system protection triggered: {reason}")]
    SystemProtected { reason: &'static str },

    /// Admission required queueing past the service's configured fail-fast
    /// budget; the caller asked not to wait.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`.
    #[error("service is overloaded; call rejected instead of queued")]
    Busy,

    /// `Entry::exit` was called out of order. Indicates a bug in how the
    /// adapter drives its own `Context`, not a caller error.
    #[error(transparent)]
    EntryMismatch(#[from] ErrorEntryFreeError),
}

impl From<BlockError> for WardenError {
    fn from(err: BlockError) -> Self {
        match err {
            BlockError::Flow { rule } => WardenError::FlowLimited { resource: rule.resource.clone() },
            BlockError::Degrade { rule } => WardenError::CircuitOpen { resource: rule.resource.clone() },
            BlockError::Authority { rule } => WardenError::AuthorityRejected { resource: rule.resource.clone() },
            BlockError::ParamFlow { rule, triggered_value } => {
                WardenError::ParamLimited { resource: rule.resource.clone(), value: triggered_value }
            }
            BlockError::System { reason } => WardenError::SystemProtected { reason },
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for WardenError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match self {
            WardenError::FlowLimited { .. } | WardenError::ParamLimited { .. } | WardenError::Busy => {
                StatusCode::TOO_MANY_REQUESTS
            }
            WardenError::CircuitOpen { .. } | WardenError::SystemProtected { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WardenError::AuthorityRejected { .. } => StatusCode::FORBIDDEN,
            WardenError::EntryMismatch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, self.to_string()).into_response()
    }
}
