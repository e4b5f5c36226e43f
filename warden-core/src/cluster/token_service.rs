//! Client/server contract for cluster-mode flow rules.

use std::time::Duration;

/// Outcome the token server reports for a single acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenResult {
    Ok,
    BadRequest,
    Blocked,
    ShouldWait,
    /// `flow_id` (or, for a parameter request, the `(flow_id, value)` pair)
    /// has no rule registered on this server.
    NoRuleExists,
    /// The server couldn't answer (unreachable, internal error) — the
    /// caller's `fallback_to_local_when_fail` decides whether to fall back
    /// to a local shaper.
    Fail,
    /// The server's own namespace-wide admission limit rejected the
    /// request, independent of any per-rule threshold.
    TooManyRequest,
}

#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub flow_id: u64,
    pub acquire_count: u64,
    pub prioritized: bool,
    /// Client-supplied timestamp (ms since the client's `TimeSource`
    /// anchor); the server has no wall clock of its own to stay testable
    /// the same way the rest of this crate is.
    pub now_ms: u64,
}

/// A `requestParamToken` call: the same acquire shape as [`TokenRequest`]
/// plus the specific hot-parameter value being checked.
#[derive(Debug, Clone)]
pub struct ParamTokenRequest {
    pub flow_id: u64,
    pub value_key: String,
    pub acquire_count: u64,
    pub prioritized: bool,
    pub now_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TokenResponse {
    pub status: TokenResult,
    pub wait_time: Option<Duration>,
}

impl TokenResponse {
    pub(crate) fn status(status: TokenResult) -> Self {
        Self { status, wait_time: None }
    }
}

/// Implemented by whatever transport carries a [`TokenRequest`]/
/// [`ParamTokenRequest`] to the cluster's token server and its
/// [`TokenResponse`] back. `warden-core` defines only the contract and a
/// reference in-process server ([`super::ClusterTokenServer`]); a networked
/// client is an application concern, not this crate's.
pub trait TokenService: Send + Sync {
    fn request(&self, req: TokenRequest) -> TokenResponse;
    fn request_param(&self, req: ParamTokenRequest) -> TokenResponse;
}
