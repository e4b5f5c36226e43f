//! Cluster token-service mode: an alternate acquire path
//! for a rule whose `cluster_config` is set, where the admission decision
//! is made by a shared server instead of node-local metrics.
//!
//! This module defines the client/server contract ([`token_service`]), a
//! reference in-process aggregator ([`server::ClusterTokenServer`]), and
//! [`apply_response`], the client-side outcome mapping every cluster-mode
//! caller (flow or hot-parameter) applies to whatever the server answers.
//! Routing a `SlotChain`'s general flow check through an actual
//! [`TokenService`] client is left to the embedding application; the
//! hot-parameter path calls it directly since a rule's `cluster_mode` is
//! otherwise silently inert — see [`crate::slots::param_flow`].

use std::time::Duration;

pub mod server;
pub mod token_service;

pub use server::ClusterTokenServer;
pub use token_service::ParamTokenRequest;
pub use token_service::TokenRequest;
pub use token_service::TokenResponse;
pub use token_service::TokenResult;
pub use token_service::TokenService;

/// What the caller should do after a [`TokenResponse`] comes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterOutcome {
    Pass,
    PassAfter(Duration),
    Block,
}

/// Map a [`TokenResponse`] to a [`ClusterOutcome`]: `Ok` passes, `ShouldWait`
/// passes after the server's reported wait, `Blocked` always rejects, and
/// every other status (the server couldn't give a definite answer) either
/// falls back to `local` or passes, depending on
/// `fallback_to_local_when_fail`.
pub fn apply_response(resp: &TokenResponse, fallback_to_local_when_fail: bool, local: impl FnOnce() -> ClusterOutcome) -> ClusterOutcome {
    match resp.status {
        TokenResult::Ok => ClusterOutcome::Pass,
        TokenResult::ShouldWait => ClusterOutcome::PassAfter(resp.wait_time.unwrap_or_default()),
        TokenResult::Blocked => ClusterOutcome::Block,
        TokenResult::NoRuleExists | TokenResult::BadRequest | TokenResult::Fail | TokenResult::TooManyRequest => {
            if fallback_to_local_when_fail {
                local()
            } else {
                ClusterOutcome::Pass
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_always_passes_without_consulting_local() {
        let resp = TokenResponse { status: TokenResult::Ok, wait_time: None };
        let outcome = apply_response(&resp, false, || panic!("local fallback must not run"));
        assert_eq!(outcome, ClusterOutcome::Pass);
    }

    #[test]
    fn blocked_always_rejects_even_with_fallback_enabled() {
        let resp = TokenResponse { status: TokenResult::Blocked, wait_time: None };
        let outcome = apply_response(&resp, true, || ClusterOutcome::Pass);
        assert_eq!(outcome, ClusterOutcome::Block);
    }

    #[test]
    fn failure_without_fallback_passes_locally_unchecked() {
        let resp = TokenResponse { status: TokenResult::TooManyRequest, wait_time: None };
        let outcome = apply_response(&resp, false, || panic!("local fallback must not run"));
        assert_eq!(outcome, ClusterOutcome::Pass);
    }

    #[test]
    fn failure_with_fallback_consults_local() {
        let resp = TokenResponse { status: TokenResult::NoRuleExists, wait_time: None };
        let outcome = apply_response(&resp, true, || ClusterOutcome::Block);
        assert_eq!(outcome, ClusterOutcome::Block);
    }
}
