//! Reference server-side aggregator for cluster flow rules: one
//! [`StatisticNode`] per `flow_id` (or per `(flow_id, value)` pair for
//! parameter requests), shared across every client that routes its acquire
//! decisions here instead of shaping locally.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::node::StatisticNode;
use crate::rules::Grade;
use crate::rules::ThresholdType;
use crate::shapers::Admission;
use crate::shapers::DefaultController;
use crate::shapers::FlowController;

use super::token_service::ParamTokenRequest;
use super::token_service::TokenRequest;
use super::token_service::TokenResponse;
use super::token_service::TokenResult;
use super::token_service::TokenService;

/// A registered rule's server-side threshold configuration.
#[derive(Debug, Clone, Copy)]
struct RuleConfig {
    threshold_type: ThresholdType,
    count: f64,
    exceed_count: f64,
}

pub struct ClusterTokenServer {
    rules: DashMap<u64, RuleConfig>,
    nodes: DashMap<u64, Arc<StatisticNode>>,
    param_nodes: DashMap<(u64, String), Arc<StatisticNode>>,
    connected_clients: AtomicI64,
    global_node: Arc<StatisticNode>,
    global_qps_threshold: Mutex<Option<f64>>,
}

impl ClusterTokenServer {
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            nodes: DashMap::new(),
            param_nodes: DashMap::new(),
            connected_clients: AtomicI64::new(0),
            global_node: Arc::new(StatisticNode::new()),
            global_qps_threshold: Mutex::new(None),
        }
    }

    /// Register (or replace) the threshold configuration for `flow_id`.
    /// `exceed_count` is a multiplier on the computed threshold (1.0 = no
    /// added tolerance).
    pub fn set_rule(&self, flow_id: u64, threshold_type: ThresholdType, count: f64, exceed_count: f64) {
        self.rules.insert(flow_id, RuleConfig { threshold_type, count, exceed_count });
    }

    /// Convenience for a `Global`-threshold rule with no burst tolerance.
    pub fn set_threshold(&self, flow_id: u64, count: f64) {
        self.set_rule(flow_id, ThresholdType::Global, count, 1.0);
    }

    pub fn remove_rule(&self, flow_id: u64) {
        self.rules.remove(&flow_id);
        self.nodes.remove(&flow_id);
        self.param_nodes.retain(|key, _| key.0 != flow_id);
    }

    /// Cap this server's total admitted QPS across every rule, independent
    /// of any per-rule threshold. `None` disables the check.
    pub fn set_global_qps_threshold(&self, threshold: Option<f64>) {
        *self.global_qps_threshold.lock() = threshold;
    }

    /// Set the number of clients this server currently serves; `AvgLocal`
    /// rules scale their per-client threshold by this count.
    pub fn set_connected_client_count(&self, count: u64) {
        self.connected_clients.store(count as i64, Ordering::Release);
    }

    fn node_for(&self, flow_id: u64) -> Arc<StatisticNode> {
        if let Some(node) = self.nodes.get(&flow_id) {
            return node.clone();
        }
        self.nodes.entry(flow_id).or_insert_with(|| Arc::new(StatisticNode::new())).clone()
    }

    fn param_node_for(&self, flow_id: u64, value_key: &str) -> Arc<StatisticNode> {
        let key = (flow_id, value_key.to_string());
        if let Some(node) = self.param_nodes.get(&key) {
            return node.clone();
        }
        self.param_nodes.entry(key).or_insert_with(|| Arc::new(StatisticNode::new())).clone()
    }

    fn effective_threshold(&self, rule: &RuleConfig) -> f64 {
        let base = match rule.threshold_type {
            ThresholdType::Global => rule.count,
            ThresholdType::AvgLocal => rule.count * self.connected_clients.load(Ordering::Acquire) as f64,
        };
        base * rule.exceed_count
    }

    /// Namespace-wide admission gate, checked before any per-rule
    /// threshold. Returns `Some` when the request should stop here.
    fn check_global(&self, now_ms: u64, acquire_count: u64) -> Option<TokenResponse> {
        let threshold = (*self.global_qps_threshold.lock())?;
        let controller = DefaultController::new(Grade::Qps, threshold, 0);
        match controller.can_pass(&self.global_node, now_ms, acquire_count, false) {
            Admission::Block => {
                self.global_node.add_block(now_ms, acquire_count);
                Some(TokenResponse::status(TokenResult::TooManyRequest))
            }
            _ => {
                self.global_node.add_pass(now_ms, acquire_count);
                None
            }
        }
    }

    fn decide(&self, rule: &RuleConfig, node: &StatisticNode, now_ms: u64, acquire_count: u64, prioritized: bool) -> TokenResponse {
        let threshold = self.effective_threshold(rule);
        if threshold <= 0.0 {
            return TokenResponse::status(TokenResult::BadRequest);
        }

        let controller = DefaultController::new(Grade::Qps, threshold, 500);
        match controller.can_pass(node, now_ms, acquire_count, prioritized) {
            Admission::Admit => {
                node.add_pass(now_ms, acquire_count);
                TokenResponse::status(TokenResult::Ok)
            }
            Admission::AdmitAfter(wait) => {
                node.add_occupied_pass(now_ms, acquire_count);
                TokenResponse {
                    status: TokenResult::ShouldWait,
                    wait_time: Some(wait),
                }
            }
            Admission::Block => {
                node.add_block(now_ms, acquire_count);
                TokenResponse::status(TokenResult::Blocked)
            }
        }
    }
}

impl Default for ClusterTokenServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenService for ClusterTokenServer {
    fn request(&self, req: TokenRequest) -> TokenResponse {
        if let Some(resp) = self.check_global(req.now_ms, req.acquire_count) {
            return resp;
        }

        // flow_id 0 is never a valid rule identifier, distinct from "a rule
        // that isn't registered (yet)".
        if req.flow_id == 0 {
            return TokenResponse::status(TokenResult::BadRequest);
        }

        let Some(rule) = self.rules.get(&req.flow_id).map(|r| *r) else {
            return TokenResponse::status(TokenResult::NoRuleExists);
        };

        let node = self.node_for(req.flow_id);
        self.decide(&rule, &node, req.now_ms, req.acquire_count, req.prioritized)
    }

    fn request_param(&self, req: ParamTokenRequest) -> TokenResponse {
        if let Some(resp) = self.check_global(req.now_ms, req.acquire_count) {
            return resp;
        }

        if req.flow_id == 0 {
            return TokenResponse::status(TokenResult::BadRequest);
        }

        let Some(rule) = self.rules.get(&req.flow_id).map(|r| *r) else {
            return TokenResponse::status(TokenResult::NoRuleExists);
        };

        let node = self.param_node_for(req.flow_id, &req.value_key);
        self.decide(&rule, &node, req.now_ms, req.acquire_count, req.prioritized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flow_id_reports_no_rule_exists() {
        let server = ClusterTokenServer::new();
        let resp = server.request(TokenRequest { flow_id: 1, acquire_count: 1, prioritized: false, now_ms: 0 });
        assert_eq!(resp.status, TokenResult::NoRuleExists);
    }

    #[test]
    fn zero_flow_id_is_a_bad_request() {
        let server = ClusterTokenServer::new();
        let resp = server.request(TokenRequest { flow_id: 0, acquire_count: 1, prioritized: false, now_ms: 0 });
        assert_eq!(resp.status, TokenResult::BadRequest);
    }

    #[test]
    fn admits_up_to_the_global_threshold() {
        let server = ClusterTokenServer::new();
        server.set_threshold(1, 2.0);
        let req = |now_ms| TokenRequest { flow_id: 1, acquire_count: 1, prioritized: false, now_ms };
        assert_eq!(server.request(req(0)).status, TokenResult::Ok);
        assert_eq!(server.request(req(0)).status, TokenResult::Ok);
        assert_eq!(server.request(req(0)).status, TokenResult::Blocked);
    }

    #[test]
    fn avg_local_scales_by_connected_client_count() {
        let server = ClusterTokenServer::new();
        server.set_connected_client_count(3);
        server.set_rule(1, ThresholdType::AvgLocal, 10.0, 1.0);
        let req = |now_ms| TokenRequest { flow_id: 1, acquire_count: 1, prioritized: false, now_ms };
        for _ in 0..30 {
            assert_eq!(server.request(req(0)).status, TokenResult::Ok);
        }
        assert_eq!(server.request(req(0)).status, TokenResult::Blocked);
    }

    #[test]
    fn global_threshold_caps_traffic_across_every_rule() {
        let server = ClusterTokenServer::new();
        server.set_global_qps_threshold(Some(1.0));
        server.set_threshold(1, 100.0);
        server.set_threshold(2, 100.0);
        let req = |flow_id, now_ms| TokenRequest { flow_id, acquire_count: 1, prioritized: false, now_ms };
        assert_eq!(server.request(req(1, 0)).status, TokenResult::Ok);
        assert_eq!(server.request(req(2, 0)).status, TokenResult::TooManyRequest);
    }

    #[test]
    fn param_token_tracks_each_value_independently() {
        let server = ClusterTokenServer::new();
        server.set_threshold(1, 1.0);
        let req = |value_key: &str| ParamTokenRequest {
            flow_id: 1,
            value_key: value_key.to_string(),
            acquire_count: 1,
            prioritized: false,
            now_ms: 0,
        };
        assert_eq!(server.request_param(req("k1")).status, TokenResult::Ok);
        assert_eq!(server.request_param(req("k1")).status, TokenResult::Blocked);
        // A different value has its own independent bucket.
        assert_eq!(server.request_param(req("k2")).status, TokenResult::Ok);
    }
}
