//! End-to-end engine scenarios against an in-process mock controller API.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use verity_engine::{ApiError, EngineConfig, Manager, OperationError, VerityApi, WaitError};
use verity_models::{ResourceKind, Verb};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct Recorded {
    seq: usize,
    verb: &'static str,
    endpoint: String,
    body: Option<Value>,
    params: Vec<(String, String)>,
}

struct FailPlan {
    remaining: usize,
    status: u16,
    body: String,
}

/// Scripted controller double: records every request with a global sequence
/// number, serves queued GET bodies, and fails scripted (verb, endpoint)
/// pairs.
#[derive(Default)]
struct MockApi {
    seq: AtomicUsize,
    requests: Mutex<Vec<Recorded>>,
    get_bodies: Mutex<HashMap<String, VecDeque<Value>>>,
    failures: Mutex<HashMap<(String, String), FailPlan>>,
}

impl MockApi {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a GET body for an endpoint. Queued bodies pop in order; the
    /// last one repeats.
    fn queue_get(&self, endpoint: &str, body: Value) {
        self.get_bodies
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(body);
    }

    fn fail_next(&self, verb: &str, endpoint: &str, times: usize, status: u16, body: &str) {
        self.failures.lock().unwrap().insert(
            (verb.to_string(), endpoint.to_string()),
            FailPlan {
                remaining: times,
                status,
                body: body.to_string(),
            },
        );
    }

    fn fail_always(&self, verb: &str, endpoint: &str, status: u16, body: &str) {
        self.fail_next(verb, endpoint, usize::MAX, status, body);
    }

    fn record(
        &self,
        verb: &'static str,
        endpoint: &str,
        body: Option<&Value>,
        params: &[(String, String)],
    ) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(Recorded {
            seq,
            verb,
            endpoint: endpoint.to_string(),
            body: body.cloned(),
            params: params.to_vec(),
        });
    }

    fn maybe_fail(&self, verb: &str, endpoint: &str) -> Result<(), ApiError> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(plan) = failures.get_mut(&(verb.to_string(), endpoint.to_string())) {
            if plan.remaining > 0 {
                if plan.remaining != usize::MAX {
                    plan.remaining -= 1;
                }
                return Err(ApiError::Http {
                    endpoint: endpoint.to_string(),
                    status: plan.status,
                    body: plan.body.clone(),
                });
            }
        }
        Ok(())
    }

    fn recorded(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn of_verb(&self, verb: &str) -> Vec<Recorded> {
        self.recorded()
            .into_iter()
            .filter(|r| r.verb == verb)
            .collect()
    }

    fn mutating(&self) -> Vec<Recorded> {
        self.recorded()
            .into_iter()
            .filter(|r| r.verb != "GET")
            .collect()
    }
}

#[async_trait]
impl VerityApi for MockApi {
    async fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value, ApiError> {
        self.record("GET", endpoint, None, params);
        self.maybe_fail("GET", endpoint)?;
        let mut bodies = self.get_bodies.lock().unwrap();
        let body = match bodies.get_mut(endpoint) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| json!({})),
            None => json!({}),
        };
        Ok(body)
    }

    async fn put(
        &self,
        endpoint: &str,
        body: &Value,
        params: &[(String, String)],
    ) -> Result<(), ApiError> {
        self.record("PUT", endpoint, Some(body), params);
        self.maybe_fail("PUT", endpoint)
    }

    async fn patch(
        &self,
        endpoint: &str,
        body: &Value,
        params: &[(String, String)],
    ) -> Result<(), ApiError> {
        self.record("PATCH", endpoint, Some(body), params);
        self.maybe_fail("PATCH", endpoint)
    }

    async fn delete(&self, endpoint: &str, params: &[(String, String)]) -> Result<(), ApiError> {
        self.record("DELETE", endpoint, None, params);
        self.maybe_fail("DELETE", endpoint)
    }
}

fn manager(api: &Arc<MockApi>) -> Manager {
    Manager::new(api.clone() as Arc<dyn VerityApi>, EngineConfig::fast())
}

fn ip_version(v: &str) -> Option<HashMap<String, String>> {
    Some([("ip_version".to_string(), v.to_string())].into())
}

#[tokio::test]
async fn test_coalesce_and_flush() {
    let api = MockApi::new();
    let mgr = manager(&api);

    let t1 = mgr
        .add_put(ResourceKind::Tenant, "t1", json!({"vni": 100}), None)
        .unwrap();
    let t2 = mgr
        .add_put(ResourceKind::Tenant, "t2", json!({"vni": 200}), None)
        .unwrap();
    let g1 = mgr
        .add_patch(ResourceKind::Gateway, "g1", json!({"asn": 65000}), None)
        .unwrap();

    let diags = mgr.flush_all().await;
    assert!(!diags.has_errors());

    let mutating = api.mutating();
    assert_eq!(mutating.len(), 2);
    assert_eq!(mutating[0].verb, "PUT");
    assert_eq!(mutating[0].endpoint, "/tenants");
    assert_eq!(
        mutating[0].body,
        Some(json!({"tenant": {"t1": {"vni": 100}, "t2": {"vni": 200}}}))
    );
    assert_eq!(mutating[1].verb, "PATCH");
    assert_eq!(mutating[1].endpoint, "/gateways");
    assert_eq!(mutating[1].body, Some(json!({"gateway": {"g1": {"asn": 65000}}})));
    assert!(mutating[0].seq < mutating[1].seq);

    for ticket in [&t1, &t2, &g1] {
        mgr.wait(ticket, WAIT).await.unwrap();
    }
}

#[tokio::test]
async fn test_buffer_coalescing_latest_payload_wins() {
    let api = MockApi::new();
    let mgr = manager(&api);

    mgr.add_put(ResourceKind::Gateway, "g1", json!({"asn": 1}), None)
        .unwrap();
    let ticket = mgr
        .add_put(ResourceKind::Gateway, "g1", json!({"asn": 2}), None)
        .unwrap();

    mgr.flush_all().await;

    let puts = api.of_verb("PUT");
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body, Some(json!({"gateway": {"g1": {"asn": 2}}})));
    mgr.wait(&ticket, WAIT).await.unwrap();
}

#[tokio::test]
async fn test_idempotent_create_skips_existing() {
    let api = MockApi::new();
    api.queue_get("/tenants", json!({"tenant": {"t1": {"vni": 100}}}));
    let mgr = manager(&api);

    let ticket = mgr
        .add_put(ResourceKind::Tenant, "t1", json!({"vni": 100}), None)
        .unwrap();
    let diags = mgr.flush_all().await;

    assert!(!diags.has_errors());
    assert!(api.of_verb("PUT").is_empty());
    mgr.wait(&ticket, WAIT).await.unwrap();
}

#[tokio::test]
async fn test_pre_existence_check_fails_open() {
    let api = MockApi::new();
    api.fail_always("GET", "/gateways", 500, "");
    let mgr = manager(&api);

    let ticket = mgr
        .add_put(ResourceKind::Gateway, "g1", json!({"asn": 65000}), None)
        .unwrap();
    let diags = mgr.flush_all().await;

    assert!(!diags.has_errors());
    assert_eq!(api.of_verb("PUT").len(), 1);
    mgr.wait(&ticket, WAIT).await.unwrap();
}

#[tokio::test]
async fn test_retry_then_succeed_on_controller_lock() {
    let api = MockApi::new();
    api.fail_next(
        "PATCH",
        "/gateways",
        2,
        409,
        r#"{"payload":"system is currently being modified"}"#,
    );
    let mgr = manager(&api);

    let ticket = mgr
        .add_patch(ResourceKind::Gateway, "g1", json!({"asn": 65000}), None)
        .unwrap();
    let diags = mgr.flush_all().await;

    assert!(!diags.has_errors());
    assert_eq!(api.of_verb("PATCH").len(), 3);
    mgr.wait(&ticket, WAIT).await.unwrap();
}

#[tokio::test]
async fn test_retry_exhaustion_on_persistent_503() {
    let api = MockApi::new();
    api.fail_always("PATCH", "/gateways", 503, "");
    let mgr = manager(&api);

    let ticket = mgr
        .add_patch(ResourceKind::Gateway, "g1", json!({"asn": 65000}), None)
        .unwrap();
    let diags = mgr.flush_all().await;

    assert!(diags.has_errors());
    // max_retries bounds total attempts, including the first.
    assert_eq!(api.of_verb("PATCH").len(), 5);

    match mgr.wait(&ticket, WAIT).await {
        Err(WaitError::Operation(OperationError::BatchFailed { status, .. })) => {
            assert_eq!(status, Some(503));
        }
        other => panic!("expected batch failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let api = MockApi::new();
    api.fail_always("PUT", "/tenants", 400, r#"{"payload":"invalid vni"}"#);
    let mgr = manager(&api);

    mgr.add_put(ResourceKind::Tenant, "t1", json!({"vni": -1}), None)
        .unwrap();
    let diags = mgr.flush_all().await;

    assert!(diags.has_errors());
    assert_eq!(api.of_verb("PUT").len(), 1);
}

#[tokio::test]
async fn test_failure_cascade_aborts_later_batches() {
    let api = MockApi::new();
    api.fail_always("PUT", "/tenants", 400, r#"{"payload":"invalid"}"#);
    let mgr = manager(&api);

    let t1 = mgr
        .add_put(ResourceKind::Tenant, "t1", json!({"vni": 1}), None)
        .unwrap();
    let g1 = mgr
        .add_put(ResourceKind::Gateway, "g1", json!({"asn": 1}), None)
        .unwrap();
    let s1 = mgr
        .add_put(ResourceKind::Service, "s1", json!({"vlan": 10}), None)
        .unwrap();

    let diags = mgr.flush_all().await;
    assert!(diags.has_errors());

    let put_endpoints: HashSet<String> =
        api.of_verb("PUT").into_iter().map(|r| r.endpoint).collect();
    assert_eq!(put_endpoints, HashSet::from(["/tenants".to_string()]));

    match mgr.wait(&t1, WAIT).await {
        Err(WaitError::Operation(OperationError::BatchFailed { status, .. })) => {
            assert_eq!(status, Some(400));
        }
        other => panic!("expected batch failure for t1, got {other:?}"),
    }
    for ticket in [&g1, &s1] {
        match mgr.wait(ticket, WAIT).await {
            Err(WaitError::Operation(OperationError::Aborted(_))) => {}
            other => panic!("expected cascade abort, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_phase_ordering_put_patch_delete() {
    let api = MockApi::new();
    let mgr = manager(&api);

    mgr.add_delete(ResourceKind::Lag, "l1", None).unwrap();
    mgr.add_patch(ResourceKind::Service, "s1", json!({"vlan": 10}), None)
        .unwrap();
    mgr.add_put(ResourceKind::Gateway, "g1", json!({"asn": 1}), None)
        .unwrap();

    let diags = mgr.flush_all().await;
    assert!(!diags.has_errors());

    let mutating = api.mutating();
    assert_eq!(mutating.len(), 3);
    let seq_of = |verb: &str| mutating.iter().find(|r| r.verb == verb).unwrap().seq;
    assert!(seq_of("PUT") < seq_of("PATCH"));
    assert!(seq_of("PATCH") < seq_of("DELETE"));
}

#[tokio::test]
async fn test_kind_ordering_within_put_phase() {
    let api = MockApi::new();
    let mgr = manager(&api);

    // Insertion order deliberately reversed from the dependency order.
    mgr.add_put(ResourceKind::Lag, "l1", json!({}), None).unwrap();
    mgr.add_put(ResourceKind::Service, "s1", json!({}), None).unwrap();
    mgr.add_put(ResourceKind::Tenant, "t1", json!({}), None).unwrap();

    mgr.flush_all().await;

    let puts = api.of_verb("PUT");
    let seq_of = |endpoint: &str| puts.iter().find(|r| r.endpoint == endpoint).unwrap().seq;
    assert!(seq_of("/tenants") < seq_of("/services"));
    assert!(seq_of("/services") < seq_of("/lags"));
}

#[tokio::test]
async fn test_delete_uses_reverse_kind_order() {
    let api = MockApi::new();
    let mgr = manager(&api);

    mgr.add_delete(ResourceKind::Tenant, "t1", None).unwrap();
    mgr.add_delete(ResourceKind::Lag, "l1", None).unwrap();

    mgr.flush_all().await;

    let deletes = api.of_verb("DELETE");
    let seq_of = |endpoint: &str| deletes.iter().find(|r| r.endpoint == endpoint).unwrap().seq;
    assert!(seq_of("/lags") < seq_of("/tenants"));
    let lag_delete = deletes.iter().find(|r| r.endpoint == "/lags").unwrap();
    assert!(lag_delete
        .params
        .contains(&("lag_name".to_string(), "l1".to_string())));
}

#[tokio::test]
async fn test_header_split_produces_one_request_per_ip_version() {
    let api = MockApi::new();
    let mgr = manager(&api);

    let a1 = mgr
        .add_put(ResourceKind::Acl, "a1", json!({"enable": true}), ip_version("4"))
        .unwrap();
    let a2 = mgr
        .add_put(ResourceKind::Acl, "a2", json!({"enable": true}), ip_version("6"))
        .unwrap();

    let diags = mgr.flush_all().await;
    assert!(!diags.has_errors());

    let puts = api.of_verb("PUT");
    assert_eq!(puts.len(), 2);
    for put in &puts {
        assert_eq!(put.endpoint, "/acls");
        let filter = put.body.as_ref().unwrap().get("ip_filter").unwrap();
        let names: Vec<&String> = filter.as_object().unwrap().keys().collect();
        assert_eq!(names.len(), 1);
        let version = put
            .params
            .iter()
            .find(|(k, _)| k == "ip_version")
            .map(|(_, v)| v.as_str())
            .unwrap();
        match version {
            "4" => assert_eq!(names[0], "a1"),
            "6" => assert_eq!(names[0], "a2"),
            other => panic!("unexpected ip_version {other}"),
        }
    }

    mgr.wait(&a1, WAIT).await.unwrap();
    mgr.wait(&a2, WAIT).await.unwrap();
}

#[tokio::test]
async fn test_autogen_readback_populates_response_cache() {
    let api = MockApi::new();
    // First GET feeds the pre-existence filter; the second is the post-PUT
    // fetch carrying the controller-assigned fields.
    api.queue_get("/tenants", json!({}));
    api.queue_get(
        "/tenants",
        json!({"tenant": {"t1": {"name": "auto-t1", "vni": 100, "internal_index": 7}}}),
    );
    let mgr = manager(&api);

    let ticket = mgr
        .add_put(ResourceKind::Tenant, "t1", json!({"vni": 100}), None)
        .unwrap();
    let diags = mgr.flush_all().await;

    assert!(!diags.has_errors());
    mgr.wait(&ticket, WAIT).await.unwrap();

    let cached = mgr.resource_response(ResourceKind::Tenant, "t1").unwrap();
    assert_eq!(cached.get("internal_index"), Some(&json!(7)));
    // The echoed `name` field doubles as a cache alias.
    assert!(mgr.resource_response(ResourceKind::Tenant, "auto-t1").is_some());
}

#[tokio::test]
async fn test_autogen_fetch_failure_leaves_tickets_succeeded() {
    let api = MockApi::new();
    api.fail_next("GET", "/services", 2, 500, "");
    let mgr = manager(&api);

    let ticket = mgr
        .add_put(ResourceKind::Service, "s1", json!({"vlan": 10}), None)
        .unwrap();
    let diags = mgr.flush_all().await;

    // Pre-existence GET fails open, the PUT lands, the autogen fetch fails.
    assert!(!diags.has_errors());
    assert!(!diags.is_empty());
    mgr.wait(&ticket, WAIT).await.unwrap();
}

#[tokio::test]
async fn test_oversized_delete_is_chunked() {
    let api = MockApi::new();
    let mut config = EngineConfig::fast();
    config.max_delete_batch = 10;
    let mgr = Manager::new(api.clone() as Arc<dyn VerityApi>, config);

    let tickets: Vec<_> = (0..25)
        .map(|i| mgr.add_delete(ResourceKind::Lag, &format!("l{i}"), None).unwrap())
        .collect();

    let diags = mgr.flush_all().await;
    assert!(!diags.has_errors());

    let deletes = api.of_verb("DELETE");
    assert_eq!(deletes.len(), 3);
    let total_names: usize = deletes
        .iter()
        .map(|r| r.params.iter().filter(|(k, _)| k == "lag_name").count())
        .sum();
    assert_eq!(total_names, 25);

    for ticket in &tickets {
        mgr.wait(ticket, WAIT).await.unwrap();
    }
}

#[tokio::test]
async fn test_ticket_ids_are_unique_across_intents() {
    let api = MockApi::new();
    let mgr = manager(&api);

    let mut seen = HashSet::new();
    for i in 0..50 {
        let ticket = mgr
            .add_put(ResourceKind::Gateway, &format!("g{i}"), json!({}), None)
            .unwrap();
        assert!(seen.insert(ticket.to_string()));
    }
}

#[tokio::test]
async fn test_wait_times_out_while_batch_is_unflushed() {
    let api = MockApi::new();
    let mgr = manager(&api);

    let ticket = mgr
        .add_put(ResourceKind::Gateway, "g1", json!({}), None)
        .unwrap();
    match mgr.wait(&ticket, Duration::from_millis(20)).await {
        Err(WaitError::Timeout { .. }) => {}
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unsupported_verb_fails_synchronously() {
    let api = MockApi::new();
    let mgr = manager(&api);

    match mgr.add_put(ResourceKind::Bundle, "b1", json!({}), None) {
        Err(OperationError::UnsupportedVerb { kind, verb }) => {
            assert_eq!(kind, ResourceKind::Bundle);
            assert_eq!(verb, Verb::Put);
        }
        other => panic!("expected unsupported verb, got {other:?}"),
    }
    assert_eq!(mgr.pending_count(ResourceKind::Bundle, Verb::Put), 0);

    assert!(mgr.add_delete(ResourceKind::Site, "s1", None).is_err());
    assert!(mgr
        .add_patch(ResourceKind::Bundle, "b1", json!({}), None)
        .is_ok());
}

#[tokio::test]
async fn test_should_flush_waits_for_quiescence() {
    let api = MockApi::new();
    let mgr = manager(&api);

    assert!(!mgr.should_flush());
    mgr.add_put(ResourceKind::Gateway, "g1", json!({}), None)
        .unwrap();
    assert!(!mgr.should_flush());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(mgr.should_flush());
}

#[tokio::test]
async fn test_execute_if_multiple_is_a_no_op_when_empty() {
    let api = MockApi::new();
    let mgr = manager(&api);

    let diags = mgr.execute_if_multiple().await;
    assert!(diags.is_empty());
    assert!(api.recorded().is_empty());
}

#[tokio::test]
async fn test_has_pending_or_recent_tracks_flush() {
    let api = MockApi::new();
    let mgr = manager(&api);

    assert!(!mgr.has_pending_or_recent(ResourceKind::Gateway));
    mgr.add_patch(ResourceKind::Gateway, "g1", json!({}), None)
        .unwrap();
    assert!(mgr.has_pending_or_recent(ResourceKind::Gateway));

    mgr.flush_all().await;
    // Buffer drained, but the batch just completed: still within the
    // recent-ops window.
    assert!(mgr.has_pending_or_recent(ResourceKind::Gateway));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!mgr.has_pending_or_recent(ResourceKind::Gateway));
}

#[tokio::test]
async fn test_cache_invalidator_runs_after_successful_flush() {
    let api = MockApi::new();
    let invalidated: Arc<Mutex<Vec<ResourceKind>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = invalidated.clone();
    let mgr = Manager::new(api.clone() as Arc<dyn VerityApi>, EngineConfig::fast())
        .with_cache_invalidator(Box::new(move |kind| sink.lock().unwrap().push(kind)));

    mgr.add_patch(ResourceKind::Gateway, "g1", json!({}), None)
        .unwrap();
    mgr.flush_all().await;

    let kinds = invalidated.lock().unwrap();
    assert_eq!(kinds.len(), ResourceKind::ALL.len());
    assert!(kinds.contains(&ResourceKind::Gateway));
}
