use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::task::Context as TaskContext;
use std::task::Poll;

use futures::future::Ready;
use futures::future::ready;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceExt;

use warden_core::Registry;
use warden_core::rules::FlowRule;
use warden_core::rules::Grade;

use super::*;

#[derive(Clone)]
struct CountingService {
    count: Arc<AtomicUsize>,
}

impl Service<()> for CountingService {
    type Response = ();
    type Error = BoxError;
    type Future = Ready<Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ()) -> Self::Future {
        self.count.fetch_add(1, Ordering::SeqCst);
        ready(Ok(()))
    }
}

fn counting_service() -> (CountingService, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (CountingService { count: count.clone() }, count)
}

#[tokio::test]
async fn admits_calls_under_the_configured_threshold() {
    let registry = Registry::new();
    registry.flow_rules.set("checkout", vec![FlowRule::new("checkout", Grade::Qps, 100.0)]);
    let layer = WardenLayer::new(registry, "checkout");

    let (svc, count) = counting_service();
    let mut service = layer.layer(svc);

    service.ready().await.unwrap().call(()).await.unwrap();
    service.ready().await.unwrap().call(()).await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn blocks_calls_once_the_flow_rule_trips() {
    let registry = Registry::new();
    registry.flow_rules.set("checkout", vec![FlowRule::new("checkout", Grade::Qps, 1.0)]);
    let layer = WardenLayer::new(registry, "checkout");

    let (svc, count) = counting_service();
    let mut service = layer.layer(svc);

    service.ready().await.unwrap().call(()).await.unwrap();
    let err = service.ready().await.unwrap().call(()).await.unwrap_err();
    assert!(err.downcast_ref::<WardenError>().is_some());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_resources_are_shaped_independently() {
    let registry = Registry::new();
    registry.flow_rules.set("checkout", vec![FlowRule::new("checkout", Grade::Qps, 1.0)]);
    registry.flow_rules.set("search", vec![FlowRule::new("search", Grade::Qps, 1.0)]);

    let (checkout_svc, checkout_count) = counting_service();
    let (search_svc, search_count) = counting_service();

    let mut checkout = WardenLayer::new(registry.clone(), "checkout").layer(checkout_svc);
    let mut search = WardenLayer::new(registry, "search").layer(search_svc);

    checkout.ready().await.unwrap().call(()).await.unwrap();
    assert!(checkout.ready().await.unwrap().call(()).await.is_err());

    search.ready().await.unwrap().call(()).await.unwrap();
    assert_eq!(checkout_count.load(Ordering::SeqCst), 1);
    assert_eq!(search_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejects_origins_not_on_the_allow_list() {
    use warden_core::rules::AuthorityRule;
    use warden_core::rules::AuthorityStrategy;

    let registry = Registry::new();
    registry.authority_rules.set(
        "checkout",
        vec![AuthorityRule {
            resource: "checkout".to_string(),
            strategy: AuthorityStrategy::White,
            limit_app: "trusted-caller".to_string(),
        }],
    );
    let layer = WardenLayer::new(registry, "checkout").with_origin(|_: &()| "stranger".to_string());

    let (svc, _count) = counting_service();
    let mut service = layer.layer(svc);

    let err = service.ready().await.unwrap().call(()).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<WardenError>(), Some(WardenError::AuthorityRejected { .. })));
}

#[tokio::test]
async fn business_error_classifier_trips_exception_accounting_without_rejecting() {
    #[derive(Clone)]
    struct AlwaysFails;

    impl Service<()> for AlwaysFails {
        type Response = &'static str;
        type Error = BoxError;
        type Future = Ready<Result<&'static str, BoxError>>;

        fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: ()) -> Self::Future {
            ready(Ok("business-failure"))
        }
    }

    let registry = Registry::new();
    let layer = WardenLayer::new(registry, "checkout");
    let mut service = layer.layer(AlwaysFails).with_business_error(|resp: &&str| *resp == "business-failure");

    let resp = service.ready().await.unwrap().call(()).await.unwrap();
    assert_eq!(resp, "business-failure");
}

#[tokio::test]
async fn a_rule_with_zero_threshold_blocks_every_call() {
    let registry = Registry::new();
    registry.flow_rules.set("checkout", vec![FlowRule::new("checkout", Grade::Qps, 0.0)]);
    let layer = WardenLayer::new(registry, "checkout");

    let (svc, _count) = counting_service();
    let mut service = layer.layer(svc);

    let err = service.ready().await.unwrap().call(()).await.unwrap_err();
    let warden_err = err.downcast::<WardenError>().expect("error should be a WardenError");
    assert!(matches!(*warden_err, WardenError::FlowLimited { .. }));
}
