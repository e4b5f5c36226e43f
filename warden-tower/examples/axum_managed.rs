//! Axum example: guard a route with a `WardenLayer`.
//!
//! Configures a `checkout` resource with a QPS flow rule and a circuit
//! breaker keyed on exception ratio, then serves it behind axum.
//!
//! ```bash
//! hey -n 200 -c 1 -q 50 http://localhost:3000/checkout
//! ```
//!
//! You should see a mix of `200`s and `429`s (flow control) once the
//! configured rate is exceeded.

use std::net::SocketAddr;

use axum::Router;
use axum::error_handling::HandleErrorLayer;
use axum::extract::ConnectInfo;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use tower::BoxError;
use tower::ServiceBuilder;

use warden_core::Registry;
use warden_core::rules::DegradeGrade;
use warden_core::rules::DegradeRule;
use warden_core::rules::FlowRule;
use warden_core::rules::Grade;
use warden_tower::WardenError;
use warden_tower::WardenLayer;

/// `WardenService` rejects with a boxed error so it stays usable behind
/// non-axum `tower::Service`s too; axum's router needs an infallible
/// service, so `HandleErrorLayer` downcasts back to `WardenError` here.
async fn handle_warden_error(err: BoxError) -> Response {
    match err.downcast::<WardenError>() {
        Ok(warden_err) => warden_err.into_response(),
        Err(err) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[tokio::main]
async fn main() {
    let registry = Registry::new();

    registry.flow_rules.set("checkout", vec![FlowRule::new("checkout", Grade::Qps, 10.0)]);
    registry.degrade_rules.set(
        "checkout",
        vec![DegradeRule::new("checkout", DegradeGrade::ExRatio, 0.5, 10)],
    );

    let layer = WardenLayer::new(registry, "checkout")
        .with_origin(|ConnectInfo(addr): &ConnectInfo<SocketAddr>| addr.ip().to_string());

    let app = Router::new().route("/checkout", get(|| async { "checked out" })).layer(
        ServiceBuilder::new().layer(HandleErrorLayer::new(handle_warden_error)).layer(layer),
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    println!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.unwrap();
}
