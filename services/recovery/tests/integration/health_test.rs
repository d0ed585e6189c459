use axum::http::StatusCode;
use axum_test::TestServer;
use sea_orm::DatabaseConnection;

use busbar_recovery::domain::types::ClusterTopology;
use busbar_recovery::infra::inspect::PayloadInspectorRegistry;
use busbar_recovery::router::build_router;
use busbar_recovery::state::AppState;

fn server() -> TestServer {
    let state = AppState {
        db: DatabaseConnection::default(),
        inspectors: PayloadInspectorRegistry::open(&ClusterTopology::default()),
    };
    TestServer::new(build_router(state)).unwrap()
}

#[tokio::test]
async fn should_serve_liveness_unconditionally() {
    let response = server().get("/healthz").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn should_gate_readiness_on_the_store() {
    // A disconnected store keeps the instance live but not ready.
    let response = server().get("/readyz").await;
    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}
