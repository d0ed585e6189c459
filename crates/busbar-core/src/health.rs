use axum::http::StatusCode;

/// Handler for `GET /healthz` — liveness only.
///
/// Readiness is service-specific (a consumer gates on its store, a
/// gateway on its brokers), so every service mounts its own `/readyz`.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
