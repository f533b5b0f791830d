//! API Router configuration

use super::accounts_handler::{
    list_accounts, register_account, set_default_account, unregister_account,
};
use super::calls_handler::{get_call, incoming_call, list_calls, place_call};
use super::metrics_handler::{health_check, metrics_handler, track_metrics};
use super::state::AppState;
use super::ws_handler::ws_handler;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let health_routes = Router::new().route("/health", get(health_check));

    let account_routes = Router::new()
        .route("/accounts", get(list_accounts).post(register_account))
        .route("/accounts/default", put(set_default_account))
        .route("/accounts/:provider/:account", delete(unregister_account));

    let call_routes = Router::new()
        .route("/calls", get(list_calls).post(place_call))
        .route("/calls/incoming", post(incoming_call))
        .route("/calls/:call_id", get(get_call));

    let ws_routes = Router::new().route("/ws", get(ws_handler));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    Router::new()
        .merge(health_routes)
        .merge(account_routes)
        .merge(call_routes)
        .merge(ws_routes)
        .with_state(state)
        .merge(metrics_routes)
        .layer(middleware::from_fn(track_metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
