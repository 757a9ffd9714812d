//! `PinVault` HTTP server.
//!
//! Wires the core library and a storage backend into an Axum server that
//! serves the JSON API at `/v1/*`. One server process is one browsing
//! session.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware as axum_mw;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::middleware::session_middleware;
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Credential and preference routes need a granted session.
    let session_routes = Router::new()
        .nest("/v1/credentials", routes::credentials::router())
        .nest("/v1/preferences", routes::preferences::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            session_middleware,
        ));

    // Bound concurrent PIN and recovery requests.
    let gate_routes = Router::new()
        .nest("/v1/gate", routes::gate::router())
        .nest("/v1/recovery", routes::recovery::router())
        .layer(tower::limit::ConcurrencyLimitLayer::new(4));

    Router::new()
        .nest("/v1/sys", routes::sys::router())
        .nest("/v1/tools", routes::tools::router())
        .merge(gate_routes)
        .merge(session_routes)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Allow browser pages served from `origins` to call the API.
///
/// With no valid origins the router is returned unchanged and no response
/// carries `access-control-allow-origin`.
pub fn with_cors(router: Router, origins: &[String]) -> Router {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return router;
    }

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE]);
    router.layer(cors)
}
