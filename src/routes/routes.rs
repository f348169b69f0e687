//! Defines routes for media delivery.
//!
//! ## Structure
//! - **Probes**
//!   - `GET /healthz`: liveness
//!   - `GET /readyz` : readiness
//!
//! - **Media endpoints**
//!   - `GET /{prefix}/{access}/{id}`: session route, principal + policy checks
//!   - `GET /{signed_prefix}/{access}/{id}?expires=&signature=`: signed route,
//!     mounted only when signed links are enabled
//!
//! `HEAD` is answered by the same handlers without a body.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        media_handlers::serve_media,
    },
    middleware::{attach_principal, validate_media_access, validate_signed_media_access},
    state::AppState,
};
use axum::{Router, http::StatusCode, middleware, routing::get};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Build the full router with state and layers applied.
pub fn routes(state: AppState) -> Router {
    let config = state.config.clone();

    let session = Router::new()
        .route(&media_path(&config.prefix), get(serve_media))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            validate_media_access,
        ));

    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(session);

    if config.signed_enabled {
        let signed = Router::new()
            .route(&media_path(&config.signed_prefix), get(serve_media))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                validate_signed_media_access,
            ));
        router = router.merge(signed);
    } else {
        tracing::info!("signed media routes disabled");
    }

    router
        .layer(middleware::from_fn_with_state(state.clone(), attach_principal))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn media_path(prefix: &str) -> String {
    format!("/{}/{{access}}/{{id}}", prefix)
}
