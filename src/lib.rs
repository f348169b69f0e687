//! Authorized media delivery.
//!
//! Media files are served either to session-authenticated callers, subject to
//! a pluggable access gate, or to anyone holding a time-limited signed link.
//! Responses carry cache validators and are streamed with a fixed-size buffer.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use errors::MediaError;
pub use routes::routes::routes as app;
pub use state::AppState;
