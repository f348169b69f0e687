//! Shared, immutable per-process state handed to every handler.

use crate::{
    config::AppConfig,
    services::{
        access_gate::AccessGate,
        media_lookup::MediaLookup,
        responder::StreamingResponder,
        signing::LinkSigner,
        validator::RequestValidator,
    },
};
use anyhow::Result;
use axum::http::HeaderName;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub validator: Arc<RequestValidator>,
    pub responder: StreamingResponder,
    /// Header lifted into a `Principal` by `attach_principal`, when configured.
    pub principal_header: Option<HeaderName>,
}

impl AppState {
    /// Wire the pipeline together from a validated configuration and the
    /// two storage collaborators.
    pub fn new(
        config: AppConfig,
        lookup: Arc<dyn MediaLookup>,
        gate: Arc<dyn AccessGate>,
    ) -> Result<Self> {
        config.validate()?;
        let principal_header = config.principal_header_name()?;

        let signer = Arc::new(LinkSigner::new(
            config.signing_secret.as_bytes(),
            config.default_ttl_minutes,
        ));
        let validator = Arc::new(RequestValidator::new(
            lookup,
            gate,
            signer,
            config.policy(),
        ));
        let responder = StreamingResponder::new(config.chunk_size, config.cache_max_age());

        Ok(Self {
            config: Arc::new(config),
            validator,
            responder,
            principal_header,
        })
    }
}
