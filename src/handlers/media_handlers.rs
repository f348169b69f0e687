//! HTTP handler for media delivery.
//! Authorization has already happened in the route middleware; this only
//! shapes the response and streams the file body.

use crate::{errors::MediaError, models::media::AuthorizedMediaHandle, state::AppState};
use axum::{
    Extension,
    extract::State,
    http::HeaderMap,
    response::Response,
};

/// `GET /{prefix}/{access}/{id}` and `GET /{signed_prefix}/{access}/{id}`.
pub async fn serve_media(
    State(state): State<AppState>,
    Extension(handle): Extension<AuthorizedMediaHandle>,
    headers: HeaderMap,
) -> Result<Response, MediaError> {
    state.responder.respond(&handle, &headers).await
}
