//! Route middleware: principal extraction and media validation.
//!
//! The validators run as route layers so that path parameters are available.
//! On success they leave an `AuthorizedMediaHandle` in the request
//! extensions for `serve_media`.

use crate::{
    errors::MediaError,
    models::principal::Principal,
    services::{signing::SignatureQuery, validator::Credentials},
    state::AppState,
};
use axum::{
    extract::{Path, Query, Request, State, rejection::QueryRejection},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Lift the principal set by an upstream authenticator into the request
/// extensions. A principal already present in the extensions wins, and
/// nothing is read from the headers unless a principal header is configured.
pub async fn attach_principal(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(header) = state.principal_header.as_ref() else {
        return next.run(request).await;
    };

    if request.extensions().get::<Principal>().is_none() {
        let principal = request
            .headers()
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(Principal::new);
        if let Some(principal) = principal {
            request.extensions_mut().insert(principal);
        }
    }

    next.run(request).await
}

/// Session route: access type, record, principal and policy checks.
pub async fn validate_media_access(
    State(state): State<AppState>,
    Path((access, id)): Path<(String, String)>,
    mut request: Request,
    next: Next,
) -> Result<Response, MediaError> {
    let principal = request.extensions().get::<Principal>().cloned();
    let handle = state
        .validator
        .validate(&access, &id, Credentials::Session(principal.as_ref()))
        .await?;

    request.extensions_mut().insert(handle);
    Ok(next.run(request).await)
}

/// Signed route: access type, record and signature checks. No session.
///
/// A query string that does not deserialize (duplicated keys, for one) is
/// treated as carrying no signature, so it fails as `InvalidSignature` at
/// the signature step rather than as a generic 400.
pub async fn validate_signed_media_access(
    State(state): State<AppState>,
    Path((access, id)): Path<(String, String)>,
    query: Result<Query<SignatureQuery>, QueryRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, MediaError> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            debug!(media_id = %id, error = %rejection, "unreadable signature query");
            SignatureQuery::default()
        }
    };

    let handle = state
        .validator
        .validate(&access, &id, Credentials::Signed(&query))
        .await?;

    request.extensions_mut().insert(handle);
    Ok(next.run(request).await)
}
