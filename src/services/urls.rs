//! Building links to media for other parts of an application.

use crate::{
    config::AppConfig,
    models::access::AccessType,
    services::signing::{Expiration, ExpiryOutOfRange, LinkSigner},
};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("signed media links are disabled")]
    SignedLinksDisabled,
    #[error(transparent)]
    Expiry(#[from] ExpiryOutOfRange),
}

/// Session and signed URL builder for media ids.
#[derive(Clone, Debug)]
pub struct MediaUrls {
    base_url: String,
    prefix: String,
    signed_prefix: String,
    signed_enabled: bool,
    signer: Arc<LinkSigner>,
}

impl MediaUrls {
    pub fn new(config: &AppConfig, signer: Arc<LinkSigner>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            prefix: config.prefix.clone(),
            signed_prefix: config.signed_prefix.clone(),
            signed_enabled: config.signed_enabled,
            signer,
        }
    }

    /// URL on the session-authenticated route.
    pub fn url(&self, access: AccessType, media_id: Uuid) -> String {
        format!("{}/{}/{}/{}", self.base_url, self.prefix, access, media_id)
    }

    pub fn view_url(&self, media_id: Uuid) -> String {
        self.url(AccessType::View, media_id)
    }

    pub fn download_url(&self, media_id: Uuid) -> String {
        self.url(AccessType::Download, media_id)
    }

    pub fn stream_url(&self, media_id: Uuid) -> String {
        self.url(AccessType::Stream, media_id)
    }

    /// Time-limited URL on the signed route, usable without a session.
    pub fn signed_url(
        &self,
        access: AccessType,
        media_id: Uuid,
        expiration: Expiration,
    ) -> Result<String, UrlError> {
        if !self.signed_enabled {
            return Err(UrlError::SignedLinksDisabled);
        }
        let link = self.signer.issue(access, media_id, expiration)?;
        Ok(format!(
            "{}/{}/{}/{}?{}",
            self.base_url,
            self.signed_prefix,
            access,
            media_id,
            link.query()
        ))
    }

    pub fn signed_view_url(&self, media_id: Uuid, expiration: Expiration) -> Result<String, UrlError> {
        self.signed_url(AccessType::View, media_id, expiration)
    }

    pub fn signed_download_url(
        &self,
        media_id: Uuid,
        expiration: Expiration,
    ) -> Result<String, UrlError> {
        self.signed_url(AccessType::Download, media_id, expiration)
    }

    pub fn signed_stream_url(
        &self,
        media_id: Uuid,
        expiration: Expiration,
    ) -> Result<String, UrlError> {
        self.signed_url(AccessType::Stream, media_id, expiration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(signed_enabled: bool) -> MediaUrls {
        let config = AppConfig {
            base_url: "https://cdn.example/".into(),
            signed_enabled,
            ..AppConfig::with_secret("url-secret")
        };
        MediaUrls::new(&config, Arc::new(LinkSigner::new("url-secret", 60)))
    }

    #[test]
    fn session_urls_follow_the_route_shape() {
        let id = Uuid::new_v4();
        let urls = urls(true);
        assert_eq!(urls.view_url(id), format!("https://cdn.example/media/view/{id}"));
        assert_eq!(
            urls.download_url(id),
            format!("https://cdn.example/media/download/{id}")
        );
        assert_eq!(urls.stream_url(id), format!("https://cdn.example/media/stream/{id}"));
    }

    #[test]
    fn signed_urls_carry_expiry_and_signature() {
        let id = Uuid::new_v4();
        let url = urls(true).signed_view_url(id, Expiration::Minutes(30)).unwrap();

        assert!(url.starts_with(&format!("https://cdn.example/media-signed/view/{id}?")));
        assert!(url.contains("expires="));
        assert!(url.contains("&signature="));

        for url in [
            urls(true).signed_download_url(id, Expiration::Default).unwrap(),
            urls(true).signed_stream_url(id, Expiration::Default).unwrap(),
        ] {
            assert!(url.contains("signature="));
        }
    }

    #[test]
    fn signed_urls_can_be_disabled() {
        assert_eq!(
            urls(false).signed_view_url(Uuid::new_v4(), Expiration::Default),
            Err(UrlError::SignedLinksDisabled)
        );
    }

    #[test]
    fn out_of_range_expiry_is_reported() {
        assert_eq!(
            urls(true).signed_stream_url(Uuid::new_v4(), Expiration::Minutes(1_000_000_000_000)),
            Err(UrlError::Expiry(ExpiryOutOfRange))
        );
    }
}
