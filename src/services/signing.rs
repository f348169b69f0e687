//! Time-limited signed links.
//!
//! A link binds `(access type, media id, expiry)` under an HMAC-SHA256 keyed
//! with the process-wide signing secret. Nothing is stored: verification
//! recomputes the MAC from the request and compares it in constant time.
//!
//! The canonical message length-prefixes each field so that no two distinct
//! tuples serialize to the same bytes.

use crate::models::access::AccessType;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// When an issued link stops being valid.
#[derive(Clone, Copy, Debug)]
pub enum Expiration {
    /// The configured default TTL from now.
    Default,
    /// A relative number of minutes from now; negative values are allowed.
    Minutes(i64),
    /// A relative duration from now.
    In(Duration),
    /// An absolute instant.
    At(DateTime<Utc>),
}

/// An issued link. `expires` is a unix timestamp in seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedLink {
    pub access: AccessType,
    pub media_id: Uuid,
    pub expires: i64,
    pub signature: String,
}

impl SignedLink {
    /// The query string carried by the signed route.
    pub fn query(&self) -> String {
        format!("expires={}&signature={}", self.expires, self.signature)
    }
}

/// The signature-bearing query parameters of a signed request.
///
/// Both are optional at the extractor level so that a missing parameter is
/// reported as an invalid signature instead of a generic 400.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SignatureQuery {
    pub expires: Option<String>,
    pub signature: Option<String>,
}

/// The requested expiry cannot be represented as a timestamp.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("link expiry is out of range")]
pub struct ExpiryOutOfRange;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature is missing or malformed")]
    Malformed,
    #[error("signature does not match")]
    Mismatch,
    #[error("signature has expired")]
    Expired,
}

/// Issues and verifies signed links.
#[derive(Clone)]
pub struct LinkSigner {
    secret: Vec<u8>,
    /// `None` when the configured minutes overflow a `Duration`.
    default_ttl: Option<Duration>,
}

impl std::fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSigner")
            .field("secret", &"<redacted>")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl LinkSigner {
    pub fn new(secret: impl AsRef<[u8]>, default_ttl_minutes: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            default_ttl: Duration::try_minutes(default_ttl_minutes),
        }
    }

    /// Resolve an expiration against `now` into a unix timestamp.
    pub fn expires_at(
        &self,
        expiration: Expiration,
        now: DateTime<Utc>,
    ) -> Result<i64, ExpiryOutOfRange> {
        let offset = match expiration {
            Expiration::Default => self.default_ttl,
            Expiration::Minutes(minutes) => Duration::try_minutes(minutes),
            Expiration::In(duration) => Some(duration),
            Expiration::At(at) => return Ok(at.timestamp()),
        };
        offset
            .and_then(|offset| now.checked_add_signed(offset))
            .map(|instant| instant.timestamp())
            .ok_or(ExpiryOutOfRange)
    }

    pub fn issue(
        &self,
        access: AccessType,
        media_id: Uuid,
        expiration: Expiration,
    ) -> Result<SignedLink, ExpiryOutOfRange> {
        self.issue_at(access, media_id, expiration, Utc::now())
    }

    pub fn issue_at(
        &self,
        access: AccessType,
        media_id: Uuid,
        expiration: Expiration,
        now: DateTime<Utc>,
    ) -> Result<SignedLink, ExpiryOutOfRange> {
        let expires = self.expires_at(expiration, now)?;
        let signature = self.signature(access.as_str(), &media_id.to_string(), expires);
        Ok(SignedLink {
            access,
            media_id,
            expires,
            signature,
        })
    }

    /// The URL-safe MAC over a raw `(access, media id, expires)` tuple.
    ///
    /// Takes the route values as strings so that what is verified is exactly
    /// what the request carried.
    pub fn signature(&self, access: &str, media_id: &str, expires: i64) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(access, media_id, expires))
    }

    /// Verify a request's route values and query parameters at the current time.
    pub fn verify(
        &self,
        access: &str,
        media_id: &str,
        query: &SignatureQuery,
    ) -> Result<(), SignatureError> {
        self.verify_at(access, media_id, query, Utc::now())
    }

    /// Both the MAC and the expiry must pass; neither check short-circuits
    /// the other's cost.
    pub fn verify_at(
        &self,
        access: &str,
        media_id: &str,
        query: &SignatureQuery,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let expires = query
            .expires
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .ok_or(SignatureError::Malformed)?;
        let provided = query
            .signature
            .as_deref()
            .and_then(|raw| URL_SAFE_NO_PAD.decode(raw.trim()).ok())
            .ok_or(SignatureError::Malformed)?;

        let expected = self.mac(access, media_id, expires);
        let mac_ok: bool = expected.as_slice().ct_eq(provided.as_slice()).into();
        let expired = now.timestamp() > expires;

        if !mac_ok {
            return Err(SignatureError::Mismatch);
        }
        if expired {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    fn mac(&self, access: &str, media_id: &str, expires: i64) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(canonical_message(access, media_id, expires).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn canonical_message(access: &str, media_id: &str, expires: i64) -> String {
    format!(
        "{}:{}|{}:{}|{}",
        access.len(),
        access,
        media_id.len(),
        media_id,
        expires
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> LinkSigner {
        LinkSigner::new("test-secret", 60)
    }

    fn query_for(link: &SignedLink) -> SignatureQuery {
        SignatureQuery {
            expires: Some(link.expires.to_string()),
            signature: Some(link.signature.clone()),
        }
    }

    #[test]
    fn issued_link_verifies_before_expiry() {
        let signer = signer();
        let id = Uuid::new_v4();
        for access in AccessType::ALL {
            let link = signer.issue(access, id, Expiration::Default).unwrap();
            assert_eq!(
                signer.verify(access.as_str(), &id.to_string(), &query_for(&link)),
                Ok(())
            );
        }
    }

    #[test]
    fn default_ttl_is_applied() {
        let signer = signer();
        let now = Utc::now();
        let link = signer
            .issue_at(AccessType::View, Uuid::new_v4(), Expiration::Default, now)
            .unwrap();
        assert_eq!(link.expires, (now + Duration::minutes(60)).timestamp());
    }

    #[test]
    fn every_expiration_form_resolves() {
        let signer = signer();
        let now = Utc::now();
        let at = now + Duration::hours(24);

        assert_eq!(
            signer.expires_at(Expiration::Minutes(120), now),
            Ok((now + Duration::minutes(120)).timestamp())
        );
        assert_eq!(
            signer.expires_at(Expiration::In(Duration::seconds(90)), now),
            Ok((now + Duration::seconds(90)).timestamp())
        );
        assert_eq!(signer.expires_at(Expiration::At(at), now), Ok(at.timestamp()));
    }

    #[test]
    fn unrepresentable_expiries_are_errors() {
        let id = Uuid::new_v4();
        assert_eq!(
            signer().issue(AccessType::View, id, Expiration::Minutes(1_000_000_000_000)),
            Err(ExpiryOutOfRange)
        );
        assert_eq!(
            signer().issue(AccessType::View, id, Expiration::Minutes(i64::MIN)),
            Err(ExpiryOutOfRange)
        );

        let huge_default = LinkSigner::new("test-secret", i64::MAX);
        assert_eq!(
            huge_default.issue(AccessType::View, id, Expiration::Default),
            Err(ExpiryOutOfRange)
        );
    }

    #[test]
    fn negative_ttl_is_rejected_immediately() {
        let signer = signer();
        let id = Uuid::new_v4();
        let link = signer.issue(AccessType::Download, id, Expiration::Minutes(-1)).unwrap();
        assert_eq!(
            signer.verify("download", &id.to_string(), &query_for(&link)),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn link_expires_once_the_clock_passes_it() {
        let signer = signer();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let link = signer.issue_at(AccessType::View, id, Expiration::Minutes(5), now).unwrap();
        let query = query_for(&link);

        assert_eq!(
            signer.verify_at("view", &id.to_string(), &query, now + Duration::minutes(5)),
            Ok(())
        );
        assert_eq!(
            signer.verify_at(
                "view",
                &id.to_string(),
                &query,
                now + Duration::minutes(5) + Duration::seconds(1)
            ),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn tampering_with_any_signature_byte_is_rejected() {
        let signer = signer();
        let id = Uuid::new_v4();
        let link = signer.issue(AccessType::View, id, Expiration::Default).unwrap();

        for position in 0..link.signature.len() {
            let mut bytes = link.signature.clone().into_bytes();
            bytes[position] = if bytes[position] == b'A' { b'B' } else { b'A' };
            let tampered = SignatureQuery {
                expires: Some(link.expires.to_string()),
                signature: Some(String::from_utf8(bytes).unwrap()),
            };
            assert!(
                signer.verify("view", &id.to_string(), &tampered).is_err(),
                "accepted tampering at byte {position}"
            );
        }
    }

    #[test]
    fn link_is_bound_to_access_type_resource_and_expiry() {
        let signer = signer();
        let id = Uuid::new_v4();
        let link = signer.issue(AccessType::View, id, Expiration::Default).unwrap();
        let query = query_for(&link);

        assert_eq!(
            signer.verify("download", &id.to_string(), &query),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            signer.verify("view", &Uuid::new_v4().to_string(), &query),
            Err(SignatureError::Mismatch)
        );

        let extended = SignatureQuery {
            expires: Some((link.expires + 3600).to_string()),
            signature: Some(link.signature.clone()),
        };
        assert_eq!(
            signer.verify("view", &id.to_string(), &extended),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn links_from_another_secret_are_rejected() {
        let id = Uuid::new_v4();
        let link = LinkSigner::new("other-secret", 60)
            .issue(AccessType::View, id, Expiration::Default)
            .unwrap();
        assert_eq!(
            signer().verify("view", &id.to_string(), &query_for(&link)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn missing_or_garbled_parameters_are_malformed() {
        let signer = signer();
        let id = Uuid::new_v4().to_string();

        let cases = [
            SignatureQuery::default(),
            SignatureQuery {
                expires: Some("soon".into()),
                signature: Some("abc".into()),
            },
            SignatureQuery {
                expires: Some("1700000000".into()),
                signature: None,
            },
            SignatureQuery {
                expires: Some("1700000000".into()),
                signature: Some("not base64!".into()),
            },
        ];
        for query in cases {
            assert_eq!(
                signer.verify("view", &id, &query),
                Err(SignatureError::Malformed),
                "{query:?}"
            );
        }
    }

    #[test]
    fn canonical_message_is_unambiguous() {
        assert_ne!(
            canonical_message("view", "ab", 1),
            canonical_message("viewa", "b", 1)
        );
    }

    #[test]
    fn debug_output_redacts_the_secret() {
        let rendered = format!("{:?}", signer());
        assert!(!rendered.contains("test-secret"));
    }
}
