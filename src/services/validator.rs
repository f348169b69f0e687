//! The request validation pipeline.
//!
//! Every request walks the same states in order and stops at the first
//! failure:
//!
//! 1. access type check (422)
//! 2. record resolution (404)
//! 3. session authorization (401/403) or signature verification (403)
//! 4. file presence on disk (404)
//!
//! The file check runs last so that a missing payload is only observable by
//! callers who were already authorized.

use crate::{
    errors::{MediaError, StoreError},
    models::{
        access::AccessType,
        media::{AuthorizedMediaHandle, MediaRecord},
        principal::Principal,
    },
    services::{
        access_gate::{AccessGate, Decision},
        media_lookup::MediaLookup,
        signing::{LinkSigner, SignatureError, SignatureQuery},
    },
};
use std::{io, sync::Arc};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Process-wide authorization switches.
#[derive(Clone, Copy, Debug)]
pub struct AccessPolicy {
    /// Session requests without a principal are rejected with 401.
    pub require_auth: bool,
    /// `Decision::NoPolicy` denies instead of allowing.
    pub strict: bool,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            require_auth: true,
            strict: true,
        }
    }
}

/// How the caller claims the right to the file.
#[derive(Clone, Copy, Debug)]
pub enum Credentials<'a> {
    /// The session route; the principal is absent for anonymous callers.
    Session(Option<&'a Principal>),
    /// The signed route; the signature alone authorizes.
    Signed(&'a SignatureQuery),
}

pub struct RequestValidator {
    lookup: Arc<dyn MediaLookup>,
    gate: Arc<dyn AccessGate>,
    signer: Arc<LinkSigner>,
    policy: AccessPolicy,
}

impl RequestValidator {
    pub fn new(
        lookup: Arc<dyn MediaLookup>,
        gate: Arc<dyn AccessGate>,
        signer: Arc<LinkSigner>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            lookup,
            gate,
            signer,
            policy,
        }
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn lookup(&self) -> &Arc<dyn MediaLookup> {
        &self.lookup
    }

    /// Run the full pipeline for one request.
    pub async fn validate(
        &self,
        access: &str,
        media_id: &str,
        credentials: Credentials<'_>,
    ) -> Result<AuthorizedMediaHandle, MediaError> {
        if !AccessType::acceptable(access) {
            return Err(MediaError::InvalidAccessType(access.to_string()));
        }
        let access_type: AccessType = access
            .parse()
            .map_err(|_| MediaError::InvalidAccessType(access.to_string()))?;

        let media = self.resolve(media_id).await?;

        match credentials {
            Credentials::Session(principal) => {
                self.authorize_session(principal, &media, access_type).await?
            }
            Credentials::Signed(query) => {
                // Verify against the raw route values, exactly as they were signed.
                self.signer
                    .verify(access, media_id, query)
                    .map_err(|err| {
                        debug!(media_id = %media.id, access = %access_type, reason = %err, "signed link rejected");
                        match err {
                            SignatureError::Expired => MediaError::ExpiredSignature,
                            SignatureError::Malformed | SignatureError::Mismatch => {
                                MediaError::InvalidSignature
                            }
                        }
                    })?;
            }
        }

        let metadata = match fs::metadata(&media.path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(self.file_missing(&media)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(self.file_missing(&media));
            }
            Err(err) => return Err(StoreError::Io(err).into()),
        };
        let modified = metadata.modified().map_err(StoreError::Io)?;

        Ok(AuthorizedMediaHandle {
            media,
            access: access_type,
            size: metadata.len(),
            modified,
        })
    }

    /// Whether `principal` may perform `access` on `media`, with strict mode applied.
    pub async fn can_access(
        &self,
        principal: Option<&Principal>,
        media: &MediaRecord,
        access: AccessType,
    ) -> Result<bool, MediaError> {
        let decision = self.gate.decide(principal, media, access).await?;
        Ok(match decision {
            Decision::Allow => true,
            Decision::Deny => false,
            Decision::NoPolicy => !self.policy.strict,
        })
    }

    async fn resolve(&self, media_id: &str) -> Result<MediaRecord, MediaError> {
        // Anything that is not a UUID cannot name a record.
        let id = Uuid::parse_str(media_id).map_err(|_| MediaError::ResourceNotFound)?;
        self.lookup
            .find(id)
            .await?
            .ok_or(MediaError::ResourceNotFound)
    }

    async fn authorize_session(
        &self,
        principal: Option<&Principal>,
        media: &MediaRecord,
        access: AccessType,
    ) -> Result<(), MediaError> {
        if principal.is_none() && self.policy.require_auth {
            return Err(MediaError::AuthenticationRequired);
        }

        if self.can_access(principal, media, access).await? {
            Ok(())
        } else {
            debug!(
                media_id = %media.id,
                access = %access,
                principal = principal.map(|p| p.id.as_str()).unwrap_or("<anonymous>"),
                "access denied"
            );
            Err(MediaError::AccessDenied)
        }
    }

    fn file_missing(&self, media: &MediaRecord) -> MediaError {
        warn!(media_id = %media.id, "media record has no file on disk");
        MediaError::FileMissing
    }
}
