//! Per-request authorization decisions.
//!
//! A gate answers three ways so that "nobody wrote a rule for this file"
//! stays distinguishable from "a rule says no". Whether the former allows
//! access is decided by the validator's strict flag, not by the gate.

use crate::{
    errors::StoreError,
    models::{access::AccessType, media::MediaRecord, principal::Principal},
};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Subject/access wildcard in `media_grants`.
pub const ANY: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    NoPolicy,
}

#[async_trait]
pub trait AccessGate: Send + Sync {
    /// `principal` is `None` for anonymous callers.
    async fn decide(
        &self,
        principal: Option<&Principal>,
        media: &MediaRecord,
        access: AccessType,
    ) -> Result<Decision, StoreError>;
}

/// `AccessGate` backed by the `media_grants` table.
///
/// A media file with no grant rows has no policy. Otherwise access is
/// allowed when a row matches both the subject (principal id or `*`) and
/// the access type (or `*`).
#[derive(Clone)]
pub struct SqliteAccessGate {
    db: Arc<SqlitePool>,
}

impl SqliteAccessGate {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessGate for SqliteAccessGate {
    async fn decide(
        &self,
        principal: Option<&Principal>,
        media: &MediaRecord,
        access: AccessType,
    ) -> Result<Decision, StoreError> {
        let rules: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_grants WHERE media_id = ?")
            .bind(media.id)
            .fetch_one(&*self.db)
            .await?;
        if rules == 0 {
            return Ok(Decision::NoPolicy);
        }

        // Anonymous callers can only match the wildcard subject.
        let subject = principal.map(|p| p.id.as_str()).unwrap_or(ANY);
        let matching: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM media_grants
             WHERE media_id = ?
               AND subject IN (?, ?)
               AND access IN (?, ?)",
        )
        .bind(media.id)
        .bind(subject)
        .bind(ANY)
        .bind(access.as_str())
        .bind(ANY)
        .fetch_one(&*self.db)
        .await?;

        Ok(if matching > 0 {
            Decision::Allow
        } else {
            Decision::Deny
        })
    }
}
