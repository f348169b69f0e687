//! Media records as the storage collaborator hands them to us.

use crate::models::access::AccessType;
use std::{path::PathBuf, time::SystemTime};
use uuid::Uuid;

/// A stored media file, resolved by its public identifier.
///
/// Size and modification time are deliberately absent: they are read from
/// the file system when the request is authorized, never from the record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRecord {
    /// Opaque public identifier used in URLs.
    pub id: Uuid,

    /// Absolute path of the payload on disk.
    pub path: PathBuf,

    /// Stored MIME type, sent back as `Content-Type`.
    pub mime_type: String,

    /// Display filename used in `Content-Disposition`.
    pub file_name: String,
}

impl MediaRecord {
    pub fn new(
        id: Uuid,
        path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            path: path.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }
}

/// The outcome of a successful validation: a record, the operation that was
/// authorized for it, and the live file metadata read after authorization.
#[derive(Clone, Debug)]
pub struct AuthorizedMediaHandle {
    pub media: MediaRecord,
    pub access: AccessType,
    pub size: u64,
    pub modified: SystemTime,
}
