//! The closed set of operations a media URL can request.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// What the caller wants to do with a media file.
///
/// The access type only shapes the response (inline vs attachment); it is
/// also the operation name handed to the `AccessGate` and bound into
/// signed links.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    View,
    Download,
    Stream,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown access type `{0}`")]
pub struct UnknownAccessType(pub String);

impl AccessType {
    /// Every accepted access type, in route order.
    pub const ALL: [AccessType; 3] = [AccessType::View, AccessType::Download, AccessType::Stream];

    pub fn as_str(self) -> &'static str {
        match self {
            AccessType::View => "view",
            AccessType::Download => "download",
            AccessType::Stream => "stream",
        }
    }

    /// Case-sensitive membership test against the accepted route values.
    pub fn acceptable(candidate: &str) -> bool {
        Self::ALL.iter().any(|access| access.as_str() == candidate)
    }

    /// Whether the response is sent as an attachment rather than rendered inline.
    pub fn is_attachment(self) -> bool {
        matches!(self, AccessType::Download)
    }
}

impl FromStr for AccessType {
    type Err = UnknownAccessType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|access| access.as_str() == s)
            .ok_or_else(|| UnknownAccessType(s.to_string()))
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
