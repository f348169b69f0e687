//! The authenticated caller, as established by an upstream session layer.

use serde::{Deserialize, Serialize};

/// An authenticated user. Only the identifier is known to this service.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal {
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
