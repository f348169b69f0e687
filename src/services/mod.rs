//! The media delivery pipeline and its collaborators.
//!
//! Request flow: `validator` (using `media_lookup`, `access_gate` or
//! `signing`) → `cache` → `responder` (using `filename`).

pub mod access_gate;
pub mod cache;
pub mod filename;
pub mod media_lookup;
pub mod responder;
pub mod signing;
pub mod urls;
pub mod validator;
