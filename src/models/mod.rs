//! Core data models for the media gate.
//!
//! These types describe what a request asks for (`AccessType`), who is asking
//! (`Principal`) and what the storage collaborator resolved (`MediaRecord`).

pub mod access;
pub mod media;
pub mod principal;
