//! Shared domain types for rigsmith.
//!
//! This crate contains the data model used across the rig builder: rig
//! descriptions and component records, archetype templates, data artifacts,
//! build stages and reports, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, semver, thiserror.

pub mod archetype;
pub mod artifact;
pub mod build;
pub mod config;
pub mod error;
pub mod event;
pub mod paths;
pub mod rig;

mod serde_util;
