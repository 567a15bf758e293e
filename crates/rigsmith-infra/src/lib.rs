//! Infrastructure layer for Rigsmith.
//!
//! Contains the filesystem and process implementations of the ports defined in
//! `rigsmith-core`: the JSON artifact store, rig and archetype file I/O, the
//! `rigsmith.toml` loader, the hook process runner, and rig publishing.

pub mod archetype_library;
pub mod artifact;
pub mod config;
pub mod hook_runner;
pub mod publish;
pub mod rig_file;

mod atomic;
