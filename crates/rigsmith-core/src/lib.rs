//! Build pipeline and port trait definitions for Rigsmith.
//!
//! This crate owns the scene, artifact-store, and hook-runner "ports" that the
//! infrastructure layer implements, plus everything that runs against them:
//! dependency resolution, archetype layering, component types, and the stage
//! orchestrator. It depends only on `rigsmith-types`, never on
//! `rigsmith-infra` or any filesystem/process code.

pub mod archetype;
pub mod artifact;
pub mod component;
pub mod components;
pub mod container;
pub mod event;
pub mod hook;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod scene;
pub mod session;
