//! Logging and trace export for rigsmith binaries.

pub mod span_attrs;
pub mod tracing_setup;
