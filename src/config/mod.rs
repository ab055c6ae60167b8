//! Job configuration files.

/// `JobConfig` and its sections.
pub mod job;
