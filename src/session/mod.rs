//! Parallel, ordered rendering runs.

/// Cooperative cancellation.
pub mod cancel;
/// The render session.
pub mod pipeline;
/// Run summary.
pub mod summary;
