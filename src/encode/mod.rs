//! Frame sinks and the external encoder hand-off.
//!
//! Sinks consume frames in strict index order and publish nothing until the run commits.

/// `ffmpeg` hand-off over a committed image sequence.
pub mod ffmpeg;
/// Numbered PNG sequence with manifest.
pub mod image_seq;
/// Generic frame sink trait and the in-memory sink.
pub mod sink;
