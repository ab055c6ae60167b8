//! Per-time-step scene construction.

/// Time-step to scene mapping.
pub mod builder;
/// Camera placement, projection and lighting.
pub mod camera;
/// Color ramps.
pub mod colormap;
/// Marching-squares iso-contours.
pub mod contour;
/// Backend-independent scene model.
pub mod model;
/// Precomputed trajectory paths.
pub mod tracks;
