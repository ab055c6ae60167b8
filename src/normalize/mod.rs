//! Run-global normalization: value domain, spatial bounds and scales shared by every frame.

/// The normalization pass.
pub mod compute;
/// Options and the resulting immutable parameters.
pub mod params;
