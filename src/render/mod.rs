//! Rendering backends.

/// Backend trait, frames and raster configuration.
pub mod backend;
/// `vello_cpu` backend.
pub mod cpu;
