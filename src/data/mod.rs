//! Simulation-output loading.
//!
//! Adapters turn on-disk formats into a validated [`model::SimulationDataset`]; nothing
//! downstream sees a file format.

/// Adapter trait, registry and grid-consistency policy.
pub mod adapter;
pub(crate) mod ascii;
/// `bhvis.dataset` JSON adapter.
pub mod json;
/// In-memory dataset model.
pub mod model;
/// `bhvis.strain-run` adapter (strain mode + horizon trajectories).
pub mod strain;
