//! bhvis renders numerical-relativity output into animation frames.
//!
//! The pipeline is staged and deterministic:
//!
//! - Load a [`SimulationDataset`] through an adapter ([`load_dataset`])
//! - Compute run-global [`NormalizationParams`] once ([`normalize()`])
//! - Stream every time-step through a [`RenderSession`] into a [`FrameSink`]
//! - Hand the committed image sequence to `ffmpeg` ([`FfmpegEncoder`])
//!
//! Frames are rendered in parallel but always delivered in time-step order, and every frame
//! uses the same value domain, bounds and camera framing.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Job configuration.
pub mod config;
/// Dataset model and loaders.
pub mod data;
/// Frame sinks and encoder hand-off.
pub mod encode;
/// Field normalization.
pub mod normalize;
/// Rendering backends.
pub mod render;
/// Scene model and construction.
pub mod scene;
/// Frame ordering and gap handling.
pub mod sequence;
/// Session-oriented rendering API.
pub mod session;

pub use crate::foundation::core::{Aabb3, Fps, FrameIndex, Resolution, Rgba8, Vec3, bounds_of};
pub use crate::foundation::error::{VisError, VisResult};

pub use crate::config::job::{JobConfig, OutputOpts};
pub use crate::data::adapter::{
    AdapterRegistry, DatasetAdapter, GridPolicy, InputFormat, LoadOptions, load_dataset,
};
pub use crate::data::model::{
    DatasetMetadata, FieldSample, FieldValues, GridGeometry, SimulationDataset, TimeStep,
    TrajectoryMarker,
};
pub use crate::encode::ffmpeg::{EncodeConfig, FfmpegEncoder, is_ffmpeg_on_path};
pub use crate::encode::image_seq::{ImageSequenceSink, SequenceManifest, verify_sequence};
pub use crate::encode::sink::{FrameSink, InMemorySink, SequenceReport, SinkConfig};
pub use crate::normalize::compute::normalize;
pub use crate::normalize::params::{NormalizationParams, NormalizeOpts};
pub use crate::render::backend::{
    Background, BackendFactory, BackendKind, FrameRGBA, RenderBackend, RenderConfig,
    backend_factory, create_backend,
};
pub use crate::render::cpu::CpuBackend;
pub use crate::scene::builder::{SceneBuilder, SceneOpts};
pub use crate::scene::camera::{CameraMode, Light};
pub use crate::scene::colormap::{ColorMap, ColorRamp};
pub use crate::scene::model::{Primitive, Scene};
pub use crate::scene::tracks::Trajectories;
pub use crate::sequence::reorder::GapPolicy;
pub use crate::session::cancel::CancelToken;
pub use crate::session::pipeline::{ContextPolicy, FailurePolicy, RenderSession, SessionOpts};
pub use crate::session::summary::{RunSummary, SkippedFrame};
