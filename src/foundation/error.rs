/// Convenience result alias used across the crate.
pub type VisResult<T> = Result<T, VisError>;

/// Error taxonomy for the load → normalize → build → render → sequence pipeline.
///
/// Stage-level variants (`Format`, `IncompleteData`, `GridMismatch`, `EmptyDataset`) are always
/// fatal. `MissingGeometry` and `RenderBackend` are frame-local and may be recovered from by the
/// session depending on its failure policy. `Gap` is raised by the sequencer after all producers
/// have finished.
#[derive(thiserror::Error, Debug)]
pub enum VisError {
    /// Unrecognized or corrupt input structure.
    #[error("format error: {0}")]
    Format(String),

    /// Required data is missing (e.g. a referenced trajectory file).
    #[error("incomplete data: {0}")]
    IncompleteData(String),

    /// Time-steps disagree on their sampling grid and the policy rejects it.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    /// The dataset has no time-steps (or no usable field values).
    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    /// A time-step produced no renderable geometry.
    #[error("missing geometry: {0}")]
    MissingGeometry(String),

    /// The rendering backend failed (or the watchdog expired).
    #[error("render backend error: {0}")]
    RenderBackend(String),

    /// The assembled frame sequence has holes.
    #[error("gap error: {} missing frame(s): {}", missing.len(), format_indices(missing))]
    Gap {
        /// Missing frame indices in increasing order.
        missing: Vec<u64>,
    },

    /// Invalid configuration or API usage.
    #[error("validation error: {0}")]
    Validation(String),

    /// The run was stopped between time-steps.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// IO and other contextual failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VisError {
    /// Build a [`VisError::Format`].
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Build a [`VisError::IncompleteData`].
    pub fn incomplete(msg: impl Into<String>) -> Self {
        Self::IncompleteData(msg.into())
    }

    /// Build a [`VisError::GridMismatch`].
    pub fn grid_mismatch(msg: impl Into<String>) -> Self {
        Self::GridMismatch(msg.into())
    }

    /// Build a [`VisError::EmptyDataset`].
    pub fn empty_dataset(msg: impl Into<String>) -> Self {
        Self::EmptyDataset(msg.into())
    }

    /// Build a [`VisError::MissingGeometry`].
    pub fn missing_geometry(msg: impl Into<String>) -> Self {
        Self::MissingGeometry(msg.into())
    }

    /// Build a [`VisError::RenderBackend`].
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::RenderBackend(msg.into())
    }

    /// Build a [`VisError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`VisError::Cancelled`].
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// `true` for errors that only affect a single frame.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, Self::MissingGeometry(_) | Self::RenderBackend(_))
    }
}

fn format_indices(missing: &[u64]) -> String {
    const SHOWN: usize = 16;
    let mut out = missing
        .iter()
        .take(SHOWN)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if missing.len() > SHOWN {
        out.push_str(&format!(", … (+{})", missing.len() - SHOWN));
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
