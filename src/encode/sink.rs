use crate::foundation::core::{Fps, FrameIndex, Resolution};
use crate::foundation::error::{VisError, VisResult};
use crate::render::backend::FrameRGBA;

/// Shape of the sequence a sink is about to receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    /// Number of indices in the run (`0..total_frames`).
    pub total_frames: u64,
    /// Frame size.
    pub resolution: Resolution,
    /// Playback rate recorded for the encoder.
    pub fps: Fps,
}

/// Gap bookkeeping handed to [`FrameSink::end`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceReport {
    /// Indices that failed to render, in order.
    pub missing: Vec<u64>,
    /// Missing indices that were filled by duplication.
    pub filled: Vec<u64>,
}

/// Ordered frame consumer.
///
/// The session calls `begin` once, then `push_frame` with strictly increasing indices, then
/// exactly one of `end` (commit) or `abort` (discard everything staged).
pub trait FrameSink: Send {
    /// Prepare for a run.
    fn begin(&mut self, cfg: &SinkConfig) -> VisResult<()>;

    /// Accept the frame for `index`.
    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> VisResult<()>;

    /// Commit the sequence.
    fn end(&mut self, report: &SequenceReport) -> VisResult<()>;

    /// Discard staged output. Must be safe to call at any point, more than once.
    fn abort(&mut self);
}

/// Sink that keeps frames in memory (tests, `frame` previews).
#[derive(Debug, Default)]
pub struct InMemorySink {
    /// Frames in push order.
    pub frames: Vec<(FrameIndex, FrameRGBA)>,
    /// Config seen by `begin`.
    pub config: Option<SinkConfig>,
    /// Report seen by `end`.
    pub report: Option<SequenceReport>,
    /// `true` after `abort`.
    pub aborted: bool,
}

impl InMemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices received, in order.
    pub fn indices(&self) -> Vec<u64> {
        self.frames.iter().map(|(i, _)| i.0).collect()
    }

    /// `true` when the sequence was committed.
    pub fn committed(&self) -> bool {
        self.report.is_some() && !self.aborted
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: &SinkConfig) -> VisResult<()> {
        self.frames.clear();
        self.report = None;
        self.aborted = false;
        self.config = Some(*cfg);
        Ok(())
    }

    fn push_frame(&mut self, index: FrameIndex, frame: &FrameRGBA) -> VisResult<()> {
        if let Some((last, _)) = self.frames.last()
            && *last >= index
        {
            return Err(VisError::validation(format!(
                "frame {} pushed after frame {}",
                index.0, last.0
            )));
        }
        self.frames.push((index, frame.clone()));
        Ok(())
    }

    fn end(&mut self, report: &SequenceReport) -> VisResult<()> {
        self.report = Some(report.clone());
        Ok(())
    }

    fn abort(&mut self) {
        self.frames.clear();
        self.aborted = true;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/sink.rs"]
mod tests;
