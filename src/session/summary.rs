use std::fmt;
use std::time::Duration;

use crate::foundation::error::VisError;

/// A frame that did not render from its own scene, with the reason.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SkippedFrame {
    /// Frame index.
    pub index: u64,
    /// Simulation time of the step.
    pub time: f64,
    /// Error text.
    pub reason: String,
}

/// What happened during one session run. Printed before any encoder hand-off.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RunSummary {
    /// Backend name.
    pub backend: String,
    /// `false` when the backend does not guarantee bit-identical output.
    pub deterministic_backend: bool,
    /// Indices attempted.
    pub frames_total: u64,
    /// Frames rendered from their own scene.
    pub frames_rendered: u64,
    /// Frames rendered as placeholders (missing geometry).
    pub frames_placeholder: u64,
    /// Placeholder reasons per index.
    pub placeholders: Vec<SkippedFrame>,
    /// Frames that failed and were skipped.
    pub skipped: Vec<SkippedFrame>,
    /// Gaps left open in the committed (or discarded) sequence.
    pub gaps: Vec<u64>,
    /// Gaps filled by duplication.
    pub gaps_filled: Vec<u64>,
    /// `true` when the sink committed its output.
    pub committed: bool,
    /// Largest number of out-of-order frames held by the sequencer.
    pub max_buffered: usize,
    /// Wall-clock duration.
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunSummary {
    /// `true` when every index in `0..frames_total` has a frame.
    pub fn is_gap_free(&self) -> bool {
        self.gaps.is_empty()
    }

    /// [`VisError::Gap`] for the open gaps, if any.
    pub fn gap_error(&self) -> Option<VisError> {
        (!self.gaps.is_empty()).then(|| VisError::Gap {
            missing: self.gaps.clone(),
        })
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run summary ({} backend{}, {:.2}s)",
            self.backend,
            if self.deterministic_backend {
                ""
            } else {
                ", non-deterministic"
            },
            self.elapsed.as_secs_f64()
        )?;
        writeln!(f, "  frames attempted:   {}", self.frames_total)?;
        writeln!(f, "  frames rendered:    {}", self.frames_rendered)?;
        writeln!(f, "  placeholder frames: {}", self.frames_placeholder)?;
        for p in &self.placeholders {
            writeln!(f, "    #{} (t={}): {}", p.index, p.time, p.reason)?;
        }
        writeln!(f, "  frames skipped:     {}", self.skipped.len())?;
        for s in &self.skipped {
            writeln!(f, "    #{} (t={}): {}", s.index, s.time, s.reason)?;
        }
        if !self.gaps_filled.is_empty() {
            writeln!(f, "  gaps filled:        {:?}", self.gaps_filled)?;
        }
        if self.is_gap_free() {
            write!(f, "  sequence:           gap-free")?;
        } else {
            write!(f, "  sequence:           INCOMPLETE, missing {:?}", self.gaps)?;
        }
        if !self.committed {
            write!(f, " (not committed)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/summary.rs"]
mod tests;
