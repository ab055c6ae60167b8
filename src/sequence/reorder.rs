use std::collections::VecDeque;

use crate::foundation::core::{FrameIndex, Resolution};
use crate::foundation::error::{VisError, VisResult};
use crate::render::backend::{Background, FrameRGBA};

/// What to do about indices that produced no frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GapPolicy {
    /// Discard staged output and fail with [`VisError::Gap`].
    #[default]
    Abort,
    /// Commit the frames that exist, report the gap, skip encoding.
    Keep,
    /// Fill each gap with the previous frame (background-only for index 0).
    DuplicatePrevious,
}

/// Index-addressed window of completed slots, released strictly in order.
///
/// Slot `k` of the window holds frame `next + k`; memory is bounded by how far workers run
/// ahead of the oldest missing index.
#[derive(Debug)]
pub struct ReorderBuffer {
    total: u64,
    next: u64,
    window: VecDeque<Option<Option<FrameRGBA>>>,
    high_water: usize,
}

impl ReorderBuffer {
    /// Buffer for indices `0..total`.
    pub fn new(total: u64) -> Self {
        Self {
            total,
            next: 0,
            window: VecDeque::new(),
            high_water: 0,
        }
    }

    /// Store the outcome for `index`; `None` marks a frame that failed.
    pub fn insert(&mut self, index: FrameIndex, frame: Option<FrameRGBA>) -> VisResult<()> {
        let i = index.0;
        if i >= self.total {
            return Err(VisError::validation(format!(
                "frame index {i} out of range 0..{}",
                self.total
            )));
        }
        if i < self.next {
            return Err(VisError::validation(format!(
                "frame index {i} delivered twice"
            )));
        }
        let slot = (i - self.next) as usize;
        if self.window.len() <= slot {
            self.window.resize_with(slot + 1, || None);
        }
        if self.window[slot].is_some() {
            return Err(VisError::validation(format!(
                "frame index {i} delivered twice"
            )));
        }
        self.window[slot] = Some(frame);
        let buffered = self.window.iter().filter(|s| s.is_some()).count();
        self.high_water = self.high_water.max(buffered);
        Ok(())
    }

    /// Next in-order slot, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(FrameIndex, Option<FrameRGBA>)> {
        if !matches!(self.window.front(), Some(Some(_))) {
            return None;
        }
        let slot = self.window.pop_front().flatten()?;
        let index = FrameIndex(self.next);
        self.next += 1;
        Some((index, slot))
    }

    /// Index the buffer is waiting for.
    pub fn next_index(&self) -> FrameIndex {
        FrameIndex(self.next)
    }

    /// `true` once every index has been released.
    pub fn is_complete(&self) -> bool {
        self.next == self.total
    }

    /// Largest number of slots held at once.
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

/// Ordered frame emitted by the [`Sequencer`].
#[derive(Debug)]
pub enum Emitted {
    /// A rendered frame.
    Frame(FrameIndex, FrameRGBA),
    /// A gap filled by duplication (or background for index 0).
    Filled(FrameIndex, FrameRGBA),
    /// A gap left open.
    Hole(FrameIndex),
}

/// Reorders worker output and applies the [`GapPolicy`].
#[derive(Debug)]
pub struct Sequencer {
    buffer: ReorderBuffer,
    policy: GapPolicy,
    background: Background,
    resolution: Resolution,
    last: Option<FrameRGBA>,
    missing: Vec<u64>,
    filled: Vec<u64>,
}

impl Sequencer {
    /// Sequencer for `total` frames.
    pub fn new(
        total: u64,
        policy: GapPolicy,
        background: Background,
        resolution: Resolution,
    ) -> Self {
        Self {
            buffer: ReorderBuffer::new(total),
            policy,
            background,
            resolution,
            last: None,
            missing: Vec::new(),
            filled: Vec::new(),
        }
    }

    /// Accept one worker result and return everything now releasable, in index order.
    pub fn accept(
        &mut self,
        index: FrameIndex,
        frame: Option<FrameRGBA>,
    ) -> VisResult<Vec<Emitted>> {
        self.buffer.insert(index, frame)?;
        let mut out = Vec::new();
        while let Some((idx, slot)) = self.buffer.pop_ready() {
            match slot {
                Some(frame) => {
                    if self.policy == GapPolicy::DuplicatePrevious {
                        self.last = Some(frame.clone());
                    }
                    out.push(Emitted::Frame(idx, frame));
                }
                None => {
                    self.missing.push(idx.0);
                    if self.policy == GapPolicy::DuplicatePrevious {
                        let fill = match &self.last {
                            Some(prev) => prev.clone(),
                            None => self.background.frame(self.resolution),
                        };
                        self.filled.push(idx.0);
                        self.last = Some(fill.clone());
                        out.push(Emitted::Filled(idx, fill));
                    } else {
                        out.push(Emitted::Hole(idx));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Indices that failed, in order.
    pub fn missing(&self) -> &[u64] {
        &self.missing
    }

    /// Indices filled by duplication, in order.
    pub fn filled(&self) -> &[u64] {
        &self.filled
    }

    /// Gaps still open after filling.
    pub fn open_gaps(&self) -> Vec<u64> {
        if self.policy == GapPolicy::DuplicatePrevious {
            Vec::new()
        } else {
            self.missing.clone()
        }
    }

    /// Underlying buffer.
    pub fn buffer(&self) -> &ReorderBuffer {
        &self.buffer
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sequence/reorder.rs"]
mod tests;
