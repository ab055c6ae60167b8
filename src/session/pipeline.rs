use std::sync::mpsc::{RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::data::model::SimulationDataset;
use crate::encode::sink::{FrameSink, SequenceReport, SinkConfig};
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{VisError, VisResult};
use crate::normalize::params::NormalizationParams;
use crate::render::backend::{BackendFactory, FrameRGBA, RenderBackend, RenderConfig};
use crate::scene::builder::{SceneBuilder, SceneOpts};
use crate::scene::tracks::Trajectories;
use crate::sequence::reorder::{Emitted, GapPolicy, Sequencer};
use crate::session::cancel::CancelToken;
use crate::session::summary::{RunSummary, SkippedFrame};

/// How backend contexts are shared between workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextPolicy {
    /// One backend per worker.
    #[default]
    PerWorker,
    /// One backend behind a mutex; backend calls are serialized.
    Shared,
}

/// What a per-frame backend failure does to the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Record the frame as skipped and continue.
    #[default]
    Skip,
    /// Cancel the run and discard all output.
    Strict,
}

/// Session scheduling options.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionOpts {
    /// Worker threads; `None` uses rayon's default.
    pub workers: Option<usize>,
    /// Time-steps scheduled per batch.
    pub chunk_size: usize,
    /// Bound of the worker-to-collector channel.
    pub channel_capacity: usize,
    /// Backend sharing.
    pub context: ContextPolicy,
    /// Per-frame failure handling.
    pub failure: FailurePolicy,
    /// Gap handling after all frames are in.
    pub gap: GapPolicy,
    /// Seconds without any finished frame before the run is abandoned.
    pub watchdog_secs: f64,
    /// Playback rate recorded with the sequence.
    pub fps: Fps,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            workers: None,
            chunk_size: 32,
            channel_capacity: 16,
            context: ContextPolicy::default(),
            failure: FailurePolicy::default(),
            gap: GapPolicy::default(),
            watchdog_secs: 300.0,
            fps: Fps { num: 30, den: 1 },
        }
    }
}

impl SessionOpts {
    /// Validate scheduling parameters.
    pub fn validate(&self) -> VisResult<()> {
        if self.workers == Some(0) {
            return Err(VisError::validation("workers must be >= 1 when set"));
        }
        if self.chunk_size == 0 || self.channel_capacity == 0 {
            return Err(VisError::validation(
                "chunk_size and channel_capacity must be >= 1",
            ));
        }
        if !(self.watchdog_secs > 0.0 && self.watchdog_secs.is_finite()) {
            return Err(VisError::validation("watchdog_secs must be > 0"));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        Ok(())
    }
}

enum FrameOutcome {
    Rendered(FrameRGBA),
    Placeholder(FrameRGBA, String),
    Failed(String),
}

enum WorkerMsg {
    Done {
        index: FrameIndex,
        time: f64,
        outcome: FrameOutcome,
    },
    Fatal(VisError),
}

enum WorkerBackend {
    Owned(Box<dyn RenderBackend>),
    Shared(Arc<Mutex<Box<dyn RenderBackend>>>),
}

impl WorkerBackend {
    fn render(
        &mut self,
        scene: &crate::scene::model::Scene,
        cfg: &RenderConfig,
    ) -> VisResult<FrameRGBA> {
        match self {
            Self::Owned(b) => b.render(scene, cfg),
            Self::Shared(m) => m
                .lock()
                .map_err(|_| VisError::backend("shared backend lock poisoned"))?
                .render(scene, cfg),
        }
    }
}

/// Immutable per-run state handed to every worker.
struct Job {
    dataset: Arc<SimulationDataset>,
    params: Arc<NormalizationParams>,
    tracks: Arc<Trajectories>,
    scene: SceneOpts,
    render: RenderConfig,
}

impl Job {
    fn render_step(&self, backend: &mut WorkerBackend, i: usize) -> WorkerMsg {
        let step = &self.dataset.steps()[i];
        let index = FrameIndex(i as u64);
        let builder = SceneBuilder::new(&self.params, &self.tracks, &self.scene);
        let (scene, placeholder) = match builder.build(step, index) {
            Ok(scene) => (scene, None),
            Err(e @ VisError::MissingGeometry(_)) => {
                (builder.placeholder(step, index), Some(e.to_string()))
            }
            Err(e) => return WorkerMsg::Fatal(e),
        };
        let outcome = match backend.render(&scene, &self.render) {
            Ok(frame) => match placeholder {
                Some(reason) => FrameOutcome::Placeholder(frame, reason),
                None => FrameOutcome::Rendered(frame),
            },
            Err(e) if e.is_frame_local() => FrameOutcome::Failed(e.to_string()),
            Err(e) => return WorkerMsg::Fatal(e),
        };
        WorkerMsg::Done {
            index,
            time: step.time,
            outcome,
        }
    }
}

/// Renders a dataset into an ordered frame sequence.
///
/// Time-steps are rendered in parallel on a dedicated rayon pool and delivered to the sink
/// strictly in index order.
#[derive(Clone)]
pub struct RenderSession {
    opts: SessionOpts,
    scene: SceneOpts,
    render: RenderConfig,
    factory: BackendFactory,
    cancel: CancelToken,
}

impl std::fmt::Debug for RenderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSession")
            .field("opts", &self.opts)
            .field("render", &self.render)
            .finish_non_exhaustive()
    }
}

impl RenderSession {
    /// Validated session.
    pub fn new(
        opts: SessionOpts,
        scene: SceneOpts,
        render: RenderConfig,
        factory: BackendFactory,
    ) -> VisResult<Self> {
        opts.validate()?;
        scene.validate()?;
        render.validate()?;
        Ok(Self {
            opts,
            scene,
            render,
            factory,
            cancel: CancelToken::new(),
        })
    }

    /// Token that stops this session's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Use an externally owned token (e.g. a signal handler's).
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Render a single time-step; missing geometry yields the placeholder frame.
    pub fn render_one(
        &self,
        dataset: &SimulationDataset,
        params: &NormalizationParams,
        index: FrameIndex,
    ) -> VisResult<FrameRGBA> {
        let Some(step) = usize::try_from(index.0)
            .ok()
            .and_then(|i| dataset.steps().get(i))
        else {
            return Err(VisError::validation(format!(
                "time-step {} out of range (dataset has {})",
                index.0,
                dataset.len()
            )));
        };
        let tracks = Trajectories::from_dataset(dataset);
        let builder = SceneBuilder::new(params, &tracks, &self.scene);
        let scene = match builder.build(step, index) {
            Ok(scene) => scene,
            Err(e @ VisError::MissingGeometry(_)) => {
                tracing::warn!("frame {}: {e}; rendering placeholder", index.0);
                builder.placeholder(step, index)
            }
            Err(e) => return Err(e),
        };
        let mut backend = (self.factory)()?;
        backend.render(&scene, &self.render)
    }

    /// Render every time-step into `sink`.
    ///
    /// Stage-level and strict-mode failures return `Err` after aborting the sink. Open gaps do
    /// not: they are reported through [`RunSummary::gap_error`], with the sink committed only
    /// under [`GapPolicy::Keep`].
    #[tracing::instrument(skip_all, fields(steps = dataset.len()))]
    pub fn run(
        &self,
        dataset: Arc<SimulationDataset>,
        params: Arc<NormalizationParams>,
        sink: &mut dyn FrameSink,
    ) -> VisResult<RunSummary> {
        let started = Instant::now();
        let total = dataset.len();
        if total == 0 {
            return Err(VisError::empty_dataset("dataset has no time-steps"));
        }

        let sample_backend = (self.factory)()?;
        let backend_name = sample_backend.name().to_owned();
        let deterministic = sample_backend.is_deterministic();
        drop(sample_backend);
        if !deterministic {
            tracing::warn!(
                backend = %backend_name,
                "backend is not deterministic; frames may differ between runs"
            );
        }

        let job = Arc::new(Job {
            tracks: Arc::new(Trajectories::from_dataset(&dataset)),
            dataset,
            params,
            scene: self.scene.clone(),
            render: self.render,
        });

        sink.begin(&SinkConfig {
            total_frames: total as u64,
            resolution: self.render.resolution,
            fps: self.opts.fps,
        })?;

        let stop = RunStop {
            caller: self.cancel.clone(),
            run: CancelToken::new(),
        };
        let (tx, rx) = std::sync::mpsc::sync_channel::<WorkerMsg>(self.opts.channel_capacity);
        let producer = {
            let job = Arc::clone(&job);
            let factory = Arc::clone(&self.factory);
            let stop = stop.clone();
            let opts = self.opts.clone();
            std::thread::Builder::new()
                .name("bhvis-render".to_owned())
                .spawn(move || produce(&job, &factory, &opts, &stop, &tx))
        };
        let producer = match producer {
            Ok(handle) => handle,
            Err(e) => {
                sink.abort();
                return Err(VisError::backend(format!("failed to spawn render thread: {e}")));
            }
        };

        let mut seq = Sequencer::new(
            total as u64,
            self.opts.gap,
            self.render.background,
            self.render.resolution,
        );
        let mut summary = RunSummary {
            backend: backend_name,
            deterministic_backend: deterministic,
            frames_total: total as u64,
            frames_rendered: 0,
            frames_placeholder: 0,
            placeholders: Vec::new(),
            skipped: Vec::new(),
            gaps: Vec::new(),
            gaps_filled: Vec::new(),
            committed: false,
            max_buffered: 0,
            elapsed: Duration::ZERO,
        };

        let watchdog = Duration::from_secs_f64(self.opts.watchdog_secs);
        let poll = watchdog.min(Duration::from_millis(50));
        let mut last_progress = Instant::now();
        let mut received = 0usize;

        while received < total {
            if self.cancel.is_cancelled() {
                return Err(fail(&stop, sink, VisError::cancelled("run cancelled")));
            }
            let msg = match rx.recv_timeout(poll) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => {
                    if last_progress.elapsed() >= watchdog {
                        // The pool is left to wind down on its own.
                        return Err(fail(
                            &stop,
                            sink,
                            VisError::backend(format!(
                                "watchdog: no frame within {:.1}s (waiting for frame {})",
                                watchdog.as_secs_f64(),
                                seq.buffer().next_index().0
                            )),
                        ));
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let err = if self.cancel.is_cancelled() {
                        VisError::cancelled("run cancelled")
                    } else {
                        VisError::backend(format!(
                            "render workers stopped after {received} of {total} frames"
                        ))
                    };
                    return Err(fail(&stop, sink, err));
                }
            };
            last_progress = Instant::now();

            let (index, time, outcome) = match msg {
                WorkerMsg::Done {
                    index,
                    time,
                    outcome,
                } => (index, time, outcome),
                WorkerMsg::Fatal(e) => return Err(fail(&stop, sink, e)),
            };
            received += 1;

            let frame = match outcome {
                FrameOutcome::Rendered(frame) => {
                    summary.frames_rendered += 1;
                    Some(frame)
                }
                FrameOutcome::Placeholder(frame, reason) => {
                    tracing::warn!("frame {}: {reason}; placeholder rendered", index.0);
                    summary.frames_placeholder += 1;
                    summary.placeholders.push(SkippedFrame {
                        index: index.0,
                        time,
                        reason,
                    });
                    Some(frame)
                }
                FrameOutcome::Failed(reason) => {
                    if self.opts.failure == FailurePolicy::Strict {
                        return Err(fail(
                            &stop,
                            sink,
                            VisError::backend(format!("frame {} (t={time}): {reason}", index.0)),
                        ));
                    }
                    tracing::warn!("frame {} skipped: {reason}", index.0);
                    summary.skipped.push(SkippedFrame {
                        index: index.0,
                        time,
                        reason,
                    });
                    None
                }
            };

            let emitted = match seq.accept(index, frame) {
                Ok(emitted) => emitted,
                Err(e) => return Err(fail(&stop, sink, e)),
            };
            for item in emitted {
                let pushed = match &item {
                    Emitted::Frame(i, f) | Emitted::Filled(i, f) => sink.push_frame(*i, f),
                    Emitted::Hole(_) => Ok(()),
                };
                if let Err(e) = pushed {
                    return Err(fail(&stop, sink, e));
                }
            }
        }

        if producer.join().is_err() {
            return Err(fail(&stop, sink, VisError::backend("render thread panicked")));
        }

        summary.gaps = seq.open_gaps();
        summary.gaps_filled = seq.filled().to_vec();
        summary.max_buffered = seq.buffer().high_water();

        let report = SequenceReport {
            missing: seq.missing().to_vec(),
            filled: seq.filled().to_vec(),
        };
        if summary.gaps.is_empty() || self.opts.gap == GapPolicy::Keep {
            sink.end(&report)?;
            summary.committed = true;
        } else {
            tracing::warn!(missing = ?summary.gaps, "sequence has gaps; staged output discarded");
            sink.abort();
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            rendered = summary.frames_rendered,
            placeholders = summary.frames_placeholder,
            skipped = summary.skipped.len(),
            elapsed_s = summary.elapsed.as_secs_f64(),
            "render run finished"
        );
        Ok(summary)
    }
}

/// Stop state of one run: the caller's token plus a flag owned by the run itself.
///
/// Failures only raise `run`, so the session's token stays usable for the next run.
#[derive(Clone)]
struct RunStop {
    caller: CancelToken,
    run: CancelToken,
}

impl RunStop {
    fn is_set(&self) -> bool {
        self.run.is_cancelled() || self.caller.is_cancelled()
    }
}

fn fail(stop: &RunStop, sink: &mut dyn FrameSink, err: VisError) -> VisError {
    stop.run.cancel();
    sink.abort();
    tracing::error!("render run failed: {err}");
    err
}

fn produce(
    job: &Job,
    factory: &BackendFactory,
    opts: &SessionOpts,
    stop: &RunStop,
    tx: &SyncSender<WorkerMsg>,
) {
    let pool = match build_thread_pool(opts.workers) {
        Ok(pool) => pool,
        Err(e) => {
            let _ = tx.send(WorkerMsg::Fatal(e));
            return;
        }
    };
    let shared = match opts.context {
        ContextPolicy::Shared => match factory() {
            Ok(backend) => Some(Arc::new(Mutex::new(backend))),
            Err(e) => {
                let _ = tx.send(WorkerMsg::Fatal(e));
                return;
            }
        },
        ContextPolicy::PerWorker => None,
    };

    let indices: Vec<usize> = (0..job.dataset.len()).collect();
    for chunk in indices.chunks(opts.chunk_size) {
        if stop.is_set() {
            break;
        }
        tracing::debug!(first = chunk[0], len = chunk.len(), "rendering chunk");
        pool.install(|| {
            chunk.par_iter().for_each_init(
                || match &shared {
                    Some(s) => Ok(WorkerBackend::Shared(Arc::clone(s))),
                    None => factory().map(WorkerBackend::Owned),
                },
                |backend, &i| {
                    if stop.is_set() {
                        return;
                    }
                    let msg = match backend {
                        Ok(b) => job.render_step(b, i),
                        Err(e) => WorkerMsg::Fatal(VisError::backend(format!(
                            "backend init failed: {e}"
                        ))),
                    };
                    if tx.send(msg).is_err() {
                        stop.run.cancel();
                    }
                },
            );
        });
    }
}

fn build_thread_pool(threads: Option<usize>) -> VisResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(VisError::validation("workers must be >= 1 when set"));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| VisError::backend(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/session/pipeline.rs"]
mod tests;
