use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use smallvec::smallvec;

use super::*;
use crate::data::model::{
    DatasetMetadata, FieldSample, FieldValues, GridGeometry, TimeStep, TrajectoryMarker,
};
use crate::encode::sink::InMemorySink;
use crate::foundation::core::{Resolution, Vec3};
use crate::normalize::compute::normalize;
use crate::normalize::params::NormalizeOpts;
use crate::render::backend::{BackendKind, backend_factory};
use crate::render::cpu::CpuBackend;
use crate::scene::model::Scene;

fn dataset(n: usize) -> Arc<SimulationDataset> {
    let geometry = Arc::new(GridGeometry::Cartesian {
        origin: [-2.0, -2.0],
        spacing: [1.0, 1.0],
        dims: [5, 5],
    });
    let steps = (0..n)
        .map(|i| {
            let t = i as f64 * 0.5;
            let values = geometry
                .node_positions()
                .iter()
                .map(|p| (p.x - t).sin() * p.y)
                .collect();
            TimeStep {
                time: t,
                field: FieldSample::Grid {
                    geometry: Arc::clone(&geometry),
                    values: FieldValues::Scalar(values),
                },
                markers: smallvec![TrajectoryMarker {
                    label: "bh1".to_owned(),
                    position: Vec3::new(t.cos(), t.sin(), 0.2),
                    radius: Some(0.2),
                    spin: None,
                }],
            }
        })
        .collect();
    Arc::new(SimulationDataset::new(DatasetMetadata::default(), steps).unwrap())
}

fn params(ds: &SimulationDataset) -> Arc<NormalizationParams> {
    Arc::new(normalize(ds, &NormalizeOpts::default()).unwrap())
}

fn render_cfg() -> RenderConfig {
    RenderConfig {
        resolution: Resolution {
            width: 32,
            height: 24,
        },
        ..RenderConfig::default()
    }
}

fn opts(workers: usize) -> SessionOpts {
    SessionOpts {
        workers: Some(workers),
        chunk_size: 4,
        channel_capacity: 2,
        ..SessionOpts::default()
    }
}

/// CPU backend that fails (or stalls) on selected frames.
struct FlakyBackend {
    inner: CpuBackend,
    fail_at: Option<u64>,
    stall: Option<Duration>,
}

impl RenderBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn is_deterministic(&self) -> bool {
        true
    }

    fn render(&mut self, scene: &Scene, cfg: &RenderConfig) -> VisResult<FrameRGBA> {
        if let Some(d) = self.stall {
            std::thread::sleep(d);
        }
        if self.fail_at == Some(scene.index.0) {
            return Err(VisError::backend("injected failure"));
        }
        self.inner.render(scene, cfg)
    }
}

fn flaky(fail_at: Option<u64>, stall: Option<Duration>) -> BackendFactory {
    Arc::new(move || {
        Ok(Box::new(FlakyBackend {
            inner: CpuBackend::new(),
            fail_at,
            stall,
        }) as Box<dyn RenderBackend>)
    })
}

fn session(opts: SessionOpts, factory: BackendFactory) -> RenderSession {
    RenderSession::new(opts, SceneOpts::default(), render_cfg(), factory).unwrap()
}

#[test]
fn frames_arrive_in_index_order() {
    let ds = dataset(10);
    let p = params(&ds);
    let mut sink = InMemorySink::new();
    let summary = session(opts(4), backend_factory(BackendKind::Cpu))
        .run(ds, p, &mut sink)
        .unwrap();
    assert_eq!(sink.indices(), (0..10).collect::<Vec<_>>());
    assert!(sink.committed());
    assert_eq!(summary.frames_total, 10);
    assert_eq!(summary.frames_rendered, 10);
    assert!(summary.is_gap_free());
    assert!(summary.committed);
    assert_eq!(summary.backend, "cpu");
}

#[test]
fn shared_context_matches_per_worker() {
    let ds = dataset(6);
    let p = params(&ds);
    let mut a = InMemorySink::new();
    let mut b = InMemorySink::new();
    session(opts(3), backend_factory(BackendKind::Cpu))
        .run(Arc::clone(&ds), Arc::clone(&p), &mut a)
        .unwrap();
    let shared = SessionOpts {
        context: ContextPolicy::Shared,
        ..opts(3)
    };
    session(shared, backend_factory(BackendKind::Cpu))
        .run(ds, p, &mut b)
        .unwrap();
    assert_eq!(a.frames, b.frames);
}

#[test]
fn skipped_frame_under_abort_policy_discards_output() {
    let ds = dataset(6);
    let p = params(&ds);
    let mut sink = InMemorySink::new();
    let summary = session(opts(2), flaky(Some(3), None))
        .run(ds, p, &mut sink)
        .unwrap();
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.skipped[0].index, 3);
    assert_eq!(summary.gaps, vec![3]);
    assert!(!summary.committed);
    assert!(sink.aborted);
    assert!(matches!(summary.gap_error(), Some(VisError::Gap { .. })));
}

#[test]
fn keep_policy_commits_with_holes() {
    let ds = dataset(6);
    let p = params(&ds);
    let mut sink = InMemorySink::new();
    let keep = SessionOpts {
        gap: GapPolicy::Keep,
        ..opts(2)
    };
    let summary = session(keep, flaky(Some(3), None))
        .run(ds, p, &mut sink)
        .unwrap();
    assert!(summary.committed);
    assert_eq!(sink.indices(), vec![0, 1, 2, 4, 5]);
    assert_eq!(sink.report.as_ref().unwrap().missing, vec![3]);
    assert_eq!(summary.gaps, vec![3]);
}

#[test]
fn duplicate_previous_fills_the_gap() {
    let ds = dataset(6);
    let p = params(&ds);
    let mut sink = InMemorySink::new();
    let dup = SessionOpts {
        gap: GapPolicy::DuplicatePrevious,
        ..opts(2)
    };
    let summary = session(dup, flaky(Some(3), None))
        .run(ds, p, &mut sink)
        .unwrap();
    assert!(summary.is_gap_free());
    assert_eq!(summary.gaps_filled, vec![3]);
    assert_eq!(sink.indices(), (0..6).collect::<Vec<_>>());
    assert_eq!(sink.frames[3].1, sink.frames[2].1);
}

#[test]
fn strict_policy_fails_the_run() {
    let ds = dataset(6);
    let p = params(&ds);
    let mut sink = InMemorySink::new();
    let strict = SessionOpts {
        failure: FailurePolicy::Strict,
        ..opts(2)
    };
    let err = session(strict, flaky(Some(3), None))
        .run(ds, p, &mut sink)
        .unwrap_err();
    assert!(matches!(err, VisError::RenderBackend(_)));
    assert!(sink.aborted);
    assert!(!sink.committed());
}

#[test]
fn session_is_reusable_after_a_strict_failure() {
    let ds = dataset(6);
    let p = params(&ds);
    let failing = Arc::new(AtomicBool::new(true));
    let factory: BackendFactory = {
        let failing = Arc::clone(&failing);
        Arc::new(move || {
            let fail_at = failing.load(Ordering::SeqCst).then_some(3);
            Ok(Box::new(FlakyBackend {
                inner: CpuBackend::new(),
                fail_at,
                stall: None,
            }) as Box<dyn RenderBackend>)
        })
    };
    let strict = SessionOpts {
        failure: FailurePolicy::Strict,
        ..opts(2)
    };
    let s = session(strict, factory);

    let mut first = InMemorySink::new();
    let err = s
        .clone()
        .run(Arc::clone(&ds), Arc::clone(&p), &mut first)
        .unwrap_err();
    assert!(matches!(err, VisError::RenderBackend(_)));
    assert!(!s.cancel_token().is_cancelled());

    failing.store(false, Ordering::SeqCst);
    let mut second = InMemorySink::new();
    let summary = s.run(ds, p, &mut second).unwrap();
    assert!(summary.is_gap_free());
    assert_eq!(second.indices(), (0..6).collect::<Vec<_>>());
    assert!(second.committed());
}

#[test]
fn missing_geometry_renders_a_placeholder() {
    let ds = dataset(4);
    let p = params(&ds);
    let scene = SceneOpts {
        // At the domain maximum most steps have no contour.
        iso_levels: vec![1.0],
        ..SceneOpts::default()
    };
    let mut sink = InMemorySink::new();
    let s = RenderSession::new(opts(2), scene, render_cfg(), backend_factory(BackendKind::Cpu))
        .unwrap();
    let summary = s.run(ds, p, &mut sink).unwrap();
    assert!(summary.is_gap_free());
    assert_eq!(summary.frames_placeholder + summary.frames_rendered, 4);
    assert_eq!(summary.placeholders.len() as u64, summary.frames_placeholder);
    assert_eq!(sink.frames.len(), 4);
}

#[test]
fn watchdog_abandons_a_stuck_run() {
    let ds = dataset(2);
    let p = params(&ds);
    let mut sink = InMemorySink::new();
    let o = SessionOpts {
        watchdog_secs: 0.2,
        ..opts(1)
    };
    let started = Instant::now();
    let err = session(o, flaky(None, Some(Duration::from_secs(3))))
        .run(ds, p, &mut sink)
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(err.to_string().contains("watchdog"), "{err}");
    assert!(sink.aborted);
}

#[test]
fn cancelled_token_stops_the_run() {
    let ds = dataset(4);
    let p = params(&ds);
    let mut sink = InMemorySink::new();
    let s = session(opts(1), backend_factory(BackendKind::Cpu));
    s.cancel_token().cancel();
    let err = s.run(ds, p, &mut sink).unwrap_err();
    assert!(matches!(err, VisError::Cancelled(_)));
    assert!(sink.aborted);
}

#[test]
fn render_one_checks_the_index() {
    let ds = dataset(3);
    let p = params(&ds);
    let s = session(opts(1), backend_factory(BackendKind::Cpu));
    let f = s.render_one(&ds, &p, FrameIndex(2)).unwrap();
    assert_eq!((f.width, f.height), (32, 24));
    assert!(matches!(
        s.render_one(&ds, &p, FrameIndex(3)),
        Err(VisError::Validation(_))
    ));
}

#[test]
fn invalid_options_are_rejected() {
    let bad = SessionOpts {
        workers: Some(0),
        ..SessionOpts::default()
    };
    assert!(bad.validate().is_err());
    let bad = SessionOpts {
        watchdog_secs: 0.0,
        ..SessionOpts::default()
    };
    assert!(bad.validate().is_err());
}
