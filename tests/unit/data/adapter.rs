use smallvec::SmallVec;

use super::*;
use crate::data::model::DatasetMetadata;

fn grid(spacing: f64, n: usize) -> Arc<GridGeometry> {
    Arc::new(GridGeometry::Cartesian {
        origin: [0.0, 0.0],
        spacing: [spacing, spacing],
        dims: [n, n],
    })
}

fn plane(g: &Arc<GridGeometry>) -> FieldValues {
    // f(x, y) = x + 2y is reproduced exactly by bilinear interpolation.
    FieldValues::Scalar(g.node_positions().iter().map(|p| p.x + 2.0 * p.y).collect())
}

fn dataset(grids: &[Arc<GridGeometry>]) -> SimulationDataset {
    let steps = grids
        .iter()
        .enumerate()
        .map(|(i, g)| TimeStep {
            time: i as f64,
            field: FieldSample::Grid {
                geometry: Arc::clone(g),
                values: plane(g),
            },
            markers: SmallVec::new(),
        })
        .collect();
    SimulationDataset::new(DatasetMetadata::default(), steps).unwrap()
}

#[test]
fn reject_policy_names_the_mismatched_step() {
    let ds = dataset(&[grid(1.0, 3), grid(1.0, 3), grid(0.5, 5)]);
    let err = harmonize_grids(ds, GridPolicy::Reject).unwrap_err();
    match err {
        VisError::GridMismatch(m) => assert!(m.starts_with("step 2"), "{m}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn equal_grids_pass_reject_policy() {
    let ds = dataset(&[grid(1.0, 3), grid(1.0, 3)]);
    assert_eq!(harmonize_grids(ds, GridPolicy::Reject).unwrap().len(), 2);
}

#[test]
fn resample_policy_maps_onto_reference_grid() {
    let reference = grid(1.0, 3);
    let ds = dataset(&[Arc::clone(&reference), grid(0.5, 5), grid(0.5, 3)]);
    let out = harmonize_grids(ds, GridPolicy::Resample).unwrap();

    for step in out.steps() {
        assert_eq!(**step.field.geometry().unwrap(), *reference);
    }
    let FieldValues::Scalar(v) = out.steps()[1].field.values() else {
        panic!("expected scalar");
    };
    let expected = plane(&reference);
    let FieldValues::Scalar(e) = &expected else {
        unreachable!()
    };
    for (a, b) in v.iter().zip(e) {
        assert!((a - b).abs() < 1e-9);
    }

    // The 0.5-spaced 3x3 grid only covers [0, 1]^2: reference nodes at 2.0 fall outside.
    let FieldValues::Scalar(v) = out.steps()[2].field.values() else {
        panic!("expected scalar");
    };
    assert!(v[0].is_finite());
    assert!(v[2].is_nan());
}

#[test]
fn mixing_grid_and_points_is_always_a_mismatch() {
    let g = grid(1.0, 2);
    let steps = vec![
        TimeStep {
            time: 0.0,
            field: FieldSample::Grid {
                geometry: Arc::clone(&g),
                values: plane(&g),
            },
            markers: SmallVec::new(),
        },
        TimeStep {
            time: 1.0,
            field: FieldSample::Points {
                positions: vec![Vec3::ZERO],
                values: FieldValues::Scalar(vec![1.0]),
            },
            markers: SmallVec::new(),
        },
    ];
    let ds = SimulationDataset::new(DatasetMetadata::default(), steps).unwrap();
    assert!(matches!(
        harmonize_grids(ds, GridPolicy::Resample),
        Err(VisError::GridMismatch(_))
    ));
}

#[test]
fn explicit_format_bypasses_probing_and_unknown_input_is_format_error() {
    let registry = AdapterRegistry::with_builtin();
    assert_eq!(registry.names(), vec!["bhvis.dataset", "bhvis.strain-run"]);
    let a = registry
        .resolve(Path::new("whatever.bin"), InputFormat::StrainRun)
        .unwrap();
    assert_eq!(a.name(), "bhvis.strain-run");
    assert!(matches!(
        registry.resolve(Path::new("target/no-such-input.json"), InputFormat::Auto),
        Err(VisError::Format(_))
    ));
}
