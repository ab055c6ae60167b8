use super::*;

fn grid() -> GridGeometry {
    GridGeometry::Cartesian {
        origin: [-1.0, -1.0],
        spacing: [1.0, 1.0],
        dims: [3, 3],
    }
}

#[test]
fn linear_field_gives_straight_iso_line() {
    let g = grid();
    let values: Vec<f64> = g.node_positions().iter().map(|p| p.x).collect();
    let segs = iso_segments(&g, &values, 0.5);
    assert_eq!(segs.len(), 2);
    for s in &segs {
        for p in s {
            assert!((p.x - 0.5).abs() < 1e-12);
        }
    }
}

#[test]
fn level_outside_range_is_empty() {
    let g = grid();
    let values: Vec<f64> = g.node_positions().iter().map(|p| p.x).collect();
    assert!(iso_segments(&g, &values, 5.0).is_empty());
    assert!(iso_segments(&g, &values, -5.0).is_empty());
}

#[test]
fn cells_with_nan_are_skipped() {
    let g = grid();
    let mut values: Vec<f64> = g.node_positions().iter().map(|p| p.x).collect();
    values[g.node_index(2, 0)] = f64::NAN;
    assert_eq!(iso_segments(&g, &values, 0.5).len(), 1);
}

#[test]
fn saddle_cell_yields_two_segments() {
    let g = GridGeometry::Cartesian {
        origin: [0.0, 0.0],
        spacing: [1.0, 1.0],
        dims: [2, 2],
    };
    // Storage order (0,0) (1,0) (0,1) (1,1): nodes (0,0) and (1,1) high.
    let values = vec![1.0, 0.0, 0.0, 1.0];
    assert_eq!(iso_segments(&g, &values, 0.5).len(), 2);
}
