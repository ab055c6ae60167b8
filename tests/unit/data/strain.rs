use super::*;
use crate::data::ascii::parse_table;

fn table(text: &str, header: bool) -> Table {
    parse_table(text, header).unwrap()
}

#[test]
fn swsh_matches_closed_form_for_l2() {
    let expected = (5.0 / (64.0 * PI)).sqrt();
    for theta in [0.3, FRAC_PI_2, 2.0] {
        let y = swsh(-2, 2, 2, theta, 0.0);
        let want = expected * (1.0 + f64::cos(theta)).powi(2);
        assert!((y.re - want).abs() < 1e-12, "theta={theta}: {} vs {want}", y.re);
        assert!(y.im.abs() < 1e-12);

        let y = swsh(-2, 2, -2, theta, 0.0);
        let want = expected * (1.0 - f64::cos(theta)).powi(2);
        assert!((y.re - want).abs() < 1e-12);
    }
    // e^{2i phi}
    let y = swsh(-2, 2, 2, FRAC_PI_2, PI / 4.0);
    assert!(y.re.abs() < 1e-12);
    assert!((y.im - expected).abs() < 1e-12);
}

#[test]
fn swsh_out_of_range_mode_is_zero() {
    assert_eq!(swsh(-2, 1, 0, 1.0, 0.0), Complex { re: 0.0, im: 0.0 });
}

#[test]
fn strain_series_sorts_dedupes_and_interpolates() {
    let s = StrainSeries::from_table(&table("2 2 0\n0 0 0\n1 1 -1\n1 1 -1\n", false)).unwrap();
    assert_eq!(s.times, vec![0.0, 1.0, 2.0]);
    assert_eq!(s.at(0.5), Complex { re: 0.5, im: -0.5 });
    assert_eq!(s.at(-10.0), Complex { re: 0.0, im: 0.0 });
    assert_eq!(s.at(99.0), Complex { re: 2.0, im: 0.0 });
}

#[test]
fn conflicting_duplicate_times_are_rejected() {
    let err = StrainSeries::from_table(&table("0 0 0\n0 1 0\n", false)).unwrap_err();
    assert!(err.contains("duplicate"));
    assert!(StrainSeries::from_table(&table("# nothing\n", false)).is_err());
}

#[test]
fn horizon_table_accepts_7_or_13_columns() {
    let t = HorizonTable::from_table(&table(
        "time,x1,y1,z1,x2,y2,z2\n0,1,0,0,-1,0,0\n",
        true,
    ))
    .unwrap();
    assert_eq!(t.rows[0].pos[1], Vec3::new(-1.0, 0.0, 0.0));
    assert!(t.rows[0].spin.is_none());

    let t = HorizonTable::from_table(&table(
        "h\n0, 1,0,0, 0,0,1, -1,0,0, 0,0,2\n",
        true,
    ))
    .unwrap();
    assert_eq!(t.rows[0].spin.unwrap()[1], Vec3::new(0.0, 0.0, 2.0));

    let err = HorizonTable::from_table(&table("h\n0,1,2\n", true)).unwrap_err();
    assert!(err.contains("7 or 13"));
}

#[test]
fn horizon_duplicate_times_must_agree() {
    let t = HorizonTable::from_table(&table(
        "h\n1,1,0,0,-1,0,0\n0,2,0,0,-2,0,0\n1,1,0,0,-1,0,0\n",
        true,
    ))
    .unwrap();
    assert_eq!(t.rows.len(), 2);
    assert_eq!(t.rows[1].time, 1.0);

    let err = HorizonTable::from_table(&table(
        "h\n0,1,0,0,-1,0,0\n0,1.5,0,0,-1,0,0\n",
        true,
    ))
    .unwrap_err();
    assert!(err.contains("conflicting rows at duplicate time 0"), "{err}");
}

fn descriptor(trajectory: Option<&str>) -> StrainRunDescriptor {
    StrainRunDescriptor {
        format: FORMAT_TAG.to_owned(),
        version: 1,
        strain: PathBuf::from("strain.asc"),
        trajectory: trajectory.map(PathBuf::from),
        grid: GridGeometry::Polar {
            max_radius: 10.0,
            radial: 4,
            angular: 8,
        },
        extraction_radius: 5.0,
        mode: Mode { l: 2, m: 2 },
        spin_weight: -2,
        stride: 2,
        amplitude_scale: 1.0,
        horizon_radius: Some(0.5),
        metadata: DatasetMetadata::default(),
    }
}

#[test]
fn synthesis_uses_retarded_time_and_stride() {
    let strain =
        StrainSeries::from_table(&table("0 0 0\n10 1 0\n20 2 0\n30 3 0\n", false)).unwrap();
    let ds = synthesize(&descriptor(None), &strain, None).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.steps()[1].time, 20.0);
    assert!(ds.steps()[0].markers.is_empty());

    let geometry = ds.steps()[1].field.geometry().unwrap();
    let FieldValues::Scalar(values) = ds.steps()[1].field.values() else {
        panic!("expected scalar field");
    };
    // Node (i=2, j=0): r = 20/3, phi = 0, t_ret = 20 - 20/3 + 5.
    let idx = geometry.node_index(2, 0);
    let t_ret = 20.0 - 20.0 / 3.0 + 5.0;
    let want = (t_ret / 10.0) * (5.0 / (64.0 * PI)).sqrt();
    assert!((values[idx] - want).abs() < 1e-9, "{} vs {want}", values[idx]);
    assert_eq!(ds.metadata().extraction_radius, Some(5.0));
}

#[test]
fn synthesis_follows_trajectory_samples_inside_strain_range() {
    let strain = StrainSeries::from_table(&table("0 0 0\n10 1 0\n", false)).unwrap();
    let tracks = HorizonTable::from_table(&table(
        "h\n-1,0,0,0,0,0,0\n5,1,0,0,-1,0,0\n10,2,0,0,-2,0,0\n11,3,0,0,-3,0,0\n",
        true,
    ))
    .unwrap();
    let ds = synthesize(&descriptor(Some("t.csv")), &strain, Some(&tracks)).unwrap();
    let times: Vec<f64> = ds.steps().iter().map(|s| s.time).collect();
    assert_eq!(times, vec![5.0, 10.0]);
    let m = &ds.steps()[1].markers;
    assert_eq!(m[0].label, "bh1");
    assert_eq!(m[1].position, Vec3::new(-2.0, 0.0, 0.0));
    assert_eq!(m[0].radius, Some(0.5));
}

#[test]
fn descriptor_validation() {
    let mut d = descriptor(None);
    d.mode = Mode { l: 1, m: 0 };
    assert!(matches!(d.validate(), Err(VisError::Format(_))));
    let mut d = descriptor(None);
    d.stride = 0;
    assert!(d.validate().is_err());
    assert!(descriptor(None).validate().is_ok());
}
