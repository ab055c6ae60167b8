use super::*;

const GRID: &str = r#"{"cartesian":{"origin":[0.0,0.0],"spacing":[1.0,1.0],"dims":[2,2]}}"#;

fn doc(steps: &str) -> String {
    format!(
        r#"{{"format":"bhvis.dataset","version":1,"metadata":{{"units":"M"}},"steps":[{steps}]}}"#
    )
}

#[test]
fn parses_grid_steps_and_shares_geometry() {
    let text = doc(&format!(
        r#"{{"time":0.0,"field":{{"grid":{GRID},"values":[0,1,2,null]}},
            "markers":[{{"label":"bh1","position":[0.5,0.5,0.0],"spin":[0,0,1]}}]}},
           {{"time":1.0,"field":{{"grid":{GRID},"values":[1,1,1,1]}},
            "markers":[{{"label":"bh1","position":[0.6,0.5,0.0]}}]}}"#
    ));
    let ds = parse_dataset(&text).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.metadata().units, "M");
    assert_eq!(ds.metadata().source, "bhvis.dataset");

    let g0 = ds.steps()[0].field.geometry().unwrap();
    let g1 = ds.steps()[1].field.geometry().unwrap();
    assert!(Arc::ptr_eq(g0, g1));

    match ds.steps()[0].field.values() {
        FieldValues::Scalar(v) => assert!(v[3].is_nan()),
        FieldValues::Vector(_) => panic!("expected scalar values"),
    }
    assert_eq!(ds.steps()[0].markers[0].spin, Some(Vec3::new(0.0, 0.0, 1.0)));
}

#[test]
fn parses_vector_point_fields() {
    let text = doc(r#"{"time":0.0,"field":{"points":[[0,0,0],[1,0,0]],"values":[[1,0,0],[0,2,0]]}}"#);
    let ds = parse_dataset(&text).unwrap();
    assert!(ds.steps()[0].field.values().is_vector());
    assert_eq!(ds.steps()[0].field.kind(), "points");
}

#[test]
fn empty_steps_are_allowed_at_load_time() {
    let ds = parse_dataset(&doc("")).unwrap();
    assert!(ds.is_empty());
}

#[test]
fn wrong_version_or_tag_is_format_error() {
    let text = r#"{"format":"bhvis.dataset","version":2,"steps":[]}"#;
    assert!(matches!(parse_dataset(text), Err(VisError::Format(_))));
    let text = r#"{"format":"other","version":1,"steps":[]}"#;
    assert!(matches!(parse_dataset(text), Err(VisError::Format(_))));
    assert!(matches!(parse_dataset("{not json"), Err(VisError::Format(_))));
}

#[test]
fn field_without_geometry_is_incomplete() {
    let text = doc(r#"{"time":0.0,"field":{"values":[1.0]}}"#);
    assert!(matches!(
        parse_dataset(&text),
        Err(VisError::IncompleteData(_))
    ));
}

#[test]
fn oversized_grid_dims_are_format_errors() {
    let text = doc(
        r#"{"time":0.0,"field":{"grid":{"cartesian":{"origin":[0.0,0.0],"spacing":[1.0,1.0],
            "dims":[4294967296,4294967297]}},"values":[0,0,0,0]}}"#,
    );
    let err = parse_dataset(&text).unwrap_err();
    assert!(matches!(err, VisError::Format(_)), "{err}");
}
