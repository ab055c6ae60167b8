use super::*;

fn summary() -> RunSummary {
    RunSummary {
        backend: "cpu".to_owned(),
        deterministic_backend: true,
        frames_total: 10,
        frames_rendered: 9,
        frames_placeholder: 0,
        placeholders: Vec::new(),
        skipped: vec![SkippedFrame {
            index: 7,
            time: 3.5,
            reason: "render backend error: boom".to_owned(),
        }],
        gaps: vec![7],
        gaps_filled: Vec::new(),
        committed: false,
        max_buffered: 3,
        elapsed: Duration::from_millis(1500),
    }
}

#[test]
fn gap_error_lists_open_gaps() {
    let s = summary();
    assert!(!s.is_gap_free());
    match s.gap_error() {
        Some(VisError::Gap { missing }) => assert_eq!(missing, vec![7]),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn display_mentions_counts_and_reasons() {
    let text = summary().to_string();
    assert!(text.contains("frames attempted:   10"));
    assert!(text.contains("#7 (t=3.5): render backend error: boom"));
    assert!(text.contains("INCOMPLETE, missing [7]"));
    assert!(text.contains("not committed"));
}

#[test]
fn serializes_elapsed_as_seconds() {
    let v = serde_json::to_value(summary()).unwrap();
    assert_eq!(v["elapsed"], 1.5);
    assert_eq!(v["gaps"][0], 7);
}
