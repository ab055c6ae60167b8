use super::*;
use crate::foundation::core::Rgba8;

fn cfg() -> SinkConfig {
    SinkConfig {
        total_frames: 2,
        resolution: Resolution {
            width: 1,
            height: 1,
        },
        fps: Fps::new(30, 1).unwrap(),
    }
}

#[test]
fn in_memory_sink_enforces_increasing_indices() {
    let mut sink = InMemorySink::new();
    sink.begin(&cfg()).unwrap();
    let f = FrameRGBA::filled(1, 1, Rgba8::rgb(1, 2, 3));
    sink.push_frame(FrameIndex(0), &f).unwrap();
    assert!(sink.push_frame(FrameIndex(0), &f).is_err());
    sink.push_frame(FrameIndex(1), &f).unwrap();
    sink.end(&SequenceReport::default()).unwrap();
    assert_eq!(sink.indices(), vec![0, 1]);
    assert!(sink.committed());
}

#[test]
fn abort_discards_frames() {
    let mut sink = InMemorySink::new();
    sink.begin(&cfg()).unwrap();
    sink.push_frame(FrameIndex(0), &FrameRGBA::filled(1, 1, Rgba8::rgb(0, 0, 0)))
        .unwrap();
    sink.abort();
    sink.abort();
    assert!(sink.frames.is_empty());
    assert!(!sink.committed());
}
