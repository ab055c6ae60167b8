use super::*;

fn cfg() -> EncodeConfig {
    EncodeConfig {
        frames_dir: PathBuf::from("out/frames"),
        pad_width: 6,
        fps: Fps::new(30000, 1001).unwrap(),
        resolution: Resolution {
            width: 772,
            height: 702,
        },
        out_path: PathBuf::from("out/movie.mp4"),
        overwrite: true,
    }
}

#[test]
fn arguments_describe_an_image_sequence_input() {
    let enc = FfmpegEncoder::new(cfg()).unwrap();
    let args = enc.args();
    assert_eq!(args[0], "-y");
    let pos = |s: &str| args.iter().position(|a| a == s).unwrap();
    assert_eq!(args[pos("-framerate") + 1], "30000/1001");
    assert_eq!(args[pos("-start_number") + 1], "0");
    assert!(args[pos("-i") + 1].ends_with("frame_%06d.png"));
    assert_eq!(args[pos("-c:v") + 1], "libx264");
    assert_eq!(args[pos("-pix_fmt") + 1], "yuv420p");
    assert!(args.last().unwrap().ends_with("movie.mp4"));
}

#[test]
fn odd_dimensions_are_rejected() {
    let mut c = cfg();
    c.resolution.width = 771;
    assert!(matches!(
        FfmpegEncoder::new(c),
        Err(VisError::Validation(_))
    ));
}

#[test]
fn no_overwrite_uses_dash_n() {
    let mut c = cfg();
    c.overwrite = false;
    assert_eq!(FfmpegEncoder::new(c).unwrap().args()[0], "-n");
}
