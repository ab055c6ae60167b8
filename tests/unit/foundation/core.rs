use super::*;

#[test]
fn fps_validation_and_ffmpeg_arg() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    let fps = Fps::new(30000, 1001).unwrap();
    assert_eq!(fps.to_ffmpeg_arg(), "30000/1001");
    assert!((fps.as_f64() - 29.97).abs() < 0.01);
}

#[test]
fn vec3_algebra() {
    let x = Vec3::new(1.0, 0.0, 0.0);
    let y = Vec3::new(0.0, 1.0, 0.0);
    assert_eq!(x.cross(y), Vec3::new(0.0, 0.0, 1.0));
    assert_eq!(x.dot(y), 0.0);
    assert_eq!((x + y) * 2.0, Vec3::new(2.0, 2.0, 0.0));
    assert!(Vec3::ZERO.normalized().is_none());
    let n = Vec3::new(3.0, 4.0, 0.0).normalized().unwrap();
    assert!((n.length() - 1.0).abs() < 1e-12);
}

#[test]
fn vec3_serializes_as_array() {
    let v: Vec3 = serde_json::from_str("[1.0, 2.0, 3.0]").unwrap();
    assert_eq!(v, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(serde_json::to_string(&v).unwrap(), "[1.0,2.0,3.0]");
}

#[test]
fn bounds_skip_non_finite_points() {
    let b = bounds_of([
        Vec3::new(-1.0, 2.0, 0.0),
        Vec3::new(f64::NAN, 0.0, 0.0),
        Vec3::new(3.0, -4.0, 1.0),
    ])
    .unwrap();
    assert_eq!(b.min, Vec3::new(-1.0, -4.0, 0.0));
    assert_eq!(b.max, Vec3::new(3.0, 2.0, 1.0));
    assert_eq!(b.center(), Vec3::new(1.0, -1.0, 0.5));
    assert_eq!(b.horizontal_extent(), 6.0);
    assert!(bounds_of([Vec3::new(f64::NAN, 0.0, 0.0)]).is_none());
}

#[test]
fn rgba_lerp_and_shade() {
    let a = Rgba8::rgb(0, 0, 0);
    let b = Rgba8::rgb(200, 100, 50);
    assert_eq!(a.lerp(b, 0.5), Rgba8::rgb(100, 50, 25));
    assert_eq!(b.shaded(0.5), Rgba8::rgb(100, 50, 25));
    assert_eq!(b.shaded(10.0), Rgba8::rgb(255, 255, 255));
}
