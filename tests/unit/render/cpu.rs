use super::*;
use crate::foundation::core::{FrameIndex, Resolution};
use crate::render::backend::Background;
use crate::scene::colormap::ColorRamp;

const BG: Rgba8 = Rgba8::rgb(10, 20, 30);

fn config(supersample: u32) -> RenderConfig {
    RenderConfig {
        resolution: Resolution {
            width: 64,
            height: 48,
        },
        supersample,
        background: Background::Solid(BG),
    }
}

fn scene(primitives: Vec<Primitive>) -> Scene {
    Scene {
        index: FrameIndex(0),
        time: 0.0,
        camera: CameraPose {
            eye: Vec3::new(0.0, -10.0, 0.0),
            target: Vec3::ZERO,
            up: Vec3::new(0.0, 0.0, 1.0),
            fov_deg: 30.0,
        },
        light: Light::default(),
        primitives,
        legend: None,
        placeholder: false,
    }
}

fn glyph(y: f64, radius: f64, color: Rgba8) -> Primitive {
    Primitive::Glyph {
        center: Vec3::new(0.0, y, 0.0),
        radius,
        color,
    }
}

#[test]
fn empty_scene_is_pure_background() {
    let mut b = CpuBackend::new();
    let f = b.render(&scene(Vec::new()), &config(1)).unwrap();
    assert_eq!((f.width, f.height), (64, 48));
    assert!(f.data.chunks_exact(4).all(|p| p == [10, 20, 30, 255]));
}

#[test]
fn glyph_covers_the_center_and_leaves_corners() {
    let mut b = CpuBackend::new();
    let f = b
        .render(&scene(vec![glyph(0.0, 1.0, Rgba8::rgb(200, 0, 0))]), &config(1))
        .unwrap();
    let c = f.pixel(32, 24);
    assert!(c[0] > 100 && c[1] < 50, "{c:?}");
    assert_eq!(f.pixel(0, 0), [10, 20, 30, 255]);
    assert_eq!(f.pixel(63, 47), [10, 20, 30, 255]);
}

#[test]
fn nearer_primitives_paint_over_farther_ones() {
    let near = glyph(-5.0, 0.5, Rgba8::rgb(0, 0, 220));
    let far = glyph(0.0, 1.0, Rgba8::rgb(220, 0, 0));
    let mut b = CpuBackend::new();
    // Submission order must not matter.
    for prims in [vec![near.clone(), far.clone()], vec![far, near]] {
        let f = b.render(&scene(prims), &config(1)).unwrap();
        let c = f.pixel(32, 24);
        assert!(c[2] > c[0], "{c:?}");
    }
}

#[test]
fn rendering_is_deterministic_across_instances_and_reuse() {
    let s = scene(vec![
        glyph(0.0, 1.0, Rgba8::rgb(200, 120, 0)),
        Primitive::Arrow {
            from: Vec3::new(-1.0, 0.0, -1.0),
            to: Vec3::new(1.0, 0.0, 1.0),
            color: Rgba8::rgb(0, 200, 0),
            width_px: 2.0,
        },
        Primitive::Polyline {
            points: vec![
                Vec3::new(-2.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.5),
                Vec3::new(2.0, 0.0, 0.0),
            ],
            color: Rgba8::rgb(230, 200, 60),
            width_px: 1.5,
        },
    ]);
    let mut a = CpuBackend::new();
    let mut b = CpuBackend::new();
    let first = a.render(&s, &config(2)).unwrap();
    // Different size in between forces a context rebuild.
    a.render(&s, &config(1)).unwrap();
    let again = a.render(&s, &config(2)).unwrap();
    let other = b.render(&s, &config(2)).unwrap();
    assert_eq!(first, again);
    assert_eq!(first, other);
}

#[test]
fn supersampled_output_keeps_requested_resolution() {
    let mut b = CpuBackend::new();
    let f = b
        .render(&scene(vec![glyph(0.0, 1.0, Rgba8::rgb(200, 0, 0))]), &config(3))
        .unwrap();
    assert_eq!((f.width, f.height), (64, 48));
    assert_eq!(f.data.len(), 64 * 48 * 4);
    assert_eq!(f.pixel(0, 0), [10, 20, 30, 255]);
}

#[test]
fn mesh_facing_the_camera_is_shaded_not_background() {
    let mesh = Primitive::Mesh {
        positions: vec![
            Vec3::new(-2.0, 0.0, -2.0),
            Vec3::new(2.0, 0.0, -2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ],
        colors: vec![Rgba8::rgb(250, 250, 250); 3],
        triangles: vec![[0, 1, 2]],
    };
    let mut b = CpuBackend::new();
    let f = b.render(&scene(vec![mesh]), &config(1)).unwrap();
    let c = f.pixel(32, 24);
    assert!(c[0] > 40 && c[0] == c[1] && c[1] == c[2], "{c:?}");
}

#[test]
fn legend_bar_is_drawn_on_the_right() {
    let mut s = scene(Vec::new());
    s.legend = Some(Legend {
        ramp: ColorRamp::default(),
        domain: [0.0, 1.0],
    });
    let mut b = CpuBackend::new();
    let f = b.render(&s, &config(1)).unwrap();
    assert_ne!(f.pixel(33, 24), [10, 20, 30, 255]);
    assert_eq!(f.pixel(5, 24), [10, 20, 30, 255]);
}

#[test]
fn box_downsample_averages_blocks() {
    // 2x1 output from a 4x2 source.
    let mut src = Vec::new();
    for v in [0u8, 100, 200, 200, 0, 100, 200, 200] {
        src.extend_from_slice(&[v, v, v, 255]);
    }
    let out = box_downsample(&src, 2, 1, 2);
    assert_eq!(out, vec![50, 50, 50, 255, 200, 200, 200, 255]);
}
