use kurbo::{BezPath, Point, Shape};

use crate::foundation::core::{Rgba8, Vec3};
use crate::foundation::error::{VisError, VisResult};
use crate::foundation::math::flatten_premul_over_bg;
use crate::render::backend::{FrameRGBA, RenderBackend, RenderConfig};
use crate::scene::camera::{CameraPose, Light};
use crate::scene::model::{Legend, Primitive, Scene};

const PATH_TOLERANCE: f64 = 0.1;
const LEGEND_BANDS: u32 = 64;

/// CPU rasterizer on top of `vello_cpu`.
///
/// Primitives are projected, depth-sorted back to front and filled as 2D paths. Output is a
/// pure function of `(Scene, RenderConfig)`.
pub struct CpuBackend {
    ctx: Option<vello_cpu::RenderContext>,
    pixmap: Option<vello_cpu::Pixmap>,
}

impl CpuBackend {
    /// Backend with no context allocated yet.
    pub fn new() -> Self {
        Self {
            ctx: None,
            pixmap: None,
        }
    }

    fn with_ctx_mut<R>(
        &mut self,
        width: u16,
        height: u16,
        f: impl FnOnce(&mut vello_cpu::RenderContext, &mut vello_cpu::Pixmap) -> R,
    ) -> R {
        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == width && ctx.height() == height => ctx,
            _ => vello_cpu::RenderContext::new(width, height),
        };
        let mut pixmap = match self.pixmap.take() {
            Some(p) if p.width() == width && p.height() == height => p,
            _ => vello_cpu::Pixmap::new(width, height),
        };
        ctx.reset();
        let out = f(&mut ctx, &mut pixmap);
        self.ctx = Some(ctx);
        self.pixmap = Some(pixmap);
        out
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn is_deterministic(&self) -> bool {
        true
    }

    #[tracing::instrument(level = "trace", skip_all, fields(frame = scene.index.0))]
    fn render(&mut self, scene: &Scene, cfg: &RenderConfig) -> VisResult<FrameRGBA> {
        cfg.validate()?;
        let ss = cfg.supersample;
        let (w, h) = (cfg.resolution.width * ss, cfg.resolution.height * ss);
        let w16: u16 = w
            .try_into()
            .map_err(|_| VisError::backend("raster width exceeds u16"))?;
        let h16: u16 = h
            .try_into()
            .map_err(|_| VisError::backend("raster height exceeds u16"))?;

        let viewport = Viewport {
            width: f64::from(w),
            height: f64::from(h),
            scale: f64::from(ss),
        };
        let items = collect_draw_items(scene, &viewport);

        let premul = self.with_ctx_mut(w16, h16, |ctx, pixmap| {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_blend_mode(vello_cpu::peniko::BlendMode::default());

            for y in 0..h {
                let c = cfg.background.row_color(y, h);
                set_color(ctx, c);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    f64::from(y),
                    f64::from(w),
                    f64::from(y + 1),
                ));
            }

            for item in &items {
                set_color(ctx, item.color);
                ctx.fill_path(&path_to_cpu(&item.path));
            }

            if let Some(legend) = &scene.legend {
                draw_legend(ctx, legend, &viewport);
            }

            ctx.flush();
            ctx.render_to_pixmap(pixmap);
            pixmap.data_as_u8_slice().to_vec()
        });

        let (out_w, out_h) = (cfg.resolution.width, cfg.resolution.height);
        let premul = if ss > 1 {
            box_downsample(&premul, out_w, out_h, ss)
        } else {
            premul
        };
        let bottom = cfg.background.row_color(out_h.saturating_sub(1), out_h);
        let mut data = vec![0u8; premul.len()];
        flatten_premul_over_bg(&mut data, &premul, [bottom.r, bottom.g, bottom.b]);

        Ok(FrameRGBA {
            width: out_w,
            height: out_h,
            data,
        })
    }
}

struct Viewport {
    width: f64,
    height: f64,
    /// Supersampling factor applied to pixel-space sizes.
    scale: f64,
}

impl Viewport {
    fn aspect(&self) -> f64 {
        self.width / self.height
    }

    fn project(&self, camera: &CameraPose, p: Vec3) -> Option<(Point, f64)> {
        let q = camera.project(p, self.aspect())?;
        let pt = Point::new(
            (q.x + 1.0) * 0.5 * self.width,
            (1.0 - q.y) * 0.5 * self.height,
        );
        Some((pt, q.depth))
    }

    /// Pixels per world unit at `depth`.
    fn pixels_per_unit(&self, camera: &CameraPose, depth: f64) -> f64 {
        let focal = 1.0 / (camera.fov_deg.to_radians() * 0.5).tan();
        focal * 0.5 * self.height / depth
    }
}

struct DrawItem {
    depth: f64,
    order: usize,
    color: Rgba8,
    path: BezPath,
}

fn collect_draw_items(scene: &Scene, vp: &Viewport) -> Vec<DrawItem> {
    let cam = &scene.camera;
    let mut items = Vec::new();
    let push = |items: &mut Vec<DrawItem>, depth: f64, color: Rgba8, path: BezPath| {
        let order = items.len();
        items.push(DrawItem {
            depth,
            order,
            color,
            path,
        });
    };

    for prim in &scene.primitives {
        match prim {
            Primitive::Mesh {
                positions,
                colors,
                triangles,
            } => {
                for tri in triangles {
                    let [a, b, c] = tri.map(|i| i as usize);
                    let (Some(pa), Some(pb), Some(pc)) = (
                        positions.get(a).copied(),
                        positions.get(b).copied(),
                        positions.get(c).copied(),
                    ) else {
                        continue;
                    };
                    let (Some((sa, da)), Some((sb, db)), Some((sc, dc))) = (
                        vp.project(cam, pa),
                        vp.project(cam, pb),
                        vp.project(cam, pc),
                    ) else {
                        continue;
                    };
                    let color = triangle_color(
                        &scene.light,
                        cam.eye,
                        [pa, pb, pc],
                        [a, b, c].map(|i| colors.get(i).copied().unwrap_or(Rgba8::rgb(0, 0, 0))),
                    );
                    push(
                        &mut items,
                        (da + db + dc) / 3.0,
                        color,
                        triangle_path([sa, sb, sc]),
                    );
                }
            }
            Primitive::Segments {
                segments,
                color,
                width_px,
            } => {
                let width = f64::from(*width_px) * vp.scale;
                for [p0, p1] in segments {
                    if let (Some((s0, d0)), Some((s1, d1))) =
                        (vp.project(cam, *p0), vp.project(cam, *p1))
                    {
                        push(&mut items, (d0 + d1) * 0.5, *color, stroke_line(s0, s1, width));
                    }
                }
            }
            Primitive::Polyline {
                points,
                color,
                width_px,
            } => {
                let width = f64::from(*width_px) * vp.scale;
                for pair in points.windows(2) {
                    if let (Some((s0, d0)), Some((s1, d1))) =
                        (vp.project(cam, pair[0]), vp.project(cam, pair[1]))
                    {
                        push(&mut items, (d0 + d1) * 0.5, *color, stroke_line(s0, s1, width));
                    }
                }
            }
            Primitive::Glyph {
                center,
                radius,
                color,
            } => {
                let Some((c, depth)) = vp.project(cam, *center) else {
                    continue;
                };
                let r = (radius * vp.pixels_per_unit(cam, depth)).max(1.5 * vp.scale);
                let light = &scene.light;
                let base = color.shaded(light.ambient + light.diffuse * 0.6);
                push(
                    &mut items,
                    depth,
                    base,
                    kurbo::Circle::new(c, r).to_path(PATH_TOLERANCE),
                );
                // Highlight offset towards the light, drawn just in front of the body.
                let (right, up, _) = cam.basis();
                let l = -light.direction;
                let offset = kurbo::Vec2::new(l.dot(right), -l.dot(up)) * (0.35 * r);
                let hi = color.shaded(light.ambient + light.diffuse + light.specular);
                push(
                    &mut items,
                    depth - 1e-9,
                    hi,
                    kurbo::Circle::new(c + offset, r * 0.45).to_path(PATH_TOLERANCE),
                );
            }
            Primitive::Arrow {
                from,
                to,
                color,
                width_px,
            } => {
                let (Some((s0, d0)), Some((s1, d1))) =
                    (vp.project(cam, *from), vp.project(cam, *to))
                else {
                    continue;
                };
                let width = f64::from(*width_px) * vp.scale;
                let mut path = stroke_line(s0, s1, width);
                if let Some(head) = arrow_head(s0, s1, width) {
                    path.extend(head.iter());
                }
                push(&mut items, (d0 + d1) * 0.5, *color, path);
            }
        }
    }

    // Back to front; submission order breaks ties so equal inputs paint identically.
    items.sort_by(|a, b| b.depth.total_cmp(&a.depth).then(a.order.cmp(&b.order)));
    items
}

fn triangle_color(light: &Light, eye: Vec3, p: [Vec3; 3], c: [Rgba8; 3]) -> Rgba8 {
    let centroid = (p[0] + p[1] + p[2]) * (1.0 / 3.0);
    let normal = (p[1] - p[0])
        .cross(p[2] - p[0])
        .normalized()
        .unwrap_or(Vec3::new(0.0, 0.0, 1.0));
    let view = (eye - centroid)
        .normalized()
        .unwrap_or(Vec3::new(0.0, 0.0, 1.0));
    let k = light.intensity(normal, view);
    let avg = |a: u8, b: u8, c: u8| -> u8 {
        ((u32::from(a) + u32::from(b) + u32::from(c) + 1) / 3) as u8
    };
    Rgba8 {
        r: avg(c[0].r, c[1].r, c[2].r),
        g: avg(c[0].g, c[1].g, c[2].g),
        b: avg(c[0].b, c[1].b, c[2].b),
        a: avg(c[0].a, c[1].a, c[2].a),
    }
    .shaded(k)
}

/// Triangle grown slightly around its centroid to hide anti-aliasing seams between neighbors.
fn triangle_path(pts: [Point; 3]) -> BezPath {
    let cx = (pts[0].x + pts[1].x + pts[2].x) / 3.0;
    let cy = (pts[0].y + pts[1].y + pts[2].y) / 3.0;
    let grow = |p: Point| -> Point {
        let d = kurbo::Vec2::new(p.x - cx, p.y - cy);
        let len = d.hypot();
        if len <= 1e-9 {
            p
        } else {
            p + d * (0.35 / len)
        }
    };
    let mut path = BezPath::new();
    path.move_to(grow(pts[0]));
    path.line_to(grow(pts[1]));
    path.line_to(grow(pts[2]));
    path.close_path();
    path
}

fn stroke_line(a: Point, b: Point, width: f64) -> BezPath {
    let mut line = BezPath::new();
    line.move_to(a);
    line.line_to(b);
    let style = kurbo::Stroke::new(width.max(0.5))
        .with_caps(kurbo::Cap::Round)
        .with_join(kurbo::Join::Round);
    kurbo::stroke(line.iter(), &style, &kurbo::StrokeOpts::default(), PATH_TOLERANCE)
}

fn arrow_head(from: Point, to: Point, width: f64) -> Option<BezPath> {
    let d = to - from;
    let len = d.hypot();
    if len <= 1e-6 {
        return None;
    }
    let dir = d / len;
    let perp = kurbo::Vec2::new(-dir.y, dir.x);
    let size = (width * 3.0).max(6.0).min(len * 0.5);
    let base = to - dir * size;
    let mut path = BezPath::new();
    path.move_to(to);
    path.line_to(base + perp * (size * 0.5));
    path.line_to(base - perp * (size * 0.5));
    path.close_path();
    Some(path)
}

fn draw_legend(ctx: &mut vello_cpu::RenderContext, legend: &Legend, vp: &Viewport) {
    let s = vp.scale;
    let x0 = vp.width - 40.0 * s;
    let x1 = vp.width - 22.0 * s;
    let y0 = vp.height * 0.2;
    let y1 = vp.height * 0.8;

    set_color(ctx, Rgba8::rgb(20, 20, 20));
    ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
        x0 - s,
        y0 - s,
        x1 + s,
        y1 + s,
    ));
    let band = (y1 - y0) / f64::from(LEGEND_BANDS);
    for i in 0..LEGEND_BANDS {
        // High values at the top.
        let t = 1.0 - (f64::from(i) + 0.5) / f64::from(LEGEND_BANDS);
        set_color(ctx, legend.ramp.color(t));
        let top = y0 + band * f64::from(i);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(x0, top, x1, top + band));
    }
}

fn set_color(ctx: &mut vello_cpu::RenderContext, c: Rgba8) {
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a));
}

fn path_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let pt = |p: Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(pt(p)),
            PathEl::LineTo(p) => out.line_to(pt(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(pt(p1), pt(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(pt(p1), pt(p2), pt(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

/// Average `factor x factor` blocks of premultiplied RGBA8.
pub(crate) fn box_downsample(src: &[u8], out_w: u32, out_h: u32, factor: u32) -> Vec<u8> {
    let (ow, oh, f) = (out_w as usize, out_h as usize, factor as usize);
    let src_w = ow * f;
    let n = (f * f) as u32;
    let mut out = vec![0u8; ow * oh * 4];
    for y in 0..oh {
        for x in 0..ow {
            let mut acc = [0u32; 4];
            for dy in 0..f {
                let row = (y * f + dy) * src_w;
                for dx in 0..f {
                    let i = (row + x * f + dx) * 4;
                    for c in 0..4 {
                        acc[c] += u32::from(src[i + c]);
                    }
                }
            }
            let o = (y * ow + x) * 4;
            for c in 0..4 {
                out[o + c] = ((acc[c] + n / 2) / n) as u8;
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
