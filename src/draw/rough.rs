//! Hand-drawn geometry.
//!
//! Every function here produces center-line paths; callers turn them into stroke outlines with
//! [`stroke_outline`]. Randomness comes from a [`Jitter`] seeded per command, so the same command
//! always produces the same strokes.

use std::f64::consts::{PI, TAU};

use kurbo::{BezPath, Point, Rect, Vec2};

use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::Jitter;

/// Default hachure angle in degrees.
const HACHURE_ANGLE_DEG: f64 = -41.0;
/// Upper bound on hatch lines in one fill.
pub(crate) const MAX_HACHURE_LINES: usize = 10_000;
/// Arrow head half-angle in degrees.
const HEAD_ANGLE_DEG: f64 = 25.0;

/// Seeded pen producing slightly wobbly strokes.
#[derive(Clone, Debug)]
pub(crate) struct RoughPen {
    rng: Jitter,
    roughness: f64,
}

impl RoughPen {
    pub(crate) fn new(seed: u64, roughness: f64) -> Self {
        Self {
            rng: Jitter::new(seed),
            roughness: roughness.max(0.0),
        }
    }

    /// Two overlapping passes of a single bowed segment.
    pub(crate) fn line(&mut self, a: Point, b: Point) -> BezPath {
        let mut path = BezPath::new();
        self.line_pass(&mut path, a, b, 1.0);
        self.line_pass(&mut path, a, b, 0.5);
        path
    }

    fn line_pass(&mut self, path: &mut BezPath, a: Point, b: Point, scale: f64) {
        let len = (b - a).hypot();
        let off = (1.5 * self.roughness).min(len * 0.1 + 0.5) * scale;
        let bow = self.roughness * len / 200.0 * scale;
        let dir = if len > 0.0 { (b - a) / len } else { Vec2::ZERO };
        let normal = Vec2::new(-dir.y, dir.x) * self.rng.offset(bow);

        let start = a + self.wobble(off);
        let end = b + self.wobble(off);
        let c1 = a.lerp(b, 0.5 + self.rng.offset(0.1)) + normal + self.wobble(off);
        let c2 = a.lerp(b, 0.75 + self.rng.offset(0.1)) + normal + self.wobble(off);

        path.move_to(start);
        path.curve_to(c1, c2, end);
    }

    fn wobble(&mut self, amount: f64) -> Vec2 {
        Vec2::new(self.rng.offset(amount), self.rng.offset(amount))
    }

    /// Closed outline through `points`, one rough line per edge.
    pub(crate) fn polygon(&mut self, points: &[Point]) -> BezPath {
        let mut path = BezPath::new();
        if points.len() < 2 {
            return path;
        }
        for (i, &a) in points.iter().enumerate() {
            let b = points[(i + 1) % points.len()];
            path.extend(self.line(a, b).iter());
        }
        path
    }

    /// Rough ellipse outline: two passes of a jittered smooth loop.
    pub(crate) fn ellipse(&mut self, center: Point, rx: f64, ry: f64) -> BezPath {
        let mut path = BezPath::new();
        for pass in 0..2 {
            let amp = if pass == 0 { 1.0 } else { 0.5 };
            let pts = self.ellipse_points(center, rx, ry, amp);
            catmull_rom_into(&mut path, &pts);
        }
        path
    }

    fn ellipse_points(&mut self, center: Point, rx: f64, ry: f64, amp: f64) -> Vec<Point> {
        let perimeter = PI * (rx + ry);
        let steps = ((perimeter / 20.0).ceil() as usize).clamp(12, 64);
        let jitter = (self.roughness * 0.02 * amp).min(0.08);
        let start = self.rng.unit() * TAU;
        let overlap = self.rng.unit() * 0.3 * amp;
        let sweep = TAU + overlap;

        (0..=steps)
            .map(|i| {
                let t = start + sweep * (i as f64) / (steps as f64);
                let kx = 1.0 + self.rng.offset(jitter);
                let ky = 1.0 + self.rng.offset(jitter);
                Point::new(center.x + rx * kx * t.cos(), center.y + ry * ky * t.sin())
            })
            .collect()
    }

    /// Quadratic connector from `a` to `b` bowed by `bend` (fraction of length).
    pub(crate) fn curve(&mut self, a: Point, b: Point, bend: f64) -> (BezPath, Point) {
        let control = curve_control(a, b, bend);
        let len = (b - a).hypot();
        let off = (1.5 * self.roughness).min(len * 0.05 + 0.5);

        let mut path = BezPath::new();
        for scale in [1.0, 0.5] {
            path.move_to(a + self.wobble(off * scale));
            path.quad_to(
                control + self.wobble(off * scale),
                b + self.wobble(off * scale),
            );
        }
        (path, control)
    }

    /// Two short head strokes at `tip`, pointing away from `from`.
    pub(crate) fn arrow_head(&mut self, from: Point, tip: Point, stroke_width: f64) -> BezPath {
        let mut path = BezPath::new();
        let d = tip - from;
        let len = d.hypot();
        if len <= f64::EPSILON {
            return path;
        }
        let head = (len * 0.2).clamp(8.0, 24.0) * (stroke_width / 2.0).max(1.0).sqrt();
        let angle = d.atan2();
        for side in [-1.0, 1.0] {
            let a = angle + PI - side * HEAD_ANGLE_DEG.to_radians();
            let end = tip + Vec2::from_angle(a) * head;
            path.extend(self.line(tip, end).iter());
        }
        path
    }

    /// Parallel hatch lines inside `polygon` and `clip`, each drawn as a rough line.
    pub(crate) fn hachure(
        &mut self,
        polygon: &[Point],
        gap: f64,
        clip: Rect,
    ) -> ReelResult<BezPath> {
        let mut path = BezPath::new();
        for (a, b) in hachure_segments(polygon, gap, HACHURE_ANGLE_DEG.to_radians(), clip)? {
            path.extend(self.line(a, b).iter());
        }
        Ok(path)
    }
}

pub(crate) fn curve_control(a: Point, b: Point, bend: f64) -> Point {
    let d = b - a;
    let normal = Vec2::new(-d.y, d.x);
    a.midpoint(b) + normal * bend
}

/// Straight segments covering the part of `polygon` inside `clip` at spacing `gap`, rotated by
/// `angle`.
///
/// Lines keep the phase they would have over the whole polygon, so clipping never shifts the
/// pattern. Fails when the fill would need more than [`MAX_HACHURE_LINES`] lines or the gap is
/// below the float resolution at the polygon's coordinates.
pub(crate) fn hachure_segments(
    polygon: &[Point],
    gap: f64,
    angle: f64,
    clip: Rect,
) -> ReelResult<Vec<(Point, Point)>> {
    if polygon.len() < 3 || gap.is_nan() || gap <= 0.0 {
        return Ok(Vec::new());
    }
    let (sin, cos) = (-angle).sin_cos();
    let rotate = |p: Point, s: f64, c: f64| Point::new(p.x * c - p.y * s, p.x * s + p.y * c);

    let pts: Vec<Point> = polygon.iter().map(|&p| rotate(p, sin, cos)).collect();
    let bounds = |points: &[Point]| {
        points.iter().fold(
            Rect::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |r, p| Rect::new(r.x0.min(p.x), r.y0.min(p.y), r.x1.max(p.x), r.y1.max(p.y)),
        )
    };
    let shape = bounds(&pts);
    let corners = [
        Point::new(clip.x0, clip.y0),
        Point::new(clip.x1, clip.y0),
        Point::new(clip.x1, clip.y1),
        Point::new(clip.x0, clip.y1),
    ]
    .map(|p| rotate(p, sin, cos));
    let window = bounds(&corners);

    let lo = shape.y0.max(window.y0);
    let hi = shape.y1.min(window.y1);
    if lo >= hi {
        return Ok(Vec::new());
    }
    let skipped = ((lo - shape.y0 - gap / 2.0) / gap).ceil().max(0.0);
    let first = shape.y0 + gap / 2.0 + skipped * gap;
    if first + gap == first {
        return Err(ReelError::command(format!(
            "hachure gap {gap} vanishes at y = {first:e}"
        )));
    }
    let lines = ((hi - first) / gap).ceil().max(0.0);
    if lines > MAX_HACHURE_LINES as f64 {
        return Err(ReelError::command(format!(
            "hachure fill needs {lines} lines (max {MAX_HACHURE_LINES})"
        )));
    }

    let mut out = Vec::new();
    for k in 0..lines as usize {
        let y = first + k as f64 * gap;
        if y >= hi {
            break;
        }
        let mut xs = Vec::new();
        for (i, &p) in pts.iter().enumerate() {
            let q = pts[(i + 1) % pts.len()];
            if (p.y <= y && y < q.y) || (q.y <= y && y < p.y) {
                xs.push(p.x + (y - p.y) * (q.x - p.x) / (q.y - p.y));
            }
        }
        xs.sort_by(f64::total_cmp);
        for pair in xs.chunks_exact(2) {
            let x0 = pair[0].max(window.x0);
            let x1 = pair[1].min(window.x1);
            if x0 >= x1 {
                continue;
            }
            let a = rotate(Point::new(x0, y), -sin, cos);
            let b = rotate(Point::new(x1, y), -sin, cos);
            out.push((a, b));
        }
    }
    Ok(out)
}

/// Polygon approximation of an ellipse, used for hachure clipping.
pub(crate) fn ellipse_polygon(center: Point, rx: f64, ry: f64) -> Vec<Point> {
    const N: usize = 48;
    (0..N)
        .map(|i| {
            let t = TAU * (i as f64) / (N as f64);
            Point::new(center.x + rx * t.cos(), center.y + ry * t.sin())
        })
        .collect()
}

fn catmull_rom_into(path: &mut BezPath, pts: &[Point]) {
    if pts.len() < 2 {
        return;
    }
    path.move_to(pts[0]);
    for i in 0..pts.len() - 1 {
        let p0 = pts[i.saturating_sub(1)];
        let p1 = pts[i];
        let p2 = pts[i + 1];
        let p3 = pts[(i + 2).min(pts.len() - 1)];
        let c1 = p1 + (p2 - p0) / 6.0;
        let c2 = p2 - (p3 - p1) / 6.0;
        path.curve_to(c1, c2, p2);
    }
}

/// Round-capped outline of `path` at `width`.
pub(crate) fn stroke_outline(path: &BezPath, width: f64) -> BezPath {
    let style = kurbo::Stroke::new(width)
        .with_caps(kurbo::Cap::Round)
        .with_join(kurbo::Join::Round);
    kurbo::stroke(path.iter(), &style, &kurbo::StrokeOpts::default(), 0.1)
}
