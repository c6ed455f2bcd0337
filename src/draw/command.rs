use std::sync::Arc;

use crate::draw::rough::{RoughPen, ellipse_polygon, stroke_outline};
use crate::draw::surface::Surface;
use crate::draw::text::TextBlock;
use crate::foundation::core::{BezPath, Point, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};

/// How a closed shape's interior is painted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStyle {
    /// Diagonal hand-drawn hatch lines.
    #[default]
    Hachure,
    /// Flat fill.
    Solid,
}

impl FillStyle {
    /// Parse `"hachure"` or `"solid"`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hachure" => Some(Self::Hachure),
            "solid" => Some(Self::Solid),
            _ => None,
        }
    }
}

/// Stroke and fill settings for shapes, arrows and curves.
#[derive(Clone, Debug, PartialEq)]
pub struct Style {
    /// Outline color.
    pub stroke: Rgba8,
    /// Outline width in pixels.
    pub stroke_width: f64,
    /// Interior color; `None` leaves the interior untouched.
    pub fill: Option<Rgba8>,
    /// Interior paint mode.
    pub fill_style: FillStyle,
    /// Jitter amplitude; `0` draws clean geometry.
    pub roughness: f64,
    /// Jitter seed, fixed when the command is captured.
    pub seed: u64,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stroke: Rgba8::INK,
            stroke_width: 2.0,
            fill: None,
            fill_style: FillStyle::Hachure,
            roughness: 1.0,
            seed: 0,
        }
    }
}

/// Closed and open shapes drawn by [`DrawCommand::Shape`].
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// Axis-aligned rectangle from its top-left corner.
    Rect {
        /// Top-left corner.
        origin: Point,
        /// Width in pixels.
        width: f64,
        /// Height in pixels.
        height: f64,
    },
    /// Ellipse given by center and full extents.
    Ellipse {
        /// Center point.
        center: Point,
        /// Horizontal diameter.
        width: f64,
        /// Vertical diameter.
        height: f64,
    },
    /// Single segment.
    Line {
        /// Start point.
        from: Point,
        /// End point.
        to: Point,
    },
    /// Closed polygon with at least three vertices.
    Polygon(Vec<Point>),
}

/// One primitive drawing call with all of its arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    /// Rect, ellipse, line or polygon.
    Shape {
        /// Geometry.
        shape: Shape,
        /// Paint settings.
        style: Style,
    },
    /// Straight arrow with a head at `to`.
    Arrow {
        /// Tail.
        from: Point,
        /// Tip.
        to: Point,
        /// Paint settings.
        style: Style,
    },
    /// Bowed connector with a head at `to`.
    Curve {
        /// Tail.
        from: Point,
        /// Tip.
        to: Point,
        /// Perpendicular offset of the control point as a fraction of the chord length.
        bend: f64,
        /// Paint settings.
        style: Style,
    },
    /// Centered label.
    Text {
        /// Raw text; line breaks are resolved when drawn.
        text: String,
        /// Block center.
        at: Point,
        /// Font size in pixels.
        size: f64,
        /// Fill color.
        color: Rgba8,
    },
    /// Visible notice shown in place of a step whose code could not be captured.
    Notice {
        /// Short human-readable reason.
        message: String,
    },
}

impl DrawCommand {
    /// Stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Shape {
                shape: Shape::Rect { .. },
                ..
            } => "rect",
            Self::Shape {
                shape: Shape::Ellipse { .. },
                ..
            } => "ellipse",
            Self::Shape {
                shape: Shape::Line { .. },
                ..
            } => "line",
            Self::Shape {
                shape: Shape::Polygon(_),
                ..
            } => "polygon",
            Self::Arrow { .. } => "arrow",
            Self::Curve { .. } => "curve",
            Self::Text { .. } => "text",
            Self::Notice { .. } => "notice",
        }
    }

    /// Draw this command onto `surface`.
    ///
    /// Invalid geometry (non-finite coordinates, negative sizes) is reported as
    /// [`ReelError::CommandExecution`] without touching the surface.
    pub fn execute(&self, surface: &mut Surface) -> ReelResult<()> {
        match self {
            Self::Shape { shape, style } => {
                check_style(style)?;
                draw_shape(surface, shape, style)
            }
            Self::Arrow { from, to, style } => {
                check_style(style)?;
                check_points(&[*from, *to])?;
                let mut pen = RoughPen::new(style.seed, style.roughness);
                let mut path = pen.line(*from, *to);
                path.extend(pen.arrow_head(*from, *to, style.stroke_width).iter());
                surface.fill_paths(&[(stroke_outline(&path, style.stroke_width), style.stroke)])
            }
            Self::Curve {
                from,
                to,
                bend,
                style,
            } => {
                check_style(style)?;
                check_points(&[*from, *to])?;
                check_finite("bend", *bend)?;
                let mut pen = RoughPen::new(style.seed, style.roughness);
                let (mut path, control) = pen.curve(*from, *to, *bend);
                path.extend(pen.arrow_head(control, *to, style.stroke_width).iter());
                surface.fill_paths(&[(stroke_outline(&path, style.stroke_width), style.stroke)])
            }
            Self::Text {
                text,
                at,
                size,
                color,
            } => {
                check_points(&[*at])?;
                check_finite("size", *size)?;
                if *size <= 0.0 {
                    return Err(ReelError::command(format!(
                        "text size must be positive, got {size}"
                    )));
                }
                surface.draw_text(&TextBlock::new(text, *at, *size, *color))
            }
            Self::Notice { message } => draw_notice(surface, message),
        }
    }
}

fn draw_shape(surface: &mut Surface, shape: &Shape, style: &Style) -> ReelResult<()> {
    let mut pen = RoughPen::new(style.seed, style.roughness);
    let (outline, interior): (BezPath, Option<Interior>) = match shape {
        Shape::Rect {
            origin,
            width,
            height,
        } => {
            check_points(&[*origin])?;
            check_extent("rect", *width, *height)?;
            let corners = vec![
                *origin,
                Point::new(origin.x + width, origin.y),
                Point::new(origin.x + width, origin.y + height),
                Point::new(origin.x, origin.y + height),
            ];
            (pen.polygon(&corners), Some(Interior::Polygon(corners)))
        }
        Shape::Ellipse {
            center,
            width,
            height,
        } => {
            check_points(&[*center])?;
            check_extent("ellipse", *width, *height)?;
            let (rx, ry) = (width / 2.0, height / 2.0);
            (
                pen.ellipse(*center, rx, ry),
                Some(Interior::Ellipse(*center, rx, ry)),
            )
        }
        Shape::Line { from, to } => {
            check_points(&[*from, *to])?;
            (pen.line(*from, *to), None)
        }
        Shape::Polygon(points) => {
            if points.len() < 3 {
                return Err(ReelError::command(format!(
                    "polygon needs at least 3 points, got {}",
                    points.len()
                )));
            }
            check_points(points)?;
            (pen.polygon(points), Some(Interior::Polygon(points.clone())))
        }
    };

    let canvas = surface.canvas();
    let view = kurbo::Rect::new(0.0, 0.0, f64::from(canvas.width), f64::from(canvas.height));
    let margin = style.stroke_width + 2.0 * style.roughness + 1.0;
    let reach = kurbo::Shape::bounding_box(&outline).inflate(margin, margin);
    if reach.intersect(view).area() <= 0.0 {
        return Ok(());
    }

    let mut layers = Vec::with_capacity(2);
    if let (Some(fill), Some(interior)) = (style.fill, interior) {
        let fill_path = match style.fill_style {
            FillStyle::Solid => interior.solid_path(),
            FillStyle::Hachure => {
                let gap = (style.stroke_width * 4.0).max(8.0);
                let clip = view.inflate(gap, gap);
                let hatch = pen.hachure(&interior.polygon(), gap, clip)?;
                stroke_outline(&hatch, (style.stroke_width / 2.0).max(1.0))
            }
        };
        layers.push((fill_path, fill));
    }
    layers.push((stroke_outline(&outline, style.stroke_width), style.stroke));
    surface.fill_paths(&layers)
}

enum Interior {
    Polygon(Vec<Point>),
    Ellipse(Point, f64, f64),
}

impl Interior {
    fn polygon(&self) -> Vec<Point> {
        match self {
            Self::Polygon(points) => points.clone(),
            Self::Ellipse(c, rx, ry) => ellipse_polygon(*c, *rx, *ry),
        }
    }

    fn solid_path(&self) -> BezPath {
        match self {
            Self::Polygon(points) => {
                let mut path = BezPath::new();
                for (i, &p) in points.iter().enumerate() {
                    if i == 0 {
                        path.move_to(p);
                    } else {
                        path.line_to(p);
                    }
                }
                path.close_path();
                path
            }
            Self::Ellipse(c, rx, ry) => {
                kurbo::Shape::to_path(&kurbo::Ellipse::new(*c, (*rx, *ry), 0.0), 0.1)
            }
        }
    }
}

const NOTICE_INK: Rgba8 = Rgba8::rgb(0xe0, 0x31, 0x31);
const NOTICE_FILL: Rgba8 = Rgba8::rgb(0xff, 0xe3, 0xe3);

fn draw_notice(surface: &mut Surface, message: &str) -> ReelResult<()> {
    let canvas = surface.canvas();
    let (w, h) = (f64::from(canvas.width), f64::from(canvas.height));
    let shape = Shape::Rect {
        origin: Point::new(w * 0.15, h * 0.3),
        width: w * 0.7,
        height: h * 0.4,
    };
    let style = Style {
        stroke: NOTICE_INK,
        fill: Some(NOTICE_FILL),
        fill_style: FillStyle::Solid,
        seed: 0x5eed,
        ..Style::default()
    };
    draw_shape(surface, &shape, &style)?;

    let mut detail: String = message.chars().take(80).collect();
    if message.chars().count() > 80 {
        detail.push_str("...");
    }
    let label = format!("This step could not be drawn\n{detail}");
    let size = (h / 24.0).clamp(12.0, 32.0);
    surface.draw_text(&TextBlock::new(
        &label,
        Point::new(w / 2.0, h / 2.0),
        size,
        NOTICE_INK,
    ))
}

fn check_style(style: &Style) -> ReelResult<()> {
    if !style.stroke_width.is_finite() || style.stroke_width <= 0.0 {
        return Err(ReelError::command(format!(
            "stroke_width must be > 0, got {}",
            style.stroke_width
        )));
    }
    if !style.roughness.is_finite() || style.roughness < 0.0 {
        return Err(ReelError::command(format!(
            "roughness must be >= 0, got {}",
            style.roughness
        )));
    }
    Ok(())
}

fn check_points(points: &[Point]) -> ReelResult<()> {
    for p in points {
        check_finite("x", p.x)?;
        check_finite("y", p.y)?;
    }
    Ok(())
}

fn check_finite(name: &str, v: f64) -> ReelResult<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ReelError::command(format!("{name} must be finite, got {v}")))
    }
}

fn check_extent(kind: &str, width: f64, height: f64) -> ReelResult<()> {
    check_finite("width", width)?;
    check_finite("height", height)?;
    if width < 0.0 || height < 0.0 {
        return Err(ReelError::command(format!(
            "{kind} size must be non-negative, got {width}x{height}"
        )));
    }
    Ok(())
}

/// Immutable, shareable, ordered list of captured commands.
///
/// Each capture produces a new list; cloning only bumps a reference count.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandList(Arc<[DrawCommand]>);

impl CommandList {
    /// Number of commands.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list has no commands.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Commands in author order.
    pub fn iter(&self) -> std::slice::Iter<'_, DrawCommand> {
        self.0.iter()
    }

    /// Borrow as a slice.
    pub fn as_slice(&self) -> &[DrawCommand] {
        &self.0
    }

    /// Whether both handles point at the same capture.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Vec<DrawCommand>> for CommandList {
    fn from(commands: Vec<DrawCommand>) -> Self {
        Self(commands.into())
    }
}

impl<'a> IntoIterator for &'a CommandList {
    type Item = &'a DrawCommand;
    type IntoIter = std::slice::Iter<'a, DrawCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/draw/command.rs"]
mod tests;
