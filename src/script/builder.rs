use crate::draw::{CommandList, DrawCommand, Shape, Style};
use crate::foundation::core::{Point, Rgba8};
use crate::foundation::math::Fnv1a64;

/// Default font size for `text` when none is given.
pub const DEFAULT_TEXT_SIZE: f64 = 20.0;
/// Default `bend` for `curve`.
pub const DEFAULT_BEND: f64 = 0.25;

/// Records primitive invocations as [`DrawCommand`]s instead of drawing them.
///
/// Each call appends exactly one command, in call order, and fixes that command's jitter seed
/// from the builder seed and its ordinal.
#[derive(Debug, Default)]
pub struct SketchBuilder {
    seed: u64,
    commands: Vec<DrawCommand>,
}

impl SketchBuilder {
    /// Empty builder with seed `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty builder whose command seeds derive from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            commands: Vec::new(),
        }
    }

    /// Number of commands recorded so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn next_seed(&self, kind: &str) -> u64 {
        let mut h = Fnv1a64::new_default();
        h.write_u64(self.seed);
        h.write_u64(self.commands.len() as u64);
        h.write_bytes(kind.as_bytes());
        h.finish()
    }

    fn shape(&mut self, kind: &str, shape: Shape, mut style: Style) -> &mut Self {
        style.seed = self.next_seed(kind);
        self.commands.push(DrawCommand::Shape { shape, style });
        self
    }

    /// Rectangle from its top-left corner.
    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, style: Style) -> &mut Self {
        self.shape(
            "rect",
            Shape::Rect {
                origin: Point::new(x, y),
                width: w,
                height: h,
            },
            style,
        )
    }

    /// Square from its top-left corner.
    pub fn square(&mut self, x: f64, y: f64, size: f64, style: Style) -> &mut Self {
        self.rect(x, y, size, size, style)
    }

    /// Circle from its center and diameter.
    pub fn circle(&mut self, cx: f64, cy: f64, diameter: f64, style: Style) -> &mut Self {
        self.ellipse(cx, cy, diameter, diameter, style)
    }

    /// Ellipse from its center and full extents.
    pub fn ellipse(&mut self, cx: f64, cy: f64, w: f64, h: f64, style: Style) -> &mut Self {
        self.shape(
            "ellipse",
            Shape::Ellipse {
                center: Point::new(cx, cy),
                width: w,
                height: h,
            },
            style,
        )
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, style: Style) -> &mut Self {
        self.shape(
            "line",
            Shape::Line {
                from: Point::new(x1, y1),
                to: Point::new(x2, y2),
            },
            style,
        )
    }

    pub fn polygon(&mut self, points: Vec<Point>, style: Style) -> &mut Self {
        self.shape("polygon", Shape::Polygon(points), style)
    }

    pub fn arrow(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, mut style: Style) -> &mut Self {
        style.seed = self.next_seed("arrow");
        self.commands.push(DrawCommand::Arrow {
            from: Point::new(x1, y1),
            to: Point::new(x2, y2),
            style,
        });
        self
    }

    /// Bowed connector; positive `bend` bows to the left of the travel direction.
    pub fn curve(
        &mut self,
        (x1, y1): (f64, f64),
        (x2, y2): (f64, f64),
        bend: f64,
        mut style: Style,
    ) -> &mut Self {
        style.seed = self.next_seed("curve");
        self.commands.push(DrawCommand::Curve {
            from: Point::new(x1, y1),
            to: Point::new(x2, y2),
            bend,
            style,
        });
        self
    }

    pub fn text(
        &mut self,
        text: impl Into<String>,
        x: f64,
        y: f64,
        size: f64,
        color: Rgba8,
    ) -> &mut Self {
        self.commands.push(DrawCommand::Text {
            text: text.into(),
            at: Point::new(x, y),
            size,
            color,
        });
        self
    }

    /// Freeze the recorded commands.
    pub fn finish(self) -> CommandList {
        CommandList::from(self.commands)
    }
}
