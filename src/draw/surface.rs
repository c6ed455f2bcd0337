use std::path::Path;

use anyhow::Context as _;

use crate::draw::text::{TextBlock, TextRenderer};
use crate::foundation::core::{BezPath, Canvas, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::{Fnv1a64, mul_div255_u16};

/// A rendered frame as RGBA8 pixels.
///
/// Frames read back from a [`Surface`] are premultiplied; the flag makes this explicit at sink
/// boundaries.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether `data` is premultiplied alpha.
    pub premultiplied: bool,
}

/// The raster canvas every draw command lands on.
///
/// The surface is always fully opaque: it is created and cleared to an opaque background because
/// downstream video encoders treat transparency as undefined.
pub struct Surface {
    canvas: Canvas,
    width: u16,
    height: u16,
    background: Rgba8,
    pixmap: vello_cpu::Pixmap,
    text: TextRenderer,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("canvas", &self.canvas)
            .field("background", &self.background)
            .finish()
    }
}

impl Surface {
    /// Create a surface with system fonts for text.
    pub fn new(canvas: Canvas, background: Rgba8) -> ReelResult<Self> {
        Self::with_text(canvas, background, TextRenderer::default())
    }

    /// Create a surface with an explicit text renderer (custom font directories).
    pub fn with_text(canvas: Canvas, background: Rgba8, text: TextRenderer) -> ReelResult<Self> {
        canvas.validate()?;
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| ReelError::validation("surface width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| ReelError::validation("surface height exceeds u16"))?;

        if background.a != 255 {
            tracing::debug!(?background, "forcing surface background to opaque");
        }
        let mut surface = Self {
            canvas,
            width,
            height,
            background: Rgba8 {
                a: 255,
                ..background
            },
            pixmap: vello_cpu::Pixmap::new(width, height),
            text,
        };
        surface.clear();
        Ok(surface)
    }

    /// Canvas dimensions.
    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// The opaque background color used by [`Surface::clear`].
    pub fn background(&self) -> Rgba8 {
        self.background
    }

    /// Reset every pixel to the opaque background.
    pub fn clear(&mut self) {
        let rgba = self.background.to_premul();
        for px in self.pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Fill a batch of paths (in order) and composite the result over the surface.
    pub fn fill_paths(&mut self, paths: &[(BezPath, Rgba8)]) -> ReelResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut ctx = vello_cpu::RenderContext::new(self.width, self.height);
        for (path, color) in paths {
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                color.r, color.g, color.b, color.a,
            ));
            ctx.fill_path(&bezpath_to_cpu(path));
        }
        ctx.flush();
        let mut layer = vello_cpu::Pixmap::new(self.width, self.height);
        ctx.render_to_pixmap(&mut layer);
        over_in_place(
            self.pixmap.data_as_u8_slice_mut(),
            layer.data_as_u8_slice(),
        )
    }

    /// Rasterize a block of text and composite it over the surface.
    pub fn draw_text(&mut self, block: &TextBlock<'_>) -> ReelResult<()> {
        let layer = self.text.rasterize(self.canvas, block)?;
        over_in_place(self.pixmap.data_as_u8_slice_mut(), &layer)
    }

    /// Copy the current pixels out.
    pub fn snapshot(&self) -> FrameRGBA {
        FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data: self.pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        }
    }

    /// Content hash of the current pixels.
    pub fn fingerprint(&self) -> u64 {
        let mut h = Fnv1a64::new_default();
        h.write_u64(u64::from(self.canvas.width));
        h.write_u64(u64::from(self.canvas.height));
        h.write_bytes(self.pixmap.data_as_u8_slice());
        h.finish()
    }

    /// Write the current pixels as a PNG.
    pub fn save_png(&self, path: &Path) -> ReelResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        // The surface is opaque, so premultiplied bytes equal straight bytes.
        image::save_buffer_with_format(
            path,
            self.pixmap.data_as_u8_slice(),
            self.canvas.width,
            self.canvas.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

/// Premultiplied source-over of `src` onto `dst`, both tightly packed RGBA8.
pub(crate) fn over_in_place(dst: &mut [u8], src: &[u8]) -> ReelResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelError::command(
            "over_in_place expects equal-length rgba8 buffers",
        ));
    }
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let sa = u16::from(s[3]);
        if sa == 0 {
            continue;
        }
        if sa == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255u16 - sa;
        for i in 0..4 {
            let v = u16::from(s[i]) + mul_div255_u16(u16::from(d[i]), inv);
            d[i] = v.min(255) as u8;
        }
    }
    Ok(())
}

fn point_to_cpu(p: kurbo::Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Surface {
        Surface::new(
            Canvas {
                width: 32,
                height: 24,
            },
            Rgba8::WHITE,
        )
        .unwrap()
    }

    #[test]
    fn new_surface_is_opaque_background() {
        let s = Surface::new(
            Canvas {
                width: 8,
                height: 8,
            },
            Rgba8 {
                r: 10,
                g: 20,
                b: 30,
                a: 0,
            },
        )
        .unwrap();
        let frame = s.snapshot();
        assert!(frame.data.chunks_exact(4).all(|px| px == [10, 20, 30, 255]));
    }

    #[test]
    fn fill_paths_changes_pixels_and_clear_restores() {
        let mut s = small();
        let blank = s.fingerprint();
        let rect = kurbo::Rect::new(4.0, 4.0, 20.0, 20.0);
        s.fill_paths(&[(kurbo::Shape::to_path(&rect, 0.1), Rgba8::INK)])
            .unwrap();
        assert_ne!(s.fingerprint(), blank);
        s.clear();
        assert_eq!(s.fingerprint(), blank);
    }

    #[test]
    fn over_blends_premultiplied() {
        let mut dst = vec![255u8, 255, 255, 255];
        over_in_place(&mut dst, &[0, 0, 0, 128]).unwrap();
        assert_eq!(dst, vec![127, 127, 127, 255]);
        assert!(over_in_place(&mut dst, &[0, 0, 0]).is_err());
    }
}
