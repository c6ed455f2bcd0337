use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::Context as _;

use crate::foundation::core::{Canvas, Point, Rgba8};
use crate::foundation::error::{ReelError, ReelResult};

/// Font stack used for every label; the first installed family wins.
const FONT_FAMILY: &str = "Virgil, 'Comic Neue', 'Comic Sans MS', 'Segoe Print', cursive, sans-serif";
/// Line advance as a multiple of the font size.
const LINE_HEIGHT: f64 = 1.25;

/// A centered, possibly multi-line label.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlock<'a> {
    /// Lines top to bottom.
    pub lines: Vec<&'a str>,
    /// Horizontal center of every line and vertical center of the block.
    pub anchor: Point,
    /// Font size in pixels.
    pub size: f64,
    /// Fill color.
    pub color: Rgba8,
}

impl<'a> TextBlock<'a> {
    /// Build a block from raw label text, splitting lines with [`split_lines`].
    pub fn new(text: &'a str, anchor: Point, size: f64, color: Rgba8) -> Self {
        Self {
            lines: split_lines(text),
            anchor,
            size,
            color,
        }
    }

    /// Baseline-center y of each line, so that the block is centered on the anchor.
    pub fn line_centers(&self) -> Vec<f64> {
        let n = self.lines.len();
        let advance = self.size * LINE_HEIGHT;
        let first = self.anchor.y - advance * (n.saturating_sub(1) as f64) / 2.0;
        (0..n).map(|i| first + advance * i as f64).collect()
    }
}

/// Split label text on newline characters and on the two-character sequence `\n`.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .flat_map(|part| part.split("\\n"))
        .map(|line| line.trim_end_matches('\r'))
        .collect()
}

/// Rasterizes text through `usvg`/`resvg`, sharing one lazily-built font database.
#[derive(Clone, Default)]
pub struct TextRenderer {
    font_dirs: Arc<Vec<PathBuf>>,
    fontdb: Arc<OnceLock<Arc<usvg::fontdb::Database>>>,
}

impl std::fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextRenderer")
            .field("font_dirs", &self.font_dirs)
            .field("loaded", &self.fontdb.get().is_some())
            .finish()
    }
}

impl TextRenderer {
    /// Renderer using system fonts plus every font file found in `font_dirs`.
    pub fn new(font_dirs: Vec<PathBuf>) -> Self {
        Self {
            font_dirs: Arc::new(font_dirs),
            fontdb: Arc::default(),
        }
    }

    /// Number of font faces available (loads the database on first use).
    pub fn face_count(&self) -> usize {
        self.fontdb().faces().count()
    }

    fn fontdb(&self) -> Arc<usvg::fontdb::Database> {
        self.fontdb
            .get_or_init(|| {
                let mut db = usvg::fontdb::Database::new();
                db.load_system_fonts();
                for dir in self.font_dirs.iter() {
                    load_fonts_from_dir(&mut db, dir);
                }
                tracing::debug!(faces = db.faces().count(), "font database loaded");
                Arc::new(db)
            })
            .clone()
    }

    /// Render `block` into a canvas-sized premultiplied RGBA8 layer.
    pub fn rasterize(&self, canvas: Canvas, block: &TextBlock<'_>) -> ReelResult<Vec<u8>> {
        if !block.size.is_finite() || block.size <= 0.0 {
            return Err(ReelError::command(format!(
                "text size must be > 0, got {}",
                block.size
            )));
        }
        if !block.anchor.x.is_finite() || !block.anchor.y.is_finite() {
            return Err(ReelError::command("text anchor must be finite"));
        }

        let svg = block_to_svg(canvas, block);
        let opts = usvg::Options {
            fontdb: self.fontdb(),
            font_resolver: make_font_resolver(),
            ..Default::default()
        };
        let tree = usvg::Tree::from_data(svg.as_bytes(), &opts).context("parse text svg")?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(canvas.width, canvas.height)
            .ok_or_else(|| ReelError::command("failed to allocate text pixmap"))?;
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::identity(),
            &mut pixmap.as_mut(),
        );
        Ok(pixmap.data().to_vec())
    }
}

fn block_to_svg(canvas: Canvas, block: &TextBlock<'_>) -> String {
    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = canvas.width,
        h = canvas.height
    );
    let opacity = f64::from(block.color.a) / 255.0;
    for (line, y) in block.lines.iter().zip(block.line_centers()) {
        if line.trim().is_empty() {
            continue;
        }
        let _ = write!(
            svg,
            r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" fill="rgb({r},{g},{b})" fill-opacity="{opacity}" text-anchor="middle" dominant-baseline="central">{text}</text>"#,
            x = block.anchor.x,
            family = FONT_FAMILY,
            size = block.size,
            r = block.color.r,
            g = block.color.g,
            b = block.color.b,
            text = escape_xml(line),
        );
    }
    svg.push_str("</svg>");
    svg
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn load_fonts_from_dir(db: &mut usvg::fontdb::Database, dir: &Path) {
    let Ok(rd) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "font directory not readable");
        return;
    };

    for entry in rd.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|s| s.to_str()) else {
            continue;
        };
        let ext = ext.to_ascii_lowercase();
        if ext != "ttf" && ext != "otf" && ext != "ttc" {
            continue;
        }
        if let Err(e) = db.load_font_file(&path) {
            tracing::warn!(path = %path.display(), error = %e, "skipping font file");
        }
    }
}

// Resolves to the first installed face when no requested family exists.
fn make_font_resolver() -> usvg::FontResolver<'static> {
    use usvg::FontResolver;

    FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families = Vec::<usvg::fontdb::Family<'_>>::new();
            for family in font.families() {
                families.push(match family {
                    usvg::FontFamily::Serif => usvg::fontdb::Family::Serif,
                    usvg::FontFamily::SansSerif => usvg::fontdb::Family::SansSerif,
                    usvg::FontFamily::Cursive => usvg::fontdb::Family::Cursive,
                    usvg::FontFamily::Fantasy => usvg::fontdb::Family::Fantasy,
                    usvg::FontFamily::Monospace => usvg::fontdb::Family::Monospace,
                    usvg::FontFamily::Named(s) => usvg::fontdb::Family::Name(s),
                });
            }
            families.push(usvg::fontdb::Family::SansSerif);

            let query = usvg::fontdb::Query {
                families: &families,
                weight: usvg::fontdb::Weight(font.weight()),
                stretch: usvg::fontdb::Stretch::Normal,
                style: usvg::fontdb::Style::Normal,
            };
            fontdb
                .query(&query)
                .or_else(|| fontdb.faces().next().map(|f| f.id))
        }),
        select_fallback: FontResolver::default_fallback_selector(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_lines_handles_real_and_escaped_newlines() {
        assert_eq!(split_lines("Boil\nwater"), vec!["Boil", "water"]);
        assert_eq!(split_lines("Boil\\nwater"), vec!["Boil", "water"]);
        assert_eq!(split_lines("a\\nb\nc"), vec!["a", "b", "c"]);
        assert_eq!(split_lines("single"), vec!["single"]);
    }

    #[test]
    fn block_is_vertically_centered_on_anchor() {
        let block = TextBlock::new("a\nb\nc", Point::new(50.0, 100.0), 20.0, Rgba8::INK);
        let ys = block.line_centers();
        assert_eq!(ys.len(), 3);
        assert!((ys[1] - 100.0).abs() < 1e-9);
        assert!((ys[0] + ys[2] - 200.0).abs() < 1e-9);
    }

    #[test]
    fn svg_escapes_markup() {
        let block = TextBlock::new("a<b & c>", Point::new(10.0, 10.0), 12.0, Rgba8::INK);
        let svg = block_to_svg(
            Canvas {
                width: 20,
                height: 20,
            },
            &block,
        );
        assert!(svg.contains("a&lt;b &amp; c&gt;"));
        assert!(svg.contains(r#"text-anchor="middle""#));
    }

    #[test]
    fn rasterize_rejects_bad_size() {
        let r = TextRenderer::default();
        let block = TextBlock::new("x", Point::new(1.0, 1.0), 0.0, Rgba8::INK);
        assert!(
            r.rasterize(
                Canvas {
                    width: 4,
                    height: 4
                },
                &block
            )
            .is_err()
        );
    }
}
