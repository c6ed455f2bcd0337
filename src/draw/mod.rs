//! Hand-drawn primitives and the raster surface they land on.

pub(crate) mod command;
pub(crate) mod rough;
pub(crate) mod surface;
pub(crate) mod text;

pub use command::{CommandList, DrawCommand, FillStyle, Shape, Style};
pub use surface::{FrameRGBA, Surface};
pub use text::{TextBlock, TextRenderer, split_lines};
