use crate::foundation::error::{ReelError, ReelResult};
use std::time::Duration;

pub use kurbo::{BezPath, Point, Vec2};

/// Absolute 0-based frame index on the stage clock.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame.
    pub fn frame_duration(self) -> Duration {
        Duration::from_nanos(u64::from(self.den) * 1_000_000_000 / u64::from(self.num))
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * f64::from(self.den) / f64::from(self.num)
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Canvas {
    /// Validate dimensions for the raster surface (`vello_cpu` pixmaps are `u16`-sized).
    pub fn validate(self) -> ReelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ReelError::validation("canvas width/height must be non-zero"));
        }
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(ReelError::validation(format!(
                "canvas {}x{} exceeds the maximum surface size",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Opaque color from RGB components.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Near-black ink used for strokes and text by default.
    pub const INK: Self = Self::rgb(0x1e, 0x1e, 0x1e);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);

    /// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` or one of a few CSS color names.
    pub fn parse(s: &str) -> ReelResult<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex)
                .ok_or_else(|| ReelError::validation(format!("invalid hex color '{s}'")));
        }
        let named = match s.to_ascii_lowercase().as_str() {
            "black" => Self::rgb(0, 0, 0),
            "white" => Self::WHITE,
            "red" => Self::rgb(0xe0, 0x31, 0x31),
            "green" => Self::rgb(0x2f, 0x9e, 0x44),
            "blue" => Self::rgb(0x19, 0x71, 0xc2),
            "yellow" => Self::rgb(0xf0, 0x8c, 0x00),
            "orange" => Self::rgb(0xe8, 0x59, 0x0c),
            "purple" => Self::rgb(0x9c, 0x36, 0xb5),
            "gray" | "grey" => Self::rgb(0x86, 0x8e, 0x96),
            "transparent" | "none" => Self {
                r: 0,
                g: 0,
                b: 0,
                a: 0,
            },
            _ => return Err(ReelError::validation(format!("unknown color '{s}'"))),
        };
        Ok(named)
    }

    /// Premultiplied `[r, g, b, a]` bytes.
    pub fn to_premul(self) -> [u8; 4] {
        let a = u16::from(self.a);
        let premul = |c: u8| -> u8 { (((u16::from(c) * a) + 127) / 255) as u8 };
        [premul(self.r), premul(self.g), premul(self.b), self.a]
    }

    /// `#rrggbbaa` form, used when emitting SVG.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

fn parse_hex(hex: &str) -> Option<Rgba8> {
    let nibble = |c: u8| -> Option<u8> { (c as char).to_digit(16).map(|v| v as u8) };
    let bytes = hex.as_bytes();
    match bytes.len() {
        3 => {
            let r = nibble(bytes[0])?;
            let g = nibble(bytes[1])?;
            let b = nibble(bytes[2])?;
            Some(Rgba8::rgb(r * 17, g * 17, b * 17))
        }
        6 | 8 => {
            let mut out = [255u8; 4];
            for (i, pair) in bytes.chunks_exact(2).enumerate() {
                out[i] = (nibble(pair[0])? << 4) | nibble(pair[1])?;
            }
            Some(Rgba8 {
                r: out[0],
                g: out[1],
                b: out[2],
                a: out[3],
            })
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
