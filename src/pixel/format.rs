//! Pixel format description and dispatch

use crate::error::{FbError, Result};

/// One colour channel's position inside a pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Channel {
    /// Width in bits
    pub length: u32,
    /// Offset of the least significant bit
    pub offset: u32,
}

impl Channel {
    pub const fn new(length: u32, offset: u32) -> Self {
        Self { length, offset }
    }

    fn is(&self, length: u32, offset: u32) -> bool {
        self.length == length && self.offset == offset
    }
}

/// Bit layout of a pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    /// Bits per pixel
    pub depth: u32,
    pub red: Channel,
    pub green: Channel,
    pub blue: Channel,
    pub alpha: Channel,
}

/// Pixel layouts with a typed view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormatKind {
    /// 32 bit, red in the lowest byte
    Rgba32,
    /// 32 bit, blue in the lowest byte
    Bgra32,
    /// 16 bit 5-6-5, red in the high bits
    Rgb565,
    /// 16 bit 5-6-5, blue in the high bits
    Bgr565,
    /// 15/16 bit 5-5-5, red in the high bits
    Rgb555,
    /// 15/16 bit 5-5-5, blue in the high bits
    Bgr555,
    /// 8 bit palette index
    Indexed8,
}

impl PixelFormatKind {
    /// Bytes occupied by one pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba32 | Self::Bgra32 => 4,
            Self::Rgb565 | Self::Bgr565 | Self::Rgb555 | Self::Bgr555 => 2,
            Self::Indexed8 => 1,
        }
    }
}

impl PixelFormat {
    /// Select the view type for this layout. Layouts without an exact match
    /// are rejected.
    pub fn kind(&self) -> Result<PixelFormatKind> {
        let (r, g, b) = (self.red, self.green, self.blue);

        let kind = match self.depth {
            8 => PixelFormatKind::Indexed8,
            32 if r.is(8, 0) && g.is(8, 8) && b.is(8, 16) => PixelFormatKind::Rgba32,
            32 if r.is(8, 16) && g.is(8, 8) && b.is(8, 0) => PixelFormatKind::Bgra32,
            16 if r.is(5, 11) && g.is(6, 5) && b.is(5, 0) => PixelFormatKind::Rgb565,
            16 if r.is(5, 0) && g.is(6, 5) && b.is(5, 11) => PixelFormatKind::Bgr565,
            15 | 16 if r.is(5, 10) && g.is(5, 5) && b.is(5, 0) => PixelFormatKind::Rgb555,
            15 | 16 if r.is(5, 0) && g.is(5, 5) && b.is(5, 10) => PixelFormatKind::Bgr555,
            _ => return Err(FbError::UnsupportedPixelFormat(*self)),
        };
        Ok(kind)
    }
}
