//! Pixel formats and typed views over framebuffer memory.
//!
//! - **format**: channel layout description and format dispatch
//! - **view**: per-format pixel accessors over a borrowed byte slice

pub mod format;
pub mod view;

pub use format::{Channel, PixelFormat, PixelFormatKind};
pub use view::{PixelBuffer, PixelEncoding, PixelView};

/// Non-premultiplied colour with 8 bits per channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}
