//! Display mode value types.
//!
//! A [`DisplayMode`] bundles everything needed to program a framebuffer:
//! resolution, timings, pixel layout and sync/video flags. Modes come either
//! from the mode catalog (see [`catalog`]) or from querying a live device.

pub mod catalog;

use bitflags::bitflags;

use crate::pixel::PixelFormat;

pub use catalog::{parse_modes, ModeCatalog};

/// Visible and virtual resolution plus colour depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub xres: u32,
    pub yres: u32,
    /// Virtual (scrollable) width
    pub xres_virtual: u32,
    /// Virtual (scrollable) height
    pub yres_virtual: u32,
    /// Bits per pixel
    pub depth: u32,
}

impl Geometry {
    /// Virtual area covers the visible area
    pub fn is_consistent(&self) -> bool {
        self.xres_virtual >= self.xres && self.yres_virtual >= self.yres
    }

    /// Bytes needed to hold one pixel
    pub fn bytes_per_pixel(&self) -> u32 {
        (self.depth + 7) / 8
    }
}

/// Video timings, in units only the display hardware interprets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    /// Pixel clock period in picoseconds
    pub pixclock: u32,
    pub left: u32,
    pub right: u32,
    pub upper: u32,
    pub lower: u32,
    /// Horizontal sync pulse length
    pub hsync_len: u32,
    /// Vertical sync pulse length
    pub vsync_len: u32,
}

bitflags! {
    /// Sync polarity flags (FB_SYNC_*)
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct SyncFlags: u32 {
        const HOR_HIGH_ACT = 1;
        const VERT_HIGH_ACT = 2;
        const EXT = 4;
        const COMP_HIGH_ACT = 8;
        const BROADCAST = 16;
        const ON_GREEN = 32;
    }
}

bitflags! {
    /// Video mode flags (FB_VMODE_*)
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct VideoModeFlags: u32 {
        const INTERLACED = 1;
        const DOUBLE = 2;
    }
}

/// A complete, named display configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayMode {
    pub name: String,
    pub geometry: Geometry,
    pub timings: Timings,
    pub format: PixelFormat,
    pub sync: SyncFlags,
    pub vmode: VideoModeFlags,
    /// Hardware acceleration available
    pub accelerated: bool,
    pub grayscale: bool,
    /// Nonstandard pixel format discriminator, 0 for standard formats
    pub nonstandard: u32,
}

impl DisplayMode {
    /// Bytes per line of the virtual area
    pub fn stride(&self) -> usize {
        self.geometry.xres_virtual as usize * self.geometry.bytes_per_pixel() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride() {
        let mut mode = DisplayMode::default();
        mode.geometry = Geometry {
            xres: 640,
            yres: 480,
            xres_virtual: 800,
            yres_virtual: 960,
            depth: 16,
        };
        assert_eq!(mode.stride(), 1600);

        mode.geometry.depth = 15;
        assert_eq!(mode.stride(), 1600);

        mode.geometry.depth = 32;
        assert_eq!(mode.stride(), 3200);
    }

    #[test]
    fn test_geometry_consistency() {
        let g = Geometry {
            xres: 640,
            yres: 480,
            xres_virtual: 640,
            yres_virtual: 960,
            depth: 8,
        };
        assert!(g.is_consistent());

        let g = Geometry { xres_virtual: 320, ..g };
        assert!(!g.is_consistent());
    }
}
