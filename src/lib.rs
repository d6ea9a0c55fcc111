//! fbcanvas - drawing on the Linux framebuffer from userspace
//!
//! A [`Canvas`] opens a framebuffer device, optionally switches it to a
//! [`DisplayMode`], maps its memory and hands out a typed [`PixelView`] for
//! drawing. Closing the canvas (or dropping it) restores the device and the
//! controlling terminal to how they were found.
//!
//! Display modes can be looked up by name in an `fb.modes` catalog, see
//! [`ModeCatalog`].
//!
//! # Example
//!
//! ```no_run
//! use fbcanvas::{Canvas, Color, Config, Tty};
//!
//! # fn main() -> fbcanvas::Result<()> {
//! let config = Config::load();
//! let tty = Tty::stdin().ok().map(|t| Box::new(t) as Box<dyn fbcanvas::Console>);
//! let mut canvas = Canvas::open(None, tty, &config)?;
//!
//! let mut image = canvas.image()?;
//! image.set_color(10, 10, Color::WHITE);
//!
//! canvas.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod mode;
pub mod pixel;

pub use crate::config::{Config, DevicePaths};
pub use crate::core::canvas::Canvas;
pub use crate::core::device::{Access, Backend, Console, FrameMemory, FramebufferDevice};
pub use crate::core::sys::{LinuxBackend, Tty};
pub use crate::core::vt::SwitchState;
pub use crate::error::{FbError, Result};
pub use crate::mode::{DisplayMode, Geometry, ModeCatalog, SyncFlags, Timings, VideoModeFlags};
pub use crate::pixel::{Channel, Color, PixelFormat, PixelFormatKind, PixelView};
