//! Framebuffer device session and kernel plumbing.
//!
//! - **canvas**: the open session; snapshots, maps, draws and restores
//! - **device**: trait seams between the session and the kernel
//! - **sys**: kernel structures and the Linux implementations of the seams
//! - **vt**: VT switch signals and the shared switch state
//!
//! # Architecture
//!
//! ```text
//! Canvas
//! ├── FramebufferDevice (screen info, colour map, pan)
//! │   └── FrameMemory (mapped pixels)
//! └── Console (KD and VT modes)
//!     └── VtListener (SIGUSR1/SIGUSR2 -> SwitchState)
//! ```

pub mod canvas;
pub mod device;
pub mod sys;
pub mod vt;

#[cfg(test)]
pub(crate) mod testing;
