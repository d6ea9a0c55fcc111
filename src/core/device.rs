//! Device seams
//!
//! The canvas only talks to the kernel through these traits. `sys` provides
//! the Linux implementations; tests substitute a simulated device.

use std::io;
use std::os::unix::io::RawFd;
use std::path::Path;

use super::sys::{ColorTables, FixScreenInfo, VarScreenInfo, VtMode, VtStat};

/// How a device node is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    WriteOnly,
}

/// Opens framebuffer device nodes
pub trait Backend {
    fn open_device(&self, path: &Path, access: Access) -> io::Result<Box<dyn FramebufferDevice>>;
}

/// Control calls on an open framebuffer device. Dropping the value closes it.
pub trait FramebufferDevice: Send {
    fn fixed_info(&self) -> io::Result<FixScreenInfo>;
    fn var_info(&self) -> io::Result<VarScreenInfo>;
    fn put_var_info(&self, info: &VarScreenInfo) -> io::Result<()>;
    fn pan_display(&self, info: &VarScreenInfo) -> io::Result<()>;

    /// Read colour map entries starting at `start`. Returns the entry count.
    fn color_map(&self, start: u32, tables: &mut ColorTables) -> io::Result<usize>;
    fn put_color_map(&self, start: u32, len: usize, tables: &ColorTables) -> io::Result<()>;

    /// Framebuffer index assigned to a console
    fn console_to_framebuffer(&self, console: u32) -> io::Result<u32>;

    /// Map `len` bytes of device memory, shared and writable
    fn map(&self, len: usize) -> io::Result<Box<dyn FrameMemory>>;

    /// Underlying descriptor, for custom control calls
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

/// Mapped device memory. Dropping the value unmaps it.
pub trait FrameMemory: Send {
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];
}

/// Virtual terminal and keyboard control calls
pub trait Console: Send {
    fn vt_state(&self) -> io::Result<VtStat>;
    fn vt_mode(&self) -> io::Result<VtMode>;
    fn set_vt_mode(&self, mode: &VtMode) -> io::Result<()>;
    fn activate(&self, vt: u16) -> io::Result<()>;
    fn wait_active(&self, vt: u16) -> io::Result<()>;
    /// VT_RELDISP with `arg`: 1 releases the display, VT_ACKACQ acknowledges
    /// acquisition
    fn release_display(&self, arg: i32) -> io::Result<()>;
    fn kd_mode(&self) -> io::Result<i32>;
    fn set_kd_mode(&self, mode: i32) -> io::Result<()>;
}
