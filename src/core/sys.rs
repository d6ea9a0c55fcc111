//! Linux fbdev and VT bindings
//!
//! Kernel ABI structures (linux/fb.h, linux/vt.h, linux/kd.h) and the
//! `ioctl`/`mmap` backed implementations of the device traits.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::Path;
use std::ptr;

use super::device::{Access, Backend, Console, FrameMemory, FramebufferDevice};

// Framebuffer requests (linux/fb.h)
const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOPUT_VSCREENINFO: libc::c_ulong = 0x4601;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;
const FBIOGETCMAP: libc::c_ulong = 0x4604;
const FBIOPUTCMAP: libc::c_ulong = 0x4605;
const FBIOPAN_DISPLAY: libc::c_ulong = 0x4606;
const FBIOGET_CON2FBMAP: libc::c_ulong = 0x460F;

// VT requests (linux/vt.h)
const VT_GETMODE: libc::c_ulong = 0x5601;
const VT_SETMODE: libc::c_ulong = 0x5602;
const VT_GETSTATE: libc::c_ulong = 0x5603;
const VT_RELDISP: libc::c_ulong = 0x5605;
const VT_ACTIVATE: libc::c_ulong = 0x5606;
const VT_WAITACTIVE: libc::c_ulong = 0x5607;

// Keyboard/display requests (linux/kd.h)
const KDSETMODE: libc::c_ulong = 0x4B3A;
const KDGETMODE: libc::c_ulong = 0x4B3B;

pub const FB_TYPE_PACKED_PIXELS: u32 = 0;
pub const FB_VISUAL_DIRECTCOLOR: u32 = 4;
pub const FB_ACCEL_NONE: u32 = 0;

pub const KD_TEXT: i32 = 0x00;
pub const KD_GRAPHICS: i32 = 0x01;

pub const VT_AUTO: libc::c_char = 0;
pub const VT_PROCESS: libc::c_char = 1;
pub const VT_ACKACQ: i32 = 2;

/// Number of entries in a full colour map
pub const CMAP_SIZE: usize = 256;

/// fb_bitfield
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FbBitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

/// fb_fix_screeninfo
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixScreenInfo {
    pub id: [u8; 16],
    pub smem_start: libc::c_ulong,
    pub smem_len: u32,
    pub type_: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: libc::c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

/// fb_var_screeninfo
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: FbBitfield,
    pub green: FbBitfield,
    pub blue: FbBitfield,
    pub transp: FbBitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

/// fb_cmap
#[repr(C)]
struct FbCmap {
    start: u32,
    len: u32,
    red: *mut u16,
    green: *mut u16,
    blue: *mut u16,
    transp: *mut u16,
}

/// fb_con2fbmap
#[repr(C)]
#[derive(Default)]
struct FbCon2FbMap {
    console: u32,
    framebuffer: u32,
}

/// vt_mode
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VtMode {
    pub mode: libc::c_char,
    pub waitv: libc::c_char,
    pub relsig: libc::c_short,
    pub acqsig: libc::c_short,
    pub frsig: libc::c_short,
}

/// vt_stat
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VtStat {
    pub v_active: libc::c_ushort,
    pub v_signal: libc::c_ushort,
    pub v_state: libc::c_ushort,
}

/// Colour map channel tables, 16 bits per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorTables {
    pub red: [u16; CMAP_SIZE],
    pub green: [u16; CMAP_SIZE],
    pub blue: [u16; CMAP_SIZE],
    pub transp: [u16; CMAP_SIZE],
}

impl Default for ColorTables {
    fn default() -> Self {
        Self {
            red: [0; CMAP_SIZE],
            green: [0; CMAP_SIZE],
            blue: [0; CMAP_SIZE],
            transp: [0; CMAP_SIZE],
        }
    }
}

fn check(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// ioctl passing a pointer to `arg`
fn ioctl_ptr<T>(fd: RawFd, request: libc::c_ulong, arg: *mut T) -> io::Result<()> {
    // SAFETY: every caller passes a request whose argument type is T
    check(unsafe { libc::ioctl(fd, request as _, arg) })
}

/// ioctl passing an integer argument by value
fn ioctl_value(fd: RawFd, request: libc::c_ulong, arg: libc::c_ulong) -> io::Result<()> {
    // SAFETY: the request takes its argument by value
    check(unsafe { libc::ioctl(fd, request as _, arg) })
}

/// Opens device nodes from the filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxBackend;

impl Backend for LinuxBackend {
    fn open_device(&self, path: &Path, access: Access) -> io::Result<Box<dyn FramebufferDevice>> {
        let file = OpenOptions::new()
            .read(access == Access::ReadWrite)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;
        Ok(Box::new(LinuxFramebuffer { file }))
    }
}

/// An open /dev/fbN node
pub struct LinuxFramebuffer {
    file: File,
}

impl LinuxFramebuffer {
    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl FramebufferDevice for LinuxFramebuffer {
    fn fixed_info(&self) -> io::Result<FixScreenInfo> {
        let mut info = FixScreenInfo::default();
        ioctl_ptr(self.fd(), FBIOGET_FSCREENINFO, &mut info)?;
        Ok(info)
    }

    fn var_info(&self) -> io::Result<VarScreenInfo> {
        let mut info = VarScreenInfo::default();
        ioctl_ptr(self.fd(), FBIOGET_VSCREENINFO, &mut info)?;
        Ok(info)
    }

    fn put_var_info(&self, info: &VarScreenInfo) -> io::Result<()> {
        // The kernel writes back the values it settled on
        let mut info = *info;
        ioctl_ptr(self.fd(), FBIOPUT_VSCREENINFO, &mut info)
    }

    fn pan_display(&self, info: &VarScreenInfo) -> io::Result<()> {
        let mut info = *info;
        ioctl_ptr(self.fd(), FBIOPAN_DISPLAY, &mut info)
    }

    fn color_map(&self, start: u32, tables: &mut ColorTables) -> io::Result<usize> {
        let start = start.min(CMAP_SIZE as u32);
        let offset = start as usize;
        let mut cmap = FbCmap {
            start,
            len: CMAP_SIZE as u32 - start,
            red: tables.red[offset..].as_mut_ptr(),
            green: tables.green[offset..].as_mut_ptr(),
            blue: tables.blue[offset..].as_mut_ptr(),
            transp: tables.transp[offset..].as_mut_ptr(),
        };
        ioctl_ptr(self.fd(), FBIOGETCMAP, &mut cmap)?;
        Ok(cmap.len as usize)
    }

    fn put_color_map(&self, start: u32, len: usize, tables: &ColorTables) -> io::Result<()> {
        let offset = (start as usize).min(CMAP_SIZE);
        let len = len.min(CMAP_SIZE - offset);
        // FBIOPUTCMAP only reads through these pointers
        let mut cmap = FbCmap {
            start,
            len: len as u32,
            red: tables.red[offset..].as_ptr() as *mut u16,
            green: tables.green[offset..].as_ptr() as *mut u16,
            blue: tables.blue[offset..].as_ptr() as *mut u16,
            transp: tables.transp[offset..].as_ptr() as *mut u16,
        };
        ioctl_ptr(self.fd(), FBIOPUTCMAP, &mut cmap)
    }

    fn console_to_framebuffer(&self, console: u32) -> io::Result<u32> {
        let mut map = FbCon2FbMap {
            console,
            ..FbCon2FbMap::default()
        };
        ioctl_ptr(self.fd(), FBIOGET_CON2FBMAP, &mut map)?;
        Ok(map.framebuffer)
    }

    fn map(&self, len: usize) -> io::Result<Box<dyn FrameMemory>> {
        // SAFETY: fresh shared mapping of our own descriptor; the pointer is
        // only used through Mmap, which unmaps it exactly once on drop
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Box::new(Mmap {
            ptr: addr.cast(),
            len,
        }))
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.fd())
    }
}

/// A shared memory mapping of device memory
struct Mmap {
    ptr: *mut u8,
    len: usize,
}

// Safety: the mapping is owned exclusively by this value
unsafe impl Send for Mmap {}

impl FrameMemory for Mmap {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live mapping owned by self
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees exclusive access
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.cast(), self.len);
        }
    }
}

/// A virtual terminal. Holds its own descriptor, so dropping a `Tty` built
/// from stdin leaves stdin open.
pub struct Tty {
    file: File,
}

impl Tty {
    /// Open a terminal device such as /dev/tty1
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;
        Ok(Self { file })
    }

    /// Duplicate an existing terminal descriptor
    pub fn from_fd(fd: BorrowedFd<'_>) -> io::Result<Self> {
        Ok(Self {
            file: File::from(fd.try_clone_to_owned()?),
        })
    }

    /// The terminal on standard input
    pub fn stdin() -> io::Result<Self> {
        Self::from_fd(io::stdin().as_fd())
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

impl Console for Tty {
    fn vt_state(&self) -> io::Result<VtStat> {
        let mut stat = VtStat::default();
        ioctl_ptr(self.fd(), VT_GETSTATE, &mut stat)?;
        Ok(stat)
    }

    fn vt_mode(&self) -> io::Result<VtMode> {
        let mut mode = VtMode::default();
        ioctl_ptr(self.fd(), VT_GETMODE, &mut mode)?;
        Ok(mode)
    }

    fn set_vt_mode(&self, mode: &VtMode) -> io::Result<()> {
        let mut mode = *mode;
        ioctl_ptr(self.fd(), VT_SETMODE, &mut mode)
    }

    fn activate(&self, vt: u16) -> io::Result<()> {
        ioctl_value(self.fd(), VT_ACTIVATE, libc::c_ulong::from(vt))
    }

    fn wait_active(&self, vt: u16) -> io::Result<()> {
        ioctl_value(self.fd(), VT_WAITACTIVE, libc::c_ulong::from(vt))
    }

    fn release_display(&self, arg: i32) -> io::Result<()> {
        ioctl_value(self.fd(), VT_RELDISP, arg as libc::c_ulong)
    }

    fn kd_mode(&self) -> io::Result<i32> {
        let mut mode: libc::c_int = KD_TEXT;
        ioctl_ptr(self.fd(), KDGETMODE, &mut mode)?;
        Ok(mode)
    }

    fn set_kd_mode(&self, mode: i32) -> io::Result<()> {
        ioctl_value(self.fd(), KDSETMODE, mode as libc::c_ulong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_abi_sizes() {
        assert_eq!(size_of::<FbBitfield>(), 12);
        assert_eq!(size_of::<VarScreenInfo>(), 160);
        assert_eq!(size_of::<VtMode>(), 8);
        assert_eq!(size_of::<VtStat>(), 6);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(size_of::<FixScreenInfo>(), 80);
        #[cfg(target_pointer_width = "32")]
        assert_eq!(size_of::<FixScreenInfo>(), 68);
    }

    #[test]
    fn test_open_missing_device() {
        let err = LinuxBackend
            .open_device(Path::new("/nonexistent/fb0"), Access::ReadWrite)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
