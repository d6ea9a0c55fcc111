//! Framebuffer session
//!
//! A [`Canvas`] owns an open framebuffer device and its mapped memory. Opening
//! snapshots the device and terminal state; closing puts it back. If any step
//! of opening fails, everything acquired so far is released before the error
//! is returned.

use std::io;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::device::{Access, Backend, Console, FrameMemory, FramebufferDevice};
use super::sys::{
    ColorTables, FbBitfield, FixScreenInfo, LinuxBackend, VarScreenInfo, VtMode, CMAP_SIZE,
    FB_ACCEL_NONE, FB_TYPE_PACKED_PIXELS, FB_VISUAL_DIRECTCOLOR, KD_GRAPHICS, VT_ACKACQ,
    VT_PROCESS,
};
use super::vt::{SwitchCell, SwitchState, VtListener, ACQUIRE_SIGNAL, RELEASE_SIGNAL};
use crate::config::Config;
use crate::error::{FbError, Result};
use crate::mode::{DisplayMode, Geometry, ModeCatalog, SyncFlags, Timings, VideoModeFlags};
use crate::pixel::{Channel, Color, PixelFormat, PixelView};

fn query_failed(what: &'static str) -> impl FnOnce(io::Error) -> FbError {
    move |source| FbError::DeviceQueryFailed { what, source }
}

fn terminal_failed(what: &'static str) -> impl FnOnce(io::Error) -> FbError {
    move |source| FbError::TerminalModeFailed { what, source }
}

/// Bytes to map: the device's own figure, else derived from the geometry
fn memory_len(fix: &FixScreenInfo, var: &VarScreenInfo) -> usize {
    if fix.smem_len != 0 {
        fix.smem_len as usize
    } else if fix.line_length != 0 {
        fix.line_length as usize * var.yres_virtual as usize
    } else {
        var.xres_virtual as usize * var.yres_virtual as usize * var.bits_per_pixel as usize / 8
    }
}

fn to_bitfield(channel: Channel) -> FbBitfield {
    FbBitfield {
        offset: channel.offset,
        length: channel.length,
        msb_right: 1,
    }
}

fn to_channel(field: FbBitfield) -> Channel {
    Channel::new(field.length, field.offset)
}

/// 8 bit channel to the colour map's 16 bit range
fn widen(v: u8) -> u16 {
    u16::from(v) << 8 | u16::from(v)
}

/// Log a failed teardown stage and remember it as the close result
fn note_failure(result: &mut Result<()>, stage: &'static str, outcome: io::Result<()>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(source) => {
            warn!("Failed to restore {}: {}", stage, source);
            *result = Err(FbError::RestoreFailed { stage, source });
            false
        }
    }
}

/// An open framebuffer
///
/// Not safe for concurrent use; drawing must not overlap `close`.
pub struct Canvas {
    // Pre-open state, restored on close
    orig_var: Option<VarScreenInfo>,
    orig_palette: Option<Box<ColorTables>>,
    orig_vt_mode: Option<VtMode>,
    orig_vt: Option<u16>,
    orig_kd: Option<i32>,

    /// Fixed info as of the last query; smem_len holds the mapped length
    fix: FixScreenInfo,
    device: Option<Box<dyn FramebufferDevice>>,
    tty: Option<Box<dyn Console>>,
    mem: Option<Box<dyn FrameMemory>>,
    path: PathBuf,
    modes_file: PathBuf,
    switch: SwitchCell,
    listener: Option<VtListener>,

    // Scratch space
    zero: Vec<u8>,
    scratch: Box<ColorTables>,
}

impl Canvas {
    fn new(tty: Option<Box<dyn Console>>, config: &Config) -> Self {
        Self {
            orig_var: None,
            orig_palette: None,
            orig_vt_mode: None,
            orig_vt: None,
            orig_kd: None,
            fix: FixScreenInfo::default(),
            device: None,
            tty,
            mem: None,
            path: PathBuf::new(),
            modes_file: config.modes_file.clone(),
            switch: SwitchCell::default(),
            listener: None,
            zero: Vec::new(),
            scratch: Box::default(),
        }
    }

    /// Open the framebuffer, optionally switching to `mode`.
    ///
    /// With `mode` set to `None` the device keeps its current configuration.
    /// Drivers may ignore requested values; check [`Canvas::current_mode`]
    /// for what was actually applied. When `tty` is given the terminal is put
    /// into graphics mode for the lifetime of the canvas.
    pub fn open(mode: Option<&DisplayMode>, tty: Option<Box<dyn Console>>, config: &Config) -> Result<Self> {
        Self::open_with(&LinuxBackend, mode, tty, config)
    }

    /// Like [`Canvas::open`], opening devices through `backend`
    pub fn open_with(
        backend: &dyn Backend,
        mode: Option<&DisplayMode>,
        tty: Option<Box<dyn Console>>,
        config: &Config,
    ) -> Result<Self> {
        let mut canvas = Self::new(tty, config);

        match canvas.init(backend, mode, config) {
            Ok(()) => Ok(canvas),
            Err(e) => {
                warn!("Canvas open failed: {}", e);
                if let Err(close_err) = canvas.close() {
                    debug!("Rollback after failed open: {}", close_err);
                }
                Err(e)
            }
        }
    }

    fn init(&mut self, backend: &dyn Backend, mode: Option<&DisplayMode>, config: &Config) -> Result<()> {
        self.path = self.resolve_device(backend, config)?;
        info!("Opening framebuffer {}", self.path.display());

        let device = backend
            .open_device(&self.path, Access::ReadWrite)
            .map_err(|source| FbError::DeviceOpenFailed {
                path: self.path.clone(),
                source,
            })?;
        let dev = &**self.device.insert(device);

        self.fix = dev.fixed_info().map_err(query_failed("fixed screen info"))?;
        let var = dev.var_info().map_err(query_failed("variable screen info"))?;
        self.orig_var = Some(var);

        if var.bits_per_pixel == 8 || self.fix.visual == FB_VISUAL_DIRECTCOLOR {
            let mut tables = Box::<ColorTables>::default();
            dev.color_map(0, &mut tables).map_err(query_failed("colour map"))?;
            self.orig_palette = Some(tables);
        }

        if let Some(tty) = self.tty.as_deref() {
            self.orig_kd = Some(tty.kd_mode().map_err(query_failed("keyboard mode"))?);
            self.orig_vt_mode = Some(tty.vt_mode().map_err(query_failed("VT mode"))?);
            self.orig_vt = Some(tty.vt_state().map_err(query_failed("VT state"))?.v_active);
        }

        if let Some(mode) = mode {
            Self::apply_mode(dev, mode)?;
        }

        // Some drivers only report the memory size once a mode is set
        self.fix = dev.fixed_info().map_err(query_failed("fixed screen info"))?;
        if self.fix.type_ != FB_TYPE_PACKED_PIXELS {
            return Err(FbError::UnsupportedLayout(self.fix.type_));
        }

        let var = dev.var_info().map_err(query_failed("variable screen info"))?;
        let len = memory_len(&self.fix, &var);
        self.fix.smem_len = len as u32;
        debug!("Mapping {} bytes of framebuffer memory", len);

        self.mem = Some(dev.map(len).map_err(FbError::MapFailed)?);
        self.zero = vec![0; len];

        if var.xoffset != 0 || var.yoffset != 0 {
            let origin = VarScreenInfo {
                xoffset: 0,
                yoffset: 0,
                ..var
            };
            dev.pan_display(&origin).map_err(FbError::ModeApplyFailed)?;
        }

        if let Some(tty) = self.tty.as_deref() {
            tty.set_kd_mode(KD_GRAPHICS)
                .map_err(terminal_failed("graphics mode"))?;
            Self::activate_current(tty).map_err(terminal_failed("activate VT"))?;
        }

        self.clear();

        if self.tty.is_some() {
            let listener = VtListener::spawn(self.switch.clone())
                .map_err(terminal_failed("VT signal listener"))?;
            self.listener = Some(listener);
        }

        Ok(())
    }

    /// Device override, else the framebuffer bound to the active console
    fn resolve_device(&self, backend: &dyn Backend, config: &Config) -> Result<PathBuf> {
        if let Some(path) = &config.device {
            return Ok(path.clone());
        }

        let tty = self.tty.as_deref().ok_or(FbError::NoDeviceResolved)?;
        let stat = tty.vt_state().map_err(query_failed("VT state"))?;

        let default = &config.paths.default_device;
        let fb = backend
            .open_device(default, Access::WriteOnly)
            .map_err(|source| FbError::DeviceOpenFailed {
                path: default.clone(),
                source,
            })?;
        let index = fb
            .console_to_framebuffer(u32::from(stat.v_active))
            .map_err(query_failed("console framebuffer mapping"))?;

        debug!("Console {} is on framebuffer {}", stat.v_active, index);
        Ok(config.paths.device(index))
    }

    fn activate_current(tty: &dyn Console) -> io::Result<()> {
        let vt = tty.vt_state()?.v_active;
        tty.activate(vt)?;
        tty.wait_active(vt)
    }

    fn apply_mode(dev: &dyn FramebufferDevice, mode: &DisplayMode) -> Result<()> {
        let mut v = dev.var_info().map_err(FbError::ModeApplyFailed)?;

        let g = &mode.geometry;
        v.xres = g.xres;
        v.yres = g.yres;
        v.xres_virtual = g.xres_virtual;
        v.yres_virtual = g.yres_virtual;
        v.bits_per_pixel = g.depth;

        let t = &mode.timings;
        v.pixclock = t.pixclock;
        v.left_margin = t.left;
        v.right_margin = t.right;
        v.upper_margin = t.upper;
        v.lower_margin = t.lower;
        v.hsync_len = t.hsync_len;
        v.vsync_len = t.vsync_len;

        v.sync = mode.sync.bits();
        v.vmode = mode.vmode.bits();

        v.red = to_bitfield(mode.format.red);
        v.green = to_bitfield(mode.format.green);
        v.blue = to_bitfield(mode.format.blue);
        v.transp = to_bitfield(mode.format.alpha);

        v.xoffset = 0;
        v.yoffset = 0;

        dev.put_var_info(&v).map_err(FbError::ModeApplyFailed)?;
        info!(
            "Applied display mode {:?}: {}x{} ({}x{} virtual) at {} bpp",
            mode.name, g.xres, g.yres, g.xres_virtual, g.yres_virtual, g.depth
        );
        Ok(())
    }

    /// Close the framebuffer and restore the original device and terminal
    /// state.
    ///
    /// Every stage is attempted even when an earlier one fails; the last
    /// failure is returned. Calling this again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let mut result = Ok(());

        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }

        // Unmap before the descriptor goes away
        if self.mem.take().is_some() {
            debug!("Unmapped framebuffer memory");
        }
        self.zero = Vec::new();

        if let Some(dev) = self.device.take() {
            let restored = match self.orig_var.take() {
                Some(var) => note_failure(&mut result, "screen info", dev.put_var_info(&var)),
                None => true,
            };

            // Palette entries only mean something in the mode they came from
            if let Some(tables) = self.orig_palette.take() {
                if restored {
                    note_failure(&mut result, "colour map", dev.put_color_map(0, CMAP_SIZE, &tables));
                }
            }

            drop(dev);
            debug!("Closed {}", self.path.display());
        }

        if let Some(tty) = self.tty.take() {
            if let Some(kd) = self.orig_kd.take() {
                note_failure(&mut result, "keyboard mode", tty.set_kd_mode(kd));
            }

            if let Some(vt_mode) = self.orig_vt_mode.take() {
                note_failure(&mut result, "VT mode", tty.set_vt_mode(&vt_mode));
            }

            if let Some(vt) = self.orig_vt.take().filter(|&vt| vt > 0) {
                if note_failure(&mut result, "active VT", tty.activate(vt)) {
                    note_failure(&mut result, "active VT", tty.wait_active(vt));
                }
            }
        }

        result
    }

    fn device(&self) -> Result<&dyn FramebufferDevice> {
        self.device.as_deref().ok_or(FbError::NotOpen)
    }

    /// Path of the device node in use
    pub fn device_path(&self) -> &Path {
        &self.path
    }

    /// Descriptor of the framebuffer device, for custom control calls.
    /// Do not close it.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.device.as_deref().and_then(|dev| dev.raw_fd())
    }

    /// Whether the device reports hardware acceleration
    pub fn accelerated(&self) -> bool {
        self.fix.accel != FB_ACCEL_NONE
    }

    /// The whole mapped pixel memory
    pub fn buffer(&self) -> &[u8] {
        self.mem.as_deref().map(|mem| mem.as_slice()).unwrap_or(&[])
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        match self.mem.as_deref_mut() {
            Some(mem) => mem.as_mut_slice(),
            None => &mut [],
        }
    }

    /// Zero the framebuffer memory
    pub fn clear(&mut self) {
        if let Some(mem) = self.mem.as_deref_mut() {
            mem.as_mut_slice().copy_from_slice(&self.zero);
        }
    }

    /// The display mode the device is currently in
    pub fn current_mode(&self) -> Result<DisplayMode> {
        let v = self
            .device()?
            .var_info()
            .map_err(query_failed("variable screen info"))?;

        Ok(DisplayMode {
            name: String::new(),
            geometry: Geometry {
                xres: v.xres,
                yres: v.yres,
                xres_virtual: v.xres_virtual,
                yres_virtual: v.yres_virtual,
                depth: v.bits_per_pixel,
            },
            timings: Timings {
                pixclock: v.pixclock,
                left: v.left_margin,
                right: v.right_margin,
                upper: v.upper_margin,
                lower: v.lower_margin,
                hsync_len: v.hsync_len,
                vsync_len: v.vsync_len,
            },
            format: PixelFormat {
                depth: v.bits_per_pixel,
                red: to_channel(v.red),
                green: to_channel(v.green),
                blue: to_channel(v.blue),
                alpha: to_channel(v.transp),
            },
            sync: SyncFlags::from_bits_retain(v.sync),
            vmode: VideoModeFlags::from_bits_retain(v.vmode),
            accelerated: self.accelerated(),
            grayscale: v.grayscale != 0,
            nonstandard: v.nonstd,
        })
    }

    /// Typed view over the mapped memory for the current pixel format
    pub fn image(&mut self) -> Result<PixelView<'_>> {
        let mode = self.current_mode()?;
        let kind = mode.format.kind()?;
        let stride = match self.fix.line_length {
            0 => mode.stride(),
            n => n as usize,
        };

        let mem = self.mem.as_deref_mut().ok_or(FbError::NotOpen)?;
        Ok(PixelView::new(
            kind,
            mem.as_mut_slice(),
            stride,
            mode.geometry.xres_virtual,
            mode.geometry.yres_virtual,
        ))
    }

    /// Current colour palette, 8 bits per channel
    pub fn palette(&mut self) -> Result<Vec<Color>> {
        let dev = self.device.as_deref().ok_or(FbError::NotOpen)?;
        let len = dev
            .color_map(0, &mut self.scratch)
            .map_err(FbError::PaletteAccessFailed)?
            .min(CMAP_SIZE);

        let s = &self.scratch;
        Ok((0..len)
            .map(|i| {
                Color::rgba(
                    (s.red[i] >> 8) as u8,
                    (s.green[i] >> 8) as u8,
                    (s.blue[i] >> 8) as u8,
                    (s.transp[i] >> 8) as u8,
                )
            })
            .collect())
    }

    /// Replace the colour palette. Entries past 256 are ignored.
    pub fn set_palette(&mut self, palette: &[Color]) -> Result<()> {
        let dev = self.device.as_deref().ok_or(FbError::NotOpen)?;
        let palette = &palette[..palette.len().min(CMAP_SIZE)];

        for (i, c) in palette.iter().enumerate() {
            self.scratch.red[i] = widen(c.r);
            self.scratch.green[i] = widen(c.g);
            self.scratch.blue[i] = widen(c.b);
            self.scratch.transp[i] = widen(c.a);
        }

        dev.put_color_map(0, palette.len(), &self.scratch)
            .map_err(FbError::PaletteAccessFailed)
    }

    /// Display modes from the configured catalog, read fresh on every call
    pub fn modes(&self) -> Result<ModeCatalog> {
        ModeCatalog::load(&self.modes_file)
    }

    /// Catalog mode named `name`, ignoring case
    pub fn find_mode(&self, name: &str) -> Result<Option<DisplayMode>> {
        Ok(self.modes()?.find(name).cloned())
    }

    /// Ask the kernel to signal us before switching consoles instead of
    /// switching on its own. Without a terminal this does nothing.
    pub fn switch_init(&self) -> Result<()> {
        let Some(tty) = self.tty.as_deref() else {
            return Ok(());
        };

        let mode = VtMode {
            mode: VT_PROCESS,
            waitv: 0,
            relsig: RELEASE_SIGNAL as libc::c_short,
            acqsig: ACQUIRE_SIGNAL as libc::c_short,
            frsig: 0,
        };
        tty.set_vt_mode(&mode)
            .map_err(terminal_failed("process VT mode"))
    }

    /// Pending VT switch request, if any
    pub fn switch_state(&self) -> SwitchState {
        self.switch.load()
    }

    /// Give the display up to the console that requested it
    pub fn switch_release(&self) -> Result<()> {
        self.acknowledge(1, SwitchState::Inactive)
    }

    /// Accept the display back
    pub fn switch_acquire(&self) -> Result<()> {
        self.acknowledge(VT_ACKACQ, SwitchState::Active)
    }

    fn acknowledge(&self, arg: i32, state: SwitchState) -> Result<()> {
        let outcome = match self.tty.as_deref() {
            Some(tty) => tty.release_display(arg),
            None => Ok(()),
        };
        self.switch.store(state);

        outcome.map_err(|source| {
            warn!("VT switch acknowledgement failed: {}", source);
            FbError::TerminalModeFailed {
                what: "VT switch acknowledgement",
                source,
            }
        })
    }
}

impl Drop for Canvas {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Error closing canvas: {}", e);
        }
    }
}
