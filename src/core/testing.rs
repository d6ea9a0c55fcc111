//! Simulated framebuffer and console for tests

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::device::{Access, Backend, Console, FrameMemory, FramebufferDevice};
use super::sys::{
    ColorTables, FbBitfield, FixScreenInfo, VarScreenInfo, VtMode, VtStat, CMAP_SIZE,
    FB_TYPE_PACKED_PIXELS, KD_TEXT, VT_AUTO,
};

static SIGNALS: Mutex<()> = Mutex::new(());

/// Held by tests that raise VT signals or assert on switch state. The
/// signals reach every listener in the process.
pub fn signal_lock() -> MutexGuard<'static, ()> {
    SIGNALS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bitfield(offset: u32, length: u32) -> FbBitfield {
    FbBitfield {
        offset,
        length,
        msb_right: 0,
    }
}

#[derive(Debug)]
pub struct SimState {
    pub fix: FixScreenInfo,
    pub var: VarScreenInfo,
    pub cmap: ColorTables,
    /// Framebuffer index reported for any console
    pub con2fb: u32,
    pub fail_map: bool,
    pub fail_put_var: bool,
    pub fail_cmap: bool,
    pub opened: Vec<(PathBuf, Access)>,
    pub open_handles: usize,
    pub live_mappings: usize,
    pub mapped_len: Option<usize>,
    pub pans: usize,
    pub var_puts: Vec<VarScreenInfo>,
    pub cmap_puts: usize,
}

impl SimState {
    /// 640x480 RGBA32 device, line length without padding
    pub fn rgba32() -> Self {
        let mut fix = FixScreenInfo::default();
        fix.type_ = FB_TYPE_PACKED_PIXELS;
        fix.line_length = 640 * 4;
        fix.smem_len = 640 * 480 * 4;

        let var = VarScreenInfo {
            xres: 640,
            yres: 480,
            xres_virtual: 640,
            yres_virtual: 480,
            bits_per_pixel: 32,
            red: bitfield(0, 8),
            green: bitfield(8, 8),
            blue: bitfield(16, 8),
            transp: bitfield(24, 8),
            ..VarScreenInfo::default()
        };

        Self {
            fix,
            var,
            cmap: ColorTables::default(),
            con2fb: 0,
            fail_map: false,
            fail_put_var: false,
            fail_cmap: false,
            opened: Vec::new(),
            open_handles: 0,
            live_mappings: 0,
            mapped_len: None,
            pans: 0,
            var_puts: Vec::new(),
            cmap_puts: 0,
        }
    }
}

#[derive(Clone)]
pub struct SimBackend(pub Arc<Mutex<SimState>>);

impl SimBackend {
    pub fn new(state: SimState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap()
    }
}

impl Backend for SimBackend {
    fn open_device(&self, path: &Path, access: Access) -> io::Result<Box<dyn FramebufferDevice>> {
        let mut state = self.state();
        state.opened.push((path.to_path_buf(), access));
        state.open_handles += 1;
        Ok(Box::new(SimDevice(self.0.clone())))
    }
}

pub struct SimDevice(Arc<Mutex<SimState>>);

impl SimDevice {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.0.lock().unwrap()
    }
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.state().open_handles -= 1;
    }
}

fn denied() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

impl FramebufferDevice for SimDevice {
    fn fixed_info(&self) -> io::Result<FixScreenInfo> {
        Ok(self.state().fix)
    }

    fn var_info(&self) -> io::Result<VarScreenInfo> {
        Ok(self.state().var)
    }

    fn put_var_info(&self, info: &VarScreenInfo) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_put_var {
            return Err(denied());
        }
        state.var = *info;
        state.var_puts.push(*info);
        Ok(())
    }

    fn pan_display(&self, info: &VarScreenInfo) -> io::Result<()> {
        let mut state = self.state();
        state.var.xoffset = info.xoffset;
        state.var.yoffset = info.yoffset;
        state.pans += 1;
        Ok(())
    }

    fn color_map(&self, start: u32, tables: &mut ColorTables) -> io::Result<usize> {
        let state = self.state();
        if state.fail_cmap {
            return Err(denied());
        }
        *tables = state.cmap;
        Ok(CMAP_SIZE - start as usize)
    }

    fn put_color_map(&self, start: u32, len: usize, tables: &ColorTables) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_cmap {
            return Err(denied());
        }
        let range = start as usize..start as usize + len;
        state.cmap.red[range.clone()].copy_from_slice(&tables.red[range.clone()]);
        state.cmap.green[range.clone()].copy_from_slice(&tables.green[range.clone()]);
        state.cmap.blue[range.clone()].copy_from_slice(&tables.blue[range.clone()]);
        state.cmap.transp[range.clone()].copy_from_slice(&tables.transp[range]);
        state.cmap_puts += 1;
        Ok(())
    }

    fn console_to_framebuffer(&self, _console: u32) -> io::Result<u32> {
        Ok(self.state().con2fb)
    }

    fn map(&self, len: usize) -> io::Result<Box<dyn FrameMemory>> {
        let mut state = self.state();
        if state.fail_map {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        state.live_mappings += 1;
        state.mapped_len = Some(len);
        Ok(Box::new(SimMemory {
            bytes: vec![0xAA; len],
            state: self.0.clone(),
        }))
    }
}

struct SimMemory {
    bytes: Vec<u8>,
    state: Arc<Mutex<SimState>>,
}

impl FrameMemory for SimMemory {
    fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for SimMemory {
    fn drop(&mut self) {
        self.state.lock().unwrap().live_mappings -= 1;
    }
}

#[derive(Debug)]
pub struct ConsoleState {
    pub active: u16,
    pub kd_mode: i32,
    pub vt_mode: VtMode,
    pub fail_kd_set: bool,
    pub calls: Vec<String>,
}

#[derive(Clone)]
pub struct SimConsole(pub Arc<Mutex<ConsoleState>>);

impl SimConsole {
    pub fn new(active: u16) -> Self {
        Self(Arc::new(Mutex::new(ConsoleState {
            active,
            kd_mode: KD_TEXT,
            vt_mode: VtMode {
                mode: VT_AUTO,
                ..VtMode::default()
            },
            fail_kd_set: false,
            calls: Vec::new(),
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.0.lock().unwrap()
    }

    fn record(&self, call: String) -> MutexGuard<'_, ConsoleState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

impl Console for SimConsole {
    fn vt_state(&self) -> io::Result<VtStat> {
        let state = self.record("vt_state".to_string());
        Ok(VtStat {
            v_active: state.active,
            ..VtStat::default()
        })
    }

    fn vt_mode(&self) -> io::Result<VtMode> {
        Ok(self.record("vt_mode".to_string()).vt_mode)
    }

    fn set_vt_mode(&self, mode: &VtMode) -> io::Result<()> {
        self.record(format!("set_vt_mode {}", mode.mode)).vt_mode = *mode;
        Ok(())
    }

    fn activate(&self, vt: u16) -> io::Result<()> {
        self.record(format!("activate {}", vt)).active = vt;
        Ok(())
    }

    fn wait_active(&self, vt: u16) -> io::Result<()> {
        self.record(format!("wait_active {}", vt));
        Ok(())
    }

    fn release_display(&self, arg: i32) -> io::Result<()> {
        self.record(format!("release_display {}", arg));
        Ok(())
    }

    fn kd_mode(&self) -> io::Result<i32> {
        Ok(self.record("kd_mode".to_string()).kd_mode)
    }

    fn set_kd_mode(&self, mode: i32) -> io::Result<()> {
        let mut state = self.record(format!("set_kd_mode {}", mode));
        if state.fail_kd_set {
            return Err(denied());
        }
        state.kd_mode = mode;
        Ok(())
    }
}
