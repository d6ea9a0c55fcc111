//! VT switch coordination
//!
//! With the terminal in `VT_PROCESS` mode the kernel asks before switching
//! consoles: SIGUSR1 requests that we release the display, SIGUSR2 hands it
//! back. A listener thread turns those signals into a [`SwitchState`] that the
//! caller's loop polls and acknowledges through the canvas.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGUSR1, SIGUSR2};
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, warn};

/// Signal the kernel sends when another console wants the display
pub const RELEASE_SIGNAL: i32 = SIGUSR1;
/// Signal the kernel sends when the display is handed back
pub const ACQUIRE_SIGNAL: i32 = SIGUSR2;

/// Display ownership as seen by the session
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    /// We own the display
    Active = 0,
    /// Kernel asked us to let go; not yet acknowledged
    ReleaseRequested = 1,
    /// Kernel is handing the display back; not yet acknowledged
    AcquireRequested = 2,
    /// Released; another console owns the display
    Inactive = 3,
}

impl SwitchState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::ReleaseRequested,
            2 => Self::AcquireRequested,
            3 => Self::Inactive,
            _ => Self::Active,
        }
    }

    /// State a received signal moves us to
    pub fn from_signal(signal: i32) -> Option<Self> {
        match signal {
            RELEASE_SIGNAL => Some(Self::ReleaseRequested),
            ACQUIRE_SIGNAL => Some(Self::AcquireRequested),
            _ => None,
        }
    }
}

/// Lock-free switch state shared between the listener and the caller
#[derive(Debug, Clone)]
pub struct SwitchCell(Arc<AtomicU8>);

impl Default for SwitchCell {
    fn default() -> Self {
        Self::new(SwitchState::Active)
    }
}

impl SwitchCell {
    pub fn new(state: SwitchState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn load(&self) -> SwitchState {
        SwitchState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: SwitchState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Background thread translating VT signals into switch state
pub struct VtListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl VtListener {
    /// Register for both VT signals and start listening
    pub fn spawn(cell: SwitchCell) -> io::Result<Self> {
        let mut signals = Signals::new([RELEASE_SIGNAL, ACQUIRE_SIGNAL])?;
        let handle = signals.handle();

        let thread = thread::Builder::new()
            .name("vt-switch".to_string())
            .spawn(move || {
                // Ends once the handle is closed
                for signal in signals.forever() {
                    if let Some(state) = SwitchState::from_signal(signal) {
                        debug!("VT signal {}: {:?}", signal, state);
                        cell.store(state);
                    }
                }
            });

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                handle.close();
                return Err(e);
            }
        };

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stop listening and wait for the thread to exit
    pub fn stop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("VT listener thread panicked");
            }
        }
    }
}

impl Drop for VtListener {
    fn drop(&mut self) {
        self.stop();
    }
}
