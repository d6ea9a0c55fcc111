//! fbcanvas - framebuffer test pattern
//!
//! Opens the framebuffer, draws a colour gradient with a white border and
//! waits, handing the display over cleanly when the user switches consoles.
//!
//! # Quick Start
//!
//! ```text
//! fbcanvas --list-modes        # List modes from /etc/fb.modes
//! fbcanvas -t                  # Draw on the console attached to stdin
//! fbcanvas -t -m 800x600-60    # Switch mode first
//! FRAMEBUFFER=/dev/fb1 fbcanvas -s 5
//! ```

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fbcanvas::{
    Canvas, Color, Config, Console, DisplayMode, ModeCatalog, PixelFormatKind, PixelView,
    SwitchState, Tty,
};

/// Command line options
#[derive(Default)]
struct Args {
    /// Print the mode catalog and exit
    list_modes: bool,
    /// Catalog mode to switch to
    mode: Option<String>,
    /// Take over stdin's virtual terminal
    tty: bool,
    /// Exit after this long; run until interrupted otherwise
    seconds: Option<u64>,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Border width in pixels
const BORDER: u32 = 4;

/// Switch state poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn print_version() {
    eprintln!("fbcanvas {}", VERSION);
}

fn print_help() {
    eprintln!("fbcanvas {} - Linux framebuffer test pattern", VERSION);
    eprintln!();
    eprintln!("Usage: fbcanvas [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --list-modes          List display modes from the mode catalog");
    eprintln!("  -m, --mode <NAME>     Switch to the named catalog mode");
    eprintln!("  -t, --tty             Use stdin's virtual terminal (graphics mode,");
    eprintln!("                        VT switch handling, device lookup)");
    eprintln!("  -s, --seconds <N>     Exit after N seconds");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  FRAMEBUFFER           Framebuffer device to use, e.g. /dev/fb1");
    eprintln!("  RUST_LOG              Log filter (default: info)");
    eprintln!();
    eprintln!("Configuration: ~/.fbcanvas/config.toml");
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "--list-modes" => {
                parsed.list_modes = true;
            }
            "-m" | "--mode" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing mode name".to_string());
                }
                parsed.mode = Some(args[i].clone());
            }
            "-t" | "--tty" => {
                parsed.tty = true;
            }
            "-s" | "--seconds" => {
                i += 1;
                let seconds = args
                    .get(i)
                    .ok_or_else(|| "Missing seconds argument".to_string())?;
                let seconds = seconds
                    .parse()
                    .map_err(|_| format!("Invalid number of seconds: {}", seconds))?;
                parsed.seconds = Some(seconds);
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn list_modes(config: &Config) -> anyhow::Result<()> {
    let catalog = ModeCatalog::load(&config.modes_file)
        .with_context(|| format!("reading {}", config.modes_file.display()))?;

    for mode in catalog.modes() {
        let g = &mode.geometry;
        println!(
            "{:<20} {}x{} ({}x{} virtual) {} bpp",
            mode.name, g.xres, g.yres, g.xres_virtual, g.yres_virtual, g.depth
        );
    }
    Ok(())
}

/// Stdin's terminal, if it is a virtual terminal
fn open_terminal() -> anyhow::Result<Box<dyn Console>> {
    let tty = Tty::stdin().context("duplicating stdin")?;
    if let Err(e) = tty.vt_state() {
        bail!("stdin is not a virtual terminal: {}", e);
    }
    Ok(Box::new(tty))
}

fn grayscale() -> Vec<Color> {
    (0..=255u8).map(|v| Color::rgb(v, v, v)).collect()
}

fn draw(canvas: &mut Canvas) -> anyhow::Result<()> {
    let mode = canvas.current_mode()?;
    let (w, h) = (mode.geometry.xres.max(1), mode.geometry.yres.max(1));

    if mode.format.kind()? == PixelFormatKind::Indexed8 {
        canvas.set_palette(&grayscale())?;
    }

    let mut image = canvas.image()?;
    for y in 0..h {
        for x in 0..w {
            let border = x < BORDER || y < BORDER || x + BORDER >= w || y + BORDER >= h;
            match &mut image {
                PixelView::Indexed8(buf) => {
                    let level = if border { 255 } else { (x * 255 / w) as u8 };
                    buf.set(x, y, level);
                }
                view => {
                    let color = if border {
                        Color::WHITE
                    } else {
                        Color::rgb((x * 255 / w) as u8, (y * 255 / h) as u8, 128)
                    };
                    view.set_color(x, y, color);
                }
            }
        }
    }
    Ok(())
}

fn describe(mode: &DisplayMode) -> String {
    let g = &mode.geometry;
    format!(
        "{}x{} ({}x{} virtual) {} bpp, pixclock {} ps",
        g.xres, g.yres, g.xres_virtual, g.yres_virtual, g.depth, mode.timings.pixclock
    )
}

fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let mode = match &args.mode {
        Some(name) => {
            let catalog = ModeCatalog::load(&config.modes_file)
                .with_context(|| format!("reading {}", config.modes_file.display()))?;
            match catalog.find(name) {
                Some(mode) => Some(mode.clone()),
                None => bail!("No mode named {:?} in {}", name, config.modes_file.display()),
            }
        }
        None => None,
    };

    let tty = if args.tty { Some(open_terminal()?) } else { None };

    let mut canvas =
        Canvas::open(mode.as_ref(), tty, &config).context("opening framebuffer")?;
    canvas.switch_init()?;

    let current = canvas.current_mode()?;
    eprintln!("{}: {}", canvas.device_path().display(), describe(&current));
    if canvas.accelerated() {
        info!("Device reports hardware acceleration");
    }

    draw(&mut canvas)?;

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&term))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&term))?;

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));

    while !term.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        match canvas.switch_state() {
            SwitchState::ReleaseRequested => {
                info!("Releasing display");
                canvas.switch_release()?;
            }
            SwitchState::AcquireRequested => {
                info!("Reacquiring display");
                canvas.switch_acquire()?;
                draw(&mut canvas)?;
            }
            SwitchState::Active | SwitchState::Inactive => {}
        }

        thread::sleep(POLL_INTERVAL);
    }

    canvas.close().context("restoring framebuffer")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    let config = Config::load();

    if args.list_modes {
        return list_modes(&config);
    }

    if let Err(e) = run(args, config) {
        warn!("fbcanvas failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
