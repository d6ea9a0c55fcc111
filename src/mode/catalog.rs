//! Display mode catalog parser
//!
//! Reads the `fb.modes` format used by `fbset`:
//!
//! ```text
//! mode "640x480-60"
//!     geometry 640 480 640 480 16
//!     timings 39722 48 16 33 10 96 2
//!     hsync high
//!     rgba 5/11,6/5,5/0,0/0
//! endmode
//! ```
//!
//! Directives inside a block may appear in any order. Unknown directives are
//! skipped. A malformed number anywhere aborts the whole parse.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::debug;

use super::{DisplayMode, SyncFlags, VideoModeFlags};
use crate::error::{FbError, Result};
use crate::pixel::Channel;

/// Ordered list of display modes read from a catalog file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeCatalog {
    modes: Vec<DisplayMode>,
}

impl ModeCatalog {
    /// Read and parse the catalog at `path`. Nothing is cached between calls.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(FbError::ModeFileIo)?;
        let catalog = Self::from_reader(file)?;
        debug!(
            "Loaded {} display modes from {}",
            catalog.modes.len(),
            path.as_ref().display()
        );
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(Self {
            modes: parse_modes(BufReader::new(reader))?,
        })
    }

    /// Find a mode by name, ignoring ASCII case
    pub fn find(&self, name: &str) -> Option<&DisplayMode> {
        self.modes.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn modes(&self) -> &[DisplayMode] {
        &self.modes
    }

    pub fn into_modes(self) -> Vec<DisplayMode> {
        self.modes
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

/// Parse every complete mode block from `reader`, in file order.
///
/// A trailing block without `endmode` is dropped.
pub fn parse_modes<R: BufRead>(mut reader: R) -> Result<Vec<DisplayMode>> {
    let mut modes = Vec::new();
    let mut current: Option<DisplayMode> = None;
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).map_err(FbError::ModeFileIo)? == 0 {
            break;
        }
        line_no += 1;

        // Hand-edited catalogs often carry Latin-1 comments
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(directive) = tokens.next() else {
            continue;
        };

        match directive {
            "endmode" => {
                if let Some(mut mode) = current.take() {
                    mode.format.depth = mode.geometry.depth;
                    modes.push(mode);
                }
            }
            "mode" => match quoted_name(line) {
                Some(name) => {
                    current = Some(DisplayMode {
                        name: name.to_string(),
                        ..DisplayMode::default()
                    });
                }
                None => debug!("Skipping unnamed mode at line {}", line_no),
            },
            _ => {
                if let Some(mode) = current.as_mut() {
                    let args: Vec<&str> = tokens.collect();
                    apply_directive(mode, directive, &args, line_no)?;
                }
            }
        }
    }

    Ok(modes)
}

fn apply_directive(mode: &mut DisplayMode, directive: &str, args: &[&str], line: usize) -> Result<()> {
    let first = args.first().copied().unwrap_or("");

    match directive {
        "geometry" => {
            let [xres, yres, xres_virtual, yres_virtual, depth] = numbers::<5>(directive, args, line)?;
            mode.geometry.xres = xres;
            mode.geometry.yres = yres;
            mode.geometry.xres_virtual = xres_virtual;
            mode.geometry.yres_virtual = yres_virtual;
            mode.geometry.depth = depth;
        }
        "timings" => {
            let [pixclock, left, right, upper, lower, hsync_len, vsync_len] =
                numbers::<7>(directive, args, line)?;
            let t = &mut mode.timings;
            t.pixclock = pixclock;
            t.left = left;
            t.right = right;
            t.upper = upper;
            t.lower = lower;
            t.hsync_len = hsync_len;
            t.vsync_len = vsync_len;
        }
        "nonstd" => {
            let [n] = numbers::<1>(directive, args, line)?;
            mode.nonstandard = n;
        }
        "rgba" => {
            let channels = channel_layout(&args.concat(), line)?;
            let [red, green, blue, alpha] = channels;
            mode.format.red = red;
            mode.format.green = green;
            mode.format.blue = blue;
            mode.format.alpha = alpha;
        }
        "hsync" if first == "high" => mode.sync |= SyncFlags::HOR_HIGH_ACT,
        "vsync" if first == "high" => mode.sync |= SyncFlags::VERT_HIGH_ACT,
        "csync" if first == "high" => mode.sync |= SyncFlags::COMP_HIGH_ACT,
        "gsync" if first == "high" => mode.sync |= SyncFlags::ON_GREEN,
        "bcast" if first == "true" => mode.sync |= SyncFlags::BROADCAST,
        "extsync" if first == "true" => mode.sync |= SyncFlags::EXT,
        "laced" if first == "true" => mode.vmode |= VideoModeFlags::INTERLACED,
        "double" if first == "true" => mode.vmode |= VideoModeFlags::DOUBLE,
        "accel" if first == "true" => mode.accelerated = true,
        "grayscale" if first == "true" => mode.grayscale = true,
        _ => {}
    }

    Ok(())
}

/// Text between the first pair of double quotes
fn quoted_name(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

fn numbers<const N: usize>(directive: &str, args: &[&str], line: usize) -> Result<[u32; N]> {
    if args.len() < N {
        return Err(FbError::ModeFileFormat {
            line,
            message: format!("{} expects {} values, found {}", directive, N, args.len()),
        });
    }

    let mut out = [0u32; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = number(directive, arg, line)?;
    }
    Ok(out)
}

fn number(directive: &str, text: &str, line: usize) -> Result<u32> {
    text.parse().map_err(|_| FbError::ModeFileFormat {
        line,
        message: format!("invalid number {:?} in {}", text, directive),
    })
}

/// `r/r,g/g,b/b,a/a` as four (length, offset) pairs
fn channel_layout(text: &str, line: usize) -> Result<[Channel; 4]> {
    let parts: Vec<&str> = text.split(',').collect();
    if parts.len() != 4 {
        return Err(FbError::ModeFileFormat {
            line,
            message: format!("rgba expects 4 channels, found {}", parts.len()),
        });
    }

    let mut channels = [Channel::default(); 4];
    for (channel, part) in channels.iter_mut().zip(parts) {
        let (length, offset) = part.split_once('/').ok_or_else(|| FbError::ModeFileFormat {
            line,
            message: format!("rgba channel {:?} is not length/offset", part),
        })?;
        channel.length = number("rgba", length, line)?;
        channel.offset = number("rgba", offset, line)?;
    }
    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Geometry;

    const CATALOG: &str = r#"
# Sample catalog
mode "640x480-60"
    # D: 25.175 MHz, H: 31.469 kHz, V: 59.94 Hz
    geometry 640 480 640 480 16
    timings 39722 48 16 33 10 96 2
    hsync high
    vsync low
    rgba 5/11,6/5,5/0,0/0
endmode

mode "1024x768-75"
    geometry 1024 768 1024 1536 32
    timings 12690 176 16 28 1 96 3
    hsync high
    vsync high
    laced true
    accel true
    nonstd 1
    colorspace 7
    rgba 8/16, 8/8, 8/0, 8/24
endmode
"#;

    fn parse(text: &str) -> Result<Vec<DisplayMode>> {
        parse_modes(text.as_bytes())
    }

    #[test]
    fn test_parse_catalog() {
        let modes = parse(CATALOG).unwrap();
        assert_eq!(modes.len(), 2);

        let m = &modes[0];
        assert_eq!(m.name, "640x480-60");
        assert_eq!(
            m.geometry,
            Geometry {
                xres: 640,
                yres: 480,
                xres_virtual: 640,
                yres_virtual: 480,
                depth: 16,
            }
        );
        assert_eq!(m.timings.pixclock, 39722);
        assert_eq!(m.timings.vsync_len, 2);
        assert_eq!(m.sync, SyncFlags::HOR_HIGH_ACT);
        assert_eq!(m.format.depth, 16);
        assert_eq!(m.format.red, Channel { length: 5, offset: 11 });
        assert_eq!(m.format.green, Channel { length: 6, offset: 5 });
        assert_eq!(m.format.blue, Channel { length: 5, offset: 0 });
        assert!(!m.accelerated);

        let m = &modes[1];
        assert_eq!(m.geometry.yres_virtual, 1536);
        assert_eq!(m.sync, SyncFlags::HOR_HIGH_ACT | SyncFlags::VERT_HIGH_ACT);
        assert_eq!(m.vmode, VideoModeFlags::INTERLACED);
        assert!(m.accelerated);
        assert_eq!(m.nonstandard, 1);
        assert_eq!(m.format.alpha, Channel { length: 8, offset: 24 });
    }

    #[test]
    fn test_parse_twice_is_stable() {
        let first = parse(CATALOG).unwrap();
        let second = parse(CATALOG).unwrap();
        assert_eq!(first, second);

        let doubled = parse(&format!("{}{}", CATALOG, CATALOG)).unwrap();
        assert_eq!(doubled.len(), first.len() * 2);
        assert_eq!(&doubled[..2], &first[..]);
        assert_eq!(&doubled[2..], &first[..]);
    }

    #[test]
    fn test_bad_number_discards_everything() {
        let text = format!(
            "{}mode \"broken\"\n    geometry 640 abc 640 480 8\nendmode\n",
            CATALOG
        );
        match parse(&text) {
            Err(FbError::ModeFileFormat { line, .. }) => assert_eq!(line, 24),
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_block_dropped() {
        let text = format!("{}mode \"open\"\n    geometry 320 200 320 200 8\n", CATALOG);
        let modes = parse(&text).unwrap();
        assert_eq!(modes.len(), 2);
        assert!(modes.iter().all(|m| m.name != "open"));
    }

    #[test]
    fn test_duplicates_kept() {
        let block = "mode \"a\"\ngeometry 1 1 1 1 8\nendmode\n";
        let modes = parse(&block.repeat(3)).unwrap();
        assert_eq!(modes.len(), 3);
    }

    #[test]
    fn test_malformed_rgba() {
        let text = "mode \"x\"\nrgba 8/16,8/8,8\nendmode\n";
        assert!(matches!(parse(text), Err(FbError::ModeFileFormat { line: 2, .. })));
    }

    #[test]
    fn test_latin1_comment() {
        let text = b"mode \"640x480-60\"\n # D: 25 MHz \xb5s\n geometry 640 480 640 480 8\nendmode\n";
        let modes = parse_modes(&text[..]).unwrap();
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].geometry.xres, 640);
        assert_eq!(modes[0].format.depth, 8);

        // Numbers still have to be numbers
        let text = b"mode \"x\"\n geometry 640 4\xb580 640 480 8\nendmode\n";
        assert!(matches!(
            parse_modes(&text[..]),
            Err(FbError::ModeFileFormat { line: 2, .. })
        ));
    }

    #[test]
    fn test_unnamed_mode_skipped() {
        let text = "mode 640x480\nmode \"named\"\ngeometry 1 1 1 1 8\nmode\nendmode\n";
        let modes = parse(text).unwrap();
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].name, "named");
        assert_eq!(modes[0].geometry.depth, 8);
    }

    #[test]
    fn test_find_ignores_case() {
        let catalog = ModeCatalog::from_reader(CATALOG.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.find("1024X768-75").is_some());
        assert!(catalog.find("800x600-60").is_none());
    }

    #[test]
    fn test_missing_file() {
        let err = ModeCatalog::load("/nonexistent/fb.modes").unwrap_err();
        assert!(matches!(err, FbError::ModeFileIo(_)));
    }
}
