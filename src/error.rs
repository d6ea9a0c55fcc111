//! Error types for framebuffer sessions and mode catalogs.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::pixel::PixelFormat;

#[derive(Error, Debug)]
pub enum FbError {
    #[error("No framebuffer device resolved: no terminal given and no device override set")]
    NoDeviceResolved,

    #[error("Failed to open {}: {source}", path.display())]
    DeviceOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Device query failed ({what}): {source}")]
    DeviceQueryFailed {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Framebuffer is not in packed pixel layout (type {0})")]
    UnsupportedLayout(u32),

    #[error("Failed to map framebuffer memory: {0}")]
    MapFailed(#[source] io::Error),

    #[error("Failed to apply display mode: {0}")]
    ModeApplyFailed(#[source] io::Error),

    #[error("Terminal mode change failed ({what}): {source}")]
    TerminalModeFailed {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedPixelFormat(PixelFormat),

    #[error("Palette access failed: {0}")]
    PaletteAccessFailed(#[source] io::Error),

    #[error("Mode file format error at line {line}: {message}")]
    ModeFileFormat { line: usize, message: String },

    #[error("Failed to read mode file: {0}")]
    ModeFileIo(#[source] io::Error),

    #[error("Failed to restore {stage}: {source}")]
    RestoreFailed {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Canvas is not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, FbError>;
