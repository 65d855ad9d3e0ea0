//! Process-wide FFmpeg state.
//!
//! FFmpeg has its own logging, separate from the Rust
//! [`log`](https://crates.io/crates/log) facade. [`set_ffmpeg_log_level`]
//! tunes what FFmpeg prints to stderr. On first use the level defaults to
//! [`FfmpegLogLevel::Error`], unless the `FRAMEGRAB_FFMPEG_LOGLEVEL`
//! environment variable names another level (`"debug"`, `"quiet"`, ...) or
//! holds a numeric `AV_LOG_*` value.
//!
//! Library and network initialization run once per process, and every
//! [`CaptureSession::open`](crate::CaptureSession::open) holds the same
//! process-wide lock while it probes the container and opens the decoder.
//!
//! # Example
//!
//! ```no_run
//! use framegrab::FfmpegLogLevel;
//!
//! framegrab::set_ffmpeg_log_level(FfmpegLogLevel::Quiet);
//! ```

use std::{
    env,
    sync::{Mutex, MutexGuard, OnceLock},
};

use ffmpeg_next::util::log::Level;

use crate::error::CaptureError;

/// Environment variable read on first initialization.
pub const LOG_LEVEL_VARIABLE: &str = "FRAMEGRAB_FFMPEG_LOGLEVEL";

/// Verbosity of FFmpeg's own stderr logging.
///
/// Setting a level makes FFmpeg suppress all messages below that severity.
///
/// Variants are listed from silent to most verbose and map one-to-one onto
/// the `AV_LOG_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Nothing.
    Quiet,
    /// Only log conditions after which the process aborts.
    Panic,
    /// Only log unrecoverable errors.
    Fatal,
    /// Errors FFmpeg can recover from. The default.
    Error,
    /// Log warnings.
    Warning,
    Info,
    Verbose,
    Debug,
    /// Everything, including per-packet tracing.
    Trace,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }

    fn from_ffmpeg_level(level: Level) -> Self {
        match level {
            Level::Quiet => FfmpegLogLevel::Quiet,
            Level::Panic => FfmpegLogLevel::Panic,
            Level::Fatal => FfmpegLogLevel::Fatal,
            Level::Error => FfmpegLogLevel::Error,
            Level::Warning => FfmpegLogLevel::Warning,
            Level::Info => FfmpegLogLevel::Info,
            Level::Verbose => FfmpegLogLevel::Verbose,
            Level::Debug => FfmpegLogLevel::Debug,
            Level::Trace => FfmpegLogLevel::Trace,
        }
    }

    /// Parse a level name or a numeric `AV_LOG_*` value.
    ///
    /// Numeric values pick the most verbose level not exceeding them, so
    /// `32` is `Info` and `40` is `Verbose`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(number) = value.parse::<i32>() {
            return Some(match number {
                i32::MIN..=-1 => FfmpegLogLevel::Quiet,
                0..=7 => FfmpegLogLevel::Panic,
                8..=15 => FfmpegLogLevel::Fatal,
                16..=23 => FfmpegLogLevel::Error,
                24..=31 => FfmpegLogLevel::Warning,
                32..=39 => FfmpegLogLevel::Info,
                40..=47 => FfmpegLogLevel::Verbose,
                48..=55 => FfmpegLogLevel::Debug,
                _ => FfmpegLogLevel::Trace,
            });
        }

        match value.to_ascii_lowercase().as_str() {
            "quiet" => Some(FfmpegLogLevel::Quiet),
            "panic" => Some(FfmpegLogLevel::Panic),
            "fatal" => Some(FfmpegLogLevel::Fatal),
            "error" => Some(FfmpegLogLevel::Error),
            "warning" | "warn" => Some(FfmpegLogLevel::Warning),
            "info" => Some(FfmpegLogLevel::Info),
            "verbose" => Some(FfmpegLogLevel::Verbose),
            "debug" => Some(FfmpegLogLevel::Debug),
            "trace" => Some(FfmpegLogLevel::Trace),
            _ => None,
        }
    }
}

/// Change what FFmpeg itself prints.
///
/// This does **not** affect Rust-side `log` output.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

/// The level FFmpeg is currently logging at, `None` if it is not one of
/// the named levels.
pub fn get_ffmpeg_log_level() -> Option<FfmpegLogLevel> {
    ffmpeg_next::util::log::get_level()
        .ok()
        .map(FfmpegLogLevel::from_ffmpeg_level)
}

static REGISTRY_LOCK: Mutex<()> = Mutex::new(());
static INITIALIZED: OnceLock<Result<(), String>> = OnceLock::new();

/// Take the process-wide lock serializing session opens.
pub(crate) fn registry_lock() -> MutexGuard<'static, ()> {
    REGISTRY_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Initialize FFmpeg once per process.
///
/// Must be called with [`registry_lock`] held.
pub(crate) fn initialize() -> Result<(), CaptureError> {
    INITIALIZED
        .get_or_init(|| {
            ffmpeg_next::init().map_err(|error| error.to_string())?;
            unsafe {
                ffmpeg_sys_next::avformat_network_init();
            }

            let level = env::var(LOG_LEVEL_VARIABLE)
                .ok()
                .and_then(|value| FfmpegLogLevel::parse(&value))
                .unwrap_or(FfmpegLogLevel::Error);
            set_ffmpeg_log_level(level);
            log::debug!("FFmpeg initialized log_level={level:?}");
            Ok(())
        })
        .clone()
        .map_err(CaptureError::FfmpegError)
}
