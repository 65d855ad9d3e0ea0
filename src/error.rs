//! Error types for the `framegrab` crate.
//!
//! [`CaptureError`] is returned by every fallible operation that happens
//! before a session is running: option validation, opening the container and
//! negotiating a decoder. Once a session is open, grabbing and retrieving
//! frames report failure through `bool`/`Option` and a log line instead, and
//! an unconverged seek is reported in its [`SeekReport`](crate::SeekReport)
//! rather than as an error.

use std::io::Error as IoError;

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::configuration::OptionKey;

/// The unified error type for `framegrab` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// The open options are malformed or contradict each other.
    #[error("Invalid capture options: {0}")]
    InvalidOptions(String),

    /// A required option was read from the option bag but never set.
    #[error("Missing required option {0:?}")]
    MissingOption(OptionKey),

    /// The container could not be opened or probed.
    #[error("Failed to open {uri}: {reason}")]
    Open {
        /// URI or path passed to [`CaptureSession::open`](crate::CaptureSession::open).
        uri: String,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// Opening the container took longer than the configured open timeout.
    #[error("Timed out opening {uri} after {timeout_ms} ms")]
    OpenTimeout {
        /// URI or path that was being opened.
        uri: String,
        /// The timeout that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The container has no video stream.
    #[error("No video stream found in {0}")]
    NoVideoStream(String),

    /// Every decoder candidate in the negotiation chain failed to open.
    #[error("No usable decoder for codec {codec} (tried: {attempted})")]
    CodecUnavailable {
        /// Codec name as reported by FFmpeg.
        codec: String,
        /// Comma-separated list of the backends that were attempted.
        attempted: String,
    },

    /// A packet or frame could not be decoded.
    #[error("Failed to decode video: {0}")]
    Decode(String),

    /// A hardware surface could not be copied to system memory.
    #[error("Hardware frame transfer failed: {0}")]
    HardwareTransfer(String),

    /// Pixel-format conversion failed.
    #[error("Pixel conversion failed: {0}")]
    Conversion(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while building or saving a frame.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),
}

impl From<FfmpegError> for CaptureError {
    fn from(error: FfmpegError) -> Self {
        CaptureError::FfmpegError(error.to_string())
    }
}
