//! # framegrab
//!
//! Frame-accurate video capture on top of FFmpeg.
//!
//! `framegrab` opens a file or network stream, negotiates a hardware or
//! software decoder, and hands out one decoded frame at a time as packed
//! BGR or RGB pixels. Seeking lands on the exact frame requested even when
//! the container can only seek to keyframes, and a raw mode passes
//! compressed packets through untouched (rewritten to Annex B for H.264 and
//! HEVC).
//!
//! ## Quick Start
//!
//! ### Read Frames
//!
//! ```no_run
//! use framegrab::{CaptureOptions, CaptureSession, PixelFormat};
//!
//! let mut session = CaptureSession::open("input.mp4", &CaptureOptions::new()).unwrap();
//! while let Some(frame) = session.read(PixelFormat::Bgr24) {
//!     println!("{}x{} stride={}", frame.width(), frame.height(), frame.stride());
//! }
//! ```
//!
//! ### Seek and Save
//!
//! ```no_run
//! use framegrab::{CaptureOptions, CaptureSession, PixelFormat};
//!
//! let mut session = CaptureSession::open("input.mp4", &CaptureOptions::new()).unwrap();
//! session.seek_to_frame(250);
//! let frame = session.read(PixelFormat::Rgb24).unwrap();
//! frame.to_image().unwrap().save("frame_250.png").unwrap();
//! ```
//!
//! ### Hardware Decoding
//!
//! ```no_run
//! use framegrab::{AccelerationType, CaptureOptions, CaptureSession, PropertyId};
//!
//! let options = CaptureOptions::new().with_acceleration(AccelerationType::Any);
//! let session = CaptureSession::open("input.mp4", &options).unwrap();
//! // Falls back to software when no accelerator can decode the stream.
//! println!("acceleration: {}", session.property(PropertyId::HwAcceleration));
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`](https://crates.io/crates/log) facade.
//! FFmpeg's own log level is taken from the `FRAMEGRAB_FFMPEG_LOGLEVEL`
//! environment variable on first use and can be changed with
//! [`set_ffmpeg_log_level`].
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod acceleration;
pub mod configuration;
mod conversion;
pub mod error;
pub mod ffmpeg;
pub mod frame;
mod interrupt;
pub mod metadata;
pub mod properties;
mod raw;
pub mod seek;
pub mod session;
mod utilities;

pub use acceleration::{
    AccelerationType, DecodeBackend, DecoderProvider, HardwareDeviceType, Negotiated,
    available_hardware_devices, candidate_chain, negotiate,
};
pub use configuration::{CaptureOptions, DEFAULT_TIMEOUT, FromOptionValue, OptionKey, OptionValue};
pub use conversion::PixelFormat;
pub use error::CaptureError;
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use frame::{Frame, FrameLayout};
pub use metadata::StreamMetadata;
pub use properties::{FFMPEG_BACKEND_ID, PropertyId};
pub use seek::{SeekCursor, SeekOutcome, SeekReport, seek_to_frame};
pub use session::CaptureSession;
