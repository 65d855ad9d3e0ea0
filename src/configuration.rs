//! Open options.
//!
//! [`CaptureOptions`] is a typed, order-independent key/value bag passed to
//! [`CaptureSession::open`](crate::CaptureSession::open). Every read through
//! [`get`](CaptureOptions::get) or [`get_or`](CaptureOptions::get_or) marks
//! the entry as consumed, so after opening the session can report options it
//! never looked at.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framegrab::{AccelerationType, CaptureOptions, CaptureSession};
//!
//! let options = CaptureOptions::new()
//!     .with_acceleration(AccelerationType::Any)
//!     .with_open_timeout(Duration::from_secs(5));
//!
//! let session = CaptureSession::open("rtsp://camera.local/stream", &options).unwrap();
//! ```

use std::{
    cell::Cell,
    fmt::{Debug, Formatter, Result as FmtResult},
    time::Duration,
};

use crate::{acceleration::AccelerationType, error::CaptureError, properties::PropertyId};

/// Default open and read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Keys understood by the option bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKey {
    /// Deliver compressed packets instead of decoded pixels.
    RawMode,
    /// Requested acceleration backend.
    Acceleration,
    /// Hardware device index, `-1` for the default device.
    DeviceIndex,
    /// Request OpenCL interop on the acceleration device.
    UseOpenCl,
    /// Open timeout in milliseconds, `0` disables it.
    OpenTimeout,
    /// Per-grab read timeout in milliseconds, `0` disables it.
    ReadTimeout,
    /// Name of the decoder to use instead of the codec default.
    DecoderName,
    /// Name of the demuxer to use instead of probing.
    InputFormat,
}

impl OptionKey {
    /// Map a numeric property id to the option key it configures.
    ///
    /// Only the ids accepted at open time are mapped.
    pub fn from_property_id(id: i64) -> Option<Self> {
        let property = PropertyId::from_id(i32::try_from(id).ok()?)?;
        match property {
            PropertyId::Format => Some(OptionKey::RawMode),
            PropertyId::HwAcceleration => Some(OptionKey::Acceleration),
            PropertyId::HwDevice => Some(OptionKey::DeviceIndex),
            PropertyId::HwAccelerationUseOpencl => Some(OptionKey::UseOpenCl),
            PropertyId::OpenTimeoutMsec => Some(OptionKey::OpenTimeout),
            PropertyId::ReadTimeoutMsec => Some(OptionKey::ReadTimeout),
            _ => None,
        }
    }
}

/// A value stored in the option bag.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Flag(bool),
    Integer(i64),
    Text(String),
    Acceleration(AccelerationType),
}

/// Conversion from a stored [`OptionValue`] into a concrete type.
pub trait FromOptionValue: Sized {
    /// Returns `None` when the stored value has a different shape.
    fn from_option_value(value: &OptionValue) -> Option<Self>;
}

impl FromOptionValue for bool {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::Flag(flag) => Some(*flag),
            OptionValue::Integer(number) => Some(*number != 0),
            _ => None,
        }
    }
}

impl FromOptionValue for i64 {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::Integer(number) => Some(*number),
            OptionValue::Flag(flag) => Some(i64::from(*flag)),
            OptionValue::Acceleration(kind) => Some(i64::from(kind.code())),
            OptionValue::Text(_) => None,
        }
    }
}

impl FromOptionValue for i32 {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        i64::from_option_value(value).and_then(|number| i32::try_from(number).ok())
    }
}

impl FromOptionValue for Duration {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        let millis = i64::from_option_value(value)?;
        u64::try_from(millis).ok().map(Duration::from_millis)
    }
}

impl FromOptionValue for String {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::Text(text) => Some(text.clone()),
            _ => None,
        }
    }
}

impl FromOptionValue for AccelerationType {
    fn from_option_value(value: &OptionValue) -> Option<Self> {
        match value {
            OptionValue::Acceleration(kind) => Some(*kind),
            OptionValue::Integer(code) => i32::try_from(*code)
                .ok()
                .and_then(AccelerationType::from_code),
            _ => None,
        }
    }
}

struct Entry {
    key: OptionKey,
    value: OptionValue,
    consumed: Cell<bool>,
}

/// Options applied when opening a [`CaptureSession`](crate::CaptureSession).
///
/// Setting a key twice replaces the earlier value.
#[derive(Default)]
pub struct CaptureOptions {
    entries: Vec<Entry>,
}

impl Debug for CaptureOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_map()
            .entries(self.entries.iter().map(|entry| (entry.key, &entry.value)))
            .finish()
    }
}

impl Clone for CaptureOptions {
    fn clone(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|entry| Entry {
                key: entry.key,
                value: entry.value.clone(),
                consumed: Cell::new(false),
            })
            .collect();
        Self { entries }
    }
}

impl CaptureOptions {
    /// Create an empty option bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a flat `[key, value, key, value, ...]` list of numeric property
    /// ids, as accepted by OpenCV-style capture APIs.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidOptions`] when the list has odd length,
    /// names an id that cannot be set at open time, or asks for a
    /// [`Format`](PropertyId::Format) other than `-1`.
    pub fn from_flat(parameters: &[i64]) -> Result<Self, CaptureError> {
        if parameters.len() % 2 != 0 {
            return Err(CaptureError::InvalidOptions(format!(
                "expected key/value pairs, got {} values",
                parameters.len()
            )));
        }

        let mut options = Self::new();
        for pair in parameters.chunks_exact(2) {
            let (id, value) = (pair[0], pair[1]);
            let key = OptionKey::from_property_id(id).ok_or_else(|| {
                CaptureError::InvalidOptions(format!("property {id} cannot be set at open time"))
            })?;
            let value = match key {
                OptionKey::RawMode if value == -1 => OptionValue::Flag(true),
                OptionKey::RawMode => {
                    return Err(CaptureError::InvalidOptions(format!(
                        "format {value} is not supported, only -1 (raw stream) is"
                    )));
                }
                OptionKey::UseOpenCl => OptionValue::Flag(value != 0),
                OptionKey::Acceleration => {
                    let kind = i32::try_from(value)
                        .ok()
                        .and_then(AccelerationType::from_code)
                        .ok_or_else(|| {
                            CaptureError::InvalidOptions(format!(
                                "unknown acceleration type {value}"
                            ))
                        })?;
                    OptionValue::Acceleration(kind)
                }
                _ => OptionValue::Integer(value),
            };
            options.set(key, value);
        }
        Ok(options)
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: OptionKey, value: OptionValue) {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.value = value;
                entry.consumed.set(false);
            }
            None => self.entries.push(Entry {
                key,
                value,
                consumed: Cell::new(false),
            }),
        }
    }

    /// Whether `key` has been set.
    pub fn has(&self, key: OptionKey) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Read a required value.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::MissingOption`] when the key is absent and
    /// [`CaptureError::InvalidOptions`] when it holds a value of another type.
    pub fn get<T: FromOptionValue>(&self, key: OptionKey) -> Result<T, CaptureError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.key == key)
            .ok_or(CaptureError::MissingOption(key))?;
        entry.consumed.set(true);
        T::from_option_value(&entry.value).ok_or_else(|| {
            CaptureError::InvalidOptions(format!(
                "option {key:?} has unexpected value {:?}",
                entry.value
            ))
        })
    }

    /// Read a value, falling back to `default` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidOptions`] when the key holds a value of
    /// another type.
    pub fn get_or<T: FromOptionValue>(&self, key: OptionKey, default: T) -> Result<T, CaptureError> {
        if self.has(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }

    /// Keys that were set but never read.
    pub fn unused_keys(&self) -> Vec<OptionKey> {
        self.entries
            .iter()
            .filter(|entry| !entry.consumed.get())
            .map(|entry| entry.key)
            .collect()
    }

    /// Log a warning for every key that was set but never read.
    ///
    /// Returns `true` when at least one key was unused.
    pub fn warn_unused(&self) -> bool {
        let unused = self.unused_keys();
        for key in &unused {
            log::warn!("capture option {key:?} was not used by the opener");
        }
        !unused.is_empty()
    }

    /// Deliver compressed packets instead of decoded frames.
    #[must_use]
    pub fn with_raw_mode(mut self, enabled: bool) -> Self {
        self.set(OptionKey::RawMode, OptionValue::Flag(enabled));
        self
    }

    /// Request an acceleration backend.
    #[must_use]
    pub fn with_acceleration(mut self, kind: AccelerationType) -> Self {
        self.set(OptionKey::Acceleration, OptionValue::Acceleration(kind));
        self
    }

    /// Select the hardware device by index.
    #[must_use]
    pub fn with_device_index(mut self, index: i32) -> Self {
        self.set(OptionKey::DeviceIndex, OptionValue::Integer(i64::from(index)));
        self
    }

    /// Request OpenCL interop on the acceleration device.
    #[must_use]
    pub fn with_opencl(mut self, enabled: bool) -> Self {
        self.set(OptionKey::UseOpenCl, OptionValue::Flag(enabled));
        self
    }

    /// Bound how long opening may block. [`Duration::ZERO`] disables it.
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.set(OptionKey::OpenTimeout, OptionValue::Integer(duration_millis(timeout)));
        self
    }

    /// Bound how long a single grab may block. [`Duration::ZERO`] disables it.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.set(OptionKey::ReadTimeout, OptionValue::Integer(duration_millis(timeout)));
        self
    }

    /// Use the named decoder (e.g. `"h264_cuvid"`) instead of the default.
    #[must_use]
    pub fn with_decoder(mut self, name: impl Into<String>) -> Self {
        self.set(OptionKey::DecoderName, OptionValue::Text(name.into()));
        self
    }

    /// Force the named demuxer (e.g. `"v4l2"`, `"mjpeg"`) instead of probing.
    #[must_use]
    pub fn with_input_format(mut self, name: impl Into<String>) -> Self {
        self.set(OptionKey::InputFormat, OptionValue::Text(name.into()));
        self
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
