//! Core [`CaptureSession`] implementation.
//!
//! A session owns one demuxer, one negotiated video decoder and every buffer
//! frames pass through. It is driven pull-style: [`grab_frame`] advances by
//! exactly one frame (or one compressed packet in raw mode) and
//! [`retrieve_frame`] converts the last grabbed unit into pixels.
//!
//! [`grab_frame`]: CaptureSession::grab_frame
//! [`retrieve_frame`]: CaptureSession::retrieve_frame

use std::{
    ffi::CString,
    fmt::{Debug, Formatter, Result as FmtResult},
    os::raw::c_int,
    ptr,
    time::Duration,
};

use ffmpeg_next::{
    Dictionary, Error as FfmpegError, Packet,
    codec::Id,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    util::error::EAGAIN,
};
use ffmpeg_sys_next::{AV_NOPTS_VALUE, AVIOInterruptCB, AVPixelFormat, AVSEEK_FLAG_BACKWARD};

use crate::{
    acceleration::{
        AccelerationType, FfmpegDecoderProvider, available_hardware_devices, candidate_chain,
        is_hardware_frame, negotiate, transfer_hardware_frame,
    },
    configuration::{CaptureOptions, DEFAULT_TIMEOUT, OptionKey},
    conversion::{ConversionKey, PixelConverter, PixelFormat, has_pixels},
    error::CaptureError,
    ffmpeg,
    frame::Frame,
    interrupt::{InterruptState, interrupt_callback},
    metadata::StreamMetadata,
    properties::{FFMPEG_BACKEND_ID, PropertyId},
    raw::{BitstreamFilter, annexb_filter_for},
    seek::{SeekCursor, SeekReport, seconds_to_frame, seek_to_frame},
    utilities::{
        fourcc_from_name, frame_number_to_timestamp, picture_timestamp, rotate_packed,
        seconds_to_frame_number, timestamp_to_seconds,
    },
};

/// A grab fails after this many skipped or rejected packets.
const MAX_SKIPPED_PACKETS: usize = 1 << 9;

/// Options resolved and validated before the container is touched.
#[derive(Debug)]
struct OpenSettings {
    raw_mode: bool,
    acceleration: AccelerationType,
    device_index: i32,
    use_opencl: bool,
    open_timeout: Duration,
    read_timeout: Duration,
    decoder_name: Option<String>,
    input_format: Option<String>,
}

impl OpenSettings {
    fn from_options(options: &CaptureOptions) -> Result<Self, CaptureError> {
        let acceleration = options.get_or(OptionKey::Acceleration, AccelerationType::None)?;
        let device_index = options.get_or(OptionKey::DeviceIndex, -1)?;

        if device_index != -1 {
            match acceleration {
                AccelerationType::None => {
                    return Err(CaptureError::InvalidOptions(format!(
                        "hardware device {device_index} was given without an acceleration type"
                    )));
                }
                AccelerationType::Any => {
                    return Err(CaptureError::InvalidOptions(format!(
                        "hardware device {device_index} cannot be combined with AccelerationType::Any"
                    )));
                }
                _ => {}
            }
        }

        // OpenCL interop is meaningless without an accelerator, so the key is
        // left unread and reported below.
        let use_opencl = if acceleration == AccelerationType::None {
            false
        } else {
            options.get_or(OptionKey::UseOpenCl, false)?
        };

        let decoder_name = if options.has(OptionKey::DecoderName) {
            Some(options.get::<String>(OptionKey::DecoderName)?)
        } else {
            None
        };
        let input_format = if options.has(OptionKey::InputFormat) {
            Some(options.get::<String>(OptionKey::InputFormat)?)
        } else {
            None
        };

        let settings = Self {
            raw_mode: options.get_or(OptionKey::RawMode, false)?,
            acceleration,
            device_index,
            use_opencl,
            open_timeout: options.get_or(OptionKey::OpenTimeout, DEFAULT_TIMEOUT)?,
            read_timeout: options.get_or(OptionKey::ReadTimeout, DEFAULT_TIMEOUT)?,
            decoder_name,
            input_format,
        };
        options.warn_unused();
        Ok(settings)
    }
}

/// Outcome of pulling the next unit from the demuxer.
enum PumpStep {
    Decoded,
    RawPacket,
    Failed,
}

/// A video capture session.
///
/// Created via [`CaptureSession::open`]. Dropping the session, or calling
/// [`close`](Self::close), releases every FFmpeg resource it holds.
///
/// # Example
///
/// ```no_run
/// use framegrab::{CaptureOptions, CaptureSession, PixelFormat, PropertyId};
///
/// let mut session = CaptureSession::open("input.mp4", &CaptureOptions::new()).unwrap();
/// println!("{} frames", session.property(PropertyId::FrameCount));
///
/// session.seek_to_frame(150);
/// if let Some(frame) = session.read(PixelFormat::Rgb24) {
///     println!("{}x{}", frame.width(), frame.height());
/// }
/// ```
pub struct CaptureSession {
    converter: PixelConverter,
    picture: VideoFrame,
    transferred: VideoFrame,
    rotated: Vec<u8>,
    decoder: Option<VideoDecoder>,
    input: Option<Input>,
    packet: Packet,
    filtered: Packet,
    filter: Option<BitstreamFilter>,
    // Referenced by the demuxer's interrupt callback; boxed so its address
    // survives moves of the session.
    interrupt: Box<InterruptState>,

    uri: String,
    metadata: Option<StreamMetadata>,
    codec_id: Id,
    frame_number: i64,
    first_frame_number: Option<i64>,
    picture_pts: Option<i64>,
    has_picture: bool,
    draining: bool,
    raw_mode: bool,
    raw_mode_initialized: bool,
    acceleration: AccelerationType,
    device_index: i32,
    use_opencl: bool,
    open_timeout: Duration,
    read_timeout: Duration,
    rotation_auto: bool,
}

impl Debug for CaptureSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CaptureSession")
            .field("uri", &self.uri)
            .field("metadata", &self.metadata)
            .field("frame_number", &self.frame_number)
            .field("first_frame_number", &self.first_frame_number)
            .field("raw_mode", &self.raw_mode)
            .field("acceleration", &self.acceleration)
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    fn closed() -> Self {
        Self {
            converter: PixelConverter::default(),
            picture: VideoFrame::empty(),
            transferred: VideoFrame::empty(),
            rotated: Vec::new(),
            decoder: None,
            input: None,
            packet: Packet::empty(),
            filtered: Packet::empty(),
            filter: None,
            interrupt: Box::default(),
            uri: String::new(),
            metadata: None,
            codec_id: Id::None,
            frame_number: 0,
            first_frame_number: None,
            picture_pts: None,
            has_picture: false,
            draining: false,
            raw_mode: false,
            raw_mode_initialized: false,
            acceleration: AccelerationType::None,
            device_index: -1,
            use_opencl: false,
            open_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            rotation_auto: true,
        }
    }

    /// Open a file path or URL for capture.
    ///
    /// Validates `options`, probes the container, selects the first video
    /// stream and negotiates a decoder: the requested hardware backend(s)
    /// first, then software.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::InvalidOptions`] for contradictory options.
    /// - [`CaptureError::Open`] / [`CaptureError::OpenTimeout`] when the
    ///   container cannot be opened.
    /// - [`CaptureError::NoVideoStream`] when it has no video.
    /// - [`CaptureError::CodecUnavailable`] when no decoder opens.
    pub fn open(uri: &str, options: &CaptureOptions) -> Result<Self, CaptureError> {
        let mut session = Self::closed();
        session.reopen(uri, options)?;
        Ok(session)
    }

    /// Close the session and open `uri` in its place.
    ///
    /// On error the session is left closed.
    pub fn reopen(&mut self, uri: &str, options: &CaptureOptions) -> Result<(), CaptureError> {
        self.close();
        let result = self.open_inner(uri, options);
        if result.is_err() {
            self.close();
        }
        result
    }

    fn open_inner(&mut self, uri: &str, options: &CaptureOptions) -> Result<(), CaptureError> {
        let settings = OpenSettings::from_options(options)?;

        let _guard = ffmpeg::registry_lock();
        ffmpeg::initialize()?;
        log::debug!("opening uri={uri} settings={settings:?}");

        self.interrupt.arm(settings.open_timeout);
        let opened = open_input(uri, settings.input_format.as_deref(), &self.interrupt);
        let input = match opened {
            Ok(input) => input,
            Err(_) if self.interrupt.timed_out() => {
                return Err(CaptureError::OpenTimeout {
                    uri: uri.to_string(),
                    timeout_ms: settings.open_timeout.as_millis() as u64,
                });
            }
            Err(error) => return Err(error),
        };
        self.interrupt.disarm();

        let stream = input
            .streams()
            .find(|stream| stream.parameters().medium() == Type::Video)
            .ok_or_else(|| CaptureError::NoVideoStream(uri.to_string()))?;
        let parameters = stream.parameters();
        let codec_id = parameters.id();
        log::debug!(
            "selected video stream index={} codec={}",
            stream.index(),
            codec_id.name()
        );

        let thread_count = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);
        let mut provider = FfmpegDecoderProvider {
            parameters: parameters.clone(),
            codec_id,
            decoder_name: settings.decoder_name.clone(),
            device_index: settings.device_index,
            thread_count,
        };
        let chain = candidate_chain(settings.acceleration, &available_hardware_devices());
        let negotiated = negotiate(&mut provider, &chain)?;

        let decoded_size = (negotiated.decoder.width(), negotiated.decoder.height());
        let metadata = StreamMetadata::read(&input, &stream, decoded_size);
        drop(parameters);
        drop(stream);

        let hardware = negotiated.backend.acceleration() != AccelerationType::None;
        if hardware && settings.use_opencl {
            log::debug!("OpenCL interop requested on {}", negotiated.backend);
        }

        log::info!(
            "opened {uri}: {} {}x{} @ {:.3} fps, {} frames, backend={}",
            metadata.codec,
            metadata.width,
            metadata.height,
            metadata.frames_per_second,
            metadata.total_frames(),
            negotiated.backend,
        );

        self.uri = uri.to_string();
        self.codec_id = codec_id;
        self.metadata = Some(metadata);
        self.decoder = Some(negotiated.decoder);
        self.input = Some(input);
        self.acceleration = negotiated.backend.acceleration();
        self.device_index = match (hardware, settings.device_index) {
            (false, _) => -1,
            (true, index) if index < 0 => 0,
            (true, index) => index,
        };
        self.use_opencl = hardware && settings.use_opencl;
        self.raw_mode = settings.raw_mode;
        self.open_timeout = settings.open_timeout;
        self.read_timeout = settings.read_timeout;
        Ok(())
    }

    /// Release every resource and reset the session to its closed state.
    ///
    /// Closing twice is harmless.
    pub fn close(&mut self) {
        if self.is_opened() {
            log::debug!("closing uri={}", self.uri);
        }
        self.converter.release();
        self.picture = VideoFrame::empty();
        self.transferred = VideoFrame::empty();
        self.rotated = Vec::new();
        self.decoder = None;
        self.input = None;
        self.packet = Packet::empty();
        self.filtered = Packet::empty();
        self.filter = None;
        self.interrupt.disarm();

        self.uri.clear();
        self.metadata = None;
        self.codec_id = Id::None;
        self.frame_number = 0;
        self.first_frame_number = None;
        self.picture_pts = None;
        self.has_picture = false;
        self.draining = false;
        self.raw_mode = false;
        self.raw_mode_initialized = false;
        self.acceleration = AccelerationType::None;
        self.device_index = -1;
        self.use_opencl = false;
        self.open_timeout = DEFAULT_TIMEOUT;
        self.read_timeout = DEFAULT_TIMEOUT;
        self.rotation_auto = true;
    }

    pub fn is_opened(&self) -> bool {
        self.input.is_some() && self.decoder.is_some()
    }

    /// Metadata of the selected video stream, `None` when closed.
    pub fn metadata(&self) -> Option<&StreamMetadata> {
        self.metadata.as_ref()
    }

    pub fn is_raw_mode(&self) -> bool {
        self.raw_mode
    }

    /// Advance by one decoded frame, or by one packet in raw mode.
    ///
    /// Returns `false` at the end of the stream, after a read timeout, or
    /// when too many consecutive packets were unusable.
    pub fn grab_frame(&mut self) -> bool {
        let Some(declared_frames) = self.metadata.as_ref().map(|meta| meta.declared_frames) else {
            return false;
        };
        if declared_frames > 0 && self.frame_number > declared_frames {
            return false;
        }

        self.picture_pts = None;
        self.interrupt.arm(self.read_timeout);
        let valid = match self.next_unit() {
            PumpStep::Decoded => true,
            PumpStep::RawPacket => self.process_raw_packet(),
            PumpStep::Failed => false,
        };
        self.interrupt.disarm();

        self.has_picture = valid;
        if valid {
            self.frame_number += 1;
            if !self.raw_mode && self.first_frame_number.is_none() {
                let timestamp = self.picture_pts.unwrap_or(self.start_time());
                self.first_frame_number = Some(self.timestamp_to_frame_number(timestamp));
            }
        }
        valid
    }

    fn next_unit(&mut self) -> PumpStep {
        let Self {
            input,
            decoder,
            packet,
            picture,
            interrupt,
            metadata,
            draining,
            raw_mode,
            picture_pts,
            ..
        } = self;
        let (Some(input), Some(decoder), Some(metadata)) =
            (input.as_mut(), decoder.as_mut(), metadata.as_ref())
        else {
            return PumpStep::Failed;
        };

        if !*raw_mode && decoder.receive_frame(picture).is_ok() {
            *picture_pts = decoded_timestamp(picture);
            return PumpStep::Decoded;
        }

        let mut skipped = 0usize;
        let mut skip = |reason: &dyn std::fmt::Display| {
            skipped += 1;
            log::trace!("skipping packet ({skipped}): {reason}");
            skipped <= MAX_SKIPPED_PACKETS
        };

        loop {
            *packet = Packet::empty();
            if interrupt.timed_out() {
                log::warn!("read timed out");
                return PumpStep::Failed;
            }

            match packet.read(input) {
                Ok(()) => {}
                Err(FfmpegError::Eof) => {
                    if *raw_mode || *draining {
                        return PumpStep::Failed;
                    }
                    *draining = true;
                    if decoder.send_eof().is_err() {
                        return PumpStep::Failed;
                    }
                    return match decoder.receive_frame(picture) {
                        Ok(()) => {
                            *picture_pts = decoded_timestamp(picture);
                            PumpStep::Decoded
                        }
                        Err(_) => PumpStep::Failed,
                    };
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => continue,
                Err(error) => {
                    if interrupt.timed_out() {
                        log::warn!("read timed out");
                        return PumpStep::Failed;
                    }
                    if !skip(&error) {
                        return PumpStep::Failed;
                    }
                    continue;
                }
            }

            if packet.stream() != metadata.index {
                if !skip(&format_args!("stream {}", packet.stream())) {
                    return PumpStep::Failed;
                }
                continue;
            }

            if *raw_mode {
                *picture_pts = picture_timestamp(packet.pts(), packet.dts());
                return PumpStep::RawPacket;
            }

            if let Err(error) = decoder.send_packet(&*packet) {
                if !skip(&error) {
                    return PumpStep::Failed;
                }
                continue;
            }

            match decoder.receive_frame(picture) {
                Ok(()) => {
                    *picture_pts = decoded_timestamp(picture);
                    return PumpStep::Decoded;
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => continue,
                Err(FfmpegError::Eof) => return PumpStep::Failed,
                Err(error) => {
                    if !skip(&error) {
                        return PumpStep::Failed;
                    }
                }
            }
        }
    }

    /// Prepare the current packet for raw delivery.
    ///
    /// The first packet decides whether the stream needs Annex B rewriting;
    /// the filter is created at most once per session.
    fn process_raw_packet(&mut self) -> bool {
        let Some(data) = self.packet.data() else {
            return false;
        };

        if !self.raw_mode_initialized {
            self.raw_mode_initialized = true;
            if let Some(name) = annexb_filter_for(self.codec_id, data) {
                let stream = self
                    .metadata
                    .as_ref()
                    .and_then(|meta| self.input.as_ref()?.stream(meta.index));
                let Some(stream) = stream else {
                    return false;
                };
                match BitstreamFilter::new(name, &stream.parameters(), stream.time_base()) {
                    Ok(filter) => self.filter = Some(filter),
                    Err(error) => {
                        log::warn!("raw passthrough disabled: {error}");
                        return false;
                    }
                }
            }
        }

        match self.filter.as_mut() {
            None => true,
            Some(filter) => match filter.filter(&self.packet, &mut self.filtered) {
                Ok(produced) => produced,
                Err(error) => {
                    log::warn!("{} failed: {error}", filter.name());
                    false
                }
            },
        }
    }

    /// The last grabbed unit, converted to `format`.
    ///
    /// In raw mode the packet bytes are returned as a single row. Returns
    /// `None` before the first successful grab, after a failed grab, or when
    /// the picture cannot be transferred or converted.
    pub fn retrieve_frame(&mut self, format: PixelFormat) -> Option<Frame<'_>> {
        if !self.has_picture || !self.is_opened() {
            return None;
        }

        if self.raw_mode {
            let packet = if self.filter.is_some() {
                &self.filtered
            } else {
                &self.packet
            };
            return packet.data().map(Frame::raw);
        }

        let coded = self.coded_size();
        let rotation = self.applied_rotation();

        if is_hardware_frame(&self.picture) {
            if let Err(error) = transfer_hardware_frame(&self.picture, &mut self.transferred) {
                log::warn!("{error}");
                return None;
            }
        }
        let source = if is_hardware_frame(&self.picture) {
            &self.transferred
        } else {
            &self.picture
        };
        if !has_pixels(source) {
            return None;
        }

        let key = ConversionKey::for_frame(source, coded, format);
        let converted = match self.converter.convert(source, key) {
            Ok(converted) => converted,
            Err(error) => {
                log::warn!("{error}");
                return None;
            }
        };

        if rotation == 0 {
            return Some(Frame::pixels(
                converted.data,
                converted.width,
                converted.height,
                converted.stride,
                format,
            ));
        }

        let channels = format.channels() as usize;
        let (rotated, width, height) = rotate_packed(
            converted.data,
            converted.width as usize,
            converted.height as usize,
            converted.stride,
            channels,
            rotation,
        );
        self.rotated = rotated;
        Some(Frame::pixels(
            &self.rotated,
            width as u32,
            height as u32,
            width * channels,
            format,
        ))
    }

    /// Grab and retrieve in one call.
    pub fn read(&mut self, format: PixelFormat) -> Option<Frame<'_>> {
        if self.grab_frame() {
            self.retrieve_frame(format)
        } else {
            None
        }
    }

    /// Position the session so the next grab returns frame `frame`.
    ///
    /// Requests are clamped to `[0, frame count]`. Seeking never fails; a
    /// seek that could not reach the exact frame says so in its report.
    pub fn seek_to_frame(&mut self, frame: i64) -> SeekReport {
        let report = seek_to_frame(self, frame);
        log::debug!("seek {report:?}");
        report
    }

    /// Position the session at the frame nearest to `seconds`.
    pub fn seek_to_seconds(&mut self, seconds: f64) -> SeekReport {
        let fps = self.frames_per_second();
        self.seek_to_frame(seconds_to_frame(seconds, fps))
    }

    /// Switch to raw packet delivery. Raw mode cannot be turned off again.
    fn enable_raw_mode(&mut self) -> bool {
        if !self.raw_mode {
            if self.frame_number != 0 {
                log::warn!(
                    "raw mode enabled after {} frames were already decoded",
                    self.frame_number
                );
            }
            self.raw_mode = true;
        }
        true
    }

    /// Current value of `property`, `0.0` when closed.
    pub fn property(&self, property: PropertyId) -> f64 {
        let Some(metadata) = self.metadata.as_ref() else {
            return 0.0;
        };
        let swapped = self.rotation_auto && metadata.rotation % 180 != 0;

        match property {
            PropertyId::PosMsec => self
                .picture_pts
                .map(|pts| timestamp_to_seconds(pts, metadata.start_time, metadata.time_base) * 1000.0)
                .unwrap_or(0.0),
            PropertyId::PosFrames => self.frame_number as f64,
            PropertyId::PosAviRatio => {
                let total = metadata.total_frames();
                if total > 0 {
                    (self.frame_number as f64 / total as f64).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            }
            PropertyId::FrameWidth if swapped => f64::from(metadata.height),
            PropertyId::FrameWidth => f64::from(metadata.width),
            PropertyId::FrameHeight if swapped => f64::from(metadata.width),
            PropertyId::FrameHeight => f64::from(metadata.height),
            PropertyId::Fps => metadata.frames_per_second,
            PropertyId::Fourcc if metadata.codec_tag != 0 => f64::from(metadata.codec_tag),
            PropertyId::Fourcc => fourcc_from_name(&metadata.codec)
                .map_or(f64::from(metadata.codec_tag), f64::from),
            PropertyId::FrameCount => metadata.total_frames() as f64,
            PropertyId::Format if self.raw_mode => -1.0,
            PropertyId::Format => 0.0,
            PropertyId::SarNum => f64::from(metadata.sample_aspect_ratio.0),
            PropertyId::SarDen => f64::from(metadata.sample_aspect_ratio.1),
            PropertyId::Backend => FFMPEG_BACKEND_ID,
            PropertyId::CodecPixelFormat => self.codec_pixel_format(),
            PropertyId::Bitrate => metadata.bit_rate_kbps,
            PropertyId::OrientationMeta => f64::from(metadata.rotation),
            PropertyId::OrientationAuto => f64::from(u8::from(self.rotation_auto)),
            PropertyId::HwAcceleration => f64::from(self.acceleration.code()),
            PropertyId::HwDevice => f64::from(self.device_index),
            PropertyId::HwAccelerationUseOpencl => f64::from(u8::from(self.use_opencl)),
            PropertyId::OpenTimeoutMsec => self.open_timeout.as_millis() as f64,
            PropertyId::ReadTimeoutMsec => self.read_timeout.as_millis() as f64,
            PropertyId::StreamOpenTimeUsec => {
                metadata.start_time_realtime.map_or(0.0, |usec| usec as f64)
            }
            PropertyId::VideoTotalChannels if self.raw_mode => 1.0,
            PropertyId::VideoTotalChannels => 3.0,
            PropertyId::VideoStream => metadata.index as f64,
        }
    }

    /// [`property`](Self::property) by numeric id; unknown ids read as `0.0`.
    pub fn property_by_id(&self, id: i32) -> f64 {
        PropertyId::from_id(id).map_or(0.0, |property| self.property(property))
    }

    /// Change a property. Returns `false` when the property is read-only,
    /// the value is not accepted, or the session is closed.
    ///
    /// Positional properties seek; [`PropertyId::Format`] set to `-1`
    /// switches to raw mode; [`PropertyId::OrientationAuto`] toggles
    /// auto-rotation.
    pub fn set_property(&mut self, property: PropertyId, value: f64) -> bool {
        if !self.is_opened() {
            return false;
        }

        match property {
            PropertyId::PosFrames => {
                self.seek_to_frame(value as i64);
                true
            }
            PropertyId::PosMsec => {
                self.seek_to_seconds(value / 1000.0);
                true
            }
            PropertyId::PosAviRatio => {
                let total = self.metadata.as_ref().map_or(0, StreamMetadata::total_frames);
                self.seek_to_frame((value * total as f64 + 0.5).floor() as i64);
                true
            }
            PropertyId::Format if value == -1.0 => self.enable_raw_mode(),
            PropertyId::Format => false,
            PropertyId::OrientationAuto => {
                self.rotation_auto = value != 0.0;
                true
            }
            _ => false,
        }
    }

    /// [`set_property`](Self::set_property) by numeric id.
    pub fn set_property_by_id(&mut self, id: i32, value: f64) -> bool {
        PropertyId::from_id(id).is_some_and(|property| self.set_property(property, value))
    }

    fn start_time(&self) -> i64 {
        self.metadata.as_ref().map_or(0, |meta| meta.start_time)
    }

    fn frames_per_second(&self) -> f64 {
        self.metadata.as_ref().map_or(0.0, |meta| meta.frames_per_second)
    }

    fn timestamp_to_frame_number(&self, timestamp: i64) -> i64 {
        let Some(metadata) = self.metadata.as_ref() else {
            return 0;
        };
        let seconds = timestamp_to_seconds(timestamp, metadata.start_time, metadata.time_base);
        seconds_to_frame_number(seconds, metadata.frames_per_second)
    }

    fn applied_rotation(&self) -> i32 {
        match self.metadata.as_ref() {
            Some(metadata) if self.rotation_auto => metadata.rotation,
            _ => 0,
        }
    }

    fn coded_size(&self) -> (u32, u32) {
        let Some(decoder) = self.decoder.as_ref() else {
            return (0, 0);
        };
        let (width, height) = unsafe {
            let raw = decoder.as_ptr();
            ((*raw).coded_width, (*raw).coded_height)
        };
        (
            u32::try_from(width).unwrap_or(0),
            u32::try_from(height).unwrap_or(0),
        )
    }

    fn codec_pixel_format(&self) -> f64 {
        let Some(format) = self.decoder.as_ref().map(|decoder| decoder.format()) else {
            return -1.0;
        };
        if format == Pixel::None {
            return -1.0;
        }
        let tag = unsafe { ffmpeg_sys_next::avcodec_pix_fmt_to_codec_tag(AVPixelFormat::from(format)) };
        if tag == 0 { -1.0 } else { f64::from(tag) }
    }
}

impl SeekCursor for CaptureSession {
    fn total_frames(&self) -> i64 {
        self.metadata.as_ref().map_or(0, StreamMetadata::total_frames)
    }

    fn has_baseline(&self) -> bool {
        self.first_frame_number.is_some()
    }

    fn grab(&mut self) -> bool {
        self.grab_frame()
    }

    fn seek_keyframe(&mut self, frame: i64) {
        let total = SeekCursor::total_frames(self);
        let (Some(metadata), Some(input)) = (self.metadata.as_ref(), self.input.as_mut()) else {
            return;
        };
        let timestamp = frame_number_to_timestamp(
            frame,
            metadata.frames_per_second,
            metadata.time_base,
            metadata.start_time,
        );

        if total > 1 {
            self.interrupt.arm(self.read_timeout);
            let result = unsafe {
                ffmpeg_sys_next::av_seek_frame(
                    input.as_mut_ptr(),
                    metadata.index as c_int,
                    timestamp,
                    AVSEEK_FLAG_BACKWARD as c_int,
                )
            };
            self.interrupt.disarm();
            if result < 0 {
                log::debug!(
                    "keyframe seek to timestamp={timestamp} failed: {}",
                    FfmpegError::from(result)
                );
            }
        }

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
        self.draining = false;
    }

    fn decoded_index(&self) -> Option<i64> {
        let pts = self.picture_pts?;
        Some(self.timestamp_to_frame_number(pts) - self.first_frame_number.unwrap_or(0))
    }

    fn frame_number(&self) -> i64 {
        self.frame_number
    }

    fn set_frame_number(&mut self, frame_number: i64) {
        self.frame_number = frame_number;
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Presentation timestamp of a decoded picture, falling back to the
/// decoding timestamp of the packet it came from.
fn decoded_timestamp(picture: &VideoFrame) -> Option<i64> {
    let dts = unsafe { (*picture.as_ptr()).pkt_dts };
    picture_timestamp(picture.pts(), (dts != AV_NOPTS_VALUE).then_some(dts))
}

/// Allocate a demuxer with the interrupt callback attached, open `uri` and
/// read its stream information.
fn open_input(
    uri: &str,
    input_format: Option<&str>,
    interrupt: &InterruptState,
) -> Result<Input, CaptureError> {
    let open_error = |reason: String| CaptureError::Open {
        uri: uri.to_string(),
        reason,
    };

    let location = CString::new(uri).map_err(|error| open_error(error.to_string()))?;
    let format_name = input_format
        .map(CString::new)
        .transpose()
        .map_err(|error| open_error(error.to_string()))?;

    let mut dictionary = Dictionary::new();
    if uri.starts_with("rtsp://") || uri.starts_with("rtsps://") {
        dictionary.set("rtsp_transport", "tcp");
    }

    unsafe {
        let format = match &format_name {
            Some(name) => {
                let format = ffmpeg_sys_next::av_find_input_format(name.as_ptr());
                if format.is_null() {
                    return Err(open_error(format!("unknown input format {name:?}")));
                }
                format
            }
            None => ptr::null(),
        };

        let mut context = ffmpeg_sys_next::avformat_alloc_context();
        if context.is_null() {
            return Err(open_error("could not allocate demuxer".to_string()));
        }
        (*context).interrupt_callback = AVIOInterruptCB {
            callback: Some(interrupt_callback),
            opaque: interrupt.as_opaque(),
        };

        let mut raw_options = dictionary.disown();
        // Frees the context on failure.
        let result =
            ffmpeg_sys_next::avformat_open_input(&mut context, location.as_ptr(), format, &mut raw_options);
        drop(Dictionary::own(raw_options));
        if result < 0 {
            return Err(open_error(FfmpegError::from(result).to_string()));
        }

        let mut input = Input::wrap(context);
        let result = ffmpeg_sys_next::avformat_find_stream_info(input.as_mut_ptr(), ptr::null_mut());
        if result < 0 {
            return Err(open_error(format!(
                "could not read stream information: {}",
                FfmpegError::from(result)
            )));
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn session_can_move_between_threads() {
        assert_send::<CaptureSession>();
        assert_send::<BitstreamFilter>();
        assert_send::<PixelConverter>();
    }

    #[test]
    fn closed_session_reports_nothing() {
        let session = CaptureSession::closed();
        assert!(!session.is_opened());
        assert_eq!(session.property(PropertyId::FrameCount), 0.0);
    }
}
