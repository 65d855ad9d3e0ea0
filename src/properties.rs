//! Named session properties.
//!
//! [`PropertyId`] lists every property a [`CaptureSession`](crate::CaptureSession)
//! answers. The numeric ids match the ones used by OpenCV's `videoio`
//! module, so code written against that numbering can pass ids through
//! [`CaptureSession::property_by_id`](crate::CaptureSession::property_by_id)
//! unchanged.

/// Backend id reported by [`PropertyId::Backend`].
pub const FFMPEG_BACKEND_ID: f64 = 1900.0;

/// A queryable or settable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyId {
    /// Position of the last grabbed frame in milliseconds.
    PosMsec,
    /// Zero-based index of the next frame to be grabbed.
    PosFrames,
    /// Relative position, `0.0` at the start and `1.0` at the end.
    PosAviRatio,
    FrameWidth,
    FrameHeight,
    Fps,
    /// Four-character code of the codec.
    Fourcc,
    FrameCount,
    /// `-1` in raw mode.
    Format,
    /// Sample aspect ratio numerator.
    SarNum,
    /// Sample aspect ratio denominator.
    SarDen,
    /// Backend id, always [`FFMPEG_BACKEND_ID`].
    Backend,
    /// Four-character code of the decoder's pixel format, `-1` if unknown.
    CodecPixelFormat,
    /// Bit rate in kbit/s.
    Bitrate,
    /// Rotation declared by the stream, in degrees.
    OrientationMeta,
    /// Whether retrieved frames are rotated by [`OrientationMeta`](Self::OrientationMeta).
    OrientationAuto,
    /// Active [`AccelerationType`](crate::AccelerationType) code.
    HwAcceleration,
    HwDevice,
    HwAccelerationUseOpencl,
    OpenTimeoutMsec,
    ReadTimeoutMsec,
    /// Wall-clock stream start in microseconds since the epoch, `0` if unknown.
    StreamOpenTimeUsec,
    VideoTotalChannels,
    /// Index of the selected video stream.
    VideoStream,
}

const TABLE: [(PropertyId, i32); 24] = [
    (PropertyId::PosMsec, 0),
    (PropertyId::PosFrames, 1),
    (PropertyId::PosAviRatio, 2),
    (PropertyId::FrameWidth, 3),
    (PropertyId::FrameHeight, 4),
    (PropertyId::Fps, 5),
    (PropertyId::Fourcc, 6),
    (PropertyId::FrameCount, 7),
    (PropertyId::Format, 8),
    (PropertyId::SarNum, 40),
    (PropertyId::SarDen, 41),
    (PropertyId::Backend, 42),
    (PropertyId::CodecPixelFormat, 46),
    (PropertyId::Bitrate, 47),
    (PropertyId::OrientationMeta, 48),
    (PropertyId::OrientationAuto, 49),
    (PropertyId::HwAcceleration, 50),
    (PropertyId::HwDevice, 51),
    (PropertyId::HwAccelerationUseOpencl, 52),
    (PropertyId::OpenTimeoutMsec, 53),
    (PropertyId::ReadTimeoutMsec, 54),
    (PropertyId::StreamOpenTimeUsec, 55),
    (PropertyId::VideoTotalChannels, 56),
    (PropertyId::VideoStream, 57),
];

impl PropertyId {
    /// Every property, in id order.
    pub fn all() -> impl Iterator<Item = PropertyId> {
        TABLE.iter().map(|(property, _)| *property)
    }

    pub fn id(self) -> i32 {
        TABLE
            .iter()
            .find(|(property, _)| *property == self)
            .map_or(-1, |(_, id)| *id)
    }

    pub fn from_id(id: i32) -> Option<Self> {
        TABLE
            .iter()
            .find(|(_, known)| *known == id)
            .map(|(property, _)| *property)
    }

    /// Snake-case name used by the command-line tool.
    pub fn name(self) -> &'static str {
        match self {
            PropertyId::PosMsec => "pos_msec",
            PropertyId::PosFrames => "pos_frames",
            PropertyId::PosAviRatio => "pos_avi_ratio",
            PropertyId::FrameWidth => "frame_width",
            PropertyId::FrameHeight => "frame_height",
            PropertyId::Fps => "fps",
            PropertyId::Fourcc => "fourcc",
            PropertyId::FrameCount => "frame_count",
            PropertyId::Format => "format",
            PropertyId::SarNum => "sar_num",
            PropertyId::SarDen => "sar_den",
            PropertyId::Backend => "backend",
            PropertyId::CodecPixelFormat => "codec_pixel_format",
            PropertyId::Bitrate => "bitrate",
            PropertyId::OrientationMeta => "orientation_meta",
            PropertyId::OrientationAuto => "orientation_auto",
            PropertyId::HwAcceleration => "hw_acceleration",
            PropertyId::HwDevice => "hw_device",
            PropertyId::HwAccelerationUseOpencl => "hw_acceleration_use_opencl",
            PropertyId::OpenTimeoutMsec => "open_timeout_msec",
            PropertyId::ReadTimeoutMsec => "read_timeout_msec",
            PropertyId::StreamOpenTimeUsec => "stream_open_time_usec",
            PropertyId::VideoTotalChannels => "video_total_channels",
            PropertyId::VideoStream => "video_stream",
        }
    }
}
