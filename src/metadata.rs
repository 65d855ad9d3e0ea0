//! Stream metadata captured when a session opens.
//!
//! [`StreamMetadata`] is read once from the demuxer and the selected video
//! stream and cached for the lifetime of the session. It feeds the property
//! table and the timestamp arithmetic of the frame pump and seek engine.

use std::slice;

use ffmpeg_next::{Stream, format::context::Input};
use ffmpeg_sys_next::{AV_NOPTS_VALUE, AVPacketSideDataType};

use crate::utilities::{
    DURATION_EPSILON, TIME_BASE_SECONDS, display_matrix_rotation, normalize_rotation,
    rational_to_f64, total_frames,
};

/// Facts about the selected video stream.
#[derive(Debug, Clone, Default, PartialEq)]
#[must_use]
pub struct StreamMetadata {
    /// Index of the stream inside the container.
    pub index: usize,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
    /// Container codec tag, `0` when the container has none.
    pub codec_tag: u32,
    /// Declared frame width in pixels.
    pub width: u32,
    /// Declared frame height in pixels.
    pub height: u32,
    pub frames_per_second: f64,
    /// Frame count declared by the container, `0` when unknown.
    pub declared_frames: i64,
    pub duration_seconds: f64,
    /// Seconds per stream timestamp tick.
    pub time_base: f64,
    /// First timestamp of the stream in time-base units.
    pub start_time: i64,
    /// Container bit rate in kbit/s.
    pub bit_rate_kbps: f64,
    /// Clockwise rotation in degrees: 0, 90, 180 or 270.
    pub rotation: i32,
    /// Sample aspect ratio as `(numerator, denominator)`.
    pub sample_aspect_ratio: (i32, i32),
    /// Wall-clock time the stream started, in microseconds since the epoch.
    pub start_time_realtime: Option<i64>,
}

impl StreamMetadata {
    /// Frame count, estimated from duration and rate when not declared.
    pub fn total_frames(&self) -> i64 {
        total_frames(
            self.declared_frames,
            self.duration_seconds,
            self.frames_per_second,
        )
    }

    /// Read metadata for `stream`. `decoded_size` is used when the stream
    /// does not declare its dimensions.
    pub(crate) fn read(input: &Input, stream: &Stream, decoded_size: (u32, u32)) -> Self {
        let parameters = stream.parameters();
        let (declared_width, declared_height, codec_tag) = unsafe {
            let raw = parameters.as_ptr();
            ((*raw).width, (*raw).height, (*raw).codec_tag)
        };
        let width = u32::try_from(declared_width)
            .ok()
            .filter(|width| *width > 0)
            .unwrap_or(decoded_size.0);
        let height = u32::try_from(declared_height)
            .ok()
            .filter(|height| *height > 0)
            .unwrap_or(decoded_size.1);

        let mut frames_per_second = rational_to_f64(stream.avg_frame_rate());
        if frames_per_second <= 0.0 {
            frames_per_second = rational_to_f64(stream.rate());
        }

        let time_base = rational_to_f64(stream.time_base());
        let start_time = match stream.start_time() {
            AV_NOPTS_VALUE => 0,
            start => start,
        };

        let mut duration_seconds = input.duration() as f64 / TIME_BASE_SECONDS;
        if duration_seconds < DURATION_EPSILON {
            duration_seconds = stream.duration().max(0) as f64 * time_base;
        }

        let (bit_rate, start_time_realtime) = unsafe {
            let raw = input.as_ptr();
            ((*raw).bit_rate, (*raw).start_time_realtime)
        };

        let sample_aspect_ratio = unsafe {
            let mut ratio = (*stream.as_ptr()).sample_aspect_ratio;
            if ratio.num == 0 {
                ratio = (*parameters.as_ptr()).sample_aspect_ratio;
            }
            (ratio.num, ratio.den)
        };

        Self {
            index: stream.index(),
            codec: parameters.id().name().to_string(),
            codec_tag,
            width,
            height,
            frames_per_second,
            declared_frames: stream.frames().max(0),
            duration_seconds: duration_seconds.max(0.0),
            time_base,
            start_time,
            bit_rate_kbps: bit_rate.max(0) as f64 / 1000.0,
            rotation: read_rotation(stream),
            sample_aspect_ratio,
            start_time_realtime: (start_time_realtime != AV_NOPTS_VALUE
                && start_time_realtime > 0)
                .then_some(start_time_realtime),
        }
    }
}

/// Rotation from the `rotate` tag, or from the display matrix when the
/// stream has no tag.
fn read_rotation(stream: &Stream) -> i32 {
    if let Some(tag) = stream.metadata().get("rotate") {
        if let Ok(angle) = tag.trim().parse::<f64>() {
            return normalize_rotation(angle.round() as i32);
        }
    }

    let parameters = stream.parameters();
    unsafe {
        let raw = parameters.as_ptr();
        let count = usize::try_from((*raw).nb_coded_side_data).unwrap_or(0);
        if (*raw).coded_side_data.is_null() || count == 0 {
            return 0;
        }
        slice::from_raw_parts((*raw).coded_side_data, count)
            .iter()
            .find(|side_data| {
                side_data.type_ == AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX
                    && side_data.size >= 9 * size_of::<i32>()
                    && !side_data.data.is_null()
            })
            .and_then(|side_data| {
                let matrix = side_data.data.cast::<[i32; 9]>().read_unaligned();
                display_matrix_rotation(&matrix)
            })
            .unwrap_or(0)
    }
}
