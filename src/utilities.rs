//! Internal utility functions.
//!
//! Timestamp and frame-number arithmetic shared by the frame pump, the seek
//! engine and the property table, plus pixel-buffer helpers.

use ffmpeg_next::Rational;

/// Durations shorter than this are treated as unknown.
pub(crate) const DURATION_EPSILON: f64 = 0.000_025;

/// `AV_TIME_BASE` as a float.
pub(crate) const TIME_BASE_SECONDS: f64 = 1_000_000.0;

/// Convert a rational to `f64`, returning `0.0` for a zero denominator.
pub(crate) fn rational_to_f64(value: Rational) -> f64 {
    if value.denominator() == 0 {
        0.0
    } else {
        value.numerator() as f64 / value.denominator() as f64
    }
}

/// Seconds between `start_time` and `timestamp`, both in stream time base.
pub(crate) fn timestamp_to_seconds(timestamp: i64, start_time: i64, time_base: f64) -> f64 {
    (timestamp - start_time) as f64 * time_base
}

/// Round a time in seconds to the nearest frame index.
pub(crate) fn seconds_to_frame_number(seconds: f64, frames_per_second: f64) -> i64 {
    (frames_per_second * seconds + 0.5).floor() as i64
}

/// Stream timestamp at which frame `frame_number` starts.
pub(crate) fn frame_number_to_timestamp(
    frame_number: i64,
    frames_per_second: f64,
    time_base: f64,
    start_time: i64,
) -> i64 {
    if frames_per_second <= 0.0 || time_base <= 0.0 {
        return start_time;
    }
    start_time + (frame_number as f64 / frames_per_second / time_base + 0.5).floor() as i64
}

/// Container frame count, or the duration-derived estimate when the
/// container does not declare one.
pub(crate) fn total_frames(declared: i64, duration_seconds: f64, frames_per_second: f64) -> i64 {
    if declared > 0 {
        declared
    } else {
        (duration_seconds * frames_per_second + 0.5).floor().max(0.0) as i64
    }
}

/// Timestamp recorded for a decoded picture: its presentation timestamp when
/// set and non-zero, otherwise its decoding timestamp.
pub(crate) fn picture_timestamp(pts: Option<i64>, dts: Option<i64>) -> Option<i64> {
    match (pts, dts) {
        (Some(pts), _) if pts != 0 => Some(pts),
        (_, Some(dts)) => Some(dts),
        (pts, None) => pts,
    }
}

/// Pack a little-endian four-character code.
pub(crate) fn fourcc(code: [u8; 4]) -> u32 {
    u32::from_le_bytes(code)
}

/// Four-character code taken from the first four bytes of a codec name.
///
/// Names shorter than four bytes, and FFmpeg's `unknown_codec`, yield
/// `None`.
pub(crate) fn fourcc_from_name(name: &str) -> Option<u32> {
    if name == "unknown_codec" {
        return None;
    }
    let code: [u8; 4] = name.as_bytes().get(..4)?.try_into().ok()?;
    Some(fourcc(code))
}

/// Clockwise rotation in degrees encoded by a 3x3 display matrix of 16.16
/// fixed-point values, normalized to `0..360`.
pub(crate) fn display_matrix_rotation(matrix: &[i32; 9]) -> Option<i32> {
    let to_f64 = |value: i32| f64::from(value) / 65_536.0;
    let scale_x = to_f64(matrix[0]).hypot(to_f64(matrix[3]));
    let scale_y = to_f64(matrix[1]).hypot(to_f64(matrix[4]));
    if scale_x == 0.0 || scale_y == 0.0 {
        return None;
    }
    let clockwise = (to_f64(matrix[1]) / scale_y)
        .atan2(to_f64(matrix[0]) / scale_x)
        .to_degrees();
    Some(normalize_rotation(clockwise.round() as i32))
}

/// Normalize an angle in degrees to `0..360`.
pub(crate) fn normalize_rotation(angle: i32) -> i32 {
    angle.rem_euclid(360)
}

/// Copy `height` rows of `row_bytes` each out of a strided buffer.
pub(crate) fn strip_stride(data: &[u8], stride: usize, row_bytes: usize, height: usize) -> Vec<u8> {
    if stride == row_bytes {
        return data[..row_bytes * height].to_vec();
    }
    let mut buffer = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        buffer.extend_from_slice(&data[start..start + row_bytes]);
    }
    buffer
}

/// Rotate a strided interleaved image clockwise by `angle` degrees
/// (0, 90, 180 or 270) into a tightly packed buffer.
///
/// Returns the packed pixels with the rotated width and height.
pub(crate) fn rotate_packed(
    data: &[u8],
    width: usize,
    height: usize,
    stride: usize,
    channels: usize,
    angle: i32,
) -> (Vec<u8>, usize, usize) {
    let quarter_turns = normalize_rotation(angle) / 90;
    let (out_width, out_height) = if quarter_turns % 2 == 1 {
        (height, width)
    } else {
        (width, height)
    };
    let mut output = vec![0u8; out_width * out_height * channels];

    for y in 0..height {
        for x in 0..width {
            let (dx, dy) = match quarter_turns {
                1 => (height - 1 - y, x),
                2 => (width - 1 - x, height - 1 - y),
                3 => (y, width - 1 - x),
                _ => (x, y),
            };
            let source = y * stride + x * channels;
            let target = (dy * out_width + dx) * channels;
            output[target..target + channels].copy_from_slice(&data[source..source + channels]);
        }
    }

    (output, out_width, out_height)
}
