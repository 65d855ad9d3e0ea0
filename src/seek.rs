//! Frame-accurate seeking on top of keyframe-granular container seeks.
//!
//! Containers can only reposition to a keyframe at or before a timestamp.
//! [`seek_to_frame`] lands on a keyframe somewhat before the target, decodes
//! one frame to learn where it actually landed, and decodes forward until
//! the frame just before the target. When the landing point is already past
//! the target (an unreliable index or timestamps), the search window before
//! the target is widened and the keyframe seek repeated. The window doubles
//! while small and then grows by half, so the number of container seeks is
//! logarithmic in the distance to the target.
//!
//! The algorithm only needs a [`SeekCursor`]; the session implements it on
//! top of FFmpeg.

/// Window used for the first keyframe seek.
pub const INITIAL_SEARCH_WINDOW: i64 = 16;

/// The search gives up widening once the window reaches this size.
pub const SEARCH_WINDOW_CEILING: i64 = (i32::MAX / 4) as i64;

/// Frame-level access the seek algorithm drives.
pub trait SeekCursor {
    /// Total frame count of the stream, `0` when unknown.
    fn total_frames(&self) -> i64;

    /// Whether the index of the first decodable frame is known.
    fn has_baseline(&self) -> bool;

    /// Decode one more frame, advancing [`frame_number`](Self::frame_number)
    /// by one on success.
    fn grab(&mut self) -> bool;

    /// Reposition at the last keyframe at or before `frame` and flush any
    /// decoder state.
    fn seek_keyframe(&mut self, frame: i64);

    /// Index of the last decoded frame relative to the first frame of the
    /// stream, `None` when the frame carried no timestamp.
    fn decoded_index(&self) -> Option<i64>;

    /// Index of the next frame to be grabbed.
    fn frame_number(&self) -> i64;

    fn set_frame_number(&mut self, frame_number: i64);
}

/// How a seek ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The next grab returns the target frame.
    Converged,
    /// Every keyframe seek landed past the target; the position is where
    /// the last attempt landed.
    Overshoot,
    /// The stream ended before the target was reached.
    EndOfStream,
}

/// Summary of a completed seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekReport {
    /// Requested frame after clamping to the stream length.
    pub target: i64,
    /// Index of the next frame to be grabbed.
    pub position: i64,
    /// Number of container-level keyframe seeks performed.
    pub keyframe_seeks: u32,
    pub outcome: SeekOutcome,
}

/// Next search window after a failed attempt.
pub fn grow_window(window: i64) -> i64 {
    if window < INITIAL_SEARCH_WINDOW {
        window * 2
    } else {
        window * 3 / 2
    }
}

/// Position `cursor` so that the next grab decodes frame `requested`.
///
/// Requests are clamped to `[0, total_frames]`.
pub fn seek_to_frame<C: SeekCursor + ?Sized>(cursor: &mut C, requested: i64) -> SeekReport {
    let total = cursor.total_frames().max(0);
    let target = requested.clamp(0, total);

    if !cursor.has_baseline() && total > 1 {
        cursor.grab();
    }

    let mut window = INITIAL_SEARCH_WINDOW;
    let mut keyframe_seeks = 0u32;

    let outcome = loop {
        let candidate = (target - window).max(0);
        cursor.seek_keyframe(candidate);
        keyframe_seeks += 1;

        if target == 0 {
            cursor.set_frame_number(0);
            break SeekOutcome::Converged;
        }

        let grabbed = cursor.grab();
        if target == 1 {
            cursor.set_frame_number(1);
            break if grabbed {
                SeekOutcome::Converged
            } else {
                SeekOutcome::EndOfStream
            };
        }

        let landed = if grabbed {
            cursor.decoded_index().unwrap_or(-1)
        } else {
            -1
        };
        cursor.set_frame_number(landed);

        if landed < 0 || landed > target - 1 {
            if candidate == 0 || window >= SEARCH_WINDOW_CEILING {
                log::debug!(
                    "seek did not converge target={target} landed={landed} keyframe_seeks={keyframe_seeks}"
                );
                break SeekOutcome::Overshoot;
            }
            window = grow_window(window);
            continue;
        }

        let mut reached = true;
        while cursor.frame_number() < target - 1 {
            if !cursor.grab() {
                reached = false;
                break;
            }
        }
        cursor.set_frame_number(cursor.frame_number() + 1);
        break if reached {
            SeekOutcome::Converged
        } else {
            SeekOutcome::EndOfStream
        };
    };

    SeekReport {
        target,
        position: cursor.frame_number(),
        keyframe_seeks,
        outcome,
    }
}

/// Frame index nearest to `seconds` at `frames_per_second`.
pub fn seconds_to_frame(seconds: f64, frames_per_second: f64) -> i64 {
    crate::utilities::seconds_to_frame_number(seconds, frames_per_second)
}
