//! Raw stream passthrough.
//!
//! In raw mode the session hands out compressed packets instead of decoded
//! pictures. H.264 and HEVC in MP4-style containers store length-prefixed
//! NAL units; those packets are rewritten to Annex B start-code form through
//! FFmpeg's `*_mp4toannexb` bitstream filters so the output is a playable
//! elementary stream.

use std::{ffi::CString, ptr};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::{Id, Parameters},
    util::error::EAGAIN,
};
use ffmpeg_sys_next::AVBSFContext;

use crate::error::CaptureError;

/// Packets shorter than this are never inspected for start codes.
const MIN_INSPECTED_PACKET: usize = 5;

fn has_start_code(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 0, 1]) || data.starts_with(&[0, 0, 1])
}

/// Name of the bitstream filter that must rewrite packets of `codec`, judged
/// from the first packet of the stream. `None` when packets pass through as
/// they are.
pub(crate) fn annexb_filter_for(codec: Id, first_packet: &[u8]) -> Option<&'static str> {
    let name = match codec {
        Id::H264 => "h264_mp4toannexb",
        Id::HEVC => "hevc_mp4toannexb",
        _ => return None,
    };
    if first_packet.len() < MIN_INSPECTED_PACKET || has_start_code(first_packet) {
        None
    } else {
        Some(name)
    }
}

/// An initialized FFmpeg bitstream filter.
pub(crate) struct BitstreamFilter {
    context: *mut AVBSFContext,
    name: &'static str,
}

impl BitstreamFilter {
    /// Create and initialize filter `name` for a stream with `parameters`.
    pub fn new(
        name: &'static str,
        parameters: &Parameters,
        time_base: Rational,
    ) -> Result<Self, CaptureError> {
        let filter_name =
            CString::new(name).map_err(|error| CaptureError::FfmpegError(error.to_string()))?;
        let definition = unsafe { ffmpeg_sys_next::av_bsf_get_by_name(filter_name.as_ptr()) };
        if definition.is_null() {
            return Err(CaptureError::FfmpegError(format!(
                "bitstream filter {name} is not available"
            )));
        }

        let mut context: *mut AVBSFContext = ptr::null_mut();
        let result = unsafe { ffmpeg_sys_next::av_bsf_alloc(definition, &mut context) };
        if result < 0 {
            return Err(CaptureError::from(FfmpegError::from(result)));
        }
        let filter = Self { context, name };

        let result = unsafe {
            ffmpeg_sys_next::avcodec_parameters_copy((*context).par_in, parameters.as_ptr())
        };
        if result < 0 {
            return Err(CaptureError::from(FfmpegError::from(result)));
        }

        unsafe {
            (*context).time_base_in = time_base.into();
        }
        let result = unsafe { ffmpeg_sys_next::av_bsf_init(context) };
        if result < 0 {
            return Err(CaptureError::from(FfmpegError::from(result)));
        }

        log::debug!("bitstream filter {name} initialized");
        Ok(filter)
    }

    /// Run one packet through the filter into `output`.
    ///
    /// Returns `false` when the filter needs more input before producing a
    /// packet.
    pub fn filter(&mut self, packet: &Packet, output: &mut Packet) -> Result<bool, CaptureError> {
        let mut input = packet.clone();
        let result =
            unsafe { ffmpeg_sys_next::av_bsf_send_packet(self.context, input.as_mut_ptr()) };
        if result < 0 {
            return Err(CaptureError::FfmpegError(format!(
                "{}: {}",
                self.name,
                FfmpegError::from(result)
            )));
        }

        let result = unsafe {
            ffmpeg_sys_next::av_packet_unref(output.as_mut_ptr());
            ffmpeg_sys_next::av_bsf_receive_packet(self.context, output.as_mut_ptr())
        };
        match FfmpegError::from(result) {
            _ if result >= 0 => Ok(true),
            FfmpegError::Other { errno } if errno == EAGAIN => Ok(false),
            error => Err(CaptureError::FfmpegError(format!("{}: {error}", self.name))),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

// The context is owned exclusively and never shared between handles.
unsafe impl Send for BitstreamFilter {}

impl Drop for BitstreamFilter {
    fn drop(&mut self) {
        unsafe { ffmpeg_sys_next::av_bsf_free(&mut self.context) };
    }
}
