//! Pixel-format conversion of decoded frames.
//!
//! [`PixelConverter`] owns one software-scaler context and one destination
//! frame. Both are rebuilt only when the source dimensions, the coded
//! dimensions, the source pixel format or the requested output layout
//! change, so steady-state retrieval allocates nothing.

use std::os::raw::c_int;

use ffmpeg_next::{
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags},
};

use crate::error::CaptureError;

/// Interleaved output layout for decoded frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 8-bit red, green, blue.
    Rgb24,
    /// 8-bit blue, green, red.
    #[default]
    Bgr24,
}

impl PixelFormat {
    pub(crate) fn to_ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb24 => Pixel::RGB24,
            PixelFormat::Bgr24 => Pixel::BGR24,
        }
    }

    /// Bytes per pixel.
    pub fn channels(self) -> u32 {
        3
    }
}

/// Everything the cached scaler depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConversionKey {
    pub source_width: u32,
    pub source_height: u32,
    pub coded_width: u32,
    pub coded_height: u32,
    pub source_format: Pixel,
    pub target: PixelFormat,
}

impl ConversionKey {
    /// Build a key for `frame`. The coded size is at least the frame size.
    pub fn for_frame(frame: &VideoFrame, coded: (u32, u32), target: PixelFormat) -> Self {
        Self {
            source_width: frame.width(),
            source_height: frame.height(),
            coded_width: coded.0.max(frame.width()),
            coded_height: coded.1.max(frame.height()),
            source_format: frame.format(),
            target,
        }
    }
}

/// Borrowed view of the last converted picture.
pub(crate) struct Converted<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub stride: usize,
}

/// Cached converter from decoder output to packed 24-bit pixels.
#[derive(Default)]
pub(crate) struct PixelConverter {
    key: Option<ConversionKey>,
    context: Option<ScalingContext>,
    output: Option<VideoFrame>,
}

// The scaler is only reached through `&mut self`.
unsafe impl Send for PixelConverter {}

impl PixelConverter {
    /// Whether converting with `key` would rebuild the scaler.
    pub fn needs_rebuild(&self, key: &ConversionKey) -> bool {
        self.key.as_ref() != Some(key)
    }

    /// Convert `frame` and return a view of the result.
    pub fn convert(
        &mut self,
        frame: &VideoFrame,
        key: ConversionKey,
    ) -> Result<Converted<'_>, CaptureError> {
        if key.source_width == 0 || key.source_height == 0 {
            return Err(CaptureError::Conversion("frame has no dimensions".to_string()));
        }

        if self.needs_rebuild(&key) {
            self.rebuild(key)?;
        }

        let (Some(context), Some(output)) = (self.context.as_mut(), self.output.as_mut()) else {
            return Err(CaptureError::Conversion("converter is not initialized".to_string()));
        };

        let rows = unsafe {
            let source = frame.as_ptr();
            let destination = output.as_mut_ptr();
            ffmpeg_sys_next::sws_scale(
                context.as_mut_ptr(),
                (*source).data.as_ptr() as *const *const u8,
                (*source).linesize.as_ptr(),
                0,
                key.source_height as c_int,
                (*destination).data.as_ptr(),
                (*destination).linesize.as_ptr(),
            )
        };
        if rows <= 0 {
            return Err(CaptureError::Conversion(format!("sws_scale returned {rows}")));
        }

        let output: &VideoFrame = output;
        let stride = output.stride(0);
        let data = output.data(0);
        let visible = stride * key.source_height as usize;
        Ok(Converted {
            data: &data[..visible.min(data.len())],
            width: key.source_width,
            height: key.source_height,
            stride,
        })
    }

    fn rebuild(&mut self, key: ConversionKey) -> Result<(), CaptureError> {
        log::debug!(
            "rebuilding pixel converter source={}x{} coded={}x{} format={:?} target={:?}",
            key.source_width,
            key.source_height,
            key.coded_width,
            key.coded_height,
            key.source_format,
            key.target,
        );

        self.release();
        let context = ScalingContext::get(
            key.source_format,
            key.source_width,
            key.source_height,
            key.target.to_ffmpeg_pixel(),
            key.source_width,
            key.source_height,
            Flags::BICUBIC,
        )
        .map_err(|error| CaptureError::Conversion(error.to_string()))?;

        let output = VideoFrame::new(key.target.to_ffmpeg_pixel(), key.coded_width, key.coded_height);
        if unsafe { (*output.as_ptr()).data[0].is_null() } {
            return Err(CaptureError::Conversion(format!(
                "could not allocate {}x{} output",
                key.coded_width, key.coded_height
            )));
        }

        self.context = Some(context);
        self.output = Some(output);
        self.key = Some(key);
        Ok(())
    }

    /// Drop the scaler and the output buffer.
    pub fn release(&mut self) {
        self.context = None;
        self.output = None;
        self.key = None;
    }
}

/// Whether a frame carries pixel data in system memory.
pub(crate) fn has_pixels(frame: &VideoFrame) -> bool {
    unsafe { !(*frame.as_ptr()).data[0].is_null() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(format: Pixel, width: u32, height: u32) -> VideoFrame {
        let mut frame = VideoFrame::new(format, width, height);
        for plane in 0..frame.planes() {
            for (index, byte) in frame.data_mut(plane).iter_mut().enumerate() {
                *byte = (index % 251) as u8;
            }
        }
        frame
    }

    #[test]
    fn scaler_is_reused_for_identical_keys() {
        let frame = gradient(Pixel::YUV420P, 64, 48);
        let mut converter = PixelConverter::default();
        let key = ConversionKey::for_frame(&frame, (64, 48), PixelFormat::Rgb24);

        assert!(converter.needs_rebuild(&key));
        let converted = converter.convert(&frame, key).unwrap();
        assert_eq!((converted.width, converted.height), (64, 48));
        assert!(converted.stride >= 64 * 3);
        assert!(!converter.needs_rebuild(&key));

        let bgr = ConversionKey::for_frame(&frame, (64, 48), PixelFormat::Bgr24);
        assert!(converter.needs_rebuild(&bgr));
    }

    #[test]
    fn coded_size_pads_the_output_buffer() {
        let frame = gradient(Pixel::YUV420P, 60, 34);
        let mut converter = PixelConverter::default();
        let key = ConversionKey::for_frame(&frame, (64, 48), PixelFormat::Bgr24);
        assert_eq!((key.coded_width, key.coded_height), (64, 48));

        let converted = converter.convert(&frame, key).unwrap();
        assert_eq!((converted.width, converted.height), (60, 34));
        assert_eq!(converted.data.len(), converted.stride * 34);
    }

    #[test]
    fn rgb_and_bgr_are_mirrored() {
        let frame = gradient(Pixel::YUV420P, 32, 32);
        let mut converter = PixelConverter::default();

        let rgb = converter
            .convert(&frame, ConversionKey::for_frame(&frame, (32, 32), PixelFormat::Rgb24))
            .unwrap()
            .data[..3]
            .to_vec();
        let bgr = converter
            .convert(&frame, ConversionKey::for_frame(&frame, (32, 32), PixelFormat::Bgr24))
            .unwrap()
            .data[..3]
            .to_vec();
        assert_eq!(rgb, vec![bgr[2], bgr[1], bgr[0]]);
    }
}
