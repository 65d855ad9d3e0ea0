//! Borrowed views of retrieved frames.
//!
//! [`Frame`] borrows the session's internal buffer, so it can only live until
//! the next call that mutates the session. Use [`Frame::to_image`] or
//! [`Frame::to_packed_vec`] to keep a copy.
//!
//! # Example
//!
//! ```no_run
//! use framegrab::{CaptureOptions, CaptureSession, PixelFormat};
//!
//! let mut session = CaptureSession::open("input.mp4", &CaptureOptions::new()).unwrap();
//! if session.grab_frame() {
//!     let frame = session.retrieve_frame(PixelFormat::Rgb24).unwrap();
//!     frame.to_image().unwrap().save("first_frame.png").unwrap();
//! }
//! ```

use image::{DynamicImage, RgbImage};

use crate::{conversion::PixelFormat, error::CaptureError, utilities::strip_stride};

/// What the bytes of a [`Frame`] hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// Interleaved pixels in the given order.
    Pixels(PixelFormat),
    /// One compressed packet, as a single row of bytes.
    Raw,
}

/// A decoded picture or a raw packet, borrowed from the session.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    channels: u32,
    layout: FrameLayout,
}

impl<'a> Frame<'a> {
    pub(crate) fn pixels(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
    ) -> Self {
        Self {
            data,
            width,
            height,
            stride,
            channels: format.channels(),
            layout: FrameLayout::Pixels(format),
        }
    }

    pub(crate) fn raw(data: &'a [u8]) -> Self {
        Self {
            data,
            width: data.len() as u32,
            height: 1,
            stride: data.len(),
            channels: 1,
            layout: FrameLayout::Raw,
        }
    }

    /// Width in pixels, or the packet size in raw mode.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels, `1` in raw mode.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes between the starts of consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn is_raw(&self) -> bool {
        self.layout == FrameLayout::Raw
    }

    /// The underlying bytes, including any row padding.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// One row of pixels without padding.
    pub fn row(&self, y: u32) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        let len = self.width as usize * self.channels as usize;
        self.data.get(start..start + len)
    }

    /// Copy the bytes into a tightly packed buffer.
    pub fn to_packed_vec(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * self.channels as usize;
        strip_stride(self.data, self.stride, row_bytes, self.height as usize)
    }

    /// Copy the pixels into an RGB image.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Conversion`] for raw packets.
    pub fn to_image(&self) -> Result<DynamicImage, CaptureError> {
        let FrameLayout::Pixels(format) = self.layout else {
            return Err(CaptureError::Conversion(
                "raw packets cannot be turned into images".to_string(),
            ));
        };

        let mut buffer = self.to_packed_vec();
        if format == PixelFormat::Bgr24 {
            for pixel in buffer.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
        }

        let image = RgbImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
            CaptureError::Conversion(format!(
                "buffer does not match {}x{} frame",
                self.width, self.height
            ))
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_frames_become_rgb_images() {
        // 2x1 BGR with two bytes of padding.
        let data = [10, 20, 30, 40, 50, 60, 0, 0];
        let frame = Frame::pixels(&data, 2, 1, 8, PixelFormat::Bgr24);

        assert_eq!(frame.to_packed_vec(), vec![10, 20, 30, 40, 50, 60]);
        let image = frame.to_image().unwrap().to_rgb8();
        assert_eq!(image.get_pixel(0, 0).0, [30, 20, 10]);
        assert_eq!(image.get_pixel(1, 0).0, [60, 50, 40]);
    }

    #[test]
    fn raw_frames_are_single_rows() {
        let data = [0, 0, 0, 1, 0x65];
        let frame = Frame::raw(&data);
        assert_eq!((frame.width(), frame.height(), frame.channels()), (5, 1, 1));
        assert_eq!(frame.row(0), Some(&data[..]));
        assert_eq!(frame.row(1), None);
        assert!(frame.to_image().is_err());
    }
}
