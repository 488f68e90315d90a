//! Frame rasterization.
//!
//! - `Canvas`: reusable off-screen RGB buffer, resized to the live video on every tick.
//! - `FrameGrabber`: draws the current video frame into the canvas and encodes it.
//! - `CapturedFrame`: transport-ready JPEG data URL, consumed by the submitter and dropped.

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::time::Instant;

use crate::error::TickError;
use crate::platform::VideoElement;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Default JPEG quality, matching what browsers use for `toDataURL("image/jpeg")`.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

// ----------------------------------------------------------------------------
// Canvas: reusable off-screen buffer
// ----------------------------------------------------------------------------

pub struct Canvas {
    image: RgbImage,
    reallocations: u64,
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            image: RgbImage::new(0, 0),
            reallocations: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of times the backing buffer had to be reallocated.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Resize to `width` x `height`. The buffer is kept when the dimensions are unchanged.
    ///
    /// Returns true when the buffer was reallocated.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.image.width() == width && self.image.height() == height {
            return false;
        }
        self.image = RgbImage::new(width, height);
        self.reallocations += 1;
        true
    }

    /// Draw a packed RGB24 frame at the origin, clipped to the canvas.
    pub fn draw_rgb(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<()> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }

        let dst_width = self.image.width() as usize;
        let copy_width = (width as usize).min(dst_width) * 3;
        let rows = height.min(self.image.height()) as usize;
        let dst: &mut [u8] = &mut self.image;
        for row in 0..rows {
            let src_offset = row * width as usize * 3;
            let dst_offset = row * dst_width * 3;
            dst[dst_offset..dst_offset + copy_width]
                .copy_from_slice(&pixels[src_offset..src_offset + copy_width]);
        }
        Ok(())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.image.get_pixel_checked(x, y).map(|p| p.0)
    }

    /// Encode the canvas as a `data:image/jpeg;base64,...` URL.
    pub fn to_data_url(&self, quality: u8) -> Result<String> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(anyhow!("cannot encode an empty canvas"));
        }
        let mut jpeg = Vec::with_capacity(64 * 1024);
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode_image(&self.image)
            .context("encode jpeg")?;
        let mut url = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        url.push_str(DATA_URL_PREFIX);
        base64::engine::general_purpose::STANDARD.encode_string(&jpeg, &mut url);
        Ok(url)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// CapturedFrame
// ----------------------------------------------------------------------------

/// One encoded still from the video. Not retained after submission.
#[derive(Clone, Debug)]
pub struct CapturedFrame {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
}

impl CapturedFrame {
    /// Base64 payload without the data URL prefix.
    pub fn payload(&self) -> &str {
        self.data_url
            .strip_prefix(DATA_URL_PREFIX)
            .unwrap_or(&self.data_url)
    }
}

// ----------------------------------------------------------------------------
// FrameGrabber
// ----------------------------------------------------------------------------

/// Rasterizes the current video frame into a reusable canvas.
pub struct FrameGrabber {
    canvas: Canvas,
    jpeg_quality: u8,
}

impl FrameGrabber {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            canvas: Canvas::new(),
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Capture one frame.
    ///
    /// Returns `TickError::NoFrameYet` while the video reports zero width. Otherwise the canvas
    /// is resized to the live dimensions (they can change between ticks), drawn and encoded.
    pub fn grab(&mut self, video: &dyn VideoElement) -> Result<CapturedFrame, TickError> {
        let (width, height) = video.dimensions();
        if width == 0 || height == 0 {
            return Err(TickError::NoFrameYet);
        }
        self.canvas.resize(width, height);
        video
            .draw(&mut self.canvas)
            .map_err(|err| TickError::Raster(err.to_string()))?;
        let data_url = self
            .canvas
            .to_data_url(self.jpeg_quality)
            .map_err(|err| TickError::Raster(err.to_string()))?;
        Ok(CapturedFrame {
            data_url,
            width,
            height,
            captured_at: Instant::now(),
        })
    }
}
