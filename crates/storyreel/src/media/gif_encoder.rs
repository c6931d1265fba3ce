//! Animated GIF assembly from screenshot sequences.
//!
//! Frames are decoded from PNG as they arrive and buffered in memory; the
//! whole sequence is quantized and encoded in one pass at the end. Each
//! frame gets the same delay, the nominal inter-frame interval.

use crate::config::GifSettings;
use crate::result::{ExportError, ExportResult};
use gif::{Encoder, Frame, Repeat};
use image::{DynamicImage, GenericImageView, ImageFormat};

/// One decoded RGBA frame
#[derive(Debug, Clone)]
pub struct RgbaFrame {
    /// RGBA pixel data
    pub data: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl RgbaFrame {
    /// Decode a PNG screenshot
    pub fn from_png(png: &[u8]) -> ExportResult<Self> {
        let img = image::load_from_memory_with_format(png, ImageFormat::Png).map_err(|e| {
            ExportError::ImageProcessing {
                message: format!("Failed to decode screenshot: {e}"),
            }
        })?;
        let (width, height) = img.dimensions();
        Ok(Self {
            data: img.to_rgba8().into_raw(),
            width,
            height,
        })
    }
}

/// Buffers frames for one GIF
#[derive(Debug)]
pub struct GifAssembler {
    width: u16,
    height: u16,
    delay_cs: u16,
    speed: i32,
    repeat: Repeat,
    frames: Vec<RgbaFrame>,
}

impl GifAssembler {
    /// Prepare an assembler for `settings`
    pub fn new(settings: &GifSettings) -> ExportResult<Self> {
        let dim = |v: u32, what: &str| {
            u16::try_from(v)
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| ExportError::ImageProcessing {
                    message: format!("GIF {what} {v} out of range"),
                })
        };
        Ok(Self {
            width: dim(settings.width, "width")?,
            height: dim(settings.height, "height")?,
            delay_cs: settings.frame_delay_cs(),
            speed: quality_to_speed(settings.quality),
            repeat: if settings.loop_count == 0 {
                Repeat::Infinite
            } else {
                Repeat::Finite(settings.loop_count)
            },
            frames: Vec::with_capacity(settings.total_frames() as usize),
        })
    }

    /// Decode and buffer a PNG screenshot
    pub fn push_png(&mut self, png: &[u8]) -> ExportResult<()> {
        self.frames.push(RgbaFrame::from_png(png)?);
        Ok(())
    }

    /// Number of buffered frames
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Encode all buffered frames
    pub fn encode(&self) -> ExportResult<Vec<u8>> {
        if self.frames.is_empty() {
            return Err(ExportError::ImageProcessing {
                message: "No frames captured".to_string(),
            });
        }

        let mut output = Vec::new();
        {
            let mut encoder = Encoder::new(&mut output, self.width, self.height, &[])
                .map_err(|e| ExportError::ImageProcessing {
                    message: format!("Failed to create GIF encoder: {e}"),
                })?;
            encoder
                .set_repeat(self.repeat)
                .map_err(|e| ExportError::ImageProcessing {
                    message: format!("Failed to set GIF repeat: {e}"),
                })?;

            for rgba in &self.frames {
                let mut pixels = self.fit(rgba)?;
                let mut frame =
                    Frame::from_rgba_speed(self.width, self.height, &mut pixels, self.speed);
                frame.delay = self.delay_cs;
                encoder
                    .write_frame(&frame)
                    .map_err(|e| ExportError::ImageProcessing {
                        message: format!("Failed to write GIF frame: {e}"),
                    })?;
            }
        }
        Ok(output)
    }

    /// Scale a frame to the output size
    fn fit(&self, frame: &RgbaFrame) -> ExportResult<Vec<u8>> {
        let (w, h) = (u32::from(self.width), u32::from(self.height));
        if frame.width == w && frame.height == h {
            return Ok(frame.data.clone());
        }
        let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
            .ok_or_else(|| ExportError::ImageProcessing {
                message: "Invalid frame data dimensions".to_string(),
            })?;
        let resized = DynamicImage::ImageRgba8(img).resize_exact(
            w,
            h,
            image::imageops::FilterType::Triangle,
        );
        Ok(resized.to_rgba8().into_raw())
    }
}

/// Map quality 1-100 onto the quantizer's speed 30-1
fn quality_to_speed(quality: u8) -> i32 {
    let normalized = i32::from(100 - quality.clamp(1, 100));
    (normalized * 29 / 100 + 1).clamp(1, 30)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, Rgba(color));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn settings(width: u32, height: u32) -> GifSettings {
        GifSettings::default().with_size(width, height).with_fps(10)
    }

    #[test]
    fn test_quality_to_speed() {
        assert_eq!(quality_to_speed(100), 1);
        assert_eq!(quality_to_speed(1), 29);
        assert_eq!(quality_to_speed(0), quality_to_speed(1));
    }

    #[test]
    fn test_rejects_oversized_dimensions() {
        assert!(GifAssembler::new(&settings(70_000, 10)).is_err());
        assert!(GifAssembler::new(&settings(0, 10)).is_err());
    }

    #[test]
    fn test_encode_requires_frames() {
        let assembler = GifAssembler::new(&settings(8, 8)).unwrap();
        assert!(assembler.encode().is_err());
    }

    #[test]
    fn test_bad_png_rejected() {
        let mut assembler = GifAssembler::new(&settings(8, 8)).unwrap();
        assert!(assembler.push_png(b"not a png").is_err());
        assert_eq!(assembler.frame_count(), 0);
    }

    #[test]
    fn test_encodes_animated_gif() {
        let mut assembler = GifAssembler::new(&settings(16, 12)).unwrap();
        assembler.push_png(&png(16, 12, [255, 0, 0, 255])).unwrap();
        assembler.push_png(&png(32, 24, [0, 0, 255, 255])).unwrap();
        let bytes = assembler.encode().unwrap();
        assert!(bytes.starts_with(b"GIF89a"));

        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::RGBA);
        let mut decoder = options.read_info(Cursor::new(bytes)).unwrap();
        assert_eq!(decoder.width(), 16);
        assert_eq!(decoder.height(), 12);
        let mut frames = 0;
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            assert_eq!(frame.delay, 10);
            frames += 1;
        }
        assert_eq!(frames, 2);
    }
}
