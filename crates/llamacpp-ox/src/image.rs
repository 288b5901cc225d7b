//! Turning an image tensor into an `image_url` payload.

use std::io::Cursor;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use crate::error::LlamaCppError;

/// Batched image samples laid out as `[batch, height, width, channels]`.
///
/// Samples are either normalized floats in `0.0..=1.0` or already in `0..=255`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// A single-frame tensor of the given size.
    pub fn single(height: usize, width: usize, channels: usize, data: Vec<f32>) -> Self {
        Self::new(vec![1, height, width, channels], data)
    }

    /// Samples of the first frame as bytes, scaled the way the tensor's
    /// value range suggests.
    fn first_frame_bytes(&self) -> Result<(u32, u32, usize, Vec<u8>), LlamaCppError> {
        let &[batch, height, width, channels] = self.shape.as_slice() else {
            return Err(LlamaCppError::Image(format!(
                "unexpected image tensor shape: {:?}",
                self.shape
            )));
        };
        if batch == 0 {
            return Err(LlamaCppError::Image("image tensor has an empty batch".to_string()));
        }

        let frame_len = height
            .checked_mul(width)
            .and_then(|len| len.checked_mul(channels))
            .ok_or_else(|| {
                LlamaCppError::Image(format!(
                    "image tensor frame {height}x{width}x{channels} is too large"
                ))
            })?;
        let frame = self.data.get(..frame_len).ok_or_else(|| {
            LlamaCppError::Image(format!(
                "image tensor holds {} samples, first frame needs {frame_len}",
                self.data.len()
            ))
        })?;

        let max = frame.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let scale = if max <= 1.5 { 255.0 } else { 1.0 };

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bytes = frame
            .iter()
            .map(|sample| (sample * scale).clamp(0.0, 255.0) as u8)
            .collect();

        let height = u32::try_from(height)
            .map_err(|_| LlamaCppError::Image(format!("image height {height} is too large")))?;
        let width = u32::try_from(width)
            .map_err(|_| LlamaCppError::Image(format!("image width {width} is too large")))?;

        Ok((width, height, channels, bytes))
    }
}

/// Converts an image input into a URL the server accepts in an `image_url` part.
pub trait ImageEncoder: Send + Sync {
    /// `Ok(None)` means the image is not sent; the prompt goes out as text only.
    fn encode(&self, image: &ImageTensor) -> Result<Option<String>, LlamaCppError>;
}

/// Sends no image at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImageEncoder;

impl ImageEncoder for NoImageEncoder {
    fn encode(&self, _image: &ImageTensor) -> Result<Option<String>, LlamaCppError> {
        Ok(None)
    }
}

/// Encodes the first frame as a `data:image/png;base64,...` URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngImageEncoder;

impl ImageEncoder for PngImageEncoder {
    fn encode(&self, image: &ImageTensor) -> Result<Option<String>, LlamaCppError> {
        let (width, height, channels, bytes) = image.first_frame_bytes()?;
        let size_error = || LlamaCppError::Image("sample count does not match image size".to_string());

        let dynamic = match channels {
            1 => DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, bytes).ok_or_else(size_error)?),
            3 => DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, bytes).ok_or_else(size_error)?),
            4 => DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, bytes).ok_or_else(size_error)?),
            other => {
                return Err(LlamaCppError::Image(format!(
                    "unsupported channel count: {other}"
                )));
            }
        };

        let mut png = Cursor::new(Vec::new());
        dynamic
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| LlamaCppError::Image(e.to_string()))?;

        Ok(Some(format!(
            "data:image/png;base64,{}",
            BASE64_STANDARD.encode(png.into_inner())
        )))
    }
}
