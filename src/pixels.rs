//! Pixel batches
//!
//! Image tensors arrive as `[batch, height, width, channel]` floats in
//! `[0, 1]` and leave as 8-bit samples.

/// Errors constructing a pixel batch
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PixelError {
    #[error("Pixel data has {actual} values, shape requires {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Unsupported channel count: {0} (expected 1-4)")]
    UnsupportedChannels(usize),

    #[error("Image dimensions must be non-zero")]
    EmptyImage,
}

/// A batch of equally sized images in row-major `[b, h, w, c]` order
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBatch {
    batch: usize,
    height: u32,
    width: u32,
    channels: usize,
    data: Vec<f32>,
}

impl PixelBatch {
    pub fn new(
        batch: usize,
        height: u32,
        width: u32,
        channels: usize,
        data: Vec<f32>,
    ) -> Result<Self, PixelError> {
        if !(1..=4).contains(&channels) {
            return Err(PixelError::UnsupportedChannels(channels));
        }
        if height == 0 || width == 0 {
            return Err(PixelError::EmptyImage);
        }
        let expected = batch * height as usize * width as usize * channels;
        if data.len() != expected {
            return Err(PixelError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            batch,
            height,
            width,
            channels,
            data,
        })
    }

    /// Single-image batch from packed 8-bit samples
    pub fn from_u8(
        height: u32,
        width: u32,
        channels: usize,
        samples: &[u8],
    ) -> Result<Self, PixelError> {
        let data = samples.iter().map(|&s| f32::from(s) / 255.0).collect();
        Self::new(1, height, width, channels, data)
    }

    /// Number of images in the batch
    pub fn len(&self) -> usize {
        self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.batch == 0
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    fn frame_len(&self) -> usize {
        self.height as usize * self.width as usize * self.channels
    }

    /// Float samples of image `index`
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        if index >= self.batch {
            return None;
        }
        let len = self.frame_len();
        Some(&self.data[index * len..(index + 1) * len])
    }

    /// 8-bit samples of image `index`
    pub fn frame_u8(&self, index: usize) -> Option<Vec<u8>> {
        self.frame(index)
            .map(|frame| frame.iter().copied().map(quantize).collect())
    }
}

/// `clip(v * 255, 0, 255)` truncated to an integer; NaN maps to 0
pub fn quantize(value: f32) -> u8 {
    (value * 255.0).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_truncates_and_clips() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(0.5), 127);
        assert_eq!(quantize(-0.2), 0);
        assert_eq!(quantize(1.7), 255);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_shape_checked() {
        let err = PixelBatch::new(1, 2, 2, 3, vec![0.0; 11]).unwrap_err();
        assert_eq!(err, PixelError::ShapeMismatch { expected: 12, actual: 11 });
        assert_eq!(
            PixelBatch::new(1, 1, 1, 5, vec![0.0; 5]).unwrap_err(),
            PixelError::UnsupportedChannels(5)
        );
        assert_eq!(
            PixelBatch::new(1, 0, 1, 3, vec![]).unwrap_err(),
            PixelError::EmptyImage
        );
    }

    #[test]
    fn test_frames() {
        let data: Vec<f32> = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let batch = PixelBatch::new(2, 1, 1, 3, data).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.frame_u8(0).unwrap(), vec![0, 0, 0]);
        assert_eq!(batch.frame_u8(1).unwrap(), vec![255, 255, 255]);
        assert!(batch.frame(2).is_none());
    }

    #[test]
    fn test_from_u8_scales_to_unit_range() {
        let samples = [0u8, 255, 0, 255, 255, 0];
        let batch = PixelBatch::from_u8(1, 2, 3, &samples).unwrap();
        assert_eq!(batch.frame(0).unwrap(), &[0.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
        assert_eq!(batch.frame_u8(0).unwrap(), samples.to_vec());
    }
}
