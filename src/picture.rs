use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

use crate::config::PictureConfig;

/// Decoded picture buffer handed to listeners and the calibration backend
#[derive(Debug, Clone)]
pub struct Picture {
    /// Camera that took the picture
    pub camera_id: u32,
    /// Timestamp when the picture was received
    pub timestamp: SystemTime,
    /// Pixel data (shared ownership, pictures fan out to several listeners)
    pub data: Arc<Vec<u8>>,
    /// Picture width in pixels
    pub width: u32,
    /// Picture height in pixels
    pub height: u32,
    /// Bytes per pixel
    pub channels: u32,
}

impl Picture {
    pub fn new(camera_id: u32, data: Vec<u8>, width: u32, height: u32, channels: u32) -> Self {
        Self {
            camera_id,
            timestamp: SystemTime::now(),
            data: Arc::new(data),
            width,
            height,
            channels,
        }
    }

    /// Get the expected buffer size for this geometry
    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Get picture age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("picture has {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Turns the raw bytes of a picture message into a picture buffer.
pub trait PictureDecoder: Send + Sync {
    fn decode(&self, camera_id: u32, bytes: Vec<u8>) -> Result<Picture, DecodeError>;
}

/// Decoder for the uncompressed fixed-geometry frames the camera modules send
#[derive(Debug, Clone)]
pub struct RawFrameDecoder {
    width: u32,
    height: u32,
    channels: u32,
}

impl RawFrameDecoder {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

impl From<&PictureConfig> for RawFrameDecoder {
    fn from(config: &PictureConfig) -> Self {
        Self::new(config.width, config.height, config.channels)
    }
}

impl PictureDecoder for RawFrameDecoder {
    fn decode(&self, camera_id: u32, bytes: Vec<u8>) -> Result<Picture, DecodeError> {
        let expected = self.frame_size();
        if bytes.len() != expected {
            return Err(DecodeError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }

        Ok(Picture::new(
            camera_id,
            bytes,
            self.width,
            self.height,
            self.channels,
        ))
    }
}
