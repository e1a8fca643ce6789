// THEORY:
// `GrayFrame` is the single unit of data that flows through the engine: one
// normalized, single-channel intensity image. It is a "dumb" data container in
// the same spirit as a pixel or a chunk — it holds samples and knows its own
// geometry, nothing more. Every frame is produced fresh by the frame source,
// consumed within one loop iteration, and never retained.
//
// The one piece of intelligence it does have is self-validation: a frame whose
// buffer length disagrees with its declared width and height would silently
// misalign every downstream cell slice, so construction fails loudly instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame buffer holds {actual} samples but {width}x{height} needs {expected}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A normalized, single-channel intensity frame. One byte per pixel, row-major.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl GrayFrame {
    /// Wraps a raw intensity buffer, rejecting any buffer whose length does
    /// not match the declared dimensions exactly.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize);
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The full row-major sample buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
