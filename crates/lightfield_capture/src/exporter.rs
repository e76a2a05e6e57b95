// SPDX-License-Identifier: MIT OR Apache-2.0
//! Frame export through the `image` crate.

use image::{DynamicImage, ImageError, RgbaImage};
use lightfield_rig::{ExportError, FrameExporter, FrameFormat};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Holds the most recently rendered frame
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer(Arc<Mutex<Option<RgbaImage>>>);

impl FrameBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    pub fn present(&self, frame: RgbaImage) {
        *self.0.lock() = Some(frame);
    }
}

/// Writes the presented frame in a fixed format
#[derive(Debug)]
pub struct ImageExporter {
    frame: FrameBuffer,
    format: FrameFormat,
    frames_written: u64,
}

impl ImageExporter {
    /// Create an exporter reading from `frame`
    pub fn new(frame: FrameBuffer, format: FrameFormat) -> Self {
        Self {
            frame,
            format,
            frames_written: 0,
        }
    }

    /// Number of files written so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl FrameExporter for ImageExporter {
    fn export(&mut self, path: &Path) -> Result<(), ExportError> {
        let guard = self.frame.0.lock();
        let Some(frame) = guard.as_ref() else {
            return Err(ExportError::NoFrame(path.to_path_buf()));
        };

        let result = match self.format {
            FrameFormat::Png => frame.save_with_format(path, image::ImageFormat::Png),
            FrameFormat::Bmp => frame.save_with_format(path, image::ImageFormat::Bmp),
            FrameFormat::Tga => frame.save_with_format(path, image::ImageFormat::Tga),
            // JPEG has no alpha channel
            FrameFormat::Jpeg => DynamicImage::ImageRgba8(frame.clone())
                .to_rgb8()
                .save_with_format(path, image::ImageFormat::Jpeg),
        };

        result.map_err(|e| match e {
            ImageError::IoError(source) => ExportError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => ExportError::Encode {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;

        self.frames_written += 1;
        tracing::trace!("Wrote {}", path.display());
        Ok(())
    }
}
