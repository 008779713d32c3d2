// src/capability/images.rs

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::capability::{Artifact, Transform};
use crate::errors::TransformError;
use crate::types::ArtifactKind;

const JPEG_QUALITY: u8 = 85;

/// Re-encodes PNG and JPEG images and keeps whichever of the original and
/// the re-encoded bytes is smaller. Other formats (GIF, SVG) pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTransform;

impl Transform for ImageTransform {
    fn kind(&self) -> ArtifactKind {
        ArtifactKind::Image
    }

    fn transform(&self, entry: &Path, output: &Path) -> Result<Vec<Artifact>, TransformError> {
        let original = std::fs::read(entry).map_err(|e| TransformError::io(entry, e))?;

        let format = match entry
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => Some(ImageFormat::Png),
            Some("jpg" | "jpeg") => Some(ImageFormat::Jpeg),
            _ => None,
        };

        let bytes = match format {
            Some(format) => {
                let optimized = reencode(&original, format)
                    .map_err(|e| TransformError::render(entry, e))?;
                if optimized.len() < original.len() {
                    debug!(
                        path = %entry.display(),
                        before = original.len(),
                        after = optimized.len(),
                        "image re-encoded"
                    );
                    optimized
                } else {
                    original
                }
            }
            None => original,
        };

        Ok(vec![Artifact::new(output, bytes)])
    }
}

fn reencode(bytes: &[u8], format: ImageFormat) -> image::ImageResult<Vec<u8>> {
    let img = image::load_from_memory_with_format(bytes, format)?;
    let mut buf = Vec::new();
    let writer = Cursor::new(&mut buf);

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(writer, JPEG_QUALITY))?;
        }
        _ => {
            let encoder =
                PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
    }

    Ok(buf)
}
