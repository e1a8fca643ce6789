//! PNG dumps of normalized frames, for checking grid alignment offline.

use crate::core_modules::frame::GrayFrame;
use image::ImageEncoder;

/// Encodes a normalized frame as an 8-bit grayscale PNG.
pub fn save_png(path: &std::path::Path, frame: &GrayFrame) -> Result<(), image::ImageError> {
    let output = std::fs::File::create(path)?;
    let encoder = image::codecs::png::PngEncoder::new(output);
    encoder.write_image(
        frame.data(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::L8,
    )?;
    Ok(())
}
