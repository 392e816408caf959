// Copyright @yucwang 2026

use crate::math::constants::UInt;

// Write a packed 8-bit RGB frame to a PNG file
pub fn write_png_to_file(rgb: &[u8], width: UInt, height: UInt, file_path: &str) {
    log::info!("Starting writing png image: {}.", file_path);

    let buffer = image::RgbImage::from_raw(width, height, rgb.to_vec())
        .unwrap_or_else(|| panic!("frame size does not match {}x{}", width, height));
    buffer.save(file_path)
        .unwrap_or_else(|e| panic!("failed to write {}: {}", file_path, e));
}
