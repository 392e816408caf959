/* Copyright 2020 @TwoCookingMice */

use crate::math::constants::{ Float, UInt };

use exr::prelude::*;

// Write the HDR accumulator to an OpenEXR file
pub fn write_exr_to_file(image: &[(Float, Float, Float)],
                         width: UInt,
                         height: UInt,
                         file_path: &str) {
    log::info!("Starting writing openexr images: {}.", file_path);

    let width = width as usize;
    let height = height as usize;
    write_rgb_file(file_path, width, height, |x, y| {
        image[x + y * width]
    })
    .unwrap_or_else(|e| panic!("failed to write {}: {}", file_path, e));
}
