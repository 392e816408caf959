// Copyright @yucwang 2026

use crate::math::constants::Float;
use crate::math::spectrum::{srgb_encode, xyz_to_linear_srgb};
use crate::units::gather::GatherUnit;

/// The single display buffer. Reads the gather accumulator and produces a
/// tightly packed 8-bit sRGB image, three bytes per pixel, row major.
pub struct TonemapUnit {
    width: usize,
    height: usize,
    rgb: Vec<u8>,
}

impl TonemapUnit {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height, rgb: vec![0u8; width * height * 3] }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    /// Map the HDR accumulator to the display buffer: expose so the mean
    /// luminance lands on middle grey, compress highlights, encode as sRGB.
    pub fn tonemap(&mut self, gather: &GatherUnit) {
        let pixels = gather.bitmap().pixels();

        let mut sum_luminance = 0.0f64;
        for pixel in pixels {
            sum_luminance += pixel.y as f64;
        }
        let mean = sum_luminance / pixels.len() as f64;
        let exposure: Float = if mean > 0.0 { 0.18 / mean as Float } else { 0.0 };

        for (i, pixel) in pixels.iter().enumerate() {
            let rgb = xyz_to_linear_srgb(&(pixel * exposure));
            for channel in 0..3 {
                let linear = rgb[channel].max(0.0);
                let compressed = linear / (1.0 + linear);
                self.rgb[i * 3 + channel] = (srgb_encode(compressed) * 255.0 + 0.5) as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::plot::PlotUnit;
    use crate::units::trace::MappedPhoton;

    #[test]
    fn test_tonemap_output_layout() {
        let gather = GatherUnit::new(6, 4);
        let mut unit = TonemapUnit::new(6, 4);
        unit.tonemap(&gather);

        assert_eq!(unit.width(), 6);
        assert_eq!(unit.height(), 4);
        assert_eq!(unit.rgb().len(), 6 * 4 * 3);
        // An empty accumulator produces a black frame.
        assert!(unit.rgb().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tonemap_lights_up_plotted_pixels() {
        let mut gather = GatherUnit::new(4, 4);
        let mut plot = PlotUnit::new(4, 4);
        plot.plot(&[MappedPhoton { x: 0.5, y: 0.5, wavelength: 550.0, intensity: 4.0 }]);
        gather.accumulate(&mut plot);

        let mut unit = TonemapUnit::new(4, 4);
        unit.tonemap(&gather);

        let lit = (2 + 4 * 2) * 3;
        assert!(unit.rgb()[lit + 1] > 0);
        assert_eq!(unit.rgb()[0], 0);
    }
}
