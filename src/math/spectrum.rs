// Copyright @yucwang 2026

use super::constants::{Float, Vector3f};

// Piecewise-Gaussian lobe of the CIE 1931 colour matching fits.
// tau1 applies below the peak, tau2 above it.
fn cie_lobe(wavelength: Float, alpha: Float, mu: Float, tau1: Float, tau2: Float) -> Float {
    let t = (wavelength - mu) * if wavelength < mu { tau1 } else { tau2 };
    alpha * (-0.5 * t * t).exp()
}

/// Evaluate the CIE 1931 colour matching functions at a wavelength in
/// nanometers, returning the XYZ tristimulus response.
pub fn cie_xyz(wavelength: Float) -> Vector3f {
    let x = cie_lobe(wavelength, 1.056, 599.8, 0.0264, 0.0323)
          + cie_lobe(wavelength, 0.362, 442.0, 0.0624, 0.0374)
          - cie_lobe(wavelength, 0.065, 501.1, 0.0490, 0.0382);
    let y = cie_lobe(wavelength, 0.821, 568.8, 0.0213, 0.0247)
          + cie_lobe(wavelength, 0.286, 530.9, 0.0613, 0.0322);
    let z = cie_lobe(wavelength, 1.217, 437.0, 0.0845, 0.0278)
          + cie_lobe(wavelength, 0.681, 459.0, 0.0385, 0.0725);

    Vector3f::new(x, y, z)
}

/// Convert an XYZ tristimulus value to linear sRGB with the D65 white point.
pub fn xyz_to_linear_srgb(xyz: &Vector3f) -> Vector3f {
    let r =  3.2404542 * xyz.x - 1.5371385 * xyz.y - 0.4985314 * xyz.z;
    let g = -0.9692660 * xyz.x + 1.8760108 * xyz.y + 0.0415560 * xyz.z;
    let b =  0.0556434 * xyz.x - 0.2040259 * xyz.y + 1.0572252 * xyz.z;

    Vector3f::new(r, g, b)
}

/// Apply the sRGB transfer curve to one linear channel in [0, 1].
pub fn srgb_encode(c: Float) -> Float {
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Normalised Planck blackbody emission at a wavelength in nanometers for a
/// temperature in kelvin. The spectrum is scaled so its peak is 1, which
/// keeps emitters of different temperatures comparable in intensity.
pub fn blackbody(wavelength: Float, temperature: Float) -> Float {
    // Wien displacement law gives the peak wavelength in nanometers.
    let peak = 2.8977719e6 / temperature;
    planck(wavelength, temperature) / planck(peak, temperature)
}

fn planck(wavelength: Float, temperature: Float) -> Float {
    // Second radiation constant, with the wavelength kept in nanometers.
    let c2 = 1.4387769e7;
    let lambda5 = (wavelength * 1e-3).powi(5);
    1.0 / (lambda5 * ((c2 / (wavelength * temperature)).exp_m1()))
}
