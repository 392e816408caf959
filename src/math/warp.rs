// Copyright @yucwang 2023

use super::constants::{ PI, Float, Vector2f, Vector3f };

pub fn sample_uniform_disk_concentric(u: &Vector2f) -> Vector2f {
    let r1: Float = 2.0 * u.x - 1.0;
    let r2: Float = 2.0 * u.y - 1.0;

    let phi: Float;
    let r:   Float;

    if r1 == 0. && r2 == 0. {
        r = 0.0;
        phi = 0.0;
    } else if r1 * r1 > r2 * r2 {
        r = r1;
        phi = (PI / 4.0) * (r2 / r1);
    } else {
        r = r2;
        phi = (PI / 2.0) - (r1 / r2) * (PI / 4.0);
    }

    let (sin_phi, cos_phi) = phi.sin_cos();

    Vector2f::new(r * cos_phi, r * sin_phi)
}

pub fn sample_cosine_hemisphere(u: &Vector2f) -> Vector3f {
    let p = sample_uniform_disk_concentric(u);
    let z = (1. - p.x * p.x - p.y * p.y).max(0.0).sqrt();

    Vector3f::new(p.x, p.y, z)
}
