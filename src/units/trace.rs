// Copyright @yucwang 2026

use crate::core::rng::LcgRng;
use crate::core::scene::{Material, Scene};
use crate::core::tangent_frame::{build_tangent_frame, local_to_world};
use crate::math::constants::{Float, Vector2f, WAVELENGTH_MAX, WAVELENGTH_MIN};
use crate::math::ray::Ray3f;
use crate::math::warp::sample_cosine_hemisphere;

use std::sync::Arc;

/// Number of wavelength samples one trace batch produces.
pub const PHOTONS_PER_BATCH: usize = 32768;

const MAX_DEPTH: u32 = 16;

/// One wavelength sample mapped onto the screen. `x` and `y` are in [0, 1)
/// with the origin at the top-left corner of the image.
#[derive(Clone, Copy, Debug)]
pub struct MappedPhoton {
    pub x: Float,
    pub y: Float,
    pub wavelength: Float,
    pub intensity: Float,
}

/// A batch producer of wavelength samples. Every trace unit owns a private
/// generator so batches are reproducible and never share random state.
pub struct TraceUnit {
    scene: Arc<Scene>,
    rng: LcgRng,
    photons: Vec<MappedPhoton>,
}

impl TraceUnit {
    pub fn new(scene: Arc<Scene>, seed: u64) -> Self {
        Self {
            scene,
            rng: LcgRng::new(seed),
            photons: Vec::with_capacity(PHOTONS_PER_BATCH),
        }
    }

    pub fn photons(&self) -> &[MappedPhoton] {
        &self.photons
    }

    /// Produce one batch of samples, replacing the previous batch.
    pub fn trace(&mut self) {
        self.photons.clear();
        for _ in 0..PHOTONS_PER_BATCH {
            let x = self.rng.next_f32();
            let y = self.rng.next_f32();
            let wavelength = self.rng.next_range(WAVELENGTH_MIN, WAVELENGTH_MAX);

            let ray = self.scene.camera().sample_ray(&Vector2f::new(x, y));
            let intensity = radiance(&self.scene, ray, wavelength, &mut self.rng);
            if intensity > 0.0 {
                self.photons.push(MappedPhoton { x, y, wavelength, intensity });
            }
        }
    }
}

/// Forward path tracing of a single monochromatic ray: follow it through the
/// scene until it hits an emitter, escapes to the sky, or dies in Russian
/// roulette, and return the radiance carried at `wavelength`.
fn radiance(scene: &Scene, mut ray: Ray3f, wavelength: Float, rng: &mut LcgRng) -> Float {
    let mut throughput: Float = 1.0;

    for depth in 0..MAX_DEPTH {
        let (t, sphere) = match scene.intersect(&ray) {
            Some(hit) => hit,
            None => return throughput * scene.sky_emission(wavelength),
        };

        let p = ray.at(t);
        let mut n = sphere.normal_at(&p);
        if n.dot(&ray.dir()) > 0.0 {
            n = -n;
        }

        match &sphere.material {
            Material::Emissive { .. } => {
                return throughput * sphere.material.emission(wavelength);
            }
            Material::Mirror => {
                let dir = ray.dir() - 2.0 * ray.dir().dot(&n) * n;
                ray = Ray3f::new(p, dir, Some(0.0), None);
            }
            Material::Diffuse(reflectance) => {
                throughput *= reflectance.eval(wavelength);

                if depth >= 3 {
                    let q = throughput.min(0.95);
                    if q <= 0.0 || rng.next_f32() > q {
                        return 0.0;
                    }
                    throughput /= q;
                }

                let u = Vector2f::new(rng.next_f32(), rng.next_f32());
                let local = sample_cosine_hemisphere(&u);
                let (tangent, bitangent) = build_tangent_frame(&n);
                let dir = local_to_world(&local, &tangent, &bitangent, &n);
                ray = Ray3f::new(p, dir, Some(0.0), None);
            }
        }
    }

    0.0
}
