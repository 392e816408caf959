// Copyright @yucwang 2026

use crate::math::constants::{EPSILON, Float, Vector3f};
use crate::math::ray::Ray3f;
use crate::math::spectrum::blackbody;
use crate::sensors::perspective::PerspectiveCamera;

/// Wavelength-dependent reflectance of a diffuse surface.
pub enum Reflectance {
    /// The same reflectance at every wavelength.
    Constant(Float),
    /// A Gaussian band: `peak` at `center`, falling off to `floor` away
    /// from it. This is what gives surfaces their colour.
    Band { center: Float, width: Float, peak: Float, floor: Float },
}

impl Reflectance {
    pub fn eval(&self, wavelength: Float) -> Float {
        match self {
            Reflectance::Constant(r) => *r,
            Reflectance::Band { center, width, peak, floor } => {
                let t = (wavelength - center) / width;
                floor + (peak - floor) * (-0.5 * t * t).exp()
            }
        }
    }
}

pub enum Material {
    Diffuse(Reflectance),
    Mirror,
    /// A blackbody radiator at the given temperature in kelvin, scaled by
    /// `intensity`.
    Emissive { temperature: Float, intensity: Float },
}

impl Material {
    pub fn emission(&self, wavelength: Float) -> Float {
        match self {
            Material::Emissive { temperature, intensity } => {
                intensity * blackbody(wavelength, *temperature)
            }
            _ => 0.0,
        }
    }
}

pub struct Sphere {
    pub center: Vector3f,
    pub radius: Float,
    pub material: Material,
}

impl Sphere {
    pub fn new(center: Vector3f, radius: Float, material: Material) -> Self {
        Self { center, radius, material }
    }

    /// Nearest intersection distance along the ray, if any.
    pub fn intersect(&self, ray: &Ray3f) -> Option<Float> {
        let oc = ray.origin() - self.center;
        let b = oc.dot(&ray.dir());
        let c = oc.dot(&oc) - self.radius * self.radius;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }

        let sqrt_d = discriminant.sqrt();
        let t_near = -b - sqrt_d;
        if t_near > EPSILON && ray.test_segment(t_near) {
            return Some(t_near);
        }
        let t_far = -b + sqrt_d;
        if t_far > EPSILON && ray.test_segment(t_far) {
            return Some(t_far);
        }
        None
    }

    pub fn normal_at(&self, p: &Vector3f) -> Vector3f {
        (p - self.center).normalize()
    }
}

pub struct Scene {
    spheres: Vec<Sphere>,
    camera: PerspectiveCamera,
    /// Emission of rays that escape the scene, as a fraction of a 6504 K
    /// daylight blackbody.
    sky_intensity: Float,
}

impl Scene {
    pub fn new(spheres: Vec<Sphere>, camera: PerspectiveCamera, sky_intensity: Float) -> Self {
        Self { spheres, camera, sky_intensity }
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn sky_emission(&self, wavelength: Float) -> Float {
        self.sky_intensity * blackbody(wavelength, 6504.0)
    }

    pub fn intersect(&self, ray: &Ray3f) -> Option<(Float, &Sphere)> {
        let mut closest: Option<(Float, &Sphere)> = None;
        for sphere in &self.spheres {
            if let Some(t) = sphere.intersect(ray) {
                match closest {
                    Some((t_min, _)) if t >= t_min => {}
                    _ => closest = Some((t, sphere)),
                }
            }
        }
        closest
    }

    /// The scene the binary renders when none is configured: a warm lamp
    /// over a grey floor with a coloured sphere pair and a mirror ball.
    pub fn default_scene(aspect: Float) -> Self {
        let camera = PerspectiveCamera::new(Vector3f::new(0.0, 1.2, 5.0),
                                            Vector3f::new(0.0, 0.8, 0.0),
                                            Vector3f::new(0.0, 1.0, 0.0),
                                            std::f32::consts::FRAC_PI_3,
                                            aspect);

        let spheres = vec![
            // Floor.
            Sphere::new(Vector3f::new(0.0, -1000.0, 0.0), 1000.0,
                        Material::Diffuse(Reflectance::Constant(0.55))),
            // Reddish sphere on the left.
            Sphere::new(Vector3f::new(-1.6, 0.8, 0.0), 0.8,
                        Material::Diffuse(Reflectance::Band {
                            center: 630.0, width: 45.0, peak: 0.85, floor: 0.04 })),
            // Blueish sphere on the right.
            Sphere::new(Vector3f::new(1.6, 0.8, 0.0), 0.8,
                        Material::Diffuse(Reflectance::Band {
                            center: 465.0, width: 40.0, peak: 0.8, floor: 0.05 })),
            // Mirror ball in the middle, slightly behind.
            Sphere::new(Vector3f::new(0.0, 0.9, -1.4), 0.9,
                        Material::Mirror),
            // Warm lamp up high.
            Sphere::new(Vector3f::new(0.0, 6.5, 2.0), 1.8,
                        Material::Emissive { temperature: 3200.0, intensity: 8.0 }),
        ];

        Self::new(spheres, camera, 0.04)
    }
}
