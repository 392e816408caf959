// Copyright @yucwang 2026

use crate::math::constants::{Float, Vector2f, Vector3f};
use crate::math::ray::Ray3f;

/// Pinhole camera. Screen samples use the coordinates a mapped photon
/// carries: `(0, 0)` is the top-left corner of the image, `x` grows to the
/// right and `y` grows downwards, matching the plot unit's pixel rows.
pub struct PerspectiveCamera {
    origin: Vector3f,
    /// Direction to the top-left corner of the film plane.
    film_origin: Vector3f,
    /// Full film span to the right.
    film_x: Vector3f,
    /// Full film span down the image.
    film_y: Vector3f,
}

impl PerspectiveCamera {
    pub fn new(origin: Vector3f,
               target: Vector3f,
               up: Vector3f,
               fov_y_radians: Float,
               aspect: Float) -> Self {
        let forward = (target - origin).normalize();
        let right = forward.cross(&up).normalize();
        let up = right.cross(&forward).normalize();

        // Film plane at unit distance along the view direction; the spans
        // follow from the vertical field of view and the aspect ratio.
        let half_height = (0.5 * fov_y_radians).tan();
        let half_width = aspect * half_height;
        let film_x = right * (2.0 * half_width);
        let film_y = up * (-2.0 * half_height);

        Self {
            origin,
            film_origin: forward - 0.5 * film_x - 0.5 * film_y,
            film_x,
            film_y,
        }
    }

    /// The camera ray through screen position `u` in [0, 1) x [0, 1).
    pub fn sample_ray(&self, u: &Vector2f) -> Ray3f {
        let dir = self.film_origin + self.film_x * u.x + self.film_y * u.y;
        Ray3f::new(self.origin, dir, Some(0.0), None)
    }
}
