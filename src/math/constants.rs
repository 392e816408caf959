/* Copyright 2020 @Yuchen Wong */

use nalgebra as na;

pub type Float = f32;
pub type Int = i32;
pub type UInt = u32;

pub type Vector2f = na::Vector2<Float>;
pub type Vector3f = na::Vector3<Float>;

pub const EPSILON: Float = 1e-4;
pub const PI: Float = 3.14159265359;
pub const INV_PI: Float = 0.31830988618;
pub const FLOAT_MAX: Float = std::f32::MAX;

// Visible spectrum sampled by the tracer, in nanometers.
pub const WAVELENGTH_MIN: Float = 380.0;
pub const WAVELENGTH_MAX: Float = 780.0;
