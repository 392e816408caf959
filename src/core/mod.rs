// Copyright @yucwang 2021

pub mod rng;
pub mod scene;
pub mod tangent_frame;
