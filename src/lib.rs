// Copyright @yucwang 2021

#![allow(dead_code)]

pub extern crate nalgebra as na;

pub mod core;
pub mod io;
pub mod math;
pub mod renderers;
pub mod scheduler;
pub mod sensors;
pub mod units;
