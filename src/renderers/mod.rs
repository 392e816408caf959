// Copyright @yucwang 2026

pub mod worker;

pub use self::worker::{ drain_final_frame, Worker };
