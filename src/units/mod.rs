// Copyright @yucwang 2026

pub mod gather;
pub mod plot;
pub mod tonemap;
pub mod trace;

pub use self::gather::GatherUnit;
pub use self::plot::PlotUnit;
pub use self::tonemap::TonemapUnit;
pub use self::trace::{ MappedPhoton, TraceUnit };
