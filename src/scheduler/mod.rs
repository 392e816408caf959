// Copyright @yucwang 2026

pub mod metrics;
pub mod scheduler;
pub mod task;

pub use self::metrics::PerformanceLog;
pub use self::scheduler::{ DisplaySink, TaskScheduler };
pub use self::task::Task;
