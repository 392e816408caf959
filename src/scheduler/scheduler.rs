// Copyright @yucwang 2026

use crate::core::rng::LcgRng;
use crate::core::scene::Scene;
use crate::math::constants::Float;
use crate::scheduler::metrics::PerformanceLog;
use crate::scheduler::task::Task;
use crate::units::{ GatherUnit, PlotUnit, TonemapUnit, TraceUnit };

use std::collections::VecDeque;
use std::sync::{ Arc, Mutex, MutexGuard };
use std::time::{ Duration, Instant };

/// Minimum wall-clock gap between display refreshes.
pub const TONEMAP_INTERVAL: Duration = Duration::from_secs(30);

/// Receives every fresh display frame as (width, height, packed sRGB bytes).
/// Called from arbitrary worker threads, never under the scheduler lock.
pub type DisplaySink = Box<dyn Fn(usize, usize, &[u8]) + Send + Sync>;

/// Readiness bookkeeping for every unit pool. All of it lives behind one
/// lock; the unit contents themselves do not.
struct SchedulerState {
    available_traces: VecDeque<usize>,
    done_traces: VecDeque<usize>,
    trace_in_flight: Vec<bool>,

    available_plots: VecDeque<usize>,
    done_plots: VecDeque<usize>,
    plot_in_flight: Vec<bool>,

    gather_available: bool,
    tonemap_available: bool,
    /// True when a gather completed after the last tonemap, so the display
    /// image is stale.
    image_changed: bool,

    last_tonemap: Instant,
    refresh_forced: bool,
    completed_traces: u32,
    performance: PerformanceLog,
}

/// Hands out tasks to worker threads and keeps the pipeline account books.
///
/// The scheduler owns the four unit pools and dispenses tasks that name
/// units by index. Workers call [`get_new_task`](Self::get_new_task) in a
/// loop, handing back the task they just finished; completion bookkeeping
/// and the dispatch decision happen under a single lock, while the actual
/// stage work always runs outside it. Each unit sits in its own `Mutex`
/// that is never contended: the dispatch rules hand a unit to at most one
/// worker at a time.
pub struct TaskScheduler {
    trace_units: Vec<Mutex<TraceUnit>>,
    plot_units: Vec<Mutex<PlotUnit>>,
    gather_unit: Mutex<GatherUnit>,
    tonemap_unit: Mutex<TonemapUnit>,

    display: DisplaySink,
    refresh_interval: Duration,
    state: Mutex<SchedulerState>,
}

impl TaskScheduler {
    pub fn new(num_workers: usize,
               width: usize,
               height: usize,
               scene: Arc<Scene>,
               seed: u64,
               display: DisplaySink) -> Self {
        Self::with_refresh_interval(num_workers, width, height, scene, seed,
                                    display, TONEMAP_INTERVAL)
    }

    fn with_refresh_interval(num_workers: usize,
                             width: usize,
                             height: usize,
                             scene: Arc<Scene>,
                             seed: u64,
                             display: DisplaySink,
                             refresh_interval: Duration) -> Self {
        assert!(num_workers >= 1, "need at least one worker");
        assert!(width > 0 && height > 0, "image must not be empty");

        // More trace units than workers, because tracing parallelises
        // freely; fewer plot units, because one plot absorbs several traces.
        let num_trace_units = (num_workers * 3).max(1);
        let num_plot_units = (num_workers / 2).max(1);

        // Chain the seeds so one root seed reproduces the whole render
        // while every trace unit still gets its own stream.
        let mut seeder = LcgRng::new(seed);
        let trace_units = (0..num_trace_units)
            .map(|_| Mutex::new(TraceUnit::new(scene.clone(), seeder.fork_seed())))
            .collect();
        let plot_units = (0..num_plot_units)
            .map(|_| Mutex::new(PlotUnit::new(width, height)))
            .collect();

        let state = SchedulerState {
            available_traces: (0..num_trace_units).collect(),
            done_traces: VecDeque::new(),
            trace_in_flight: vec![false; num_trace_units],
            available_plots: (0..num_plot_units).collect(),
            done_plots: VecDeque::new(),
            plot_in_flight: vec![false; num_plot_units],
            gather_available: true,
            tonemap_available: true,
            image_changed: false,
            last_tonemap: Instant::now(),
            refresh_forced: false,
            completed_traces: 0,
            performance: PerformanceLog::new(),
        };

        Self {
            trace_units,
            plot_units,
            gather_unit: Mutex::new(GatherUnit::new(width, height)),
            tonemap_unit: Mutex::new(TonemapUnit::new(width, height)),
            display,
            refresh_interval,
            state: Mutex::new(state),
        }
    }

    /// Apply the completion effects of `completed`, then select the next
    /// task. This is the only scheduling operation; the very first call of
    /// a worker passes `Task::Sleep` as a sentinel.
    pub fn get_new_task(&self, completed: Task) -> Task {
        let mut state = self.lock_state();
        self.complete_task(&mut state, completed);

        // A display refresh takes precedence once the interval has passed:
        // tonemap if the image is stale, otherwise gather pending plots so
        // the next request can tonemap fresh data.
        let now = Instant::now();
        if state.refresh_forced
            || now.duration_since(state.last_tonemap) > self.refresh_interval {
            if state.image_changed {
                if state.gather_available && state.tonemap_available {
                    return Self::create_tonemap_task(&mut state);
                }
            } else if state.gather_available && !state.done_plots.is_empty() {
                return Self::create_gather_task(&mut state);
            }
        }

        // If a substantial number of trace units is done, plot them first
        // so they can be recycled soon.
        if state.done_traces.len() > self.trace_units.len() / 2
            && !state.available_plots.is_empty() {
            return Self::create_plot_task(&mut state);
        }

        // Then, if there are trace units available, go trace some rays.
        if !state.available_traces.is_empty() {
            return Self::create_trace_task(&mut state);
        }

        // Otherwise some trace units need plotting to become available
        // again.
        if !state.available_plots.is_empty() && !state.done_traces.is_empty() {
            return Self::create_plot_task(&mut state);
        }

        // If no plot units are available either, gather done plots to free
        // them up.
        if state.gather_available && !state.done_plots.is_empty() {
            return Self::create_gather_task(&mut state);
        }

        // Everything is locked in dependencies; have the worker wait a
        // while for units to come back.
        Task::Sleep
    }

    /// Make the next dispatch behave as if the refresh interval had
    /// elapsed, so a host shutting down can drain one final frame through
    /// the ordinary task loop.
    pub fn force_refresh(&self) {
        self.lock_state().refresh_forced = true;
    }

    pub fn trace_unit(&self, index: usize) -> &Mutex<TraceUnit> {
        &self.trace_units[index]
    }

    pub fn plot_unit(&self, index: usize) -> &Mutex<PlotUnit> {
        &self.plot_units[index]
    }

    pub fn gather_unit(&self) -> &Mutex<GatherUnit> {
        &self.gather_unit
    }

    pub fn tonemap_unit(&self) -> &Mutex<TonemapUnit> {
        &self.tonemap_unit
    }

    pub fn display(&self) -> &(dyn Fn(usize, usize, &[u8]) + Send + Sync) {
        self.display.as_ref()
    }

    /// Copy of the HDR accumulator, for writing out at the end of a render.
    pub fn hdr_snapshot(&self) -> (usize, usize, Vec<(Float, Float, Float)>) {
        let gather = match self.gather_unit.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let bitmap = gather.bitmap();
        (bitmap.width(), bitmap.height(), bitmap.raw_copy())
    }

    fn lock_state(&self) -> MutexGuard<SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn create_trace_task(state: &mut SchedulerState) -> Task {
        let unit = state.available_traces.pop_front().unwrap();
        state.trace_in_flight[unit] = true;
        Task::Trace { unit }
    }

    fn create_plot_task(state: &mut SchedulerState) -> Task {
        let unit = state.available_plots.pop_front().unwrap();
        state.plot_in_flight[unit] = true;

        // Take around half of the done trace units, at least one. The
        // max(1, ..) guard stays even though this branch is only entered
        // with done traces waiting.
        let done = state.done_traces.len();
        let n = done.min((done / 2).max(1));
        let mut traces = Vec::with_capacity(n);
        for _ in 0..n {
            let index = state.done_traces.pop_front().unwrap();
            state.trace_in_flight[index] = true;
            traces.push(index);
        }

        Task::Plot { unit, traces }
    }

    fn create_gather_task(state: &mut SchedulerState) -> Task {
        // The gather unit is busy until the task comes back.
        state.gather_available = false;

        let mut plots = Vec::with_capacity(state.done_plots.len());
        while let Some(index) = state.done_plots.pop_front() {
            state.plot_in_flight[index] = true;
            plots.push(index);
        }

        Task::Gather { plots }
    }

    fn create_tonemap_task(state: &mut SchedulerState) -> Task {
        // The tonemapper reads the gather unit, so neither may be touched
        // until the task comes back.
        state.gather_available = false;
        state.tonemap_available = false;

        Task::Tonemap
    }

    fn complete_task(&self, state: &mut SchedulerState, completed: Task) {
        match completed {
            Task::Sleep => log::trace!("nothing to do, worker slept"),
            Task::Trace { unit } => self.complete_trace_task(state, unit),
            Task::Plot { unit, traces } => self.complete_plot_task(state, unit, traces),
            Task::Gather { plots } => self.complete_gather_task(state, plots),
            Task::Tonemap => self.complete_tonemap_task(state),
        }
    }

    fn complete_trace_task(&self, state: &mut SchedulerState, unit: usize) {
        assert!(unit < self.trace_units.len(),
                "trace unit {} is out of range", unit);
        assert!(state.trace_in_flight[unit],
                "trace unit {} completed but was not in flight", unit);

        log::debug!("done tracing with unit {}", unit);

        // The unit now needs plotting before it can trace again.
        state.trace_in_flight[unit] = false;
        state.done_traces.push_back(unit);
        state.completed_traces += 1;
    }

    fn complete_plot_task(&self, state: &mut SchedulerState, unit: usize, traces: Vec<usize>) {
        assert!(unit < self.plot_units.len(),
                "plot unit {} is out of range", unit);
        assert!(state.plot_in_flight[unit],
                "plot unit {} completed but was not in flight", unit);

        log::debug!("done plotting with unit {}, trace units {:?} available again",
                    unit, traces);

        // The plotted trace units can be used again now.
        for index in traces {
            assert!(index < self.trace_units.len(),
                    "trace unit {} is out of range", index);
            assert!(state.trace_in_flight[index],
                    "trace unit {} completed but was not in flight", index);
            state.trace_in_flight[index] = false;
            state.available_traces.push_back(index);
        }

        // The plot unit needs gathering before it can be used again.
        state.plot_in_flight[unit] = false;
        state.done_plots.push_back(unit);
    }

    fn complete_gather_task(&self, state: &mut SchedulerState, plots: Vec<usize>) {
        assert!(!state.gather_available,
                "gather completed but the gather unit was not busy");

        log::debug!("done gathering, plot units {:?} available again", plots);

        // The gathered plot units can be used again now.
        for index in plots {
            assert!(index < self.plot_units.len(),
                    "plot unit {} is out of range", index);
            assert!(state.plot_in_flight[index],
                    "plot unit {} completed but was not in flight", index);
            state.plot_in_flight[index] = false;
            state.available_plots.push_back(index);
        }

        state.gather_available = true;

        // The image must have changed because of gathering.
        state.image_changed = true;
    }

    fn complete_tonemap_task(&self, state: &mut SchedulerState) {
        assert!(!state.tonemap_available,
                "tonemap completed but the tonemap unit was not busy");

        log::debug!("done tonemapping");

        // The tonemapper is done reading the gather unit, both are free
        // again, and the display image is fresh until the next gather.
        state.gather_available = true;
        state.tonemap_available = true;
        state.image_changed = false;
        state.refresh_forced = false;

        // Throughput sample for this refresh window, in batches per second.
        let now = Instant::now();
        let ms = now.duration_since(state.last_tonemap).as_millis().max(1) as Float;
        let batches_per_second = state.completed_traces as Float * 1000.0 / ms;
        state.last_tonemap = now;
        state.completed_traces = 0;

        state.performance.record(batches_per_second);
        log::info!("performance: {:.2} +- {:.2} batches/sec",
                   state.performance.mean(), state.performance.stddev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_scheduler(num_workers: usize, refresh: Duration) -> TaskScheduler {
        let scene = Arc::new(Scene::default_scene(1.0));
        TaskScheduler::with_refresh_interval(num_workers, 8, 8, scene, 1,
                                             Box::new(|_, _, _| {}), refresh)
    }

    impl TaskScheduler {
        /// Check the partition invariant: every unit is in exactly one of
        /// available, done, in flight.
        fn assert_partition(&self) {
            let state = self.lock_state();

            let in_flight_traces = state.trace_in_flight.iter()
                .filter(|&&b| b).count();
            assert_eq!(state.available_traces.len() + state.done_traces.len()
                           + in_flight_traces,
                       self.trace_units.len());
            for i in 0..self.trace_units.len() {
                let queued = state.available_traces.contains(&i) as usize
                           + state.done_traces.contains(&i) as usize
                           + state.trace_in_flight[i] as usize;
                assert_eq!(queued, 1, "trace unit {} is in {} places", i, queued);
            }

            let in_flight_plots = state.plot_in_flight.iter()
                .filter(|&&b| b).count();
            assert_eq!(state.available_plots.len() + state.done_plots.len()
                           + in_flight_plots,
                       self.plot_units.len());
            for i in 0..self.plot_units.len() {
                let queued = state.available_plots.contains(&i) as usize
                           + state.done_plots.contains(&i) as usize
                           + state.plot_in_flight[i] as usize;
                assert_eq!(queued, 1, "plot unit {} is in {} places", i, queued);
            }
        }

        fn performance_samples(&self) -> usize {
            self.lock_state().performance.len()
        }
    }

    #[test]
    fn test_cold_start_dispatches_first_trace() {
        let scheduler = test_scheduler(2, TONEMAP_INTERVAL);

        let task = scheduler.get_new_task(Task::Sleep);
        assert_eq!(task, Task::Trace { unit: 0 });

        let state = scheduler.lock_state();
        assert_eq!(state.available_traces, (1..6).collect::<VecDeque<_>>());
        assert!(state.trace_in_flight[0]);
    }

    #[test]
    fn test_fully_done_pool_triggers_plot_with_half_the_traces() {
        // With two workers there are six trace units and one plot unit.
        let scheduler = test_scheduler(2, TONEMAP_INTERVAL);

        // Put the scheduler in the state where every trace unit has been
        // traced but none plotted yet.
        {
            let mut state = scheduler.lock_state();
            state.available_traces.clear();
            state.done_traces = (0..6).collect();
            state.completed_traces = 6;
        }
        scheduler.assert_partition();

        // Six done traces: the plot takes the three oldest.
        let task = scheduler.get_new_task(Task::Sleep);
        assert_eq!(task, Task::Plot { unit: 0, traces: vec![0, 1, 2] });

        let state = scheduler.lock_state();
        assert_eq!(state.done_traces, VecDeque::from(vec![3, 4, 5]));
        drop(state);

        // After the plot completes, its traces are available again, the
        // plot waits for a gather, and the next dispatch goes back to
        // tracing.
        let task = scheduler.get_new_task(Task::Plot { unit: 0, traces: vec![0, 1, 2] });
        assert_eq!(task, Task::Trace { unit: 0 });

        let state = scheduler.lock_state();
        assert_eq!(state.done_plots, VecDeque::from(vec![0]));
        assert_eq!(state.available_traces, VecDeque::from(vec![1, 2]));
        drop(state);
        scheduler.assert_partition();
    }

    #[test]
    fn test_plot_pressure_fires_past_half_the_pool() {
        let scheduler = test_scheduler(2, TONEMAP_INTERVAL);

        // Interleaved tracing: each completion hands out the next trace
        // unit while fewer than half the pool is done.
        assert_eq!(scheduler.get_new_task(Task::Sleep), Task::Trace { unit: 0 });
        for unit in 0..3 {
            assert_eq!(scheduler.get_new_task(Task::Trace { unit }),
                       Task::Trace { unit: unit + 1 });
        }

        // The fourth completion pushes done traces past half the pool of
        // six, so plotting takes priority over the two remaining traces.
        let task = scheduler.get_new_task(Task::Trace { unit: 3 });
        assert_eq!(task, Task::Plot { unit: 0, traces: vec![0, 1] });
        scheduler.assert_partition();
    }

    #[test]
    fn test_display_refresh_gathers_then_tonemaps() {
        // A zero refresh interval makes the refresh branch always due.
        let scheduler = test_scheduler(2, Duration::ZERO);

        // No gathered data yet, so the refresh branch cannot fire and
        // ordinary tracing begins.
        assert_eq!(scheduler.get_new_task(Task::Sleep), Task::Trace { unit: 0 });
        for unit in 0..3 {
            assert_eq!(scheduler.get_new_task(Task::Trace { unit }),
                       Task::Trace { unit: unit + 1 });
        }

        // More than half the pool is done: plot the two oldest traces.
        let task = scheduler.get_new_task(Task::Trace { unit: 3 });
        assert_eq!(task, Task::Plot { unit: 0, traces: vec![0, 1] });

        // Once the plot is done, the elapsed timer prefers gathering it.
        let task = scheduler.get_new_task(Task::Plot { unit: 0, traces: vec![0, 1] });
        assert_eq!(task, Task::Gather { plots: vec![0] });

        {
            let state = scheduler.lock_state();
            assert!(!state.gather_available);
            assert!(!state.image_changed);
        }

        // Gather completion marks the image stale; the still-elapsed timer
        // then selects a tonemap.
        let task = scheduler.get_new_task(Task::Gather { plots: vec![0] });
        assert_eq!(task, Task::Tonemap);

        {
            let state = scheduler.lock_state();
            assert!(!state.gather_available);
            assert!(!state.tonemap_available);
            assert!(state.image_changed);
        }

        // Tonemap completion restores both singletons, marks the image
        // fresh and appends one performance sample.
        scheduler.get_new_task(Task::Tonemap);
        let state = scheduler.lock_state();
        assert!(state.gather_available);
        assert!(state.tonemap_available);
        assert!(!state.image_changed);
        assert_eq!(state.performance.len(), 1);
        assert_eq!(state.completed_traces, 0);
    }

    #[test]
    fn test_deadlock_escape_returns_idempotent_sleep() {
        let scheduler = test_scheduler(2, TONEMAP_INTERVAL);

        // Tie up all six trace units, then the plot unit as well.
        for unit in 0..6 {
            assert_eq!(scheduler.get_new_task(Task::Sleep), Task::Trace { unit });
        }
        let task = scheduler.get_new_task(Task::Trace { unit: 0 });
        assert_eq!(task, Task::Plot { unit: 0, traces: vec![0] });

        // Every unit of both pools is now in flight.
        let task = scheduler.get_new_task(Task::Sleep);
        assert_eq!(task, Task::Sleep);

        // Sleep changed nothing.
        let state = scheduler.lock_state();
        assert!(state.available_traces.is_empty());
        assert!(state.done_traces.is_empty());
        assert!(state.available_plots.is_empty());
        assert!(state.done_plots.is_empty());
        assert!(state.trace_in_flight.iter().all(|&b| b));
        assert!(state.plot_in_flight.iter().all(|&b| b));
        assert!(state.gather_available);
        assert!(state.tonemap_available);
        assert_eq!(state.completed_traces, 1);
        drop(state);
        scheduler.assert_partition();
    }

    #[test]
    fn test_gather_consumes_all_done_plots() {
        // Eight workers give four plot units and twenty-four trace units.
        let scheduler = test_scheduler(8, TONEMAP_INTERVAL);

        // Starve everything upstream: all traces in flight, three plots
        // done, the fourth in flight. Only the gather rule can fire.
        {
            let mut state = scheduler.lock_state();
            state.available_traces.clear();
            for busy in state.trace_in_flight.iter_mut() {
                *busy = true;
            }
            state.available_plots.clear();
            state.done_plots = (0..3).collect();
            state.plot_in_flight[3] = true;
        }
        scheduler.assert_partition();

        let task = scheduler.get_new_task(Task::Sleep);
        assert_eq!(task, Task::Gather { plots: vec![0, 1, 2] });

        {
            let state = scheduler.lock_state();
            assert!(state.done_plots.is_empty());
            assert!(!state.gather_available);
        }

        scheduler.get_new_task(Task::Gather { plots: vec![0, 1, 2] });
        let state = scheduler.lock_state();
        assert!(state.gather_available);
        assert!(state.image_changed);
        assert_eq!(state.available_plots, VecDeque::from(vec![0, 1, 2]));
    }

    #[test]
    fn test_conforming_worker_simulation_preserves_partition() {
        // Emulate four workers completing tasks in a skewed order and check
        // the partition invariant at every monitor boundary.
        let scheduler = test_scheduler(4, TONEMAP_INTERVAL);
        let mut rng = LcgRng::new(0xfeed);
        let mut held: Vec<Task> = vec![Task::Sleep; 4];

        for _ in 0..2000 {
            let worker = (rng.next_u32() as usize) % held.len();
            let completed = std::mem::replace(&mut held[worker], Task::Sleep);
            let task = scheduler.get_new_task(completed);
            scheduler.assert_partition();

            // No two outstanding tasks may name a common unit.
            for (i, other) in held.iter().enumerate() {
                if i == worker {
                    continue;
                }
                match (&task, other) {
                    (Task::Trace { unit: a }, Task::Trace { unit: b }) => {
                        assert_ne!(a, b);
                    }
                    (Task::Trace { unit: a }, Task::Plot { traces, .. }) => {
                        assert!(!traces.contains(a));
                    }
                    (Task::Plot { traces, .. }, Task::Trace { unit: b }) => {
                        assert!(!traces.contains(b));
                    }
                    (Task::Plot { unit: a, traces: ta },
                     Task::Plot { unit: b, traces: tb }) => {
                        assert_ne!(a, b);
                        assert!(ta.iter().all(|t| !tb.contains(t)));
                    }
                    (Task::Gather { plots }, Task::Plot { unit, .. }) => {
                        assert!(!plots.contains(unit));
                    }
                    (Task::Plot { unit, .. }, Task::Gather { plots }) => {
                        assert!(!plots.contains(unit));
                    }
                    _ => {}
                }
            }

            held[worker] = task;
        }
    }

    #[test]
    fn test_forced_refresh_drains_a_frame() {
        let scheduler = test_scheduler(1, TONEMAP_INTERVAL);

        // One worker: three trace units, one plot unit. Build up one done
        // plot the ordinary way.
        for unit in 0..3 {
            assert_eq!(scheduler.get_new_task(Task::Sleep), Task::Trace { unit });
        }
        let task = scheduler.get_new_task(Task::Trace { unit: 0 });
        assert_eq!(task, Task::Plot { unit: 0, traces: vec![0] });
        assert_eq!(scheduler.get_new_task(Task::Plot { unit: 0, traces: vec![0] }),
                   Task::Trace { unit: 0 });

        // Without the forced refresh the done plot would just wait.
        scheduler.force_refresh();
        assert_eq!(scheduler.get_new_task(Task::Sleep), Task::Gather { plots: vec![0] });
        assert_eq!(scheduler.get_new_task(Task::Gather { plots: vec![0] }), Task::Tonemap);
        scheduler.get_new_task(Task::Tonemap);

        // Completing the tonemap clears the forced flag.
        assert!(!scheduler.lock_state().refresh_forced);
        assert_eq!(scheduler.performance_samples(), 1);
    }

    #[test]
    #[should_panic(expected = "not in flight")]
    fn test_completing_foreign_task_aborts() {
        let scheduler = test_scheduler(2, TONEMAP_INTERVAL);
        scheduler.get_new_task(Task::Trace { unit: 3 });
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_completing_out_of_range_unit_aborts() {
        let scheduler = test_scheduler(2, TONEMAP_INTERVAL);
        scheduler.get_new_task(Task::Trace { unit: 99 });
    }
}
