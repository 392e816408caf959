// Copyright @yucwang 2026

use crate::scheduler::scheduler::TaskScheduler;
use crate::scheduler::task::Task;

use std::sync::{ Arc, Mutex, MutexGuard };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread;
use std::time::Duration;

/// How long a worker backs off when the scheduler hands out a sleep task.
const SLEEP_DURATION: Duration = Duration::from_millis(50);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Executes the numerical bodies of the tasks the scheduler hands out. A
/// worker only ever touches the units its current task names.
pub struct Worker {
    scheduler: Arc<TaskScheduler>,
    stop: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(scheduler: Arc<TaskScheduler>, stop: Arc<AtomicBool>) -> Self {
        Self { scheduler, stop }
    }

    /// Request and execute tasks until the stop flag is raised. The first
    /// request passes the sleep sentinel. On the way out the worker keeps
    /// handing tasks back so the scheduler's books stay closed: the last
    /// executed task first, then every task dispensed in exchange, returned
    /// unexecuted with its content discarded.
    pub fn run(&self) {
        let mut task = Task::Sleep;
        while !self.stop.load(Ordering::Relaxed) {
            task = self.scheduler.get_new_task(task);
            self.execute(&task);
        }

        // Stop once a trace or a sleep comes out. The trace pool holds
        // three units per worker, so walking away from one trace dispatch
        // cannot starve anything; a plot, gather or tonemap left in flight
        // would wedge its pool for good, so those are always handed back.
        for _ in 0..64 {
            task = self.scheduler.get_new_task(task);
            match task {
                Task::Trace { .. } | Task::Sleep => break,
                _ => {}
            }
        }
    }

    pub fn execute(&self, task: &Task) {
        match task {
            Task::Sleep => thread::sleep(SLEEP_DURATION),
            Task::Trace { unit } => {
                let mut trace = lock(self.scheduler.trace_unit(*unit));
                trace.trace();
            }
            Task::Plot { unit, traces } => {
                let mut plot = lock(self.scheduler.plot_unit(*unit));
                for &index in traces {
                    let trace = lock(self.scheduler.trace_unit(index));
                    plot.plot(trace.photons());
                }
            }
            Task::Gather { plots } => {
                let mut gather = lock(self.scheduler.gather_unit());
                for &index in plots {
                    let mut plot = lock(self.scheduler.plot_unit(index));
                    gather.accumulate(&mut plot);
                }
            }
            Task::Tonemap => {
                let mut tonemap = lock(self.scheduler.tonemap_unit());
                {
                    let gather = lock(self.scheduler.gather_unit());
                    tonemap.tonemap(&gather);
                }
                // The display sink runs outside every scheduler lock so a
                // slow consumer cannot stall the pipeline.
                self.scheduler.display()(tonemap.width(), tonemap.height(),
                                         tonemap.rgb());
            }
        }
    }
}

/// Pump the pipeline on the calling thread until one more frame reaches the
/// display sink. Meant for after the worker threads have stopped, so a
/// render shorter than the refresh interval still produces an image.
pub fn drain_final_frame(scheduler: &Arc<TaskScheduler>) {
    scheduler.force_refresh();

    let worker = Worker::new(scheduler.clone(), Arc::new(AtomicBool::new(false)));
    let mut task = Task::Sleep;
    let mut idle = 0;

    for _ in 0..1000 {
        task = scheduler.get_new_task(task);
        let finished = task == Task::Tonemap;

        // Units abandoned by stopped workers can leave the pipeline with no
        // way forward; give up after a few fruitless rounds.
        idle = if task == Task::Sleep { idle + 1 } else { 0 };
        if idle >= 3 {
            return;
        }

        worker.execute(&task);
        if finished {
            scheduler.get_new_task(task);
            return;
        }
    }
}
