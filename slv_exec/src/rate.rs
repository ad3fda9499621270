//! # Rate thread
//!
//! Runs a [`Periodic`] task at a fixed period on its own thread. The thread can be suspended, in
//! which case the task is not run but the thread keeps ticking, and stopped, which blocks until
//! the current activation has completed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, atomic::{AtomicBool, AtomicU64, Ordering}},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use log::{error, trace, warn};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A task run periodically by a [`RateThread`].
pub trait Periodic: Send + Sync {
    /// Called once before the first activation, the thread is not started if false is returned.
    fn thread_init(&self) -> bool {
        true
    }

    /// A single activation.
    fn run(&self);

    /// Called once after the last activation.
    fn thread_release(&self) {}
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct RateThread {
    name: String,
    shared: Arc<Shared>,
    join_handle: Option<JoinHandle<()>>,
}

/// State shared with the background thread
struct Shared {
    run: AtomicBool,
    suspended: AtomicBool,
    period_us: AtomicU64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RateThread {
    pub fn new(name: &str, period: Duration) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                run: AtomicBool::new(false),
                suspended: AtomicBool::new(false),
                period_us: AtomicU64::new(period.as_micros() as u64),
            }),
            join_handle: None,
        }
    }

    /// Start running `task`.
    ///
    /// Returns false if the thread is already running or if the task failed to initialise.
    pub fn start(&mut self, task: Arc<dyn Periodic>) -> bool {
        if self.is_running() {
            return false;
        }

        // Reap a thread which stopped on its own
        self.join();

        if !task.thread_init() {
            error!("{} failed to initialise", self.name);
            return false;
        }

        self.shared.run.store(true, Ordering::SeqCst);
        self.shared.suspended.store(false, Ordering::SeqCst);

        let shared = self.shared.clone();
        let name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || rate_loop(&name, &shared, task));

        match spawned {
            Ok(jh) => {
                self.join_handle = Some(jh);
                true
            },
            Err(e) => {
                error!("Could not spawn the {} thread: {}", self.name, e);
                self.shared.run.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Stop the thread, blocking until the current activation has completed.
    pub fn stop(&mut self) {
        self.shared.run.store(false, Ordering::SeqCst);
        self.join();
        self.shared.suspended.store(false, Ordering::SeqCst);
    }

    pub fn suspend(&self) {
        self.shared.suspended.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.suspended.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.join_handle.is_some() && self.shared.run.load(Ordering::SeqCst)
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.suspended.load(Ordering::SeqCst)
    }

    pub fn set_period(&self, period: Duration) {
        self.shared.period_us.store(period.as_micros() as u64, Ordering::SeqCst);
    }

    fn join(&mut self) {
        if let Some(jh) = self.join_handle.take() {
            if jh.join().is_err() {
                error!("{} thread panicked", self.name);
            }
        }
    }
}

impl Drop for RateThread {
    fn drop(&mut self) {
        self.stop();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn rate_loop(name: &str, shared: &Shared, task: Arc<dyn Periodic>) {
    trace!("{} thread started", name);

    while shared.run.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();
        let period = Duration::from_micros(shared.period_us.load(Ordering::SeqCst));

        if !shared.suspended.load(Ordering::SeqCst) {
            task.run();
        }

        let cycle_dur = Instant::now() - cycle_start;

        match period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "{} cycle overran by {:.06} s",
                name,
                cycle_dur.as_secs_f64() - period.as_secs_f64()
            )
        }
    }

    task.thread_release();

    trace!("{} thread stopped", name);
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
