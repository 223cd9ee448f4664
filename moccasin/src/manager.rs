//! Run control.
//!
//! A [`Manager`] owns the top-level composite and drives it through the
//! actor lifecycle:
//!
//! 1. the graph is validated, which also computes schedules and causal
//!    orders,
//! 2. all actors are preinitialized then initialized, recursively,
//! 3. the top-level composite is iterated until its director reports that
//!    nothing is left to do, an actor requests termination, a configured
//!    limit is reached, or a stop is requested,
//! 4. all actors that were preinitialized are wrapped up, whatever the
//!    outcome of the previous phases.
//!
//! Stop, pause and resume requests are cooperative: they are checked between
//! iterations, except in process networks where a stop request also
//! releases threads blocked on a channel. They can be issued from any thread
//! through a [`ManagerHandle`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use moccasin::composite::CompositeActor;
//! use moccasin::director::DeDirector;
//! use moccasin::library::{PeriodicSource, Recorder};
//! use moccasin::manager::{self, RunConfig, RunOutcome};
//! use moccasin::time::MonotonicTime;
//!
//! let mut top = CompositeActor::new("top", DeDirector::new());
//! let clock = top.add_actor("clock", PeriodicSource::new(Duration::from_secs(1))).unwrap();
//! let recorder = Recorder::new();
//! let log = recorder.handle();
//! let sink = top.add_actor("sink", recorder).unwrap();
//! top.connect(clock.port("out"), sink.port("in")).unwrap();
//!
//! let config = RunConfig::new().with_stop_time(MonotonicTime::EPOCH + Duration::from_secs(3));
//! let outcome = manager::run(top, config).unwrap();
//!
//! assert_eq!(outcome, RunOutcome::Completed);
//! assert_eq!(log.len(), 4);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_utils::atomic::AtomicCell;
use parking_lot::{Condvar, Mutex};
use slab::Slab;
use tracing::{error, info, warn};

use crate::actor::{Actor, Context, Frame};
use crate::composite::CompositeActor;
use crate::director::Continuation;
use crate::error::{ActionError, ExecutionError};
use crate::time::{AutoSystemClock, Clock, MonotonicTime, NoClock, SuperdenseTime, SyncStatus};

/// Something to wake up when a stop is requested.
pub(crate) trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

/// Phase of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ManagerState {
    /// The run has not started.
    Idle,
    /// Actors are being preinitialized.
    Preinitializing,
    /// Actors are being initialized.
    Initializing,
    /// The top-level composite is being iterated.
    Iterating,
    /// The run is paused between two iterations.
    Paused,
    /// Actors are being wrapped up.
    WrappingUp,
    /// The run is over.
    Finished,
}

/// How a run ended, when it did not fail.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    /// The top-level director ran out of work, the stop time was reached or
    /// the iteration limit was hit.
    Completed,
    /// An actor requested termination, or a stop was requested.
    Terminated,
}

/// Options of a run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    iteration_limit: Option<u64>,
    stop_time: Option<MonotonicTime>,
    start_time: MonotonicTime,
    real_time_sync: bool,
    timeout: Option<Duration>,
}

impl RunConfig {
    /// Creates a configuration without limits, starting at
    /// [`MonotonicTime::EPOCH`].
    pub fn new() -> Self {
        Self {
            iteration_limit: None,
            stop_time: None,
            start_time: MonotonicTime::EPOCH,
            real_time_sync: false,
            timeout: None,
        }
    }

    /// Stops the run after the specified number of top-level iterations.
    pub fn with_iteration_limit(mut self, iterations: u64) -> Self {
        self.iteration_limit = Some(iterations);
        self
    }

    /// Stops the run once model time would exceed the specified time.
    pub fn with_stop_time(mut self, stop_time: MonotonicTime) -> Self {
        self.stop_time = Some(stop_time);
        self
    }

    /// Sets the model time at which the run starts.
    pub fn with_start_time(mut self, start_time: MonotonicTime) -> Self {
        self.start_time = start_time;
        self
    }

    /// Paces iterations so that model time does not run ahead of wall-clock
    /// time.
    ///
    /// An [`AutoSystemClock`] is used unless a clock is set with
    /// [`Manager::set_clock()`].
    pub fn with_real_time_sync(mut self, enabled: bool) -> Self {
        self.real_time_sync = enabled;
        self
    }

    /// Requests a stop once the specified wall-clock duration has elapsed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the iteration limit, if any.
    pub fn iteration_limit(&self) -> Option<u64> {
        self.iteration_limit
    }

    /// Returns the stop time, if any.
    pub fn stop_time(&self) -> Option<MonotonicTime> {
        self.stop_time
    }

    /// Returns the start time.
    pub fn start_time(&self) -> MonotonicTime {
        self.start_time
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags and counters shared between a run and its handles.
pub(crate) struct RunControl {
    stop: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    state: AtomicCell<ManagerState>,
    time: AtomicCell<SuperdenseTime>,
    iterations: AtomicU64,
    interrupts: Mutex<Slab<Arc<dyn Interrupt>>>,
}

impl RunControl {
    pub(crate) fn new() -> Self {
        Self {
            stop: AtomicBool::new(false),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            state: AtomicCell::new(ManagerState::Idle),
            time: AtomicCell::new(SuperdenseTime::EPOCH),
            iterations: AtomicU64::new(0),
            interrupts: Mutex::new(Slab::new()),
        }
    }

    /// Requests a stop and wakes everything that may block the run.
    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        {
            let _paused = self.paused.lock();
            self.resumed.notify_all();
        }

        let interrupts: Vec<Arc<dyn Interrupt>> =
            self.interrupts.lock().iter().map(|(_, i)| i.clone()).collect();
        for interrupt in interrupts {
            interrupt.interrupt();
        }
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Registers an interrupt until the returned registration is dropped.
    pub(crate) fn register_interrupt(
        self: &Arc<Self>,
        interrupt: Arc<dyn Interrupt>,
    ) -> InterruptRegistration {
        let key = self.interrupts.lock().insert(interrupt);

        InterruptRegistration {
            control: self.clone(),
            key,
        }
    }

    fn pause(&self) {
        *self.paused.lock() = true;
    }

    fn resume(&self) {
        *self.paused.lock() = false;
        self.resumed.notify_all();
    }

    /// Blocks while the run is paused and no stop was requested.
    fn wait_while_paused(&self) {
        let mut paused = self.paused.lock();
        if !*paused || self.is_stop_requested() {
            return;
        }

        self.state.store(ManagerState::Paused);
        while *paused && !self.is_stop_requested() {
            self.resumed.wait(&mut paused);
        }
        self.state.store(ManagerState::Iterating);
    }

    fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.iterations.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for RunControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunControl")
            .field("stop", &self.is_stop_requested())
            .field("state", &self.state.load())
            .finish_non_exhaustive()
    }
}

/// Keeps an interrupt registered with a [`RunControl`].
pub(crate) struct InterruptRegistration {
    control: Arc<RunControl>,
    key: usize,
}

impl Drop for InterruptRegistration {
    fn drop(&mut self) {
        self.control.interrupts.lock().try_remove(self.key);
    }
}

/// A handle to observe and control a run from another thread.
#[derive(Clone)]
pub struct ManagerHandle {
    control: Arc<RunControl>,
}

impl ManagerHandle {
    /// Requests the run to stop.
    ///
    /// The current iteration completes first, unless it is blocked on a
    /// process-network channel, in which case the channel is released.
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Requests the run to pause before the next iteration.
    pub fn pause(&self) {
        self.control.pause();
    }

    /// Resumes a paused run.
    pub fn resume(&self) {
        self.control.resume();
    }

    /// Returns the current phase of the run.
    pub fn state(&self) -> ManagerState {
        self.control.state.load()
    }

    /// Returns the model time reached by the last completed iteration.
    pub fn time(&self) -> SuperdenseTime {
        self.control.time.load()
    }

    /// Returns the number of completed top-level iterations.
    pub fn iterations(&self) -> u64 {
        self.control.iterations.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("state", &self.state())
            .field("time", &self.time())
            .finish_non_exhaustive()
    }
}

/// Executes a top-level composite.
pub struct Manager {
    top: CompositeActor,
    config: RunConfig,
    clock: Option<Box<dyn Clock + 'static>>,
    control: Arc<RunControl>,
}

impl Manager {
    /// Creates a manager for the specified top-level composite.
    pub fn new(top: CompositeActor, config: RunConfig) -> Self {
        Self {
            top,
            config,
            clock: None,
            control: Arc::new(RunControl::new()),
        }
    }

    /// Synchronizes iterations with the provided [`Clock`].
    ///
    /// If no clock is set, iterations run as fast as possible unless
    /// real-time synchronization is enabled in the [`RunConfig`].
    pub fn set_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));

        self
    }

    /// Returns a handle to control the run from another thread.
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            control: self.control.clone(),
        }
    }

    /// Returns the top-level composite.
    pub fn top(&self) -> &CompositeActor {
        &self.top
    }

    /// Returns the top-level composite, consuming the manager.
    pub fn into_top(self) -> CompositeActor {
        self.top
    }

    /// Runs the model to the end.
    ///
    /// Wrapup is invoked on every preinitialized actor whatever the outcome.
    /// If wrapup fails after the run itself failed, the wrapup error is
    /// logged and the original error is returned.
    pub fn run(&mut self) -> Result<RunOutcome, ExecutionError> {
        let name = self.top.name().to_owned();
        let control = self.control.clone();
        control.reset();
        info!(model = %name, "run started");

        let mut frame = Frame::new(
            SuperdenseTime::at(self.config.start_time),
            self.config.stop_time,
            control.clone(),
        );
        control.time.store(frame.tag);

        let result = match self.config.timeout {
            Some(timeout) => Watchdog::spawn(control.clone(), timeout)
                .map_err(|e| {
                    ExecutionError::from(ActionError::Failed {
                        actor: name.clone(),
                        message: format!("could not spawn the watchdog thread: {e}"),
                    })
                })
                .and_then(|_watchdog| self.execute(&name, &mut frame)),
            None => self.execute(&name, &mut frame),
        };

        control.state.store(ManagerState::WrappingUp);
        let wrapup = {
            let mut ctx = Context::new(&name, &[], &[], &mut frame);
            self.top.wrapup(&mut ctx)
        };
        control.state.store(ManagerState::Finished);

        let result = match (result, wrapup) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(wrapup_error)) => {
                error!(
                    model = %name,
                    error = %wrapup_error,
                    "wrapup failed after an earlier error"
                );
                Err(e)
            }
        };
        match &result {
            Ok(outcome) => info!(
                model = %name,
                ?outcome,
                iterations = control.iterations.load(Ordering::Relaxed),
                "run finished"
            ),
            Err(e) => info!(model = %name, error = %e, "run failed"),
        }

        result
    }

    fn execute(&mut self, name: &str, frame: &mut Frame) -> Result<RunOutcome, ExecutionError> {
        let control = self.control.clone();
        self.top.validate()?;

        let mut ctx = Context::new(name, &[], &[], frame);
        control.state.store(ManagerState::Preinitializing);
        self.top.preinitialize(&mut ctx)?;
        control.state.store(ManagerState::Initializing);
        self.top.initialize(&mut ctx)?;
        control.state.store(ManagerState::Iterating);

        let mut clock: Box<dyn Clock> = match self.clock.take() {
            Some(clock) => clock,
            None if self.config.real_time_sync => Box::new(AutoSystemClock::new()),
            None => Box::new(NoClock::new()),
        };
        clock.synchronize(self.config.start_time);

        let mut iterations = 0;
        let outcome = loop {
            control.wait_while_paused();
            if control.is_stop_requested() {
                break RunOutcome::Terminated;
            }
            if self.config.iteration_limit.is_some_and(|limit| iterations >= limit) {
                break RunOutcome::Completed;
            }

            if !self.top.prefire(&mut ctx)? {
                // At the top level, a composite that cannot fire has nothing
                // left to do.
                break RunOutcome::Completed;
            }
            if let Some(time) = self.top.next_iteration_time() {
                if let SyncStatus::OutOfSync(lag) = clock.synchronize(time) {
                    warn!(model = %name, ?lag, "model time lags behind wall-clock time");
                }
            }
            self.top.fire(&mut ctx)?;
            let continuation = self.top.postfire_continuation(&mut ctx)?;

            iterations += 1;
            control.iterations.store(iterations, Ordering::Relaxed);
            if let Some(tag) = self.top.tag() {
                control.time.store(tag);
            }

            match continuation {
                Continuation::Continue => {}
                Continuation::Idle => break RunOutcome::Completed,
                Continuation::Terminate => break RunOutcome::Terminated,
            }
        };
        self.clock = Some(clock);

        Ok(outcome)
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("top", &self.top)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Runs a top-level composite to the end with the specified options.
pub fn run(top: CompositeActor, config: RunConfig) -> Result<RunOutcome, ExecutionError> {
    Manager::new(top, config).run()
}

/// Issues a stop request once a wall-clock timeout has elapsed, unless it is
/// dropped first.
struct Watchdog {
    cancelled: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn spawn(control: Arc<RunControl>, timeout: Duration) -> std::io::Result<Self> {
        let cancelled = Arc::new((Mutex::new(false), Condvar::new()));
        let deadline = Instant::now() + timeout;

        let thread = thread::Builder::new().name("moccasin-watchdog".to_owned()).spawn({
            let cancelled = cancelled.clone();
            move || {
                let (lock, condvar) = &*cancelled;
                let mut done = lock.lock();
                while !*done {
                    if condvar.wait_until(&mut done, deadline).timed_out() {
                        if !*done {
                            info!(?timeout, "timeout elapsed, stopping the run");
                            control.stop();
                        }
                        return;
                    }
                }
            }
        })?;

        Ok(Self {
            cancelled,
            thread: Some(thread),
        })
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        let (lock, condvar) = &*self.cancelled;
        *lock.lock() = true;
        condvar.notify_all();

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
