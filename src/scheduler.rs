//! Timer scheduling and cancellation handles.
//!
//! Every timer or observer registration hands back a [`Cancellation`].
//! Owners collect them in [`Disposables`] so teardown is a single call.

use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Handle that tears down a timer or observer.
///
/// Dropping the handle cancels it; `cancel` does the same explicitly.
/// Cancelling something that already ran is a no-op.
pub struct Cancellation {
    teardown: Option<Box<dyn FnOnce()>>,
}

impl Cancellation {
    pub fn new(teardown: impl FnOnce() + 'static) -> Self {
        Cancellation {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A handle with nothing to tear down.
    pub fn noop() -> Self {
        Cancellation { teardown: None }
    }

    pub fn cancel(mut self) {
        self.run_teardown();
    }

    fn run_teardown(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl Drop for Cancellation {
    fn drop(&mut self) {
        self.run_teardown();
    }
}

impl fmt::Debug for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancellation")
            .field("armed", &self.teardown.is_some())
            .finish()
    }
}

/// A bag of handles released together.
#[derive(Debug, Default)]
pub struct Disposables {
    handles: Vec<Cancellation>,
}

impl Disposables {
    pub fn new() -> Self {
        Disposables { handles: Vec::new() }
    }

    pub fn push(&mut self, handle: Cancellation) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel everything, newest first.
    pub fn dispose_all(&mut self) {
        while let Some(handle) = self.handles.pop() {
            handle.cancel();
        }
    }
}

/// The event loop seen by the orchestrator, handlers and notifications.
pub trait Scheduler {
    /// Milliseconds since an arbitrary epoch.
    fn now_ms(&self) -> f64;

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Cancellation;

    fn set_interval(&self, period: Duration, task: Box<dyn FnMut()>) -> Cancellation;

    /// Run a future on the single-threaded event loop.
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>);
}

/// Async delay used between retry attempts.
pub trait Sleeper {
    fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()>;
}

/// Collapses a burst of triggers into one run after `delay` of quiet.
pub struct Debouncer {
    scheduler: Rc<dyn Scheduler>,
    delay: Duration,
    pending: RefCell<Option<Cancellation>>,
}

impl Debouncer {
    pub fn new(scheduler: Rc<dyn Scheduler>, delay: Duration) -> Self {
        Debouncer {
            scheduler,
            delay,
            pending: RefCell::new(None),
        }
    }

    /// Schedule `task`, replacing (and cancelling) any pending one.
    pub fn trigger(&self, task: Box<dyn FnOnce()>) {
        let handle = self.scheduler.set_timeout(self.delay, task);
        let previous = self.pending.replace(Some(handle));
        drop(previous);
    }

    pub fn cancel(&self) {
        let previous = self.pending.take();
        drop(previous);
    }
}

/// Minimum-interval gate.
#[derive(Debug)]
pub struct Throttle {
    min_interval_ms: f64,
    last_run: Cell<Option<f64>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Throttle {
            min_interval_ms: min_interval.as_millis() as f64,
            last_run: Cell::new(None),
        }
    }

    /// True (and records `now_ms`) when at least the minimum interval has passed.
    pub fn try_acquire(&self, now_ms: f64) -> bool {
        match self.last_run.get() {
            Some(last) if now_ms - last < self.min_interval_ms => false,
            _ => {
                self.last_run.set(Some(now_ms));
                true
            }
        }
    }

    pub fn reset(&self) {
        self.last_run.set(None);
    }
}
