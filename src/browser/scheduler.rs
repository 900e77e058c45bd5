use super::release_later;
use crate::scheduler::{Cancellation, Scheduler, Sleeper};
use futures::future::LocalBoxFuture;
use gloo_timers::callback::{Interval, Timeout};
use std::time::Duration;

fn millis(duration: Duration) -> u32 {
    duration.as_millis().min(u32::MAX as u128) as u32
}

/// The page's event loop: `setTimeout`, `setInterval` and microtasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserScheduler;

impl Scheduler for BrowserScheduler {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Cancellation {
        let timeout = Timeout::new(millis(delay), task);
        Cancellation::new(move || release_later(timeout))
    }

    fn set_interval(&self, period: Duration, mut task: Box<dyn FnMut()>) -> Cancellation {
        let interval = Interval::new(millis(period), move || task());
        Cancellation::new(move || release_later(interval))
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        wasm_bindgen_futures::spawn_local(task);
    }
}

impl Sleeper for BrowserScheduler {
    fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()> {
        Box::pin(gloo_timers::future::sleep(delay))
    }
}
