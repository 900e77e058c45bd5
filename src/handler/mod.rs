//! Platform handlers: find videos, attach capture controls, submit captures.
//!
//! The three site families share one engine ([`engine::VideoHandler`]) and
//! differ only in their [`engine::Heuristics`]: selectors, where the control
//! goes, and what metadata is scraped.

pub mod engine;
pub mod instagram;
pub mod tiktok;
pub mod youtube;

use crate::api::ApiClient;
use crate::capture::CaptureRequest;
use crate::config::ExtensionConfig;
use crate::dom::Page;
use crate::error::{CaptureError, DomError};
use crate::notification::NotificationCenter;
use crate::platform::Platform;
use crate::scheduler::{Cancellation, Scheduler};
use engine::{Upload, VideoHandler};
use serde::Serialize;
use std::rc::Rc;

/// Everything a handler needs, passed in explicitly.
pub struct HandlerContext<P: Page> {
    pub page: Rc<P>,
    pub scheduler: Rc<dyn Scheduler>,
    pub api: Rc<ApiClient>,
    pub notifications: Rc<NotificationCenter>,
    pub config: Rc<ExtensionConfig>,
}

impl<P: Page> Clone for HandlerContext<P> {
    fn clone(&self) -> Self {
        HandlerContext {
            page: self.page.clone(),
            scheduler: self.scheduler.clone(),
            api: self.api.clone(),
            notifications: self.notifications.clone(),
            config: self.config.clone(),
        }
    }
}

/// What one scan pass found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub candidates: usize,
    pub injected: usize,
    pub already_present: usize,
    pub skipped: usize,
}

/// Contract shared by every platform variant.
pub trait PlatformHandler<P: Page> {
    fn platform(&self) -> Platform;

    /// Schedule the initial scan and install observers.
    fn setup(&mut self);

    /// Attach a control to every candidate that lacks one. Never fails;
    /// problem candidates are logged and skipped.
    fn scan_and_inject(&self) -> ScanReport;

    /// Forget detached controls, then scan again. Live controls are kept.
    fn rescan(&self) -> ScanReport;

    /// Debounced mutation watcher that re-runs the scan.
    fn observe_mutations(&self) -> Result<Cancellation, DomError>;

    /// Rate-limited scroll watcher, for platforms that load videos on scroll.
    fn observe_scroll(&self) -> Option<Result<Cancellation, DomError>>;

    fn capture(&self, video: &P::Node) -> Result<CaptureRequest, CaptureError>;

    /// Capture the first live video on the page.
    fn capture_current(&self) -> Result<CaptureRequest, CaptureError>;

    /// Capture the first live video and start uploading it, under the same
    /// in-flight guard as the injected controls.
    fn submit_current(&self) -> Result<Upload, CaptureError>;

    /// Cancel observers and timers and remove injected controls.
    /// Safe to call more than once.
    fn dispose(&mut self);

    /// Live injected controls.
    fn control_count(&self) -> usize;
}

/// Build the handler for a platform. `Unsupported` has none.
pub fn create_handler<P: Page + 'static>(
    platform: Platform,
    ctx: &HandlerContext<P>,
) -> Option<Box<dyn PlatformHandler<P>>> {
    match platform {
        Platform::Instagram => Some(Box::new(VideoHandler::new(instagram::Instagram, ctx.clone()))),
        Platform::TikTok => Some(Box::new(VideoHandler::new(tiktok::TikTok, ctx.clone()))),
        Platform::YouTube => Some(Box::new(VideoHandler::new(youtube::YouTube, ctx.clone()))),
        Platform::Unsupported => None,
    }
}
