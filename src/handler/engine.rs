//! The shared scan / inject / capture engine behind every platform handler.

use super::{HandlerContext, PlatformHandler, ScanReport};
use crate::api::{ApiClient, ApiEnvelope, SendOutcome};
use crate::capture::{classify_media, CaptureRequest, MediaRef, MediaSource, VideoMetadata};
use crate::dom::{ControlSpec, ControlState, Page, CONTROL_MARKER_CLASS};
use crate::error::{report_failure, ApiError, CaptureError, Diagnostics, DomError};
use crate::notification::NotificationKind;
use crate::platform::Platform;
use crate::scheduler::{Cancellation, Debouncer, Disposables, Throttle};
use futures::future::LocalBoxFuture;
use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Site-specific knowledge plugged into [`VideoHandler`].
pub trait Heuristics<P: Page>: 'static {
    fn platform(&self) -> Platform;

    /// Whether videos arrive on scroll (infinite feeds).
    fn watches_scroll(&self) -> bool;

    /// Elements that each wrap one video, in document order.
    fn find_candidates(&self, page: &P) -> Vec<P::Node>;

    fn video_in(&self, page: &P, container: &P::Node) -> Option<P::Node> {
        page.query(Some(container), "video")
    }

    /// Where the control is appended.
    fn control_host(&self, page: &P, container: &P::Node) -> P::Node;

    /// The candidate container holding `video`, if any.
    fn container_of(&self, page: &P, video: &P::Node) -> Option<P::Node>;

    /// Scrape author, caption and friends. Duration and timestamp are filled in by the engine.
    fn extract_metadata(&self, page: &P, container: Option<&P::Node>, href: &str) -> VideoMetadata;

    /// The canonical URL of the post holding the video.
    fn post_url(&self, _page: &P, _container: Option<&P::Node>, href: &str) -> String {
        href.to_string()
    }
}

/// An upload in flight. Resolves once the control and notices are updated.
pub type Upload = LocalBoxFuture<'static, Result<SendOutcome, ApiError>>;

struct InjectedControl<N> {
    control: N,
    container: N,
    video: N,
}

struct Shared<P: Page, H: Heuristics<P>> {
    heuristics: H,
    ctx: HandlerContext<P>,
    controls: RefCell<Vec<InjectedControl<P::Node>>>,
    processing: Cell<bool>,
    disposed: Cell<bool>,
    mutation_debounce: Debouncer,
    scroll_debounce: Debouncer,
    scroll_throttle: Throttle,
    timers: RefCell<Disposables>,
    /// Pending return-to-idle timers, at most one per control.
    resets: RefCell<Vec<(P::Node, Cancellation)>>,
}

/// A platform handler built from a set of [`Heuristics`].
pub struct VideoHandler<P: Page + 'static, H: Heuristics<P>> {
    shared: Rc<Shared<P, H>>,
    observers: Disposables,
}

impl<P: Page + 'static, H: Heuristics<P>> VideoHandler<P, H> {
    pub fn new(heuristics: H, ctx: HandlerContext<P>) -> Self {
        let config = ctx.config.clone();
        VideoHandler {
            shared: Rc::new(Shared {
                heuristics,
                mutation_debounce: Debouncer::new(ctx.scheduler.clone(), config.mutation_debounce()),
                scroll_debounce: Debouncer::new(ctx.scheduler.clone(), config.scroll_debounce()),
                scroll_throttle: Throttle::new(config.scroll_min_interval()),
                ctx,
                controls: RefCell::new(Vec::new()),
                processing: Cell::new(false),
                disposed: Cell::new(false),
                timers: RefCell::new(Disposables::new()),
                resets: RefCell::new(Vec::new()),
            }),
            observers: Disposables::new(),
        }
    }

    pub fn is_processing(&self) -> bool {
        self.shared.processing.get()
    }
}

impl<P: Page + 'static, H: Heuristics<P>> Shared<P, H> {
    fn tag(&self) -> &'static str {
        self.heuristics.platform().tag()
    }

    fn page(&self) -> &P {
        &self.ctx.page
    }

    fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            user_agent: self.page().user_agent(),
            page_url: self.page().href(),
        }
    }

    /// Forget controls that left the document and release their listeners.
    fn prune_detached(&self) -> usize {
        let page = self.page();
        let detached: Vec<InjectedControl<P::Node>> = {
            let mut controls = self.controls.borrow_mut();
            let (live, detached): (Vec<_>, Vec<_>) = std::mem::take(&mut *controls)
                .into_iter()
                .partition(|entry| page.is_attached(&entry.control));
            *controls = live;
            detached
        };

        for entry in &detached {
            drop(self.take_reset(&entry.control));
            page.remove(&entry.control);
        }
        if !detached.is_empty() {
            debug!("[{}] Dropped {} detached control(s)", self.tag(), detached.len());
        }
        detached.len()
    }

    fn take_reset(&self, control: &P::Node) -> Option<Cancellation> {
        let mut resets = self.resets.borrow_mut();
        let index = resets.iter().position(|(node, _)| node == control)?;
        Some(resets.swap_remove(index).1)
    }

    fn has_control(&self, node: &P::Node) -> bool {
        let marker = format!(".{}", CONTROL_MARKER_CLASS);
        self.page().query(Some(node), &marker).is_some()
    }

    fn scan_and_inject(self: &Rc<Self>) -> ScanReport {
        let mut report = ScanReport::default();
        if self.disposed.get() {
            return report;
        }

        self.prune_detached();

        let page = self.page();
        let platform = self.heuristics.platform();
        let mut seen_videos: Vec<P::Node> = Vec::new();

        for container in self.heuristics.find_candidates(page) {
            report.candidates += 1;

            let Some(video) = self.heuristics.video_in(page, &container) else {
                debug!("[{}] Candidate without a video element, skipping", self.tag());
                report.skipped += 1;
                continue;
            };

            let host = self.heuristics.control_host(page, &container);
            let registered = self.controls.borrow().iter().any(|entry| entry.video == video);

            if registered || seen_videos.contains(&video) || self.has_control(&container) || self.has_control(&host) {
                report.already_present += 1;
                continue;
            }

            let spec = ControlSpec {
                marker_class: CONTROL_MARKER_CLASS.to_string(),
                platform_class: format!("{}-{}", CONTROL_MARKER_CLASS, platform.tag().to_lowercase()),
                label: ControlState::Idle.label().to_string(),
                title: "Save and analyze this video".to_string(),
            };

            let weak: Weak<Self> = Rc::downgrade(self);
            let (click_container, click_video) = (container.clone(), video.clone());
            let on_click: Rc<dyn Fn()> = Rc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_control_click(&click_container, &click_video);
                }
            });

            match page.inject_control(&host, &spec, on_click) {
                Ok(control) => {
                    self.controls.borrow_mut().push(InjectedControl {
                        control,
                        container,
                        video: video.clone(),
                    });
                    seen_videos.push(video);
                    report.injected += 1;
                }
                Err(e) => {
                    warn!("[{}] Could not attach control: {}", self.tag(), e);
                    report.skipped += 1;
                }
            }
        }

        if report.injected > 0 {
            info!(
                "[{}] Attached {} control(s) ({} candidates, {} already present)",
                self.tag(),
                report.injected,
                report.candidates,
                report.already_present
            );
        }
        report
    }

    fn schedule_mutation_scan(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        let weak = Rc::downgrade(self);
        self.mutation_debounce.trigger(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.scan_and_inject();
            }
        }));
    }

    fn schedule_scroll_scan(self: &Rc<Self>) {
        if self.disposed.get() {
            return;
        }
        let weak = Rc::downgrade(self);
        self.scroll_debounce.trigger(Box::new(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if shared.scroll_throttle.try_acquire(shared.ctx.scheduler.now_ms()) {
                shared.scan_and_inject();
            } else {
                debug!("[{}] Scroll rescan throttled", shared.tag());
            }
        }));
    }

    fn control_for(&self, container: &P::Node) -> Option<P::Node> {
        self.controls
            .borrow()
            .iter()
            .find(|entry| &entry.container == container)
            .map(|entry| entry.control.clone())
    }

    fn capture(&self, video: &P::Node) -> Result<CaptureRequest, CaptureError> {
        let page = self.page();
        if !page.is_attached(video) {
            return Err(CaptureError::Detached);
        }
        let info = page.media_info(video).ok_or(CaptureError::NotAVideo)?;

        let href = page.href();
        let container = self.heuristics.container_of(page, video);
        let mut metadata = self.heuristics.extract_metadata(page, container.as_ref(), &href);
        metadata.duration = info.duration.filter(|d| d.is_finite());
        metadata.timestamp = self.ctx.scheduler.now_ms();

        let media = match classify_media(&info) {
            MediaSource::Direct(url) => MediaRef::Url(url),
            MediaSource::ObjectUrl(url) => MediaRef::ObjectUrl(url),
            MediaSource::FrameCapture => MediaRef::Blob {
                bytes: page.capture_frame(video)?,
                mime: "image/jpeg".to_string(),
            },
        };

        let source_url = self.heuristics.post_url(page, container.as_ref(), &href);
        Ok(CaptureRequest::new(
            self.heuristics.platform(),
            source_url,
            media,
            metadata.into_map(),
        ))
    }

    fn current_video(&self) -> Result<P::Node, CaptureError> {
        let page = self.page();
        self.heuristics
            .find_candidates(page)
            .iter()
            .filter_map(|container| self.heuristics.video_in(page, container))
            .find(|video| page.is_attached(video))
            .or_else(|| page.query(None, "video"))
            .ok_or(CaptureError::NoVideo)
    }

    /// Capture `video` and hand back the upload that finishes it.
    /// Refused while another capture is in flight.
    fn submit(self: &Rc<Self>, video: &P::Node, control: Option<P::Node>) -> Result<Upload, CaptureError> {
        if self.processing.get() {
            return Err(CaptureError::Busy);
        }
        let request = self.capture(video)?;

        self.processing.set(true);
        if let Some(control) = &control {
            self.page().set_control_state(control, ControlState::Loading);
        }

        let weak = Rc::downgrade(self);
        let page = self.ctx.page.clone();
        let api = self.ctx.api.clone();
        let video = video.clone();
        Ok(Box::pin(async move {
            let result = match resolve_object_url(&*page, &api, &video, request).await {
                Ok(request) => api.send(request).await,
                Err(e) => Err(e),
            };
            if let Some(shared) = weak.upgrade() {
                shared.processing.set(false);
                shared.finish(control, &result);
            }
            result
        }))
    }

    fn report_capture_failure(self: &Rc<Self>, error: &CaptureError, control: Option<&P::Node>) {
        report_failure("Video capture", error, &self.diagnostics());
        self.ctx
            .notifications
            .show_default(format!("Could not capture this video: {}", error), NotificationKind::Error);
        if let Some(control) = control {
            self.show_result_state(control, ControlState::Error);
        }
    }

    fn on_control_click(self: &Rc<Self>, container: &P::Node, video: &P::Node) {
        if self.disposed.get() {
            return;
        }

        let control = self.control_for(container);
        match self.submit(video, control.clone()) {
            Ok(upload) => self.ctx.scheduler.spawn_local(Box::pin(async move {
                let _ = upload.await;
            })),
            Err(CaptureError::Busy) => {
                info!("[{}] A capture is already in progress, ignoring click", self.tag());
            }
            Err(e) => self.report_capture_failure(&e, control.as_ref()),
        }
    }

    fn finish(self: &Rc<Self>, control: Option<P::Node>, result: &Result<SendOutcome, ApiError>) {
        if self.disposed.get() {
            return;
        }
        if let Err(e) = result {
            report_failure("Video upload", e, &self.diagnostics());
        }

        let notice = outcome_notice(result);
        self.ctx.notifications.show_default(notice.message, notice.kind);
        if let Some(control) = control {
            self.show_result_state(&control, notice.state);
        }
    }

    /// Show a terminal state, then return the control to idle.
    fn show_result_state(self: &Rc<Self>, control: &P::Node, state: ControlState) {
        if !self.page().is_attached(control) {
            return;
        }
        self.page().set_control_state(control, state);
        drop(self.take_reset(control));

        let weak = Rc::downgrade(self);
        let target = control.clone();
        let reset = self.ctx.scheduler.set_timeout(
            self.ctx.config.button_reset_delay(),
            Box::new(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let fired = shared.take_reset(&target);
                if !shared.disposed.get() && shared.page().is_attached(&target) {
                    shared.page().set_control_state(&target, ControlState::Idle);
                }
                drop(fired);
            }),
        );
        self.resets.borrow_mut().push((control.clone(), reset));
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.mutation_debounce.cancel();
        self.scroll_debounce.cancel();
        let mut timers = std::mem::take(&mut *self.timers.borrow_mut());
        timers.dispose_all();
        let resets = std::mem::take(&mut *self.resets.borrow_mut());
        drop(resets);

        let controls = std::mem::take(&mut *self.controls.borrow_mut());
        let removed = controls.len();
        for entry in controls {
            self.page().remove(&entry.control);
        }
        self.processing.set(false);
        info!("[{}] Handler disposed, removed {} control(s)", self.tag(), removed);
    }
}

impl<P: Page + 'static, H: Heuristics<P>> PlatformHandler<P> for VideoHandler<P, H> {
    fn platform(&self) -> Platform {
        self.shared.heuristics.platform()
    }

    fn setup(&mut self) {
        if self.shared.disposed.get() {
            return;
        }
        let tag = self.shared.tag();

        let weak = Rc::downgrade(&self.shared);
        let initial_scan = self.shared.ctx.scheduler.set_timeout(
            self.shared.ctx.config.initial_scan_delay(),
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.scan_and_inject();
                }
            }),
        );
        self.shared.timers.borrow_mut().push(initial_scan);

        match self.observe_mutations() {
            Ok(handle) => self.observers.push(handle),
            Err(e) => warn!("[{}] Mutation observer unavailable: {}", tag, e),
        }
        match self.observe_scroll() {
            Some(Ok(handle)) => self.observers.push(handle),
            Some(Err(e)) => warn!("[{}] Scroll listener unavailable: {}", tag, e),
            None => {}
        }
        info!("[{}] Handler ready", tag);
    }

    fn scan_and_inject(&self) -> ScanReport {
        self.shared.scan_and_inject()
    }

    fn rescan(&self) -> ScanReport {
        self.shared.scan_and_inject()
    }

    fn observe_mutations(&self) -> Result<Cancellation, DomError> {
        let weak = Rc::downgrade(&self.shared);
        self.shared.ctx.page.observe_mutations(Rc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.schedule_mutation_scan();
            }
        }))
    }

    fn observe_scroll(&self) -> Option<Result<Cancellation, DomError>> {
        if !self.shared.heuristics.watches_scroll() {
            return None;
        }
        let weak = Rc::downgrade(&self.shared);
        Some(self.shared.ctx.page.observe_scroll(Rc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.schedule_scroll_scan();
            }
        })))
    }

    fn capture(&self, video: &P::Node) -> Result<CaptureRequest, CaptureError> {
        self.shared.capture(video)
    }

    fn capture_current(&self) -> Result<CaptureRequest, CaptureError> {
        let video = self.shared.current_video()?;
        self.shared.capture(&video)
    }

    fn submit_current(&self) -> Result<Upload, CaptureError> {
        let shared = &self.shared;
        let video = shared.current_video();
        let control = video.as_ref().ok().and_then(|video| {
            shared
                .controls
                .borrow()
                .iter()
                .find(|entry| &entry.video == video)
                .map(|entry| entry.control.clone())
        });

        match video.and_then(|video| shared.submit(&video, control.clone())) {
            Err(CaptureError::Busy) => Err(CaptureError::Busy),
            Err(e) => {
                shared.report_capture_failure(&e, control.as_ref());
                Err(e)
            }
            upload => upload,
        }
    }

    fn dispose(&mut self) {
        self.observers.dispose_all();
        self.shared.dispose();
    }

    fn control_count(&self) -> usize {
        let page = self.shared.page();
        self.shared
            .controls
            .borrow()
            .iter()
            .filter(|entry| page.is_attached(&entry.control))
            .count()
    }
}

impl<P: Page + 'static, H: Heuristics<P>> Drop for VideoHandler<P, H> {
    fn drop(&mut self) {
        self.observers.dispose_all();
        self.shared.dispose();
    }
}

/// Read a page-local object URL into memory. MediaSource streams usually
/// cannot be read back, so the displayed frame stands in for them.
async fn resolve_object_url<P: Page>(
    page: &P,
    api: &ApiClient,
    video: &P::Node,
    mut request: CaptureRequest,
) -> Result<CaptureRequest, ApiError> {
    let MediaRef::ObjectUrl(url) = &request.media else {
        return Ok(request);
    };
    let url = url.clone();

    request.media = match api.fetch_blob(&url).await {
        Ok(bytes) => MediaRef::Blob {
            bytes,
            mime: "video/mp4".to_string(),
        },
        Err(e) => {
            warn!("Could not read {} ({}), capturing the current frame instead", url, e);
            let bytes = page
                .capture_frame(video)
                .map_err(|frame| ApiError::MediaUnavailable(format!("{}; frame capture failed: {}", e, frame)))?;
            MediaRef::Blob {
                bytes,
                mime: "image/jpeg".to_string(),
            }
        }
    };
    Ok(request)
}

/// User-facing rendering of a send result.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeNotice {
    pub state: ControlState,
    pub kind: NotificationKind,
    pub message: String,
}

pub fn outcome_notice(result: &Result<SendOutcome, ApiError>) -> OutcomeNotice {
    match result {
        Ok(SendOutcome::Processed(ApiEnvelope { message, .. })) => OutcomeNotice {
            state: ControlState::Success,
            kind: NotificationKind::Success,
            message: message
                .clone()
                .unwrap_or_else(|| "Video saved and sent for analysis".to_string()),
        },
        Ok(SendOutcome::Duplicate(report)) => OutcomeNotice {
            state: ControlState::Duplicate,
            kind: NotificationKind::Warning,
            message: match report.duplicate_info.location() {
                Some(location) => format!("{} ({})", report.message, location),
                None => report.message.clone(),
            },
        },
        Err(e) => OutcomeNotice {
            state: ControlState::Error,
            kind: NotificationKind::Error,
            message: format!("Failed to save video: {}", e),
        },
    }
}
