//! Page lifecycle: which platform we are on, SPA navigation, handler
//! supervision and command routing.
//!
//! One orchestrator exists per page. It owns the only [`Session`] and at
//! most one live handler, and every transition goes through its methods.

use crate::api::SendOutcome;
use crate::dom::Page;
use crate::error::CaptureError;
use crate::handler::engine::outcome_notice;
use crate::handler::{create_handler, HandlerContext, PlatformHandler};
use crate::messaging::{Command, CommandResponse};
use crate::notification::NotificationKind;
use crate::platform::{detect_url, Platform};
use crate::scheduler::Cancellation;
use crate::settings::{Settings, SettingsSource};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Builds the handler for a platform. Defaults to [`create_handler`].
pub type HandlerFactory<P> = Rc<dyn Fn(Platform, &HandlerContext<P>) -> Option<Box<dyn PlatformHandler<P>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Detecting,
    Active(Platform),
    SwitchingPlatform { from: Platform, to: Platform },
    /// Unsupported page. Nothing is observed or injected.
    Inert,
    TornDown,
}

impl LifecycleState {
    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Detecting => "detecting",
            LifecycleState::Active(_) => "active",
            LifecycleState::SwitchingPlatform { .. } => "switching",
            LifecycleState::Inert => "inert",
            LifecycleState::TornDown => "tornDown",
        }
    }
}

struct Session<P: Page> {
    platform: Platform,
    handler: Option<Box<dyn PlatformHandler<P>>>,
    initialized: bool,
    current_url: String,
}

impl<P: Page> Session<P> {
    fn new() -> Self {
        Session {
            platform: Platform::Unsupported,
            handler: None,
            initialized: false,
            current_url: String::new(),
        }
    }
}

/// Read-only view of the session, used by `getStatus` and the debug export.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: &'static str,
    pub platform: Platform,
    #[serde(rename = "isInitialized")]
    pub initialized: bool,
    pub current_url: String,
    pub server_url: String,
    pub controls: usize,
    pub notifications: usize,
}

struct Inner<P: Page + 'static> {
    ctx: HandlerContext<P>,
    settings: Rc<dyn SettingsSource>,
    factory: HandlerFactory<P>,
    state: Cell<LifecycleState>,
    session: RefCell<Session<P>>,
    poller: RefCell<Option<Cancellation>>,
    /// The settle reaction or the delayed half of a platform switch.
    pending: RefCell<Option<Cancellation>>,
}

pub struct LifecycleOrchestrator<P: Page + 'static> {
    inner: Rc<Inner<P>>,
}

impl<P: Page + 'static> Clone for LifecycleOrchestrator<P> {
    fn clone(&self) -> Self {
        LifecycleOrchestrator {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Page + 'static> LifecycleOrchestrator<P> {
    pub fn new(ctx: HandlerContext<P>, settings: Rc<dyn SettingsSource>) -> Self {
        Self::with_factory(ctx, settings, Rc::new(create_handler::<P>))
    }

    pub fn with_factory(ctx: HandlerContext<P>, settings: Rc<dyn SettingsSource>, factory: HandlerFactory<P>) -> Self {
        LifecycleOrchestrator {
            inner: Rc::new(Inner {
                ctx,
                settings,
                factory,
                state: Cell::new(LifecycleState::Uninitialized),
                session: RefCell::new(Session::new()),
                poller: RefCell::new(None),
                pending: RefCell::new(None),
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    /// Detect the platform and bring up its handler. Only the first call does anything.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Compare the page URL with the last one seen and react to a change.
    /// Normally driven by the poll interval.
    pub fn poll_url(&self) {
        self.inner.poll_url();
    }

    /// Release everything. Later polls and commands are no-ops.
    pub fn teardown(&self) {
        self.inner.teardown();
    }

    pub fn status(&self) -> StatusSnapshot {
        self.inner.status()
    }

    /// Apply settings pushed by a storage change.
    pub fn settings_changed(&self, settings: &Settings) {
        if !self.inner.is_torn_down() {
            self.inner.apply_settings(settings);
        }
    }

    pub async fn handle_command(&self, command: Command) -> CommandResponse {
        let inner = &self.inner;
        if inner.state.get() == LifecycleState::TornDown {
            return CommandResponse::failure("Content script has been shut down");
        }
        debug!("Handling command {:?}", command);

        if matches!(command, Command::Refresh | Command::GetStats | Command::SaveCurrentVideo) {
            inner.reload_settings().await;
        }

        match command {
            Command::Ping => CommandResponse::with_message("pong"),
            Command::GetStatus => match serde_json::to_value(inner.status()) {
                Ok(status) => CommandResponse::with_data(status),
                Err(e) => CommandResponse::failure(e.to_string()),
            },
            Command::Refresh => inner.refresh(),
            Command::GetStats => inner.stats().await,
            Command::SaveCurrentVideo => inner.save_current_video().await,
        }
    }
}

impl<P: Page + 'static> Inner<P> {
    fn is_torn_down(&self) -> bool {
        self.state.get() == LifecycleState::TornDown
    }

    fn start(self: &Rc<Self>) {
        if self.state.get() != LifecycleState::Uninitialized {
            warn!("Lifecycle already started ({})", self.state.get().label());
            return;
        }
        self.state.set(LifecycleState::Detecting);

        let href = self.ctx.page.href();
        let platform = detect_url(&href);
        {
            let mut session = self.session.borrow_mut();
            session.current_url = href.clone();
            session.platform = platform;
        }

        if !platform.is_supported() {
            info!("No supported platform at {}, staying inert", href);
            self.state.set(LifecycleState::Inert);
            return;
        }

        self.spawn_bootstrap();
        self.activate(platform);
        if matches!(self.state.get(), LifecycleState::Active(_)) {
            self.start_polling();
        }
    }

    /// Load settings, then probe the server. Neither blocks activation.
    fn spawn_bootstrap(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let source = self.settings.clone();
        self.ctx.scheduler.spawn_local(Box::pin(async move {
            let settings = source.load().await;
            match weak.upgrade() {
                Some(inner) if !inner.is_torn_down() => inner.apply_settings(&settings),
                _ => return,
            }
            probe_server(weak).await;
        }));
    }

    /// Settings are read on demand and never kept beyond one fetch.
    async fn reload_settings(&self) {
        let settings = self.settings.load().await;
        if !self.is_torn_down() {
            self.apply_settings(&settings);
        }
    }

    fn apply_settings(&self, settings: &Settings) {
        self.ctx.notifications.set_visible(settings.show_notifications);
        self.ctx.api.set_use_ai(settings.use_ai);
        let config = self.ctx.config.as_ref().clone().with_settings(settings);
        self.ctx.api.set_base_url(config.server_url);
        debug!("Settings applied: {:?}", settings);
    }

    fn activate(self: &Rc<Self>, platform: Platform) {
        let Some(mut handler) = (self.factory)(platform, &self.ctx) else {
            info!("No handler for {}, staying inert", platform);
            self.become_inert();
            return;
        };
        handler.setup();

        let previous = {
            let mut session = self.session.borrow_mut();
            session.platform = platform;
            session.initialized = true;
            session.handler.replace(handler)
        };
        if let Some(mut previous) = previous {
            warn!("Replacing a handler that was never disposed");
            previous.dispose();
        }

        self.state.set(LifecycleState::Active(platform));
        info!("[{}] Active on {}", platform.tag(), self.ctx.page.href());
    }

    fn become_inert(&self) {
        self.state.set(LifecycleState::Inert);
        self.session.borrow_mut().initialized = false;
        let poller = self.poller.take();
        drop(poller);
    }

    fn start_polling(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let handle = self.ctx.scheduler.set_interval(
            self.ctx.config.url_poll_interval(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.poll_url();
                }
            }),
        );
        let previous = self.poller.replace(Some(handle));
        drop(previous);
    }

    fn poll_url(self: &Rc<Self>) {
        let state = self.state.get();
        if !matches!(state, LifecycleState::Active(_) | LifecycleState::SwitchingPlatform { .. }) {
            return;
        }

        let href = self.ctx.page.href();
        let current = {
            let mut session = self.session.borrow_mut();
            if session.current_url == href {
                return;
            }
            session.current_url = href.clone();
            session.platform
        };
        let platform = detect_url(&href);
        debug!("URL changed to {} ({})", href, platform);

        match state {
            LifecycleState::SwitchingPlatform { from, to } if to != platform => self.begin_switch(from, platform),
            LifecycleState::SwitchingPlatform { .. } => {}
            _ if platform != current => self.begin_switch(current, platform),
            _ => self.schedule_settle(),
        }
    }

    /// Dispose the current handler right away, activate the next one after a delay.
    fn begin_switch(self: &Rc<Self>, from: Platform, to: Platform) {
        info!("Platform change {} -> {}", from, to);
        let superseded = self.pending.take();
        drop(superseded);

        let handler = {
            let mut session = self.session.borrow_mut();
            session.initialized = false;
            session.handler.take()
        };
        if let Some(mut handler) = handler {
            handler.dispose();
        }
        self.ctx.notifications.clear_all();
        self.state.set(LifecycleState::SwitchingPlatform { from, to });

        let weak = Rc::downgrade(self);
        let handle = self.ctx.scheduler.set_timeout(
            self.ctx.config.platform_switch_delay(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.finish_switch(to);
                }
            }),
        );
        self.pending.replace(Some(handle));
    }

    fn finish_switch(self: &Rc<Self>, to: Platform) {
        if !matches!(self.state.get(), LifecycleState::SwitchingPlatform { to: target, .. } if target == to) {
            return;
        }
        self.session.borrow_mut().platform = to;

        if !to.is_supported() {
            info!("Left the supported platforms, going inert");
            self.become_inert();
            return;
        }
        self.spawn_bootstrap();
        self.activate(to);
    }

    /// Same platform, new URL: rescan once the page has settled. A newer
    /// change replaces a reaction that has not run yet.
    fn schedule_settle(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let handle = self.ctx.scheduler.set_timeout(
            self.ctx.config.settle_delay(),
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.settle();
                }
            }),
        );
        let superseded = self.pending.replace(Some(handle));
        drop(superseded);
    }

    fn settle(&self) {
        if !matches!(self.state.get(), LifecycleState::Active(_)) {
            return;
        }
        if let Some(report) = self.with_handler(|handler| handler.rescan()) {
            debug!("Rescan after navigation: {:?}", report);
        }
    }

    /// Run `f` with the handler moved out of the session, so nothing it
    /// triggers can observe the session mid-borrow.
    fn with_handler<R>(&self, f: impl FnOnce(&mut Box<dyn PlatformHandler<P>>) -> R) -> Option<R> {
        let mut handler = self.session.borrow_mut().handler.take()?;
        let result = f(&mut handler);

        let mut session = self.session.borrow_mut();
        if session.handler.is_none() && matches!(self.state.get(), LifecycleState::Active(_)) {
            session.handler = Some(handler);
        } else {
            drop(session);
            handler.dispose();
        }
        Some(result)
    }

    fn teardown(&self) {
        if self.state.replace(LifecycleState::TornDown) == LifecycleState::TornDown {
            return;
        }
        let poller = self.poller.take();
        drop(poller);
        let pending = self.pending.take();
        drop(pending);

        let handler = {
            let mut session = self.session.borrow_mut();
            session.initialized = false;
            session.handler.take()
        };
        if let Some(mut handler) = handler {
            handler.dispose();
        }
        self.ctx.notifications.clear_all();
        info!("Lifecycle torn down");
    }

    fn status(&self) -> StatusSnapshot {
        let session = self.session.borrow();
        StatusSnapshot {
            state: self.state.get().label(),
            platform: session.platform,
            initialized: session.initialized,
            current_url: session.current_url.clone(),
            server_url: self.ctx.api.base_url(),
            controls: session.handler.as_ref().map_or(0, |handler| handler.control_count()),
            notifications: self.ctx.notifications.len(),
        }
    }

    fn refresh(&self) -> CommandResponse {
        match self.with_handler(|handler| handler.rescan()) {
            Some(report) => {
                let message = format!("Rescanned the page: {} video(s) found", report.candidates);
                self.ctx.notifications.show_default(message.clone(), NotificationKind::Info);
                CommandResponse {
                    message: Some(message),
                    data: serde_json::to_value(report).ok(),
                    ..CommandResponse::ok()
                }
            }
            None => CommandResponse::failure(CaptureError::NoHandler.to_string()),
        }
    }

    fn local_stats(&self) -> Map<String, Value> {
        let session = self.session.borrow();
        let mut local = Map::new();
        local.insert("platform".to_string(), json!(session.platform));
        local.insert("isInitialized".to_string(), json!(session.initialized));
        local.insert("currentUrl".to_string(), json!(session.current_url));
        local.insert("timestamp".to_string(), json!(self.ctx.scheduler.now_ms()));
        local
    }

    /// Server stats with the local session under `local`. Without the
    /// server only the local half is returned, with the error.
    async fn stats(&self) -> CommandResponse {
        let mut local = self.local_stats();

        match self.ctx.api.get_stats().await {
            Ok(server) => {
                let mut merged = match server {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert("server".to_string(), other);
                        map
                    }
                };
                merged.insert("local".to_string(), Value::Object(local));
                CommandResponse::with_data(Value::Object(merged))
            }
            Err(e) => {
                warn!("Stats request failed: {}", e);
                local.insert("error".to_string(), json!(e.to_string()));
                CommandResponse {
                    data: Some(json!({ "local": local })),
                    ..CommandResponse::failure(e.to_string())
                }
            }
        }
    }

    /// Goes through the handler so a capture started from a control and
    /// one requested by the popup never run at once.
    async fn save_current_video(&self) -> CommandResponse {
        let upload = match self.with_handler(|handler| handler.submit_current()) {
            None => return CommandResponse::failure(CaptureError::NoHandler.to_string()),
            Some(Err(e)) => return CommandResponse::failure(e.to_string()),
            Some(Ok(upload)) => upload,
        };

        let result = upload.await;
        let notice = outcome_notice(&result);
        match result {
            Ok(SendOutcome::Processed(envelope)) => CommandResponse {
                message: Some(notice.message),
                data: envelope.data,
                ..CommandResponse::ok()
            },
            Ok(SendOutcome::Duplicate(report)) => CommandResponse {
                message: Some(notice.message.clone()),
                data: serde_json::to_value(&report).ok(),
                ..CommandResponse::failure(notice.message)
            },
            Err(e) => CommandResponse::failure(e.to_string()),
        }
    }
}

async fn probe_server<P: Page + 'static>(inner: Weak<Inner<P>>) {
    let Some(api) = inner.upgrade().map(|inner| inner.ctx.api.clone()) else {
        return;
    };
    if api.check_connection().await {
        debug!("Analysis server reachable at {}", api.base_url());
        return;
    }
    if let Some(inner) = inner.upgrade() {
        if !inner.is_torn_down() {
            inner.ctx.notifications.show_default(
                format!("Cannot reach the analysis server at {}", api.base_url()),
                NotificationKind::Warning,
            );
        }
    }
}
