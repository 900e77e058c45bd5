//! Browser wiring for the content script: the live page, timers, fetch,
//! toasts and the `chrome.*` bridge.

mod notice;
mod page;
mod scheduler;
mod transport;

pub use notice::DomNoticeSurface;
pub use page::BrowserPage;
pub use scheduler::BrowserScheduler;
pub use transport::FetchTransport;

use crate::api::ApiClient;
use crate::config::ExtensionConfig;
use crate::handler::HandlerContext;
use crate::messaging::{Command, CommandResponse};
use crate::notification::NotificationCenter;
use crate::orchestrator::LifecycleOrchestrator;
use crate::settings::{Settings, SettingsSource, SETTINGS_STORAGE_KEY};
use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

#[wasm_bindgen(module = "/content.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getSettings(key: &str) -> Result<JsValue, JsValue>;

    /// Registers `handler(message) -> Promise<response>` on `chrome.runtime.onMessage`.
    fn onRuntimeMessage(handler: &js_sys::Function);

    /// Calls `handler(newValue)` whenever `key` changes in `chrome.storage.sync`.
    fn onSettingsChanged(key: &str, handler: &js_sys::Function);
}

/// Drop `value` on the next microtask. Closures and timers may be released
/// from inside their own callbacks.
pub(crate) fn release_later<T: 'static>(value: T) {
    wasm_bindgen_futures::spawn_local(async move {
        drop(value);
    });
}

pub(crate) fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

fn settings_from_js(value: JsValue) -> Settings {
    if !value.is_object() {
        return Settings::new();
    }
    match serde_wasm_bindgen::from_value::<serde_json::Value>(value) {
        Ok(value) => Settings::from_storage_value(Some(value)),
        Err(e) => {
            warn!("Stored settings unreadable, using defaults: {}", e);
            Settings::new()
        }
    }
}

/// Settings read from `chrome.storage.sync` on demand.
pub struct ChromeSettings;

#[async_trait(?Send)]
impl SettingsSource for ChromeSettings {
    async fn load(&self) -> Settings {
        match getSettings(SETTINGS_STORAGE_KEY).await {
            Ok(value) => settings_from_js(value),
            Err(e) => {
                warn!("Could not read settings: {:?}", e);
                Settings::new()
            }
        }
    }
}

struct ContentScript {
    orchestrator: LifecycleOrchestrator<BrowserPage>,
    dev_mode: bool,
}

thread_local! {
    static CONTENT_SCRIPT: RefCell<Option<ContentScript>> = const { RefCell::new(None) };
}

fn config_from_js(config: JsValue) -> Result<ExtensionConfig, JsValue> {
    let raw = if config.is_undefined() || config.is_null() {
        serde_json::Value::Null
    } else {
        serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&e.to_string()))?
    };
    ExtensionConfig::from_json(raw).map_err(|e| JsValue::from_str(&e.to_string()))
}

pub fn start(config: JsValue) -> Result<(), JsValue> {
    if CONTENT_SCRIPT.with(|slot| slot.borrow().is_some()) {
        warn!("Content script already running");
        return Ok(());
    }
    let config = config_from_js(config)?;
    let dev_mode = config.dev_mode;

    let page = Rc::new(BrowserPage::new().map_err(|e| JsValue::from_str(&e.to_string()))?);
    let window = page.window().clone();
    let scheduler = Rc::new(BrowserScheduler);
    let surface = Rc::new(DomNoticeSurface::new(page.document().clone()));
    let notifications = Rc::new(NotificationCenter::new(
        scheduler.clone(),
        surface,
        config.notification_duration(),
    ));
    let api = Rc::new(ApiClient::new(
        config.server_url.clone(),
        Rc::new(FetchTransport),
        scheduler.clone(),
        config.retry.clone(),
    ));

    let ctx = HandlerContext {
        page,
        scheduler,
        api,
        notifications,
        config: Rc::new(config),
    };
    let orchestrator = LifecycleOrchestrator::new(ctx, Rc::new(ChromeSettings));
    orchestrator.start();

    listen_for_commands(orchestrator.clone());
    listen_for_settings(orchestrator.clone());
    teardown_on_pagehide(&window, orchestrator.clone())?;

    CONTENT_SCRIPT.with(|slot| *slot.borrow_mut() = Some(ContentScript { orchestrator, dev_mode }));
    info!("Content script started");
    Ok(())
}

fn listen_for_commands(orchestrator: LifecycleOrchestrator<BrowserPage>) {
    let handler: Closure<dyn FnMut(JsValue) -> js_sys::Promise> = Closure::new(move |message: JsValue| {
        let orchestrator = orchestrator.clone();
        wasm_bindgen_futures::future_to_promise(async move {
            let response = match serde_wasm_bindgen::from_value::<serde_json::Value>(message) {
                Ok(message) => match Command::parse(&message) {
                    Ok(command) => orchestrator.handle_command(command).await,
                    Err(e) => CommandResponse::failure(e),
                },
                Err(e) => CommandResponse::failure(e.to_string()),
            };
            to_js(&response)
        })
    });
    onRuntimeMessage(handler.as_ref().unchecked_ref());
    // Lives as long as the page.
    handler.forget();
}

fn listen_for_settings(orchestrator: LifecycleOrchestrator<BrowserPage>) {
    let handler: Closure<dyn FnMut(JsValue)> = Closure::new(move |value: JsValue| {
        orchestrator.settings_changed(&settings_from_js(value));
    });
    onSettingsChanged(SETTINGS_STORAGE_KEY, handler.as_ref().unchecked_ref());
    // Lives as long as the page.
    handler.forget();
}

fn teardown_on_pagehide(window: &web_sys::Window, orchestrator: LifecycleOrchestrator<BrowserPage>) -> Result<(), JsValue> {
    let listener: Closure<dyn FnMut(web_sys::Event)> = Closure::new(move |_event: web_sys::Event| {
        orchestrator.teardown();
    });
    window.add_event_listener_with_callback("pagehide", listener.as_ref().unchecked_ref())?;
    listener.forget();
    Ok(())
}

/// Session status, for debugging. Refused unless `devMode` is configured.
pub fn debug_snapshot() -> Result<JsValue, JsValue> {
    CONTENT_SCRIPT.with(|slot| match &*slot.borrow() {
        Some(script) if script.dev_mode => to_js(&script.orchestrator.status()),
        Some(_) => Err(JsValue::from_str("debug_snapshot requires devMode")),
        None => Err(JsValue::from_str("content script not started")),
    })
}
