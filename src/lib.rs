/// Reel Capture - Chrome Extension for saving short-form videos
/// Built with Rust + WASM + Yew

pub mod api;
pub mod capture;
pub mod config;
pub mod dom;
pub mod error;
pub mod handler;
pub mod messaging;
pub mod notification;
pub mod orchestrator;
pub mod platform;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod ui;

#[cfg(target_arch = "wasm32")]
mod browser;
#[cfg(test)]
mod testing;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export platform detection for JavaScript access
#[wasm_bindgen]
pub fn detect_platform(hostname: &str) -> String {
    platform::detect(hostname).tag().to_string()
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}

// Start the content script on the current page
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn start_content_script(config: JsValue) -> Result<(), JsValue> {
    browser::start(config)
}

// Internal state dump, only answered in dev mode
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn debug_snapshot() -> Result<JsValue, JsValue> {
    browser::debug_snapshot()
}
