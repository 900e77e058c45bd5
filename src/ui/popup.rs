/// Popup UI for the Reel Capture extension

use super::components::{ServerStatus, SettingToggle, StatCard, StatusBadge};
use crate::messaging::{Command, CommandResponse};
use crate::platform::{detect_url, Platform};
use crate::settings::{Settings, SETTINGS_STORAGE_KEY};
use patternfly_yew::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

// Import JS bridge functions
#[wasm_bindgen(module = "/popup.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getActiveTab() -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn sendToActiveTab(message: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn getStorage(key: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setStorage(key: &str, value: JsValue) -> Result<(), JsValue>;
}

#[derive(Clone, PartialEq, Deserialize)]
struct ActiveTab {
    url: String,
}

#[derive(Clone, PartialEq)]
enum AppState {
    Idle,
    Loading(String),
    Done(String),
    Error(String),
}

/// Saved-video counters reported by the server.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct StatsSummary {
    pub total: Option<u64>,
    pub today: Option<u64>,
}

impl StatsSummary {
    /// Accepts the server payload at top level or under its `data` envelope.
    pub fn from_response(response: &CommandResponse) -> StatsSummary {
        let Some(data) = &response.data else {
            return StatsSummary::default();
        };
        let server = data.get("data").filter(|inner| inner.is_object()).unwrap_or(data);
        StatsSummary {
            total: server.get("total").and_then(Value::as_u64),
            today: server.get("today").and_then(Value::as_u64),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TabStatus {
    Loading,
    Unsupported,
    /// Supported site, but the content script did not answer.
    NotConnected(Platform),
    Ready { platform: Platform, controls: u64 },
}

impl TabStatus {
    pub fn from_status(url: &str, status: Option<&CommandResponse>) -> TabStatus {
        let platform = detect_url(url);
        if !platform.is_supported() {
            return TabStatus::Unsupported;
        }
        match status {
            Some(response) if response.success => TabStatus::Ready {
                platform,
                controls: response
                    .data
                    .as_ref()
                    .and_then(|data| data.get("controls"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            },
            _ => TabStatus::NotConnected(platform),
        }
    }

    pub fn message(&self) -> String {
        match self {
            TabStatus::Loading => "Checking this tab...".to_string(),
            TabStatus::Unsupported => "Open Instagram, TikTok or YouTube to capture videos".to_string(),
            TabStatus::NotConnected(platform) => format!("{} detected. Reload the page to enable capture", platform),
            TabStatus::Ready { platform, controls } => format!("{}: {} video(s) ready to save", platform, controls),
        }
    }

    pub fn can_save(&self) -> bool {
        matches!(self, TabStatus::Ready { .. })
    }
}

#[function_component(App)]
pub fn app() -> Html {
    let state = use_state(|| AppState::Idle);
    let server = use_state(|| ServerStatus::Checking);
    let stats = use_state(StatsSummary::default);
    let tab = use_state(|| TabStatus::Loading);
    let settings = use_state(Settings::new);
    let reload = use_state(|| 0u32);

    // Load tab status, stats and settings on mount and after each action
    {
        let server = server.clone();
        let stats = stats.clone();
        let tab = tab.clone();
        let settings = settings.clone();
        use_effect_with(*reload, move |_| {
            spawn_local(async move {
                if let Ok(loaded) = load_settings().await {
                    settings.set(loaded);
                }

                let url = match get_active_tab().await {
                    Ok(active) => active.url,
                    Err(e) => {
                        log::warn!("No active tab: {}", e);
                        String::new()
                    }
                };
                let status = if detect_url(&url).is_supported() {
                    send_command(Command::GetStatus).await.ok()
                } else {
                    None
                };
                tab.set(TabStatus::from_status(&url, status.as_ref()));

                match send_command(Command::GetStats).await {
                    Ok(response) => {
                        server.set(if response.success { ServerStatus::Online } else { ServerStatus::Offline });
                        stats.set(StatsSummary::from_response(&response));
                    }
                    Err(_) => server.set(ServerStatus::Offline),
                }
            });
            || ()
        });
    }

    let on_save = {
        let state = state.clone();
        let reload = reload.clone();

        Callback::from(move |_| {
            let state = state.clone();
            let reload = reload.clone();

            state.set(AppState::Loading("Saving current video...".to_string()));

            spawn_local(async move {
                match send_command(Command::SaveCurrentVideo).await {
                    Ok(response) if response.success => {
                        state.set(AppState::Done(
                            response.message.unwrap_or_else(|| "Video saved".to_string()),
                        ));
                    }
                    Ok(response) => {
                        state.set(AppState::Error(
                            response
                                .error
                                .or(response.message)
                                .unwrap_or_else(|| "Save failed".to_string()),
                        ));
                    }
                    Err(e) => state.set(AppState::Error(e)),
                }
                reload.set(*reload + 1);
            });
        })
    };

    let on_refresh = {
        let state = state.clone();
        let reload = reload.clone();

        Callback::from(move |_| {
            let state = state.clone();
            let reload = reload.clone();

            state.set(AppState::Loading("Rescanning the page...".to_string()));

            spawn_local(async move {
                match send_command(Command::Refresh).await {
                    Ok(response) if response.success => state.set(AppState::Idle),
                    Ok(response) => state.set(AppState::Error(
                        response.error.unwrap_or_else(|| "Refresh failed".to_string()),
                    )),
                    Err(e) => state.set(AppState::Error(e)),
                }
                reload.set(*reload + 1);
            });
        })
    };

    let on_toggle = {
        let settings = settings.clone();
        let state = state.clone();
        move |key: &'static str| {
            let settings = settings.clone();
            let state = state.clone();
            Callback::from(move |checked: bool| {
                let mut updated = (*settings).clone();
                if !updated.update(key, Value::Bool(checked)) {
                    return;
                }
                settings.set(updated.clone());

                let state = state.clone();
                spawn_local(async move {
                    if let Err(e) = save_settings(&updated).await {
                        state.set(AppState::Error(e));
                    }
                });
            })
        }
    };

    let is_busy = matches!(*state, AppState::Loading(_));

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"Reel Capture"}</h1>

            <div class="server-row">
                <span>{"Analysis server: "}</span>
                <StatusBadge status={*server} />
            </div>

            if *server == ServerStatus::Offline {
                <Alert r#type={AlertType::Warning} title={"Server not reachable. Is it running on localhost:3000?"} inline={true}>
                </Alert>
            }

            <p class="tab-status">{tab.message()}</p>

            <div class="stats-box">
                <StatCard label={"Total saved"} value={stats.total} />
                <StatCard label={"Today"} value={stats.today} />
            </div>

            {match &*state {
                AppState::Loading(msg) => html! {
                    <div class="loading-text-center">
                        <Spinner />
                        <p class="loading-text">{msg}</p>
                    </div>
                },
                AppState::Done(msg) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Success} title={msg.clone()} inline={true}>
                        </Alert>
                    </div>
                },
                AppState::Error(err) => html! {
                    <div class="message-top-margin">
                        <Alert r#type={AlertType::Danger} title={"Error"} inline={true}>
                            {err.clone()}
                        </Alert>
                    </div>
                },
                AppState::Idle => html! {}
            }}

            <div class="flex-column-gap">
                <Button onclick={on_save} disabled={is_busy || !tab.can_save()} variant={ButtonVariant::Primary} block={true}>
                    {"💾 Save current video"}
                </Button>
                <Button onclick={on_refresh} disabled={is_busy || !tab.can_save()} variant={ButtonVariant::Secondary} block={true}>
                    {"🔄 Refresh page scan"}
                </Button>
            </div>

            <div class="settings-container">
                <h2 class="stats-title">{"Settings"}</h2>
                <SettingToggle id="show-notifications" label="Show notifications on the page"
                    checked={settings.show_notifications} onchange={on_toggle("showNotifications")} />
                <SettingToggle id="use-ai" label="Analyze with AI"
                    checked={settings.use_ai} onchange={on_toggle("useAI")} />
                <SettingToggle id="auto-analysis" label="Analyze automatically"
                    checked={settings.auto_analysis} onchange={on_toggle("autoAnalysis")} />
                <SettingToggle id="auto-save" label="Save automatically"
                    checked={settings.auto_save} onchange={on_toggle("autoSave")} />
            </div>

            <p class="footer-popup">
                {"Reel Capture v0.1.0"}
            </p>
        </div>
    }
}

// Helper functions

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

async fn get_active_tab() -> Result<ActiveTab, String> {
    let tab_js = getActiveTab().await.map_err(|e| format!("Failed to get tab: {:?}", e))?;
    serde_wasm_bindgen::from_value(tab_js).map_err(|e| format!("Failed to parse tab: {:?}", e))
}

async fn send_command(command: Command) -> Result<CommandResponse, String> {
    let response_js = sendToActiveTab(to_js(&command)?)
        .await
        .map_err(|e| format!("Content script not reachable: {:?}", e))?;
    serde_wasm_bindgen::from_value(response_js).map_err(|e| format!("Failed to parse response: {:?}", e))
}

async fn load_settings() -> Result<Settings, String> {
    let stored = getStorage(SETTINGS_STORAGE_KEY)
        .await
        .map_err(|e| format!("Failed to get storage: {:?}", e))?;
    if stored.is_null() || stored.is_undefined() {
        return Ok(Settings::new());
    }
    let value: Value =
        serde_wasm_bindgen::from_value(stored).map_err(|e| format!("Failed to parse settings: {:?}", e))?;
    Ok(Settings::from_storage_value(Some(value)))
}

async fn save_settings(settings: &Settings) -> Result<(), String> {
    setStorage(SETTINGS_STORAGE_KEY, to_js(settings)?)
        .await
        .map_err(|e| format!("Failed to save settings: {:?}", e))
}
