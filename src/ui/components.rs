/// Small popup building blocks

use web_sys::HtmlInputElement;
use yew::prelude::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ServerStatus {
    Checking,
    Online,
    Offline,
}

impl ServerStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ServerStatus::Checking => "Checking...",
            ServerStatus::Online => "Connected",
            ServerStatus::Offline => "Offline",
        }
    }

    fn class(&self) -> &'static str {
        match self {
            ServerStatus::Checking => "status-badge status-checking",
            ServerStatus::Online => "status-badge status-online",
            ServerStatus::Offline => "status-badge status-offline",
        }
    }
}

#[derive(Properties, PartialEq)]
pub struct StatusBadgeProps {
    pub status: ServerStatus,
}

#[function_component(StatusBadge)]
pub fn status_badge(props: &StatusBadgeProps) -> Html {
    html! {
        <span class={props.status.class()}>{props.status.label()}</span>
    }
}

#[derive(Properties, PartialEq)]
pub struct StatCardProps {
    pub label: AttrValue,
    pub value: Option<u64>,
}

#[function_component(StatCard)]
pub fn stat_card(props: &StatCardProps) -> Html {
    html! {
        <div class="stat-item">
            <span class="stat-count">
                {props.value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())}
            </span>
            <span class="stat-label">{&props.label}</span>
        </div>
    }
}

#[derive(Properties, PartialEq)]
pub struct SettingToggleProps {
    pub id: AttrValue,
    pub label: AttrValue,
    pub checked: bool,
    pub onchange: Callback<bool>,
    #[prop_or(false)]
    pub disabled: bool,
}

#[function_component(SettingToggle)]
pub fn setting_toggle(props: &SettingToggleProps) -> Html {
    let onchange = {
        let callback = props.onchange.clone();
        Callback::from(move |e: Event| {
            let input: HtmlInputElement = e.target_unchecked_into();
            callback.emit(input.checked());
        })
    };

    html! {
        <div class="pf-v5-c-check setting-row">
            <input
                class="pf-v5-c-check__input"
                type="checkbox"
                id={props.id.clone()}
                checked={props.checked}
                disabled={props.disabled}
                {onchange}
            />
            <label class="pf-v5-c-check__label" for={props.id.clone()}>{&props.label}</label>
        </div>
    }
}
