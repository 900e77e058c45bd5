//! [`Page`] over the live document.

use super::release_later;
use crate::dom::{ControlSpec, ControlState, MediaInfo, Page};
use crate::error::DomError;
use crate::scheduler::Cancellation;
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{AddEventListenerOptions, Document, Element, Event, HtmlVideoElement, MutationObserver, MutationObserverInit, Window};

#[wasm_bindgen(module = "/content.js")]
extern "C" {
    /// Draws the current frame to a canvas and returns it as JPEG bytes.
    #[wasm_bindgen(catch)]
    fn captureVideoFrame(video: &HtmlVideoElement) -> Result<js_sys::Uint8Array, JsValue>;
}

pub(crate) fn js_error(value: JsValue) -> DomError {
    let message = value
        .dyn_ref::<js_sys::Error>()
        .map(|e| String::from(e.message()))
        .or_else(|| value.as_string())
        .unwrap_or_else(|| format!("{:?}", value));
    DomError::Operation(message)
}

type ClickListener = Closure<dyn FnMut(Event)>;

pub struct BrowserPage {
    window: Window,
    document: Document,
    listeners: RefCell<Vec<(Element, ClickListener)>>,
}

impl BrowserPage {
    pub fn new() -> Result<Self, DomError> {
        let window = web_sys::window().ok_or_else(|| DomError::Operation("no window".to_string()))?;
        let document = window
            .document()
            .ok_or_else(|| DomError::Operation("no document".to_string()))?;
        Ok(BrowserPage {
            window,
            document,
            listeners: RefCell::new(Vec::new()),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn document(&self) -> &Document {
        &self.document
    }
}

impl Page for BrowserPage {
    type Node = Element;

    fn href(&self) -> String {
        self.window.location().href().unwrap_or_default()
    }

    fn user_agent(&self) -> String {
        self.window.navigator().user_agent().unwrap_or_default()
    }

    fn query_all(&self, scope: Option<&Element>, selector: &str) -> Vec<Element> {
        let list = match scope {
            Some(scope) => scope.query_selector_all(selector),
            None => self.document.query_selector_all(selector),
        };
        match list {
            Ok(list) => (0..list.length())
                .filter_map(|index| list.item(index))
                .filter_map(|node| node.dyn_into::<Element>().ok())
                .collect(),
            Err(e) => {
                debug!("Selector '{}' rejected: {:?}", selector, e);
                Vec::new()
            }
        }
    }

    fn closest(&self, node: &Element, selector: &str) -> Option<Element> {
        node.closest(selector).ok().flatten()
    }

    fn parent(&self, node: &Element) -> Option<Element> {
        node.parent_element()
    }

    fn is_attached(&self, node: &Element) -> bool {
        node.is_connected()
    }

    fn text(&self, node: &Element) -> Option<String> {
        node.text_content()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    fn attribute(&self, node: &Element, name: &str) -> Option<String> {
        node.get_attribute(name)
    }

    fn media_info(&self, node: &Element) -> Option<MediaInfo> {
        let video = node.dyn_ref::<HtmlVideoElement>()?;
        let non_empty = |value: String| if value.is_empty() { None } else { Some(value) };
        Some(MediaInfo {
            src: non_empty(video.src()),
            current_src: non_empty(video.current_src()),
            duration: Some(video.duration()),
        })
    }

    fn capture_frame(&self, node: &Element) -> Result<Vec<u8>, DomError> {
        if !node.is_connected() {
            return Err(DomError::Detached);
        }
        let video = node
            .dyn_ref::<HtmlVideoElement>()
            .ok_or_else(|| DomError::Operation("not a video element".to_string()))?;
        let bytes = captureVideoFrame(video).map_err(js_error)?;
        Ok(bytes.to_vec())
    }

    fn inject_control(&self, host: &Element, spec: &ControlSpec, on_click: Rc<dyn Fn()>) -> Result<Element, DomError> {
        let button = self.document.create_element("button").map_err(js_error)?;
        button.set_class_name(&format!("{} {}", spec.marker_class, spec.platform_class));
        button.set_text_content(Some(&spec.label));
        button.set_attribute("type", "button").map_err(js_error)?;
        button.set_attribute("title", &spec.title).map_err(js_error)?;

        let listener: ClickListener = Closure::new(move |event: Event| {
            event.prevent_default();
            event.stop_propagation();
            on_click();
        });
        button
            .add_event_listener_with_callback("click", listener.as_ref().unchecked_ref())
            .map_err(js_error)?;
        host.append_child(&button).map_err(js_error)?;

        self.listeners.borrow_mut().push((button.clone(), listener));
        Ok(button)
    }

    fn set_control_state(&self, control: &Element, state: ControlState) {
        control.set_text_content(Some(state.label()));
        let _ = control.set_attribute("data-state", &format!("{:?}", state).to_lowercase());
        if state.is_busy() {
            let _ = control.set_attribute("disabled", "");
        } else {
            let _ = control.remove_attribute("disabled");
        }
    }

    fn remove(&self, node: &Element) {
        node.remove();
        let released: Vec<(Element, ClickListener)> = {
            let mut listeners = self.listeners.borrow_mut();
            let (gone, kept) = listeners.drain(..).partition(|(element, _)| element == node);
            *listeners = kept;
            gone
        };
        for (element, listener) in &released {
            let _ = element.remove_event_listener_with_callback("click", listener.as_ref().unchecked_ref());
        }
        release_later(released);
    }

    fn observe_mutations(&self, callback: Rc<dyn Fn()>) -> Result<Cancellation, DomError> {
        let body = self
            .document
            .body()
            .ok_or_else(|| DomError::Operation("document has no body".to_string()))?;

        let closure: Closure<dyn FnMut(js_sys::Array, MutationObserver)> =
            Closure::new(move |_records: js_sys::Array, _observer: MutationObserver| callback());
        let observer = MutationObserver::new(closure.as_ref().unchecked_ref()).map_err(js_error)?;

        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        observer.observe_with_options(&body, &init).map_err(js_error)?;

        Ok(Cancellation::new(move || {
            observer.disconnect();
            release_later(closure);
        }))
    }

    fn observe_scroll(&self, callback: Rc<dyn Fn()>) -> Result<Cancellation, DomError> {
        let closure: Closure<dyn FnMut(Event)> = Closure::new(move |_event: Event| callback());

        let options = AddEventListenerOptions::new();
        options.set_passive(true);
        self.window
            .add_event_listener_with_callback_and_add_event_listener_options(
                "scroll",
                closure.as_ref().unchecked_ref(),
                &options,
            )
            .map_err(js_error)?;

        let window = self.window.clone();
        Ok(Cancellation::new(move || {
            let _ = window.remove_event_listener_with_callback("scroll", closure.as_ref().unchecked_ref());
            release_later(closure);
        }))
    }
}
