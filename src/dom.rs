//! The page seam.
//!
//! Handlers only see the document through [`Page`], so every selector
//! heuristic and injection rule can run against an in-memory page in tests
//! and against `web_sys` in the browser.

use crate::error::DomError;
use crate::scheduler::Cancellation;
use std::rc::Rc;

/// Class carried by every injected capture control.
pub const CONTROL_MARKER_CLASS: &str = "reel-capture-control";

/// What a `<video>` element reports about its source.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub src: Option<String>,
    pub current_src: Option<String>,
    /// Seconds; `None` while metadata is still loading.
    pub duration: Option<f64>,
}

impl MediaInfo {
    /// The attribute source, falling back to the resolved one.
    pub fn best_source(&self) -> Option<&str> {
        self.src
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.current_src.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Visual state of an injected control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Idle,
    Loading,
    Success,
    Error,
    Duplicate,
}

impl ControlState {
    pub fn label(&self) -> &'static str {
        match self {
            ControlState::Idle => "💾 Save",
            ControlState::Loading => "⏳ Saving...",
            ControlState::Success => "✅ Saved",
            ControlState::Error => "❌ Failed",
            ControlState::Duplicate => "⚠️ Already saved",
        }
    }

    /// Disabled while a capture is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, ControlState::Loading)
    }
}

/// How to render a new control.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSpec {
    pub marker_class: String,
    pub platform_class: String,
    pub label: String,
    pub title: String,
}

/// Document access used by the handlers.
pub trait Page {
    type Node: Clone + PartialEq + 'static;

    /// Full URL of the current document.
    fn href(&self) -> String;

    fn user_agent(&self) -> String {
        String::new()
    }

    /// All matches for `selector` below `scope`, or in the whole document.
    /// An invalid selector yields no matches.
    fn query_all(&self, scope: Option<&Self::Node>, selector: &str) -> Vec<Self::Node>;

    fn query(&self, scope: Option<&Self::Node>, selector: &str) -> Option<Self::Node> {
        self.query_all(scope, selector).into_iter().next()
    }

    /// Nearest ancestor-or-self matching `selector`.
    fn closest(&self, node: &Self::Node, selector: &str) -> Option<Self::Node>;

    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;

    fn is_attached(&self, node: &Self::Node) -> bool;

    /// Trimmed text content; `None` when empty.
    fn text(&self, node: &Self::Node) -> Option<String>;

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// `None` when `node` is not a video element.
    fn media_info(&self, node: &Self::Node) -> Option<MediaInfo>;

    /// Encode the currently displayed frame of a video element as JPEG.
    fn capture_frame(&self, node: &Self::Node) -> Result<Vec<u8>, DomError>;

    /// Append a clickable control to `host`.
    fn inject_control(
        &self,
        host: &Self::Node,
        spec: &ControlSpec,
        on_click: Rc<dyn Fn()>,
    ) -> Result<Self::Node, DomError>;

    fn set_control_state(&self, control: &Self::Node, state: ControlState);

    /// Detach `node` and release anything registered on it. Missing nodes are ignored.
    fn remove(&self, node: &Self::Node);

    /// Subtree mutation watcher on the document body.
    fn observe_mutations(&self, callback: Rc<dyn Fn()>) -> Result<Cancellation, DomError>;

    /// Passive window scroll listener.
    fn observe_scroll(&self, callback: Rc<dyn Fn()>) -> Result<Cancellation, DomError>;

    /// First non-empty text among `selectors`, searched in order.
    fn first_text(&self, scope: Option<&Self::Node>, selectors: &[&str]) -> Option<String> {
        selectors
            .iter()
            .filter_map(|selector| self.query(scope, selector))
            .find_map(|node| self.text(&node))
    }
}
