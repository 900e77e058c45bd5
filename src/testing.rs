//! In-memory stand-ins for the browser: a virtual clock, a fake DOM,
//! a scripted HTTP transport and a recording notice surface.

use crate::api::{HttpRequest, HttpResponse, Transport};
use crate::dom::{ControlSpec, ControlState, MediaInfo, Page};
use crate::error::{DomError, TransportError};
use crate::notification::{NoticeSurface, NotificationId, PendingNotification};
use crate::scheduler::{Cancellation, Scheduler, Sleeper};
use async_trait::async_trait;
use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::rc::{Rc, Weak};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Virtual clock

enum TimerKind {
    Once(Box<dyn FnOnce()>),
    Repeating { period: f64, task: Box<dyn FnMut()> },
}

struct VirtualTimer {
    id: u64,
    due: f64,
    kind: TimerKind,
}

struct ClockState {
    now: Cell<f64>,
    next_id: Cell<u64>,
    timers: RefCell<Vec<VirtualTimer>>,
    live: RefCell<HashSet<u64>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
}

impl ClockState {
    fn schedule(self: &Rc<Self>, due: f64, kind: TimerKind) -> Cancellation {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.live.borrow_mut().insert(id);
        self.timers.borrow_mut().push(VirtualTimer { id, due, kind });

        let weak: Weak<ClockState> = Rc::downgrade(self);
        Cancellation::new(move || {
            if let Some(state) = weak.upgrade() {
                state.live.borrow_mut().remove(&id);
                let removed = {
                    let mut timers = state.timers.borrow_mut();
                    timers
                        .iter()
                        .position(|t| t.id == id)
                        .map(|index| timers.remove(index))
                };
                drop(removed);
            }
        })
    }

    fn take_next_due(&self, deadline: f64) -> Option<VirtualTimer> {
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= deadline)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
            .map(|(index, _)| index)?;
        Some(timers.remove(index))
    }

    fn run_pool(&self) {
        self.pool.borrow_mut().run_until_stalled();
    }
}

/// Deterministic scheduler: time only moves on `advance`.
pub struct VirtualScheduler {
    state: Rc<ClockState>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        VirtualScheduler {
            state: Rc::new(ClockState {
                now: Cell::new(0.0),
                next_id: Cell::new(0),
                timers: RefCell::new(Vec::new()),
                live: RefCell::new(HashSet::new()),
                pool: RefCell::new(pool),
                spawner,
            }),
        }
    }

    /// Move the clock forward, firing due timers in order and draining
    /// spawned futures after each one.
    pub fn advance(&self, by: Duration) {
        let state = &self.state;
        let deadline = state.now.get() + by.as_millis() as f64;
        state.run_pool();

        while let Some(timer) = state.take_next_due(deadline) {
            state.now.set(state.now.get().max(timer.due));
            match timer.kind {
                TimerKind::Once(task) => {
                    state.live.borrow_mut().remove(&timer.id);
                    task();
                }
                TimerKind::Repeating { period, mut task } => {
                    task();
                    if state.live.borrow().contains(&timer.id) {
                        state.timers.borrow_mut().push(VirtualTimer {
                            id: timer.id,
                            due: timer.due + period,
                            kind: TimerKind::Repeating { period, task },
                        });
                    }
                }
            }
            state.run_pool();
        }

        state.now.set(deadline);
        state.run_pool();
    }

    /// Drain spawned futures without moving the clock.
    pub fn run_until_idle(&self) {
        self.state.run_pool();
    }

    pub fn pending_timers(&self) -> usize {
        self.state.timers.borrow().len()
    }
}

impl Scheduler for VirtualScheduler {
    fn now_ms(&self) -> f64 {
        self.state.now.get()
    }

    fn set_timeout(&self, delay: Duration, task: Box<dyn FnOnce()>) -> Cancellation {
        let due = self.state.now.get() + delay.as_millis() as f64;
        self.state.schedule(due, TimerKind::Once(task))
    }

    fn set_interval(&self, period: Duration, task: Box<dyn FnMut()>) -> Cancellation {
        let period = (period.as_millis() as f64).max(1.0);
        let due = self.state.now.get() + period;
        self.state.schedule(due, TimerKind::Repeating { period, task })
    }

    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.state.spawner.spawn_local(task) {
            panic!("virtual executor shut down: {e}");
        }
    }
}

impl Sleeper for VirtualScheduler {
    fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel::<()>();
        let handle = self.set_timeout(
            delay,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        Box::pin(async move {
            let _handle = handle;
            let _ = rx.await;
        })
    }
}

/// Sleeper that returns immediately and remembers what it was asked for.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) -> LocalBoxFuture<'static, ()> {
        self.delays.borrow_mut().push(delay);
        Box::pin(async {})
    }
}

// ---------------------------------------------------------------------------
// Scripted HTTP

/// Transport answering from per-URL queues. Unscripted URLs fail as unreachable.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: RefCell<Vec<(String, VecDeque<Result<HttpResponse, TransportError>>)>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for URLs ending with `path`.
    pub fn script(&self, path: &str, response: Result<HttpResponse, TransportError>) {
        let mut scripts = self.scripts.borrow_mut();
        match scripts.iter_mut().find(|(key, _)| key == path) {
            Some((_, queue)) => queue.push_back(response),
            None => scripts.push((path.to_string(), VecDeque::from([response]))),
        }
    }

    pub fn script_json(&self, path: &str, status: u16, body: serde_json::Value) {
        self.script(
            path,
            Ok(HttpResponse {
                status,
                body: body.to_string().into_bytes(),
            }),
        );
    }

    pub fn script_network_error(&self, path: &str, message: &str) {
        self.script(path, Err(TransportError::Network(message.to_string())));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.borrow().clone()
    }

    pub fn requests_to(&self, path: &str) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .count()
    }
}

#[async_trait(?Send)]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.clone();
        self.requests.borrow_mut().push(request);

        let mut scripts = self.scripts.borrow_mut();
        let queue = scripts
            .iter_mut()
            .find(|(path, _)| url.ends_with(path.as_str()))
            .map(|(_, queue)| queue);

        match queue.and_then(|queue| queue.pop_front()) {
            Some(response) => response,
            None => Err(TransportError::Network(format!("unreachable: {url}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Notice surface

#[derive(Default)]
pub struct RecordingSurface {
    visible: RefCell<Vec<(NotificationId, usize)>>,
    history: RefCell<Vec<PendingNotification>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible_ids(&self) -> Vec<NotificationId> {
        self.visible.borrow().iter().map(|(id, _)| *id).collect()
    }

    pub fn stack_index_of(&self, id: NotificationId) -> Option<usize> {
        self.visible
            .borrow()
            .iter()
            .find(|(visible, _)| *visible == id)
            .map(|(_, index)| *index)
    }

    pub fn history(&self) -> Vec<PendingNotification> {
        self.history.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.history.borrow().iter().map(|n| n.message.clone()).collect()
    }
}

impl NoticeSurface for RecordingSurface {
    fn mount(&self, notice: &PendingNotification, stack_index: usize) {
        self.visible.borrow_mut().push((notice.id, stack_index));
        self.history.borrow_mut().push(notice.clone());
    }

    fn unmount(&self, id: NotificationId) {
        self.visible.borrow_mut().retain(|(visible, _)| *visible != id);
    }
}

// ---------------------------------------------------------------------------
// Fake DOM

/// Handle to an element of a [`FakePage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FakeNode(usize);

struct FakeControl {
    state: ControlState,
    on_click: Rc<dyn Fn()>,
}

#[derive(Default)]
struct FakeElement {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
    media: Option<MediaInfo>,
    control: Option<FakeControl>,
}

impl FakeElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

struct FakeState {
    href: String,
    elements: Vec<FakeElement>,
    next_listener: u64,
    mutation_observers: Vec<(u64, Rc<dyn Fn()>)>,
    scroll_listeners: Vec<(u64, Rc<dyn Fn()>)>,
    dom_writes: usize,
    frame: Result<Vec<u8>, DomError>,
}

/// A tiny DOM: elements, compound selectors with descendant combinators,
/// and manual mutation/scroll triggers.
pub struct FakePage {
    state: Rc<RefCell<FakeState>>,
}

impl FakePage {
    pub fn new(href: &str) -> Self {
        let body = FakeElement {
            tag: "body".to_string(),
            ..Default::default()
        };
        FakePage {
            state: Rc::new(RefCell::new(FakeState {
                href: href.to_string(),
                elements: vec![body],
                next_listener: 0,
                mutation_observers: Vec::new(),
                scroll_listeners: Vec::new(),
                dom_writes: 0,
                frame: Ok(vec![0xFF, 0xD8, 0xFF, 0xE0]),
            })),
        }
    }

    pub fn root(&self) -> FakeNode {
        FakeNode(0)
    }

    pub fn set_href(&self, href: &str) {
        self.state.borrow_mut().href = href.to_string();
    }

    /// Append an element described by a compound selector,
    /// e.g. `div.post[data-e2e="video-player"]`.
    pub fn append(&self, parent: FakeNode, descriptor: &str) -> FakeNode {
        let compound = parse_compound(descriptor);
        let element = FakeElement {
            tag: compound.tag.unwrap_or_else(|| "div".to_string()),
            id: compound.id,
            classes: compound.classes,
            attrs: compound
                .attrs
                .into_iter()
                .map(|attr| match attr.op {
                    AttrOp::Exists => (attr.name, String::new()),
                    AttrOp::Equals(value) | AttrOp::Contains(value) => (attr.name, value),
                })
                .collect(),
            ..Default::default()
        };
        self.insert(parent, element)
    }

    /// Append a `<video>` with the given source.
    pub fn make_video(&self, parent: FakeNode, src: Option<&str>) -> FakeNode {
        let element = FakeElement {
            tag: "video".to_string(),
            media: Some(MediaInfo {
                src: src.map(str::to_string),
                current_src: src.map(str::to_string),
                duration: Some(15.0),
            }),
            ..Default::default()
        };
        self.insert(parent, element)
    }

    fn insert(&self, parent: FakeNode, mut element: FakeElement) -> FakeNode {
        let mut state = self.state.borrow_mut();
        let index = state.elements.len();
        element.parent = Some(parent.0);
        state.elements.push(element);
        state.elements[parent.0].children.push(index);
        FakeNode(index)
    }

    pub fn set_text(&self, node: FakeNode, text: &str) {
        self.state.borrow_mut().elements[node.0].text = text.to_string();
    }

    pub fn set_attr(&self, node: FakeNode, name: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        let element = &mut state.elements[node.0];
        element.attrs.retain(|(key, _)| key != name);
        element.attrs.push((name.to_string(), value.to_string()));
    }

    pub fn set_frame_result(&self, frame: Result<Vec<u8>, DomError>) {
        self.state.borrow_mut().frame = frame;
    }

    /// Remove `node` from the tree without counting it as a write by us.
    pub fn detach(&self, node: FakeNode) {
        let mut state = self.state.borrow_mut();
        detach_element(&mut state, node.0);
    }

    /// Click a control. Disabled (busy) controls ignore clicks.
    pub fn click(&self, node: FakeNode) {
        let handler = {
            let state = self.state.borrow();
            state.elements[node.0]
                .control
                .as_ref()
                .filter(|control| !control.state.is_busy())
                .map(|control| control.on_click.clone())
        };
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn fire_mutation(&self) {
        let callbacks: Vec<_> = self
            .state
            .borrow()
            .mutation_observers
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn fire_scroll(&self) {
        let callbacks: Vec<_> = self
            .state
            .borrow()
            .scroll_listeners
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn mutation_observer_count(&self) -> usize {
        self.state.borrow().mutation_observers.len()
    }

    pub fn scroll_listener_count(&self) -> usize {
        self.state.borrow().scroll_listeners.len()
    }

    pub fn dom_writes(&self) -> usize {
        self.state.borrow().dom_writes
    }

    pub fn control_state(&self, node: FakeNode) -> Option<ControlState> {
        self.state.borrow().elements[node.0]
            .control
            .as_ref()
            .map(|control| control.state)
    }

    /// Controls still holding a click handler, attached or not.
    pub fn click_handlers(&self) -> usize {
        self.state
            .borrow()
            .elements
            .iter()
            .filter(|element| element.control.is_some())
            .count()
    }

    /// Attached controls in document order.
    pub fn controls(&self) -> Vec<FakeNode> {
        let state = self.state.borrow();
        descendants(&state, 0)
            .into_iter()
            .filter(|index| state.elements[*index].control.is_some())
            .map(FakeNode)
            .collect()
    }

    pub fn parent_of(&self, node: FakeNode) -> Option<FakeNode> {
        self.state.borrow().elements[node.0].parent.map(FakeNode)
    }
}

fn detach_element(state: &mut FakeState, index: usize) -> bool {
    let Some(parent) = state.elements[index].parent.take() else {
        return false;
    };
    state.elements[parent].children.retain(|child| *child != index);
    true
}

fn descendants(state: &FakeState, index: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack: Vec<usize> = state.elements[index].children.iter().rev().copied().collect();
    while let Some(next) = stack.pop() {
        out.push(next);
        stack.extend(state.elements[next].children.iter().rev().copied());
    }
    out
}

fn attached(state: &FakeState, mut index: usize) -> bool {
    loop {
        if index == 0 {
            return true;
        }
        match state.elements[index].parent {
            Some(parent) => index = parent,
            None => return false,
        }
    }
}

fn text_content(state: &FakeState, index: usize) -> String {
    let mut text = state.elements[index].text.clone();
    for child in descendants(state, index) {
        text.push_str(&state.elements[child].text);
    }
    text
}

impl Page for FakePage {
    type Node = FakeNode;

    fn href(&self) -> String {
        self.state.borrow().href.clone()
    }

    fn user_agent(&self) -> String {
        "FakePage/1.0".to_string()
    }

    fn query_all(&self, scope: Option<&FakeNode>, selector: &str) -> Vec<FakeNode> {
        let selectors = parse_selector_list(selector);
        let state = self.state.borrow();
        let root = scope.map_or(0, |node| node.0);

        descendants(&state, root)
            .into_iter()
            .filter(|index| selectors.iter().any(|chain| matches_chain(&state, *index, chain)))
            .map(FakeNode)
            .collect()
    }

    fn closest(&self, node: &FakeNode, selector: &str) -> Option<FakeNode> {
        let selectors = parse_selector_list(selector);
        let state = self.state.borrow();
        let mut current = Some(node.0);
        while let Some(index) = current {
            if selectors.iter().any(|chain| matches_chain(&state, index, chain)) {
                return Some(FakeNode(index));
            }
            current = state.elements[index].parent;
        }
        None
    }

    fn parent(&self, node: &FakeNode) -> Option<FakeNode> {
        self.parent_of(*node)
    }

    fn is_attached(&self, node: &FakeNode) -> bool {
        attached(&self.state.borrow(), node.0)
    }

    fn text(&self, node: &FakeNode) -> Option<String> {
        let text = text_content(&self.state.borrow(), node.0);
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    fn attribute(&self, node: &FakeNode, name: &str) -> Option<String> {
        self.state.borrow().elements[node.0].attr(name).map(str::to_string)
    }

    fn media_info(&self, node: &FakeNode) -> Option<MediaInfo> {
        self.state.borrow().elements[node.0].media.clone()
    }

    fn capture_frame(&self, node: &FakeNode) -> Result<Vec<u8>, DomError> {
        let state = self.state.borrow();
        if !attached(&state, node.0) {
            return Err(DomError::Detached);
        }
        if state.elements[node.0].media.is_none() {
            return Err(DomError::Operation("not a video element".to_string()));
        }
        state.frame.clone()
    }

    fn inject_control(
        &self,
        host: &FakeNode,
        spec: &ControlSpec,
        on_click: Rc<dyn Fn()>,
    ) -> Result<FakeNode, DomError> {
        if !self.is_attached(host) {
            return Err(DomError::Detached);
        }
        let element = FakeElement {
            tag: "button".to_string(),
            classes: vec![spec.marker_class.clone(), spec.platform_class.clone()],
            attrs: vec![("title".to_string(), spec.title.clone())],
            text: spec.label.clone(),
            control: Some(FakeControl {
                state: ControlState::Idle,
                on_click,
            }),
            ..Default::default()
        };
        let node = self.insert(*host, element);
        self.state.borrow_mut().dom_writes += 1;
        Ok(node)
    }

    fn set_control_state(&self, control: &FakeNode, control_state: ControlState) {
        let mut state = self.state.borrow_mut();
        let element = &mut state.elements[control.0];
        if let Some(existing) = element.control.as_mut() {
            existing.state = control_state;
            element.text = control_state.label().to_string();
            state.dom_writes += 1;
        }
    }

    fn remove(&self, node: &FakeNode) {
        let released = {
            let mut state = self.state.borrow_mut();
            if detach_element(&mut state, node.0) {
                state.dom_writes += 1;
            }
            state.elements[node.0].control.take()
        };
        drop(released);
    }

    fn observe_mutations(&self, callback: Rc<dyn Fn()>) -> Result<Cancellation, DomError> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_listener;
            state.next_listener += 1;
            state.mutation_observers.push((id, callback));
            id
        };
        let weak = Rc::downgrade(&self.state);
        Ok(Cancellation::new(move || {
            if let Some(state) = weak.upgrade() {
                let removed: Vec<_> = {
                    let mut state = state.borrow_mut();
                    let (removed, kept) = std::mem::take(&mut state.mutation_observers)
                        .into_iter()
                        .partition(|(observer, _)| *observer == id);
                    state.mutation_observers = kept;
                    removed
                };
                drop(removed);
            }
        }))
    }

    fn observe_scroll(&self, callback: Rc<dyn Fn()>) -> Result<Cancellation, DomError> {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = state.next_listener;
            state.next_listener += 1;
            state.scroll_listeners.push((id, callback));
            id
        };
        let weak = Rc::downgrade(&self.state);
        Ok(Cancellation::new(move || {
            if let Some(state) = weak.upgrade() {
                let removed: Vec<_> = {
                    let mut state = state.borrow_mut();
                    let (removed, kept) = std::mem::take(&mut state.scroll_listeners)
                        .into_iter()
                        .partition(|(listener, _)| *listener == id);
                    state.scroll_listeners = kept;
                    removed
                };
                drop(removed);
            }
        }))
    }
}

// ---------------------------------------------------------------------------
// Selector subset: tag, #id, .class, [attr], [attr="v"], [attr*="v"],
// descendant combinator, comma lists.

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals(String),
    Contains(String),
}

#[derive(Debug, Clone, PartialEq)]
struct AttrMatch {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrMatch>,
}

fn split_outside_brackets(input: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, c) if depth == 0 && is_separator(c) => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_string());
                }
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn parse_selector_list(selector: &str) -> Vec<Vec<Compound>> {
    split_outside_brackets(selector, |c| c == ',')
        .iter()
        .map(|chain| {
            split_outside_brackets(chain, char::is_whitespace)
                .iter()
                .map(|part| parse_compound(part))
                .collect()
        })
        .collect()
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(input: &str) -> Compound {
    let mut compound = Compound::default();
    let chars: Vec<char> = input.trim().chars().collect();
    let mut i = 0;

    let read_ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    if i < chars.len() && chars[i] == '*' {
        i += 1;
    } else {
        let tag = read_ident(&mut i);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_lowercase());
        }
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                compound.id = Some(read_ident(&mut i));
            }
            '.' => {
                i += 1;
                compound.classes.push(read_ident(&mut i));
            }
            '[' => {
                let start = i + 1;
                let mut quote = None;
                i += 1;
                while i < chars.len() {
                    match (quote, chars[i]) {
                        (Some(q), c) if c == q => quote = None,
                        (None, '"' | '\'') => quote = Some(chars[i]),
                        (None, ']') => break,
                        _ => {}
                    }
                    i += 1;
                }
                let body: String = chars[start..i.min(chars.len())].iter().collect();
                compound.attrs.push(parse_attr(&body));
                i += 1;
            }
            _ => i += 1,
        }
    }
    compound
}

fn parse_attr(body: &str) -> AttrMatch {
    let unquote = |value: &str| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string();

    if let Some((name, value)) = body.split_once("*=") {
        AttrMatch {
            name: name.trim().to_string(),
            op: AttrOp::Contains(unquote(value)),
        }
    } else if let Some((name, value)) = body.split_once('=') {
        AttrMatch {
            name: name.trim().to_string(),
            op: AttrOp::Equals(unquote(value)),
        }
    } else {
        AttrMatch {
            name: body.trim().to_string(),
            op: AttrOp::Exists,
        }
    }
}

fn matches_compound(element: &FakeElement, compound: &Compound) -> bool {
    if let Some(tag) = &compound.tag {
        if &element.tag != tag {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if element.id.as_ref() != Some(id) {
            return false;
        }
    }
    if !compound.classes.iter().all(|class| element.classes.contains(class)) {
        return false;
    }
    compound.attrs.iter().all(|attr| match (&attr.op, element.attr(&attr.name)) {
        (_, None) => false,
        (AttrOp::Exists, Some(_)) => true,
        (AttrOp::Equals(expected), Some(actual)) => actual == expected,
        (AttrOp::Contains(needle), Some(actual)) => actual.contains(needle.as_str()),
    })
}

fn matches_chain(state: &FakeState, index: usize, chain: &[Compound]) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !matches_compound(&state.elements[index], last) {
        return false;
    }

    let mut remaining = ancestors;
    let mut current = state.elements[index].parent;
    while let Some((wanted, rest)) = remaining.split_last() {
        loop {
            let Some(ancestor) = current else {
                return false;
            };
            current = state.elements[ancestor].parent;
            if matches_compound(&state.elements[ancestor], wanted) {
                break;
            }
        }
        remaining = rest;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_scheduler_orders_timers() {
        let scheduler = VirtualScheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let mut handles = Vec::new();
        for (delay, label) in [(300, "c"), (100, "a"), (200, "b")] {
            let order = order.clone();
            handles.push(scheduler.set_timeout(
                Duration::from_millis(delay),
                Box::new(move || order.borrow_mut().push(label)),
            ));
        }

        scheduler.advance(Duration::from_millis(250));
        assert_eq!(*order.borrow(), vec!["a", "b"]);
        scheduler.advance(Duration::from_millis(50));
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
        assert_eq!(scheduler.now_ms(), 300.0);
    }

    #[test]
    fn test_virtual_interval_repeats_until_cancelled() {
        let scheduler = VirtualScheduler::new();
        let ticks = Rc::new(Cell::new(0));
        let counter = ticks.clone();
        let handle = scheduler.set_interval(
            Duration::from_secs(3),
            Box::new(move || counter.set(counter.get() + 1)),
        );

        scheduler.advance(Duration::from_secs(10));
        assert_eq!(ticks.get(), 3);

        handle.cancel();
        scheduler.advance(Duration::from_secs(10));
        assert_eq!(ticks.get(), 3);
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn test_virtual_sleep_resolves_on_advance() {
        let scheduler = Rc::new(VirtualScheduler::new());
        let done = Rc::new(Cell::new(false));

        let sleep = scheduler.sleep(Duration::from_secs(2));
        let flag = done.clone();
        scheduler.spawn_local(Box::pin(async move {
            sleep.await;
            flag.set(true);
        }));

        scheduler.advance(Duration::from_secs(1));
        assert!(!done.get());
        scheduler.advance(Duration::from_secs(1));
        assert!(done.get());
    }

    #[test]
    fn test_fake_page_selectors() {
        let page = FakePage::new("https://www.tiktok.com/foryou");
        let item = page.append(page.root(), r#"div[data-e2e="recommend-list-item"]"#);
        let wrapper = page.append(item, r#"div.wrap[data-e2e="video-wrapper"]"#);
        page.make_video(wrapper, Some("blob:https://www.tiktok.com/1"));
        let button = page.append(item, r#"svg[aria-label="Save video"]"#);

        assert_eq!(page.query_all(None, "video").len(), 1);
        assert_eq!(page.query_all(None, r#"[data-e2e="recommend-list-item"] video"#).len(), 1);
        assert_eq!(page.query_all(None, r#"[data-e2e*="wrapper"]"#), vec![wrapper]);
        assert_eq!(page.query_all(None, r#"svg[aria-label*="Save"], div.wrap"#).len(), 2);
        assert_eq!(page.query(Some(&wrapper), "svg"), None);
        assert_eq!(page.closest(&button, "[data-e2e]"), Some(item));
        assert_eq!(page.query_all(None, "article video").len(), 0);
    }

    #[test]
    fn test_fake_page_detach_and_text() {
        let page = FakePage::new("https://www.instagram.com/");
        let article = page.append(page.root(), "article");
        let span = page.append(article, "span");
        page.set_text(span, "hello #rust");

        assert_eq!(page.text(&article), Some("hello #rust".to_string()));
        assert!(page.is_attached(&span));
        page.detach(article);
        assert!(!page.is_attached(&span));
        assert!(page.query_all(None, "span").is_empty());
    }

    #[test]
    fn test_fake_page_observer_cancellation() {
        let page = FakePage::new("https://www.instagram.com/");
        let fired = Rc::new(Cell::new(0));
        let counter = fired.clone();
        let handle = page
            .observe_mutations(Rc::new(move || counter.set(counter.get() + 1)))
            .unwrap();

        page.fire_mutation();
        handle.cancel();
        page.fire_mutation();

        assert_eq!(fired.get(), 1);
        assert_eq!(page.mutation_observer_count(), 0);
    }

    #[test]
    fn test_scripted_transport_routes_by_path() {
        let transport = ScriptedTransport::new();
        transport.script_json("/health", 200, serde_json::json!({"status": "ok"}));

        let ok = futures::executor::block_on(transport.execute(HttpRequest::get("http://localhost:3000/health")));
        assert_eq!(ok.unwrap().status, 200);

        let missing = futures::executor::block_on(transport.execute(HttpRequest::get("http://localhost:3000/health")));
        assert!(missing.is_err());
        assert_eq!(transport.requests_to("/health"), 2);
    }
}
