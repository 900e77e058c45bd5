//! Transient user-facing notices with auto-dismiss.

use crate::scheduler::{Cancellation, Scheduler};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub u64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notice-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Error,
    Warning,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Error => "error",
            NotificationKind::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotification {
    pub id: NotificationId,
    pub message: String,
    pub kind: NotificationKind,
    pub created_at: f64,
    pub expires_at: f64,
}

/// Renders notices. `stack_index` is the position among live notices.
pub trait NoticeSurface {
    fn mount(&self, notice: &PendingNotification, stack_index: usize);
    fn unmount(&self, id: NotificationId);
}

struct LiveNotice {
    notice: PendingNotification,
    mounted: bool,
    expiry: Option<Cancellation>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    live: Vec<LiveNotice>,
}

/// Owns every live notice and its expiry timer.
pub struct NotificationCenter {
    scheduler: Rc<dyn Scheduler>,
    surface: Rc<dyn NoticeSurface>,
    default_duration: Duration,
    visible: Cell<bool>,
    registry: Rc<RefCell<Registry>>,
}

impl NotificationCenter {
    pub fn new(scheduler: Rc<dyn Scheduler>, surface: Rc<dyn NoticeSurface>, default_duration: Duration) -> Self {
        NotificationCenter {
            scheduler,
            surface,
            default_duration,
            visible: Cell::new(true),
            registry: Rc::new(RefCell::new(Registry::default())),
        }
    }

    /// When hidden, notices are still tracked and expire, but never mounted.
    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn show_default(&self, message: impl Into<String>, kind: NotificationKind) -> NotificationId {
        self.show(message, kind, self.default_duration)
    }

    pub fn show(&self, message: impl Into<String>, kind: NotificationKind, duration: Duration) -> NotificationId {
        let now = self.scheduler.now_ms();
        let (notice, stack_index) = {
            let mut registry = self.registry.borrow_mut();
            let id = NotificationId(registry.next_id);
            registry.next_id += 1;
            let notice = PendingNotification {
                id,
                message: message.into(),
                kind,
                created_at: now,
                expires_at: now + duration.as_millis() as f64,
            };
            let stack_index = registry.live.iter().filter(|live| live.mounted).count();
            (notice, stack_index)
        };
        let id = notice.id;

        let mounted = self.visible.get();
        if mounted {
            self.surface.mount(&notice, stack_index);
        }

        let expiry = {
            let registry: Weak<RefCell<Registry>> = Rc::downgrade(&self.registry);
            let surface = self.surface.clone();
            self.scheduler.set_timeout(
                duration,
                Box::new(move || {
                    if let Some(registry) = registry.upgrade() {
                        remove_notice(&registry, surface.as_ref(), id);
                    }
                }),
            )
        };

        self.registry.borrow_mut().live.push(LiveNotice {
            notice,
            mounted,
            expiry: Some(expiry),
        });
        id
    }

    /// Remove a notice early. Unknown or already-expired ids are ignored.
    pub fn dismiss(&self, id: NotificationId) {
        remove_notice(&self.registry, self.surface.as_ref(), id);
    }

    /// Remove everything and cancel every pending expiry.
    pub fn clear_all(&self) {
        let drained: Vec<LiveNotice> = self.registry.borrow_mut().live.drain(..).collect();
        for mut live in drained {
            if let Some(expiry) = live.expiry.take() {
                expiry.cancel();
            }
            if live.mounted {
                self.surface.unmount(live.notice.id);
            }
        }
    }

    /// Live notices in insertion order.
    pub fn live(&self) -> Vec<PendingNotification> {
        self.registry
            .borrow()
            .live
            .iter()
            .map(|live| live.notice.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_notice(registry: &RefCell<Registry>, surface: &dyn NoticeSurface, id: NotificationId) {
    let removed = {
        let mut registry = registry.borrow_mut();
        registry
            .live
            .iter()
            .position(|live| live.notice.id == id)
            .map(|index| registry.live.remove(index))
    };

    if let Some(mut live) = removed {
        if let Some(expiry) = live.expiry.take() {
            expiry.cancel();
        }
        if live.mounted {
            surface.unmount(id);
        }
    }
}
