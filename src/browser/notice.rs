use crate::notification::{NoticeSurface, NotificationId, PendingNotification};
use wasm_bindgen::JsCast;
use web_sys::{Document, Element};

const NOTICE_CLASS: &str = "reel-capture-notice";
const TOP_OFFSET_PX: usize = 20;
const STACK_STEP_PX: usize = 70;

fn position_style(stack_index: usize) -> String {
    format!(
        "position: fixed; right: 20px; top: {}px; z-index: 2147483647;",
        TOP_OFFSET_PX + stack_index * STACK_STEP_PX
    )
}

/// Fixed-position toasts stacked in the top right corner.
pub struct DomNoticeSurface {
    document: Document,
}

impl DomNoticeSurface {
    pub fn new(document: Document) -> Self {
        DomNoticeSurface { document }
    }

    fn restack(&self) {
        let Ok(list) = self.document.query_selector_all(&format!(".{}", NOTICE_CLASS)) else {
            return;
        };
        for index in 0..list.length() {
            if let Some(element) = list.item(index).and_then(|node| node.dyn_into::<Element>().ok()) {
                let _ = element.set_attribute("style", &position_style(index as usize));
            }
        }
    }
}

impl NoticeSurface for DomNoticeSurface {
    fn mount(&self, notice: &PendingNotification, stack_index: usize) {
        let Some(body) = self.document.body() else {
            return;
        };
        let Ok(element) = self.document.create_element("div") else {
            return;
        };
        element.set_id(&notice.id.to_string());
        element.set_class_name(&format!("{} {}-{}", NOTICE_CLASS, NOTICE_CLASS, notice.kind.as_str()));
        element.set_text_content(Some(&notice.message));
        let _ = element.set_attribute("role", "status");
        let _ = element.set_attribute("style", &position_style(stack_index));
        let _ = body.append_child(&element);
    }

    fn unmount(&self, id: NotificationId) {
        if let Some(element) = self.document.get_element_by_id(&id.to_string()) {
            element.remove();
            self.restack();
        }
    }
}
