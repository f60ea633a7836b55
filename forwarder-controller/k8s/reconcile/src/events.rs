//! Events recorded on a forwarder as its resources are written.

use kube::runtime::events::EventType;

pub mod reason {
    pub const GET_OBJECT: &str = "GetObject";
    pub const CREATE_OBJECT: &str = "CreateObject";
    pub const UPDATE_OBJECT: &str = "UpdateObject";
    pub const REMOVE_OBJECT: &str = "RemoveObject";
}

const ACTION: &str = "Reconcile";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub warning: bool,
    pub reason: &'static str,
    pub note: String,
}

// === impl Event ===

impl Event {
    pub fn normal(reason: &'static str, note: impl ToString) -> Self {
        Self {
            warning: false,
            reason,
            note: note.to_string(),
        }
    }

    pub fn warning(reason: &'static str, note: impl ToString) -> Self {
        Self {
            warning: true,
            reason,
            note: note.to_string(),
        }
    }

    pub(crate) fn into_kube(self) -> kube::runtime::events::Event {
        kube::runtime::events::Event {
            type_: if self.warning {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: self.reason.to_string(),
            note: Some(self.note),
            action: ACTION.to_string(),
            secondary: None,
        }
    }
}
