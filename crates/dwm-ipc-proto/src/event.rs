//! Event kinds and subscription masks

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kinds of server-pushed events
///
/// The serialized names are the tokens used both in `Subscribe` payloads and
/// as the single top-level key of every `Event` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "tag_change_event")]
    TagChange,
    #[serde(rename = "client_focus_change_event")]
    ClientFocusChange,
    #[serde(rename = "layout_change_event")]
    LayoutChange,
    #[serde(rename = "monitor_focus_change_event")]
    MonitorFocusChange,
    #[serde(rename = "focused_title_change_event")]
    FocusedTitleChange,
    #[serde(rename = "focused_state_change_event")]
    FocusedStateChange,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::TagChange,
        EventKind::ClientFocusChange,
        EventKind::LayoutChange,
        EventKind::MonitorFocusChange,
        EventKind::FocusedTitleChange,
        EventKind::FocusedStateChange,
    ];

    /// Wire token for this event
    pub fn name(&self) -> &'static str {
        match self {
            Self::TagChange => "tag_change_event",
            Self::ClientFocusChange => "client_focus_change_event",
            Self::LayoutChange => "layout_change_event",
            Self::MonitorFocusChange => "monitor_focus_change_event",
            Self::FocusedTitleChange => "focused_title_change_event",
            Self::FocusedStateChange => "focused_state_change_event",
        }
    }

    /// Look up an event by its wire token (exact match)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of event kinds a connection wants pushed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn subscribe(&mut self, kind: EventKind) {
        self.0 |= kind.bit();
    }

    /// Clear exactly this kind's bit; a no-op if it was not set
    pub fn unsubscribe(&mut self, kind: EventKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// Action field of a `Subscribe` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeAction {
    Subscribe,
    Unsubscribe,
}

impl SubscribeAction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "subscribe" => Some(Self::Subscribe),
            "unsubscribe" => Some(Self::Unsubscribe),
            _ => None,
        }
    }
}
