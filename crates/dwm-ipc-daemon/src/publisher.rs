//! Change detection and event fan-out
//!
//! The publisher keeps its own copy of what it last saw for every monitor
//! and focused client, compares it with the current window-manager state,
//! and pushes one event per difference to the clients subscribed to that
//! kind. Anything seen for the first time only establishes a baseline.

use std::collections::{HashMap, HashSet};

use dwm_ipc_proto::{encode, EventKind, MessageType};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::registry::ClientRegistry;
use crate::serializer::{self, StatesDoc};
use crate::wm::{ClientFlags, TagState, WindowId, WmState};

#[derive(Debug, Serialize)]
struct TagChange {
    monitor_number: usize,
    old_state: TagState,
    new_state: TagState,
}

#[derive(Debug, Serialize)]
struct ClientFocusChange {
    monitor_number: usize,
    old_win_id: Option<WindowId>,
    new_win_id: Option<WindowId>,
}

#[derive(Debug, Serialize)]
struct LayoutChange {
    monitor_number: usize,
    old_symbol: String,
    old_layout_id: usize,
    new_symbol: String,
    new_layout_id: usize,
}

#[derive(Debug, Serialize)]
struct MonitorFocusChange {
    old_monitor_number: usize,
    new_monitor_number: usize,
}

#[derive(Debug, Serialize)]
struct FocusedTitleChange {
    monitor_number: usize,
    client_window_id: WindowId,
    old_name: String,
    new_name: String,
}

#[derive(Debug, Serialize)]
struct FocusedStateChange {
    monitor_number: usize,
    client_window_id: WindowId,
    old_state: StatesDoc,
    new_state: StatesDoc,
}

/// Last observed state of one monitor
#[derive(Debug, Clone, PartialEq)]
struct MonitorSnapshot {
    tags: TagState,
    selected: Option<WindowId>,
    layout_symbol: String,
    layout_id: usize,
    /// Focused client and its name
    focused_title: Option<(WindowId, String)>,
}

/// An event ready to be delivered
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// `{"<event name>": {...}}`
    pub document: Value,
}

impl Event {
    fn new<T: Serialize>(kind: EventKind, body: T) -> Option<Self> {
        match serde_json::to_value(body) {
            Ok(body) => Some(Self {
                kind,
                document: json!({ kind.name(): body }),
            }),
            Err(e) => {
                warn!("Failed to serialize {}: {}", kind, e);
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EventPublisher {
    monitors: HashMap<usize, MonitorSnapshot>,
    selected_monitor: Option<usize>,
    /// Flags of each client as of the last cycle it was focused
    client_flags: HashMap<WindowId, ClientFlags>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state without emitting anything
    pub fn prime(&mut self, wm: &WmState) {
        self.detect(wm);
    }

    /// Diff against the stored snapshots and return the resulting events in
    /// cycle order: per monitor tag, focus and layout changes, then the
    /// monitor focus change, then per monitor title and state changes
    pub fn detect(&mut self, wm: &WmState) -> Vec<Event> {
        let mut events = Vec::new();
        let mut current = HashMap::with_capacity(wm.monitors.len());

        for monitor in &wm.monitors {
            let snapshot = MonitorSnapshot {
                tags: monitor.tag_state(),
                selected: monitor.selected,
                layout_symbol: monitor.layout_symbol.clone(),
                layout_id: monitor.layout_id(),
                focused_title: monitor.selected_client().map(|c| (c.window, c.name.clone())),
            };

            if let Some(old) = self.monitors.get(&monitor.num) {
                if old.tags != snapshot.tags {
                    events.extend(Event::new(
                        EventKind::TagChange,
                        TagChange {
                            monitor_number: monitor.num,
                            old_state: old.tags,
                            new_state: snapshot.tags,
                        },
                    ));
                }
                if old.selected != snapshot.selected {
                    events.extend(Event::new(
                        EventKind::ClientFocusChange,
                        ClientFocusChange {
                            monitor_number: monitor.num,
                            old_win_id: old.selected,
                            new_win_id: snapshot.selected,
                        },
                    ));
                }
                if old.layout_symbol != snapshot.layout_symbol || old.layout_id != snapshot.layout_id {
                    events.extend(Event::new(
                        EventKind::LayoutChange,
                        LayoutChange {
                            monitor_number: monitor.num,
                            old_symbol: old.layout_symbol.clone(),
                            old_layout_id: old.layout_id,
                            new_symbol: snapshot.layout_symbol.clone(),
                            new_layout_id: snapshot.layout_id,
                        },
                    ));
                }
            }
            current.insert(monitor.num, snapshot);
        }

        if let Some(old) = self.selected_monitor {
            if old != wm.selected_monitor {
                events.extend(Event::new(
                    EventKind::MonitorFocusChange,
                    MonitorFocusChange {
                        old_monitor_number: old,
                        new_monitor_number: wm.selected_monitor,
                    },
                ));
            }
        }
        self.selected_monitor = Some(wm.selected_monitor);

        for monitor in &wm.monitors {
            let Some(focused) = monitor.selected_client() else {
                continue;
            };

            let old_title = self
                .monitors
                .get(&monitor.num)
                .and_then(|s| s.focused_title.as_ref());
            if let Some((window, old_name)) = old_title {
                if *window == focused.window && *old_name != focused.name {
                    events.extend(Event::new(
                        EventKind::FocusedTitleChange,
                        FocusedTitleChange {
                            monitor_number: monitor.num,
                            client_window_id: focused.window,
                            old_name: old_name.clone(),
                            new_name: focused.name.clone(),
                        },
                    ));
                }
            }

            let previous = self.client_flags.insert(focused.window, focused.flags);
            if let Some(old_flags) = previous.filter(|f| *f != focused.flags) {
                events.extend(Event::new(
                    EventKind::FocusedStateChange,
                    FocusedStateChange {
                        monitor_number: monitor.num,
                        client_window_id: focused.window,
                        old_state: serializer::states(&old_flags, &wm.enabled_flags),
                        new_state: serializer::states(&focused.flags, &wm.enabled_flags),
                    },
                ));
            }
        }

        self.monitors = current;
        let live: HashSet<WindowId> = wm
            .monitors
            .iter()
            .flat_map(|m| m.clients.iter().map(|c| c.window))
            .collect();
        self.client_flags.retain(|window, _| live.contains(window));

        events
    }

    /// Detect changes and queue each event for its subscribers
    ///
    /// Returns the number of events detected.
    pub fn publish(&mut self, wm: &WmState, clients: &mut ClientRegistry) -> usize {
        let events = self.detect(wm);
        for event in &events {
            deliver(event, clients);
        }
        events.len()
    }
}

/// Encode an event once and queue it for every subscribed connection
fn deliver(event: &Event, clients: &mut ClientRegistry) {
    let frame = match serde_json::to_vec(&event.document)
        .map_err(|e| e.to_string())
        .and_then(|payload| encode(MessageType::Event, &payload).map_err(|e| e.to_string()))
    {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping {}: {}", event.kind, e);
            return;
        }
    };

    let mut delivered = 0;
    for (_, connection) in clients
        .iter_mut()
        .filter(|(_, c)| c.subscriptions.contains(event.kind))
    {
        connection.enqueue_frame(&frame);
        delivered += 1;
    }
    debug!("Queued {} for {} subscribers", event.kind, delivered);
}
