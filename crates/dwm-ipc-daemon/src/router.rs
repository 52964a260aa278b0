//! Request routing and reply construction
//!
//! Every decoded message produces exactly one reply, tagged with the
//! request's message type. Failures that are the client's fault become
//! `{"result":"error","reason":...}` replies; the connection stays open.

use std::os::fd::RawFd;

use dwm_ipc_proto::{EventKind, EventMask, Message, MessageType, SubscribeAction};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::command::CommandRegistry;
use crate::serializer;
use crate::wm::{WindowId, WmState};

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub msg_type: MessageType,
    pub payload: String,
    /// A `RunCommand` was handled, so state may have changed
    pub ran_command: bool,
}

pub fn success() -> String {
    json!({"result": "success"}).to_string()
}

pub fn error(reason: impl Into<String>) -> String {
    json!({"result": "error", "reason": reason.into()}).to_string()
}

fn document<T: Serialize>(doc: &T) -> String {
    serde_json::to_string(doc).unwrap_or_else(|e| error(format!("Failed to serialize reply: {e}")))
}

/// Handle one message from the connection identified by `fd`
pub fn route(
    fd: RawFd,
    message: &Message,
    subscriptions: &mut EventMask,
    commands: &CommandRegistry,
    wm: &mut WmState,
) -> Reply {
    let msg_type = message.msg_type;
    debug!("IPC client {} sent {} ({} bytes)", fd, msg_type, message.payload.len());

    let result = match message.payload_str() {
        Err(e) => Err(format!("Payload is not valid UTF-8: {e}")),
        Ok(payload) => match msg_type {
            MessageType::RunCommand => commands
                .dispatch(payload, wm)
                .map(|()| success())
                .map_err(|e| e.to_string()),
            MessageType::Subscribe => subscribe(payload, subscriptions),
            MessageType::GetMonitors => Ok(document(&serializer::monitors(wm))),
            MessageType::GetTags => Ok(document(&wm.tags)),
            MessageType::GetLayouts => Ok(document(&serializer::layouts(wm))),
            MessageType::GetDwmClient => get_client(payload, wm),
            MessageType::FindDwmClient => find_client(payload, wm),
            MessageType::Event => Err("Event messages are sent by the server only".to_string()),
        },
    };

    let payload = result.unwrap_or_else(|reason| {
        warn!("IPC client {} {} failed: {}", fd, msg_type, reason);
        error(reason)
    });

    Reply {
        msg_type,
        payload,
        ran_command: msg_type == MessageType::RunCommand,
    }
}

/// Optional JSON object payload; empty means "no fields"
fn parse_object(payload: &str) -> Result<Value, String> {
    if payload.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str(payload) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("Payload must be an object".to_string()),
        Err(e) => Err(format!("Failed to parse payload: {e}")),
    }
}

fn string_field<'a>(value: &'a Value, field: &str) -> Result<Option<&'a str>, String> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(format!("Field {field} must be a string")),
    }
}

fn subscribe(payload: &str, subscriptions: &mut EventMask) -> Result<String, String> {
    let value = parse_object(payload)?;
    let event = string_field(&value, "event")?.ok_or("Missing event name")?;
    let action = string_field(&value, "action")?.ok_or("Missing action")?;

    let kind = EventKind::from_name(event).ok_or_else(|| format!("Invalid event name {event}"))?;
    match SubscribeAction::from_name(action) {
        Some(SubscribeAction::Subscribe) => subscriptions.subscribe(kind),
        Some(SubscribeAction::Unsubscribe) => subscriptions.unsubscribe(kind),
        None => return Err(format!("Invalid action {action}")),
    }
    Ok(success())
}

fn get_client(payload: &str, wm: &WmState) -> Result<String, String> {
    let value = parse_object(payload)?;
    let window: Option<WindowId> = match value.get("client_window_id") {
        None | Some(Value::Null) => None,
        Some(id) => Some(
            id.as_u64()
                .ok_or("Field client_window_id must be an unsigned integer")?,
        ),
    };

    let client = match window {
        Some(window) => wm
            .client(window)
            .ok_or_else(|| format!("Client with window id {window} not found"))?,
        None => wm.focused_client().ok_or("No client is focused")?,
    };
    Ok(document(&serializer::client(client, &wm.enabled_flags)))
}

fn find_client(payload: &str, wm: &WmState) -> Result<String, String> {
    let value = parse_object(payload)?;
    let client = match string_field(&value, "client_name")? {
        Some(name) => wm
            .find_client_by_name(name)
            .ok_or_else(|| format!("Client with name {name} not found"))?,
        None => wm.focused_client().ok_or("No client is focused")?,
    };
    Ok(document(&serializer::client(client, &wm.enabled_flags)))
}
