//! Webhook payload normalization.
//!
//! Productboard delivers component notifications in two shapes: the current
//! schema names the event in `data.eventType`, older subscriptions only carry
//! `data.type = "component"`. Both resolve to a [`NormalizedEvent`]. Payloads
//! are not trusted; anything unexpected becomes [`NormalizedEvent::Unrecognized`].

use serde_json::Value;

use crate::constants::{COMPONENT_CREATED, COMPONENT_UPDATED, LEGACY_COMPONENT_TYPE};

/// Which notification produced a recognized event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentEventKind {
    Created,
    Updated,
    /// Unversioned `data.type = "component"` payload.
    Legacy,
}

impl ComponentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentEventKind::Created => COMPONENT_CREATED,
            ComponentEventKind::Updated => COMPONENT_UPDATED,
            ComponentEventKind::Legacy => LEGACY_COMPONENT_TYPE,
        }
    }
}

/// Result of inspecting an inbound webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    Recognized {
        kind: ComponentEventKind,
        component_id: String,
    },
    Unrecognized {
        reason: String,
    },
}

impl NormalizedEvent {
    fn unrecognized(reason: impl Into<String>) -> Self {
        NormalizedEvent::Unrecognized {
            reason: reason.into(),
        }
    }

    pub fn component_id(&self) -> Option<&str> {
        match self {
            NormalizedEvent::Recognized { component_id, .. } => Some(component_id),
            NormalizedEvent::Unrecognized { .. } => None,
        }
    }
}

/// Classify a raw webhook body.
///
/// When `data.eventType` is present it decides alone; `data.type` is only
/// consulted for payloads without an event type.
pub fn normalize(payload: &Value) -> NormalizedEvent {
    let Some(data) = payload.get("data").and_then(Value::as_object) else {
        return NormalizedEvent::unrecognized("missing data object");
    };

    let kind = match data.get("eventType") {
        Some(Value::String(event_type)) => match event_type.as_str() {
            COMPONENT_CREATED => ComponentEventKind::Created,
            COMPONENT_UPDATED => ComponentEventKind::Updated,
            other => return NormalizedEvent::unrecognized(format!("event type {other}")),
        },
        Some(_) => return NormalizedEvent::unrecognized("eventType is not a string"),
        None => match data.get("type").and_then(Value::as_str) {
            Some(LEGACY_COMPONENT_TYPE) => ComponentEventKind::Legacy,
            Some(other) => return NormalizedEvent::unrecognized(format!("data type {other}")),
            None => return NormalizedEvent::unrecognized("missing event type"),
        },
    };

    match data.get("id").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => NormalizedEvent::Recognized {
            kind,
            component_id: id.to_string(),
        },
        _ => NormalizedEvent::unrecognized("missing component id"),
    }
}

/// Parse and classify raw body bytes. Invalid JSON is unrecognized, not an error.
pub fn normalize_bytes(body: &[u8]) -> NormalizedEvent {
    match serde_json::from_slice::<Value>(body) {
        Ok(payload) => normalize(&payload),
        Err(e) => NormalizedEvent::unrecognized(format!("invalid JSON: {e}")),
    }
}
