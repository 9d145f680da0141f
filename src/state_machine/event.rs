//! Events that can occur in a recruitment conversation

use super::state::{RecruitState, Track};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const ERROR_SUFFIX: &str = "_ERROR";

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub enum Event {
    Start,
    TrackSelected { track: Track },
    IdentitySubmitted { name: String, id: String },
    PrerequisitesConfirmed,
    RouteSelected { route: String },
    TermAgreed,
    Verified,
    OperatorNotified,
    /// The entry effect of `state` failed (`<state>_ERROR` on the wire)
    ActionFailed { state: RecruitState },
    /// Clears the suppression flag without changing state or notifying
    ClearSuppression,
}

impl Event {
    /// Wire name of the event
    pub fn name(&self) -> String {
        match self {
            Event::Start => "START".to_string(),
            Event::TrackSelected { .. } => "TRACK_SELECTED".to_string(),
            Event::IdentitySubmitted { .. } => "IDENTITY_SUBMITTED".to_string(),
            Event::PrerequisitesConfirmed => "PREREQUISITES_CONFIRMED".to_string(),
            Event::RouteSelected { .. } => "ROUTE_SELECTED".to_string(),
            Event::TermAgreed => "TERM_AGREED".to_string(),
            Event::Verified => "VERIFIED".to_string(),
            Event::OperatorNotified => "OPERATOR_NOTIFIED".to_string(),
            Event::ActionFailed { state } => format!("{state}{ERROR_SUFFIX}"),
            Event::ClearSuppression => "CLEAR_SUPPRESSION".to_string(),
        }
    }

    pub fn failed(state: RecruitState) -> Self {
        Event::ActionFailed { state }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::ActionFailed { .. })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("unknown event type: {0}")]
    UnknownType(String),
    #[error("event {event} is missing field `{field}`")]
    MissingField { event: String, field: &'static str },
}

/// Flat JSON shape: `{"type": "TRACK_SELECTED", "track": "long"}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    track: Option<Track>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    route: Option<String>,
}

impl WireEvent {
    fn require<T>(
        value: Option<T>,
        event: &str,
        field: &'static str,
    ) -> Result<T, EventParseError> {
        value.ok_or_else(|| EventParseError::MissingField {
            event: event.to_string(),
            field,
        })
    }
}

impl TryFrom<WireEvent> for Event {
    type Error = EventParseError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let kind = wire.kind.as_str();
        let event = match kind {
            "START" => Event::Start,
            "TRACK_SELECTED" => Event::TrackSelected {
                track: WireEvent::require(wire.track, kind, "track")?,
            },
            "IDENTITY_SUBMITTED" => Event::IdentitySubmitted {
                name: WireEvent::require(wire.name, kind, "name")?,
                id: WireEvent::require(wire.id, kind, "id")?,
            },
            "PREREQUISITES_CONFIRMED" => Event::PrerequisitesConfirmed,
            "ROUTE_SELECTED" => Event::RouteSelected {
                route: WireEvent::require(wire.route, kind, "route")?,
            },
            "TERM_AGREED" => Event::TermAgreed,
            "VERIFIED" => Event::Verified,
            "OPERATOR_NOTIFIED" => Event::OperatorNotified,
            "CLEAR_SUPPRESSION" => Event::ClearSuppression,
            other => {
                let state = other
                    .strip_suffix(ERROR_SUFFIX)
                    .and_then(|name| name.parse::<RecruitState>().ok())
                    .ok_or_else(|| EventParseError::UnknownType(other.to_string()))?;
                Event::ActionFailed { state }
            }
        };
        Ok(event)
    }
}

impl From<Event> for WireEvent {
    fn from(event: Event) -> Self {
        let kind = event.name();
        match event {
            Event::TrackSelected { track } => WireEvent {
                kind,
                track: Some(track),
                ..WireEvent::default()
            },
            Event::IdentitySubmitted { name, id } => WireEvent {
                kind,
                name: Some(name),
                id: Some(id),
                ..WireEvent::default()
            },
            Event::RouteSelected { route } => WireEvent {
                kind,
                route: Some(route),
                ..WireEvent::default()
            },
            _ => WireEvent {
                kind,
                ..WireEvent::default()
            },
        }
    }
}
