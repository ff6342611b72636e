use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::animation::VisualState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventName {
    Idle,
    Wake,
    Sleep,
    Thinking,
    Typing,
    Success,
    Error,
    Questioning,
}

impl EventName {
    /// The accepted vocabulary, in wire order.
    pub const ALL: [EventName; 8] = [
        EventName::Idle,
        EventName::Wake,
        EventName::Sleep,
        EventName::Thinking,
        EventName::Typing,
        EventName::Success,
        EventName::Error,
        EventName::Questioning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Idle => "idle",
            EventName::Wake => "wake",
            EventName::Sleep => "sleep",
            EventName::Thinking => "thinking",
            EventName::Typing => "typing",
            EventName::Success => "success",
            EventName::Error => "error",
            EventName::Questioning => "questioning",
        }
    }

    /// The renderable state this event maps to. `typing`, `success` and
    /// `error` are accepted on the wire but have no sprite.
    pub fn visual_state(&self) -> Option<VisualState> {
        match self {
            EventName::Idle => Some(VisualState::Idle),
            EventName::Wake => Some(VisualState::Wake),
            EventName::Sleep => Some(VisualState::Sleep),
            EventName::Thinking => Some(VisualState::Thinking),
            EventName::Questioning => Some(VisualState::Questioning),
            EventName::Typing | EventName::Success | EventName::Error => None,
        }
    }

    pub fn valid_names() -> Vec<String> {
        Self::ALL.iter().map(|name| name.as_str().to_string()).collect()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Exact match only: the bus rejects anything that is not a vocabulary entry
// verbatim, so no case folding or trimming here.
impl FromStr for EventName {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == input)
            .ok_or_else(|| format!("Unknown event: {input}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub name: EventName,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn now(name: EventName) -> Self {
        Self {
            name,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRequest {
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventReceived {
    pub received: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusBody {
    pub status: String,
}

impl StatusBody {
    pub const OK: &'static str = "ok";
    pub const SHUTTING_DOWN: &'static str = "shutting-down";

    pub fn ok() -> Self {
        Self {
            status: Self::OK.to_string(),
        }
    }

    pub fn shutting_down() -> Self {
        Self {
            status: Self::SHUTTING_DOWN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<Vec<String>>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            valid: None,
        }
    }

    pub fn invalid_event() -> Self {
        Self {
            error: "Invalid event".to_string(),
            valid: Some(EventName::valid_names()),
        }
    }

    pub fn not_found() -> Self {
        Self::new("Not found")
    }

    pub fn internal() -> Self {
        Self::new("Internal server error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_vocabulary_only() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>(), Ok(name));
        }
        assert!("Thinking".parse::<EventName>().is_err());
        assert!(" wake".parse::<EventName>().is_err());
        assert!("bogus".parse::<EventName>().is_err());
    }

    #[test]
    fn invalid_event_body_lists_vocabulary_in_order() {
        let body = serde_json::to_value(ErrorBody::invalid_event()).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "error": "Invalid event",
                "valid": ["idle", "wake", "sleep", "thinking", "typing", "success", "error", "questioning"]
            })
        );
    }

    #[test]
    fn plain_error_body_omits_valid() {
        let body = serde_json::to_string(&ErrorBody::not_found()).expect("serialize");
        assert_eq!(body, r#"{"error":"Not found"}"#);
    }

    #[test]
    fn activity_only_events_have_no_visual_state() {
        assert_eq!(EventName::Typing.visual_state(), None);
        assert_eq!(EventName::Success.visual_state(), None);
        assert_eq!(EventName::Error.visual_state(), None);
        assert_eq!(EventName::Wake.visual_state(), Some(VisualState::Wake));
    }
}
