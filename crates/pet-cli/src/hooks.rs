//! Producer hooks. Each one reads the host's JSON payload from stdin, emits
//! at most a couple of events and never fails the host.

use clap::ValueEnum;
use pet_core::EventName;
use pet_supervisor::Supervisor;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Time the sleep animation gets before the agent is stopped.
pub const SESSION_END_GRACE: Duration = Duration::from_millis(1500);

const TYPING_TOOLS: [&str; 3] = ["Write", "Edit", "MultiEdit"];
const ERROR_MARKERS: [&str; 3] = ["Error", "ENOENT", "failed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookKind {
    SessionStart,
    PromptSubmit,
    PreToolUse,
    PostToolUse,
    SessionEnd,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolPayload {
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_error: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub tool_result: Option<Value>,
}

/// Unparseable input is treated as an empty payload.
pub fn parse_payload(input: &str) -> ToolPayload {
    serde_json::from_str(input).unwrap_or_default()
}

pub fn pre_tool_event(payload: &ToolPayload) -> EventName {
    match payload.tool_name.as_deref() {
        Some(name) if TYPING_TOOLS.contains(&name) => EventName::Typing,
        _ => EventName::Thinking,
    }
}

pub fn post_tool_event(payload: &ToolPayload) -> EventName {
    let flagged = [&payload.tool_error, &payload.error]
        .into_iter()
        .flatten()
        .any(truthy);
    let result_text = match &payload.tool_result {
        None => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) if !truthy(other) => String::new(),
        Some(other) => other.to_string(),
    };
    if flagged || ERROR_MARKERS.iter().any(|marker| result_text.contains(marker)) {
        EventName::Error
    } else {
        EventName::Success
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub async fn run_hook(kind: HookKind, supervisor: &Supervisor, root: &Path, input: &str) {
    debug!(event = "hook_start", kind = ?kind);
    match kind {
        HookKind::SessionStart => {
            let readiness = supervisor.ensure_ready(root);
            if !readiness.ready {
                info!(event = "agent_not_ready", reason = ?readiness.reason);
                return;
            }
            if !supervisor.ensure_running(root).await {
                debug!(event = "agent_unavailable");
            }
            supervisor.send_event(EventName::Wake).await;
        }
        HookKind::PromptSubmit => {
            supervisor.send_event(EventName::Thinking).await;
        }
        HookKind::PreToolUse => {
            supervisor
                .send_event(pre_tool_event(&parse_payload(input)))
                .await;
        }
        HookKind::PostToolUse => {
            supervisor
                .send_event(post_tool_event(&parse_payload(input)))
                .await;
        }
        HookKind::SessionEnd => {
            supervisor.send_event(EventName::Sleep).await;
            tokio::time::sleep(SESSION_END_GRACE).await;
            let graceful = supervisor.stop().await;
            debug!(event = "agent_stopped", graceful);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn editing_tools_map_to_typing() {
        for tool in ["Write", "Edit", "MultiEdit"] {
            let payload = parse_payload(&format!(r#"{{"tool_name":"{tool}"}}"#));
            assert_eq!(pre_tool_event(&payload), EventName::Typing, "{tool}");
        }
        assert_eq!(
            pre_tool_event(&parse_payload(r#"{"tool_name":"Bash"}"#)),
            EventName::Thinking
        );
        assert_eq!(pre_tool_event(&parse_payload("not json")), EventName::Thinking);
    }

    #[test]
    fn error_flags_map_to_error() {
        assert_eq!(
            post_tool_event(&parse_payload(r#"{"tool_error":"boom"}"#)),
            EventName::Error
        );
        assert_eq!(
            post_tool_event(&parse_payload(r#"{"error":true}"#)),
            EventName::Error
        );
        assert_eq!(
            post_tool_event(&parse_payload(r#"{"tool_error":false,"error":"","tool_result":"ok"}"#)),
            EventName::Success
        );
    }

    #[test]
    fn result_text_markers_map_to_error() {
        assert_eq!(
            post_tool_event(&parse_payload(r#"{"tool_result":"ENOENT: no such file"}"#)),
            EventName::Error
        );
        assert_eq!(
            post_tool_event(&parse_payload(r#"{"tool_result":{"stderr":"build failed"}}"#)),
            EventName::Error
        );
        assert_eq!(
            post_tool_event(&parse_payload(r#"{"tool_result":"error in lowercase"}"#)),
            EventName::Success
        );
    }

    #[test]
    fn unparseable_post_payload_is_success() {
        assert_eq!(post_tool_event(&parse_payload("")), EventName::Success);
    }
}
