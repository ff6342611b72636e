use crate::events::EventName;

/// Receiver of validated events, normally the agent's animator.
///
/// `send` is fire-and-forget: `false` means the event was dropped, never
/// that the caller should retry.
pub trait DisplaySink: Send + Sync {
    fn send(&self, event: EventName) -> bool;
    fn is_alive(&self) -> bool;
}
