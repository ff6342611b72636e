pub mod animation;
pub mod events;
pub mod logging;
pub mod paths;
pub mod pid_record;
pub mod settings;
pub mod sink;

pub use animation::{AnimationMachine, AnimationTimings, Effect, Sprite, TimerKind, TimerToken, VisualState};
pub use events::{ErrorBody, Event, EventName, EventReceived, EventRequest, StatusBody};
pub use paths::StatePaths;
pub use pid_record::{AgentProcess, PidRecordError};
pub use sink::DisplaySink;
