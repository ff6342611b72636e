//! Display state machine.
//!
//! `AnimationMachine` is a plain value: it never sleeps and never spawns.
//! Callers feed it events and timer firings together with the current
//! instant, and execute the returned [`Effect`]s. Every armed timer carries a
//! [`TimerToken`]; a firing whose token no longer occupies its slot is
//! ignored, so a superseded timer can never apply a transition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::events::EventName;

pub const DEBOUNCE: Duration = Duration::from_millis(300);
pub const WAKE_HOLD: Duration = Duration::from_millis(800);
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum VisualState {
    #[default]
    Idle,
    Wake,
    Sleep,
    Thinking,
    Questioning,
}

impl VisualState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualState::Idle => "idle",
            VisualState::Wake => "wake",
            VisualState::Sleep => "sleep",
            VisualState::Thinking => "thinking",
            VisualState::Questioning => "questioning",
        }
    }

    /// Persistent states hold under repeated identical events and decay to
    /// idle after a quiet period.
    pub fn is_persistent(&self) -> bool {
        matches!(self, VisualState::Thinking | VisualState::Questioning)
    }

    pub fn sprite(&self) -> Sprite {
        let (cycle_ms, looping) = match self {
            VisualState::Idle => (1600, true),
            VisualState::Wake => (800, false),
            VisualState::Sleep => (2400, true),
            VisualState::Thinking => (1200, true),
            VisualState::Questioning => (1200, true),
        };
        Sprite {
            frames: 4,
            cycle: Duration::from_millis(cycle_ms),
            looping,
        }
    }
}

impl fmt::Display for VisualState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame strip metadata for one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sprite {
    pub frames: u8,
    pub cycle: Duration,
    pub looping: bool,
}

impl Sprite {
    pub fn frame_duration(&self) -> Duration {
        self.cycle / u32::from(self.frames.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationTimings {
    pub debounce: Duration,
    pub wake_hold: Duration,
    pub inactivity: Duration,
}

impl Default for AnimationTimings {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE,
            wake_hold: WAKE_HOLD,
            inactivity: INACTIVITY_TIMEOUT,
        }
    }
}

impl AnimationTimings {
    /// Where a state moves on its own, and after how long. Only wake has one.
    pub fn auto_transition(&self, state: VisualState) -> Option<(VisualState, Duration)> {
        match state {
            VisualState::Wake => Some((VisualState::Idle, self.wake_hold)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Debounce,
    AutoTransition,
    Inactivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Swap the visual and restart its animation from frame zero.
    Show(VisualState),
    Arm {
        kind: TimerKind,
        token: TimerToken,
        after: Duration,
    },
    Disarm {
        kind: TimerKind,
        token: TimerToken,
    },
}

#[derive(Debug, Clone)]
pub struct AnimationMachine {
    timings: AnimationTimings,
    current: VisualState,
    last_change: Option<Instant>,
    pending: Option<EventName>,
    debounce: Option<TimerToken>,
    auto_transition: Option<(TimerToken, VisualState)>,
    inactivity: Option<TimerToken>,
    next_token: u64,
}

impl Default for AnimationMachine {
    fn default() -> Self {
        Self::new(AnimationTimings::default())
    }
}

impl AnimationMachine {
    pub fn new(timings: AnimationTimings) -> Self {
        Self {
            timings,
            current: VisualState::Idle,
            last_change: None,
            pending: None,
            debounce: None,
            auto_transition: None,
            inactivity: None,
            next_token: 0,
        }
    }

    pub fn current(&self) -> VisualState {
        self.current
    }

    pub fn pending(&self) -> Option<EventName> {
        self.pending
    }

    pub fn last_change(&self) -> Option<Instant> {
        self.last_change
    }

    pub fn armed(&self, kind: TimerKind) -> Option<TimerToken> {
        match kind {
            TimerKind::Debounce => self.debounce,
            TimerKind::AutoTransition => self.auto_transition.map(|(token, _)| token),
            TimerKind::Inactivity => self.inactivity,
        }
    }

    pub fn set_state(&mut self, event: EventName, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        let elapsed = self
            .last_change
            .map(|changed| now.saturating_duration_since(changed));

        if let Some(elapsed) = elapsed.filter(|elapsed| *elapsed < self.timings.debounce) {
            self.pending = Some(event);
            if self.debounce.is_none() {
                let token = self.issue_token();
                self.debounce = Some(token);
                effects.push(Effect::Arm {
                    kind: TimerKind::Debounce,
                    token,
                    after: self.timings.debounce - elapsed,
                });
            }
            return effects;
        }

        self.pending = None;
        if let Some(token) = self.debounce.take() {
            effects.push(Effect::Disarm {
                kind: TimerKind::Debounce,
                token,
            });
        }
        self.apply_state(event.visual_state(), now, &mut effects);
        effects
    }

    pub fn on_timer(&mut self, kind: TimerKind, token: TimerToken, now: Instant) -> Vec<Effect> {
        let mut effects = Vec::new();
        match kind {
            TimerKind::Debounce => {
                if self.debounce != Some(token) {
                    return effects;
                }
                self.debounce = None;
                if let Some(event) = self.pending.take() {
                    self.apply_state(event.visual_state(), now, &mut effects);
                }
            }
            TimerKind::AutoTransition => {
                let Some((armed, target)) = self.auto_transition else {
                    return effects;
                };
                if armed != token {
                    return effects;
                }
                self.auto_transition = None;
                self.apply_state(Some(target), now, &mut effects);
            }
            TimerKind::Inactivity => {
                if self.inactivity != Some(token) {
                    return effects;
                }
                self.inactivity = None;
                self.apply_state(Some(VisualState::Idle), now, &mut effects);
            }
        }
        effects
    }

    fn apply_state(&mut self, state: Option<VisualState>, now: Instant, effects: &mut Vec<Effect>) {
        let Some(state) = state else {
            return;
        };

        if state == self.current {
            if state.is_persistent() {
                self.disarm_inactivity(effects);
                self.arm_inactivity(effects);
            }
            return;
        }

        if let Some((token, _)) = self.auto_transition.take() {
            effects.push(Effect::Disarm {
                kind: TimerKind::AutoTransition,
                token,
            });
        }
        self.disarm_inactivity(effects);

        effects.push(Effect::Show(state));
        self.current = state;
        self.last_change = Some(now);

        if let Some((target, after)) = self.timings.auto_transition(state) {
            let token = self.issue_token();
            self.auto_transition = Some((token, target));
            effects.push(Effect::Arm {
                kind: TimerKind::AutoTransition,
                token,
                after,
            });
        }
        if state.is_persistent() {
            self.arm_inactivity(effects);
        }
    }

    fn arm_inactivity(&mut self, effects: &mut Vec<Effect>) {
        let token = self.issue_token();
        self.inactivity = Some(token);
        effects.push(Effect::Arm {
            kind: TimerKind::Inactivity,
            token,
            after: self.timings.inactivity,
        });
    }

    fn disarm_inactivity(&mut self, effects: &mut Vec<Effect>) {
        if let Some(token) = self.inactivity.take() {
            effects.push(Effect::Disarm {
                kind: TimerKind::Inactivity,
                token,
            });
        }
    }

    fn issue_token(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }
}
