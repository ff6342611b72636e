//! Runs the display state machine on a single task.
//!
//! Incoming events and timer firings share one channel, so the machine only
//! ever sees one input at a time.

use pet_core::{
    AnimationMachine, AnimationTimings, DisplaySink, Effect, Event, EventName, TimerKind, TimerToken,
    VisualState,
};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

const INPUT_QUEUE: usize = 64;

/// Performs the actual visual swap.
pub trait Renderer: Send + 'static {
    fn show(&mut self, state: VisualState);
}

#[derive(Debug)]
enum Input {
    Event(Event),
    Fired { kind: TimerKind, token: TimerToken },
}

#[derive(Debug, Clone)]
pub struct AnimatorHandle {
    tx: mpsc::Sender<Input>,
}

impl DisplaySink for AnimatorHandle {
    fn send(&self, event: EventName) -> bool {
        self.tx.try_send(Input::Event(Event::now(event))).is_ok()
    }

    fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

pub fn spawn_animator<R: Renderer>(renderer: R, timings: AnimationTimings) -> (AnimatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(INPUT_QUEUE);
    let timer_tx = tx.downgrade();
    let task = tokio::spawn(run(AnimationMachine::new(timings), renderer, rx, timer_tx));
    (AnimatorHandle { tx }, task)
}

async fn run<R: Renderer>(
    mut machine: AnimationMachine,
    mut renderer: R,
    mut rx: mpsc::Receiver<Input>,
    timer_tx: mpsc::WeakSender<Input>,
) {
    let mut timers: HashMap<TimerKind, (TimerToken, AbortHandle)> = HashMap::new();

    while let Some(input) = rx.recv().await {
        let now = tokio::time::Instant::now().into_std();
        let effects = match input {
            Input::Event(event) => {
                debug!(event = "animator_input", name = %event.name, at = %event.timestamp.to_rfc3339());
                machine.set_state(event.name, now)
            }
            Input::Fired { kind, token } => {
                if timers.get(&kind).is_some_and(|(armed, _)| *armed == token) {
                    timers.remove(&kind);
                }
                machine.on_timer(kind, token, now)
            }
        };

        for effect in effects {
            match effect {
                Effect::Show(state) => {
                    info!(event = "display_state", state = %state);
                    renderer.show(state);
                }
                Effect::Arm { kind, token, after } => {
                    if let Some((_, previous)) = timers.remove(&kind) {
                        previous.abort();
                    }
                    let tx = timer_tx.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        if let Some(tx) = tx.upgrade() {
                            let _ = tx.send(Input::Fired { kind, token }).await;
                        }
                    });
                    timers.insert(kind, (token, handle.abort_handle()));
                }
                Effect::Disarm { kind, token } => {
                    if timers.get(&kind).is_some_and(|(armed, _)| *armed == token) {
                        if let Some((_, handle)) = timers.remove(&kind) {
                            handle.abort();
                        }
                    }
                }
            }
        }
    }

    for (_, (_, handle)) in timers {
        handle.abort();
    }
    debug!(event = "animator_stopped", last_state = %machine.current());
}
