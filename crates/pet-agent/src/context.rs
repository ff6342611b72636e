use pet_core::{DisplaySink, EventName};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Delay between answering `/shutdown` and stopping the server.
pub const SHUTDOWN_FLUSH_DELAY: Duration = Duration::from_millis(100);

/// Process-wide state of the running agent, shared with every request.
pub struct AgentContext {
    sink: RwLock<Option<Arc<dyn DisplaySink>>>,
    shutdown: watch::Sender<bool>,
    shutdown_delay: Duration,
}

impl AgentContext {
    pub fn new(shutdown: watch::Sender<bool>) -> Self {
        Self {
            sink: RwLock::new(None),
            shutdown,
            shutdown_delay: SHUTDOWN_FLUSH_DELAY,
        }
    }

    #[cfg(test)]
    pub fn with_shutdown_delay(mut self, shutdown_delay: Duration) -> Self {
        self.shutdown_delay = shutdown_delay;
        self
    }

    pub fn attach_sink(&self, sink: Arc<dyn DisplaySink>) {
        if let Ok(mut slot) = self.sink.write() {
            *slot = Some(sink);
        }
    }

    pub fn detach_sink(&self) -> Option<Arc<dyn DisplaySink>> {
        self.sink.write().ok().and_then(|mut slot| slot.take())
    }

    /// Best-effort delivery; an absent or dead sink drops the event.
    pub fn forward(&self, event: EventName) -> bool {
        let sink = self.sink.read().ok().and_then(|slot| slot.clone());
        match sink {
            Some(sink) if sink.is_alive() => sink.send(event),
            Some(_) => {
                debug!(event = "sink_dead", name = %event);
                false
            }
            None => {
                debug!(event = "sink_absent", name = %event);
                false
            }
        }
    }

    /// Stops the server once the current response has had time to flush.
    pub fn request_shutdown(&self) {
        let shutdown = self.shutdown.clone();
        let delay = self.shutdown_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shutdown.send_replace(true);
        });
    }
}
