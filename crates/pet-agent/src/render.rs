use pet_core::VisualState;
use tracing::info;

use crate::animator::Renderer;

/// Headless renderer: records each swap in the log with the sprite it would
/// play from frame zero.
#[derive(Debug, Default)]
pub struct LogRenderer {
    swaps: u64,
}

impl Renderer for LogRenderer {
    fn show(&mut self, state: VisualState) {
        self.swaps += 1;
        let sprite = state.sprite();
        info!(
            event = "render",
            state = %state,
            frame = 0,
            frames = sprite.frames,
            frame_ms = sprite.frame_duration().as_millis() as u64,
            looping = sprite.looping,
            swaps = self.swaps
        );
    }
}
