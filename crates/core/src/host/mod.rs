//! Fixed-step frame driver.
//!
//! [`FrameHost`] stands in for the game loop: it owns the root manager, the
//! clock and the canvas, and runs the passes of one frame in a fixed order.
//!
//! ```text
//! update -> late_update -> [ begin_frame -> draw -> draw_gui -> end_frame ] -> end_draw
//! ```

use crate::{
    render::{CanvasHandle, FrameCanvas},
    BehaviorManager, FrameConfig, FrameTime, PlaybackClock, PriorityGroup, Result,
};

pub struct FrameHost {
    behaviors: BehaviorManager,
    clock: PlaybackClock,
    canvas: CanvasHandle,
    frame_delta: f32,
}

impl FrameHost {
    pub fn new(config: &FrameConfig) -> Self {
        Self {
            behaviors: BehaviorManager::new(),
            clock: PlaybackClock::new(),
            canvas: FrameCanvas::shared(),
            frame_delta: config.frame_duration().as_secs_f32(),
        }
    }

    /// Root manager; register behaviors here.
    pub fn behaviors(&mut self) -> &mut BehaviorManager {
        &mut self.behaviors
    }

    /// Handle to pass into behaviors that draw.
    pub fn canvas(&self) -> CanvasHandle {
        self.canvas.clone()
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn frame_delta(&self) -> f32 {
        self.frame_delta
    }

    pub fn load_content(&mut self) {
        self.behaviors.load_content();
    }

    /// Runs every pass of one frame. Hook faults are isolated by the manager;
    /// only canvas misuse surfaces here.
    pub fn run_frame(&mut self, delta: f32) -> Result<FrameTime> {
        let time = self.clock.tick(delta);

        self.behaviors.update(&time);
        self.behaviors.late_update(&time);

        self.canvas.borrow_mut().begin_frame()?;
        self.behaviors.draw(&time);
        self.behaviors.draw_gui(&time);
        let drawn = self.canvas.borrow_mut().end_frame()?.len();
        tracing::trace!(frame = time.frame, drawn, "frame presented");

        self.behaviors.end_draw();
        Ok(time)
    }

    /// Runs `frames` frames at the configured rate.
    pub fn run(&mut self, frames: u64) -> Result<()> {
        tracing::info!(
            frames,
            behaviors = self.behaviors.len(),
            frame_delta = self.frame_delta,
            "frame loop starting"
        );
        for _ in 0..frames {
            self.run_frame(self.frame_delta)?;
        }
        tracing::info!(
            frames = self.clock.frames(),
            seconds = self.clock.time_seconds,
            "frame loop stopped"
        );
        Ok(())
    }

    /// Unloads and drops every registered behavior.
    pub fn shutdown(&mut self) {
        tracing::info!(behaviors = self.behaviors.len(), "shutting down");
        self.behaviors.clear();
    }

    pub fn export(&self) -> Vec<PriorityGroup> {
        self.behaviors.export_view()
    }
}
