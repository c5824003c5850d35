use serde::{Deserialize, Serialize};

/// Timing snapshot handed to every per-frame hook. Behaviors treat it as
/// read-only; the host produces a fresh one each frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTime {
    /// Seconds since the clock was started or last reset.
    pub total_seconds: f32,
    /// Seconds elapsed since the previous frame.
    pub delta_seconds: f32,
    /// Zero-based frame counter.
    pub frame: u64,
}

impl FrameTime {
    pub fn new(total_seconds: f32, delta_seconds: f32, frame: u64) -> Self {
        Self {
            total_seconds,
            delta_seconds,
            frame,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PlaybackClock {
    pub time_seconds: f32,
    frames: u64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.time_seconds = 0.0;
        self.frames = 0;
    }

    pub fn advance(&mut self, delta: f32) {
        self.time_seconds = (self.time_seconds + delta).max(0.0);
    }

    /// Advances the clock by `delta` seconds and returns the frame snapshot
    /// for the frame that just started.
    pub fn tick(&mut self, delta: f32) -> FrameTime {
        let delta = delta.max(0.0);
        self.advance(delta);
        let time = FrameTime::new(self.time_seconds, delta, self.frames);
        self.frames += 1;
        time
    }

    /// Number of frames produced since the last reset.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
