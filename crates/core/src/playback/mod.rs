use crate::{
    render::{CanvasHandle, Layer},
    Behavior, BehaviorCore, FrameTime, PlaybackConfig, Result,
};

/// Follows a song's position and tempo while the tab scrolls past.
///
/// The cursor starts paused. Pausing puts it in stasis: the manager keeps
/// drawing it but stops calling `update`, so song time only advances while
/// playing.
#[derive(Debug)]
pub struct TrackCursor {
    core: BehaviorCore,
    canvas: CanvasHandle,
    song_time: f32,
    bpm: f32,
    bpm_step: f32,
    seek_step: f32,
    /// Beats scrolled past the cursor line as of the last update.
    scroll_beats: f32,
}

impl TrackCursor {
    pub fn new(config: &PlaybackConfig, canvas: CanvasHandle) -> Self {
        let mut core = BehaviorCore::new("TrackCursor");
        core.lifecycle.stasis = true;
        Self {
            core,
            canvas,
            song_time: 0.0,
            bpm: config.bpm,
            bpm_step: config.bpm_step,
            seek_step: config.seek_seconds,
            scroll_beats: 0.0,
        }
    }

    pub fn song_time(&self) -> f32 {
        self.song_time
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn beats(&self) -> f32 {
        self.song_time * self.bpm / 60.0
    }

    pub fn scroll_beats(&self) -> f32 {
        self.scroll_beats
    }

    pub fn is_playing(&self) -> bool {
        !self.in_stasis()
    }

    pub fn set_playing(&mut self, playing: bool) {
        if playing != self.is_playing() {
            tracing::debug!(playing, song_time = self.song_time, "track cursor toggled");
        }
        self.set_stasis(!playing);
    }

    pub fn play(&mut self) {
        self.set_playing(true);
    }

    pub fn pause(&mut self) {
        self.set_playing(false);
    }

    pub fn toggle(&mut self) {
        self.set_playing(!self.is_playing());
    }

    /// Moves the song position, never before the start.
    pub fn seek(&mut self, delta_seconds: f32) {
        self.song_time = (self.song_time + delta_seconds).max(0.0);
    }

    /// Seeks by whole configured seek steps; negative steps rewind.
    pub fn seek_steps(&mut self, steps: i32) {
        self.seek(self.seek_step * steps as f32);
    }

    /// Nudges the tempo by whole BPM steps. The tempo never drops below one
    /// step.
    pub fn adjust_bpm(&mut self, steps: i32) {
        self.bpm = (self.bpm + self.bpm_step * steps as f32).max(self.bpm_step);
    }
}

impl Behavior for TrackCursor {
    fn core(&self) -> &BehaviorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BehaviorCore {
        &mut self.core
    }

    fn update(&mut self, time: &FrameTime) -> Result<()> {
        self.scroll_beats = self.beats();
        self.song_time += time.delta_seconds;
        Ok(())
    }

    fn draw(&mut self, _time: &FrameTime) -> Result<()> {
        let text = format!("beat {:.2}", self.scroll_beats);
        self.canvas
            .borrow_mut()
            .draw_text(Layer::World, self.core.name(), text)
    }

    fn draw_gui(&mut self, _time: &FrameTime) -> Result<()> {
        let text = format!("Time: {:.2}  BPM: {:.1}", self.song_time, self.bpm);
        self.canvas
            .borrow_mut()
            .draw_text(Layer::Gui, self.core.name(), text)
    }
}
