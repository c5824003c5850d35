use std::{collections::VecDeque, f32::consts::TAU, fmt};

use crate::{
    analysis::{compute_rms, Note, NoteDetector},
    render::{CanvasHandle, Layer},
    AudioConfig, Behavior, BehaviorCore, FrameTime, Result, TabVizError,
};

/// Anything that can hand the input monitor a block of mono samples.
pub trait SampleSource {
    fn sample_rate(&self) -> u32;

    /// Fills `buffer` and returns how many samples were written. Fewer than
    /// `buffer.len()` means the source ran dry for now.
    fn fill(&mut self, buffer: &mut [f32]) -> Result<usize>;
}

/// Sine generator standing in for a capture device.
#[derive(Debug, Clone)]
pub struct ToneSource {
    sample_rate: u32,
    frequency: f32,
    amplitude: f32,
    phase: f32,
}

impl ToneSource {
    pub fn new(sample_rate: u32, frequency: f32, amplitude: f32) -> Self {
        Self {
            sample_rate,
            frequency,
            amplitude,
            phase: 0.0,
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
    }
}

impl SampleSource for ToneSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn fill(&mut self, buffer: &mut [f32]) -> Result<usize> {
        let step = TAU * self.frequency / self.sample_rate as f32;
        for sample in buffer.iter_mut() {
            *sample = self.phase.sin() * self.amplitude;
            self.phase = (self.phase + step) % TAU;
        }
        Ok(buffer.len())
    }
}

#[derive(Debug, Clone)]
pub struct SilenceSource {
    sample_rate: u32,
}

impl SilenceSource {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl SampleSource for SilenceSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn fill(&mut self, buffer: &mut [f32]) -> Result<usize> {
        buffer.fill(0.0);
        Ok(buffer.len())
    }
}

const NOTE_HISTORY: usize = 16;

/// Pulls one block of input per update, tracks its level and runs pitch
/// detection over a rolling window. Draws the level on the world layer and
/// the detected notes on the GUI layer.
pub struct InputMonitor {
    core: BehaviorCore,
    source: Box<dyn SampleSource>,
    canvas: CanvasHandle,
    detector: NoteDetector,
    gain: f32,
    block: Vec<f32>,
    window: VecDeque<f32>,
    window_size: usize,
    level: f32,
    notes: VecDeque<Note>,
}

impl InputMonitor {
    pub fn new(config: &AudioConfig, source: Box<dyn SampleSource>, canvas: CanvasHandle) -> Self {
        let sample_rate = source.sample_rate();
        Self {
            core: BehaviorCore::new("InputMonitor").with_priority(10),
            source,
            canvas,
            detector: NoteDetector::new(sample_rate),
            gain: config.gain,
            block: vec![0.0; config.block_size],
            window: VecDeque::new(),
            window_size: config.analysis_window.max(config.block_size),
            level: 0.0,
            notes: VecDeque::new(),
        }
    }

    /// RMS of the last block, after gain.
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn current_note(&self) -> Option<Note> {
        self.detector.current()
    }

    /// Recently detected notes, oldest first.
    pub fn notes(&self) -> impl Iterator<Item = Note> + '_ {
        self.notes.iter().copied()
    }

    fn note_text(&self) -> String {
        self.notes
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Behavior for InputMonitor {
    fn core(&self) -> &BehaviorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BehaviorCore {
        &mut self.core
    }

    fn load_content(&mut self) -> Result<()> {
        if self.block.len() < 2 {
            return Err(TabVizError::InvalidInput(
                "input monitor needs blocks of at least two samples",
            ));
        }
        self.window = VecDeque::with_capacity(self.window_size);
        self.detector.reset();
        tracing::debug!(
            sample_rate = self.detector.sample_rate(),
            window = self.window_size,
            "input monitor ready"
        );
        Ok(())
    }

    fn unload_content(&mut self) -> Result<()> {
        self.window = VecDeque::new();
        self.notes.clear();
        self.level = 0.0;
        Ok(())
    }

    fn update(&mut self, _time: &FrameTime) -> Result<()> {
        let read = self.source.fill(&mut self.block)?;
        let block = &mut self.block[..read];
        for sample in block.iter_mut() {
            *sample *= self.gain;
        }
        self.level = compute_rms(block);

        let overflow = (self.window.len() + block.len()).saturating_sub(self.window_size);
        self.window.drain(..overflow.min(self.window.len()));
        self.window.extend(block.iter().copied());
        if self.window.len() < self.window_size {
            return Ok(());
        }

        let samples = self.window.make_contiguous();
        if let Some(note) = self.detector.detect(samples)? {
            tracing::debug!(%note, "note detected");
            if self.notes.len() == NOTE_HISTORY {
                self.notes.pop_front();
            }
            self.notes.push_back(note);
        }
        Ok(())
    }

    fn draw(&mut self, _time: &FrameTime) -> Result<()> {
        let bars = (self.level.clamp(0.0, 1.0) * 20.0).round() as usize;
        let text = format!("level {:.3} {}", self.level, "#".repeat(bars));
        self.canvas
            .borrow_mut()
            .draw_text(Layer::World, self.core.name(), text)
    }

    fn draw_gui(&mut self, _time: &FrameTime) -> Result<()> {
        if self.notes.is_empty() {
            return Ok(());
        }
        let text = self.note_text();
        self.canvas
            .borrow_mut()
            .draw_text(Layer::Gui, self.core.name(), text)
    }
}

impl fmt::Debug for InputMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputMonitor")
            .field("core", &self.core)
            .field("detector", &self.detector)
            .field("gain", &self.gain)
            .field("window", &self.window.len())
            .field("level", &self.level)
            .field("notes", &self.notes)
            .finish()
    }
}
