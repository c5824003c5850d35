use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{Result, TabVizError};

/// Lowest and highest frequencies a standard-tuned electric guitar produces
/// (E2 to E6).
pub const MIN_GUITAR_HZ: f32 = 82.41;
pub const MAX_GUITAR_HZ: f32 = 1318.51;
const MIN_GUITAR_MIDI: u8 = 40;
const MAX_GUITAR_MIDI: u8 = 88;

/// Bins quieter than this are ignored by peak detection.
const MAGNITUDE_THRESHOLD: f32 = 0.0025;
/// Short blocks are zero-padded up to this size so the peak lands on a
/// usefully fine grid.
const MIN_FFT_SIZE: usize = 8192;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A pitch as a MIDI note number (A4 = 69).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Note(pub u8);

impl Note {
    /// Maps a frequency to the nearest note inside the guitar range, `None`
    /// outside it.
    pub fn from_frequency(frequency: f32) -> Option<Self> {
        if !(MIN_GUITAR_HZ..=MAX_GUITAR_HZ).contains(&frequency) {
            return None;
        }
        let midi = midi_from_frequency(frequency).clamp(MIN_GUITAR_MIDI as i32, MAX_GUITAR_MIDI as i32);
        Some(Self(midi as u8))
    }

    pub fn midi(self) -> u8 {
        self.0
    }

    /// Equal-tempered frequency of the note.
    pub fn frequency(self) -> f32 {
        440.0 * 2f32.powf((f32::from(self.0) - 69.0) / 12.0)
    }

    pub fn octave(self) -> i32 {
        i32::from(self.0) / 12 - 1
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = NOTE_NAMES[usize::from(self.0 % 12)];
        write!(f, "{name}{}", self.octave())
    }
}

/// Distance in Hz from `frequency` up to the semitone above and down to the
/// semitone below its nearest note.
pub fn note_distance(frequency: f32) -> (f32, f32) {
    let semitone = 2f32.powf(1.0 / 12.0);
    let closest = 440.0 * semitone.powi(midi_from_frequency(frequency) - 69);
    let up = closest * semitone - frequency;
    let down = frequency - closest / semitone;
    (up, down)
}

fn midi_from_frequency(frequency: f32) -> i32 {
    (69.0 + 12.0 * (frequency / 440.0).log2()).round() as i32
}

/// Strongest spectral peak found in one block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub frequency: f32,
    pub magnitude: f32,
}

/// Single-note pitch detector.
///
/// Each block is Hann-windowed, zero-padded and transformed; the strongest
/// bin above the noise threshold is taken as the played pitch. A new note is
/// only reported when the pitch moved further than the distance to the
/// neighbouring semitone, which keeps vibrato and FFT jitter from producing
/// a stream of duplicate notes.
pub struct NoteDetector {
    sample_rate: u32,
    last_frequency: f32,
    current: Option<Note>,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl NoteDetector {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            last_frequency: 0.0,
            current: None,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Most recently reported note.
    pub fn current(&self) -> Option<Note> {
        self.current
    }

    /// Forgets the pitch history while keeping FFT plans.
    pub fn reset(&mut self) {
        self.last_frequency = 0.0;
        self.current = None;
    }

    /// Analyses a block and returns the note it starts, if any.
    pub fn detect(&mut self, samples: &[f32]) -> Result<Option<Note>> {
        let Some(peak) = self.dominant_peak(samples)? else {
            return Ok(None);
        };
        if !self.is_significant_change(peak.frequency) {
            return Ok(None);
        }
        let note = Note::from_frequency(peak.frequency);
        if note.is_some() {
            self.current = note;
        }
        Ok(note)
    }

    /// Strongest bin above the noise threshold, refined by parabolic
    /// interpolation over its neighbours.
    pub fn dominant_peak(&mut self, samples: &[f32]) -> Result<Option<Peak>> {
        if samples.len() < 2 {
            return Err(TabVizError::InvalidInput(
                "pitch detection requires at least two samples",
            ));
        }

        let len = samples.len();
        let size = len.next_power_of_two().max(MIN_FFT_SIZE);
        let sample_rate = self.sample_rate as f32;
        let fft = self.prepare_fft(size);

        fft.input.fill(0.0);
        for (index, value) in samples.iter().enumerate() {
            fft.input[index] = *value * hann_value(index, len);
        }
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)?;

        let magnitudes: Vec<f32> = fft.spectrum.iter().map(|bin| bin.norm()).collect();
        let best = magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, magnitude)| **magnitude > MAGNITUDE_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(b.1));
        let Some((index, &magnitude)) = best else {
            return Ok(None);
        };

        let offset = match (magnitudes.get(index - 1), magnitudes.get(index + 1)) {
            (Some(&left), Some(&right)) => {
                let denominator = left - 2.0 * magnitude + right;
                if denominator.abs() > f32::EPSILON {
                    (0.5 * (left - right) / denominator).clamp(-0.5, 0.5)
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        let bin_hz = sample_rate / size as f32;
        Ok(Some(Peak {
            frequency: (index as f32 + offset) * bin_hz,
            magnitude,
        }))
    }

    fn is_significant_change(&mut self, frequency: f32) -> bool {
        if frequency <= 0.0 {
            return false;
        }
        let difference = (frequency - self.last_frequency).abs();
        let (up, down) = note_distance(frequency);
        if difference > up.abs().min(down.abs()) {
            self.last_frequency = frequency;
            true
        } else {
            false
        }
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        let planner = &mut self.fft_planner;
        let fft = self
            .fft
            .get_or_insert_with(|| FftResources::new(planner, size));
        if fft.size != size {
            *fft = FftResources::new(planner, size);
        }
        fft
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        Self {
            size,
            plan,
            scratch,
            spectrum,
            input,
        }
    }
}

impl fmt::Debug for NoteDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteDetector")
            .field("sample_rate", &self.sample_rate)
            .field("last_frequency", &self.last_frequency)
            .field("current", &self.current)
            .field("fft_size", &self.fft.as_ref().map(|fft| fft.size))
            .finish()
    }
}

/// Root mean square level of a block.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
