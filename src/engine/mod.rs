use crate::model::song::Pad;
use anyhow::Result;

pub mod cpal;
pub mod null;

pub use null::NullSink;
pub use self::cpal::{CpalOutput, CpalSink};

/// A single schedulable beep: a frequency, a waveform, and a tiny two-stage
/// envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub freq_hz: f32,
    pub wave: Waveform,
    pub duration_s: f32,
    pub volume: f32,
    /// Start offset into the future, in seconds.
    pub when_s: f32,
    pub attack_s: f32,
    pub release_s: f32,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            freq_hz: 660.0,
            wave: Waveform::Sine,
            duration_s: 0.12,
            volume: 0.2,
            when_s: 0.0,
            attack_s: 0.005,
            release_s: 0.06,
        }
    }
}

impl Tone {
    /// Metronome tick; the strong one marks the start of a bar.
    pub fn tick(strong: bool) -> Self {
        Self {
            freq_hz: if strong { 980.0 } else { 660.0 },
            wave: Waveform::Square,
            duration_s: 0.07,
            volume: 0.15,
            ..Self::default()
        }
    }

    /// A pad's note, held for most of a beat.
    pub fn pad_note(pad: &Pad, beat_ms: f64) -> Self {
        Self {
            freq_hz: pad.freq_hz,
            duration_s: (beat_ms * 0.9 / 1000.0).min(0.4) as f32,
            ..Self::default()
        }
    }

    pub fn delayed(mut self, when_s: f32) -> Self {
        self.when_s = when_s;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Saw,
}

/// Anything that can sound a tone. The game controllers only ever talk to
/// this, so tests (and `--mute`) swap in a silent one.
pub trait Sink: Send + Sync {
    /// Queue a tone for playback. Callers log failures and carry on; a
    /// missing audio device must never break a game run.
    fn play(&self, tone: &Tone) -> Result<()>;

    fn tick(&self, strong: bool) -> Result<()> {
        self.play(&Tone::tick(strong))
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn play(&self, tone: &Tone) -> Result<()> {
        (**self).play(tone)
    }
}
