use crate::engine::{Sink, Tone, Waveform};
use anyhow::{Result, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, warn};
use std::sync::{Arc, Mutex};

/// Floor the exponential decay slides down to. An exponential ramp can never
/// reach zero, so the envelope lands here instead.
const FLOOR_GAIN: f32 = 1.0e-4;

/// One currently sounding tone inside the mixer.
#[derive(Debug, Clone)]
struct Voice {
    phase: f32,
    phase_inc: f32,
    wave: Waveform,
    volume: f32,
    delay_samples: u32,
    emitted: u32,
    total_samples: u32,
    attack_samples: u32,
    decay_samples: u32,
}

impl Voice {
    fn from_tone(tone: &Tone, sample_rate: f32) -> Self {
        let total = (tone.duration_s.max(0.0) * sample_rate) as u32;
        let attack = ((tone.attack_s.max(0.0) * sample_rate) as u32).min(total);

        // The decay ends at max(attack + 10ms, duration - release), a hair
        // before the tone stops.
        let decay_end_s = (tone.attack_s + 0.01).max(tone.duration_s - tone.release_s);
        let decay_end = ((decay_end_s * sample_rate) as u32).clamp(attack, total.max(1));

        Self {
            phase: 0.0,
            phase_inc: tone.freq_hz / sample_rate,
            wave: tone.wave,
            volume: tone.volume,
            delay_samples: (tone.when_s.max(0.0) * sample_rate) as u32,
            emitted: 0,
            total_samples: total.max(1),
            attack_samples: attack,
            decay_samples: decay_end - attack,
        }
    }

    fn next_sample(&mut self) -> f32 {
        if self.delay_samples > 0 {
            self.delay_samples -= 1;
            return 0.0;
        }

        let gain = self.volume * envelope_gain(self.emitted, self.attack_samples, self.decay_samples);
        let sample = waveform_sample(self.wave, self.phase) * gain;

        self.phase = (self.phase + self.phase_inc).fract();
        self.emitted += 1;

        sample
    }

    fn done(&self) -> bool {
        self.delay_samples == 0 && self.emitted >= self.total_samples
    }
}

/// Linear attack up to full gain, then an exponential slide toward the floor
/// over the decay segment, holding there until the tone stops.
fn envelope_gain(n: u32, attack: u32, decay: u32) -> f32 {
    if n < attack {
        return n as f32 / attack.max(1) as f32;
    }

    let frac = ((n - attack) as f32 / decay.max(1) as f32).min(1.0);
    FLOOR_GAIN.powf(frac)
}

fn waveform_sample(wave: Waveform, phase: f32) -> f32 {
    use std::f32::consts::TAU;

    // phase is normalized to 0..1
    match wave {
        Waveform::Sine => (phase * TAU).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Saw => 2.0 * phase - 1.0,
        Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
    }
}

#[derive(Debug, Default)]
struct MixerState {
    voices: Vec<Voice>,
}

fn mix_sample(voices: &mut Vec<Voice>) -> f32 {
    let mut s = 0.0f32;
    let mut i = 0usize;

    while i < voices.len() {
        s += voices[i].next_sample();

        if voices[i].done() {
            voices.swap_remove(i);
            continue;
        }
        i += 1;
    }

    s.tanh()
}

/// Owns the cpal stream. Not `Send`: it lives wherever it was opened (the
/// main thread) and just has to stay alive for the whole run.
pub struct CpalOutput {
    _stream: cpal::Stream,
    sink: CpalSink,
}

/// The shareable half of the audio backend: pushes voices into the mixer
/// that the stream callback drains.
#[derive(Debug, Clone)]
pub struct CpalSink {
    state: Arc<Mutex<MixerState>>,
    sample_rate: f32,
}

impl CpalOutput {
    /// Open the default output device and start a mixing stream on it.
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default audio output device..!"))?;
        let config = device.default_output_config()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        let state = Arc::new(Mutex::new(MixerState::default()));

        let err_fn = |err| warn!("Audio stream error: {err}");

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream_f32(&device, &config.into(), channels, Arc::clone(&state), err_fn)?
            }
            cpal::SampleFormat::I16 => {
                build_stream_i16(&device, &config.into(), channels, Arc::clone(&state), err_fn)?
            }
            cpal::SampleFormat::U16 => {
                build_stream_u16(&device, &config.into(), channels, Arc::clone(&state), err_fn)?
            }
            other => bail!("Unsupported sample format {:?}..!", other),
        };

        stream.play()?;
        debug!("Opened audio output at {}Hz, {} channel(s)..!", sample_rate, channels);

        Ok(Self {
            _stream: stream,
            sink: CpalSink { state, sample_rate },
        })
    }

    pub fn sink(&self) -> CpalSink {
        self.sink.clone()
    }
}

impl Sink for CpalSink {
    fn play(&self, tone: &Tone) -> Result<()> {
        let Ok(mut state) = self.state.lock() else {
            bail!("Failed to lock the mixer state..!");
        };

        state.voices.push(Voice::from_tone(tone, self.sample_rate));
        Ok(())
    }
}

fn build_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    state: Arc<Mutex<MixerState>>,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        move |data: &mut [f32], _| {
            let Ok(mut guard) = state.lock() else {
                return;
            };
            let voices = &mut guard.voices;
            let mut frame = 0usize;
            while frame < data.len() {
                let s = mix_sample(voices);
                for ch in 0..channels {
                    let idx = frame + ch;
                    if idx < data.len() {
                        data[idx] = s;
                    }
                }
                frame += channels;
            }
        },
        err_fn,
        None,
    )
}

fn build_stream_i16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    state: Arc<Mutex<MixerState>>,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        move |data: &mut [i16], _| {
            let Ok(mut guard) = state.lock() else {
                return;
            };
            let voices = &mut guard.voices;
            let mut frame = 0usize;
            while frame < data.len() {
                let s = mix_sample(voices);
                let v = (s * i16::MAX as f32) as i16;
                for ch in 0..channels {
                    let idx = frame + ch;
                    if idx < data.len() {
                        data[idx] = v;
                    }
                }
                frame += channels;
            }
        },
        err_fn,
        None,
    )
}

fn build_stream_u16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    state: Arc<Mutex<MixerState>>,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    device.build_output_stream(
        config,
        move |data: &mut [u16], _| {
            let Ok(mut guard) = state.lock() else {
                return;
            };
            let voices = &mut guard.voices;
            let mut frame = 0usize;
            while frame < data.len() {
                let s = mix_sample(voices);
                let v = ((s * 0.5 + 0.5) * u16::MAX as f32) as u16;
                for ch in 0..channels {
                    let idx = frame + ch;
                    if idx < data.len() {
                        data[idx] = v;
                    }
                }
                frame += channels;
            }
        },
        err_fn,
        None,
    )
}
