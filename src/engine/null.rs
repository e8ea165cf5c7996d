use crate::engine::{Sink, Tone};
use anyhow::Result;
use log::debug;

/// A sink that swallows every tone. Stands in when no audio device can be
/// opened (or `--mute` is passed), and keeps controller tests quiet.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn play(&self, tone: &Tone) -> Result<()> {
        debug!(
            "NullSink: dropping a {:.0}Hz {:?} tone..!",
            tone.freq_hz, tone.wave
        );
        Ok(())
    }
}
