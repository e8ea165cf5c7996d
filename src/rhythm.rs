use crate::engine::Sink;
use crate::model::judge::{BeatTrack, Hit, Tally, beat_interval_ms};
use anyhow::bail;
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum ControlMsg {
    Stop,
}

/// How far into the future the first beat of a run is scheduled.
pub const START_DELAY_MS: f64 = 600.0;

/// Progress reports from the tick worker to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RhythmEvent {
    /// A beat just sounded. Lead-in beats carry the countdown number.
    Pulse {
        index: usize,
        countdown: Option<usize>,
    },
    /// The run played out to its end (as opposed to being stopped).
    Finished,
}

#[derive(Debug, Clone, Copy)]
pub struct RhythmSettings {
    pub bpm: f64,
    pub lead_in: usize,
    pub judged_beats: usize,
}

impl Default for RhythmSettings {
    fn default() -> Self {
        Self {
            bpm: 90.0,
            lead_in: 4,
            judged_beats: 16,
        }
    }
}

/// The rhythm mini-game: schedules a run of metronome ticks on a worker
/// thread and judges taps against the beat schedule as they come in.
#[derive(Debug)]
pub struct RhythmGame<S: Sink> {
    sink: Arc<S>,
    settings: RhythmSettings,
    track: Arc<Mutex<BeatTrack>>,
    epoch: Arc<Mutex<Option<Instant>>>,
    running: Arc<AtomicBool>,
    control_tx: Mutex<Option<Sender<ControlMsg>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Sink + 'static> RhythmGame<S> {
    pub fn new(sink: S, settings: RhythmSettings) -> Self {
        Self {
            sink: Arc::new(sink),
            settings,
            track: Arc::new(Mutex::new(BeatTrack::empty())),
            epoch: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            control_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> RhythmSettings {
        self.settings
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Lay down a fresh beat schedule and spawn the tick worker. A run that
    /// is already going is stopped first, clearing its pending ticks.
    pub fn start(&self) -> anyhow::Result<Receiver<RhythmEvent>> {
        if self.is_running() {
            self.stop()?;
        }

        let interval = beat_interval_ms(self.settings.bpm);
        let fresh = BeatTrack::new(
            self.settings.bpm,
            self.settings.lead_in,
            self.settings.judged_beats,
            START_DELAY_MS,
        );
        let total = fresh.len();

        if total == 0 {
            bail!("Nothing to schedule: zero beats configured..!");
        }

        {
            let Ok(mut lock) = self.track.lock() else {
                bail!("Failed to lock the beat track..!");
            };
            *lock = fresh;
        }

        let epoch = Instant::now();
        {
            let Ok(mut lock) = self.epoch.lock() else {
                bail!("Failed to lock the run epoch..!");
            };
            *lock = Some(epoch);
        }

        let (tx, rx) = mpsc::channel::<ControlMsg>();
        {
            let Ok(mut ctl) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!");
            };
            *ctl = Some(tx);
        }

        info!(
            "Starting a rhythm run: {} lead-in + {} judged beats at {} BPM..!",
            self.settings.lead_in, self.settings.judged_beats, self.settings.bpm
        );

        let (event_tx, event_rx) = mpsc::channel::<RhythmEvent>();
        let sink = Arc::clone(&self.sink);
        let running = Arc::clone(&self.running);
        let lead_in = self.settings.lead_in;
        running.store(true, Ordering::SeqCst);

        let handle = thread::spawn(move || {
            let ctrl_rx = rx;
            let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
            const MAX_SLEEP_CHUNK_S: f64 = 0.050;

            for i in 0..total {
                let target =
                    epoch + Duration::from_secs_f64((START_DELAY_MS + i as f64 * interval) / 1000.0);

                loop {
                    if ctrl_rx.try_recv().is_ok() {
                        debug!("Rhythm worker stopped during wait..!");
                        running.store(false, Ordering::SeqCst);
                        return;
                    }

                    let now = Instant::now();
                    if now >= target {
                        break;
                    }
                    let remaining = (target - now).as_secs_f64();

                    let chunk = if remaining > MAX_SLEEP_CHUNK_S {
                        MAX_SLEEP_CHUNK_S
                    } else {
                        remaining
                    };

                    sleeper.sleep(Duration::from_secs_f64(chunk));
                }

                // every 4th beat is the strong "one" of the bar
                if let Err(why) = sink.tick(i % 4 == 0) {
                    warn!("Tick {} failed: {:?}", i, why);
                }

                let countdown = if i < lead_in { Some(lead_in - i) } else { None };
                let _ = event_tx.send(RhythmEvent::Pulse { index: i, countdown });
            }

            // let the last beat ring out before declaring the run over
            let deadline = Instant::now() + Duration::from_secs_f64(interval * 0.8 / 1000.0);
            loop {
                if ctrl_rx.try_recv().is_ok() {
                    debug!("Rhythm worker stopped during the tail..!");
                    running.store(false, Ordering::SeqCst);
                    return;
                }

                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let remaining = (deadline - now).as_secs_f64();

                let chunk = if remaining > MAX_SLEEP_CHUNK_S {
                    MAX_SLEEP_CHUNK_S
                } else {
                    remaining
                };

                sleeper.sleep(Duration::from_secs_f64(chunk));
            }

            running.store(false, Ordering::SeqCst);
            let _ = event_tx.send(RhythmEvent::Finished);
            debug!("Rhythm worker finished all beats..!");
        });

        {
            let Ok(mut wh) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!");
            };
            *wh = Some(handle);
        }

        Ok(event_rx)
    }

    /// Judge a tap against the nearest unclaimed beat. `None` when the run
    /// is idle, every beat is claimed, or the tap lands outside both
    /// windows (those are dropped, not counted as misses).
    pub fn tap(&self) -> Option<(usize, Hit)> {
        if !self.is_running() {
            return None;
        }

        let epoch = (*self.epoch.lock().ok()?)?;
        let now_ms = epoch.elapsed().as_secs_f64() * 1000.0;

        let mut track = self.track.lock().ok()?;
        track.claim(now_ms)
    }

    /// Score of the current (or most recent) run.
    pub fn score(&self) -> Tally {
        match self.track.lock() {
            Ok(track) => track.tally(),
            Err(_) => {
                warn!("Failed to lock the beat track for scoring..!");
                Tally::default()
            }
        }
    }

    pub fn stop(&self) -> anyhow::Result<()> {
        let tx = {
            let Ok(mut lock) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!");
            };
            lock.take()
        };

        if let Some(tx) = tx {
            let _ = tx.send(ControlMsg::Stop);
        } else {
            bail!("No worker is running a rhythm run..!");
        }

        let Ok(mut lock) = self.worker_handle.lock() else {
            bail!("Failed to lock worker_handle..!");
        };

        if let Some(handle) = lock.take() {
            let _ = handle.join();
            debug!("Rhythm worker joined..!");
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Stopped the rhythm run..!");

        Ok(())
    }
}
