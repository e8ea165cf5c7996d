use crate::engine::{Sink, Tone};
use crate::model::judge::{beat_interval_ms, stars_for_progress};
use crate::model::song::{Pad, Song, pad_for_index};
use anyhow::bail;
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

enum ControlMsg {
    Stop,
}

/// How far into the future the first practice note is scheduled.
const PLAYBACK_DELAY_MS: f64 = 600.0;

/// How long after a wrong press the expected note replays as a hint.
const HINT_DELAY_MS: u64 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Free,
    Practice,
    Game,
}

/// Progress reports from the practice worker to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MelodyEvent {
    /// Practice playback just sounded this song position.
    Note { position: usize, pad: usize },
    /// Practice playback reached the end of the song.
    Finished,
}

/// What a pad press amounted to, for the frontend to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadOutcome {
    /// Free play: the note just sounds.
    Played,
    /// Input is not accepted right now (practice playback, or no such pad).
    Ignored,
    /// Right note; `next` is the pad the song wants after it.
    Correct { next: usize },
    /// That was the last note: the whole song is done, back to free play.
    Completed,
    /// Wrong note; `expected` is what the song wanted.
    Wrong { expected: usize },
}

#[derive(Debug, Clone, Copy)]
struct MelodyState {
    mode: Mode,
    position: usize,
    score: usize,
    finished: bool,
}

/// The melody mini-game: free play, automatic practice playback, and the
/// call-and-response game over one fixed song.
#[derive(Debug)]
pub struct MelodyGame<S: Sink> {
    sink: Arc<S>,
    song: Song,
    bpm: f64,
    assist: bool,
    state: Arc<Mutex<MelodyState>>,
    control_tx: Mutex<Option<Sender<ControlMsg>>>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Sink + 'static> MelodyGame<S> {
    pub fn new(sink: S, song: Song, bpm: f64, assist: bool) -> Self {
        Self {
            sink: Arc::new(sink),
            song,
            bpm,
            assist,
            state: Arc::new(Mutex::new(MelodyState {
                mode: Mode::Free,
                position: 0,
                score: 0,
                finished: false,
            })),
            control_tx: Mutex::new(None),
            worker_handle: Mutex::new(None),
        }
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn mode(&self) -> Mode {
        self.state.lock().map(|s| s.mode).unwrap_or(Mode::Free)
    }

    pub fn score(&self) -> usize {
        self.state.lock().map(|s| s.score).unwrap_or(0)
    }

    pub fn position(&self) -> usize {
        self.state.lock().map(|s| s.position).unwrap_or(0)
    }

    pub fn finished(&self) -> bool {
        self.state.lock().map(|s| s.finished).unwrap_or(false)
    }

    pub fn stars(&self) -> usize {
        stars_for_progress(self.score(), self.song.len())
    }

    /// The pad the song wants next, while a game is on.
    pub fn expected(&self) -> Option<usize> {
        let state = self.state.lock().ok()?;

        if state.mode != Mode::Game {
            return None;
        }
        self.song.notes.get(state.position).map(|&n| n as usize)
    }

    /// Back to free play. Deliberately leaves a practice playback running;
    /// switching modes never cancels pending notes.
    pub fn set_free(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.mode = Mode::Free;
            state.finished = false;
        }
    }

    /// Play the whole song once, one note per beat, input ignored.
    pub fn start_practice(&self) -> anyhow::Result<Receiver<MelodyEvent>> {
        self.cancel_playback();

        {
            let Ok(mut state) = self.state.lock() else {
                bail!("Failed to lock the melody state..!");
            };
            *state = MelodyState {
                mode: Mode::Practice,
                position: 0,
                score: 0,
                finished: false,
            };
        }

        let beat = beat_interval_ms(self.bpm);
        let notes = self.song.notes.clone();

        let (tx, rx) = mpsc::channel::<ControlMsg>();
        {
            let Ok(mut ctl) = self.control_tx.lock() else {
                bail!("Failed to lock control_tx..!");
            };
            *ctl = Some(tx);
        }

        info!(
            "Practicing '{}': {} notes at {} BPM..!",
            self.song.title(),
            notes.len(),
            self.bpm
        );

        let (event_tx, event_rx) = mpsc::channel::<MelodyEvent>();
        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);

        let handle = thread::spawn(move || {
            let ctrl_rx = rx;
            let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
            const MAX_SLEEP_CHUNK_S: f64 = 0.050;

            let epoch = Instant::now();
            let wait_until = |target: Instant| -> bool {
                loop {
                    if ctrl_rx.try_recv().is_ok() {
                        debug!("Practice playback stopped..!");
                        return false;
                    }

                    let now = Instant::now();
                    if now >= target {
                        return true;
                    }
                    let remaining = (target - now).as_secs_f64();

                    let chunk = if remaining > MAX_SLEEP_CHUNK_S {
                        MAX_SLEEP_CHUNK_S
                    } else {
                        remaining
                    };

                    sleeper.sleep(Duration::from_secs_f64(chunk));
                }
            };

            for (i, &note) in notes.iter().enumerate() {
                let target = epoch
                    + Duration::from_secs_f64((PLAYBACK_DELAY_MS + i as f64 * beat) / 1000.0);

                if !wait_until(target) {
                    return;
                }

                if let Some(pad) = pad_for_index(note as usize) {
                    if let Err(why) = sink.play(&Tone::pad_note(pad, beat)) {
                        warn!("Practice note {} failed: {:?}", i, why);
                    }
                }

                let _ = event_tx.send(MelodyEvent::Note {
                    position: i,
                    pad: note as usize,
                });
            }

            // the last note rings for a beat before the run counts as done
            let end = epoch
                + Duration::from_secs_f64(
                    (PLAYBACK_DELAY_MS + notes.len() as f64 * beat + 200.0) / 1000.0,
                );
            if !wait_until(end) {
                return;
            }

            if let Ok(mut state) = state.lock() {
                state.finished = true;
            }
            let _ = event_tx.send(MelodyEvent::Finished);
            debug!("Practice playback finished all notes..!");
        });

        {
            let Ok(mut wh) = self.worker_handle.lock() else {
                bail!("Failed to lock worker handle..!");
            };
            *wh = Some(handle);
        }

        Ok(event_rx)
    }

    /// Start the call-and-response game from the top of the song.
    pub fn start_game(&self) -> anyhow::Result<()> {
        self.cancel_playback();

        let Ok(mut state) = self.state.lock() else {
            bail!("Failed to lock the melody state..!");
        };

        *state = MelodyState {
            mode: Mode::Game,
            position: 0,
            score: 0,
            finished: false,
        };

        if self.song.is_empty() {
            warn!("Song is empty: nothing to play..!");
            state.finished = true;
            state.mode = Mode::Free;
            return Ok(());
        }

        info!(
            "Game on: reproduce '{}' ({} notes)..!",
            self.song.title(),
            self.song.len()
        );

        Ok(())
    }

    /// Feed a pad press into whatever mode is active.
    pub fn on_pad(&self, pad_index: usize) -> PadOutcome {
        let Some(pad) = pad_for_index(pad_index) else {
            return PadOutcome::Ignored;
        };
        let beat = beat_interval_ms(self.bpm);

        let Ok(mut state) = self.state.lock() else {
            warn!("Failed to lock the melody state for a pad press..!");
            return PadOutcome::Ignored;
        };

        match state.mode {
            Mode::Practice => PadOutcome::Ignored,
            Mode::Free => {
                self.sound(pad, beat);
                PadOutcome::Played
            }
            Mode::Game => {
                let expected = self.song.notes.get(state.position).map(|&n| n as usize);
                self.sound(pad, beat);

                match expected {
                    Some(e) if e == pad_index => {
                        state.score += 1;
                        state.position += 1;

                        if state.position >= self.song.len() {
                            state.finished = true;
                            state.mode = Mode::Free;
                            PadOutcome::Completed
                        } else {
                            PadOutcome::Correct {
                                next: self.song.notes[state.position] as usize,
                            }
                        }
                    }
                    Some(e) => {
                        if self.assist {
                            self.replay_hint(e, beat);
                        }
                        PadOutcome::Wrong { expected: e }
                    }
                    None => PadOutcome::Ignored,
                }
            }
        }
    }

    /// Cancel an outstanding practice playback, if any.
    pub fn stop(&self) {
        self.cancel_playback();
    }

    fn sound(&self, pad: &Pad, beat_ms: f64) {
        if let Err(why) = self.sink.play(&Tone::pad_note(pad, beat_ms)) {
            warn!("Pad '{}' failed to sound: {:?}", pad.label, why);
        }
    }

    /// Replay the expected note a moment later. Deliberately untracked: it
    /// still fires after a mode switch.
    fn replay_hint(&self, pad_index: usize, beat_ms: f64) {
        let sink = Arc::clone(&self.sink);

        thread::spawn(move || {
            spin_sleep::sleep(Duration::from_millis(HINT_DELAY_MS));

            let Some(pad) = pad_for_index(pad_index) else {
                return;
            };
            if let Err(why) = sink.play(&Tone::pad_note(pad, beat_ms)) {
                warn!("Hint replay failed: {:?}", why);
            }
        });
    }

    fn cancel_playback(&self) {
        let tx = match self.control_tx.lock() {
            Ok(mut lock) => lock.take(),
            Err(_) => {
                warn!("Failed to lock control_tx..!");
                return;
            }
        };

        if let Some(tx) = tx {
            let _ = tx.send(ControlMsg::Stop);
        }

        let Ok(mut lock) = self.worker_handle.lock() else {
            warn!("Failed to lock worker_handle..!");
            return;
        };

        if let Some(handle) = lock.take() {
            let _ = handle.join();
            debug!("Practice worker joined..!");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::NullSink;

    fn tiny_song() -> Song {
        Song {
            metadata: crate::model::song::Metadata::default(),
            notes: vec![2, 1],
        }
    }

    #[test]
    fn free_play_just_sounds() {
        let game = MelodyGame::new(NullSink, Song::builtin(), 90.0, true);

        assert_eq!(game.mode(), Mode::Free);
        assert_eq!(game.on_pad(0), PadOutcome::Played);
        assert_eq!(game.on_pad(3), PadOutcome::Played);
        assert_eq!(game.score(), 0);
    }

    #[test]
    fn out_of_range_pads_are_ignored() {
        let game = MelodyGame::new(NullSink, Song::builtin(), 90.0, true);
        assert_eq!(game.on_pad(7), PadOutcome::Ignored);
    }

    #[test]
    fn correct_input_advances_wrong_input_does_not() {
        env_logger::try_init().unwrap_or(());

        let game = MelodyGame::new(NullSink, Song::builtin(), 90.0, true);
        game.start_game().unwrap();

        assert_eq!(game.expected(), Some(2));

        // Wrong pad: no advance, no score, hint fires in the background.
        assert_eq!(game.on_pad(0), PadOutcome::Wrong { expected: 2 });
        assert_eq!(game.position(), 0);
        assert_eq!(game.score(), 0);

        // Right pad: both advance.
        assert_eq!(game.on_pad(2), PadOutcome::Correct { next: 1 });
        assert_eq!(game.position(), 1);
        assert_eq!(game.score(), 1);
        assert_eq!(game.expected(), Some(1));
    }

    #[test]
    fn completing_the_song_returns_to_free_play() {
        let game = MelodyGame::new(NullSink, tiny_song(), 90.0, false);
        game.start_game().unwrap();

        assert_eq!(game.on_pad(2), PadOutcome::Correct { next: 1 });
        assert_eq!(game.on_pad(1), PadOutcome::Completed);

        assert_eq!(game.mode(), Mode::Free);
        assert!(game.finished());
        assert_eq!(game.score(), 2);
        assert_eq!(game.stars(), 3);
    }

    #[test]
    fn empty_song_game_is_immediately_finished() {
        env_logger::try_init().unwrap_or(());

        let song = Song {
            metadata: crate::model::song::Metadata::default(),
            notes: Vec::new(),
        };
        let game = MelodyGame::new(NullSink, song, 90.0, true);

        game.start_game().unwrap();
        assert!(game.finished());
        assert_eq!(game.mode(), Mode::Free);
    }

    #[test]
    fn practice_plays_every_note_and_ignores_pads() {
        env_logger::try_init().unwrap_or(());

        // 600 BPM keeps the test short: 100ms beats.
        let game = MelodyGame::new(NullSink, tiny_song(), 600.0, true);
        let events = game.start_practice().unwrap();

        assert_eq!(game.mode(), Mode::Practice);
        assert_eq!(game.on_pad(0), PadOutcome::Ignored);

        let mut heard = Vec::new();
        loop {
            match events.recv_timeout(Duration::from_secs(5)) {
                Ok(MelodyEvent::Note { position, pad }) => heard.push((position, pad)),
                Ok(MelodyEvent::Finished) => break,
                Err(why) => panic!("Practice worker went quiet: {:?}", why),
            }
        }

        assert_eq!(heard, vec![(0, 2), (1, 1)]);
        assert!(game.finished());
        // Practice mode sticks until the player switches out of it.
        assert_eq!(game.mode(), Mode::Practice);
    }

    #[test]
    fn restarting_practice_cancels_the_old_run() {
        env_logger::try_init().unwrap_or(());

        let game = MelodyGame::new(NullSink, Song::builtin(), 90.0, true);
        let _first = game.start_practice().unwrap();
        let second = game.start_practice().unwrap();

        // Both runs are cancelled well inside the 600ms lead-in, so nothing
        // ever sounded and nothing finished.
        game.stop();
        assert!(!game.finished());
        assert!(second.try_recv().is_err());
    }

    #[test]
    fn game_start_resets_progress() {
        let game = MelodyGame::new(NullSink, tiny_song(), 90.0, false);
        game.start_game().unwrap();

        game.on_pad(2);
        assert_eq!(game.score(), 1);

        game.start_game().unwrap();
        assert_eq!(game.score(), 0);
        assert_eq!(game.position(), 0);
        assert_eq!(game.mode(), Mode::Game);
        assert!(!game.finished());
    }
}
