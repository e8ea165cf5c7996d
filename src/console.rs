use crate::engine::Sink;
use crate::melody::{MelodyEvent, MelodyGame, PadOutcome};
use crate::model::song::{PADS, pad_for_index, pad_for_key};
use crate::rhythm::{RhythmEvent, RhythmGame};
use crate::util::star_meter;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::warn;
use std::io::{Write, stdout};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// Raw-mode guard; drops back to a sane terminal on every exit path.
struct RawMode;

impl RawMode {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

fn say(line: &str) {
    // raw mode needs the explicit carriage return
    print!("{}\r\n", line);
    let _ = stdout().flush();
}

/// The key loop for the rhythm game: space taps, everything else steers.
pub fn run_rhythm<S: Sink + 'static>(
    game: &RhythmGame<S>,
    quit: &AtomicBool,
    verbose: bool,
) -> Result<()> {
    let _raw = RawMode::enter()?;
    let settings = game.settings();

    say(&format!(
        "Rhythm time! {} BPM, {} countdown beats then {} to tap.",
        settings.bpm, settings.lead_in, settings.judged_beats
    ));
    say("[s] start   [space] tap   [x] stop + score   [q] quit");

    let mut events: Option<Receiver<RhythmEvent>> = None;

    while !quit.load(Ordering::SeqCst) {
        let mut finished = false;

        if let Some(rx) = &events {
            while let Ok(ev) = rx.try_recv() {
                match ev {
                    RhythmEvent::Pulse {
                        countdown: Some(n), ..
                    } => say(&format!("  {}...", n)),
                    RhythmEvent::Pulse {
                        index,
                        countdown: None,
                    } => {
                        if index == settings.lead_in {
                            say("  PAN! Tap along..!");
                        } else if verbose {
                            say(&format!("  ♪ beat {}", index + 1));
                        }
                    }
                    RhythmEvent::Finished => finished = true,
                }
            }
        }

        if finished {
            events = None;
            report_rhythm(game);
        }

        if !event::poll(Duration::from_millis(10))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char(' ') | KeyCode::Enter => {
                // out-of-window taps are dropped without feedback
                if let Some((index, hit)) = game.tap() {
                    say(&format!(
                        "  beat {:>2}: {:?} ({}ms off)",
                        index + 1,
                        hit.judgment,
                        hit.delta_ms
                    ));
                }
            }
            KeyCode::Char('s') => {
                events = Some(game.start()?);
                say("Count-in..!");
            }
            KeyCode::Char('x') => {
                if game.is_running() {
                    game.stop()?;
                    events = None;
                    report_rhythm(game);
                }
            }
            _ => {}
        }
    }

    if game.is_running() {
        if let Err(why) = game.stop() {
            warn!("Failed to stop the rhythm run: {:?}", why);
        }
    }

    Ok(())
}

fn report_rhythm<S: Sink + 'static>(game: &RhythmGame<S>) {
    let tally = game.score();

    say(&format!(
        "Perfect {} | Good {} | Miss {} of {} judged | accuracy {}%  {}",
        tally.perfect,
        tally.good,
        tally.miss,
        tally.judged,
        tally.accuracy(),
        star_meter(tally.stars())
    ));
}

/// The key loop for the melody game: digits press pads, letters pick modes.
pub fn run_melody<S: Sink + 'static>(
    game: &MelodyGame<S>,
    quit: &AtomicBool,
    verbose: bool,
) -> Result<()> {
    let _raw = RawMode::enter()?;

    say(&format!(
        "Melody time! '{}' at {} BPM.",
        game.song().title(),
        game.bpm()
    ));
    let pads = PADS
        .iter()
        .map(|p| format!("[{}] {}", p.key, p.label))
        .collect::<Vec<_>>()
        .join("  ");
    say(&pads);
    say("[f] free play   [p] practice   [g] game   [q] quit");

    let mut events: Option<Receiver<MelodyEvent>> = None;

    while !quit.load(Ordering::SeqCst) {
        let mut done = false;

        if let Some(rx) = &events {
            while let Ok(ev) = rx.try_recv() {
                match ev {
                    MelodyEvent::Note { position, pad } => {
                        if let Some(p) = pad_for_index(pad) {
                            if verbose {
                                say(&format!(
                                    "  ♪ {} ({}/{})",
                                    p.label,
                                    position + 1,
                                    game.song().len()
                                ));
                            } else {
                                say(&format!("  ♪ {}", p.label));
                            }
                        }
                    }
                    MelodyEvent::Finished => done = true,
                }
            }
        }

        if done {
            events = None;
            say("Practice done! Press [g] and play it back..!");
        }

        if !event::poll(Duration::from_millis(10))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('f') => {
                game.set_free();
                say("Free play! Any pad you like..!");
            }
            KeyCode::Char('p') => {
                events = Some(game.start_practice()?);
                say("Listen first..!");
            }
            KeyCode::Char('g') => {
                game.start_game()?;
                if let Some(first) = game.expected() {
                    prompt_pad(first);
                }
            }
            KeyCode::Char(ch) => {
                let Some(pad) = pad_for_key(ch) else {
                    continue;
                };

                match game.on_pad(pad) {
                    PadOutcome::Played | PadOutcome::Ignored => {}
                    PadOutcome::Correct { next } => prompt_pad(next),
                    PadOutcome::Wrong { expected } => {
                        if let Some(p) = pad_for_index(expected) {
                            say(&format!("  not quite, try {} [{}]", p.label, p.key));
                        }
                    }
                    PadOutcome::Completed => {
                        say(&format!(
                            "  The whole song! {} / {}  {}",
                            game.score(),
                            game.song().len(),
                            star_meter(game.stars())
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    game.stop();
    Ok(())
}

fn prompt_pad(pad: usize) {
    if let Some(p) = pad_for_index(pad) {
        say(&format!("  next: {} [{}]", p.label, p.key));
    }
}
