use PAN_BEAT::{
    Args, BeatTrack, CpalOutput, GameChoice, MelodyGame, NullSink, RhythmGame, RhythmSettings,
    START_DELAY_MS, Sink, Song, clamp_bpm, console, load_song_file, pad_for_index, parse_game,
};
use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let game = parse_game(&args.game);

    // ctrl-c inside the raw-mode key loop arrives as a key event; this
    // handler covers the moments outside it
    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            warn!("Ctrl-C received, shutting down..!");
            quit.store(true, Ordering::SeqCst);
        })
        .expect("Error setting Ctrl-C handler..!");
    }

    match game {
        GameChoice::Rhythm => {
            let bpm = clamp_bpm(args.bpm.unwrap_or(90.0), 60.0, 140.0);
            let settings = RhythmSettings {
                bpm,
                lead_in: args.lead_in,
                judged_beats: args.beats,
            };

            if args.dry_run {
                info!("Previewing the beat schedule..!");
                let track = BeatTrack::new(
                    bpm,
                    settings.lead_in,
                    settings.judged_beats,
                    START_DELAY_MS,
                );
                for (i, beat) in track.beats().iter().enumerate() {
                    info!(
                        "Beat {:>2}: t={:>8.1}ms{}",
                        i,
                        beat.time_ms,
                        if track.is_lead_in(i) { " (lead-in)" } else { "" }
                    );
                }
                return Ok(());
            }

            let (_audio, sink) = open_sink(args.mute);
            let controller = RhythmGame::new(sink, settings);
            console::run_rhythm(&controller, &quit, args.verbose)?;
        }
        GameChoice::Melody => {
            let song = match &args.song {
                Some(path) => {
                    info!("Importing song file: '{}'...", path.display());
                    load_song_file(path)?
                }
                None => Song::builtin(),
            };
            let bpm = clamp_bpm(
                args.bpm.or(song.metadata.tempo_bpm).unwrap_or(90.0),
                70.0,
                120.0,
            );

            if args.dry_run {
                info!("Previewing '{}' ({} notes)..!", song.title(), song.len());
                for (i, &note) in song.notes.iter().enumerate() {
                    let label = pad_for_index(note as usize)
                        .map(|p| p.label)
                        .unwrap_or("?");
                    info!("Note {:>2}: {}", i, label);
                }
                return Ok(());
            }

            let (_audio, sink) = open_sink(args.mute);
            let controller = MelodyGame::new(sink, song, bpm, !args.no_assist);
            console::run_melody(&controller, &quit, args.verbose)?;
        }
    }

    info!("Thanks for playing..!");
    Ok(())
}

/// Open the real audio output, or fall back to silence with a printed hint.
/// A machine without a sound device still gets a playable game.
fn open_sink(mute: bool) -> (Option<CpalOutput>, Box<dyn Sink>) {
    if mute {
        return (None, Box::new(NullSink));
    }

    match CpalOutput::open() {
        Ok(output) => {
            let sink = output.sink();
            (Some(output), Box::new(sink))
        }
        Err(why) => {
            warn!("Audio output unavailable: {:?}", why);
            println!("(no sound? the game still works, it just plays silently)");
            (None, Box::new(NullSink))
        }
    }
}
