use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "PAN_BEAT",
    about = "Tap-along rhythm and do-re-mi melody games for little kids!"
)]
pub struct Args {
    /// Which mini-game to play: rhythm|melody.
    #[arg(default_value = "rhythm")]
    pub game: String,

    /// Tempo in beats per minute. Defaults to 90, or the song's own tempo in
    /// the melody game.
    #[arg(short, long)]
    pub bpm: Option<f64>,

    /// Number of judged beats in a rhythm run.
    #[arg(long, default_value_t = 16)]
    pub beats: usize,

    /// Unjudged countdown beats before judging starts.
    #[arg(long = "lead-in", default_value_t = 4)]
    pub lead_in: usize,

    /// Path to a YAML song file for the melody game (defaults to the built-in
    /// tune).
    #[arg(short, long)]
    pub song: Option<PathBuf>,

    /// Don't replay the expected note as a hint after a wrong pad press.
    #[arg(long = "no-assist", default_value_t = false)]
    pub no_assist: bool,

    /// Play silently, without opening an audio device.
    #[arg(short, long, default_value_t = false)]
    pub mute: bool,

    /// Dry run (print the beat schedule or the song and exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Prints extra information to the terminal.
    #[arg(short, long)]
    pub verbose: bool,
}
