use anyhow::{Result, anyhow, bail};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One of the four playable notes, sized for little fingers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pad {
    /// Solfège label shown in the terminal.
    pub label: &'static str,
    /// The digit key that presses this pad.
    pub key: char,
    pub freq_hz: f32,
}

/// The melody pads, in order: do, re, mi, so.
pub const PADS: &[Pad] = &[
    Pad {
        label: "do",
        key: '1',
        freq_hz: 261.63,
    },
    Pad {
        label: "re",
        key: '2',
        freq_hz: 293.66,
    },
    Pad {
        label: "mi",
        key: '3',
        freq_hz: 329.63,
    },
    Pad {
        label: "so",
        key: '4',
        freq_hz: 392.00,
    },
];

pub fn pad_for_index(index: usize) -> Option<&'static Pad> {
    PADS.get(index)
}

/// Which pad a digit key presses, if any.
pub fn pad_for_key(key: char) -> Option<usize> {
    PADS.iter().position(|p| p.key == key)
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Metadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tempo_bpm: Option<f64>,
}

/// An ordered sequence of pad indices the melody game asks the player to
/// reproduce.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Song {
    #[serde(default)]
    pub metadata: Metadata,
    pub notes: Vec<u8>,
}

impl Song {
    /// The built-in tune every kid already knows.
    pub fn builtin() -> Self {
        Song {
            metadata: Metadata {
                title: Some(String::from("Mary Had a Little Lamb")),
                tempo_bpm: Some(90.0),
            },
            notes: vec![2, 1, 0, 1, 2, 2, 2, 1, 1, 1, 2, 3, 3],
        }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn title(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or("No Title")
    }
}

/// Load a song from a YAML file, dropping any notes that don't map to a pad.
pub fn load_song_file<P: AsRef<Path>>(path: P) -> Result<Song> {
    let text = fs::read_to_string(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read song file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    song_from_yaml(&text)
}

fn song_from_yaml(text: &str) -> Result<Song> {
    let mut song: Song =
        serde_yaml::from_str(text).map_err(|e| anyhow!("Failed to parse song: {}", e))?;

    let before = song.notes.len();
    song.notes.retain(|&n| (n as usize) < PADS.len());

    if song.notes.len() < before {
        warn!(
            "Dropped {} notes outside the pad range: skipping them..!",
            before - song.notes.len()
        );
    }

    if song.notes.is_empty() {
        bail!("Song has no playable notes..!");
    }

    Ok(song)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builtin_song_fits_the_pads() {
        let song = Song::builtin();

        assert_eq!(song.len(), 13);
        assert!(song.notes.iter().all(|&n| (n as usize) < PADS.len()));
        assert_eq!(song.title(), "Mary Had a Little Lamb");
    }

    #[test]
    fn keys_map_to_pads_in_order() {
        assert_eq!(pad_for_key('1'), Some(0));
        assert_eq!(pad_for_key('4'), Some(3));
        assert_eq!(pad_for_key('5'), None);
        assert_eq!(pad_for_index(2).map(|p| p.label), Some("mi"));
        assert!(pad_for_index(4).is_none());
    }

    #[test]
    fn parse_song_yaml() {
        let song = song_from_yaml(
            "metadata:\n  title: Hot Cross Buns\n  tempo_bpm: 100\nnotes: [2, 1, 0]\n",
        )
        .unwrap();

        assert_eq!(song.title(), "Hot Cross Buns");
        assert_eq!(song.metadata.tempo_bpm, Some(100.0));
        assert_eq!(song.notes, vec![2, 1, 0]);
    }

    #[test]
    fn parse_song_without_metadata() {
        let song = song_from_yaml("notes: [0, 1, 2, 3]\n").unwrap();

        assert_eq!(song.title(), "No Title");
        assert_eq!(song.len(), 4);
    }

    #[test]
    fn out_of_range_notes_are_skipped() {
        env_logger::try_init().unwrap_or(());

        let song = song_from_yaml("notes: [0, 9, 1, 200]\n").unwrap();
        assert_eq!(song.notes, vec![0, 1]);
    }

    #[test]
    fn all_bad_notes_is_an_error() {
        env_logger::try_init().unwrap_or(());

        assert!(song_from_yaml("notes: [7, 8, 9]\n").is_err());
        assert!(song_from_yaml("notes: []\n").is_err());
    }
}
