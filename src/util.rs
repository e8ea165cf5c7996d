use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameChoice {
    Rhythm,
    Melody,
}

pub fn parse_game(s: &str) -> GameChoice {
    match s.to_lowercase().as_str() {
        "r" | "rhythm" | "beat" | "tap" => GameChoice::Rhythm,
        "m" | "melody" | "pads" | "doremi" => GameChoice::Melody,
        other => {
            info!("Unknown game '{}', defaulting to `rhythm`..!", other);
            GameChoice::Rhythm
        }
    }
}

/// Keep the tempo inside the range the mini-game was tuned for.
pub fn clamp_bpm(bpm: f64, min: f64, max: f64) -> f64 {
    if bpm < min || bpm > max {
        info!("{} BPM is outside {}..={}, clamping..!", bpm, min, max);
    }

    bpm.clamp(min, max)
}

/// Three slots, filled left to right: `★★☆`.
pub fn star_meter(stars: usize) -> String {
    (0..3).map(|i| if i < stars { '★' } else { '☆' }).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn game_names_and_shorthands() {
        assert_eq!(parse_game("rhythm"), GameChoice::Rhythm);
        assert_eq!(parse_game("M"), GameChoice::Melody);
        assert_eq!(parse_game("doremi"), GameChoice::Melody);
        assert_eq!(parse_game("flute"), GameChoice::Rhythm);
    }

    #[test]
    fn bpm_clamps_to_the_game_range() {
        assert_eq!(clamp_bpm(90.0, 60.0, 140.0), 90.0);
        assert_eq!(clamp_bpm(30.0, 60.0, 140.0), 60.0);
        assert_eq!(clamp_bpm(500.0, 70.0, 120.0), 120.0);
    }

    #[test]
    fn star_meter_fills_left_to_right() {
        assert_eq!(star_meter(0), "☆☆☆");
        assert_eq!(star_meter(2), "★★☆");
        assert_eq!(star_meter(3), "★★★");
        assert_eq!(star_meter(9), "★★★");
    }
}
