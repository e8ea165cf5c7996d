use log::debug;

/// Absolute timing error (in ms) within which a tap counts as Perfect.
pub const PERFECT_WINDOW_MS: f64 = 80.0;

/// Absolute timing error (in ms) within which a tap still counts as Good.
pub const GOOD_WINDOW_MS: f64 = 160.0;

/// Milliseconds between beats at the given tempo.
pub fn beat_interval_ms(bpm: f64) -> f64 {
    60_000.0 / bpm
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Perfect,
    Good,
}

/// Judge a tap by its timing error against the two windows. `None` means the
/// tap was outside both windows and must not be recorded anywhere.
pub fn judge_delta(delta_ms: f64, perfect_ms: f64, good_ms: f64) -> Option<Judgment> {
    let delta = delta_ms.abs();

    if delta <= perfect_ms {
        Some(Judgment::Perfect)
    } else if delta <= good_ms {
        Some(Judgment::Good)
    } else {
        None
    }
}

/// A recorded tap on a beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Absolute timing error, rounded to whole milliseconds.
    pub delta_ms: i64,
    pub judgment: Judgment,
}

/// One scheduled beat. `time_ms` is measured from the run epoch.
#[derive(Debug, Clone, Copy)]
pub struct Beat {
    pub time_ms: f64,
    pub hit: Option<Hit>,
}

/// The beat schedule of a single rhythm run, plus whatever taps have claimed
/// beats so far. Times are plain ms offsets, so everything here is testable
/// without a clock.
#[derive(Debug, Clone)]
pub struct BeatTrack {
    lead_in: usize,
    beats: Vec<Beat>,
}

impl BeatTrack {
    /// Lay out `lead_in + judged` beats at the given tempo, the first one
    /// `start_at_ms` into the run.
    pub fn new(bpm: f64, lead_in: usize, judged: usize, start_at_ms: f64) -> Self {
        let interval = beat_interval_ms(bpm);
        let beats = (0..lead_in + judged)
            .map(|i| Beat {
                time_ms: start_at_ms + i as f64 * interval,
                hit: None,
            })
            .collect();

        Self { lead_in, beats }
    }

    pub fn empty() -> Self {
        Self {
            lead_in: 0,
            beats: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn lead_in(&self) -> usize {
        self.lead_in
    }

    /// Lead-in beats are the countdown; they never receive a judgment.
    pub fn is_lead_in(&self, index: usize) -> bool {
        index < self.lead_in
    }

    /// Claim the nearest unclaimed judged beat for a tap at `now_ms`.
    ///
    /// Out-of-window taps claim nothing and the beat stays open; a miss only
    /// ever materializes at tally time as a beat nobody claimed.
    pub fn claim(&mut self, now_ms: f64) -> Option<(usize, Hit)> {
        let mut best: Option<(usize, f64)> = None;

        for (i, beat) in self.beats.iter().enumerate() {
            if i < self.lead_in || beat.hit.is_some() {
                continue;
            }

            let delta = (now_ms - beat.time_ms).abs();
            if best.map_or(true, |(_, d)| delta < d) {
                best = Some((i, delta));
            }
        }

        let (index, delta) = best?;
        let judgment = judge_delta(delta, PERFECT_WINDOW_MS, GOOD_WINDOW_MS)?;

        let hit = Hit {
            delta_ms: delta.round() as i64,
            judgment,
        };
        self.beats[index].hit = Some(hit);

        debug!(
            "Tap at {:.1}ms claimed beat {} ({:?}, {}ms off)..!",
            now_ms, index, hit.judgment, hit.delta_ms
        );

        Some((index, hit))
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally {
            judged: self.beats.len().saturating_sub(self.lead_in),
            ..Tally::default()
        };

        for beat in self.beats.iter().skip(self.lead_in) {
            match beat.hit.map(|h| h.judgment) {
                Some(Judgment::Perfect) => tally.perfect += 1,
                Some(Judgment::Good) => tally.good += 1,
                None => tally.miss += 1,
            }
        }

        tally
    }
}

/// Aggregate score of a rhythm run. Misses are inferred, never recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub perfect: usize,
    pub good: usize,
    pub miss: usize,
    pub judged: usize,
}

impl Tally {
    pub fn accuracy(&self) -> u32 {
        accuracy_percent(self.judged, self.perfect, self.good)
    }

    pub fn stars(&self) -> usize {
        stars_for_accuracy(self.accuracy())
    }
}

/// Perfects count full, Goods half, rounded to a whole percentage.
pub fn accuracy_percent(judged: usize, perfect: usize, good: usize) -> u32 {
    if judged == 0 {
        return 0;
    }

    (((perfect as f64 + 0.5 * good as f64) / judged as f64) * 100.0).round() as u32
}

pub fn stars_for_accuracy(accuracy: u32) -> usize {
    if accuracy >= 90 {
        3
    } else if accuracy >= 75 {
        2
    } else if accuracy >= 55 {
        1
    } else {
        0
    }
}

/// Star rating for the melody game, scored against how much of the song the
/// player got through.
pub fn stars_for_progress(score: usize, song_len: usize) -> usize {
    if song_len == 0 {
        return 0;
    }

    let len = song_len as f64;
    let score = score as f64;

    if score >= len * 0.9 {
        3
    } else if score >= len * 0.7 {
        2
    } else if score >= len * 0.5 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn judgment_windows() {
        assert_eq!(
            judge_delta(0.0, PERFECT_WINDOW_MS, GOOD_WINDOW_MS),
            Some(Judgment::Perfect)
        );
        assert_eq!(
            judge_delta(80.0, PERFECT_WINDOW_MS, GOOD_WINDOW_MS),
            Some(Judgment::Perfect)
        );
        assert_eq!(
            judge_delta(-80.0, PERFECT_WINDOW_MS, GOOD_WINDOW_MS),
            Some(Judgment::Perfect)
        );
        assert_eq!(
            judge_delta(80.1, PERFECT_WINDOW_MS, GOOD_WINDOW_MS),
            Some(Judgment::Good)
        );
        assert_eq!(
            judge_delta(160.0, PERFECT_WINDOW_MS, GOOD_WINDOW_MS),
            Some(Judgment::Good)
        );
        assert_eq!(judge_delta(160.1, PERFECT_WINDOW_MS, GOOD_WINDOW_MS), None);
        assert_eq!(judge_delta(5000.0, PERFECT_WINDOW_MS, GOOD_WINDOW_MS), None);
    }

    #[test]
    fn beat_times_are_monotonic() {
        let track = BeatTrack::new(90.0, 4, 16, 600.0);

        assert_eq!(track.len(), 20);
        for pair in track.beats().windows(2) {
            assert!(pair[0].time_ms < pair[1].time_ms);
        }
    }

    #[test]
    fn beat_interval_at_90_bpm() {
        assert!((beat_interval_ms(90.0) - 666.666_666_7).abs() < 0.001);
    }

    #[test]
    fn tap_near_fifth_judged_beat_is_perfect() {
        // 90 BPM, 4 lead-in + 16 judged; the fifth judged beat is index 8.
        let mut track = BeatTrack::new(90.0, 4, 16, 600.0);
        let beat_time = track.beats()[8].time_ms;

        let (index, hit) = track.claim(beat_time + 50.0).expect("tap should land");
        assert_eq!(index, 8);
        assert_eq!(hit.judgment, Judgment::Perfect);
        assert_eq!(hit.delta_ms, 50);
    }

    #[test]
    fn lead_in_beats_are_never_claimed() {
        let mut track = BeatTrack::new(90.0, 4, 16, 600.0);

        // Dead on the second lead-in beat; the nearest judged beat is three
        // intervals away, far outside both windows.
        let lead_time = track.beats()[1].time_ms;
        assert!(track.claim(lead_time).is_none());
        assert!(track.beats().iter().all(|b| b.hit.is_none()));
    }

    #[test]
    fn claimed_beats_yield_to_the_next_nearest() {
        let mut track = BeatTrack::new(60.0, 0, 3, 0.0);

        let (first, _) = track.claim(1030.0).unwrap();
        assert_eq!(first, 1);

        // Second tap near the same beat: beat 1 is taken, beat 2 is 910ms
        // away, so nothing within a window remains.
        assert!(track.claim(1090.0).is_none());

        let (third, hit) = track.claim(2100.0).unwrap();
        assert_eq!(third, 2);
        assert_eq!(hit.judgment, Judgment::Good);
    }

    #[test]
    fn equidistant_tap_claims_the_earlier_beat() {
        // 60 BPM with a tiny window-friendly spacing is impossible, so use a
        // fast tempo: beats 150ms apart, tap exactly between two of them.
        let mut track = BeatTrack::new(400.0, 0, 4, 0.0);

        let (index, hit) = track.claim(225.0).unwrap();
        assert_eq!(index, 1);
        assert_eq!(hit.delta_ms, 75);
        assert_eq!(hit.judgment, Judgment::Perfect);
    }

    #[test]
    fn out_of_window_tap_leaves_the_beat_open() {
        let mut track = BeatTrack::new(60.0, 0, 2, 0.0);

        assert!(track.claim(500.0).is_none());
        assert!(track.beats()[0].hit.is_none());
        assert!(track.beats()[1].hit.is_none());

        // The beat is still claimable afterwards.
        assert!(track.claim(20.0).is_some());
    }

    #[test]
    fn tally_infers_misses_from_unclaimed_beats() {
        let mut track = BeatTrack::new(60.0, 2, 4, 0.0);

        let base = track.beats()[2].time_ms;
        track.claim(base + 10.0).unwrap(); // Perfect on beat 2
        track.claim(base + 1000.0 + 120.0).unwrap(); // Good on beat 3

        let tally = track.tally();
        assert_eq!(tally.perfect, 1);
        assert_eq!(tally.good, 1);
        assert_eq!(tally.miss, 2);
        assert_eq!(tally.judged, 4);
    }

    #[test]
    fn accuracy_rounds_to_whole_percent() {
        assert_eq!(accuracy_percent(16, 7, 4), 56); // 56.25
        assert_eq!(accuracy_percent(16, 16, 0), 100);
        assert_eq!(accuracy_percent(16, 0, 0), 0);
        assert_eq!(accuracy_percent(0, 0, 0), 0);
        assert_eq!(accuracy_percent(13, 6, 1), 50); // 6.5 / 13
    }

    #[test]
    fn star_cutoffs() {
        assert_eq!(stars_for_accuracy(100), 3);
        assert_eq!(stars_for_accuracy(90), 3);
        assert_eq!(stars_for_accuracy(89), 2);
        assert_eq!(stars_for_accuracy(75), 2);
        assert_eq!(stars_for_accuracy(74), 1);
        assert_eq!(stars_for_accuracy(55), 1);
        assert_eq!(stars_for_accuracy(54), 0);
        assert_eq!(stars_for_accuracy(0), 0);
    }

    #[test]
    fn melody_stars_scale_with_song_length() {
        assert_eq!(stars_for_progress(13, 13), 3);
        assert_eq!(stars_for_progress(12, 13), 3); // 11.7 cutoff
        assert_eq!(stars_for_progress(11, 13), 2);
        assert_eq!(stars_for_progress(10, 13), 2); // 9.1 cutoff
        assert_eq!(stars_for_progress(7, 13), 1); // 6.5 cutoff
        assert_eq!(stars_for_progress(6, 13), 0);
        assert_eq!(stars_for_progress(0, 13), 0);
        assert_eq!(stars_for_progress(0, 0), 0);
    }
}
