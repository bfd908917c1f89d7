//! Comparing live pitch against the reference contour.

use crate::analysis::{Contour, LivePitch};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Closeness of two pitches on `[0, 1]`.
///
/// 1 for the same pitch, falling linearly with the semitone distance and
/// reaching 0 at an octave. Unvoiced input scores 0.
pub fn similarity(reference_hz: f32, live_hz: f32) -> f32 {
    if reference_hz <= 0.0 || live_hz <= 0.0 {
        return 0.0;
    }
    let semitones = 12.0 * (reference_hz / live_hz).log2();
    (1.0 - semitones.abs() / 12.0).clamp(0.0, 1.0)
}

/// Signed deviation of `user_hz` from `reference_hz` in cents. NaN when
/// either pitch is unvoiced.
pub fn cents_deviation(reference_hz: f32, user_hz: f32) -> f32 {
    if reference_hz <= 0.0 || user_hz <= 0.0 {
        return f32::NAN;
    }
    1200.0 * (user_hz / reference_hz).log2()
}

/// Fractional MIDI note number, or 0 for unvoiced input.
pub fn hz_to_midi(hz: f32) -> f32 {
    if hz <= 0.0 {
        return 0.0;
    }
    69.0 + 12.0 * (hz / 440.0).log2()
}

/// Scientific pitch name such as `A4` or `C#-1`.
pub fn midi_to_note_name(midi: i32) -> String {
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    format!("{name}{octave}")
}

/// Name of the equal-tempered note closest to `hz`.
pub fn nearest_note_name(hz: f32) -> Option<String> {
    if !(hz.is_finite() && hz > 0.0) {
        return None;
    }
    Some(midi_to_note_name(hz_to_midi(hz).round() as i32))
}

/// A live estimate scored against the reference point nearest in time.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchMatch {
    pub time_sec: f64,
    pub reference_hz: f32,
    pub live_hz: f32,
    pub similarity: f32,
    /// NaN where the reference is unvoiced.
    pub cents: f32,
    pub note: Option<String>,
}

impl PitchMatch {
    pub fn reference_voiced(&self) -> bool {
        self.reference_hz > 0.0
    }
}

/// Score one live estimate. `None` for an empty contour or unvoiced input.
pub fn score(contour: &Contour, live: &LivePitch) -> Option<PitchMatch> {
    if live.frequency_hz <= 0.0 {
        return None;
    }
    let reference = contour.nearest(live.time_sec)?;
    Some(PitchMatch {
        time_sec: live.time_sec,
        reference_hz: reference.frequency_hz,
        live_hz: live.frequency_hz,
        similarity: similarity(reference.frequency_hz, live.frequency_hz),
        cents: cents_deviation(reference.frequency_hz, live.frequency_hz),
        note: nearest_note_name(live.frequency_hz),
    })
}

/// Running totals over a practice session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionScore {
    matches: usize,
    similarity_sum: f64,
    voiced_matches: usize,
    abs_cents_sum: f64,
}

impl SessionScore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, m: &PitchMatch) {
        self.matches += 1;
        self.similarity_sum += m.similarity as f64;
        if m.cents.is_finite() {
            self.voiced_matches += 1;
            self.abs_cents_sum += m.cents.abs() as f64;
        }
    }

    pub fn matches(&self) -> usize {
        self.matches
    }

    /// Mean similarity over all matches, 0 before the first one.
    pub fn mean_similarity(&self) -> f32 {
        if self.matches == 0 {
            return 0.0;
        }
        (self.similarity_sum / self.matches as f64) as f32
    }

    /// Mean absolute deviation over matches against a voiced reference.
    pub fn mean_abs_cents(&self) -> Option<f32> {
        (self.voiced_matches > 0).then(|| (self.abs_cents_sum / self.voiced_matches as f64) as f32)
    }
}
