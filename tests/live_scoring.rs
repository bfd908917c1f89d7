//! End-to-end scoring: a reference contour from one recording, a replayed
//! performance tracked live and compared point by point.

use std::sync::mpsc;
use std::time::Duration;

use pitchmatch::audio::f32_to_pcm16;
use pitchmatch::score::{self, similarity};
use pitchmatch::{
    AnalysisConfig, CancelToken, Contour, ContourBuilder, LiveConfig, LivePitch, LiveTracker,
    MemoryCapture, MemorySource, SessionScore,
};

const SR: u32 = 44100;
const CHUNK: usize = 2048;

/// A phrase of whole chunks, one frequency per chunk (0 for a rest).
fn phrase(notes: &[f32]) -> Vec<f32> {
    notes
        .iter()
        .flat_map(|&f| {
            (0..CHUNK).map(move |n| {
                if f > 0.0 {
                    0.5 * (2.0 * std::f32::consts::PI * f * n as f32 / SR as f32).sin()
                } else {
                    0.0
                }
            })
        })
        .collect()
}

fn reference_contour(signal: &[f32]) -> anyhow::Result<Contour> {
    let mut builder = ContourBuilder::new(AnalysisConfig::default())?;
    Ok(builder.build(
        &mut MemorySource::from_f32(signal, SR, 1),
        &CancelToken::new(),
        |_| {},
    )?)
}

/// Replay `signal` through a live tracker and collect every voiced chunk.
fn track(signal: &[f32], expected: usize) -> anyhow::Result<Vec<LivePitch>> {
    let pcm: Vec<i16> = signal.iter().copied().map(f32_to_pcm16).collect();
    let (tx, rx) = mpsc::channel();
    let mut tracker = LiveTracker::new(LiveConfig::default())?;
    tracker.start(MemoryCapture::new(pcm, SR), move |p| {
        let _ = tx.send(p);
    })?;

    let mut pitches = Vec::new();
    for _ in 0..expected {
        pitches.push(rx.recv_timeout(Duration::from_secs(5))?);
    }
    tracker.stop();
    tracker.join();
    Ok(pitches)
}

#[test]
fn matching_performance_scores_high() -> anyhow::Result<()> {
    let notes = [220.0, 247.0, 0.0, 262.0, 294.0];
    let signal = phrase(&notes);
    let contour = reference_contour(&signal)?;

    let pitches = track(&signal, 4)?;
    let mut session = SessionScore::new();
    for pitch in &pitches {
        let m = score::score(&contour, pitch)
            .ok_or_else(|| anyhow::anyhow!("no match at {} s", pitch.time_sec))?;
        session.add(&m);
    }
    assert_eq!(session.matches(), 4);
    assert!(
        session.mean_similarity() > 0.9,
        "mean similarity {}",
        session.mean_similarity()
    );
    Ok(())
}

#[test]
fn transposed_performance_scores_lower() -> anyhow::Result<()> {
    let reference = phrase(&[220.0, 220.0, 220.0]);
    // Two semitones sharp throughout
    let performance = phrase(&[246.94, 246.94, 246.94]);
    let contour = reference_contour(&reference)?;

    let mut session = SessionScore::new();
    for pitch in track(&performance, 3)? {
        if let Some(m) = score::score(&contour, &pitch) {
            assert!((m.cents - 200.0).abs() < 20.0, "{} cents", m.cents);
            session.add(&m);
        }
    }
    let expected = similarity(220.0, 246.94);
    assert!((session.mean_similarity() - expected).abs() < 0.02);
    assert!(session.mean_similarity() < 0.9);
    Ok(())
}

#[test]
fn live_times_line_up_with_contour_times() -> anyhow::Result<()> {
    let signal = phrase(&[330.0, 0.0, 330.0]);
    let pitches = track(&signal, 2)?;
    assert_eq!(pitches[0].time_sec, 0.0);
    assert!((pitches[1].time_sec - (2 * CHUNK) as f64 / SR as f64).abs() < 1e-9);
    Ok(())
}
