//! Probabilistic YIN variant.
//!
//! Shares the CMND computation with [`YinEstimator`] but replaces the single
//! absolute threshold with a small threshold distribution, and picks among
//! the resulting candidates with a continuity prior on the previous voiced
//! pitch. Stateful across frames, so frames must be fed in order.

use crate::pitch::yin::{YinEstimator, parabolic_interp};
use crate::pitch::{Estimator, YinParams};
use tracing::trace;

/// Number of thresholds in the distribution, spread evenly over
/// `(0, 2 * threshold]` so its mean is the configured threshold.
const N_THRESHOLDS: usize = 20;

/// Frames quieter than this (about -60 dBFS) are unvoiced without analysis.
const SILENCE_RMS: f32 = 1e-3;

/// Minimum combined score for a frame to count as voiced.
const VOICED_SCORE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    f0: f32,
    prob: f32,
}

#[derive(Debug, Clone)]
pub struct ProbabilisticYin {
    yin: YinEstimator,
    sigma: f32,
    previous_f0: Option<f32>,
    candidates: Vec<Candidate>,
}

impl ProbabilisticYin {
    pub fn new(params: YinParams, sigma: f32) -> Self {
        Self {
            yin: YinEstimator::new(params),
            sigma,
            previous_f0: None,
            candidates: Vec::with_capacity(N_THRESHOLDS),
        }
    }

    pub fn previous_f0(&self) -> Option<f32> {
        self.previous_f0
    }
}

/// Simple RMS energy of a frame, used for silence detection.
fn frame_rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|x| x * x).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

/// For each threshold, the first CMND local minimum below it receives that
/// threshold's share of probability.
///
/// Minima are visited in lag order while tracking the deepest one seen so
/// far: a minimum is first below exactly the thresholds that lie above its
/// own value and at or under that running floor. Nothing is allocated
/// besides what `out` already holds.
fn find_pitch_candidates(
    cmnd: &[f32],
    min_lag: usize,
    threshold: f32,
    sample_rate: u32,
    out: &mut Vec<Candidate>,
) {
    out.clear();
    let share = 1.0 / N_THRESHOLDS as f32;
    let mut floor = f32::INFINITY;

    for tau in min_lag.max(1)..cmnd.len() {
        let v = cmnd[tau];
        let is_minimum = v < cmnd[tau - 1] && cmnd.get(tau + 1).is_none_or(|&next| v <= next);
        if !is_minimum || v >= floor {
            continue;
        }
        let captured = (1..=N_THRESHOLDS)
            .map(|i| 2.0 * threshold * i as f32 / N_THRESHOLDS as f32)
            .filter(|&t| v < t && t <= floor)
            .count();
        floor = v;
        if captured == 0 {
            continue;
        }

        let refined_tau = parabolic_interp(cmnd, tau);
        let f0 = sample_rate as f32 / refined_tau;
        if f0.is_finite() && f0 > 0.0 {
            out.push(Candidate {
                f0,
                prob: (captured as f32 * share).clamp(0.0, 1.0),
            });
        }
    }
}

/// Weight each candidate by a Gaussian (in octaves) around the previous
/// pitch, rejecting octave and subharmonic jumps outright.
fn probabilistic_f0_selection(
    candidates: &[Candidate],
    sigma: f32,
    previous_f0: Option<f32>,
) -> Option<(f32, f32)> {
    let sigma2 = sigma * sigma;
    let mut best: Option<(f32, f32)> = None;

    for candidate in candidates {
        let continuity = match previous_f0 {
            Some(pf0) if pf0 > 0.0 => {
                let ratio = candidate.f0 / pf0;
                if !(0.7..=1.5).contains(&ratio) {
                    continue;
                }
                let octave_distance = ratio.log2();
                (-0.5 * (octave_distance * octave_distance) / sigma2).exp()
            }
            _ => 1.0,
        };
        let score = candidate.prob * continuity;
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate.f0, score));
        }
    }
    best
}

impl Estimator for ProbabilisticYin {
    fn estimate(&mut self, frame: &[f32], sample_rate: u32) -> f32 {
        if frame_rms(frame) < SILENCE_RMS {
            self.previous_f0 = None;
            return 0.0;
        }

        let params = self.yin.params();
        let Some((cmnd, min_lag)) = self.yin.cmnd(frame, sample_rate) else {
            self.previous_f0 = None;
            return 0.0;
        };
        find_pitch_candidates(
            cmnd,
            min_lag,
            params.threshold,
            sample_rate,
            &mut self.candidates,
        );

        let selected = probabilistic_f0_selection(&self.candidates, self.sigma, self.previous_f0);
        trace!(candidates = self.candidates.len(), ?selected, "pYIN frame");

        match selected {
            Some((f0, score))
                if score > VOICED_SCORE
                    && f0 >= params.min_freq * 0.8
                    && f0 <= params.max_freq * 1.2 =>
            {
                self.previous_f0 = Some(f0);
                f0
            }
            _ => {
                self.previous_f0 = None;
                0.0
            }
        }
    }

    fn reset(&mut self) {
        self.previous_f0 = None;
    }
}
