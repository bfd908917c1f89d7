//! Plain YIN fundamental frequency estimation.
//!
//! de Cheveigné & Kawahara (2002): difference function, cumulative mean
//! normalisation, absolute threshold, then parabolic refinement of the lag.
//! No probabilistic voicing and no cross-frame smoothing; see
//! [`super::pyin`] for that.

use crate::pitch::{Estimator, YinParams};

/// YIN estimator with a reusable work buffer.
///
/// The buffer only grows, so after the first frame of a given size the
/// difference pass runs without touching the allocator.
#[derive(Debug, Clone, Default)]
pub struct YinEstimator {
    params: YinParams,
    work: Vec<f32>,
}

impl YinEstimator {
    pub fn new(params: YinParams) -> Self {
        Self {
            params,
            work: Vec::new(),
        }
    }

    pub fn params(&self) -> YinParams {
        self.params
    }

    /// Returns the CMND of `frame` over lags `0..=max_lag`, or `None` if the
    /// frame cannot hold a single candidate lag.
    pub(crate) fn cmnd(&mut self, frame: &[f32], sample_rate: u32) -> Option<(&[f32], usize)> {
        if frame.is_empty() || sample_rate == 0 {
            return None;
        }
        let (min_lag, max_lag) = self.params.lag_range(sample_rate, frame.len());
        if max_lag < min_lag {
            return None;
        }
        self.work.clear();
        self.work.resize(max_lag + 1, 0.0);
        difference_function(frame, &mut self.work);
        cumulative_mean_normalized_difference(&mut self.work);
        Some((&self.work, min_lag))
    }
}

impl Estimator for YinEstimator {
    fn estimate(&mut self, frame: &[f32], sample_rate: u32) -> f32 {
        let threshold = self.params.threshold;
        let Some((cmnd, min_lag)) = self.cmnd(frame, sample_rate) else {
            return 0.0;
        };
        let Some(tau) = absolute_threshold(cmnd, min_lag, threshold) else {
            return 0.0;
        };
        let refined_tau = parabolic_interp(cmnd, tau);
        let frequency = sample_rate as f32 / refined_tau;
        if frequency.is_finite() && frequency > 0.0 {
            frequency
        } else {
            0.0
        }
    }
}

/// `d(tau) = Σ (x[j] - x[j + tau])²` for every lag in `out`.
fn difference_function(frame: &[f32], out: &mut [f32]) {
    let n = frame.len();
    out[0] = 0.0;
    for (tau, slot) in out.iter_mut().enumerate().skip(1) {
        *slot = frame[..n - tau]
            .iter()
            .zip(&frame[tau..])
            .map(|(a, b)| {
                let diff = a - b;
                diff * diff
            })
            .sum();
    }
}

/// In-place CMND. `d'(0)` is pinned to 1 and lags whose running sum is
/// still zero stay at 1, so silence never divides by zero.
fn cumulative_mean_normalized_difference(d: &mut [f32]) {
    d[0] = 1.0;
    let mut running_sum = 0.0;
    for (tau, value) in d.iter_mut().enumerate().skip(1) {
        running_sum += *value;
        *value = if running_sum > 0.0 {
            *value * tau as f32 / running_sum
        } else {
            1.0
        };
    }
}

/// First lag at or after `min_lag` whose CMND dips under `threshold`,
/// followed down to the bottom of that dip.
pub(crate) fn absolute_threshold(cmnd: &[f32], min_lag: usize, threshold: f32) -> Option<usize> {
    let mut tau = (min_lag..cmnd.len()).find(|&t| cmnd[t] < threshold)?;
    while tau + 1 < cmnd.len() && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }
    Some(tau)
}

/// Vertex of the parabola through `tau` and its neighbours. Edges reuse the
/// centre value; a flat neighbourhood keeps the integer lag.
pub(crate) fn parabolic_interp(cmnd: &[f32], tau: usize) -> f32 {
    let x1 = cmnd[tau];
    let x0 = if tau > 0 { cmnd[tau - 1] } else { x1 };
    let x2 = cmnd.get(tau + 1).copied().unwrap_or(x1);
    let denom = x0 + x2 - 2.0 * x1;
    if denom == 0.0 {
        tau as f32
    } else {
        tau as f32 + (x0 - x2) / (2.0 * denom)
    }
}
