use std::str::FromStr;

pub mod framer;
pub mod pyin;
pub mod yin;

pub use framer::Framer;
pub use pyin::ProbabilisticYin;
pub use yin::YinEstimator;

// Framing defaults, tuned for 44.1 kHz input
pub const FRAME_SIZE: usize = 2048;
pub const HOP_SIZE: usize = 512;

// Estimator defaults
pub const YIN_THRESHOLD: f32 = 0.15;
pub const MIN_F0: f32 = 70.0;
pub const MAX_F0: f32 = 2000.0;

// Only used by the probabilistic variant
pub const PYIN_SIGMA: f32 = 0.2;

/// Tuning shared by every estimator strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YinParams {
    /// Absolute CMND threshold below which a lag counts as periodic.
    pub threshold: f32,
    pub min_freq: f32,
    pub max_freq: f32,
}

impl Default for YinParams {
    fn default() -> Self {
        Self {
            threshold: YIN_THRESHOLD,
            min_freq: MIN_F0,
            max_freq: MAX_F0,
        }
    }
}

impl YinParams {
    /// Lag search range `(min_lag, max_lag)` for a frame of `frame_len` samples.
    pub fn lag_range(&self, sample_rate: u32, frame_len: usize) -> (usize, usize) {
        let sr = sample_rate as f32;
        let max_lag = ((sr / self.min_freq) as usize).min(frame_len / 2);
        let min_lag = ((sr / self.max_freq) as usize).max(2);
        (min_lag, max_lag)
    }
}

/// Per-frame fundamental frequency estimation.
///
/// Implementations return the estimate in Hz, or `0.0` when the frame is
/// unvoiced. They never fail and never return negative values.
pub trait Estimator: Send {
    fn estimate(&mut self, frame: &[f32], sample_rate: u32) -> f32;

    /// Forget any state carried between frames.
    fn reset(&mut self) {}
}

impl<E: Estimator + ?Sized> Estimator for Box<E> {
    fn estimate(&mut self, frame: &[f32], sample_rate: u32) -> f32 {
        (**self).estimate(frame, sample_rate)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Selectable estimation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EstimatorKind {
    #[default]
    Yin,
    ProbabilisticYin,
}

impl EstimatorKind {
    pub fn build(self, params: YinParams) -> Box<dyn Estimator> {
        match self {
            EstimatorKind::Yin => Box::new(YinEstimator::new(params)),
            EstimatorKind::ProbabilisticYin => Box::new(ProbabilisticYin::new(params, PYIN_SIGMA)),
        }
    }

    /// True when each frame's estimate depends on that frame alone, so
    /// frames can be estimated in any order.
    pub fn is_frame_independent(self) -> bool {
        matches!(self, EstimatorKind::Yin)
    }
}

impl FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yin" => Ok(EstimatorKind::Yin),
            "pyin" | "probabilistic" => Ok(EstimatorKind::ProbabilisticYin),
            _ => Err(format!("Invalid estimator: {}", s)),
        }
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimatorKind::Yin => write!(f, "yin"),
            EstimatorKind::ProbabilisticYin => write!(f, "pyin"),
        }
    }
}
