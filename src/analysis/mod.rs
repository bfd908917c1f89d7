//! Offline contour building and live tracking on top of the estimators.

pub mod builder;
pub mod contour;
pub mod live;

pub use builder::{ContourBuilder, ReferenceAnalyzer, analyze_signal};
pub use contour::{Contour, PitchPoint};
pub use live::{LivePitch, LiveTracker};

use crate::error::{PitchError, Result};
use crate::pitch::{EstimatorKind, FRAME_SIZE, HOP_SIZE, YinParams};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// Live capture defaults
pub const LIVE_CHUNK_SIZE: usize = 2048;
pub const LIVE_SAMPLE_RATE: u32 = 44100;

/// Settings for one offline analysis run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub estimator: EstimatorKind,
    pub params: YinParams,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_size: FRAME_SIZE,
            hop_size: HOP_SIZE,
            estimator: EstimatorKind::default(),
            params: YinParams::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_size == 0 {
            return Err(PitchError::InvalidConfig("frame size must be > 0".into()));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(PitchError::InvalidConfig(format!(
                "hop size {} must be in 1..={}",
                self.hop_size, self.frame_size
            )));
        }
        validate_params(&self.params)
    }
}

/// Settings for a live tracking session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveConfig {
    /// Samples per blocking read; each read is estimated as one frame.
    pub chunk_size: usize,
    pub estimator: EstimatorKind,
    pub params: YinParams,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            chunk_size: LIVE_CHUNK_SIZE,
            estimator: EstimatorKind::default(),
            params: YinParams::default(),
        }
    }
}

impl LiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PitchError::InvalidConfig("chunk size must be > 0".into()));
        }
        validate_params(&self.params)
    }
}

fn validate_params(params: &YinParams) -> Result<()> {
    if !(params.threshold > 0.0) {
        return Err(PitchError::InvalidConfig(format!(
            "threshold {} must be > 0",
            params.threshold
        )));
    }
    if !(params.min_freq > 0.0 && params.min_freq < params.max_freq) {
        return Err(PitchError::InvalidConfig(format!(
            "frequency range {}..{} Hz is empty",
            params.min_freq, params.max_freq
        )));
    }
    Ok(())
}

/// Cooperative cancellation flag, checked between chunks and frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Messages from an offline analysis run to its caller.
///
/// A run sends zero or more `Progress` values followed by exactly one
/// `Completed` or `Failed`.
#[derive(Debug)]
pub enum AnalysisEvent {
    Progress(u8),
    Completed(Contour),
    Failed(PitchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configs_validate() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(LiveConfig::default().validate().is_ok());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let bad_hop = AnalysisConfig {
            hop_size: FRAME_SIZE + 1,
            ..Default::default()
        };
        assert!(matches!(bad_hop.validate(), Err(PitchError::InvalidConfig(_))));

        let mut bad_range = AnalysisConfig::default();
        bad_range.params.min_freq = 3000.0;
        assert!(bad_range.validate().is_err());

        let mut bad_threshold = LiveConfig::default();
        bad_threshold.params.threshold = f32::NAN;
        assert!(bad_threshold.validate().is_err());

        let no_chunk = LiveConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(no_chunk.validate().is_err());
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
