//! Pitch tracking for singing practice.
//!
//! A reference vocal is analysed offline into a [`Contour`]; a live input is
//! tracked chunk by chunk with [`LiveTracker`]; [`score`] compares the two.

pub mod analysis;
pub mod audio;
pub mod error;
pub mod pitch;
pub mod score;

pub use analysis::{
    AnalysisConfig, AnalysisEvent, CancelToken, Contour, ContourBuilder, LiveConfig, LivePitch,
    LiveTracker, PitchPoint, ReferenceAnalyzer, analyze_signal,
};
pub use audio::capture::{CaptureSource, MemoryCapture};
pub use audio::file::WavSource;
pub use audio::{AudioFrameSource, MemorySource, SourceMeta};
pub use error::{PitchError, Result};
pub use pitch::{Estimator, EstimatorKind, YinParams};
pub use score::{PitchMatch, SessionScore};
