use thiserror::Error;

/// Errors surfaced by the pitch-tracking core.
///
/// The estimator itself never fails; these cover the audio ports, the
/// configuration and the analysis run lifecycle.
#[derive(Error, Debug)]
pub enum PitchError {
    #[error("No audio track found: {0}")]
    NoAudioTrack(String),

    #[error("Audio source error: {0}")]
    Source(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("An analysis run is already active")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, PitchError>;
