use thiserror::Error;

/// Failures raised by the chime core. Only `InvalidArgument` is ever returned
/// to a caller; the others are logged where they happen and absorbed.
#[derive(Debug, Error)]
pub enum ChimeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("preference query failed: {0}")]
    PreferenceQueryFailure(String),

    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),

    #[error("status publish failed: {0}")]
    StatusPublishFailure(String),
}
