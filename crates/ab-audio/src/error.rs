use thiserror::Error;

/// Errors originating from the audio module.
#[derive(Error, Debug)]
pub enum AudioError {
    /// No compatible input device could be opened.
    ///
    /// Fatal to pipeline start, not to the process: callers may retry or exit.
    #[error("Source audio indisponible : {0}")]
    SourceUnavailable(String),

    /// Unsupported device sample format.
    #[error("Format audio non supporté : {0}")]
    UnsupportedFormat(String),

    /// Audio stream error.
    #[error("Erreur de stream audio : {0}")]
    StreamError(String),

    /// A per-frame computation failed on degenerate input.
    ///
    /// Never leaves the capture path: the pipeline substitutes zeroed
    /// features for that frame and counts the failure.
    #[error("Erreur de calcul transitoire : {0}")]
    TransientCompute(String),
}
