use thiserror::Error;

/// Errors originating from the core module.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration value or structure.
    #[error("Configuration invalide : {0}")]
    Config(String),

    /// A numeric option is outside the range the pipeline can work with.
    #[error("Valeur hors limites pour {field} : {value}")]
    OutOfRange {
        /// Name of the offending option.
        field: &'static str,
        /// Value as written in the source.
        value: String,
    },
}
