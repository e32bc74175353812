use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("Invalid URL in {field}: '{value}' ({reason})")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Static asset path must start and end with '/': {0}")]
    InvalidStaticPath(String),

    #[error("Unknown environment: {0}")]
    UnknownEnvironment(String),
}

pub type Result<T> = std::result::Result<T, EnvironmentError>;
