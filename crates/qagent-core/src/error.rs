use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Generation timed out after {attempts} attempt(s)")]
    GenerationTimeout { attempts: u32 },

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Selector resolution failed: {0}")]
    SelectorResolution(String),

    #[error("Page unparsable: {0}")]
    PageUnparsable(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Incompatible index: found {found}, expected {expected}")]
    IncompatibleIndex { found: String, expected: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::GenerationTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
