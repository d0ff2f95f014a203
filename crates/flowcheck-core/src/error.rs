use std::path::PathBuf;

/// The module root could not be scanned. Fatal for the run that hit it.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("module path does not exist: {0}")]
    Missing(PathBuf),

    #[error("module path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("module path is unreadable: {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("invalid role pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// One file could not be turned into contracts. Recovered per file.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("{path} is {size} bytes, over the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("{0} is not valid UTF-8")]
    NotUtf8(String),

    #[error("{path} has a syntax error near line {line}")]
    Malformed { path: String, line: u32 },

    #[error("parsing {0} exceeded the time limit")]
    Timeout(String),

    #[error("unsupported source language for {0}")]
    UnsupportedLanguage(String),

    #[error("language error: {0}")]
    Language(String),
}

impl ExtractionError {
    /// Line to attach to the resulting finding.
    pub fn line(&self) -> u32 {
        match self {
            ExtractionError::Malformed { line, .. } => *line,
            _ => 1,
        }
    }
}

/// Raised only when the comparator is handed a triple that does not share an event.
#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("producer event `{producer}` does not match consumer event `{consumer}`")]
    EventMismatch { producer: String, consumer: String },
}
