//! Error types for the render-and-capture handler

use thiserror::Error;

/// Result type alias for handler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering and capturing a globe view
#[derive(Error, Debug)]
pub enum Error {
    /// The browser-automation session could not be started
    #[error("Session launch failed: {0}")]
    SessionLaunch(String),

    /// The visualization script could not be fetched or attached
    #[error("Script injection failed: {0}")]
    ScriptInjection(String),

    /// The in-page rendering script threw or reported an error
    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    /// Screenshot capture failed
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// The session worker went away or could not be reached
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of an [`Error`], used by the response layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SessionLaunch,
    ScriptInjection,
    Evaluation,
    Capture,
    Timeout,
    Config,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name, used in error response bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SessionLaunch => "session_launch",
            ErrorKind::ScriptInjection => "script_injection",
            ErrorKind::Evaluation => "evaluation",
            ErrorKind::Capture => "capture",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }

    /// HTTP status code reported to the caller for this kind of failure
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::SessionLaunch => 503,
            ErrorKind::ScriptInjection => 502,
            ErrorKind::Timeout => 504,
            ErrorKind::Evaluation
            | ErrorKind::Capture
            | ErrorKind::Config
            | ErrorKind::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SessionLaunch(_) => ErrorKind::SessionLaunch,
            Error::ScriptInjection(_) => ErrorKind::ScriptInjection,
            Error::Evaluation(_) => ErrorKind::Evaluation,
            Error::Capture(_) => ErrorKind::Capture,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::ConfigError(_) => ErrorKind::Config,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Evaluation(format!("malformed in-page payload: {}", err))
    }
}
