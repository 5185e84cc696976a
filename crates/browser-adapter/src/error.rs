use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// High-level error categories surfaced by the page driver.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DriverErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("browser i/o failure")]
    Io,
    #[error("frame capture failed")]
    CaptureFailed,
    #[error("operation not supported by this driver")]
    Unsupported,
    #[error("internal error")]
    Internal,
}

/// Enriched error metadata passed back to the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}

impl DriverError {
    pub fn new(kind: DriverErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: false,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_the_hint() {
        let err = DriverError::new(DriverErrorKind::NavTimeout)
            .with_hint("https://example.com")
            .retriable(true);
        assert_eq!(err.to_string(), "navigation timed out: https://example.com");
        assert!(err.retriable);
    }

    #[test]
    fn bare_kind_displays_alone() {
        let err = DriverError::new(DriverErrorKind::CaptureFailed);
        assert_eq!(err.to_string(), "frame capture failed");
    }
}
