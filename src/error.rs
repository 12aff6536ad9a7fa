//! Two-tier error classification for link processing.
//!
//! Every fallible step of discovery and refresh returns a [`LinkError`]
//! tagged either [`ErrorKind::Transient`] (retry on a later run, don't
//! penalize the link) or [`ErrorKind::Permanent`] (stop the current
//! attempt). Callers switch on [`LinkError::kind`], never on the message.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whether a failure is expected to heal on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network failure, 5xx, or "no feed this time". Retry later.
    Transient,
    /// Structural failure. Untagged errors land here.
    #[default]
    Permanent,
}

/// A classified failure with a human-readable message.
///
/// The message is rendered verbatim by the report next to the link title,
/// so it should read well on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub struct LinkError {
    #[serde(default)]
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Transient => write!(f, "TRANSIENT: {}", self.message),
            ErrorKind::Permanent => f.write_str(&self.message),
        }
    }
}

impl LinkError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Connection, DNS and TLS failures are all treated as temporary.
impl From<reqwest::Error> for LinkError {
    fn from(err: reqwest::Error) -> Self {
        LinkError::transient(format!("request failed: {err}"))
    }
}

impl From<url::ParseError> for LinkError {
    fn from(err: url::ParseError) -> Self {
        LinkError::permanent(format!("invalid URL: {err}"))
    }
}

impl From<quick_xml::Error> for LinkError {
    fn from(err: quick_xml::Error) -> Self {
        LinkError::permanent(format!("XML error: {err}"))
    }
}
