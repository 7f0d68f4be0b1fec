//! Error types for the dumbarb crate.
//!
//! This module defines the error hierarchy used throughout the arbiter,
//! from the GTP transport up to the match runner.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors that can arise from a single GTP exchange.
///
/// These map onto the transport-level error kinds: a deadline that fired,
/// a child whose pipe closed, a frame that didn't parse, or a `?`-prefixed
/// engine response.
#[derive(Debug)]
pub enum GtpError {
    /// The deadline passed before a complete response frame arrived.
    Timeout,
    /// The child's stdout closed (process exited or pipe broke).
    ChannelClosed,
    /// A response was received but didn't parse as a GTP frame.
    MalformedFrame(String),
    /// The engine replied with a `?`-prefixed error.
    EngineError(String),
    /// A cancellation token was tripped while waiting.
    Cancelled,
    Io(io::Error),
}

impl fmt::Display for GtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GtpError::Timeout => write!(f, "timed out waiting for response"),
            GtpError::ChannelClosed => write!(f, "engine process closed its output"),
            GtpError::MalformedFrame(body) => write!(f, "malformed GTP frame: {body}"),
            GtpError::EngineError(body) => write!(f, "engine error: {body}"),
            GtpError::Cancelled => write!(f, "cancelled"),
            GtpError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl Error for GtpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GtpError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for GtpError {
    fn from(err: io::Error) -> Self {
        GtpError::Io(err)
    }
}

/// Top-level error type for match and game orchestration.
#[derive(Debug)]
pub enum DumbarbError {
    /// A GTP exchange failed in a way the caller couldn't recover from locally.
    Gtp(GtpError),
    /// A supervisor could not start or restart its engine.
    Supervisor(String),
    /// Match configuration was invalid.
    Config(String),
    /// Filesystem/artifact I/O failed.
    Io(io::Error),
}

impl fmt::Display for DumbarbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumbarbError::Gtp(err) => write!(f, "GTP error: {err}"),
            DumbarbError::Supervisor(msg) => write!(f, "supervisor error: {msg}"),
            DumbarbError::Config(msg) => write!(f, "configuration error: {msg}"),
            DumbarbError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl Error for DumbarbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DumbarbError::Gtp(err) => Some(err),
            DumbarbError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DumbarbError {
    fn from(err: io::Error) -> Self {
        DumbarbError::Io(err)
    }
}

impl From<GtpError> for DumbarbError {
    fn from(err: GtpError) -> Self {
        DumbarbError::Gtp(err)
    }
}

/// Convenience alias for `Result<T, GtpError>`.
pub type GtpResult<T> = std::result::Result<T, GtpError>;

/// Convenience alias for `Result<T, DumbarbError>`.
pub type Result<T> = std::result::Result<T, DumbarbError>;
