// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared across the analyzer runtime.

use std::fmt;

/// Errors returned by sdr-core operations.
///
/// Every failure mode named in the wire protocol and concurrency model has a
/// dedicated variant so callers can match on cause rather than parse strings.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// Any OS-level socket, pipe, or poll failure.
    Io(std::io::Error),
    /// The wait aborted because its cancellation source fired first.
    Cancelled,
    /// A bounded wait exceeded its deadline.
    Timedout,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// PDU magic mismatch, truncated stream, or post-inflate size mismatch.
    MalformedPdu,
    /// Peer hello advertised an incompatible protocol version.
    ProtocolVersion { major: u8, minor: u8 },
    /// `sf_type` has no registered multicast sub-processor.
    UnknownSuperframeType(u8),

    // ========================================================================
    // Authentication Errors
    // ========================================================================
    /// The client's auth token did not match the expected challenge response.
    AuthRejected,

    // ========================================================================
    // Analyzer Lifecycle Errors
    // ========================================================================
    /// The shared analyzer instance failed to start.
    StartupError(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// An allocation or handle-space probe failed; abort the current request.
    ResourceExhausted,
    /// A client or server lookup referenced an id that no longer exists.
    NotFound(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(inner) => write!(f, "I/O error: {inner}"),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Timedout => write!(f, "operation timed out"),
            Error::MalformedPdu => write!(f, "malformed PDU"),
            Error::ProtocolVersion { major, minor } => {
                write!(f, "unsupported protocol version {major}.{minor}")
            }
            Error::UnknownSuperframeType(sf_type) => {
                write!(f, "unknown superframe type {sf_type}")
            }
            Error::AuthRejected => write!(f, "authentication rejected"),
            Error::StartupError(reason) => write!(f, "analyzer startup failed: {reason}"),
            Error::ResourceExhausted => write!(f, "resource exhausted"),
            Error::NotFound(what) => write!(f, "{what} not found"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(inner: std::io::Error) -> Self {
        match inner.kind() {
            std::io::ErrorKind::TimedOut => Error::Timedout,
            _ => Error::Io(inner),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_variants_are_human_readable() {
        assert_eq!(format!("{}", Error::MalformedPdu), "malformed PDU");
        assert_eq!(
            format!("{}", Error::ProtocolVersion { major: 1, minor: 2 }),
            "unsupported protocol version 1.2"
        );
        assert_eq!(
            format!("{}", Error::UnknownSuperframeType(7)),
            "unknown superframe type 7"
        );
    }

    #[test]
    fn io_timeout_maps_to_timedout_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline exceeded");
        match Error::from(io_err) {
            Error::Timedout => {}
            other => panic!("expected Timedout, got {other:?}"),
        }
    }
}
