//! Error types for frame decoding, encoding and gateway operation.
//!
//! All errors implement the `std::error::Error` trait and carry enough context
//! to be logged or shown to an operator without further lookups.
//!
//! ## Error Categories
//!
//! - **Decode Errors**: an inbound buffer is not a 14 byte CoE frame
//! - **Encode Errors**: index or value outside the documented range, writes to
//!   an immutable frame, or writes that would mix two frames into one
//! - **File Errors**: dump or schema files that cannot be read or written
//! - **Parse Errors**: schema, dump or command text that does not parse
//! - **Transport Errors**: socket failures in the UDP provider or sender
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use coelink::CoeError;
//!
//! let error = CoeError::transport_failed("socket closed");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! Encode errors are never retryable: they describe a frame the caller should
//! not have tried to build.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::ChannelKind;

/// Result type alias for CoE operations.
pub type Result<T, E = CoeError> = std::result::Result<T, E>;

/// Main error type for CoE operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CoeError {
    #[error("Malformed frame: expected 14 bytes, got {len}")]
    MalformedFrame { len: usize },

    #[error("{what} {index} out of range ({min}..={max})")]
    IndexOutOfRange { what: &'static str, index: usize, min: usize, max: usize },

    #[error("{what} out of range: {details}")]
    ValueOutOfRange { what: &'static str, details: String },

    #[error("Frame is not mutable")]
    NotMutable,

    #[error("Frame number already set to {current}, cannot change it to {requested}")]
    ConflictingFrameNumber { current: u8, requested: u8 },

    #[error("Node already set to {current}, cannot change it to {requested}")]
    ConflictingNode { current: u8, requested: u8 },

    #[error("Frame with selector {selector} is not a {expected} frame")]
    WrongFrameKind { expected: ChannelKind, selector: u8 },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl CoeError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoeError::Transport { .. } => true,
            CoeError::File { .. } => true,
            CoeError::MalformedFrame { .. } => false,
            CoeError::IndexOutOfRange { .. } => false,
            CoeError::ValueOutOfRange { .. } => false,
            CoeError::NotMutable => false,
            CoeError::ConflictingFrameNumber { .. } => false,
            CoeError::ConflictingNode { .. } => false,
            CoeError::WrongFrameKind { .. } => false,
            CoeError::Parse { .. } => false,
            CoeError::Config { .. } => false,
        }
    }

    /// Returns whether this error describes a misuse of the frame encode API.
    pub fn is_encode_error(&self) -> bool {
        matches!(
            self,
            CoeError::IndexOutOfRange { .. }
                | CoeError::ValueOutOfRange { .. }
                | CoeError::NotMutable
                | CoeError::ConflictingFrameNumber { .. }
                | CoeError::ConflictingNode { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            CoeError::MalformedFrame { .. } => vec![
                "Check the sender emits 14 byte CoE frames",
                "Verify nothing else is sending to the CoE port",
            ],
            CoeError::IndexOutOfRange { .. } => vec![
                "Analogue slots are 1-4 per frame, channels 1-16 for sending",
                "Digital channels are 1-32, bits 1-16 per map",
            ],
            CoeError::ValueOutOfRange { .. } => vec![
                "Scaled analogue values must fit into 0-65535",
                "Use 0-2 decimals",
                "Frame selectors are 0-9",
            ],
            CoeError::NotMutable => vec!["Build outbound frames with Frame::outbound()"],
            CoeError::ConflictingFrameNumber { .. } => {
                vec!["Use a new frame for channels that live in another frame number or map"]
            }
            CoeError::ConflictingNode { .. } => vec!["Use a new frame for each node"],
            CoeError::WrongFrameKind { .. } => {
                vec!["Check is_analogue()/is_digital() before reading a frame"]
            }
            CoeError::File { .. } => vec![
                "Check the file exists and is readable",
                "Check directory permissions for the dump file",
                "Ensure sufficient disk space",
            ],
            CoeError::Parse { .. } => vec![
                "Check the document format",
                "Node and channel keys must be numbers between 0 and 255",
            ],
            CoeError::Transport { .. } => vec![
                "Check the listen address is free",
                "Verify network connectivity to the CoE device",
            ],
            CoeError::Config { .. } => vec!["Fix the configuration file and restart"],
        }
    }

    /// Helper constructor for index range errors.
    pub fn index_out_of_range(
        what: &'static str,
        index: impl Into<usize>,
        min: usize,
        max: usize,
    ) -> Self {
        CoeError::IndexOutOfRange { what, index: index.into(), min, max }
    }

    /// Helper constructor for value range errors.
    pub fn value_out_of_range(what: &'static str, details: impl Into<String>) -> Self {
        CoeError::ValueOutOfRange { what, details: details.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoeError::File { path: path.into(), source }
    }

    /// Helper constructor for parse errors.
    pub fn parse_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        CoeError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        CoeError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        CoeError::Transport { reason: reason.into(), source: Some(source.into()) }
    }
}

impl From<std::io::Error> for CoeError {
    fn from(err: std::io::Error) -> Self {
        CoeError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
          #[test]
          fn error_messages_carry_their_context(
            reason in ".*",
            index in 0usize..300,
            current in any::<u8>(),
            requested in any::<u8>(),
            len in 0usize..2048,
            details in ".*"
          ) {
            let transport = CoeError::transport_failed(reason.clone());
            prop_assert!(transport.to_string().contains(&reason));

            let index_err = CoeError::index_out_of_range("digital index", index, 1, 32);
            prop_assert!(index_err.to_string().contains(&index.to_string()));

            let conflict = CoeError::ConflictingNode { current, requested };
            let msg = conflict.to_string();
            prop_assert!(msg.contains(&current.to_string()));
            prop_assert!(msg.contains(&requested.to_string()));

            let malformed = CoeError::MalformedFrame { len };
            prop_assert!(malformed.to_string().contains(&len.to_string()));

            let value = CoeError::value_out_of_range("raw magnitude", details.clone());
            prop_assert!(value.to_string().contains(&details));
          }
        }
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<CoeError>();

        let error = CoeError::NotMutable;
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn encode_errors_are_not_retryable() {
        let errors = [
            CoeError::NotMutable,
            CoeError::ConflictingFrameNumber { current: 1, requested: 2 },
            CoeError::ConflictingNode { current: 3, requested: 4 },
            CoeError::index_out_of_range("analogue slot", 5usize, 1, 4),
            CoeError::value_out_of_range("decimals", "3"),
        ];

        for error in &errors {
            assert!(error.is_encode_error(), "{error} should be an encode error");
            assert!(!error.is_retryable(), "{error} should not be retryable");
            assert!(!error.recovery_suggestions().is_empty());
        }

        assert!(!CoeError::MalformedFrame { len: 3 }.is_encode_error());
        assert!(CoeError::transport_failed("down").is_retryable());
    }

    #[test]
    fn from_io_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "dump file");
        let err: CoeError = io_err.into();

        match err {
            CoeError::File { source, .. } => assert_eq!(source.to_string(), "dump file"),
            _ => panic!("Expected File error variant"),
        }
    }
}
