//! Error handling for tonearm.
//!
//! Provides a unified error handling system for the demux/decode pipeline,
//! with mapping from various underlying errors to appropriate categories.
//!
//! # Error Categories
//!
//! Errors are categorized by where in the pipeline they arise:
//! * Stream I/O (end of file, read faults, seek errors)
//! * Container parsing (invalid data, unsupported formats, out of bounds)
//! * Registry lookup (protocol not supported)
//! * Decoder libraries (generic failures, translated from source codes)
//!
//! # Example
//!
//! ```rust
//! use tonearm::error::{Error, ErrorKind, Result};
//!
//! fn parse_magic(bytes: &[u8]) -> Result<()> {
//!     if !bytes.starts_with(b"FORM") {
//!         return Err(Error::invalid_data_format("invalid AIFF 'FORM' chunk"));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
///
/// Provides:
/// * Categorized error types ([`ErrorKind`])
/// * Underlying error details
/// * Conversion from common error types
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// Allows accessing the original error when its concrete type is known.
    ///
    /// # Returns
    /// * `Some(&E)` - If the underlying error is of type `E`
    /// * `None` - If the underlying error is not of type `E`
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Whether this error is the normal end-of-stream signal.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.kind == ErrorKind::EndOfFile
    }
}

/// Standard result type for tonearm operations.
///
/// Wraps the standard `Result` type with our custom [`struct@Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for the demux/decode pipeline.
///
/// Each variant:
/// * Represents a distinct failure category
/// * Carries a standard error message
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// Stream ended. Normal when expected, fatal when mid-packet.
    #[error("End of file")]
    EndOfFile,

    /// Low-level read failure from a stream backend.
    #[error("Read fault")]
    ReadFault,

    /// Seek outside the stream, or the backend rejected the seek.
    #[error("Seek error")]
    SeekError,

    /// Sync word, magic number, or expected value missing.
    #[error("Invalid data format")]
    InvalidDataFormat,

    /// Recognized but unhandled (e.g. an AIFF codec tag with no decoder).
    #[error("Unsupported format")]
    UnsupportedFormat,

    /// No registered input, decoder, or stream backend for the content.
    #[error("Protocol not supported")]
    ProtocolNotSupported,

    /// Precondition violation in an API call (e.g. a malformed URI).
    #[error("Invalid argument")]
    InvalidArgument,

    /// Reader or seek beyond the valid range; a parsed size exceeds the
    /// remaining data.
    #[error("Out of bounds")]
    OutOfBounds,

    /// Generic library error (e.g. a decoder-library internal error).
    #[error("Failure")]
    Failure,

    /// The operation is not implemented by this backend.
    #[error("Not implemented")]
    NotImplemented,

    /// A required pointer-like argument was absent.
    #[error("Invalid pointer")]
    InvalidPointer,

    /// Use of an object after its backing resource was released.
    #[error("Object disposed")]
    ObjectDisposed,

    /// Memory allocation failed.
    #[error("Allocation failure")]
    BadAlloc,
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for the normal end-of-stream condition.
    ///
    /// Callers detect the end of a stream by an empty packet; this error is
    /// raised when a *strict* read came up short mid-structure.
    pub fn end_of_file<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::EndOfFile, error)
    }

    /// Creates an error for low-level I/O read failures.
    pub fn read_fault<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ReadFault, error)
    }

    /// Creates an error for invalid or rejected seeks.
    pub fn seek_error<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::SeekError, error)
    }

    /// Creates an error for missing magic numbers and malformed structures.
    ///
    /// Use when content does not match the format a parser expected.
    pub fn invalid_data_format<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidDataFormat, error)
    }

    /// Creates an error for recognized but unhandled formats.
    ///
    /// Use when a container or codec variant is identified but cannot be
    /// processed (e.g. an out-of-range channel count).
    pub fn unsupported_format<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::UnsupportedFormat, error)
    }

    /// Creates an error for registry lookups that found no handler.
    pub fn protocol_not_supported<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ProtocolNotSupported, error)
    }

    /// Creates an error for invalid arguments.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for reads or seeks beyond the valid range.
    pub fn out_of_bounds<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::OutOfBounds, error)
    }

    /// Creates an error for generic library failures.
    pub fn failure<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Failure, error)
    }

    /// Creates an error for unimplemented operations.
    pub fn not_implemented<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotImplemented, error)
    }

    /// Creates an error for absent pointer-like arguments.
    pub fn invalid_pointer<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidPointer, error)
    }

    /// Creates an error for use-after-release conditions.
    pub fn object_disposed<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ObjectDisposed, error)
    }

    /// Creates an error for failed allocations.
    pub fn bad_alloc<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::BadAlloc, error)
    }
}

impl std::error::Error for Error {
    /// Returns the underlying error source.
    ///
    /// This allows error chains to be examined for root causes.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for Error {
    /// Formats the error for display, showing both kind and details.
    ///
    /// Format: "{kind}: {details}"
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    /// Converts IO errors into appropriate error kinds.
    ///
    /// Maps standard IO errors to their logical equivalents:
    /// * `UnexpectedEof` -> `EndOfFile`
    /// * `NotFound` / `PermissionDenied` -> `ReadFault`
    /// * `InvalidInput` / `InvalidData` -> `InvalidDataFormat`
    /// * etc.
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            UnexpectedEof => Self::end_of_file(err),
            NotSeekable => Self::seek_error(err),
            InvalidInput | InvalidData => Self::invalid_data_format(err),
            Unsupported => Self::not_implemented(err),
            OutOfMemory => Self::bad_alloc(err),
            _ => Self::read_fault(err),
        }
    }
}

impl From<reqwest::Error> for Error {
    /// Converts HTTP client errors into appropriate error kinds.
    ///
    /// Maps HTTP errors based on their nature:
    /// * Body/decode errors -> `ReadFault`
    /// * Builder errors -> `InvalidArgument`
    /// * Everything else (connect, status, timeout) -> `Failure`
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() || err.is_decode() {
            return Self::read_fault(err);
        }

        if err.is_builder() {
            return Self::invalid_argument(err);
        }

        Self::failure(err)
    }
}

impl From<std::fmt::Error> for Error {
    /// Converts formatting errors to `Failure`.
    fn from(e: std::fmt::Error) -> Self {
        Self::failure(e.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    /// Converts Base64 decoding errors to `InvalidArgument`.
    fn from(e: base64::DecodeError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<std::num::ParseIntError> for Error {
    /// Converts integer parsing errors to `InvalidArgument`.
    fn from(e: std::num::ParseIntError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<std::num::TryFromIntError> for Error {
    /// Converts integer range errors to `OutOfBounds`.
    fn from(e: std::num::TryFromIntError) -> Self {
        Self::out_of_bounds(e.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    /// Converts UTF-8 validation errors to `InvalidArgument`.
    fn from(e: std::str::Utf8Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<symphonia_core::errors::Error> for Error {
    /// Converts Symphonia decoder errors into appropriate error kinds.
    ///
    /// Maps decoder errors:
    /// * `DecodeError` -> `InvalidDataFormat`
    /// * `IoError` -> through the IO error mapping
    /// * `Unsupported` -> `UnsupportedFormat`
    /// * `SeekError` -> `SeekError`
    /// * `LimitError` / `ResetRequired` -> `Failure`
    fn from(e: symphonia_core::errors::Error) -> Self {
        use symphonia_core::errors::Error::*;
        match e {
            IoError(e) => e.into(),
            DecodeError(e) => Self::invalid_data_format(e),
            Unsupported(e) => Self::unsupported_format(e),
            SeekError(kind) => Self::seek_error(format!("decoder seek failed: {kind:?}")),
            LimitError(e) => Self::failure(e),
            ResetRequired => Self::failure("decoder reset required"),
        }
    }
}

impl From<claxon::Error> for Error {
    /// Converts FLAC decoder errors into appropriate error kinds.
    ///
    /// Maps decoder errors:
    /// * `FormatError` -> `InvalidDataFormat`
    /// * `IoError` -> through the IO error mapping
    /// * `Unsupported` -> `UnsupportedFormat`
    fn from(e: claxon::Error) -> Self {
        use claxon::Error::*;
        match e {
            IoError(e) => e.into(),
            FormatError(e) => Self::invalid_data_format(e),
            Unsupported(e) => Self::unsupported_format(e),
        }
    }
}

impl From<lewton::VorbisError> for Error {
    /// Converts Vorbis decoder errors into appropriate error kinds.
    ///
    /// Header errors indicate malformed codec configuration; audio read
    /// errors indicate undecodable packets.
    fn from(e: lewton::VorbisError) -> Self {
        use lewton::VorbisError::*;
        match e {
            BadHeader(e) => Self::invalid_data_format(e.to_string()),
            BadAudio(e) => Self::invalid_data_format(e.to_string()),
            OggError(e) => Self::read_fault(e.to_string()),
        }
    }
}

impl From<lewton::header::HeaderReadError> for Error {
    /// Converts Vorbis header errors to `InvalidDataFormat`.
    fn from(e: lewton::header::HeaderReadError) -> Self {
        Self::invalid_data_format(e.to_string())
    }
}

impl From<lewton::audio::AudioReadError> for Error {
    /// Converts Vorbis audio packet errors to `InvalidDataFormat`.
    fn from(e: lewton::audio::AudioReadError) -> Self {
        Self::invalid_data_format(e.to_string())
    }
}

impl From<ogg::OggReadError> for Error {
    /// Converts Ogg framing errors into appropriate error kinds.
    ///
    /// Maps framing errors:
    /// * `ReadError` -> through the IO error mapping
    /// * `NoCapturePatternFound` -> `InvalidDataFormat`
    /// * CRC/size violations -> `InvalidDataFormat`
    fn from(e: ogg::OggReadError) -> Self {
        use ogg::OggReadError::*;
        match e {
            ReadError(e) => e.into(),
            _ => Self::invalid_data_format(e.to_string()),
        }
    }
}

impl From<audiopus::Error> for Error {
    /// Converts Opus decoder errors into appropriate error kinds.
    ///
    /// Maps library error codes:
    /// * `InvalidPacket` -> `InvalidDataFormat`
    /// * `BadArgument` -> `InvalidArgument`
    /// * `BufferTooSmall` -> `OutOfBounds`
    /// * `Unimplemented` -> `NotImplemented`
    /// * `AllocFail` -> `BadAlloc`
    /// * etc.
    fn from(e: audiopus::Error) -> Self {
        use audiopus::ErrorCode::*;
        let message = e.to_string();
        match e {
            audiopus::Error::Opus(code) => match code {
                InvalidPacket => Self::invalid_data_format(message),
                BadArg => Self::invalid_argument(message),
                BufferTooSmall => Self::out_of_bounds(message),
                Unimplemented => Self::not_implemented(message),
                AllocFail => Self::bad_alloc(message),
                _ => Self::failure(message),
            },
            _ => Self::failure(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_detail() {
        let err = Error::invalid_data_format("no valid MPEG audio frame header(s) found");
        assert_eq!(
            err.to_string(),
            "Invalid data format: no valid MPEG audio frame header(s) found"
        );
        assert_eq!(err.kind, ErrorKind::InvalidDataFormat);
    }

    #[test]
    fn io_eof_maps_to_end_of_file() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = Error::from(io);
        assert!(err.is_eof());
    }
}
