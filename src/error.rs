//! Error types for httpreplay

use std::io;
use std::path::{Path, PathBuf};

use hyper::{Request, Response};
use thiserror::Error;

use crate::network::ReplayBody;

/// Boxed error used for body and transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for httpreplay operations
pub type Result<T> = std::result::Result<T, ReplayError>;

/// Top-level error returned by [`crate::ReplayTransport`]
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The real transport failed; the inner error is passed through untouched
    #[error("{0}")]
    Transport(#[source] BoxError),

    /// Loading a recording failed (including "not found")
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Fingerprinting or persisting failed while handling a request
    #[error(transparent)]
    Interception(#[from] InterceptionError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReplayError {
    /// True when no recording exists for the request
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_not_found())
    }

    /// Borrow the underlying transport error, if this is one
    #[must_use]
    pub fn transport_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Transport(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

/// Failure while computing a request fingerprint
#[derive(Debug, Error)]
pub enum FingerprintError {
    /// The request body could not be buffered
    #[error("Failed to read request body: {0}")]
    ReadBody(#[source] BoxError),
}

/// Failure loading or saving a recording
#[derive(Debug, Error)]
pub enum StorageError {
    /// No recording file exists at the path
    #[error("Recording not found: {}", .path.display())]
    NotFound {
        /// Path that was looked up
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File or directory being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The JSON header block could not be encoded or decoded
    #[error("Malformed recording {}: {source}", .path.display())]
    Malformed {
        /// Recording file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// The header block decoded but holds values HTTP does not accept
    #[error("Invalid recording {}: {reason}", .path.display())]
    Invalid {
        /// Recording file
        path: PathBuf,
        /// What was wrong
        reason: String,
    },

    /// The live response body could not be buffered
    #[error("Failed to read response body: {0}")]
    ReadBody(#[source] BoxError),
}

impl StorageError {
    /// True for the expected "no recording at this path" condition
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify an I/O error for `path`, mapping `NotFound` to [`StorageError::NotFound`]
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// What went wrong inside an [`InterceptionError`]
#[derive(Debug, Error)]
pub enum InterceptionCause {
    /// The request could not be fingerprinted
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    /// The live response could not be recorded
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Error raised while manipulating a recording for a specific request.
///
/// Distinguishes local storage trouble from ordinary network failures. The
/// response is present only when the failure happened after the real
/// transport answered, i.e. while recording.
#[derive(Debug, Error)]
#[error("{} {}: {source}", .request.method(), .request.uri())]
pub struct InterceptionError {
    request: Box<Request<ReplayBody>>,
    response: Option<Box<Response<ReplayBody>>>,
    #[source]
    source: InterceptionCause,
}

impl InterceptionError {
    /// Wrap a failure together with the request (and response, if any)
    pub fn new(
        request: Request<ReplayBody>,
        response: Option<Response<ReplayBody>>,
        source: impl Into<InterceptionCause>,
    ) -> Self {
        Self {
            request: Box::new(request),
            response: response.map(Box::new),
            source: source.into(),
        }
    }

    /// The request being processed
    pub fn request(&self) -> &Request<ReplayBody> {
        &self.request
    }

    /// The live response, when the failure happened while recording it
    pub fn response(&self) -> Option<&Response<ReplayBody>> {
        self.response.as_deref()
    }

    /// The underlying cause
    pub fn cause(&self) -> &InterceptionCause {
        &self.source
    }

    /// Take ownership of the request, response and cause
    pub fn into_parts(
        self,
    ) -> (
        Request<ReplayBody>,
        Option<Response<ReplayBody>>,
        InterceptionCause,
    ) {
        (*self.request, self.response.map(|r| *r), self.source)
    }
}
