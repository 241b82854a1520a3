//! Recording value and its JSON header block
//!
//! A recording file is a JSON object, one newline, then the raw body:
//!
//! ```text
//! {
//!   "status": "404 Not Found",
//!   "status_code": 404,
//!   "proto": "HTTP/1.1",
//!   "proto_major": 1,
//!   "proto_minor": 1,
//!   "headers": {
//!     "Content-Type": [
//!       "text/plain"
//!     ]
//!   }
//! }
//! The requested content was not found.
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use bytes::Bytes;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Response, StatusCode, Version};
use serde::{Deserialize, Serialize};

use crate::fingerprint::canonical_header_key;
use crate::network::ReplayBody;
use crate::StorageError;

/// A recorded HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    /// Status line text, e.g. `200 OK`
    pub status: String,
    /// Status code
    pub status_code: StatusCode,
    /// Protocol name, e.g. `HTTP/1.1`
    pub proto: String,
    /// Protocol major version
    pub proto_major: u8,
    /// Protocol minor version
    pub proto_minor: u8,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: Bytes,
}

/// JSON part of a recording file. Zero values are omitted.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RecordingHeader {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proto: String,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub proto_major: u8,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub proto_minor: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u16(value: &u16) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u8(value: &u8) -> bool {
    *value == 0
}

impl Recording {
    /// Capture a live response.
    ///
    /// The body is fully buffered in place: the response passed in stays
    /// readable from its first byte for the caller.
    ///
    /// # Errors
    ///
    /// Returns error if the response body cannot be read
    pub async fn from_response(response: &mut Response<ReplayBody>) -> Result<Self, StorageError> {
        let body = response
            .body_mut()
            .buffer()
            .await
            .map_err(StorageError::ReadBody)?;

        let status_code = response.status();
        let reason = response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned());
        let (proto, proto_major, proto_minor) = protocol_of(response.version());

        Ok(Self {
            status: status_line(status_code, reason.as_deref()),
            status_code,
            proto: proto.to_string(),
            proto_major,
            proto_minor,
            headers: response.headers().clone(),
            body,
        })
    }

    /// Build a response whose body is a fresh reader over the stored bytes
    pub fn to_response(&self) -> Response<ReplayBody> {
        let mut response = Response::new(ReplayBody::from(self.body.clone()));
        *response.status_mut() = self.status_code;
        *response.version_mut() = version_of(self.proto_major, self.proto_minor);
        *response.headers_mut() = self.headers.clone();

        let reason = self
            .status
            .strip_prefix(self.status_code.as_str())
            .map(str::trim_start)
            .filter(|reason| !reason.is_empty());
        if let Some(reason) = reason {
            if Some(reason) != self.status_code.canonical_reason() {
                if let Ok(phrase) = ReasonPhrase::try_from(reason.to_string()) {
                    response.extensions_mut().insert(phrase);
                }
            }
        }

        response
    }

    pub(crate) fn to_header(&self) -> RecordingHeader {
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in self.headers.keys() {
            let values = self
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            headers.insert(canonical_header_key(name.as_str()), values);
        }

        RecordingHeader {
            status: self.status.clone(),
            status_code: self.status_code.as_u16(),
            proto: self.proto.clone(),
            proto_major: self.proto_major,
            proto_minor: self.proto_minor,
            headers,
        }
    }

    /// Rebuild a recording from a decoded header block and body.
    ///
    /// Hand-written files may leave fields out: a missing status code is read
    /// from the leading digits of `status` (else 200). Protocol fields are kept
    /// as decoded; [`Recording::to_response`] treats unknown ones as HTTP/1.1.
    pub(crate) fn from_header(
        path: &Path,
        header: RecordingHeader,
        body: Bytes,
    ) -> Result<Self, StorageError> {
        let invalid = |reason: String| StorageError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        let code = match header.status_code {
            0 => header
                .status
                .split_whitespace()
                .next()
                .and_then(|code| code.parse::<u16>().ok())
                .unwrap_or(200),
            code => code,
        };
        let status_code =
            StatusCode::from_u16(code).map_err(|e| invalid(format!("status code {code}: {e}")))?;

        let mut headers = HeaderMap::new();
        for (name, values) in header.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| invalid(format!("header name {name:?}: {e}")))?;
            for value in values {
                let header_value = HeaderValue::from_bytes(value.as_bytes())
                    .map_err(|e| invalid(format!("header {name}: {e}")))?;
                headers.append(header_name.clone(), header_value);
            }
        }

        Ok(Self {
            status: header.status,
            status_code,
            proto: header.proto,
            proto_major: header.proto_major,
            proto_minor: header.proto_minor,
            headers,
            body,
        })
    }
}

/// `200 OK`, or the code followed by a custom reason
fn status_line(code: StatusCode, reason: Option<&str>) -> String {
    match reason.or_else(|| code.canonical_reason()) {
        Some(reason) => format!("{} {reason}", code.as_str()),
        None => code.as_str().to_string(),
    }
}

fn protocol_of(version: Version) -> (&'static str, u8, u8) {
    match version {
        Version::HTTP_09 => ("HTTP/0.9", 0, 9),
        Version::HTTP_10 => ("HTTP/1.0", 1, 0),
        Version::HTTP_2 => ("HTTP/2.0", 2, 0),
        Version::HTTP_3 => ("HTTP/3.0", 3, 0),
        _ => ("HTTP/1.1", 1, 1),
    }
}

fn version_of(major: u8, minor: u8) -> Version {
    match (major, minor) {
        (0, 9) => Version::HTTP_09,
        (1, 0) => Version::HTTP_10,
        (2, _) => Version::HTTP_2,
        (3, _) => Version::HTTP_3,
        _ => Version::HTTP_11,
    }
}
