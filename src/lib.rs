//! httpreplay - deterministic file-backed record/replay of HTTP responses
//!
//! A [`ReplayTransport`] sits in front of a real [`Transport`]. Each request
//! is reduced to a [`RecordingPath`] by the [`PathGenerator`]; depending on the
//! [`Mode`] the response is served from disk, fetched live and recorded, or
//! rejected.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod network;
pub mod proxy;
pub mod storage;

pub use config::{Config, Mode};
pub use error::{
    BoxError, FingerprintError, InterceptionCause, InterceptionError, ReplayError, Result,
    StorageError,
};
pub use fingerprint::{default_omit_headers, BodyFilter, PathGenerator, RecordingPath};
pub use network::{HyperTransport, Offline, ReplayBody, Transport};
pub use proxy::ReplayTransport;
pub use storage::Recording;
