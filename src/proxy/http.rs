//! Transport wrapper that plays back or records responses

use std::future::Future;
use std::path::{Path, PathBuf};

use hyper::{Request, Response};
use tracing::{debug, warn};

use crate::config::{Config, Mode};
use crate::fingerprint::PathGenerator;
use crate::network::{Offline, ReplayBody, Transport};
use crate::storage::Recording;
use crate::{BoxError, InterceptionError, ReplayError, Result, StorageError};

/// Answers requests from recordings under a directory, falling back to a
/// real [`Transport`] and recording its responses when the mode allows it.
#[derive(Debug, Clone)]
pub struct ReplayTransport<T> {
    transport: T,
    dir: PathBuf,
    mode: Mode,
    strict_path: bool,
    generator: PathGenerator,
}

impl<T: Transport> ReplayTransport<T> {
    /// Serve recordings that exist and record the ones that are missing
    pub fn new(dir: impl Into<PathBuf>, transport: T) -> Self {
        Self {
            transport,
            dir: dir.into(),
            mode: Mode::RecordIfMissing,
            strict_path: false,
            generator: PathGenerator::new(),
        }
    }

    /// Always use `transport` and overwrite existing recordings
    pub fn record_only(dir: impl Into<PathBuf>, transport: T) -> Self {
        Self::new(dir, transport).with_mode(Mode::RecordOnly)
    }

    /// Build from a [`Config`]
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn from_config(config: &Config, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.recording_dir.clone(), transport)
            .with_mode(config.mode)
            .with_strict_path(config.strict_path)
            .with_path_generator(config.path_generator()?))
    }

    /// Set the operating mode
    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Disable the generic-path fallback on lookup
    #[must_use]
    pub fn with_strict_path(mut self, strict_path: bool) -> Self {
        self.strict_path = strict_path;
        self
    }

    /// Replace the fingerprint generator
    #[must_use]
    pub fn with_path_generator(mut self, generator: PathGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Operating mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Recording directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fingerprint generator, e.g. to adjust the excluded names
    pub fn path_generator_mut(&mut self) -> &mut PathGenerator {
        &mut self.generator
    }

    /// The wrapped transport
    pub fn inner(&self) -> &T {
        &self.transport
    }

    /// Handle one request.
    ///
    /// Transport failures come back as [`ReplayError::Transport`] untouched.
    /// Lookup failures other than "not found" come back as
    /// [`ReplayError::Storage`]; in playback-only mode so does "not found".
    /// Fingerprint and save failures are wrapped in [`InterceptionError`].
    ///
    /// # Errors
    ///
    /// See above
    pub async fn round_trip(&self, mut request: Request<ReplayBody>) -> Result<Response<ReplayBody>> {
        let recording_path = match self.generator.recording_path(&mut request).await {
            Ok(path) => path,
            Err(err) => return Err(InterceptionError::new(request, None, err).into()),
        };
        let path = self.dir.join(recording_path.path());
        let generic_path = self.dir.join(recording_path.generic_path());

        if self.mode.reads_store() {
            match self.lookup(&path, &generic_path) {
                Ok(recording) => return Ok(recording.to_response()),
                Err(err) if err.is_not_found() && self.mode.may_record() => {
                    debug!("No recording at {}, fetching", path.display());
                }
                Err(err) => return Err(err.into()),
            }
        }

        let sent = duplicate(&request);
        let mut response = self.transport.send(request).await.map_err(|e| {
            warn!("Transport failed for {} {}: {e}", sent.method(), sent.uri());
            ReplayError::Transport(e)
        })?;

        let recording = match Recording::from_response(&mut response).await {
            Ok(recording) => recording,
            Err(err) => return Err(InterceptionError::new(sent, Some(response), err).into()),
        };
        if let Err(err) = recording.save(&path) {
            warn!("Failed to save recording {}: {err}", path.display());
            return Err(InterceptionError::new(sent, Some(response), err).into());
        }

        debug!("Recorded {} {} -> {}", sent.method(), sent.uri(), path.display());
        Ok(response)
    }

    /// Load from the checksum path, then from the generic path if allowed
    fn lookup(&self, path: &Path, generic_path: &Path) -> std::result::Result<Recording, StorageError> {
        match Recording::load(path) {
            Err(err) if err.is_not_found() && !self.strict_path && generic_path != path => {
                debug!("No recording at {}, trying {}", path.display(), generic_path.display());
                Recording::load(generic_path)
            }
            result => {
                if result.is_ok() {
                    debug!("Playing back {}", path.display());
                }
                result
            }
        }
    }
}

impl ReplayTransport<Offline> {
    /// Serve recordings only; a missing recording is an error
    pub fn playback_only(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, Offline).with_mode(Mode::PlaybackOnly)
    }
}

impl<T: Transport> Transport for ReplayTransport<T> {
    fn send(
        &self,
        request: Request<ReplayBody>,
    ) -> impl Future<Output = std::result::Result<Response<ReplayBody>, BoxError>> + Send {
        async move { self.round_trip(request).await.map_err(BoxError::from) }
    }
}

/// Copy of a request whose body has already been buffered
fn duplicate(request: &Request<ReplayBody>) -> Request<ReplayBody> {
    let body = request.body().try_clone().unwrap_or_default();
    let mut copy = Request::new(body);
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}
