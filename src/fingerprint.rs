//! Request fingerprinting for deterministic recording paths
//!
//! A request maps to a directory built from its scheme, host, method and path
//! segments, plus an optional CRC-32 over the query parameters, headers and
//! body that were not excluded:
//!
//! ```text
//! http/www.example.com/GET/path/to/easy%2Bstreet/request.json
//! http/www.example.com/POST/api/request.3439576296.json
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use crc32fast::Hasher;
use hyper::header::{self, HeaderMap, HeaderName};
use hyper::{Request, Uri};
use tracing::debug;

use crate::network::ReplayBody;
use crate::FingerprintError;

/// File name used when a request has no discriminating content
pub const GENERIC_FILE_NAME: &str = "request.json";

/// Hook deciding which body bytes participate in the checksum.
///
/// It never changes the body that is sent downstream.
pub type BodyFilter = Arc<dyn Fn(&Request<ReplayBody>, Bytes) -> Bytes + Send + Sync>;

/// Headers that are volatile or carry credentials, excluded by default
#[must_use]
pub fn default_omit_headers() -> HashSet<HeaderName> {
    [
        header::AUTHORIZATION,
        header::CONNECTION,
        header::DATE,
        header::PROXY_AUTHORIZATION,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
    ]
    .into_iter()
    .collect()
}

/// Relative location of a recording
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordingPath {
    directory: PathBuf,
    checksum: Option<u32>,
}

impl RecordingPath {
    /// Build a path from its parts
    #[must_use]
    pub fn new(directory: PathBuf, checksum: Option<u32>) -> Self {
        Self {
            directory,
            checksum,
        }
    }

    /// Directory holding the recording files for this request
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// CRC-32 over the discriminating request content, if there was any
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// `request.<crc>.json` when a checksum exists, otherwise [`Self::generic_path`]
    pub fn path(&self) -> PathBuf {
        match self.checksum {
            Some(crc) => self.directory.join(format!("request.{crc}.json")),
            None => self.generic_path(),
        }
    }

    /// Always `request.json`, even if a checksum was computed
    pub fn generic_path(&self) -> PathBuf {
        self.directory.join(GENERIC_FILE_NAME)
    }
}

impl fmt::Display for RecordingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// Computes [`RecordingPath`]s for requests
#[derive(Clone)]
pub struct PathGenerator {
    /// Headers that never influence the checksum
    pub omit_headers: HashSet<HeaderName>,
    /// Query parameters that never influence the checksum
    pub omit_query: HashSet<String>,
    body_filter: Option<BodyFilter>,
}

impl PathGenerator {
    /// Generator excluding [`default_omit_headers`] and no query parameters
    #[must_use]
    pub fn new() -> Self {
        Self {
            omit_headers: default_omit_headers(),
            omit_query: HashSet::new(),
            body_filter: None,
        }
    }

    /// Install a body filter
    #[must_use]
    pub fn with_body_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Request<ReplayBody>, Bytes) -> Bytes + Send + Sync + 'static,
    {
        self.body_filter = Some(Arc::new(filter));
        self
    }

    /// Compute the recording path for `request`.
    ///
    /// The only change made to the request is that its body ends up buffered
    /// and rewound, so it can still be sent in full afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be read
    pub async fn recording_path(
        &self,
        request: &mut Request<ReplayBody>,
    ) -> Result<RecordingPath, FingerprintError> {
        let directory = directory_for(request);
        let checksum = self.request_checksum(request).await?;

        let path = RecordingPath::new(directory, checksum);
        debug!("{} {} -> {}", request.method(), request.uri(), path);
        Ok(path)
    }

    /// CRC-32 over query parameters, headers and body, skipping excluded
    /// names. `None` when nothing was hashed.
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be read
    pub async fn request_checksum(
        &self,
        request: &mut Request<ReplayBody>,
    ) -> Result<Option<u32>, FingerprintError> {
        let mut hasher = Hasher::new();
        let mut has_hash = self.hash_query(&mut hasher, request.uri());
        has_hash |= self.hash_headers(&mut hasher, request.headers());

        if !request.body().is_absent() {
            let bytes = request
                .body_mut()
                .buffer()
                .await
                .map_err(FingerprintError::ReadBody)?;

            let hashed = match &self.body_filter {
                Some(filter) => filter(&*request, bytes),
                None => bytes,
            };
            hasher.update(&hashed);
            request.body_mut().rewind();

            has_hash |= !hashed.is_empty();
        }

        Ok(has_hash.then(|| hasher.finalize()))
    }

    fn hash_query(&self, hasher: &mut Hasher, uri: &Uri) -> bool {
        let params = uri.query().map(parse_query).unwrap_or_default();
        hash_sorted(
            hasher,
            params
                .iter()
                .filter(|(name, _)| {
                    !std::str::from_utf8(name).is_ok_and(|name| self.omit_query.contains(name))
                })
                .map(|(name, values)| (name.as_slice(), values.iter().map(Vec::as_slice))),
        )
    }

    fn hash_headers(&self, hasher: &mut Hasher, headers: &HeaderMap) -> bool {
        let names: BTreeMap<String, &HeaderName> = headers
            .keys()
            .filter(|name| !self.omit_headers.contains(*name))
            .map(|name| (canonical_header_key(name.as_str()), name))
            .collect();

        hash_sorted(
            hasher,
            names.iter().map(|(canonical, name)| {
                (
                    canonical.as_bytes(),
                    headers.get_all(*name).iter().map(|v| v.as_bytes()),
                )
            }),
        )
    }
}

impl Default for PathGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PathGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathGenerator")
            .field("omit_headers", &self.omit_headers)
            .field("omit_query", &self.omit_query)
            .field("body_filter", &self.body_filter.is_some())
            .finish()
    }
}

/// Feed each key followed by all its values. Keys must arrive sorted.
fn hash_sorted<'a, K, V>(hasher: &mut Hasher, entries: K) -> bool
where
    K: Iterator<Item = (&'a [u8], V)>,
    V: Iterator<Item = &'a [u8]>,
{
    let mut any = false;
    for (key, values) in entries {
        hasher.update(key);
        for value in values {
            hasher.update(value);
        }
        any = true;
    }
    any
}

/// scheme / host / METHOD / segment / ...
fn directory_for(request: &Request<ReplayBody>) -> PathBuf {
    let uri = request.uri();
    let mut directory = PathBuf::new();

    if let Some(scheme) = uri.scheme_str() {
        directory.push(scheme);
    }
    if let Some(host) = uri.host() {
        let host = match uri.port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        directory.push(query_escape(&host));
    }
    directory.push(request.method().as_str());

    // Segments are raw bytes after decoding and need not be UTF-8
    let path = urlencoding::decode_binary(uri.path().as_bytes());
    for segment in path.split(|b| *b == b'/').filter(|s| !s.is_empty()) {
        directory.push(escape_bytes(segment));
    }

    directory
}

/// Escape a path component so it is valid on any platform.
///
/// Space becomes `+`; everything except ASCII alphanumerics and `-_.~`
/// becomes `%XX`.
#[must_use]
pub fn query_escape(component: &str) -> String {
    escape_bytes(component.as_bytes())
}

fn escape_bytes(bytes: &[u8]) -> String {
    urlencoding::encode_binary(bytes).replace("%20", "+")
}

/// Decode a query string into name -> values, values in their original order.
///
/// Names and values are raw bytes, so escapes such as `%ff` survive even
/// though they are not UTF-8. Pairs with a malformed escape (`%zz`) or a `;`
/// are skipped.
#[must_use]
pub fn parse_query(query: &str) -> BTreeMap<Vec<u8>, Vec<Vec<u8>>> {
    let mut params: BTreeMap<Vec<u8>, Vec<Vec<u8>>> = BTreeMap::new();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        if pair.contains(';') {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        if let (Some(name), Some(value)) = (query_unescape(name), query_unescape(value)) {
            params.entry(name).or_default().push(value);
        }
    }

    params
}

/// Form-decode `text`, or `None` if a `%` is not followed by two hex digits
fn query_unescape(text: &str) -> Option<Vec<u8>> {
    let bytes = text.as_bytes();
    let well_formed = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'%')
        .all(|(i, _)| {
            bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
        });
    if !well_formed {
        return None;
    }

    Some(urlencoding::decode_binary(text.replace('+', " ").as_bytes()).into_owned())
}

/// `content-type` -> `Content-Type`
#[must_use]
pub fn canonical_header_key(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            out
        })
        .collect()
}
