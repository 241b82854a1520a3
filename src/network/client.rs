//! Live HTTP transport backed by the hyper client

use std::future::Future;
use std::time::Duration;

use hyper::{Request, Response};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::{ReplayBody, Transport};
use crate::BoxError;

/// Transport that performs real requests over HTTP or HTTPS.
///
/// TLS uses rustls with the bundled webpki root certificates.
#[derive(Clone)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, ReplayBody>,
}

impl HyperTransport {
    /// Create a new HTTP transport with a pooled client
    #[must_use]
    pub fn new() -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Self { client }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl Transport for HyperTransport {
    fn send(
        &self,
        request: Request<ReplayBody>,
    ) -> impl Future<Output = std::result::Result<Response<ReplayBody>, BoxError>> + Send {
        let client = self.client.clone();
        async move {
            debug!("Sending {} {}", request.method(), request.uri());

            let response = client.request(request).await.map_err(|e| {
                warn!("Request failed: {e}");
                BoxError::from(e)
            })?;

            Ok(response.map(ReplayBody::new))
        }
    }
}
