//! Network layer for httpreplay
//!
//! Defines the [`Transport`] capability the interceptor delegates to on a
//! cache miss, plus the body type shared by requests and responses.

mod body;
mod client;

use std::future::Future;
use std::sync::Arc;

use hyper::{Request, Response};

pub use body::ReplayBody;
pub use client::HyperTransport;

use crate::BoxError;

/// Something that can perform a live HTTP exchange
pub trait Transport: Send + Sync {
    /// Send `request` and return the response.
    ///
    /// Errors are surfaced to callers of the interceptor unchanged.
    fn send(
        &self,
        request: Request<ReplayBody>,
    ) -> impl Future<Output = std::result::Result<Response<ReplayBody>, BoxError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: Request<ReplayBody>,
    ) -> impl Future<Output = std::result::Result<Response<ReplayBody>, BoxError>> + Send {
        (**self).send(request)
    }
}

/// Transport that refuses every request.
///
/// Backs playback-only interceptors, which never reach the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Transport for Offline {
    fn send(
        &self,
        request: Request<ReplayBody>,
    ) -> impl Future<Output = std::result::Result<Response<ReplayBody>, BoxError>> + Send {
        let message = format!(
            "network access disabled: {} {}",
            request.method(),
            request.uri()
        );
        async move { Err::<Response<ReplayBody>, BoxError>(message.into()) }
    }
}
