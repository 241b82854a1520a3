//! Request/response body that can be buffered and read again

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, SizeHint};

use crate::BoxError;

/// Body type used on both sides of the interceptor.
///
/// A body starts out either absent, buffered, or streaming. [`ReplayBody::buffer`]
/// turns a streaming body into a buffered one in place; a buffered body can be
/// rewound to its first byte or cloned into an independent reader, so it can be
/// hashed, recorded and still handed to the next consumer.
pub struct ReplayBody {
    kind: Kind,
}

enum Kind {
    Empty,
    Buffered {
        source: Bytes,
        remaining: Option<Bytes>,
    },
    Streaming(BoxBody<Bytes, BoxError>),
}

impl ReplayBody {
    /// An absent body
    #[must_use]
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    /// Wrap an arbitrary body; it is read lazily
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            kind: Kind::Streaming(body.map_err(Into::into).boxed()),
        }
    }

    /// Whether the request or response carries no body at all
    pub fn is_absent(&self) -> bool {
        matches!(self.kind, Kind::Empty)
    }

    /// The buffered bytes, if this body has been buffered
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match &self.kind {
            Kind::Buffered { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Read the whole body into memory and keep it buffered.
    ///
    /// Returns a cheap handle to the full contents. The read position is reset
    /// to byte 0, so the body remains readable afterwards.
    ///
    /// # Errors
    ///
    /// Returns the underlying body error if a streaming body fails. The body
    /// is left empty in that case.
    pub async fn buffer(&mut self) -> std::result::Result<Bytes, BoxError> {
        let bytes = match std::mem::replace(&mut self.kind, Kind::Empty) {
            Kind::Empty => return Ok(Bytes::new()),
            Kind::Buffered { source, .. } => source,
            Kind::Streaming(body) => body.collect().await?.to_bytes(),
        };
        self.kind = Kind::Buffered {
            source: bytes.clone(),
            remaining: None,
        };
        self.rewind();
        Ok(bytes)
    }

    /// Restore the read position of a buffered body to its start
    pub fn rewind(&mut self) {
        if let Kind::Buffered { source, remaining } = &mut self.kind {
            *remaining = (!source.is_empty()).then(|| source.clone());
        }
    }

    /// A fresh, independently readable copy; `None` while still streaming
    pub fn try_clone(&self) -> Option<Self> {
        match &self.kind {
            Kind::Empty => Some(Self::empty()),
            Kind::Buffered { source, .. } => Some(Self::from(source.clone())),
            Kind::Streaming(_) => None,
        }
    }
}

impl Default for ReplayBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ReplayBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("ReplayBody::Empty"),
            Kind::Buffered { source, .. } => f
                .debug_struct("ReplayBody::Buffered")
                .field("len", &source.len())
                .finish(),
            Kind::Streaming(_) => f.write_str("ReplayBody::Streaming"),
        }
    }
}

impl From<Bytes> for ReplayBody {
    fn from(bytes: Bytes) -> Self {
        let remaining = (!bytes.is_empty()).then(|| bytes.clone());
        Self {
            kind: Kind::Buffered {
                source: bytes,
                remaining,
            },
        }
    }
}

impl From<Vec<u8>> for ReplayBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<String> for ReplayBody {
    fn from(text: String) -> Self {
        Self::from(Bytes::from(text))
    }
}

impl From<&'static str> for ReplayBody {
    fn from(text: &'static str) -> Self {
        Self::from(Bytes::from_static(text.as_bytes()))
    }
}

impl Body for ReplayBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Buffered { remaining, .. } => {
                Poll::Ready(remaining.take().map(|bytes| Ok(Frame::data(bytes))))
            }
            Kind::Streaming(body) => Pin::new(body).poll_frame(cx),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Buffered { remaining, .. } => remaining.is_none(),
            Kind::Streaming(body) => body.is_end_stream(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Buffered { remaining, .. } => {
                SizeHint::with_exact(remaining.as_ref().map_or(0, |b| b.len() as u64))
            }
            Kind::Streaming(body) => body.size_hint(),
        }
    }
}
