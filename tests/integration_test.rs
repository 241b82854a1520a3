//! Integration tests for the record/playback cycle

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Frame, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tempfile::TempDir;
use tokio::net::TcpListener;

use httpreplay::{
    BoxError, HyperTransport, InterceptionCause, Mode, PathGenerator, ReplayBody, ReplayError,
    ReplayTransport, StorageError, Transport,
};

/// Answers every request with a description of it and counts the calls
#[derive(Clone, Default)]
struct EchoTransport {
    calls: Arc<AtomicUsize>,
}

impl EchoTransport {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn echo(
    calls: Arc<AtomicUsize>,
    request: Request<ReplayBody>,
) -> Result<Response<ReplayBody>, BoxError> {
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;

    let (parts, body) = request.into_parts();
    let body = body.collect().await?.to_bytes();

    let mut text = format!("{} {}\n", parts.method, parts.uri);
    let mut headers: Vec<_> = parts
        .headers
        .iter()
        .map(|(name, value)| format!("{name}: {}", value.to_str().unwrap_or("?")))
        .collect();
    headers.sort();
    for header in headers {
        text.push_str(&header);
        text.push('\n');
    }
    text.push('\n');
    text.push_str(&String::from_utf8_lossy(&body));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header("x-call", call.to_string())
        .body(ReplayBody::from(text))?;
    Ok(response)
}

impl Transport for EchoTransport {
    fn send(
        &self,
        request: Request<ReplayBody>,
    ) -> impl Future<Output = Result<Response<ReplayBody>, BoxError>> + Send {
        echo(Arc::clone(&self.calls), request)
    }
}

/// Always fails with an I/O error
struct UnreachableTransport;

impl Transport for UnreachableTransport {
    fn send(
        &self,
        _request: Request<ReplayBody>,
    ) -> impl Future<Output = Result<Response<ReplayBody>, BoxError>> + Send {
        async {
            Err::<Response<ReplayBody>, BoxError>(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )))
        }
    }
}

/// Body whose first read fails
struct FailingBody;

impl Body for FailingBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(Some(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))))
    }
}

/// Answers with a response whose body cannot be read, counting the calls
#[derive(Clone, Default)]
struct BrokenBodyTransport {
    calls: Arc<AtomicUsize>,
}

impl Transport for BrokenBodyTransport {
    fn send(
        &self,
        _request: Request<ReplayBody>,
    ) -> impl Future<Output = Result<Response<ReplayBody>, BoxError>> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, BoxError>(Response::new(ReplayBody::new(FailingBody))) }
    }
}

fn request(method: Method, uri: &str, body: impl Into<ReplayBody>) -> Request<ReplayBody> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<ReplayBody> {
    request(Method::GET, uri, ReplayBody::empty())
}

async fn text_of(response: Response<ReplayBody>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_playback_only_never_calls_transport() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let transport =
        ReplayTransport::new(temp_dir.path(), echo.clone()).with_mode(Mode::PlaybackOnly);

    let err = transport
        .round_trip(get("http://example.com/missing"))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(err, ReplayError::Storage(_)));
    assert_eq!(echo.calls(), 0);
}

#[tokio::test]
async fn test_record_only_always_calls_transport() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let transport = ReplayTransport::record_only(temp_dir.path(), echo.clone());
    let file = temp_dir.path().join("http/example.com/GET/x/request.json");

    let first = transport.round_trip(get("http://example.com/x")).await.unwrap();
    assert_eq!(first.headers()["x-call"], "1");
    assert!(std::fs::read_to_string(&file).unwrap().contains("\"1\""));

    let second = transport.round_trip(get("http://example.com/x")).await.unwrap();
    assert_eq!(second.headers()["x-call"], "2");
    assert_eq!(echo.calls(), 2);

    let saved = std::fs::read_to_string(&file).unwrap();
    assert!(saved.contains("\"2\""));
    assert!(!saved.contains("\"1\""));
}

#[tokio::test]
async fn test_record_if_missing_replays_post_body() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let transport = ReplayTransport::new(temp_dir.path(), echo.clone());

    let live = transport
        .round_trip(request(Method::POST, "http://example.com/", "bodya"))
        .await
        .unwrap();
    let live_text = text_of(live).await;
    // The downstream transport saw the whole body after it was hashed
    assert!(live_text.ends_with("\n\nbodya"));
    assert_eq!(echo.calls(), 1);

    let replayed = transport
        .round_trip(request(Method::POST, "http://example.com/", "bodya"))
        .await
        .unwrap();
    assert_eq!(replayed.headers()["x-call"], "1");
    assert_eq!(text_of(replayed).await, live_text);
    assert_eq!(echo.calls(), 1);

    let other = transport
        .round_trip(request(Method::PUT, "http://example.com/", "bodyb"))
        .await
        .unwrap();
    assert!(text_of(other).await.ends_with("bodyb"));
    assert_eq!(echo.calls(), 2);
}

#[tokio::test]
async fn test_headers_select_recordings() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let transport = ReplayTransport::new(temp_dir.path(), echo.clone());

    let with_header = |name: &str, value: &str| {
        let mut req = get("http://example.com/test/path");
        req.headers_mut()
            .insert(name.parse::<hyper::header::HeaderName>().unwrap(), value.parse().unwrap());
        req
    };

    transport.round_trip(with_header("Header-A", "a")).await.unwrap();
    transport.round_trip(with_header("Header-B", "b")).await.unwrap();
    assert_eq!(echo.calls(), 2);

    let a = text_of(transport.round_trip(with_header("Header-A", "a")).await.unwrap()).await;
    assert!(a.contains("header-a: a"));
    assert!(!a.contains("header-b"));

    let b = text_of(transport.round_trip(with_header("Header-B", "b")).await.unwrap()).await;
    assert!(b.contains("header-b: b"));
    assert!(!b.contains("header-a"));

    assert_eq!(echo.calls(), 2);
}

#[tokio::test]
async fn test_excluded_headers_share_recording() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let transport = ReplayTransport::new(temp_dir.path(), echo.clone());

    for token in ["Bearer one", "Bearer two"] {
        let mut req = get("http://example.com/private");
        req.headers_mut()
            .insert(hyper::header::AUTHORIZATION, token.parse().unwrap());
        transport.round_trip(req).await.unwrap();
    }

    assert_eq!(echo.calls(), 1);
    assert!(temp_dir
        .path()
        .join("http/example.com/GET/private/request.json")
        .is_file());
}

#[tokio::test]
async fn test_query_string_selects_recordings() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let transport = ReplayTransport::new(temp_dir.path(), echo.clone());

    let a = text_of(transport.round_trip(get("http://example.com/?a=1")).await.unwrap()).await;
    let b = text_of(transport.round_trip(get("http://example.com/?b=2")).await.unwrap()).await;
    assert_eq!(echo.calls(), 2);

    let a_again =
        text_of(transport.round_trip(get("http://example.com/?a=1")).await.unwrap()).await;
    let b_again =
        text_of(transport.round_trip(get("http://example.com/?b=2")).await.unwrap()).await;
    assert_eq!(a_again, a);
    assert_eq!(b_again, b);
    assert_eq!(echo.calls(), 2);
}

#[tokio::test]
async fn test_omitted_query_parameter() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let mut generator = PathGenerator::new();
    generator.omit_query.insert("nonce".to_string());
    let transport =
        ReplayTransport::new(temp_dir.path(), echo.clone()).with_path_generator(generator);

    transport
        .round_trip(get("http://example.com/api?q=rust&nonce=1"))
        .await
        .unwrap();
    transport
        .round_trip(get("http://example.com/api?nonce=2&q=rust"))
        .await
        .unwrap();

    assert_eq!(echo.calls(), 1);
}

#[tokio::test]
async fn test_generic_path_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();

    // No discriminating content, so this lands on the generic path
    ReplayTransport::record_only(temp_dir.path(), echo.clone())
        .round_trip(get("http://example.com/generic"))
        .await
        .unwrap();

    let qualified = || {
        let mut req = get("http://example.com/generic");
        req.headers_mut()
            .insert("x-trace", "abc".parse().unwrap());
        req
    };

    let lenient = ReplayTransport::playback_only(temp_dir.path());
    let response = lenient.round_trip(qualified()).await.unwrap();
    assert_eq!(response.headers()["x-call"], "1");

    let strict = ReplayTransport::playback_only(temp_dir.path()).with_strict_path(true);
    let err = strict.round_trip(qualified()).await.unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(echo.calls(), 1);
}

#[tokio::test]
async fn test_transport_error_passes_through() {
    let temp_dir = TempDir::new().unwrap();
    let transport = ReplayTransport::new(temp_dir.path(), UnreachableTransport);

    let err = transport
        .round_trip(get("http://example.com/down"))
        .await
        .unwrap_err();

    let source = err.transport_error().unwrap();
    let io = source.downcast_ref::<std::io::Error>().unwrap();
    assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
}

#[tokio::test]
async fn test_save_failure_keeps_response() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();

    let echo = EchoTransport::default();
    let transport = ReplayTransport::record_only(&blocker, echo.clone());

    let err = transport
        .round_trip(request(Method::POST, "http://example.com/save", "payload"))
        .await
        .unwrap_err();

    let interception = match err {
        ReplayError::Interception(interception) => interception,
        other => panic!("expected interception error, got {other:?}"),
    };
    assert!(matches!(interception.cause(), InterceptionCause::Storage(_)));
    assert_eq!(interception.request().method(), Method::POST);
    assert_eq!(interception.request().body().as_bytes().unwrap(), "payload");

    let response = interception.response().unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(echo.calls(), 1);
}

#[tokio::test]
async fn test_nested_interceptor_as_transport() {
    let outer_dir = TempDir::new().unwrap();
    let inner_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();

    let inner = ReplayTransport::new(inner_dir.path(), echo.clone());
    let outer = ReplayTransport::record_only(outer_dir.path(), inner);

    outer.round_trip(get("http://example.com/n")).await.unwrap();
    outer.round_trip(get("http://example.com/n")).await.unwrap();

    // The inner interceptor answered the second call from disk
    assert_eq!(echo.calls(), 1);
    assert_eq!(outer.inner().mode(), Mode::RecordIfMissing);
}

async fn spawn_server(hits: Arc<AtomicUsize>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let hits = Arc::clone(&hits);
            let service = service_fn(move |_request: Request<Incoming>| {
                hits.fetch_add(1, Ordering::SeqCst);
                async {
                    let response = Response::builder()
                        .status(StatusCode::NOT_FOUND)
                        .header("X-Custom-Header", "CustomValue")
                        .body(Full::new(Bytes::from_static(b"nothing here\n")))
                        .unwrap();
                    Ok::<_, Infallible>(response)
                }
            });

            tokio::spawn(async move {
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

#[tokio::test]
async fn test_record_replay_over_loopback() {
    let temp_dir = TempDir::new().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let addr = spawn_server(Arc::clone(&hits)).await;
    let url = format!("http://{addr}/test/path");

    let transport = ReplayTransport::new(temp_dir.path(), HyperTransport::new());

    for _ in 0..2 {
        let response = transport.round_trip(get(&url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-custom-header"], "CustomValue");
        assert_eq!(text_of(response).await, "nothing here\n");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let host = httpreplay::fingerprint::query_escape(&addr.to_string());
    let saved = temp_dir
        .path()
        .join(format!("http/{host}/GET/test/path/request.json"));
    let recording = httpreplay::Recording::load(&saved).unwrap();
    assert_eq!(recording.status, "404 Not Found");
    assert_eq!(recording.proto, "HTTP/1.1");
}

#[tokio::test]
async fn test_malformed_recording_does_not_fall_back_to_network() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("http/example.com/GET/broken");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("request.json"), "{bad").unwrap();

    let echo = EchoTransport::default();
    let transport = ReplayTransport::new(temp_dir.path(), echo.clone());

    let err = transport
        .round_trip(get("http://example.com/broken"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReplayError::Storage(StorageError::Malformed { .. })
    ));
    assert!(!err.is_not_found());
    assert_eq!(echo.calls(), 0);
}

#[tokio::test]
async fn test_unreadable_request_body_is_interception_error() {
    let temp_dir = TempDir::new().unwrap();
    let echo = EchoTransport::default();
    let transport = ReplayTransport::new(temp_dir.path(), echo.clone());

    let err = transport
        .round_trip(request(
            Method::POST,
            "http://example.com/upload",
            ReplayBody::new(FailingBody),
        ))
        .await
        .unwrap_err();

    let interception = match err {
        ReplayError::Interception(interception) => interception,
        other => panic!("expected interception error, got {other:?}"),
    };
    assert!(matches!(
        interception.cause(),
        InterceptionCause::Fingerprint(_)
    ));
    assert!(interception.response().is_none());
    assert_eq!(interception.request().uri(), "http://example.com/upload");
    assert_eq!(echo.calls(), 0);
}

#[tokio::test]
async fn test_unreadable_response_body_is_interception_error() {
    let temp_dir = TempDir::new().unwrap();
    let broken = BrokenBodyTransport::default();
    let transport = ReplayTransport::new(temp_dir.path(), broken.clone());

    let err = transport
        .round_trip(get("http://example.com/flaky"))
        .await
        .unwrap_err();

    let interception = match err {
        ReplayError::Interception(interception) => interception,
        other => panic!("expected interception error, got {other:?}"),
    };
    assert!(matches!(
        interception.cause(),
        InterceptionCause::Storage(StorageError::ReadBody(_))
    ));
    assert!(interception.response().is_some());
    assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    assert!(!temp_dir.path().join("http").exists());
}
