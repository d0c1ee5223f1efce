use bytes::Bytes;
use engineioxide_core::payload::Payload;
use futures_util::{FutureExt, future::BoxFuture};
use http::{Request, Response, header::CONTENT_TYPE};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{Client, ResponseFuture, connect::HttpConnector},
    rt::TokioExecutor,
};

use crate::errors::{BoxError, Error};

/// The http client used by the polling transport.
///
/// It is implemented for any [`hyper::service::Service`] taking a `Request<Full<Bytes>>`,
/// so custom clients (tls, proxies, in-memory servers for tests) can be plugged in.
pub trait PollingSvc: Clone + Send + Sync + 'static {
    /// Send the request and collect the response payload.
    /// A non-2xx response is an [`Error::HttpStatus`].
    fn send(&self, req: Request<Full<Bytes>>) -> BoxFuture<'static, Result<Payload, Error>>;
}

impl<S, B> PollingSvc for S
where
    S: hyper::service::Service<Request<Full<Bytes>>, Response = Response<B>>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    fn send(&self, req: Request<Full<Bytes>>) -> BoxFuture<'static, Result<Payload, Error>> {
        let res = self.call(req);
        async move {
            let res = res.await.map_err(|e| Error::HttpClient(e.into()))?;
            if !res.status().is_success() {
                return Err(Error::HttpStatus(res.status()));
            }
            let has_binary = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.starts_with("application/octet-stream"));
            let body = res
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::HttpClient(e.into()))?
                .to_bytes();
            Ok(Payload::new(body, has_binary))
        }
        .boxed()
    }
}

/// The default http client, a plain http/1 `hyper-util` client
#[derive(Debug, Clone)]
pub struct HyperClient {
    inner: Client<HttpConnector, Full<Bytes>>,
}

impl HyperClient {
    /// Create a client running on the current tokio runtime
    pub fn new() -> Self {
        Self {
            inner: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HyperClient {
    fn default() -> Self {
        Self::new()
    }
}

impl hyper::service::Service<Request<Full<Bytes>>> for HyperClient {
    type Response = Response<Incoming>;
    type Error = hyper_util::client::legacy::Error;
    type Future = ResponseFuture;

    fn call(&self, req: Request<Full<Bytes>>) -> Self::Future {
        self.inner.request(req)
    }
}
