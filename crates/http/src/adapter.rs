//! Bridge between the legacy streaming transport and `Request`/`Response`.
//!
//! The legacy side exposes a request as method, raw path, raw header pairs
//! and a chunk stream, and a response as a sink with `write_head`, `write`
//! and `end`. Heads always go out before body bytes and every response is
//! finalized exactly once, by `end` or, when streaming failed, by `abort`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{HOST, HeaderName, HeaderValue};
use axum::http::{Method, Request, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::{mpsc, oneshot};

use crate::error::AdapterError;

pub type ChunkStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

pub enum LegacyBody {
    Empty,
    Stream(ChunkStream),
    /// Chunks the transport has already read into memory.
    Buffered(Vec<Bytes>),
}

impl std::fmt::Debug for LegacyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LegacyBody::Empty => f.write_str("Empty"),
            LegacyBody::Stream(_) => f.write_str("Stream(..)"),
            LegacyBody::Buffered(chunks) => write!(f, "Buffered({} chunks)", chunks.len()),
        }
    }
}

#[derive(Debug)]
pub struct LegacyRequest {
    pub method: String,
    /// Path and query as received, e.g. `/__monoserve/a.remote.ts?x=1`.
    pub url: String,
    pub raw_headers: Vec<(String, String)>,
    pub body: LegacyBody,
}

impl LegacyRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            raw_headers: Vec::new(),
            body: LegacyBody::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.raw_headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: LegacyBody) -> Self {
        self.body = body;
        self
    }

    /// Split an axum request into its legacy form, keeping the body streaming.
    pub fn from_axum(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let mut raw_headers = Vec::with_capacity(parts.headers.len() + 1);
        if let Some(authority) = parts.uri.authority() {
            raw_headers.push((":authority".to_string(), authority.to_string()));
        }
        for (name, value) in parts.headers.iter() {
            raw_headers.push((
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ));
        }
        let stream = body
            .into_data_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();
        Self {
            method: parts.method.as_str().to_string(),
            url,
            raw_headers,
            body: LegacyBody::Stream(stream),
        }
    }
}

/// Legacy response sink.
#[async_trait]
pub trait LegacyResponse: Send {
    async fn write_head(
        &mut self,
        status: u16,
        headers: &[(String, String)],
    ) -> Result<(), AdapterError>;
    async fn write(&mut self, chunk: Bytes) -> Result<(), AdapterError>;
    async fn end(&mut self) -> Result<(), AdapterError>;

    /// Finalize after a failed stream. Sinks that can signal a broken
    /// connection should do so instead of looking complete.
    async fn abort(&mut self, _error: &AdapterError) -> Result<(), AdapterError> {
        self.end().await
    }
}

fn may_have_body(method: &Method) -> bool {
    !(method == Method::GET || method == Method::HEAD)
}

/// Build a `Request` from a legacy incoming request.
pub fn to_request(legacy: LegacyRequest) -> Result<Request<Body>, AdapterError> {
    let method = Method::from_bytes(legacy.method.as_bytes())
        .map_err(|_| AdapterError::InvalidMethod(legacy.method.clone()))?;

    let host = legacy
        .raw_headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(HOST.as_str()))
        .or_else(|| legacy.raw_headers.iter().find(|(name, _)| name == ":authority"))
        .map(|(_, value)| value.as_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("localhost");
    let path = if legacy.url.starts_with('/') {
        legacy.url.clone()
    } else {
        format!("/{}", legacy.url)
    };
    let url = format!("http://{}{}", host, path);

    let mut builder = Request::builder().method(method.clone()).uri(url.as_str());
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in &legacy.raw_headers {
            if name.starts_with(':') {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => tracing::debug!("dropping malformed header {:?}", name),
            }
        }
    }

    let body = if !may_have_body(&method) {
        Body::empty()
    } else {
        match legacy.body {
            LegacyBody::Empty => Body::empty(),
            LegacyBody::Stream(stream) => Body::from_stream(stream),
            LegacyBody::Buffered(chunks) => {
                let mut joined = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
                for chunk in chunks {
                    joined.extend_from_slice(&chunk);
                }
                Body::from(joined.freeze())
            }
        }
    };

    builder
        .body(body)
        .map_err(|_| AdapterError::InvalidUri(url))
}

/// Write `response` to a legacy sink: head, then each body chunk, then end.
/// A failed stream is finalized with `abort` instead, so the sink is closed
/// exactly once either way.
pub async fn send_response(
    out: &mut dyn LegacyResponse,
    response: Response<Body>,
) -> Result<(), AdapterError> {
    match stream_response(&mut *out, response).await {
        Ok(()) => out.end().await,
        Err(err) => {
            if let Err(abort_err) = out.abort(&err).await {
                tracing::debug!("abort after failed stream: {}", abort_err);
            }
            Err(err)
        }
    }
}

async fn stream_response(
    out: &mut dyn LegacyResponse,
    response: Response<Body>,
) -> Result<(), AdapterError> {
    let (parts, body) = response.into_parts();
    let headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    out.write_head(parts.status.as_u16(), &headers).await?;

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.is_empty() {
            out.write(chunk).await?;
        }
    }
    Ok(())
}

type Head = (u16, Vec<(String, String)>);

/// Legacy sink whose output is read back through a [`PendingResponse`].
pub struct ChannelResponse {
    head: Option<oneshot::Sender<Head>>,
    body: Option<mpsc::Sender<Result<Bytes, std::io::Error>>>,
}

pub struct PendingResponse {
    head: oneshot::Receiver<Head>,
    body: mpsc::Receiver<Result<Bytes, std::io::Error>>,
}

/// A connected sink and the response it produces.
pub fn channel_response() -> (ChannelResponse, PendingResponse) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(16);
    (
        ChannelResponse {
            head: Some(head_tx),
            body: Some(body_tx),
        },
        PendingResponse {
            head: head_rx,
            body: body_rx,
        },
    )
}

#[async_trait]
impl LegacyResponse for ChannelResponse {
    async fn write_head(
        &mut self,
        status: u16,
        headers: &[(String, String)],
    ) -> Result<(), AdapterError> {
        let head = self.head.take().ok_or(AdapterError::HeadAlreadySent)?;
        head.send((status, headers.to_vec()))
            .map_err(|_| AdapterError::Disconnected)
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), AdapterError> {
        if self.head.is_some() {
            return Err(AdapterError::HeadNotSent);
        }
        let body = self.body.as_ref().ok_or(AdapterError::Disconnected)?;
        body.send(Ok(chunk))
            .await
            .map_err(|_| AdapterError::Disconnected)
    }

    async fn end(&mut self) -> Result<(), AdapterError> {
        self.body.take();
        Ok(())
    }

    /// Close the body with an error chunk so the server resets the
    /// connection rather than ending a truncated body cleanly.
    async fn abort(&mut self, error: &AdapterError) -> Result<(), AdapterError> {
        self.head.take();
        if let Some(body) = self.body.take() {
            let failure = std::io::Error::other(error.to_string());
            body.send(Err(failure))
                .await
                .map_err(|_| AdapterError::Disconnected)?;
        }
        Ok(())
    }
}

impl PendingResponse {
    /// Wait for the head and return a response streaming the rest.
    pub async fn into_response(self) -> Result<Response<Body>, AdapterError> {
        let (status, headers) = self.head.await.map_err(|_| AdapterError::Disconnected)?;

        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let stream = futures_util::stream::unfold(self.body, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        Ok(builder.body(Body::from_stream(stream))?)
    }
}
