// SPDX-License-Identifier: Apache-2.0

use crate::exporters::tls::TlsConfig;
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use thiserror::Error;
use tonic::{Code, Status};
use tower::BoxError;

// error bodies are only kept for logging
const MAX_ERROR_BODY_LEN: usize = 512;

pub type HttpsClient = HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// How a response body must be interpreted to decide success
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseKind {
    Grpc,
    Http,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("unable to connect: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Transport(BoxError),

    #[error("server responded with HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("server responded with gRPC status {code:?}: {message}")]
    Grpc { code: Code, message: String },
}

pub(crate) fn build_hyper_client(
    tls_config: TlsConfig,
    http2_only: bool,
) -> Result<HttpsClient, BoxError> {
    let client_config = tls_config.into_client_config()?;

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(client_config)
        .https_or_http()
        .enable_all_versions()
        .build();

    let client = HyperClient::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(8)
        .http2_only(http2_only)
        .timer(TokioTimer::new())
        .build::<_, Full<Bytes>>(https);

    Ok(client)
}

/// Sends fully built requests and maps every non success outcome to a
/// [`SendError`].
#[derive(Clone)]
pub struct ExportClient {
    inner: HttpsClient,
    kind: ResponseKind,
}

impl ExportClient {
    pub fn build(tls_config: TlsConfig, kind: ResponseKind) -> Result<Self, BoxError> {
        let inner = build_hyper_client(tls_config, kind == ResponseKind::Grpc)?;
        Ok(Self { inner, kind })
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub async fn send(&self, req: Request<Full<Bytes>>) -> Result<(), SendError> {
        let resp = self.inner.request(req).await.map_err(|e| {
            if e.is_connect() {
                SendError::Connect(e.to_string())
            } else {
                SendError::Transport(e.into())
            }
        })?;

        let (head, body) = resp.into_parts();

        if !head.status.is_success() {
            let body = match body.collect().await {
                Ok(collected) => error_body(&collected.to_bytes()),
                Err(_) => String::new(),
            };
            return Err(SendError::Http {
                status: head.status,
                body,
            });
        }

        if self.kind == ResponseKind::Grpc {
            // Trailers-only responses carry the status in the headers
            if let Some(err) = grpc_status_error(&head.headers) {
                return Err(err);
            }
        }

        let collected = body
            .collect()
            .await
            .map_err(|e| SendError::Transport(format!("failed reading response: {}", e).into()))?;

        if self.kind == ResponseKind::Grpc {
            if let Some(err) = collected.trailers().and_then(grpc_status_error) {
                return Err(err);
            }
        }

        Ok(())
    }
}

/// A non-OK gRPC status found in `headers`, if any
pub fn grpc_status_error(headers: &HeaderMap) -> Option<SendError> {
    let status = Status::from_header_map(headers)?;
    if status.code() == Code::Ok {
        return None;
    }
    Some(SendError::Grpc {
        code: status.code(),
        message: status.message().to_string(),
    })
}

fn error_body(body: &Bytes) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_BODY_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
