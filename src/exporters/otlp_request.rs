// SPDX-License-Identifier: Apache-2.0

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Request};
use http_body_util::Full;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use prost::Message;
use tower::BoxError;

pub const LOGS_GRPC_SERVICE_PATH: &str = "/opentelemetry.proto.collector.logs.v1.LogsService/Export";
pub const LOGS_RELATIVE_HTTP_PATH: &str = "v1/logs";

// one byte for the compression flag plus four bytes for the length
const GRPC_HEADER_SIZE: usize = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OtlpTransport {
    Grpc,
    Http,
}

/// Builds OTLP log export requests against a single endpoint
#[derive(Clone, Debug)]
pub struct OtlpRequestBuilder {
    uri: String,
    transport: OtlpTransport,
    headers: HeaderMap,
}

impl OtlpRequestBuilder {
    pub fn new(endpoint: &str, transport: OtlpTransport) -> Result<Self, BoxError> {
        let uri = endpoint_build(endpoint, transport)?;

        let mut headers = HeaderMap::new();
        match transport {
            OtlpTransport::Grpc => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
                headers.insert("te", HeaderValue::from_static("trailers"));
            }
            OtlpTransport::Http => {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-protobuf"),
                );
            }
        }
        headers.insert(USER_AGENT, user_agent());

        Ok(Self {
            uri: uri.to_string(),
            transport,
            headers,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn build(&self, logs: ResourceLogs) -> Result<Request<Full<Bytes>>, BoxError> {
        let message = ExportLogsServiceRequest {
            resource_logs: vec![logs],
        };

        let body = match self.transport {
            OtlpTransport::Grpc => grpc_encode_body(&message)?,
            OtlpTransport::Http => Bytes::from(message.encode_to_vec()),
        };

        let mut builder = hyper::Request::builder().method(Method::POST).uri(&self.uri);
        if let Some(hdrs) = builder.headers_mut() {
            hdrs.extend(self.headers.clone());
        }

        builder
            .body(Full::from(body))
            .map_err(|e| format!("failed to build request: {}", e).into())
    }
}

/// Length prefixed gRPC message frame, uncompressed
pub fn grpc_encode_body<T: Message>(msg: &T) -> Result<Bytes, BoxError> {
    let len = msg.encoded_len();
    let frame_len =
        u32::try_from(len).map_err(|_| format!("message too large for gRPC: {} bytes", len))?;

    let mut buf = BytesMut::with_capacity(GRPC_HEADER_SIZE + len);
    buf.put_u8(0);
    buf.put_u32(frame_len);
    msg.encode(&mut buf)
        .map_err(|e| format!("failed to encode message: {}", e))?;

    Ok(buf.freeze())
}

pub(crate) fn user_agent() -> HeaderValue {
    HeaderValue::from_static(concat!("stdinotel/", env!("CARGO_PKG_VERSION")))
}

/// Resolve the request URL for an endpoint.
///
/// A missing scheme means plain `http`. gRPC always uses the absolute service
/// path, HTTP appends `v1/logs` to whatever base path was given.
fn endpoint_build(endpoint: &str, transport: OtlpTransport) -> Result<url::Url, BoxError> {
    let mut uri = if endpoint.contains("://") {
        url::Url::parse(endpoint)
    } else {
        url::Url::parse(&format!("http://{}", endpoint))
    }
    .map_err(|e| format!("failed to parse endpoint {:?}: {}", endpoint, e))?;

    let uri = match transport {
        OtlpTransport::Grpc => uri.join(LOGS_GRPC_SERVICE_PATH)?,
        OtlpTransport::Http => {
            // Without a trailing slash the join would drop the last path segment
            if !uri.path().ends_with('/') {
                let path = format!("{}/", uri.path());
                uri.set_path(&path);
            }
            uri.join(LOGS_RELATIVE_HTTP_PATH)?
        }
    };

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::stdin::config::StdinReceiverConfig;
    use crate::receivers::stdin::convert::LogConverter;

    fn build(endpoint: &str, transport: OtlpTransport) -> String {
        endpoint_build(endpoint, transport).unwrap().to_string()
    }

    #[test]
    fn test_endpoint_build() {
        let grpc_path = LOGS_GRPC_SERVICE_PATH;
        assert_eq!(
            build("localhost:4317", OtlpTransport::Grpc),
            format!("http://localhost:4317{}", grpc_path)
        );
        assert_eq!(
            build("https://collector:4317/ignored", OtlpTransport::Grpc),
            format!("https://collector:4317{}", grpc_path)
        );

        assert_eq!(
            build("localhost:4318", OtlpTransport::Http),
            "http://localhost:4318/v1/logs"
        );
        assert_eq!(
            build("http://localhost:4318/", OtlpTransport::Http),
            "http://localhost:4318/v1/logs"
        );
        assert_eq!(
            build("http://localhost:4318/otlp", OtlpTransport::Http),
            "http://localhost:4318/otlp/v1/logs"
        );
        assert_eq!(
            build("127.0.0.1:4318", OtlpTransport::Http),
            "http://127.0.0.1:4318/v1/logs"
        );
    }

    #[test]
    fn test_grpc_frame_header() {
        let converter = LogConverter::new(&StdinReceiverConfig::default().with_host_name(false));
        let message = ExportLogsServiceRequest {
            resource_logs: vec![converter.convert("foo".to_string())],
        };

        let body = grpc_encode_body(&message).unwrap();

        assert_eq!(body[0], 0);
        let len = u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize;
        assert_eq!(len, body.len() - GRPC_HEADER_SIZE);
        let decoded = ExportLogsServiceRequest::decode(&body[GRPC_HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_http_request_headers() {
        let builder = OtlpRequestBuilder::new("localhost:4318", OtlpTransport::Http).unwrap();
        let converter = LogConverter::new(&StdinReceiverConfig::default().with_host_name(false));

        let req = builder.build(converter.convert("bar".to_string())).unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), "http://localhost:4318/v1/logs");
        assert_eq!(
            req.headers().get(CONTENT_TYPE).unwrap(),
            "application/x-protobuf"
        );
        assert!(req.headers().get("te").is_none());
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(OtlpRequestBuilder::new("http://[::1", OtlpTransport::Http).is_err());
    }
}
