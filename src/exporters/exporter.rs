// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::BoundedReceiver;
use crate::exporters::client::{ExportClient, ResponseKind, SendError};
use crate::exporters::config::{ExporterConfig, Protocol};
use crate::exporters::get_meter;
use crate::exporters::otlp_request::{OtlpRequestBuilder, OtlpTransport};
use crate::exporters::splunk_hec::HecRequestBuilder;
use crate::exporters::tls::TlsConfig;
use bytes::Bytes;
use http::Request;
use http_body_util::Full;
use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use std::time::Duration;
use tokio::select;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

/// Encodes records for the configured destination
#[derive(Clone, Debug)]
pub enum LogsRequestBuilder {
    Otlp(OtlpRequestBuilder),
    SplunkHec(HecRequestBuilder),
}

impl LogsRequestBuilder {
    pub fn from_config(config: &ExporterConfig) -> Result<Self, BoxError> {
        let endpoint = config.resolved_endpoint()?;

        let builder = match config.protocol {
            Protocol::Otlp => {
                Self::Otlp(OtlpRequestBuilder::new(&endpoint, OtlpTransport::Grpc)?)
            }
            Protocol::OtlpHttp => {
                Self::Otlp(OtlpRequestBuilder::new(&endpoint, OtlpTransport::Http)?)
            }
            Protocol::SplunkHec => Self::SplunkHec(HecRequestBuilder::new(
                &endpoint,
                config.token.as_deref(),
                config.splunk_index.as_deref(),
            )?),
        };
        Ok(builder)
    }

    pub fn uri(&self) -> &str {
        match self {
            Self::Otlp(b) => b.uri(),
            Self::SplunkHec(b) => b.uri(),
        }
    }

    pub fn build(&self, logs: ResourceLogs) -> Result<Request<Full<Bytes>>, BoxError> {
        match self {
            Self::Otlp(b) => b.build(logs),
            Self::SplunkHec(b) => b.build(logs),
        }
    }
}

fn response_kind(protocol: Protocol) -> ResponseKind {
    match protocol {
        Protocol::Otlp => ResponseKind::Grpc,
        Protocol::OtlpHttp | Protocol::SplunkHec => ResponseKind::Http,
    }
}

/// Reads records from the pipeline channel and sends each one to the
/// destination. Failed sends are logged and counted, never retried.
pub struct LogsExporter {
    protocol: Protocol,
    rx: BoundedReceiver<ResourceLogs>,
    client: ExportClient,
    builder: LogsRequestBuilder,
    request_timeout: Duration,
    metrics: ExporterMetrics,
}

impl LogsExporter {
    pub fn new(
        config: &ExporterConfig,
        rx: BoundedReceiver<ResourceLogs>,
    ) -> Result<Self, BoxError> {
        config.validate()?;

        let has_token = config.token.as_deref().is_some_and(|t| !t.is_empty());
        if config.protocol == Protocol::SplunkHec && !has_token {
            warn!("No token configured for the splunk_hec exporter");
        }

        let builder = LogsRequestBuilder::from_config(config)?;
        let client = ExportClient::build(
            TlsConfig::new(config.tls_skip_verify),
            response_kind(config.protocol),
        )?;

        Ok(Self {
            protocol: config.protocol,
            rx,
            client,
            builder,
            request_timeout: config.request_timeout,
            metrics: ExporterMetrics::new(config.protocol),
        })
    }

    /// Runs until every sender is gone and the channel is empty, or until
    /// `cancel` fires. Records still queued at cancellation are dropped.
    pub async fn start(mut self, cancel: CancellationToken) -> Result<(), BoxError> {
        info!(
            exporter = %self.protocol,
            endpoint = self.builder.uri(),
            "Logs exporter starting"
        );

        let mut exported: u64 = 0;
        loop {
            select! {
                biased;

                _ = cancel.cancelled() => {
                    let dropped = self.rx.len();
                    if dropped > 0 {
                        warn!(dropped, "Logs exporter cancelled with records still queued");
                    }
                    break;
                },

                logs = self.rx.next() => match logs {
                    Some(logs) => {
                        if self.export(logs).await {
                            exported += 1;
                        }
                    }
                    None => {
                        debug!("Logs exporter input closed");
                        break;
                    }
                },
            }
        }

        info!(exporter = %self.protocol, exported, "Logs exporter stopped");
        Ok(())
    }

    async fn export(&self, logs: ResourceLogs) -> bool {
        let count = record_count(&logs);

        let req = match self.builder.build(logs) {
            Ok(req) => req,
            Err(e) => {
                error!(error = %e, "Failed to encode log records");
                self.metrics.add_failed(count, "request.encode");
                return false;
            }
        };

        match timeout(self.request_timeout, self.client.send(req)).await {
            Ok(Ok(())) => {
                self.metrics.add_sent(count);
                true
            }
            Ok(Err(e)) => {
                warn!(exporter = %self.protocol, error = %e, "Failed to export log records");
                self.metrics.add_failed(count, failure_reason(&e));
                false
            }
            Err(_) => {
                warn!(
                    exporter = %self.protocol,
                    timeout = ?self.request_timeout,
                    "Timed out exporting log records"
                );
                self.metrics.add_failed(count, "timeout");
                false
            }
        }
    }
}

fn record_count(logs: &ResourceLogs) -> u64 {
    logs.scope_logs
        .iter()
        .map(|sl| sl.log_records.len() as u64)
        .sum()
}

fn failure_reason(e: &SendError) -> &'static str {
    match e {
        SendError::Connect(_) => "connect",
        SendError::Transport(_) => "transport",
        SendError::Http { .. } => "http.status",
        SendError::Grpc { .. } => "grpc.status",
    }
}

struct ExporterMetrics {
    sent: Counter<u64>,
    send_failed: Counter<u64>,
    exporter: &'static str,
}

impl ExporterMetrics {
    fn new(protocol: Protocol) -> Self {
        Self {
            sent: get_meter()
                .u64_counter("stdinotel_exporter_sent_log_records")
                .with_description("Number of log records successfully sent to the destination.")
                .with_unit("log_records")
                .build(),
            send_failed: get_meter()
                .u64_counter("stdinotel_exporter_send_failed_log_records")
                .with_description(
                    "Number of log records that could not be sent to the destination.",
                )
                .with_unit("log_records")
                .build(),
            exporter: protocol.name(),
        }
    }

    fn add_sent(&self, count: u64) {
        self.sent.add(count, &[KeyValue::new("exporter", self.exporter)]);
    }

    fn add_failed(&self, count: u64, reason: &'static str) {
        self.send_failed.add(
            count,
            &[
                KeyValue::new("exporter", self.exporter),
                KeyValue::new("error", reason),
            ],
        );
    }
}
