// SPDX-License-Identifier: Apache-2.0

use crate::exporters::config::{ExporterConfig, Protocol};
use crate::init::parse;
use crate::receivers::stdin::StdinReceiverConfig;
use crate::receivers::stdin::config::DEFAULT_MAX_LINE_BYTES;
use clap::Args;
use std::time::Duration;

pub const DEFAULT_SENDING_QUEUE_SIZE: usize = 1_000;

#[derive(Debug, Args, Clone)]
pub struct AgentRun {
    /// Exporter protocol: otlp, otlphttp or splunk_hec. Unknown values select otlp
    #[arg(long, env = "STDINOTEL_PROTOCOL", default_value = "otlp", value_parser = parse::parse_protocol)]
    pub protocol: Protocol,

    /// Exporter endpoint. Defaults to localhost:4317 (otlp) or localhost:4318 (otlphttp)
    #[arg(long, env = "STDINOTEL_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Splunk HEC token
    #[arg(long, env = "STDINOTEL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Splunk index
    #[arg(long, env = "STDINOTEL_SPLUNK_INDEX")]
    pub splunk_index: Option<String>,

    /// Skip TLS certificate verification. Only the value `true` enables it
    #[arg(
        long,
        env = "STDINOTEL_TLS_INSECURE_SKIP_VERIFY",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse::parse_true_only
    )]
    pub tls_insecure_skip_verify: bool,

    /// Longest accepted input line in bytes, excluding the line terminator
    #[arg(long, env = "STDINOTEL_MAX_LINE_BYTES", default_value_t = DEFAULT_MAX_LINE_BYTES)]
    pub max_line_bytes: usize,

    /// Comma-separated, key=value pairs of resource attributes to set
    #[arg(long, env = "STDINOTEL_RESOURCE_ATTRIBUTES", value_parser = parse::parse_key_val::<String, String>, value_delimiter = ',')]
    pub resource_attributes: Vec<(String, String)>,

    /// Do not add the host.name resource attribute
    #[arg(long, env = "STDINOTEL_DISABLE_HOST_NAME", default_value = "false")]
    pub disable_host_name: bool,

    /// Number of records buffered between the receiver and the exporter
    #[arg(long, env = "STDINOTEL_SENDING_QUEUE_SIZE", default_value_t = DEFAULT_SENDING_QUEUE_SIZE)]
    pub sending_queue_size: usize,

    /// Timeout for a single export request
    #[arg(long, env = "STDINOTEL_EXPORT_TIMEOUT_MS", default_value = "5000")]
    pub export_timeout_ms: u64,

    /// How long queued records may take to flush on shutdown
    #[arg(long, env = "STDINOTEL_SHUTDOWN_TIMEOUT_MS", default_value = "3000")]
    pub shutdown_timeout_ms: u64,
}

impl AgentRun {
    pub fn receiver_config(&self) -> StdinReceiverConfig {
        StdinReceiverConfig::default()
            .with_max_line_bytes(self.max_line_bytes)
            .with_host_name(!self.disable_host_name)
            .with_resource_attributes(self.resource_attributes.clone())
    }

    pub fn exporter_config(&self) -> ExporterConfig {
        let mut config = ExporterConfig::new(self.protocol)
            .with_tls_skip_verify(self.tls_insecure_skip_verify)
            .with_request_timeout(Duration::from_millis(self.export_timeout_ms));

        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        if self.protocol == Protocol::SplunkHec {
            if let Some(token) = &self.token {
                config = config.with_token(token);
            }
            if let Some(index) = &self.splunk_index {
                config = config.with_splunk_index(index);
            }
        }
        config
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
