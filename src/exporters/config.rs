// SPDX-License-Identifier: Apache-2.0

use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_OTLP_GRPC_ENDPOINT: &str = "localhost:4317";
pub const DEFAULT_OTLP_HTTP_ENDPOINT: &str = "localhost:4318";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Destination protocol for exported log records
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Protocol {
    #[default]
    Otlp,
    OtlpHttp,
    SplunkHec,
}

impl Protocol {
    /// Unrecognized names select the default protocol rather than failing.
    pub fn from_name(name: &str) -> Self {
        match name {
            "splunk_hec" => Protocol::SplunkHec,
            "otlphttp" => Protocol::OtlpHttp,
            _ => Protocol::Otlp,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Otlp => "otlp",
            Protocol::OtlpHttp => "otlphttp",
            Protocol::SplunkHec => "splunk_hec",
        }
    }

    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            Protocol::Otlp => Some(DEFAULT_OTLP_GRPC_ENDPOINT),
            Protocol::OtlpHttp => Some(DEFAULT_OTLP_HTTP_ENDPOINT),
            Protocol::SplunkHec => None,
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExporterConfigError {
    #[error("an endpoint is required for the {0} exporter")]
    MissingEndpoint(Protocol),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Clone, Debug)]
pub struct ExporterConfig {
    pub protocol: Protocol,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub splunk_index: Option<String>,
    pub tls_skip_verify: bool,
    pub request_timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self::new(Protocol::default())
    }
}

impl ExporterConfig {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            endpoint: None,
            token: None,
            splunk_index: None,
            tls_skip_verify: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_splunk_index(mut self, index: impl Into<String>) -> Self {
        self.splunk_index = Some(index.into());
        self
    }

    pub fn with_tls_skip_verify(mut self, skip_verify: bool) -> Self {
        self.tls_skip_verify = skip_verify;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Configured endpoint, or the protocol default. Blank values count as unset.
    pub fn resolved_endpoint(&self) -> Result<String, ExporterConfigError> {
        match self.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => Ok(endpoint.to_string()),
            _ => self
                .protocol
                .default_endpoint()
                .map(|e| e.to_string())
                .ok_or(ExporterConfigError::MissingEndpoint(self.protocol)),
        }
    }

    pub fn validate(&self) -> Result<(), ExporterConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ExporterConfigError::ZeroTimeout);
        }
        self.resolved_endpoint().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_name() {
        assert_eq!(Protocol::from_name("otlp"), Protocol::Otlp);
        assert_eq!(Protocol::from_name("otlphttp"), Protocol::OtlpHttp);
        assert_eq!(Protocol::from_name("splunk_hec"), Protocol::SplunkHec);
        assert_eq!(Protocol::from_name(""), Protocol::Otlp);
        assert_eq!(Protocol::from_name("SPLUNK_HEC"), Protocol::Otlp);
        assert_eq!(Protocol::from_name("kafka"), Protocol::Otlp);
    }

    #[test]
    fn test_endpoint_defaults() {
        let config = ExporterConfig::new(Protocol::Otlp);
        assert_eq!(config.resolved_endpoint().unwrap(), "localhost:4317");

        let config = ExporterConfig::new(Protocol::OtlpHttp).with_endpoint("  ");
        assert_eq!(config.resolved_endpoint().unwrap(), "localhost:4318");

        let config = ExporterConfig::new(Protocol::Otlp).with_endpoint("collector:4317");
        assert_eq!(config.resolved_endpoint().unwrap(), "collector:4317");
    }

    #[test]
    fn test_splunk_requires_endpoint() {
        let config = ExporterConfig::new(Protocol::SplunkHec);
        assert_eq!(
            config.validate(),
            Err(ExporterConfigError::MissingEndpoint(Protocol::SplunkHec))
        );
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "an endpoint is required for the splunk_hec exporter"
        );

        let config = config.with_endpoint("https://splunk:8088/services/collector");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ExporterConfig::default().with_request_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ExporterConfigError::ZeroTimeout));
    }
}
