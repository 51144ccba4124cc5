// SPDX-License-Identifier: Apache-2.0

//! Splunk HTTP Event Collector encoding
//!
//! Each log record becomes one JSON event. Several events in a request are
//! simply concatenated, which is what HEC expects.

use crate::exporters::otlp_request::user_agent;
use crate::receivers::stdin::convert::HOST_NAME_KEY;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, Request};
use http_body_util::Full;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs};
use serde::Serialize;
use std::collections::BTreeMap;
use tower::BoxError;

pub const SPLUNK_SOURCE_KEY: &str = "com.splunk.source";
pub const SPLUNK_SOURCETYPE_KEY: &str = "com.splunk.sourcetype";
pub const SPLUNK_INDEX_KEY: &str = "com.splunk.index";

#[derive(Debug, Serialize, PartialEq)]
pub struct HecEvent {
    pub time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sourcetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub event: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct HecRequestBuilder {
    uri: String,
    headers: HeaderMap,
    default_index: Option<String>,
}

impl HecRequestBuilder {
    /// `endpoint` is the full collector URL, for example
    /// `https://splunk:8088/services/collector`.
    pub fn new(
        endpoint: &str,
        token: Option<&str>,
        default_index: Option<&str>,
    ) -> Result<Self, BoxError> {
        let uri = url::Url::parse(endpoint)
            .map_err(|e| format!("failed to parse endpoint {:?}: {}", endpoint, e))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, user_agent());
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Splunk {}", token))
                .map_err(|e| format!("invalid token: {}", e))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            uri: uri.to_string(),
            headers,
            default_index: default_index
                .filter(|i| !i.is_empty())
                .map(|i| i.to_string()),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn build(&self, logs: ResourceLogs) -> Result<Request<Full<Bytes>>, BoxError> {
        let mut body = Vec::new();
        for event in self.events(&logs) {
            serde_json::to_writer(&mut body, &event)
                .map_err(|e| format!("failed to encode HEC event: {}", e))?;
        }

        let mut builder = hyper::Request::builder().method(Method::POST).uri(&self.uri);
        if let Some(hdrs) = builder.headers_mut() {
            hdrs.extend(self.headers.clone());
        }

        builder
            .body(Full::from(body))
            .map_err(|e| format!("failed to build request: {}", e).into())
    }

    pub fn events(&self, logs: &ResourceLogs) -> Vec<HecEvent> {
        let resource_attrs: &[KeyValue] = logs
            .resource
            .as_ref()
            .map(|r| r.attributes.as_slice())
            .unwrap_or_default();

        let mut host = None;
        let mut source = None;
        let mut sourcetype = None;
        let mut index = self.default_index.clone();
        let mut fields = BTreeMap::new();

        for kv in resource_attrs {
            let Some(value) = attribute_string(kv.value.as_ref()) else {
                continue;
            };
            match kv.key.as_str() {
                HOST_NAME_KEY => host = Some(value),
                SPLUNK_SOURCE_KEY => source = Some(value),
                SPLUNK_SOURCETYPE_KEY => sourcetype = Some(value),
                SPLUNK_INDEX_KEY => index = Some(value),
                key => {
                    fields.insert(key.to_string(), value);
                }
            }
        }

        logs.scope_logs
            .iter()
            .flat_map(|sl| sl.log_records.iter())
            .map(|record| HecEvent {
                time: event_time(record),
                host: host.clone(),
                source: source.clone(),
                sourcetype: sourcetype.clone(),
                index: index.clone(),
                event: attribute_string(record.body.as_ref()).unwrap_or_default(),
                fields: record_fields(&fields, record),
            })
            .collect()
    }
}

fn record_fields(
    resource_fields: &BTreeMap<String, String>,
    record: &LogRecord,
) -> BTreeMap<String, String> {
    let mut fields = resource_fields.clone();
    for kv in &record.attributes {
        if let Some(value) = attribute_string(kv.value.as_ref()) {
            fields.insert(kv.key.clone(), value);
        }
    }
    fields
}

// seconds with millisecond precision
fn event_time(record: &LogRecord) -> f64 {
    let nanos = if record.time_unix_nano != 0 {
        record.time_unix_nano
    } else {
        record.observed_time_unix_nano
    };
    (nanos / 1_000_000) as f64 / 1_000.0
}

fn attribute_string(value: Option<&AnyValue>) -> Option<String> {
    match value?.value.as_ref()? {
        any_value::Value::StringValue(s) => Some(s.clone()),
        any_value::Value::BoolValue(b) => Some(b.to_string()),
        any_value::Value::IntValue(i) => Some(i.to_string()),
        any_value::Value::DoubleValue(d) => Some(d.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::stdin::config::StdinReceiverConfig;
    use crate::receivers::stdin::convert::LogConverter;
    use std::time::{Duration, UNIX_EPOCH};

    fn converter(attrs: Vec<(&str, &str)>) -> LogConverter {
        let config = StdinReceiverConfig::default()
            .with_host_name(false)
            .with_resource_attributes(
                attrs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            );
        LogConverter::new(&config)
    }

    #[test]
    fn test_event_from_line() {
        let builder =
            HecRequestBuilder::new("https://splunk:8088/services/collector", None, Some("main"))
                .unwrap();
        let converter = converter(vec![(HOST_NAME_KEY, "web-1"), ("service.name", "backup")]);
        let observed = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);

        let events = builder.events(&converter.convert_at("foo".to_string(), observed));

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event, "foo");
        assert_eq!(event.time, 1_700_000_000.123);
        assert_eq!(event.host.as_deref(), Some("web-1"));
        assert_eq!(event.index.as_deref(), Some("main"));
        assert_eq!(event.fields.get("service.name").map(|s| s.as_str()), Some("backup"));
        assert_eq!(event.fields.get("log.source").map(|s| s.as_str()), Some("stdin"));
        assert!(!event.fields.contains_key(HOST_NAME_KEY));
    }

    #[test]
    fn test_resource_index_overrides_default() {
        let builder =
            HecRequestBuilder::new("https://splunk:8088/services/collector", None, Some("main"))
                .unwrap();
        let converter = converter(vec![
            (SPLUNK_INDEX_KEY, "audit"),
            (SPLUNK_SOURCETYPE_KEY, "cron"),
        ]);

        let events = builder.events(&converter.convert("bar".to_string()));

        assert_eq!(events[0].index.as_deref(), Some("audit"));
        assert_eq!(events[0].sourcetype.as_deref(), Some("cron"));
        assert!(!events[0].fields.contains_key(SPLUNK_INDEX_KEY));
    }

    #[test]
    fn test_request_carries_token_and_json_body() {
        let builder = HecRequestBuilder::new(
            "https://splunk:8088/services/collector",
            Some("00000000-0000-0000-0000-000000000000"),
            None,
        )
        .unwrap();

        let req = builder
            .build(converter(vec![]).convert("hello".to_string()))
            .unwrap();

        assert_eq!(req.uri(), "https://splunk:8088/services/collector");
        assert_eq!(
            req.headers().get(AUTHORIZATION).unwrap(),
            "Splunk 00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(req.headers().get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_event_json_shape() {
        let event = HecEvent {
            time: 1.5,
            host: None,
            source: None,
            sourcetype: None,
            index: Some("main".to_string()),
            event: "line".to_string(),
            fields: BTreeMap::new(),
        };

        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"time":1.5,"index":"main","event":"line"}"#
        );
    }

    #[test]
    fn test_missing_token_sends_no_authorization() {
        let builder =
            HecRequestBuilder::new("http://localhost:8088/services/collector", Some(""), None)
                .unwrap();
        let req = builder
            .build(converter(vec![]).convert("x".to_string()))
            .unwrap();
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_endpoint_must_be_a_url() {
        assert!(HecRequestBuilder::new("not a url", None, None).is_err());
    }
}
