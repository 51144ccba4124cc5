// SPDX-License-Identifier: Apache-2.0

//! Convert stdin lines to OTLP log records
//!
//! Every line becomes one `ResourceLogs` holding exactly one `LogRecord`, so
//! each record can be handed to the sink on its own. The resource is built
//! once per receiver and cloned into every record.

use crate::receivers::stdin::config::StdinReceiverConfig;
use gethostname::gethostname;
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::resource::v1::Resource;
use std::time::{SystemTime, UNIX_EPOCH};

/// Scope name and `log.source` value identifying this transport
pub const STDIN_ORIGIN: &str = "stdin";

pub const LOG_SOURCE_KEY: &str = "log.source";
pub const HOST_NAME_KEY: &str = "host.name";

/// Builds records for one receiver instance.
#[derive(Debug, Clone)]
pub struct LogConverter {
    resource: Resource,
}

impl LogConverter {
    pub fn new(config: &StdinReceiverConfig) -> Self {
        let mut attributes = vec![string_attribute(LOG_SOURCE_KEY, STDIN_ORIGIN)];

        if config.include_host_name {
            if let Ok(hostname) = gethostname().into_string() {
                attributes.push(string_attribute(HOST_NAME_KEY, &hostname));
            }
        }

        // User supplied attributes win over the defaults above
        for (key, value) in &config.resource_attributes {
            attributes.retain(|kv| &kv.key != key);
            attributes.push(string_attribute(key, value));
        }

        Self {
            resource: Resource {
                attributes,
                ..Default::default()
            },
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Convert one line, stamped with the current wall-clock time
    pub fn convert(&self, line: String) -> ResourceLogs {
        self.convert_at(line, SystemTime::now())
    }

    pub fn convert_at(&self, line: String, observed: SystemTime) -> ResourceLogs {
        let observed_unix_nano = observed
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        let log_record = LogRecord {
            time_unix_nano: observed_unix_nano,
            observed_time_unix_nano: observed_unix_nano,
            body: Some(AnyValue {
                value: Some(any_value::Value::StringValue(line)),
            }),
            ..Default::default()
        };

        ResourceLogs {
            resource: Some(self.resource.clone()),
            scope_logs: vec![ScopeLogs {
                scope: Some(InstrumentationScope {
                    name: STDIN_ORIGIN.to_string(),
                    ..Default::default()
                }),
                log_records: vec![log_record],
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

/// Body of the single record built by [`LogConverter::convert`], if it is a string
pub fn record_body(logs: &ResourceLogs) -> Option<&str> {
    let record = logs.scope_logs.first()?.log_records.first()?;
    match record.body.as_ref()?.value.as_ref()? {
        any_value::Value::StringValue(s) => Some(s.as_str()),
        _ => None,
    }
}

fn string_attribute(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}
