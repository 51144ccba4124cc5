// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod config;
pub mod exporter;
pub mod otlp_request;
pub mod splunk_hec;
pub mod tls;

use opentelemetry::global;
use opentelemetry::metrics::Meter;

pub fn get_meter() -> Meter {
    global::meter("exporters")
}
