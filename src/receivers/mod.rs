// SPDX-License-Identifier: Apache-2.0

pub mod otlp_output;
pub mod stdin;

use opentelemetry::global;
use opentelemetry::metrics::Meter;

pub fn get_meter() -> Meter {
    global::meter("receivers")
}
