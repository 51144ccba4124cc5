// SPDX-License-Identifier: Apache-2.0

//! Standard input receiver
//!
//! Reads newline-delimited text from a byte stream (stdin in the shipped
//! binary) and forwards every line as one OTLP log record. Each line becomes
//! the opaque string body of its record; nothing inside the line is parsed.
//!
//! When the stream closes cleanly and every record was delivered, the
//! receiver fires its closed hook so the host can stop the rest of the
//! pipeline. Any delivery or read failure is instead reported once, as an
//! aggregate, through [`Host::report_fatal_error`].

pub mod config;
pub mod convert;
pub mod error;
pub mod host;
pub mod line_source;
pub mod receiver;
pub mod sink;

pub use config::StdinReceiverConfig;
pub use error::{IngestError, IngestErrors, LineSourceError, Result, StdinReceiverError};
pub use host::Host;
pub use line_source::LineSource;
pub use receiver::{ClosedHook, ReceiverState, StdinReceiver};
pub use sink::LogsSink;
