// SPDX-License-Identifier: Apache-2.0

use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use std::future::Future;
use tower::BoxError;

/// Downstream consumer of the records built from each line.
///
/// The receiver awaits every delivery before reading the next line, so a
/// sink that waits for capacity slows ingestion down rather than dropping
/// records. An `Err` marks that one record as failed; the receiver keeps
/// going and reports all failures together once the input ends.
pub trait LogsSink: Send + Sync + 'static {
    fn deliver(&self, logs: ResourceLogs) -> impl Future<Output = Result<(), BoxError>> + Send;
}
