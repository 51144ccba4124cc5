// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::{BoundedSender, SendError};
use crate::receivers::stdin::sink::LogsSink;
use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use tower::BoxError;

/// Receiver side of the pipeline channel.
#[derive(Clone)]
pub struct OTLPOutput<T> {
    tx: BoundedSender<T>,
}

impl<T> OTLPOutput<T> {
    pub fn new(tx: BoundedSender<T>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, events: T) -> Result<(), SendError> {
        self.tx.send(events).await
    }
}

impl LogsSink for OTLPOutput<ResourceLogs> {
    async fn deliver(&self, logs: ResourceLogs) -> Result<(), BoxError> {
        self.send(logs)
            .await
            .map_err(|e| format!("failed to push log record into pipeline: {}", e).into())
    }
}
