// SPDX-License-Identifier: Apache-2.0

use tower::BoxError;

/// Capabilities the embedding process offers to the receiver.
pub trait Host: Send + Sync + 'static {
    /// Called at most once per run, with an
    /// [`IngestErrors`](crate::receivers::stdin::IngestErrors) aggregate, when
    /// ingestion failed. The host should treat the pipeline as failed.
    fn report_fatal_error(&self, err: BoxError);
}
