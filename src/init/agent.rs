// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::bounded;
use crate::crypto::init_crypto_provider;
use crate::exporters::exporter::LogsExporter;
use crate::init::args::AgentRun;
use crate::init::wait;
use crate::receivers::otlp_output::OTLPOutput;
use crate::receivers::stdin::{Host, StdinReceiver};
use opentelemetry_proto::tonic::logs::v1::ResourceLogs;
use std::cmp::max;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{error, info, warn};

/// Wires the stdin receiver to a single exporter and runs until the input
/// is exhausted, a fatal error is reported, or the agent is cancelled.
pub struct Agent {
    config: AgentRun,
}

/// Host handed to the receiver. Fatal reports end the agent.
struct AgentHost {
    fatal_tx: mpsc::UnboundedSender<BoxError>,
}

impl Host for AgentHost {
    fn report_fatal_error(&self, err: BoxError) {
        if let Err(e) = self.fatal_tx.send(err) {
            error!(error = %e.0, "Fatal error reported after the agent stopped");
        }
    }
}

impl Agent {
    pub fn new(config: AgentRun) -> Self {
        Self { config }
    }

    pub async fn run<R>(self, input: R, agent_cancel: CancellationToken) -> Result<(), BoxError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        init_crypto_provider()?;

        let receiver_config = self.config.receiver_config();
        let exporter_config = self.config.exporter_config();

        let (logs_tx, logs_rx) = bounded::<ResourceLogs>(max(1, self.config.sending_queue_size));

        // Stops the exporter on every exit path, early errors included
        let exporters_cancel = CancellationToken::new();
        let _exporters_guard = exporters_cancel.clone().drop_guard();
        let mut exporters_task_set = JoinSet::new();
        let exporter = LogsExporter::new(&exporter_config, logs_rx)?;
        {
            let token = exporters_cancel.clone();
            exporters_task_set.spawn(async move { exporter.start(token).await });
        }

        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
        let host: Arc<dyn Host> = Arc::new(AgentHost { fatal_tx });

        let input_closed = CancellationToken::new();
        let receiver = {
            let input_closed = input_closed.clone();
            StdinReceiver::new(receiver_config, input)?
                .with_closed_hook(move || input_closed.cancel())
        };
        receiver.start(host, Some(OTLPOutput::new(logs_tx)))?;

        info!(
            exporter = %exporter_config.protocol,
            queue_size = self.config.sending_queue_size,
            "Agent is running"
        );

        let mut fatal: Option<BoxError> = None;
        select! {
            _ = agent_cancel.cancelled() => info!("Agent cancelled, shutting down"),
            _ = input_closed.cancelled() => info!("Input closed, shutting down"),
            Some(e) = fatal_rx.recv() => fatal = Some(e),
            e = wait::wait_for_any_task(&mut exporters_task_set) => {
                // exporters only stop on their own once the receiver is gone
                warn!("Unexpected early exit of exporter");
                e?;
            },
        }

        // The receiver task owns the only sender, so once it has stopped the
        // exporter sees the end of its input after the queue drains.
        receiver.shutdown().await?;

        if fatal.is_none() {
            fatal = fatal_rx.try_recv().ok();
        }

        let shutdown_timeout = self.config.shutdown_timeout();
        if let Err(e) =
            wait::wait_for_tasks_with_timeout(&mut exporters_task_set, shutdown_timeout).await
        {
            warn!(error = %e, "Exporter did not finish cleanly");
        }

        match fatal {
            Some(e) => {
                error!(error = %e, "Ingestion failed");
                Err(e)
            }
            None => Ok(()),
        }
    }
}
