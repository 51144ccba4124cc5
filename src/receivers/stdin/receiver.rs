// SPDX-License-Identifier: Apache-2.0

//! Stdin receiver implementation
//!
//! One background task per receiver reads lines, converts them to OTLP logs
//! and delivers them to the sink strictly in arrival order.

use crate::receivers::get_meter;
use crate::receivers::stdin::config::StdinReceiverConfig;
use crate::receivers::stdin::convert::LogConverter;
use crate::receivers::stdin::error::{IngestError, IngestErrors, Result, StdinReceiverError};
use crate::receivers::stdin::host::Host;
use crate::receivers::stdin::line_source::LineSource;
use crate::receivers::stdin::sink::LogsSink;
use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncRead;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Invoked once when the input closes cleanly and every record was delivered.
pub type ClosedHook = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of a receiver. Moves forward only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

pub struct StdinReceiver<R> {
    config: StdinReceiverConfig,
    converter: LogConverter,
    reader: Mutex<Option<R>>,
    closed_hook: Mutex<Option<ClosedHook>>,
    state: Arc<Mutex<ReceiverState>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    stopped: CancellationToken,
}

impl<R> StdinReceiver<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    pub fn new(config: StdinReceiverConfig, reader: R) -> Result<Self> {
        config
            .validate()
            .map_err(StdinReceiverError::InvalidConfiguration)?;

        let converter = LogConverter::new(&config);

        info!(
            max_line_bytes = config.max_line_bytes,
            include_host_name = config.include_host_name,
            resource_attributes = config.resource_attributes.len(),
            "Stdin receiver initialized"
        );

        Ok(Self {
            config,
            converter,
            reader: Mutex::new(Some(reader)),
            closed_hook: Mutex::new(None),
            state: Arc::new(Mutex::new(ReceiverState::Idle)),
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
            stopped: CancellationToken::new(),
        })
    }

    /// Set the hook fired when the input closes cleanly with no failed deliveries
    pub fn with_closed_hook<F>(self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        *lock(&self.closed_hook) = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> ReceiverState {
        *lock(&self.state)
    }

    /// Spawn the reader task. Must be called from within a tokio runtime.
    ///
    /// Fails with `InvalidConfiguration` when no sink is given and with
    /// `AlreadyStarted` on any call after the first one, or after shutdown.
    pub fn start<S: LogsSink>(&self, host: Arc<dyn Host>, sink: Option<S>) -> Result<()> {
        let Some(sink) = sink else {
            return Err(StdinReceiverError::InvalidConfiguration(
                "a logs sink is required to start the stdin receiver".to_string(),
            ));
        };

        let mut state = lock(&self.state);
        if *state != ReceiverState::Idle {
            return Err(StdinReceiverError::AlreadyStarted);
        }
        let Some(reader) = lock(&self.reader).take() else {
            return Err(StdinReceiverError::AlreadyStarted);
        };
        *state = ReceiverState::Running;
        drop(state);

        let run = IngestRun {
            source: LineSource::new(reader, self.config.max_line_bytes),
            converter: self.converter.clone(),
            sink,
            host,
            closed_hook: lock(&self.closed_hook).take(),
            metrics: ReceiverMetrics::new(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
        };

        info!("Stdin receiver starting");

        // Waiters in shutdown() are released even if the task panics
        let stopped = self.stopped.clone().drop_guard();
        let handle = tokio::spawn(async move {
            let _stopped = stopped;
            run.run().await;
        });
        *lock(&self.task) = Some(handle);

        Ok(())
    }

    /// Stop reading and wait until the reader task has exited.
    ///
    /// A delivery already in progress is allowed to finish. Safe to call at
    /// any time, any number of times, including after the input closed on its
    /// own. Failed deliveries are not returned here, they were already
    /// reported to the host when the task exited.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = lock(&self.state);
            match *state {
                ReceiverState::Idle => {
                    *state = ReceiverState::Stopped;
                    drop(lock(&self.reader).take());
                    self.stopped.cancel();
                    debug!("Stdin receiver stopped before it was started");
                    return Ok(());
                }
                ReceiverState::Running => *state = ReceiverState::ShuttingDown,
                ReceiverState::ShuttingDown | ReceiverState::Stopped => {}
            }
        }

        self.cancel.cancel();

        let task = lock(&self.task).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "Stdin receiver task failed");
            }
        }
        self.stopped.cancelled().await;

        *lock(&self.state) = ReceiverState::Stopped;
        Ok(())
    }
}

impl<R> Drop for StdinReceiver<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LoopExit {
    EndOfStream,
    StreamFailed,
    Cancelled,
}

/// State owned by the background task for one run
struct IngestRun<R, S> {
    source: LineSource<R>,
    converter: LogConverter,
    sink: S,
    host: Arc<dyn Host>,
    closed_hook: Option<ClosedHook>,
    metrics: ReceiverMetrics,
    state: Arc<Mutex<ReceiverState>>,
    cancel: CancellationToken,
}

impl<R, S> IngestRun<R, S>
where
    R: AsyncRead + Unpin + Send,
    S: LogsSink,
{
    async fn run(mut self) {
        let mut errors = IngestErrors::new();

        let exit = loop {
            let next = select! {
                biased;

                _ = self.cancel.cancelled() => break LoopExit::Cancelled,

                next = self.source.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    let line_number = self.source.lines_read();
                    let logs = self.converter.convert(line);

                    match self.sink.deliver(logs).await {
                        Ok(()) => self.metrics.add_accepted(1),
                        Err(e) => {
                            self.metrics.add_refused(1);
                            warn!(line = line_number, error = %e, "Failed to deliver log record");
                            errors.push(IngestError::Delivery {
                                line: line_number,
                                source: e,
                            });
                        }
                    }
                }
                Ok(None) => break LoopExit::EndOfStream,
                Err(e) => {
                    error!(error = %e, "Error reading stdin");
                    errors.push(IngestError::Stream(e));
                    break LoopExit::StreamFailed;
                }
            }
        };

        self.set_state(ReceiverState::ShuttingDown);
        self.finish(exit, errors);
        self.set_state(ReceiverState::Stopped);
    }

    fn finish(&mut self, exit: LoopExit, errors: IngestErrors) {
        let lines = self.source.lines_read();

        if !errors.is_empty() {
            error!(
                lines,
                failures = errors.len(),
                "Stdin receiver finished with errors"
            );
            self.host.report_fatal_error(Box::new(errors));
            return;
        }

        match exit {
            LoopExit::EndOfStream => {
                info!(lines, "Stdin closed");
                if let Some(hook) = self.closed_hook.take() {
                    hook();
                }
            }
            LoopExit::Cancelled => info!(lines, "Stdin receiver cancelled"),
            // a stream failure always leaves an error behind
            LoopExit::StreamFailed => {}
        }
    }

    fn set_state(&self, next: ReceiverState) {
        *lock(&self.state) = next;
    }
}

/// Metrics counters for the stdin receiver
struct ReceiverMetrics {
    accepted: Counter<u64>,
    refused: Counter<u64>,
    tags: [KeyValue; 1],
}

impl ReceiverMetrics {
    fn new() -> Self {
        Self {
            accepted: get_meter()
                .u64_counter("stdinotel_receiver_accepted_log_records")
                .with_description(
                    "Number of log records successfully ingested and pushed into the pipeline.",
                )
                .with_unit("log_records")
                .build(),
            refused: get_meter()
                .u64_counter("stdinotel_receiver_refused_log_records")
                .with_description(
                    "Number of log records that could not be pushed into the pipeline.",
                )
                .with_unit("log_records")
                .build(),
            tags: [KeyValue::new("receiver", "stdin")],
        }
    }

    fn add_accepted(&self, count: u64) {
        self.accepted.add(count, &self.tags);
    }

    fn add_refused(&self, count: u64) {
        self.refused.add(count, &self.tags);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
