// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use std::process::ExitCode;
use std::time::Duration;
use stdinotel::init::agent::Agent;
use stdinotel::init::args::AgentRun;
use stdinotel::init::wait;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

// The agent enforces its own, shorter, shutdown deadlines
const AGENT_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

// A blocked stdin read holds a runtime thread that cannot be interrupted
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(name = "stdinotel")]
#[command(bin_name = "stdinotel")]
#[command(version, about = "Forward standard input lines as OpenTelemetry log records", long_about = None)]
struct Arguments {
    #[arg(value_enum, long, env = "STDINOTEL_LOG_FORMAT", default_value = "text")]
    /// Log format
    log_format: LogFormatArg,

    #[arg(long, env = "STDINOTEL_LOG_LEVEL", default_value = "info")]
    /// Default log level, RUST_LOG takes precedence
    log_level: String,

    #[command(flatten)]
    agent: AgentRun,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let _guard = match setup_logging(&opt.log_format, &opt.log_level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("ERROR: failed to setup logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start runtime.");
            return ExitCode::from(1);
        }
    };

    let res = runtime.block_on(run_agent(opt.agent));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Failed to run agent.");
            ExitCode::from(1)
        }
    }
}

async fn run_agent(agent_args: AgentRun) -> Result<(), BoxError> {
    let mut agent_join_set = JoinSet::new();

    let cancel_token = CancellationToken::new();
    {
        let token = cancel_token.clone();
        let agent = Agent::new(agent_args);
        agent_join_set.spawn(async move { agent.run(tokio::io::stdin(), token).await });
    }

    select! {
        res = signal_wait() => {
            res?;
            info!("Shutdown signal received.");
            cancel_token.cancel();
        },
        res = wait::wait_for_any_task(&mut agent_join_set) => return res,
    }

    wait::wait_for_tasks_with_timeout(&mut agent_join_set, AGENT_EXIT_TIMEOUT).await
}

type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn setup_logging(log_format: &LogFormatArg, log_level: &str) -> Result<LoggerGuard, BoxError> {
    LogTracer::init()?;

    // stdout is left alone, stdin carries the data
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let default_directive: Directive = log_level.parse()?;
    let filter = EnvFilter::builder()
        .with_default_directive(default_directive)
        .from_env()?
        .add_directive("opentelemetry=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?)
        .add_directive("rustls=warn".parse()?);

    if *log_format == LogFormatArg::Json {
        let app_name = format!("{}-{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io::IsTerminal;

        let use_ansi = std::io::stderr().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(guard)
}

async fn signal_wait() -> Result<(), BoxError> {
    let mut sig_term = signal(SignalKind::terminate())?;
    let mut sig_int = signal(SignalKind::interrupt())?;

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
    Ok(())
}
