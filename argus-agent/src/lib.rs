//! The metrics agent.
//!
//! The agent samples local runtime and host metrics on a poll interval,
//! accumulates them into a batch, and reports the batch to the collector
//! server on a report interval. Delivery is at-least-once: a batch that
//! fails to send is retained and resent together with newer samples on the
//! next cycle, and a final best-effort flush runs on shutdown.
//!
//! Internally the agent is a small pipeline of tasks connected by a bounded
//! channel:
//!
//! ```text
//! RuntimeCollector ──┐
//!                    ├─> intake queue ─> Dispatcher ─> RateLimiter ─> HttpSender
//! SystemCollector  ──┘
//! ```

mod collector;
mod config;
mod dispatcher;
mod limiter;
mod sender;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use self::collector::{Collector, RuntimeCollector, SystemCollector};
pub use self::config::AgentConfig;
pub use self::dispatcher::{spawn_collector, Dispatcher, INTAKE_QUEUE_DEPTH};
pub use self::limiter::RateLimiter;
pub use self::sender::{HttpSender, MetricsSender, SendError};

/// Interval at which the rate limiter restores one request token.
const LIMITER_REFILL: Duration = Duration::from_secs(1);

/// Runs the agent until interrupted.
///
/// Blocks until `SIGINT` or `SIGTERM` arrives, then drains the pipeline:
/// collectors stop, queued samples fold into the batch, and the batch is
/// flushed one last time before returning.
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    tracing::info!(
        address = %config.server_address,
        poll_interval = config.poll_interval,
        report_interval = config.report_interval,
        rate_limit = config.rate_limit,
        signing = config.hash_key.is_some(),
        "starting agent"
    );

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, draining");
        signal_shutdown.cancel();
    });

    let (tx, rx) = mpsc::channel(INTAKE_QUEUE_DEPTH);
    let poll_interval = config.poll_interval();
    let collectors = vec![
        spawn_collector(
            RuntimeCollector::new(),
            poll_interval,
            tx.clone(),
            shutdown.clone(),
        ),
        spawn_collector(
            SystemCollector::new(),
            poll_interval,
            tx.clone(),
            shutdown.clone(),
        ),
    ];
    // The dispatcher detects collector exit through the channel closing.
    drop(tx);

    let limiter = RateLimiter::new(config.rate_limit, LIMITER_REFILL);
    let sender = HttpSender::new(&config)?;

    Dispatcher::new(sender, limiter)
        .run(rx, config.report_interval(), shutdown, collectors)
        .await;

    tracing::info!("agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(
                error = &error as &dyn std::error::Error,
                "failed to install SIGINT handler"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to install SIGTERM handler"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
