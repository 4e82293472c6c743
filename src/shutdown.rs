//! Interrupting a run from the terminal or a batch system.
//!
//! The first SIGINT or SIGTERM cancels the token handed to
//! [`Coordinator::run`](crate::coordinator::Coordinator::run). The
//! coordinator then stops waiting for results, shuts the queue server down
//! and returns an `Interrupted` report listing the jobs with no result.
//!
//! Workers already started on remote nodes are not signalled. They lose
//! the queue server, fail their next request and exit on their own; a job
//! they were running keeps running until it finishes.
//!
//! A second signal exits immediately with status 130, skipping the
//! shutdown grace and the report.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal arrives.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Register SIGINT and SIGTERM handlers and return the run's cancel token.
///
/// Registration happens before this returns, so a signal sent right after
/// is never missed. Must be called inside a tokio runtime. If the handlers
/// cannot be installed, a warning is logged and the token is never
/// cancelled by signals.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();

    let (sigterm, sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not install signal handlers, runs cannot be interrupted");
            return token;
        }
    };

    tokio::spawn(watch_signals(sigterm, sigint, token.clone()));
    token
}

async fn watch_signals(mut sigterm: Signal, mut sigint: Signal, token: CancellationToken) {
    let name = next_signal(&mut sigterm, &mut sigint).await;
    tracing::warn!(
        signal = name,
        "Interrupting run; remote workers keep running until the queue server is gone"
    );
    token.cancel();

    let name = next_signal(&mut sigterm, &mut sigint).await;
    tracing::error!(signal = name, "Second signal received, exiting immediately");
    std::process::exit(FORCED_EXIT_CODE);
}

async fn next_signal(sigterm: &mut Signal, sigint: &mut Signal) -> &'static str {
    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}
