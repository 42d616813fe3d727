use std::sync::Arc;

use chrono::Utc;
use recharge_core::{channel_from_config, Sweeper};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::common::{CliResult, Context};

fn build_sweeper(ctx: &Context) -> CliResult<Sweeper> {
    let channel = channel_from_config(&ctx.config)?;
    Ok(Sweeper::new(
        ctx.store.clone(),
        channel,
        ctx.config.sweep_interval(),
        ctx.config.notify_timeout(),
    ))
}

/// One tick, report printed as JSON.
pub fn sweep_once() -> CliResult {
    let ctx = Context::load()?;
    let sweeper = build_sweeper(&ctx)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(sweeper.tick(Utc::now()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Sweep every configured interval until Ctrl-C or SIGTERM.
pub fn daemon() -> CliResult {
    let ctx = Context::load()?;
    let sweeper = Arc::new(build_sweeper(&ctx)?);
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        let shutdown_signal = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal_handler().await;
            info!("shutdown signal received");
            shutdown_signal.cancel();
        });

        sweeper.spawn(shutdown).await
    })?;
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
