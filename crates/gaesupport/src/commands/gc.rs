//! Gc command - one-shot purge of stale durable sessions.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use gaesupport_session::DataStoreSessionHandler;

use super::{Context, SessionServices};

/// Arguments for the gc command.
#[derive(Args, Debug)]
pub struct GcArgs {
    /// Purge sessions idle for longer than this many seconds (overrides config)
    #[arg(long)]
    pub stale_after: Option<u64>,
}

/// Run the gc command.
pub async fn run(args: GcArgs, ctx: &Context) -> Result<()> {
    let config = super::load_config(ctx)?;
    let services = SessionServices::from_config(&config);

    let mut session = services.session;
    if let Some(secs) = args.stale_after {
        session = session.with_stale_after(std::time::Duration::from_secs(secs));
    }

    let handler =
        DataStoreSessionHandler::new(Arc::clone(&services.cache), services.store, session);
    if ctx.verbose {
        println!("Deleting sessions last accessed before {}", handler.delete_before());
    }

    let report = handler.purge_stale().await?;
    if let Err(e) = services.cache.close().await {
        tracing::debug!(error = %e, "Cache close failed");
    }

    println!(
        "Found {} stale sessions, deleted {}",
        report.found, report.deleted
    );
    Ok(())
}
