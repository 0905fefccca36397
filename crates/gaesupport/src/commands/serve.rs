//! Serve command - runs the HTTP endpoints.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::info;

use gaesupport_config::{GaeSupportConfig, TraceConfig};
use gaesupport_server::{AppState, Server, ServerConfig};
use gaesupport_trace::{CloudTraceClient, ReporterOptions, TaskQueueDispatcher};
use gaesupport_types::config::defaults;

use super::{Context, SessionServices};

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Disable per-request trace reporting
    #[arg(long)]
    pub no_trace: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = super::load_config(ctx)?;
    let addr = bind_address(&config, &args)?;

    // ── Backing services ────────────────────────────────────────────────

    let services = SessionServices::from_config(&config);
    let trace_cfg = config.trace();

    let mut trace_client = CloudTraceClient::new(Arc::clone(&services.tokens));
    if let Some(ref endpoint) = trace_cfg.api_endpoint {
        trace_client = trace_client.with_base_url(endpoint);
    }

    let server_config = ServerConfig::new()
        .with_bind_address(addr)
        .with_request_logging(config.server().request_logging);

    let mut state = AppState::new(
        server_config,
        services.identity.clone(),
        services.cache,
        services.store,
        Arc::new(trace_client),
    )
    .with_session_config(services.session);

    // ── Request tracing ─────────────────────────────────────────────────

    if trace_cfg.enabled && !args.no_trace {
        let submit_url = submit_url(&trace_cfg, addr);
        if ctx.verbose {
            println!("Trace batches submitted to: {}", submit_url);
        }
        let dispatcher = TaskQueueDispatcher::spawn(submit_url, trace_cfg.queue_capacity);
        let options = ReporterOptions::from_trace_config(&services.identity, &trace_cfg);
        state = state.with_tracing(Arc::new(dispatcher), options);
    }

    info!(
        project_id = %services.identity.project_id(),
        tracing = state.tracing.is_some(),
        "Configured support services"
    );
    println!("Listening on http://{}", addr);

    Server::from_state(state).run().await?;
    Ok(())
}

fn bind_address(config: &GaeSupportConfig, args: &ServeArgs) -> Result<SocketAddr> {
    let server_cfg = config.server();
    let port = args.port.unwrap_or(server_cfg.port);
    let bind = args.bind.clone().unwrap_or(server_cfg.bind);
    Ok(format!("{}:{}", bind, port).parse()?)
}

/// Where the queue worker posts batches: the configured base URL, or this
/// server's own submit endpoint.
fn submit_url(config: &TraceConfig, addr: SocketAddr) -> String {
    let base = match config.submit_base_url {
        Some(ref base) => base.trim_end_matches('/').to_string(),
        None => {
            let host = if addr.ip().is_unspecified() {
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            } else {
                addr.ip()
            };
            format!("http://{}", SocketAddr::new(host, addr.port()))
        }
    };
    format!("{}{}", base, defaults::TRACE_SUBMIT_PATH)
}
