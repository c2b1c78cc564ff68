mod config;
mod console;
mod error;
mod mdns;
mod provider;
mod session;
mod session_handle;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use mdns_sd::ServiceDaemon;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::console::commands::ConsoleState;
use crate::mdns::MdnsProvider;
use crate::session_handle::SessionHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dnssd_samples=info"))
        )
        .init();

    tracing::info!("Starting dnssd-samples");

    // Load config, falling back to defaults when no path is given
    let config = match std::env::args().nth(1) {
        Some(config_path) => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path))?;
            tracing::info!("Loaded config from {}", config_path);
            config
        }
        None => {
            tracing::info!("No config file given, using defaults");
            Config::default()
        }
    };

    // Create mDNS daemon, optionally bound to one interface
    let mdns_daemon = ServiceDaemon::new()
        .context("Failed to create mDNS daemon")?;
    if let Some(interface) = &config.mdns.interface {
        mdns_daemon
            .disable_interface(mdns_sd::IfKind::All)
            .context("Failed to disable default interfaces")?;
        mdns_daemon
            .enable_interface(interface.as_str())
            .with_context(|| format!("Failed to enable interface {}", interface))?;
    }

    let (sessions, notices) = SessionHandle::spawn(MdnsProvider::new(mdns_daemon.clone()));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn list presenter
    let presenter_handle = tokio::spawn(console::presenter::present(
        sessions.snapshots(),
        notices,
        cancel.clone(),
    ));

    if config.browse.autostart {
        sessions
            .start_browsing(&config.browse.service_type, &config.browse.domain)
            .await
            .context("Failed to start browsing")?;
    }
    if config.register.autostart {
        let descriptor = config.register.descriptor()?;
        sessions
            .start_registering(descriptor)
            .await
            .context("Failed to start registration")?;
    }

    // Spawn console reader
    let console_state = ConsoleState {
        sessions: sessions.clone(),
        config: Arc::new(config),
    };
    let console_cancel = cancel.clone();
    let mut console_handle = tokio::spawn(console::commands::run(console_state, console_cancel));

    // Wait for ctrl-c or `quit`
    let console_finished = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutdown signal received");
            false
        }
        _ = &mut console_handle => true,
    };

    // Stop both sessions before tearing down the daemon
    if let Err(e) = sessions.shutdown().await {
        tracing::error!("Failed to stop sessions: {}", e);
    }

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    if !console_finished {
        let _ = console_handle.await;
    }
    let _ = presenter_handle.await;

    // Shutdown mDNS daemon
    if let Err(e) = mdns_daemon.shutdown() {
        tracing::error!("Failed to shutdown mDNS daemon: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
