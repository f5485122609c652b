use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use relay_discoveryd::{Config, DiscoveryError, DiscoveryEvent, DiscoverySession};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay_discoveryd=info"))
        )
        .init();

    tracing::info!("Starting relay-discoveryd");

    let config_path = std::env::args().nth(1);
    let config = Config::load_or_default(config_path.as_deref())
        .context("Failed to load config")?;

    let session = DiscoverySession::with_mdns(config.discovery.clone());
    let cancel = CancellationToken::new();

    // Report device appearance/loss until shutdown
    let events = session.events();
    let reporter_cancel = cancel.clone();
    let reporter = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv_async() => match event {
                    Ok(DiscoveryEvent::DeviceDiscovered(device)) => tracing::info!("Discovered {}", device),
                    Ok(DiscoveryEvent::DeviceLost(device)) => tracing::info!("Lost {}", device),
                    // Already traced by the session
                    Ok(DiscoveryEvent::Log(_)) => {}
                    Err(_) => break,
                },
                _ = reporter_cancel.cancelled() => break,
            }
        }
    });

    // Ctrl-C during startup cancels the start itself
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
        tracing::info!("Shutdown signal received");
        signal_cancel.cancel();
    });

    if started(session.start(Some(&cancel)).await)? {
        if config.diagnostics.on_start {
            session.log_network_interfaces();
            session.test_multicast_socket();
            session.send_manual_queries(&config.diagnostics.probe_hostname).await;
        }
        cancel.cancelled().await;
    }

    session.stop().await;
    let _ = reporter.await;

    let devices = session.discovered_devices();
    tracing::info!("{} device(s) known at shutdown", devices.len());
    for device in &devices {
        tracing::info!(
            "  {} (last seen {}s ago)",
            device,
            device.time_since_last_seen().num_seconds()
        );
    }
    match serde_json::to_string_pretty(&devices) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to serialize devices: {}", e),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Ctrl-C during startup is a clean shutdown, not a failure
fn started(result: relay_discoveryd::Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(DiscoveryError::Cancelled) => {
            tracing::info!("Startup cancelled");
            Ok(false)
        }
        Err(e) => Err(e).context("Failed to start discovery"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_startup_is_clean() {
        assert!(!started(Err(DiscoveryError::Cancelled)).unwrap());
        assert!(started(Ok(())).unwrap());
    }

    #[test]
    fn test_transport_failure_is_fatal() {
        let err = started(Err(DiscoveryError::TransportStart("socket in use".to_string()))).unwrap_err();
        assert!(format!("{:#}", err).starts_with("Failed to start discovery"));
    }
}
