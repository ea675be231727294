use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use opswatch::config::Config;
use opswatch::monitor::{CertNotifier, CertScheduler, HostMonitor, UptimeMonitor};
use opswatch::notify::{channels, Notifier};
use opswatch::store::StoreClient;
use opswatch::web::{start_web_server, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::load());

    if config.enable_logging {
        let env_filter = EnvFilter::from_default_env()
            .add_directive("opswatch=info".parse()?)
            .add_directive("tower_http=warn".parse()?)
            .add_directive("hyper=warn".parse()?)
            .add_directive("reqwest=warn".parse()?);
        fmt().with_env_filter(env_filter).init();
    }

    info!("starting monitoring control plane on port {}", config.port);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut loop_handles = Vec::new();
    let mut store_connected = false;

    // Monitoring only runs with a reachable Store; without one the process
    // still serves the ad-hoc probe endpoints.
    if config.store_enabled {
        match StoreClient::new(&config.store_url) {
            Ok(store) => {
                let store = Arc::new(store);
                match store.test_connection().await {
                    Ok(()) => {
                        store_connected = true;
                        info!("store connection verified at {}", store.base_url());

                        let notifier =
                            Arc::new(Notifier::new(store.clone(), channels::build_registry()));

                        let uptime = Arc::new(UptimeMonitor::new(store.clone(), notifier.clone()));
                        loop_handles.push(tokio::spawn(uptime.run(shutdown_rx.clone())));

                        let scheduler = Arc::new(CertScheduler::new(store.clone()));
                        loop_handles.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));

                        let cert_notifier =
                            Arc::new(CertNotifier::new(store.clone(), notifier.clone()));
                        loop_handles.push(tokio::spawn(cert_notifier.run(shutdown_rx.clone())));

                        let hosts = Arc::new(HostMonitor::new(store, notifier));
                        loop_handles.push(tokio::spawn(hosts.run(shutdown_rx.clone())));

                        info!("uptime, certificate and host monitoring started");
                    }
                    Err(e) => {
                        warn!(error = %e, "store connection test failed, monitoring disabled");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "store client unavailable, monitoring disabled");
            }
        }
    } else {
        info!("store integration disabled by configuration");
    }

    let state = AppState {
        config: config.clone(),
        store_connected,
    };

    let mut server = tokio::spawn(start_web_server(state));

    tokio::select! {
        _ = shutdown_signal() => {
            info!("shutdown signal received, stopping monitor loops");
            let _ = shutdown_tx.send(true);
            futures::future::join_all(loop_handles).await;
            info!("all monitor loops stopped");
            server.abort();
            Ok(())
        }
        // A server that stops on its own is a bind or serve failure; exit
        // non-zero.
        result = &mut server => {
            let _ = shutdown_tx.send(true);
            result?
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
