use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use spacebook::analytics::{AnalyticsSink, PgAnalyticsSink, TracingSink};
use spacebook::booking::Bookings;
use spacebook::config::Config;
use spacebook::resources::{InMemoryResources, PgResourceClient, ResourceService};
use spacebook::store::{BookingStore, InMemoryBookingStore, PgBookingStore};
use spacebook::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    spacebook::observability::init(config.metrics_port)?;

    let tls_acceptor =
        spacebook::tls::load_tls_acceptor(config.tls_cert.as_deref(), config.tls_key.as_deref())?;

    let store: Arc<dyn BookingStore> = match &config.booking_db_url {
        Some(url) => Arc::new(PgBookingStore::connect(url).await?),
        None => {
            tracing::warn!("SPACEBOOK_BOOKING_DB_URL not set, bookings are kept in memory");
            Arc::new(InMemoryBookingStore::new())
        }
    };
    let resources: Arc<dyn ResourceService> = match &config.resource_db_url {
        Some(url) => Arc::new(PgResourceClient::connect(url).await?),
        None => {
            tracing::warn!("SPACEBOOK_RESOURCE_DB_URL not set, resource service is in memory and empty");
            Arc::new(InMemoryResources::new())
        }
    };
    let analytics: Arc<dyn AnalyticsSink> = match &config.analytics_db_url {
        Some(url) => Arc::new(PgAnalyticsSink::connect(url).await?),
        None => Arc::new(TracingSink),
    };

    let bookings = Arc::new(
        Bookings::new(store, resources, analytics).with_strategy(config.flip_strategy),
    );
    let max_connections = config.max_connections;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("spacebook listening on {addr}");
    info!("  max_connections: {max_connections}");
    info!("  flip_strategy: {}", config.flip_strategy);
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Stop accepting on SIGTERM/ctrl-c, then drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(spacebook::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(spacebook::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(spacebook::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let bookings = bookings.clone();
                let user = config.user.clone();
                let password = config.password.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, bookings, user, password, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(spacebook::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("spacebook stopped");
    Ok(())
}
