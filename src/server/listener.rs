use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use crate::control::ControlPlaneHandler;
use crate::proxy::forwarder::RequestForwarder;

/// Pause after a failed accept (e.g. fd exhaustion) before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts client connections forever, one task per connection.
pub async fn run_data_plane(listener: TcpListener, forwarder: Arc<RequestForwarder>) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening for client requests on {}", addr);
    }

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept client connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        tracing::debug!("Accepted client connection from {}", peer);

        let forwarder = Arc::clone(&forwarder);
        tokio::spawn(async move {
            forwarder.handle_connection(socket, peer).await;
        });
    }
}

/// Accepts backend registration connections forever, one task per connection.
pub async fn run_control_plane(listener: TcpListener, handler: Arc<ControlPlaneHandler>) {
    if let Ok(addr) = listener.local_addr() {
        info!("Listening for control requests on {}", addr);
    }

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept control connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        tracing::debug!("Accepted control connection from {}", peer);

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            handler.serve_connection(socket, peer).await;
        });
    }
}
