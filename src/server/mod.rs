//! Listening surfaces and background tasks.

pub mod listener;
pub mod reaper;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::admission::{self, AdmissionController};
use crate::config::{Config, RegistryConfig};
use crate::control::ControlPlaneHandler;
use crate::proxy::backend::BackendRegistry;
use crate::proxy::forwarder::RequestForwarder;
use crate::proxy::upstream::UpstreamClient;

/// Both listeners bound, with the shared registry and admission controller
/// wired in.
pub struct Gateway {
    data_listener: TcpListener,
    control_listener: TcpListener,
    forwarder: Arc<RequestForwarder>,
    control: Arc<ControlPlaneHandler>,
    registry: BackendRegistry,
    registry_cfg: RegistryConfig,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Binds both listeners using the configured admission strategy.
    pub async fn bind(cfg: &Config) -> anyhow::Result<Self> {
        Self::bind_with(cfg, admission::from_config(&cfg.admission)).await
    }

    /// Binds both listeners with a caller-supplied admission controller.
    pub async fn bind_with(
        cfg: &Config,
        admission: Arc<dyn AdmissionController>,
    ) -> anyhow::Result<Self> {
        let data_listener = TcpListener::bind(&cfg.server.data_listen_addr)
            .await
            .with_context(|| {
                format!("Failed to bind data plane on {}", cfg.server.data_listen_addr)
            })?;
        let control_listener = TcpListener::bind(&cfg.server.control_listen_addr)
            .await
            .with_context(|| {
                format!("Failed to bind control plane on {}", cfg.server.control_listen_addr)
            })?;

        tracing::info!(strategy = admission.name(), "Admission control configured");

        let registry = BackendRegistry::new();
        let upstream = UpstreamClient::new(
            cfg.upstream.connect_timeout(),
            cfg.upstream.request_timeout(),
        );

        Ok(Self {
            data_listener,
            control_listener,
            forwarder: Arc::new(RequestForwarder::new(admission, registry.clone(), upstream)),
            control: Arc::new(ControlPlaneHandler::new(registry.clone())),
            registry,
            registry_cfg: cfg.registry.clone(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn data_addr(&self) -> std::io::Result<SocketAddr> {
        self.data_listener.local_addr()
    }

    pub fn control_addr(&self) -> std::io::Result<SocketAddr> {
        self.control_listener.local_addr()
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Cancelling this token stops `run` and the reaper.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serves both surfaces until the shutdown token is cancelled.
    pub async fn run(self) {
        let reaper = self.registry_cfg.prune_interval().map(|interval| {
            reaper::spawn_reaper(
                self.registry.clone(),
                interval,
                self.registry_cfg.stale_after(),
                self.shutdown.child_token(),
            )
        });

        tokio::select! {
            _ = listener::run_data_plane(self.data_listener, self.forwarder) => {}
            _ = listener::run_control_plane(self.control_listener, self.control) => {}
            _ = self.shutdown.cancelled() => {
                tracing::info!("Gateway shutting down");
            }
        }

        if let Some(reaper) = reaper {
            reaper.abort();
        }
    }
}
