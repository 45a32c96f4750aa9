//! Backend registry
//!
//! Backends announce themselves through the control plane and are kept in
//! registration order. Selection is round-robin over that order; entries that
//! stop sending heartbeats are evicted by `prune_stale`.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A registered backend server.
///
/// Identified by `(host, port)`. Only `last_heartbeat` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub host: String,
    pub port: u16,
    pub last_heartbeat: Instant,
}

impl Backend {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            last_heartbeat: Instant::now(),
        }
    }

    /// `host:port`, suitable for resolution and logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    /// Time since the last heartbeat.
    pub fn age(&self) -> Duration {
        self.last_heartbeat.elapsed()
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    backends: Vec<Backend>,
    /// Index of the last selected backend. Only meaningful when non-empty.
    cursor: usize,
}

/// Shared set of live backends.
///
/// Clones share the same state. The collection and the rotation cursor sit
/// behind one mutex, so selection reads the set and advances the cursor as a
/// single step. Callers only ever receive copies.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `(host, port)` or refreshes its heartbeat if already present.
    pub async fn register_backend(&self, host: &str, port: u16) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if let Some(backend) = state.backends.iter_mut().find(|b| b.matches(host, port)) {
            backend.last_heartbeat = now;
            tracing::debug!(backend = %backend.address(), "Backend heartbeat");
            return;
        }

        state.backends.push(Backend {
            host: host.to_string(),
            port,
            last_heartbeat: now,
        });
        tracing::info!(
            backend = %format!("{host}:{port}"),
            total = state.backends.len(),
            "Backend registered"
        );
    }

    /// Advances the cursor and returns a copy of the backend it lands on.
    ///
    /// Returns None if no backends are registered.
    pub async fn select_backend(&self) -> Option<Backend> {
        let mut state = self.state.lock().await;

        if state.backends.is_empty() {
            return None;
        }

        state.cursor = (state.cursor + 1) % state.backends.len();
        Some(state.backends[state.cursor].clone())
    }

    /// Removes every backend whose last heartbeat is older than `max_age`.
    ///
    /// Survivors keep their relative order.
    pub async fn prune_stale(&self, max_age: Duration) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        state.backends.retain(|b| {
            let stale = now.saturating_duration_since(b.last_heartbeat) > max_age;
            if stale {
                tracing::warn!(
                    backend = %b.address(),
                    max_age_secs = max_age.as_secs(),
                    "Evicting stale backend"
                );
            }
            !stale
        });

        let len = state.backends.len();
        state.cursor = if len == 0 { 0 } else { state.cursor % len };
    }

    /// Copies of all registered backends, in rotation order.
    pub async fn snapshot(&self) -> Vec<Backend> {
        self.state.lock().await.backends.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.backends.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.backends.is_empty()
    }
}
