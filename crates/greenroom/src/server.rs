//! `TheaterServer` builder and run loop.
//!
//! This is the entry point for running a theater server. It ties together
//! all the layers: events → dispatch → session / registry / database.

use std::collections::BTreeMap;
use std::sync::Arc;

use greenroom_protocol::Shard;
use greenroom_registry::GameRegistry;
use greenroom_session::{Authorizer, SessionManager, SessionStore};
use greenroom_stats::GameDatabase;
use greenroom_tick::{TickConfig, spawn_repeating};
use greenroom_transport::{TcpEvent, UdpEvent};
use tokio::sync::{Mutex, mpsc};

use crate::metrics::{FieldValue, MetricsReporter, MetricsSink, TracingSink};
use crate::{AuditLog, GreenroomError, ServerConfig, dispatch};

/// Shared server state passed to every handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Only the
/// session table needs a lock of its own; the registry, store and
/// database synchronize internally.
pub(crate) struct ServerState<S, D, A> {
    pub(crate) name: String,
    pub(crate) shard: Shard,
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: Arc<GameRegistry>,
    pub(crate) store: S,
    pub(crate) db: D,
    pub(crate) authz: A,
    pub(crate) metrics: Arc<MetricsReporter>,
    pub(crate) audit: AuditLog,
}

/// Builder for configuring a theater server.
///
/// # Example
///
/// ```rust,ignore
/// let server = TheaterServerBuilder::new()
///     .config(ServerConfig::load("greenroom.toml")?)
///     .metrics_sink(MyInfluxSink::new())
///     .build(store, db, authz);
/// server.run(tcp_rx, udp_rx).await
/// ```
pub struct TheaterServerBuilder {
    config: ServerConfig,
    registry: Option<Arc<GameRegistry>>,
    sink: Option<Box<dyn MetricsSink>>,
}

impl TheaterServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registry: None,
            sink: None,
        }
    }

    /// Sets the server configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing registry, e.g. with a second server instance
    /// in the same process. A fresh one is created otherwise.
    pub fn registry(mut self, registry: Arc<GameRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets where flushed metrics go. Defaults to [`TracingSink`].
    pub fn metrics_sink(mut self, sink: impl MetricsSink) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Builds the server around its session store, database and
    /// authorizer.
    pub fn build<S, D, A>(self, store: S, db: D, authz: A) -> TheaterServer<S, D, A>
    where
        S: SessionStore,
        D: GameDatabase,
        A: Authorizer,
    {
        let shard = self.config.shard();
        let sink = self.sink.unwrap_or_else(|| Box::new(TracingSink));
        let metrics = Arc::new(MetricsReporter::with_boxed_sink(&self.config.metrics, sink));

        tracing::info!(name = %self.config.name, %shard, "theater server configured");

        let state = Arc::new(ServerState {
            name: self.config.name.clone(),
            shard,
            sessions: Mutex::new(SessionManager::new(self.config.session_config())),
            registry: self.registry.unwrap_or_default(),
            store,
            db,
            authz,
            metrics,
            audit: AuditLog::from_config(&self.config.audit),
        });

        TheaterServer {
            state,
            config: self.config,
        }
    }
}

impl Default for TheaterServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured theater server.
///
/// Call [`run()`](Self::run) with the socket layer's event channels.
pub struct TheaterServer<S, D, A> {
    state: Arc<ServerState<S, D, A>>,
    config: ServerConfig,
}

impl<S, D, A> TheaterServer<S, D, A>
where
    S: SessionStore,
    D: GameDatabase,
    A: Authorizer,
{
    pub fn shard(&self) -> &Shard {
        &self.state.shard
    }

    pub fn registry(&self) -> &Arc<GameRegistry> {
        &self.state.registry
    }

    pub fn metrics(&self) -> &Arc<MetricsReporter> {
        &self.state.metrics
    }

    /// Runs the dispatch loop until both channels are closed.
    ///
    /// Starts the metric collection and flush timers first and stops them
    /// afterwards, flushing whatever is still pending.
    pub async fn run(
        self,
        tcp: mpsc::Receiver<TcpEvent>,
        udp: mpsc::Receiver<UdpEvent>,
    ) -> Result<(), GreenroomError> {
        tracing::info!(name = %self.state.name, shard = %self.state.shard, "theater server running");

        let collector = {
            let state = Arc::clone(&self.state);
            spawn_repeating(
                "metrics-collect",
                TickConfig::every(self.config.metrics.collect_interval),
                move |_| {
                    let state = Arc::clone(&state);
                    async move { collect_metrics(&state).await }
                },
            )
        };
        let flusher = {
            let metrics = Arc::clone(&self.state.metrics);
            spawn_repeating(
                "metrics-flush",
                TickConfig::every(self.config.metrics.flush_interval),
                move |_| {
                    let metrics = Arc::clone(&metrics);
                    async move {
                        metrics.flush();
                    }
                },
            )
        };

        dispatch::run(Arc::clone(&self.state), tcp, udp).await;

        collector.stop().await;
        flusher.stop().await;
        self.state.metrics.flush();

        tracing::info!(name = %self.state.name, "theater server stopped");
        Ok(())
    }
}

/// Adds the `clients_total` point.
async fn collect_metrics<S, D, A>(state: &ServerState<S, D, A>) {
    let clients = state.sessions.lock().await.len();
    let tags = BTreeMap::from([
        ("clients".to_string(), "clients-total".to_string()),
        ("server".to_string(), format!("theaterManager-{}", state.name)),
    ]);
    let fields = BTreeMap::from([("clients".to_string(), FieldValue::from(clients))]);
    state.metrics.add_metric("clients_total", tags, fields);
}
