//! `RelayServer` — component wiring and the Axum router.
//!
//! Boot order matters: the bootstrap feature (app config) is initialized
//! explicitly before the locator runs, the registry's client-monitor
//! notifier is bound before any connection can trigger a notification, and
//! only then does the locator initialize the remaining providers
//! sequentially.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use relay_auth::{AuthService, TokenValidator, UserDirectory};
use relay_core::Feature;
use relay_hub::providers::{AppConfigProvider, CounterProvider, UserConfigProvider};
use relay_hub::{
    Broadcaster, ConnectionRegistry, FeatureBus, FeatureDataProvider, FeatureError,
    FeatureLocator, FeatureNotifier, run_feature_listener,
};

use crate::config::RelayConfig;
use crate::gateway::ConnectionGateway;
use crate::health::{self, HealthResponse};
use crate::hub::WsHub;
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::ws;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<RelayConfig>,
    /// Transport hub (channels + groups).
    pub hub: Arc<WsHub>,
    /// Live-connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Connection gateway.
    pub gateway: Arc<ConnectionGateway>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for the `/metrics` endpoint.
    pub metrics: Option<PrometheusHandle>,
}

/// The assembled relay server.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    hub: Arc<WsHub>,
    registry: Arc<ConnectionRegistry>,
    gateway: Arc<ConnectionGateway>,
    locator: Arc<FeatureLocator>,
    broadcaster: Arc<Broadcaster>,
    bus: Arc<FeatureBus>,
    app_config: Arc<AppConfigProvider>,
    user_config: Arc<UserConfigProvider>,
    counter: Arc<CounterProvider>,
    shutdown: Arc<ShutdownCoordinator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Wire all components. No I/O happens here; call [`Self::init`] next.
    #[must_use]
    pub fn new(config: RelayConfig, directory: Arc<dyn UserDirectory>) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = Arc::new(WsHub::new());
        let transport: Arc<dyn relay_hub::GroupSender> = hub.clone();
        let broadcaster = Arc::new(Broadcaster::new(registry.active_features(), transport));

        let app_config = Arc::new(AppConfigProvider::new(Arc::clone(&broadcaster)));
        let user_config = Arc::new(UserConfigProvider::new(Arc::clone(&broadcaster)));
        let counter = Arc::new(CounterProvider::new(Arc::clone(&broadcaster)));

        registry.bind_monitor(FeatureNotifier::new(
            Feature::ClientMonitor,
            Arc::clone(&broadcaster),
        ));

        let mut locator = FeatureLocator::new();
        locator.register(app_config.clone());
        locator.register(user_config.clone());
        locator.register(counter.clone());
        locator.register(registry.clone());
        let locator = Arc::new(locator);

        let auth = Arc::new(AuthService::new(
            TokenValidator::new(config.jwt_secret.as_bytes()),
            directory,
        ));
        let gateway = Arc::new(ConnectionGateway::new(
            Arc::clone(&registry),
            Arc::clone(&locator),
            auth,
            Arc::clone(&hub),
        ));

        Self {
            config,
            hub,
            registry,
            gateway,
            locator,
            broadcaster,
            bus: Arc::new(FeatureBus::default()),
            app_config,
            user_config,
            counter,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            tasks: Mutex::new(Vec::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Attach the Prometheus handle for the `/metrics` endpoint.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Boot initialization: bootstrap feature first, then the locator, then
    /// the background tasks (bus listeners, counter tick).
    pub async fn init(&self) -> Result<(), FeatureError> {
        // app config is the bootstrap feature, initialized before the rest
        self.app_config.init().await?;
        self.locator.init().await?;

        self.spawn_bus_listeners();
        self.spawn_counter_tick();
        info!("relay server initialized");
        Ok(())
    }

    /// One bus listener per feature, so write paths can publish through the
    /// typed bus instead of holding provider references.
    fn spawn_bus_listeners(&self) {
        let mut tasks = self.tasks.lock();
        for feature in Feature::ALL {
            let notifier = FeatureNotifier::new(feature, Arc::clone(&self.broadcaster));
            let rx = self.bus.subscribe();
            let token = self.shutdown.token();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    () = run_feature_listener(rx, notifier) => {}
                    () = token.cancelled() => {}
                }
            }));
        }
    }

    /// Periodic demo-counter tick, gated by the `devCounter` app config
    /// switch.
    fn spawn_counter_tick(&self) {
        let counter = Arc::clone(&self.counter);
        let app_config = Arc::clone(&self.app_config);
        let token = self.shutdown.token();
        let period = Duration::from_secs(self.config.counter_interval_secs);

        self.tasks.lock().push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if app_config.get("devCounter") == Some(serde_json::Value::Bool(true)) {
                            let value = counter.tick();
                            debug!(value, "counter ticked");
                        }
                    }
                    () = token.cancelled() => break,
                }
            }
        }));
    }

    /// Build the Axum router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            config: Arc::clone(&self.config),
            hub: Arc::clone(&self.hub),
            registry: Arc::clone(&self.registry),
            gateway: Arc::clone(&self.gateway),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws::ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Stop background tasks and wait for them to drain.
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        self.shutdown.graceful_shutdown(handles, None).await;
    }

    /// Server configuration.
    #[must_use]
    pub fn config(&self) -> &Arc<RelayConfig> {
        &self.config
    }

    /// Transport hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<WsHub> {
        &self.hub
    }

    /// Live-connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Connection gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<ConnectionGateway> {
        &self.gateway
    }

    /// Typed feature event bus for write paths.
    #[must_use]
    pub fn bus(&self) -> &Arc<FeatureBus> {
        &self.bus
    }

    /// App config provider (bootstrap feature).
    #[must_use]
    pub fn app_config(&self) -> &Arc<AppConfigProvider> {
        &self.app_config
    }

    /// User config provider.
    #[must_use]
    pub fn user_config(&self) -> &Arc<UserConfigProvider> {
        &self.user_config
    }

    /// Demo counter provider.
    #[must_use]
    pub fn counter(&self) -> &Arc<CounterProvider> {
        &self.counter
    }

    /// Shutdown coordinator.
    #[must_use]
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.hub.connection_count(),
        state.registry.active_features().get(),
    );
    Json(resp)
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(metrics::render)
        .unwrap_or_default()
}

/// Bind the listener and serve until the shutdown token fires.
pub async fn serve(server: &RelayServer) -> std::io::Result<()> {
    let addr = format!("{}:{}", server.config.host, server.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "relay server listening");

    let token = server.shutdown.token();
    axum::serve(
        listener,
        server
            .router()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { token.cancelled().await })
    .await
}
