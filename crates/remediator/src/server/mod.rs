mod routes;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::{
    config::Config,
    dispatcher::Dispatcher,
    sources::WebhookHandler,
    store::Store,
    Result,
};

pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub store: Arc<dyn Store>,
    pub webhook: WebhookHandler,
    pub bearer_token: Option<String>,
}

pub struct Server {
    state: Arc<AppState>,
    max_body_bytes: usize,
}

impl Server {
    pub fn new(config: &Config, dispatcher: Arc<Dispatcher>, store: Arc<dyn Store>) -> Self {
        let webhook = WebhookHandler::new(dispatcher.clone(), config.webhook.target_labels.clone());
        let state = AppState {
            dispatcher,
            store,
            webhook,
            bearer_token: config.webhook.bearer_token.clone(),
        };

        Self {
            state: Arc::new(state),
            max_body_bytes: config.webhook.max_body_bytes,
        }
    }

    pub fn build_router(self) -> Router {
        Router::new()
            .route("/health", get(routes::health))
            .route("/webhook", post(routes::webhook))
            .route("/tasks", get(routes::list_tasks))
            .route("/tasks/{id}", get(routes::get_task))
            .route("/cooldowns", get(routes::list_cooldowns))
            .route("/metrics", get(routes::metrics))
            .layer(
                ServiceBuilder::new()
                    .layer(
                        TraceLayer::new_for_http()
                            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                            .on_response(DefaultOnResponse::new().level(Level::INFO)),
                    )
                    .layer(DefaultBodyLimit::max(self.max_body_bytes)),
            )
            .with_state(self.state)
    }

    pub async fn start(self, addr: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
