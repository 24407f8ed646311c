use crate::config::PitlaneConfig;
use crate::http::session::CookieSettings;
use crate::http::{self, AppState, SessionAgents};
use pitlane_core::{ChatBackend, HttpChatBackend, UnconfiguredBackend, Workspaces};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub async fn run(config: PitlaneConfig) -> anyhow::Result<()> {
    let errors = config.validate();
    if !errors.is_empty() {
        anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "));
    }

    info!("Starting PitLane server v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.server.env);

    let workspaces = Workspaces::new(config.workspace_base());
    std::fs::create_dir_all(workspaces.base())?;
    info!("Workspaces: {:?}", workspaces.base());

    let backend: Arc<dyn ChatBackend> = match &config.agent.endpoint {
        Some(endpoint) => {
            let backend = HttpChatBackend::new(endpoint.as_str(), config.agent_timeout())?;
            info!(
                "Chat backend: {} (timeout {}s)",
                backend.endpoint(),
                config.agent.timeout_secs
            );
            Arc::new(backend)
        }
        None => {
            warn!("No chat backend configured; chat requests will report an error");
            Arc::new(UnconfiguredBackend)
        }
    };

    let cookies = CookieSettings {
        max_age_secs: config.session.max_age_secs,
        secure: config.cookie_secure(),
    };
    if !cookies.secure {
        warn!("Session cookies are sent without the Secure flag");
    }

    info!("Agent cache capacity: {}", config.cache.max_agents);
    let app_state = AppState {
        agents: SessionAgents::new(config.cache.max_agents),
        workspaces,
        backend,
        cookies,
        start_time: std::time::Instant::now(),
    };

    let app = http::create_router(app_state).layer(TraceLayer::new_for_http());

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("HTTP: {}", listener.local_addr()?);
    info!("PitLane server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, terminating...");
}
