//! callsetter server binary.
//!
//! Loads configuration, builds the one call session manager for the
//! process, and serves the widget API with graceful shutdown on
//! SIGTERM/SIGINT. The active call, if any, is ended before exit.

use callsetter_server::{app, config, AppState};
use callsetter_session::{attach_debug_tap, CallSessionManager, VapiClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CALLSETTER_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration: the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Voice client and session manager
    let settings = config.voice.session.clone();
    let (manager, vapi) = match VapiClient::new(config.voice.vapi_config()) {
        Ok(client) => {
            let client = Arc::new(client);
            let manager = CallSessionManager::new(client.clone(), settings);
            (manager, Some(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "VAPI client unavailable; calls are disabled");
            (CallSessionManager::without_sdk(settings, e.to_string()), None)
        }
    };
    let manager = Arc::new(manager);

    let _debug_tap = config
        .voice
        .session
        .debug
        .then(|| attach_debug_tap(&manager));

    let mut state = AppState::new(manager.clone())
        .with_personas(config.personas.clone())
        .with_webhook_secret(config.voice.webhook_secret.clone())
        .with_debug(config.voice.session.debug);
    if let Some(vapi) = vapi {
        state = state.with_vapi(vapi);
    }
    if let Some(genai) = &config.genai {
        match callsetter_genai::build_generator(genai) {
            Ok(generator) => state = state.with_generator(generator),
            Err(e) => tracing::warn!(error = %e, "text generation disabled"),
        }
    }
    if let Some(tts) = &config.tts {
        match callsetter_genai::build_speech_client(tts) {
            Ok(client) => state = state.with_speech(client, tts.voice_id.clone()),
            Err(e) => tracing::warn!(error = %e, "speech synthesis disabled"),
        }
    }

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, ready = manager.is_ready(), "starting callsetter server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address: is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    manager.shutdown().await;
    tracing::info!("callsetter server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
