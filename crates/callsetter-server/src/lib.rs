//! callsetter HTTP shell.
//!
//! Owns the single call session manager for the process and exposes it to
//! the marketing site over a small JSON API, a server-sent event stream and
//! the VAPI webhook endpoint.

pub mod api;
pub mod api_sse;
pub mod config;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use callsetter_genai::{ElevenLabsClient, TextGenerator};
use callsetter_session::{CallSessionManager, EventKind, Listener, SessionEvent, VapiClient};
use callsetter_types::Persona;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Buffered session events per SSE subscriber before it starts lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Maximum request body size (1 MiB). Transcripts for follow-ups are the
/// largest payloads.
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The one call session manager for this process.
    pub manager: Arc<CallSessionManager>,
    /// VAPI client backing the manager, when VAPI is configured. Webhooks
    /// are delivered to it.
    pub vapi: Option<Arc<VapiClient>>,
    /// Personas offered to visitors.
    pub personas: Arc<Vec<Persona>>,
    /// Session events re-broadcast for SSE subscribers.
    pub events_tx: broadcast::Sender<SessionEvent>,
    /// Text generator for content endpoints.
    pub generator: Option<Arc<dyn TextGenerator>>,
    /// Speech synthesis for `/api/content/speech`.
    pub speech: Option<Arc<ElevenLabsClient>>,
    /// Voice used when a speech request names none.
    pub default_voice_id: Option<String>,
    /// Expected `x-vapi-secret` header on webhooks.
    pub webhook_secret: Option<String>,
    /// Exposes diagnostic endpoints.
    pub debug: bool,
}

impl AppState {
    /// Wraps `manager` and starts forwarding its events to
    /// [`AppState::events_tx`].
    pub fn new(manager: Arc<CallSessionManager>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        forward_session_events(&manager, &events_tx);
        Self {
            manager,
            vapi: None,
            personas: Arc::new(Vec::new()),
            events_tx,
            generator: None,
            speech: None,
            default_voice_id: None,
            webhook_secret: None,
            debug: false,
        }
    }

    pub fn with_vapi(mut self, vapi: Arc<VapiClient>) -> Self {
        self.vapi = Some(vapi);
        self
    }

    pub fn with_personas(mut self, personas: Vec<Persona>) -> Self {
        self.personas = Arc::new(personas);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_speech(mut self, client: ElevenLabsClient, default_voice_id: Option<String>) -> Self {
        self.speech = Some(Arc::new(client));
        self.default_voice_id = default_voice_id.filter(|id| !id.is_empty());
        self
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }
}

/// Subscribes to every session event kind and re-sends into `tx`.
///
/// A send only fails when nobody is listening, which is the normal state
/// between SSE connections.
fn forward_session_events(manager: &CallSessionManager, tx: &broadcast::Sender<SessionEvent>) {
    for kind in EventKind::ALL {
        let tx = tx.clone();
        let listener: Listener = Arc::new(move |event: &SessionEvent| {
            let _ = tx.send(event.clone());
        });
        manager.on(kind, listener);
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/call/state", get(api::get_call_state_handler))
        .route("/api/call/start", post(api::start_call_handler))
        .route("/api/call/end", post(api::end_call_handler))
        .route("/api/call/mute", post(api::set_mute_handler))
        .route("/api/call/mute/toggle", post(api::toggle_mute_handler))
        .route("/api/call/message", post(api::send_message_handler))
        .route("/api/call/events", get(api_sse::get_call_event_stream_handler))
        .route("/api/personas", get(api::list_personas_handler))
        .route("/api/content/follow-up", post(api::follow_up_handler))
        .route("/api/content/summary", post(api::summary_handler))
        .route("/api/content/speech", post(api::speech_handler))
        .route("/webhooks/vapi", post(webhook::vapi_webhook_handler));

    if state.debug {
        router = router.route("/api/debug/session", get(api::debug_session_handler));
    }

    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
