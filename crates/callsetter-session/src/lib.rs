//! Call session state management for the callsetter voice widget.
//!
//! A visitor's voice call runs entirely inside a hosted voice-AI service.
//! This crate tracks that call's lifecycle on our side and fans it out to
//! any number of subscribers:
//!
//! - [`CallSessionManager`] wraps one [`VoiceSdk`] client, normalises its
//!   events through a central alias table and owns the state store.
//! - [`EventBus`] is the publish/subscribe registry subscribers attach to.
//! - [`CallStateStore`] holds the single [`CallState`] record and the
//!   ephemeral [`CallMetrics`].
//! - [`DurationTimer`] refreshes the call duration once per second while a
//!   call is active.
//! - [`VapiClient`] is the concrete [`VoiceSdk`] for VAPI, driven by REST
//!   calls and server webhooks.
//!
//! [`CallState`]: callsetter_types::CallState
//! [`CallMetrics`]: callsetter_types::CallMetrics

pub mod bus;
pub mod config;
pub mod debug;
pub mod error;
pub mod event;
pub mod manager;
pub mod normalize;
pub mod sdk;
pub mod store;
pub mod timer;
pub mod vapi;

pub use bus::{EventBus, Listener};
pub use config::{validate_identifier, IdentifierCheck, Readiness, SessionSettings};
pub use debug::{attach_debug_tap, diagnostics, DebugTap, SessionDiagnostics};
pub use error::{SdkError, SessionError};
pub use event::{EventKind, ParseEventKindError, SessionEvent};
pub use manager::CallSessionManager;
pub use sdk::{OutboundMessage, SdkCallback, VoiceSdk};
pub use store::CallStateStore;
pub use timer::DurationTimer;
pub use vapi::{ActiveCall, VapiClient, VapiConfig, DEFAULT_VAPI_BASE_URL};
