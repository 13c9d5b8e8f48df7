//! Shared types for the callsetter workspace.
//!
//! This crate holds the serialisable records that cross crate boundaries:
//! the call state snapshot broadcast to subscribers, the ephemeral audio
//! metrics, the configuration passed to the voice service when a call is
//! started, the `{success, message, error}` result every session operation
//! returns, and the assistant personas offered to visitors.
//!
//! Nothing here has behaviour beyond small derived accessors. The state
//! machine that mutates these records lives in `callsetter-session`.

pub mod call;
pub mod persona;

pub use call::{
    CallConfig, CallMetrics, CallPhase, CallResult, CallState, Customer, TranscriptMessage,
};
pub use persona::Persona;
