//! Text generation and speech synthesis for callsetter.
//!
//! These collaborators sit beside the call session, not inside it: they
//! turn finished calls into summaries and follow-up messages, and render
//! text to audio. Providers are reached over plain HTTPS with `reqwest`.

pub mod anthropic;
pub mod config;
pub mod content;
pub mod elevenlabs;
pub mod error;
pub mod generator;
pub mod message;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use config::{build_generator, build_speech_client, GenAiConfig, Provider, TtsConfig};
pub use content::{draft_follow_up, summarize_call, FollowUpChannel, FollowUpRequest};
pub use elevenlabs::ElevenLabsClient;
pub use error::GenAiError;
pub use generator::TextGenerator;
pub use message::{ChatMessage, ChatRole, CompletionOptions};
pub use openai::OpenAiClient;
