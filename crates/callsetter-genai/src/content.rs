//! Marketing content built on top of a [`TextGenerator`].

use crate::error::GenAiError;
use crate::generator::TextGenerator;
use crate::message::{ChatMessage, CompletionOptions};
use callsetter_types::TranscriptMessage;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Transcript characters sent to a provider; older lines are dropped first.
const MAX_TRANSCRIPT_CHARS: usize = 12_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowUpChannel {
    #[default]
    Email,
    Sms,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpRequest {
    #[serde(default)]
    pub visitor_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub channel: FollowUpChannel,
    /// Free-form notes about what the visitor wanted.
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptMessage>,
}

/// Renders final transcript lines as `role: text`, newest last, capped at
/// [`MAX_TRANSCRIPT_CHARS`].
fn render_transcript(transcript: &[TranscriptMessage]) -> String {
    let lines: Vec<String> = transcript
        .iter()
        .filter(|m| m.kind.as_deref() == Some("transcript"))
        .filter(|m| m.transcript_type.as_deref().map_or(true, |t| t == "final"))
        .filter_map(|m| {
            let text = m.transcript.as_deref()?.trim();
            (!text.is_empty()).then(|| {
                format!("{}: {}", m.role.as_deref().unwrap_or("unknown"), text)
            })
        })
        .collect();

    let mut kept = Vec::new();
    let mut total = 0;
    for line in lines.iter().rev() {
        total += line.chars().count() + 1;
        if total > MAX_TRANSCRIPT_CHARS {
            break;
        }
        kept.push(line.as_str());
    }
    kept.reverse();
    kept.join("\n")
}

/// Summarises a finished call for the sales team.
pub async fn summarize_call(
    generator: &dyn TextGenerator,
    transcript: &[TranscriptMessage],
) -> Result<String, GenAiError> {
    let rendered = render_transcript(transcript);
    if rendered.is_empty() {
        return Err(GenAiError::InvalidInput(
            "transcript has no final lines".to_string(),
        ));
    }
    let messages = [
        ChatMessage::system(
            "You summarise sales discovery calls. Reply with three to five short bullet \
             points: the visitor's goal, their objections, and any agreed next step.",
        ),
        ChatMessage::user(format!("Call transcript:\n{rendered}")),
    ];
    generator
        .complete(
            &messages,
            &CompletionOptions {
                max_tokens: 300,
                temperature: 0.3,
            },
        )
        .await
}

/// Drafts a follow-up message to send a visitor after their call.
pub async fn draft_follow_up(
    generator: &dyn TextGenerator,
    request: &FollowUpRequest,
) -> Result<String, GenAiError> {
    let rendered = render_transcript(&request.transcript);
    let notes = request.notes.as_deref().map(str::trim).unwrap_or_default();
    if rendered.is_empty() && notes.is_empty() {
        return Err(GenAiError::InvalidInput(
            "either notes or a transcript is required".to_string(),
        ));
    }

    let style = match request.channel {
        FollowUpChannel::Email => {
            "Write a short, friendly follow-up email with a subject line. Under 150 words."
        }
        FollowUpChannel::Sms => "Write a single follow-up text message under 300 characters.",
    };

    let mut prompt = String::new();
    if let Some(name) = &request.visitor_name {
        let _ = writeln!(prompt, "Visitor: {name}");
    }
    if let Some(company) = &request.company {
        let _ = writeln!(prompt, "Company: {company}");
    }
    if !notes.is_empty() {
        let _ = writeln!(prompt, "Notes: {notes}");
    }
    if !rendered.is_empty() {
        let _ = writeln!(prompt, "Call transcript:\n{rendered}");
    }

    let messages = [
        ChatMessage::system(format!(
            "You write follow-ups for visitors who spoke with our voice assistant. {style} \
             Reference what they asked about and propose one clear next step."
        )),
        ChatMessage::user(prompt),
    ];
    generator
        .complete(&messages, &CompletionOptions::default())
        .await
}
