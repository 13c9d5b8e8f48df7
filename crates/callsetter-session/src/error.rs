use thiserror::Error;

/// Errors raised by a voice SDK collaborator.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("voice SDK unavailable: {0}")]
    Unavailable(String),

    #[error("voice service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("voice service rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("no active call")]
    NoActiveCall,

    #[error("invalid voice SDK configuration: {0}")]
    Config(String),

    #[error("voice SDK error: {0}")]
    Other(String),
}

/// Reasons a session operation did not go through.
///
/// These never escape the manager as `Err`; they are rendered into the
/// `message`/`error` fields of a `CallResult`.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("voice service is not ready: {0}")]
    NotReady(String),

    #[error("a call is already active or connecting")]
    AlreadyActive,

    #[error("no active call to end")]
    NothingToEnd,

    #[error("connection attempt was cancelled before the call came up")]
    Cancelled,

    #[error("failed to start call: {0}")]
    StartFailed(#[source] SdkError),

    #[error("voice SDK panicked while {0}")]
    Panicked(&'static str),

    #[error("timed out connecting to the voice service after {0} seconds")]
    ConnectTimeout(u64),
}
