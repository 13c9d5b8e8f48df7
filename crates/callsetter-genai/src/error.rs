use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenAiError {
    #[error("request to text generation provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("provider returned no content")]
    EmptyResponse,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
