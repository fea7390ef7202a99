use std::time::Duration;

use thiserror::Error;

/// Anything that went wrong talking to the text generation service.
/// Transport, auth and decoding problems all end up here.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Request Error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("No response after {} seconds", .0.as_secs())]
    Timeout(Duration),
    #[error("Environment variable {var:?} with the API key is not set")]
    MissingApiKey { var: String },
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("AI processing failed: {0}")]
    Generation(#[from] GenerationError),
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Chat request failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("The service returned an empty reply")]
    EmptyReply,
}

#[derive(Error, Debug)]
pub enum NoteKeeperError {
    #[error("Another request is still in progress")]
    Busy,
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("Unknown template {id:?}")]
    UnknownTemplate { id: String },
    #[error("Unknown model {token:?}")]
    UnknownModel { token: String },
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Home path not found")]
    NoHomeDir,
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Can't read settings: {0}")]
    Deserialize(#[from] toml::de::Error),
    #[error("Can't write settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}
