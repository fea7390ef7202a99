use std::{fmt::Display, str::FromStr, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, NoteKeeperError};

pub mod gemini;

/// The external text generation service. Takes the model token and a full
/// instruction, returns whatever text came back, possibly empty.
#[async_trait]
pub trait GenerativeTextClient: Send + Sync {
    async fn generate(&self, model: &ModelChoice, instruction: &str)
    -> Result<String, GenerationError>;
}

#[async_trait]
impl<C> GenerativeTextClient for Box<C>
where
    C: GenerativeTextClient + ?Sized,
{
    async fn generate(
        &self,
        model: &ModelChoice,
        instruction: &str,
    ) -> Result<String, GenerationError> {
        (**self).generate(model, instruction).await
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Which model to ask and how long to wait for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub model: ModelChoice,
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            model: ModelChoice::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One call to the service, a timeout counts as a failed call
pub async fn generate_within<C>(
    client: &C,
    options: &RequestOptions,
    instruction: &str,
) -> Result<String, GenerationError>
where
    C: GenerativeTextClient + ?Sized,
{
    match tokio::time::timeout(options.timeout, client.generate(&options.model, instruction)).await
    {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(options.timeout)),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelChoice {
    #[default]
    Gemini3Flash,
    Gemini3Pro,
}

impl ModelChoice {
    pub fn all() -> &'static [ModelChoice] {
        &[ModelChoice::Gemini3Flash, ModelChoice::Gemini3Pro]
    }

    pub fn token(&self) -> &'static str {
        match self {
            ModelChoice::Gemini3Flash => "gemini-3-flash-preview",
            ModelChoice::Gemini3Pro => "gemini-3-pro-preview",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelChoice::Gemini3Flash => "Gemini 3 Flash",
            ModelChoice::Gemini3Pro => "Gemini 3 Pro",
        }
    }
}

impl Display for ModelChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl FromStr for ModelChoice {
    type Err = NoteKeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        ModelChoice::all()
            .iter()
            .find(|m| m.token() == token)
            .copied()
            .ok_or_else(|| NoteKeeperError::UnknownModel {
                token: token.to_string(),
            })
    }
}

impl TryFrom<String> for ModelChoice {
    type Error = NoteKeeperError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelChoice> for String {
    fn from(value: ModelChoice) -> Self {
        value.token().to_string()
    }
}
