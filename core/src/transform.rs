use log::{debug, error};

use crate::{
    error::TransformError,
    llmclients::{GenerativeTextClient, RequestOptions, generate_within},
    session::{NoteSession, SkipReason},
    templates::TemplateDescriptor,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The display now holds the output and the view is previewing
    Applied,
    /// The service answered with no text, nothing changed
    EmptyResponse,
    /// Nothing was sent
    Skipped(SkipReason),
}

/// A transform ready to be sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    pub source_text: String,
    pub instruction: String,
}

/// Validates the input of a transform and builds its instruction. This is
/// where a missing source or a missing keyword list stops the action, the
/// templates themselves never refuse.
pub fn prepare(
    session: &NoteSession,
    template: &TemplateDescriptor,
    extra: Option<&str>,
) -> Result<TransformRequest, SkipReason> {
    let source_text = session.transform_source().ok_or(SkipReason::EmptySource)?;
    let extra = extra.filter(|e| !e.trim().is_empty());
    if template.requires_extra && extra.is_none() {
        return Err(SkipReason::MissingKeywords);
    }

    Ok(TransformRequest {
        source_text: source_text.to_string(),
        instruction: template.render(source_text, extra),
    })
}

/// Sends the instruction to the service once and returns its text.
pub async fn transform<C>(
    client: &C,
    options: &RequestOptions,
    source_text: &str,
    instruction: &str,
) -> Result<String, TransformError>
where
    C: GenerativeTextClient + ?Sized,
{
    debug!(
        "Transforming {} chars of source with {}",
        source_text.chars().count(),
        options.model
    );
    let output = generate_within(client, options, instruction)
        .await
        .inspect_err(|e| error!("AI Error: {}", e))?;
    Ok(output)
}
