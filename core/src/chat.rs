use log::warn;

use crate::{
    error::ChatError,
    llmclients::{GenerativeTextClient, RequestOptions, generate_within},
};

pub fn chat_instruction<C: AsRef<str>, Q: AsRef<str>>(context: C, question: Q) -> String {
    format!(
        r#"You are a helpful NMPA Regulatory assistant. The user is asking about this note:

"{}"

Answer concisely.

User Question: {}"#,
        context.as_ref(),
        question.as_ref()
    )
}

/// Asks the service one question about `context`. The reply is an error
/// when the call fails or comes back empty.
pub async fn request_reply<C>(
    client: &C,
    options: &RequestOptions,
    context: &str,
    question: &str,
) -> Result<String, ChatError>
where
    C: GenerativeTextClient + ?Sized,
{
    let instruction = chat_instruction(context, question);
    let reply = generate_within(client, options, &instruction)
        .await
        .inspect_err(|e| warn!("Chat request failed: {}", e))?;
    if reply.is_empty() {
        warn!("Chat request returned no text");
        return Err(ChatError::EmptyReply);
    }
    Ok(reply)
}
