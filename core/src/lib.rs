pub mod chat;
pub mod error;
pub mod llmclients;
pub mod render;
pub mod session;
pub mod settings;
pub mod templates;
pub mod transform;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info, warn};

use error::{ChatError, NoteKeeperError};
use llmclients::{GenerativeTextClient, ModelChoice, RequestOptions};
use session::{NoteSession, SessionEvent, SkipReason};
use templates::{KEYWORDS_ID, TemplateDescriptor};
use transform::TransformOutcome;

/// Tells whether a request is in flight. Cloning gives another handle to the
/// same flag, so a UI can grey out its controls while the keeper works.
/// Keepers built with the same flag (see [`NoteKeeper::with_busy_flag`])
/// never have more than one request out between them.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(self.0.clone()))
    }
}

/// Clears the flag when dropped, whatever way the request ended
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub enum AskOutcome {
    Answered,
    /// The transcript got the error message as the assistant turn
    Failed(ChatError),
    Skipped(SkipReason),
}

/// Owns the state of one note keeper and the client it talks to
pub struct NoteKeeper<C>
where
    C: GenerativeTextClient,
{
    client: C,
    session: NoteSession,
    options: RequestOptions,
    busy: BusyFlag,
}

impl<C> NoteKeeper<C>
where
    C: GenerativeTextClient,
{
    pub fn new(client: C) -> Self {
        Self::with_options(client, RequestOptions::default())
    }

    pub fn with_options(client: C, options: RequestOptions) -> Self {
        Self {
            client,
            session: NoteSession::new(),
            options,
            busy: BusyFlag::default(),
        }
    }

    pub fn with_session(mut self, session: NoteSession) -> Self {
        self.session = session;
        self
    }

    /// Shares `busy` with other keepers, a request started while another
    /// holds it fails with [`NoteKeeperError::Busy`]
    pub fn with_busy_flag(mut self, busy: BusyFlag) -> Self {
        self.busy = busy;
        self
    }

    pub fn session(&self) -> &NoteSession {
        &self.session
    }

    pub fn model(&self) -> ModelChoice {
        self.options.model
    }

    pub fn set_model(&mut self, model: ModelChoice) {
        debug!("Switching model to {}", model);
        self.options.model = model;
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn apply(&mut self, event: SessionEvent) {
        self.session = std::mem::take(&mut self.session).apply(event);
    }

    pub fn edit_note<S: AsRef<str>>(&mut self, text: S) {
        self.apply(SessionEvent::NoteEdited(text.as_ref().to_string()));
    }

    pub fn toggle_view(&mut self) {
        self.apply(SessionEvent::ToggleView);
    }

    pub fn reset(&mut self) {
        self.apply(SessionEvent::Reset);
    }

    /// Runs a template by its id, see [`NoteKeeper::run_template`]
    pub async fn run_template_id<S: AsRef<str>>(
        &mut self,
        template_id: S,
        extra: Option<&str>,
    ) -> Result<TransformOutcome, NoteKeeperError> {
        let template_id = template_id.as_ref();
        let template = templates::find_template(template_id).ok_or_else(|| {
            NoteKeeperError::UnknownTemplate {
                id: template_id.to_string(),
            }
        })?;
        self.run_template(template, extra).await
    }

    /// Sends the current source through `template`. A service failure
    /// comes back as [`NoteKeeperError::Transform`] with the session left as
    /// it was, so the caller can alert and let the user retry.
    pub async fn run_template(
        &mut self,
        template: &TemplateDescriptor,
        extra: Option<&str>,
    ) -> Result<TransformOutcome, NoteKeeperError> {
        let request = match transform::prepare(&self.session, template, extra) {
            Ok(request) => request,
            Err(reason) => {
                debug!("Skipping {}: {:?}", template.id, reason);
                return Ok(TransformOutcome::Skipped(reason));
            }
        };

        let _guard = self.busy.try_acquire().ok_or(NoteKeeperError::Busy)?;
        info!("Running template {} with {}", template.id, self.options.model);
        let output = transform::transform(
            &self.client,
            &self.options,
            &request.source_text,
            &request.instruction,
        )
        .await?;

        if output.is_empty() {
            warn!("Template {} got an empty response, nothing changed", template.id);
            return Ok(TransformOutcome::EmptyResponse);
        }
        self.apply(SessionEvent::TransformCompleted(output));
        Ok(TransformOutcome::Applied)
    }

    pub fn open_keyword_form(&mut self) {
        self.apply(SessionEvent::KeywordFormOpened);
    }

    pub fn set_keyword_input<S: AsRef<str>>(&mut self, keywords: S) {
        self.apply(SessionEvent::KeywordsChanged(keywords.as_ref().to_string()));
    }

    pub fn set_keyword_color<S: AsRef<str>>(&mut self, color: S) {
        self.apply(SessionEvent::KeywordColorChanged(color.as_ref().to_string()));
    }

    pub fn cancel_keyword_form(&mut self) {
        self.apply(SessionEvent::KeywordFormClosed);
    }

    /// Runs the keyword template with what the form holds. An empty keyword
    /// list keeps the form open and sends nothing; otherwise the form closes
    /// once the request goes out.
    pub async fn submit_keyword_form(&mut self) -> Result<TransformOutcome, NoteKeeperError> {
        let extra = match self.session.pending_keywords() {
            Some(pending) if pending.is_ready() => pending.extra(),
            _ => return Ok(TransformOutcome::Skipped(SkipReason::MissingKeywords)),
        };
        if self.session.transform_source().is_none() {
            return Ok(TransformOutcome::Skipped(SkipReason::EmptySource));
        }
        if self.is_busy() {
            return Err(NoteKeeperError::Busy);
        }
        self.apply(SessionEvent::KeywordFormClosed);
        self.run_template_id(KEYWORDS_ID, Some(extra.as_str())).await
    }

    /// Asks a question about the current content. The question lands in the
    /// transcript before the service is called, then exactly one assistant
    /// turn follows, an error message when the service fails.
    pub async fn ask<S: AsRef<str>>(&mut self, question: S) -> Result<AskOutcome, NoteKeeperError> {
        let question = question.as_ref();
        if question.trim().is_empty() {
            debug!("Empty question, nothing to ask");
            return Ok(AskOutcome::Skipped(SkipReason::EmptyQuestion));
        }

        let _guard = self.busy.try_acquire().ok_or(NoteKeeperError::Busy)?;
        let context = self.session.chat_context().to_string();
        self.session = std::mem::take(&mut self.session).apply_chat_question(question);

        let reply = chat::request_reply(&self.client, &self.options, &context, question).await;
        self.session = std::mem::take(&mut self.session).apply_chat_reply(&reply);
        Ok(match reply {
            Ok(_) => AskOutcome::Answered,
            Err(e) => AskOutcome::Failed(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        llmclients::testing::{Canned, FakeClient},
        session::{CHAT_ERROR_MESSAGE, ChatTurn, Role, ViewMode},
        templates::find_template,
    };

    const SOURCE: &str = "Patients must report adverse events within 24 hours.";

    fn keeper(client: &FakeClient) -> NoteKeeper<FakeClient> {
        NoteKeeper::new(client.clone())
    }

    #[tokio::test]
    async fn summarize_scenario() {
        let client = FakeClient::replying("- Report AEs within 24h");
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);

        let template = find_template("summarize").unwrap();
        let outcome = keeper.run_template(template, None).await.unwrap();

        assert_eq!(TransformOutcome::Applied, outcome);
        let instructions = client.instructions();
        assert_eq!(1, instructions.len());
        assert!(instructions[0].contains(SOURCE));
        assert!(instructions[0].contains("Summarize"));
        assert_eq!("- Report AEs within 24h", keeper.session().display());
        assert_eq!(SOURCE, keeper.session().note());
        assert_eq!(ViewMode::Previewing, keeper.session().view_mode());
        assert!(!keeper.is_busy());
    }

    #[tokio::test]
    async fn nothing_to_transform_sends_nothing() {
        let client = FakeClient::replying("unused");
        let mut keeper = keeper(&client);

        let outcome = keeper.run_template_id("format", None).await.unwrap();

        assert_eq!(TransformOutcome::Skipped(SkipReason::EmptySource), outcome);
        assert_eq!(0, client.call_count());
        assert_eq!(&NoteSession::new(), keeper.session());
    }

    #[tokio::test]
    async fn failed_transform_leaves_state_alone() {
        let client = FakeClient::new(vec![Canned::Fail, Canned::Reply("# Fixed".to_string())]);
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);
        let before = keeper.session().clone();

        let result = keeper.run_template_id("expand", None).await;

        assert!(matches!(result, Err(NoteKeeperError::Transform(_))));
        assert_eq!(&before, keeper.session());
        assert!(!keeper.is_busy());

        // Retrying is just running it again
        let outcome = keeper.run_template_id("expand", None).await.unwrap();
        assert_eq!(TransformOutcome::Applied, outcome);
        assert_eq!(2, client.call_count());
    }

    #[tokio::test]
    async fn empty_response_changes_nothing() {
        let client = FakeClient::replying("");
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);
        let before = keeper.session().clone();

        let outcome = keeper.run_template_id("quiz", None).await.unwrap();

        assert_eq!(TransformOutcome::EmptyResponse, outcome);
        assert_eq!(&before, keeper.session());
    }

    #[tokio::test]
    async fn transform_works_on_previous_output_when_note_is_empty() {
        let client = FakeClient::new(vec![
            Canned::Reply("first output".to_string()),
            Canned::Reply("second output".to_string()),
        ]);
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);
        keeper.run_template_id("format", None).await.unwrap();
        keeper.toggle_view();
        keeper.edit_note("");

        keeper.run_template_id("simplify", None).await.unwrap();

        assert!(client.instructions()[1].contains("first output"));
        assert_eq!("second output", keeper.session().display());
    }

    #[tokio::test]
    async fn unknown_template() {
        let client = FakeClient::replying("unused");
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);

        let result = keeper.run_template_id("translate", None).await;

        assert!(matches!(result, Err(NoteKeeperError::UnknownTemplate { .. })));
        assert_eq!(0, client.call_count());
    }

    #[tokio::test]
    async fn keyword_form_flow() {
        let client = FakeClient::replying("text with <span style=\"color: teal\">stent</span>");
        let mut keeper = keeper(&client);
        keeper.edit_note("A stent is a Class III device.");
        keeper.open_keyword_form();

        let outcome = keeper.submit_keyword_form().await.unwrap();
        assert_eq!(TransformOutcome::Skipped(SkipReason::MissingKeywords), outcome);
        assert!(keeper.session().pending_keywords().is_some());
        assert_eq!(0, client.call_count());

        keeper.set_keyword_input("stent");
        keeper.set_keyword_color("teal");
        let outcome = keeper.submit_keyword_form().await.unwrap();

        assert_eq!(TransformOutcome::Applied, outcome);
        assert!(keeper.session().pending_keywords().is_none());
        let instruction = &client.instructions()[0];
        assert!(instruction.contains("stent (color: teal)"));
        assert!(instruction.contains("A stent is a Class III device."));
    }

    #[tokio::test]
    async fn cancelled_keyword_form_sends_nothing() {
        let client = FakeClient::replying("unused");
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);
        keeper.open_keyword_form();
        keeper.set_keyword_input("adverse");
        keeper.cancel_keyword_form();

        let outcome = keeper.submit_keyword_form().await.unwrap();

        assert_eq!(TransformOutcome::Skipped(SkipReason::MissingKeywords), outcome);
        assert_eq!(0, client.call_count());
    }

    #[tokio::test]
    async fn failed_question_scenario() {
        let client = FakeClient::failing();
        let mut keeper = keeper(&client);

        let outcome = keeper.ask("What is Order 739?").await.unwrap();

        assert!(matches!(outcome, AskOutcome::Failed(_)));
        assert_eq!(
            &[
                ChatTurn::user("What is Order 739?"),
                ChatTurn::assistant(CHAT_ERROR_MESSAGE)
            ],
            keeper.session().transcript().turns()
        );
        assert!(!keeper.is_busy());
    }

    #[tokio::test]
    async fn chat_uses_the_display_as_context() {
        let client = FakeClient::new(vec![
            Canned::Reply("# Clean note".to_string()),
            Canned::Reply("Within 24 hours.".to_string()),
        ]);
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);
        keeper.run_template_id("format", None).await.unwrap();

        let outcome = keeper.ask("When do I report?").await.unwrap();

        assert!(matches!(outcome, AskOutcome::Answered));
        assert!(client.instructions()[1].contains("# Clean note"));
        let transcript = keeper.session().transcript();
        assert_eq!(2, transcript.len());
        assert_eq!("Within 24 hours.", transcript.turns()[1].text());
    }

    #[tokio::test]
    async fn blank_questions_are_skipped() {
        let client = FakeClient::replying("unused");
        let mut keeper = keeper(&client);

        let outcome = keeper.ask("   ").await.unwrap();

        assert!(matches!(outcome, AskOutcome::Skipped(SkipReason::EmptyQuestion)));
        assert!(keeper.session().transcript().is_empty());
        assert_eq!(0, client.call_count());
    }

    #[tokio::test]
    async fn busy_flag_is_set_during_a_request() {
        let client = FakeClient::new(vec![Canned::Hang]);
        let mut keeper = NoteKeeper::with_options(
            client.clone(),
            RequestOptions {
                timeout: std::time::Duration::from_millis(50),
                ..Default::default()
            },
        );
        keeper.edit_note(SOURCE);
        let busy = keeper.busy_flag();

        let watcher = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            busy.is_busy()
        });
        let result = keeper.run_template_id("summarize", None).await;

        assert!(watcher.await.unwrap());
        assert!(matches!(result, Err(NoteKeeperError::Transform(_))));
        assert!(!keeper.is_busy());
    }

    #[tokio::test]
    async fn question_is_recorded_before_the_reply() {
        let client = FakeClient::new(vec![Canned::Hang]);
        let mut keeper = keeper(&client);

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            keeper.ask("What is Order 739?"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(1, client.call_count());
        assert_eq!(
            &[ChatTurn::user("What is Order 739?")],
            keeper.session().transcript().turns()
        );
        assert!(!keeper.is_busy());
    }

    #[tokio::test]
    async fn transcript_grows_by_two_per_question() {
        let client = FakeClient::new(vec![
            Canned::Reply("Class III is the highest risk.".to_string()),
            Canned::Fail,
            Canned::Reply(String::new()),
        ]);
        let mut keeper = keeper(&client);
        keeper.edit_note(SOURCE);

        for (i, question) in ["Which class?", "And testing?", "Clinical?"].iter().enumerate() {
            keeper.ask(question).await.unwrap();
            assert_eq!(2 * (i + 1), keeper.session().transcript().len());
        }

        let transcript = keeper.session().transcript();
        let roles = transcript.iter().map(|t| t.role()).collect::<Vec<_>>();
        assert_eq!(
            vec![
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ],
            roles
        );
        assert_eq!("Class III is the highest risk.", transcript.turns()[1].text());
        assert_eq!(CHAT_ERROR_MESSAGE, transcript.turns()[3].text());
        assert_eq!(CHAT_ERROR_MESSAGE, transcript.turns()[5].text());
    }

    #[tokio::test]
    async fn keepers_sharing_a_flag_take_turns() {
        let busy = BusyFlag::default();
        let slow = NoteKeeper::with_options(
            FakeClient::new(vec![Canned::Hang]),
            RequestOptions {
                timeout: std::time::Duration::from_millis(100),
                ..Default::default()
            },
        )
        .with_busy_flag(busy.clone());
        let client = FakeClient::replying("unused");
        let mut keeper = keeper(&client).with_busy_flag(busy.clone());
        keeper.edit_note(SOURCE);
        keeper.open_keyword_form();
        keeper.set_keyword_input("adverse");

        let running = tokio::spawn(async move {
            let mut slow = slow;
            slow.edit_note(SOURCE);
            slow.run_template_id("summarize", None).await.is_err()
        });
        while !busy.is_busy() {
            tokio::task::yield_now().await;
        }

        let transform = keeper.run_template_id("format", None).await;
        assert!(matches!(transform, Err(NoteKeeperError::Busy)));
        let keywords = keeper.submit_keyword_form().await;
        assert!(matches!(keywords, Err(NoteKeeperError::Busy)));
        assert!(keeper.session().pending_keywords().is_some());
        let question = keeper.ask("Who reports?").await;
        assert!(matches!(question, Err(NoteKeeperError::Busy)));
        assert!(keeper.session().transcript().is_empty());
        assert_eq!(0, client.call_count());

        assert!(running.await.unwrap());
        assert!(!busy.is_busy());
        let outcome = keeper.run_template_id("format", None).await.unwrap();
        assert_eq!(TransformOutcome::Applied, outcome);
        assert_eq!(1, client.call_count());
    }

    #[test]
    fn a_held_flag_rejects_a_second_request() {
        let flag = BusyFlag::default();
        let guard = flag.try_acquire().unwrap();
        assert!(flag.is_busy());
        assert!(flag.try_acquire().is_none());
        drop(guard);
        assert!(!flag.is_busy());
    }

    #[test]
    fn model_can_be_switched() {
        let mut keeper = NoteKeeper::new(FakeClient::default());
        assert_eq!(ModelChoice::Gemini3Flash, keeper.model());
        keeper.set_model(ModelChoice::Gemini3Pro);
        assert_eq!(ModelChoice::Gemini3Pro, keeper.model());
    }
}
