//! State of one note keeper: the raw note, what's displayed, the view mode,
//! the chat transcript and the keyword form. Transitions are pure, they take
//! the current state and return the next one.

use std::fmt::Display;

use log::debug;

use crate::{
    error::ChatError,
    templates::{DEFAULT_HIGHLIGHT_COLOR, keyword_extra},
};

/// What an assistant turn says when the service couldn't answer
pub const CHAT_ERROR_MESSAGE: &str = "Error connecting to AI.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Editing,
    Previewing,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Editing => ViewMode::Previewing,
            ViewMode::Previewing => ViewMode::Editing,
        }
    }
}

impl Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ViewMode::Editing => "Editing",
                ViewMode::Previewing => "Previewing",
            }
        )
    }
}

/// Why an action was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptySource,
    MissingKeywords,
    EmptyQuestion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    role: Role,
    text: String,
}

impl ChatTurn {
    pub fn user<S: AsRef<str>>(text: S) -> Self {
        Self {
            role: Role::User,
            text: text.as_ref().to_string(),
        }
    }

    pub fn assistant<S: AsRef<str>>(text: S) -> Self {
        Self {
            role: Role::Assistant,
            text: text.as_ref().to_string(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Ordered, append only list of chat turns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_question<S: AsRef<str>>(mut self, question: S) -> Self {
        self.turns.push(ChatTurn::user(question));
        self
    }

    /// Always appends one assistant turn, the error message when there's no
    /// usable reply.
    pub fn with_reply(mut self, reply: &Result<String, ChatError>) -> Self {
        let turn = match reply {
            Ok(text) if !text.is_empty() => ChatTurn::assistant(text),
            _ => ChatTurn::assistant(CHAT_ERROR_MESSAGE),
        };
        self.turns.push(turn);
        self
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatTurn> {
        self.turns.iter()
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a ChatTurn;
    type IntoIter = std::slice::Iter<'a, ChatTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Only lives while the keyword form is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingKeywordRequest {
    pub keywords: String,
    pub color: String,
}

impl PendingKeywordRequest {
    pub fn new<S: AsRef<str>>(color: S) -> Self {
        Self {
            keywords: String::new(),
            color: color.as_ref().to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.keywords.trim().is_empty()
    }

    pub fn extra(&self) -> String {
        keyword_extra(&self.keywords, &self.color)
    }
}

impl Default for PendingKeywordRequest {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_COLOR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    NoteEdited(String),
    ToggleView,
    TransformCompleted(String),
    KeywordFormOpened,
    KeywordsChanged(String),
    KeywordColorChanged(String),
    KeywordFormClosed,
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteSession {
    note: String,
    display: String,
    view_mode: ViewMode,
    transcript: Transcript,
    pending_keywords: Option<PendingKeywordRequest>,
    keyword_color: String,
}

impl NoteSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default color the keyword form starts with
    pub fn with_keyword_color<S: AsRef<str>>(mut self, color: S) -> Self {
        self.keyword_color = color.as_ref().to_string();
        self
    }

    pub fn apply(self, event: SessionEvent) -> Self {
        match event {
            SessionEvent::NoteEdited(text) => self.apply_edit(text),
            SessionEvent::ToggleView => self.apply_toggle_view(),
            SessionEvent::TransformCompleted(output) => self.apply_transform(output),
            SessionEvent::KeywordFormOpened => self.apply_open_keyword_form(),
            SessionEvent::KeywordsChanged(keywords) => self.apply_pending(|p| p.keywords = keywords),
            SessionEvent::KeywordColorChanged(color) => self.apply_pending(|p| p.color = color),
            SessionEvent::KeywordFormClosed => self.apply_close_keyword_form(),
            SessionEvent::Reset => self.apply_reset(),
        }
    }

    /// The note only changes while editing
    pub fn apply_edit(mut self, text: String) -> Self {
        if self.view_mode == ViewMode::Editing {
            self.note = text;
        } else {
            debug!("Ignoring note edit while previewing");
        }
        self
    }

    pub fn apply_toggle_view(mut self) -> Self {
        self.view_mode = self.view_mode.toggled();
        self
    }

    /// A non empty output replaces the display and switches to preview,
    /// an empty one changes nothing.
    pub fn apply_transform(mut self, output: String) -> Self {
        if output.is_empty() {
            debug!("Empty transform output, keeping the current state");
            return self;
        }
        self.display = output;
        self.view_mode = ViewMode::Previewing;
        self
    }

    pub fn apply_chat_question<S: AsRef<str>>(mut self, question: S) -> Self {
        self.transcript = self.transcript.with_question(question);
        self
    }

    pub fn apply_chat_reply(mut self, reply: &Result<String, ChatError>) -> Self {
        self.transcript = self.transcript.with_reply(reply);
        self
    }

    fn apply_open_keyword_form(mut self) -> Self {
        if self.pending_keywords.is_none() {
            let color = if self.keyword_color.is_empty() {
                DEFAULT_HIGHLIGHT_COLOR
            } else {
                self.keyword_color.as_str()
            };
            self.pending_keywords = Some(PendingKeywordRequest::new(color));
        }
        self
    }

    fn apply_pending<F: FnOnce(&mut PendingKeywordRequest)>(mut self, update: F) -> Self {
        if let Some(pending) = self.pending_keywords.as_mut() {
            update(pending);
        }
        self
    }

    fn apply_close_keyword_form(mut self) -> Self {
        self.pending_keywords = None;
        self
    }

    fn apply_reset(self) -> Self {
        Self::new().with_keyword_color(self.keyword_color)
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn pending_keywords(&self) -> Option<&PendingKeywordRequest> {
        self.pending_keywords.as_ref()
    }

    /// What the user is looking at: the raw note while editing, the
    /// transform output while previewing.
    pub fn shown_text(&self) -> &str {
        match self.view_mode {
            ViewMode::Editing => &self.note,
            ViewMode::Previewing => &self.display,
        }
    }

    /// Input for a transform, the note first and then the last output
    pub fn transform_source(&self) -> Option<&str> {
        [self.note.as_str(), self.display.as_str()]
            .into_iter()
            .find(|text| !text.is_empty())
    }

    /// Context for chat, the last output first and then the note
    pub fn chat_context(&self) -> &str {
        if self.display.is_empty() {
            &self.note
        } else {
            &self.display
        }
    }
}
