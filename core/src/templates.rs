//! The fixed catalog of transformations a note can go through.
//!
//! Every template is a pure function from the note text (plus an optional
//! extra parameter) to the instruction sent to the generation service. All
//! of them ask for markdown back, and the ones that highlight content use the
//! same inline convention, `<span style="color: COLOR">TEXT</span>`, which is
//! what [`crate::render`] lets through.

use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_HIGHLIGHT_COLOR: &str = "coral";

pub const FORMAT_ID: &str = "format";
pub const KEYWORDS_ID: &str = "keywords";

const REGEX_EXTRA_COLOR: &str = r#"\(\s*color:\s*(?P<color>[^()]*?[^()\s](?:\([^)]*\))?)\s*\)\s*$"#;

static EXTRA_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(REGEX_EXTRA_COLOR).expect("color suffix regex is valid")
});

/// Builds the instruction from the source text and the optional extra.
pub type InstructionBuilder = fn(&str, Option<&str>) -> String;

#[derive(Debug, Clone, Copy)]
pub struct TemplateDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    /// Name of the icon shown on the button, presentation layers map it
    pub icon: &'static str,
    /// The caller has to collect a non empty `extra` before using it
    pub requires_extra: bool,
    builder: InstructionBuilder,
}

impl TemplateDescriptor {
    pub fn render<S: AsRef<str>>(&self, source_text: S, extra: Option<&str>) -> String {
        (self.builder)(source_text.as_ref(), extra)
    }
}

impl PartialEq for TemplateDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TemplateDescriptor {}

impl std::fmt::Display for TemplateDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

static TEMPLATES: [TemplateDescriptor; 7] = [
    TemplateDescriptor {
        id: FORMAT_ID,
        name: "Auto-Format",
        icon: "wand-2",
        requires_extra: false,
        builder: format_prompt,
    },
    TemplateDescriptor {
        id: KEYWORDS_ID,
        name: "AI Keywords",
        icon: "highlighter",
        requires_extra: true,
        builder: keywords_prompt,
    },
    TemplateDescriptor {
        id: "summarize",
        name: "Summarize",
        icon: "file-text",
        requires_extra: false,
        builder: summarize_prompt,
    },
    TemplateDescriptor {
        id: "simplify",
        name: "Simplify (ELI5)",
        icon: "wand-2",
        requires_extra: false,
        builder: simplify_prompt,
    },
    TemplateDescriptor {
        id: "action",
        name: "Action Items",
        icon: "list-checks",
        requires_extra: false,
        builder: action_items_prompt,
    },
    TemplateDescriptor {
        id: "expand",
        name: "Expand",
        icon: "expand",
        requires_extra: false,
        builder: expand_prompt,
    },
    TemplateDescriptor {
        id: "quiz",
        name: "Quiz Me",
        icon: "help-circle",
        requires_extra: false,
        builder: quiz_prompt,
    },
];

pub fn templates_list() -> &'static [TemplateDescriptor] {
    &TEMPLATES
}

pub fn find_template<S: AsRef<str>>(id: S) -> Option<&'static TemplateDescriptor> {
    let id = id.as_ref();
    TEMPLATES.iter().find(|t| t.id == id)
}

pub fn render<S: AsRef<str>>(
    template: &TemplateDescriptor,
    source_text: S,
    extra: Option<&str>,
) -> String {
    template.render(source_text, extra)
}

/// Joins the keyword list and the color the way the keyword template expects
/// its `extra`, e.g. `hypertension, stent (color: coral)`.
pub fn keyword_extra<K: AsRef<str>, C: AsRef<str>>(keywords: K, color: C) -> String {
    format!("{} (color: {})", keywords.as_ref().trim(), color.as_ref().trim())
}

/// The color a keyword request asked for, `coral` if there's none.
pub fn extra_color(extra: &str) -> &str {
    if let Some(caps) = EXTRA_COLOR.captures(extra) {
        if let Some(color) = caps.name("color") {
            return color.as_str();
        }
    }
    // A bare leading hex color, `#ff7f50 stent, valve`
    extra
        .split_whitespace()
        .next()
        .filter(|word| word.starts_with('#'))
        .unwrap_or(DEFAULT_HIGHLIGHT_COLOR)
}

fn highlight_span<S: AsRef<str>>(color: S) -> String {
    format!(r#"<span style="color: {}">"#, color.as_ref())
}

fn format_prompt(text: &str, _extra: Option<&str>) -> String {
    format!(
        r#"Rewrite the following text into organized, clean Markdown.
Identify key medical device regulatory terms (NMPA, Order 739, Classification, etc.)
and wrap them in a span with color coral like this: {}TERM</span>.

Text:
{text}"#,
        highlight_span(DEFAULT_HIGHLIGHT_COLOR)
    )
}

fn keywords_prompt(text: &str, extra: Option<&str>) -> String {
    let extra = extra.unwrap_or_default().trim();
    let color = extra_color(extra);
    format!(
        r#"Identify the following specific keywords in the text: {extra}.
Wrap these exact keywords with {}KEYWORD</span>, do not highlight anything else.
Return the full text in markdown.

Text:
{text}"#,
        highlight_span(color)
    )
}

fn summarize_prompt(text: &str, _extra: Option<&str>) -> String {
    format!(
        "Summarize the following text into a concise bulleted list in markdown, highlighting key findings in {}coral</span>:\n\n{text}",
        highlight_span(DEFAULT_HIGHLIGHT_COLOR)
    )
}

fn simplify_prompt(text: &str, _extra: Option<&str>) -> String {
    format!(
        "Explain the following text in simple terms suitable for a non-expert. Use markdown formatting and highlight important concepts in {}coral</span>:\n\n{text}",
        highlight_span(DEFAULT_HIGHLIGHT_COLOR)
    )
}

fn action_items_prompt(text: &str, _extra: Option<&str>) -> String {
    format!(
        "Extract a checklist of mandatory action items from the text. Format as a markdown task list:\n\n{text}"
    )
}

fn expand_prompt(text: &str, _extra: Option<&str>) -> String {
    format!(
        "Expand on the following text, adding relevant regulatory context and details based on China NMPA Order 739. Format in markdown:\n\n{text}"
    )
}

fn quiz_prompt(text: &str, _extra: Option<&str>) -> String {
    format!(
        "Create 3 multiple-choice questions based on this text to test understanding. Include the answer key at the bottom. Format in markdown:\n\n{text}"
    )
}
