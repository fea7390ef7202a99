use std::{collections::VecDeque, sync::LazyLock};

use pulldown_cmark::{CowStr, Event, Tag, TagEnd};
use regex::Regex;

const REGEX_TAG: &str = r"<[^<>]*>";
const REGEX_SPAN_OPEN: &str = r#"(?i)^<span\s+style\s*=\s*(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')\s*>$"#;
const REGEX_SPAN_CLOSE: &str = r"(?i)^</span\s*>$";
const REGEX_COLOR_STYLE: &str = r"(?i)^\s*color\s*:\s*(?P<color>[a-z]+|#[0-9a-f]{3,8}|(?:rgb|rgba|hsl|hsla)\(\s*[0-9.,%\s]+\))\s*;?\s*$";

const BLOCKED_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(REGEX_TAG).expect("tag regex is valid"));
static SPAN_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REGEX_SPAN_OPEN).expect("span regex is valid"));
static SPAN_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REGEX_SPAN_CLOSE).expect("span regex is valid"));
static COLOR_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REGEX_COLOR_STYLE).expect("color regex is valid"));

enum Fragment<'a> {
    OpenSpan(&'a str),
    CloseSpan,
    Text(&'a str),
}

/// What is open at the current point of the inline content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Span,
    Inline,
}

/// Wraps the parser events, keeping color spans and turning every other
/// piece of raw HTML into text. A span opened inside emphasis, a link or
/// similar is closed when that element ends, and a `</span>` can only close
/// a span opened in the same element. Spans still open when their block
/// ends get closed there.
pub struct SafeEvents<'a, I>
where
    I: Iterator<Item = Event<'a>>,
{
    inner: I,
    open: Vec<Frame>,
    pending: VecDeque<Event<'a>>,
}

impl<'a, I> SafeEvents<'a, I>
where
    I: Iterator<Item = Event<'a>>,
{
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            open: vec![],
            pending: VecDeque::new(),
        }
    }

    fn close_spans(&mut self) {
        while let Some(frame) = self.open.pop() {
            if frame == Frame::Span {
                self.pending.push_back(Event::InlineHtml("</span>".into()));
            }
        }
    }

    /// Closes the spans opened since the innermost inline element started,
    /// then the element itself
    fn close_inline(&mut self) {
        if !self.open.contains(&Frame::Inline) {
            return;
        }
        while let Some(Frame::Span) = self.open.pop() {
            self.pending.push_back(Event::InlineHtml("</span>".into()));
        }
    }

    fn push_html(&mut self, html: &str) {
        for fragment in fragments(html) {
            let event = match fragment {
                Fragment::OpenSpan(color) => {
                    self.open.push(Frame::Span);
                    Event::InlineHtml(format!(r#"<span style="color: {color}">"#).into())
                }
                Fragment::CloseSpan if self.open.last() == Some(&Frame::Span) => {
                    self.open.pop();
                    Event::InlineHtml("</span>".into())
                }
                Fragment::CloseSpan => Event::Text("</span>".to_string().into()),
                Fragment::Text(text) => Event::Text(text.to_string().into()),
            };
            self.pending.push_back(event);
        }
    }
}

impl<'a, I> Iterator for SafeEvents<'a, I>
where
    I: Iterator<Item = Event<'a>>,
{
    type Item = Event<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        match self.inner.next() {
            None => {
                self.close_spans();
                self.pending.pop_front()
            }
            Some(Event::Html(html)) | Some(Event::InlineHtml(html)) => {
                self.push_html(&html);
                self.next()
            }
            Some(Event::End(tag)) if closes_inline_content(&tag) => {
                self.close_spans();
                self.pending.push_back(Event::End(tag));
                self.next()
            }
            Some(Event::End(tag)) if is_inline_element(&tag) => {
                self.close_inline();
                self.pending.push_back(Event::End(tag));
                self.next()
            }
            Some(Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            })) => {
                self.open.push(Frame::Inline);
                Some(Event::Start(Tag::Link {
                    link_type,
                    dest_url: safe_url(dest_url),
                    title,
                    id,
                }))
            }
            Some(Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            })) => {
                self.open.push(Frame::Inline);
                Some(Event::Start(Tag::Image {
                    link_type,
                    dest_url: safe_url(dest_url),
                    title,
                    id,
                }))
            }
            Some(Event::Start(tag @ (Tag::Emphasis | Tag::Strong | Tag::Strikethrough))) => {
                self.open.push(Frame::Inline);
                Some(Event::Start(tag))
            }
            Some(event) => Some(event),
        }
    }
}

fn closes_inline_content(tag: &TagEnd) -> bool {
    matches!(
        tag,
        TagEnd::Paragraph
            | TagEnd::Heading(_)
            | TagEnd::Item
            | TagEnd::TableCell
            | TagEnd::HtmlBlock
    )
}

fn is_inline_element(tag: &TagEnd) -> bool {
    matches!(
        tag,
        TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link | TagEnd::Image
    )
}

fn fragments(html: &str) -> Vec<Fragment<'_>> {
    let mut result = vec![];
    let mut last = 0;
    for tag in TAG.find_iter(html) {
        if tag.start() > last {
            result.push(Fragment::Text(&html[last..tag.start()]));
        }
        result.push(classify_tag(tag.as_str()));
        last = tag.end();
    }
    if last < html.len() {
        result.push(Fragment::Text(&html[last..]));
    }
    result
}

fn classify_tag(tag: &str) -> Fragment<'_> {
    if SPAN_CLOSE.is_match(tag) {
        return Fragment::CloseSpan;
    }
    let color = SPAN_OPEN
        .captures(tag)
        .and_then(|caps| caps.name("dq").or_else(|| caps.name("sq")))
        .and_then(|style| COLOR_STYLE.captures(style.as_str()))
        .and_then(|caps| caps.name("color"));
    match color {
        Some(color) => Fragment::OpenSpan(color.as_str()),
        None => Fragment::Text(tag),
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let normalised = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_lowercase();
    if BLOCKED_SCHEMES.iter().any(|s| normalised.starts_with(s)) {
        "#".into()
    } else {
        url
    }
}
