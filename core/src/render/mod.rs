//! Markdown to HTML for whatever the model sends back.
//!
//! Standard markdown goes through `pulldown-cmark`. Raw HTML is filtered:
//! only the highlight convention, `<span style="color: X">` and its closing
//! tag, is kept as markup, anything else shows up as literal text.

pub use pulldown_cmark::Options;
use pulldown_cmark::{Event, Parser, html};

mod sanitize;
use sanitize::SafeEvents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub hard_line_breaks: bool,
    pub parse_options: Options,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            hard_line_breaks: false,
            parse_options: Options::ENABLE_GFM
                | Options::ENABLE_TABLES
                | Options::ENABLE_TASKLISTS
                | Options::ENABLE_STRIKETHROUGH,
        }
    }
}

pub fn render_to_display_markup<S: AsRef<str>>(markdown: S) -> String {
    render_with(markdown, &RenderOptions::default())
}

pub fn render_with<S: AsRef<str>>(markdown: S, options: &RenderOptions) -> String {
    let source = markdown.as_ref();
    let hard_line_breaks = options.hard_line_breaks;
    let parser = Parser::new_ext(source, options.parse_options).map(move |event| {
        if hard_line_breaks && event == Event::SoftBreak {
            Event::HardBreak
        } else {
            event
        }
    });

    let mut output = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut output, SafeEvents::new(parser));
    output
}
