//! Converts post Markdown into HTML fragments. Every conversion produces two
//! renderings from a single parse: one for the post's own page, where links
//! stay as written, and one where every link target has been resolved into
//! an absolute URL (see [`crate::url::Resolver`]). The resolved rendering is
//! the one to use anywhere but the post's own page: feeds, and the listings
//! of index pages.
//!
//! Math (`$...$` and `$$...$$`) is written back verbatim, delimiters
//! included, for client-side rendering.

use crate::highlight::Highlighter;
use crate::htmlrenderer::push_html;
use crate::url::Resolver;
use pulldown_cmark::*;
use pulldown_cmark_escape as escape;
use std::fmt;
use url::ParseError as UrlParseError;

/// Separates an excerpt from the rest of a post body. It must sit in a
/// block of its own.
pub const FOLD_TAG: &str = "<!-- more -->";

/// The renderings of a piece of Markdown.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Html {
    /// The HTML for the post's own page.
    pub page: String,

    /// The HTML for everywhere else: identical except that links are
    /// absolute.
    pub resolved: String,

    /// The text without any markup, whitespace collapsed.
    pub text: String,
}

/// A converted post body together with its excerpt.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    pub body: Html,

    /// Everything above the [`FOLD_TAG`] if there is one, else the first
    /// paragraph, else the whole body.
    pub excerpt: Html,

    /// Whether the excerpt leaves out part of the body.
    pub summarized: bool,
}

/// Converts Markdown to HTML with footnotes, smart punctuation, tables,
/// strikethrough, task lists, syntax highlighting and math passthrough
/// enabled.
pub struct Converter {
    highlighter: Highlighter,
    options: Options,
}

impl Converter {
    /// Creates a converter which highlights code with the named `syntect`
    /// theme.
    pub fn new(highlight_theme: &str) -> Result<Converter, Error> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_MATH);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);

        Ok(Converter {
            highlighter: Highlighter::new(highlight_theme).ok_or_else(
                || Error::UnknownTheme(highlight_theme.to_owned()),
            )?,
            options,
        })
    }

    /// Converts `markdown` to HTML.
    ///
    /// * [`resolver`] resolves link targets for the resolved rendering; its
    ///   base URL is the permalink of the page the Markdown belongs to.
    pub fn to_html(
        &self,
        markdown: &str,
        resolver: &Resolver,
    ) -> Result<Html, Error> {
        let events = self.parse(markdown)?;
        render(&events, resolver)
    }

    /// Converts a post body to HTML and derives its excerpt. See
    /// [`Document::excerpt`].
    pub fn to_document(
        &self,
        markdown: &str,
        resolver: &Resolver,
    ) -> Result<Document, Error> {
        let events = self.parse(markdown)?;
        let (excerpt, summarized) = excerpt(&events);
        Ok(Document {
            excerpt: render(excerpt, resolver)?,
            summarized,
            body: render(&events, resolver)?,
        })
    }

    // Parses `markdown`, replacing every code block with its highlighted
    // HTML.
    fn parse<'a>(&self, markdown: &'a str) -> Result<Vec<Event<'a>>, Error> {
        let mut events = Vec::new();
        let mut code_block: Option<CodeBlock> = None;
        for event in Parser::new_ext(markdown, self.options) {
            if let Some(block) = &mut code_block {
                match event {
                    Event::Text(text) => {
                        block.code.push_str(&text);
                        continue;
                    }
                    Event::End(TagEnd::CodeBlock) => {
                        let html = block.highlight(&self.highlighter)?;
                        code_block = None;
                        events.push(Event::Html(html.into()));
                        continue;
                    }
                    _ => {}
                }
            }

            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    code_block = Some(CodeBlock {
                        language: match kind {
                            CodeBlockKind::Fenced(info) => info
                                .split_whitespace()
                                .next()
                                .map(str::to_owned),
                            CodeBlockKind::Indented => None,
                        },
                        code: String::new(),
                    });
                }
                event => events.push(event),
            }
        }
        Ok(events)
    }
}

/// A code block whose contents are being collected for highlighting.
struct CodeBlock {
    language: Option<String>,
    code: String,
}

impl CodeBlock {
    fn highlight(&self, highlighter: &Highlighter) -> Result<String, Error> {
        let highlighted =
            highlighter.highlight(&self.code, self.language.as_deref())?;
        let mut html = String::with_capacity(highlighted.len() + 64);
        match &self.language {
            Some(lang) => {
                html.push_str(r#"<div class="highlight" data-lang=""#);
                escape::escape_html(&mut html, lang)
                    .map_err(|_| Error::Render(fmt::Error))?;
                html.push_str(r#"">"#);
            }
            None => html.push_str(r#"<div class="highlight">"#),
        }
        html.push_str(&highlighted);
        html.push_str("</div>");
        Ok(html)
    }
}

fn render(events: &[Event], resolver: &Resolver) -> Result<Html, Error> {
    let mut page = String::new();
    push_html(&mut page, events.iter().cloned(), "")?;

    let event_converter = EventConverter { resolver };
    let resolved_events = events
        .iter()
        .cloned()
        .map(|ev| event_converter.convert(ev))
        .collect::<Result<Vec<Event>, UrlParseError>>()?;
    let mut resolved = String::with_capacity(page.len());
    push_html(
        &mut resolved,
        resolved_events.into_iter(),
        resolver.base().as_str(),
    )?;

    Ok(Html {
        page,
        resolved,
        text: plain_text(events),
    })
}

// Returns the events of the excerpt and whether it leaves anything out.
// Only top-level blocks count: a fold marker or a paragraph inside a list
// or a quote doesn't end the excerpt.
fn excerpt<'e, 'a>(events: &'e [Event<'a>]) -> (&'e [Event<'a>], bool) {
    let mut depth = 0usize;
    let mut start = 0;
    let mut paragraph = None;
    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Start(Tag::HtmlBlock)
                if depth == 0 && is_fold(&events[i..]) =>
            {
                return (&events[..i], true);
            }
            Event::Start(Tag::Paragraph) if depth == 0 => start = i,
            Event::End(TagEnd::Paragraph)
                if depth == 1 && paragraph.is_none() =>
            {
                paragraph = Some(&events[start..=i]);
            }
            _ => {}
        }
        match event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            _ => {}
        }
    }
    match paragraph {
        Some(paragraph) => (paragraph, paragraph.len() < events.len()),
        None => (events, false),
    }
}

fn is_fold(events: &[Event]) -> bool {
    match events {
        [Event::Start(Tag::HtmlBlock), Event::Html(html), end, ..] => {
            matches!(end, Event::End(TagEnd::HtmlBlock))
                && html.trim() == FOLD_TAG
        }
        _ => false,
    }
}

// Raw HTML, highlighted code included, contributes no text.
fn plain_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(s) | Event::Code(s) => text.push_str(s),
            Event::InlineMath(s) | Event::DisplayMath(s) => text.push_str(s),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::TableCell
                | TagEnd::BlockQuote(_),
            ) => text.push(' '),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct EventConverter<'a> {
    resolver: &'a Resolver,
}

impl<'a> EventConverter<'a> {
    fn convert_tag<'b>(&self, tag: Tag<'b>) -> Result<Tag<'b>, UrlParseError> {
        Ok(match tag {
            // Links and images are resolved against the page they appear on,
            // the way a browser would. Email autolinks carry no URL to
            // resolve.
            Tag::Link {
                link_type: LinkType::Email,
                ..
            } => tag,
            Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            } => Tag::Link {
                link_type,
                dest_url: self.resolve(&dest_url)?,
                title,
                id,
            },
            Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            } => Tag::Image {
                link_type,
                dest_url: self.resolve(&dest_url)?,
                title,
                id,
            },
            _ => tag,
        })
    }

    fn resolve(&self, url: &str) -> Result<CowStr<'static>, UrlParseError> {
        Ok(CowStr::Boxed(self.resolver.resolve(url)?.into_boxed_str()))
    }

    fn convert<'b>(&self, ev: Event<'b>) -> Result<Event<'b>, UrlParseError> {
        Ok(match ev {
            Event::Start(tag) => Event::Start(self.convert_tag(tag)?),
            _ => ev,
        })
    }
}

/// Represents an error converting markdown to HTML.
#[derive(Debug)]
pub enum Error {
    /// Returned when a code block can't be highlighted.
    Highlight(syntect::Error),

    /// Returned when the renderer fails to write its output.
    Render(fmt::Error),

    /// Returned when there is a problem parsing URLs.
    UrlParse(UrlParseError),

    /// Returned when the configured highlighting theme doesn't exist.
    UnknownTheme(String),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Highlight(err) => write!(f, "highlighting code: {}", err),
            Error::Render(err) => err.fmt(f),
            Error::UrlParse(err) => write!(f, "resolving link: {}", err),
            Error::UnknownTheme(name) => {
                write!(f, "unknown syntax highlighting theme `{}`", name)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Highlight(err) => Some(err),
            Error::Render(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::UnknownTheme(_) => None,
        }
    }
}

impl From<UrlParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL parsing and joining functions.
    fn from(err: UrlParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<syntect::Error> for Error {
    /// Converts a [`syntect::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for highlighting.
    fn from(err: syntect::Error) -> Error {
        Error::Highlight(err)
    }
}

impl From<fmt::Error> for Error {
    /// Converts a [`fmt::Error`] into an [`Error`]. It allows us to use the
    /// `?` operator for rendering operations.
    fn from(err: fmt::Error) -> Error {
        Error::Render(err)
    }
}
