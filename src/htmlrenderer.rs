//! Implements a custom [`push_html`] to support footnote prefixes and math
//! passthrough. [`pulldown_cmark::html::push_html`] assumes that the
//! footnote definition is on the same page as the footnote reference, which
//! is true for post pages, but not for feed entries (where a reader follows
//! the link from outside the site). It also renders math as markup meant for
//! a particular client-side library, where we want the source back with its
//! delimiters.

use pulldown_cmark_escape as escape;
use pulldown_cmark::{Alignment, CowStr, Event, LinkType, Tag, TagEnd};
use std::fmt::{self, Write};

enum TableState {
    Head,
    Body,
}

fn escape_html(w: &mut String, s: &str) -> fmt::Result {
    escape::escape_html(w, s).map_err(|_| fmt::Error)
}

fn escape_href(w: &mut String, s: &str) -> fmt::Result {
    escape::escape_href(w, s).map_err(|_| fmt::Error)
}

/// Renders markdown [`Event`]s into HTML. This is largely modeled after
/// [`pulldown_cmark`]'s private [`HtmlWriter`
/// struct](https://github.com/raphlinus/pulldown-cmark/blob/bf0a1a4938dbd2ec41c3add069b3d361d11731f4/src/html.rs#L36-L50).
struct HtmlRenderer {
    table_alignments: Vec<Alignment>,
    table_state: TableState,
    table_cell_index: usize,

    /// The prefix to prepend onto footnote links.
    footnote_prefix: String,

    /// Nesting depth of images. Everything inside an image becomes its alt
    /// text.
    image_depth: usize,

    /// The title of the outermost open image.
    image_title: String,
}

impl HtmlRenderer {
    fn new(footnote_prefix: &str) -> Self {
        HtmlRenderer {
            table_alignments: Vec::default(),
            table_state: TableState::Head,
            table_cell_index: usize::default(),
            footnote_prefix: footnote_prefix.to_owned(),
            image_depth: 0,
            image_title: String::default(),
        }
    }

    fn on_event(&mut self, w: &mut String, event: Event) -> fmt::Result {
        if self.image_depth > 0 {
            return self.on_image_alt_event(w, event);
        }

        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Code(code) => {
                w.push_str("<code>");
                escape_html(w, &code)?;
                w.push_str("</code>");
                Ok(())
            }
            Event::InlineMath(math) => on_math(w, "$", &math),
            Event::DisplayMath(math) => on_math(w, "$$", &math),
            Event::FootnoteReference(name) => {
                w.push_str(r#"<sup class="footnote-reference"><a href=""#);
                escape_href(w, &self.footnote_prefix)?;
                w.push('#');
                escape_href(w, &name)?;
                w.push_str(r#"">"#);
                escape_html(w, &name)?;
                w.push_str("</a></sup>");
                Ok(())
            }
            Event::HardBreak => {
                w.push_str("<br />");
                Ok(())
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                w.push_str(&html);
                Ok(())
            }
            Event::Rule => {
                w.push_str("<hr />");
                Ok(())
            }
            Event::SoftBreak => {
                w.push('\n');
                Ok(())
            }
            Event::TaskListMarker(checked) => write!(
                w,
                r#"<input disabled="" type="checkbox" {}/>"#,
                match checked {
                    true => r#"checked="" "#,
                    false => "",
                }
            ),
            Event::Text(text) => escape_html(w, &text),
        }
    }

    fn on_start(&mut self, w: &mut String, tag: Tag) -> fmt::Result {
        match tag {
            Tag::BlockQuote(_) => w.push_str("<blockquote>"),
            Tag::CodeBlock(_) => w.push_str("<pre><code>"),
            Tag::Emphasis => w.push_str("<em>"),
            Tag::FootnoteDefinition(name) => {
                w.push_str(r#"<div class="footnote-definition" id=""#);
                escape_html(w, &name)?;
                w.push_str(r#""><sup class="footnote-definition-label">"#);
                escape_html(w, &name)?;
                w.push_str("</sup>");
            }
            Tag::Heading { level, .. } => write!(w, "<h{}>", level as usize)?,
            Tag::HtmlBlock => {}
            Tag::Image {
                dest_url, title, ..
            } => {
                self.image_depth = 1;
                self.image_title = title.to_string();
                w.push_str(r#"<img src=""#);
                escape_href(w, &dest_url)?;
                w.push_str(r#"" alt=""#);
            }
            Tag::Item => w.push_str("<li>"),
            Tag::Link {
                link_type,
                dest_url,
                title,
                ..
            } => {
                w.push_str(r#"<a href=""#);
                if let LinkType::Email = link_type {
                    w.push_str("mailto:");
                }
                escape_href(w, &dest_url)?;
                write_title(w, &title)?;
            }
            Tag::List(None) => w.push_str("<ul>"),
            Tag::List(Some(1)) => w.push_str("<ol>"),
            Tag::List(Some(start)) => {
                write!(w, r#"<ol start="{}">"#, start)?
            }
            Tag::Paragraph => w.push_str("<p>"),
            Tag::Strikethrough => w.push_str("<del>"),
            Tag::Strong => w.push_str("<strong>"),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.push_str("<table>");
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                w.push_str("<thead><tr>");
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.push_str("<tr>");
            }
            Tag::TableCell => {
                w.push_str(match self.table_state {
                    TableState::Head => "<th",
                    TableState::Body => "<td",
                });
                w.push_str(
                    match self.table_alignments.get(self.table_cell_index) {
                        Some(Alignment::Left) => r#" align="left">"#,
                        Some(Alignment::Right) => r#" align="right">"#,
                        Some(Alignment::Center) => r#" align="center">"#,
                        _ => ">",
                    },
                );
            }
            // Only produced by parser options we don't enable.
            _ => {}
        }
        Ok(())
    }

    fn on_end(&mut self, w: &mut String, tag: TagEnd) -> fmt::Result {
        match tag {
            TagEnd::BlockQuote(_) => w.push_str("</blockquote>"),
            TagEnd::CodeBlock => w.push_str("</code></pre>"),
            TagEnd::Emphasis => w.push_str("</em>"),
            TagEnd::FootnoteDefinition => w.push_str("</div>"),
            TagEnd::Heading(level) => write!(w, "</h{}>", level as usize)?,
            TagEnd::HtmlBlock => {}
            TagEnd::Image => {} // handled by on_image_alt_event
            TagEnd::Item => w.push_str("</li>"),
            TagEnd::Link => w.push_str("</a>"),
            TagEnd::List(true) => w.push_str("</ol>"),
            TagEnd::List(false) => w.push_str("</ul>"),
            TagEnd::Paragraph => w.push_str("</p>"),
            TagEnd::Strikethrough => w.push_str("</del>"),
            TagEnd::Strong => w.push_str("</strong>"),
            TagEnd::Table => w.push_str("</tbody></table>"),
            TagEnd::TableHead => {
                self.table_state = TableState::Body;
                w.push_str("</tr></thead><tbody>");
            }
            TagEnd::TableRow => w.push_str("</tr>"),
            TagEnd::TableCell => {
                self.table_cell_index += 1;
                w.push_str(match self.table_state {
                    TableState::Head => "</th>",
                    TableState::Body => "</td>",
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn on_image_alt_event(
        &mut self,
        w: &mut String,
        event: Event,
    ) -> fmt::Result {
        match event {
            Event::Start(Tag::Image { .. }) => {
                self.image_depth += 1;
                Ok(())
            }
            Event::End(TagEnd::Image) => {
                self.image_depth -= 1;
                if self.image_depth > 0 {
                    return Ok(());
                }
                let title = std::mem::take(&mut self.image_title);
                if title.is_empty() {
                    w.push_str(r#"" />"#);
                } else {
                    w.push_str(r#"" title=""#);
                    escape_html(w, &title)?;
                    w.push_str(r#"" />"#);
                }
                Ok(())
            }
            Event::Text(text) | Event::Code(text) => escape_html(w, &text),
            Event::InlineMath(math) => on_math(w, "$", &math),
            Event::DisplayMath(math) => on_math(w, "$$", &math),
            Event::SoftBreak | Event::HardBreak => {
                w.push(' ');
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn write_title(w: &mut String, title: &CowStr) -> fmt::Result {
    if !title.is_empty() {
        w.push_str(r#"" title=""#);
        escape_html(w, title)?;
    }
    w.push_str(r#"">"#);
    Ok(())
}

// Math is written back as its source, delimiters included, for a client-side
// renderer to pick up.
fn on_math(w: &mut String, delimiter: &str, math: &str) -> fmt::Result {
    w.push_str(delimiter);
    escape_html(w, math)?;
    w.push_str(delimiter);
    Ok(())
}

/// Converts [`Event`]s into an HTML string much like
/// `pulldown_cmark::html::push_html` except that this also supports footnote
/// prefixes and math passthrough. See the module description for more
/// details.
pub(crate) fn push_html<'a, I>(
    out: &mut String,
    events: I,
    footnote_prefix: &str,
) -> fmt::Result
where
    I: Iterator<Item = Event<'a>>,
{
    let mut renderer = HtmlRenderer::new(footnote_prefix);
    for event in events {
        renderer.on_event(out, event)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pulldown_cmark::{Options, Parser};

    fn render(markdown: &str, footnote_prefix: &str) -> String {
        let mut out = String::new();
        let options = Options::ENABLE_MATH
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_TABLES;
        let parser = Parser::new_ext(markdown, options);
        push_html(&mut out, parser, footnote_prefix).unwrap();
        out
    }

    #[test]
    fn test_math_in_alt_text_is_escaped() {
        assert_eq!(
            r#"<p><img src="a.png" alt="$\text{&quot;}$" /></p>"#,
            render(r#"![$\text{"}$](a.png)"#, "")
        );
    }

    #[test]
    fn test_footnote_prefix() {
        let html = render("A[^n]\n\n[^n]: B\n", "https://example.com/a/");
        assert!(
            html.contains(r##"<a href="https://example.com/a/#n">n</a>"##),
            "got {}",
            html
        );
    }

    #[test]
    fn test_table_alignment() {
        assert_eq!(
            "<table><thead><tr><th align=\"left\">a</th><th>b</th></tr>\
             </thead><tbody><tr><td align=\"left\">1</td><td>2</td></tr>\
             </tbody></table>",
            render("| a | b |\n|:--|---|\n| 1 | 2 |\n", "")
        );
    }

    #[test]
    fn test_email_autolink() {
        assert_eq!(
            r#"<p><a href="mailto:me@example.com">me@example.com</a></p>"#,
            render("<me@example.com>", "")
        );
    }
}
