//! Support for creating RSS, JSON Feed and Atom feeds from the published
//! posts of a [`Corpus`]. Feed entries carry the resolved renderings of
//! post HTML (see [`crate::markdown::Html`]), in which every link is
//! absolute.
//! Feed timestamps come from post dates so that rebuilding an unchanged
//! corpus produces identical feeds.

use crate::config::{Author, Config, FeedContent};
use crate::corpus::Corpus;
use crate::post::Post;
use crate::write::{self, ATOM_FILE, JSON_FEED_FILE, RSS_FILE};
use chrono::{DateTime, FixedOffset};
use quick_xml::events::{
    BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event,
};
use quick_xml::Writer;
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use tracing::info;
use url::Url;

const JSON_FEED_VERSION: &str = "https://jsonfeed.org/version/1.1";

/// The site-wide settings of a feed.
pub struct Channel<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub base_url: &'a Url,
    pub author: Option<&'a Author>,

    /// Whether entries carry excerpts or whole posts.
    pub feed_content: FeedContent,

    /// The feed's timestamp when there are no posts.
    pub build_time: DateTime<FixedOffset>,
}

impl<'a> Channel<'a> {
    pub fn from_config(config: &'a Config) -> Channel<'a> {
        Channel {
            title: &config.title,
            description: &config.description,
            base_url: &config.base_url,
            author: config.author.as_ref(),
            feed_content: config.feed_content,
            build_time: config.build_time,
        }
    }

    fn content<'p>(&self, post: &'p Post) -> &'p str {
        match self.feed_content {
            FeedContent::Summary => &post.excerpt.resolved,
            FeedContent::Full => &post.body.resolved,
        }
    }

    // The date of the newest post. `posts` is ordered newest first.
    fn updated(&self, posts: &[&Post]) -> DateTime<FixedOffset> {
        posts.first().map_or(self.build_time, |post| post.date)
    }

    fn feed_url(&self, file: &str) -> Result<Url> {
        Ok(self.base_url.join(file)?)
    }

    /// Renders an RSS 2.0 feed.
    pub fn rss(&self, posts: &[&Post]) -> Result<Vec<u8>> {
        Ok(self.render_rss(posts)?)
    }

    fn render_rss(&self, posts: &[&Post]) -> quick_xml::Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        writer.write_event(Event::Decl(BytesDecl::new(
            "1.0",
            Some("UTF-8"),
            None,
        )))?;
        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        writer.write_event(Event::Start(rss))?;
        writer.write_event(Event::Start(BytesStart::new("channel")))?;

        push_text(&mut writer, "title", self.title)?;
        push_text(&mut writer, "link", self.base_url.as_str())?;
        push_text(&mut writer, "description", self.description)?;
        push_text(&mut writer, "generator", "folio")?;
        push_text(
            &mut writer,
            "lastBuildDate",
            &self.updated(posts).to_rfc2822(),
        )?;

        for post in posts {
            writer.write_event(Event::Start(BytesStart::new("item")))?;

            push_text(&mut writer, "title", &post.title)?;
            push_text(&mut writer, "link", post.url.as_str())?;

            let mut guid = BytesStart::new("guid");
            guid.push_attribute(("isPermaLink", "true"));
            writer.write_event(Event::Start(guid))?;
            writer.write_event(Event::Text(BytesText::new(post.url.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("guid")))?;

            push_text(&mut writer, "pubDate", &post.date.to_rfc2822())?;
            for tag in &post.tags {
                push_text(&mut writer, "category", &tag.name)?;
            }
            push_cdata(&mut writer, "description", self.content(post))?;

            writer.write_event(Event::End(BytesEnd::new("item")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
        writer.write_event(Event::End(BytesEnd::new("rss")))?;

        Ok(writer.into_inner().into_inner())
    }

    /// Renders a JSON Feed (version 1.1).
    pub fn json_feed(&self, posts: &[&Post]) -> Result<Vec<u8>> {
        let feed = JsonFeed {
            version: JSON_FEED_VERSION,
            title: self.title,
            home_page_url: self.base_url.as_str(),
            feed_url: self.feed_url(JSON_FEED_FILE)?.to_string(),
            description: Some(self.description).filter(|d| !d.is_empty()),
            authors: self
                .author
                .iter()
                .map(|author| JsonAuthor { name: &author.name })
                .collect(),
            items: posts
                .iter()
                .map(|post| JsonItem {
                    id: post.url.as_str(),
                    url: post.url.as_str(),
                    title: &post.title,
                    content_html: self.content(post),
                    summary: &post.excerpt.text,
                    date_published: post.date.to_rfc3339(),
                    tags: post
                        .tags
                        .iter()
                        .map(|tag| tag.name.as_str())
                        .collect(),
                })
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&feed)?)
    }

    /// Renders an Atom feed.
    pub fn atom(&self, posts: &[&Post]) -> Result<Vec<u8>> {
        use atom_syndication::{
            Category, Content, Entry, Feed, Link, Person, Text,
        };

        let link = |href: &str, rel: &str| {
            let mut link = Link::default();
            link.set_href(href);
            link.set_rel(rel);
            link
        };
        let authors: Vec<Person> = self
            .author
            .iter()
            .map(|author| {
                let mut person = Person::default();
                person.set_name(author.name.as_str());
                person.set_email(author.email.clone());
                person
            })
            .collect();

        let entries = posts
            .iter()
            .map(|post| {
                let mut content = Content::default();
                content.set_value(Some(self.content(post).to_owned()));
                content.set_content_type(Some("html".to_owned()));

                let mut entry = Entry::default();
                entry.set_id(post.url.as_str());
                entry.set_title(post.title.as_str());
                entry.set_updated(post.date);
                entry.set_published(Some(post.date));
                entry.set_links(vec![link(post.url.as_str(), "alternate")]);
                entry.set_summary(Some(Text::html(
                    post.excerpt.resolved.as_str(),
                )));
                entry.set_content(Some(content));
                entry.set_categories(
                    post.tags
                        .iter()
                        .map(|tag| {
                            let mut category = Category::default();
                            category.set_term(tag.name.as_str());
                            category
                        })
                        .collect::<Vec<Category>>(),
                );
                entry
            })
            .collect::<Vec<Entry>>();

        let mut feed = Feed::default();
        feed.set_id(self.base_url.as_str());
        feed.set_title(self.title);
        if !self.description.is_empty() {
            feed.set_subtitle(Some(Text::plain(self.description)));
        }
        feed.set_updated(self.updated(posts));
        feed.set_authors(authors);
        feed.set_links(vec![
            link(self.base_url.as_str(), "alternate"),
            link(self.feed_url(ATOM_FILE)?.as_str(), "self"),
        ]);
        feed.set_entries(entries);
        Ok(feed.write_to(Vec::new())?)
    }
}

/// Writes `rss.xml`, `feed.json` and `atom.xml` for the published posts of
/// `corpus` into `output_directory`.
pub fn write_feeds(
    config: &Config,
    corpus: &Corpus,
    output_directory: &Path,
) -> Result<()> {
    let channel = Channel::from_config(config);
    let posts = corpus.published();

    write::write_file(
        &output_directory.join(RSS_FILE),
        &channel.rss(&posts)?,
    )?;
    write::write_file(
        &output_directory.join(JSON_FEED_FILE),
        &channel.json_feed(&posts)?,
    )?;
    write::write_file(
        &output_directory.join(ATOM_FILE),
        &channel.atom(&posts)?,
    )?;

    info!("wrote feeds with {} entries", posts.len());
    Ok(())
}

#[derive(Serialize)]
struct JsonFeed<'a> {
    version: &'static str,
    title: &'a str,
    home_page_url: &'a str,
    feed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    authors: Vec<JsonAuthor<'a>>,
    items: Vec<JsonItem<'a>>,
}

#[derive(Serialize)]
struct JsonAuthor<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct JsonItem<'a> {
    id: &'a str,
    url: &'a str,
    title: &'a str,
    content_html: &'a str,
    summary: &'a str,
    date_published: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
}

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn push_text(
    writer: &mut XmlWriter,
    tag: &str,
    text: &str,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

// A CDATA section can't contain `]]>`, so the text is split across sections
// wherever it occurs.
fn push_cdata(
    writer: &mut XmlWriter,
    tag: &str,
    text: &str,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    let mut rest = text;
    while let Some(i) = rest.find("]]>") {
        writer.write_event(Event::CData(BytesCData::new(&rest[..i + 2])))?;
        rest = &rest[i + 2..];
    }
    writer.write_event(Event::CData(BytesCData::new(rest)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// The result of rendering or writing a feed.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error rendering or writing a feed.
#[derive(Debug)]
pub enum Error {
    /// Returned when rendering the RSS feed fails.
    Xml(quick_xml::Error),

    /// Returned when serializing the JSON Feed fails.
    Json(serde_json::Error),

    /// Returned when rendering the Atom feed fails.
    Atom(atom_syndication::Error),

    /// Returned when there is a problem building feed URLs.
    UrlParse(url::ParseError),

    /// Returned when writing a feed file fails.
    Write(write::Error),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Xml(err) => write!(f, "rendering RSS feed: {}", err),
            Error::Json(err) => write!(f, "rendering JSON feed: {}", err),
            Error::Atom(err) => write!(f, "rendering Atom feed: {}", err),
            Error::UrlParse(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Xml(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Atom(err) => Some(err),
            Error::UrlParse(err) => Some(err),
            Error::Write(err) => Some(err),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Error {
        Error::Xml(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl From<atom_syndication::Error> for Error {
    /// Converts an [`atom_syndication::Error`] into an [`Error`]. This allows
    /// us to use the `?` operator on fallible feed operations.
    fn from(err: atom_syndication::Error) -> Error {
        Error::Atom(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl From<write::Error> for Error {
    fn from(err: write::Error) -> Error {
        Error::Write(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::corpus::Builder;
    use crate::markdown::Converter;
    use std::fs;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn corpus(config: &Config) -> Corpus {
        let converter = Converter::new(&config.highlight_theme).unwrap();
        Builder::new(config, &converter).build().unwrap()
    }

    fn config(source: &Path) -> Config {
        let mut config = Config::new(
            source,
            &source.join("public"),
            Url::parse("https://example.com/blog/").unwrap(),
        );
        config.title = String::from("Example");
        config
    }

    fn write_posts(dir: &Path) -> std::io::Result<()> {
        fs::write(
            dir.join("2024-01-01-hello.md"),
            "---\ntitle: Hello & welcome\ndate: 2024-01-01T10:00:00+02:00\n\
             tags: [Intro]\n---\n\
             See [the archive](../archive/) and ![a cat](cat.png).\n\n\
             <!-- more -->\n\nRest.\n",
        )?;
        fs::write(
            dir.join("2024-02-01-draft.md"),
            "---\ntitle: Secret\ndate: 2024-02-01\ndraft: true\n---\n\
             Not yet.\n",
        )
    }

    #[test]
    fn test_rss() -> TestResult {
        let dir = tempfile::tempdir()?;
        write_posts(dir.path())?;
        let config = config(dir.path());
        let corpus = corpus(&config);
        let rss = Channel::from_config(&config).rss(&corpus.published())?;
        let rss = String::from_utf8(rss)?;

        assert!(rss.starts_with(
            r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0">"#
        ));
        assert!(rss.contains("<title>Hello &amp; welcome</title>"), "{}", rss);
        assert!(rss.contains(
            r#"<guid isPermaLink="true">https://example.com/blog/hello/</guid>"#
        ));
        let date = "Mon, 1 Jan 2024 10:00:00 +0200";
        assert!(rss.contains(&format!("<pubDate>{}</pubDate>", date)));
        assert!(rss.contains(&format!(
            "<lastBuildDate>{}</lastBuildDate>",
            date
        )));
        assert!(rss.contains("<category>Intro</category>"));
        assert!(
            rss.contains(r#"href="https://example.com/blog/archive/""#),
            "{}",
            rss
        );
        assert!(
            rss.contains(r#"src="https://example.com/blog/hello/cat.png""#)
        );
        assert!(!rss.contains("Rest."));
        assert!(!rss.contains("Secret"));
        Ok(())
    }

    #[test]
    fn test_full_content() -> TestResult {
        let dir = tempfile::tempdir()?;
        write_posts(dir.path())?;
        let mut config = config(dir.path());
        config.feed_content = FeedContent::Full;
        let corpus = corpus(&config);
        let rss = Channel::from_config(&config).rss(&corpus.published())?;
        let rss = String::from_utf8(rss)?;
        assert!(rss.contains("Rest."));
        Ok(())
    }

    #[test]
    fn test_json_feed() -> TestResult {
        let dir = tempfile::tempdir()?;
        write_posts(dir.path())?;
        let config = config(dir.path());
        let corpus = corpus(&config);
        let json =
            Channel::from_config(&config).json_feed(&corpus.published())?;
        let feed: serde_json::Value = serde_json::from_slice(&json)?;

        assert_eq!(JSON_FEED_VERSION, feed["version"]);
        assert_eq!("https://example.com/blog/feed.json", feed["feed_url"]);
        let items = feed["items"].as_array().unwrap();
        assert_eq!(1, items.len());
        assert_eq!("https://example.com/blog/hello/", items[0]["id"]);
        assert_eq!("2024-01-01T10:00:00+02:00", items[0]["date_published"]);
        assert_eq!("See the archive and a cat.", items[0]["summary"]);
        assert_eq!(serde_json::json!(["Intro"]), items[0]["tags"]);
        Ok(())
    }

    #[test]
    fn test_atom() -> TestResult {
        let dir = tempfile::tempdir()?;
        write_posts(dir.path())?;
        let config = config(dir.path());
        let corpus = corpus(&config);
        let atom = Channel::from_config(&config).atom(&corpus.published())?;
        let atom = String::from_utf8(atom)?;
        assert!(
            atom.contains("<id>https://example.com/blog/hello/</id>"),
            "{}",
            atom
        );
        assert!(atom.contains(r#"href="https://example.com/blog/atom.xml""#));
        assert!(!atom.contains("Secret"));
        Ok(())
    }

    #[test]
    fn test_empty_feed_uses_build_time() -> TestResult {
        let dir = tempfile::tempdir()?;
        let config = config(dir.path());
        let channel = Channel::from_config(&config);
        let rss = String::from_utf8(channel.rss(&[])?)?;
        assert!(rss.contains(&format!(
            "<lastBuildDate>{}</lastBuildDate>",
            config.build_time.to_rfc2822()
        )));
        Ok(())
    }

    #[test]
    fn test_cdata_is_split() -> TestResult {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        push_cdata(&mut writer, "d", "a]]>b")?;
        assert_eq!(
            "<d><![CDATA[a]]]]><![CDATA[>b]]></d>",
            String::from_utf8(writer.into_inner().into_inner())?
        );
        Ok(())
    }
}
