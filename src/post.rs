//! Defines the [`Post`] type and its conversion into template values. See
//! [`Post::to_value`] and [`Post::summarize`] for details on which fields
//! templates can see.

use crate::config::IndexContent;
use crate::markdown::Html;
use crate::tag::Tag;
use crate::value;
use chrono::{DateTime, FixedOffset};
use gtmpl::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use url::Url;

/// Represents a blog post. A post is built once from its source file and is
/// read-only from then on.
#[derive(Clone, Debug)]
pub struct Post {
    /// The unique, URL-safe identifier of the post. The post's page is
    /// written to `{slug}/index.html`.
    pub slug: String,

    /// The title of the post.
    pub title: String,

    /// The publication date of the post. Posts are ordered by it.
    pub date: DateTime<FixedOffset>,

    /// The tags associated with the post, ordered by slug.
    pub tags: BTreeSet<Tag>,

    /// Drafts get a page of their own but never appear in indexes or feeds.
    pub draft: bool,

    /// The source file the post was parsed from.
    pub source_path: PathBuf,

    /// The Markdown source of the body, frontmatter excluded.
    pub body_markdown: String,

    /// The rendered body.
    pub body: Html,

    /// The rendered excerpt: the frontmatter `excerpt`, else everything
    /// above the [`crate::markdown::FOLD_TAG`], else the first paragraph of
    /// the body.
    pub excerpt: Html,

    /// Whether the excerpt leaves out part of the body.
    pub summarized: bool,

    /// The absolute permalink of the post, `{base_url}{slug}/`.
    pub url: Url,

    /// Frontmatter fields with no meaning to `folio`, passed through to
    /// templates.
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Post {
    /// Converts a [`Post`] into the `post` value of the post template. The
    /// result is a [`Value::Object`] holding every passthrough frontmatter
    /// field, overlaid with `slug`, `title`, `date` (as `YYYY-MM-DD`),
    /// `date_rfc3339`, `draft`, `url`, `tags`, `excerpt`, `summarized` and
    /// `body`. The HTML keeps its links as written, so it only belongs on
    /// the post's own page.
    pub fn to_value(&self) -> Value {
        let mut m = self.fields();
        m.insert(
            "excerpt".to_owned(),
            Value::String(self.excerpt.page.clone()),
        );
        m.insert("summarized".to_owned(), Value::Bool(self.summarized));
        m.insert("body".to_owned(), Value::String(self.body.page.clone()));
        Value::Object(m)
    }

    /// Converts a [`Post`] into the value listing it on another page: index
    /// pages, and the `prev`/`next` links of post pages. Its HTML has
    /// absolute links, so it reads the same on any page.
    ///
    /// Besides the fields of [`Post::to_value`], `content` is what an index
    /// shows for the post: the excerpt, or with [`IndexContent::Full`] the
    /// whole body, which also sets `body` and clears `summarized`.
    pub fn summarize(&self, content: IndexContent) -> Value {
        let mut m = self.fields();
        let excerpt = &self.excerpt.resolved;
        m.insert("excerpt".to_owned(), Value::String(excerpt.clone()));
        let (shown, summarized) = match content {
            IndexContent::Summary => (excerpt, self.summarized),
            IndexContent::Full => {
                let body = &self.body.resolved;
                m.insert("body".to_owned(), Value::String(body.clone()));
                (body, false)
            }
        };
        m.insert("content".to_owned(), Value::String(shown.clone()));
        m.insert("summarized".to_owned(), Value::Bool(summarized));
        Value::Object(m)
    }

    // The fields shared by every rendering of the post.
    fn fields(&self) -> HashMap<String, Value> {
        let mut m: HashMap<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), value::from_yaml(v)))
            .collect();

        m.insert("slug".to_owned(), Value::String(self.slug.clone()));
        m.insert("title".to_owned(), Value::String(self.title.clone()));
        m.insert(
            "date".to_owned(),
            Value::String(self.date.format("%Y-%m-%d").to_string()),
        );
        m.insert(
            "date_rfc3339".to_owned(),
            Value::String(self.date.to_rfc3339()),
        );
        m.insert("draft".to_owned(), Value::Bool(self.draft));
        m.insert("url".to_owned(), value::url(&self.url));
        m.insert(
            "tags".to_owned(),
            Value::Array(self.tags.iter().map(Value::from).collect()),
        );
        m
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn post() -> Post {
        let html = |page: &str, resolved: &str| Html {
            page: page.to_owned(),
            resolved: resolved.to_owned(),
            text: String::new(),
        };
        Post {
            slug: "hello".to_owned(),
            title: "Hello".to_owned(),
            date: FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .unwrap(),
            tags: BTreeSet::new(),
            draft: false,
            source_path: PathBuf::from("hello.md"),
            body_markdown: String::new(),
            body: html(
                r#"<p><img src="cat.png" /></p><p>More</p>"#,
                concat!(
                    r#"<p><img src="https://example.com/hello/cat.png" /></p>"#,
                    "<p>More</p>",
                ),
            ),
            excerpt: html(
                r#"<p><img src="cat.png" /></p>"#,
                r#"<p><img src="https://example.com/hello/cat.png" /></p>"#,
            ),
            summarized: true,
            url: Url::parse("https://example.com/hello/").unwrap(),
            extra: BTreeMap::new(),
        }
    }

    fn field(value: &Value, key: &str) -> Value {
        match value {
            Value::Object(m) => m.get(key).cloned().unwrap_or(Value::Nil),
            _ => panic!("wanted an object, got {:?}", value),
        }
    }

    #[test]
    fn test_post_page_keeps_links() {
        let value = post().to_value();
        assert_eq!(
            Value::String(r#"<p><img src="cat.png" /></p>"#.to_owned()),
            field(&value, "excerpt")
        );
    }

    #[test]
    fn test_listing_links_are_absolute() {
        let value = post().summarize(IndexContent::Summary);
        let excerpt = Value::String(String::from(
            r#"<p><img src="https://example.com/hello/cat.png" /></p>"#,
        ));
        assert_eq!(excerpt, field(&value, "excerpt"));
        assert_eq!(excerpt, field(&value, "content"));
        assert_eq!(Value::Bool(true), field(&value, "summarized"));
        assert_eq!(Value::Nil, field(&value, "body"));
    }

    #[test]
    fn test_full_listing() {
        let value = post().summarize(IndexContent::Full);
        assert_eq!(field(&value, "body"), field(&value, "content"));
        assert!(matches!(
            field(&value, "content"),
            Value::String(s) if s.ends_with("<p>More</p>")
        ));
        assert_eq!(Value::Bool(false), field(&value, "summarized"));
    }
}
