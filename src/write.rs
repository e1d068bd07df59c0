//! Responsible for templating and writing HTML pages to disk: one page per
//! post, plus paginated indexes of the published posts (one main index and
//! one per tag).
//!
//! Output paths, relative to the output directory:
//!
//! * `{slug}/index.html` for every post
//! * `index.html`, `page/{n}/index.html` for the main index
//! * `tags/{tag}/index.html`, `tags/{tag}/page/{n}/index.html` for tag indexes

use crate::config::{Config, IndexContent};
use crate::corpus::Corpus;
use crate::post::Post;
use crate::tag::Tag;
use crate::template::{self, Templates};
use crate::value;
use gtmpl::{Template, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// The name of the RSS feed file in the output directory.
pub const RSS_FILE: &str = "rss.xml";

/// The name of the JSON Feed file in the output directory.
pub const JSON_FEED_FILE: &str = "feed.json";

/// The name of the Atom feed file in the output directory.
pub const ATOM_FILE: &str = "atom.xml";

/// Responsible for indexing, templating, and writing HTML pages to disk from
/// a [`Corpus`].
pub struct Writer<'a> {
    /// The parsed post and index templates.
    pub templates: &'a Templates,

    /// The `site` value handed to every template. See [`site_value`].
    pub site: Value,

    /// The base URL of the site. Index page URLs are built on it.
    pub base_url: &'a Url,

    /// The number of posts per index page.
    pub page_size: usize,

    /// What index pages show for each post.
    pub index_content: IndexContent,

    /// The directory the pages are written to.
    pub output_directory: &'a Path,
}

impl<'a> Writer<'a> {
    pub fn new(
        config: &'a Config,
        templates: &'a Templates,
        output_directory: &'a Path,
    ) -> Self {
        Writer {
            templates,
            site: site_value(config),
            base_url: &config.base_url,
            page_size: config.page_size,
            index_content: config.index_content,
            output_directory,
        }
    }

    /// Writes a page for every post and the index pages of the published
    /// posts. Returns the number of pages written.
    pub fn write_pages(&self, corpus: &Corpus) -> Result<usize> {
        let link = |post: Option<&Post>| {
            post.map_or(Value::Nil, |post| {
                post.summarize(IndexContent::Summary)
            })
        };
        let mut written = 0;
        for (post, prev, next) in neighbours(corpus) {
            let value = value::object(vec![
                ("site", self.site.clone()),
                ("post", post.to_value()),
                ("prev", link(prev)),
                ("next", link(next)),
            ]);
            self.render_to(
                &self.templates.post,
                "post",
                Some(&post.slug),
                value,
                &Path::new(&post.slug).join("index.html"),
            )?;
            written += 1;
        }
        info!("wrote {} post pages", written);

        let mut index_pages = 0;
        for index in indexes(&corpus.published(), self.base_url)? {
            for page in index.pages(self.page_size)? {
                let posts = page
                    .posts
                    .iter()
                    .map(|post| post.summarize(self.index_content))
                    .collect();
                let value = value::object(vec![
                    ("site", self.site.clone()),
                    ("posts", Value::Array(posts)),
                    ("tag", index.tag.map_or(Value::Nil, Value::from)),
                    ("page", page.to_value()),
                ]);
                self.render_to(
                    &self.templates.index,
                    "index",
                    None,
                    value,
                    &page.file_path,
                )?;
                index_pages += 1;
            }
        }
        info!("wrote {} index pages", index_pages);

        Ok(written + index_pages)
    }

    fn render_to(
        &self,
        template: &Template,
        name: &'static str,
        slug: Option<&str>,
        value: Value,
        relative_path: &Path,
    ) -> Result<()> {
        let html =
            template::render(template, value).map_err(|message| {
                Error::Render {
                    template: name,
                    slug: slug.map(str::to_owned),
                    message,
                }
            })?;
        write_file(&self.output_directory.join(relative_path), &html)
    }
}

/// Builds the `site` value handed to every template: `title`,
/// `description`, `base_url`, `build_time`, `rss_url`, `json_feed_url`,
/// `atom_url` and `author` (nil, or an object with `name` and `email`).
pub fn site_value(config: &Config) -> Value {
    let feed_url = |file: &str| {
        config
            .base_url
            .join(file)
            .map_or(Value::Nil, |url| value::url(&url))
    };
    value::object(vec![
        ("title", Value::String(config.title.clone())),
        ("description", Value::String(config.description.clone())),
        ("base_url", value::url(&config.base_url)),
        ("build_time", Value::String(config.build_time.to_rfc3339())),
        ("rss_url", feed_url(RSS_FILE)),
        ("json_feed_url", feed_url(JSON_FEED_FILE)),
        ("atom_url", feed_url(ATOM_FILE)),
        (
            "author",
            config.author.as_ref().map_or(Value::Nil, |author| {
                value::object(vec![
                    ("name", Value::String(author.name.clone())),
                    (
                        "email",
                        author.email.as_ref().map_or(Value::Nil, |email| {
                            Value::String(email.clone())
                        }),
                    ),
                ])
            }),
        ),
    ])
}

/// Pairs every post with its published neighbours: `prev` is the nearest
/// newer published post, `next` the nearest older one.
fn neighbours(
    corpus: &Corpus,
) -> Vec<(&Post, Option<&Post>, Option<&Post>)> {
    corpus
        .all
        .iter()
        .enumerate()
        .map(|(i, post)| {
            let prev = corpus.all[..i]
                .iter()
                .rev()
                .find(|p| corpus.is_published(p));
            let next = corpus.all[i + 1..]
                .iter()
                .find(|p| corpus.is_published(p));
            (post, prev, next)
        })
        .collect()
}

/// A collection of posts listed together: the main index (no tag) or the
/// index of a tag.
struct Index<'a> {
    tag: Option<&'a Tag>,

    /// The URL of the first page.
    url: Url,

    /// The output directory of the first page, relative to the output root.
    directory: PathBuf,

    posts: Vec<&'a Post>,
}

/// One page of an [`Index`].
struct Page<'a> {
    /// Starts at 1.
    number: usize,
    total: usize,
    posts: &'a [&'a Post],
    file_path: PathBuf,
    prev_url: Option<Url>,
    next_url: Option<Url>,
}

impl Page<'_> {
    /// Converts a [`Page`] into the `page` value of index templates, with
    /// fields `number`, `total`, `prev_url` and `next_url`.
    fn to_value(&self) -> Value {
        value::object(vec![
            ("number", Value::from(self.number as u64)),
            ("total", Value::from(self.total as u64)),
            ("prev_url", value::optional_url(self.prev_url.as_ref())),
            ("next_url", value::optional_url(self.next_url.as_ref())),
        ])
    }
}

impl<'a> Index<'a> {
    /// Splits the index into pages of `page_size` posts. An index always has
    /// at least one page, even when it has no posts.
    fn pages(
        &self,
        page_size: usize,
    ) -> std::result::Result<Vec<Page<'_>>, url::ParseError> {
        let total =
            std::cmp::max(1, (self.posts.len() + page_size - 1) / page_size);
        let page_url = |number: usize| match number {
            1 => Ok(self.url.clone()),
            _ => self.url.join(&format!("page/{}/", number)),
        };

        let mut chunks: Vec<&[&Post]> = self.posts.chunks(page_size).collect();
        if chunks.is_empty() {
            chunks.push(&[]);
        }

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, posts)| {
                let number = i + 1;
                let directory = match number {
                    1 => self.directory.clone(),
                    _ => self.directory.join("page").join(number.to_string()),
                };
                Ok(Page {
                    number,
                    total,
                    posts,
                    file_path: directory.join("index.html"),
                    prev_url: match number {
                        1 => None,
                        _ => Some(page_url(number - 1)?),
                    },
                    next_url: match number < total {
                        true => Some(page_url(number + 1)?),
                        false => None,
                    },
                })
            })
            .collect()
    }
}

/// Indexes the published posts: the main index first, then one index per
/// tag in slug order. A tag index is titled with the first spelling of the
/// tag in corpus order.
fn indexes<'a>(
    published: &[&'a Post],
    base_url: &Url,
) -> std::result::Result<Vec<Index<'a>>, url::ParseError> {
    let mut by_tag: BTreeMap<&str, (&Tag, Vec<&Post>)> = BTreeMap::new();
    for post in published {
        for tag in &post.tags {
            by_tag
                .entry(tag.slug.as_str())
                .or_insert_with(|| (tag, Vec::new()))
                .1
                .push(*post);
        }
    }

    let mut indexes = vec![Index {
        tag: None,
        url: base_url.clone(),
        directory: PathBuf::new(),
        posts: published.to_vec(),
    }];
    for (slug, (tag, posts)) in by_tag {
        indexes.push(Index {
            tag: Some(tag),
            url: base_url.join(&format!("tags/{}/", slug))?,
            directory: Path::new("tags").join(slug),
            posts,
        });
    }
    Ok(indexes)
}

/// Writes `contents` to `path`, creating parent directories as needed.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    let io_error = |err| Error::Io {
        path: path.to_owned(),
        err,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_error)?;
    }
    std::fs::write(path, contents).map_err(io_error)?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error during templating. `slug` names the post for post pages.
    Render {
        template: &'static str,
        slug: Option<String>,
        message: String,
    },

    /// An error writing an output file.
    Io { path: PathBuf, err: io::Error },

    /// Returned when there is a problem building index URLs.
    UrlParse(url::ParseError),
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL joining functions.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Render {
                template,
                slug: Some(slug),
                message,
            } => write!(
                f,
                "rendering {} template for post `{}`: {}",
                template, slug, message
            ),
            Error::Render {
                template,
                slug: None,
                message,
            } => write!(f, "rendering {} template: {}", template, message),
            Error::Io { path, err } => {
                write!(f, "writing `{}`: {}", path.display(), err)
            }
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Render { .. } => None,
            Error::Io { err, .. } => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}
