//! Defines the [`Corpus`] of posts and the [`Builder`] which reads it from
//! the source directory. Building a corpus only ever reads the filesystem;
//! every post is parsed and validated before anything is written.

use crate::config::Config;
use crate::frontmatter::{self, Frontmatter};
use crate::markdown::{self, Converter};
use crate::post::Post;
use crate::tag::Tag;
use crate::url::Resolver;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Slugs which would collide with other output paths.
pub const RESERVED_SLUGS: &[&str] = &["tags", "page"];

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];

/// Every post of a build, newest first. Posts with the same date are ordered
/// by slug.
#[derive(Debug)]
pub struct Corpus {
    /// Every post, drafts included.
    pub all: Vec<Post>,

    include_drafts: bool,
}

impl Corpus {
    /// Sorts `posts` into a corpus. Drafts count as published when
    /// `include_drafts` is set.
    pub fn new(mut posts: Vec<Post>, include_drafts: bool) -> Corpus {
        posts.sort_by(|a, b| {
            b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug))
        });
        Corpus {
            all: posts,
            include_drafts,
        }
    }

    /// The posts which belong in indexes and feeds, in corpus order.
    pub fn published(&self) -> Vec<&Post> {
        self.all
            .iter()
            .filter(|post| self.include_drafts || !post.draft)
            .collect()
    }

    pub fn is_published(&self, post: &Post) -> bool {
        self.include_drafts || !post.draft
    }
}

/// Builds a [`Corpus`] from the source directory of a [`Config`].
pub struct Builder<'a> {
    config: &'a Config,
    converter: &'a Converter,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a Config, converter: &'a Converter) -> Builder<'a> {
        Builder { config, converter }
    }

    /// Parses every post source file and validates the result as a whole.
    /// Fails on the first file which can't be parsed or converted, and on
    /// any slug claimed by more than one file.
    pub fn build(&self) -> Result<Corpus> {
        let mut posts = Vec::new();
        for path in self.source_files()? {
            let post = self.parse_post(&path)?;
            debug!(
                slug = post.slug.as_str(),
                draft = post.draft,
                "parsed {}",
                path.display()
            );
            posts.push(post);
        }

        check_slugs(&posts)?;
        check_tags(&posts)?;

        let corpus = Corpus::new(posts, self.config.include_drafts);
        info!(
            "parsed {} posts ({} published)",
            corpus.all.len(),
            corpus.published().len()
        );
        Ok(corpus)
    }

    // Lists the Markdown files of the source directory, sorted so that a
    // build never depends on directory iteration order. Hidden files and
    // directories are skipped.
    fn source_files(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.source_directory;
        let mut walker = WalkDir::new(root).min_depth(1);
        if !self.config.recursive {
            walker = walker.max_depth(1);
        }

        let mut paths = Vec::new();
        let walker = walker.into_iter().filter_entry(|entry| !is_hidden(entry));
        for result in walker {
            let entry = result?;
            if entry.file_type().is_file() && is_markdown(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn parse_post(&self, path: &Path) -> Result<Post> {
        let contents = std::fs::read_to_string(path).map_err(|err| Error::Io {
            path: path.to_owned(),
            err,
        })?;
        let metadata = |err: frontmatter::Error| Error::Metadata {
            path: path.to_owned(),
            err,
        };
        let conversion = |err: markdown::Error| Error::Conversion {
            path: path.to_owned(),
            err,
        };

        let (matter, body) = Frontmatter::parse(&contents).map_err(metadata)?;
        let slug = derive_slug(&matter, path).map_err(metadata)?;

        let base_url = &self.config.base_url;
        let mut tags = BTreeSet::new();
        for name in &matter.tags {
            let tag = Tag::new(name, base_url)?.ok_or_else(|| {
                metadata(frontmatter::Error::InvalidField {
                    field: "tags",
                    reason: format!(
                        "tag `{}` has no URL-safe characters",
                        name
                    ),
                })
            })?;
            if let Some(other) = tags.get(&tag) {
                if !same_spelling(other, &tag) {
                    return Err(metadata(frontmatter::Error::InvalidField {
                        field: "tags",
                        reason: format!(
                            "tags `{}` and `{}` share the slug `{}`",
                            other.name, tag.name, tag.slug
                        ),
                    }));
                }
            }
            tags.insert(tag);
        }

        let resolver = Resolver::new(base_url, &format!("{}/", slug))?;
        let mut document = self
            .converter
            .to_document(body, &resolver)
            .map_err(conversion)?;
        if let Some(markdown) = &matter.excerpt {
            document.excerpt = self
                .converter
                .to_html(markdown, &resolver)
                .map_err(conversion)?;
            document.summarized = true;
        }

        Ok(Post {
            url: resolver.base().clone(),
            slug,
            title: matter.title,
            date: matter.date,
            tags,
            draft: matter.draft,
            source_path: path.to_owned(),
            body_markdown: body.to_owned(),
            body: document.body,
            excerpt: document.excerpt,
            summarized: document.summarized,
            extra: matter.extra,
        })
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.starts_with('.'))
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| MARKDOWN_EXTENSIONS.contains(&ext))
}

/// Derives the slug of a post: the frontmatter `slug` if there is one, else
/// the file stem without a leading `YYYY-MM-DD-` date, else the title. The
/// result is always slugified.
pub fn derive_slug(
    matter: &Frontmatter,
    path: &Path,
) -> std::result::Result<String, frontmatter::Error> {
    let candidates = [
        matter.slug.clone(),
        path.file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| strip_date_prefix(stem).to_owned()),
        Some(matter.title.clone()),
    ];
    let slug = candidates
        .iter()
        .flatten()
        .map(|candidate| slug::slugify(candidate))
        .find(|slug| !slug.is_empty())
        .ok_or_else(|| frontmatter::Error::InvalidField {
            field: "slug",
            reason: String::from(
                "no URL-safe slug can be derived for this post",
            ),
        })?;

    if RESERVED_SLUGS.contains(&slug.as_str()) {
        return Err(frontmatter::Error::InvalidField {
            field: "slug",
            reason: format!("`{}` is reserved for index pages", slug),
        });
    }
    Ok(slug)
}

// Strips a `YYYY-MM-DD-` prefix, as in `2024-01-31-hello`.
fn strip_date_prefix(stem: &str) -> &str {
    let bytes = stem.as_bytes();
    let is_date_prefix = bytes.len() > 11
        && bytes[..10].iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
        && bytes[10] == b'-';
    if is_date_prefix {
        &stem[11..]
    } else {
        stem
    }
}

// Fails if two or more posts share a slug, naming every slug and every file
// involved.
fn check_slugs(posts: &[Post]) -> Result<()> {
    let mut by_slug: BTreeMap<&str, Vec<&Path>> = BTreeMap::new();
    for post in posts {
        by_slug
            .entry(post.slug.as_str())
            .or_default()
            .push(&post.source_path);
    }
    let duplicates: BTreeMap<String, Vec<PathBuf>> = by_slug
        .into_iter()
        .filter(|(_, paths)| paths.len() > 1)
        .map(|(slug, paths)| {
            (slug.to_owned(), paths.into_iter().map(Path::to_owned).collect())
        })
        .collect();
    match duplicates.is_empty() {
        true => Ok(()),
        false => Err(Error::DuplicateSlugs(duplicates)),
    }
}

// Tags are the same tag when their slugs match, but only spellings which
// differ in case may share a slug. `C++` and `C#` would otherwise end up on
// one index page.
fn check_tags(posts: &[Post]) -> Result<()> {
    let mut by_slug: BTreeMap<&str, Vec<(&Tag, &Path)>> = BTreeMap::new();
    for post in posts {
        for tag in &post.tags {
            by_slug
                .entry(tag.slug.as_str())
                .or_default()
                .push((tag, &post.source_path));
        }
    }
    for (slug, uses) in by_slug {
        let (first, _) = uses[0];
        if uses.iter().all(|(tag, _)| same_spelling(first, tag)) {
            continue;
        }
        let names: BTreeSet<&str> =
            uses.iter().map(|(tag, _)| tag.name.as_str()).collect();
        let paths: BTreeSet<&Path> =
            uses.iter().map(|(_, path)| *path).collect();
        return Err(Error::TagConflict {
            slug: slug.to_owned(),
            names: names.into_iter().map(str::to_owned).collect(),
            paths: paths.into_iter().map(Path::to_owned).collect(),
        });
    }
    Ok(())
}

fn same_spelling(a: &Tag, b: &Tag) -> bool {
    a.name.to_lowercase() == b.name.to_lowercase()
}

/// Represents the result of building a [`Corpus`].
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error building a [`Corpus`].
#[derive(Debug)]
pub enum Error {
    /// Returned when a post's frontmatter is missing, malformed or invalid.
    Metadata {
        path: PathBuf,
        err: frontmatter::Error,
    },

    /// Returned when more than one post has the same slug. Maps every such
    /// slug to the files claiming it.
    DuplicateSlugs(BTreeMap<String, Vec<PathBuf>>),

    /// Returned when tags spelled differently, beyond case, share a slug.
    TagConflict {
        slug: String,
        names: Vec<String>,
        paths: Vec<PathBuf>,
    },

    /// Returned when a post body can't be converted to HTML.
    Conversion {
        path: PathBuf,
        err: markdown::Error,
    },

    /// Returned when a source file can't be read.
    Io { path: PathBuf, err: std::io::Error },

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// Returned when there is a problem parsing URLs.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Metadata { path, err } => {
                write!(f, "parsing post `{}`: {}", path.display(), err)
            }
            Error::DuplicateSlugs(duplicates) => {
                for (i, (slug, paths)) in duplicates.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(
                        f,
                        "slug `{}` is used by more than one post:",
                        slug
                    )?;
                    for path in paths {
                        write!(f, " `{}`", path.display())?;
                    }
                }
                Ok(())
            }
            Error::TagConflict { slug, names, paths } => {
                write!(f, "tags {:?} share the slug `{}` in:", names, slug)?;
                for path in paths {
                    write!(f, " `{}`", path.display())?;
                }
                Ok(())
            }
            Error::Conversion { path, err } => {
                write!(f, "converting post `{}`: {}", path.display(), err)
            }
            Error::Io { path, err } => {
                write!(f, "reading `{}`: {}", path.display(), err)
            }
            Error::WalkDir(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Metadata { err, .. } => Some(err),
            Error::DuplicateSlugs(_) => None,
            Error::TagConflict { .. } => None,
            Error::Conversion { err, .. } => Some(err),
            Error::Io { err, .. } => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while walking the source directory.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL parsing and joining functions.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use url::Url;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn config(source: &Path) -> Config {
        Config::new(
            source,
            &source.join("public"),
            Url::parse("https://example.com/blog/").unwrap(),
        )
    }

    fn build(config: &Config) -> Result<Corpus> {
        let converter = Converter::new(&config.highlight_theme).unwrap();
        Builder::new(config, &converter).build()
    }

    fn slugs<'a>(posts: impl Iterator<Item = &'a Post>) -> Vec<&'a str> {
        posts.map(|post| post.slug.as_str()).collect()
    }

    fn frontmatter(title: &str, slug: Option<&str>) -> Frontmatter {
        let (mut fm, _) =
            Frontmatter::parse("---\ntitle: x\ndate: 2024-01-01\n---\n")
                .unwrap();
        fm.title = title.to_owned();
        fm.slug = slug.map(str::to_owned);
        fm
    }

    #[test]
    fn test_derive_slug() {
        let path = Path::new("posts/2024-01-31-Hello World.md");
        assert_eq!(
            "hello-world",
            derive_slug(&frontmatter("Ignored", None), path).unwrap()
        );
        let custom = frontmatter("Ignored", Some("Custom Slug"));
        assert_eq!("custom-slug", derive_slug(&custom, path).unwrap());
        let fallback = frontmatter("Fallback Title", None);
        assert_eq!(
            "fallback-title",
            derive_slug(&fallback, Path::new("!!!.md")).unwrap()
        );
    }

    #[test]
    fn test_derive_slug_is_deterministic() {
        let path = Path::new("2024-01-01-hello.md");
        let fm = frontmatter("Hello", None);
        assert_eq!(
            derive_slug(&fm, path).unwrap(),
            derive_slug(&fm, path).unwrap()
        );
    }

    #[test]
    fn test_reserved_slug() {
        let fm = frontmatter("x", Some("tags"));
        let err = derive_slug(&fm, Path::new("a.md")).unwrap_err();
        assert_eq!(Some("slug"), err.field());
    }

    #[test]
    fn test_strip_date_prefix() {
        assert_eq!("hello", strip_date_prefix("2024-01-31-hello"));
        assert_eq!("2024-01-31", strip_date_prefix("2024-01-31"));
        assert_eq!("24-01-31-hello", strip_date_prefix("24-01-31-hello"));
    }

    #[test]
    fn test_build() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("2024-01-01-hello.md"),
            "---\ntitle: Hello\ndate: 2024-01-01\ntags: [Rust, rust, web]\n\
             mood: sunny\n---\nIntro **text**.\n\nMore.\n",
        )?;
        fs::write(
            dir.path().join("2024-02-01-draft.md"),
            "---\ntitle: Draft\ndate: 2024-02-01\ndraft: true\n---\nWIP\n",
        )?;
        fs::write(dir.path().join("notes.txt"), "not a post")?;
        fs::write(dir.path().join(".hidden.md"), "not a post either")?;

        let corpus = build(&config(dir.path()))?;
        assert_eq!(vec!["draft", "hello"], slugs(corpus.all.iter()));
        assert_eq!(vec!["hello"], slugs(corpus.published().into_iter()));

        let hello = &corpus.all[1];
        assert_eq!("https://example.com/blog/hello/", hello.url.as_str());
        assert_eq!(2, hello.tags.len());
        assert_eq!("<p>Intro <strong>text</strong>.</p>", hello.excerpt.page);
        assert!(hello.summarized);
        assert!(hello.extra.contains_key("mood"));
        Ok(())
    }

    #[test]
    fn test_include_drafts() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("draft.md"),
            "---\ntitle: Draft\ndate: 2024-02-01\ndraft: true\n---\nWIP\n",
        )?;
        let mut config = config(dir.path());
        config.include_drafts = true;
        assert_eq!(1, build(&config)?.published().len());
        Ok(())
    }

    #[test]
    fn test_recursive() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("2023"))?;
        fs::write(
            dir.path().join("2023/old.md"),
            "---\ntitle: Old\ndate: 2023-01-01\n---\nOld\n",
        )?;
        let mut config = config(dir.path());
        assert_eq!(0, build(&config)?.all.len());
        config.recursive = true;
        assert_eq!(1, build(&config)?.all.len());
        Ok(())
    }

    #[test]
    fn test_ties_sort_by_slug() -> TestResult {
        let dir = tempfile::tempdir()?;
        for name in &["b", "a", "c"] {
            fs::write(
                dir.path().join(format!("{}.md", name)),
                "---\ntitle: Same day\ndate: 2024-01-01\n---\nBody\n",
            )?;
        }
        let corpus = build(&config(dir.path()))?;
        assert_eq!(vec!["a", "b", "c"], slugs(corpus.all.iter()));
        Ok(())
    }

    #[test]
    fn test_duplicate_slug() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("2024-01-01-hello.md"),
            "---\ntitle: One\ndate: 2024-01-01\n---\nOne\n",
        )?;
        fs::write(
            dir.path().join("other.md"),
            "---\ntitle: Two\ndate: 2024-01-02\nslug: hello\n---\nTwo\n",
        )?;
        match build(&config(dir.path())) {
            Err(Error::DuplicateSlugs(duplicates)) => {
                let slugs: Vec<&String> = duplicates.keys().collect();
                assert_eq!(vec!["hello"], slugs);
                assert_eq!(2, duplicates["hello"].len());
            }
            other => panic!("wanted duplicate slugs, got {:?}", other.err()),
        }
        Ok(())
    }

    #[test]
    fn test_every_duplicate_slug_is_reported() -> TestResult {
        let dir = tempfile::tempdir()?;
        for (file, slug) in &[
            ("a.md", "one"),
            ("b.md", "one"),
            ("c.md", "two"),
            ("d.md", "two"),
            ("e.md", "two"),
            ("f.md", "three"),
        ] {
            let source = format!(
                "---\ntitle: T\ndate: 2024-01-01\nslug: {}\n---\n",
                slug
            );
            fs::write(dir.path().join(file), source)?;
        }
        let err = build(&config(dir.path())).unwrap_err();
        match &err {
            Error::DuplicateSlugs(duplicates) => {
                assert_eq!(
                    vec!["one", "two"],
                    duplicates.keys().collect::<Vec<_>>()
                );
                assert_eq!(2, duplicates["one"].len());
                assert_eq!(3, duplicates["two"].len());
            }
            other => panic!("wanted duplicate slugs, got {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("slug `one`"), "{}", message);
        assert!(message.contains("slug `two`"), "{}", message);
        assert!(message.contains("e.md"), "{}", message);
        Ok(())
    }

    fn tagged(dir: &Path, name: &str, tags: &str) -> std::io::Result<()> {
        fs::write(
            dir.join(format!("{}.md", name)),
            format!("---\ntitle: T\ndate: 2024-01-01\ntags: [{}]\n---\n", tags),
        )
    }

    #[test]
    fn test_tag_without_slug() -> TestResult {
        let dir = tempfile::tempdir()?;
        tagged(dir.path(), "a", "rust, \"+\"")?;
        match build(&config(dir.path())) {
            Err(Error::Metadata { err, .. }) => {
                assert_eq!(Some("tags"), err.field());
                assert!(err.to_string().contains("`+`"), "{}", err);
            }
            other => panic!("wanted a metadata error, got {:?}", other.err()),
        }
        Ok(())
    }

    #[test]
    fn test_tags_sharing_a_slug_in_one_post() -> TestResult {
        let dir = tempfile::tempdir()?;
        tagged(dir.path(), "a", "\"C++\", \"C#\"")?;
        match build(&config(dir.path())) {
            Err(Error::Metadata { err, .. }) => {
                assert_eq!(Some("tags"), err.field());
            }
            other => panic!("wanted a metadata error, got {:?}", other.err()),
        }
        Ok(())
    }

    #[test]
    fn test_tags_sharing_a_slug_across_posts() -> TestResult {
        let dir = tempfile::tempdir()?;
        tagged(dir.path(), "a", "\"C++\"")?;
        tagged(dir.path(), "b", "\"C#\"")?;
        tagged(dir.path(), "c", "\"C++\"")?;
        match build(&config(dir.path())) {
            Err(Error::TagConflict { slug, names, paths }) => {
                assert_eq!("c", slug);
                assert_eq!(vec!["C#", "C++"], names);
                assert_eq!(3, paths.len());
            }
            other => panic!("wanted a tag conflict, got {:?}", other.err()),
        }
        Ok(())
    }

    #[test]
    fn test_tags_differing_in_case_are_one_tag() -> TestResult {
        let dir = tempfile::tempdir()?;
        tagged(dir.path(), "a", "Rust")?;
        tagged(dir.path(), "b", "rust, RUST")?;
        let corpus = build(&config(dir.path()))?;
        assert!(corpus.all.iter().all(|post| post.tags.len() == 1));
        Ok(())
    }

    #[test]
    fn test_missing_title() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("untitled.md");
        fs::write(&path, "---\ndate: 2024-01-01\n---\nBody\n")?;
        match build(&config(dir.path())) {
            Err(Error::Metadata { path: p, err }) => {
                assert_eq!(path, p);
                assert_eq!(Some("title"), err.field());
            }
            other => panic!("wanted a metadata error, got {:?}", other.err()),
        }
        Ok(())
    }

    #[test]
    fn test_explicit_excerpt() -> TestResult {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("post.md"),
            "---\ntitle: Post\ndate: 2024-01-01\n\
             excerpt: See [here](more.html).\n---\nBody\n",
        )?;
        let corpus = build(&config(dir.path()))?;
        let post = &corpus.all[0];
        assert_eq!(
            r#"<p>See <a href="more.html">here</a>.</p>"#,
            post.excerpt.page
        );
        assert_eq!(
            concat!(
                r#"<p>See <a href="https://example.com/blog/post/more.html">"#,
                "here</a>.</p>",
            ),
            post.excerpt.resolved
        );
        Ok(())
    }
}
