//! Loads the build [`Config`] from a `folio.yaml` project file and
//! command-line overrides. A `Config` is a plain value handed to the corpus
//! builder and the writers; nothing about a build lives in global state.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// The name of the project file searched for by [`Config::load`].
pub const PROJECT_FILE: &str = "folio.yaml";

const DEFAULT_PAGE_SIZE: usize = 10;
const DEFAULT_HIGHLIGHT_THEME: &str = "InspiredGitHub";

/// The site author, credited in feeds.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

/// What a feed entry carries.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FeedContent {
    /// The post's excerpt.
    Summary,

    /// The post's entire body.
    Full,
}

impl Default for FeedContent {
    fn default() -> Self {
        FeedContent::Summary
    }
}

/// What index pages show for each post.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum IndexContent {
    /// The post's excerpt, with a link to the rest.
    Summary,

    /// The post's entire body.
    Full,
}

impl Default for IndexContent {
    fn default() -> Self {
        IndexContent::Summary
    }
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct Project {
    title: Option<String>,
    description: Option<String>,
    base_url: Option<Url>,
    author: Option<Author>,
    page_size: Option<usize>,
    recursive: Option<bool>,
    include_drafts: Option<bool>,
    feed_content: Option<FeedContent>,
    index_content: Option<IndexContent>,
    theme: Option<PathBuf>,
    assets: Option<Vec<PathBuf>>,
    highlight_theme: Option<String>,
}

#[derive(Deserialize)]
struct Theme {
    post_template: Vec<PathBuf>,
    index_template: Vec<PathBuf>,
}

/// The template files of a theme. The files of each list are concatenated
/// in order, so later files can use `{{define}}`s from earlier ones.
#[derive(Clone, Debug, PartialEq)]
pub struct ThemeFiles {
    pub post_template: Vec<PathBuf>,
    pub index_template: Vec<PathBuf>,
}

/// Everything a build needs to know.
#[derive(Clone, Debug)]
pub struct Config {
    /// The site title, shown by templates and used as the feed title.
    pub title: String,

    /// The site description, used as the feed description.
    pub description: String,

    pub author: Option<Author>,

    /// The absolute URL the site is served from. Always ends in `/`.
    pub base_url: Url,

    /// The directory holding the post sources.
    pub source_directory: PathBuf,

    /// The directory the site is written to. It is replaced wholesale by a
    /// successful build.
    pub output_directory: PathBuf,

    /// Whether to look for posts in subdirectories of the source directory.
    pub recursive: bool,

    /// Whether drafts are listed in indexes and feeds like published posts.
    pub include_drafts: bool,

    /// The number of posts per index page.
    pub page_size: usize,

    pub feed_content: FeedContent,

    pub index_content: IndexContent,

    /// `None` selects the built-in templates.
    pub theme: Option<ThemeFiles>,

    /// Directories copied into the output directory as-is, each under its
    /// own name.
    pub asset_directories: Vec<PathBuf>,

    /// The `syntect` theme used to highlight code blocks.
    pub highlight_theme: String,

    /// The time of the build, exposed to templates.
    pub build_time: DateTime<FixedOffset>,
}

/// Settings given on the command line. They take precedence over the
/// project file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub base_url: Option<Url>,
    pub page_size: Option<usize>,
    pub include_drafts: bool,
    pub recursive: bool,
}

impl Config {
    /// A configuration with every setting at its default.
    pub fn new(
        source_directory: &Path,
        output_directory: &Path,
        base_url: Url,
    ) -> Config {
        Config {
            title: String::from("Blog"),
            description: String::new(),
            author: None,
            base_url: with_trailing_slash(base_url),
            source_directory: source_directory.to_owned(),
            output_directory: output_directory.to_owned(),
            recursive: false,
            include_drafts: false,
            page_size: DEFAULT_PAGE_SIZE,
            feed_content: FeedContent::default(),
            index_content: IndexContent::default(),
            theme: None,
            asset_directories: Vec::new(),
            highlight_theme: DEFAULT_HIGHLIGHT_THEME.to_owned(),
            build_time: build_time(),
        }
    }

    /// Loads the configuration for building `source_directory` into
    /// `output_directory`. The project file is the one named in `overrides`,
    /// else the nearest `folio.yaml` in `source_directory` or one of its
    /// ancestors. Without a project file, the base URL must come from
    /// `overrides`.
    pub fn load(
        source_directory: &Path,
        output_directory: &Path,
        overrides: Overrides,
    ) -> Result<Config> {
        let project_file = match &overrides.config_file {
            Some(path) => Some(path.clone()),
            None => find_project_file(source_directory),
        };

        let (project, project_root) = match &project_file {
            Some(path) => {
                debug!("loading project file {}", path.display());
                let file = crate::util::open(path, "project")?;
                let project: Project = serde_yaml::from_reader(file)
                    .with_context(|| {
                        format!("Loading project file `{}`", path.display())
                    })?;
                let root =
                    path.parent().map(Path::to_owned).unwrap_or_default();
                (project, root)
            }
            None => (Project::default(), PathBuf::new()),
        };

        let base_url =
            overrides.base_url.or(project.base_url).ok_or_else(|| {
                anyhow!(
                    "No base URL configured: pass `--base-url` or set \
                     `base_url` in `{}`",
                    PROJECT_FILE
                )
            })?;
        if base_url.cannot_be_a_base() {
            bail!("Base URL `{}` can't have paths joined onto it", base_url);
        }

        let mut config =
            Config::new(source_directory, output_directory, base_url);
        if let Some(title) = project.title {
            config.title = title;
        }
        if let Some(description) = project.description {
            config.description = description;
        }
        config.author = project.author;
        config.page_size = overrides
            .page_size
            .or(project.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if config.page_size == 0 {
            bail!("The page size must be at least 1");
        }
        config.recursive =
            overrides.recursive || project.recursive.unwrap_or(false);
        config.include_drafts =
            overrides.include_drafts || project.include_drafts.unwrap_or(false);
        config.feed_content = project.feed_content.unwrap_or_default();
        config.index_content = project.index_content.unwrap_or_default();
        if let Some(theme) = project.theme {
            config.theme = Some(load_theme(&project_root.join(theme))?);
        }
        config.asset_directories = project
            .assets
            .unwrap_or_default()
            .into_iter()
            .map(|dir| project_root.join(dir))
            .collect();
        if let Some(highlight_theme) = project.highlight_theme {
            config.highlight_theme = highlight_theme;
        }

        config.check_directories()?;
        Ok(config)
    }

    // A build replaces the output directory, so it must not be (or contain)
    // the sources.
    fn check_directories(&self) -> Result<()> {
        let source = self.source_directory.canonicalize().with_context(|| {
            format!(
                "Opening source directory `{}`",
                self.source_directory.display()
            )
        })?;
        if let Ok(output) = self.output_directory.canonicalize() {
            if source.starts_with(&output) {
                bail!(
                    "The output directory `{}` contains the source directory",
                    self.output_directory.display()
                );
            }
        }
        Ok(())
    }
}

// Walks up from `dir` looking for the project file.
fn find_project_file(dir: &Path) -> Option<PathBuf> {
    let mut dir = Some(dir);
    while let Some(current) = dir {
        let path = current.join(PROJECT_FILE);
        if path.is_file() {
            return Some(path);
        }
        dir = current.parent();
    }
    None
}

fn load_theme(theme_dir: &Path) -> Result<ThemeFiles> {
    let path = theme_dir.join("theme.yaml");
    let file = crate::util::open(&path, "theme")?;
    let theme: Theme = serde_yaml::from_reader(file)
        .with_context(|| format!("Loading theme file `{}`", path.display()))?;
    Ok(ThemeFiles {
        post_template: theme
            .post_template
            .iter()
            .map(|relpath| theme_dir.join(relpath))
            .collect(),
        index_template: theme
            .index_template
            .iter()
            .map(|relpath| theme_dir.join(relpath))
            .collect(),
    })
}

// `Url::join` treats the last path segment as a file name unless it ends in
// a slash.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// The build time: `SOURCE_DATE_EPOCH` if set, for reproducible builds, else
/// now.
pub fn build_time() -> DateTime<FixedOffset> {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|epoch| epoch.trim().parse::<i64>().ok())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
        .into()
}
