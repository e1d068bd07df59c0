//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: parsing the posts
//! ([`crate::corpus`]), rendering post and index pages ([`crate::write`]),
//! writing the feeds ([`crate::feed`]), and copying the asset directories.
//!
//! Everything is written into a staging directory next to the output
//! directory, which replaces the output directory only once the whole build
//! has succeeded. A failed build leaves the previous output as it was.

use crate::config::Config;
use crate::corpus::{self, Builder as CorpusBuilder};
use crate::feed::{self, write_feeds};
use crate::frontmatter;
use crate::markdown::{self, Converter};
use crate::template::{self, Templates};
use crate::write::{self, Writer};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// The file which marks a directory as written by `folio`. Only marked (or
/// empty) directories are ever replaced by a build.
pub const MARKER_FILE: &str = ".folio";

/// What a successful build produced.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Summary {
    /// The number of posts, drafts included.
    pub posts: usize,

    /// The number of posts listed in indexes and feeds.
    pub published: usize,

    /// The number of HTML pages written.
    pub pages: usize,

    /// The number of asset files copied.
    pub assets: usize,
}

/// Builds the site from a [`Config`] object. This calls into
/// [`CorpusBuilder::build`], [`Writer::write_pages`] and [`write_feeds`]
/// which do the heavy-lifting. This function also copies the asset
/// directories into the output directory.
pub fn build_site(config: &Config) -> Result<Summary> {
    info!(
        "building {} into {}",
        config.source_directory.display(),
        config.output_directory.display()
    );

    // Everything which can fail without touching the filesystem goes first.
    let converter = Converter::new(&config.highlight_theme)
        .map_err(|err| Error::Conversion { path: None, err })?;
    let templates = Templates::load(config.theme.as_ref())?;
    let corpus = CorpusBuilder::new(config, &converter).build()?;

    let output = &config.output_directory;
    check_managed(output)?;
    let staging = staging_directory(output)?;
    debug!("staging build in {}", staging.path().display());

    write::write_file(&staging.path().join(MARKER_FILE), b"folio\n")?;
    let pages = Writer::new(config, &templates, staging.path())
        .write_pages(&corpus)?;
    write_feeds(config, &corpus, staging.path())?;
    let mut assets = 0;
    for dir in &config.asset_directories {
        assets += copy_assets(dir, staging.path())?;
    }

    promote(staging, output)?;

    let summary = Summary {
        posts: corpus.all.len(),
        published: corpus.published().len(),
        pages,
        assets,
    };
    info!(
        posts = summary.posts,
        published = summary.published,
        pages = summary.pages,
        assets = summary.assets,
        "built {}",
        output.display()
    );
    Ok(summary)
}

// Refuses to build over anything but a directory previously written by
// `folio`, so a mistyped output path can't wipe out unrelated files.
fn check_managed(output: &Path) -> Result<()> {
    if !output.exists() {
        return Ok(());
    }
    if !output.is_dir() {
        return Err(Error::UnmanagedOutput(output.to_owned()));
    }
    if output.join(MARKER_FILE).is_file() {
        return Ok(());
    }
    let mut entries =
        fs::read_dir(output).map_err(|err| Error::io(output, err))?;
    match entries.next() {
        None => Ok(()),
        Some(_) => Err(Error::UnmanagedOutput(output.to_owned())),
    }
}

// Creates the staging directory as a sibling of `output` so that promoting it
// is a rename within one filesystem.
fn staging_directory(output: &Path) -> Result<TempDir> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| Error::io(parent, err))?;
    let staging = tempfile::Builder::new()
        .prefix(".folio-")
        .tempdir_in(parent)
        .map_err(|err| Error::io(parent, err))?;

    // Temporary directories are private to their owner. The output isn't.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(staging.path(), fs::Permissions::from_mode(0o755))
            .map_err(|err| Error::io(staging.path(), err))?;
    }
    Ok(staging)
}

// Moves the previous output aside, renames the staging directory into its
// place, and only then deletes the previous output. If the rename fails, the
// previous output is put back.
fn promote(staging: TempDir, output: &Path) -> Result<()> {
    let previous = staging.path().with_extension("old");
    let had_previous = output.exists();
    if had_previous {
        fs::rename(output, &previous).map_err(|err| Error::io(output, err))?;
    }

    if let Err(err) = fs::rename(staging.path(), output) {
        if had_previous {
            if let Err(rollback) = fs::rename(&previous, output) {
                return Err(Error::Rollback {
                    output: output.to_owned(),
                    err,
                    previous,
                    rollback,
                });
            }
        }
        return Err(Error::io(output, err));
    }
    // The staging path is now the output directory; it must not be deleted
    // along with the `TempDir`.
    let _ = staging.keep();

    // The new site is in place. A leftover copy of the old one is untidy
    // but doesn't fail the build.
    if had_previous {
        if let Err(err) = fs::remove_dir_all(&previous) {
            warn!(
                "couldn't remove the previous output at {}: {}",
                previous.display(),
                err
            );
        }
    }
    Ok(())
}

// Copies `dir` recursively into `output_root/{dir name}`. Returns the number
// of files copied. Generated files are never overwritten: an asset landing
// on a page, a feed, or another asset fails the build.
fn copy_assets(dir: &Path, output_root: &Path) -> Result<usize> {
    let name = dir
        .file_name()
        .ok_or_else(|| Error::InvalidAssetDirectory(dir.to_owned()))?;
    let destination = output_root.join(name);

    let mut copied = 0;
    let walker =
        WalkDir::new(dir).sort_by(|a, b| a.file_name().cmp(b.file_name()));
    for result in walker {
        let entry = result?;
        let relative = entry.path().strip_prefix(dir).map_err(|err| {
            Error::io(entry.path(), io::Error::new(io::ErrorKind::Other, err))
        })?;
        let target = destination.join(relative);
        let conflict = match entry.file_type().is_dir() {
            true => target.exists() && !target.is_dir(),
            false => target.exists(),
        };
        if conflict {
            return Err(Error::AssetConflict {
                asset: entry.path().to_owned(),
                target: target
                    .strip_prefix(output_root)
                    .unwrap_or(&target)
                    .to_owned(),
            });
        }

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|err| Error::io(&target, err))?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|err| Error::io(entry.path(), err))?;
            debug!("copied {}", target.display());
            copied += 1;
        }
    }
    Ok(copied)
}

/// The result of building a site.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Every failure aborts the build.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post's frontmatter is missing, malformed or invalid.
    Metadata {
        path: PathBuf,
        err: frontmatter::Error,
    },

    /// Returned when more than one post has the same slug. Maps every such
    /// slug to the source files claiming it.
    DuplicateSlugs(BTreeMap<String, Vec<PathBuf>>),

    /// Returned when tags spelled differently, beyond case, share a slug.
    TagConflict {
        slug: String,
        names: Vec<String>,
        paths: Vec<PathBuf>,
    },

    /// Returned when Markdown can't be converted. `path` is `None` when the
    /// converter itself can't be set up.
    Conversion {
        path: Option<PathBuf>,
        err: markdown::Error,
    },

    /// Returned when a template fails to render.
    Render {
        template: &'static str,
        slug: Option<String>,
        message: String,
    },

    /// Returned when the templates can't be loaded.
    Template(template::Error),

    /// Returned when a feed can't be rendered.
    Feed(feed::Error),

    /// Returned when the output directory exists but wasn't written by
    /// `folio`.
    UnmanagedOutput(PathBuf),

    /// Returned when an asset directory has no name to copy it under.
    InvalidAssetDirectory(PathBuf),

    /// Returned when an asset would overwrite a generated file or another
    /// asset. `target` is relative to the output directory.
    AssetConflict { asset: PathBuf, target: PathBuf },

    /// Returned when the new output couldn't be put in place and the
    /// previous output couldn't be restored either. It is left at
    /// `previous`.
    Rollback {
        output: PathBuf,
        err: io::Error,
        previous: PathBuf,
        rollback: io::Error,
    },

    /// Returned for I/O problems, with the path involved.
    Io { path: PathBuf, err: io::Error },

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// Returned when there is a problem building URLs.
    UrlParse(url::ParseError),
}

impl Error {
    fn io(path: &Path, err: io::Error) -> Error {
        Error::Io {
            path: path.to_owned(),
            err,
        }
    }
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Metadata { path, err } => {
                write!(f, "Parsing post '{}': {}", path.display(), err)
            }
            Error::DuplicateSlugs(duplicates) => {
                for (i, (slug, paths)) in duplicates.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(
                        f,
                        "Slug '{}' is used by more than one post:",
                        slug
                    )?;
                    for path in paths {
                        write!(f, " '{}'", path.display())?;
                    }
                }
                Ok(())
            }
            Error::TagConflict { slug, names, paths } => {
                write!(f, "Tags {:?} share the slug '{}' in:", names, slug)?;
                for path in paths {
                    write!(f, " '{}'", path.display())?;
                }
                Ok(())
            }
            Error::Conversion {
                path: Some(path),
                err,
            } => write!(f, "Converting post '{}': {}", path.display(), err),
            Error::Conversion { path: None, err } => err.fmt(f),
            Error::Render {
                template,
                slug: Some(slug),
                message,
            } => write!(
                f,
                "Rendering {} template for post '{}': {}",
                template, slug, message
            ),
            Error::Render {
                template,
                slug: None,
                message,
            } => write!(f, "Rendering {} template: {}", template, message),
            Error::Template(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::UnmanagedOutput(path) => write!(
                f,
                "Refusing to replace '{}': it isn't empty and wasn't built \
                 by folio (no '{}' file)",
                path.display(),
                MARKER_FILE
            ),
            Error::InvalidAssetDirectory(path) => {
                write!(f, "Invalid asset directory '{}'", path.display())
            }
            Error::AssetConflict { asset, target } => write!(
                f,
                "Asset '{}' would overwrite '{}' in the output",
                asset.display(),
                target.display()
            ),
            Error::Rollback {
                output,
                err,
                previous,
                rollback,
            } => write!(
                f,
                "Replacing '{}': {}; restoring the previous output also \
                 failed ({}), it is left at '{}'",
                output.display(),
                err,
                rollback,
                previous.display()
            ),
            Error::Io { path, err } => {
                write!(f, "'{}': {}", path.display(), err)
            }
            Error::WalkDir(err) => err.fmt(f),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Metadata { err, .. } => Some(err),
            Error::DuplicateSlugs(_) => None,
            Error::TagConflict { .. } => None,
            Error::Conversion { err, .. } => Some(err),
            Error::Render { .. } => None,
            Error::Template(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::UnmanagedOutput(_) => None,
            Error::InvalidAssetDirectory(_) => None,
            Error::AssetConflict { .. } => None,
            Error::Rollback { err, .. } => Some(err),
            Error::Io { err, .. } => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<corpus::Error> for Error {
    /// Converts [`corpus::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: corpus::Error) -> Error {
        match err {
            corpus::Error::Metadata { path, err } => {
                Error::Metadata { path, err }
            }
            corpus::Error::DuplicateSlugs(duplicates) => {
                Error::DuplicateSlugs(duplicates)
            }
            corpus::Error::TagConflict { slug, names, paths } => {
                Error::TagConflict { slug, names, paths }
            }
            corpus::Error::Conversion { path, err } => Error::Conversion {
                path: Some(path),
                err,
            },
            corpus::Error::Io { path, err } => Error::Io { path, err },
            corpus::Error::WalkDir(err) => Error::WalkDir(err),
            corpus::Error::UrlParse(err) => Error::UrlParse(err),
        }
    }
}

impl From<write::Error> for Error {
    /// Converts [`write::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: write::Error) -> Error {
        match err {
            write::Error::Render {
                template,
                slug,
                message,
            } => Error::Render {
                template,
                slug,
                message,
            },
            write::Error::Io { path, err } => Error::Io { path, err },
            write::Error::UrlParse(err) => Error::UrlParse(err),
        }
    }
}

impl From<feed::Error> for Error {
    /// Converts [`feed::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: feed::Error) -> Error {
        match err {
            feed::Error::Write(err) => Error::from(err),
            err => Error::Feed(err),
        }
    }
}

impl From<template::Error> for Error {
    /// Converts [`template::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: template::Error) -> Error {
        Error::Template(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts [`walkdir::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn entries(dir: &Path) -> io::Result<usize> {
        Ok(fs::read_dir(dir)?.count())
    }

    #[test]
    fn test_check_managed() -> TestResult {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("public");
        check_managed(&output)?;

        fs::create_dir(&output)?;
        check_managed(&output)?;

        fs::write(output.join("notes.txt"), "mine")?;
        assert!(matches!(
            check_managed(&output),
            Err(Error::UnmanagedOutput(_))
        ));

        fs::write(output.join(MARKER_FILE), "folio\n")?;
        check_managed(&output)?;
        Ok(())
    }

    #[test]
    fn test_promote_replaces_output() -> TestResult {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("public");
        fs::create_dir(&output)?;
        fs::write(output.join("stale.html"), "old")?;

        let staging = staging_directory(&output)?;
        fs::write(staging.path().join("index.html"), "new")?;
        promote(staging, &output)?;

        assert_eq!("new", fs::read_to_string(output.join("index.html"))?);
        assert!(!output.join("stale.html").exists());
        assert_eq!(1, entries(dir.path())?);
        Ok(())
    }

    #[test]
    fn test_failed_promotion_restores_output() -> TestResult {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("public");
        fs::create_dir(&output)?;
        fs::write(output.join("index.html"), "old")?;

        // A staging directory which has vanished can't be renamed.
        let staging = staging_directory(&output)?;
        fs::remove_dir(staging.path())?;
        assert!(matches!(promote(staging, &output), Err(Error::Io { .. })));

        assert_eq!("old", fs::read_to_string(output.join("index.html"))?);
        assert_eq!(1, entries(dir.path())?);
        Ok(())
    }

    #[test]
    fn test_rollback_error_names_previous_output() {
        let err = Error::Rollback {
            output: PathBuf::from("public"),
            err: io::Error::new(io::ErrorKind::Other, "disk full"),
            previous: PathBuf::from(".folio-abc.old"),
            rollback: io::Error::new(io::ErrorKind::Other, "busy"),
        };
        let message = err.to_string();
        assert!(message.contains("disk full"), "{}", message);
        assert!(message.contains("busy"), "{}", message);
        assert!(message.contains("'.folio-abc.old'"), "{}", message);
    }

    #[test]
    fn test_copy_assets_refuses_to_overwrite() -> TestResult {
        let dir = tempfile::tempdir()?;
        let output = dir.path().join("out");
        fs::create_dir_all(output.join("hello"))?;
        fs::write(output.join("hello/index.html"), "post")?;
        let assets = dir.path().join("hello");
        fs::create_dir(&assets)?;
        fs::write(assets.join("cat.png"), "cat")?;

        // Files next to a page are fine.
        assert_eq!(1, copy_assets(&assets, &output)?);

        fs::remove_file(output.join("hello/cat.png"))?;
        fs::write(assets.join("index.html"), "asset")?;
        match copy_assets(&assets, &output) {
            Err(Error::AssetConflict { target, .. }) => {
                assert_eq!(Path::new("hello/index.html"), target)
            }
            other => panic!("wanted an asset conflict, got {:?}", other),
        }
        let page = fs::read_to_string(output.join("hello/index.html"))?;
        assert_eq!("post", page);
        Ok(())
    }

    #[test]
    fn test_copy_assets() -> TestResult {
        let dir = tempfile::tempdir()?;
        let assets = dir.path().join("static");
        fs::create_dir_all(assets.join("css"))?;
        fs::write(assets.join("css/site.css"), "body {}")?;
        fs::write(assets.join("logo.svg"), "<svg/>")?;
        let output = dir.path().join("out");

        assert_eq!(2, copy_assets(&assets, &output)?);
        assert_eq!(
            "body {}",
            fs::read_to_string(output.join("static/css/site.css"))?
        );
        assert!(output.join("static/logo.svg").is_file());
        Ok(())
    }
}
