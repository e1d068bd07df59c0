//! Loads the post and index [`Templates`] and renders template values with
//! them. Templates are Go-style templates ([`gtmpl`]).

use crate::config::ThemeFiles;
use gtmpl::{Template, Value};
use std::fmt;
use std::path::{Path, PathBuf};

const DEFAULT_POST_TEMPLATE: &str = include_str!("theme/post.html");
const DEFAULT_INDEX_TEMPLATE: &str = include_str!("theme/index.html");

/// The parsed templates of a theme.
pub struct Templates {
    /// Renders `{slug}/index.html` pages.
    pub post: Template,

    /// Renders main and tag index pages.
    pub index: Template,
}

impl Templates {
    /// Loads the templates listed by `theme`, or the built-in ones if there
    /// is no theme.
    pub fn load(theme: Option<&ThemeFiles>) -> Result<Templates> {
        match theme {
            Some(theme) => Ok(Templates {
                post: parse_files("post", &theme.post_template)?,
                index: parse_files("index", &theme.index_template)?,
            }),
            None => Templates::builtin(),
        }
    }

    /// The built-in templates.
    pub fn builtin() -> Result<Templates> {
        Ok(Templates {
            post: parse("post", DEFAULT_POST_TEMPLATE)?,
            index: parse("index", DEFAULT_INDEX_TEMPLATE)?,
        })
    }
}

/// Renders `value` with `template`.
pub fn render(
    template: &Template,
    value: Value,
) -> std::result::Result<Vec<u8>, String> {
    let context = gtmpl::Context::from(value).map_err(|err| err.to_string())?;
    let mut out = Vec::new();
    template
        .execute(&mut out, &context)
        .map_err(|err| err.to_string())?;
    Ok(out)
}

// Loads the template file contents, separated by spaces, and parses the
// result into a single template. Earlier files can hold `{{define}}`s for
// later ones.
fn parse_files(name: &'static str, files: &[PathBuf]) -> Result<Template> {
    let mut contents = String::new();
    for path in files {
        contents.push_str(&read(path)?);
        contents.push(' ');
    }
    parse(name, &contents)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| Error::Open {
        path: path.to_owned(),
        err,
    })
}

fn parse(name: &'static str, contents: &str) -> Result<Template> {
    let mut template = Template::default();
    template
        .parse(contents)
        .map_err(|err| Error::Parse {
            name,
            message: err.to_string(),
        })?;
    Ok(template)
}

/// The result of loading templates.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading templates.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while opening template files.
    Open { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing template files.
    Parse { name: &'static str, message: String },
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Open { path, err } => {
                write!(f, "opening template file `{}`: {}", path.display(), err)
            }
            Error::Parse { name, message } => {
                write!(f, "parsing {} template: {}", name, message)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Open { err, .. } => Some(err),
            Error::Parse { .. } => None,
        }
    }
}
