//! Defines the [`Frontmatter`] type and the logic for splitting a post
//! source file into its YAML frontmatter and its Markdown body.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

const FENCE: &str = "---";
const END_FENCE_ALT: &str = "...";

/// The validated metadata of a post.
#[derive(Clone, Debug, PartialEq)]
pub struct Frontmatter {
    /// The title of the post.
    pub title: String,

    /// The publication date of the post.
    pub date: DateTime<FixedOffset>,

    /// The tags associated with the post, in the order they were written.
    pub tags: Vec<String>,

    /// Drafts get a page of their own but never appear in indexes or feeds.
    pub draft: bool,

    /// An explicit slug, overriding the one derived from the file name.
    pub slug: Option<String>,

    /// An explicit excerpt (Markdown), overriding the derived one.
    pub excerpt: Option<String>,

    /// Every field not listed above. These are handed to templates as-is.
    pub extra: BTreeMap<String, Value>,
}

#[derive(Deserialize, Default)]
struct RawFrontmatter {
    #[serde(default, alias = "Title")]
    title: Option<Value>,

    #[serde(default, alias = "Date")]
    date: Option<Value>,

    #[serde(default, alias = "Tags")]
    tags: Option<Value>,

    #[serde(default, alias = "Draft")]
    draft: Option<Value>,

    #[serde(default, alias = "Slug")]
    slug: Option<Value>,

    #[serde(default, alias = "Excerpt")]
    excerpt: Option<Value>,

    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl Frontmatter {
    /// Parses a post source file. Each post file must be structured as
    /// follows:
    ///
    /// 1. Initial frontmatter fence (`---`) on the first line
    /// 2. YAML frontmatter with fields `title`, `date`, and optionally
    ///    `tags`, `draft`, `slug` and `excerpt`
    /// 3. Terminal frontmatter fence (`---` or `...`) on a line of its own
    /// 4. Post body
    ///
    /// For example:
    ///
    /// ```md
    /// ---
    /// title: Hello, world!
    /// date: 2021-04-16
    /// tags: [greet]
    /// ---
    /// # Hello
    ///
    /// World
    /// ```
    ///
    /// Returns the frontmatter and the body.
    pub fn parse(input: &str) -> Result<(Frontmatter, &str)> {
        let (yaml, body) = split(input)?;
        let raw: RawFrontmatter = if yaml.trim().is_empty() {
            RawFrontmatter::default()
        } else {
            serde_yaml::from_str(yaml)?
        };

        let title = string_field("title", raw.title)?
            .ok_or(Error::MissingField("title"))?;
        if title.trim().is_empty() {
            return Err(invalid("title", "must not be empty"));
        }

        let date = match string_field("date", raw.date)? {
            None => return Err(Error::MissingField("date")),
            Some(raw_date) => parse_date(&raw_date).ok_or_else(|| {
                invalid(
                    "date",
                    format!(
                        "`{}` is not a date (expected YYYY-MM-DD, \
                         YYYY-MM-DD HH:MM[:SS] or RFC 3339)",
                        raw_date
                    ),
                )
            })?,
        };

        Ok((
            Frontmatter {
                title,
                date,
                tags: tags_field(raw.tags)?,
                draft: match raw.draft {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(draft)) => draft,
                    Some(_) => {
                        return Err(invalid("draft", "expected a boolean"))
                    }
                },
                slug: string_field("slug", raw.slug)?,
                excerpt: string_field("excerpt", raw.excerpt)?,
                extra: raw.extra,
            },
            body,
        ))
    }
}

/// Splits `input` into its YAML frontmatter and its body.
pub fn split(input: &str) -> Result<(&str, &str)> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut lines = input.split_inclusive('\n');

    match lines.next() {
        Some(first) if first.trim_end() == FENCE => {
            let yaml_start = first.len();
            let mut offset = yaml_start;
            for line in lines {
                let trimmed = line.trim_end();
                if trimmed == FENCE || trimmed == END_FENCE_ALT {
                    return Ok((
                        &input[yaml_start..offset],
                        &input[offset + line.len()..],
                    ));
                }
                offset += line.len();
            }
            Err(Error::MissingEndFence)
        }
        _ => Err(Error::MissingStartFence),
    }
}

/// Parses a frontmatter date. Dates without an offset are taken to be UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date);
    }
    for format in DATETIME_FORMATS.iter() {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(utc(naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(utc)
}

fn utc(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).into()
}

fn string_field(
    field: &'static str,
    value: Option<Value>,
) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(invalid(field, "expected a string")),
    }
}

// Tags may be a YAML sequence or a single comma-separated string.
fn tags_field(value: Option<Value>) -> Result<Vec<String>> {
    let tags = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s.split(',').map(str::to_owned).collect(),
        Some(Value::Sequence(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                _ => Err(invalid("tags", "expected a list of strings")),
            })
            .collect::<Result<Vec<String>>>()?,
        Some(_) => return Err(invalid("tags", "expected a list of strings")),
    };

    Ok(tags
        .into_iter()
        .map(|tag| tag.trim().to_owned())
        .filter(|tag| !tag.is_empty())
        .collect())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidField {
        field,
        reason: reason.into(),
    }
}

/// Represents the result of a frontmatter-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a post's frontmatter.
#[derive(Debug)]
pub enum Error {
    /// Returned when a post source file doesn't begin with a frontmatter
    /// fence (`---`).
    MissingStartFence,

    /// Returned when the starting fence was found but the terminal one was
    /// missing.
    MissingEndFence,

    /// Returned when the frontmatter isn't valid YAML (or isn't a mapping).
    Malformed(serde_yaml::Error),

    /// Returned when a required field is absent.
    MissingField(&'static str),

    /// Returned when a field is present but its value is unusable.
    InvalidField { field: &'static str, reason: String },
}

impl Error {
    /// The name of the offending field, if the error concerns one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Error::MissingField(field) => Some(*field),
            Error::InvalidField { field, .. } => Some(*field),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MissingStartFence => {
                write!(f, "post must begin with a `---` line")
            }
            Error::MissingEndFence => {
                write!(f, "missing closing `---` after the frontmatter")
            }
            Error::Malformed(err) => {
                write!(f, "malformed frontmatter: {}", err)
            }
            Error::MissingField(field) => {
                write!(f, "missing required field `{}`", field)
            }
            Error::InvalidField { field, reason } => {
                write!(f, "invalid field `{}`: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::Malformed(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(y, m, d, 0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse() {
        let (matter, body) = Frontmatter::parse(
            "---\ntitle: Hello\ndate: 2024-01-01\ntags: [intro, meta]\n\
             ---\n# Hi\n",
        )
        .unwrap();
        assert_eq!("Hello", matter.title);
        assert_eq!(date(2024, 1, 1), matter.date);
        assert_eq!(vec!["intro", "meta"], matter.tags);
        assert!(!matter.draft);
        assert_eq!(None, matter.slug);
        assert!(matter.extra.is_empty());
        assert_eq!("# Hi\n", body);
    }

    #[test]
    fn test_capitalized_aliases() {
        let (matter, _) = Frontmatter::parse(
            "---\nTitle: Old\nDate: 2021-04-16\nTags: [x]\n---\n",
        )
        .unwrap();
        assert_eq!("Old", matter.title);
        assert_eq!(vec!["x"], matter.tags);
    }

    #[test]
    fn test_optional_fields() {
        let (matter, _) = Frontmatter::parse(
            "---\ntitle: T\ndate: 2024-01-01\ndraft: true\nslug: custom\n\
             excerpt: Short *one*\ntags: a, b ,\n---\n",
        )
        .unwrap();
        assert!(matter.draft);
        assert_eq!(Some("custom".to_owned()), matter.slug);
        assert_eq!(Some("Short *one*".to_owned()), matter.excerpt);
        assert_eq!(vec!["a", "b"], matter.tags);
    }

    #[test]
    fn test_unrecognized_fields_pass_through() {
        let (matter, _) = Frontmatter::parse(
            "---\ntitle: T\ndate: 2024-01-01\nauthor: Ada\n\
             cover:\n  src: a.png\n---\n",
        )
        .unwrap();
        assert_eq!(
            Some(&Value::String("Ada".to_owned())),
            matter.extra.get("author")
        );
        assert!(matter.extra.get("cover").unwrap().as_mapping().is_some());
        assert!(!matter.extra.contains_key("title"));
    }

    #[test]
    fn test_missing_title() {
        let err =
            Frontmatter::parse("---\ndate: 2024-01-01\n---\n").unwrap_err();
        assert_eq!(Some("title"), err.field());
    }

    #[test]
    fn test_missing_date() {
        let err = Frontmatter::parse("---\ntitle: T\n---\n").unwrap_err();
        assert_eq!(Some("date"), err.field());
    }

    #[test]
    fn test_invalid_date() {
        let err = Frontmatter::parse("---\ntitle: T\ndate: yesterday\n---\n")
            .unwrap_err();
        assert_eq!(Some("date"), err.field());
    }

    #[test]
    fn test_invalid_draft() {
        let err = Frontmatter::parse(
            "---\ntitle: T\ndate: 2024-01-01\ndraft: maybe\n---\n",
        )
        .unwrap_err();
        assert_eq!(Some("draft"), err.field());
    }

    #[test]
    fn test_empty_frontmatter() {
        let err = Frontmatter::parse("---\n---\nbody").unwrap_err();
        assert_eq!(Some("title"), err.field());
    }

    #[test]
    fn test_malformed_yaml() {
        let source = "---\ntitle: [unclosed\ndate: 2024-01-01\n---\n";
        match Frontmatter::parse(source) {
            Err(Error::Malformed(_)) => {}
            other => panic!("wanted Error::Malformed; found {:?}", other),
        }
    }

    #[test]
    fn test_fences() {
        assert!(matches!(
            Frontmatter::parse("title: T\n"),
            Err(Error::MissingStartFence)
        ));
        assert!(matches!(
            Frontmatter::parse("---\ntitle: T\n"),
            Err(Error::MissingEndFence)
        ));
    }

    #[test]
    fn test_split_ignores_inline_dashes() {
        let (yaml, body) =
            split("---\ntitle: a --- b\n...\nbody --- text\n---\n").unwrap();
        assert_eq!("title: a --- b\n", yaml);
        assert_eq!("body --- text\n---\n", body);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(Some(date(2024, 2, 1)), parse_date("2024-02-01"));
        assert_eq!(
            parse_date("2024-02-01T10:30:00Z"),
            parse_date("2024-02-01 10:30")
        );
        assert_eq!(
            "2024-02-01T10:30:00+02:00",
            parse_date("2024-02-01T10:30:00+02:00").unwrap().to_rfc3339()
        );
        assert_eq!(None, parse_date("02/01/2024"));
    }
}
