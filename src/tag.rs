//! Defines the [`Tag`] type, which represents a [`crate::post::Post`] tag.

use gtmpl::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use url::Url;

/// Represents a [`crate::post::Post`] tag. Two tags are the same tag when
/// their slugs match, so e.g. `macOS` and `MacOS` share an index.
#[derive(Clone, Debug)]
pub struct Tag {
    /// The tag as written in the frontmatter.
    pub name: String,

    /// The slugified name. This is what goes into URLs and file paths.
    pub slug: String,

    /// The URL for the tag's first index page, i.e.
    /// `{base_url}/tags/{slug}/`.
    pub url: Url,
}

impl Tag {
    /// Builds a tag from its frontmatter spelling. Returns `Ok(None)` for
    /// names with nothing URL-safe in them.
    pub fn new(
        name: &str,
        base_url: &Url,
    ) -> Result<Option<Tag>, url::ParseError> {
        let slug = slug::slugify(name);
        if slug.is_empty() {
            return Ok(None);
        }
        Ok(Some(Tag {
            name: name.to_owned(),
            // NOTE: the trailing slash matters. Without it, [`Url::join`]
            // would treat the slug as a file name to be replaced by the
            // next join.
            url: base_url.join(&format!("tags/{}/", slug))?,
            slug,
        }))
    }
}

impl Hash for Tag {
    /// Implements [`Hash`] for [`Tag`] by delegating directly to the `slug`
    /// field.
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slug.hash(state)
    }
}

impl PartialEq for Tag {
    /// Implements [`PartialEq`] and [`Eq`] for [`Tag`] by delegating directly
    /// to the `slug` field.
    fn eq(&self, other: &Self) -> bool {
        self.slug == other.slug
    }
}
impl Eq for Tag {}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.slug.cmp(&other.slug)
    }
}

impl From<&Tag> for Value {
    /// Converts [`Tag`]s into [`Value`]s for templating.
    fn from(t: &Tag) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("name".to_owned(), Value::String(t.name.clone()));
        m.insert("slug".to_owned(), Value::String(t.slug.clone()));
        m.insert("url".to_owned(), Value::String(t.url.to_string()));
        Value::Object(m)
    }
}
