//! Resolves link targets found in post bodies into absolute URLs. A
//! relative link that is correct on a rendered page is broken in a feed
//! reader, so every feed variant of a post goes through a [`Resolver`].

use url::{ParseError, Url};

pub struct Resolver {
    base: Url,
}

impl Resolver {
    /// Constructs a new `Resolver`
    ///
    /// # Arguments
    ///
    /// * `site_url` - the base URL of the site; must end in a trailing slash.
    /// * `page` - the path of the page the links appear on, relative to
    ///   `site_url` (e.g., `hello/` for the post whose slug is `hello`).
    pub fn new(site_url: &Url, page: &str) -> Result<Resolver> {
        Ok(Resolver {
            base: site_url.join(page)?,
        })
    }

    /// The absolute URL of the page the links appear on.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolves `target` the way a browser would from the page: absolute
    /// URLs (including `mailto:` and friends) come back unchanged,
    /// root-relative paths resolve against the site's origin, and everything
    /// else (including bare fragments) against the page itself.
    pub fn resolve(&self, target: &str) -> Result<String> {
        match Url::parse(target) {
            Ok(_) => Ok(target.to_owned()),
            Err(ParseError::RelativeUrlWithoutBase) => {
                Ok(self.base.join(target)?.to_string())
            }
            Err(e) => Err(e),
        }
    }
}

type Result<T> = std::result::Result<T, ParseError>;
