//! Syntax highlighting for fenced code blocks.

use syntect::{
    highlighting::{Theme, ThemeSet},
    html::highlighted_html_for_string,
    parsing::SyntaxSet,
};

pub struct Highlighter {
    syntaxes: SyntaxSet,
    theme: Theme,
}

impl Highlighter {
    /// Loads the bundled syntax definitions and the named theme from the
    /// default `syntect` theme set. Returns `None` if no theme of that name
    /// exists.
    pub fn new(theme_name: &str) -> Option<Self> {
        let syntaxes = SyntaxSet::load_defaults_newlines();

        // `remove()` hands us an owned `Theme`; the rest of the set is not
        // needed.
        let theme = ThemeSet::load_defaults().themes.remove(theme_name)?;

        Some(Self { syntaxes, theme })
    }

    /// Highlights `code` as HTML with inline styles. If no language is
    /// given or no syntax matches it, the code is highlighted as plain text.
    pub fn highlight(
        &self,
        code: &str,
        language: Option<&str>,
    ) -> Result<String, syntect::Error> {
        let syntax = language
            .and_then(|lang| self.syntaxes.find_syntax_by_token(lang))
            .unwrap_or_else(|| self.syntaxes.find_syntax_plain_text());

        highlighted_html_for_string(code, &self.syntaxes, syntax, &self.theme)
    }
}
