//! Terminal color-code handling for plain-text log sinks.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static SGR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("SGR pattern is valid"));

/// Remove SGR (color/style) escape sequences, leaving all other text intact.
pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    SGR_RE.replace_all(text, "")
}
