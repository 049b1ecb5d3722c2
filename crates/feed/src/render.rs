//! Message rendering: template presets, placeholder substitution, and
//! description cleanup (tag stripping, entity decoding, truncation).

use std::sync::LazyLock;

use {regex::Regex, serde::{Deserialize, Serialize}, tracing::warn};

use crate::types::Entry;

const SIMPLE_TEMPLATE: &str = "*{title}*\n\n[Read more]({link})";
const DETAILED_TEMPLATE: &str = "*{title}*\n\n{description}\n\n[Read more]({link})";
const MINIMAL_TEMPLATE: &str = "[{title}]({link})";

const NO_TITLE: &str = "No Title";

/// Descriptions are clipped to this many characters, ellipsis included.
const MAX_DESCRIPTION_CHARS: usize = 300;
const ELLIPSIS: &str = "...";

#[allow(clippy::expect_used)]
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static pattern"));

#[allow(clippy::expect_used)]
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[A-Za-z_][A-Za-z0-9_]*\}").expect("static pattern"));

/// How a feed's entries are formatted for delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "template", rename_all = "camelCase")]
pub enum MessageTemplate {
    Simple,
    #[default]
    Detailed,
    Minimal,
    /// Custom format string with `{title}`, `{link}`, `{description}`
    /// placeholders.
    Custom(String),
}

impl MessageTemplate {
    /// Parse a template name; any string containing a placeholder is
    /// treated as a custom template, unknown names fall back to detailed.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "simple" => Self::Simple,
            "detailed" => Self::Detailed,
            "minimal" => Self::Minimal,
            other if other.contains('{') => Self::Custom(other.to_string()),
            other => {
                warn!(template = other, "unknown template name, using detailed");
                Self::Detailed
            },
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Simple => "simple",
            Self::Detailed => "detailed",
            Self::Minimal => "minimal",
            Self::Custom(_) => "custom",
        }
    }

    fn format_string(&self) -> &str {
        match self {
            Self::Simple => SIMPLE_TEMPLATE,
            Self::Detailed => DETAILED_TEMPLATE,
            Self::Minimal => MINIMAL_TEMPLATE,
            Self::Custom(custom) => custom,
        }
    }
}

/// Render a display message for an entry.
///
/// Only the template's own placeholders are substituted; braces inside
/// entry content pass through untouched. A custom template naming an
/// unknown placeholder falls back to the plain title+link form, which
/// cannot fail for any title/link pair.
#[must_use]
pub fn render(entry: &Entry, template: &MessageTemplate) -> String {
    let title = entry.title.as_deref().unwrap_or(NO_TITLE);
    let link = entry.link.as_deref().unwrap_or("");
    let description = entry
        .summary
        .as_deref()
        .map(clean_description)
        .unwrap_or_default();

    let format = template.format_string();
    let mut rendered = String::with_capacity(format.len());
    let mut tail = 0;

    for placeholder in PLACEHOLDER_RE.find_iter(format) {
        rendered.push_str(&format[tail..placeholder.start()]);
        match placeholder.as_str() {
            "{title}" => rendered.push_str(title),
            "{link}" => rendered.push_str(link),
            "{description}" => rendered.push_str(&description),
            unknown => {
                warn!(
                    placeholder = unknown,
                    "template references unknown placeholder, using fallback"
                );
                return fallback_message(title, link);
            },
        }
        tail = placeholder.end();
    }
    rendered.push_str(&format[tail..]);

    rendered
}

/// Fixed rendering used when a custom template cannot be applied.
fn fallback_message(title: &str, link: &str) -> String {
    format!("*{title}*\n\n[Read more]({link})")
}

/// Strip markup tags, decode HTML entities, and truncate to
/// [`MAX_DESCRIPTION_CHARS`] with a trailing ellipsis.
#[must_use]
pub fn clean_description(raw: &str) -> String {
    let stripped = TAG_RE.replace_all(raw, "");
    let decoded = htmlescape::decode_html(&stripped).unwrap_or_else(|_| stripped.into_owned());
    truncate_chars(&decoded, MAX_DESCRIPTION_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars - ELLIPSIS.len();
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.push_str(ELLIPSIS);
    clipped
}
