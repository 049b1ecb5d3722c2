//! Transient entry model. Entries live only for the duration of one poll
//! cycle; nothing here is persisted beyond the posted-entry ledger.

use serde::{Deserialize, Serialize};

/// One item from a fetched feed, in feed-provided order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Feed-supplied stable identifier (RSS guid / Atom id), if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Stable identity for deduplication: the feed-native id when present,
/// the link as a fallback, `None` when the entry cannot be deduplicated
/// safely and must be skipped.
#[must_use]
pub fn entry_id(entry: &Entry) -> Option<&str> {
    match entry.id.as_deref() {
        Some(id) if !id.is_empty() => Some(id),
        _ => match entry.link.as_deref() {
            Some(link) if !link.is_empty() => Some(link),
            _ => None,
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: Option<&str>, link: Option<&str>) -> Entry {
        Entry {
            id: id.map(Into::into),
            link: link.map(Into::into),
            ..Entry::default()
        }
    }

    #[test]
    fn test_identity_prefers_native_id() {
        let e = entry(Some("guid-1"), Some("http://a"));
        assert_eq!(entry_id(&e), Some("guid-1"));
    }

    #[test]
    fn test_identity_falls_back_to_link() {
        let e = entry(None, Some("http://a"));
        assert_eq!(entry_id(&e), Some("http://a"));
    }

    #[test]
    fn test_empty_id_falls_back_to_link() {
        let e = entry(Some(""), Some("http://a"));
        assert_eq!(entry_id(&e), Some("http://a"));
    }

    #[test]
    fn test_no_id_no_link_is_unidentifiable() {
        assert_eq!(entry_id(&entry(None, None)), None);
        assert_eq!(entry_id(&entry(Some(""), Some(""))), None);
    }
}
