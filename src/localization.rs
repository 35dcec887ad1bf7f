// Localized message payloads for script-raised errors and reports
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default locale used when no better match exists.
pub const DEFAULT_LOCALE: &str = "en";

/// A user-facing message that is either a plain string or a map from locale
/// code to text. Scripts may pass either form to `error(...)` / `report(...)`.
///
/// Resolution policy: exact tag -> language-only tag -> default locale ->
/// any available entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedString {
    Plain(String),
    Localized(BTreeMap<String, String>),
}

impl LocalizedString {
    pub fn plain(text: impl Into<String>) -> Self {
        LocalizedString::Plain(text.into())
    }

    /// Resolve the message for a locale tag such as `en`, `zh` or `zh-CN`.
    pub fn get(&self, locale: &str) -> &str {
        match self {
            LocalizedString::Plain(text) => text,
            LocalizedString::Localized(map) => {
                if let Some(text) = map.get(locale) {
                    return text;
                }
                let language = language_of(locale);
                if let Some((_, text)) = map.iter().find(|(key, _)| language_of(key) == language) {
                    return text;
                }
                if let Some(text) = map.get(DEFAULT_LOCALE) {
                    return text;
                }
                map.values().next().map(String::as_str).unwrap_or("")
            }
        }
    }

    /// Resolve for the default locale.
    pub fn default_text(&self) -> &str {
        self.get(DEFAULT_LOCALE)
    }

    pub fn is_empty(&self) -> bool {
        match self {
            LocalizedString::Plain(text) => text.is_empty(),
            LocalizedString::Localized(map) => map.values().all(|text| text.is_empty()),
        }
    }
}

fn language_of(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

impl From<&str> for LocalizedString {
    fn from(text: &str) -> Self {
        LocalizedString::Plain(text.to_string())
    }
}

impl From<String> for LocalizedString {
    fn from(text: String) -> Self {
        LocalizedString::Plain(text)
    }
}

impl fmt::Display for LocalizedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LocalizedString {
        let mut map = BTreeMap::new();
        map.insert("en".to_string(), "Could not remove all entries.".to_string());
        map.insert("zh".to_string(), "不能删除所有条目。".to_string());
        LocalizedString::Localized(map)
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(sample().get("zh"), "不能删除所有条目。");
    }

    #[test]
    fn test_language_only_fallback() {
        assert_eq!(sample().get("zh-CN"), "不能删除所有条目。");
    }

    #[test]
    fn test_default_locale_fallback() {
        assert_eq!(sample().get("ko"), "Could not remove all entries.");
    }

    #[test]
    fn test_plain_ignores_locale() {
        let message = LocalizedString::plain("no samples found");
        assert_eq!(message.get("ja"), "no samples found");
    }

    #[test]
    fn test_untagged_deserialization() {
        let plain: LocalizedString = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(plain, LocalizedString::plain("hello"));

        let localized: LocalizedString =
            serde_json::from_str(r#"{"en": "hello", "ja": "こんにちは"}"#).unwrap();
        assert_eq!(localized.get("ja"), "こんにちは");
    }
}
