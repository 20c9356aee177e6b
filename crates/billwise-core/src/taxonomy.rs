//! Fixed bilingual expense taxonomy
//!
//! The taxonomy is an ordered table of `(key, english, localized)` entries.
//! Order is canonical: aggregation output follows it, and "other" is always
//! the last entry. Free-form category text is only ever accepted after it
//! resolves to one of these entries.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Key of the fallback category
pub const OTHER_KEY: &str = "other";

/// Replies that always mean the fallback, whatever it is named
const OTHER_ALIASES: &[&str] = &[OTHER_KEY, "其他", "other/其他", "其他/other"];

/// Default taxonomy: 12 known categories plus the Other fallback
const DEFAULT_ENTRIES: &[(&str, &str, &str)] = &[
    ("food", "Food", "餐饮"),
    ("transportation", "Transportation", "交通"),
    ("utilities", "Utilities", "公用事业"),
    ("shopping", "Shopping", "购物"),
    ("clothes", "Clothes", "服装"),
    ("subscription", "Subscription", "订阅"),
    ("travel", "Travel", "旅行"),
    ("entertainment", "Entertainment", "娱乐"),
    ("healthcare", "Healthcare", "医疗"),
    ("convenience_store", "Convenience Store", "便利店"),
    ("vending_machine", "Vending Machine", "自动售货机"),
    ("movie", "Movie", "电影"),
    (OTHER_KEY, "Other", "其他"),
];

/// A single taxonomy entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryLabel {
    /// Stable machine key (e.g., "utilities")
    pub key: String,
    /// English display name (e.g., "Utilities")
    pub english: String,
    /// Localized display name (e.g., "公用事业")
    pub localized: String,
}

impl CategoryLabel {
    pub fn new(key: &str, english: &str, localized: &str) -> Self {
        Self {
            key: key.to_string(),
            english: english.to_string(),
            localized: localized.to_string(),
        }
    }

    /// The "English/localized" form used in prompts and reports
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.english, self.localized)
    }

    pub fn is_other(&self) -> bool {
        self.key == OTHER_KEY
    }

    fn matches(&self, needle: &str) -> bool {
        let key_form = needle.replace([' ', '-'], "_");
        self.key.eq_ignore_ascii_case(&key_form)
            || self.english.to_lowercase() == needle
            || self.localized.to_lowercase() == needle
            || self.display_name().to_lowercase() == needle
            || format!("{}/{}", self.localized, self.english).to_lowercase() == needle
    }
}

/// Ordered, validated category table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CategoryLabel>", into = "Vec<CategoryLabel>")]
pub struct Taxonomy {
    entries: Vec<CategoryLabel>,
}

impl Taxonomy {
    /// Build a taxonomy from entries
    ///
    /// Keys must be unique and non-empty. An "other" entry is appended when
    /// missing and always moved to the end.
    pub fn from_entries(entries: Vec<CategoryLabel>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut known = Vec::with_capacity(entries.len() + 1);
        let mut other = None;

        for entry in entries {
            let key = entry.key.trim().to_lowercase();
            if key.is_empty() {
                return Err(Error::Config("taxonomy entry with empty key".into()));
            }
            if !seen.insert(key.clone()) {
                return Err(Error::Config(format!("duplicate taxonomy key: {}", key)));
            }
            let entry = CategoryLabel { key, ..entry };
            if entry.is_other() {
                other = Some(entry);
            } else {
                known.push(entry);
            }
        }

        known.push(other.unwrap_or_else(|| CategoryLabel::new(OTHER_KEY, "Other", "其他")));
        Ok(Self { entries: known })
    }

    /// All entries in canonical order (Other last)
    pub fn labels(&self) -> &[CategoryLabel] {
        &self.entries
    }

    /// Entries offered to the classifier (everything but Other)
    pub fn known(&self) -> &[CategoryLabel] {
        &self.entries[..self.entries.len() - 1]
    }

    pub fn other(&self) -> &CategoryLabel {
        // from_entries guarantees a trailing Other entry
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical position of a key
    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&CategoryLabel> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Check that a label belongs to this taxonomy
    pub fn contains(&self, label: &CategoryLabel) -> bool {
        self.entries.iter().any(|e| e == label)
    }

    /// Resolve free text to a taxonomy entry
    ///
    /// Accepts the key, either display name, or the combined "English/localized"
    /// form (either order), case-insensitively. Explicit "Other" resolves to the
    /// fallback entry even when the fallback is configured under another name;
    /// anything else unrecognized is a `TaxonomyViolation`.
    pub fn resolve(&self, text: &str) -> Result<&CategoryLabel> {
        let needle = clean_category_text(text);
        if needle.is_empty() {
            return Err(Error::TaxonomyViolation {
                input: text.to_string(),
            });
        }

        if let Some(entry) = self.entries.iter().find(|e| e.matches(&needle)) {
            return Ok(entry);
        }
        if OTHER_ALIASES.contains(&needle.as_str()) {
            return Ok(self.other());
        }
        Err(Error::TaxonomyViolation {
            input: text.to_string(),
        })
    }

    /// Prompt listing of the known categories, one "- English/localized" per line
    pub fn prompt_list(&self) -> String {
        self.known()
            .iter()
            .map(|e| format!("- {}", e.display_name()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES
                .iter()
                .map(|(k, e, l)| CategoryLabel::new(k, e, l))
                .collect(),
        }
    }
}

impl TryFrom<Vec<CategoryLabel>> for Taxonomy {
    type Error = Error;

    fn try_from(entries: Vec<CategoryLabel>) -> Result<Self> {
        Taxonomy::from_entries(entries)
    }
}

impl From<Taxonomy> for Vec<CategoryLabel> {
    fn from(taxonomy: Taxonomy) -> Self {
        taxonomy.entries
    }
}

/// Strip list bullets, quotes and surrounding whitespace models like to add
fn clean_category_text(text: &str) -> String {
    text.trim()
        .trim_start_matches(['-', '*', '•'])
        .trim()
        .trim_end_matches(['.', '。'])
        .trim_matches(['"', '\'', '`', '「', '」'])
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_twelve_known_plus_other() {
        let t = Taxonomy::default();
        assert_eq!(t.known().len(), 12);
        assert_eq!(t.len(), 13);
        assert!(t.other().is_other());
        assert_eq!(t.labels().last().unwrap().key, OTHER_KEY);
    }

    #[test]
    fn test_resolve_forms() {
        let t = Taxonomy::default();
        assert_eq!(t.resolve("Utilities/公用事业").unwrap().key, "utilities");
        assert_eq!(t.resolve("utilities").unwrap().key, "utilities");
        assert_eq!(t.resolve("公用事业").unwrap().key, "utilities");
        assert_eq!(t.resolve("  FOOD  ").unwrap().key, "food");
        assert_eq!(t.resolve("餐饮/Food").unwrap().key, "food");
        assert_eq!(t.resolve("Convenience Store").unwrap().key, "convenience_store");
        assert_eq!(t.resolve("vending-machine").unwrap().key, "vending_machine");
        assert_eq!(t.resolve("- \"Movie/电影\".").unwrap().key, "movie");
    }

    #[test]
    fn test_resolve_explicit_other() {
        let t = Taxonomy::default();
        assert!(t.resolve("Other").unwrap().is_other());
        assert!(t.resolve("其他").unwrap().is_other());
    }

    #[test]
    fn test_resolve_unknown_is_violation() {
        let t = Taxonomy::default();
        match t.resolve("Snacks") {
            Err(Error::TaxonomyViolation { input }) => assert_eq!(input, "Snacks"),
            other => panic!("expected TaxonomyViolation, got {:?}", other),
        }
        assert!(t.resolve("   ").is_err());
    }

    #[test]
    fn test_from_entries_appends_other_last() {
        let t = Taxonomy::from_entries(vec![
            CategoryLabel::new("other", "Misc", "杂项"),
            CategoryLabel::new("Rent", "Rent", "房租"),
        ])
        .unwrap();
        assert_eq!(t.labels()[0].key, "rent");
        assert_eq!(t.other().english, "Misc");

        let t = Taxonomy::from_entries(vec![CategoryLabel::new("rent", "Rent", "房租")]).unwrap();
        assert_eq!(t.len(), 2);
        assert!(t.other().is_other());
    }

    #[test]
    fn test_renamed_other_still_accepts_explicit_other() {
        let t = Taxonomy::from_entries(vec![
            CategoryLabel::new("other", "Misc", "杂项"),
            CategoryLabel::new("rent", "Rent", "房租"),
        ])
        .unwrap();
        assert!(t.resolve("Other").unwrap().is_other());
        assert!(t.resolve("其他").unwrap().is_other());
        assert!(t.resolve("Other/其他").unwrap().is_other());
        assert!(t.resolve("Misc").unwrap().is_other());
        assert_eq!(t.resolve("rent").unwrap().key, "rent");
        assert!(t.resolve("Food").is_err());
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        let result = Taxonomy::from_entries(vec![
            CategoryLabel::new("food", "Food", "餐饮"),
            CategoryLabel::new("FOOD", "Meals", "饭"),
        ]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_prompt_list_excludes_other() {
        let list = Taxonomy::default().prompt_list();
        assert!(list.starts_with("- Food/餐饮"));
        assert!(list.contains("- Movie/电影"));
        assert!(!list.contains("Other"));
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let json = r#"[{"key":"rent","english":"Rent","localized":"房租"}]"#;
        let t: Taxonomy = serde_json::from_str(json).unwrap();
        assert_eq!(t.len(), 2);

        let dup = r#"[{"key":"a","english":"A","localized":"A"},{"key":"a","english":"B","localized":"B"}]"#;
        assert!(serde_json::from_str::<Taxonomy>(dup).is_err());
    }
}
