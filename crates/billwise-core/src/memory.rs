//! Decision memory
//!
//! Remembers reviewed category decisions by normalized description so the
//! same merchant next month is suggested from memory instead of the
//! classification service. Memory only supplies the suggestion; the reviewer
//! still sees every item.
//!
//! Lookups try the exact normalized description first, then the most similar
//! remembered description scoring at least the configured threshold.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::export::write_atomic;
use crate::models::CategorizedRecord;

/// A remembered decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Taxonomy key
    pub category: String,
    /// Description as last seen, before normalization
    pub example: String,
    /// How many reviewed records agreed on this entry
    pub hits: u32,
}

/// Default minimum similarity for a near match
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// A memory hit for a description
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryMatch<'a> {
    /// Taxonomy key
    pub category: &'a str,
    /// The remembered description that matched
    pub example: &'a str,
    /// Similarity in 0..=1; 1.0 for an exact hit
    pub score: f64,
    /// Same normalized description
    pub exact: bool,
}

/// Normalized description to category key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMemory {
    entries: BTreeMap<String, MemoryEntry>,
    #[serde(skip, default = "default_threshold")]
    threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

impl Default for DecisionMemory {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl DecisionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum similarity for a near match; 1.0 disables near matches
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Load from a JSON file; a missing file is an empty memory
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No decision memory yet");
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let memory: DecisionMemory = serde_json::from_str(&content)?;
        debug!(path = %path.display(), entries = memory.len(), "Loaded decision memory");
        Ok(memory)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Category remembered for a description, exact or near
    ///
    /// Among near matches the highest score wins, then the entry with more
    /// hits.
    pub fn lookup(&self, description: &str) -> Option<MemoryMatch<'_>> {
        let key = normalize_description(description);
        if key.is_empty() {
            return None;
        }
        if let Some(entry) = self.entries.get(&key) {
            return Some(MemoryMatch {
                category: &entry.category,
                example: &entry.example,
                score: 1.0,
                exact: true,
            });
        }
        if self.threshold >= 1.0 {
            return None;
        }

        let mut best: Option<(f64, &MemoryEntry)> = None;
        for (remembered, entry) in &self.entries {
            let score = similarity(&key, remembered);
            if score < self.threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_score, best_entry)) => {
                    score > best_score || (score == best_score && entry.hits > best_entry.hits)
                }
            };
            if better {
                best = Some((score, entry));
            }
        }

        best.map(|(score, entry)| {
            debug!(description, example = %entry.example, score, "Near match in memory");
            MemoryMatch {
                category: &entry.category,
                example: &entry.example,
                score,
                exact: false,
            }
        })
    }

    /// Record a decision; only human-reviewed records are remembered
    ///
    /// Returns true when the record was stored.
    pub fn remember(&mut self, record: &CategorizedRecord) -> bool {
        if !record.provenance.is_reviewed() {
            return false;
        }
        let key = normalize_description(&record.item.description);
        if key.is_empty() {
            return false;
        }

        let entry = self.entries.entry(key).or_insert_with(|| MemoryEntry {
            category: record.category.key.clone(),
            example: record.item.description.clone(),
            hits: 0,
        });
        if entry.category == record.category.key {
            entry.hits += 1;
        } else {
            // Latest reviewed decision wins
            entry.category = record.category.key.clone();
            entry.hits = 1;
        }
        entry.example = record.item.description.clone();
        true
    }
}

fn company_markers() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"株式会社|有限会社|合同会社|\(株\)|\(有\)|㈱|㈲").expect("valid regex")
    })
}

fn noise() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[・＊※*]+").expect("valid regex"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

/// Canonical form of a merchant description
///
/// Folds full-width ASCII to half-width, strips company-type markers and
/// decorative punctuation, collapses whitespace and lowercases.
pub fn normalize_description(description: &str) -> String {
    let folded: String = description.chars().map(fold_full_width).collect();
    let stripped = company_markers().replace_all(&folded, " ");
    let stripped = noise().replace_all(&stripped, " ");
    whitespace()
        .replace_all(&stripped, " ")
        .trim()
        .to_lowercase()
}

/// Similarity of two normalized descriptions in 0..=1
///
/// The better of a whole-string edit ratio and a token-set ratio, so a
/// remembered merchant still matches when a billing month or branch is
/// appended ("東京ガス 6月分" against "東京ガス").
pub fn similarity(a: &str, b: &str) -> f64 {
    edit_ratio(a, b).max(token_set_ratio(a, b))
}

fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    let common: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    if common.is_empty() {
        return 0.0;
    }

    let join = |rest: Vec<&str>| {
        common
            .iter()
            .copied()
            .chain(rest)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let shared = common.join(" ");
    let with_a = join(tokens_a.difference(&tokens_b).copied().collect());
    let with_b = join(tokens_b.difference(&tokens_a).copied().collect());

    edit_ratio(&shared, &with_a)
        .max(edit_ratio(&shared, &with_b))
        .max(edit_ratio(&with_a, &with_b))
}

/// 1 - levenshtein / longer length, counted in chars
fn edit_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single-row dynamic programming table
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }
    row[b.len()]
}

fn fold_full_width(c: char) -> char {
    match c {
        '\u{3000}' => ' ',
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Provenance, RawLineItem};
    use crate::taxonomy::Taxonomy;
    use chrono::NaiveDate;

    fn record(description: &str, key: &str, provenance: Provenance) -> CategorizedRecord {
        CategorizedRecord {
            item: RawLineItem {
                row: 1,
                date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                description: description.to_string(),
                amount: 100,
                note: None,
            },
            category: Taxonomy::default().get(key).unwrap().clone(),
            provenance,
            suggested: None,
            rationale: None,
        }
    }

    #[test]
    fn test_normalize_description() {
        assert_eq!(normalize_description("株式会社 東京ガス"), "東京ガス");
        assert_eq!(normalize_description("ＡＭＡＺＯＮ．ＣＯ．ＪＰ"), "amazon.co.jp");
        assert_eq!(normalize_description("ヨドバシ・カメラ　※ 新宿"), "ヨドバシ カメラ 新宿");
        assert_eq!(normalize_description("  (株)ローソン  "), "ローソン");
        assert_eq!(normalize_description("※"), "");
    }

    #[test]
    fn test_remember_only_reviewed() {
        let mut memory = DecisionMemory::new();
        assert!(!memory.remember(&record("東京ガス", "utilities", Provenance::AiSuggested)));
        assert!(!memory.remember(&record("東京ガス", "other", Provenance::Unresolved)));
        assert!(memory.is_empty());

        assert!(memory.remember(&record("東京ガス", "utilities", Provenance::UserConfirmed)));
        let hit = memory.lookup("株式会社東京ガス").unwrap();
        assert_eq!(hit.category, "utilities");
        assert!(hit.exact);
        assert!(memory.lookup("大阪ガス").is_none());
    }

    #[test]
    fn test_latest_decision_wins() {
        let mut memory = DecisionMemory::new();
        memory.remember(&record("AMAZON", "shopping", Provenance::UserConfirmed));
        memory.remember(&record("AMAZON", "shopping", Provenance::UserConfirmed));
        memory.remember(&record("Amazon", "subscription", Provenance::UserOverridden));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.lookup("amazon").unwrap().category, "subscription");
    }

    #[test]
    fn test_near_match_appended_month() {
        let mut memory = DecisionMemory::new();
        memory.remember(&record("東京ガス", "utilities", Provenance::UserConfirmed));

        let hit = memory.lookup("東京ガス 6月分").unwrap();
        assert_eq!(hit.category, "utilities");
        assert_eq!(hit.example, "東京ガス");
        assert!(!hit.exact);
        assert!(hit.score >= DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_near_match_small_spelling_difference() {
        let mut memory = DecisionMemory::new();
        memory.remember(&record("Seven-Eleven Shinjuku", "convenience_store", Provenance::UserConfirmed));

        let hit = memory.lookup("Seven Eleven Shinjuku").unwrap();
        assert_eq!(hit.category, "convenience_store");
        assert!(hit.score > 0.9 && hit.score < 1.0);
    }

    #[test]
    fn test_near_match_below_threshold_misses() {
        let mut memory = DecisionMemory::new();
        memory.remember(&record("東京ガス", "utilities", Provenance::UserConfirmed));
        assert!(memory.lookup("大阪ガス").is_none());
        assert!(memory.lookup("東京電力").is_none());

        // Same near match as above, but only exact hits allowed
        let memory = memory.with_threshold(1.0);
        assert!(memory.lookup("東京ガス 6月分").is_none());
        assert!(memory.lookup("東京ガス").is_some());
    }

    #[test]
    fn test_near_match_prefers_higher_score() {
        let mut memory = DecisionMemory::new().with_threshold(0.5);
        memory.remember(&record("starbucks coffee", "food", Provenance::UserConfirmed));
        memory.remember(&record("starbucks reserve", "shopping", Provenance::UserConfirmed));

        let hit = memory.lookup("starbucks cofee").unwrap();
        assert_eq!(hit.category, "food");
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("東京ガス", "大阪ガス"), 2);
        assert_eq!(similarity("東京ガス", "大阪ガス"), 0.5);
        assert_eq!(similarity("東京ガス 6月分", "東京ガス"), 1.0);
        assert_eq!(similarity("", "abc"), 0.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        assert!(DecisionMemory::load(&path).unwrap().is_empty());

        let mut memory = DecisionMemory::new();
        memory.remember(&record("東京ガス", "utilities", Provenance::UserConfirmed));
        memory.save(&path).unwrap();

        let loaded = DecisionMemory::load(&path).unwrap();
        assert_eq!(loaded, memory);
    }
}
