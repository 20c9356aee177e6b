//! Categorization engine
//!
//! Each pending line item goes through the same state machine:
//!
//! ```text
//! NEW -> SUGGESTED -> { CONFIRMED | OVERRIDDEN | UNRESOLVED }
//! ```
//!
//! The classification service (or decision memory) proposes a category that is
//! always resolved against the taxonomy, then a [`Reviewer`] decides. Items are
//! processed strictly in order, one service call at a time. A service failure
//! only affects its own item, which ends up unresolved.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::{ClassificationRequest, ClassificationService};
use crate::error::Error;
use crate::memory::DecisionMemory;
use crate::models::{CategorizedRecord, LedgerEntry, Provenance, RawLineItem};
use crate::taxonomy::{CategoryLabel, Taxonomy};

/// Where a proposal came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalSource {
    Service,
    Memory,
}

/// A resolved category suggestion awaiting review
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub category: CategoryLabel,
    /// Text as returned by the service (or the remembered key)
    pub raw: String,
    pub rationale: Option<String>,
    pub source: ProposalSource,
    /// The raw text matched no taxonomy entry and fell back to Other
    pub fallback: bool,
}

/// Reviewer verdict on a proposal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    /// Keep the proposed category
    Accept,
    /// Use this category text instead; empty text means no category
    Replace(String),
    /// Reject without a replacement
    Reject,
    /// Leave the proposal unreviewed for a later run
    Defer,
}

/// Human (or scripted) review of each proposal
pub trait Reviewer {
    fn review(&mut self, item: &RawLineItem, proposal: &Proposal) -> ReviewDecision;
}

/// Accepts every proposal
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl Reviewer for AcceptAll {
    fn review(&mut self, _item: &RawLineItem, _proposal: &Proposal) -> ReviewDecision {
        ReviewDecision::Accept
    }
}

/// Defers every proposal (unattended runs)
#[derive(Debug, Default, Clone, Copy)]
pub struct DeferAll;

impl Reviewer for DeferAll {
    fn review(&mut self, _item: &RawLineItem, _proposal: &Proposal) -> ReviewDecision {
        ReviewDecision::Defer
    }
}

/// Reviewer backed by a closure
pub struct FnReviewer<F>(pub F);

impl<F> Reviewer for FnReviewer<F>
where
    F: FnMut(&RawLineItem, &Proposal) -> ReviewDecision,
{
    fn review(&mut self, item: &RawLineItem, proposal: &Proposal) -> ReviewDecision {
        (self.0)(item, proposal)
    }
}

/// Counters for one categorization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyStats {
    /// Items that went through the state machine
    pub processed: usize,
    /// Already reviewed, left untouched
    pub skipped: usize,
    /// Classification service calls made
    pub queried: usize,
    /// Proposals taken from decision memory
    pub from_memory: usize,
    pub confirmed: usize,
    pub overridden: usize,
    pub unresolved: usize,
    pub deferred: usize,
    pub service_failures: usize,
    /// Category texts that matched nothing and became Other
    pub taxonomy_fallbacks: usize,
}

/// Records in input order plus run counters
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyOutcome {
    pub records: Vec<CategorizedRecord>,
    pub stats: ClassifyStats,
}

impl ClassifyOutcome {
    /// Records still needing a human decision
    pub fn pending_review(&self) -> usize {
        self.records
            .iter()
            .filter(|r| !r.provenance.is_reviewed())
            .count()
    }
}

/// Drives classification and review over a ledger
pub struct Categorizer<'a, C: ClassificationService + ?Sized> {
    service: &'a C,
    taxonomy: &'a Taxonomy,
    memory: Option<&'a mut DecisionMemory>,
}

impl<'a, C: ClassificationService + ?Sized> Categorizer<'a, C> {
    pub fn new(service: &'a C, taxonomy: &'a Taxonomy) -> Self {
        Self {
            service,
            taxonomy,
            memory: None,
        }
    }

    /// Consult and update a decision memory during the run
    pub fn with_memory(mut self, memory: &'a mut DecisionMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Categorize raw line items
    pub async fn classify_items<R: Reviewer + ?Sized>(
        &mut self,
        items: Vec<RawLineItem>,
        reviewer: &mut R,
    ) -> ClassifyOutcome {
        let entries = items.into_iter().map(LedgerEntry::Pending).collect();
        self.classify(entries, reviewer).await
    }

    /// Categorize a ledger
    ///
    /// Reviewed records (confirmed or overridden) pass through untouched with
    /// no service call. New, ai-suggested and unresolved records are
    /// (re)processed. Never fails as a whole.
    pub async fn classify<R: Reviewer + ?Sized>(
        &mut self,
        entries: Vec<LedgerEntry>,
        reviewer: &mut R,
    ) -> ClassifyOutcome {
        let mut stats = ClassifyStats::default();
        let mut records = Vec::with_capacity(entries.len());
        let total = entries.len();

        for (index, entry) in entries.into_iter().enumerate() {
            let item = match entry {
                LedgerEntry::Categorized(record) if record.provenance.is_reviewed() => {
                    stats.skipped += 1;
                    records.push(record);
                    continue;
                }
                LedgerEntry::Categorized(record) => record.item,
                LedgerEntry::Pending(item) => item,
            };

            debug!(item = %item.id(), "Processing {}/{}: {}", index + 1, total, item.description);
            stats.processed += 1;
            let record = self.process(item, reviewer, &mut stats).await;
            records.push(record);
        }

        info!(
            processed = stats.processed,
            skipped = stats.skipped,
            unresolved = stats.unresolved,
            service_failures = stats.service_failures,
            "Categorization finished"
        );

        ClassifyOutcome { records, stats }
    }

    async fn process<R: Reviewer + ?Sized>(
        &mut self,
        item: RawLineItem,
        reviewer: &mut R,
        stats: &mut ClassifyStats,
    ) -> CategorizedRecord {
        let proposal = match self.remembered(&item) {
            Some(proposal) => {
                stats.from_memory += 1;
                proposal
            }
            None => {
                stats.queried += 1;
                match self.query(&item).await {
                    Ok(proposal) => proposal,
                    Err(err) => {
                        warn!(item = %item.id(), error = %err, "Classification failed; marking unresolved");
                        stats.service_failures += 1;
                        stats.unresolved += 1;
                        return CategorizedRecord {
                            item,
                            category: self.taxonomy.other().clone(),
                            provenance: Provenance::Unresolved,
                            suggested: None,
                            rationale: None,
                        };
                    }
                }
            }
        };
        if proposal.fallback {
            stats.taxonomy_fallbacks += 1;
        }

        let decision = reviewer.review(&item, &proposal);
        let (category, provenance) = match decision {
            ReviewDecision::Accept => (proposal.category.clone(), Provenance::UserConfirmed),
            ReviewDecision::Replace(text) if text.trim().is_empty() => {
                (self.taxonomy.other().clone(), Provenance::Unresolved)
            }
            ReviewDecision::Replace(text) => {
                let label = self.resolve_or_other(&item, &text, stats);
                (label, Provenance::UserOverridden)
            }
            ReviewDecision::Reject => (self.taxonomy.other().clone(), Provenance::Unresolved),
            ReviewDecision::Defer => (proposal.category.clone(), Provenance::AiSuggested),
        };

        match provenance {
            Provenance::UserConfirmed => stats.confirmed += 1,
            Provenance::UserOverridden => stats.overridden += 1,
            Provenance::Unresolved => stats.unresolved += 1,
            Provenance::AiSuggested => stats.deferred += 1,
        }

        debug!(item = %item.id(), category = %category.key, provenance = %provenance, "Reviewed");

        let record = CategorizedRecord {
            item,
            category,
            provenance,
            suggested: Some(proposal.raw),
            rationale: proposal.rationale,
        };

        if let Some(memory) = self.memory.as_deref_mut() {
            memory.remember(&record);
        }

        record
    }

    fn remembered(&self, item: &RawLineItem) -> Option<Proposal> {
        let hit = self.memory.as_deref()?.lookup(&item.description)?;
        let category = self.taxonomy.get(hit.category)?.clone();
        debug!(item = %item.id(), category = %hit.category, score = hit.score, "Suggestion from memory");
        let rationale = if hit.exact {
            "previous decision".to_string()
        } else {
            format!(
                "similar to previous decision for '{}' (similarity {:.2})",
                hit.example, hit.score
            )
        };
        Some(Proposal {
            raw: category.display_name(),
            category,
            rationale: Some(rationale),
            source: ProposalSource::Memory,
            fallback: false,
        })
    }

    async fn query(&self, item: &RawLineItem) -> Result<Proposal, Error> {
        let request = ClassificationRequest {
            description: item.description.clone(),
            note: item.note.clone(),
            taxonomy: self.taxonomy.known().to_vec(),
        };

        let suggestion = self
            .service
            .suggest_category(&request)
            .await
            .map_err(|source| Error::ClassificationService {
                item: item.id(),
                source,
            })?;

        let (category, fallback) = match self.taxonomy.resolve(&suggestion.category) {
            Ok(label) => (label.clone(), false),
            Err(err) => {
                warn!(item = %item.id(), error = %err, "Suggestion outside taxonomy; using Other");
                (self.taxonomy.other().clone(), true)
            }
        };

        Ok(Proposal {
            category,
            raw: suggestion.category,
            rationale: suggestion.rationale,
            source: ProposalSource::Service,
            fallback,
        })
    }

    fn resolve_or_other(
        &self,
        item: &RawLineItem,
        text: &str,
        stats: &mut ClassifyStats,
    ) -> CategoryLabel {
        match self.taxonomy.resolve(text) {
            Ok(label) => label.clone(),
            Err(err) => {
                warn!(item = %item.id(), error = %err, "Replacement outside taxonomy; using Other");
                stats.taxonomy_fallbacks += 1;
                self.taxonomy.other().clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use chrono::NaiveDate;

    fn item(row: usize, description: &str, amount: i64) -> RawLineItem {
        RawLineItem {
            row,
            date: NaiveDate::from_ymd_opt(2025, 5, 14).unwrap(),
            description: description.to_string(),
            amount,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_accept_confirms_suggestion() {
        let mock = MockBackend::new();
        let taxonomy = Taxonomy::default();
        let mut categorizer = Categorizer::new(&mock, &taxonomy);

        let outcome = categorizer
            .classify_items(vec![item(1, "東京ガス", 9232)], &mut AcceptAll)
            .await;

        let record = &outcome.records[0];
        assert_eq!(record.category.key, "utilities");
        assert_eq!(record.provenance, Provenance::UserConfirmed);
        assert_eq!(record.suggested.as_deref(), Some("Utilities/公用事业"));
        assert_eq!(outcome.stats.confirmed, 1);
        assert_eq!(outcome.stats.queried, 1);
    }

    #[tokio::test]
    async fn test_replace_decisions() {
        let mock = MockBackend::new();
        let taxonomy = Taxonomy::default();
        let mut categorizer = Categorizer::new(&mock, &taxonomy);

        let mut reviewer = FnReviewer(|item: &RawLineItem, _: &Proposal| match item.row {
            1 => ReviewDecision::Replace("Travel/旅行".into()),
            2 => ReviewDecision::Replace("Other".into()),
            3 => ReviewDecision::Replace("Snacks".into()),
            4 => ReviewDecision::Replace("  ".into()),
            _ => ReviewDecision::Reject,
        });

        let items = (1..=5).map(|row| item(row, "東京ガス", 100)).collect();
        let outcome = categorizer.classify_items(items, &mut reviewer).await;
        let r = &outcome.records;

        assert_eq!(r[0].category.key, "travel");
        assert_eq!(r[0].provenance, Provenance::UserOverridden);
        assert!(r[1].category.is_other());
        assert_eq!(r[1].provenance, Provenance::UserOverridden);
        assert!(r[2].category.is_other());
        assert_eq!(r[2].provenance, Provenance::UserOverridden);
        assert!(r[3].category.is_other());
        assert_eq!(r[3].provenance, Provenance::Unresolved);
        assert_eq!(r[4].provenance, Provenance::Unresolved);

        assert_eq!(outcome.stats.overridden, 3);
        assert_eq!(outcome.stats.unresolved, 2);
        assert_eq!(outcome.stats.taxonomy_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_unknown_suggestion_falls_back_to_other() {
        let mock = MockBackend::new().with_rule("おやつ", "Snacks");
        let taxonomy = Taxonomy::default();
        let mut categorizer = Categorizer::new(&mock, &taxonomy);

        let mut seen = None;
        let mut reviewer = FnReviewer(|_: &RawLineItem, p: &Proposal| {
            seen = Some(p.clone());
            ReviewDecision::Accept
        });
        let outcome = categorizer
            .classify_items(vec![item(1, "おやつ", 300)], &mut reviewer)
            .await;

        let proposal = seen.unwrap();
        assert!(proposal.fallback);
        assert_eq!(proposal.raw, "Snacks");
        assert!(outcome.records[0].category.is_other());
        assert_eq!(outcome.stats.taxonomy_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_defer_leaves_suggestion_unreviewed() {
        let mock = MockBackend::new();
        let taxonomy = Taxonomy::default();
        let mut categorizer = Categorizer::new(&mock, &taxonomy);

        let outcome = categorizer
            .classify_items(vec![item(1, "ローソン", 150)], &mut DeferAll)
            .await;
        assert_eq!(outcome.records[0].provenance, Provenance::AiSuggested);
        assert_eq!(outcome.records[0].category.key, "convenience_store");
        assert_eq!(outcome.stats.deferred, 1);
        assert_eq!(outcome.pending_review(), 1);
    }

    #[tokio::test]
    async fn test_service_failure_is_isolated() {
        let mock = MockBackend::new().failing_on("BROKEN");
        let taxonomy = Taxonomy::default();
        let mut categorizer = Categorizer::new(&mock, &taxonomy);

        let mut reviewed = 0;
        let mut reviewer = FnReviewer(|_: &RawLineItem, _: &Proposal| {
            reviewed += 1;
            ReviewDecision::Accept
        });
        let items = vec![
            item(1, "東京ガス", 9232),
            item(2, "BROKEN", 500),
            item(3, "ローソン", 150),
        ];
        let outcome = categorizer.classify_items(items, &mut reviewer).await;

        assert_eq!(reviewed, 2);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[1].provenance, Provenance::Unresolved);
        assert!(outcome.records[1].category.is_other());
        assert!(outcome.records[1].suggested.is_none());
        assert_eq!(outcome.stats.service_failures, 1);
        assert_eq!(outcome.stats.confirmed, 2);
    }

    #[tokio::test]
    async fn test_reviewed_records_skip_service() {
        let mock = MockBackend::new();
        let taxonomy = Taxonomy::default();
        let mut categorizer = Categorizer::new(&mock, &taxonomy);

        let reviewed = CategorizedRecord {
            item: item(1, "東京ガス", 9232),
            category: taxonomy.get("utilities").unwrap().clone(),
            provenance: Provenance::UserOverridden,
            suggested: None,
            rationale: None,
        };
        let unresolved = CategorizedRecord {
            item: item(2, "ローソン", 150),
            category: taxonomy.other().clone(),
            provenance: Provenance::Unresolved,
            suggested: None,
            rationale: None,
        };

        let outcome = categorizer
            .classify(
                vec![
                    LedgerEntry::Categorized(reviewed.clone()),
                    LedgerEntry::Categorized(unresolved),
                ],
                &mut AcceptAll,
            )
            .await;

        assert_eq!(mock.classify_calls(), 1);
        assert_eq!(outcome.records[0], reviewed);
        assert_eq!(outcome.records[1].provenance, Provenance::UserConfirmed);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.stats.processed, 1);
    }

    #[tokio::test]
    async fn test_memory_supplies_suggestion() {
        let mock = MockBackend::new();
        let taxonomy = Taxonomy::default();
        let mut memory = DecisionMemory::new();

        let items = vec![item(1, "謎の店", 100), item(2, "株式会社 謎の店", 200)];
        let mut reviewer = FnReviewer(|item: &RawLineItem, p: &Proposal| {
            if item.row == 1 {
                ReviewDecision::Replace("food".into())
            } else {
                assert_eq!(p.source, ProposalSource::Memory);
                ReviewDecision::Accept
            }
        });

        let outcome = Categorizer::new(&mock, &taxonomy)
            .with_memory(&mut memory)
            .classify_items(items, &mut reviewer)
            .await;

        assert_eq!(mock.classify_calls(), 1);
        assert_eq!(outcome.stats.from_memory, 1);
        assert_eq!(outcome.records[1].category.key, "food");
        assert_eq!(outcome.records[1].provenance, Provenance::UserConfirmed);
        assert_eq!(memory.lookup("謎の店").unwrap().category, "food");
    }

    #[tokio::test]
    async fn test_near_memory_match_explains_itself() {
        let mock = MockBackend::new();
        let taxonomy = Taxonomy::default();
        let mut memory = DecisionMemory::new();

        let items = vec![item(1, "東京ガス", 9232), item(2, "東京ガス 6月分", 8800)];
        let mut reviewer = FnReviewer(|item: &RawLineItem, p: &Proposal| {
            if item.row == 2 {
                assert_eq!(p.source, ProposalSource::Memory);
                let rationale = p.rationale.as_deref().unwrap();
                assert!(rationale.contains("東京ガス"), "{}", rationale);
                assert!(rationale.contains("similarity"), "{}", rationale);
            }
            ReviewDecision::Accept
        });

        let outcome = Categorizer::new(&mock, &taxonomy)
            .with_memory(&mut memory)
            .classify_items(items, &mut reviewer)
            .await;

        assert_eq!(mock.classify_calls(), 1);
        assert_eq!(outcome.stats.from_memory, 1);
        assert_eq!(outcome.records[1].category.key, "utilities");
    }

    #[tokio::test]
    async fn test_exact_only_memory_asks_the_service() {
        let mock = MockBackend::new();
        let taxonomy = Taxonomy::default();
        let mut memory = DecisionMemory::new().with_threshold(1.0);

        let items = vec![item(1, "東京ガス", 9232), item(2, "東京ガス 6月分", 8800)];
        let outcome = Categorizer::new(&mock, &taxonomy)
            .with_memory(&mut memory)
            .classify_items(items, &mut AcceptAll)
            .await;

        assert_eq!(mock.classify_calls(), 2);
        assert_eq!(outcome.stats.from_memory, 0);
    }
}
