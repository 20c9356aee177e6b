//! Aggregation engine
//!
//! Pure, deterministic statistics over categorized records. Expenses are
//! grouped in a single pass into a table indexed by taxonomy position, so the
//! output is always in canonical order with Other last.
//!
//! Only positive amounts count as spending. Refunds (negative) and zero-amount
//! rows are reported in [`ExcludedRows`] and kept out of every total, which
//! keeps each category percentage within 0..=100.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{
    CategorizedRecord, CategoryAggregate, DailyAmount, DateRange, ExcludedRows, PeriodSummary,
};
use crate::taxonomy::Taxonomy;

/// Allowed drift when comparing floating point statistics
const FLOAT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
struct Group {
    total: i64,
    count: usize,
}

/// Summarize one period
///
/// Every record's category must belong to `taxonomy`. The result is checked
/// with [`verify`] before it is returned.
pub fn summarize(
    period_id: &str,
    records: &[CategorizedRecord],
    taxonomy: &Taxonomy,
) -> Result<PeriodSummary> {
    let mut groups = vec![Group::default(); taxonomy.len()];
    let mut daily: BTreeMap<_, i64> = BTreeMap::new();
    let mut excluded = ExcludedRows::default();
    let mut dates = None;

    for record in records {
        let position = taxonomy
            .position(&record.category.key)
            .ok_or_else(|| Error::TaxonomyViolation {
                input: record.category.key.clone(),
            })?;

        let date = record.item.date;
        dates = Some(match dates {
            None => DateRange { from: date, to: date },
            Some(DateRange { from, to }) => DateRange {
                from: from.min(date),
                to: to.max(date),
            },
        });

        let amount = record.item.amount;
        if amount < 0 {
            excluded.refund_total = excluded
                .refund_total
                .checked_sub(amount)
                .ok_or_else(|| overflow("refunds"))?;
            excluded.refund_count += 1;
            continue;
        }
        if amount == 0 {
            excluded.zero_amount_count += 1;
            continue;
        }

        let key = record.category.key.as_str();
        let group = &mut groups[position];
        group.total = group
            .total
            .checked_add(amount)
            .ok_or_else(|| overflow(key))?;
        group.count += 1;
        let day = daily.entry(date).or_insert(0);
        *day = day.checked_add(amount).ok_or_else(|| overflow("daily"))?;
    }

    let total_amount =
        checked_sum(groups.iter().map(|g| g.total)).ok_or_else(|| overflow("total"))?;
    let transaction_count: usize = groups.iter().map(|g| g.count).sum();

    let categories = taxonomy
        .labels()
        .iter()
        .zip(groups.iter())
        .filter(|(_, g)| g.count > 0)
        .map(|(label, g)| CategoryAggregate {
            category: label.clone(),
            total_amount: g.total,
            transaction_count: g.count,
            average_amount: mean(g.total, g.count),
            percentage_of_total: percentage(g.total, total_amount),
        })
        .collect();

    let summary = PeriodSummary {
        period_id: period_id.to_string(),
        date_range: dates,
        total_amount,
        transaction_count,
        average_amount: mean(total_amount, transaction_count),
        categories,
        daily: daily
            .into_iter()
            .map(|(date, amount)| DailyAmount { date, amount })
            .collect(),
        excluded,
    };

    verify(&summary)?;

    debug!(
        period = %summary.period_id,
        total = summary.total_amount,
        count = summary.transaction_count,
        categories = summary.categories.len(),
        "Summarized period"
    );

    Ok(summary)
}

/// Check the internal consistency of a summary
///
/// Category totals and counts must add up to the period figures, each
/// percentage and mean must match its inputs, and the percentages must sum to
/// 100 (or all be 0 for an empty period).
pub fn verify(summary: &PeriodSummary) -> Result<()> {
    let sum = checked_sum(summary.categories.iter().map(|c| c.total_amount))
        .ok_or_else(|| overflow("total"))?;
    if sum != summary.total_amount {
        return Err(inconsistency(
            "total",
            format!(
                "category totals sum to {} but period total is {}",
                sum, summary.total_amount
            ),
        ));
    }

    let count: usize = summary.categories.iter().map(|c| c.transaction_count).sum();
    if count != summary.transaction_count {
        return Err(inconsistency(
            "total",
            format!(
                "category counts sum to {} but period count is {}",
                count, summary.transaction_count
            ),
        ));
    }

    for c in &summary.categories {
        let key = c.category.key.as_str();
        if c.transaction_count == 0 {
            return Err(inconsistency(key, "empty category in output".into()));
        }
        let expected = percentage(c.total_amount, summary.total_amount);
        if (c.percentage_of_total - expected).abs() > FLOAT_EPSILON {
            return Err(inconsistency(
                key,
                format!(
                    "percentage {} does not match {}",
                    c.percentage_of_total, expected
                ),
            ));
        }
        if !(0.0..=100.0 + FLOAT_EPSILON).contains(&c.percentage_of_total) {
            return Err(inconsistency(
                key,
                format!("percentage {} out of range", c.percentage_of_total),
            ));
        }
        let expected = mean(c.total_amount, c.transaction_count);
        if (c.average_amount - expected).abs() > FLOAT_EPSILON {
            return Err(inconsistency(
                key,
                format!("average {} does not match {}", c.average_amount, expected),
            ));
        }
    }

    let pct_sum: f64 = summary
        .categories
        .iter()
        .map(|c| c.percentage_of_total)
        .sum();
    let pct_ok = if summary.total_amount == 0 {
        pct_sum == 0.0
    } else {
        (99.9..=100.1).contains(&pct_sum)
    };
    if !pct_ok {
        return Err(inconsistency(
            "total",
            format!("percentages sum to {}", pct_sum),
        ));
    }

    let daily_sum = checked_sum(summary.daily.iter().map(|d| d.amount))
        .ok_or_else(|| overflow("daily"))?;
    if daily_sum != summary.total_amount {
        return Err(inconsistency(
            "daily",
            format!(
                "daily series sums to {} but period total is {}",
                daily_sum, summary.total_amount
            ),
        ));
    }

    Ok(())
}

fn mean(total: i64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn checked_sum(values: impl Iterator<Item = i64>) -> Option<i64> {
    values.fold(Some(0i64), |acc, v| acc?.checked_add(v))
}

fn overflow(category: &str) -> Error {
    inconsistency(category, "amounts overflow the supported range".into())
}

fn inconsistency(category: &str, detail: String) -> Error {
    Error::AggregationInconsistency {
        category: category.to_string(),
        detail,
    }
}
