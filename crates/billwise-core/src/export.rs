//! Output artifacts
//!
//! - Categorized CSV, same layout as the input plus category and provenance
//! - Period summary as JSON (input for charts)
//! - Markdown recommendation report
//!
//! Files are written atomically: a temp file in the target directory is
//! persisted over the destination.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use csv::WriterBuilder;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::{CurrencyConfig, SignConvention};
use crate::error::{Error, Result};
use crate::models::{CategorizedRecord, PeriodSummary, RecommendationReport};

/// Write bytes to `path` via a temp file in the same directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
    Ok(())
}

/// Render categorized records as CSV
///
/// Amounts are written back in the file's own sign convention so the output
/// can be ingested again with the same config.
pub fn ledger_csv(
    records: &[CategorizedRecord],
    sign_convention: SignConvention,
    minor_digits: u32,
) -> Result<String> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record([
        "date",
        "description",
        "amount",
        "note",
        "category",
        "provenance",
    ])?;

    for record in records {
        let amount = sign_convention.normalize(record.item.amount);
        writer.write_record([
            record.item.date.to_string(),
            record.item.description.clone(),
            plain_amount(amount, minor_digits),
            record.item.note.clone().unwrap_or_default(),
            record.category.display_name(),
            record.provenance.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidData(format!("CSV not UTF-8: {}", e)))
}

pub fn write_ledger(
    path: &Path,
    records: &[CategorizedRecord],
    sign_convention: SignConvention,
    minor_digits: u32,
) -> Result<()> {
    let csv = ledger_csv(records, sign_convention, minor_digits)?;
    write_atomic(path, csv.as_bytes())
}

pub fn write_summary_json(path: &Path, summary: &PeriodSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    write_atomic(path, json.as_bytes())
}

pub fn read_summary_json(path: &Path) -> Result<PeriodSummary> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Console rendering of a period summary, largest category first
pub fn render_summary(summary: &PeriodSummary, currency: &CurrencyConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Period: {}", summary.period_id);
    if let Some(range) = summary.date_range {
        let _ = writeln!(out, "Date range: {}", range);
    }
    let _ = writeln!(out, "Total spending: {}", currency.format(summary.total_amount));
    let _ = writeln!(out, "Transactions: {}", summary.transaction_count);
    let _ = writeln!(
        out,
        "Average per transaction: {}",
        currency.format(summary.average_amount.round() as i64)
    );

    if !summary.categories.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "By category:");
        let width = summary
            .categories
            .iter()
            .map(|c| c.category.display_name().chars().count())
            .max()
            .unwrap_or(0);
        for c in summary.by_total_desc() {
            let name = c.category.display_name();
            let pad = width.saturating_sub(name.chars().count());
            let _ = writeln!(
                out,
                "  {}{}  {:>12}  {:>5.1}%  ({} tx, avg {})",
                name,
                " ".repeat(pad),
                currency.format(c.total_amount),
                c.percentage_of_total,
                c.transaction_count,
                currency.format(c.average_amount.round() as i64)
            );
        }
    }

    let excluded = &summary.excluded;
    if excluded.refund_count > 0 {
        let _ = writeln!(
            out,
            "\nRefunds (not counted): {} across {} rows",
            currency.format(excluded.refund_total),
            excluded.refund_count
        );
    }
    if excluded.zero_amount_count > 0 {
        let _ = writeln!(out, "Zero-amount rows skipped: {}", excluded.zero_amount_count);
    }

    out
}

/// Markdown rendering of a recommendation report
pub fn render_report_markdown(report: &RecommendationReport) -> String {
    let request = &report.request;
    let currency = &request.currency;
    let current = &request.current;

    let mut out = String::new();
    let _ = writeln!(out, "# AI财务建议报告 - {}", report.period_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "## 支出概览");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "- 本期 ({}) 总支出: {} / {} 笔",
        current.period_id,
        currency.format(current.total_amount),
        current.transaction_count
    );
    if let Some(ref prior) = request.prior {
        let _ = writeln!(
            out,
            "- 上期 ({}) 总支出: {} / {} 笔",
            prior.period_id,
            currency.format(prior.total_amount),
            prior.transaction_count
        );
    }
    if let Some(range) = current.date_range {
        let _ = writeln!(out, "- 日期范围: {}", range);
    }

    if !current.categories.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "| 类别 | 金额 | 占比 | 笔数 |");
        let _ = writeln!(out, "|---|---:|---:|---:|");
        for line in &current.categories {
            let _ = writeln!(
                out,
                "| {} | {} | {:.1}% | {} |",
                line.category,
                currency.format(line.total_amount),
                line.percentage,
                line.transaction_count
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## 用户背景");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.user_context);
    let _ = writeln!(out);
    let _ = writeln!(out, "## 分析与建议");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.narrative);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "_Generated {}_",
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    out
}

pub fn write_report_markdown(path: &Path, report: &RecommendationReport) -> Result<()> {
    write_atomic(path, render_report_markdown(report).as_bytes())
}

/// Minor units as a plain decimal string (no symbol, no grouping)
fn plain_amount(amount: i64, minor_digits: u32) -> String {
    if minor_digits == 0 {
        return amount.to_string();
    }
    let scale = 10u64.pow(minor_digits);
    let abs = amount.unsigned_abs();
    format!(
        "{}{}.{:0width$}",
        if amount < 0 { "-" } else { "" },
        abs / scale,
        abs % scale,
        width = minor_digits as usize
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{Breakdown, RecommendationRequest};
    use crate::import::{parse_ledger, ImportOptions};
    use crate::models::{
        CategoryAggregate, ExcludedRows, LedgerEntry, Provenance, RawLineItem,
    };
    use crate::taxonomy::Taxonomy;
    use chrono::{NaiveDate, Utc};

    fn record(row: usize, description: &str, amount: i64, key: &str) -> CategorizedRecord {
        CategorizedRecord {
            item: RawLineItem {
                row,
                date: NaiveDate::from_ymd_opt(2025, 5, 14).unwrap(),
                description: description.to_string(),
                amount,
                note: (row == 2).then(|| "gift, wrapped".to_string()),
            },
            category: Taxonomy::default().get(key).unwrap().clone(),
            provenance: Provenance::UserOverridden,
            suggested: None,
            rationale: None,
        }
    }

    fn summary(period_id: &str, total: i64) -> PeriodSummary {
        let taxonomy = Taxonomy::default();
        PeriodSummary {
            period_id: period_id.into(),
            date_range: None,
            total_amount: total,
            transaction_count: 2,
            average_amount: total as f64 / 2.0,
            categories: vec![CategoryAggregate {
                category: taxonomy.get("travel").unwrap().clone(),
                total_amount: total,
                transaction_count: 2,
                average_amount: total as f64 / 2.0,
                percentage_of_total: 100.0,
            }],
            daily: vec![],
            excluded: ExcludedRows {
                refund_total: 500,
                refund_count: 1,
                zero_amount_count: 0,
            },
        }
    }

    #[test]
    fn test_plain_amount() {
        assert_eq!(plain_amount(9232, 0), "9232");
        assert_eq!(plain_amount(123450, 2), "1234.50");
        assert_eq!(plain_amount(-5, 2), "-0.05");
    }

    #[test]
    fn test_ledger_csv_reads_back() {
        let records = vec![
            record(1, "東京ガス", 9232, "utilities"),
            record(2, "花屋", 3000, "shopping"),
        ];
        let csv = ledger_csv(&records, SignConvention::ExpensesPositive, 0).unwrap();
        assert!(csv.starts_with("date,description,amount,note,category,provenance\n"));
        assert!(csv.contains("\"gift, wrapped\""));

        let taxonomy = Taxonomy::default();
        let options = ImportOptions {
            taxonomy: &taxonomy,
            sign_convention: SignConvention::ExpensesPositive,
            minor_digits: 0,
        };
        let entries = parse_ledger(csv.as_bytes(), &options).unwrap();
        let LedgerEntry::Categorized(ref first) = entries[0] else {
            panic!("expected categorized entry");
        };
        assert_eq!(first.category.key, "utilities");
        assert_eq!(first.provenance, Provenance::UserOverridden);
        assert_eq!(first.item.amount, 9232);
        assert_eq!(entries[1].item().note.as_deref(), Some("gift, wrapped"));
    }

    #[test]
    fn test_ledger_csv_restores_source_sign() {
        let records = vec![record(1, "Shop", 1250, "shopping")];
        let csv = ledger_csv(&records, SignConvention::ExpensesNegative, 2).unwrap();
        assert!(csv.contains(",-12.50,"));
    }

    #[test]
    fn test_write_atomic_and_summary_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let s = summary("202506", 1000);
        write_summary_json(&path, &s).unwrap();
        assert_eq!(read_summary_json(&path).unwrap(), s);

        // Overwrite in place
        write_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_render_summary() {
        let text = render_summary(&summary("202506", 878273), &CurrencyConfig::default());
        assert!(text.contains("Total spending: ¥878,273"));
        assert!(text.contains("Travel/旅行"));
        assert!(text.contains("100.0%"));
        assert!(text.contains("Refunds (not counted): ¥500"));
    }

    #[test]
    fn test_report_markdown_header_has_both_totals() {
        let current = summary("202506", 878273);
        let prior = summary("202505", 650000);
        let report = RecommendationReport {
            period_id: "202506".into(),
            user_context: "business trip May 28–30; birthday June 9".into(),
            prior: Some(prior.clone()),
            request: RecommendationRequest {
                current: Breakdown::from_summary(&current),
                prior: Some(Breakdown::from_summary(&prior)),
                user_context: "business trip May 28–30; birthday June 9".into(),
                top_expenses: vec![],
                currency: CurrencyConfig::default(),
            },
            narrative: "少吃外卖".into(),
            generated_at: Utc::now(),
        };

        let md = render_report_markdown(&report);
        assert!(md.starts_with("# AI财务建议报告 - 202506\n"));
        assert!(md.contains("本期 (202506) 总支出: ¥878,273"));
        assert!(md.contains("上期 (202505) 总支出: ¥650,000"));
        assert!(md.contains("## 用户背景\n\nbusiness trip May 28–30; birthday June 9"));
        assert!(md.contains("## 分析与建议\n\n少吃外卖"));
    }
}
