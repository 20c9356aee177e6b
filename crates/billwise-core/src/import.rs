//! Billing CSV ingestion
//!
//! Layout: `date,description,amount[,note[,category[,provenance]]]`, with or
//! without a header row. With a header, columns are matched by name and may
//! appear in any order. Rows carrying a category come back as categorized
//! records, so a written-back file can be fed to the next run.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use tracing::{debug, warn};

use crate::config::{PipelineConfig, SignConvention};
use crate::error::{Error, Result};
use crate::models::{CategorizedRecord, LedgerEntry, Provenance, RawLineItem};
use crate::taxonomy::Taxonomy;

/// Settings that affect how rows are read
#[derive(Debug, Clone)]
pub struct ImportOptions<'a> {
    pub taxonomy: &'a Taxonomy,
    pub sign_convention: SignConvention,
    /// Decimal places of the currency's minor unit
    pub minor_digits: u32,
}

impl<'a> ImportOptions<'a> {
    pub fn from_config(config: &'a PipelineConfig) -> Self {
        Self {
            taxonomy: &config.taxonomy,
            sign_convention: config.sign_convention,
            minor_digits: config.currency.minor_digits,
        }
    }
}

/// Column positions within a row
#[derive(Debug, Clone, Copy)]
struct Columns {
    date: usize,
    description: usize,
    amount: usize,
    note: Option<usize>,
    category: Option<usize>,
    provenance: Option<usize>,
}

impl Columns {
    fn positional() -> Self {
        Self {
            date: 0,
            description: 1,
            amount: 2,
            note: Some(3),
            category: Some(4),
            provenance: Some(5),
        }
    }

    /// Map a header row; None if it does not look like a header
    fn from_header(header: &StringRecord) -> Option<Self> {
        let find = |names: &[&str]| {
            header.iter().position(|h| {
                let h = h.trim().trim_start_matches('\u{feff}').to_lowercase();
                names.contains(&h.as_str())
            })
        };

        let date = find(&["date", "日期", "日付"])?;
        let description = find(&["description", "item", "name", "merchant", "项目", "内容", "利用店名"])?;
        let amount = find(&["amount", "金额", "金額", "利用金額"])?;
        Some(Self {
            date,
            description,
            amount,
            note: find(&["note", "notes", "memo", "备注", "備考"]),
            category: find(&["category", "类别", "分类"]),
            provenance: find(&["provenance", "status"]),
        })
    }
}

/// Read a billing file from disk
pub fn load_ledger(path: &Path, options: &ImportOptions<'_>) -> Result<Vec<LedgerEntry>> {
    let file = File::open(path)?;
    let entries = parse_ledger(file, options)?;
    debug!(path = %path.display(), rows = entries.len(), "Loaded ledger");
    Ok(entries)
}

/// Parse billing rows into ledger entries, in file order
pub fn parse_ledger<R: Read>(reader: R, options: &ImportOptions<'_>) -> Result<Vec<LedgerEntry>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    let mut columns = None;

    for (index, result) in csv_reader.records().enumerate() {
        let record = result?;
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);

        let cols = match columns {
            Some(cols) => cols,
            None => {
                if let Some(cols) = Columns::from_header(&record) {
                    columns = Some(cols);
                    continue;
                }
                let cols = Columns::positional();
                columns = Some(cols);
                cols
            }
        };

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        entries.push(parse_row(&record, row, &cols, options)?);
    }

    Ok(entries)
}

fn parse_row(
    record: &StringRecord,
    row: usize,
    cols: &Columns,
    options: &ImportOptions<'_>,
) -> Result<LedgerEntry> {
    let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");
    let optional = |idx: Option<usize>| {
        idx.and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let ingestion = |reason: String| Error::Ingestion { row, reason };

    let date_text = field(cols.date).trim_start_matches('\u{feff}');
    if date_text.is_empty() {
        return Err(ingestion("missing date".into()));
    }
    let date = parse_date(date_text).ok_or_else(|| ingestion(format!("invalid date '{}'", date_text)))?;

    let description = field(cols.description);
    if description.is_empty() {
        return Err(ingestion("missing description".into()));
    }

    let amount_text = field(cols.amount);
    if amount_text.is_empty() {
        return Err(ingestion("missing amount".into()));
    }
    let amount = parse_amount(amount_text, options.minor_digits).map_err(ingestion)?;

    let item = RawLineItem {
        row,
        date,
        description: description.to_string(),
        amount: options.sign_convention.normalize(amount),
        note: optional(cols.note).map(str::to_string),
    };

    let Some(category_text) = optional(cols.category) else {
        return Ok(LedgerEntry::Pending(item));
    };

    let provenance = match optional(cols.provenance) {
        Some(text) => text.parse::<Provenance>().map_err(ingestion)?,
        // A hand-categorized file without provenance counts as reviewed
        None => Provenance::UserConfirmed,
    };

    let (category, provenance) = match options.taxonomy.resolve(category_text) {
        Ok(label) => (label.clone(), provenance),
        Err(err) => {
            warn!(row, error = %err, "Unknown category in file; row will be reviewed again");
            (options.taxonomy.other().clone(), Provenance::Unresolved)
        }
    };

    Ok(LedgerEntry::Categorized(CategorizedRecord {
        item,
        category,
        provenance,
        suggested: None,
        rationale: None,
    }))
}

/// Parse a date in one of the accepted layouts
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let formats = [
        "%Y-%m-%d", // 2025-05-14
        "%Y/%m/%d", // 2025/05/14
        "%m/%d/%Y", // 05/14/2025
    ];

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse an amount into minor units
///
/// Handles currency signs, thousands separators, a leading sign and
/// accounting-style parentheses. Fractional digits beyond the currency's
/// precision are rejected unless they are zeros.
pub fn parse_amount(s: &str, minor_digits: u32) -> std::result::Result<i64, String> {
    let original = s;
    let mut s: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '¥' | '￥' | '$' | '€' | '£' | '円'))
        .collect();

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }

    let invalid = || format!("invalid amount '{}'", original);

    let (whole, fraction) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s.as_str(), ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }

    let digits = minor_digits as usize;
    let (kept, extra) = if fraction.len() > digits {
        fraction.split_at(digits)
    } else {
        (fraction, "")
    };
    if extra.chars().any(|c| c != '0') {
        return Err(format!(
            "amount '{}' has more than {} decimal places",
            original, minor_digits
        ));
    }

    let scale = 10i64.pow(minor_digits);
    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let fraction_value: i64 = if kept.is_empty() {
        0
    } else {
        format!("{:0<width$}", kept, width = digits)
            .parse()
            .map_err(|_| invalid())?
    };

    let value = whole_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_value))
        .ok_or_else(|| format!("amount '{}' out of range", original))?;

    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(taxonomy: &Taxonomy) -> ImportOptions<'_> {
        ImportOptions {
            taxonomy,
            sign_convention: SignConvention::ExpensesPositive,
            minor_digits: 0,
        }
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 5, 14);
        assert_eq!(parse_date("2025-05-14"), expected);
        assert_eq!(parse_date("2025/05/14"), expected);
        assert_eq!(parse_date("05/14/2025"), expected);
        assert_eq!(parse_date("14.05.2025"), None);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("9232", 0), Ok(9232));
        assert_eq!(parse_amount("¥1,234", 0), Ok(1234));
        assert_eq!(parse_amount("1,234円", 0), Ok(1234));
        assert_eq!(parse_amount("-500", 0), Ok(-500));
        assert_eq!(parse_amount("(500)", 0), Ok(-500));
        assert_eq!(parse_amount("$1,234.5", 2), Ok(123450));
        assert_eq!(parse_amount("0.05", 2), Ok(5));
        assert_eq!(parse_amount("100.00", 0), Ok(100));
        assert!(parse_amount("12.5", 0).is_err());
        assert!(parse_amount("abc", 0).is_err());
        assert!(parse_amount("¥", 0).is_err());
    }

    #[test]
    fn test_headerless_rows() {
        let taxonomy = Taxonomy::default();
        let csv = "2025-05-14,東京ガス,9232\n2025/05/15,ローソン,\"1,200\",snacks\n";
        let entries = parse_ledger(csv.as_bytes(), &options(&taxonomy)).unwrap();
        assert_eq!(entries.len(), 2);

        let first = entries[0].item();
        assert_eq!(first.row, 1);
        assert_eq!(first.description, "東京ガス");
        assert_eq!(first.amount, 9232);
        assert!(matches!(entries[0], LedgerEntry::Pending(_)));

        let second = entries[1].item();
        assert_eq!(second.amount, 1200);
        assert_eq!(second.note.as_deref(), Some("snacks"));
    }

    #[test]
    fn test_header_with_category_and_provenance() {
        let taxonomy = Taxonomy::default();
        let csv = "\
date,description,amount,note,category,provenance
2025-05-14,東京ガス,9232,,Utilities/公用事业,user-overridden
2025-05-15,ローソン,150,,Food/餐饮,
2025-05-16,謎,10,,Snacks,user-confirmed
2025-05-17,新店,99,,,
";
        let entries = parse_ledger(csv.as_bytes(), &options(&taxonomy)).unwrap();
        assert_eq!(entries.len(), 4);

        let LedgerEntry::Categorized(ref r) = entries[0] else {
            panic!("expected categorized row");
        };
        assert_eq!(r.item.row, 2);
        assert_eq!(r.category.key, "utilities");
        assert_eq!(r.provenance, Provenance::UserOverridden);

        let LedgerEntry::Categorized(ref r) = entries[1] else {
            panic!("expected categorized row");
        };
        assert_eq!(r.provenance, Provenance::UserConfirmed);

        let LedgerEntry::Categorized(ref r) = entries[2] else {
            panic!("expected categorized row");
        };
        assert!(r.category.is_other());
        assert_eq!(r.provenance, Provenance::Unresolved);

        assert!(matches!(entries[3], LedgerEntry::Pending(_)));
    }

    #[test]
    fn test_header_columns_by_name() {
        let taxonomy = Taxonomy::default();
        let csv = "金额,项目,日期\n500,ランチ,2025-06-01\n";
        let entries = parse_ledger(csv.as_bytes(), &options(&taxonomy)).unwrap();
        assert_eq!(entries[0].item().description, "ランチ");
        assert_eq!(entries[0].item().amount, 500);
    }

    #[test]
    fn test_sign_convention_applied() {
        let taxonomy = Taxonomy::default();
        let opts = ImportOptions {
            sign_convention: SignConvention::ExpensesNegative,
            ..options(&taxonomy)
        };
        let entries = parse_ledger("2025-06-01,Shop,-500\n2025-06-02,Refund,200\n".as_bytes(), &opts).unwrap();
        assert_eq!(entries[0].item().amount, 500);
        assert_eq!(entries[1].item().amount, -200);
    }

    #[test]
    fn test_bad_rows_name_the_row() {
        let taxonomy = Taxonomy::default();
        let cases = [
            ("2025-06-01,Shop,12x\n", "invalid amount"),
            ("2025-06-01,,100\n", "missing description"),
            ("June 1,Shop,100\n", "invalid date"),
            ("2025-06-01,Shop\n", "missing amount"),
            ("2025-06-01,Shop,100,,Food,maybe\n", "Unknown provenance"),
        ];
        for (csv, reason) in cases {
            match parse_ledger(csv.as_bytes(), &options(&taxonomy)) {
                Err(Error::Ingestion { row, reason: r }) => {
                    assert_eq!(row, 1);
                    assert!(r.contains(reason), "{} vs {}", r, reason);
                }
                other => panic!("expected ingestion error for {:?}, got {:?}", csv, other),
            }
        }
    }

    #[test]
    fn test_load_ledger_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bill.csv");
        std::fs::write(&path, "date,description,amount\n2025-05-14,東京ガス,9232\n").unwrap();
        let taxonomy = Taxonomy::default();
        let entries = load_ledger(&path, &options(&taxonomy)).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
