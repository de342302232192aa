//! Versioned table schema.
//!
//! | version | marker line                  | columns                                   |
//! |---------|------------------------------|-------------------------------------------|
//! | 1       | none (legacy files)          | Kupon, Nazwa, Wynik, Stawka (S), Kurs, Zasilenie (+ ignored) |
//! | 2       | `# recoup-ledger schema=2`   | [`HEADER_V2`]                             |
//!
//! The version is read from the marker line only. A file without one is
//! version 1 by definition; an unknown version is an error.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use csv::StringRecord;
use rust_decimal::Decimal;

use crate::engine::Accountant;
use crate::types::{parse_amount, CouponRecord, Outcome, RunningTotals};

pub const CURRENT_VERSION: u32 = 2;

pub const MARKER_PREFIX: &str = "# recoup-ledger schema=";

pub const HEADER_V2: [&str; 14] = [
    "index",
    "label",
    "outcome",
    "stake",
    "odds",
    "top_up",
    "withdrawn",
    "cumulative_top_ups",
    "cumulative_withdrawn",
    "cumulative_staked",
    "gross_return",
    "balance",
    "net_profit",
    "recorded_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1,
    V2,
}

impl SchemaVersion {
    /// Read the version from the first line of a table file.
    pub fn detect(first_line: Option<&str>) -> Result<Self> {
        let Some(rest) = first_line.and_then(|l| l.trim().strip_prefix(MARKER_PREFIX)) else {
            return Ok(SchemaVersion::V1);
        };
        match rest.trim().parse::<u32>() {
            Ok(1) => Ok(SchemaVersion::V1),
            Ok(2) => Ok(SchemaVersion::V2),
            Ok(v) => bail!("Unsupported ledger schema version {v}"),
            Err(_) => bail!("Malformed schema marker: {}", first_line.unwrap_or_default()),
        }
    }
}

pub fn marker_line() -> String {
    format!("{MARKER_PREFIX}{CURRENT_VERSION}")
}

// ---------------------------------------------------------------------------
// Cell formatting / parsing
// ---------------------------------------------------------------------------

/// Write an amount with at least two decimals and no precision loss.
pub fn format_amount(value: Decimal) -> String {
    let mut v = value;
    if v.scale() < 2 {
        v.rescale(2);
    }
    v.to_string()
}

fn cell<'a>(record: &'a StringRecord, pos: usize, column: &str, row: usize) -> Result<&'a str> {
    record
        .get(pos)
        .ok_or_else(|| anyhow!("row {row}: missing column '{column}'"))
}

fn decimal_cell(record: &StringRecord, pos: usize, column: &str, row: usize) -> Result<Decimal> {
    let raw = cell(record, pos, column, row)?;
    parse_amount(raw).ok_or_else(|| anyhow!("row {row}: invalid {column} '{raw}'"))
}

fn index_cell(record: &StringRecord, pos: usize, row: usize) -> Result<u32> {
    let raw = cell(record, pos, "index", row)?;
    raw.trim()
        .parse::<u32>()
        .map_err(|e| anyhow!("row {row}: invalid index '{raw}': {e}"))
}

fn outcome_cell(record: &StringRecord, pos: usize, row: usize) -> Result<Outcome> {
    let raw = cell(record, pos, "outcome", row)?;
    raw.parse::<Outcome>()
        .with_context(|| format!("row {row}: invalid outcome"))
}

// ---------------------------------------------------------------------------
// Version 2
// ---------------------------------------------------------------------------

pub fn check_header_v2(header: &StringRecord) -> Result<()> {
    let found: Vec<&str> = header.iter().map(str::trim).collect();
    if found != HEADER_V2 {
        bail!(
            "Unexpected header for schema v2: expected {:?}, found {:?}",
            HEADER_V2,
            found
        );
    }
    Ok(())
}

pub fn parse_row_v2(record: &StringRecord, row: usize) -> Result<CouponRecord> {
    if record.len() != HEADER_V2.len() {
        bail!(
            "row {row} has {} columns, expected {}",
            record.len(),
            HEADER_V2.len()
        );
    }

    let recorded_at = match record[13].trim() {
        "" => None,
        raw => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| anyhow!("row {row}: invalid recorded_at '{raw}': {e}"))?
                .with_timezone(&Utc),
        ),
    };

    Ok(CouponRecord {
        index: index_cell(record, 0, row)?,
        label: record[1].to_string(),
        outcome: outcome_cell(record, 2, row)?,
        stake: decimal_cell(record, 3, "stake", row)?,
        odds: decimal_cell(record, 4, "odds", row)?,
        top_up: decimal_cell(record, 5, "top_up", row)?,
        withdrawn: decimal_cell(record, 6, "withdrawn", row)?,
        cumulative_top_ups: decimal_cell(record, 7, "cumulative_top_ups", row)?,
        cumulative_withdrawn: decimal_cell(record, 8, "cumulative_withdrawn", row)?,
        cumulative_staked: decimal_cell(record, 9, "cumulative_staked", row)?,
        gross_return: decimal_cell(record, 10, "gross_return", row)?,
        balance: decimal_cell(record, 11, "balance", row)?,
        net_profit: decimal_cell(record, 12, "net_profit", row)?,
        recorded_at,
    })
}

pub fn row_v2(record: &CouponRecord) -> [String; 14] {
    [
        record.index.to_string(),
        record.label.clone(),
        record.outcome.as_str().to_string(),
        format_amount(record.stake),
        format_amount(record.odds),
        format_amount(record.top_up),
        format_amount(record.withdrawn),
        format_amount(record.cumulative_top_ups),
        format_amount(record.cumulative_withdrawn),
        format_amount(record.cumulative_staked),
        format_amount(record.gross_return),
        format_amount(record.balance),
        format_amount(record.net_profit),
        record
            .recorded_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    ]
}

// ---------------------------------------------------------------------------
// Version 1 (legacy) and migration
// ---------------------------------------------------------------------------

/// Coupon number. Falls back to the row position when absent.
pub const LEGACY_INDEX: &str = "Kupon";
pub const LEGACY_LABEL: &str = "Nazwa";
pub const LEGACY_OUTCOME: &str = "Wynik";
pub const LEGACY_STAKE: &str = "Stawka (S)";
pub const LEGACY_ODDS: &str = "Kurs";
/// Cash deposited on the row. Tables older than this column carry no
/// deposits at all.
pub const LEGACY_TOP_UP: &str = "Zasilenie";

/// Column positions of a v1 table, looked up by name. The running-total
/// columns of v1 are ignored and recomputed on migration.
#[derive(Debug, Clone, Copy)]
pub struct LegacyColumns {
    index: Option<usize>,
    label: Option<usize>,
    outcome: usize,
    stake: usize,
    odds: usize,
    top_up: Option<usize>,
}

impl LegacyColumns {
    pub fn from_header(header: &StringRecord) -> Result<Self> {
        let position = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let required = |name: &str| {
            position(name).ok_or_else(|| anyhow!("Legacy table is missing column '{name}'"))
        };
        Ok(Self {
            index: position(LEGACY_INDEX),
            label: position(LEGACY_LABEL),
            outcome: required(LEGACY_OUTCOME)?,
            stake: required(LEGACY_STAKE)?,
            odds: required(LEGACY_ODDS)?,
            top_up: position(LEGACY_TOP_UP),
        })
    }

    pub fn has_top_ups(&self) -> bool {
        self.top_up.is_some()
    }
}

/// Raw inputs of a legacy row, with cash movements already told apart
/// from bets.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRow {
    pub index: u32,
    pub label: Option<String>,
    pub outcome: Outcome,
    pub stake: Decimal,
    pub odds: Decimal,
    pub top_up: Decimal,
    pub withdrawn: Decimal,
}

/// Rows of a v1 table.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTable {
    pub rows: Vec<LegacyRow>,
    /// Whether the table has a deposit column. Without one the initial
    /// capital was never recorded.
    pub has_top_ups: bool,
}

fn legacy_outcome(raw: &str, row: usize) -> Result<Outcome> {
    match raw.trim().to_uppercase().as_str() {
        "WYGRANA" => Ok(Outcome::Won),
        "PRZEGRANA" => Ok(Outcome::Lost),
        "OCZEKUJE" | "" => Ok(Outcome::Pending),
        _ => bail!("row {row}: invalid outcome '{raw}'"),
    }
}

fn optional_decimal(
    record: &StringRecord,
    pos: Option<usize>,
    column: &str,
    row: usize,
) -> Result<Decimal> {
    match pos.and_then(|p| record.get(p)).map(str::trim) {
        None | Some("") => Ok(Decimal::ZERO),
        Some(raw) => parse_amount(raw).ok_or_else(|| anyhow!("row {row}: invalid {column} '{raw}'")),
    }
}

/// Parse one v1 row. Cash movements were stored as bets at odds 1.00: a
/// deposit as a won zero stake with the amount under `Zasilenie`, a
/// withdrawal as a lost stake of the amount.
pub fn parse_row_v1(record: &StringRecord, cols: &LegacyColumns, row: usize) -> Result<LegacyRow> {
    let index = match cols.index {
        Some(pos) => index_cell(record, pos, row)?,
        None => u32::try_from(row).context("legacy table has too many rows")?,
    };
    let label = cols
        .label
        .and_then(|pos| record.get(pos))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string);
    let outcome = legacy_outcome(cell(record, cols.outcome, LEGACY_OUTCOME, row)?, row)?;
    let stake = decimal_cell(record, cols.stake, LEGACY_STAKE, row)?;
    let odds = decimal_cell(record, cols.odds, LEGACY_ODDS, row)?;
    let top_up = optional_decimal(record, cols.top_up, LEGACY_TOP_UP, row)?;

    let mut parsed = LegacyRow {
        index,
        label,
        outcome,
        stake,
        odds,
        top_up,
        withdrawn: Decimal::ZERO,
    };
    if odds != Decimal::ONE {
        return Ok(parsed);
    }

    match outcome {
        Outcome::Won if stake.is_zero() && top_up > Decimal::ZERO => {
            parsed.outcome = Outcome::Deposit;
            parsed.odds = Decimal::ZERO;
        }
        Outcome::Lost if stake > Decimal::ZERO && top_up.is_zero() => {
            parsed.outcome = Outcome::Withdrawal;
            parsed.withdrawn = stake;
            parsed.stake = Decimal::ZERO;
            parsed.odds = Decimal::ZERO;
        }
        _ => bail!("row {row}: a row at odds 1.00 must be a deposit or a withdrawal"),
    }
    Ok(parsed)
}

/// Convert a legacy table to the current layout.
///
/// A table without a deposit column has `initial_capital` credited to its
/// first row. All running columns are recomputed from scratch.
pub fn migrate_v1(table: LegacyTable, initial_capital: Decimal) -> Result<Vec<CouponRecord>> {
    let credit = if table.has_top_ups {
        Decimal::ZERO
    } else {
        initial_capital
    };

    let mut records: Vec<CouponRecord> = table
        .rows
        .into_iter()
        .map(|legacy| {
            let label = legacy.label.unwrap_or_else(|| match legacy.outcome {
                Outcome::Deposit => format!("Deposit {:.2}", legacy.top_up),
                Outcome::Withdrawal => format!("Withdrawal {:.2}", legacy.withdrawn),
                _ => format!("Coupon #{}", legacy.index),
            });
            let mut r =
                CouponRecord::blank(legacy.index, label, legacy.outcome, &RunningTotals::default());
            r.stake = legacy.stake;
            r.odds = legacy.odds;
            r.top_up = legacy.top_up;
            r.withdrawn = legacy.withdrawn;
            r.recorded_at = None;
            r
        })
        .collect();
    if let Some(first) = records.first_mut() {
        first.top_up = first
            .top_up
            .checked_add(credit)
            .context("Initial capital is out of range")?;
    }
    Accountant::rebuild(&mut records).context("Legacy table cannot be migrated")?;
    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_detect_version() {
        assert_eq!(SchemaVersion::detect(None).unwrap(), SchemaVersion::V1);
        assert_eq!(
            SchemaVersion::detect(Some("index,outcome,stake,odds")).unwrap(),
            SchemaVersion::V1
        );
        assert_eq!(
            SchemaVersion::detect(Some("# recoup-ledger schema=2")).unwrap(),
            SchemaVersion::V2
        );
        assert!(SchemaVersion::detect(Some("# recoup-ledger schema=7")).is_err());
        assert!(SchemaVersion::detect(Some("# recoup-ledger schema=two")).is_err());
    }

    #[test]
    fn test_format_amount_keeps_precision() {
        assert_eq!(format_amount(dec!(100)), "100.00");
        assert_eq!(format_amount(dec!(2.5)), "2.50");
        assert_eq!(format_amount(dec!(1.875)), "1.875");
        assert_eq!(format_amount(dec!(-0.1)), "-0.10");
    }

    #[test]
    fn test_parse_row_v2_rejects_bad_cells() {
        let mut cells: Vec<String> = HEADER_V2.iter().map(|_| "0".to_string()).collect();
        cells[0] = "1".into();
        cells[2] = "DEPOSIT".into();
        cells[13] = String::new();
        let ok = StringRecord::from(cells.clone());
        assert!(parse_row_v2(&ok, 1).is_ok());

        cells[4] = "abc".into();
        let err = parse_row_v2(&StringRecord::from(cells.clone()), 3).unwrap_err();
        assert!(format!("{err}").contains("row 3: invalid odds 'abc'"));

        cells[4] = "0".into();
        cells[2] = "SOMETIMES".into();
        assert!(parse_row_v2(&StringRecord::from(cells), 3).is_err());
    }

    #[test]
    fn test_legacy_columns_by_name() {
        let header = StringRecord::from(vec!["Kurs", "kupon", "Saldo", "Wynik", "Stawka (S)"]);
        let cols = LegacyColumns::from_header(&header).unwrap();
        assert!(!cols.has_top_ups());
        let row = StringRecord::from(vec!["2,5", "7", "-10", "PRZEGRANA", "10"]);
        let legacy = parse_row_v1(&row, &cols, 1).unwrap();
        assert_eq!(legacy.index, 7);
        assert_eq!(legacy.odds, dec!(2.5));
        assert_eq!(legacy.outcome, Outcome::Lost);
        assert_eq!(legacy.label, None);

        let header = StringRecord::from(vec!["Kupon", "Wynik", "Stawka (S)"]);
        let err = LegacyColumns::from_header(&header).unwrap_err();
        assert!(format!("{err}").contains("Kurs"));
    }

    #[test]
    fn test_legacy_cash_rows() {
        let header = StringRecord::from(vec![
            "Kupon", "Nazwa", "Wynik", "Stawka (S)", "Kurs", "Zasilenie",
        ]);
        let cols = LegacyColumns::from_header(&header).unwrap();
        assert!(cols.has_top_ups());

        let deposit = StringRecord::from(vec!["1", "Wpłata 500,00 zł", "WYGRANA", "0,00", "1,00", "500,00"]);
        let deposit = parse_row_v1(&deposit, &cols, 1).unwrap();
        assert_eq!(deposit.outcome, Outcome::Deposit);
        assert_eq!(deposit.top_up, dec!(500));
        assert_eq!(deposit.label.as_deref(), Some("Wpłata 500,00 zł"));

        let withdrawal = StringRecord::from(vec!["2", "Wypłata 50,00 zł", "PRZEGRANA", "50,00", "1,00", "0,00"]);
        let withdrawal = parse_row_v1(&withdrawal, &cols, 2).unwrap();
        assert_eq!(withdrawal.outcome, Outcome::Withdrawal);
        assert_eq!(withdrawal.withdrawn, dec!(50));
        assert_eq!(withdrawal.stake, Decimal::ZERO);

        let pending = StringRecord::from(vec!["3", "Kupon #3", "", "20,00", "2,00", "0,00"]);
        assert_eq!(parse_row_v1(&pending, &cols, 3).unwrap().outcome, Outcome::Pending);

        let odd = StringRecord::from(vec!["4", "?", "OCZEKUJE", "20,00", "1,00", "0,00"]);
        assert!(parse_row_v1(&odd, &cols, 4).is_err());
        let unknown = StringRecord::from(vec!["5", "?", "REMIS", "20,00", "2,00", "0,00"]);
        assert!(parse_row_v1(&unknown, &cols, 5).is_err());
    }

    fn bet(index: u32, outcome: Outcome, stake: Decimal, odds: Decimal) -> LegacyRow {
        LegacyRow {
            index,
            label: None,
            outcome,
            stake,
            odds,
            top_up: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
        }
    }

    #[test]
    fn test_migrate_v1_credits_initial_capital() {
        let table = LegacyTable {
            rows: vec![
                bet(1, Outcome::Lost, dec!(100), dec!(3)),
                bet(2, Outcome::Pending, dec!(100), dec!(3)),
            ],
            has_top_ups: false,
        };
        let records = migrate_v1(table, dec!(1000)).unwrap();
        assert_eq!(records[0].label, "Coupon #1");
        assert_eq!(records[0].top_up, dec!(1000));
        assert_eq!(records[0].balance, dec!(-100));
        assert_eq!(records[1].top_up, Decimal::ZERO);
        assert_eq!(records[1].cumulative_top_ups, dec!(1000));
        assert_eq!(records[1].cumulative_staked, dec!(100));
        assert!(Accountant::reconcile(&records).is_ok());
    }

    #[test]
    fn test_migrate_v1_keeps_recorded_deposits() {
        let mut first = bet(1, Outcome::Lost, dec!(100), dec!(3));
        first.top_up = dec!(400);
        let table = LegacyTable {
            rows: vec![first],
            has_top_ups: true,
        };
        let records = migrate_v1(table, dec!(1000)).unwrap();
        assert_eq!(records[0].top_up, dec!(400));
        assert_eq!(records[0].capital(), dec!(400));
    }
}
