pub mod mis;
pub mod wbr;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::{debug, info};

use crate::headers::{AliasTable, AliasTables, CanonicalField, ColumnMap, normalize_header};
use crate::models::{ImportFormat, ParseErrorKind, ParseOutcome, ParsedRecord, RowError};
use crate::tokenizer::{Delimiter, split_lines, tokenize_line};

/// One registrar format's row shape.
pub trait RegistrarRecord: Sized {
    type Field: CanonicalField;

    /// Builds a record from one tokenized data row. `now` stands in for any
    /// absent date so the whole file shares one parse-time timestamp.
    fn from_row(
        row: usize,
        columns: &ColumnMap<Self::Field>,
        values: &[String],
        now: NaiveDateTime,
    ) -> Result<Self, RowError>;

    fn into_parsed(self) -> ParsedRecord;
}

pub fn parse(format: ImportFormat, content: &str, aliases: &AliasTables) -> ParseOutcome {
    parse_at(format, content, aliases, Utc::now().naive_utc())
}

pub fn parse_at(format: ImportFormat, content: &str, aliases: &AliasTables, now: NaiveDateTime) -> ParseOutcome {
    let outcome = match format {
        ImportFormat::Wbr => parse_export::<wbr::WbrRow>(content, &aliases.wbr, now),
        ImportFormat::Mis => parse_export::<mis::MisRow>(content, &aliases.mis, now),
    };
    info!(
        "Parsed {} export: {} records, {} errors",
        format,
        outcome.records.len(),
        outcome.errors.len()
    );
    outcome
}

pub fn parse_export<R: RegistrarRecord>(
    content: &str,
    aliases: &AliasTable<R::Field>,
    now: NaiveDateTime,
) -> ParseOutcome {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let lines = split_lines(content);
    if lines.len() < 2 {
        return ParseOutcome {
            records: Vec::new(),
            errors: vec![RowError::file_level(
                "",
                "File is empty or has no data rows",
                ParseErrorKind::EmptyFile,
            )],
        };
    }

    let delimiter = Delimiter::detect(lines[0]);
    let headers: Vec<String> = match tokenize_line(lines[0], delimiter) {
        Ok(cells) => cells.iter().map(|h| normalize_header(h)).collect(),
        Err(e) => {
            return ParseOutcome {
                records: Vec::new(),
                errors: vec![RowError::file_level(
                    "",
                    format!("Failed to parse header: {}", e),
                    ParseErrorKind::MalformedRow,
                )],
            };
        }
    };

    let columns = match aliases.resolve(&headers) {
        Ok(columns) => columns,
        Err(err) => {
            return ParseOutcome {
                records: Vec::new(),
                errors: vec![err],
            };
        }
    };

    let mut outcome = ParseOutcome::default();
    for (i, line) in lines.iter().enumerate().skip(1) {
        let row = i + 1;
        let values = match tokenize_line(line, delimiter) {
            Ok(values) => values,
            Err(e) => {
                debug!("Row {} could not be tokenized: {}", row, e);
                outcome.errors.push(RowError::new(
                    row,
                    "",
                    format!("Failed to parse row: {}", e),
                    ParseErrorKind::MalformedRow,
                ));
                continue;
            }
        };

        match R::from_row(row, &columns, &values, now) {
            Ok(record) => outcome.records.push(record.into_parsed()),
            Err(err) => outcome.errors.push(err),
        }
    }
    outcome
}

/// Investor name, scheme name and units are mandatory on every row; units must
/// be a strictly positive number.
pub(crate) fn required_fields(
    row: usize,
    investor_name: Option<&str>,
    scheme_name: Option<&str>,
    units: Option<&str>,
) -> Result<(String, String, Decimal), RowError> {
    let (Some(investor_name), Some(scheme_name), Some(units_raw)) = (investor_name, scheme_name, units) else {
        return Err(RowError::new(
            row,
            "investorName/schemeName/units",
            "Missing required fields",
            ParseErrorKind::MissingRequiredFields,
        ));
    };

    match parse_number(units_raw) {
        Some(units) if units > Decimal::ZERO => Ok((investor_name.to_string(), scheme_name.to_string(), units)),
        _ => Err(RowError::new(
            row,
            "units",
            format!("Invalid units: {}", units_raw),
            ParseErrorKind::InvalidUnits,
        )),
    }
}

/// Registrar numbers may carry thousands separators or a rupee sign.
pub fn parse_number(raw: &str) -> Option<Decimal> {
    let clean: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '₹' && !c.is_whitespace())
        .collect();
    if clean.is_empty() {
        return None;
    }
    Decimal::from_str(&clean)
        .or_else(|_| Decimal::from_scientific(&clean))
        .ok()
}

/// Non-fatal numeric: absent or unparseable reads as zero.
pub fn number_or_zero(raw: Option<&str>) -> Decimal {
    raw.and_then(parse_number).unwrap_or(Decimal::ZERO)
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%d-%b-%Y", "%d %b %Y", "%d-%b-%y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%d-%b-%Y %H:%M:%S"];

pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_number(" ₹ 500 "), Some(dec!(500)));
        assert_eq!(parse_number("-3.5"), Some(dec!(-3.5)));
        assert_eq!(parse_number("1e3"), Some(dec!(1000)));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_number_or_zero() {
        assert_eq!(number_or_zero(None), Decimal::ZERO);
        assert_eq!(number_or_zero(Some("n/a")), Decimal::ZERO);
        assert_eq!(number_or_zero(Some("42.10")), dec!(42.10));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(parse_date("2024-03-31"), Some(expected));
        assert_eq!(parse_date("31-03-2024"), Some(expected));
        assert_eq!(parse_date("31/03/2024"), Some(expected));
        assert_eq!(parse_date("31-Mar-2024"), Some(expected));
        assert_eq!(parse_date("31 Mar 2024"), Some(expected));
        assert_eq!(parse_date("March 31st"), None);
    }

    #[test]
    fn test_required_fields_rejects_non_positive_units() {
        for raw in ["0", "-1", "abc", "-0.001"] {
            let err = required_fields(3, Some("Asha"), Some("Alpha Fund"), Some(raw)).unwrap_err();
            assert_eq!(err.kind, ParseErrorKind::InvalidUnits);
            assert_eq!(err.row, 3);
            assert_eq!(err.message, format!("Invalid units: {}", raw));
        }
    }

    #[test]
    fn test_required_fields_missing_text() {
        let err = required_fields(2, None, Some("Alpha Fund"), Some("1")).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingRequiredFields);
        assert_eq!(err.message, "Missing required fields");
        let err = required_fields(2, Some("Asha"), Some("Alpha Fund"), None).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MissingRequiredFields);
    }

    #[test]
    fn test_required_fields_accepts_exact_units() {
        let (name, scheme, units) = required_fields(2, Some("Asha"), Some("Alpha Fund"), Some("12.3456")).unwrap();
        assert_eq!(name, "Asha");
        assert_eq!(scheme, "Alpha Fund");
        assert_eq!(units, dec!(12.3456));
    }
}
