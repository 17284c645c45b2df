//! Value normalization and encoding repair.
//!
//! [`ValueNormalizer`] runs on every row before insertion and only touches
//! temporal values. The repair functions are fallbacks used by the loader
//! after a row has been rejected; they are never on the normal path.

use chrono::{NaiveDateTime, NaiveTime};

use crate::core::value::{Row, SqlValue, Temporal};

/// The zero-date prefix MySQL uses for unset non-nullable temporal columns.
const ZERO_DATE: &str = "0000-00-00";

/// Rewrites source temporal forms the target rejects.
#[derive(Debug, Clone)]
pub struct ValueNormalizer {
    placeholder: NaiveDateTime,
}

impl ValueNormalizer {
    pub fn new(placeholder: NaiveDateTime) -> Self {
        Self { placeholder }
    }

    pub fn placeholder(&self) -> NaiveDateTime {
        self.placeholder
    }

    /// Normalize every value of a row.
    pub fn normalize_row(&self, row: Row) -> Row {
        row.into_iter().map(|v| self.normalize(v)).collect()
    }

    /// Normalize one value. Non-temporal values pass through.
    pub fn normalize(&self, value: SqlValue) -> SqlValue {
        match value {
            SqlValue::Temporal(Temporal::Raw(raw)) => SqlValue::Temporal(self.normalize_raw(raw)),
            other => other,
        }
    }

    fn normalize_raw(&self, raw: String) -> Temporal {
        let trimmed = raw.trim();
        let Some(rest) = trimmed.strip_prefix(ZERO_DATE) else {
            return Temporal::Raw(raw);
        };

        let time_part = rest.trim_start();
        if time_part.is_empty() {
            // `0000-00-00` in a DATE column
            return Temporal::Date(self.placeholder.date());
        }
        if is_zero_time(time_part) {
            return Temporal::Timestamp(self.placeholder);
        }
        match NaiveTime::parse_from_str(time_part, "%H:%M:%S%.f") {
            Ok(time) => Temporal::Timestamp(self.placeholder.date().and_time(time)),
            Err(_) => Temporal::Raw(raw),
        }
    }
}

fn is_zero_time(s: &str) -> bool {
    s.chars().all(|c| matches!(c, '0' | ':' | '.'))
}

/// Drop invalid UTF-8 sequences from every text value.
///
/// Returns `None` when no value changed.
pub fn repair_utf8(row: &[SqlValue]) -> Option<Row> {
    let mut changed = false;
    let repaired = row
        .iter()
        .map(|value| match value {
            SqlValue::Text(bytes) if std::str::from_utf8(bytes).is_err() => {
                changed = true;
                SqlValue::Text(strip_invalid_utf8(bytes).into_bytes())
            }
            other => other.clone(),
        })
        .collect();
    changed.then_some(repaired)
}

/// Transliterate every text value to 7-bit ASCII.
///
/// Invalid UTF-8 is dropped first. Returns `None` when no value changed.
pub fn transliterate_ascii(row: &[SqlValue]) -> Option<Row> {
    let mut changed = false;
    let transliterated = row
        .iter()
        .map(|value| match value {
            SqlValue::Text(bytes) if !bytes.is_ascii() => {
                changed = true;
                let text = strip_invalid_utf8(bytes);
                SqlValue::Text(deunicode::deunicode_with_tofu(&text, "?").into_bytes())
            }
            other => other.clone(),
        })
        .collect();
    changed.then_some(transliterated)
}

fn strip_invalid_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Numeric;
    use chrono::NaiveDate;

    fn normalizer() -> ValueNormalizer {
        let placeholder = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ValueNormalizer::new(placeholder)
    }

    fn raw(s: &str) -> SqlValue {
        SqlValue::Temporal(Temporal::Raw(s.to_string()))
    }

    #[test]
    fn test_zero_timestamp_becomes_placeholder() {
        let n = normalizer();
        for zero in ["0000-00-00 00:00:00", "0000-00-00 00:00:00.000000"] {
            assert_eq!(
                n.normalize(raw(zero)),
                SqlValue::Temporal(Temporal::Timestamp(n.placeholder()))
            );
        }
    }

    #[test]
    fn test_zero_date_becomes_placeholder_date() {
        let n = normalizer();
        assert_eq!(
            n.normalize(raw("0000-00-00")),
            SqlValue::Temporal(Temporal::Date(n.placeholder().date()))
        );
    }

    #[test]
    fn test_zero_date_prefix_keeps_time_of_day() {
        let n = normalizer();
        let expected = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(12, 34, 56)
            .unwrap();
        assert_eq!(
            n.normalize(raw("0000-00-00 12:34:56")),
            SqlValue::Temporal(Temporal::Timestamp(expected))
        );
    }

    #[test]
    fn test_custom_placeholder() {
        let placeholder = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let n = ValueNormalizer::new(placeholder);
        assert_eq!(
            n.normalize(raw("0000-00-00 00:00:00")),
            SqlValue::Temporal(Temporal::Timestamp(placeholder))
        );
    }

    #[test]
    fn test_other_values_pass_through() {
        let n = normalizer();
        let values = vec![
            SqlValue::Null,
            SqlValue::text("0000-00-00 00:00:00"),
            SqlValue::Numeric(Numeric::Int(0)),
            raw("838:59:59"),
            raw("0000-00-00 25:99:00"),
        ];
        assert_eq!(n.normalize_row(values.clone()), values);
    }

    #[test]
    fn test_repair_utf8_drops_invalid_bytes() {
        let row = vec![
            SqlValue::int(1),
            SqlValue::Text(b"caf\xc3\xa9 \xff\xfeok".to_vec()),
        ];
        let repaired = repair_utf8(&row).unwrap();
        assert_eq!(repaired[0], SqlValue::int(1));
        assert_eq!(repaired[1].as_str(), Some("café ok"));
    }

    #[test]
    fn test_repair_utf8_unchanged_is_none() {
        assert!(repair_utf8(&[SqlValue::text("fine"), SqlValue::Null]).is_none());
    }

    #[test]
    fn test_transliterate_ascii() {
        let row = vec![SqlValue::text("Zoë Ångström"), SqlValue::text("plain")];
        let ascii = transliterate_ascii(&row).unwrap();
        assert_eq!(ascii[0].as_str(), Some("Zoe Angstrom"));
        assert_eq!(ascii[1].as_str(), Some("plain"));
    }

    #[test]
    fn test_transliterate_ascii_drops_invalid_bytes() {
        let row = vec![SqlValue::Text(b"na\xefve \xff".to_vec())];
        let ascii = transliterate_ascii(&row).unwrap();
        assert!(ascii[0].as_str().unwrap().is_ascii());
    }

    #[test]
    fn test_transliterate_ascii_unchanged_is_none() {
        assert!(transliterate_ascii(&[SqlValue::text("already ascii")]).is_none());
    }
}
