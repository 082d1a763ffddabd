//! CSV record encoder.
//!
//! Formats one record at a time into a reused line buffer, so the encoder
//! never holds more than a single record regardless of export size. Header
//! fields are always quoted; data fields are quoted only when they contain
//! the delimiter, the quote character, CR, or LF, with embedded quotes
//! doubled. Lines terminate with LF.

use std::collections::HashMap;
use thiserror::Error;

/// A row rendered to canonical text, keyed by column name.
///
/// Columns absent from the map encode as empty fields.
pub type ExportRecord = HashMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DialectError {
    #[error("delimiter must be a single character")]
    DelimiterLength,
    #[error("quote character must be a single character")]
    QuoteLength,
    #[error("delimiter must be a printable ASCII character")]
    DelimiterNotAscii,
    #[error("quote character must be a printable ASCII character")]
    QuoteNotAscii,
    #[error("delimiter and quote character must differ")]
    DelimiterEqualsQuote,
}

/// CSV dialect: the delimiter/quote pair governing serialization.
///
/// Both are single printable ASCII bytes, validated at construction, so
/// the encoder itself cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    delimiter: u8,
    quote: u8,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl Dialect {
    /// Build a dialect from user-supplied characters
    pub fn new(delimiter: &str, quote: &str) -> Result<Self, DialectError> {
        let delimiter = match single_char(delimiter) {
            None => return Err(DialectError::DelimiterLength),
            Some(c) if !(c.is_ascii_graphic() || c == ' ' || c == '\t') => {
                return Err(DialectError::DelimiterNotAscii)
            },
            Some(c) => c as u8,
        };
        let quote = match single_char(quote) {
            None => return Err(DialectError::QuoteLength),
            Some(c) if !c.is_ascii_graphic() => return Err(DialectError::QuoteNotAscii),
            Some(c) => c as u8,
        };
        if delimiter == quote {
            return Err(DialectError::DelimiterEqualsQuote);
        }
        Ok(Self { delimiter, quote })
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn quote(&self) -> u8 {
        self.quote
    }
}

/// Exactly one character, or nothing
fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Streaming encoder for one export's records
#[derive(Debug)]
pub struct CsvEncoder {
    columns: Vec<String>,
    dialect: Dialect,
    // One-record working set, reused across encode calls
    buf: Vec<u8>,
}

impl CsvEncoder {
    pub fn new(columns: Vec<String>, dialect: Dialect) -> Self {
        Self {
            columns,
            dialect,
            buf: Vec::with_capacity(256),
        }
    }

    /// The header line: every column name quoted, in column order
    pub fn header(&mut self) -> &[u8] {
        self.buf.clear();
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                self.buf.push(self.dialect.delimiter);
            }
            let quote = self.dialect.quote;
            self.buf.push(quote);
            for &b in column.as_bytes() {
                self.buf.push(b);
                if b == quote {
                    self.buf.push(quote);
                }
            }
            self.buf.push(quote);
        }
        self.buf.push(b'\n');
        &self.buf
    }

    /// One data line, fields in column order, missing keys empty
    pub fn encode(&mut self, record: &ExportRecord) -> &[u8] {
        self.buf.clear();
        let Dialect { delimiter, quote } = self.dialect;
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                self.buf.push(delimiter);
            }
            let value = record.get(column).map(String::as_str).unwrap_or("");
            if needs_quoting(value, delimiter, quote) {
                self.buf.push(quote);
                for &b in value.as_bytes() {
                    self.buf.push(b);
                    if b == quote {
                        self.buf.push(quote);
                    }
                }
                self.buf.push(quote);
            } else {
                self.buf.extend_from_slice(value.as_bytes());
            }
        }
        self.buf.push(b'\n');
        &self.buf
    }
}

fn needs_quoting(value: &str, delimiter: u8, quote: u8) -> bool {
    value
        .bytes()
        .any(|b| b == delimiter || b == quote || b == b'\n' || b == b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> ExportRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn encoder(columns: &[&str], dialect: Dialect) -> CsvEncoder {
        CsvEncoder::new(columns.iter().map(|c| c.to_string()).collect(), dialect)
    }

    #[test]
    fn test_dialect_defaults() {
        let d = Dialect::default();
        assert_eq!(d.delimiter(), b',');
        assert_eq!(d.quote(), b'"');
    }

    #[test]
    fn test_dialect_rejects_equal_chars() {
        assert_eq!(Dialect::new(",", ","), Err(DialectError::DelimiterEqualsQuote));
    }

    #[test]
    fn test_dialect_rejects_multichar() {
        assert_eq!(Dialect::new(";;", "\""), Err(DialectError::DelimiterLength));
        assert_eq!(Dialect::new(",", "''"), Err(DialectError::QuoteLength));
        assert_eq!(Dialect::new("", "\""), Err(DialectError::DelimiterLength));
    }

    #[test]
    fn test_dialect_rejects_non_ascii() {
        // Multi-byte code points are not single-byte delimiters
        assert_eq!(Dialect::new("€", "\""), Err(DialectError::DelimiterNotAscii));
        assert_eq!(Dialect::new(",", "»"), Err(DialectError::QuoteNotAscii));
    }

    #[test]
    fn test_header_always_quoted() {
        let mut enc = encoder(&["id", "email"], Dialect::default());
        assert_eq!(enc.header(), b"\"id\",\"email\"\n");
    }

    #[test]
    fn test_header_with_pipe_delimiter() {
        let dialect = Dialect::new("|", "\"").unwrap();
        let mut enc = encoder(&["id", "email"], dialect);
        assert_eq!(enc.header(), b"\"id\"|\"email\"\n");
    }

    #[test]
    fn test_default_header_full_column_list() {
        let mut enc = encoder(
            &[
                "id",
                "name",
                "email",
                "signup_date",
                "country_code",
                "subscription_tier",
                "lifetime_value",
            ],
            Dialect::default(),
        );
        assert_eq!(
            enc.header(),
            b"\"id\",\"name\",\"email\",\"signup_date\",\"country_code\",\"subscription_tier\",\"lifetime_value\"\n"
        );
    }

    #[test]
    fn test_plain_fields_unquoted() {
        let mut enc = encoder(&["id", "name"], Dialect::default());
        let line = enc.encode(&record(&[("id", "7"), ("name", "Ada")]));
        assert_eq!(line, b"7,Ada\n");
    }

    #[test]
    fn test_embedded_quote_doubled() {
        let mut enc = encoder(&["name"], Dialect::default());
        let line = enc.encode(&record(&[("name", r#"She said "hi", loudly"#)]));
        assert_eq!(line, b"\"She said \"\"hi\"\", loudly\"\n");
    }

    #[test]
    fn test_delimiter_triggers_quoting() {
        let mut enc = encoder(&["a", "b"], Dialect::default());
        let line = enc.encode(&record(&[("a", "x,y"), ("b", "z")]));
        assert_eq!(line, b"\"x,y\",z\n");
    }

    #[test]
    fn test_newline_and_cr_trigger_quoting() {
        let mut enc = encoder(&["a"], Dialect::default());
        assert_eq!(enc.encode(&record(&[("a", "x\ny")])), b"\"x\ny\"\n");
        assert_eq!(enc.encode(&record(&[("a", "x\ry")])), b"\"x\ry\"\n");
    }

    #[test]
    fn test_missing_key_is_empty_field() {
        let mut enc = encoder(&["id", "name", "email"], Dialect::default());
        let line = enc.encode(&record(&[("id", "1"), ("email", "a@b.c")]));
        assert_eq!(line, b"1,,a@b.c\n");
    }

    #[test]
    fn test_custom_dialect_quoting_triggers() {
        let dialect = Dialect::new("|", "'").unwrap();
        let mut enc = encoder(&["a", "b"], dialect);
        // Comma is plain under a pipe dialect; pipe is not
        let line = enc.encode(&record(&[("a", "x,y"), ("b", "u|v")]));
        assert_eq!(line, b"x,y|'u|v'\n");
    }

    #[test]
    fn test_deterministic_output() {
        let mut enc = encoder(&["a", "b"], Dialect::default());
        let rec = record(&[("a", "1"), ("b", "two")]);
        let first = enc.encode(&rec).to_vec();
        let second = enc.encode(&rec).to_vec();
        assert_eq!(first, second);
    }
}
