use anyhow::{Context, Result};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Comma,
}

impl Delimiter {
    /// A tab anywhere in the header line selects tab-splitting for the whole file.
    pub fn detect(header_line: &str) -> Self {
        if header_line.contains('\t') {
            Delimiter::Tab
        } else {
            Delimiter::Comma
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

/// Splits on `\n` / `\r\n` and drops lines that are blank after trimming.
pub fn split_lines(content: &str) -> Vec<&str> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Tokenizes one line. Each line is read on its own, so a stray quote can only
/// disturb the line it appears on.
pub fn tokenize_line(line: &str, delimiter: Delimiter) -> Result<Vec<String>> {
    if delimiter == Delimiter::Tab {
        // registrar tab exports are unquoted
        return Ok(line.split('\t').map(str::to_string).collect());
    }
    if has_inner_quote(line, delimiter) {
        return Ok(split_toggling(line, delimiter));
    }

    // lines are already split, so a lone '\r' must not end the record
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter.as_byte())
        .double_quote(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_reader(Cursor::new(line.as_bytes()));

    match rdr.records().next() {
        Some(result) => {
            let record = result.context("Failed to tokenize line")?;
            Ok(record.iter().map(str::to_string).collect())
        }
        None => Ok(vec![String::new()]),
    }
}

/// True when a quote opens mid-field or a closing quote is followed by
/// anything but the delimiter. Such lines need the toggling split.
fn has_inner_quote(line: &str, delimiter: Delimiter) -> bool {
    let delimiter = delimiter.as_byte();
    let mut bytes = line.bytes().peekable();
    let mut in_quotes = false;
    let mut field_start = true;

    while let Some(b) = bytes.next() {
        if in_quotes {
            if b == b'"' {
                if bytes.peek() == Some(&b'"') {
                    bytes.next();
                } else {
                    in_quotes = false;
                    if bytes.peek().is_some_and(|next| *next != delimiter) {
                        return true;
                    }
                }
            }
            continue;
        }
        if b == b'"' {
            if !field_start {
                return true;
            }
            in_quotes = true;
        }
        field_start = b == delimiter;
    }
    false
}

/// Every quote flips the quoted state wherever it sits; `""` inside quotes is
/// a literal quote.
fn split_toggling(line: &str, delimiter: Delimiter) -> Vec<String> {
    let delimiter = char::from(delimiter.as_byte());
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                current.push('"');
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}
