//! Placeholder scanning for SQL text.
//!
//! Finds `?` markers and `:name` markers outside of string literals,
//! quoted identifiers, and comments, and rewrites named markers onto
//! positional slots. One name may appear several times and maps
//! many-to-one onto slot indexes.

use std::collections::HashMap;

/// Lexing switches that mirror the server's SQL mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlMode {
    /// Double quotes delimit strings rather than identifiers
    /// (`ANSI_QUOTES`).
    pub ansi_quotes: bool,

    /// Backslash is an ordinary character inside strings
    /// (`NO_BACKSLASH_ESCAPES`).
    pub no_backslash_escapes: bool,
}

/// A query scanned for placeholders.
#[derive(Debug)]
pub struct ParsedQuery {
    sql: String,
    placeholders: usize,
    named: HashMap<String, Vec<usize>>,
}

impl ParsedQuery {
    /// Scans `sql` under the given mode. Named markers are rewritten to
    /// `?` in [`sql()`][Self::sql]; everything else passes through
    /// byte for byte.
    pub fn parse(sql: &str, mode: SqlMode) -> Self {
        Scanner::new(sql, mode).run()
    }

    /// The rewritten statement text, with every marker positional.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Total number of parameter slots.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders
    }

    /// The slot indexes a named parameter maps to, in order of
    /// appearance. Empty for unknown names.
    pub fn indexes_of(&self, name: &str) -> &[usize] {
        self.named.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    mode: SqlMode,
    out: String,
    placeholders: usize,
    named: HashMap<String, Vec<usize>>,
}

impl<'a> Scanner<'a> {
    fn new(sql: &'a str, mode: SqlMode) -> Self {
        Self {
            src: sql.as_bytes(),
            pos: 0,
            mode,
            out: String::with_capacity(sql.len()),
            placeholders: 0,
            named: HashMap::new(),
        }
    }

    fn run(mut self) -> ParsedQuery {
        while let Some(byte) = self.peek() {
            match byte {
                b'\'' => self.quoted_span(b'\'', !self.mode.no_backslash_escapes),

                // ANSI_QUOTES turns double quotes into string delimiters;
                // either way the span hides markers, only the escape
                // rules differ
                b'"' => self.quoted_span(
                    b'"',
                    self.mode.ansi_quotes && !self.mode.no_backslash_escapes,
                ),

                b'`' => self.quoted_span(b'`', false),

                b'#' => self.line_comment(1),

                b'-' if self.starts_line_comment() => self.line_comment(2),

                b'/' if self.peek_at(1) == Some(b'*') => self.block_comment(),

                b'?' => {
                    self.pos += 1;
                    self.out.push('?');
                    self.placeholders += 1;
                }

                b':' if self.starts_named_marker() => self.named_marker(),

                _ => self.copy_one(),
            }
        }

        ParsedQuery {
            sql: self.out,
            placeholders: self.placeholders,
            named: self.named,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    // copies the current character (not byte: the source is UTF-8)
    fn copy_one(&mut self) {
        let byte = self.src[self.pos];

        if byte.is_ascii() {
            self.out.push(byte as char);
            self.pos += 1;
        } else {
            let mut end = self.pos + 1;
            while end < self.src.len() && self.src[end] & 0xC0 == 0x80 {
                end += 1;
            }

            self.out
                .push_str(std::str::from_utf8(&self.src[self.pos..end]).unwrap_or(""));
            self.pos = end;
        }
    }

    // `-- ` opens a comment only when followed by whitespace or the end
    // of the statement
    fn starts_line_comment(&self) -> bool {
        self.peek_at(1) == Some(b'-')
            && self
                .peek_at(2)
                .map(|b| b.is_ascii_whitespace())
                .unwrap_or(true)
    }

    fn starts_named_marker(&self) -> bool {
        // `:=` is assignment; `::` never reaches MySQL but is left alone
        matches!(self.peek_at(1), Some(b) if b == b'_' || b.is_ascii_alphabetic())
    }

    fn quoted_span(&mut self, delimiter: u8, backslash_escapes: bool) {
        self.copy_one();

        while let Some(byte) = self.peek() {
            if byte == b'\\' && backslash_escapes {
                self.copy_one();
                if self.peek().is_some() {
                    self.copy_one();
                }
                continue;
            }

            if byte == delimiter {
                // a doubled delimiter is an escaped delimiter
                if self.peek_at(1) == Some(delimiter) {
                    self.copy_one();
                    self.copy_one();
                    continue;
                }

                self.copy_one();
                return;
            }

            self.copy_one();
        }
    }

    fn line_comment(&mut self, opener: usize) {
        for _ in 0..opener {
            self.copy_one();
        }

        while let Some(byte) = self.peek() {
            if byte == b'\n' {
                break;
            }

            self.copy_one();
        }
    }

    fn block_comment(&mut self) {
        self.copy_one();
        self.copy_one();

        while self.peek().is_some() {
            if self.peek() == Some(b'*') && self.peek_at(1) == Some(b'/') {
                self.copy_one();
                self.copy_one();
                return;
            }

            self.copy_one();
        }
    }

    fn named_marker(&mut self) {
        let start = self.pos + 1;
        let mut end = start;

        while end < self.src.len()
            && (self.src[end] == b'_' || self.src[end].is_ascii_alphanumeric())
        {
            end += 1;
        }

        let name = std::str::from_utf8(&self.src[start..end])
            .expect("ASCII range was just validated")
            .to_owned();

        self.named
            .entry(name)
            .or_default()
            .push(self.placeholders);

        self.out.push('?');
        self.placeholders += 1;
        self.pos = end;
    }
}
