//! Loader for Moodle language packs.
//!
//! Language files are PHP sources that assign into a `$string` array:
//!
//! ```php
//! <?php
//! $string['pluginname'] = 'Forum';
//! $string['intro'] = 'First line' . "\n" . 'second line';
//! ```
//!
//! Files are parsed, never evaluated. Only string literals joined with `.`
//! are accepted on the right-hand side of a `$string[...]` assignment; other
//! statements are skipped. Text outside `<?php ... ?>` blocks is inline
//! output and ignored. Each call returns a fresh table.

use mlcompare_common::{MlCompareError, StringTable};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

const STRING_VAR: &str = "$string";
const OPEN_TAG: &str = "<?php";
const CLOSE_TAG: &str = "?>";
const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct StringParseError {
    pub line: usize,
    pub message: String,
}

/// Read and parse the language file at `path`
pub fn load_string_table(path: &Path) -> Result<StringTable, MlCompareError> {
    let source = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::InvalidData => MlCompareError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: "file is not valid UTF-8".to_string(),
        },
        _ => MlCompareError::FileNotFound(path.to_path_buf()),
    })?;

    let table = parse_string_table(&source).map_err(|e| MlCompareError::Parse {
        path: path.to_path_buf(),
        line: e.line,
        message: e.message,
    })?;

    debug!("Loaded {} strings from {:?}", table.len(), path);
    Ok(table)
}

/// Parse language file source into a string table
pub fn parse_string_table(source: &str) -> Result<StringTable, StringParseError> {
    Parser::new(source).parse()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn parse(mut self) -> Result<StringTable, StringParseError> {
        let mut table = StringTable::new();

        if self.peek() == Some(BYTE_ORDER_MARK) {
            self.bump();
        }

        while self.skip_inline_text() {
            self.advance_by(OPEN_TAG.len());

            loop {
                self.skip_trivia()?;
                if self.at_end() {
                    break;
                }
                if self.starts_with(CLOSE_TAG) {
                    self.advance_by(CLOSE_TAG.len());
                    break;
                }

                if self.at_string_var() {
                    let (key, value) = self.parse_assignment()?;
                    // PHP semantics: the last assignment wins
                    table.insert(key, value);
                } else {
                    self.skip_statement()?;
                }
            }
        }

        Ok(table)
    }

    /// Skip output text up to the next `<?php`; false when there is none
    fn skip_inline_text(&mut self) -> bool {
        while !self.at_end() {
            if self.starts_with(OPEN_TAG) {
                return true;
            }
            self.bump();
        }
        false
    }

    /// `$string['key'] = 'value' . 'more';`
    fn parse_assignment(&mut self) -> Result<(String, String), StringParseError> {
        self.advance_by(STRING_VAR.len());
        self.skip_trivia()?;
        self.expect('[')?;
        self.skip_trivia()?;
        let key = self.parse_literal()?;
        self.skip_trivia()?;
        self.expect(']')?;
        self.skip_trivia()?;
        self.expect('=')?;
        self.skip_trivia()?;

        let mut value = self.parse_literal()?;
        loop {
            self.skip_trivia()?;
            if self.peek() == Some('.') {
                self.bump();
                self.skip_trivia()?;
                value.push_str(&self.parse_literal()?);
            } else {
                break;
            }
        }

        self.expect(';')?;
        Ok((key, value))
    }

    fn parse_literal(&mut self) -> Result<String, StringParseError> {
        match self.peek() {
            Some('\'') => self.parse_single_quoted(),
            Some('"') => self.parse_double_quoted(),
            Some(c) => Err(self.error(format!("expected string literal, found '{c}'"))),
            None => Err(self.error("expected string literal, found end of file")),
        }
    }

    fn parse_single_quoted(&mut self) -> Result<String, StringParseError> {
        let start_line = self.line;
        self.bump();
        let mut out = String::new();

        loop {
            match self.bump() {
                None => return Err(self.unterminated(start_line)),
                Some('\'') => return Ok(out),
                Some('\\') => match self.peek() {
                    Some(c @ ('\'' | '\\')) => {
                        self.bump();
                        out.push(c);
                    }
                    _ => out.push('\\'),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Double-quoted literal. Escapes are decoded; `$` is kept as-is, since
    /// variables are never interpolated.
    fn parse_double_quoted(&mut self) -> Result<String, StringParseError> {
        let start_line = self.line;
        self.bump();
        let mut out = String::new();

        loop {
            match self.bump() {
                None => return Err(self.unterminated(start_line)),
                Some('"') => return Ok(out),
                Some('\\') => {
                    let escaped = match self.peek() {
                        Some('n') => Some('\n'),
                        Some('r') => Some('\r'),
                        Some('t') => Some('\t'),
                        Some('v') => Some('\u{0b}'),
                        Some('e') => Some('\u{1b}'),
                        Some('f') => Some('\u{0c}'),
                        Some(c @ ('\\' | '$' | '"')) => Some(c),
                        _ => None,
                    };
                    match escaped {
                        Some(c) => {
                            self.bump();
                            out.push(c);
                        }
                        None => out.push('\\'),
                    }
                }
                Some(c) => out.push(c),
            }
        }
    }

    /// Skip a statement this loader does not interpret, up to its `;`
    fn skip_statement(&mut self) -> Result<(), StringParseError> {
        while let Some(c) = self.peek() {
            match c {
                ';' => {
                    self.bump();
                    return Ok(());
                }
                '\'' => {
                    self.parse_single_quoted()?;
                }
                '"' => {
                    self.parse_double_quoted()?;
                }
                '/' | '#' if self.at_comment() => self.skip_trivia()?,
                _ if self.starts_with(CLOSE_TAG) => return Ok(()),
                _ => {
                    self.bump();
                }
            }
        }
        Ok(())
    }

    fn skip_trivia(&mut self) -> Result<(), StringParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => self.skip_line_comment(),
                Some('/') if self.starts_with("//") => self.skip_line_comment(),
                Some('/') if self.starts_with("/*") => {
                    let start_line = self.line;
                    self.advance_by(2);
                    loop {
                        if self.at_end() {
                            return Err(StringParseError {
                                line: start_line,
                                message: "unterminated block comment".to_string(),
                            });
                        }
                        if self.starts_with("*/") {
                            self.advance_by(2);
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Line comments stop before a newline or a closing `?>` tag
    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || self.starts_with(CLOSE_TAG) {
                break;
            }
            self.bump();
        }
    }

    fn at_comment(&self) -> bool {
        self.starts_with("#") || self.starts_with("//") || self.starts_with("/*")
    }

    fn at_string_var(&self) -> bool {
        if !self.starts_with(STRING_VAR) {
            return false;
        }
        match self.chars.get(self.pos + STRING_VAR.len()) {
            Some(c) => !(c.is_alphanumeric() || *c == '_'),
            None => true,
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), StringParseError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of file"))),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut idx = self.pos;
        for expected in s.chars() {
            if self.chars.get(idx) != Some(&expected) {
                return false;
            }
            idx += 1;
        }
        true
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn advance_by(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn error(&self, message: impl Into<String>) -> StringParseError {
        StringParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn unterminated(&self, start_line: usize) -> StringParseError {
        StringParseError {
            line: start_line,
            message: "unterminated string literal".to_string(),
        }
    }
}
