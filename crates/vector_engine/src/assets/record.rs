//! Hierarchical text record format
//!
//! A record is an optional label, a run of tokens, and an optional
//! brace-delimited block of child records:
//!
//! ```text
//! # comment
//! SetColor 1.0 0.5 0.0 1.0
//! VertexArray
//! {
//!     0 0 0
//!     1 1 0
//! }
//! Debug "outline pass"
//! ```
//!
//! Lines that start with a value instead of a label produce label-less
//! records, which is how arrays are spelled. The parser is purely structural;
//! giving labels meaning is left to the importers.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Errors produced while reading records or pulling fields out of them
#[derive(Error, Debug)]
pub enum RecordError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Text is not well formed
    #[error("Syntax error on line {line}: {message}")]
    Syntax {
        /// 1-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// A required token is absent
    #[error("Record '{label}' is missing token {index}")]
    MissingField {
        /// Label of the record that was queried
        label: String,
        /// Token index that was requested
        index: usize,
    },

    /// A required child record is absent
    #[error("Record '{label}' has no child '{child}'")]
    MissingChild {
        /// Label of the parent record
        label: String,
        /// Label that was requested
        child: String,
    },

    /// A token has the wrong type
    #[error("Record '{label}' token {index}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Label of the record that was queried
        label: String,
        /// Token index
        index: usize,
        /// Expected token kind
        expected: &'static str,
        /// Actual token, formatted
        found: String,
    },
}

/// A single value on a record line
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Unquoted word
    Label(String),
    /// Integer literal
    Integer(i64),
    /// Floating point literal
    Float(f64),
    /// Quoted string
    String(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Label(word) => write!(f, "{}", word),
            Token::Integer(value) => write!(f, "{}", value),
            Token::Float(value) => {
                if value.fract() == 0.0 && value.is_finite() {
                    write!(f, "{:.1}", value)
                } else {
                    write!(f, "{}", value)
                }
            }
            Token::String(text) => {
                write!(f, "\"")?;
                for ch in text.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "\"")
            }
        }
    }
}

/// One node of a parsed record tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    label: String,
    tokens: Vec<Token>,
    children: Vec<Record>,
    line: usize,
}

impl Record {
    /// Create a record with a label and no tokens
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Builder: append a token
    pub fn with_token(mut self, token: Token) -> Self {
        self.tokens.push(token);
        self
    }

    /// Builder: append a child record
    pub fn with_child(mut self, child: Record) -> Self {
        self.children.push(child);
        self
    }

    /// Parse every top-level record in `text`
    pub fn parse_str(text: &str) -> Result<Vec<Record>, RecordError> {
        let lexemes = lex(text)?;
        let mut parser = Parser { lexemes, position: 0 };
        parser.parse_block(None)
    }

    /// Read and parse a record file
    pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<Record>, RecordError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let records = Self::parse_str(&text)?;
        log::debug!("Loaded {} records from {}", records.len(), path.display());
        Ok(records)
    }

    /// Record label; empty for value-only lines
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Tokens following the label
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Child records from the brace block
    pub fn children(&self) -> &[Record] {
        &self.children
    }

    /// Source line this record started on (0 for built records)
    pub fn line(&self) -> usize {
        self.line
    }

    /// First child with the given label
    pub fn child(&self, label: &str) -> Option<&Record> {
        self.children.iter().find(|c| c.label == label)
    }

    /// First child with the given label, or an error naming it
    pub fn require_child(&self, label: &str) -> Result<&Record, RecordError> {
        self.child(label).ok_or_else(|| RecordError::MissingChild {
            label: self.label.clone(),
            child: label.to_string(),
        })
    }

    /// Token at `index`
    pub fn token(&self, index: usize) -> Result<&Token, RecordError> {
        self.tokens.get(index).ok_or_else(|| RecordError::MissingField {
            label: self.label.clone(),
            index,
        })
    }

    /// Numeric token at `index` as `f32`; integers are accepted
    pub fn float(&self, index: usize) -> Result<f32, RecordError> {
        match self.token(index)? {
            Token::Float(value) => Ok(*value as f32),
            Token::Integer(value) => Ok(*value as f32),
            other => Err(self.mismatch(index, "number", other)),
        }
    }

    /// Integer token at `index`
    pub fn integer(&self, index: usize) -> Result<i64, RecordError> {
        match self.token(index)? {
            Token::Integer(value) => Ok(*value),
            other => Err(self.mismatch(index, "integer", other)),
        }
    }

    /// String or bare-word token at `index`
    pub fn string(&self, index: usize) -> Result<&str, RecordError> {
        match self.token(index)? {
            Token::String(text) | Token::Label(text) => Ok(text),
            other => Err(self.mismatch(index, "string", other)),
        }
    }

    /// Every token of every child, read as `f32`, in order
    pub fn child_floats(&self) -> Result<Vec<f32>, RecordError> {
        let mut values = Vec::new();
        for child in &self.children {
            for index in 0..child.tokens.len() {
                values.push(child.float(index)?);
            }
        }
        Ok(values)
    }

    /// Every token of every child, read as integers, in order
    pub fn child_integers(&self) -> Result<Vec<i64>, RecordError> {
        let mut values = Vec::new();
        for child in &self.children {
            for index in 0..child.tokens.len() {
                values.push(child.integer(index)?);
            }
        }
        Ok(values)
    }

    fn mismatch(&self, index: usize, expected: &'static str, found: &Token) -> RecordError {
        RecordError::TypeMismatch {
            label: self.label.clone(),
            index,
            expected,
            found: found.to_string(),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        write!(f, "{}{}", indent, self.label)?;
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 || !self.label.is_empty() {
                write!(f, " ")?;
            }
            write!(f, "{}", token)?;
        }
        writeln!(f)?;
        if !self.children.is_empty() {
            writeln!(f, "{}{{", indent)?;
            for child in &self.children {
                child.write_indented(f, depth + 1)?;
            }
            writeln!(f, "{}}}", indent)?;
        }
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Lexeme {
    Token(Token),
    Open,
    Close,
    Newline,
}

fn lex(text: &str) -> Result<Vec<(Lexeme, usize)>, RecordError> {
    let mut out = Vec::new();
    for (line_index, line) in text.lines().enumerate() {
        let line_number = line_index + 1;
        let mut chars = line.chars().peekable();
        while let Some(&ch) = chars.peek() {
            match ch {
                c if c.is_whitespace() || c == ',' => {
                    chars.next();
                }
                '#' => break,
                '/' => {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        break;
                    }
                    return Err(RecordError::Syntax {
                        line: line_number,
                        message: "stray '/'".to_string(),
                    });
                }
                '{' => {
                    chars.next();
                    out.push((Lexeme::Open, line_number));
                }
                '}' => {
                    chars.next();
                    out.push((Lexeme::Close, line_number));
                }
                '"' => {
                    chars.next();
                    let mut text = String::new();
                    let mut closed = false;
                    while let Some(c) = chars.next() {
                        match c {
                            '"' => {
                                closed = true;
                                break;
                            }
                            '\\' => match chars.next() {
                                Some('n') => text.push('\n'),
                                Some(escaped) => text.push(escaped),
                                None => break,
                            },
                            other => text.push(other),
                        }
                    }
                    if !closed {
                        return Err(RecordError::Syntax {
                            line: line_number,
                            message: "unterminated string".to_string(),
                        });
                    }
                    out.push((Lexeme::Token(Token::String(text)), line_number));
                }
                _ => {
                    let mut word = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() || matches!(c, '{' | '}' | '"' | ',' | '#') {
                            break;
                        }
                        word.push(c);
                        chars.next();
                    }
                    out.push((Lexeme::Token(classify(&word, line_number)?), line_number));
                }
            }
        }
        out.push((Lexeme::Newline, line_number));
    }
    Ok(out)
}

fn classify(word: &str, line: usize) -> Result<Token, RecordError> {
    let starts_numeric = word
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
    if !starts_numeric {
        return Ok(Token::Label(word.to_string()));
    }
    if let Ok(value) = word.parse::<i64>() {
        return Ok(Token::Integer(value));
    }
    word.parse::<f64>().map(Token::Float).map_err(|_| RecordError::Syntax {
        line,
        message: format!("malformed number '{}'", word),
    })
}

struct Parser {
    lexemes: Vec<(Lexeme, usize)>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.position).map(|(lexeme, _)| lexeme)
    }

    fn line(&self) -> usize {
        self.lexemes
            .get(self.position)
            .or_else(|| self.lexemes.last())
            .map_or(0, |(_, line)| *line)
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(&Lexeme::Newline) {
            self.position += 1;
        }
    }

    /// Parse records until EOF (top level) or the matching close brace
    fn parse_block(&mut self, opened_on: Option<usize>) -> Result<Vec<Record>, RecordError> {
        let mut records = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => {
                    return match opened_on {
                        Some(line) => Err(RecordError::Syntax {
                            line,
                            message: "unclosed '{'".to_string(),
                        }),
                        None => Ok(records),
                    };
                }
                Some(Lexeme::Close) => {
                    if opened_on.is_none() {
                        return Err(RecordError::Syntax {
                            line: self.line(),
                            message: "unexpected '}'".to_string(),
                        });
                    }
                    self.position += 1;
                    return Ok(records);
                }
                Some(_) => records.push(self.parse_record()?),
            }
        }
    }

    fn parse_record(&mut self) -> Result<Record, RecordError> {
        let mut record = Record {
            line: self.line(),
            ..Default::default()
        };

        if let Some(Lexeme::Token(Token::Label(word))) = self.peek() {
            record.label = word.clone();
            self.position += 1;
        }

        while let Some(Lexeme::Token(token)) = self.peek() {
            record.tokens.push(token.clone());
            self.position += 1;
        }

        // The child block may open on the same line or the next one
        let resume = self.position;
        self.skip_newlines();
        if self.peek() == Some(&Lexeme::Open) {
            let opened_on = self.line();
            self.position += 1;
            record.children = self.parse_block(Some(opened_on))?;
        } else {
            self.position = resume;
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_label_and_tokens() {
        let records = Record::parse_str("SetColor 1.0 0.5 0 1\nPopTransform\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label(), "SetColor");
        assert_eq!(records[0].tokens().len(), 4);
        assert_eq!(records[0].float(1).unwrap(), 0.5);
        assert_eq!(records[0].float(2).unwrap(), 0.0);
        assert_eq!(records[1].label(), "PopTransform");
        assert!(records[1].tokens().is_empty());
    }

    #[test]
    fn test_children_on_next_line() {
        let text = "VertexArray\n{\n  0 0 0\n  1, 1, 0\n}\nClearArrays";
        let records = Record::parse_str(text).unwrap();
        assert_eq!(records.len(), 2);
        let array = &records[0];
        assert_eq!(array.children().len(), 2);
        assert_eq!(array.children()[0].label(), "");
        assert_eq!(array.child_floats().unwrap(), vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
        assert_eq!(records[1].label(), "ClearArrays");
    }

    #[test]
    fn test_children_on_same_line_and_nested() {
        let text = "Fragment {\n  Material \"glow\"\n  IndexBuffer { 0 1 2 }\n}";
        let records = Record::parse_str(text).unwrap();
        assert_eq!(records.len(), 1);
        let fragment = &records[0];
        assert_eq!(fragment.require_child("Material").unwrap().string(0).unwrap(), "glow");
        assert_eq!(
            fragment.require_child("IndexBuffer").unwrap().child_integers().unwrap(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_comments_and_strings() {
        let text = "# header\nDebug \"say \\\"hi\\\" # not a comment\" // trailing\n";
        let records = Record::parse_str(text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].string(0).unwrap(), "say \"hi\" # not a comment");
    }

    #[test]
    fn test_unbalanced_braces_are_errors() {
        assert!(matches!(
            Record::parse_str("A {\n 1 2\n"),
            Err(RecordError::Syntax { line: 1, .. })
        ));
        assert!(matches!(
            Record::parse_str("A\n}\n"),
            Err(RecordError::Syntax { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_and_mismatched_fields() {
        let records = Record::parse_str("SetColor 1 red").unwrap();
        let record = &records[0];
        assert!(matches!(record.float(3), Err(RecordError::MissingField { index: 3, .. })));
        assert!(matches!(record.float(1), Err(RecordError::TypeMismatch { index: 1, .. })));
        assert!(matches!(record.require_child("X"), Err(RecordError::MissingChild { .. })));
    }

    #[test]
    fn test_display_reparses_to_same_tree() {
        let text = "Fragment\n{\n    Material \"a b\"\n    PBuffer\n    {\n        0.5 -1 2.0\n    }\n}\n";
        let records = Record::parse_str(text).unwrap();
        let written: String = records.iter().map(ToString::to_string).collect();
        let reparsed = Record::parse_str(&written).unwrap();
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].children().len(), records[0].children().len());
        assert_eq!(
            reparsed[0].require_child("PBuffer").unwrap().child_floats().unwrap(),
            vec![0.5, -1.0, 2.0]
        );
    }
}
