// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer for expression source text
//!
//! Produces borrowed tokens with byte offsets. Keywords are matched without
//! regard to case; numeric literals keep their lexical form so that the
//! analyzer can pick their type.

use super::error::{ParseError, ParseResult};
use super::span::Spanned;
use crate::ast::{IntegerSuffix, RealSuffix};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;

/// Expression token
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    // Literals
    /// Integer literal in lexical form
    Integer {
        /// Digits without prefix or suffix
        digits: &'input str,
        /// Hexadecimal literal
        hex: bool,
        /// Type suffix
        suffix: IntegerSuffix,
    },
    /// Real literal in lexical form
    Real {
        /// Digits, point and exponent
        text: &'input str,
        /// Type suffix
        suffix: Option<RealSuffix>,
    },
    /// String literal with escapes processed
    String(String),
    /// Character literal
    Char(char),
    /// Date-time literal body
    DateTime(&'input str),
    /// Time-span literal body
    TimeSpan(&'input str),
    /// Identifier
    Identifier(&'input str),

    // Keywords
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `XOR`
    Xor,
    /// `NOT`
    Not,
    /// `IN`
    In,
    /// `eq` (word alias of `=`)
    Eq,
    /// `If`
    If,
    /// `cast`
    Cast,

    // Operators
    /// Addition operator (+)
    Plus,
    /// Subtraction operator (-)
    Minus,
    /// Multiplication operator (*)
    Multiply,
    /// Division operator (/)
    Divide,
    /// Remainder operator (%)
    Modulo,
    /// Power operator (^)
    Power,
    /// Equality operator (=)
    Equal,
    /// Inequality operator (<>)
    NotEqual,
    /// Less than operator (<)
    LessThan,
    /// Less than or equal operator (<=)
    LessThanOrEqual,
    /// Greater than operator (>)
    GreaterThan,
    /// Greater than or equal operator (>=)
    GreaterThanOrEqual,
    /// Left shift (<<)
    ShiftLeft,
    /// Right shift (>>)
    ShiftRight,

    // Delimiters
    /// Left parenthesis (
    LeftParen,
    /// Right parenthesis )
    RightParen,
    /// Left square bracket [
    LeftBracket,
    /// Right square bracket ]
    RightBracket,
    /// Dot operator (.) for member access
    Dot,
    /// Argument separator (;)
    Semicolon,
    /// Comma (,), only reported in errors
    Comma,
}

/// Keyword lookup table, keyed by lower-case text
static KEYWORD_TABLE: Lazy<FxHashMap<&'static str, Token<'static>>> = Lazy::new(|| {
    let mut map = FxHashMap::default();
    map.insert("true", Token::True);
    map.insert("false", Token::False);
    map.insert("null", Token::Null);
    map.insert("and", Token::And);
    map.insert("or", Token::Or);
    map.insert("xor", Token::Xor);
    map.insert("not", Token::Not);
    map.insert("in", Token::In);
    map.insert("eq", Token::Eq);
    map.insert("if", Token::If);
    map.insert("cast", Token::Cast);
    map
});

/// Tokenizer over a source string
#[derive(Clone)]
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a tokenizer
    pub fn new(input: &'input str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    /// Current byte offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Tokenize the whole input
    pub fn tokenize_all(mut self) -> ParseResult<Vec<Spanned<Token<'input>>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn is_id_start(ch: char) -> bool {
        ch == '_' || ch.is_alphabetic()
    }

    fn is_id_continue(ch: char) -> bool {
        ch == '_' || ch.is_alphanumeric()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.pos += ch.len_utf8();
        }
    }

    fn scan_while(&mut self, predicate: impl Fn(u8) -> bool) -> &'input str {
        let start = self.pos;
        while self.peek_byte(0).is_some_and(&predicate) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn parse_identifier(&mut self) -> &'input str {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if !Self::is_id_continue(ch) {
                break;
            }
            self.pos += ch.len_utf8();
        }
        &self.input[start..self.pos]
    }

    /// Numeric literal: decimal or hex integer, or real with optional exponent
    fn parse_number(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;

        if self.peek_byte(0) == Some(b'0') && matches!(self.peek_byte(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits = self.scan_while(|b| b.is_ascii_hexdigit());
            if digits.is_empty() {
                return Err(ParseError::InvalidLiteral {
                    literal_type: "hexadecimal".to_string(),
                    value: self.input[start..self.pos].to_string(),
                    position: start,
                });
            }
            let suffix = self.parse_integer_suffix();
            self.ensure_literal_end(start, "hexadecimal")?;
            return Ok(Token::Integer {
                digits,
                hex: true,
                suffix,
            });
        }

        self.scan_while(|b| b.is_ascii_digit());
        let mut is_real = false;

        if self.peek_byte(0) == Some(b'.') && self.peek_byte(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            self.scan_while(|b| b.is_ascii_digit());
            is_real = true;
        }

        if matches!(self.peek_byte(0), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_byte(1), Some(b'+' | b'-')));
            if self.peek_byte(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1 + sign;
                self.scan_while(|b| b.is_ascii_digit());
                is_real = true;
            }
        }

        let text = &self.input[start..self.pos];
        let token = if is_real {
            Token::Real {
                text,
                suffix: self.parse_real_suffix(),
            }
        } else if let Some(suffix) = self.parse_real_suffix() {
            // Integer digits followed by a real marker
            Token::Real {
                text,
                suffix: Some(suffix),
            }
        } else {
            Token::Integer {
                digits: text,
                hex: false,
                suffix: self.parse_integer_suffix(),
            }
        };
        self.ensure_literal_end(start, "numeric")?;
        Ok(token)
    }

    fn parse_real_suffix(&mut self) -> Option<RealSuffix> {
        let suffix = match self.peek_byte(0)? {
            b'f' | b'F' => RealSuffix::Single,
            b'd' | b'D' => RealSuffix::Double,
            b'm' | b'M' => RealSuffix::Decimal,
            _ => return None,
        };
        self.pos += 1;
        Some(suffix)
    }

    fn parse_integer_suffix(&mut self) -> IntegerSuffix {
        let lower = |b: Option<u8>| b.map(|b| b.to_ascii_lowercase());
        match (lower(self.peek_byte(0)), lower(self.peek_byte(1))) {
            (Some(b'u'), Some(b'l')) | (Some(b'l'), Some(b'u')) => {
                self.pos += 2;
                IntegerSuffix::UnsignedLong
            }
            (Some(b'u'), _) => {
                self.pos += 1;
                IntegerSuffix::Unsigned
            }
            (Some(b'l'), _) => {
                self.pos += 1;
                IntegerSuffix::Long
            }
            _ => IntegerSuffix::None,
        }
    }

    /// A numeric literal must not run into an identifier (`12abc`)
    fn ensure_literal_end(&mut self, start: usize, literal_type: &str) -> ParseResult<()> {
        match self.peek_char() {
            Some(ch) if Self::is_id_continue(ch) => {
                self.parse_identifier();
                Err(ParseError::InvalidLiteral {
                    literal_type: literal_type.to_string(),
                    value: self.input[start..self.pos].to_string(),
                    position: start,
                })
            }
            _ => Ok(()),
        }
    }

    fn parse_escape(&mut self) -> ParseResult<char> {
        let start = self.pos;
        self.pos += 1; // backslash
        let ch = self.peek_char().ok_or(ParseError::InvalidEscape {
            sequence: "\\".to_string(),
            position: start,
        })?;
        self.pos += ch.len_utf8();
        Ok(match ch {
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            'u' => {
                let hex = self.input.get(self.pos..self.pos + 4).unwrap_or("");
                let code = (hex.len() == 4)
                    .then(|| u32::from_str_radix(hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match code {
                    Some(c) => {
                        self.pos += 4;
                        c
                    }
                    None => {
                        return Err(ParseError::InvalidEscape {
                            sequence: format!("\\u{hex}"),
                            position: start,
                        });
                    }
                }
            }
            other => {
                return Err(ParseError::InvalidEscape {
                    sequence: format!("\\{other}"),
                    position: start,
                });
            }
        })
    }

    fn parse_string_literal(&mut self) -> ParseResult<String> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut value = String::new();
        loop {
            match self.peek_char() {
                None => {
                    return Err(ParseError::Unclosed {
                        literal_type: "string",
                        position: start,
                    });
                }
                Some('"') => {
                    self.pos += 1;
                    return Ok(value);
                }
                Some('\\') => value.push(self.parse_escape()?),
                Some(ch) => {
                    value.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
    }

    fn parse_char_literal(&mut self) -> ParseResult<char> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let ch = match self.peek_char() {
            Some('\\') => self.parse_escape()?,
            Some('\'') | None => {
                return Err(ParseError::InvalidLiteral {
                    literal_type: "char".to_string(),
                    value: self.input[start..self.pos].to_string(),
                    position: start,
                });
            }
            Some(ch) => {
                self.pos += ch.len_utf8();
                ch
            }
        };
        if self.peek_byte(0) != Some(b'\'') {
            return Err(ParseError::Unclosed {
                literal_type: "char",
                position: start,
            });
        }
        self.pos += 1;
        Ok(ch)
    }

    /// `#...#` date-time or `##...#` time-span literal
    fn parse_hash_literal(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        let is_span = self.peek_byte(1) == Some(b'#');
        self.pos += if is_span { 2 } else { 1 };

        let body_start = self.pos;
        match self.input[body_start..].find('#') {
            Some(offset) => {
                let body = &self.input[body_start..body_start + offset];
                self.pos = body_start + offset + 1;
                Ok(if is_span {
                    Token::TimeSpan(body)
                } else {
                    Token::DateTime(body)
                })
            }
            None => Err(ParseError::Unclosed {
                literal_type: if is_span { "time-span" } else { "date-time" },
                position: start,
            }),
        }
    }

    fn single(&mut self, token: Token<'input>, len: usize) -> Token<'input> {
        self.pos += len;
        token
    }

    /// Produce the next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Spanned<Token<'input>>>> {
        self.skip_whitespace();
        let start = self.pos;
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };

        let token = match ch {
            '0'..='9' => self.parse_number()?,
            '.' if self.peek_byte(1).is_some_and(|b| b.is_ascii_digit()) => self.parse_number()?,
            '.' => self.single(Token::Dot, 1),
            '(' => self.single(Token::LeftParen, 1),
            ')' => self.single(Token::RightParen, 1),
            '[' => self.single(Token::LeftBracket, 1),
            ']' => self.single(Token::RightBracket, 1),
            ';' => self.single(Token::Semicolon, 1),
            ',' => self.single(Token::Comma, 1),
            '+' => self.single(Token::Plus, 1),
            '-' => self.single(Token::Minus, 1),
            '*' => self.single(Token::Multiply, 1),
            '/' => self.single(Token::Divide, 1),
            '%' => self.single(Token::Modulo, 1),
            '^' => self.single(Token::Power, 1),
            '=' => self.single(Token::Equal, 1),
            '<' => match self.peek_byte(1) {
                Some(b'=') => self.single(Token::LessThanOrEqual, 2),
                Some(b'>') => self.single(Token::NotEqual, 2),
                Some(b'<') => self.single(Token::ShiftLeft, 2),
                _ => self.single(Token::LessThan, 1),
            },
            '>' => match self.peek_byte(1) {
                Some(b'=') => self.single(Token::GreaterThanOrEqual, 2),
                Some(b'>') => self.single(Token::ShiftRight, 2),
                _ => self.single(Token::GreaterThan, 1),
            },
            '"' => Token::String(self.parse_string_literal()?),
            '\'' => Token::Char(self.parse_char_literal()?),
            '#' => self.parse_hash_literal()?,
            ch if Self::is_id_start(ch) => {
                let ident = self.parse_identifier();
                KEYWORD_TABLE
                    .get(ident.to_lowercase().as_str())
                    .cloned()
                    .unwrap_or(Token::Identifier(ident))
            }
            other => {
                return Err(ParseError::UnexpectedCharacter {
                    character: other,
                    position: start,
                });
            }
        };

        Ok(Some(Spanned::new(token, start, self.pos)))
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Integer { digits, hex, .. } => {
                write!(f, "{}{digits}", if *hex { "0x" } else { "" })
            }
            Token::Real { text, .. } => write!(f, "{text}"),
            Token::String(s) => write!(f, "\"{s}\""),
            Token::Char(c) => write!(f, "'{c}'"),
            Token::DateTime(s) => write!(f, "#{s}#"),
            Token::TimeSpan(s) => write!(f, "##{s}#"),
            Token::Identifier(s) => write!(f, "{s}"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Null => write!(f, "null"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),
            Token::Xor => write!(f, "XOR"),
            Token::Not => write!(f, "NOT"),
            Token::In => write!(f, "IN"),
            Token::Eq => write!(f, "eq"),
            Token::If => write!(f, "If"),
            Token::Cast => write!(f, "cast"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Multiply => write!(f, "*"),
            Token::Divide => write!(f, "/"),
            Token::Modulo => write!(f, "%"),
            Token::Power => write!(f, "^"),
            Token::Equal => write!(f, "="),
            Token::NotEqual => write!(f, "<>"),
            Token::LessThan => write!(f, "<"),
            Token::LessThanOrEqual => write!(f, "<="),
            Token::GreaterThan => write!(f, ">"),
            Token::GreaterThanOrEqual => write!(f, ">="),
            Token::ShiftLeft => write!(f, "<<"),
            Token::ShiftRight => write!(f, ">>"),
            Token::LeftParen => write!(f, "("),
            Token::RightParen => write!(f, ")"),
            Token::LeftBracket => write!(f, "["),
            Token::RightBracket => write!(f, "]"),
            Token::Dot => write!(f, "."),
            Token::Semicolon => write!(f, ";"),
            Token::Comma => write!(f, ","),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token<'_>> {
        Tokenizer::new(input)
            .tokenize_all()
            .unwrap()
            .into_iter()
            .map(|t| t.value)
            .collect()
    }

    #[test]
    fn test_integer_suffixes() {
        assert_eq!(
            tokens("42 42u 42L 42UL 42lu"),
            vec![
                Token::Integer { digits: "42", hex: false, suffix: IntegerSuffix::None },
                Token::Integer { digits: "42", hex: false, suffix: IntegerSuffix::Unsigned },
                Token::Integer { digits: "42", hex: false, suffix: IntegerSuffix::Long },
                Token::Integer { digits: "42", hex: false, suffix: IntegerSuffix::UnsignedLong },
                Token::Integer { digits: "42", hex: false, suffix: IntegerSuffix::UnsignedLong },
            ]
        );
    }

    #[test]
    fn test_real_forms() {
        assert_eq!(
            tokens("1.5 2e3 7f 3.25m .5"),
            vec![
                Token::Real { text: "1.5", suffix: None },
                Token::Real { text: "2e3", suffix: None },
                Token::Real { text: "7", suffix: Some(RealSuffix::Single) },
                Token::Real { text: "3.25", suffix: Some(RealSuffix::Decimal) },
                Token::Real { text: ".5", suffix: None },
            ]
        );
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(
            tokens("0xFFu"),
            vec![Token::Integer { digits: "FF", hex: true, suffix: IntegerSuffix::Unsigned }]
        );
    }

    #[test]
    fn test_operators_and_keywords() {
        assert_eq!(
            tokens("a <> b AND NOT c or d << 2"),
            vec![
                Token::Identifier("a"),
                Token::NotEqual,
                Token::Identifier("b"),
                Token::And,
                Token::Not,
                Token::Identifier("c"),
                Token::Or,
                Token::Identifier("d"),
                Token::ShiftLeft,
                Token::Integer { digits: "2", hex: false, suffix: IntegerSuffix::None },
            ]
        );
    }

    #[test]
    fn test_string_char_and_dates() {
        assert_eq!(
            tokens(r#""a\"b\n" 'x' '\t' #2024-01-02# ##1.02:03#"#),
            vec![
                Token::String("a\"b\n".to_string()),
                Token::Char('x'),
                Token::Char('\t'),
                Token::DateTime("2024-01-02"),
                Token::TimeSpan("1.02:03"),
            ]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Tokenizer::new("\"abc").tokenize_all(),
            Err(ParseError::Unclosed { literal_type: "string", position: 0 })
        ));
        assert!(matches!(
            Tokenizer::new("12abc").tokenize_all(),
            Err(ParseError::InvalidLiteral { .. })
        ));
        assert!(matches!(
            Tokenizer::new("a $ b").tokenize_all(),
            Err(ParseError::UnexpectedCharacter { character: '$', position: 2 })
        ));
        assert!(matches!(
            Tokenizer::new("#2024-01-01").tokenize_all(),
            Err(ParseError::Unclosed { .. })
        ));
    }

    #[test]
    fn test_positions() {
        let spans = Tokenizer::new("ab + 12").tokenize_all().unwrap();
        assert_eq!((spans[0].start, spans[0].end), (0, 2));
        assert_eq!((spans[1].start, spans[1].end), (3, 4));
        assert_eq!((spans[2].start, spans[2].end), (5, 7));
    }
}
