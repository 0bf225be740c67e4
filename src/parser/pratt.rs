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

//! Pratt parser for formula expressions
//!
//! Binary operators are driven by [`BinaryOperator::precedence`]; prefix
//! operators, calls, member access and indexing are handled around the
//! precedence-climbing loop.
//!
//! ### Precedence Levels (highest to lowest):
//! - **Postfix**: `.name`, `.name(args)`, `[args]`
//! - **Prefix** (10): `-`, `+`
//! - **Power** (9): `^`
//! - **Multiplicative** (8): `*`, `/`, `%`
//! - **Additive** (7): `+`, `-`
//! - **Shift** (6): `<<`, `>>`
//! - **Comparison** (5): `=`, `eq`, `<>`, `<`, `<=`, `>`, `>=`, `IN`
//! - **Not** (4): `NOT`
//! - **And** (3), **Xor** (2), **Or** (1)
//!
//! Argument lists use `;` as separator.

use super::error::{ParseError, ParseResult};
use super::span::Spanned;
use super::tokenizer::{Token, Tokenizer};
use crate::ast::{Arguments, BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};

/// Precedence of the `IN` membership test
const MEMBERSHIP_PRECEDENCE: u8 = 5;

/// Binding power of the prefix sign operators
const PREFIX_SIGN_PRECEDENCE: u8 = 10;

/// Convert token to binary operator
#[inline(always)]
fn token_to_binary_op(token: &Token<'_>) -> Option<BinaryOperator> {
    match token {
        Token::Plus => Some(BinaryOperator::Add),
        Token::Minus => Some(BinaryOperator::Subtract),
        Token::Multiply => Some(BinaryOperator::Multiply),
        Token::Divide => Some(BinaryOperator::Divide),
        Token::Equal | Token::Eq => Some(BinaryOperator::Equal),
        Token::NotEqual => Some(BinaryOperator::NotEqual),
        Token::LessThan => Some(BinaryOperator::LessThan),
        Token::LessThanOrEqual => Some(BinaryOperator::LessThanOrEqual),
        Token::GreaterThan => Some(BinaryOperator::GreaterThan),
        Token::GreaterThanOrEqual => Some(BinaryOperator::GreaterThanOrEqual),
        Token::And => Some(BinaryOperator::And),
        Token::Or => Some(BinaryOperator::Or),
        Token::Xor => Some(BinaryOperator::Xor),
        Token::Modulo => Some(BinaryOperator::Modulo),
        Token::Power => Some(BinaryOperator::Power),
        Token::ShiftLeft => Some(BinaryOperator::ShiftLeft),
        Token::ShiftRight => Some(BinaryOperator::ShiftRight),
        _ => None,
    }
}

/// Pratt parser over a token stream
pub struct PrattParser<'input> {
    tokenizer: Tokenizer<'input>,
    current_token: Option<Spanned<Token<'input>>>,
    input_len: usize,
}

impl<'input> PrattParser<'input> {
    /// Create a parser and load the first token
    pub fn new(input: &'input str) -> ParseResult<Self> {
        let mut parser = Self {
            tokenizer: Tokenizer::new(input),
            current_token: None,
            input_len: input.len(),
        };
        parser.advance()?;
        Ok(parser)
    }

    #[inline(always)]
    fn advance(&mut self) -> ParseResult<()> {
        self.current_token = self.tokenizer.next_token()?;
        Ok(())
    }

    #[inline(always)]
    fn current(&self) -> Option<&Token<'input>> {
        self.current_token.as_ref().map(|t| &t.value)
    }

    /// Offset of the current token, or end of input
    fn position(&self) -> usize {
        self.current_token
            .as_ref()
            .map_or(self.input_len, |t| t.start)
    }

    fn unexpected(&self) -> ParseError {
        match &self.current_token {
            Some(token) => ParseError::UnexpectedToken {
                token: token.value.to_string(),
                position: token.start,
            },
            None => ParseError::UnexpectedEndOfInput {
                position: self.input_len,
            },
        }
    }

    fn expect(&mut self, expected: Token<'input>, description: &str) -> ParseResult<()> {
        match self.current() {
            Some(token) if std::mem::discriminant(token) == std::mem::discriminant(&expected) => {
                self.advance()
            }
            Some(_) => Err(ParseError::ExpectedToken {
                expected: description.to_string(),
                position: self.position(),
            }),
            None => Err(ParseError::UnexpectedEndOfInput {
                position: self.input_len,
            }),
        }
    }

    /// Parse a complete expression; trailing tokens are an error
    pub fn parse(mut self) -> ParseResult<ExpressionNode> {
        let expr = self.parse_expression(0)?;
        if self.current_token.is_some() {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    /// Precedence climbing over binary operators binding at least `min_precedence`
    fn parse_expression(&mut self, min_precedence: u8) -> ParseResult<ExpressionNode> {
        let mut left = self.parse_unary()?;

        loop {
            let position = self.position();
            match self.current() {
                Some(Token::In) if MEMBERSHIP_PRECEDENCE >= min_precedence => {
                    self.advance()?;
                    let items = self.parse_parenthesized_list()?;
                    left = ExpressionNode::in_list(left, items, position);
                }
                Some(token) => {
                    let Some(op) = token_to_binary_op(token) else {
                        break;
                    };
                    let precedence = op.precedence();
                    if precedence < min_precedence {
                        break;
                    }
                    self.advance()?;
                    // All binary operators are left associative
                    let right = self.parse_expression(precedence + 1)?;
                    left = ExpressionNode::binary_op(op, left, right, position);
                }
                None => break,
            }
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<ExpressionNode> {
        let position = self.position();
        let op = match self.current() {
            Some(Token::Minus) => UnaryOperator::Negate,
            Some(Token::Plus) => UnaryOperator::Plus,
            Some(Token::Not) => UnaryOperator::Not,
            _ => return self.parse_postfix(),
        };
        self.advance()?;

        let operand = match op {
            UnaryOperator::Not => self.parse_expression(op.precedence() + 1)?,
            _ => self.parse_expression(PREFIX_SIGN_PRECEDENCE)?,
        };
        Ok(ExpressionNode::unary_op(op, operand, position))
    }

    /// Primary followed by any number of member accesses, calls and indexers
    fn parse_postfix(&mut self) -> ParseResult<ExpressionNode> {
        let mut expr = self.parse_primary()?;

        loop {
            let position = self.position();
            match self.current() {
                Some(Token::Dot) => {
                    self.advance()?;
                    let name = match self.current() {
                        Some(Token::Identifier(name)) => *name,
                        _ => {
                            return Err(ParseError::ExpectedToken {
                                expected: "member name".to_string(),
                                position: self.position(),
                            });
                        }
                    };
                    self.advance()?;
                    if matches!(self.current(), Some(Token::LeftParen)) {
                        let args = self.parse_argument_list(Token::RightParen, ")")?;
                        expr = ExpressionNode::method_call(expr, name, args, position);
                    } else {
                        expr = ExpressionNode::member(expr, name, position);
                    }
                }
                Some(Token::LeftBracket) => {
                    let args = self.parse_argument_list(Token::RightBracket, "]")?;
                    if args.is_empty() {
                        return Err(ParseError::ExpectedToken {
                            expected: "index expression".to_string(),
                            position,
                        });
                    }
                    expr = ExpressionNode::index(expr, args, position);
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<ExpressionNode> {
        let position = self.position();
        let Some(token) = self.current_token.take() else {
            return Err(ParseError::UnexpectedEndOfInput {
                position: self.input_len,
            });
        };

        let literal = match token.value {
            Token::Integer { digits, hex, suffix } => LiteralValue::Integer {
                digits: digits.to_string(),
                hex,
                suffix,
            },
            Token::Real { text, suffix } => LiteralValue::Real {
                text: text.to_string(),
                suffix,
            },
            Token::String(value) => LiteralValue::String(value),
            Token::Char(value) => LiteralValue::Char(value),
            Token::DateTime(text) => LiteralValue::DateTime(text.to_string()),
            Token::TimeSpan(text) => LiteralValue::TimeSpan(text.to_string()),
            Token::True => LiteralValue::Boolean(true),
            Token::False => LiteralValue::Boolean(false),
            Token::Null => LiteralValue::Null,
            Token::Identifier(name) => {
                self.advance()?;
                return if matches!(self.current(), Some(Token::LeftParen)) {
                    let args = self.parse_argument_list(Token::RightParen, ")")?;
                    Ok(ExpressionNode::function_call(name, args, position))
                } else {
                    Ok(ExpressionNode::identifier(name, position))
                };
            }
            Token::If => {
                self.current_token = Some(token);
                return self.parse_conditional();
            }
            Token::Cast => {
                self.current_token = Some(token);
                return self.parse_cast();
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression(0)?;
                self.expect(Token::RightParen, "')'")?;
                return Ok(expr);
            }
            _ => {
                self.current_token = Some(token);
                return Err(self.unexpected());
            }
        };

        self.advance()?;
        Ok(ExpressionNode::literal(literal, position))
    }

    /// `If(condition; then; else)`
    fn parse_conditional(&mut self) -> ParseResult<ExpressionNode> {
        let position = self.position();
        self.advance()?; // If
        let args = self.parse_argument_list(Token::RightParen, ")")?;
        let mut args = args.into_iter();
        match (args.next(), args.next(), args.next(), args.next()) {
            (Some(condition), Some(then_expr), Some(else_expr), None) => Ok(
                ExpressionNode::conditional(condition, then_expr, else_expr, position),
            ),
            _ => Err(ParseError::ExpectedToken {
                expected: "three arguments to If".to_string(),
                position,
            }),
        }
    }

    /// `cast(value; Type.Name[])`
    fn parse_cast(&mut self) -> ParseResult<ExpressionNode> {
        let position = self.position();
        self.advance()?; // cast
        self.expect(Token::LeftParen, "'('")?;
        let expression = self.parse_expression(0)?;
        self.expect(Token::Semicolon, "';'")?;

        let mut type_name = String::new();
        loop {
            match self.current() {
                Some(Token::Identifier(segment)) => {
                    type_name.push_str(segment);
                    self.advance()?;
                }
                _ => {
                    return Err(ParseError::ExpectedToken {
                        expected: "type name".to_string(),
                        position: self.position(),
                    });
                }
            }
            if !matches!(self.current(), Some(Token::Dot)) {
                break;
            }
            type_name.push('.');
            self.advance()?;
        }
        while matches!(self.current(), Some(Token::LeftBracket)) {
            self.advance()?;
            self.expect(Token::RightBracket, "']'")?;
            type_name.push_str("[]");
        }

        self.expect(Token::RightParen, "')'")?;
        Ok(ExpressionNode::cast(expression, type_name, position))
    }

    /// `( item; item; ... )` after `IN`
    fn parse_parenthesized_list(&mut self) -> ParseResult<Arguments> {
        if !matches!(self.current(), Some(Token::LeftParen)) {
            return Err(ParseError::ExpectedToken {
                expected: "'(' to start IN list".to_string(),
                position: self.position(),
            });
        }
        let position = self.position();
        let items = self.parse_argument_list(Token::RightParen, ")")?;
        if items.is_empty() {
            return Err(ParseError::ExpectedToken {
                expected: "at least one IN list item".to_string(),
                position,
            });
        }
        Ok(items)
    }

    /// Opening delimiter is the current token; items are separated by `;`
    fn parse_argument_list(
        &mut self,
        close: Token<'input>,
        close_text: &str,
    ) -> ParseResult<Arguments> {
        self.advance()?; // opening delimiter
        let mut args = Arguments::new();

        if self
            .current()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(&close))
        {
            self.advance()?;
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression(0)?);
            match self.current() {
                Some(Token::Semicolon) => self.advance()?,
                Some(t) if std::mem::discriminant(t) == std::mem::discriminant(&close) => {
                    self.advance()?;
                    return Ok(args);
                }
                Some(Token::Comma) => {
                    return Err(ParseError::ExpectedToken {
                        expected: format!("';' or '{close_text}' (arguments are separated by ';')"),
                        position: self.position(),
                    });
                }
                Some(_) => {
                    return Err(ParseError::ExpectedToken {
                        expected: format!("';' or '{close_text}'"),
                        position: self.position(),
                    });
                }
                None => {
                    return Err(ParseError::UnexpectedEndOfInput {
                        position: self.input_len,
                    });
                }
            }
        }
    }
}

/// Parse expression text into a syntax tree
pub fn parse_expression_pratt(input: &str) -> ParseResult<ExpressionNode> {
    PrattParser::new(input)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExpressionKind, IntegerSuffix};

    fn parse(input: &str) -> ExpressionNode {
        parse_expression_pratt(input).unwrap()
    }

    fn binary(node: &ExpressionNode) -> (BinaryOperator, &ExpressionNode, &ExpressionNode) {
        match &node.kind {
            ExpressionKind::BinaryOp(data) => (data.op, &data.left, &data.right),
            other => panic!("expected binary op, got {other:?}"),
        }
    }

    #[test]
    fn test_arithmetic_precedence() {
        let expr = parse("1 + 2 * 3");
        let (op, left, right) = binary(&expr);
        assert_eq!(op, BinaryOperator::Add);
        assert!(left.is_literal());
        assert_eq!(binary(right).0, BinaryOperator::Multiply);
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse("10 - 4 - 3");
        let (op, left, _) = binary(&expr);
        assert_eq!(op, BinaryOperator::Subtract);
        assert_eq!(binary(left).0, BinaryOperator::Subtract);
    }

    #[test]
    fn test_logical_precedence() {
        // OR binds loosest, then XOR, then AND, then NOT
        let expr = parse("a OR b AND NOT c = d");
        let (op, _, right) = binary(&expr);
        assert_eq!(op, BinaryOperator::Or);
        let (op, _, right) = binary(right);
        assert_eq!(op, BinaryOperator::And);
        match &right.kind {
            ExpressionKind::UnaryOp { op, operand } => {
                assert_eq!(*op, UnaryOperator::Not);
                assert_eq!(binary(operand).0, BinaryOperator::Equal);
            }
            other => panic!("expected NOT, got {other:?}"),
        }
    }

    #[test]
    fn test_negation_binds_tighter_than_power() {
        let expr = parse("-2 ^ 2");
        let (op, left, _) = binary(&expr);
        assert_eq!(op, BinaryOperator::Power);
        assert!(matches!(left.kind, ExpressionKind::UnaryOp { op: UnaryOperator::Negate, .. }));
    }

    #[test]
    fn test_eq_keyword() {
        assert_eq!(binary(&parse("a eq 1")).0, BinaryOperator::Equal);
    }

    #[test]
    fn test_member_call_and_index() {
        let expr = parse("Math.Max(a; b)[0].Length");
        let ExpressionKind::Member { base, name } = &expr.kind else {
            panic!("expected member access");
        };
        assert_eq!(name, "Length");
        let ExpressionKind::Index(index) = &base.kind else {
            panic!("expected indexer");
        };
        assert_eq!(index.args.len(), 1);
        let ExpressionKind::MethodCall(call) = &index.base.kind else {
            panic!("expected method call");
        };
        assert_eq!(call.method, "Max");
        assert_eq!(call.args.len(), 2);
        assert_eq!(call.base.as_identifier(), Some("Math"));
    }

    #[test]
    fn test_conditional_and_cast() {
        let expr = parse("If(a > 1; cast(b; int); 0)");
        let ExpressionKind::Conditional(data) = &expr.kind else {
            panic!("expected conditional");
        };
        assert!(matches!(&data.then_expr.kind, ExpressionKind::Cast { type_name, .. } if type_name == "int"));

        let expr = parse("cast(x; System.Int32[])");
        assert!(matches!(&expr.kind, ExpressionKind::Cast { type_name, .. } if type_name == "System.Int32[]"));
    }

    #[test]
    fn test_in_list() {
        let expr = parse("x + 1 IN (1; 2; 3) AND y");
        let (op, left, _) = binary(&expr);
        assert_eq!(op, BinaryOperator::And);
        let ExpressionKind::In(data) = &left.kind else {
            panic!("expected IN");
        };
        assert_eq!(data.items.len(), 3);
        assert_eq!(binary(&data.operand).0, BinaryOperator::Add);
    }

    #[test]
    fn test_literal_positions() {
        let expr = parse("a + 42u");
        let (_, left, right) = binary(&expr);
        assert_eq!(expr.position, 2);
        assert_eq!(left.position, 0);
        assert_eq!(right.position, 4);
        assert_eq!(
            right.as_literal(),
            Some(&LiteralValue::Integer {
                digits: "42".to_string(),
                hex: false,
                suffix: IntegerSuffix::Unsigned,
            })
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            parse_expression_pratt("1 +"),
            Err(ParseError::UnexpectedEndOfInput { position: 3 })
        ));
        assert!(matches!(
            parse_expression_pratt("f(1, 2)"),
            Err(ParseError::ExpectedToken { position: 3, .. })
        ));
        assert!(matches!(
            parse_expression_pratt("1 2"),
            Err(ParseError::UnexpectedToken { position: 2, .. })
        ));
        assert!(parse_expression_pratt("If(a; b)").is_err());
        assert!(parse_expression_pratt("(1 + 2").is_err());
        assert!(parse_expression_pratt("").is_err());
    }
}
