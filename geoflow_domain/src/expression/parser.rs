// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Expression Tokenizer and Parser
//!
//! Recursive-descent parser turning an expression source string into an
//! [`ExprNode`] tree, validated against the set of admissible variable
//! names supplied by the caller (the runtime's current attribute names).
//!
//! ## Grammar
//!
//! ```text
//! Expr     := Term (('+'|'-') Term)*
//! Term     := Factor (('*'|'/') Factor)*
//! Factor   := ('+'|'-')? Primary | Function | Primary
//! Function := UnaryName '(' Expr ')' | 'POW' '(' Expr ',' Expr ')'
//! Primary  := NUMBER | VARIABLE | '(' Expr ')'
//! ```
//!
//! A number is `[0-9]+(\.[0-9]+)?` with at most one decimal point. A
//! variable starts with a letter or underscore and continues with
//! alphanumerics, underscores, or hyphens; recognized operator words are
//! not variables even when they would otherwise match. The caller is
//! expected to upper-case the source before parsing.
//!
//! Unknown variables are reported as errors, never silently bound. The
//! parser accumulates every error it can find (tokenization errors in
//! particular can pile up) and reports them together with the position and
//! a 20-character context window around each offending position. Unary `-`
//! is lowered to `0 - x`; unary `+` is erased.

use crate::expression::kernels::ExprOp;
use crate::expression::tree::ExprNode;
use crate::PipelineError;

/// A single parse diagnostic: where, what, and the surrounding source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    /// Character position in the expression source.
    pub position: usize,
    pub message: String,
    /// Up to 20 characters of source centered on the position.
    pub context: String,
}

/// The outcome of a successful parse.
#[derive(Debug, Clone)]
pub struct ParsedExpression {
    pub tree: ExprNode,
    /// Variables referenced by the expression, in first-seen order.
    pub used_variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Variable(String),
    Operator(String),
    LeftParen,
    RightParen,
    Comma,
    End,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn is_variable_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_variable_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Recursive-descent expression parser with error accumulation.
pub struct ExpressionParser {
    source: Vec<char>,
    variables: Vec<String>,
    used_variables: Vec<String>,
    errors: Vec<ParseIssue>,
    tokens: Vec<Token>,
    token_pos: usize,
}

impl ExpressionParser {
    pub fn new() -> Self {
        ExpressionParser {
            source: Vec::new(),
            variables: Vec::new(),
            used_variables: Vec::new(),
            errors: Vec::new(),
            tokens: Vec::new(),
            token_pos: 0,
        }
    }

    /// Parses `expression` against the admissible `variables`.
    ///
    /// On failure the accumulated issues are available through
    /// [`ExpressionParser::issues`] and are also folded into the returned
    /// error message.
    pub fn parse(&mut self, expression: &str, variables: &[String]) -> Result<ParsedExpression, PipelineError> {
        self.source = expression.chars().collect();
        self.variables = variables.to_vec();
        self.used_variables.clear();
        self.errors.clear();
        self.tokens.clear();
        self.token_pos = 0;

        self.tokenize();
        if !self.errors.is_empty() {
            return Err(self.to_error());
        }

        let tree = self.parse_expression();
        let tree = match tree {
            Some(tree) if self.errors.is_empty() => tree,
            _ => return Err(self.to_error()),
        };

        // The whole input must be one expression.
        if self.current().kind != TokenKind::End {
            let position = self.current().position;
            self.add_error("Unexpected token after expression", position);
            return Err(self.to_error());
        }

        Ok(ParsedExpression {
            tree,
            used_variables: self.used_variables.clone(),
        })
    }

    /// The diagnostics accumulated by the last parse.
    pub fn issues(&self) -> &[ParseIssue] {
        &self.errors
    }

    fn add_error(&mut self, message: impl Into<String>, position: usize) {
        let start = position.saturating_sub(10);
        let end = (position + 10).min(self.source.len());
        let context: String = self.source[start..end].iter().collect();
        self.errors.push(ParseIssue {
            position,
            message: message.into(),
            context,
        });
    }

    fn to_error(&self) -> PipelineError {
        let mut text = String::new();
        for issue in &self.errors {
            text.push_str(&format!(
                "Parse error at position {}: {} (context: \"{}\")\n",
                issue.position, issue.message, issue.context
            ));
        }
        PipelineError::ParseError(text.trim_end().to_string())
    }

    fn tokenize(&mut self) {
        let mut pos = 0;
        while pos < self.source.len() {
            let c = self.source[pos];

            if c.is_whitespace() {
                pos += 1;
                continue;
            }

            if c.is_ascii_digit() {
                let start = pos;
                let mut dots = 0usize;
                while pos < self.source.len() && (self.source[pos].is_ascii_digit() || self.source[pos] == '.') {
                    if self.source[pos] == '.' {
                        dots += 1;
                    }
                    pos += 1;
                }
                if dots > 1 {
                    self.add_error("Invalid number format: multiple decimal points", start);
                    return;
                }
                let text: String = self.source[start..pos].iter().collect();
                match text.parse::<f64>() {
                    Ok(value) => self.tokens.push(Token {
                        kind: TokenKind::Number(value),
                        position: start,
                    }),
                    Err(_) => {
                        self.add_error(format!("Invalid number: '{}'", text), start);
                        return;
                    }
                }
                continue;
            }

            if is_variable_start(c) {
                let start = pos;
                while pos < self.source.len() && is_variable_continue(self.source[pos]) {
                    pos += 1;
                }
                let word: String = self.source[start..pos].iter().collect();
                // Operator words are recognized before variables.
                let kind = if ExprOp::from_word(&word).is_some() {
                    TokenKind::Operator(word)
                } else {
                    TokenKind::Variable(word)
                };
                self.tokens.push(Token { kind, position: start });
                continue;
            }

            let kind = match c {
                '+' | '-' | '*' | '/' => Some(TokenKind::Operator(c.to_string())),
                '(' => Some(TokenKind::LeftParen),
                ')' => Some(TokenKind::RightParen),
                ',' => Some(TokenKind::Comma),
                _ => None,
            };
            match kind {
                Some(kind) => {
                    self.tokens.push(Token { kind, position: pos });
                    pos += 1;
                }
                None => {
                    self.add_error(format!("Unexpected character: '{}'", c), pos);
                    pos += 1;
                }
            }
        }

        self.tokens.push(Token {
            kind: TokenKind::End,
            position: self.source.len(),
        });
    }

    fn current(&self) -> Token {
        self.tokens
            .get(self.token_pos)
            .cloned()
            .unwrap_or(Token {
                kind: TokenKind::End,
                position: self.source.len(),
            })
    }

    fn advance(&mut self) {
        if self.token_pos + 1 < self.tokens.len() {
            self.token_pos += 1;
        }
    }

    // Expr := Term (('+' | '-') Term)*
    fn parse_expression(&mut self) -> Option<ExprNode> {
        let mut left = self.parse_term()?;

        loop {
            let op = match &self.current().kind {
                TokenKind::Operator(word) if word == "+" => ExprOp::Add,
                TokenKind::Operator(word) if word == "-" => ExprOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_term()?;
            left = ExprNode::binary(op, left, right);
        }

        Some(left)
    }

    // Term := Factor (('*' | '/') Factor)*
    fn parse_term(&mut self) -> Option<ExprNode> {
        let mut left = self.parse_factor()?;

        loop {
            let op = match &self.current().kind {
                TokenKind::Operator(word) if word == "*" => ExprOp::Mul,
                TokenKind::Operator(word) if word == "/" => ExprOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_factor()?;
            left = ExprNode::binary(op, left, right);
        }

        Some(left)
    }

    // Factor := ('+' | '-')? Primary | Function | Primary
    fn parse_factor(&mut self) -> Option<ExprNode> {
        let token = self.current();

        if let TokenKind::Operator(word) = &token.kind {
            if word == "+" || word == "-" {
                let negate = word == "-";
                self.advance();
                let operand = self.parse_primary()?;
                return Some(if negate {
                    // Unary minus lowers to 0 - x.
                    ExprNode::binary(ExprOp::Sub, ExprNode::number(0.0), operand)
                } else {
                    operand
                });
            }

            if let Some(op) = ExprOp::from_word(word) {
                if op == ExprOp::Pow {
                    return self.parse_pow();
                }
                if !op.is_binary() {
                    return self.parse_unary_function(op);
                }
            }
        }

        self.parse_primary()
    }

    // UnaryName '(' Expr ')'
    fn parse_unary_function(&mut self, op: ExprOp) -> Option<ExprNode> {
        self.advance();
        self.expect_left_paren("Expected '(' after function name")?;
        let operand = self.parse_expression()?;
        self.expect_right_paren("Expected ')' after function argument")?;
        Some(ExprNode::unary(op, operand))
    }

    // 'POW' '(' Expr ',' Expr ')'
    fn parse_pow(&mut self) -> Option<ExprNode> {
        self.advance();
        self.expect_left_paren("Expected '(' after 'POW'")?;
        let left = self.parse_expression()?;
        let token = self.current();
        if token.kind != TokenKind::Comma {
            self.add_error("Expected ',' between POW arguments", token.position);
            return None;
        }
        self.advance();
        let right = self.parse_expression()?;
        self.expect_right_paren("Expected ')' after POW arguments")?;
        Some(ExprNode::binary(ExprOp::Pow, left, right))
    }

    // Primary := Number | Variable | '(' Expr ')'
    fn parse_primary(&mut self) -> Option<ExprNode> {
        let token = self.current();

        match token.kind {
            TokenKind::Number(value) => {
                self.advance();
                Some(ExprNode::number(value))
            }
            TokenKind::Variable(name) => {
                self.advance();
                if !self.variables.contains(&name) {
                    self.add_error(format!("Undefined variable: '{}'", name), token.position);
                    return None;
                }
                if !self.used_variables.contains(&name) {
                    self.used_variables.push(name.clone());
                }
                Some(ExprNode::variable(name))
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_right_paren("Expected ')' to match '('")?;
                Some(expr)
            }
            _ => {
                self.add_error("Expected number, variable, or '('", token.position);
                None
            }
        }
    }

    fn expect_left_paren(&mut self, message: &str) -> Option<()> {
        let token = self.current();
        if token.kind != TokenKind::LeftParen {
            self.add_error(message, token.position);
            return None;
        }
        self.advance();
        Some(())
    }

    fn expect_right_paren(&mut self, message: &str) -> Option<()> {
        let token = self.current();
        if token.kind != TokenKind::RightParen {
            self.add_error(message, token.position);
            return None;
        }
        self.advance();
        Some(())
    }
}

impl Default for ExpressionParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper: parse `expr` against `variables` in one call.
pub fn parse_expression(expr: &str, variables: &[String]) -> Result<ParsedExpression, PipelineError> {
    ExpressionParser::new().parse(expr, variables)
}
