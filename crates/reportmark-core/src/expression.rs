// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page expressions: the small language behind `PageSelector::ExpressionMatch`.
//
// Grammar:
// ```text
// expr    = or
// or      = and (("or" | "||") and)*
// and     = not (("and" | "&&") not)*
// not     = ("not" | "!") not | cmp
// cmp     = sum [("==" | "!=" | "<" | "<=" | ">" | ">=") sum]
// sum     = term (("+" | "-") term)*
// term    = unary (("*" | "/" | "%") unary)*
// unary   = "-" unary | atom
// atom    = integer | "true" | "false" | "page" | "page_count" | "(" expr ")"
// ```

use thiserror::Error;

use crate::error::ReportmarkError;

/// Expression parsing and evaluation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected {0} at position {1}")]
    UnexpectedToken(String, usize),

    #[error("unknown identifier '{0}' at position {1}")]
    UnknownIdentifier(String, usize),

    #[error("integer literal out of range at position {0}")]
    IntegerOverflow(usize),

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("expression longer than {0} tokens")]
    TooLong(usize),
}

impl From<ExpressionError> for ReportmarkError {
    fn from(err: ExpressionError) -> Self {
        ReportmarkError::Expression(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Bound on `(`, `not` and unary `-` nesting.
const MAX_NESTING: usize = 64;

/// Bound on token count. Binary chains nest the tree too, one level per operator.
const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(n) => format!("integer {n}"),
            Token::Ident(name) => format!("'{name}'"),
            Token::Op(op) => format!("'{op}'"),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
        }
    }
}

const OPERATORS: [&str; 15] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "=",
];

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut pos = 0;

    while pos < bytes.len() {
        let ch = bytes[pos];
        if ch.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if tokens.len() == MAX_TOKENS {
            return Err(ExpressionError::TooLong(MAX_TOKENS));
        }

        let start = pos;
        if ch.is_ascii_digit() {
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            let value = input[start..pos]
                .parse::<i64>()
                .map_err(|_| ExpressionError::IntegerOverflow(start))?;
            tokens.push((Token::Int(value), start));
        } else if ch.is_ascii_alphabetic() || ch == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            tokens.push((Token::Ident(input[start..pos].to_string()), start));
        } else if ch == b'(' {
            pos += 1;
            tokens.push((Token::LParen, start));
        } else if ch == b')' {
            pos += 1;
            tokens.push((Token::RParen, start));
        } else {
            let rest = &input[start..];
            // A lone "=" is accepted as a typo-tolerant alias of "==".
            let op = OPERATORS
                .iter()
                .find(|op| rest.starts_with(**op))
                .ok_or_else(|| {
                    let bad = rest.chars().next().unwrap_or('?');
                    ExpressionError::UnexpectedChar(bad, start)
                })?;
            pos += op.len();
            let op = if *op == "=" { "==" } else { *op };
            tokens.push((Token::Op(op), start));
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Var {
    Page,
    PageCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Int(i64),
    Bool(bool),
    Var(Var),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, at)| *at)
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        let op = match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => *op,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, ExpressionError>,
    ) -> Result<Expr, ExpressionError> {
        if self.depth == MAX_NESTING {
            return Err(ExpressionError::TooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn unexpected(&self) -> ExpressionError {
        match self.peek() {
            Some(token) => ExpressionError::UnexpectedToken(token.describe(), self.offset()),
            None => ExpressionError::UnexpectedToken("end of input".into(), self.end),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") || self.eat_op(&["||"]).is_some() {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") || self.eat_op(&["&&"]).is_some() {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat_keyword("not") || self.eat_op(&["!"]).is_some() {
            return Ok(Expr::Not(Box::new(self.nested(Self::parse_not)?)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<Expr, ExpressionError> {
        let lhs = self.parse_sum()?;
        let Some(op) = self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) else {
            return Ok(lhs);
        };
        let rhs = self.parse_sum()?;
        let op = match op {
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            _ => BinOp::Ge,
        };
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_sum(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.parse_term()?;
            let op = if op == "+" { BinOp::Add } else { BinOp::Sub };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let rhs = self.parse_unary()?;
            let op = match op {
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                _ => BinOp::Rem,
            };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat_op(&["-"]).is_some() {
            return Ok(Expr::Neg(Box::new(self.nested(Self::parse_unary)?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ExpressionError> {
        let at = self.offset();
        let Some((token, _)) = self.tokens.get(self.pos).cloned() else {
            return Err(self.unexpected());
        };
        match token {
            Token::Int(value) => {
                self.pos += 1;
                Ok(Expr::Int(value))
            }
            Token::Ident(name) => {
                let expr = match name.as_str() {
                    "page" => Expr::Var(Var::Page),
                    "page_count" => Expr::Var(Var::PageCount),
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    "and" | "or" | "not" => return Err(self.unexpected()),
                    _ => return Err(ExpressionError::UnknownIdentifier(name, at)),
                };
                self.pos += 1;
                Ok(expr)
            }
            Token::LParen => {
                self.pos += 1;
                let inner = self.nested(Self::parse_or)?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.unexpected());
                }
                self.pos += 1;
                Ok(inner)
            }
            Token::Op(_) | Token::RParen => Err(self.unexpected()),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Int(i64),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Bool(_) => "boolean",
        }
    }

    fn int(self) -> Result<i64, ExpressionError> {
        match self {
            Value::Int(n) => Ok(n),
            other => Err(ExpressionError::TypeMismatch {
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    fn bool(self) -> Result<bool, ExpressionError> {
        match self {
            Value::Bool(b) => Ok(b),
            other => Err(ExpressionError::TypeMismatch {
                expected: "boolean",
                found: other.type_name(),
            }),
        }
    }
}

fn eval(expr: &Expr, page: i64, page_count: i64) -> Result<Value, ExpressionError> {
    Ok(match expr {
        Expr::Int(n) => Value::Int(*n),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Var(Var::Page) => Value::Int(page),
        Expr::Var(Var::PageCount) => Value::Int(page_count),
        Expr::Not(inner) => Value::Bool(!eval(inner, page, page_count)?.bool()?),
        Expr::Neg(inner) => Value::Int(
            eval(inner, page, page_count)?
                .int()?
                .checked_neg()
                .ok_or(ExpressionError::Overflow)?,
        ),
        Expr::Binary(BinOp::Or, lhs, rhs) => Value::Bool(
            eval(lhs, page, page_count)?.bool()? || eval(rhs, page, page_count)?.bool()?,
        ),
        Expr::Binary(BinOp::And, lhs, rhs) => Value::Bool(
            eval(lhs, page, page_count)?.bool()? && eval(rhs, page, page_count)?.bool()?,
        ),
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, page, page_count)?;
            let r = eval(rhs, page, page_count)?;
            match op {
                BinOp::Eq | BinOp::Ne => {
                    if l.type_name() != r.type_name() {
                        return Err(ExpressionError::TypeMismatch {
                            expected: l.type_name(),
                            found: r.type_name(),
                        });
                    }
                    Value::Bool((l == r) == (*op == BinOp::Eq))
                }
                BinOp::Lt => Value::Bool(l.int()? < r.int()?),
                BinOp::Le => Value::Bool(l.int()? <= r.int()?),
                BinOp::Gt => Value::Bool(l.int()? > r.int()?),
                BinOp::Ge => Value::Bool(l.int()? >= r.int()?),
                BinOp::Add => Value::Int(l.int()?.checked_add(r.int()?).ok_or(ExpressionError::Overflow)?),
                BinOp::Sub => Value::Int(l.int()?.checked_sub(r.int()?).ok_or(ExpressionError::Overflow)?),
                BinOp::Mul => Value::Int(l.int()?.checked_mul(r.int()?).ok_or(ExpressionError::Overflow)?),
                BinOp::Div | BinOp::Rem => {
                    let (l, r) = (l.int()?, r.int()?);
                    if r == 0 {
                        return Err(ExpressionError::DivisionByZero);
                    }
                    let result = if *op == BinOp::Div {
                        l.checked_div(r)
                    } else {
                        l.checked_rem(r)
                    };
                    Value::Int(result.ok_or(ExpressionError::Overflow)?)
                }
                BinOp::Or | BinOp::And => unreachable!("short-circuit operators handled above"),
            }
        }
    })
}

/// A parsed page expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExpression {
    source: String,
    root: Expr,
}

impl PageExpression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
        };
        let root = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.unexpected());
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate for a 1-indexed `page` of a `page_count`-page document.
    pub fn evaluate(&self, page: usize, page_count: usize) -> Result<bool, ExpressionError> {
        let page = i64::try_from(page).map_err(|_| ExpressionError::Overflow)?;
        let page_count = i64::try_from(page_count).map_err(|_| ExpressionError::Overflow)?;
        eval(&self.root, page, page_count)?.bool()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(src: &str, page: usize, count: usize) -> Result<bool, ExpressionError> {
        PageExpression::parse(src)?.evaluate(page, count)
    }

    #[test]
    fn even_pages() {
        assert!(eval_str("page % 2 == 0", 2, 5).unwrap());
        assert!(!eval_str("page % 2 == 0", 3, 5).unwrap());
    }

    #[test]
    fn precedence_and_keywords() {
        // and binds tighter than or
        assert!(eval_str("page == 1 or page > 3 and page < 5", 1, 9).unwrap());
        assert!(eval_str("page == 1 or page > 3 and page < 5", 4, 9).unwrap());
        assert!(!eval_str("page == 1 or page > 3 and page < 5", 6, 9).unwrap());
        assert!(eval_str("not (page == page_count)", 2, 3).unwrap());
        assert!(eval_str("!(page == 1) && page_count - page >= 1", 2, 3).unwrap());
        assert!(eval_str("page * 2 + 1 == 7", 3, 3).unwrap());
        assert!(eval_str("-page < 0", 1, 1).unwrap());
    }

    #[test]
    fn single_equals_is_accepted() {
        assert!(eval_str("page = 3", 3, 4).unwrap());
    }

    #[test]
    fn parse_errors() {
        assert_eq!(PageExpression::parse("   "), Err(ExpressionError::Empty));
        assert!(matches!(
            PageExpression::parse("page $ 2"),
            Err(ExpressionError::UnexpectedChar('$', 5))
        ));
        assert!(matches!(
            PageExpression::parse("pages == 2"),
            Err(ExpressionError::UnknownIdentifier(name, 0)) if name == "pages"
        ));
        assert!(matches!(
            PageExpression::parse("(page == 2"),
            Err(ExpressionError::UnexpectedToken(_, _))
        ));
        assert!(matches!(
            PageExpression::parse("page == 2 3"),
            Err(ExpressionError::UnexpectedToken(_, _))
        ));
        assert!(matches!(
            PageExpression::parse("99999999999999999999"),
            Err(ExpressionError::IntegerOverflow(0))
        ));
    }

    #[test]
    fn evaluation_errors() {
        assert_eq!(eval_str("page % 0 == 1", 1, 1), Err(ExpressionError::DivisionByZero));
        assert!(matches!(
            eval_str("page + 1", 1, 1),
            Err(ExpressionError::TypeMismatch { expected: "boolean", .. })
        ));
        assert!(matches!(
            eval_str("true < 2", 1, 1),
            Err(ExpressionError::TypeMismatch { expected: "integer", .. })
        ));
        assert!(matches!(
            eval_str("page == true", 1, 1),
            Err(ExpressionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn nesting_is_bounded() {
        let at_limit = format!("{}page == 1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(eval_str(&at_limit, 1, 1).unwrap());

        let too_deep = format!("({at_limit})");
        assert_eq!(
            PageExpression::parse(&too_deep),
            Err(ExpressionError::TooDeep(MAX_NESTING))
        );
        let negations = format!("{}true", "!".repeat(MAX_NESTING + 1));
        assert_eq!(
            PageExpression::parse(&negations),
            Err(ExpressionError::TooDeep(MAX_NESTING))
        );
        let minus = format!("{}page < 0", "-".repeat(MAX_NESTING + 1));
        assert_eq!(
            PageExpression::parse(&minus),
            Err(ExpressionError::TooDeep(MAX_NESTING))
        );
    }

    #[test]
    fn hostile_input_is_rejected_without_recursing() {
        let parens = format!("{}page == 1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(
            PageExpression::parse(&parens),
            Err(ExpressionError::TooLong(MAX_TOKENS))
        );
        let chain = format!("page{} == 1", " + 1".repeat(100_000));
        assert_eq!(
            PageExpression::parse(&chain),
            Err(ExpressionError::TooLong(MAX_TOKENS))
        );
        let shallow_chain = format!("page{} > 1", " + 1".repeat(400));
        assert!(eval_str(&shallow_chain, 1, 1).unwrap());
    }

    #[test]
    fn errors_convert_into_reportmark_error() {
        let err: ReportmarkError = ExpressionError::DivisionByZero.into();
        assert!(matches!(err, ReportmarkError::Expression(msg) if msg == "division by zero"));
    }
}
