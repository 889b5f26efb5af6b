//! # Complex Filter Expressions
//!
//! Lexer, recursive-descent parser, schema resolver, and three-valued
//! evaluator for the boolean filter language accepted by
//! `Cursor::set_complex_filter`:
//!
//! ```text
//! expr    := and ( OR and )*
//! and     := not ( AND not )*
//! not     := NOT not | cmp
//! cmp     := primary ( cmpop primary | IS [NOT] NULL )?
//! cmpop   := = | <> | != | < | <= | > | >=
//! primary := '(' expr ')' | literal | column
//! literal := integer | float | 'string' | TRUE | FALSE | NULL
//! ```
//!
//! An expression is parsed once into a name-based tree and resolved against
//! a cursor's schema view into an index-based tree. Resolution is a separate
//! pass so the same parsed text can be re-resolved when filters are copied
//! to another cursor. Unresolvable column references fail with
//! [`CursorError::InvalidFilterExpression`].
//!
//! Evaluation follows SQL three-valued logic: a comparison with a NULL
//! operand is UNKNOWN, and UNKNOWN propagates through AND/OR/NOT with the
//! usual truth tables. A row matches only when the expression is TRUE.

use crate::error::CursorError;
use crate::schema::TableDef;
use crate::types::OwnedValue;
use eyre::Result;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Expression tree, generic over the column reference representation.
///
/// `Expr<String>` is the parsed form, `Expr<usize>` the schema-resolved
/// form used for shapes and evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<C> {
    Column(C),
    Literal(OwnedValue),
    Cmp {
        op: CmpOp,
        left: Box<Expr<C>>,
        right: Box<Expr<C>>,
    },
    And(Box<Expr<C>>, Box<Expr<C>>),
    Or(Box<Expr<C>>, Box<Expr<C>>),
    Not(Box<Expr<C>>),
    IsNull {
        expr: Box<Expr<C>>,
        negated: bool,
    },
}

pub type ParsedExpr = Expr<String>;
pub type ResolvedExpr = Expr<usize>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Cmp(CmpOp),
    LParen,
    RParen,
    And,
    Or,
    Not,
    Is,
    Null,
    True,
    False,
    Eof,
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn next_token(&mut self) -> Result<Token> {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        let Some(b) = self.peek() else {
            return Ok(Token::Eof);
        };
        match b {
            b'(' => {
                self.pos += 1;
                Ok(Token::LParen)
            }
            b')' => {
                self.pos += 1;
                Ok(Token::RParen)
            }
            b'=' => {
                self.pos += 1;
                Ok(Token::Cmp(CmpOp::Eq))
            }
            b'<' => {
                self.pos += 1;
                match self.peek() {
                    Some(b'>') => {
                        self.pos += 1;
                        Ok(Token::Cmp(CmpOp::Ne))
                    }
                    Some(b'=') => {
                        self.pos += 1;
                        Ok(Token::Cmp(CmpOp::Le))
                    }
                    _ => Ok(Token::Cmp(CmpOp::Lt)),
                }
            }
            b'>' => {
                self.pos += 1;
                if self.peek() == Some(b'=') {
                    self.pos += 1;
                    Ok(Token::Cmp(CmpOp::Ge))
                } else {
                    Ok(Token::Cmp(CmpOp::Gt))
                }
            }
            b'!' => {
                self.pos += 1;
                if self.bump() == Some(b'=') {
                    Ok(Token::Cmp(CmpOp::Ne))
                } else {
                    Err(CursorError::InvalidFilterExpression(
                        "expected '=' after '!'".into(),
                    )
                    .into())
                }
            }
            b'\'' => self.string_literal(),
            b'0'..=b'9' | b'-' | b'.' => self.number_literal(),
            b if b.is_ascii_alphabetic() || b == b'_' => Ok(self.ident_or_keyword()),
            other => Err(CursorError::InvalidFilterExpression(format!(
                "unexpected character {:?}",
                other as char
            ))
            .into()),
        }
    }

    fn string_literal(&mut self) -> Result<Token> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'\'') => {
                    // '' escapes a single quote
                    if self.peek() == Some(b'\'') {
                        self.pos += 1;
                        out.push('\'');
                    } else {
                        return Ok(Token::Str(out));
                    }
                }
                Some(b) => out.push(b as char),
                None => {
                    return Err(CursorError::InvalidFilterExpression(
                        "unterminated string literal".into(),
                    )
                    .into())
                }
            }
        }
    }

    fn number_literal(&mut self) -> Result<Token> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !is_float => {
                    is_float = true;
                    self.pos += 1;
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| CursorError::InvalidFilterExpression("invalid number".into()))?;
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| CursorError::InvalidFilterExpression(format!("bad float {text:?}")).into())
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| CursorError::InvalidFilterExpression(format!("bad integer {text:?}")).into())
        }
    }

    fn ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let word = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
        match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "IS" => Token::Is,
            "NULL" => Token::Null,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            _ => Token::Ident(word.to_string()),
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn advance(&mut self) -> Result<Token> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn parse_or(&mut self) -> Result<ParsedExpr> {
        let mut left = self.parse_and()?;
        while self.current == Token::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ParsedExpr> {
        let mut left = self.parse_not()?;
        while self.current == Token::And {
            self.advance()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<ParsedExpr> {
        if self.current == Token::Not {
            self.advance()?;
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_cmp()
    }

    fn parse_cmp(&mut self) -> Result<ParsedExpr> {
        let left = self.parse_primary()?;
        match self.current.clone() {
            Token::Cmp(op) => {
                self.advance()?;
                let right = self.parse_primary()?;
                Ok(Expr::Cmp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            Token::Is => {
                self.advance()?;
                let negated = if self.current == Token::Not {
                    self.advance()?;
                    true
                } else {
                    false
                };
                if self.current != Token::Null {
                    return Err(CursorError::InvalidFilterExpression(
                        "expected NULL after IS".into(),
                    )
                    .into());
                }
                self.advance()?;
                Ok(Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                })
            }
            _ => Ok(left),
        }
    }

    fn parse_primary(&mut self) -> Result<ParsedExpr> {
        match self.advance()? {
            Token::LParen => {
                let inner = self.parse_or()?;
                if self.current != Token::RParen {
                    return Err(
                        CursorError::InvalidFilterExpression("expected ')'".into()).into()
                    );
                }
                self.advance()?;
                Ok(inner)
            }
            Token::Ident(name) => Ok(Expr::Column(name)),
            Token::Int(i) => Ok(Expr::Literal(OwnedValue::Int(i))),
            Token::Float(f) => Ok(Expr::Literal(OwnedValue::Float(f))),
            Token::Str(s) => Ok(Expr::Literal(OwnedValue::Text(s))),
            Token::True => Ok(Expr::Literal(OwnedValue::Bool(true))),
            Token::False => Ok(Expr::Literal(OwnedValue::Bool(false))),
            Token::Null => Ok(Expr::Literal(OwnedValue::Null)),
            other => Err(CursorError::InvalidFilterExpression(format!(
                "unexpected token {other:?}"
            ))
            .into()),
        }
    }
}

/// Parses filter text into a name-based expression tree.
pub fn parse(input: &str) -> Result<ParsedExpr> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_or()?;
    if parser.current != Token::Eof {
        return Err(CursorError::InvalidFilterExpression(format!(
            "trailing input after expression: {:?}",
            parser.current
        ))
        .into());
    }
    Ok(expr)
}

/// Resolves every column reference against the table's column list.
pub fn resolve(expr: &ParsedExpr, table: &TableDef) -> Result<ResolvedExpr> {
    Ok(match expr {
        Expr::Column(name) => {
            let index = table.column_index(name).ok_or_else(|| {
                CursorError::InvalidFilterExpression(format!(
                    "unknown column {:?} on {}",
                    name,
                    table.name()
                ))
            })?;
            Expr::Column(index)
        }
        Expr::Literal(v) => Expr::Literal(v.clone()),
        Expr::Cmp { op, left, right } => Expr::Cmp {
            op: *op,
            left: Box::new(resolve(left, table)?),
            right: Box::new(resolve(right, table)?),
        },
        Expr::And(l, r) => Expr::And(
            Box::new(resolve(l, table)?),
            Box::new(resolve(r, table)?),
        ),
        Expr::Or(l, r) => Expr::Or(
            Box::new(resolve(l, table)?),
            Box::new(resolve(r, table)?),
        ),
        Expr::Not(e) => Expr::Not(Box::new(resolve(e, table)?)),
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(resolve(expr, table)?),
            negated: *negated,
        },
    })
}

fn eval_value(expr: &ResolvedExpr, row: &[OwnedValue]) -> OwnedValue {
    match expr {
        Expr::Column(i) => row.get(*i).cloned().unwrap_or(OwnedValue::Null),
        Expr::Literal(v) => v.clone(),
        // Boolean sub-expressions used as operands reduce to their truth
        // value, with UNKNOWN as NULL.
        other => match eval(other, row) {
            Some(b) => OwnedValue::Bool(b),
            None => OwnedValue::Null,
        },
    }
}

/// Three-valued evaluation: `Some(true)`, `Some(false)`, or `None` (UNKNOWN).
pub fn eval(expr: &ResolvedExpr, row: &[OwnedValue]) -> Option<bool> {
    match expr {
        Expr::Column(i) => match row.get(*i) {
            Some(OwnedValue::Bool(b)) => Some(*b),
            Some(OwnedValue::Null) | None => None,
            Some(_) => Some(false),
        },
        Expr::Literal(OwnedValue::Bool(b)) => Some(*b),
        Expr::Literal(OwnedValue::Null) => None,
        Expr::Literal(_) => Some(false),
        Expr::Cmp { op, left, right } => {
            let l = eval_value(left, row);
            let r = eval_value(right, row);
            let ord = l.compare(&r)?;
            Some(match op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Ne => ord != Ordering::Equal,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Ge => ord != Ordering::Less,
            })
        }
        Expr::And(l, r) => match (eval(l, row), eval(r, row)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Expr::Or(l, r) => match (eval(l, row), eval(r, row)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Expr::Not(e) => eval(e, row).map(|b| !b),
        Expr::IsNull { expr, negated } => {
            let v = eval_value(expr, row);
            Some(v.is_null() != *negated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDef;
    use crate::types::DataType;

    fn table() -> TableDef {
        TableDef::new(
            "t",
            vec![
                ColumnDef::new("id", DataType::Int8),
                ColumnDef::new("name", DataType::Text),
                ColumnDef::new("qty", DataType::Int4),
            ],
        )
        .with_primary_key(vec!["id"])
    }

    fn compile(text: &str) -> ResolvedExpr {
        resolve(&parse(text).unwrap(), &table()).unwrap()
    }

    #[test]
    fn parses_precedence_and_parens() {
        let e = compile("id = 1 OR id = 2 AND qty > 3");
        // AND binds tighter than OR.
        assert!(matches!(e, Expr::Or(_, _)));
        let e = compile("(id = 1 OR id = 2) AND qty > 3");
        assert!(matches!(e, Expr::And(_, _)));
    }

    #[test]
    fn evaluates_against_row() {
        let e = compile("name = 'ab' AND qty >= 3");
        let row = vec![
            OwnedValue::Int(1),
            OwnedValue::Text("ab".into()),
            OwnedValue::Int(3),
        ];
        assert_eq!(eval(&e, &row), Some(true));
        let row2 = vec![
            OwnedValue::Int(1),
            OwnedValue::Text("ab".into()),
            OwnedValue::Int(2),
        ];
        assert_eq!(eval(&e, &row2), Some(false));
    }

    #[test]
    fn null_comparison_is_unknown_but_is_null_is_definite() {
        let row = vec![OwnedValue::Int(1), OwnedValue::Null, OwnedValue::Int(5)];
        assert_eq!(eval(&compile("name = 'x'"), &row), None);
        assert_eq!(eval(&compile("name IS NULL"), &row), Some(true));
        assert_eq!(eval(&compile("name IS NOT NULL"), &row), Some(false));
    }

    #[test]
    fn unknown_propagates_through_and_or() {
        let row = vec![OwnedValue::Int(1), OwnedValue::Null, OwnedValue::Int(5)];
        // UNKNOWN AND true = UNKNOWN, UNKNOWN OR true = true
        assert_eq!(eval(&compile("name = 'x' AND qty = 5"), &row), None);
        assert_eq!(eval(&compile("name = 'x' OR qty = 5"), &row), Some(true));
        assert_eq!(eval(&compile("name = 'x' AND qty = 9"), &row), Some(false));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let err = resolve(&parse("missing = 1").unwrap(), &table()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CursorError>(),
            Some(CursorError::InvalidFilterExpression(_))
        ));
    }

    #[test]
    fn string_escapes_and_operators() {
        let e = compile("name <> 'it''s'");
        let row = vec![
            OwnedValue::Int(1),
            OwnedValue::Text("it's".into()),
            OwnedValue::Int(0),
        ];
        assert_eq!(eval(&e, &row), Some(false));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse("id = 1 )").is_err());
        assert!(parse("id =").is_err());
    }
}
