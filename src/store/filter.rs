//! Filter expressions understood by [`TableStore`](super::TableStore).
//!
//! An expression is one or more clauses joined by `AND`:
//!
//! - `operand <op> operand`, `<op>` one of `=`, `<>`, `<`, `<=`, `>`, `>=`
//! - `attribute_exists(path)` / `attribute_not_exists(path)`
//! - `true`
//!
//! An operand is a `#name` placeholder, a `:value` placeholder or a bare attribute
//! name. Numbers compare numerically, strings and binaries lexicographically. An
//! ordering comparison between different types, or against a missing attribute, is
//! false.

use std::cmp::Ordering;

use anyhow::{anyhow, bail, Context};

use crate::request::Filter;
use crate::value::{AttributeValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Op(Comparator),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Attribute(String),
    Value(AttributeValue),
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Always,
    Exists(String),
    NotExists(String),
    Compare {
        lhs: Operand,
        op: Comparator,
        rhs: Operand,
    },
}

/// A compiled [`Filter`], with every placeholder resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FilterExpression {
    clauses: Vec<Clause>,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '#' | ':' | '.' | '-')
}

fn tokenize(expression: &str) -> anyhow::Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(Comparator::Eq));
            }
            '<' => {
                chars.next();
                let op = match chars.peek() {
                    Some('=') => Comparator::Le,
                    Some('>') => Comparator::Ne,
                    _ => Comparator::Lt,
                };
                if op != Comparator::Lt {
                    chars.next();
                }
                tokens.push(Token::Op(op));
            }
            '>' => {
                chars.next();
                let op = if chars.peek() == Some(&'=') {
                    chars.next();
                    Comparator::Ge
                } else {
                    Comparator::Gt
                };
                tokens.push(Token::Op(op));
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
            other => bail!("unexpected character `{other}` in filter expression"),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: std::iter::Peekable<std::vec::IntoIter<Token>>,
    filter: &'a Filter,
}

impl Parser<'_> {
    fn parse(mut self) -> anyhow::Result<Vec<Clause>> {
        let mut clauses = vec![self.clause()?];
        while let Some(token) = self.tokens.next() {
            match token {
                Token::Word(word) if word.eq_ignore_ascii_case("and") => {
                    clauses.push(self.clause()?)
                }
                other => bail!("expected `AND`, found {other:?}"),
            }
        }
        Ok(clauses)
    }

    fn clause(&mut self) -> anyhow::Result<Clause> {
        let word = match self.tokens.next() {
            Some(Token::Word(word)) => word,
            other => bail!("expected a clause, found {other:?}"),
        };
        if self.tokens.peek() == Some(&Token::LParen) {
            self.tokens.next();
            let path = match self.tokens.next() {
                Some(Token::Word(path)) => self.attribute(&path)?,
                other => bail!("expected an attribute path, found {other:?}"),
            };
            if self.tokens.next() != Some(Token::RParen) {
                bail!("expected `)` after `{word}({path}`");
            }
            return match word.as_str() {
                "attribute_exists" => Ok(Clause::Exists(path)),
                "attribute_not_exists" => Ok(Clause::NotExists(path)),
                _ => bail!("unsupported function `{word}`"),
            };
        }

        let op = match self.tokens.peek() {
            Some(Token::Op(op)) => *op,
            _ if word.eq_ignore_ascii_case("true") => return Ok(Clause::Always),
            other => bail!("expected a comparison after `{word}`, found {other:?}"),
        };
        self.tokens.next();
        let lhs = self.operand(&word)?;
        let rhs = match self.tokens.next() {
            Some(Token::Word(word)) => self.operand(&word)?,
            other => bail!("expected an operand, found {other:?}"),
        };
        Ok(Clause::Compare { lhs, op, rhs })
    }

    fn attribute(&self, word: &str) -> anyhow::Result<String> {
        if word.starts_with('#') {
            return self
                .filter
                .expression_names
                .get(word)
                .cloned()
                .with_context(|| format!("expression name `{word}` is not bound"));
        }
        if word.starts_with(':') {
            bail!("value placeholder `{word}` used as an attribute path");
        }
        Ok(word.to_owned())
    }

    fn operand(&self, word: &str) -> anyhow::Result<Operand> {
        if word.starts_with(':') {
            return self
                .filter
                .expression_values
                .get(word)
                .cloned()
                .map(Operand::Value)
                .ok_or_else(|| anyhow!("expression value `{word}` is not bound"));
        }
        self.attribute(word).map(Operand::Attribute)
    }
}

fn compare(lhs: &AttributeValue, rhs: &AttributeValue) -> Option<Ordering> {
    match (lhs, rhs) {
        (AttributeValue::S(a), AttributeValue::S(b)) => Some(a.cmp(b)),
        (AttributeValue::B(a), AttributeValue::B(b)) => Some(a.cmp(b)),
        (AttributeValue::N(_), AttributeValue::N(_)) => {
            lhs.as_number()?.partial_cmp(&rhs.as_number()?)
        }
        _ => None,
    }
}

impl FilterExpression {
    /// Parses `filter.expression` and resolves its placeholders.
    pub(crate) fn compile(filter: &Filter) -> anyhow::Result<Self> {
        let tokens = tokenize(&filter.expression)?;
        let clauses = Parser {
            tokens: tokens.into_iter().peekable(),
            filter,
        }
        .parse()
        .with_context(|| format!("invalid filter expression `{}`", filter.expression))?;
        Ok(Self { clauses })
    }

    /// Whether `record` satisfies every clause.
    pub(crate) fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Always => true,
            Clause::Exists(path) => record.contains_key(path),
            Clause::NotExists(path) => !record.contains_key(path),
            Clause::Compare { lhs, op, rhs } => {
                let resolve = |operand: &Operand| match operand {
                    Operand::Attribute(name) => record.get(name).cloned(),
                    Operand::Value(value) => Some(value.clone()),
                };
                let (Some(lhs), Some(rhs)) = (resolve(lhs), resolve(rhs)) else {
                    return false;
                };
                let ordering = compare(&lhs, &rhs);
                match op {
                    Comparator::Eq => ordering.map_or(lhs == rhs, Ordering::is_eq),
                    Comparator::Ne => ordering.map_or(lhs != rhs, Ordering::is_ne),
                    Comparator::Lt => ordering.is_some_and(Ordering::is_lt),
                    Comparator::Le => ordering.is_some_and(Ordering::is_le),
                    Comparator::Gt => ordering.is_some_and(Ordering::is_gt),
                    Comparator::Ge => ordering.is_some_and(Ordering::is_ge),
                }
            }
        })
    }
}
