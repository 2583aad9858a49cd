// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Rule filters.
//!
//! A rule is either a comparison `[path, op, value]` or a logic node
//! `["and" | "or" | "nor", [rule, ...]]`, in their value encoding.

use crate::dynamic::{Data, Value, ValueError};
use crate::query::path;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// `~`: regular expression search on strings.
    Regex,
    /// Field is an element of the operand.
    In,
    NotIn,
    /// Field holds the operand as element (arrays) or substring (strings).
    Contains,
    NotContains,
    /// Shell glob on strings (`*`, `?`).
    Match,
}

impl Operator {
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "=" | "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            "~" => Some(Self::Regex),
            "in" => Some(Self::In),
            "nin" => Some(Self::NotIn),
            "contains" => Some(Self::Contains),
            "ncontains" => Some(Self::NotContains),
            "match" => Some(Self::Match),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Regex => "~",
            Self::In => "in",
            Self::NotIn => "nin",
            Self::Contains => "contains",
            Self::NotContains => "ncontains",
            Self::Match => "match",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field comparison.
#[derive(Debug, Clone)]
pub struct Comparison {
    path: String,
    op: Operator,
    operand: Value,
    pattern: Option<Regex>,
}

impl Comparison {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn operand(&self) -> &Value {
        &self.operand
    }

    fn evaluate(&self, item: Option<&Value>) -> bool {
        // Absent fields only satisfy the negated operators.
        let Some(item) = item else {
            return matches!(self.op, Operator::Ne | Operator::NotIn | Operator::NotContains);
        };

        match self.op {
            Operator::Eq => values_equal(item, &self.operand),
            Operator::Ne => !values_equal(item, &self.operand),
            Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => {
                match compare_values(item, &self.operand) {
                    Some(ord) => match self.op {
                        Operator::Gt => ord == Ordering::Greater,
                        Operator::Lt => ord == Ordering::Less,
                        Operator::Ge => ord != Ordering::Less,
                        _ => ord != Ordering::Greater,
                    },
                    None => false,
                }
            }
            Operator::Regex => match (item.as_str(), &self.pattern) {
                (Some(text), Some(re)) => re.is_match(text),
                _ => false,
            },
            Operator::In => holds(&self.operand, item),
            Operator::NotIn => !holds(&self.operand, item),
            Operator::Contains => holds(item, &self.operand),
            Operator::NotContains => !holds(item, &self.operand),
            Operator::Match => match (item.as_str(), self.operand.as_str()) {
                (Some(text), Some(pattern)) => glob_match(pattern, text),
                _ => false,
            },
        }
    }
}

/// A filter rule tree.
#[derive(Debug, Clone)]
pub enum Rule {
    Compare(Comparison),
    And(Vec<Rule>),
    Or(Vec<Rule>),
    Nor(Vec<Rule>),
}

impl Rule {
    /// Comparison rule, e.g. `Rule::compare("age", ">=", 18i64)`.
    pub fn compare(path: &str, op: &str, operand: impl Into<Value>) -> Result<Self, ValueError> {
        let op = Operator::parse(op).ok_or_else(|| ValueError::InvalidRule(format!("unknown operator '{op}'")))?;
        Self::with_operator(path, op, operand)
    }

    pub fn with_operator(path: &str, op: Operator, operand: impl Into<Value>) -> Result<Self, ValueError> {
        let operand = operand.into();
        let pattern = match op {
            Operator::Regex => {
                let text = operand
                    .as_str()
                    .ok_or_else(|| ValueError::InvalidRule("'~' takes a string pattern".into()))?;
                Some(Regex::new(text).map_err(|e| ValueError::InvalidRule(e.to_string()))?)
            }
            Operator::Match if operand.as_str().is_none() => {
                return Err(ValueError::InvalidRule("'match' takes a string pattern".into()))
            }
            _ => None,
        };
        Ok(Self::Compare(Comparison {
            path: path.to_string(),
            op,
            operand,
            pattern,
        }))
    }

    /// Build a rule from its value encoding.
    pub fn parse(value: &Value) -> Result<Self, ValueError> {
        let items = value
            .as_array()
            .ok_or_else(|| ValueError::InvalidRule(format!("expected an array, got {}", value.kind())))?;

        match items {
            [path, op, operand] => {
                let path = path
                    .as_str()
                    .ok_or_else(|| ValueError::InvalidRule("field path must be a string".into()))?;
                let op = op
                    .as_str()
                    .ok_or_else(|| ValueError::InvalidRule("operator must be a string".into()))?;
                Self::compare(path, op, operand)
            }
            [logic, children] => {
                let children = Self::parse_list(children)?;
                match logic.as_str() {
                    Some("and") => Ok(Self::And(children)),
                    Some("or") => Ok(Self::Or(children)),
                    Some("nor") => Ok(Self::Nor(children)),
                    _ => Err(ValueError::InvalidRule(format!("unknown logic operator {logic}"))),
                }
            }
            _ => Err(ValueError::InvalidRule(format!(
                "expected [field, op, value] or [logic, rules], got {} items",
                items.len()
            ))),
        }
    }

    /// Parse an array of rules.
    pub fn parse_list(value: &Value) -> Result<Vec<Self>, ValueError> {
        value
            .as_array()
            .ok_or_else(|| ValueError::InvalidRule("expected an array of rules".into()))?
            .iter()
            .map(Self::parse)
            .collect()
    }

    /// Evaluate the rule against one value.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Compare(cmp) => {
                let item = path::get(value, &cmp.path).ok();
                cmp.evaluate(item.as_ref())
            }
            Self::And(rules) => rules.iter().all(|r| r.matches(value)),
            Self::Or(rules) => rules.iter().any(|r| r.matches(value)),
            Self::Nor(rules) => !rules.iter().any(|r| r.matches(value)),
        }
    }
}

/// True when `value` satisfies every rule.
pub fn apply(value: &Value, rules: &[Rule]) -> bool {
    rules.iter().all(|r| r.matches(value))
}

fn as_integer(value: &Value) -> Option<i128> {
    match value.data() {
        Data::Int64(v) => Some(i128::from(*v)),
        Data::Uint64(v) => Some(i128::from(*v)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match compare_values(a, b) {
        Some(ord) => ord == Ordering::Equal,
        None => a == b,
    }
}

/// Ordering between numbers (any mix of int64, uint64 and double),
/// strings or bools. Other pairs are unordered.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.partial_cmp(&y);
    }
    match (a.data(), b.data()) {
        (Data::String(x), Data::String(y)) => Some(x.cmp(y)),
        (Data::Bool(x), Data::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// `container` holds `item`: array element or substring.
fn holds(container: &Value, item: &Value) -> bool {
    match (container.data(), item.data()) {
        (Data::Array(items), _) => items.iter().any(|v| values_equal(v, item)),
        (Data::String(text), Data::String(needle)) => text.contains(needle.as_str()),
        (Data::Dictionary(map), Data::String(key)) => map.contains_key(key),
        _ => false,
    }
}

/// Simple glob matching (supports * and ?).
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();
    glob_match_recursive(&pattern_chars, &text_chars, 0, 0)
}

fn glob_match_recursive(pattern: &[char], text: &[char], pi: usize, ti: usize) -> bool {
    if pi == pattern.len() {
        return ti == text.len();
    }

    match pattern[pi] {
        '*' => (ti..=text.len()).any(|i| glob_match_recursive(pattern, text, pi + 1, i)),
        '?' => ti < text.len() && glob_match_recursive(pattern, text, pi + 1, ti + 1),
        c => ti < text.len() && text[ti] == c && glob_match_recursive(pattern, text, pi + 1, ti + 1),
    }
}
