// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Query execution over arrays.

use crate::dynamic::{Value, ValueError};
use crate::query::rules::{apply, Rule};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Ordering callback for [`QueryParams::sort`].
pub type SortFn = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Query shaping parameters.
///
/// Order of application: sort, reverse, rule filtering, offset, limit.
/// `count` replaces the result with a single `uint64` holding the number
/// of matches.
#[derive(Clone, Default)]
pub struct QueryParams {
    /// Stop after the first match.
    pub single: bool,
    pub count: bool,
    pub offset: usize,
    pub limit: Option<usize>,
    pub reverse: bool,
    pub sort: Option<SortFn>,
}

impl QueryParams {
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn sort_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Arc::new(compare));
        self
    }
}

impl fmt::Debug for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryParams")
            .field("single", &self.single)
            .field("count", &self.count)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .field("reverse", &self.reverse)
            .field("sort", &self.sort.is_some())
            .finish()
    }
}

/// Iterator over query matches.
///
/// Rules are evaluated as the iterator advances.
pub struct QueryIter {
    items: std::vec::IntoIter<Value>,
    rules: Vec<Rule>,
    skip: usize,
    remaining: Option<usize>,
    count: bool,
    counted: bool,
}

/// Filter the elements of an array value.
///
/// Returns `TypeMismatch` when `source` is not an array.
pub fn query(source: &Value, rules: Vec<Rule>, params: QueryParams) -> Result<QueryIter, ValueError> {
    let mut items = source
        .as_array()
        .ok_or_else(|| ValueError::mismatch("array", source.kind()))?
        .to_vec();

    if let Some(sort) = &params.sort {
        items.sort_by(|a, b| sort(a, b));
    }
    if params.reverse {
        items.reverse();
    }

    let remaining = match (params.single, params.limit) {
        (true, Some(limit)) => Some(limit.min(1)),
        (true, None) => Some(1),
        (false, limit) => limit,
    };

    Ok(QueryIter {
        items: items.into_iter(),
        rules,
        skip: params.offset,
        remaining,
        count: params.count,
        counted: false,
    })
}

impl QueryIter {
    fn next_match(&mut self) -> Option<Value> {
        if self.remaining == Some(0) {
            return None;
        }

        loop {
            let item = self.items.next()?;
            if !apply(&item, &self.rules) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Some(item);
        }
    }
}

impl Iterator for QueryIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if !self.count {
            return self.next_match();
        }
        if self.counted {
            return None;
        }
        self.counted = true;

        let mut matched = 0u64;
        while self.next_match().is_some() {
            matched += 1;
        }
        Some(Value::from(matched))
    }
}

impl fmt::Debug for QueryIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIter")
            .field("pending", &self.items.len())
            .field("rules", &self.rules.len())
            .finish()
    }
}
