// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dotted-path access.
//!
//! `set` and `delete` return a new root: arrays and dictionaries along the
//! path are copied, the input is left untouched. Struct and union nodes are
//! shared handles, so their members are written in place (through the
//! usual member validation) and the change is visible to every holder.

use crate::dynamic::{Data, Value, ValueError};

/// Value at `path`.
pub fn get(value: &Value, path: &str) -> Result<Value, ValueError> {
    let segments = split(path)?;
    get_in(value, &segments, 0)
}

/// True when `path` addresses a present value.
pub fn contains(value: &Value, path: &str) -> bool {
    get(value, path).is_ok()
}

/// Copy of `value` with `new` stored at `path`.
///
/// Missing dictionary keys along the path are created as empty
/// dictionaries; array indices must already exist.
pub fn set(value: &Value, path: &str, new: impl Into<Value>) -> Result<Value, ValueError> {
    let segments = split(path)?;
    set_in(value, &segments, 0, new.into())
}

/// Copy of `value` without the entry at `path`.
///
/// A struct member is cleared (it reads as null afterwards), an array
/// element is removed and later elements shift down.
pub fn delete(value: &Value, path: &str) -> Result<Value, ValueError> {
    let segments = split(path)?;
    if segments.is_empty() {
        return Err(ValueError::PathNotFound(String::new()));
    }
    delete_in(value, &segments, 0)
}

fn split(path: &str) -> Result<Vec<&str>, ValueError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ValueError::InvalidPath {
            path: path.to_string(),
            reason: "empty segment".into(),
        });
    }
    Ok(segments)
}

/// Path prefix up to and including `depth`, for error messages.
fn prefix(segments: &[&str], depth: usize) -> String {
    segments[..=depth].join(".")
}

fn not_found(segments: &[&str], depth: usize) -> ValueError {
    ValueError::PathNotFound(prefix(segments, depth))
}

fn not_indexable(node: &Value, segments: &[&str], depth: usize) -> ValueError {
    ValueError::NotIndexable {
        path: prefix(segments, depth),
        kind: node.kind(),
    }
}

fn get_in(node: &Value, segments: &[&str], depth: usize) -> Result<Value, ValueError> {
    let Some(segment) = segments.get(depth) else {
        return Ok(node.clone());
    };
    match node.data() {
        Data::Dictionary(map) => match map.get(*segment) {
            Some(child) => get_in(child, segments, depth + 1),
            None => Err(not_found(segments, depth)),
        },
        Data::Array(items) => match segment.parse::<usize>().ok().and_then(|i| items.get(i)) {
            Some(child) => get_in(child, segments, depth + 1),
            None => Err(not_found(segments, depth)),
        },
        Data::Struct(_) | Data::Union(_) => match node.stored_member(segment) {
            Some(child) => get_in(&child, segments, depth + 1),
            None => Err(not_found(segments, depth)),
        },
        _ => Err(not_indexable(node, segments, depth)),
    }
}

fn set_in(node: &Value, segments: &[&str], depth: usize, new: Value) -> Result<Value, ValueError> {
    let Some(segment) = segments.get(depth) else {
        return Ok(new);
    };
    let last = depth + 1 == segments.len();

    match node.data() {
        Data::Dictionary(map) => {
            let child = match map.get(*segment) {
                Some(child) => set_in(child, segments, depth + 1, new)?,
                None if last => new,
                None => set_in(&Value::dictionary(), segments, depth + 1, new)?,
            };
            let mut map = map.clone();
            map.insert(segment.to_string(), child);
            Ok(rebuild(node, Data::Dictionary(map)))
        }
        Data::Array(items) => {
            let index = parse_index(segment, segments, depth)?;
            let Some(current) = items.get(index) else {
                return Err(ValueError::IndexOutOfRange {
                    path: prefix(segments, depth),
                    index,
                    length: items.len(),
                });
            };
            let child = set_in(current, segments, depth + 1, new)?;
            let mut items = items.clone();
            items[index] = child;
            Ok(rebuild(node, Data::Array(items)))
        }
        Data::Struct(_) | Data::Union(_) => {
            let child = if last {
                new
            } else {
                let current = node.get(segment)?;
                let current = if current.is_null() { Value::dictionary() } else { current };
                set_in(&current, segments, depth + 1, new)?
            };
            node.set(segment, child)?;
            Ok(node.clone())
        }
        _ => Err(not_indexable(node, segments, depth)),
    }
}

fn delete_in(node: &Value, segments: &[&str], depth: usize) -> Result<Value, ValueError> {
    let segment = segments[depth];
    let last = depth + 1 == segments.len();

    match node.data() {
        Data::Dictionary(map) => {
            let Some(current) = map.get(segment) else {
                return Err(not_found(segments, depth));
            };
            let mut map = map.clone();
            if last {
                map.remove(segment);
            } else {
                let child = delete_in(current, segments, depth + 1)?;
                map.insert(segment.to_string(), child);
            }
            Ok(rebuild(node, Data::Dictionary(map)))
        }
        Data::Array(items) => {
            let index = segment
                .parse::<usize>()
                .ok()
                .filter(|&i| i < items.len())
                .ok_or_else(|| not_found(segments, depth))?;
            let mut items = items.clone();
            if last {
                items.remove(index);
            } else {
                let child = delete_in(&items[index], segments, depth + 1)?;
                items[index] = child;
            }
            Ok(rebuild(node, Data::Array(items)))
        }
        Data::Struct(_) | Data::Union(_) => {
            if last {
                if !node.clear_member(segment) {
                    return Err(not_found(segments, depth));
                }
            } else {
                let current = node
                    .stored_member(segment)
                    .ok_or_else(|| not_found(segments, depth))?;
                let child = delete_in(&current, segments, depth + 1)?;
                node.set(segment, child)?;
            }
            Ok(node.clone())
        }
        _ => Err(not_indexable(node, segments, depth)),
    }
}

fn parse_index(segment: &str, segments: &[&str], depth: usize) -> Result<usize, ValueError> {
    segment.parse::<usize>().map_err(|_| ValueError::InvalidPath {
        path: prefix(segments, depth),
        reason: format!("'{segment}' is not an array index"),
    })
}

/// New container with `data`, keeping the node's type annotation.
fn rebuild(node: &Value, data: Data) -> Value {
    match node.type_instance() {
        Some(typei) => Value::new(data).with_type(typei.clone()),
        None => Value::new(data),
    }
}
