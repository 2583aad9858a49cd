// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Textual type references (`name<arg, ...>`).

use crate::typing::TypingError;
use std::fmt;

/// A parsed type reference such as `array<com.example.Point>`.
///
/// Names are not resolved here; a `TypeExpr` is what a declaration stores
/// for each member type and is only looked up in the registry when
/// dereferenced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeExpr {
    pub name: String,
    pub args: Vec<TypeExpr>,
}

impl TypeExpr {
    /// Reference to a type without arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Parse `name` or `name<arg, ...>` with arbitrary nesting.
    pub fn parse(text: &str) -> Result<Self, TypingError> {
        let text = text.trim();
        let (name, args) = match text.find('<') {
            None => (text, None),
            Some(open) => {
                if !text.ends_with('>') {
                    return Err(TypingError::malformed(text, "unbalanced '<'"));
                }
                (text[..open].trim_end(), Some(&text[open + 1..text.len() - 1]))
            }
        };

        if !is_type_name(name) {
            return Err(TypingError::malformed(text, "invalid type name"));
        }

        let mut parsed = Vec::new();
        if let Some(args) = args {
            let parts = split_arguments(args).map_err(|reason| TypingError::malformed(text, reason))?;
            for part in parts {
                parsed.push(Self::parse(part)?);
            }
        }

        Ok(Self {
            name: name.to_string(),
            args: parsed,
        })
    }

    /// True when this reference carries no type arguments.
    pub fn is_bare(&self) -> bool {
        self.args.is_empty()
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", arg)?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

fn is_type_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// Split an argument list on top-level commas.
fn split_arguments(text: &str) -> Result<Vec<&str>, &'static str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth = depth.checked_sub(1).ok_or("unbalanced '>'")?;
            }
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err("unbalanced '<'");
    }
    parts.push(text[start..].trim());

    if parts.iter().any(|p| p.is_empty()) {
        return Err("empty type argument");
    }
    Ok(parts)
}
