// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema document format (YAML).
//!
//! One document is one schema unit:
//!
//! ```yaml
//! meta:
//!   version: 1
//!   namespace: com.example
//! struct Point:
//!   members:
//!     x: { type: int64 }
//!     y: { type: int64, default: 0 }
//! interface Plotter:
//!   members:
//!     method plot:
//!       args: [ { name: point, type: Point } ]
//!     property color: { type: string }
//!     event plotted: { type: Point }
//! ```
//!
//! Declarations keep the order in which they appear in the document.

use crate::dynamic::Value;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::HashMap;

/// Metadata block (`meta:`) of a schema unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Prefix applied to unqualified declaration names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A parsed schema unit: metadata plus `"<kind> <name>" -> body` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub meta: SchemaMeta,

    #[serde(flatten)]
    pub declarations: Mapping,
}

impl SchemaDocument {
    /// Parse a YAML schema unit. An empty text is an empty unit.
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Render the unit back to YAML.
    pub fn to_yaml_string(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta.namespace.as_deref()
    }
}

/// Body of one declaration entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclarationBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Parent struct.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,

    /// Typedef target.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// `name -> MemberBody`, ordered.
    #[serde(skip_serializing_if = "Mapping::is_empty")]
    pub members: Mapping,
}

/// Body of one member entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberBody {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_yaml::Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgumentBody>,

    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub result: Option<ReturnBody>,

    #[serde(rename = "read-only", skip_serializing_if = "is_false")]
    pub read_only: bool,

    /// `validator name -> parameters`, checked after the type check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Mapping>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Method argument entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentBody {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Method return entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnBody {
    #[serde(rename = "type")]
    pub ty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Convert a YAML literal (member defaults) into an untyped value.
pub(crate) fn value_from_yaml(yaml: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match yaml {
        Yaml::Null => Value::null(),
        Yaml::Bool(b) => Value::from(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                Value::from(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Yaml::String(s) => Value::from(s.as_str()),
        Yaml::Sequence(seq) => Value::from(seq.iter().map(value_from_yaml).collect::<Vec<_>>()),
        Yaml::Mapping(map) => {
            let entries: HashMap<String, Value> = map
                .iter()
                .map(|(k, v)| (yaml_key(k), value_from_yaml(v)))
                .collect();
            Value::from(entries)
        }
        Yaml::Tagged(tagged) => value_from_yaml(&tagged.value),
    }
}

fn yaml_key(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_keeps_declaration_order() {
        let doc = SchemaDocument::from_yaml_str(
            "meta:\n  namespace: a.b\nstruct Z: {}\nenum A: {}\ntype M:\n  type: string\n",
        )
        .expect("parse");
        assert_eq!(doc.namespace(), Some("a.b"));
        let keys: Vec<_> = doc.declarations.keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(keys, ["struct Z", "enum A", "type M"]);
    }

    #[test]
    fn test_empty_document() {
        let doc = SchemaDocument::from_yaml_str("  \n").expect("parse");
        assert!(doc.declarations.is_empty());
    }

    #[test]
    fn test_yaml_round_trip_keeps_members() {
        let doc = SchemaDocument::from_yaml_str(
            "struct P:\n  members:\n    x: { type: int64, default: 3 }\n",
        )
        .expect("parse");
        let again = SchemaDocument::from_yaml_str(&doc.to_yaml_string().expect("render")).expect("reparse");
        assert_eq!(doc, again);
    }

    #[test]
    fn test_value_from_yaml() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("{a: [1, -2, 2.5, x, null, true]}").expect("yaml");
        let value = value_from_yaml(&yaml);
        let list = crate::query::get(&value, "a").expect("a");
        assert_eq!(
            list,
            Value::from(vec![
                Value::from(1i64),
                Value::from(-2i64),
                Value::from(2.5),
                Value::from("x"),
                Value::null(),
                Value::from(true),
            ])
        );
    }
}
