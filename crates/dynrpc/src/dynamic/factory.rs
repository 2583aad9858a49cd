// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Validated constructors for declared types.

use crate::dynamic::{conform, conform_member, Value, ValueError};
use crate::typing::{TypeClass, TypeInstance, Typing};
use std::collections::HashMap;

/// Constructor bound to one struct, union or enum instance.
///
/// # Example
///
/// ```rust
/// use dynrpc::{Typing, Value};
///
/// let typing = Typing::new();
/// typing
///     .load_str("enum Color:\n  members:\n    RED: {}\n    GREEN: {}\n", "color.yaml")
///     .unwrap();
///
/// let color = typing.build("Color").unwrap().variant("GREEN").unwrap();
/// assert_eq!(color.as_str(), Some("GREEN"));
/// assert!(typing.build("Color").unwrap().variant("BLUE").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ValueFactory {
    typei: TypeInstance,
}

impl ValueFactory {
    /// Bind a factory to a type instance. Typedefs are unwound; only
    /// structs, unions and enums can be constructed.
    pub fn new(typei: TypeInstance) -> Result<Self, ValueError> {
        let typei = typei.unwind()?;
        match typei.class() {
            TypeClass::Struct | TypeClass::Union | TypeClass::Enum => Ok(Self { typei }),
            _ => Err(ValueError::NotConstructible(typei.canonical().to_string())),
        }
    }

    pub fn type_instance(&self) -> &TypeInstance {
        &self.typei
    }

    /// Build a struct or union value from named fields.
    ///
    /// Every field is checked against its declaration. Struct fields left
    /// out take their declared default, or read as null. A union takes at
    /// most one field, which becomes its active branch.
    pub fn create<I, K, V>(&self, fields: I) -> Result<Value, ValueError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let fields: Vec<(K, V)> = fields.into_iter().collect();
        match self.typei.class() {
            TypeClass::Struct => {
                let mut members = HashMap::new();
                for (member, owner) in self.typei.all_members()? {
                    if let Some(default) = member.default() {
                        let value = conform_member(&owner, &member, default.clone())?;
                        members.insert(member.name().to_string(), value);
                    }
                }
                for (name, value) in fields {
                    let (name, value) = self.check_field(name.as_ref(), value.into())?;
                    members.insert(name, value);
                }
                Ok(Value::new_struct(self.typei.clone(), members))
            }
            TypeClass::Union => {
                if fields.len() > 1 {
                    return Err(ValueError::UnionArity {
                        type_name: self.typei.canonical().to_string(),
                        count: fields.len(),
                    });
                }
                let mut members = HashMap::new();
                for (name, value) in fields {
                    let (name, value) = self.check_field(name.as_ref(), value.into())?;
                    members.insert(name, value);
                }
                Ok(Value::new_union(self.typei.clone(), members))
            }
            _ => Err(ValueError::NotConstructible(format!(
                "{} from fields",
                self.typei.canonical()
            ))),
        }
    }

    /// Struct with defaults only, or an empty union.
    pub fn empty(&self) -> Result<Value, ValueError> {
        self.create(std::iter::empty::<(&str, Value)>())
    }

    /// Enum value naming one of the declared variants.
    pub fn variant(&self, name: &str) -> Result<Value, ValueError> {
        if self.typei.class() != TypeClass::Enum {
            return Err(ValueError::NotConstructible(format!(
                "{} from a variant",
                self.typei.canonical()
            )));
        }
        conform(&self.typei, Value::from(name))
    }

    fn check_field(&self, name: &str, value: Value) -> Result<(String, Value), ValueError> {
        let (member, owner) = self
            .typei
            .lookup_member(name)?
            .ok_or_else(|| ValueError::UnknownMember {
                type_name: self.typei.canonical().to_string(),
                member: name.to_string(),
            })?;
        let value = conform_member(&owner, &member, value)?;
        Ok((name.to_string(), value))
    }
}

impl Typing {
    /// Factory for the named type, e.g. `"Point"` or `"Pair<string,int64>"`.
    pub fn build(&self, type_name: &str) -> crate::Result<ValueFactory> {
        let typei = self.instantiate(type_name)?;
        Ok(ValueFactory::new(typei)?)
    }
}
