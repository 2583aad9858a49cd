// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type declarations and their members.

use crate::dynamic::Value;
use crate::typing::document::{DeclarationBody, MemberBody};
use crate::typing::{value_from_yaml, Shared, TypeExpr, Typing, TypingError};
use std::collections::HashSet;
use std::fmt;
use std::sync::Weak;

/// Kind of a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Builtin,
    Typedef,
    Struct,
    Union,
    Enum,
    Interface,
}

impl TypeClass {
    /// Map a schema keyword (`struct`, `union`, `enum`, `type`, `interface`).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "struct" => Some(Self::Struct),
            "union" => Some(Self::Union),
            "enum" => Some(Self::Enum),
            "type" => Some(Self::Typedef),
            "interface" => Some(Self::Interface),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Builtin => "builtin",
            Self::Typedef => "typedef",
            Self::Struct => "struct",
            Self::Union => "union",
            Self::Enum => "enum",
            Self::Interface => "interface",
        }
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub ty: TypeExpr,
    pub description: Option<String>,
}

/// Argument list and result type of an interface method.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodSignature {
    pub args: Vec<Argument>,
    pub result: Option<TypeExpr>,
}

/// What a member is within its declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberRole {
    /// Struct or union field.
    Field(TypeExpr),
    /// Enum variant.
    Variant,
    /// Interface method.
    Method(MethodSignature),
    /// Interface property.
    Property { ty: TypeExpr, read_only: bool },
    /// Interface event, carrying a value of the given type.
    Event(TypeExpr),
}

/// Value check attached to a member under `constraints`.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// `range: {min, max}` on integers, either bound optional.
    Range { min: Option<i64>, max: Option<i64> },
    /// `min-length: N` on strings, counted in characters.
    MinLength(usize),
    /// `regex: {pattern}` on strings, matched anywhere in the string.
    Regex(regex::Regex),
}

impl Constraint {
    /// Validator name as written in a schema.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Range { .. } => "range",
            Self::MinLength(_) => "min-length",
            Self::Regex(_) => "regex",
        }
    }

    /// Check `value`, returning the violation message on failure.
    ///
    /// Values of another kind pass; the type check runs first.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Range { min, max } => {
                let Some(n) = value.as_i64() else {
                    return Ok(());
                };
                if let Some(max) = max.filter(|max| n > *max) {
                    return Err(format!("value {n} is larger than the maximum allowed: {max}"));
                }
                if let Some(min) = min.filter(|min| n < *min) {
                    return Err(format!("value {n} is smaller than the minimum allowed: {min}"));
                }
                Ok(())
            }
            Self::MinLength(len) => match value.as_str() {
                Some(s) if s.chars().count() < *len => Err(format!(
                    "string '{s}' is shorter than the minimum length: {len}"
                )),
                _ => Ok(()),
            },
            Self::Regex(re) => match value.as_str() {
                Some(s) if !re.is_match(s) => {
                    Err(format!("string '{s}' doesn't match '{}'", re.as_str()))
                }
                _ => Ok(()),
            },
        }
    }

    fn from_document(
        declaration: &str,
        member: &str,
        name: &serde_yaml::Value,
        params: &serde_yaml::Value,
    ) -> Result<Self, TypingError> {
        let malformed = |reason: String| {
            TypingError::malformed(declaration, format!("member '{member}': {reason}"))
        };
        let name = name
            .as_str()
            .ok_or_else(|| malformed("constraint names must be strings".to_string()))?;
        match name {
            "range" => {
                let bound = |key: &str| match params.get(key) {
                    None | Some(serde_yaml::Value::Null) => Ok(None),
                    Some(v) => v
                        .as_i64()
                        .map(Some)
                        .ok_or_else(|| malformed(format!("range {key} must be an integer"))),
                };
                if !params.is_mapping() {
                    return Err(malformed("range takes {min, max}".to_string()));
                }
                Ok(Self::Range {
                    min: bound("min")?,
                    max: bound("max")?,
                })
            }
            "min-length" => params
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Self::MinLength)
                .ok_or_else(|| malformed("min-length takes a non-negative integer".to_string())),
            "regex" => {
                let pattern = params
                    .as_str()
                    .or_else(|| params.get("pattern").and_then(serde_yaml::Value::as_str))
                    .ok_or_else(|| malformed("regex takes {pattern}".to_string()))?;
                regex::Regex::new(pattern)
                    .map(Self::Regex)
                    .map_err(|e| malformed(format!("bad regex: {e}")))
            }
            other => Err(malformed(format!("unknown constraint '{other}'"))),
        }
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Range { min: a, max: b }, Self::Range { min: c, max: d }) => a == c && b == d,
            (Self::MinLength(a), Self::MinLength(b)) => a == b,
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => {
                f.write_str("range[")?;
                if let Some(min) = min {
                    write!(f, "{min}")?;
                }
                f.write_str("..")?;
                if let Some(max) = max {
                    write!(f, "{max}")?;
                }
                f.write_str("]")
            }
            Self::MinLength(len) => write!(f, "min-length({len})"),
            Self::Regex(re) => write!(f, "regex({})", re.as_str()),
        }
    }
}

/// A named member of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    name: String,
    description: Option<String>,
    default: Option<Value>,
    role: MemberRole,
    constraints: Vec<Constraint>,
}

impl Member {
    pub fn new(name: impl Into<String>, role: MemberRole) -> Self {
        Self {
            name: name.into(),
            description: None,
            default: None,
            role,
            constraints: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Value used when a constructor leaves this field out.
    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn role(&self) -> &MemberRole {
        &self.role
    }

    /// Checks a stored value must pass, in declaration order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Run every constraint against `value`. Null is never constrained.
    pub fn check_constraints(&self, value: &Value) -> Result<(), (&Constraint, String)> {
        if value.is_null() {
            return Ok(());
        }
        for constraint in &self.constraints {
            constraint.check(value).map_err(|reason| (constraint, reason))?;
        }
        Ok(())
    }

    /// Declared type of a field, property or event.
    pub fn type_expr(&self) -> Option<&TypeExpr> {
        match &self.role {
            MemberRole::Field(ty) | MemberRole::Event(ty) => Some(ty),
            MemberRole::Property { ty, .. } => Some(ty),
            MemberRole::Variant | MemberRole::Method(_) => None,
        }
    }

    fn from_document(
        declaration: &str,
        class: TypeClass,
        key: &str,
        body: &serde_yaml::Value,
    ) -> Result<Self, TypingError> {
        let body: MemberBody = if body.is_null() {
            MemberBody::default()
        } else {
            serde_yaml::from_value(body.clone())
                .map_err(|e| TypingError::malformed(declaration, format!("member '{key}': {e}")))?
        };

        let required_type = |body: &MemberBody| -> Result<TypeExpr, TypingError> {
            let ty = body.ty.as_deref().ok_or_else(|| {
                TypingError::malformed(declaration, format!("member '{key}' has no type"))
            })?;
            TypeExpr::parse(ty)
        };

        let (name, role) = match class {
            TypeClass::Struct | TypeClass::Union => (key, MemberRole::Field(required_type(&body)?)),
            TypeClass::Enum => (key, MemberRole::Variant),
            TypeClass::Interface => {
                let (keyword, name) = key.split_once(char::is_whitespace).ok_or_else(|| {
                    TypingError::malformed(
                        declaration,
                        format!("interface member '{key}' must read 'method|property|event <name>'"),
                    )
                })?;
                let role = match keyword {
                    "method" => {
                        let mut args = Vec::with_capacity(body.args.len());
                        for arg in &body.args {
                            args.push(Argument {
                                name: arg.name.clone(),
                                ty: TypeExpr::parse(&arg.ty)?,
                                description: arg.description.clone(),
                            });
                        }
                        let result = match &body.result {
                            Some(ret) => Some(TypeExpr::parse(&ret.ty)?),
                            None => None,
                        };
                        MemberRole::Method(MethodSignature { args, result })
                    }
                    "property" => MemberRole::Property {
                        ty: required_type(&body)?,
                        read_only: body.read_only,
                    },
                    "event" => MemberRole::Event(match body.ty.as_deref() {
                        Some(ty) => TypeExpr::parse(ty)?,
                        None => TypeExpr::named("any"),
                    }),
                    other => {
                        return Err(TypingError::malformed(
                            declaration,
                            format!("unknown interface member kind '{other}'"),
                        ))
                    }
                };
                (name.trim(), role)
            }
            TypeClass::Typedef | TypeClass::Builtin => {
                return Err(TypingError::malformed(
                    declaration,
                    format!("{class} declarations take no members"),
                ))
            }
        };

        let mut constraints = Vec::new();
        if let Some(entries) = &body.constraints {
            if !matches!(role, MemberRole::Field(_) | MemberRole::Property { .. }) {
                return Err(TypingError::malformed(
                    declaration,
                    format!("member '{key}' cannot carry constraints"),
                ));
            }
            for (validator, params) in entries {
                constraints.push(Constraint::from_document(declaration, key, validator, params)?);
            }
        }

        Ok(Self {
            name: name.to_string(),
            description: body.description,
            default: body.default.as_ref().map(value_from_yaml),
            role,
            constraints,
        })
    }
}

/// A named type or interface declaration.
///
/// Declarations are immutable once loaded; a same-kind redefinition
/// replaces the whole declaration in the registry.
#[derive(Debug)]
pub struct TypeDecl {
    name: String,
    class: TypeClass,
    description: Option<String>,
    vars: Vec<String>,
    parent: Option<TypeExpr>,
    target: Option<TypeExpr>,
    members: Vec<Member>,
    namespace: Option<String>,
    origin: Option<String>,
    typing: Weak<Shared>,
}

impl TypeDecl {
    pub(crate) fn builtin(name: &str, vars: &[&str], typing: Weak<Shared>) -> Self {
        Self {
            name: name.to_string(),
            class: TypeClass::Builtin,
            description: None,
            vars: vars.iter().map(|v| (*v).to_string()).collect(),
            parent: None,
            target: None,
            members: Vec::new(),
            namespace: None,
            origin: None,
            typing,
        }
    }

    /// Build a declaration from a schema entry such as `struct Pair<K, V>`.
    pub(crate) fn from_document(
        key: &str,
        body: &serde_yaml::Value,
        namespace: Option<&str>,
        origin: &str,
        typing: Weak<Shared>,
    ) -> Result<Self, TypingError> {
        let (keyword, header) = key
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| TypingError::malformed(key, "expected '<kind> <name>'"))?;
        let class = TypeClass::from_keyword(keyword)
            .ok_or_else(|| TypingError::malformed(key, format!("unknown declaration kind '{keyword}'")))?;
        let header = TypeExpr::parse(header)?;

        let mut vars = Vec::with_capacity(header.args.len());
        for arg in &header.args {
            if !arg.is_bare() || vars.contains(&arg.name) {
                return Err(TypingError::malformed(key, format!("invalid type variable '{arg}'")));
            }
            vars.push(arg.name.clone());
        }

        let body: DeclarationBody = if body.is_null() {
            DeclarationBody::default()
        } else {
            serde_yaml::from_value(body.clone()).map_err(|e| TypingError::malformed(key, e.to_string()))?
        };

        let parent = body.inherits.as_deref().map(TypeExpr::parse).transpose()?;
        if parent.is_some() && class != TypeClass::Struct {
            return Err(TypingError::malformed(key, "only structs may inherit"));
        }

        let target = body.target.as_deref().map(TypeExpr::parse).transpose()?;
        if class == TypeClass::Typedef && target.is_none() {
            return Err(TypingError::malformed(key, "typedef requires a target type"));
        }

        let mut members = Vec::with_capacity(body.members.len());
        let mut seen = HashSet::new();
        for (member_key, member_body) in &body.members {
            let member_key = member_key
                .as_str()
                .ok_or_else(|| TypingError::malformed(key, "member names must be strings"))?;
            let member = Member::from_document(key, class, member_key, member_body)?;
            if !seen.insert(member.name.clone()) {
                return Err(TypingError::malformed(key, format!("duplicate member '{}'", member.name)));
            }
            members.push(member);
        }

        Ok(Self {
            name: qualify(&header.name, namespace),
            class,
            description: body.description,
            vars,
            parent,
            target,
            members,
            namespace: namespace.map(str::to_string),
            origin: Some(origin.to_string()),
            typing,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> TypeClass {
        self.class
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Generic type variables, in declaration order.
    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Parent struct named by `inherits`.
    pub fn parent(&self) -> Option<&TypeExpr> {
        self.parent.as_ref()
    }

    /// Target of a typedef.
    pub fn target(&self) -> Option<&TypeExpr> {
        self.target.as_ref()
    }

    /// Members declared directly on this declaration, in order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Namespace searched first for unqualified references.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Schema unit the declaration came from (`None` for builtins).
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn is_builtin(&self) -> bool {
        self.class == TypeClass::Builtin
    }

    /// Registry owning this declaration, while it is alive.
    pub fn typing(&self) -> Option<Typing> {
        self.typing.upgrade().map(Typing::from_shared)
    }

    /// Every type reference made by this declaration.
    pub(crate) fn references(&self) -> Vec<&TypeExpr> {
        let mut refs: Vec<&TypeExpr> = self.parent.iter().chain(self.target.iter()).collect();
        for member in &self.members {
            match &member.role {
                MemberRole::Method(sig) => {
                    refs.extend(sig.args.iter().map(|a| &a.ty));
                    refs.extend(sig.result.iter());
                }
                _ => refs.extend(member.type_expr()),
            }
        }
        refs
    }
}

fn qualify(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() && !name.contains('.') => format!("{ns}.{name}"),
        _ => name.to_string(),
    }
}
