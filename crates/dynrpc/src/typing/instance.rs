// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type instances: a declaration plus its generic specializations.

use crate::typing::{Member, TypeClass, TypeDecl, TypeExpr, Typing, TypingError};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Longest typedef or inheritance chain followed before giving up.
const MAX_CHAIN: usize = 64;

/// A concrete use of a declaration, e.g. `array<string>` or
/// `Pair<string,int64>`.
///
/// Two instances are equal when they name the same declaration with equal
/// specializations. Cloning is cheap.
#[derive(Clone)]
pub struct TypeInstance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    decl: Arc<TypeDecl>,
    specializations: Vec<TypeInstance>,
    canonical: String,
}

impl TypeInstance {
    pub(crate) fn new(decl: Arc<TypeDecl>, specializations: Vec<TypeInstance>) -> Self {
        let canonical = if specializations.is_empty() {
            decl.name().to_string()
        } else {
            let args: Vec<&str> = specializations.iter().map(|s| s.canonical()).collect();
            format!("{}<{}>", decl.name(), args.join(","))
        };
        Self {
            inner: Arc::new(InstanceInner {
                decl,
                specializations,
                canonical,
            }),
        }
    }

    pub fn decl(&self) -> &Arc<TypeDecl> {
        &self.inner.decl
    }

    /// Declaration name, without specializations.
    pub fn name(&self) -> &str {
        self.inner.decl.name()
    }

    pub fn class(&self) -> TypeClass {
        self.inner.decl.class()
    }

    /// Canonical textual name, e.g. `Pair<string,int64>`.
    pub fn canonical(&self) -> &str {
        &self.inner.canonical
    }

    pub fn specializations(&self) -> &[TypeInstance] {
        &self.inner.specializations
    }

    /// Binding of a generic variable of the declaration.
    pub fn variable(&self, var: &str) -> Option<&TypeInstance> {
        let index = self.decl().vars().iter().position(|v| v == var)?;
        self.inner.specializations.get(index)
    }

    /// True for the builtin of that name (`"array"`, `"any"`, ...).
    pub fn is_builtin(&self, name: &str) -> bool {
        self.decl().is_builtin() && self.name() == name
    }

    fn typing(&self) -> Result<Typing, TypingError> {
        self.decl()
            .typing()
            .ok_or_else(|| TypingError::NotFound(self.canonical().to_string()))
    }

    /// Resolve a reference made from inside this instance: generic
    /// variables bind to this instance's specializations, unqualified names
    /// search the declaration's namespace first.
    pub fn resolve(&self, expr: &TypeExpr) -> Result<TypeInstance, TypingError> {
        self.typing()?
            .instantiate_expr(expr, Some(self), self.decl().namespace())
    }

    /// Parent struct instance (`inherits`).
    pub fn parent(&self) -> Result<Option<TypeInstance>, TypingError> {
        self.decl().parent().map(|p| self.resolve(p)).transpose()
    }

    /// Follow typedefs down to the first non-typedef instance.
    pub fn unwind(&self) -> Result<TypeInstance, TypingError> {
        let mut current = self.clone();
        for _ in 0..MAX_CHAIN {
            if current.class() != TypeClass::Typedef {
                return Ok(current);
            }
            let target = current
                .decl()
                .target()
                .cloned()
                .ok_or_else(|| TypingError::malformed(current.canonical(), "typedef without target"))?;
            current = current.resolve(&target)?;
        }
        Err(TypingError::malformed(self.canonical(), "typedef chain too long"))
    }

    /// Find a member on this declaration or its ancestors. Returns the
    /// member together with the instance that declares it, which is the
    /// scope its type must be resolved in.
    pub fn lookup_member(&self, name: &str) -> Result<Option<(Member, TypeInstance)>, TypingError> {
        let mut current = Some(self.clone());
        let mut depth = 0;
        while let Some(inst) = current {
            if let Some(member) = inst.decl().member(name) {
                return Ok(Some((member.clone(), inst.clone())));
            }
            depth += 1;
            if depth > MAX_CHAIN {
                return Err(TypingError::malformed(self.canonical(), "inheritance chain too long"));
            }
            current = inst.parent()?;
        }
        Ok(None)
    }

    /// All members, inherited ones first, each with its declaring instance.
    pub fn all_members(&self) -> Result<Vec<(Member, TypeInstance)>, TypingError> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain[chain.len() - 1].parent()? {
            if chain.len() > MAX_CHAIN {
                return Err(TypingError::malformed(self.canonical(), "inheritance chain too long"));
            }
            chain.push(parent);
        }

        let mut members: Vec<(Member, TypeInstance)> = Vec::new();
        for inst in chain.iter().rev() {
            for member in inst.decl().members() {
                match members.iter_mut().find(|(m, _)| m.name() == member.name()) {
                    Some(slot) => *slot = (member.clone(), inst.clone()),
                    None => members.push((member.clone(), inst.clone())),
                }
            }
        }
        Ok(members)
    }

    /// Type of a field, property or event declared on this instance.
    /// Members without a type (variants, methods) are `any`.
    pub fn member_type(&self, member: &Member) -> Result<TypeInstance, TypingError> {
        match member.type_expr() {
            Some(expr) => self.resolve(expr),
            None => self.typing()?.any(),
        }
    }

    /// True when a value of type `other` may be stored where `self` is
    /// expected: the same instance, or a descendant through `inherits`.
    pub fn is_assignable_from(&self, other: &TypeInstance) -> bool {
        let mut current = Some(other.clone());
        for _ in 0..=MAX_CHAIN {
            match current {
                Some(inst) if inst == *self => return true,
                Some(inst) => current = inst.parent().ok().flatten(),
                None => return false,
            }
        }
        false
    }
}

impl PartialEq for TypeInstance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.canonical == other.inner.canonical
    }
}

impl Eq for TypeInstance {}

impl Hash for TypeInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.canonical.hash(state);
    }
}

impl fmt::Display for TypeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

impl fmt::Debug for TypeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeInstance({})", self.canonical())
    }
}
