// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic value types.

use crate::dynamic::{conform_member, FromValue, ValueError};
use crate::typing::{TypeClass, TypeInstance};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Nesting depth past which `Display` stops descending (self-referencing
/// structs would otherwise render forever).
const MAX_RENDER_DEPTH: usize = 32;

/// Shape of a value, without its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int64,
    Uint64,
    Double,
    String,
    Binary,
    Array,
    Dictionary,
    Struct,
    Union,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Double => "double",
            Self::String => "string",
            Self::Binary => "binary",
            Self::Array => "array",
            Self::Dictionary => "dictionary",
            Self::Struct => "struct",
            Self::Union => "union",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member storage of a struct or union value.
///
/// Clones share the same storage: mutating a member through one handle is
/// visible through all of them.
#[derive(Clone)]
pub struct Compound {
    typei: TypeInstance,
    members: Arc<RwLock<HashMap<String, Value>>>,
}

impl Compound {
    pub fn type_instance(&self) -> &TypeInstance {
        &self.typei
    }

    /// True when both handles point at the same storage.
    pub fn ptr_eq(&self, other: &Compound) -> bool {
        Arc::ptr_eq(&self.members, &other.members)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        self.members.read()
    }
}

/// Content of a [`Value`].
#[derive(Clone)]
pub enum Data {
    Null,
    Bool(bool),
    Int64(i64),
    Uint64(u64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Dictionary(HashMap<String, Value>),
    Struct(Compound),
    Union(Compound),
}

/// A dynamically typed value.
///
/// Scalars, arrays and dictionaries behave as plain values. Struct and
/// union values are handles onto shared member storage (see [`Compound`]).
/// Any value may carry a [`TypeInstance`] annotation; struct and union
/// values always do.
#[derive(Clone)]
pub struct Value {
    data: Data,
    typei: Option<TypeInstance>,
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

impl Value {
    pub fn null() -> Self {
        Self::new(Data::Null)
    }

    pub fn new(data: Data) -> Self {
        Self { data, typei: None }
    }

    /// Empty dictionary.
    pub fn dictionary() -> Self {
        Self::new(Data::Dictionary(HashMap::new()))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Data::Binary(bytes.into()))
    }

    /// Array from anything convertible to values.
    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::new(Data::Array(items.into_iter().map(Into::into).collect()))
    }

    /// Dictionary from key/value pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(Data::Dictionary(
            entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }

    pub(crate) fn new_struct(typei: TypeInstance, members: HashMap<String, Value>) -> Self {
        Self::new(Data::Struct(Compound {
            typei,
            members: Arc::new(RwLock::new(members)),
        }))
    }

    pub(crate) fn new_union(typei: TypeInstance, members: HashMap<String, Value>) -> Self {
        Self::new(Data::Union(Compound {
            typei,
            members: Arc::new(RwLock::new(members)),
        }))
    }

    /// Attach a type annotation (ignored for structs and unions, which
    /// carry their own).
    pub fn with_type(mut self, typei: TypeInstance) -> Self {
        if !self.is_compound() {
            self.typei = Some(typei);
        }
        self
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn into_data(self) -> Data {
        self.data
    }

    pub fn kind(&self) -> ValueKind {
        match &self.data {
            Data::Null => ValueKind::Null,
            Data::Bool(_) => ValueKind::Bool,
            Data::Int64(_) => ValueKind::Int64,
            Data::Uint64(_) => ValueKind::Uint64,
            Data::Double(_) => ValueKind::Double,
            Data::String(_) => ValueKind::String,
            Data::Binary(_) => ValueKind::Binary,
            Data::Array(_) => ValueKind::Array,
            Data::Dictionary(_) => ValueKind::Dictionary,
            Data::Struct(_) => ValueKind::Struct,
            Data::Union(_) => ValueKind::Union,
        }
    }

    /// Type annotation, if any.
    pub fn type_instance(&self) -> Option<&TypeInstance> {
        match &self.data {
            Data::Struct(c) | Data::Union(c) => Some(&c.typei),
            _ => self.typei.as_ref(),
        }
    }

    /// Check if value is null.
    pub fn is_null(&self) -> bool {
        matches!(self.data, Data::Null)
    }

    /// True for struct and union values.
    pub fn is_compound(&self) -> bool {
        matches!(self.data, Data::Struct(_) | Data::Union(_))
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self.data {
            Data::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// Try to get as i64 (unsigned values that fit are accepted).
    pub fn as_i64(&self) -> Option<i64> {
        match self.data {
            Data::Int64(v) => Some(v),
            Data::Uint64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Try to get as u64 (non-negative signed values are accepted).
    pub fn as_u64(&self) -> Option<u64> {
        match self.data {
            Data::Uint64(v) => Some(v),
            Data::Int64(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Try to get as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self.data {
            Data::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Any numeric value, widened to f64.
    pub(crate) fn as_number(&self) -> Option<f64> {
        match self.data {
            Data::Int64(v) => Some(v as f64),
            Data::Uint64(v) => Some(v as f64),
            Data::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            Data::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match &self.data {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dictionary(&self) -> Option<&HashMap<String, Value>> {
        match &self.data {
            Data::Dictionary(map) => Some(map),
            _ => None,
        }
    }

    /// Dictionary entry by key.
    pub fn get_key(&self, key: &str) -> Option<&Value> {
        self.as_dictionary().and_then(|map| map.get(key))
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match &self.data {
            Data::Struct(c) | Data::Union(c) => Some(c),
            _ => None,
        }
    }

    fn compound(&self) -> Result<&Compound, ValueError> {
        self.as_compound()
            .ok_or_else(|| ValueError::mismatch("struct or union", self.kind()))
    }

    /// True when both values are struct/union handles onto the same storage.
    pub fn shares_with(&self, other: &Value) -> bool {
        match (self.as_compound(), other.as_compound()) {
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Read a struct or union member.
    ///
    /// Structs and unions are returned as shared handles, everything else
    /// as a copy. Declared members that were never set read as null.
    pub fn get(&self, member: &str) -> Result<Value, ValueError> {
        let compound = self.compound()?;
        if compound.typei.lookup_member(member)?.is_none() {
            return Err(unknown_member(compound, member));
        }
        Ok(compound
            .read()
            .get(member)
            .cloned()
            .unwrap_or_default())
    }

    /// Read a member and convert it to a native type.
    pub fn get_as<T: FromValue>(&self, member: &str) -> Result<T, ValueError> {
        T::from_value(&self.get(member)?)
    }

    /// Validate and store a struct or union member.
    ///
    /// Struct and union values are stored by reference, so later changes
    /// made through `value` are visible through `self`. Setting a union
    /// member makes it the active branch.
    pub fn set(&self, member: &str, value: impl Into<Value>) -> Result<(), ValueError> {
        let compound = self.compound()?;
        let (decl, owner) = compound
            .typei
            .lookup_member(member)?
            .ok_or_else(|| unknown_member(compound, member))?;
        let value = conform_member(&owner, &decl, value.into())?;

        let mut members = compound.members.write();
        if matches!(self.data, Data::Union(_)) {
            members.clear();
        }
        members.insert(member.to_string(), value);
        Ok(())
    }

    /// Members in declaration order, inherited ones first. Unset members
    /// read as null.
    pub fn members(&self) -> Result<Vec<(String, Value)>, ValueError> {
        let compound = self.compound()?;
        let declared = compound.typei.all_members()?;
        let stored = compound.read();
        Ok(declared
            .into_iter()
            .map(|(member, _)| {
                let value = stored.get(member.name()).cloned().unwrap_or_default();
                (member.name().to_string(), value)
            })
            .collect())
    }

    /// Active branch of a union value.
    pub fn branch(&self) -> Option<(String, Value)> {
        match &self.data {
            Data::Union(c) => c.read().iter().next().map(|(k, v)| (k.clone(), v.clone())),
            _ => None,
        }
    }

    /// Stored member, `None` when never set (or cleared).
    pub(crate) fn stored_member(&self, member: &str) -> Option<Value> {
        self.as_compound().and_then(|c| c.read().get(member).cloned())
    }

    /// Clear a stored member. Returns false when it was not set.
    pub(crate) fn clear_member(&self, member: &str) -> bool {
        match self.as_compound() {
            Some(c) => c.members.write().remove(member).is_some(),
            None => false,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if depth > MAX_RENDER_DEPTH {
            return f.write_str("...");
        }
        match &self.data {
            Data::Null => f.write_str("null"),
            Data::Bool(v) => write!(f, "{}", v),
            Data::Int64(v) => write!(f, "{}", v),
            Data::Uint64(v) => write!(f, "{}", v),
            Data::Double(v) => write!(f, "{:?}", v),
            Data::String(s) => match &self.typei {
                Some(t) if t.class() == TypeClass::Enum => write!(f, "{}.{}", t, s),
                _ => write!(f, "{:?}", s),
            },
            Data::Binary(bytes) => {
                f.write_str("<binary ")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                f.write_str(">")
            }
            Data::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.render(f, depth + 1)?;
                }
                f.write_str("]")
            }
            Data::Dictionary(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: ", key)?;
                    map[key].render(f, depth + 1)?;
                }
                f.write_str("}")
            }
            Data::Struct(c) => {
                write!(f, "{} {{", c.typei)?;
                let members = match self.members() {
                    Ok(members) => members,
                    Err(_) => {
                        let mut stored: Vec<(String, Value)> =
                            c.read().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                        stored.sort_by(|a, b| a.0.cmp(&b.0));
                        stored
                    }
                };
                for (i, (name, value)) in members.iter().enumerate() {
                    f.write_str(if i > 0 { ", " } else { " " })?;
                    write!(f, "{}: ", name)?;
                    value.render(f, depth + 1)?;
                }
                f.write_str(" }")
            }
            Data::Union(c) => match self.branch() {
                Some((name, value)) => {
                    write!(f, "{}::{}(", c.typei, name)?;
                    value.render(f, depth + 1)?;
                    f.write_str(")")
                }
                None => write!(f, "{}::<empty>", c.typei),
            },
        }
    }
}

fn unknown_member(compound: &Compound, member: &str) -> ValueError {
    ValueError::UnknownMember {
        type_name: compound.typei.canonical().to_string(),
        member: member.to_string(),
    }
}

/// Renders the current content, so a struct shows mutations made through
/// any of its handles.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

impl PartialEq for Compound {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.typei == other.typei && *self.read() == *other.read()
    }
}

/// Content equality. Type annotations of scalars are ignored; numbers
/// compare by numeric value across `int64`, `uint64` and `double`, so a
/// member read back after coercion equals what was stored.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (Data::Null, Data::Null) => true,
            (Data::Bool(a), Data::Bool(b)) => a == b,
            (Data::Int64(a), Data::Int64(b)) => a == b,
            (Data::Uint64(a), Data::Uint64(b)) => a == b,
            (Data::Int64(a), Data::Uint64(b)) | (Data::Uint64(b), Data::Int64(a)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (Data::Double(a), Data::Double(b)) => a == b,
            (Data::Int64(i), Data::Double(d)) | (Data::Double(d), Data::Int64(i)) => integral_eq(i128::from(*i), *d),
            (Data::Uint64(u), Data::Double(d)) | (Data::Double(d), Data::Uint64(u)) => integral_eq(i128::from(*u), *d),
            (Data::String(a), Data::String(b)) => a == b,
            (Data::Binary(a), Data::Binary(b)) => a == b,
            (Data::Array(a), Data::Array(b)) => a == b,
            (Data::Dictionary(a), Data::Dictionary(b)) => a == b,
            (Data::Struct(a), Data::Struct(b)) | (Data::Union(a), Data::Union(b)) => a == b,
            _ => false,
        }
    }
}

/// True when `d` holds exactly the integer `i`.
fn integral_eq(i: i128, d: f64) -> bool {
    d.is_finite() && d.fract() == 0.0 && d as i128 == i
}

macro_rules! impl_from_native {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::new(Data::$variant(v.into()))
            }
        }
    };
}

impl_from_native!(bool, Bool);
impl_from_native!(i32, Int64);
impl_from_native!(i64, Int64);
impl_from_native!(u32, Uint64);
impl_from_native!(u64, Uint64);
impl_from_native!(f32, Double);
impl_from_native!(f64, Double);
impl_from_native!(String, String);
impl_from_native!(&str, String);

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::new(Data::Uint64(v as u64))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::binary(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::new(Data::Binary(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::new(Data::Array(v))
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::new(Data::Dictionary(v))
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::new(Data::Array(iter.into_iter().collect()))
    }
}

impl FromIterator<(String, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Value::new(Data::Dictionary(iter.into_iter().collect()))
    }
}
