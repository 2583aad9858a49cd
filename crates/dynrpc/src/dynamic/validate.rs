// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Checking values against type instances.

use crate::dynamic::{Data, Value, ValueError};
use crate::typing::{Member, TypeClass, TypeInstance};

/// Check `value` against a member declared on `owner`: the member type
/// first, then the member's constraints.
pub(crate) fn conform_member(
    owner: &TypeInstance,
    member: &Member,
    value: Value,
) -> Result<Value, ValueError> {
    let value = conform(&owner.member_type(member)?, value)?;
    member
        .check_constraints(&value)
        .map_err(|(constraint, reason)| ValueError::ConstraintViolation {
            member: member.name().to_string(),
            constraint: constraint.to_string(),
            reason,
        })?;
    Ok(value)
}

/// Check `value` against `expected` and return the value to store.
///
/// Integers are converted where the target allows it (`uint64` into
/// `int64` and back when in range, any integer into `double`), enum
/// strings get the enum annotation, array and dictionary elements are
/// checked one by one. Struct and union values are returned as the same
/// shared handle. Null is accepted everywhere.
pub(crate) fn conform(expected: &TypeInstance, value: Value) -> Result<Value, ValueError> {
    if value.is_null() {
        return Ok(value);
    }

    let expected = expected.unwind()?;
    match expected.class() {
        TypeClass::Builtin => conform_builtin(&expected, value),
        TypeClass::Struct | TypeClass::Union => {
            let compound = match (expected.class(), value.data()) {
                (TypeClass::Struct, Data::Struct(c)) | (TypeClass::Union, Data::Union(c)) => c,
                _ => return Err(ValueError::mismatch(expected.canonical(), value.kind())),
            };
            if expected.is_assignable_from(compound.type_instance()) {
                Ok(value)
            } else {
                Err(ValueError::mismatch(
                    expected.canonical(),
                    compound.type_instance().canonical(),
                ))
            }
        }
        TypeClass::Enum => match value.as_str() {
            Some(variant) if expected.decl().member(variant).is_some() => Ok(value.with_type(expected)),
            Some(variant) => Err(ValueError::UnknownMember {
                type_name: expected.canonical().to_string(),
                member: variant.to_string(),
            }),
            None => Err(ValueError::mismatch(expected.canonical(), value.kind())),
        },
        TypeClass::Interface | TypeClass::Typedef => {
            Err(ValueError::mismatch(expected.canonical(), value.kind()))
        }
    }
}

fn conform_builtin(expected: &TypeInstance, value: Value) -> Result<Value, ValueError> {
    let mismatch = || ValueError::mismatch(expected.canonical(), value.kind());
    let converted = match (expected.name(), value.data()) {
        ("any", _) => None,
        ("bool", Data::Bool(_))
        | ("int64", Data::Int64(_))
        | ("uint64", Data::Uint64(_))
        | ("double", Data::Double(_))
        | ("string", Data::String(_))
        | ("binary", Data::Binary(_)) => None,
        ("int64", Data::Uint64(v)) => Some(Value::from(i64::try_from(*v).map_err(|_| mismatch())?)),
        ("uint64", Data::Int64(v)) => Some(Value::from(u64::try_from(*v).map_err(|_| mismatch())?)),
        ("double", Data::Int64(v)) => Some(Value::from(*v as f64)),
        ("double", Data::Uint64(v)) => Some(Value::from(*v as f64)),
        ("array", Data::Array(items)) => match element_type(expected) {
            Some(elem) => Some(Value::from(
                items
                    .iter()
                    .map(|item| conform(elem, item.clone()))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            None => None,
        },
        ("dictionary", Data::Dictionary(map)) => match element_type(expected) {
            Some(elem) => Some(Value::from(
                map.iter()
                    .map(|(k, v)| conform(elem, v.clone()).map(|v| (k.clone(), v)))
                    .collect::<Result<std::collections::HashMap<_, _>, _>>()?,
            )),
            None => None,
        },
        _ => return Err(mismatch()),
    };
    Ok(converted.unwrap_or(value))
}

/// Element type of `array<T>` / `dictionary<T>`, `None` when it is `any`.
fn element_type(container: &TypeInstance) -> Option<&TypeInstance> {
    container
        .specializations()
        .first()
        .filter(|elem| !elem.is_builtin("any"))
}
