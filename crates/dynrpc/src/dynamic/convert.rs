// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conversions from [`Value`] to native types.

use crate::dynamic::{Value, ValueError};
use std::collections::HashMap;

/// Trait for converting from a dynamic value.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueError>;
}

// Implement FromValue for primitives
macro_rules! impl_from_value {
    ($ty:ty, $accessor:ident, $name:expr) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, ValueError> {
                value
                    .$accessor()
                    .ok_or_else(|| ValueError::mismatch($name, value.kind()))
            }
        }
    };
}

impl_from_value!(bool, as_bool, "bool");
impl_from_value!(i64, as_i64, "int64");
impl_from_value!(u64, as_u64, "uint64");
impl_from_value!(f64, as_f64, "double");

macro_rules! impl_from_value_narrow {
    ($ty:ty, $wide:ty, $name:expr) => {
        impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self, ValueError> {
                let wide = <$wide>::from_value(value)?;
                <$ty>::try_from(wide).map_err(|_| ValueError::mismatch($name, wide))
            }
        }
    };
}

impl_from_value_narrow!(i32, i64, "int32");
impl_from_value_narrow!(u32, u64, "uint32");
impl_from_value_narrow!(usize, u64, "usize");

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ValueError::mismatch("string", value.kind()))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ValueError::mismatch("binary", value.kind()))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let items = value
            .as_array()
            .ok_or_else(|| ValueError::mismatch("array", value.kind()))?;
        items.iter().map(T::from_value).collect()
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, ValueError> {
        let map = value
            .as_dictionary()
            .ok_or_else(|| ValueError::mismatch("dictionary", value.kind()))?;
        map.iter()
            .map(|(k, v)| T::from_value(v).map(|v| (k.clone(), v)))
            .collect()
    }
}
