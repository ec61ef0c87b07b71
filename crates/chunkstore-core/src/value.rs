//! Dynamic value type used at the insert/update boundary.
//!
//! Typed readers/writers work against concrete Rust types (`i64`, `f64`,
//! ...); the untyped insert path (`Collection::insert`, commit-buffer
//! replay) dispatches on this enum instead. Integer widths narrower than a
//! column's native width are range-checked rather than silently truncated,
//! per the open question in spec.md §9.

use crate::error::{Error, Result};

/// A dynamically typed value accepted at the insert/update boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer (all signed/unsigned integer columns narrow into this).
    I64(i64),
    /// 64-bit unsigned integer.
    U64(u64),
    /// 64-bit float (32-bit float columns narrow into this).
    F64(f64),
    /// UTF-8 string.
    Str(String),
    /// Interned enum variant, by name.
    Enum(String),
    /// Boolean.
    Bool(bool),
    /// Opaque binary payload for `Record` columns.
    Bytes(Vec<u8>),
    /// Absence of a value (clears presence on apply).
    Null,
}

impl Value {
    /// Returns a short type name, used in `TypeMismatch` errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F64(_) => "f64",
            Self::Str(_) => "string",
            Self::Enum(_) => "enum",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Null => "null",
        }
    }

    /// Narrows to `i64`, failing on values that would not round-trip.
    ///
    /// # Errors
    /// Returns [`Error::TypeMismatch`]-shaped [`Error::InvalidArgument`] if
    /// the value is not an integer or does not fit.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Self::I64(v) => Ok(*v),
            Self::U64(v) => i64::try_from(*v)
                .map_err(|_| Error::InvalidArgument(format!("u64 {v} overflows i64"))),
            other => Err(Error::InvalidArgument(format!(
                "expected integer, found {}",
                other.type_name()
            ))),
        }
    }

    /// Narrows to `u64`, failing on negative values.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the value is not an integer or
    /// is negative.
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Self::U64(v) => Ok(*v),
            Self::I64(v) => u64::try_from(*v)
                .map_err(|_| Error::InvalidArgument(format!("i64 {v} is negative"))),
            other => Err(Error::InvalidArgument(format!(
                "expected unsigned integer, found {}",
                other.type_name()
            ))),
        }
    }

    /// Narrows to `f64`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the value is not numeric.
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Self::F64(v) => Ok(*v),
            Self::I64(v) => Ok(*v as f64),
            Self::U64(v) => Ok(*v as f64),
            other => Err(Error::InvalidArgument(format!(
                "expected float, found {}",
                other.type_name()
            ))),
        }
    }

    /// Narrows to `bool`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the value is not boolean.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(v) => Ok(*v),
            other => Err(Error::InvalidArgument(format!(
                "expected bool, found {}",
                other.type_name()
            ))),
        }
    }

    /// Narrows to `&str`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the value is not a string.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::Str(v) | Self::Enum(v) => Ok(v.as_str()),
            other => Err(Error::InvalidArgument(format!(
                "expected string, found {}",
                other.type_name()
            ))),
        }
    }

    /// Narrows to `&[u8]`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the value is not bytes.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Self::Bytes(v) => Ok(v.as_slice()),
            other => Err(Error::InvalidArgument(format!(
                "expected bytes, found {}",
                other.type_name()
            ))),
        }
    }

    /// True for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts to a [`serde_json::Value`], for row export and debugging
    /// tools. `Bytes` is base64-free here; it becomes a JSON array of byte
    /// numbers since there is no standard scalar JSON encoding for it.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::I64(v) => serde_json::json!(v),
            Self::U64(v) => serde_json::json!(v),
            Self::F64(v) => serde_json::json!(v),
            Self::Str(v) | Self::Enum(v) => serde_json::json!(v),
            Self::Bool(v) => serde_json::json!(v),
            Self::Bytes(v) => serde_json::json!(v),
            Self::Null => serde_json::Value::Null,
        }
    }

    /// Converts a JSON scalar into a `Value`. JSON objects and arrays (other
    /// than a byte array produced by [`Self::to_json`]) have no
    /// corresponding column type and are rejected.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `json` is an object, or an
    /// array that does not consist entirely of small integers.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(v) => Ok(Self::Bool(*v)),
            serde_json::Value::String(v) => Ok(Self::Str(v.clone())),
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(Self::I64(v))
                } else if let Some(v) = n.as_u64() {
                    Ok(Self::U64(v))
                } else if let Some(v) = n.as_f64() {
                    Ok(Self::F64(v))
                } else {
                    Err(Error::InvalidArgument(format!("unrepresentable JSON number {n}")))
                }
            }
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|v| u8::try_from(v).ok())
                        .ok_or_else(|| {
                            Error::InvalidArgument(
                                "JSON array must be a list of bytes (0-255) to convert to Value"
                                    .into(),
                            )
                        })
                })
                .collect::<Result<Vec<u8>>>()
                .map(Self::Bytes),
            serde_json::Value::Object(_) => Err(Error::InvalidArgument(
                "JSON objects have no corresponding column value".into(),
            )),
        }
    }
}

macro_rules! from_impl {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v.into())
            }
        }
    };
}

from_impl!(i64, I64);
from_impl!(i32, I64);
from_impl!(i16, I64);
from_impl!(u64, U64);
from_impl!(u32, U64);
from_impl!(u16, U64);
from_impl!(f64, F64);
from_impl!(bool, Bool);
from_impl!(String, Str);
from_impl!(Vec<u8>, Bytes);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::F64(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrows_unsigned_to_signed_when_it_fits() {
        let v = Value::U64(42);
        assert_eq!(v.as_i64().unwrap(), 42);
    }

    #[test]
    fn rejects_unsigned_overflowing_signed() {
        let v = Value::U64(u64::MAX);
        assert!(v.as_i64().is_err());
    }

    #[test]
    fn rejects_negative_as_unsigned() {
        let v = Value::I64(-1);
        assert!(v.as_u64().is_err());
    }

    #[test]
    fn type_mismatch_surfaces_found_type() {
        let v = Value::Bool(true);
        let err = v.as_i64().unwrap_err();
        assert!(err.to_string().contains("bool"));
    }

    #[test]
    fn json_round_trips_scalars() {
        for v in [Value::I64(-7), Value::F64(1.5), Value::Bool(true), Value::Str("hi".into())] {
            assert_eq!(Value::from_json(&v.to_json()).unwrap(), v);
        }
    }

    #[test]
    fn json_object_is_rejected() {
        let json = serde_json::json!({"a": 1});
        assert!(Value::from_json(&json).is_err());
    }

    #[test]
    fn byte_array_round_trips_through_json() {
        let v = Value::Bytes(vec![1, 2, 3]);
        let json = v.to_json();
        assert_eq!(Value::from_json(&json).unwrap(), v);
    }
}
