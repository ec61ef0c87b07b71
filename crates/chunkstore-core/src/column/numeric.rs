//! Numeric columns: the eight integer/float widths of spec.md §6, sharing
//! one generic implementation over a small sealed primitive trait.

use roaring::RoaringBitmap;

use super::chunk::ChunkedStorage;
use super::{ColumnKind, ColumnOps, Predicate};
use crate::commit::{CommitBuffer, Op};
use crate::error::{Error, Result};
use crate::handle::RowHandle;
use crate::value::Value;

/// A column's merge function: combines an existing value with an
/// incoming `Merge` op's payload. Defaults to addition.
pub type MergeFn<T> = fn(T, T) -> T;

/// Discriminates the eight numeric storage widths; exposed so callers can
/// pick a factory without naming the private sealed trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Int16,
    Int32,
    Int64,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

/// Sealed trait implemented for the eight Rust types backing numeric
/// columns. Not implementable outside this module.
pub trait Numeric: Copy + PartialOrd + Send + Sync + std::fmt::Debug + 'static {
    /// Factory tag this Rust type corresponds to.
    const KIND: ColumnKind;

    /// Additive identity, used as the default payload for `Grow` and as
    /// the starting accumulator for `Sum`.
    fn zero() -> Self;

    /// Default merge behavior: addition.
    fn add(self, other: Self) -> Self;

    /// Narrows a dynamic [`Value`] into this storage type.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `value` is not numeric or does
    /// not fit this width.
    fn from_value(value: &Value) -> Result<Self>;

    /// Widens this storage type back into a dynamic [`Value`].
    fn to_value(self) -> Value;

    /// Widens to `f64`, used by `Avg`.
    fn to_f64(self) -> f64;

    /// Evaluates a typed predicate against this value. A predicate variant
    /// that does not match this type's predicate family returns `false`.
    fn matches(self, pred: &Predicate<'_>) -> bool;
}

macro_rules! impl_numeric_signed {
    ($ty:ty, $kind:expr) => {
        impl Numeric for $ty {
            const KIND: ColumnKind = $kind;

            fn zero() -> Self {
                0
            }

            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            fn from_value(value: &Value) -> Result<Self> {
                let v = value.as_i64()?;
                <$ty>::try_from(v)
                    .map_err(|_| Error::InvalidArgument(format!("{v} overflows {}", stringify!($ty))))
            }

            fn to_value(self) -> Value {
                Value::I64(i64::from(self))
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn matches(self, pred: &Predicate<'_>) -> bool {
                match pred {
                    Predicate::I64(f) => f(i64::from(self)),
                    _ => false,
                }
            }
        }
    };
}

macro_rules! impl_numeric_unsigned {
    ($ty:ty, $kind:expr) => {
        impl Numeric for $ty {
            const KIND: ColumnKind = $kind;

            fn zero() -> Self {
                0
            }

            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            fn from_value(value: &Value) -> Result<Self> {
                let v = value.as_u64()?;
                <$ty>::try_from(v)
                    .map_err(|_| Error::InvalidArgument(format!("{v} overflows {}", stringify!($ty))))
            }

            fn to_value(self) -> Value {
                Value::U64(u64::from(self))
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn matches(self, pred: &Predicate<'_>) -> bool {
                match pred {
                    Predicate::U64(f) => f(u64::from(self)),
                    _ => false,
                }
            }
        }
    };
}

impl_numeric_signed!(i16, ColumnKind::Int16);
impl_numeric_signed!(i32, ColumnKind::Int32);
impl_numeric_signed!(i64, ColumnKind::Int64);
impl_numeric_unsigned!(u16, ColumnKind::Uint16);
impl_numeric_unsigned!(u32, ColumnKind::Uint32);
impl_numeric_unsigned!(u64, ColumnKind::Uint64);

impl Numeric for f32 {
    const KIND: ColumnKind = ColumnKind::Float32;

    fn zero() -> Self {
        0.0
    }

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.as_f64()? as f32)
    }

    fn to_value(self) -> Value {
        Value::F64(f64::from(self))
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn matches(self, pred: &Predicate<'_>) -> bool {
        match pred {
            Predicate::F64(f) => f(f64::from(self)),
            _ => false,
        }
    }
}

impl Numeric for f64 {
    const KIND: ColumnKind = ColumnKind::Float64;

    fn zero() -> Self {
        0.0
    }

    fn add(self, other: Self) -> Self {
        self + other
    }

    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64()
    }

    fn to_value(self) -> Value {
        Value::F64(self)
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn matches(self, pred: &Predicate<'_>) -> bool {
        match pred {
            Predicate::F64(f) => f(self),
            _ => false,
        }
    }
}

fn default_merge<T: Numeric>(a: T, b: T) -> T {
    a.add(b)
}

/// A chunked column over one of the eight numeric widths.
#[derive(Debug)]
pub struct NumericColumn<T: Numeric> {
    storage: ChunkedStorage<T>,
    merge: MergeFn<T>,
}

impl<T: Numeric> Default for NumericColumn<T> {
    fn default() -> Self {
        Self {
            storage: ChunkedStorage::new(),
            merge: default_merge,
        }
    }
}

impl<T: Numeric> NumericColumn<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a column with a caller-supplied merge function, replacing
    /// the additive default (spec.md §4.2).
    #[must_use]
    pub fn with_merge(merge: MergeFn<T>) -> Self {
        Self {
            storage: ChunkedStorage::new(),
            merge,
        }
    }

    /// Reads the value at `handle`.
    #[must_use]
    pub fn get(&self, handle: RowHandle) -> Option<T> {
        self.storage.get(handle).copied()
    }

    /// Sum of every present value restricted by `mask`.
    #[must_use]
    pub fn sum(&self, mask: &RoaringBitmap) -> T {
        let presence = self.storage.presence() & mask;
        presence
            .iter()
            .filter_map(|h| self.storage.get(RowHandle(h)).copied())
            .fold(T::zero(), T::add)
    }

    /// Mean of every present value restricted by `mask`; `0.0` if none.
    #[must_use]
    pub fn avg(&self, mask: &RoaringBitmap) -> f64 {
        let presence = self.storage.presence() & mask;
        let count = presence.len();
        if count == 0 {
            return 0.0;
        }
        let total: f64 = presence
            .iter()
            .filter_map(|h| self.storage.get(RowHandle(h)).map(|v| v.to_f64()))
            .sum();
        total / count as f64
    }

    /// Minimum present value restricted by `mask`.
    #[must_use]
    pub fn min(&self, mask: &RoaringBitmap) -> Option<T> {
        let presence = self.storage.presence() & mask;
        presence
            .iter()
            .filter_map(|h| self.storage.get(RowHandle(h)).copied())
            .fold(None, |acc, v| match acc {
                None => Some(v),
                Some(cur) if v < cur => Some(v),
                acc => acc,
            })
    }

    /// Maximum present value restricted by `mask`.
    #[must_use]
    pub fn max(&self, mask: &RoaringBitmap) -> Option<T> {
        let presence = self.storage.presence() & mask;
        presence
            .iter()
            .filter_map(|h| self.storage.get(RowHandle(h)).copied())
            .fold(None, |acc, v| match acc {
                None => Some(v),
                Some(cur) if v > cur => Some(v),
                acc => acc,
            })
    }
}

impl<T: Numeric> ColumnOps for NumericColumn<T> {
    fn kind(&self) -> ColumnKind {
        T::KIND
    }

    fn grow(&mut self, handle: RowHandle) {
        if !self.storage.contains(handle) {
            self.storage.set(handle, T::zero());
        }
    }

    fn contains(&self, handle: RowHandle) -> bool {
        self.storage.contains(handle)
    }

    fn value(&self, handle: RowHandle) -> (Option<Value>, bool) {
        let present = self.storage.contains(handle);
        (self.storage.get(handle).map(|v| v.to_value()), present)
    }

    fn index(&self) -> &RoaringBitmap {
        self.storage.presence()
    }

    fn filter(&self, mask: &RoaringBitmap, pred: &Predicate<'_>) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        for h in mask & self.storage.presence() {
            if let Some(v) = self.storage.get(RowHandle(h)) {
                if v.matches(pred) {
                    out.insert(h);
                }
            }
        }
        out
    }

    fn apply(&mut self, _chunk: u32, ops: &[(RowHandle, Op)]) -> Result<()> {
        for (handle, op) in ops {
            match op {
                Op::Insert(v) | Op::Put(v) => {
                    self.storage.set(*handle, T::from_value(v)?);
                }
                Op::Delete => {
                    self.storage.clear(*handle);
                }
                Op::Merge(v) => {
                    let delta = T::from_value(v)?;
                    let current = self.storage.get(*handle).copied().unwrap_or_else(T::zero);
                    self.storage.set(*handle, (self.merge)(current, delta));
                }
                Op::PutBitmap(_) => {}
            }
        }
        Ok(())
    }

    fn snapshot(&self, chunk: u32, buffer: &mut CommitBuffer) {
        for (handle, v) in self.storage.iter_chunk(chunk) {
            buffer.push(handle, Op::Put(v.to_value()));
        }
    }

    fn delete(&mut self, chunk: u32, mask: &RoaringBitmap) {
        self.storage.delete_mask(chunk, mask);
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_all(n: u32) -> RoaringBitmap {
        (0..n).collect()
    }

    #[test]
    fn sum_avg_min_max_over_int64() {
        let mut col: NumericColumn<i64> = NumericColumn::new();
        for (h, v) in [(0, 10), (1, 20), (2, 30)] {
            col.apply(0, &[(RowHandle(h), Op::Put(Value::I64(v)))]).unwrap();
        }

        let mask = mask_all(3);
        assert_eq!(col.sum(&mask), 60);
        assert!((col.avg(&mask) - 20.0).abs() < f64::EPSILON);
        assert_eq!(col.min(&mask), Some(10));
        assert_eq!(col.max(&mask), Some(30));
    }

    #[test]
    fn merge_defaults_to_addition() {
        let mut col: NumericColumn<i64> = NumericColumn::new();
        col.apply(0, &[(RowHandle(0), Op::Put(Value::I64(5)))]).unwrap();
        col.apply(0, &[(RowHandle(0), Op::Merge(Value::I64(3)))]).unwrap();
        assert_eq!(col.get(RowHandle(0)), Some(8));
    }

    #[test]
    fn custom_merge_function_is_honored() {
        let mut col: NumericColumn<i64> = NumericColumn::with_merge(|a, b| a.max(b));
        col.apply(0, &[(RowHandle(0), Op::Put(Value::I64(5)))]).unwrap();
        col.apply(0, &[(RowHandle(0), Op::Merge(Value::I64(3)))]).unwrap();
        assert_eq!(col.get(RowHandle(0)), Some(5));
    }

    #[test]
    fn narrow_width_rejects_overflow() {
        let mut col: NumericColumn<i16> = NumericColumn::new();
        let result = col.apply(0, &[(RowHandle(0), Op::Put(Value::I64(100_000)))]);
        assert!(result.is_err());
    }

    #[test]
    fn filter_matches_only_the_right_predicate_family() {
        let mut col: NumericColumn<i64> = NumericColumn::new();
        col.apply(0, &[(RowHandle(0), Op::Put(Value::I64(25)))]).unwrap();
        col.apply(0, &[(RowHandle(1), Op::Put(Value::I64(5)))]).unwrap();

        let mask = mask_all(2);
        let gt_ten = Predicate::I64(&|v| v > 10);
        let filtered = col.filter(&mask, &gt_ten);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains(0));

        let wrong_family = Predicate::F64(&|v| v > 0.0);
        assert!(col.filter(&mask, &wrong_family).is_empty());
    }
}
