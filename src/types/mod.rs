//! Native type conversions for binding and fetching
//!
//! [`ToBind`] turns a Rust value into a [`BindValue`], [`FromCell`] reads one
//! back out of a fetched [`Cell`]. Every supported scalar has both directions.

use crate::{
    error::Result,
    value::{BindValue, Cell},
};

/// A value that can be bound to a statement parameter
pub trait ToBind {
    /// Convert into the value attached to the parameter
    fn to_bind_value(&self) -> BindValue;
}

/// A value that can be read from a fetched column
///
/// The [`Default`] bound provides the value returned for SQL NULL.
pub trait FromCell: Sized + Default {
    /// Convert a non-NULL cell
    fn from_cell(cell: &Cell) -> Result<Self>;
}

impl<T: ToBind + ?Sized> ToBind for &T {
    fn to_bind_value(&self) -> BindValue {
        (**self).to_bind_value()
    }
}

impl<T: ToBind> ToBind for Option<T> {
    fn to_bind_value(&self) -> BindValue {
        match self {
            Some(value) => value.to_bind_value(),
            None => BindValue::Null,
        }
    }
}

impl ToBind for BindValue {
    fn to_bind_value(&self) -> BindValue {
        self.clone()
    }
}

// Text
impl ToBind for str {
    fn to_bind_value(&self) -> BindValue {
        BindValue::Text(self.to_string())
    }
}

impl ToBind for String {
    fn to_bind_value(&self) -> BindValue {
        BindValue::Text(self.clone())
    }
}

impl FromCell for String {
    fn from_cell(cell: &Cell) -> Result<Self> {
        Ok(cell.read_string())
    }
}

// Boolean
impl ToBind for bool {
    fn to_bind_value(&self) -> BindValue {
        BindValue::Integer(if *self { 1 } else { 0 })
    }
}

impl FromCell for bool {
    fn from_cell(cell: &Cell) -> Result<Self> {
        cell.read_bool()
    }
}

// Signed integers, narrowed the same way a C cast would
macro_rules! signed_conversions {
    ($($ty:ty),*) => {$(
        impl ToBind for $ty {
            fn to_bind_value(&self) -> BindValue {
                BindValue::Integer(*self as i64)
            }
        }

        impl FromCell for $ty {
            fn from_cell(cell: &Cell) -> Result<Self> {
                cell.read_i64().map(|v| v as $ty)
            }
        }
    )*};
}

signed_conversions!(i8, i16, i32, i64);

// Unsigned integers; u64 is stored as its two's complement
macro_rules! unsigned_conversions {
    ($($ty:ty),*) => {$(
        impl ToBind for $ty {
            fn to_bind_value(&self) -> BindValue {
                BindValue::Integer(*self as i64)
            }
        }

        impl FromCell for $ty {
            fn from_cell(cell: &Cell) -> Result<Self> {
                cell.read_u64().map(|v| v as $ty)
            }
        }
    )*};
}

unsigned_conversions!(u8, u16, u32, u64);

// Floating point
impl ToBind for f32 {
    fn to_bind_value(&self) -> BindValue {
        BindValue::Double(*self as f64)
    }
}

impl FromCell for f32 {
    fn from_cell(cell: &Cell) -> Result<Self> {
        cell.read_f64().map(|v| v as f32)
    }
}

impl ToBind for f64 {
    fn to_bind_value(&self) -> BindValue {
        BindValue::Double(*self)
    }
}

impl FromCell for f64 {
    fn from_cell(cell: &Cell) -> Result<Self> {
        cell.read_f64()
    }
}

// Binary
impl ToBind for [u8] {
    fn to_bind_value(&self) -> BindValue {
        BindValue::Binary(self.to_vec())
    }
}

impl ToBind for Vec<u8> {
    fn to_bind_value(&self) -> BindValue {
        BindValue::Binary(self.clone())
    }
}

impl FromCell for Vec<u8> {
    fn from_cell(cell: &Cell) -> Result<Self> {
        Ok(cell.read_blob())
    }
}
