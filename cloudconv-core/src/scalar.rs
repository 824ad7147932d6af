//! Typed scalar arrays
//!
//! Every attribute of a point cloud (coordinates, colors, intensities) is held
//! as one homogeneous array whose element type is fixed for the lifetime of
//! the array. Changing the type always produces a new array; values of
//! different types are never mixed inside one array.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Numeric element type of a [`ScalarArray`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    #[serde(rename = "int8")]
    I8,
    #[serde(rename = "uint8")]
    U8,
    #[serde(rename = "int16")]
    I16,
    #[serde(rename = "uint16")]
    U16,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "uint32")]
    U32,
    #[serde(rename = "int64")]
    I64,
    #[serde(rename = "uint64")]
    U64,
    #[serde(rename = "float32")]
    F32,
    #[serde(rename = "float64")]
    F64,
}

impl ScalarType {
    /// All supported scalar types, narrowest integers first
    pub const ALL: [ScalarType; 10] = [
        ScalarType::I8,
        ScalarType::U8,
        ScalarType::I16,
        ScalarType::U16,
        ScalarType::I32,
        ScalarType::U32,
        ScalarType::I64,
        ScalarType::U64,
        ScalarType::F32,
        ScalarType::F64,
    ];

    /// Whether this is a floating point type
    pub fn is_float(self) -> bool {
        matches!(self, ScalarType::F32 | ScalarType::F64)
    }

    /// Whether this is an integer type
    pub fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Whether this type can represent negative values
    pub fn is_signed(self) -> bool {
        !matches!(
            self,
            ScalarType::U8 | ScalarType::U16 | ScalarType::U32 | ScalarType::U64
        )
    }

    /// Size of one element in bytes
    pub fn size_bytes(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
        }
    }

    /// Largest finite value of the type
    pub fn max_value(self) -> f64 {
        match self {
            ScalarType::I8 => i8::MAX as f64,
            ScalarType::U8 => u8::MAX as f64,
            ScalarType::I16 => i16::MAX as f64,
            ScalarType::U16 => u16::MAX as f64,
            ScalarType::I32 => i32::MAX as f64,
            ScalarType::U32 => u32::MAX as f64,
            ScalarType::I64 => i64::MAX as f64,
            ScalarType::U64 => u64::MAX as f64,
            ScalarType::F32 => f32::MAX as f64,
            ScalarType::F64 => f64::MAX,
        }
    }

    /// Smallest finite value of the type
    pub fn min_value(self) -> f64 {
        match self {
            ScalarType::I8 => i8::MIN as f64,
            ScalarType::I16 => i16::MIN as f64,
            ScalarType::I32 => i32::MIN as f64,
            ScalarType::I64 => i64::MIN as f64,
            ScalarType::U8 | ScalarType::U16 | ScalarType::U32 | ScalarType::U64 => 0.0,
            ScalarType::F32 => f32::MIN as f64,
            ScalarType::F64 => f64::MIN,
        }
    }

    /// Number of values at or below `max_value` that start at zero (`max + 1`).
    ///
    /// Only meaningful for integer types.
    pub fn cardinality(self) -> f64 {
        self.max_value() + 1.0
    }

    /// Canonical lowercase name, e.g. `uint8` or `float32`
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::I8 => "int8",
            ScalarType::U8 => "uint8",
            ScalarType::I16 => "int16",
            ScalarType::U16 => "uint16",
            ScalarType::I32 => "int32",
            ScalarType::U32 => "uint32",
            ScalarType::I64 => "int64",
            ScalarType::U64 => "uint64",
            ScalarType::F32 => "float32",
            ScalarType::F64 => "float64",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScalarType {
    type Err = Error;

    /// Parse a dtype name. Accepts canonical names, Rust primitive names and
    /// the PLY spellings (`uchar`, `short`, `double`, ...).
    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        let ty = match lowered.as_str() {
            "int8" | "i8" | "char" => ScalarType::I8,
            "uint8" | "u8" | "uchar" => ScalarType::U8,
            "int16" | "i16" | "short" => ScalarType::I16,
            "uint16" | "u16" | "ushort" => ScalarType::U16,
            "int32" | "i32" | "int" => ScalarType::I32,
            "uint32" | "u32" | "uint" => ScalarType::U32,
            "int64" | "i64" => ScalarType::I64,
            "uint64" | "u64" => ScalarType::U64,
            "float32" | "f32" | "float" => ScalarType::F32,
            "float64" | "f64" | "double" => ScalarType::F64,
            _ => return Err(Error::UnsupportedType(s.to_string())),
        };
        Ok(ty)
    }
}

/// A primitive numeric type that can back a [`ScalarArray`]
pub trait Scalar: Copy + Default + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The runtime tag of this type
    const TYPE: ScalarType;

    /// Widen to f64
    fn to_f64(self) -> f64;

    /// Narrow from f64. Integer targets truncate toward zero and saturate at
    /// the type bounds; NaN becomes zero.
    fn from_f64(value: f64) -> Self;

    /// Wrap a vector of this type into an array
    fn into_array(values: Vec<Self>) -> ScalarArray;

    /// Borrow the array contents if it holds this type
    fn slice(array: &ScalarArray) -> Option<&[Self]>;

    /// Wrap a single value
    fn into_value(self) -> ScalarValue;
}

/// A homogeneous array of one scalar type
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// A single typed scalar
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

macro_rules! impl_scalar {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl Scalar for $t {
                const TYPE: ScalarType = ScalarType::$variant;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                #[inline]
                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn into_array(values: Vec<Self>) -> ScalarArray {
                    ScalarArray::$variant(values)
                }

                fn slice(array: &ScalarArray) -> Option<&[Self]> {
                    match array {
                        ScalarArray::$variant(values) => Some(values.as_slice()),
                        _ => None,
                    }
                }

                fn into_value(self) -> ScalarValue {
                    ScalarValue::$variant(self)
                }
            }

            impl From<Vec<$t>> for ScalarArray {
                fn from(values: Vec<$t>) -> Self {
                    ScalarArray::$variant(values)
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// Run `$body` with `$values` bound to the typed vector inside a [`ScalarArray`]
macro_rules! dispatch {
    ($array:expr, $values:ident => $body:expr) => {
        match $array {
            ScalarArray::I8($values) => $body,
            ScalarArray::U8($values) => $body,
            ScalarArray::I16($values) => $body,
            ScalarArray::U16($values) => $body,
            ScalarArray::I32($values) => $body,
            ScalarArray::U32($values) => $body,
            ScalarArray::I64($values) => $body,
            ScalarArray::U64($values) => $body,
            ScalarArray::F32($values) => $body,
            ScalarArray::F64($values) => $body,
        }
    };
}

/// Run `$body` with the type alias `$T` bound to the primitive for a [`ScalarType`]
macro_rules! with_scalar_type {
    ($ty:expr, $T:ident => $body:expr) => {
        match $ty {
            ScalarType::I8 => {
                type $T = i8;
                $body
            }
            ScalarType::U8 => {
                type $T = u8;
                $body
            }
            ScalarType::I16 => {
                type $T = i16;
                $body
            }
            ScalarType::U16 => {
                type $T = u16;
                $body
            }
            ScalarType::I32 => {
                type $T = i32;
                $body
            }
            ScalarType::U32 => {
                type $T = u32;
                $body
            }
            ScalarType::I64 => {
                type $T = i64;
                $body
            }
            ScalarType::U64 => {
                type $T = u64;
                $body
            }
            ScalarType::F32 => {
                type $T = f32;
                $body
            }
            ScalarType::F64 => {
                type $T = f64;
                $body
            }
        }
    };
}

fn type_of<T: Scalar>(_: &[T]) -> ScalarType {
    T::TYPE
}

fn interleave<T: Scalar>(a: &[T], b: &ScalarArray, c: &ScalarArray) -> Option<ScalarArray> {
    let b = T::slice(b)?;
    let c = T::slice(c)?;
    let mut out = Vec::with_capacity(a.len() * 3);
    for ((&x, &y), &z) in a.iter().zip(b).zip(c) {
        out.push(x);
        out.push(y);
        out.push(z);
    }
    Some(T::into_array(out))
}

impl ScalarArray {
    /// An array of `len` zeros of the given type
    pub fn zeros(ty: ScalarType, len: usize) -> Self {
        with_scalar_type!(ty, T => T::into_array(vec![T::default(); len]))
    }

    /// Wrap a typed vector
    pub fn from_vec<T: Scalar>(values: Vec<T>) -> Self {
        T::into_array(values)
    }

    /// Build an array of type `ty` from f64 values using a saturating cast
    pub fn from_f64_values(ty: ScalarType, values: &[f64]) -> Self {
        with_scalar_type!(ty, T => T::into_array(values.iter().map(|&v| T::from_f64(v)).collect()))
    }

    /// Element type of the array
    pub fn scalar_type(&self) -> ScalarType {
        dispatch!(self, values => type_of(values.as_slice()))
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        dispatch!(self, values => values.len())
    }

    /// Whether the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed element at `index`
    pub fn get(&self, index: usize) -> Option<ScalarValue> {
        dispatch!(self, values => values.get(index).map(|v| v.into_value()))
    }

    /// Element at `index` widened to f64
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        dispatch!(self, values => values.get(index).map(|v| v.to_f64()))
    }

    /// Borrow the contents as `T` if the array holds that type
    pub fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        T::slice(self)
    }

    /// All elements widened to f64
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch!(self, values => values.iter().map(|v| v.to_f64()).collect())
    }

    /// Map every element through `f` (in f64) into a new array of type `target`
    pub fn map_into<F>(&self, target: ScalarType, f: F) -> ScalarArray
    where
        F: Fn(f64) -> f64,
    {
        dispatch!(self, values => with_scalar_type!(target, T => {
            T::into_array(values.iter().map(|v| T::from_f64(f(v.to_f64()))).collect())
        }))
    }

    /// Value-preserving numeric cast (no range rescaling).
    ///
    /// Integer targets truncate toward zero and saturate at the type bounds.
    pub fn cast(self, target: ScalarType) -> ScalarArray {
        if self.scalar_type() == target {
            return self;
        }
        self.map_into(target, |v| v)
    }

    /// Extract every `width`-th element starting at `index`
    pub fn component(&self, index: usize, width: usize) -> ScalarArray {
        dispatch!(self, values => {
            ScalarArray::from_vec(values.iter().skip(index).step_by(width.max(1)).copied().collect::<Vec<_>>())
        })
    }

    /// Interleave three equally long columns into `[a0, b0, c0, a1, ...]`.
    ///
    /// Columns of differing types are first cast to f64.
    pub fn stack3(a: ScalarArray, b: ScalarArray, c: ScalarArray) -> Result<ScalarArray> {
        if a.len() != b.len() || a.len() != c.len() {
            return Err(Error::InvalidData(format!(
                "cannot stack columns of lengths {}, {} and {}",
                a.len(),
                b.len(),
                c.len()
            )));
        }

        let ty = if a.scalar_type() == b.scalar_type() && b.scalar_type() == c.scalar_type() {
            a.scalar_type()
        } else {
            ScalarType::F64
        };
        let (a, b, c) = (a.cast(ty), b.cast(ty), c.cast(ty));

        dispatch!(&a, values => interleave(values.as_slice(), &b, &c))
            .ok_or_else(|| Error::InvalidData("column types diverged while stacking".to_string()))
    }

    /// Minimum and maximum value, ignoring NaN. `None` for empty arrays.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        dispatch!(self, values => {
            values.iter().map(|v| v.to_f64()).filter(|v| !v.is_nan()).fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
        })
    }
}

impl ScalarValue {
    /// Element type of the value
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ScalarValue::I8(_) => ScalarType::I8,
            ScalarValue::U8(_) => ScalarType::U8,
            ScalarValue::I16(_) => ScalarType::I16,
            ScalarValue::U16(_) => ScalarType::U16,
            ScalarValue::I32(_) => ScalarType::I32,
            ScalarValue::U32(_) => ScalarType::U32,
            ScalarValue::I64(_) => ScalarType::I64,
            ScalarValue::U64(_) => ScalarType::U64,
            ScalarValue::F32(_) => ScalarType::F32,
            ScalarValue::F64(_) => ScalarType::F64,
        }
    }

    /// Widen to f64
    pub fn to_f64(&self) -> f64 {
        match *self {
            ScalarValue::I8(v) => v as f64,
            ScalarValue::U8(v) => v as f64,
            ScalarValue::I16(v) => v as f64,
            ScalarValue::U16(v) => v as f64,
            ScalarValue::I32(v) => v as f64,
            ScalarValue::U32(v) => v as f64,
            ScalarValue::I64(v) => v as f64,
            ScalarValue::U64(v) => v as f64,
            ScalarValue::F32(v) => v as f64,
            ScalarValue::F64(v) => v,
        }
    }

    /// Write the value as little-endian bytes
    pub fn write_le<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match *self {
            ScalarValue::I8(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::U8(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::I16(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::U16(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::I32(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::U32(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::I64(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::U64(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::F32(v) => writer.write_all(&v.to_le_bytes()),
            ScalarValue::F64(v) => writer.write_all(&v.to_le_bytes()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::I8(v) => write!(f, "{}", v),
            ScalarValue::U8(v) => write!(f, "{}", v),
            ScalarValue::I16(v) => write!(f, "{}", v),
            ScalarValue::U16(v) => write!(f, "{}", v),
            ScalarValue::I32(v) => write!(f, "{}", v),
            ScalarValue::U32(v) => write!(f, "{}", v),
            ScalarValue::I64(v) => write!(f, "{}", v),
            ScalarValue::U64(v) => write!(f, "{}", v),
            ScalarValue::F32(v) => write!(f, "{}", v),
            ScalarValue::F64(v) => write!(f, "{}", v),
        }
    }
}
