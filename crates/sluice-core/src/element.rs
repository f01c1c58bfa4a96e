//! Typed element buffers.
//!
//! Fields published by the simulation carry one of a small set of
//! numeric element types. [`Buffer`] is the type-erased container that
//! crosses crate boundaries (source fetches, collective payloads, stream
//! blocks); [`Element`] maps a Rust scalar type to its [`Dtype`] tag and
//! back.

use std::fmt;

/// Element type tag for a field or payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dtype {
    /// 64-bit IEEE float.
    F64,
    /// 32-bit IEEE float.
    F32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit unsigned integer.
    U64,
}

impl Dtype {
    /// Stable on-disk tag.
    pub fn tag(self) -> u8 {
        match self {
            Self::F64 => 0,
            Self::F32 => 1,
            Self::I64 => 2,
            Self::I32 => 3,
            Self::U64 => 4,
        }
    }

    /// Inverse of [`tag`](Self::tag).
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::F64),
            1 => Some(Self::F32),
            2 => Some(Self::I64),
            3 => Some(Self::I32),
            4 => Some(Self::U64),
            _ => None,
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::F64 | Self::I64 | Self::U64 => 8,
            Self::F32 | Self::I32 => 4,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F64 => "f64",
            Self::F32 => "f32",
            Self::I64 => "i64",
            Self::I32 => "i32",
            Self::U64 => "u64",
        };
        f.write_str(name)
    }
}

/// A type-erased, owned sequence of elements.
#[derive(Clone, Debug, PartialEq)]
pub enum Buffer {
    /// `f64` elements.
    F64(Vec<f64>),
    /// `f32` elements.
    F32(Vec<f32>),
    /// `i64` elements.
    I64(Vec<i64>),
    /// `i32` elements.
    I32(Vec<i32>),
    /// `u64` elements.
    U64(Vec<u64>),
}

impl Buffer {
    /// An empty buffer of the given type.
    pub fn empty(dtype: Dtype) -> Self {
        match dtype {
            Dtype::F64 => Self::F64(Vec::new()),
            Dtype::F32 => Self::F32(Vec::new()),
            Dtype::I64 => Self::I64(Vec::new()),
            Dtype::I32 => Self::I32(Vec::new()),
            Dtype::U64 => Self::U64(Vec::new()),
        }
    }

    /// Element type of this buffer.
    pub fn dtype(&self) -> Dtype {
        match self {
            Self::F64(_) => Dtype::F64,
            Self::F32(_) => Dtype::F32,
            Self::I64(_) => Dtype::I64,
            Self::I32(_) => Dtype::I32,
            Self::U64(_) => Dtype::U64,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::F64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U64(v) => v.len(),
        }
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the contents as `&[T]` if the element type matches.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::view(self)
    }

    /// Unwrap into `Vec<T>`, handing the buffer back on a type mismatch.
    pub fn into_vec<T: Element>(self) -> Result<Vec<T>, Buffer> {
        T::unwrap_buffer(self)
    }
}

impl<T: Element> From<Vec<T>> for Buffer {
    fn from(v: Vec<T>) -> Self {
        T::wrap(v)
    }
}

/// A scalar type that can travel inside a [`Buffer`].
///
/// Implemented for `f64`, `f32`, `i64`, `i32` and `u64`; the set is
/// closed because every consumer (codec, collectives) matches on
/// [`Dtype`] exhaustively.
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Tag for this element type.
    const DTYPE: Dtype;

    /// Wrap a vector into a type-erased buffer.
    fn wrap(v: Vec<Self>) -> Buffer;

    /// Recover the vector, returning the buffer unchanged on mismatch.
    fn unwrap_buffer(b: Buffer) -> Result<Vec<Self>, Buffer>;

    /// Borrow a buffer's contents if the type matches.
    fn view(b: &Buffer) -> Option<&[Self]>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: Dtype = Dtype::$variant;

            fn wrap(v: Vec<Self>) -> Buffer {
                Buffer::$variant(v)
            }

            fn unwrap_buffer(b: Buffer) -> Result<Vec<Self>, Buffer> {
                match b {
                    Buffer::$variant(v) => Ok(v),
                    other => Err(other),
                }
            }

            fn view(b: &Buffer) -> Option<&[Self]> {
                match b {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(f64, F64);
impl_element!(f32, F32);
impl_element!(i64, I64);
impl_element!(i32, I32);
impl_element!(u64, U64);
