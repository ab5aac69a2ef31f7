//! Low-level byte order and safe reading/writing utilities.
//!
//! Both formats handled by this crate, the Java Object Serialization Stream and the
//! compiled class file, store every multi-byte value in big-endian order. This module
//! provides bounds-checked helpers for reading and writing primitives from and to
//! byte buffers, built around the [`crate::file::io::ByteIO`] trait.
//!
//! # Key Components
//!
//! - [`crate::file::io::ByteIO`] - Trait for endian-aware conversion of primitive types
//! - [`crate::file::io::read_be_at`] - Read a value at an offset and advance it
//! - [`crate::file::io::push_be`] - Append a value to a growable buffer
//!
//! # Examples
//!
//! ```rust,ignore
//! use jgadget::file::io::read_be_at;
//!
//! let data = [0xAC, 0xED, 0x00, 0x05];
//! let mut offset = 0;
//! let magic: u16 = read_be_at(&data, &mut offset)?;
//! let version: u16 = read_be_at(&data, &mut offset)?;
//! assert_eq!((magic, version), (0xACED, 5));
//! # Ok::<(), jgadget::Error>(())
//! ```
//!
//! # Error Handling
//!
//! The reading functions return [`crate::Result<T>`] and fail with
//! [`crate::Error::OutOfBounds`] if the buffer is too short.

use crate::Result;

/// Trait for primitives that can be converted from and to raw bytes.
///
/// The associated `Bytes` type is the fixed-size array of the primitive, which lets
/// the generic readers slice and convert without knowing the concrete width.
pub trait ByteIO: Sized {
    /// Fixed-size byte array type of this primitive
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]> + AsRef<[u8]>;

    /// Read a value from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Convert the value to big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_byte_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ByteIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_byte_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Reads a big-endian value of type `T` at `offset`, advancing the offset past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if fewer than `size_of::<T>()` bytes remain.
pub fn read_be_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Appends `value` in big-endian order to a growable buffer.
pub fn push_be<T: ByteIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_be_bytes().as_ref());
}
