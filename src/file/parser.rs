//! Binary data parsing utilities for serialization streams and class files.
//!
//! This module provides [`crate::file::parser::Parser`], a cursor over a byte slice
//! with bounds-checked, big-endian primitive reads and the length-prefixed string
//! forms used by Java (`u16` and `u64` length headers over modified UTF-8).
//!
//! # Examples
//!
//! ```rust,ignore
//! use jgadget::Parser;
//!
//! let data = [0x00, 0x03, b'f', b'o', b'o', 0x78];
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_utf()?.1, "foo");
//! assert_eq!(parser.read_be::<u8>()?, 0x78);
//! assert!(!parser.has_more_data());
//! # Ok::<(), jgadget::Error>(())
//! ```

use crate::{
    file::{
        io::{read_be_at, ByteIO},
        mutf8,
    },
    Result,
};

/// A cursor-based reader over a borrowed byte slice.
///
/// All reads advance the cursor and fail with [`crate::Error::OutOfBounds`] instead of
/// panicking when the input is exhausted.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns true if unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if step > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Current cursor position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn peek_byte(&self) -> Result<u8> {
        match self.data.get(self.position) {
            Some(byte) => Ok(*byte),
            None => Err(out_of_bounds_error!()),
        }
    }

    /// Read a big-endian value of type `T`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data remains.
    pub fn read_be<T: ByteIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read a `u16`-length-prefixed modified UTF-8 string, as written by `writeUTF`.
    ///
    /// Returns the raw bytes alongside the decoded value. Bytes that are not valid
    /// modified UTF-8 are decoded lossily so that damaged templates can still be
    /// inspected, and the raw bytes keep the original content.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the string is truncated.
    pub fn read_utf(&mut self) -> Result<(&'a [u8], String)> {
        let len = self.read_be::<u16>()?;
        let raw = self.read_bytes(usize::from(len))?;
        Ok((raw, mutf8::decode_lossy(raw)))
    }

    /// Read a `u64`-length-prefixed modified UTF-8 string (`TC_LONGSTRING` payload).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the string is truncated or its length
    /// does not fit into the address space.
    pub fn read_long_utf(&mut self) -> Result<(&'a [u8], String)> {
        let len = self.read_be::<u64>()?;
        let Ok(len) = usize::try_from(len) else {
            return Err(out_of_bounds_error!());
        };
        let raw = self.read_bytes(len)?;
        Ok((raw, mutf8::decode_lossy(raw)))
    }
}
