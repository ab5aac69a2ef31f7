//! Input abstraction and low-level binary reading.
//!
//! Template files are read through [`crate::file::File`], which maps them into memory
//! behind the [`crate::file::Backend`] trait, so the decoders only ever see a byte slice.
//!
//! # Key Components
//!
//! - [`crate::file::File`] - Owned input behind a backend
//! - [`crate::file::Backend`] - Trait for different data sources
//! - [`crate::file::parser::Parser`] - Cursor used by the stream and class-file decoders
//! - [`crate::file::io`] - Big-endian primitive reads and writes
//! - [`crate::file::mutf8`] - Java modified UTF-8 codec
//!
//! # Examples
//!
//! ```rust,no_run
//! use jgadget::{serial, File};
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("templates/CommonsCollections6.ser"))?;
//! let graph = serial::decode(file.data())?;
//! println!("{} root(s)", graph.roots().len());
//! # Ok::<(), jgadget::Error>(())
//! ```

pub mod io;
pub mod mutf8;
pub mod parser;

mod physical;

use std::path::Path;

use crate::{Error::Empty, Result};
use physical::Physical;

/// Backend trait for the data sources a [`File`] can be created from.
pub trait Backend: Send + Sync {
    /// Returns the complete data.
    fn data(&self) -> &[u8];

    /// Returns the total size of the data.
    fn len(&self) -> usize;
}

/// An input buffer (serialized stream or class file) read from disk.
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Load a file from disk through a memory map.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened and
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
        })
    }

    /// Returns the complete input.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }
}
