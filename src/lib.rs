// Copyright 2025 The jgadget Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # jgadget
//!
//! Building blocks for Java deserialization gadget payloads, in pure Rust.
//!
//! `jgadget` decodes Java Object Serialization streams into an editable object graph,
//! rewrites strings, byte arrays and class names inside that graph, and encodes it back
//! to a stream the JVM accepts. Alongside the stream codec it patches compiled class
//! files, so a helper class can carry an arbitrary command and class name before it is
//! embedded in a payload.
//!
//! ## Features
//!
//! - **Stream codec** - Decode and encode every content type a stream can hold, with
//!   back-references, block data, custom `writeObject` data and externalizable objects
//! - **Graph rewriting** - Replace placeholders in strings and `byte[]` contents,
//!   rename classes, or visit every node with a closure that returns an [`serial::Edit`]
//! - **Readable dumps** - Render a graph as Java-like pseudo source for inspection, or
//!   export it as editable JSON and import it back
//! - **Class file patching** - Resize Utf8 constants in place or parse, edit and
//!   re-serialize the constant pool, and convert classes to BCEL class loader names
//! - **Gadget catalog** - Fill in parameterized templates, inject classes into
//!   `TemplatesImpl` carriers and generate batches in parallel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jgadget::{serial, File};
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("payload.ser"))?;
//! let mut graph = serial::decode(file.data())?;
//!
//! serial::replace_string(&mut graph, "{{param0}}", "touch /tmp/pwned", -1)?;
//! println!("{}", serial::dump(&mut graph));
//!
//! let bytes = serial::encode(&graph, &serial::EncodeOptions::default())?;
//! # Ok::<(), jgadget::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], whose error type [`Error`] separates
//! damaged input ([`Error::Malformed`], [`Error::OutOfBounds`]) from rewrites that
//! matched nothing ([`Error::NotFound`]).

#[macro_use]
pub(crate) mod error;

/// Input access: memory-mapped files, in-memory buffers and a big-endian [`Parser`].
///
/// Java streams and class files are both big-endian; every reader in this crate goes
/// through the primitives in [`file::io`] and the modified UTF-8 codec in
/// [`file::mutf8`].
pub mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust,no_run
/// use jgadget::prelude::*;
///
/// let graph = decode(&std::fs::read("payload.ser")?)?;
/// let bytes = encode(&graph, &EncodeOptions::default())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub mod prelude;

/// Java Object Serialization streams.
///
/// # Key Types
///
/// - [`serial::Graph`] - Arena of decoded nodes addressed by [`serial::NodeId`]
/// - [`serial::Node`] - One stream content item
/// - [`serial::EncodeOptions`] - Output tweaks such as the marshaler variant
///
/// # Main Functions
///
/// - [`serial::decode`] / [`serial::encode`] - Convert between bytes and a graph
/// - [`serial::walk`] - Visit and edit every node in stream order
/// - [`serial::replace_string`], [`serial::replace_byte_array`],
///   [`serial::replace_class_name`] - Targeted rewrites
/// - [`serial::dump`] - Pseudo source rendering
/// - [`serial::to_json`] / [`serial::from_json`] - Editable JSON form
pub mod serial;

/// Compiled Java class files.
///
/// [`classfile::ClassFile`] parses and re-serializes a class, while
/// [`classfile::patch_placeholder_command`] and
/// [`classfile::patch_class_or_descriptor_name`] work on raw bytes without a full
/// parse. [`classfile::ClassFile::bcel`] renders a class as a BCEL class loader name.
pub mod classfile;

/// Gadget templates, helper classes and payload generation.
pub mod gadget;

/// `jgadget` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `jgadget` Error type
///
/// See the variants of [`Error`] for what each failure means.
pub use error::Error;

/// Raw input access
///
/// [`File`] owns the bytes of a file on disk (memory mapped) or in memory, and
/// [`Parser`] reads big-endian values from any byte slice.
pub use file::{parser::Parser, File};
