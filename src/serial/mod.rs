//! Java Object Serialization Stream graphs.
//!
//! This module decodes `ObjectOutputStream` output into an arena-backed [`Graph`],
//! walks it in stream order with an edit hook, rewrites string / byte-array / class
//! leaves, renders a pseudo-Java dump and encodes the result back into a stream.
//!
//! # Key Components
//!
//! - [`crate::serial::Graph`] / [`crate::serial::Node`] - Node model (arena of closed node kinds)
//! - [`crate::serial::decode`] / [`crate::serial::encode`] - Stream codec
//! - [`crate::serial::walk`] - Stream-order traversal with [`crate::serial::Edit`] results
//! - [`crate::serial::replace_string`], [`crate::serial::replace_byte_array`],
//!   [`crate::serial::replace_class_name`] - Content rewriters
//! - [`crate::serial::dump`] - Structural dumper
//! - [`crate::serial::to_json`] / [`crate::serial::from_json`] - Editable JSON form of a graph
//!
//! # Handles
//!
//! Every handle-bearing node (descriptors, objects, arrays, strings, class and enum
//! constants) owns one handle, numbered from [`BASE_HANDLE`] in the order the node
//! starts in the stream. Later occurrences are [`Node::Reference`] leaves. The
//! encoder renumbers handles in write order and maps references through the new
//! numbering, so slots may be replaced freely as long as every reference still
//! points at a node written before it.
//!
//! # Examples
//!
//! ```rust,ignore
//! use jgadget::serial::{self, EncodeOptions};
//!
//! let mut graph = serial::decode(&template)?;
//! serial::replace_string(&mut graph, "{{param0}}", "touch /tmp/pwned", -1)?;
//! let payload = serial::encode(&graph, &EncodeOptions::default())?;
//! # Ok::<(), jgadget::Error>(())
//! ```

mod decoder;
mod dump;
mod encoder;
mod json;
mod node;
mod rewrite;
mod walker;

pub use decoder::decode;
pub use dump::{dump, render};
pub use encoder::{encode, EncodeOptions, MarshalerVariant};
pub use json::{from_json, to_json};
pub use node::{
    ArrayElements, ClassData, ClassDesc, FieldDecl, FieldValue, Graph, JavaArray, JavaClass,
    JavaEnum, JavaObject, JavaString, Node, NodeId, Primitive,
};
pub use rewrite::{replace_byte_array, replace_class_name, replace_string};
pub use walker::{walk, DumpKind, DumpNode, DumpTree, DumpValue, Edit, Visited};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, FromRepr};

/// Stream magic number written by `ObjectOutputStream`.
pub const STREAM_MAGIC: u16 = 0xACED;

/// The only stream protocol version produced by current JDKs.
pub const STREAM_VERSION: u16 = 5;

/// First handle assigned in a stream.
pub const BASE_HANDLE: u32 = 0x7E_0000;

/// Deepest nesting the decoder, encoder and walker follow.
pub const MAX_DEPTH: usize = 256;

/// Type codes (`TC_*`) that introduce each element of a serialization stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr)]
#[repr(u8)]
pub enum Tag {
    /// `null`
    #[strum(to_string = "TC_NULL")]
    Null = 0x70,
    /// Back-reference to an earlier handle
    #[strum(to_string = "TC_REFERENCE")]
    Reference = 0x71,
    /// Class descriptor
    #[strum(to_string = "TC_CLASSDESC")]
    ClassDesc = 0x72,
    /// Object instance
    #[strum(to_string = "TC_OBJECT")]
    Object = 0x73,
    /// String with a `u16` length
    #[strum(to_string = "TC_STRING")]
    String = 0x74,
    /// Array instance
    #[strum(to_string = "TC_ARRAY")]
    Array = 0x75,
    /// `java.lang.Class` instance
    #[strum(to_string = "TC_CLASS")]
    Class = 0x76,
    /// Block data with a `u8` length
    #[strum(to_string = "TC_BLOCKDATA")]
    BlockData = 0x77,
    /// End of optional block data / annotations
    #[strum(to_string = "TC_ENDBLOCKDATA")]
    EndBlockData = 0x78,
    /// Handle table reset
    #[strum(to_string = "TC_RESET")]
    Reset = 0x79,
    /// Block data with a `u32` length
    #[strum(to_string = "TC_BLOCKDATALONG")]
    BlockDataLong = 0x7A,
    /// Exception thrown during serialization
    #[strum(to_string = "TC_EXCEPTION")]
    Exception = 0x7B,
    /// String with a `u64` length
    #[strum(to_string = "TC_LONGSTRING")]
    LongString = 0x7C,
    /// Dynamic proxy class descriptor
    #[strum(to_string = "TC_PROXYCLASSDESC")]
    ProxyClassDesc = 0x7D,
    /// Enum constant
    #[strum(to_string = "TC_ENUM")]
    Enum = 0x7E,
}

/// Field type codes used in class descriptors and array class names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, FromRepr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum TypeCode {
    /// `byte`
    Byte = b'B',
    /// `char`
    Char = b'C',
    /// `double`
    Double = b'D',
    /// `float`
    Float = b'F',
    /// `int`
    Int = b'I',
    /// `long`
    Long = b'J',
    /// `short`
    Short = b'S',
    /// `boolean`
    Boolean = b'Z',
    /// Array reference
    Array = b'[',
    /// Object reference
    Object = b'L',
}

impl TypeCode {
    /// True for `Object` and `Array`, whose values are nested content.
    #[must_use]
    pub fn is_reference(self) -> bool {
        matches!(self, TypeCode::Object | TypeCode::Array)
    }

    /// The type code as the ASCII byte written to the stream.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// `SC_*` flags of a class descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ClassDescFlags: u8 {
        /// Class has a custom `writeObject` that may append block data
        const WRITE_METHOD = 0x01;
        /// Class implements `java.io.Serializable`
        const SERIALIZABLE = 0x02;
        /// Class implements `java.io.Externalizable`
        const EXTERNALIZABLE = 0x04;
        /// Externalizable data is written in block-data mode
        const BLOCK_DATA = 0x08;
        /// Class is an enum type
        const ENUM = 0x10;
    }
}

impl ClassDescFlags {
    /// True if class data for this level carries annotations terminated by
    /// `TC_ENDBLOCKDATA`.
    #[must_use]
    pub fn has_annotations(self) -> bool {
        (self.contains(Self::WRITE_METHOD) && self.contains(Self::SERIALIZABLE))
            || (self.contains(Self::EXTERNALIZABLE) && self.contains(Self::BLOCK_DATA))
    }
}
