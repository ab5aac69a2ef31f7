//! # jgadget Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and
//! functions from the jgadget library. Import this module to get quick access to the
//! essentials for decoding, rewriting and generating payloads.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all jgadget operations
pub use crate::Error;

/// The result type used throughout jgadget
pub use crate::Result;

/// Low-level input access
pub use crate::{File, Parser};

// ================================================================================================
// Serialization Streams
// ================================================================================================

/// Stream codec
pub use crate::serial::{decode, encode, EncodeOptions, MarshalerVariant};

/// JSON form of a graph
pub use crate::serial::{from_json, to_json};

/// Object graph
pub use crate::serial::{
    ArrayElements, ClassDesc, FieldValue, Graph, JavaArray, JavaObject, JavaString, Node, NodeId,
    Primitive,
};

/// Graph traversal and rewriting
pub use crate::serial::{
    dump, replace_byte_array, replace_class_name, replace_string, walk, DumpTree, Edit, Visited,
};

// ================================================================================================
// Class Files and Gadgets
// ================================================================================================

/// Class file parsing and patching
pub use crate::classfile::{
    patch_class_or_descriptor_name, patch_placeholder_command, ClassFile, Constant, BCEL_PREFIX,
};

/// Payload generation
pub use crate::gadget::{
    Carrier, Catalog, ClassTemplate, GadgetRequest, GadgetTemplate, ParamSpec, ParamValue, Params,
};
