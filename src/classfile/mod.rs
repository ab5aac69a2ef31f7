//! Java class files.
//!
//! [`ClassFile`] parses the structure of a compiled class far enough to edit its
//! constant pool: names, string literals and the version. Fields, methods and
//! attributes are kept as raw blobs and written back untouched, so an unmodified
//! class re-serializes byte for byte.
//!
//! The [`patch`] module edits class bytes in place without parsing them, for helper
//! classes whose layout is known in advance. The [`bcel`] module converts classes to
//! and from the names understood by the BCEL class loader.
//!
//! # Examples
//!
//! ```rust,ignore
//! use jgadget::classfile::ClassFile;
//!
//! let mut class = ClassFile::parse(&bytes)?;
//! class.set_class_name("a/b/Renamed")?;
//! class.set_param("cmd", "id")?;
//! let patched = class.bytes()?;
//! # Ok::<(), jgadget::Error>(())
//! ```

pub mod bcel;
pub mod constant;
pub mod patch;

pub use bcel::BCEL_PREFIX;
pub use constant::{Constant, ConstantPool, ConstantTag};
pub use patch::{patch_class_or_descriptor_name, patch_placeholder_command, Occurrence};

use bitflags::bitflags;
use log::debug;

use crate::{
    file::{io::push_be, parser::Parser},
    Error::{Empty, NotFound},
    Result,
};

/// Magic number at the start of every class file.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

/// Major version used when a requested version is out of range (Java 8).
pub const DEFAULT_MAJOR_VERSION: u16 = 52;

/// Oldest and newest major versions accepted by [`ClassFile::set_major_version`].
pub const MAJOR_VERSIONS: std::ops::RangeInclusive<u16> = 45..=62;

bitflags! {
    /// `ACC_*` flags of classes, fields and methods.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u16 {
        /// Visible outside its package
        const PUBLIC = 0x0001;
        /// Visible only within the class
        const PRIVATE = 0x0002;
        /// Visible to subclasses
        const PROTECTED = 0x0004;
        /// Static member
        const STATIC = 0x0008;
        /// No subclasses or overrides
        const FINAL = 0x0010;
        /// Modern `invokespecial` semantics (`synchronized` on methods)
        const SUPER = 0x0020;
        /// `volatile` field or bridge method
        const VOLATILE = 0x0040;
        /// `transient` field or varargs method
        const TRANSIENT = 0x0080;
        /// Native method
        const NATIVE = 0x0100;
        /// Interface
        const INTERFACE = 0x0200;
        /// Abstract class or method
        const ABSTRACT = 0x0400;
        /// Strict floating point
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Annotation interface
        const ANNOTATION = 0x2000;
        /// Enum class or constant
        const ENUM = 0x4000;
        /// Module descriptor
        const MODULE = 0x8000;
    }
}

/// An attribute kept as its name index and raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Utf8 index of the attribute name
    pub name_index: u16,
    /// Attribute body
    pub info: Vec<u8>,
}

/// A field or method.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Access flags
    pub access_flags: AccessFlags,
    /// Utf8 index of the name
    pub name_index: u16,
    /// Utf8 index of the descriptor
    pub descriptor_index: u16,
    /// Attributes
    pub attributes: Vec<Attribute>,
}

fn read_attributes(parser: &mut Parser<'_>) -> Result<Vec<Attribute>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name_index = parser.read_be::<u16>()?;
        let len = parser.read_be::<u32>()?;
        let info = parser.read_bytes(len as usize)?.to_vec();
        attributes.push(Attribute { name_index, info });
    }
    Ok(attributes)
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) -> Result<()> {
    push_be(out, count_u16(attributes.len())?);
    for attribute in attributes {
        push_be(out, attribute.name_index);
        let Ok(len) = u32::try_from(attribute.info.len()) else {
            return Err(malformed_error!("Attribute of {} bytes", attribute.info.len()));
        };
        push_be(out, len);
        out.extend_from_slice(&attribute.info);
    }
    Ok(())
}

fn read_members(parser: &mut Parser<'_>) -> Result<Vec<Member>> {
    let count = parser.read_be::<u16>()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        members.push(Member {
            access_flags: AccessFlags::from_bits_retain(parser.read_be()?),
            name_index: parser.read_be()?,
            descriptor_index: parser.read_be()?,
            attributes: read_attributes(parser)?,
        });
    }
    Ok(members)
}

fn write_members(out: &mut Vec<u8>, members: &[Member]) -> Result<()> {
    push_be(out, count_u16(members.len())?);
    for member in members {
        push_be(out, member.access_flags.bits());
        push_be(out, member.name_index);
        push_be(out, member.descriptor_index);
        write_attributes(out, &member.attributes)?;
    }
    Ok(())
}

fn count_u16(count: usize) -> Result<u16> {
    u16::try_from(count).map_err(|_| malformed_error!("Table of {} entries", count))
}

/// A parsed class file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version
    pub major_version: u16,
    /// Constant pool
    pub constant_pool: ConstantPool,
    /// Class access flags
    pub access_flags: AccessFlags,
    /// Class entry of this class
    pub this_class: u16,
    /// Class entry of the super class, 0 for `java.lang.Object`
    pub super_class: u16,
    /// Class entries of the implemented interfaces
    pub interfaces: Vec<u16>,
    /// Fields
    pub fields: Vec<Member>,
    /// Methods
    pub methods: Vec<Member>,
    /// Class attributes
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parse a class file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::Malformed`]
    /// for a bad magic number, constant pool or trailing data, and
    /// [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(data: &[u8]) -> Result<ClassFile> {
        if data.is_empty() {
            return Err(Empty);
        }

        let mut parser = Parser::new(data);
        let magic = parser.read_be::<u32>()?;
        if magic != CLASS_MAGIC {
            return Err(malformed_error!("Invalid class file magic 0x{:08x}", magic));
        }

        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        let constant_pool = ConstantPool::parse(&mut parser)?;
        let access_flags = AccessFlags::from_bits_retain(parser.read_be()?);
        let this_class = parser.read_be::<u16>()?;
        let super_class = parser.read_be::<u16>()?;

        let interface_count = parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(parser.read_be::<u16>()?);
        }

        let fields = read_members(&mut parser)?;
        let methods = read_members(&mut parser)?;
        let attributes = read_attributes(&mut parser)?;

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} bytes of trailing data after the class attributes",
                parser.remaining()
            ));
        }
        if constant_pool.class_name(this_class).is_none() {
            return Err(malformed_error!("this_class {} is not a Class constant", this_class));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serialize the class file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an edited constant or table no longer
    /// fits the class-file size limits.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        push_be(&mut out, CLASS_MAGIC);
        push_be(&mut out, self.minor_version);
        push_be(&mut out, self.major_version);
        self.constant_pool.write_to(&mut out)?;
        push_be(&mut out, self.access_flags.bits());
        push_be(&mut out, self.this_class);
        push_be(&mut out, self.super_class);
        push_be(&mut out, count_u16(self.interfaces.len())?);
        for interface in &self.interfaces {
            push_be(&mut out, *interface);
        }
        write_members(&mut out, &self.fields)?;
        write_members(&mut out, &self.methods)?;
        write_attributes(&mut out, &self.attributes)?;
        Ok(out)
    }

    /// Parse a class from a BCEL class loader name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the name does not decode, and any
    /// [`ClassFile::parse`] error for the decoded bytes.
    pub fn from_bcel(name: &str) -> Result<ClassFile> {
        ClassFile::parse(&bcel::decode(name)?)
    }

    /// Serialize the class as a BCEL class loader name (`$$BCEL$$...`).
    ///
    /// # Errors
    ///
    /// Returns the errors of [`ClassFile::bytes`] and [`bcel::encode`].
    pub fn bcel(&self) -> Result<String> {
        bcel::encode(&self.bytes()?)
    }

    /// Internal name of this class (`a/b/C`).
    #[must_use]
    pub fn class_name(&self) -> Option<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Rename this class.
    ///
    /// The Utf8 behind `this_class` becomes `new`, and every `L<old>;` inside any
    /// Utf8 constant (field and method descriptors, signatures) becomes `L<new>;`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `this_class` does not name a class.
    pub fn set_class_name(&mut self, new: &str) -> Result<()> {
        let Some(old) = self.class_name().map(str::to_string) else {
            return Err(malformed_error!("this_class {} is not a Class constant", self.this_class));
        };
        let Some(name_index) = self.constant_pool.class_name_index(self.this_class) else {
            return Err(malformed_error!("this_class {} is not a Class constant", self.this_class));
        };

        let old_descriptor = format!("L{old};");
        let new_descriptor = format!("L{new};");
        let indices: Vec<u16> = self
            .constant_pool
            .iter()
            .filter_map(|(index, constant)| match constant {
                Constant::Utf8(value) if value.contains(&old_descriptor) => Some(index),
                _ => None,
            })
            .collect();

        for index in indices {
            if let Some(value) = self.constant_pool.utf8_mut(index) {
                *value = value.replace(&old_descriptor, &new_descriptor);
            }
        }
        if let Some(value) = self.constant_pool.utf8_mut(name_index) {
            *value = new.to_string();
        }

        debug!("Renamed class {} to {}", old, new);
        Ok(())
    }

    /// Internal name of the super class, `None` when there is none.
    #[must_use]
    pub fn super_class_name(&self) -> Option<&str> {
        self.constant_pool.class_name(self.super_class)
    }

    /// Rename the super class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the class has no super class entry.
    pub fn set_super_class_name(&mut self, new: &str) -> Result<()> {
        let Some(name) = self
            .constant_pool
            .class_name_index(self.super_class)
            .and_then(|index| self.constant_pool.utf8_mut(index))
        else {
            return Err(NotFound("super class".to_string()));
        };
        *name = new.to_string();
        Ok(())
    }

    /// Set the major version. Values outside [`MAJOR_VERSIONS`] fall back to
    /// [`DEFAULT_MAJOR_VERSION`].
    pub fn set_major_version(&mut self, version: u16) {
        self.major_version = if MAJOR_VERSIONS.contains(&version) {
            version
        } else {
            debug!("Major version {} out of range, using {}", version, DEFAULT_MAJOR_VERSION);
            DEFAULT_MAJOR_VERSION
        };
    }

    /// Text of the first String constant whose value is `value`, for modification.
    pub fn find_constant_string(&mut self, value: &str) -> Option<&mut String> {
        let index = self.string_constants().find(|(_, text)| *text == value)?.0;
        self.constant_pool.utf8_mut(index)
    }

    /// Replace every String constant `{{name}}` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] if the class has no such placeholder.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<usize> {
        let placeholder = format!("{{{{{name}}}}}");
        let mut indices: Vec<u16> = self
            .string_constants()
            .filter(|(_, text)| *text == placeholder)
            .map(|(index, _)| index)
            .collect();
        indices.dedup();

        for index in &indices {
            if let Some(text) = self.constant_pool.utf8_mut(*index) {
                *text = value.to_string();
            }
        }

        if indices.is_empty() {
            return Err(NotFound(format!("class parameter {placeholder}")));
        }
        Ok(indices.len())
    }

    /// Every Utf8 constant with its index.
    pub fn utf8_constants(&self) -> impl Iterator<Item = (u16, &str)> {
        self.constant_pool
            .iter()
            .filter_map(|(index, constant)| match constant {
                Constant::Utf8(value) => Some((index, value.as_str())),
                _ => None,
            })
    }

    /// Utf8 index and text behind every String constant.
    fn string_constants(&self) -> impl Iterator<Item = (u16, &str)> {
        self.constant_pool
            .iter()
            .filter_map(|(_, constant)| match constant {
                Constant::String(index) => self
                    .constant_pool
                    .utf8(*index)
                    .map(|text| (*index, text)),
                _ => None,
            })
    }
}
