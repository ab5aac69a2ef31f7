//! Constant pool entries and the pool itself.
//!
//! Indices are 1-based as in the class file. `Long` and `Double` take two slots; the
//! second one holds [`Constant::Unusable`] so indices map directly onto the vector.

use std::fmt;

use strum::{Display, FromRepr};

use crate::{
    file::{io::push_be, mutf8, parser::Parser},
    Result,
};

/// Constant pool tags of the JVM specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    FieldRef = 9,
    MethodRef = 10,
    InterfaceMethodRef = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

/// One constant pool entry. Reference-like variants hold pool indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Modified UTF-8 text
    Utf8(String),
    /// `int` literal
    Integer(i32),
    /// `float` literal
    Float(f32),
    /// `long` literal (two slots)
    Long(i64),
    /// `double` literal (two slots)
    Double(f64),
    /// Class or interface: name index
    Class(u16),
    /// String literal: Utf8 index
    String(u16),
    /// Field reference: class index, name-and-type index
    FieldRef(u16, u16),
    /// Method reference: class index, name-and-type index
    MethodRef(u16, u16),
    /// Interface method reference: class index, name-and-type index
    InterfaceMethodRef(u16, u16),
    /// Name index, descriptor index
    NameAndType(u16, u16),
    /// Reference kind, reference index
    MethodHandle(u8, u16),
    /// Descriptor index
    MethodType(u16),
    /// Bootstrap method index, name-and-type index
    Dynamic(u16, u16),
    /// Bootstrap method index, name-and-type index
    InvokeDynamic(u16, u16),
    /// Module name index
    Module(u16),
    /// Package name index
    Package(u16),
    /// Second slot of a `Long` or `Double`
    Unusable,
}

impl Constant {
    /// Tag of this entry, `None` for [`Constant::Unusable`].
    #[must_use]
    pub fn tag(&self) -> Option<ConstantTag> {
        Some(match self {
            Constant::Utf8(_) => ConstantTag::Utf8,
            Constant::Integer(_) => ConstantTag::Integer,
            Constant::Float(_) => ConstantTag::Float,
            Constant::Long(_) => ConstantTag::Long,
            Constant::Double(_) => ConstantTag::Double,
            Constant::Class(_) => ConstantTag::Class,
            Constant::String(_) => ConstantTag::String,
            Constant::FieldRef(..) => ConstantTag::FieldRef,
            Constant::MethodRef(..) => ConstantTag::MethodRef,
            Constant::InterfaceMethodRef(..) => ConstantTag::InterfaceMethodRef,
            Constant::NameAndType(..) => ConstantTag::NameAndType,
            Constant::MethodHandle(..) => ConstantTag::MethodHandle,
            Constant::MethodType(_) => ConstantTag::MethodType,
            Constant::Dynamic(..) => ConstantTag::Dynamic,
            Constant::InvokeDynamic(..) => ConstantTag::InvokeDynamic,
            Constant::Module(_) => ConstantTag::Module,
            Constant::Package(_) => ConstantTag::Package,
            Constant::Unusable => return None,
        })
    }

    /// True for entries that occupy two pool slots.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    fn read(parser: &mut Parser<'_>) -> Result<Constant> {
        let code = parser.read_be::<u8>()?;
        let Some(tag) = ConstantTag::from_repr(code) else {
            return Err(malformed_error!(
                "Invalid constant pool tag {} at offset {}",
                code,
                parser.pos() - 1
            ));
        };

        Ok(match tag {
            ConstantTag::Utf8 => {
                let len = parser.read_be::<u16>()?;
                let bytes = parser.read_bytes(usize::from(len))?;
                Constant::Utf8(mutf8::decode(bytes)?)
            }
            ConstantTag::Integer => Constant::Integer(parser.read_be()?),
            ConstantTag::Float => Constant::Float(parser.read_be()?),
            ConstantTag::Long => Constant::Long(parser.read_be()?),
            ConstantTag::Double => Constant::Double(parser.read_be()?),
            ConstantTag::Class => Constant::Class(parser.read_be()?),
            ConstantTag::String => Constant::String(parser.read_be()?),
            ConstantTag::FieldRef => Constant::FieldRef(parser.read_be()?, parser.read_be()?),
            ConstantTag::MethodRef => Constant::MethodRef(parser.read_be()?, parser.read_be()?),
            ConstantTag::InterfaceMethodRef => {
                Constant::InterfaceMethodRef(parser.read_be()?, parser.read_be()?)
            }
            ConstantTag::NameAndType => {
                Constant::NameAndType(parser.read_be()?, parser.read_be()?)
            }
            ConstantTag::MethodHandle => {
                Constant::MethodHandle(parser.read_be()?, parser.read_be()?)
            }
            ConstantTag::MethodType => Constant::MethodType(parser.read_be()?),
            ConstantTag::Dynamic => Constant::Dynamic(parser.read_be()?, parser.read_be()?),
            ConstantTag::InvokeDynamic => {
                Constant::InvokeDynamic(parser.read_be()?, parser.read_be()?)
            }
            ConstantTag::Module => Constant::Module(parser.read_be()?),
            ConstantTag::Package => Constant::Package(parser.read_be()?),
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let Some(tag) = self.tag() else {
            return Ok(());
        };
        out.push(tag as u8);

        match self {
            Constant::Utf8(value) => {
                let bytes = mutf8::encode(value, mutf8::CharWidth::One);
                let Ok(len) = u16::try_from(bytes.len()) else {
                    return Err(malformed_error!(
                        "Utf8 constant of {} bytes exceeds the class-file limit",
                        bytes.len()
                    ));
                };
                push_be(out, len);
                out.extend_from_slice(&bytes);
            }
            Constant::Integer(value) => push_be(out, *value),
            Constant::Float(value) => push_be(out, *value),
            Constant::Long(value) => push_be(out, *value),
            Constant::Double(value) => push_be(out, *value),
            Constant::Class(index)
            | Constant::String(index)
            | Constant::MethodType(index)
            | Constant::Module(index)
            | Constant::Package(index) => push_be(out, *index),
            Constant::FieldRef(a, b)
            | Constant::MethodRef(a, b)
            | Constant::InterfaceMethodRef(a, b)
            | Constant::NameAndType(a, b)
            | Constant::Dynamic(a, b)
            | Constant::InvokeDynamic(a, b) => {
                push_be(out, *a);
                push_be(out, *b);
            }
            Constant::MethodHandle(kind, index) => {
                out.push(*kind);
                push_be(out, *index);
            }
            Constant::Unusable => {}
        }
        Ok(())
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Utf8(value) => write!(f, "Utf8 {value:?}"),
            Constant::Unusable => write!(f, "(unusable)"),
            other => match other.tag() {
                Some(tag) => write!(f, "{tag}"),
                None => Ok(()),
            },
        }
    }
}

/// A class file's constant pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    /// Read `constant_pool_count` followed by the entries.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for unknown tags or invalid modified UTF-8,
    /// and [`crate::Error::OutOfBounds`] for truncated input.
    pub fn parse(parser: &mut Parser<'_>) -> Result<ConstantPool> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count of 0"));
        }

        let slots = usize::from(count) - 1;
        let mut entries = Vec::with_capacity(slots);
        while entries.len() < slots {
            let constant = Constant::read(parser)?;
            let wide = constant.is_wide();
            entries.push(constant);
            if wide {
                if entries.len() == slots {
                    return Err(malformed_error!("Wide constant in the last pool slot"));
                }
                entries.push(Constant::Unusable);
            }
        }

        Ok(ConstantPool { entries })
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let Ok(count) = u16::try_from(self.entries.len() + 1) else {
            return Err(malformed_error!("Constant pool of {} entries", self.entries.len()));
        };
        push_be(out, count);
        for constant in &self.entries {
            constant.write_to(out)?;
        }
        Ok(())
    }

    /// Value of `constant_pool_count`: the number of slots plus one.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len() + 1
    }

    /// Entry at a 1-based index.
    #[must_use]
    pub fn get(&self, index: u16) -> Option<&Constant> {
        usize::from(index)
            .checked_sub(1)
            .and_then(|slot| self.entries.get(slot))
    }

    /// Entry at a 1-based index, for modification.
    pub fn get_mut(&mut self, index: u16) -> Option<&mut Constant> {
        usize::from(index)
            .checked_sub(1)
            .and_then(|slot| self.entries.get_mut(slot))
    }

    /// Text of the Utf8 entry at `index`.
    #[must_use]
    pub fn utf8(&self, index: u16) -> Option<&str> {
        match self.get(index) {
            Some(Constant::Utf8(value)) => Some(value),
            _ => None,
        }
    }

    /// Mutable text of the Utf8 entry at `index`.
    pub fn utf8_mut(&mut self, index: u16) -> Option<&mut String> {
        match self.get_mut(index) {
            Some(Constant::Utf8(value)) => Some(value),
            _ => None,
        }
    }

    /// Utf8 index behind the Class entry at `index`.
    #[must_use]
    pub fn class_name_index(&self, index: u16) -> Option<u16> {
        match self.get(index) {
            Some(Constant::Class(name)) => Some(*name),
            _ => None,
        }
    }

    /// Internal name of the Class entry at `index`.
    #[must_use]
    pub fn class_name(&self, index: u16) -> Option<&str> {
        self.class_name_index(index).and_then(|name| self.utf8(name))
    }

    /// Entries with their 1-based indices, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, constant)| !matches!(constant, Constant::Unusable))
            .map(|(slot, constant)| ((slot + 1) as u16, constant))
    }
}
