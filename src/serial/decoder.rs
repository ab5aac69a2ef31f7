use std::collections::HashMap;

use log::{debug, trace};

use crate::{
    file::parser::Parser,
    serial::{
        node::{
            ArrayElements, ClassData, ClassDesc, FieldDecl, FieldValue, Graph, JavaArray,
            JavaClass, JavaEnum, JavaObject, JavaString, Node, NodeId, Primitive,
        },
        ClassDescFlags, Tag, TypeCode, BASE_HANDLE, MAX_DEPTH, STREAM_MAGIC, STREAM_VERSION,
    },
    Error::{Empty, NotSupported, RecursionLimit},
    Result,
};

/// Decode a Java Object Serialization Stream into a [`Graph`].
///
/// Every top-level content element becomes a root. `TC_RESET` markers are consumed
/// and clear the handle table, as `ObjectInputStream` does.
///
/// # Errors
/// - [`crate::Error::Empty`] for empty input
/// - [`crate::Error::Malformed`] for a bad header, unknown type codes or dangling handles
/// - [`crate::Error::OutOfBounds`] for truncated input
/// - [`crate::Error::NotSupported`] for `TC_EXCEPTION` and non-block externalizable data
/// - [`crate::Error::RecursionLimit`] for nesting deeper than [`crate::serial::MAX_DEPTH`]
pub fn decode(data: &[u8]) -> Result<Graph> {
    if data.is_empty() {
        return Err(Empty);
    }

    let mut decoder = Decoder::new(data);
    decoder.read_header()?;

    while decoder.parser.has_more_data() {
        if decoder.parser.peek_byte()? == Tag::Reset as u8 {
            decoder.parser.advance_by(1)?;
            decoder.reset();
            continue;
        }

        let root = decoder.read_content()?;
        decoder.graph.push_root(root);
    }

    Ok(decoder.graph)
}

struct Decoder<'a> {
    parser: Parser<'a>,
    graph: Graph,
    handles: HashMap<u32, NodeId>,
    next_handle: u32,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Decoder {
            parser: Parser::new(data),
            graph: Graph::new(),
            handles: HashMap::new(),
            next_handle: BASE_HANDLE,
            depth: 0,
        }
    }

    fn read_header(&mut self) -> Result<()> {
        let magic = self.parser.read_be::<u16>()?;
        if magic != STREAM_MAGIC {
            return Err(malformed_error!("Invalid stream magic 0x{:04x}", magic));
        }

        let version = self.parser.read_be::<u16>()?;
        if version != STREAM_VERSION {
            return Err(malformed_error!("Unsupported stream version {}", version));
        }

        Ok(())
    }

    fn reset(&mut self) {
        trace!("TC_RESET at offset {}", self.parser.pos());
        self.handles.clear();
        self.next_handle = BASE_HANDLE;
    }

    /// Reserves a slot and binds the next handle to it, so that content read later
    /// (including self references) resolves to the node being built.
    fn reserve(&mut self) -> (NodeId, u32) {
        let id = self.graph.add(Node::Null);
        let handle = self.next_handle;
        self.handles.insert(handle, id);
        self.next_handle += 1;
        (id, handle)
    }

    fn read_content(&mut self) -> Result<NodeId> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(RecursionLimit(MAX_DEPTH));
        }

        let result = self.read_content_inner();
        self.depth -= 1;
        result
    }

    fn read_content_inner(&mut self) -> Result<NodeId> {
        let offset = self.parser.pos();
        let code = self.parser.read_be::<u8>()?;
        let Some(tag) = Tag::from_repr(code) else {
            return Err(malformed_error!(
                "Unknown type code 0x{:02x} at offset {}",
                code,
                offset
            ));
        };
        trace!("{} at offset {}", tag, offset);

        match tag {
            Tag::Null => Ok(self.graph.add(Node::Null)),
            Tag::Reference => {
                let handle = self.parser.read_be::<u32>()?;
                if !self.handles.contains_key(&handle) {
                    return Err(malformed_error!(
                        "Reference to unknown handle 0x{:x} at offset {}",
                        handle,
                        offset
                    ));
                }
                Ok(self.graph.add(Node::Reference(handle)))
            }
            Tag::ClassDesc => self.read_class_desc(),
            Tag::ProxyClassDesc => self.read_proxy_class_desc(),
            Tag::Object => self.read_object(),
            Tag::String => self.read_string(false),
            Tag::LongString => self.read_string(true),
            Tag::Array => self.read_array(),
            Tag::Class => self.read_class(),
            Tag::Enum => self.read_enum(),
            Tag::BlockData => {
                let len = self.parser.read_be::<u8>()?;
                let data = self.parser.read_bytes(usize::from(len))?;
                Ok(self.graph.add(Node::BlockData(data.to_vec())))
            }
            Tag::BlockDataLong => {
                let len = self.parser.read_be::<u32>()?;
                let data = self.parser.read_bytes(len as usize)?;
                Ok(self.graph.add(Node::BlockData(data.to_vec())))
            }
            Tag::EndBlockData => Ok(self.graph.add(Node::EndBlockData)),
            Tag::Reset => {
                self.reset();
                self.read_content_inner()
            }
            Tag::Exception => Err(NotSupported),
        }
    }

    /// Reads content that must be a class descriptor, `null` or a reference.
    fn read_class_desc_content(&mut self) -> Result<NodeId> {
        let code = self.parser.peek_byte()?;
        match Tag::from_repr(code) {
            Some(Tag::ClassDesc | Tag::ProxyClassDesc | Tag::Null | Tag::Reference) => {
                self.read_content()
            }
            _ => Err(malformed_error!(
                "Expected a class descriptor, found 0x{:02x} at offset {}",
                code,
                self.parser.pos()
            )),
        }
    }

    /// Reads content that must be a string or a reference to one.
    fn read_string_content(&mut self) -> Result<NodeId> {
        let code = self.parser.peek_byte()?;
        match Tag::from_repr(code) {
            Some(Tag::String | Tag::LongString | Tag::Reference) => self.read_content(),
            _ => Err(malformed_error!(
                "Expected a string, found 0x{:02x} at offset {}",
                code,
                self.parser.pos()
            )),
        }
    }

    fn read_annotations(&mut self, allow_eof: bool) -> Result<Vec<NodeId>> {
        let mut contents = Vec::new();
        loop {
            if allow_eof && !self.parser.has_more_data() {
                debug!("Stream ended inside block data, treating as TC_ENDBLOCKDATA");
                break;
            }

            if self.parser.peek_byte()? == Tag::EndBlockData as u8 {
                self.parser.advance_by(1)?;
                break;
            }

            contents.push(self.read_content()?);
        }
        Ok(contents)
    }

    fn read_class_desc(&mut self) -> Result<NodeId> {
        let (_, name) = self.parser.read_utf()?;
        let serial_version = self.parser.read_be::<i64>()?;
        let (id, handle) = self.reserve();
        let flags = ClassDescFlags::from_bits_retain(self.parser.read_be::<u8>()?);

        let count = self.parser.read_be::<u16>()?;
        let mut fields = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let code = self.parser.read_be::<u8>()?;
            let Some(type_code) = TypeCode::from_repr(code) else {
                return Err(malformed_error!(
                    "Invalid field type code 0x{:02x} in {}",
                    code,
                    name
                ));
            };
            let (_, field_name) = self.parser.read_utf()?;
            let class_name = if type_code.is_reference() {
                Some(self.read_string_content()?)
            } else {
                None
            };

            fields.push(FieldDecl {
                type_code,
                name: field_name,
                class_name,
            });
        }

        let annotations = self.read_annotations(false)?;
        let super_class = self.read_class_desc_content()?;

        self.graph.set(
            id,
            Node::ClassDesc(ClassDesc {
                name,
                serial_version,
                flags,
                fields,
                annotations,
                super_class,
                proxy_interfaces: None,
                handle,
            }),
        );
        Ok(id)
    }

    fn read_proxy_class_desc(&mut self) -> Result<NodeId> {
        let (id, handle) = self.reserve();

        let count = self.parser.read_be::<u32>()?;
        let mut interfaces = Vec::with_capacity((count as usize).min(self.parser.remaining()));
        for _ in 0..count {
            interfaces.push(self.parser.read_utf()?.1);
        }

        let annotations = self.read_annotations(false)?;
        let super_class = self.read_class_desc_content()?;

        self.graph.set(
            id,
            Node::ClassDesc(ClassDesc {
                name: String::new(),
                serial_version: 0,
                flags: ClassDescFlags::empty(),
                fields: Vec::new(),
                annotations,
                super_class,
                proxy_interfaces: Some(interfaces),
                handle,
            }),
        );
        Ok(id)
    }

    /// Resolves a descriptor slot (ClassDesc, Reference or Null) to the ClassDesc node.
    fn resolve_desc(&self, id: NodeId) -> Result<Option<NodeId>> {
        match self.graph.get(id) {
            Some(Node::ClassDesc(_)) => Ok(Some(id)),
            Some(Node::Null) => Ok(None),
            Some(Node::Reference(handle)) => match self.handles.get(handle) {
                Some(target) if matches!(self.graph.get(*target), Some(Node::ClassDesc(_))) => {
                    Ok(Some(*target))
                }
                _ => Err(malformed_error!(
                    "Handle 0x{:x} does not refer to a class descriptor",
                    handle
                )),
            },
            _ => Err(malformed_error!("Node {} is not a class descriptor", id)),
        }
    }

    fn desc(&self, id: NodeId) -> Result<&ClassDesc> {
        match self.graph.get(id) {
            Some(Node::ClassDesc(desc)) => Ok(desc),
            _ => Err(malformed_error!("Node {} is not a class descriptor", id)),
        }
    }

    /// Descriptor chain of a class, most-derived first.
    fn desc_chain(&self, class_desc: NodeId) -> Result<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut current = self.resolve_desc(class_desc)?;
        while let Some(id) = current {
            if chain.len() >= MAX_DEPTH {
                return Err(RecursionLimit(MAX_DEPTH));
            }
            chain.push(id);
            current = self.resolve_desc(self.desc(id)?.super_class)?;
        }
        Ok(chain)
    }

    fn read_object(&mut self) -> Result<NodeId> {
        let class_desc = self.read_class_desc_content()?;
        let (id, handle) = self.reserve();

        let chain = self.desc_chain(class_desc)?;
        if chain.is_empty() {
            return Err(malformed_error!("Object {} has a null class descriptor", id));
        }

        let mut class_data = Vec::with_capacity(chain.len());
        for level in chain.iter().rev() {
            let (flags, types) = {
                let desc = self.desc(*level)?;
                let types: Vec<TypeCode> = desc.fields.iter().map(|f| f.type_code).collect();
                (desc.flags, types)
            };

            let mut data = ClassData::default();
            if flags.contains(ClassDescFlags::EXTERNALIZABLE) {
                if !flags.contains(ClassDescFlags::BLOCK_DATA) {
                    return Err(NotSupported);
                }
                data.annotations = Some(self.read_annotations(true)?);
            } else if flags.contains(ClassDescFlags::SERIALIZABLE) {
                for type_code in types {
                    data.values.push(self.read_value(type_code)?);
                }
                if flags.has_annotations() {
                    data.annotations = Some(self.read_annotations(true)?);
                }
            }
            class_data.push(data);
        }

        self.graph.set(
            id,
            Node::Object(JavaObject {
                class_desc,
                class_data,
                handle,
            }),
        );
        Ok(id)
    }

    fn read_array(&mut self) -> Result<NodeId> {
        let class_desc = self.read_class_desc_content()?;
        let Some(desc_id) = self.resolve_desc(class_desc)? else {
            return Err(malformed_error!("Array with a null class descriptor"));
        };
        let element_code = self.desc(desc_id)?.name.as_bytes().get(1).copied();
        let Some(element_type) = element_code.and_then(TypeCode::from_repr) else {
            return Err(malformed_error!(
                "Array class {} has no valid element type",
                self.desc(desc_id)?.name
            ));
        };

        let size = self.parser.read_be::<i32>()?;
        let Ok(size) = usize::try_from(size) else {
            return Err(malformed_error!("Negative array size {}", size));
        };
        let (id, handle) = self.reserve();

        let elements = if element_type == TypeCode::Byte {
            ArrayElements::Bytes(self.parser.read_bytes(size)?.to_vec())
        } else {
            let mut values = Vec::with_capacity(size.min(self.parser.remaining()));
            for _ in 0..size {
                values.push(self.read_value(element_type)?);
            }
            ArrayElements::Values(values)
        };

        self.graph.set(
            id,
            Node::Array(JavaArray {
                class_desc,
                size,
                elements,
                handle,
            }),
        );
        Ok(id)
    }

    fn read_string(&mut self, long: bool) -> Result<NodeId> {
        let (id, handle) = self.reserve();
        let (raw, value) = if long {
            self.parser.read_long_utf()?
        } else {
            self.parser.read_utf()?
        };

        self.graph.set(
            id,
            Node::String(JavaString {
                value,
                raw: raw.to_vec(),
                size: raw.len(),
                long,
                handle,
            }),
        );
        Ok(id)
    }

    fn read_class(&mut self) -> Result<NodeId> {
        let class_desc = self.read_class_desc_content()?;
        let (id, handle) = self.reserve();

        self.graph
            .set(id, Node::Class(JavaClass { class_desc, handle }));
        Ok(id)
    }

    fn read_enum(&mut self) -> Result<NodeId> {
        let class_desc = self.read_class_desc_content()?;
        let (id, handle) = self.reserve();
        let constant = self.read_string_content()?;

        self.graph.set(
            id,
            Node::Enum(JavaEnum {
                class_desc,
                constant,
                handle,
            }),
        );
        Ok(id)
    }

    fn read_value(&mut self, type_code: TypeCode) -> Result<FieldValue> {
        let value = match type_code {
            TypeCode::Byte => Primitive::Byte(self.parser.read_be::<i8>()?),
            TypeCode::Char => Primitive::Char(self.parser.read_be::<u16>()?),
            TypeCode::Double => Primitive::Double(self.parser.read_be::<f64>()?),
            TypeCode::Float => Primitive::Float(self.parser.read_be::<f32>()?),
            TypeCode::Int => Primitive::Int(self.parser.read_be::<i32>()?),
            TypeCode::Long => Primitive::Long(self.parser.read_be::<i64>()?),
            TypeCode::Short => Primitive::Short(self.parser.read_be::<i16>()?),
            TypeCode::Boolean => Primitive::Boolean(self.parser.read_be::<u8>()? != 0),
            TypeCode::Object | TypeCode::Array => {
                let offset = self.parser.pos();
                let id = self.read_content()?;
                if matches!(
                    self.graph.get(id),
                    Some(Node::BlockData(_) | Node::EndBlockData)
                ) {
                    return Err(malformed_error!(
                        "Block data where a field value was expected at offset {}",
                        offset
                    ));
                }
                return Ok(FieldValue::Object(id));
            }
        };
        Ok(FieldValue::Primitive(value))
    }
}
