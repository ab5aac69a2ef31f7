use std::{borrow::Cow, collections::HashMap};

use crate::{
    file::{
        io::push_be,
        mutf8::{self, CharWidth},
    },
    serial::{
        node::{ArrayElements, ClassDesc, FieldValue, Graph, JavaString, Node, NodeId},
        Tag, BASE_HANDLE, MAX_DEPTH, STREAM_MAGIC, STREAM_VERSION,
    },
    Error::RecursionLimit,
    Result,
};

/// Framing of the encoded output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarshalerVariant {
    /// `ObjectOutputStream` layout: magic, version, contents
    #[default]
    Standard,
    /// Contents only, for embedding into a stream that already wrote its header
    Raw,
}

/// Options controlling how a [`Graph`] is written back to bytes.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Number of `TC_RESET` bytes written between the header and the first content.
    /// Readers skip them, so they pad the payload without changing its meaning.
    pub dirty_data_length: usize,
    /// Width used for characters of every UTF field (class names, field names and
    /// string contents).
    pub string_char_width: CharWidth,
    /// Output framing.
    pub variant: MarshalerVariant,
}

/// Encode a [`Graph`] into a Java Object Serialization Stream.
///
/// Handles are renumbered in write order starting at [`crate::serial::BASE_HANDLE`],
/// and every [`Node::Reference`] is rewritten through the old-to-new mapping. A graph
/// whose shape was not changed therefore encodes byte-identically to its source.
///
/// # Errors
/// - [`crate::Error::Malformed`] if a slot points outside the arena, a reference
///   field lacks its type string, or a length does not fit its header
/// - [`crate::Error::RecursionLimit`] for nesting deeper than [`crate::serial::MAX_DEPTH`]
pub fn encode(graph: &Graph, options: &EncodeOptions) -> Result<Vec<u8>> {
    let mut encoder = Encoder {
        graph,
        width: options.string_char_width,
        out: Vec::new(),
        next_handle: BASE_HANDLE,
        remap: HashMap::new(),
        depth: 0,
    };

    if options.variant == MarshalerVariant::Standard {
        push_be(&mut encoder.out, STREAM_MAGIC);
        push_be(&mut encoder.out, STREAM_VERSION);
    }
    encoder
        .out
        .extend(std::iter::repeat(Tag::Reset as u8).take(options.dirty_data_length));

    for root in graph.roots() {
        encoder.write_content(*root)?;
    }

    Ok(encoder.out)
}

struct Encoder<'g> {
    graph: &'g Graph,
    width: CharWidth,
    out: Vec<u8>,
    next_handle: u32,
    remap: HashMap<u32, u32>,
    depth: usize,
}

impl Encoder<'_> {
    fn assign(&mut self, old: u32) {
        self.remap.insert(old, self.next_handle);
        self.next_handle += 1;
    }

    fn tag(&mut self, tag: Tag) {
        self.out.push(tag as u8);
    }

    fn write_utf(&mut self, value: &str) -> Result<()> {
        let encoded = mutf8::encode(value, self.width);
        let Ok(len) = u16::try_from(encoded.len()) else {
            return Err(malformed_error!(
                "UTF value of {} bytes does not fit a u16 length",
                encoded.len()
            ));
        };
        push_be(&mut self.out, len);
        self.out.extend_from_slice(&encoded);
        Ok(())
    }

    fn write_content(&mut self, id: NodeId) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(RecursionLimit(MAX_DEPTH));
        }

        let result = self.write_node(id);
        self.depth -= 1;
        result
    }

    fn write_node(&mut self, id: NodeId) -> Result<()> {
        let graph = self.graph;
        let Some(node) = graph.get(id) else {
            return Err(malformed_error!("Node {} is not part of the graph", id));
        };

        match node {
            Node::Null => self.tag(Tag::Null),
            Node::Reference(handle) => {
                self.tag(Tag::Reference);
                let handle = self.remap.get(handle).copied().unwrap_or(*handle);
                push_be(&mut self.out, handle);
            }
            Node::ClassDesc(desc) => self.write_class_desc(desc)?,
            Node::Object(object) => {
                self.tag(Tag::Object);
                self.write_content(object.class_desc)?;
                self.assign(object.handle);

                for data in &object.class_data {
                    for value in &data.values {
                        self.write_value(value)?;
                    }
                    if let Some(annotations) = &data.annotations {
                        for annotation in annotations {
                            self.write_content(*annotation)?;
                        }
                        self.tag(Tag::EndBlockData);
                    }
                }
            }
            Node::Array(array) => {
                self.tag(Tag::Array);
                self.write_content(array.class_desc)?;

                let len = match &array.elements {
                    ArrayElements::Bytes(bytes) => bytes.len(),
                    ArrayElements::Values(values) => values.len(),
                };
                let Ok(len) = i32::try_from(len) else {
                    return Err(malformed_error!("Array of {} elements is too large", len));
                };
                push_be(&mut self.out, len);
                self.assign(array.handle);

                match &array.elements {
                    ArrayElements::Bytes(bytes) => self.out.extend_from_slice(bytes),
                    ArrayElements::Values(values) => {
                        for value in values {
                            self.write_value(value)?;
                        }
                    }
                }
            }
            Node::String(string) => self.write_string(string),
            Node::Class(class) => {
                self.tag(Tag::Class);
                self.write_content(class.class_desc)?;
                self.assign(class.handle);
            }
            Node::Enum(constant) => {
                self.tag(Tag::Enum);
                self.write_content(constant.class_desc)?;
                self.assign(constant.handle);
                self.write_content(constant.constant)?;
            }
            Node::BlockData(data) => {
                if let Ok(len) = u8::try_from(data.len()) {
                    self.tag(Tag::BlockData);
                    self.out.push(len);
                } else {
                    let Ok(len) = u32::try_from(data.len()) else {
                        return Err(malformed_error!("Block data of {} bytes is too large", data.len()));
                    };
                    self.tag(Tag::BlockDataLong);
                    push_be(&mut self.out, len);
                }
                self.out.extend_from_slice(data);
            }
            Node::EndBlockData => self.tag(Tag::EndBlockData),
        }

        Ok(())
    }

    fn write_value(&mut self, value: &FieldValue) -> Result<()> {
        match value {
            FieldValue::Primitive(primitive) => {
                primitive.write_to(&mut self.out);
                Ok(())
            }
            FieldValue::Object(id) => self.write_content(*id),
        }
    }

    fn write_string(&mut self, string: &JavaString) {
        self.assign(string.handle);

        let encoded: Cow<'_, [u8]> = match self.width {
            CharWidth::One => Cow::Borrowed(string.raw.as_slice()),
            width => Cow::Owned(mutf8::encode(&string.value, width)),
        };

        match u16::try_from(encoded.len()) {
            Ok(len) if !string.long => {
                self.tag(Tag::String);
                push_be(&mut self.out, len);
            }
            _ => {
                self.tag(Tag::LongString);
                push_be(&mut self.out, encoded.len() as u64);
            }
        }
        self.out.extend_from_slice(&encoded);
    }

    fn write_class_desc(&mut self, desc: &ClassDesc) -> Result<()> {
        if let Some(interfaces) = &desc.proxy_interfaces {
            self.tag(Tag::ProxyClassDesc);
            self.assign(desc.handle);

            let Ok(count) = u32::try_from(interfaces.len()) else {
                return Err(malformed_error!("Too many proxy interfaces"));
            };
            push_be(&mut self.out, count);
            for interface in interfaces {
                self.write_utf(interface)?;
            }
        } else {
            self.tag(Tag::ClassDesc);
            self.write_utf(&desc.name)?;
            push_be(&mut self.out, desc.serial_version);
            self.assign(desc.handle);
            self.out.push(desc.flags.bits());

            let Ok(count) = u16::try_from(desc.fields.len()) else {
                return Err(malformed_error!("Too many fields in {}", desc.name));
            };
            push_be(&mut self.out, count);
            for field in &desc.fields {
                self.out.push(field.type_code.as_byte());
                self.write_utf(&field.name)?;
                if field.type_code.is_reference() {
                    let Some(class_name) = field.class_name else {
                        return Err(malformed_error!(
                            "Field {}.{} has no type string",
                            desc.name,
                            field.name
                        ));
                    };
                    self.write_content(class_name)?;
                }
            }
        }

        for annotation in &desc.annotations {
            self.write_content(*annotation)?;
        }
        self.tag(Tag::EndBlockData);

        self.write_content(desc.super_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        serial::{decode, node::JavaArray, ClassDescFlags},
        test::streams::{self, Stream},
    };

    #[test]
    fn roundtrip_is_byte_identical() {
        for data in [
            streams::two_strings_and_reference(),
            streams::derived_object(),
            streams::byte_array(&[0xCA, 0xFE]),
            streams::holder(),
        ] {
            let graph = decode(&data).unwrap();
            let encoded = encode(&graph, &EncodeOptions::default()).unwrap();
            assert_eq!(encoded, data);
        }
    }

    #[test]
    fn raw_variant_and_dirty_data() {
        let graph = decode(&streams::two_strings_and_reference()).unwrap();

        let options = EncodeOptions {
            variant: MarshalerVariant::Raw,
            ..Default::default()
        };
        let raw = encode(&graph, &options).unwrap();
        assert_eq!(raw[0], 0x74);

        let options = EncodeOptions {
            dirty_data_length: 3,
            ..Default::default()
        };
        let dirty = encode(&graph, &options).unwrap();
        assert_eq!(&dirty[..7], &[0xAC, 0xED, 0x00, 0x05, 0x79, 0x79, 0x79]);

        let reread = decode(&dirty).unwrap();
        assert_eq!(reread.roots().len(), 3);
    }

    #[test]
    fn overlong_strings_decode_to_same_value() {
        let graph = decode(&streams::derived_object()).unwrap();
        let options = EncodeOptions {
            string_char_width: CharWidth::Three,
            ..Default::default()
        };
        let encoded = encode(&graph, &options).unwrap();
        assert!(!encoded
            .windows(b"com.example".len())
            .any(|w| w == b"com.example"));

        let reread = decode(&encoded).unwrap();
        let Some(Node::Object(object)) = reread.get(reread.roots()[0]) else {
            panic!("expected an object");
        };
        let Some(Node::ClassDesc(desc)) = reread.get(object.class_desc) else {
            panic!("expected a descriptor");
        };
        assert_eq!(desc.name, "com.example.Derived");
    }

    #[test]
    fn handles_are_renumbered() {
        // Keep only the second string and a reference to it: the string takes the
        // first handle and the reference follows it.
        let source = decode(&streams::two_strings_and_reference()).unwrap();
        let Some(Node::String(world)) = source.get(source.roots()[1]).cloned() else {
            panic!("expected a string");
        };
        let mut graph = Graph::new();
        graph.add_root(Node::String(world));
        graph.add_root(Node::Reference(BASE_HANDLE + 1));

        let encoded = encode(&graph, &EncodeOptions::default()).unwrap();
        let expected = Stream::new().string("world").reference(0).build();
        assert_eq!(encoded, expected);
    }

    #[test]
    fn long_strings_switch_tag() {
        let mut graph = Graph::new();
        graph.add_root(Node::String(JavaString::new("x".repeat(0x1_0000), BASE_HANDLE)));

        let encoded = encode(&graph, &EncodeOptions::default()).unwrap();
        assert_eq!(encoded[4], Tag::LongString as u8);
        assert_eq!(&encoded[5..13], &0x1_0000u64.to_be_bytes());
    }

    #[test]
    fn value_encoded_byte_arrays() {
        let mut graph = Graph::new();
        let super_class = graph.add(Node::Null);
        let desc = graph.add(Node::ClassDesc(ClassDesc {
            name: "[B".to_string(),
            serial_version: -5_984_413_125_914_226_656,
            flags: ClassDescFlags::SERIALIZABLE,
            fields: Vec::new(),
            annotations: Vec::new(),
            super_class,
            proxy_interfaces: None,
            handle: BASE_HANDLE,
        }));
        let mut array = JavaArray {
            class_desc: desc,
            size: 0,
            elements: ArrayElements::Values(Vec::new()),
            handle: BASE_HANDLE + 1,
        };
        array.set_bytes(&[1, 2, 3]);
        graph.add_root(Node::Array(array));

        let encoded = encode(&graph, &EncodeOptions::default()).unwrap();
        assert_eq!(encoded, streams::byte_array(&[1, 2, 3]));
    }

    #[test]
    fn dangling_node_is_an_error() {
        let mut other = Graph::new();
        for _ in 0..4 {
            other.add(Node::Null);
        }
        let foreign = other.add(Node::Null);

        let mut graph = Graph::new();
        graph.add_root(Node::Class(crate::serial::JavaClass {
            class_desc: foreign,
            handle: BASE_HANDLE,
        }));
        assert!(encode(&graph, &EncodeOptions::default()).is_err());
    }
}
