use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    file::{io::push_be, mutf8},
    serial::{ClassDescFlags, Tag, TypeCode},
    Result,
};

/// Index of a node inside a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A primitive field or array element value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// `byte`
    Byte(i8),
    /// `char` (one UTF-16 unit)
    Char(u16),
    /// `double`
    Double(f64),
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `short`
    Short(i16),
    /// `boolean`
    Boolean(bool),
}

impl Primitive {
    /// Type code of this value.
    #[must_use]
    pub fn type_code(&self) -> TypeCode {
        match self {
            Primitive::Byte(_) => TypeCode::Byte,
            Primitive::Char(_) => TypeCode::Char,
            Primitive::Double(_) => TypeCode::Double,
            Primitive::Float(_) => TypeCode::Float,
            Primitive::Int(_) => TypeCode::Int,
            Primitive::Long(_) => TypeCode::Long,
            Primitive::Short(_) => TypeCode::Short,
            Primitive::Boolean(_) => TypeCode::Boolean,
        }
    }

    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Primitive::Byte(v) => push_be(out, v),
            Primitive::Char(v) => push_be(out, v),
            Primitive::Double(v) => push_be(out, v),
            Primitive::Float(v) => push_be(out, v),
            Primitive::Int(v) => push_be(out, v),
            Primitive::Long(v) => push_be(out, v),
            Primitive::Short(v) => push_be(out, v),
            Primitive::Boolean(v) => out.push(u8::from(v)),
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Byte(v) => write!(f, "{v}"),
            Primitive::Char(v) => match char::from_u32(u32::from(*v)) {
                Some(c) => write!(f, "{c:?}"),
                None => write!(f, "'\\u{v:04x}'"),
            },
            Primitive::Double(v) => write!(f, "{v:?}"),
            Primitive::Float(v) => write!(f, "{v:?}f"),
            Primitive::Int(v) => write!(f, "{v}"),
            Primitive::Long(v) => write!(f, "{v}L"),
            Primitive::Short(v) => write!(f, "{v}"),
            Primitive::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// Value stored in a field slot or array element slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Inline primitive
    Primitive(Primitive),
    /// Nested content node (object, array, string, class, enum, null or reference)
    Object(NodeId),
}

/// One field declaration of a class descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Declared type
    pub type_code: TypeCode,
    /// Field name
    pub name: String,
    /// JVM type string (`Ljava/lang/String;`, `[B`, ...) of reference fields, stored
    /// as a String node or a Reference to one
    pub class_name: Option<NodeId>,
}

/// A class descriptor (`TC_CLASSDESC` or `TC_PROXYCLASSDESC`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDesc {
    /// Binary class name, empty for proxy descriptors
    pub name: String,
    /// `serialVersionUID`
    pub serial_version: i64,
    /// `SC_*` flags
    pub flags: ClassDescFlags,
    /// Field declarations of this level only
    pub fields: Vec<FieldDecl>,
    /// Class annotation contents written by `annotateClass`
    pub annotations: Vec<NodeId>,
    /// Super class descriptor: a ClassDesc, a Reference to one, or Null
    pub super_class: NodeId,
    /// Interface names of a dynamic proxy descriptor
    pub proxy_interfaces: Option<Vec<String>>,
    /// Handle assigned at decode time
    pub handle: u32,
}

impl ClassDesc {
    /// True for `TC_PROXYCLASSDESC` descriptors.
    #[must_use]
    pub fn is_proxy(&self) -> bool {
        self.proxy_interfaces.is_some()
    }

    /// Class name without its package.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }
}

pub(crate) fn simple_name(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Field values and annotations written for one level of an object's hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassData {
    /// Values in the order of this level's field declarations
    pub values: Vec<FieldValue>,
    /// Contents written by a custom `writeObject` / `writeExternal`, present exactly
    /// when the level's flags call for a `TC_ENDBLOCKDATA` terminated section
    pub annotations: Option<Vec<NodeId>>,
}

/// An object instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaObject {
    /// ClassDesc or Reference to one
    pub class_desc: NodeId,
    /// One entry per hierarchy level, root super class first
    pub class_data: Vec<ClassData>,
    /// Handle assigned at decode time
    pub handle: u32,
}

/// Array content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayElements {
    /// Element-valued encoding
    Values(Vec<FieldValue>),
    /// Raw content of a `byte[]`
    Bytes(Vec<u8>),
}

/// An array instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaArray {
    /// ClassDesc (named like `[B`) or Reference to one
    pub class_desc: NodeId,
    /// Element count
    #[serde(default)]
    pub size: usize,
    /// Elements
    pub elements: ArrayElements,
    /// Handle assigned at decode time
    pub handle: u32,
}

impl JavaArray {
    /// Byte content of a `byte[]`, whichever encoding it uses. `None` when any
    /// element is not a byte.
    #[must_use]
    pub fn bytes(&self) -> Option<Vec<u8>> {
        match &self.elements {
            ArrayElements::Bytes(bytes) => Some(bytes.clone()),
            ArrayElements::Values(values) => values
                .iter()
                .map(|value| match value {
                    FieldValue::Primitive(Primitive::Byte(b)) => Some(*b as u8),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Replace the content of a `byte[]`, keeping the encoding and `size` in step.
    pub fn set_bytes(&mut self, bytes: &[u8]) {
        self.elements = match self.elements {
            ArrayElements::Bytes(_) => ArrayElements::Bytes(bytes.to_vec()),
            ArrayElements::Values(_) => ArrayElements::Values(
                bytes
                    .iter()
                    .map(|b| FieldValue::Primitive(Primitive::Byte(*b as i8)))
                    .collect(),
            ),
        };
        self.size = bytes.len();
    }
}

/// A string constant.
///
/// `raw` holds the modified UTF-8 bytes written to the stream, `value` the decoded
/// text and `size` the byte length. [`JavaString::set_value`] keeps all three in step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaString {
    /// Decoded text
    pub value: String,
    /// Wire bytes
    #[serde(default)]
    pub raw: Vec<u8>,
    /// Length of `raw`
    #[serde(default)]
    pub size: usize,
    /// Written as `TC_LONGSTRING`
    #[serde(default)]
    pub long: bool,
    /// Handle assigned at decode time
    pub handle: u32,
}

impl JavaString {
    /// Create a string node value.
    #[must_use]
    pub fn new(value: impl Into<String>, handle: u32) -> JavaString {
        let mut string = JavaString {
            value: String::new(),
            raw: Vec::new(),
            size: 0,
            long: false,
            handle,
        };
        string.set_value(value);
        string
    }

    /// Replace the text, re-encoding `raw` and updating `size`.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.raw = mutf8::encode(&self.value, mutf8::CharWidth::One);
        self.size = self.raw.len();
    }

    /// Re-encode `raw` if it no longer decodes to `value`, and fix `size`.
    fn resync(&mut self) {
        if mutf8::decode_lossy(&self.raw) == self.value {
            self.size = self.raw.len();
        } else {
            let value = std::mem::take(&mut self.value);
            self.set_value(value);
        }
    }
}

/// A `java.lang.Class` instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaClass {
    /// ClassDesc or Reference to one
    pub class_desc: NodeId,
    /// Handle assigned at decode time
    pub handle: u32,
}

/// An enum constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JavaEnum {
    /// ClassDesc of the enum type or Reference to one
    pub class_desc: NodeId,
    /// String node (or Reference) holding the constant name
    pub constant: NodeId,
    /// Handle assigned at decode time
    pub handle: u32,
}

/// One node of a serialized object graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Object instance
    Object(JavaObject),
    /// Array instance
    Array(JavaArray),
    /// String constant
    String(JavaString),
    /// Class descriptor
    ClassDesc(ClassDesc),
    /// `java.lang.Class` instance
    Class(JavaClass),
    /// Enum constant
    Enum(JavaEnum),
    /// Back-reference to the node holding this handle
    Reference(u32),
    /// `null`
    Null,
    /// Opaque block data
    BlockData(Vec<u8>),
    /// Explicit end-of-block-data marker at the top level
    EndBlockData,
}

fn linked(value: &FieldValue) -> Option<NodeId> {
    match value {
        FieldValue::Object(id) => Some(*id),
        FieldValue::Primitive(_) => None,
    }
}

impl Node {
    /// Slots this node points at.
    pub(crate) fn links(&self) -> Vec<NodeId> {
        match self {
            Node::Object(object) => {
                let mut links = vec![object.class_desc];
                for level in &object.class_data {
                    links.extend(level.values.iter().filter_map(linked));
                    links.extend(level.annotations.iter().flatten().copied());
                }
                links
            }
            Node::Array(array) => {
                let mut links = vec![array.class_desc];
                if let ArrayElements::Values(values) = &array.elements {
                    links.extend(values.iter().filter_map(linked));
                }
                links
            }
            Node::ClassDesc(desc) => {
                let mut links: Vec<NodeId> =
                    desc.fields.iter().filter_map(|field| field.class_name).collect();
                links.extend(desc.annotations.iter().copied());
                links.push(desc.super_class);
                links
            }
            Node::Class(class) => vec![class.class_desc],
            Node::Enum(constant) => vec![constant.class_desc, constant.constant],
            Node::String(_)
            | Node::Reference(_)
            | Node::Null
            | Node::BlockData(_)
            | Node::EndBlockData => Vec::new(),
        }
    }

    /// Handle owned by this node, if it is handle-bearing.
    #[must_use]
    pub fn handle(&self) -> Option<u32> {
        match self {
            Node::Object(object) => Some(object.handle),
            Node::Array(array) => Some(array.handle),
            Node::String(string) => Some(string.handle),
            Node::ClassDesc(desc) => Some(desc.handle),
            Node::Class(class) => Some(class.handle),
            Node::Enum(constant) => Some(constant.handle),
            Node::Reference(_) | Node::Null | Node::BlockData(_) | Node::EndBlockData => None,
        }
    }

    /// Stream tag this node is written with.
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Node::Object(_) => Tag::Object,
            Node::Array(_) => Tag::Array,
            Node::String(string) if string.long => Tag::LongString,
            Node::String(_) => Tag::String,
            Node::ClassDesc(desc) if desc.is_proxy() => Tag::ProxyClassDesc,
            Node::ClassDesc(_) => Tag::ClassDesc,
            Node::Class(_) => Tag::Class,
            Node::Enum(_) => Tag::Enum,
            Node::Reference(_) => Tag::Reference,
            Node::Null => Tag::Null,
            Node::BlockData(data) if data.len() > 0xFF => Tag::BlockDataLong,
            Node::BlockData(_) => Tag::BlockData,
            Node::EndBlockData => Tag::EndBlockData,
        }
    }
}

/// An arena holding every node of one serialization stream.
///
/// Nodes are addressed by [`NodeId`]. Each node sits in exactly one owning slot (a
/// root, a field value, an array element, an annotation or a descriptor link), and
/// repeated occurrences in the stream are [`Node::Reference`] leaves. Replacing a
/// node's slot content is therefore visible through every reference to its handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Graph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Add a node to the arena without attaching it anywhere.
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Add a node and append it to the top-level contents.
    pub fn add_root(&mut self, node: Node) -> NodeId {
        let id = self.add(node);
        self.roots.push(id);
        id
    }

    pub(crate) fn push_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }

    /// Top-level contents in stream order.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Look up a node for modification.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Swap the content of a slot, returning the previous node.
    pub fn set(&mut self, id: NodeId, node: Node) -> Option<Node> {
        self.nodes
            .get_mut(id.index())
            .map(|slot| std::mem::replace(slot, node))
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reject roots and links outside the arena, then bring string and array lengths
    /// back in step with their content.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] naming the first slot outside the arena.
    pub(crate) fn normalize(&mut self) -> Result<()> {
        let len = self.nodes.len();
        let outside = self
            .roots
            .iter()
            .copied()
            .chain(self.nodes.iter().flat_map(Node::links))
            .find(|id| id.index() >= len);
        if let Some(id) = outside {
            return Err(malformed_error!("Slot {} is outside a graph of {} nodes", id, len));
        }

        for node in &mut self.nodes {
            match node {
                Node::String(string) => string.resync(),
                Node::Array(array) => {
                    array.size = match &array.elements {
                        ArrayElements::Values(values) => values.len(),
                        ArrayElements::Bytes(bytes) => bytes.len(),
                    };
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Iterate over all nodes in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (NodeId(index as u32), node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_setters_keep_lengths() {
        let mut string = JavaString::new("whoami", 0x7E0001);
        assert_eq!(string.size, 6);
        assert_eq!(string.raw, b"whoami");

        string.set_value("a\0b");
        assert_eq!(string.raw, [0x61, 0xC0, 0x80, 0x62]);
        assert_eq!(string.size, string.raw.len());
    }

    #[test]
    fn array_bytes_both_encodings() {
        let mut raw = JavaArray {
            class_desc: NodeId(0),
            size: 2,
            elements: ArrayElements::Bytes(vec![1, 2]),
            handle: 0,
        };
        raw.set_bytes(&[9, 8, 7]);
        assert_eq!(raw.size, 3);
        assert_eq!(raw.bytes(), Some(vec![9, 8, 7]));

        let mut values = JavaArray {
            class_desc: NodeId(0),
            size: 0,
            elements: ArrayElements::Values(Vec::new()),
            handle: 0,
        };
        values.set_bytes(&[0xFF]);
        assert_eq!(
            values.elements,
            ArrayElements::Values(vec![FieldValue::Primitive(Primitive::Byte(-1))])
        );
        assert_eq!(values.bytes(), Some(vec![0xFF]));

        values.elements = ArrayElements::Values(vec![FieldValue::Primitive(Primitive::Int(1))]);
        assert_eq!(values.bytes(), None);
    }

    #[test]
    fn graph_slots() {
        let mut graph = Graph::new();
        let null = graph.add_root(Node::Null);
        let string = graph.add(Node::String(JavaString::new("x", 0x7E0000)));

        assert_eq!(graph.roots(), &[null]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(string).and_then(Node::handle), Some(0x7E0000));

        let old = graph.set(null, Node::Reference(0x7E0000));
        assert_eq!(old, Some(Node::Null));
        assert_eq!(graph.get(null).map(Node::tag), Some(Tag::Reference));
        assert!(graph.set(NodeId(99), Node::Null).is_none());
    }

    #[test]
    fn primitive_display() {
        assert_eq!(Primitive::Boolean(true).to_string(), "true");
        assert_eq!(Primitive::Char(u16::from(b'a')).to_string(), "'a'");
        assert_eq!(Primitive::Long(12).to_string(), "12L");
        assert_eq!(Primitive::Float(0.75).to_string(), "0.75f");
        assert_eq!(Primitive::Double(1.0).to_string(), "1.0");
    }

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("java.util.HashMap"), "HashMap");
        assert_eq!(simple_name("Foo"), "Foo");
    }
}
