//! Stream-order traversal of a [`Graph`] with an edit hook.
//!
//! [`walk`] visits every physical node once, in the order it appears in the stream,
//! and keeps a handle table local to the call for resolving descriptor references
//! and inherited field declarations. The caller's closure returns an [`Edit`] which
//! the walker applies to the slot that owns the visited item. References are leaves:
//! they are resolved for display but never descended into, so the walk terminates on
//! any graph the decoder can produce.
//!
//! Nodes that cannot be interpreted (dangling references, a descriptor slot holding
//! something else) are logged and left unexpanded; the walk continues with their
//! siblings.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::serial::{
    node::{ArrayElements, ClassDesc, FieldValue, Graph, Node, NodeId, Primitive},
    MAX_DEPTH,
};

/// An item handed to the visit closure.
#[derive(Debug)]
pub enum Visited<'a> {
    /// A node: Object, Array, String, Class or Enum
    Node {
        /// Slot of the node
        id: NodeId,
        /// Current content of the slot
        node: &'a Node,
    },
    /// A primitive field value of an object
    Field {
        /// Declared field name
        name: &'a str,
        /// Current value
        value: Primitive,
    },
    /// A primitive element of an array
    Element {
        /// Element index
        index: usize,
        /// Current value
        value: Primitive,
    },
}

/// What the walker does with the visited item's slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Leave the slot unchanged
    Keep,
    /// Swap the visited node's slot for a new node. The new node is not visited.
    Replace(Node),
    /// Store a new value in a visited field or element slot
    Value(Primitive),
    /// Replace the resolved descriptor passed to the closure. Every node referring
    /// to that descriptor observes the change.
    Descriptor(ClassDesc),
}

/// Kind of a [`DumpNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpKind {
    /// Object instance with declared fields
    Object,
    /// Array with elements or byte content
    Array,
    /// String constant
    String,
    /// `java.lang.Class` constant
    Class,
    /// Enum constant
    Enum,
    /// Primitive field or element
    Primitive,
    /// Back-reference
    Reference,
    /// `null`
    Null,
    /// Block data or end marker
    BlockData,
    /// Class descriptor at content position
    ClassDesc,
    /// Node that could not be interpreted
    Unresolved,
}

/// Display value of a [`DumpNode`].
#[derive(Debug, Clone, PartialEq)]
pub enum DumpValue {
    /// No inline value
    None,
    /// String content or enum constant name
    Text(String),
    /// Primitive value
    Primitive(Primitive),
    /// Byte content
    Bytes(Vec<u8>),
    /// Display name of the node a reference points to
    Label(String),
}

/// One node of the structural mirror built during a walk.
#[derive(Debug, Clone, PartialEq)]
pub struct DumpNode {
    /// Display name (field name, `root`, or element path)
    pub name: String,
    /// Binary class name, or the primitive type name
    pub class_name: String,
    /// Node kind
    pub kind: DumpKind,
    /// Inline value
    pub value: DumpValue,
    /// Declared fields of an object, root super class first
    pub fields: Vec<DumpNode>,
    /// Elements of an array
    pub elements: Vec<DumpNode>,
    /// Contents written by `writeObject` / `writeExternal`
    pub block_data: Vec<DumpNode>,
}

impl DumpNode {
    fn new(name: String, class_name: String, kind: DumpKind, value: DumpValue) -> DumpNode {
        DumpNode {
            name,
            class_name,
            kind,
            value,
            fields: Vec::new(),
            elements: Vec::new(),
            block_data: Vec::new(),
        }
    }

    fn leaf(name: String, kind: DumpKind, value: DumpValue) -> DumpNode {
        DumpNode::new(name, String::new(), kind, value)
    }

    fn primitive(name: String, value: Primitive) -> DumpNode {
        DumpNode::new(
            name,
            value.type_code().to_string(),
            DumpKind::Primitive,
            DumpValue::Primitive(value),
        )
    }
}

/// Structural mirror of a walked graph, one entry per root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DumpTree {
    /// Top-level contents
    pub roots: Vec<DumpNode>,
}

/// Walk `graph` in stream order, calling `visit` for every Object, Array, String,
/// Class and Enum node and every primitive field or array element.
///
/// The closure receives the resolved class descriptor where one applies: the
/// object's, array's, class constant's or enum's own descriptor for node visits, and
/// the owning object's or array's descriptor for field and element visits.
///
/// Objects are visited before their class data. Within an object, field values come
/// level by level from the root super class down, each level followed by its
/// annotations. Arrays are visited once as a whole, then element by element.
/// Descriptors only populate the handle table; they are not visited themselves, but
/// the contents of their `annotateClass` sections are. The name String of an Enum
/// constant is part of the constant and is not visited on its own.
///
/// # Examples
///
/// ```rust,ignore
/// use jgadget::serial::{self, Edit, Node, Visited};
///
/// let mut strings = 0;
/// serial::walk(&mut graph, |_, item| {
///     if let Visited::Node { node: Node::String(_), .. } = item {
///         strings += 1;
///     }
///     Edit::Keep
/// });
/// ```
pub fn walk<F>(graph: &mut Graph, visit: F) -> DumpTree
where
    F: FnMut(Option<&ClassDesc>, Visited<'_>) -> Edit,
{
    let roots = graph.roots().to_vec();
    let mut walker = Walker {
        graph,
        visit,
        handles: HashMap::new(),
        labels: HashMap::new(),
        descs: HashSet::new(),
        depth: 0,
    };

    let mut tree = DumpTree::default();
    for (index, root) in roots.into_iter().enumerate() {
        let name = if index == 0 {
            "root".to_string()
        } else {
            format!("root{index}")
        };
        tree.roots.push(walker.walk_content(root, name));
    }
    tree
}

struct Walker<'g, F> {
    graph: &'g mut Graph,
    visit: F,
    handles: HashMap<u32, NodeId>,
    labels: HashMap<u32, String>,
    descs: HashSet<NodeId>,
    depth: usize,
}

impl<F> Walker<'_, F>
where
    F: FnMut(Option<&ClassDesc>, Visited<'_>) -> Edit,
{
    fn register(&mut self, handle: u32, id: NodeId, name: &str) {
        self.handles.insert(handle, id);
        self.labels
            .entry(handle)
            .or_insert_with(|| name.to_string());
    }

    fn desc(&self, id: NodeId) -> Option<&ClassDesc> {
        match self.graph.get(id) {
            Some(Node::ClassDesc(desc)) => Some(desc),
            _ => None,
        }
    }

    fn resolve_desc(&self, id: NodeId) -> Option<NodeId> {
        match self.graph.get(id) {
            Some(Node::ClassDesc(_)) => Some(id),
            Some(Node::Reference(handle)) => self
                .handles
                .get(handle)
                .copied()
                .filter(|target| self.desc(*target).is_some()),
            _ => None,
        }
    }

    fn class_name(&self, desc_id: Option<NodeId>) -> String {
        desc_id
            .and_then(|id| self.desc(id))
            .map(|desc| desc.name.clone())
            .unwrap_or_default()
    }

    /// Registers a descriptor (and its super chain) the first time its slot is met.
    fn register_desc(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(id) = current.take() {
            if !self.descs.insert(id) {
                return;
            }
            let Some(desc) = self.desc(id) else {
                return;
            };

            let handle = desc.handle;
            let name = desc.name.clone();
            let type_names: Vec<NodeId> = desc.fields.iter().filter_map(|f| f.class_name).collect();
            let annotations = desc.annotations.clone();
            let super_class = desc.super_class;

            self.register(handle, id, &name);
            for type_name in type_names {
                if let Some(Node::String(string)) = self.graph.get(type_name) {
                    let (handle, value) = (string.handle, string.value.clone());
                    self.register(handle, type_name, &value);
                }
            }
            for (index, annotation) in annotations.into_iter().enumerate() {
                self.walk_content(annotation, format!("{name}@{index}"));
            }
            current = Some(super_class);
        }
    }

    /// Flattened field names of a class, root super class first.
    fn field_names(&self, desc_id: NodeId) -> Vec<String> {
        let mut levels = Vec::new();
        let mut current = Some(desc_id);
        while let Some(id) = current {
            if levels.len() >= MAX_DEPTH {
                break;
            }
            let Some(desc) = self.desc(id) else {
                break;
            };
            levels.push(desc.fields.iter().map(|f| f.name.clone()).collect::<Vec<_>>());
            current = self.resolve_desc(desc.super_class);
        }
        levels.into_iter().rev().flatten().collect()
    }

    fn visit_node(&mut self, id: NodeId, desc_id: Option<NodeId>) {
        let graph = &*self.graph;
        let Some(node) = graph.get(id) else {
            return;
        };
        let desc = desc_id.and_then(|d| match graph.get(d) {
            Some(Node::ClassDesc(desc)) => Some(desc),
            _ => None,
        });

        match (self.visit)(desc, Visited::Node { id, node }) {
            Edit::Keep => {}
            Edit::Replace(replacement) => {
                self.graph.set(id, replacement);
            }
            Edit::Descriptor(replacement) => match desc_id {
                Some(desc_id) => {
                    self.graph.set(desc_id, Node::ClassDesc(replacement));
                }
                None => debug!("Descriptor edit on {} without a descriptor ignored", id),
            },
            Edit::Value(_) => debug!("Value edit on node {} ignored", id),
        }
    }

    fn visit_primitive(&mut self, desc_id: Option<NodeId>, item: Visited<'_>) -> Option<Primitive> {
        let graph = &*self.graph;
        let desc = desc_id.and_then(|d| match graph.get(d) {
            Some(Node::ClassDesc(desc)) => Some(desc),
            _ => None,
        });

        match (self.visit)(desc, item) {
            Edit::Keep => None,
            Edit::Value(value) => Some(value),
            other => {
                debug!("Edit {:?} on a primitive slot ignored", other);
                None
            }
        }
    }

    fn walk_content(&mut self, id: NodeId, name: String) -> DumpNode {
        if self.depth >= MAX_DEPTH {
            warn!("Walk depth limit {} reached at {}, not expanding", MAX_DEPTH, id);
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        }

        self.depth += 1;
        let node = self.walk_node(id, name);
        self.depth -= 1;
        node
    }

    fn walk_node(&mut self, id: NodeId, name: String) -> DumpNode {
        let Some(node) = self.graph.get(id) else {
            debug!("Slot {} is outside the graph, skipping", id);
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        };

        match node {
            Node::Null => DumpNode::leaf(name, DumpKind::Null, DumpValue::None),
            Node::Reference(handle) => {
                let label = match self.labels.get(handle) {
                    Some(label) => label.clone(),
                    None => {
                        debug!("Reference to unseen handle 0x{:x} at {}", handle, id);
                        format!("0x{handle:x}")
                    }
                };
                DumpNode::leaf(name, DumpKind::Reference, DumpValue::Label(label))
            }
            Node::BlockData(data) => {
                DumpNode::leaf(name, DumpKind::BlockData, DumpValue::Bytes(data.clone()))
            }
            Node::EndBlockData => DumpNode::leaf(name, DumpKind::BlockData, DumpValue::None),
            Node::ClassDesc(_) => {
                self.register_desc(id);
                DumpNode::leaf(name, DumpKind::ClassDesc, DumpValue::None)
            }
            Node::String(_) => self.walk_string(id, name),
            Node::Object(_) => self.walk_object(id, name),
            Node::Array(_) => self.walk_array(id, name),
            Node::Class(_) => self.walk_class(id, name),
            Node::Enum(_) => self.walk_enum(id, name),
        }
    }

    /// Dump entry for a slot whose content was swapped by the visit closure.
    fn replaced(&self, id: NodeId, name: String) -> DumpNode {
        match self.graph.get(id) {
            Some(Node::String(string)) => DumpNode::new(
                name,
                "java.lang.String".to_string(),
                DumpKind::String,
                DumpValue::Text(string.value.clone()),
            ),
            Some(Node::Null) => DumpNode::leaf(name, DumpKind::Null, DumpValue::None),
            _ => DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None),
        }
    }

    fn walk_string(&mut self, id: NodeId, name: String) -> DumpNode {
        if let Some(handle) = self.graph.get(id).and_then(Node::handle) {
            self.register(handle, id, &name);
        }
        self.visit_node(id, None);
        self.replaced(id, name)
    }

    fn walk_object(&mut self, id: NodeId, name: String) -> DumpNode {
        let Some(Node::Object(object)) = self.graph.get(id) else {
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        };
        let (class_desc, handle) = (object.class_desc, object.handle);

        self.register_desc(class_desc);
        self.register(handle, id, &name);
        let Some(desc_id) = self.resolve_desc(class_desc) else {
            debug!("Object {} has an unresolvable class descriptor, skipping", id);
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        };

        self.visit_node(id, Some(desc_id));
        let Some(Node::Object(object)) = self.graph.get(id) else {
            return self.replaced(id, name);
        };
        let levels: Vec<(Vec<FieldValue>, Option<Vec<NodeId>>)> = object
            .class_data
            .iter()
            .map(|data| (data.values.clone(), data.annotations.clone()))
            .collect();

        let field_names = self.field_names(desc_id);
        let mut dump = DumpNode::new(
            name.clone(),
            self.class_name(Some(desc_id)),
            DumpKind::Object,
            DumpValue::None,
        );

        let mut field_index = 0;
        for (level, (values, annotations)) in levels.into_iter().enumerate() {
            for (slot, value) in values.into_iter().enumerate() {
                let field_name = field_names
                    .get(field_index)
                    .cloned()
                    .unwrap_or_else(|| format!("field{field_index}"));
                field_index += 1;

                match value {
                    FieldValue::Object(child) => dump.fields.push(self.walk_content(child, field_name)),
                    FieldValue::Primitive(value) => {
                        let item = Visited::Field {
                            name: &field_name,
                            value,
                        };
                        let value = match self.visit_primitive(Some(desc_id), item) {
                            Some(new) => {
                                self.set_field(id, level, slot, new);
                                new
                            }
                            None => value,
                        };
                        dump.fields.push(DumpNode::primitive(field_name, value));
                    }
                }
            }

            for (index, annotation) in annotations.into_iter().flatten().enumerate() {
                let block_name = format!("{name}@{level}.{index}");
                dump.block_data.push(self.walk_content(annotation, block_name));
            }
        }

        if field_index != field_names.len() {
            debug!(
                "Object {} declares {} fields but carries {} values",
                id,
                field_names.len(),
                field_index
            );
        }
        dump
    }

    fn set_field(&mut self, id: NodeId, level: usize, slot: usize, value: Primitive) {
        if let Some(Node::Object(object)) = self.graph.get_mut(id) {
            if let Some(target) = object
                .class_data
                .get_mut(level)
                .and_then(|data| data.values.get_mut(slot))
            {
                *target = FieldValue::Primitive(value);
            }
        }
    }

    fn walk_array(&mut self, id: NodeId, name: String) -> DumpNode {
        let Some(Node::Array(array)) = self.graph.get(id) else {
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        };
        let (class_desc, handle) = (array.class_desc, array.handle);

        self.register_desc(class_desc);
        self.register(handle, id, &name);
        let desc_id = self.resolve_desc(class_desc);
        if desc_id.is_none() {
            debug!("Array {} has an unresolvable class descriptor, skipping", id);
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        }

        self.visit_node(id, desc_id);
        let Some(Node::Array(array)) = self.graph.get(id) else {
            return self.replaced(id, name);
        };

        let mut dump = DumpNode::new(
            name.clone(),
            self.class_name(desc_id),
            DumpKind::Array,
            DumpValue::None,
        );
        let values = match &array.elements {
            ArrayElements::Bytes(bytes) => {
                dump.value = DumpValue::Bytes(bytes.clone());
                return dump;
            }
            ArrayElements::Values(values) => values.clone(),
        };

        for (index, value) in values.into_iter().enumerate() {
            let element_name = format!("{name}[{index}]");
            match value {
                FieldValue::Object(child) => dump.elements.push(self.walk_content(child, element_name)),
                FieldValue::Primitive(value) => {
                    let value = match self.visit_primitive(desc_id, Visited::Element { index, value }) {
                        Some(new) => {
                            self.set_element(id, index, new);
                            new
                        }
                        None => value,
                    };
                    dump.elements.push(DumpNode::primitive(element_name, value));
                }
            }
        }
        dump
    }

    fn set_element(&mut self, id: NodeId, index: usize, value: Primitive) {
        if let Some(Node::Array(array)) = self.graph.get_mut(id) {
            if let ArrayElements::Values(values) = &mut array.elements {
                if let Some(target) = values.get_mut(index) {
                    *target = FieldValue::Primitive(value);
                }
            }
        }
    }

    fn walk_class(&mut self, id: NodeId, name: String) -> DumpNode {
        let Some(Node::Class(class)) = self.graph.get(id) else {
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        };
        let (class_desc, handle) = (class.class_desc, class.handle);

        self.register_desc(class_desc);
        self.register(handle, id, &name);
        let desc_id = self.resolve_desc(class_desc);
        if desc_id.is_none() {
            debug!("Class constant {} has an unresolvable descriptor, skipping", id);
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        }

        self.visit_node(id, desc_id);
        if !matches!(self.graph.get(id), Some(Node::Class(_))) {
            return self.replaced(id, name);
        }
        DumpNode::new(name, self.class_name(desc_id), DumpKind::Class, DumpValue::None)
    }

    fn walk_enum(&mut self, id: NodeId, name: String) -> DumpNode {
        let Some(Node::Enum(constant)) = self.graph.get(id) else {
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        };
        let (class_desc, handle) = (constant.class_desc, constant.handle);

        self.register_desc(class_desc);
        self.register(handle, id, &name);
        let desc_id = self.resolve_desc(class_desc);
        if desc_id.is_none() {
            debug!("Enum constant {} has an unresolvable descriptor, skipping", id);
            return DumpNode::leaf(name, DumpKind::Unresolved, DumpValue::None);
        }

        self.visit_node(id, desc_id);
        let Some(Node::Enum(constant)) = self.graph.get(id) else {
            return self.replaced(id, name);
        };
        let constant_id = constant.constant;

        // The constant name is registered for references but never visited.
        let constant_name = match self.graph.get(constant_id) {
            Some(Node::String(string)) => {
                let (handle, value) = (string.handle, string.value.clone());
                self.register(handle, constant_id, &format!("{name}.name"));
                value
            }
            Some(Node::Reference(handle)) => match self
                .handles
                .get(handle)
                .and_then(|target| self.graph.get(*target))
            {
                Some(Node::String(string)) => string.value.clone(),
                _ => String::new(),
            },
            _ => String::new(),
        };

        DumpNode::new(
            name,
            self.class_name(desc_id),
            DumpKind::Enum,
            DumpValue::Text(constant_name),
        )
    }
}
