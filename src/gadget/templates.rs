//! Bytecode injection into `TemplatesImpl` carriers.

use log::debug;

use crate::{
    serial::{walk, ArrayElements, Edit, FieldValue, Graph, Node, NodeId, Visited},
    Error::NotFound,
    Result,
};

/// Binary name of the carrier class that defines classes from `_bytecodes`.
pub const TEMPLATES_IMPL: &str = "com.sun.org.apache.xalan.internal.xsltc.trax.TemplatesImpl";

/// Field of [`TEMPLATES_IMPL`] holding the class files (`byte[][]`).
pub const BYTECODES_FIELD: &str = "_bytecodes";

/// Follow a Reference to the slot that owns its handle.
fn resolve(graph: &Graph, id: NodeId) -> Option<NodeId> {
    match graph.get(id)? {
        Node::Reference(handle) => graph
            .iter()
            .find(|(_, node)| node.handle() == Some(*handle))
            .map(|(target, _)| target),
        _ => Some(id),
    }
}

/// Store `class_bytes` as the first class of the first `TemplatesImpl` in `graph`.
///
/// The remaining `_bytecodes` entries are left in place. The replaced `byte[]` keeps
/// its encoding and handle, so other references to it observe the new class too.
///
/// # Errors
///
/// Returns [`crate::Error::NotFound`] if the graph has no `TemplatesImpl` object and
/// [`crate::Error::Malformed`] if its `_bytecodes` field is not a non-empty array of
/// `byte[]`.
pub fn set_template_bytecodes(graph: &mut Graph, class_bytes: &[u8]) -> Result<()> {
    let mut carrier = None;
    walk(graph, |desc, item| {
        if carrier.is_some() {
            return Edit::Keep;
        }
        if let (Some(desc), Visited::Node { id, node: Node::Object(_) }) = (desc, item) {
            if desc.name == TEMPLATES_IMPL {
                let slot = desc.fields.iter().position(|field| field.name == BYTECODES_FIELD);
                carrier = Some((id, slot));
            }
        }
        Edit::Keep
    });

    let Some((object_id, slot)) = carrier else {
        return Err(NotFound(format!("{TEMPLATES_IMPL} carrier")));
    };
    let Some(slot) = slot else {
        return Err(malformed_error!("{} declares no {} field", TEMPLATES_IMPL, BYTECODES_FIELD));
    };

    // The field is declared by TemplatesImpl itself, the most derived level
    let bytecodes = match graph.get(object_id) {
        Some(Node::Object(object)) => object
            .class_data
            .last()
            .and_then(|data| data.values.get(slot))
            .copied(),
        _ => None,
    };
    let Some(FieldValue::Object(outer)) = bytecodes else {
        return Err(malformed_error!("{} holds no array", BYTECODES_FIELD));
    };

    let first = match resolve(graph, outer).and_then(|id| graph.get(id)) {
        Some(Node::Array(array)) => match &array.elements {
            ArrayElements::Values(values) => values.first().copied(),
            ArrayElements::Bytes(_) => None,
        },
        _ => None,
    };
    let Some(FieldValue::Object(first)) = first else {
        return Err(malformed_error!("{} has no class entry", BYTECODES_FIELD));
    };

    let target = resolve(graph, first);
    match target.and_then(|id| graph.get_mut(id)) {
        Some(Node::Array(array)) if array.bytes().is_some() => {
            array.set_bytes(class_bytes);
            debug!("Injected {} bytes of bytecode into {}", class_bytes.len(), TEMPLATES_IMPL);
            Ok(())
        }
        _ => Err(malformed_error!("First {} entry is not a byte[]", BYTECODES_FIELD)),
    }
}
