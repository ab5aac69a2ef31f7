//! Leaf rewriters built on [`walk`].
//!
//! Each rewriter replaces matching String, `byte[]` or Class leaves and returns the
//! number of replacements. A negative `times` means unlimited; otherwise at most
//! `times` nodes are rewritten, in stream order. Finding nothing is reported as
//! [`crate::Error::NotFound`] so callers can tell a stale template from a successful
//! substitution.

use log::debug;

use crate::{
    serial::{
        node::{ArrayElements, ClassDesc, Graph, Node},
        walker::{walk, Edit, Visited},
    },
    Error::{self, NotFound},
    Result,
};

/// Counts replacements against an optional limit.
struct Budget {
    remaining: Option<usize>,
    matched: usize,
}

impl Budget {
    fn new(times: i64) -> Budget {
        Budget {
            remaining: usize::try_from(times).ok(),
            matched: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    fn spend(&mut self) {
        self.matched += 1;
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
    }

    fn finish(self, what: String) -> Result<usize> {
        if self.matched == 0 {
            return Err(NotFound(what));
        }
        Ok(self.matched)
    }
}

fn renamed(desc: Option<&ClassDesc>, old: &str, new: &str) -> Option<Edit> {
    match desc {
        Some(desc) if desc.name == old => {
            let mut desc = desc.clone();
            desc.name = new.to_string();
            Some(Edit::Descriptor(desc))
        }
        _ => None,
    }
}

/// Replace string content.
///
/// A String node whose value equals `old` is replaced by `new`; one that merely
/// contains `old` has its first occurrence replaced. A Class node whose descriptor is
/// named `old` is renamed to `new`. Each rewritten node counts once against `times`,
/// and shared nodes are rewritten once for all their references.
///
/// # Errors
///
/// Returns [`crate::Error::Error`] for an empty `old` and
/// [`crate::Error::NotFound`] if nothing matched.
pub fn replace_string(graph: &mut Graph, old: &str, new: &str, times: i64) -> Result<usize> {
    if old.is_empty() {
        return Err(Error::Error("Cannot replace an empty string".to_string()));
    }

    let mut budget = Budget::new(times);
    walk(graph, |desc, item| {
        if budget.exhausted() {
            return Edit::Keep;
        }
        match item {
            Visited::Node {
                node: Node::String(string),
                ..
            } => {
                if !string.value.contains(old) {
                    return Edit::Keep;
                }
                let mut string = string.clone();
                let value = string.value.replacen(old, new, 1);
                string.set_value(value);
                budget.spend();
                Edit::Replace(Node::String(string))
            }
            Visited::Node {
                node: Node::Class(_),
                ..
            } => match renamed(desc, old, new) {
                Some(edit) => {
                    budget.spend();
                    edit
                }
                None => Edit::Keep,
            },
            _ => Edit::Keep,
        }
    });

    debug!("replace_string {:?}: {} node(s) rewritten", old, budget.matched);
    budget.finish(format!("string {old:?}"))
}

/// Replace the content of `byte[]` arrays equal to `old`.
///
/// Both array encodings match; the replacement keeps the encoding the array was
/// decoded with and updates its size. Arrays of any other element type never match.
///
/// # Errors
///
/// Returns [`crate::Error::NotFound`] if no array matched.
pub fn replace_byte_array(graph: &mut Graph, old: &[u8], new: &[u8], times: i64) -> Result<usize> {
    let mut budget = Budget::new(times);
    walk(graph, |desc, item| {
        if budget.exhausted() {
            return Edit::Keep;
        }
        let Visited::Node {
            node: Node::Array(array),
            ..
        } = item
        else {
            return Edit::Keep;
        };

        let byte_array = match array.elements {
            ArrayElements::Bytes(_) => true,
            ArrayElements::Values(_) => desc.is_some_and(|desc| desc.name == "[B"),
        };
        if !byte_array || array.size != old.len() {
            return Edit::Keep;
        }
        match array.bytes() {
            Some(bytes) if bytes == old => {
                let mut array = array.clone();
                array.set_bytes(new);
                budget.spend();
                Edit::Replace(Node::Array(array))
            }
            _ => Edit::Keep,
        }
    });

    debug!("replace_byte_array ({} bytes): {} array(s) rewritten", old.len(), budget.matched);
    budget.finish(format!("byte array of {} bytes", old.len()))
}

/// Rename the descriptor of every Class constant named `old`.
///
/// # Errors
///
/// Returns [`crate::Error::NotFound`] if no Class constant matched.
pub fn replace_class_name(graph: &mut Graph, old: &str, new: &str, times: i64) -> Result<usize> {
    let mut budget = Budget::new(times);
    walk(graph, |desc, item| {
        if budget.exhausted() {
            return Edit::Keep;
        }
        match item {
            Visited::Node {
                node: Node::Class(_),
                ..
            } => match renamed(desc, old, new) {
                Some(edit) => {
                    budget.spend();
                    edit
                }
                None => Edit::Keep,
            },
            _ => Edit::Keep,
        }
    });

    debug!("replace_class_name {:?}: {} class(es) renamed", old, budget.matched);
    budget.finish(format!("class {old:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        serial::{decode, encode, walker::DumpValue, EncodeOptions, JavaArray, Primitive},
        test::streams::{self, Stream},
    };

    fn reencode(graph: &Graph) -> Vec<u8> {
        encode(graph, &EncodeOptions::default()).unwrap()
    }

    #[test]
    fn same_length_replacement_keeps_layout() {
        let original = streams::holder();
        let mut graph = decode(&original).unwrap();

        assert_eq!(replace_string(&mut graph, "{{param0}}", "touch /tmp", -1).unwrap(), 1);
        let mut padded = decode(&reencode(&graph)).unwrap();
        assert_eq!(replace_string(&mut padded, "touch /tmp", "{{param0}}", -1).unwrap(), 1);
        assert_eq!(reencode(&padded), original);
    }

    #[test]
    fn string_replacement_resizes() {
        let mut graph = decode(&streams::holder()).unwrap();
        replace_string(&mut graph, "{{param0}}", "touch /tmp/pwned", -1).unwrap();

        let encoded = reencode(&graph);
        assert_eq!(encoded.len(), streams::holder().len() + 6);

        let mut reread = decode(&encoded).unwrap();
        let tree = walk(&mut reread, |_, _| Edit::Keep);
        let cmd = tree.roots[0].fields.iter().find(|f| f.name == "cmd").unwrap();
        assert_eq!(cmd.value, DumpValue::Text("touch /tmp/pwned".to_string()));

        let string = reread
            .iter()
            .find_map(|(_, node)| match node {
                Node::String(s) if s.value == "touch /tmp/pwned" => Some(s.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(string.size, string.raw.len());
    }

    #[test]
    fn substring_replacement() {
        let mut graph = decode(&Stream::new().string("sh -c {{param0}}; exit").build()).unwrap();
        replace_string(&mut graph, "{{param0}}", "id", -1).unwrap();
        assert_eq!(reencode(&graph), Stream::new().string("sh -c id; exit").build());
    }

    #[test]
    fn times_limits_rewrites() {
        let stream = Stream::new().string("a").string("a").string("a").build();

        let mut graph = decode(&stream).unwrap();
        assert_eq!(replace_string(&mut graph, "a", "b", 2).unwrap(), 2);
        assert_eq!(
            reencode(&graph),
            Stream::new().string("b").string("b").string("a").build()
        );

        let mut graph = decode(&stream).unwrap();
        assert_eq!(replace_string(&mut graph, "a", "b", -1).unwrap(), 3);
    }

    #[test]
    fn budget_counts_nodes_not_occurrences() {
        let stream = Stream::new().string("a-a").string("a").build();

        let mut graph = decode(&stream).unwrap();
        assert_eq!(replace_string(&mut graph, "a", "b", 1).unwrap(), 1);
        assert_eq!(
            reencode(&graph),
            Stream::new().string("b-a").string("a").build()
        );
    }

    #[test]
    fn enum_constant_names_are_kept() {
        let mut graph = decode(&streams::enum_and_string()).unwrap();
        assert_eq!(replace_string(&mut graph, "SECONDS", "MINUTES", -1).unwrap(), 1);

        let encoded = reencode(&graph);
        let names: Vec<String> = decode(&encoded)
            .unwrap()
            .iter()
            .filter_map(|(_, node)| match node {
                Node::String(string) => Some(string.value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["SECONDS", "MINUTES"]);
    }

    #[test]
    fn class_constants_are_renamed() {
        let mut graph = decode(&streams::holder()).unwrap();
        assert_eq!(
            replace_string(&mut graph, "com.example.Probe", "com.example.Other", -1).unwrap(),
            1
        );

        let mut reread = decode(&reencode(&graph)).unwrap();
        let tree = walk(&mut reread, |_, _| Edit::Keep);
        let items = tree.roots[0].fields.iter().find(|f| f.name == "items").unwrap();
        assert_eq!(items.elements[1].class_name, "com.example.Other");

        assert!(matches!(
            replace_class_name(&mut reread, "com.example.Probe", "x.Y", -1),
            Err(Error::NotFound(_))
        ));
        assert_eq!(replace_class_name(&mut reread, "com.example.Other", "x.Y", -1).unwrap(), 1);
    }

    #[test]
    fn byte_arrays_are_replaced() {
        let mut graph = decode(&streams::holder()).unwrap();
        assert_eq!(replace_byte_array(&mut graph, b"{{param0}}", b"\xCA\xFE", -1).unwrap(), 1);

        let array = graph
            .iter()
            .find_map(|(_, node)| match node {
                Node::Array(array) if matches!(array.elements, ArrayElements::Bytes(_)) => {
                    Some(array.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(array.size, 2);
        assert_eq!(array.bytes(), Some(vec![0xCA, 0xFE]));

        // The string with the same text is left alone
        let tree = walk(&mut graph, |_, _| Edit::Keep);
        let cmd = tree.roots[0].fields.iter().find(|f| f.name == "cmd").unwrap();
        assert_eq!(cmd.value, DumpValue::Text("{{param0}}".to_string()));
    }

    #[test]
    fn other_arrays_never_match() {
        let mut graph = Graph::new();
        let null = graph.add(Node::Null);
        let desc = graph.add(Node::ClassDesc(ClassDesc {
            name: "[I".to_string(),
            serial_version: 0,
            flags: crate::serial::ClassDescFlags::SERIALIZABLE,
            fields: Vec::new(),
            annotations: Vec::new(),
            super_class: null,
            proxy_interfaces: None,
            handle: 0x7E_0000,
        }));
        graph.add_root(Node::Array(JavaArray {
            class_desc: desc,
            size: 1,
            elements: ArrayElements::Values(vec![crate::serial::FieldValue::Primitive(
                Primitive::Int(1),
            )]),
            handle: 0x7E_0001,
        }));

        assert!(matches!(
            replace_byte_array(&mut graph, &[1], &[2], -1),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn nothing_found() {
        let mut graph = decode(&streams::two_strings_and_reference()).unwrap();
        assert!(matches!(
            replace_string(&mut graph, "absent", "x", -1),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(replace_string(&mut graph, "", "x", -1), Err(Error::Error(_))));
        assert!(matches!(
            replace_string(&mut graph, "hello", "x", 0),
            Err(Error::NotFound(_))
        ));
    }
}
