//! JSON form of a [`Graph`].
//!
//! The JSON mirrors the node model one to one: the arena of nodes in slot order and
//! the list of root slots. Templates can be kept and edited in this form and turned
//! back into a stream with [`crate::serial::encode`].
//!
//! On import, a String whose `raw` bytes are missing or no longer decode to its
//! `value` is re-encoded from `value`, so editing the text alone is enough. Array
//! sizes follow their elements.

use crate::{
    serial::node::{ArrayElements, FieldValue, Graph, Node, Primitive},
    Error, Result,
};

fn non_finite(value: &FieldValue) -> bool {
    match value {
        FieldValue::Primitive(Primitive::Float(v)) => !v.is_finite(),
        FieldValue::Primitive(Primitive::Double(v)) => !v.is_finite(),
        _ => false,
    }
}

/// Render `graph` as pretty-printed JSON.
///
/// # Errors
///
/// Returns [`crate::Error::Error`] if a `float` or `double` is NaN or infinite,
/// which JSON cannot represent.
pub fn to_json(graph: &Graph) -> Result<String> {
    for (id, node) in graph.iter() {
        let has_non_finite = match node {
            Node::Object(object) => object
                .class_data
                .iter()
                .any(|level| level.values.iter().any(non_finite)),
            Node::Array(array) => match &array.elements {
                ArrayElements::Values(values) => values.iter().any(non_finite),
                ArrayElements::Bytes(_) => false,
            },
            _ => false,
        };
        if has_non_finite {
            return Err(Error::Error(format!(
                "Node {id} holds a non-finite floating point value"
            )));
        }
    }

    serde_json::to_string_pretty(graph).map_err(|error| Error::Error(error.to_string()))
}

/// Build a graph from its JSON form.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] if the text is not a graph or refers to a
/// slot outside it.
pub fn from_json(text: &str) -> Result<Graph> {
    let mut graph: Graph = serde_json::from_str(text)
        .map_err(|error| malformed_error!("Invalid graph JSON: {}", error))?;
    graph.normalize()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        serial::{decode, encode, ClassDesc, ClassDescFlags, EncodeOptions, JavaArray, BASE_HANDLE},
        test::streams,
    };

    #[test]
    fn json_keeps_the_stream() {
        let bytes = streams::holder();
        let json = to_json(&decode(&bytes).unwrap()).unwrap();
        assert!(json.contains("\"roots\""));

        let graph = from_json(&json).unwrap();
        assert_eq!(encode(&graph, &EncodeOptions::default()).unwrap(), bytes);
    }

    #[test]
    fn edited_text_is_reencoded() {
        let json = to_json(&decode(&streams::holder()).unwrap()).unwrap();
        let edited = json.replace("\"{{param0}}\"", "\"touch /tmp/pwned\"");
        assert_ne!(edited, json);

        let graph = from_json(&edited).unwrap();
        let string = graph
            .iter()
            .find_map(|(_, node)| match node {
                Node::String(string) if string.value == "touch /tmp/pwned" => Some(string),
                _ => None,
            })
            .unwrap();
        assert_eq!(string.raw, b"touch /tmp/pwned");
        assert_eq!(string.size, 16);

        let encoded = encode(&graph, &EncodeOptions::default()).unwrap();
        assert_eq!(encoded.len(), streams::holder().len() + 6);
    }

    #[test]
    fn strings_without_raw_bytes() {
        let json = r#"{"nodes":[{"string":{"value":"id","handle":8257536}}],"roots":[0]}"#;
        let graph = from_json(json).unwrap();
        assert_eq!(
            encode(&graph, &EncodeOptions::default()).unwrap(),
            streams::Stream::new().string("id").build()
        );
    }

    #[test]
    fn slots_outside_the_graph() {
        let json = r#"{"nodes":[{"class":{"class_desc":5,"handle":8257536}}],"roots":[0]}"#;
        assert!(matches!(from_json(json), Err(Error::Malformed { .. })));

        assert!(matches!(
            from_json(r#"{"nodes":[],"roots":[0]}"#),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(from_json("[]"), Err(Error::Malformed { .. })));
    }

    #[test]
    fn non_finite_values_are_refused() {
        let mut graph = Graph::new();
        let null = graph.add(Node::Null);
        let desc = graph.add(Node::ClassDesc(ClassDesc {
            name: "[D".to_string(),
            serial_version: 0,
            flags: ClassDescFlags::SERIALIZABLE,
            fields: Vec::new(),
            annotations: Vec::new(),
            super_class: null,
            proxy_interfaces: None,
            handle: BASE_HANDLE,
        }));
        graph.add_root(Node::Array(JavaArray {
            class_desc: desc,
            size: 1,
            elements: ArrayElements::Values(vec![FieldValue::Primitive(Primitive::Double(
                f64::NAN,
            ))]),
            handle: BASE_HANDLE + 1,
        }));

        assert!(matches!(to_json(&graph), Err(Error::Error(_))));
    }
}
