//! Pseudo-Java rendering of a walked graph.
//!
//! The output starts with sorted `import` lines for every dotted class name met, then
//! renders each root as a nested declaration:
//!
//! ```text
//! import com.example.Holder;
//!
//! root = Holder {
//! 	size = 3;
//! 	cmd = "{{param0}}";
//! 	alias = &cmd;
//! }
//! ```
//!
//! References render as `&label`, where the label is the display name of the node
//! first seen with that handle. The format is meant for reading, not parsing.

use std::{collections::BTreeSet, fmt};

use crate::serial::{
    node::{simple_name, Graph},
    walker::{walk, DumpKind, DumpNode, DumpTree, DumpValue, Edit},
};

/// Hex digits of byte content shown before the rest is elided.
const HEX_PREVIEW: usize = 30;

/// Render `graph` as pseudo-Java text. The graph is walked without edits.
pub fn dump(graph: &mut Graph) -> String {
    let tree = walk(graph, |_, _| Edit::Keep);
    render(&tree)
}

/// Render an already built [`DumpTree`].
#[must_use]
pub fn render(tree: &DumpTree) -> String {
    tree.to_string()
}

fn hex_preview(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
        if hex.len() > HEX_PREVIEW {
            hex.truncate(HEX_PREVIEW);
            return format!("0x{hex}...");
        }
    }
    format!("0x{hex}")
}

fn collect_imports<'a>(node: &'a DumpNode, imports: &mut BTreeSet<&'a str>) {
    let importable = matches!(node.kind, DumpKind::Object | DumpKind::Class | DumpKind::Enum);
    if importable && node.class_name.contains('.') && !node.class_name.starts_with('[') {
        imports.insert(&node.class_name);
    }
    for child in node.fields.iter().chain(&node.elements).chain(&node.block_data) {
        collect_imports(child, imports);
    }
}

/// Separator written after a member (`;`) or an element (`,`).
#[derive(Clone, Copy, PartialEq)]
enum Slot {
    Member,
    Element,
    Annotation,
}

impl Slot {
    fn terminator(self) -> &'static str {
        match self {
            Slot::Member | Slot::Annotation => ";",
            Slot::Element => ",",
        }
    }

    fn closing(self) -> &'static str {
        match self {
            Slot::Element => ",",
            Slot::Member | Slot::Annotation => "",
        }
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &DumpNode, level: usize, slot: Slot) -> fmt::Result {
    let indent = "\t".repeat(level);
    let prefix = if slot == Slot::Member && !node.name.is_empty() {
        format!("{} = ", node.name)
    } else {
        String::new()
    };
    let end = slot.terminator();

    match node.kind {
        DumpKind::ClassDesc => Ok(()),
        DumpKind::Object => {
            writeln!(f, "{indent}{prefix}{} {{", simple_name(&node.class_name))?;
            for field in &node.fields {
                write_node(f, field, level + 1, Slot::Member)?;
            }
            if !node.block_data.is_empty() {
                writeln!(f, "{indent}\twriteObject {{")?;
                for content in &node.block_data {
                    write_node(f, content, level + 2, Slot::Annotation)?;
                }
                writeln!(f, "{indent}\t}}")?;
            }
            writeln!(f, "{indent}}}{}", slot.closing())
        }
        DumpKind::Array => match &node.value {
            DumpValue::Bytes(bytes) => writeln!(f, "{indent}{prefix}{}{end}", hex_preview(bytes)),
            _ => {
                writeln!(f, "{indent}{prefix}[")?;
                for element in &node.elements {
                    write_node(f, element, level + 1, Slot::Element)?;
                }
                writeln!(f, "{indent}]{end}")
            }
        },
        DumpKind::String => match &node.value {
            DumpValue::Text(text) => writeln!(f, "{indent}{prefix}{text:?}{end}"),
            _ => writeln!(f, "{indent}{prefix}\"\"{end}"),
        },
        DumpKind::Primitive => match &node.value {
            DumpValue::Primitive(value) => writeln!(f, "{indent}{prefix}{value}{end}"),
            _ => writeln!(f, "{indent}{prefix}0{end}"),
        },
        DumpKind::Class => {
            writeln!(f, "{indent}{prefix}{}.class{end}", simple_name(&node.class_name))
        }
        DumpKind::Enum => {
            let constant = match &node.value {
                DumpValue::Text(text) => text.as_str(),
                _ => "?",
            };
            writeln!(f, "{indent}{prefix}{}.{constant}{end}", simple_name(&node.class_name))
        }
        DumpKind::Null => writeln!(f, "{indent}{prefix}null{end}"),
        DumpKind::Reference => match &node.value {
            DumpValue::Label(label) => writeln!(f, "{indent}{prefix}&{label}{end}"),
            _ => writeln!(f, "{indent}{prefix}&?{end}"),
        },
        DumpKind::BlockData => match &node.value {
            DumpValue::Bytes(bytes) => writeln!(f, "{indent}{prefix}{}{end}", hex_preview(bytes)),
            _ => Ok(()),
        },
        DumpKind::Unresolved => writeln!(f, "{indent}{prefix}/* unresolved */{end}"),
    }
}

impl fmt::Display for DumpTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut imports = BTreeSet::new();
        for root in &self.roots {
            collect_imports(root, &mut imports);
        }
        for import in &imports {
            writeln!(f, "import {import};")?;
        }
        if !imports.is_empty() {
            writeln!(f)?;
        }

        for root in &self.roots {
            write_node(f, root, 0, Slot::Member)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{serial::decode, test::streams};

    #[test]
    fn dump_holder() {
        let mut graph = decode(&streams::holder()).unwrap();
        let text = dump(&mut graph);

        let expected = "\
import com.example.Holder;
import com.example.Probe;

root = Holder {
\tsize = 3;
\tcmd = \"{{param0}}\";
\tcode = 0x7b7b706172616d307d7d;
\titems = [
\t\t&cmd,
\t\tProbe.class,
\t\tnull,
\t];
\talias = &cmd;
}
";
        assert_eq!(text, expected);
    }

    #[test]
    fn dump_block_data() {
        let mut graph = decode(&streams::derived_object()).unwrap();
        let text = dump(&mut graph);

        assert!(text.starts_with("import com.example.Derived;\n\nroot = Derived {\n"));
        assert!(text.contains("\tcount = 7;\n\tflag = true;\n\tname = \"bob\";\n"));
        assert!(text.contains("\twriteObject {\n\t\t0x00000001;\n\t}\n"));
    }

    #[test]
    fn long_bytes_are_elided() {
        assert_eq!(hex_preview(&[0xAB; 4]), "0xabababab");
        assert_eq!(hex_preview(&[0x01; 15]), format!("0x{}", "01".repeat(15)));
        assert_eq!(hex_preview(&[0x01; 16]), format!("0x{}...", "01".repeat(15)));
    }

    #[test]
    fn dump_does_not_modify() {
        let bytes = streams::two_strings_and_reference();
        let mut graph = decode(&bytes).unwrap();
        let before = graph.clone();
        let text = dump(&mut graph);

        assert_eq!(text, "root = \"hello\";\nroot1 = \"world\";\nroot2 = &root;\n");
        assert_eq!(graph.len(), before.len());
    }
}
