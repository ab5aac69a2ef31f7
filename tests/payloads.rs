//! Integration tests for payload generation through the public API.
//!
//! Streams and class files are assembled byte by byte here so that these tests do not
//! depend on the crate's own encoder to produce their inputs.

use jgadget::{
    classfile::ClassFile,
    gadget::{Carrier, Catalog, ClassTemplate, GadgetTemplate, ParamSpec, ParamValue, Params},
    prelude::*,
    serial::BASE_HANDLE,
};
use std::io::Write;

/// Byte builder for serialization streams, header included.
struct Stream(Vec<u8>);

impl Stream {
    fn new() -> Stream {
        Stream(vec![0xAC, 0xED, 0x00, 0x05])
    }

    fn u8(mut self, value: u8) -> Stream {
        self.0.push(value);
        self
    }

    fn u16(mut self, value: u16) -> Stream {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn i32(mut self, value: i32) -> Stream {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn i64(mut self, value: i64) -> Stream {
        self.0.extend_from_slice(&value.to_be_bytes());
        self
    }

    fn raw(mut self, bytes: &[u8]) -> Stream {
        self.0.extend_from_slice(bytes);
        self
    }

    fn utf(self, text: &str) -> Stream {
        self.u16(text.len() as u16).raw(text.as_bytes())
    }

    fn string(self, text: &str) -> Stream {
        self.u8(0x74).utf(text)
    }

    fn reference(self, index: u32) -> Stream {
        self.u8(0x71).i32((BASE_HANDLE + index) as i32)
    }

    fn class_desc(self, name: &str, suid: i64, flags: u8, fields: u16) -> Stream {
        self.u8(0x72).utf(name).i64(suid).u8(flags).u16(fields)
    }

    fn field(self, code: u8, name: &str) -> Stream {
        self.u8(code).utf(name)
    }

    fn end(self) -> Stream {
        self.u8(0x78)
    }

    fn null(self) -> Stream {
        self.u8(0x70)
    }

    fn build(self) -> Vec<u8> {
        self.0
    }
}

/// `demo.Runner { String command; String label; }` with `{{param0}}` and `{{param1}}`.
fn runner() -> Vec<u8> {
    Stream::new()
        .u8(0x73)
        .class_desc("demo.Runner", 1, 0x02, 2)
        .field(b'L', "command")
        .string("Ljava/lang/String;")
        .field(b'L', "label")
        .reference(1)
        .end()
        .null()
        .string("{{param0}}")
        .string("{{param1}}")
        .build()
}

/// A `TemplatesImpl` holding a single placeholder class.
fn templates() -> Vec<u8> {
    Stream::new()
        .u8(0x73)
        .class_desc(jgadget::gadget::TEMPLATES_IMPL, 673_094_361_519_270_707, 0x02, 2)
        .field(b'[', "_bytecodes")
        .string("[[B")
        .field(b'L', "_name")
        .string("Ljava/lang/String;")
        .end()
        .null()
        .u8(0x75)
        .class_desc("[[B", 5_475_443_208_046_420_445, 0x02, 0)
        .end()
        .null()
        .i32(1)
        .u8(0x75)
        .class_desc("[B", -5_984_413_125_914_226_656, 0x02, 0)
        .end()
        .null()
        .i32(2)
        .raw(&[0x00, 0x00])
        .string("{{param0}}")
        .build()
}

/// Minimal class `name` whose only string constant is `command`.
fn class_bytes(name: &str, command: &str) -> Vec<u8> {
    let utf8 = |out: &mut Vec<u8>, text: &str| {
        out.push(1);
        out.extend_from_slice(&(text.len() as u16).to_be_bytes());
        out.extend_from_slice(text.as_bytes());
    };

    let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34, 0x00, 0x07];
    utf8(&mut out, name);
    out.extend_from_slice(&[7, 0x00, 0x01]);
    utf8(&mut out, "java/lang/Object");
    out.extend_from_slice(&[7, 0x00, 0x03]);
    utf8(&mut out, command);
    out.extend_from_slice(&[8, 0x00, 0x05]);
    // access, this, super, interfaces, fields, methods, attributes
    out.extend_from_slice(&[0x00, 0x21, 0x00, 0x02, 0x00, 0x04, 0, 0, 0, 0, 0, 0, 0, 0]);
    out
}

fn strings(graph: &Graph) -> Vec<String> {
    graph
        .iter()
        .filter_map(|(_, node)| match node {
            Node::String(string) => Some(string.value.clone()),
            _ => None,
        })
        .collect()
}

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.register_gadget(
        GadgetTemplate::new("Runner", runner())
            .with_param(ParamSpec::text("cmd"))
            .with_param(ParamSpec::text("label").with_default("x")),
    );
    catalog.register_gadget(
        GadgetTemplate::new("Templates", templates())
            .with_param(ParamSpec::text("name").with_default("Pwnr"))
            .with_carrier(Carrier::TemplatesImpl),
    );
    catalog.register_class(ClassTemplate {
        name: "Exec".to_string(),
        bytes: class_bytes("demo/Exec", "{{cmd}}"),
        class_name: "demo/Exec".to_string(),
        placeholder: "{{cmd}}".to_string(),
    });
    catalog
}

#[test]
fn unchanged_graph_encodes_identically() -> Result<()> {
    let bytes = runner();
    let graph = decode(&bytes)?;
    assert_eq!(graph.roots().len(), 1);
    assert_eq!(encode(&graph, &EncodeOptions::default())?, bytes);

    let bytes = templates();
    assert_eq!(encode(&decode(&bytes)?, &EncodeOptions::default())?, bytes);
    Ok(())
}

#[test]
fn catalog_fills_params() -> Result<()> {
    let catalog = catalog();
    let mut params = Params::new();
    params.insert("cmd".to_string(), ParamValue::from("touch /tmp/pwned"));

    let bytes = catalog.generate_bytes("Runner", &params, &EncodeOptions::default())?;
    assert_eq!(bytes.len(), runner().len() + 6 - 9);

    let values = strings(&decode(&bytes)?);
    assert!(values.contains(&"touch /tmp/pwned".to_string()));
    assert!(values.contains(&"x".to_string()));
    assert!(!values.iter().any(|value| value.contains("{{param")));
    Ok(())
}

#[test]
fn dump_shows_fields() -> Result<()> {
    let mut graph = decode(&runner())?;
    let text = dump(&mut graph);
    assert!(text.starts_with("import demo.Runner;\n\nroot = Runner {\n"));
    assert!(text.contains("\tcommand = \"{{param0}}\";\n\tlabel = \"{{param1}}\";\n"));
    Ok(())
}

#[test]
fn encode_options_shape_output() -> Result<()> {
    let bytes = runner();
    let graph = decode(&bytes)?;

    let padded = encode(
        &graph,
        &EncodeOptions {
            dirty_data_length: 4,
            ..Default::default()
        },
    )?;
    assert_eq!(padded.len(), bytes.len() + 4);
    assert_eq!(&padded[4..8], &[0x79; 4]);
    assert_eq!(encode(&decode(&padded)?, &EncodeOptions::default())?, bytes);

    let raw = encode(
        &graph,
        &EncodeOptions {
            variant: MarshalerVariant::Raw,
            ..Default::default()
        },
    )?;
    assert_eq!(raw, bytes[4..].to_vec());
    Ok(())
}

#[test]
fn templates_carry_rendered_class() -> Result<()> {
    let catalog = catalog();
    let class = catalog.render_class("Exec", "calc.exe", Some("demo.Evil"))?;

    let parsed = ClassFile::parse(&class)?;
    assert_eq!(parsed.class_name(), Some("demo/Evil"));
    assert!(parsed.utf8_constants().any(|(_, text)| text == "calc.exe"));

    let graph = catalog.generate_templates("Templates", &Params::new(), &class)?;
    let bytes = encode(&graph, &EncodeOptions::default())?;
    let reread = decode(&bytes)?;

    let injected = reread.iter().find_map(|(_, node)| match node {
        Node::Array(array) => array.bytes(),
        _ => None,
    });
    assert_eq!(injected, Some(class));
    assert!(strings(&reread).contains(&"Pwnr".to_string()));
    Ok(())
}

#[test]
fn rewrites_report_misses() -> Result<()> {
    let mut graph = decode(&runner())?;
    assert!(matches!(
        replace_string(&mut graph, "absent", "x", -1),
        Err(Error::NotFound(_))
    ));
    assert_eq!(replace_class_name(&mut graph, "demo.Runner", "demo.Walker", 1)?, 1);
    assert!(dump(&mut graph).starts_with("import demo.Walker;"));
    Ok(())
}

#[test]
fn gadgets_load_from_disk() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&runner())?;

    let mut catalog = Catalog::new();
    catalog.load_gadget(
        "FromDisk",
        file.path(),
        vec![ParamSpec::text("cmd"), ParamSpec::text("label")],
        Carrier::Ordinary,
    )?;
    assert_eq!(catalog.gadget_names(), vec!["FromDisk"]);

    let mut broken = tempfile::NamedTempFile::new()?;
    broken.write_all(&[0xAC, 0xED, 0x00, 0x05, 0x73])?;
    assert!(catalog
        .load_gadget("Broken", broken.path(), Vec::new(), Carrier::Ordinary)
        .is_err());
    assert!(catalog.gadget("Broken").is_none());
    Ok(())
}

#[test]
fn templates_travel_as_json_and_bcel() -> Result<()> {
    let json = to_json(&decode(&runner())?)?;
    let edited = json.replace("\"{{param0}}\"", "\"whoami\"");
    let bytes = encode(&from_json(&edited)?, &EncodeOptions::default())?;
    assert_eq!(bytes.len(), runner().len() + 6 - 10);
    assert!(strings(&decode(&bytes)?).contains(&"whoami".to_string()));

    let class = ClassFile::parse(&class_bytes("demo/Exec", "calc.exe"))?;
    let name = class.bcel()?;
    assert!(name.starts_with(BCEL_PREFIX));
    assert_eq!(ClassFile::from_bcel(&name)?.class_name(), Some("demo/Exec"));
    Ok(())
}
