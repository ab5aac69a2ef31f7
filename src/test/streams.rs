//! Hand-assembled serialization streams.

use crate::{gadget::TEMPLATES_IMPL, serial::BASE_HANDLE};

/// Incremental writer for serialization stream fixtures.
pub struct Stream {
    out: Vec<u8>,
}

impl Stream {
    pub fn new() -> Self {
        Stream { out: header() }
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.out.extend_from_slice(bytes);
        self
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.out.push(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.out.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.out.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn i64(mut self, value: i64) -> Self {
        self.out.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn utf(self, value: &str) -> Self {
        self.u16(value.len() as u16).raw(value.as_bytes())
    }

    pub fn string(self, value: &str) -> Self {
        self.u8(0x74).utf(value)
    }

    pub fn reference(self, handle: u32) -> Self {
        self.u8(0x71).raw(&(BASE_HANDLE + handle).to_be_bytes())
    }

    pub fn null(self) -> Self {
        self.u8(0x70)
    }

    pub fn end(self) -> Self {
        self.u8(0x78)
    }

    /// Start of a `TC_CLASSDESC` up to and including the field count.
    pub fn class_desc(self, name: &str, suid: i64, flags: u8, fields: u16) -> Self {
        self.u8(0x72).utf(name).i64(suid).u8(flags).u16(fields)
    }

    /// A primitive field declaration.
    pub fn field(self, code: u8, name: &str) -> Self {
        self.u8(code).utf(name)
    }

    /// A descriptor without fields, annotations or super class.
    pub fn leaf_desc(self, name: &str, suid: i64) -> Self {
        self.class_desc(name, suid, 0x02, 0).end().null()
    }

    pub fn build(self) -> Vec<u8> {
        self.out
    }
}

pub fn header() -> Vec<u8> {
    vec![0xAC, 0xED, 0x00, 0x05]
}

/// `"hello"`, `"world"` and a reference back to `"hello"`.
pub fn two_strings_and_reference() -> Vec<u8> {
    Stream::new()
        .string("hello")
        .string("world")
        .reference(0)
        .build()
}

/// `Derived extends Base`, with a `writeObject` block on `Derived`.
///
/// Handles: 0 Derived desc, 1 `Ljava/lang/String;`, 2 Base desc, 3 object, 4 `"bob"`.
pub fn derived_object() -> Vec<u8> {
    Stream::new()
        .u8(0x73)
        .class_desc("com.example.Derived", 1, 0x03, 2)
        .field(b'Z', "flag")
        .field(b'L', "name")
        .string("Ljava/lang/String;")
        .end()
        .class_desc("com.example.Base", 2, 0x02, 1)
        .field(b'I', "count")
        .end()
        .null()
        // Base data
        .i32(7)
        // Derived data
        .u8(0x01)
        .string("bob")
        .u8(0x77)
        .u8(4)
        .i32(1)
        .end()
        .build()
}

/// `TimeUnit.SECONDS` followed by a separate `"SECONDS"` string root.
///
/// Handles: 0 TimeUnit desc, 1 Enum desc, 2 enum, 3 constant name, 4 string.
pub fn enum_and_string() -> Vec<u8> {
    Stream::new()
        .u8(0x7E)
        .class_desc("java.util.concurrent.TimeUnit", 0, 0x12, 0)
        .end()
        .class_desc("java.lang.Enum", 0, 0x12, 0)
        .end()
        .null()
        .string("SECONDS")
        .string("SECONDS")
        .build()
}

/// A single `byte[]` root.
pub fn byte_array(bytes: &[u8]) -> Vec<u8> {
    Stream::new()
        .u8(0x75)
        .leaf_desc("[B", -5_984_413_125_914_226_656)
        .i32(bytes.len() as i32)
        .raw(bytes)
        .build()
}

/// `TC_ARRAY` with an `Object[]` descriptor, without the size.
pub fn object_array_desc() -> Vec<u8> {
    let mut out = vec![0x75];
    out.extend_from_slice(
        &Stream { out: Vec::new() }
            .leaf_desc("[Ljava.lang.Object;", -8_012_369_246_846_506_644)
            .build(),
    );
    out
}

/// A holder object shaped like a gadget template.
///
/// ```text
/// com.example.Holder {
///     int size = 3;
///     String cmd = "{{param0}}";            // h5
///     byte[] code = "{{param0}}" bytes;     // h7
///     Object[] items = [ &cmd, com.example.Probe.class, null ];
///     String alias = &cmd;
/// }
/// ```
///
/// Handles: 0 Holder desc, 1 `Ljava/lang/String;`, 2 `[B`, 3 `[Ljava/lang/Object;`,
/// 4 object, 5 cmd string, 6 `[B` desc, 7 code array, 8 `Object[]` desc, 9 items array,
/// 10 Probe desc, 11 Probe class.
pub fn holder() -> Vec<u8> {
    Stream::new()
        .u8(0x73)
        .class_desc("com.example.Holder", 42, 0x02, 5)
        .field(b'I', "size")
        .field(b'L', "cmd")
        .string("Ljava/lang/String;")
        .field(b'[', "code")
        .string("[B")
        .field(b'[', "items")
        .string("[Ljava/lang/Object;")
        .field(b'L', "alias")
        .reference(1)
        .end()
        .null()
        // values
        .i32(3)
        .string("{{param0}}")
        .u8(0x75)
        .leaf_desc("[B", -5_984_413_125_914_226_656)
        .i32(10)
        .raw(b"{{param0}}")
        .u8(0x75)
        .leaf_desc("[Ljava.lang.Object;", -8_012_369_246_846_506_644)
        .i32(3)
        .reference(5)
        .u8(0x76)
        .leaf_desc("com.example.Probe", 7)
        .null()
        .reference(5)
        .build()
}

/// A `TemplatesImpl` carrier whose `_bytecodes` holds two classes.
///
/// Handles: 0 TemplatesImpl desc, 1 `[[B`, 2 `Ljava/lang/String;`, 3 object,
/// 4 `[[B` desc, 5 outer array, 6 `[B` desc, 7 first class, 8 second class, 9 `_name`.
pub fn templates_impl() -> Vec<u8> {
    Stream::new()
        .u8(0x73)
        .class_desc(TEMPLATES_IMPL, 673_094_361_519_270_707, 0x02, 3)
        .field(b'I', "_indentNumber")
        .field(b'[', "_bytecodes")
        .string("[[B")
        .field(b'L', "_name")
        .string("Ljava/lang/String;")
        .end()
        .null()
        .i32(0)
        .u8(0x75)
        .leaf_desc("[[B", 5_475_443_208_046_420_445)
        .i32(2)
        .u8(0x75)
        .leaf_desc("[B", -5_984_413_125_914_226_656)
        .i32(4)
        .raw(&[0xCA, 0xFE, 0xBA, 0xBE])
        .u8(0x75)
        .reference(6)
        .i32(1)
        .raw(&[0x00])
        .string("Pwnr")
        .build()
}
