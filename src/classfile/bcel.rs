//! BCEL class loader names.
//!
//! The BCEL `ClassLoader` shipped inside the JDK (and in Tomcat's DBCP) defines a
//! class from its own name when the name starts with [`BCEL_PREFIX`]. The rest of the
//! name is the class file, gzip-compressed and escaped into Java identifier
//! characters:
//!
//! - bytes that are identifier characters (other than `$`) are written as the char
//!   with the same code;
//! - bytes below 48 become `$` followed by one letter of a fixed table;
//! - any other byte becomes `$` followed by two lowercase hex digits.

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{Error, Result};

/// Prefix that makes the BCEL class loader decode a class name.
pub const BCEL_PREFIX: &str = "$$BCEL$$";

const ESCAPE: char = '$';

/// Bytes below this value use the single-letter escape.
const FREE_CHARS: u8 = 48;

fn escape_letter(byte: u8) -> char {
    match byte {
        0..=25 => char::from(b'A' + byte),
        26..=45 => char::from(b'g' + (byte - 26)),
        46 => '$',
        _ => '_',
    }
}

fn letter_value(letter: char) -> Option<u8> {
    let code = u8::try_from(letter).ok()?;
    match code {
        b'A'..=b'Z' => Some(code - b'A'),
        b'g'..=b'z' => Some(code - b'g' + 26),
        b'$' => Some(46),
        b'_' => Some(47),
        _ => None,
    }
}

/// `Character.isJavaIdentifierPart` over the Latin-1 range.
fn is_identifier_part(byte: u8) -> bool {
    matches!(
        byte,
        0x00..=0x08
            | 0x0E..=0x1B
            | b'$'
            | b'0'..=b'9'
            | b'A'..=b'Z'
            | b'_'
            | b'a'..=b'z'
            | 0x7F..=0x9F
            | 0xA2..=0xA5
            | 0xAA
            | 0xAD
            | 0xB5
            | 0xBA
            | 0xC0..=0xD6
            | 0xD8..=0xF6
            | 0xF8..=0xFF
    )
}

fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        if byte != b'$' && is_identifier_part(byte) {
            out.push(char::from(byte));
            continue;
        }

        out.push(ESCAPE);
        if byte < FREE_CHARS {
            out.push(escape_letter(byte));
        } else {
            out.push_str(&format!("{byte:02x}"));
        }
    }
    out
}

fn unescape(text: &str) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            let Ok(byte) = u8::try_from(c) else {
                return Err(malformed_error!("Character {:?} is outside the BCEL alphabet", c));
            };
            out.push(byte);
            continue;
        }

        let Some(first) = chars.next() else {
            return Err(malformed_error!("BCEL name ends inside an escape"));
        };
        let byte = match first {
            '0'..='9' | 'a'..='f' => {
                let low = chars.next().and_then(|low| low.to_digit(16));
                let (Some(high), Some(low)) = (first.to_digit(16), low) else {
                    return Err(malformed_error!("Truncated hex escape in BCEL name"));
                };
                (high * 16 + low) as u8
            }
            _ => match letter_value(first) {
                Some(byte) => byte,
                None => {
                    return Err(malformed_error!("Unknown BCEL escape ${}", first));
                }
            },
        };
        out.push(byte);
    }
    Ok(out)
}

/// Encode class bytes as a BCEL class loader name, prefix included.
///
/// # Errors
///
/// Returns [`crate::Error::Error`] if compression fails.
pub fn encode(class: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(class)
        .map_err(|error| Error::Error(format!("BCEL compression failed: {error}")))?;
    let compressed = encoder
        .finish()
        .map_err(|error| Error::Error(format!("BCEL compression failed: {error}")))?;

    Ok(format!("{BCEL_PREFIX}{}", escape(&compressed)))
}

/// Decode a BCEL class loader name back into class bytes. The [`BCEL_PREFIX`] is
/// optional.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for characters or escapes outside the BCEL
/// alphabet and for content that is not gzip data.
pub fn decode(name: &str) -> Result<Vec<u8>> {
    let compressed = unescape(name.strip_prefix(BCEL_PREFIX).unwrap_or(name))?;

    let mut class = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut class)
        .map_err(|error| malformed_error!("BCEL content is not gzip data: {}", error))?;
    Ok(class)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classfile::ClassFile, test::classes::sample_class};

    #[test]
    fn escape_table() {
        let bytes = [b'a', b'$', 0x0A, b'/', b' ', b':', 0x00, 0xFF];
        let text = escape(&bytes);
        assert_eq!(text, "a$q$K$_$m$3a\u{0}\u{FF}");
        assert_eq!(unescape(&text).unwrap(), bytes);
    }

    #[test]
    fn escape_letters_cover_free_chars() {
        for byte in 0..FREE_CHARS {
            assert_eq!(letter_value(escape_letter(byte)), Some(byte));
        }
        assert_eq!(letter_value('a'), None);
    }

    #[test]
    fn unescape_errors() {
        assert!(matches!(unescape("$"), Err(Error::Malformed { .. })));
        assert!(matches!(unescape("$4"), Err(Error::Malformed { .. })));
        assert!(matches!(unescape("$!"), Err(Error::Malformed { .. })));
        assert!(matches!(unescape("\u{4E2D}"), Err(Error::Malformed { .. })));
    }

    #[test]
    fn class_survives_bcel() {
        let bytes = sample_class("Foo", "whoami");
        let name = encode(&bytes).unwrap();

        assert!(name.starts_with(BCEL_PREFIX));
        assert!(name[BCEL_PREFIX.len()..]
            .chars()
            .all(|c| u32::from(c) <= 0xFF));
        assert_eq!(decode(&name).unwrap(), bytes);
        assert_eq!(decode(&name[BCEL_PREFIX.len()..]).unwrap(), bytes);

        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(ClassFile::from_bcel(&class.bcel().unwrap()).unwrap(), class);
    }

    #[test]
    fn decode_rejects_plain_text() {
        assert!(matches!(decode("$$BCEL$$abc"), Err(Error::Malformed { .. })));
    }
}
