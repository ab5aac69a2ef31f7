//! Java "modified UTF-8" codec.
//!
//! Java writes strings with `DataOutput.writeUTF`, which differs from standard UTF-8 in
//! two places: `U+0000` is written as the two-byte sequence `C0 80`, and supplementary
//! characters are written as two three-byte surrogates instead of one four-byte
//! sequence. Class-file `CONSTANT_Utf8` entries use the same encoding.
//!
//! The encoder can also widen characters into overlong two- or three-byte forms
//! ([`CharWidth`]). Java's decoder accepts these, pattern matchers on the wire
//! usually do not.

use crate::Result;

/// Byte width used for characters that would normally fit in fewer bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharWidth {
    /// Shortest form, as written by the JDK
    #[default]
    One,
    /// ASCII written as overlong two-byte sequences
    Two,
    /// ASCII and two-byte characters written as overlong three-byte sequences
    Three,
}

/// Encodes `value` as modified UTF-8 using the requested character width.
#[must_use]
pub fn encode(value: &str, width: CharWidth) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        let unit = u32::from(unit);
        match unit {
            0x01..=0x7F if width == CharWidth::One => out.push(unit as u8),
            0x00..=0x7FF if width != CharWidth::Three => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

/// Decodes modified UTF-8, accepting overlong forms and surrogate pairs.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for truncated sequences, invalid lead or
/// continuation bytes and unpaired surrogates.
pub fn decode(data: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(data.len());
    let mut offset = 0;

    while offset < data.len() {
        let lead = data[offset];
        let unit = if lead < 0x80 {
            offset += 1;
            u16::from(lead)
        } else if lead & 0xE0 == 0xC0 {
            let second = continuation(data, offset + 1)?;
            offset += 2;
            (u16::from(lead & 0x1F) << 6) | second
        } else if lead & 0xF0 == 0xE0 {
            let second = continuation(data, offset + 1)?;
            let third = continuation(data, offset + 2)?;
            offset += 3;
            (u16::from(lead & 0x0F) << 12) | (second << 6) | third
        } else {
            return Err(malformed_error!(
                "Invalid modified UTF-8 lead byte 0x{:02x} at {}",
                lead,
                offset
            ));
        };
        units.push(unit);
    }

    String::from_utf16(&units).map_err(|_| malformed_error!("Unpaired surrogate in modified UTF-8"))
}

fn continuation(data: &[u8], offset: usize) -> Result<u16> {
    match data.get(offset) {
        Some(byte) if byte & 0xC0 == 0x80 => Ok(u16::from(byte & 0x3F)),
        Some(byte) => Err(malformed_error!(
            "Invalid modified UTF-8 continuation byte 0x{:02x} at {}",
            byte,
            offset
        )),
        None => Err(out_of_bounds_error!()),
    }
}

/// Decodes `data`, falling back to lossy standard UTF-8 when it is not valid
/// modified UTF-8.
pub(crate) fn decode_lossy(data: &[u8]) -> String {
    match decode(data) {
        Ok(value) => value,
        Err(_) => String::from_utf8_lossy(data).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_unchanged() {
        assert_eq!(encode("whoami", CharWidth::One), b"whoami");
        assert_eq!(decode(b"whoami").unwrap(), "whoami");
    }

    #[test]
    fn nul_uses_two_bytes() {
        assert_eq!(encode("a\0b", CharWidth::One), [0x61, 0xC0, 0x80, 0x62]);
        assert_eq!(decode(&[0x61, 0xC0, 0x80, 0x62]).unwrap(), "a\0b");
    }

    #[test]
    fn supplementary_uses_surrogates() {
        let encoded = encode("\u{1F600}", CharWidth::One);
        assert_eq!(encoded, [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80]);
        assert_eq!(decode(&encoded).unwrap(), "\u{1F600}");
    }

    #[test]
    fn overlong_widths() {
        assert_eq!(encode("A", CharWidth::Two), [0xC1, 0x81]);
        assert_eq!(encode("A", CharWidth::Three), [0xE0, 0x81, 0x81]);
        assert_eq!(encode("é", CharWidth::Three), [0xE0, 0x83, 0xA9]);

        for width in [CharWidth::One, CharWidth::Two, CharWidth::Three] {
            let value = "java.util.HashMap é 中";
            assert_eq!(decode(&encode(value, width)).unwrap(), value);
        }
    }

    #[test]
    fn invalid_sequences() {
        assert!(decode(&[0xF0, 0x9F, 0x98, 0x80]).is_err());
        assert!(decode(&[0xC1]).is_err());
        assert!(decode(&[0xE0, 0x41, 0x41]).is_err());
        assert!(decode(&[0xED, 0xA0, 0xBD]).is_err());
    }
}
