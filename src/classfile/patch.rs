//! In-place byte surgery on compiled classes.
//!
//! Constant pool entries are addressed by index, never by byte offset, so a Utf8
//! constant may change length without invalidating any other reference in the file.
//! The patchers below exploit that: they locate a name or placeholder in the raw
//! bytes, check the length header in front of it, and splice in the replacement with
//! a rewritten header. Everything between matches is copied verbatim.
//!
//! Both patchers are best effort. An occurrence whose surrounding bytes do not look
//! like the expected constant layout is skipped and logged at debug level; callers
//! verify the result, typically by re-parsing it with [`super::ClassFile::parse`].

use log::debug;

use crate::file::{
    io::{push_be, read_be_at},
    mutf8,
};

/// Occurrences of a class name examined by [`patch_class_or_descriptor_name`].
pub const MAX_NAME_OCCURRENCES: usize = 3;

/// Constant layout around one occurrence of a class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// `L<name>;` descriptor: the name follows an `L` and the length header
    /// covers the name plus the two wrapper bytes
    DescriptorPrefixed,
    /// The name starts the constant and five trailing bytes follow it, as in the
    /// `<name>.java` source file constant
    WrappedLength,
    /// The constant is exactly the name
    BareLength,
}

impl Occurrence {
    /// Classify the occurrence of a `len`-byte name at `pos`, `None` when the bytes
    /// around it match no known layout.
    #[must_use]
    pub fn classify(bytes: &[u8], pos: usize, len: usize) -> Option<Occurrence> {
        // A bare constant whose low length byte is 0x4C also has an `L` in front of
        // the name, so the descriptor layout only wins when its header agrees.
        if bytes.get(pos.checked_sub(1)?) == Some(&b'L') {
            let descriptor = pos
                .checked_sub(3)
                .and_then(|offset| header_at(bytes, offset));
            if descriptor == Some(len + 2) {
                return Some(Occurrence::DescriptorPrefixed);
            }
        }

        let header = header_at(bytes, pos.checked_sub(2)?)?;
        if header == len + 5 {
            Some(Occurrence::WrappedLength)
        } else if header == len {
            Some(Occurrence::BareLength)
        } else {
            None
        }
    }

    /// Offset of the length header relative to the start of the name.
    fn header_offset(self) -> usize {
        match self {
            Occurrence::DescriptorPrefixed => 3,
            Occurrence::WrappedLength | Occurrence::BareLength => 2,
        }
    }

    /// Bytes the header counts besides the name.
    fn wrapper_len(self) -> usize {
        match self {
            Occurrence::DescriptorPrefixed => 2,
            Occurrence::WrappedLength => 5,
            Occurrence::BareLength => 0,
        }
    }
}

fn header_at(bytes: &[u8], offset: usize) -> Option<usize> {
    let mut offset = offset;
    read_be_at::<u16>(bytes, &mut offset).ok().map(usize::from)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

/// Replace up to [`MAX_NAME_OCCURRENCES`] occurrences of the class name `old` with
/// `new`, resizing the constants that hold them.
///
/// Returns the input unchanged when nothing could be patched.
#[must_use]
pub fn patch_class_or_descriptor_name(bytes: &[u8], old: &str, new: &str) -> Vec<u8> {
    let old = mutf8::encode(old, mutf8::CharWidth::One);
    let new = mutf8::encode(new, mutf8::CharWidth::One);
    if old.is_empty() {
        return bytes.to_vec();
    }

    let mut out = Vec::with_capacity(bytes.len() + MAX_NAME_OCCURRENCES * new.len());
    let mut cursor = 0;
    let mut search = 0;
    let mut located = 0;

    while located < MAX_NAME_OCCURRENCES {
        let Some(pos) = find(bytes, &old, search) else {
            break;
        };
        search = pos + old.len();
        located += 1;

        let Some(kind) = Occurrence::classify(bytes, pos, old.len()) else {
            debug!("Name occurrence at offset {} has no known constant layout, skipping", pos);
            continue;
        };

        let header = pos - kind.header_offset();
        if header < cursor {
            debug!("Name occurrence at offset {} overlaps a previous patch, skipping", pos);
            continue;
        }
        let Ok(len) = u16::try_from(new.len() + kind.wrapper_len()) else {
            debug!("Replacement name too long for the constant at offset {}, skipping", pos);
            continue;
        };

        out.extend_from_slice(&bytes[cursor..header]);
        push_be(&mut out, len);
        if kind == Occurrence::DescriptorPrefixed {
            out.push(b'L');
        }
        out.extend_from_slice(&new);
        cursor = pos + old.len();
    }

    out.extend_from_slice(&bytes[cursor..]);
    out
}

/// Replace the Utf8 constant `placeholder` with `command`.
///
/// The two bytes before the first occurrence of `placeholder` must be a length
/// header equal to its length; otherwise, or when the placeholder is absent, the
/// input is returned unchanged.
#[must_use]
pub fn patch_placeholder_command(bytes: &[u8], placeholder: &str, command: &str) -> Vec<u8> {
    let needle = mutf8::encode(placeholder, mutf8::CharWidth::One);
    if needle.is_empty() {
        return bytes.to_vec();
    }
    let Some(pos) = find(bytes, &needle, 0) else {
        debug!("Placeholder {:?} not found", placeholder);
        return bytes.to_vec();
    };

    let Some(header) = pos.checked_sub(2) else {
        debug!("Placeholder {:?} at offset {} has no length header", placeholder, pos);
        return bytes.to_vec();
    };
    if header_at(bytes, header) != Some(needle.len()) {
        debug!(
            "Length header before placeholder {:?} at offset {} does not match, skipping",
            placeholder, pos
        );
        return bytes.to_vec();
    }

    let replacement = mutf8::encode(command, mutf8::CharWidth::One);
    let Ok(len) = u16::try_from(replacement.len()) else {
        debug!("Command of {} bytes does not fit a Utf8 constant", replacement.len());
        return bytes.to_vec();
    };

    let mut out = Vec::with_capacity(bytes.len() + replacement.len());
    out.extend_from_slice(&bytes[..header]);
    push_be(&mut out, len);
    out.extend_from_slice(&replacement);
    out.extend_from_slice(&bytes[pos + needle.len()..]);
    out
}
