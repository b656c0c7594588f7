//! Deterministic BSD `ar` static library codec.
//!
//! Writes the archive flavour Apple's toolchain produces: every member
//! name is stored with the `#1/<len>` extended-name convention directly
//! after the 60-byte header, and the name length counts toward the size
//! field. Timestamps, owner ids and modes are fixed so that identical
//! inputs always produce identical bytes.
//!
//! The writer does not emit a `__.SYMDEF` table of contents; run `ranlib`
//! over the result when the archive is destined for a linker.

use crate::error::ArchiveError;

/// Global archive magic.
pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";

const HEADER_LEN: usize = 60;
const HEADER_TERMINATOR: &[u8; 2] = b"`\n";
const EXTENDED_NAME_PREFIX: &str = "#1/";
const NAME_ALIGN: usize = 8;
const MAX_MEMBER_SIZE: usize = 9_999_999_999;
const MEMBER_MODE: &str = "100644";

/// Member names that hold a symbol index rather than an object.
const SYMBOL_TABLE_NAMES: &[&str] = &[
    "__.SYMDEF",
    "__.SYMDEF SORTED",
    "__.SYMDEF_64",
    "__.SYMDEF_64 SORTED",
    "/",
    "//",
];

/// One file stored in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// The member's file name (no directory components).
    pub name: String,
    /// The member's contents.
    pub data: Vec<u8>,
}

/// Accumulates members and serialises them into archive bytes.
///
/// # Examples
///
/// ```
/// use xcpack_fatbin::{ArchiveBuilder, read_members};
///
/// let mut builder = ArchiveBuilder::new();
/// builder.append("Alpha.swift.o", b"object bytes".to_vec())?;
/// let bytes = builder.finish()?;
/// let members = read_members(&bytes)?;
/// assert_eq!(members[0].name, "Alpha.swift.o");
/// # Ok::<(), xcpack_fatbin::ArchiveError>(())
/// ```
#[derive(Debug, Default)]
pub struct ArchiveBuilder {
    members: Vec<ArchiveMember>,
}

impl ArchiveBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Members are written in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::InvalidName`] for empty names or names with
    /// a path separator or NUL byte, and [`ArchiveError::MemberTooLarge`]
    /// if the member cannot be described by the size field.
    pub fn append(&mut self, name: &str, data: Vec<u8>) -> Result<&mut Self, ArchiveError> {
        validate_name(name)?;
        if padded_name_len(name) + data.len() > MAX_MEMBER_SIZE {
            return Err(ArchiveError::MemberTooLarge {
                name: name.to_owned(),
                size: data.len(),
            });
        }
        self.members.push(ArchiveMember {
            name: name.to_owned(),
            data,
        });
        Ok(self)
    }

    /// Number of members added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no members have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Serialise the archive.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Empty`] when no members were added.
    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        if self.members.is_empty() {
            return Err(ArchiveError::Empty);
        }

        let capacity = AR_MAGIC.len()
            + self
                .members
                .iter()
                .map(|m| HEADER_LEN + padded_name_len(&m.name) + m.data.len() + 1)
                .sum::<usize>();
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(AR_MAGIC);

        for member in &self.members {
            write_member(&mut out, member);
        }
        Ok(out)
    }
}

/// Whether `bytes` begins with the archive magic.
#[must_use]
pub fn is_archive(bytes: &[u8]) -> bool {
    bytes.starts_with(AR_MAGIC)
}

/// Parse every object member of an archive, skipping symbol tables.
///
/// Accepts both BSD extended names and plain 16-byte names (trailing
/// spaces and a GNU-style `/` terminator are trimmed).
///
/// # Errors
///
/// Returns [`ArchiveError`] when the magic, a header, or a member body is
/// malformed or truncated.
pub fn read_members(bytes: &[u8]) -> Result<Vec<ArchiveMember>, ArchiveError> {
    if !is_archive(bytes) {
        return Err(ArchiveError::BadMagic);
    }

    let mut members = Vec::new();
    let mut offset = AR_MAGIC.len();
    while offset < bytes.len() {
        let header = bytes
            .get(offset..offset + HEADER_LEN)
            .ok_or(ArchiveError::Truncated { offset })?;
        let parsed = parse_header(header, offset)?;
        let body_start = offset + HEADER_LEN;
        let body = bytes
            .get(body_start..body_start + parsed.size)
            .ok_or(ArchiveError::Truncated { offset: body_start })?;

        let (name, data) = split_name(&parsed.raw_name, body, offset)?;
        if !SYMBOL_TABLE_NAMES.contains(&name.as_str()) {
            members.push(ArchiveMember {
                name,
                data: data.to_vec(),
            });
        }

        offset = body_start + parsed.size;
        if offset % 2 == 1 {
            offset += 1;
        }
    }
    Ok(members)
}

fn validate_name(name: &str) -> Result<(), ArchiveError> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.contains('/') {
        Some("name contains a path separator")
    } else if name.contains('\0') {
        Some("name contains a NUL byte")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ArchiveError::InvalidName {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Name length rounded up so the member body starts 8-byte aligned.
fn padded_name_len(name: &str) -> usize {
    name.len().div_ceil(NAME_ALIGN) * NAME_ALIGN
}

fn write_member(out: &mut Vec<u8>, member: &ArchiveMember) {
    let name_len = padded_name_len(&member.name);
    let size = name_len + member.data.len();

    push_field(out, &format!("{EXTENDED_NAME_PREFIX}{name_len}"), 16);
    push_field(out, "0", 12);
    push_field(out, "0", 6);
    push_field(out, "0", 6);
    push_field(out, MEMBER_MODE, 8);
    push_field(out, &size.to_string(), 10);
    out.extend_from_slice(HEADER_TERMINATOR);

    out.extend_from_slice(member.name.as_bytes());
    out.resize(out.len() + (name_len - member.name.len()), 0);
    out.extend_from_slice(&member.data);
    if size % 2 == 1 {
        out.push(b'\n');
    }
}

/// Write `value` left-justified in a space-padded field of `width` bytes.
fn push_field(out: &mut Vec<u8>, value: &str, width: usize) {
    out.extend_from_slice(value.as_bytes());
    out.resize(out.len() + width.saturating_sub(value.len()), b' ');
}

struct ParsedHeader {
    raw_name: String,
    size: usize,
}

fn parse_header(header: &[u8], offset: usize) -> Result<ParsedHeader, ArchiveError> {
    let bad = |reason: &str| ArchiveError::BadHeader {
        offset,
        reason: reason.to_owned(),
    };

    if header.get(58..60) != Some(HEADER_TERMINATOR.as_slice()) {
        return Err(bad("missing header terminator"));
    }
    let raw_name = header
        .get(..16)
        .and_then(|b| std::str::from_utf8(b).ok())
        .ok_or_else(|| bad("name field is not UTF-8"))?
        .trim_end()
        .to_owned();
    let size = header
        .get(48..58)
        .and_then(|b| std::str::from_utf8(b).ok())
        .and_then(|s| s.trim_end().parse::<usize>().ok())
        .ok_or_else(|| bad("size field is not a decimal number"))?;

    Ok(ParsedHeader { raw_name, size })
}

/// Separate the member name from its data, resolving extended names.
fn split_name<'a>(
    raw_name: &str,
    body: &'a [u8],
    offset: usize,
) -> Result<(String, &'a [u8]), ArchiveError> {
    let Some(len) = raw_name.strip_prefix(EXTENDED_NAME_PREFIX) else {
        let name = match raw_name {
            "/" | "//" => raw_name,
            other => other.strip_suffix('/').unwrap_or(other),
        };
        return Ok((name.to_owned(), body));
    };

    let bad = |reason: &str| ArchiveError::BadHeader {
        offset,
        reason: reason.to_owned(),
    };
    let len: usize = len
        .parse()
        .map_err(|_| bad("extended name length is not a number"))?;
    let name_bytes = body
        .get(..len)
        .ok_or_else(|| bad("extended name longer than member"))?;
    let trimmed_len = name_bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name_bytes.len());
    let name = std::str::from_utf8(name_bytes.get(..trimmed_len).unwrap_or_default())
        .map_err(|_| bad("extended name is not UTF-8"))?;
    Ok((name.to_owned(), body.get(len..).unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn build(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ArchiveBuilder::new();
        for (name, data) in members {
            builder.append(name, data.to_vec()).expect("valid member");
        }
        builder.finish().expect("non-empty archive")
    }

    #[test]
    fn round_trips_members_in_order() {
        let bytes = build(&[
            ("Alpha.swift.o", b"alpha"),
            ("AlphaHelpers.swift.o", b"helpers!"),
            ("x.o", b"odd"),
        ]);
        let members = read_members(&bytes).expect("parse");
        let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["Alpha.swift.o", "AlphaHelpers.swift.o", "x.o"]);
        assert_eq!(members[2].data, b"odd");
    }

    #[test]
    fn output_is_reproducible() {
        let members: &[(&str, &[u8])] = &[("a.o", b"one"), ("b.o", b"two")];
        assert_eq!(build(members), build(members));
    }

    #[test]
    fn member_bodies_are_eight_byte_aligned() {
        let bytes = build(&[("abc.o", b"payload")]);
        // magic + header + padded name
        let body_start = AR_MAGIC.len() + HEADER_LEN + 8;
        assert_eq!(&bytes[body_start..body_start + 7], b"payload");
        assert_eq!(&bytes[AR_MAGIC.len()..AR_MAGIC.len() + 5], b"#1/8 ");
    }

    #[test]
    fn skips_symbol_table_members() {
        let mut bytes = AR_MAGIC.to_vec();
        let symdef = ArchiveMember {
            name: "__.SYMDEF SORTED".to_owned(),
            data: vec![0; 8],
        };
        write_member(&mut bytes, &symdef);
        write_member(
            &mut bytes,
            &ArchiveMember {
                name: "a.o".to_owned(),
                data: b"obj".to_vec(),
            },
        );
        let members = read_members(&bytes).expect("parse");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "a.o");
    }

    #[test]
    fn reads_plain_short_names() {
        let mut bytes = AR_MAGIC.to_vec();
        push_field(&mut bytes, "short.o/", 16);
        push_field(&mut bytes, "0", 12);
        push_field(&mut bytes, "0", 6);
        push_field(&mut bytes, "0", 6);
        push_field(&mut bytes, "644", 8);
        push_field(&mut bytes, "4", 10);
        bytes.extend_from_slice(HEADER_TERMINATOR);
        bytes.extend_from_slice(b"data");
        let members = read_members(&bytes).expect("parse");
        assert_eq!(members[0].name, "short.o");
        assert_eq!(members[0].data, b"data");
    }

    #[rstest]
    #[case::empty("")]
    #[case::separator("dir/a.o")]
    #[case::nul("a\0.o")]
    fn rejects_invalid_names(#[case] name: &str) {
        let mut builder = ArchiveBuilder::new();
        assert!(matches!(
            builder.append(name, vec![1]),
            Err(ArchiveError::InvalidName { .. })
        ));
    }

    #[test]
    fn empty_archive_is_rejected() {
        assert_eq!(ArchiveBuilder::new().finish(), Err(ArchiveError::Empty));
    }

    #[test]
    fn truncated_archive_is_reported() {
        let bytes = build(&[("a.o", b"0123456789")]);
        let cut = &bytes[..bytes.len() - 4];
        assert!(matches!(
            read_members(cut),
            Err(ArchiveError::Truncated { .. })
        ));
    }

    #[test]
    fn bad_magic_is_reported() {
        assert_eq!(read_members(b"not an archive"), Err(ArchiveError::BadMagic));
    }
}
