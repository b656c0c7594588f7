//! Mach-O universal ("fat") binary codec.
//!
//! A universal binary is a big-endian header listing one `fat_arch`
//! record per architecture, followed by each single-architecture slice at
//! an aligned offset:
//!
//! ```text
//! fat_header { magic = 0xcafebabe, nfat_arch }
//! fat_arch   { cputype, cpusubtype, offset, size, align } * nfat_arch
//! <padding> slice <padding> slice ...
//! ```
//!
//! [`fuse`] is the only place the pipeline combines architectures. Slices
//! are laid out in [`Architecture`] order with zero padding, so the
//! output depends only on the slice contents.

use crate::arch::Architecture;
use crate::archive::is_archive;
use crate::error::UniversalError;
use serde::Serialize;

/// Magic number of a 32-bit-offset universal binary, big-endian on disk.
pub const FAT_MAGIC: u32 = 0xcafe_babe;

const FAT_HEADER_LEN: usize = 8;
const FAT_ARCH_LEN: usize = 20;
/// Alignment (log2) for static archive slices, matching `lipo`.
const ARCHIVE_ALIGN_LOG2: u32 = 3;
/// Alignment (log2) for Mach-O image slices: one 16 KiB page.
const IMAGE_ALIGN_LOG2: u32 = 14;
/// Sanity bound on the slice count, mirroring `lipo`'s own limit.
const MAX_SLICES: u32 = 32;

/// One single-architecture input to [`fuse`].
#[derive(Debug, Clone, Copy)]
pub struct ThinSlice<'a> {
    /// The architecture the bytes were compiled for.
    pub architecture: Architecture,
    /// The single-architecture binary (object archive or Mach-O image).
    pub bytes: &'a [u8],
}

/// A `fat_arch` record read from a universal binary header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FatArch {
    /// Raw Mach-O CPU type.
    pub cpu_type: i32,
    /// Raw Mach-O CPU subtype.
    pub cpu_subtype: i32,
    /// Byte offset of the slice.
    pub offset: u32,
    /// Slice length in bytes.
    pub size: u32,
    /// Slice alignment as a power of two.
    pub align: u32,
}

impl FatArch {
    /// The supported architecture this record describes, if any.
    #[must_use]
    pub const fn architecture(&self) -> Option<Architecture> {
        Architecture::from_cpu(self.cpu_type, self.cpu_subtype)
    }
}

/// Whether `bytes` starts with the universal binary magic.
#[must_use]
pub fn is_universal(bytes: &[u8]) -> bool {
    read_u32(bytes, 0) == Some(FAT_MAGIC)
}

/// Fuse single-architecture binaries into one universal binary.
///
/// At least two distinct architectures are required: a universal artefact
/// built from a single architecture is refused.
///
/// # Errors
///
/// Returns [`UniversalError`] for fewer than two slices, a repeated
/// architecture, an empty or already-universal slice, or output larger
/// than 32-bit offsets can address.
///
/// # Examples
///
/// ```
/// use xcpack_fatbin::{Architecture, ThinSlice, fuse, thin};
///
/// let fat = fuse(&[
///     ThinSlice { architecture: Architecture::Arm64, bytes: b"arm" },
///     ThinSlice { architecture: Architecture::X86_64, bytes: b"intel" },
/// ])?;
/// assert_eq!(thin(&fat, Architecture::Arm64)?, b"arm");
/// # Ok::<(), xcpack_fatbin::UniversalError>(())
/// ```
pub fn fuse(slices: &[ThinSlice<'_>]) -> Result<Vec<u8>, UniversalError> {
    if slices.len() < 2 {
        return Err(UniversalError::TooFewSlices {
            count: slices.len(),
        });
    }

    let mut ordered: Vec<ThinSlice<'_>> = slices.to_vec();
    ordered.sort_by_key(|s| s.architecture);
    for pair in ordered.windows(2) {
        if let [a, b] = pair
            && a.architecture == b.architecture
        {
            return Err(UniversalError::DuplicateArchitecture(a.architecture));
        }
    }
    for slice in &ordered {
        if slice.bytes.is_empty() {
            return Err(UniversalError::EmptySlice(slice.architecture));
        }
        if is_universal(slice.bytes) {
            return Err(UniversalError::AlreadyUniversal(slice.architecture));
        }
    }

    let records = layout(&ordered)?;
    let total = records
        .last()
        .map_or(0, |r| r.offset as usize + r.size as usize);

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&FAT_MAGIC.to_be_bytes());
    let count = u32::try_from(records.len()).map_err(|_| UniversalError::TooLarge)?;
    out.extend_from_slice(&count.to_be_bytes());
    for record in &records {
        out.extend_from_slice(&record.cpu_type.to_be_bytes());
        out.extend_from_slice(&record.cpu_subtype.to_be_bytes());
        out.extend_from_slice(&record.offset.to_be_bytes());
        out.extend_from_slice(&record.size.to_be_bytes());
        out.extend_from_slice(&record.align.to_be_bytes());
    }
    for (record, slice) in records.iter().zip(&ordered) {
        out.resize(record.offset as usize, 0);
        out.extend_from_slice(slice.bytes);
    }
    Ok(out)
}

/// Compute aligned offsets for already-ordered slices.
fn layout(ordered: &[ThinSlice<'_>]) -> Result<Vec<FatArch>, UniversalError> {
    let mut cursor = FAT_HEADER_LEN + FAT_ARCH_LEN * ordered.len();
    let mut records = Vec::with_capacity(ordered.len());
    for slice in ordered {
        let align = if is_archive(slice.bytes) {
            ARCHIVE_ALIGN_LOG2
        } else {
            IMAGE_ALIGN_LOG2
        };
        let offset = cursor.next_multiple_of(1usize << align);
        let size = slice.bytes.len();
        records.push(FatArch {
            cpu_type: slice.architecture.cpu_type(),
            cpu_subtype: slice.architecture.cpu_subtype(),
            offset: u32::try_from(offset).map_err(|_| UniversalError::TooLarge)?,
            size: u32::try_from(size).map_err(|_| UniversalError::TooLarge)?,
            align,
        });
        cursor = offset
            .checked_add(size)
            .ok_or(UniversalError::TooLarge)?;
    }
    u32::try_from(cursor).map_err(|_| UniversalError::TooLarge)?;
    Ok(records)
}

/// List the `fat_arch` records of a universal binary.
///
/// # Errors
///
/// Returns [`UniversalError::NotUniversal`] for other inputs and
/// [`UniversalError::Truncated`] when the header or a slice lies beyond
/// the end of the input.
pub fn list_slices(bytes: &[u8]) -> Result<Vec<FatArch>, UniversalError> {
    if !is_universal(bytes) {
        return Err(UniversalError::NotUniversal);
    }
    let count = read_u32(bytes, 4).ok_or_else(|| truncated("missing slice count"))?;
    if count > MAX_SLICES {
        return Err(UniversalError::NotUniversal);
    }

    let mut records = Vec::with_capacity(count as usize);
    for index in 0..count as usize {
        let base = FAT_HEADER_LEN + index * FAT_ARCH_LEN;
        let field = |n: usize| {
            read_u32(bytes, base + n * 4)
                .ok_or_else(|| truncated(&format!("fat_arch record {index} is incomplete")))
        };
        let record = FatArch {
            cpu_type: i32::from_be_bytes(field(0)?.to_be_bytes()),
            cpu_subtype: i32::from_be_bytes(field(1)?.to_be_bytes()),
            offset: field(2)?,
            size: field(3)?,
            align: field(4)?,
        };
        let end = record.offset as usize + record.size as usize;
        if end > bytes.len() {
            return Err(truncated(&format!(
                "slice {index} ends at {end} but input is {} bytes",
                bytes.len()
            )));
        }
        records.push(record);
    }
    Ok(records)
}

/// Extract the slice for `architecture` from a universal binary.
///
/// # Errors
///
/// Returns [`UniversalError::SliceNotFound`] when the architecture is
/// absent, plus the errors of [`list_slices`].
pub fn thin(bytes: &[u8], architecture: Architecture) -> Result<&[u8], UniversalError> {
    let record = list_slices(bytes)?
        .into_iter()
        .find(|r| r.architecture() == Some(architecture))
        .ok_or(UniversalError::SliceNotFound(architecture))?;
    let start = record.offset as usize;
    bytes
        .get(start..start + record.size as usize)
        .ok_or_else(|| truncated("slice out of bounds"))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(raw))
}

fn truncated(reason: &str) -> UniversalError {
    UniversalError::Truncated {
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveBuilder;
    use rstest::{fixture, rstest};

    fn archive_with(name: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = ArchiveBuilder::new();
        builder.append(name, data.to_vec()).expect("valid member");
        builder.finish().expect("archive")
    }

    #[fixture]
    fn x86_archive() -> Vec<u8> {
        archive_with("Alpha.swift.o", b"x86_64 machine code")
    }

    #[fixture]
    fn arm_archive() -> Vec<u8> {
        archive_with("Alpha.swift.o", b"arm64 machine code, a little longer")
    }

    #[rstest]
    fn fuse_then_thin_returns_original_slices(x86_archive: Vec<u8>, arm_archive: Vec<u8>) {
        let fat = fuse(&[
            ThinSlice {
                architecture: Architecture::X86_64,
                bytes: &x86_archive,
            },
            ThinSlice {
                architecture: Architecture::Arm64,
                bytes: &arm_archive,
            },
        ])
        .expect("fuse");

        assert_eq!(thin(&fat, Architecture::X86_64).expect("x86"), x86_archive);
        assert_eq!(thin(&fat, Architecture::Arm64).expect("arm"), arm_archive);
    }

    #[rstest]
    fn input_order_does_not_change_output(x86_archive: Vec<u8>, arm_archive: Vec<u8>) {
        let x86 = ThinSlice {
            architecture: Architecture::X86_64,
            bytes: &x86_archive,
        };
        let arm = ThinSlice {
            architecture: Architecture::Arm64,
            bytes: &arm_archive,
        };
        assert_eq!(
            fuse(&[x86, arm]).expect("fuse"),
            fuse(&[arm, x86]).expect("fuse")
        );
    }

    #[rstest]
    fn archive_slices_use_eight_byte_alignment(x86_archive: Vec<u8>, arm_archive: Vec<u8>) {
        let fat = fuse(&[
            ThinSlice {
                architecture: Architecture::Arm64,
                bytes: &arm_archive,
            },
            ThinSlice {
                architecture: Architecture::X86_64,
                bytes: &x86_archive,
            },
        ])
        .expect("fuse");
        let records = list_slices(&fat).expect("list");
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.align, ARCHIVE_ALIGN_LOG2);
            assert_eq!(record.offset % 8, 0);
        }
        assert_eq!(records[0].architecture(), Some(Architecture::X86_64));
        assert_eq!(records[0].offset, 48);
    }

    #[test]
    fn image_slices_are_page_aligned() {
        let fat = fuse(&[
            ThinSlice {
                architecture: Architecture::X86_64,
                bytes: &[0xcf, 0xfa, 0xed, 0xfe, 7],
            },
            ThinSlice {
                architecture: Architecture::Arm64,
                bytes: &[0xcf, 0xfa, 0xed, 0xfe, 12],
            },
        ])
        .expect("fuse");
        let records = list_slices(&fat).expect("list");
        assert_eq!(records[0].offset, 16_384);
        assert_eq!(records[1].offset, 32_768);
    }

    #[test]
    fn single_slice_is_refused() {
        let err = fuse(&[ThinSlice {
            architecture: Architecture::Arm64,
            bytes: b"arm",
        }])
        .expect_err("one architecture");
        assert_eq!(err, UniversalError::TooFewSlices { count: 1 });
    }

    #[test]
    fn duplicate_architecture_is_refused() {
        let slice = ThinSlice {
            architecture: Architecture::Arm64,
            bytes: b"arm",
        };
        assert_eq!(
            fuse(&[slice, slice]),
            Err(UniversalError::DuplicateArchitecture(Architecture::Arm64))
        );
    }

    #[test]
    fn empty_slice_is_refused() {
        assert_eq!(
            fuse(&[
                ThinSlice {
                    architecture: Architecture::Arm64,
                    bytes: b"arm",
                },
                ThinSlice {
                    architecture: Architecture::X86_64,
                    bytes: b"",
                },
            ]),
            Err(UniversalError::EmptySlice(Architecture::X86_64))
        );
    }

    #[test]
    fn universal_input_is_refused() {
        let nested = fuse(&[
            ThinSlice {
                architecture: Architecture::Arm64,
                bytes: b"arm",
            },
            ThinSlice {
                architecture: Architecture::X86_64,
                bytes: b"x86",
            },
        ])
        .expect("fuse");
        let err = fuse(&[
            ThinSlice {
                architecture: Architecture::Arm64,
                bytes: &nested,
            },
            ThinSlice {
                architecture: Architecture::X86_64,
                bytes: b"x86",
            },
        ])
        .expect_err("nested");
        assert_eq!(err, UniversalError::AlreadyUniversal(Architecture::Arm64));
    }

    #[test]
    fn thin_rejects_non_universal_input() {
        assert_eq!(
            thin(b"!<arch>\n", Architecture::Arm64),
            Err(UniversalError::NotUniversal)
        );
    }

    #[test]
    fn truncated_universal_binary_is_reported() {
        let fat = fuse(&[
            ThinSlice {
                architecture: Architecture::Arm64,
                bytes: b"arm64 slice",
            },
            ThinSlice {
                architecture: Architecture::X86_64,
                bytes: b"x86_64 slice",
            },
        ])
        .expect("fuse");
        let cut = &fat[..fat.len() - 3];
        assert!(matches!(
            list_slices(cut),
            Err(UniversalError::Truncated { .. })
        ));
    }
}
