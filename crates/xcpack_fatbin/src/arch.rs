//! Supported CPU architectures.
//!
//! The pipeline builds for exactly two architectures. Each maps to the
//! Mach-O `cputype`/`cpusubtype` pair recorded in universal binary headers
//! and to the architecture component of a Swift target triple.

use crate::error::UniversalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 64-bit ABI flag OR-ed into the base CPU type.
const CPU_ARCH_ABI64: i32 = 0x0100_0000;
const CPU_TYPE_X86: i32 = 7;
const CPU_TYPE_ARM: i32 = 12;
const CPU_SUBTYPE_X86_64_ALL: i32 = 3;
const CPU_SUBTYPE_ARM64_ALL: i32 = 0;

/// A target CPU architecture.
///
/// The derived ordering is the slice order used when fusing, so fused
/// output does not depend on the order inputs were supplied in.
///
/// # Examples
///
/// ```
/// use xcpack_fatbin::Architecture;
///
/// let arch: Architecture = "arm64".parse().expect("known architecture");
/// assert_eq!(arch.as_str(), "arm64");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Architecture {
    /// Intel 64-bit.
    #[serde(rename = "x86_64")]
    X86_64,
    /// Apple silicon / ARMv8 64-bit.
    #[serde(rename = "arm64")]
    Arm64,
}

impl Architecture {
    /// Every supported architecture in slice order.
    pub const ALL: [Self; 2] = [Self::X86_64, Self::Arm64];

    /// The conventional architecture name used in triples and plists.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Arm64 => "arm64",
        }
    }

    /// The Mach-O `cputype` for this architecture.
    #[must_use]
    pub const fn cpu_type(self) -> i32 {
        match self {
            Self::X86_64 => CPU_ARCH_ABI64 | CPU_TYPE_X86,
            Self::Arm64 => CPU_ARCH_ABI64 | CPU_TYPE_ARM,
        }
    }

    /// The Mach-O `cpusubtype` for this architecture.
    #[must_use]
    pub const fn cpu_subtype(self) -> i32 {
        match self {
            Self::X86_64 => CPU_SUBTYPE_X86_64_ALL,
            Self::Arm64 => CPU_SUBTYPE_ARM64_ALL,
        }
    }

    /// Map a Mach-O CPU type back to an architecture.
    ///
    /// Capability bits in the high byte of the subtype are ignored.
    #[must_use]
    pub const fn from_cpu(cpu_type: i32, cpu_subtype: i32) -> Option<Self> {
        let subtype = cpu_subtype & 0x00ff_ffff;
        match (cpu_type, subtype) {
            (t, CPU_SUBTYPE_X86_64_ALL) if t == CPU_ARCH_ABI64 | CPU_TYPE_X86 => {
                Some(Self::X86_64)
            }
            (t, CPU_SUBTYPE_ARM64_ALL) if t == CPU_ARCH_ABI64 | CPU_TYPE_ARM => {
                Some(Self::Arm64)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = UniversalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86_64" => Ok(Self::X86_64),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            other => Err(UniversalError::UnknownArchitecture {
                name: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::x86_64(Architecture::X86_64)]
    #[case::arm64(Architecture::Arm64)]
    fn cpu_codes_round_trip(#[case] arch: Architecture) {
        assert_eq!(
            Architecture::from_cpu(arch.cpu_type(), arch.cpu_subtype()),
            Some(arch)
        );
    }

    #[test]
    fn arm64e_subtype_is_not_arm64() {
        assert_eq!(Architecture::from_cpu(0x0100_000c, 2), None);
    }

    #[test]
    fn aarch64_alias_parses_as_arm64() {
        assert_eq!("aarch64".parse::<Architecture>().ok(), Some(Architecture::Arm64));
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!("armv7".parse::<Architecture>().is_err());
    }

    #[test]
    fn slice_order_puts_x86_64_first() {
        let mut archs = vec![Architecture::Arm64, Architecture::X86_64];
        archs.sort();
        assert_eq!(archs, Architecture::ALL);
    }
}
