//! Platform triples - WHERE a toolchain builds, runs, and emits code for.
//!
//! A triple spells (architecture, vendor, OS, ABI) with the vendor and OS
//! fields optional. Parsing and formatting are exact inverses: the canonical
//! string form is a pure function of the fields, and absent fields are kept
//! distinct from an explicit `unknown` so every accepted spelling round-trips.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigError;

/// Known architecture tokens and their word size in bits.
///
/// The word size picks the `lib32`/`lib64` runtime directory of a prefix.
const ARCH_TABLE: &[(&str, u32)] = &[
    ("i486", 32),
    ("i686", 32),
    ("x86_64", 64),
    ("arm", 32),
    ("armeb", 32),
    ("aarch64", 64),
    ("riscv32", 32),
    ("riscv32be", 32),
    ("riscv64", 64),
    ("loongarch64", 64),
    ("mips64el", 64),
];

/// Known operating-system tokens.
const OS_TOKENS: &[&str] = &["linux", "w64", "none"];

/// ABI tokens that denote a bare-metal target with no hosted OS or C library.
const FREESTANDING_ABIS: &[&str] = &["elf", "eabi", "eabihf"];

/// 64-bit architectures with a 32-bit sibling ISA worth a multilib runtime.
const MULTILIB_ARCHES: &[&str] = &["x86_64", "riscv64", "mips64el"];

/// A parsed platform triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TripleSpec {
    arch: String,
    vendor: Option<String>,
    os: Option<String>,
    abi: String,
}

impl TripleSpec {
    /// Parse a triple string.
    ///
    /// Accepted spellings: `arch-abi`, `arch-os-abi`, `arch-vendor-abi`,
    /// `arch-vendor-os-abi`. The second field of a three-field triple is an
    /// OS when it is a known OS token and a vendor otherwise.
    pub fn parse(triple: &str) -> Result<TripleSpec, ConfigError> {
        let fields: Vec<&str> = triple.split('-').collect();

        if fields.iter().any(|f| f.is_empty()) {
            return Err(ConfigError::EmptyField {
                triple: triple.to_string(),
            });
        }

        let spec = match fields.as_slice() {
            [arch, abi] => TripleSpec {
                arch: arch.to_string(),
                vendor: None,
                os: None,
                abi: abi.to_string(),
            },
            [arch, mid, abi] => {
                if OS_TOKENS.contains(mid) {
                    TripleSpec {
                        arch: arch.to_string(),
                        vendor: None,
                        os: Some(mid.to_string()),
                        abi: abi.to_string(),
                    }
                } else {
                    TripleSpec {
                        arch: arch.to_string(),
                        vendor: Some(mid.to_string()),
                        os: None,
                        abi: abi.to_string(),
                    }
                }
            }
            [arch, vendor, os, abi] => {
                if !OS_TOKENS.contains(os) && *os != "unknown" {
                    return Err(ConfigError::UnknownOs {
                        triple: triple.to_string(),
                        os: os.to_string(),
                    });
                }
                TripleSpec {
                    arch: arch.to_string(),
                    vendor: Some(vendor.to_string()),
                    os: Some(os.to_string()),
                    abi: abi.to_string(),
                }
            }
            _ => {
                return Err(ConfigError::FieldCount {
                    triple: triple.to_string(),
                })
            }
        };

        if !ARCH_TABLE.iter().any(|(a, _)| *a == spec.arch) {
            return Err(ConfigError::UnknownArch {
                triple: triple.to_string(),
                arch: spec.arch.clone(),
            });
        }

        Ok(spec)
    }

    /// Architecture field.
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Vendor field, `unknown` when absent.
    pub fn vendor(&self) -> &str {
        self.vendor.as_deref().unwrap_or("unknown")
    }

    /// Vendor field only when explicitly spelled and not `unknown`.
    pub fn explicit_vendor(&self) -> Option<&str> {
        self.vendor.as_deref().filter(|v| *v != "unknown")
    }

    /// OS field, `unknown` when absent.
    pub fn os(&self) -> &str {
        self.os.as_deref().unwrap_or("unknown")
    }

    /// ABI field.
    pub fn abi(&self) -> &str {
        &self.abi
    }

    /// Whether this triple denotes a bare-metal target with no hosted OS
    /// or C library.
    pub fn is_freestanding(&self) -> bool {
        FREESTANDING_ABIS.contains(&self.abi.as_str())
            && matches!(self.os(), "none" | "unknown")
    }

    /// Whether a toolchain hosted on this triple runs on Windows.
    pub fn is_windows_host(&self) -> bool {
        self.os() == "w64" || self.abi.starts_with("mingw")
    }

    /// Whether this target supports a secondary 32-bit runtime.
    pub fn needs_multilib(&self) -> bool {
        MULTILIB_ARCHES.contains(&self.arch.as_str()) && self.os() == "linux"
    }

    /// Word size of the architecture in bits.
    pub fn word_size(&self) -> u32 {
        ARCH_TABLE
            .iter()
            .find(|(a, _)| *a == self.arch)
            .map(|(_, bits)| *bits)
            .unwrap_or(64)
    }

    /// Vendor-insensitive comparison, used to match vendor-patched component
    /// sources against a generic triple.
    pub fn weak_eq(&self, other: &TripleSpec) -> bool {
        self.arch == other.arch && self.os() == other.os() && self.abi == other.abi
    }

    /// The triple with the vendor field removed.
    pub fn drop_vendor(&self) -> TripleSpec {
        TripleSpec {
            arch: self.arch.clone(),
            vendor: None,
            os: self.os.clone(),
            abi: self.abi.clone(),
        }
    }
}

impl fmt::Display for TripleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arch)?;
        if let Some(vendor) = &self.vendor {
            write!(f, "-{}", vendor)?;
        }
        if let Some(os) = &self.os {
            write!(f, "-{}", os)?;
        }
        write!(f, "-{}", self.abi)
    }
}

impl FromStr for TripleSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TripleSpec::parse(s)
    }
}

/// The role a (build, host, target) combination plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleCategory {
    /// build == host == target
    Native,
    /// build == host != target
    Cross,
    /// build, host, target mutually distinct
    CanadianCross,
    /// target is bare-metal
    FreestandingCross,
}

impl fmt::Display for RoleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleCategory::Native => "native",
            RoleCategory::Cross => "cross",
            RoleCategory::CanadianCross => "canadian-cross",
            RoleCategory::FreestandingCross => "freestanding-cross",
        };
        write!(f, "{}", name)
    }
}

/// Classify a (build, host, target) combination.
///
/// Combinations the stage catalog cannot express are rejected here rather
/// than silently special-cased.
pub fn classify(
    build: &TripleSpec,
    host: &TripleSpec,
    target: &TripleSpec,
) -> Result<RoleCategory, ConfigError> {
    let unsupported = |reason: &str| ConfigError::UnsupportedRole {
        build: build.to_string(),
        host: host.to_string(),
        target: target.to_string(),
        reason: reason.to_string(),
    };

    if build.is_freestanding() || host.is_freestanding() {
        return Err(unsupported(
            "build and host must be hosted platforms; a bare-metal triple cannot run a toolchain",
        ));
    }

    if target.is_freestanding() {
        return Ok(RoleCategory::FreestandingCross);
    }

    if build == host {
        if host == target {
            Ok(RoleCategory::Native)
        } else {
            Ok(RoleCategory::Cross)
        }
    } else if host == target {
        Err(unsupported(
            "a build machine differing from a matching host/target pair needs a prior cross \
             toolchain declared as a borrow source; request the cross variant first",
        ))
    } else if build == target {
        Err(unsupported(
            "host and target must not wrap around to the build platform",
        ))
    } else {
        Ok(RoleCategory::CanadianCross)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TripleSpec {
        TripleSpec::parse(s).unwrap()
    }

    #[test]
    fn test_parse_two_fields() {
        let spec = t("arm-eabi");
        assert_eq!(spec.arch(), "arm");
        assert_eq!(spec.vendor(), "unknown");
        assert_eq!(spec.os(), "unknown");
        assert_eq!(spec.abi(), "eabi");
    }

    #[test]
    fn test_parse_three_fields_os() {
        let spec = t("x86_64-linux-gnu");
        assert_eq!(spec.os(), "linux");
        assert_eq!(spec.vendor(), "unknown");
        assert_eq!(spec.abi(), "gnu");
    }

    #[test]
    fn test_parse_three_fields_vendor() {
        let spec = t("riscv64-unknown-elf");
        assert_eq!(spec.vendor(), "unknown");
        assert_eq!(spec.os(), "unknown");
        assert_eq!(spec.abi(), "elf");
    }

    #[test]
    fn test_parse_four_fields() {
        let spec = t("x86_64-pc-linux-gnu");
        assert_eq!(spec.arch(), "x86_64");
        assert_eq!(spec.vendor(), "pc");
        assert_eq!(spec.os(), "linux");
        assert_eq!(spec.abi(), "gnu");
    }

    #[test]
    fn test_round_trip_all_spellings() {
        for s in [
            "arm-eabi",
            "arm-none-eabi",
            "x86_64-linux-gnu",
            "x86_64-pc-linux-gnu",
            "x86_64-unknown-linux-gnu",
            "x86_64-w64-mingw32",
            "riscv64-unknown-elf",
            "aarch64-linux-gnu",
            "loongarch64-linux-gnu",
        ] {
            assert_eq!(t(s).to_string(), s, "round trip failed for {s}");
        }
    }

    #[test]
    fn test_malformed_single_field_rejected() {
        // A bare word is not a triple; rejected before any environment exists.
        assert!(matches!(
            TripleSpec::parse("bad"),
            Err(ConfigError::FieldCount { .. })
        ));
    }

    #[test]
    fn test_empty_field_rejected() {
        assert!(matches!(
            TripleSpec::parse("x86_64--gnu"),
            Err(ConfigError::EmptyField { .. })
        ));
    }

    #[test]
    fn test_unknown_arch_rejected() {
        assert!(matches!(
            TripleSpec::parse("sparc9-linux-gnu"),
            Err(ConfigError::UnknownArch { .. })
        ));
    }

    #[test]
    fn test_unknown_os_rejected() {
        assert!(matches!(
            TripleSpec::parse("x86_64-pc-plan9-gnu"),
            Err(ConfigError::UnknownOs { .. })
        ));
    }

    #[test]
    fn test_explicit_unknown_is_distinct_spelling() {
        let short = t("x86_64-linux-gnu");
        let long = t("x86_64-unknown-linux-gnu");
        assert_ne!(short, long);
        assert!(short.weak_eq(&long));
        assert_eq!(long.drop_vendor().to_string(), "x86_64-linux-gnu");
    }

    #[test]
    fn test_predicates() {
        assert!(t("arm-none-eabi").is_freestanding());
        assert!(t("riscv64-unknown-elf").is_freestanding());
        assert!(!t("x86_64-linux-gnu").is_freestanding());

        assert!(t("x86_64-w64-mingw32").is_windows_host());
        assert!(!t("x86_64-linux-gnu").is_windows_host());

        assert!(t("x86_64-linux-gnu").needs_multilib());
        assert!(!t("aarch64-linux-gnu").needs_multilib());
        assert!(!t("riscv64-unknown-elf").needs_multilib());
    }

    #[test]
    fn test_word_size() {
        assert_eq!(t("i686-linux-gnu").word_size(), 32);
        assert_eq!(t("x86_64-linux-gnu").word_size(), 64);
        assert_eq!(t("arm-none-eabi").word_size(), 32);
    }

    #[test]
    fn test_classify_native_cross_canadian() {
        let linux = t("x86_64-linux-gnu");
        let arm = t("aarch64-linux-gnu");
        let mingw = t("x86_64-w64-mingw32");

        assert_eq!(classify(&linux, &linux, &linux).unwrap(), RoleCategory::Native);
        assert_eq!(classify(&linux, &linux, &arm).unwrap(), RoleCategory::Cross);
        assert_eq!(
            classify(&linux, &mingw, &arm).unwrap(),
            RoleCategory::CanadianCross
        );
    }

    #[test]
    fn test_classify_freestanding() {
        let linux = t("x86_64-linux-gnu");
        let mingw = t("x86_64-w64-mingw32");
        let bare = t("arm-none-eabi");

        assert_eq!(
            classify(&linux, &linux, &bare).unwrap(),
            RoleCategory::FreestandingCross
        );
        assert_eq!(
            classify(&linux, &mingw, &bare).unwrap(),
            RoleCategory::FreestandingCross
        );
    }

    #[test]
    fn test_classify_rejects_gaps() {
        let linux = t("x86_64-linux-gnu");
        let arm = t("aarch64-linux-gnu");
        let bare = t("arm-none-eabi");

        // host == target but build differs: needs an explicit prior cross.
        assert!(classify(&linux, &arm, &arm).is_err());
        // target wraps back to build.
        assert!(classify(&linux, &arm, &linux).is_err());
        // bare-metal cannot build or host.
        assert!(classify(&bare, &bare, &bare).is_err());
        assert!(classify(&linux, &bare, &arm).is_err());
    }
}
