// src/resolver/builtin.rs

//! Built-in `rpmlib(...)` capabilities
//!
//! Packages declare which package-format features they rely on through
//! dependencies in the reserved `rpmlib(` namespace. They are answered from
//! this table alone; no index or database is consulted.

use crate::package::{Dependency, Sense};

/// Prefix of the reserved capability namespace
pub const RPMLIB_PREFIX: &str = "rpmlib(";

/// Prefix of package config dependencies
pub const CONFIG_PREFIX: &str = "config(";

/// One supported feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinCapability {
    pub name: &'static str,
    pub evr: &'static str,
    pub description: &'static str,
}

const CAPABILITIES: &[BuiltinCapability] = &[
    BuiltinCapability {
        name: "rpmlib(VersionedDependencies)",
        evr: "3.0.3-1",
        description: "PreReq:, Provides:, and Obsoletes: dependencies support versions.",
    },
    BuiltinCapability {
        name: "rpmlib(CompressedFileNames)",
        evr: "3.0.4-1",
        description: "file name(s) stored as (dirName,baseName,dirIndex) tuple, not as path.",
    },
    BuiltinCapability {
        name: "rpmlib(PayloadIsBzip2)",
        evr: "3.0.5-1",
        description: "package payload can be compressed using bzip2.",
    },
    BuiltinCapability {
        name: "rpmlib(PayloadIsXz)",
        evr: "5.2-1",
        description: "package payload can be compressed using xz.",
    },
    BuiltinCapability {
        name: "rpmlib(PayloadIsLzma)",
        evr: "4.4.6-1",
        description: "package payload can be compressed using lzma.",
    },
    BuiltinCapability {
        name: "rpmlib(PayloadIsZstd)",
        evr: "5.4.18-1",
        description: "package payload can be compressed using zstd.",
    },
    BuiltinCapability {
        name: "rpmlib(PayloadFilesHavePrefix)",
        evr: "4.0-1",
        description: "package payload file(s) have \"./\" prefix.",
    },
    BuiltinCapability {
        name: "rpmlib(ExplicitPackageProvide)",
        evr: "4.0-1",
        description: "package name-version-release is not implicitly provided.",
    },
    BuiltinCapability {
        name: "rpmlib(HeaderLoadSortsTags)",
        evr: "4.0.1-1",
        description: "header tags are always sorted after being loaded.",
    },
    BuiltinCapability {
        name: "rpmlib(ScriptletInterpreterArgs)",
        evr: "4.0.3-1",
        description: "the scriptlet interpreter can use arguments from header.",
    },
    BuiltinCapability {
        name: "rpmlib(PartialHardlinkSets)",
        evr: "4.0.4-1",
        description: "a hardlink file set may be installed without being complete.",
    },
    BuiltinCapability {
        name: "rpmlib(ConcurrentAccess)",
        evr: "4.1-1",
        description: "package scriptlets may access the rpm database while installing.",
    },
    BuiltinCapability {
        name: "rpmlib(BuiltinLuaScripts)",
        evr: "4.2.2-1",
        description: "internal support for lua scripts.",
    },
    BuiltinCapability {
        name: "rpmlib(FileDigests)",
        evr: "4.6.0-1",
        description: "file digest algorithm is per package configurable",
    },
    BuiltinCapability {
        name: "rpmlib(FileCaps)",
        evr: "4.6.1-1",
        description: "support for POSIX.1e file capabilities",
    },
];

/// Every supported capability
pub fn capabilities() -> &'static [BuiltinCapability] {
    CAPABILITIES
}

/// Is the name in the reserved namespace?
#[inline]
pub fn is_builtin(name: &str) -> bool {
    name.starts_with(RPMLIB_PREFIX)
}

/// Names that never produce ordering edges
#[inline]
pub fn never_orders(name: &str) -> bool {
    name.starts_with(RPMLIB_PREFIX) || name.starts_with(CONFIG_PREFIX)
}

/// Answer a dependency from the built-in table
///
/// `None` when the name is outside the reserved namespace; unknown
/// `rpmlib(...)` names are `Some(false)`.
pub fn check_builtin(dep: &Dependency) -> Option<bool> {
    if !is_builtin(&dep.name) {
        return None;
    }
    let satisfied = CAPABILITIES
        .iter()
        .filter(|cap| cap.name == dep.name)
        .any(|cap| Dependency::versioned(cap.name, Sense::EQUAL, cap.evr).overlaps(dep));
    Some(satisfied)
}
