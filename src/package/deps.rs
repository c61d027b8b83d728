// src/package/deps.rs

//! Dependency predicates and dependency sets
//!
//! A dependency is a `(name, sense, evr)` triple: `glibc >= 2.34` is the name
//! `glibc` with the LESS/GREATER/EQUAL bits `GREATER|EQUAL` and evr `2.34`.
//! The same `Sense` bits also carry the context a Requires was declared in
//! (`Requires(pre)`, `Requires(postun)`, ...), which is what the orderer
//! uses to tell pre-requisites from co-requisites.

use crate::error::{Error, Result};
use crate::version::{RpmVersion, rpmvercmp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Dependency sense and context flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sense(u32);

impl Sense {
    pub const ANY: Sense = Sense(0);
    pub const LESS: Sense = Sense(1 << 1);
    pub const GREATER: Sense = Sense(1 << 2);
    pub const EQUAL: Sense = Sense(1 << 3);
    /// Legacy `PreReq:` marker
    pub const PREREQ: Sense = Sense(1 << 6);
    pub const INTERP: Sense = Sense(1 << 8);
    pub const SCRIPT_PRE: Sense = Sense(1 << 9);
    pub const SCRIPT_POST: Sense = Sense(1 << 10);
    pub const SCRIPT_PREUN: Sense = Sense(1 << 11);
    pub const SCRIPT_POSTUN: Sense = Sense(1 << 12);
    pub const SCRIPT_VERIFY: Sense = Sense(1 << 13);
    pub const RPMLIB: Sense = Sense(1 << 24);

    pub const LESS_EQUAL: Sense = Sense(Self::LESS.0 | Self::EQUAL.0);
    pub const GREATER_EQUAL: Sense = Sense(Self::GREATER.0 | Self::EQUAL.0);

    const SENSE_MASK: u32 = Self::LESS.0 | Self::GREATER.0 | Self::EQUAL.0;
    const ALL_REQUIRES_MASK: u32 = Self::INTERP.0
        | Self::PREREQ.0
        | Self::SCRIPT_PRE.0
        | Self::SCRIPT_POST.0
        | Self::SCRIPT_PREUN.0
        | Self::SCRIPT_POSTUN.0
        | Self::SCRIPT_VERIFY.0
        | Self::RPMLIB.0;
    const INSTALL_ONLY_MASK: u32 = Self::SCRIPT_PRE.0 | Self::SCRIPT_POST.0 | Self::RPMLIB.0;
    const ERASE_ONLY_MASK: u32 = Self::SCRIPT_PREUN.0 | Self::SCRIPT_POSTUN.0;

    /// Raw bit value
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits as stored in a header or the database
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// True when every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: Sense) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set
    #[inline]
    pub const fn intersects(self, other: Sense) -> bool {
        self.0 & other.0 != 0
    }

    /// Only the comparison bits (LESS/GREATER/EQUAL)
    #[inline]
    pub const fn comparison(self) -> Sense {
        Sense(self.0 & Self::SENSE_MASK)
    }

    /// Old-style `PreReq:` with no script context
    pub const fn is_legacy_prereq(self) -> bool {
        self.0 & Self::ALL_REQUIRES_MASK == Self::PREREQ.0
    }

    /// Needed while the package's install scriptlets run
    pub const fn is_install_prereq(self) -> bool {
        self.0 & Self::INSTALL_ONLY_MASK != 0
    }

    /// Needed while the package's erase scriptlets run
    pub const fn is_erase_prereq(self) -> bool {
        self.0 & Self::ERASE_ONLY_MASK != 0
    }

    /// Operator text for the comparison bits
    pub fn operator(self) -> &'static str {
        match self.comparison().0 {
            x if x == Self::LESS.0 => "<",
            x if x == Self::LESS_EQUAL.0 => "<=",
            x if x == Self::EQUAL.0 => "=",
            x if x == Self::GREATER_EQUAL.0 => ">=",
            x if x == Self::GREATER.0 => ">",
            _ => "",
        }
    }

    /// Parse an operator token
    pub fn parse_operator(op: &str) -> Option<Sense> {
        match op {
            "<" => Some(Self::LESS),
            "<=" | "=<" => Some(Self::LESS_EQUAL),
            "=" | "==" => Some(Self::EQUAL),
            ">=" | "=>" => Some(Self::GREATER_EQUAL),
            ">" => Some(Self::GREATER),
            _ => None,
        }
    }
}

impl BitOr for Sense {
    type Output = Sense;

    fn bitor(self, rhs: Sense) -> Sense {
        Sense(self.0 | rhs.0)
    }
}

impl BitOrAssign for Sense {
    fn bitor_assign(&mut self, rhs: Sense) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Sense {
    type Output = Sense;

    fn bitand(self, rhs: Sense) -> Sense {
        Sense(self.0 & rhs.0)
    }
}

/// Which header array a dependency came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DepTag {
    Provides,
    Requires,
    Conflicts,
    Obsoletes,
}

impl DepTag {
    /// Single-letter prefix used in formatted dependency strings
    pub const fn letter(self) -> char {
        match self {
            Self::Provides => 'P',
            Self::Requires => 'R',
            Self::Conflicts => 'C',
            Self::Obsoletes => 'O',
        }
    }

    /// Column value used in the database
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provides => "provides",
            Self::Requires => "requires",
            Self::Conflicts => "conflicts",
            Self::Obsoletes => "obsoletes",
        }
    }
}

/// A single dependency predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub sense: Sense,
    pub evr: Option<String>,
    /// Multilib color of the dependency (0 = uncolored)
    #[serde(default)]
    pub color: u32,
}

impl Dependency {
    /// Unversioned dependency on a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sense: Sense::ANY,
            evr: None,
            color: 0,
        }
    }

    /// Versioned dependency
    pub fn versioned(name: impl Into<String>, sense: Sense, evr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sense,
            evr: Some(evr.into()),
            color: 0,
        }
    }

    /// Parse `name`, `name op evr` (whitespace separated)
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [name] => Ok(Self::new(*name)),
            [name, op, evr] => {
                let sense = Sense::parse_operator(op).ok_or_else(|| {
                    Error::ParseError(format!("Invalid operator '{}' in dependency '{}'", op, s))
                })?;
                Ok(Self::versioned(*name, sense, *evr))
            }
            _ => Err(Error::ParseError(format!("Malformed dependency '{}'", s))),
        }
    }

    /// Add context bits (e.g. `Sense::SCRIPT_PRE`)
    pub fn with_context(mut self, context: Sense) -> Self {
        self.sense |= context;
        self
    }

    /// Set the multilib color
    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// File dependencies name an absolute path
    #[inline]
    pub fn is_file(&self) -> bool {
        self.name.starts_with('/')
    }

    /// True if the dependency carries a usable version range
    fn has_range(&self) -> bool {
        self.sense.comparison() != Sense::ANY
            && self.evr.as_deref().is_some_and(|evr| !evr.is_empty())
    }

    /// Formatted dependency string prefixed with the tag letter, e.g.
    /// `R glibc >= 2.34`. Used as the dependency cache key.
    pub fn dnevr(&self, tag: DepTag) -> String {
        format!("{} {}", tag.letter(), self)
    }

    /// Do the version ranges of two same-named dependencies overlap?
    ///
    /// `self` is usually the provide and `req` the requirement. A missing
    /// epoch on the requirement side is not promoted to match an explicit
    /// epoch on the provide side.
    pub fn overlaps(&self, req: &Dependency) -> bool {
        if self.name != req.name {
            return false;
        }

        // An existence test on either side always overlaps
        if !self.has_range() || !req.has_range() {
            return true;
        }

        let (Ok(a), Ok(b)) = (
            RpmVersion::parse(self.evr.as_deref().unwrap_or_default()),
            RpmVersion::parse(req.evr.as_deref().unwrap_or_default()),
        ) else {
            return false;
        };

        let mut sense = match (a.epoch, b.epoch) {
            (Some(ae), Some(be)) => ae.cmp(&be),
            (Some(ae), None) if ae > 0 => Ordering::Equal,
            (None, Some(be)) if be > 0 => Ordering::Less,
            _ => Ordering::Equal,
        };

        if sense == Ordering::Equal {
            sense = rpmvercmp(&a.version, &b.version);
            if sense == Ordering::Equal
                && let (Some(ar), Some(br)) = (&a.release, &b.release)
            {
                sense = rpmvercmp(ar, br);
            }
        }

        let af = self.sense;
        let bf = req.sense;
        match sense {
            Ordering::Less => af.intersects(Sense::GREATER) || bf.intersects(Sense::LESS),
            Ordering::Greater => af.intersects(Sense::LESS) || bf.intersects(Sense::GREATER),
            Ordering::Equal => {
                (af.intersects(Sense::EQUAL) && bf.intersects(Sense::EQUAL))
                    || (af.intersects(Sense::LESS) && bf.intersects(Sense::LESS))
                    || (af.intersects(Sense::GREATER) && bf.intersects(Sense::GREATER))
            }
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.has_range() {
            write!(
                f,
                " {} {}",
                self.sense.operator(),
                self.evr.as_deref().unwrap_or_default()
            )?;
        }
        Ok(())
    }
}

/// An ordered collection of dependencies from one header array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    tag: DepTag,
    deps: Vec<Dependency>,
}

impl DependencySet {
    /// Create an empty set for a tag
    pub fn new(tag: DepTag) -> Self {
        Self {
            tag,
            deps: Vec::new(),
        }
    }

    /// Create a set from existing dependencies
    pub fn from_vec(tag: DepTag, deps: Vec<Dependency>) -> Self {
        Self { tag, deps }
    }

    pub fn tag(&self) -> DepTag {
        self.tag
    }

    pub fn push(&mut self, dep: Dependency) {
        self.deps.push(dep);
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dependency> {
        self.deps.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Dependency> {
        self.deps.get(index)
    }

    /// True if any entry has the given name
    pub fn contains_name(&self, name: &str) -> bool {
        self.deps.iter().any(|d| d.name == name)
    }

    /// Index of the first entry whose range overlaps `dep`
    pub fn find_match(&self, dep: &Dependency) -> Option<usize> {
        self.deps.iter().position(|d| d.overlaps(dep))
    }

    /// True if any entry overlaps `dep`
    pub fn any_matches(&self, dep: &Dependency) -> bool {
        self.find_match(dep).is_some()
    }
}

impl<'a> IntoIterator for &'a DependencySet {
    type Item = &'a Dependency;
    type IntoIter = std::slice::Iter<'a, Dependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.deps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(s: &str) -> Dependency {
        Dependency::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        let d = dep("glibc >= 2.34");
        assert_eq!(d.name, "glibc");
        assert_eq!(d.sense, Sense::GREATER_EQUAL);
        assert_eq!(d.to_string(), "glibc >= 2.34");
        assert_eq!(d.dnevr(DepTag::Requires), "R glibc >= 2.34");

        assert_eq!(dep("bash").to_string(), "bash");
        assert!(Dependency::parse("a ~ 1").is_err());
        assert!(Dependency::parse("a >=").is_err());
    }

    #[test]
    fn test_overlap_unversioned_always_matches() {
        assert!(dep("foo = 1.0").overlaps(&dep("foo")));
        assert!(dep("foo").overlaps(&dep("foo >= 9")));
        assert!(!dep("foo").overlaps(&dep("bar")));
    }

    #[test]
    fn test_overlap_ranges() {
        let provide = dep("foo = 1.2-3");
        assert!(provide.overlaps(&dep("foo >= 1.0")));
        assert!(provide.overlaps(&dep("foo <= 1.2")));
        assert!(!provide.overlaps(&dep("foo > 1.2")));
        assert!(!provide.overlaps(&dep("foo < 1.2")));
        assert!(provide.overlaps(&dep("foo = 1.2-3")));
        assert!(!provide.overlaps(&dep("foo = 1.2-4")));
        assert!(dep("foo < 2").overlaps(&dep("foo < 1")));
    }

    #[test]
    fn test_overlap_epochs() {
        // Requirement without epoch is not promoted against an explicit epoch
        assert!(dep("foo = 1:1.0").overlaps(&dep("foo >= 2.0")));
        // Provide without epoch loses against a requirement with one
        assert!(!dep("foo = 2.0").overlaps(&dep("foo >= 1:1.0")));
        assert!(dep("foo = 2:1.0").overlaps(&dep("foo >= 1:3.0")));
    }

    #[test]
    fn test_prereq_classification() {
        let plain = Sense::ANY;
        let legacy = Sense::PREREQ;
        let pre = Sense::PREREQ | Sense::SCRIPT_PRE;
        let postun = Sense::SCRIPT_POSTUN;

        assert!(!plain.is_legacy_prereq());
        assert!(legacy.is_legacy_prereq());
        assert!(!pre.is_legacy_prereq());
        assert!(pre.is_install_prereq());
        assert!(!pre.is_erase_prereq());
        assert!(postun.is_erase_prereq());
        assert!((Sense::GREATER_EQUAL | Sense::RPMLIB).is_install_prereq());
    }

    #[test]
    fn test_set_find_match() {
        let mut set = DependencySet::new(DepTag::Provides);
        set.push(dep("libfoo.so.1"));
        set.push(dep("foo = 2.0"));

        assert_eq!(set.find_match(&dep("foo >= 1.5")), Some(1));
        assert!(!set.any_matches(&dep("foo >= 3")));
        assert!(set.contains_name("libfoo.so.1"));
    }
}
