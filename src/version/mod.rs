// src/version/mod.rs

//! Version handling for package EVR strings
//!
//! This module provides parsing and ordering of `[epoch:]version[-release]`
//! strings and the segment-wise comparison used for every version decision
//! in the engine (dependency ranges, upgrade detection, old-package checks).

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A parsed EVR with optional epoch, version and optional release
///
/// The epoch stays optional because dependency matching treats a missing
/// epoch differently from an explicit `0:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RpmVersion {
    pub epoch: Option<u64>,
    pub version: String,
    pub release: Option<String>,
}

impl RpmVersion {
    /// Parse an EVR string
    ///
    /// Format: [epoch:]version[-release]
    /// Examples:
    /// - "1.2.3" → epoch=None, version="1.2.3", release=None
    /// - "2:1.2.3" → epoch=Some(2), version="1.2.3", release=None
    /// - "1.2.3-4.el8" → epoch=None, version="1.2.3", release=Some("4.el8")
    /// - "1:2.3.4-5.el8" → epoch=Some(1), version="2.3.4", release=Some("5.el8")
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();

        let (epoch, rest) = match s.find(':') {
            Some(colon_pos) => {
                let (e, r) = s.split_at(colon_pos);
                let epoch = if e.is_empty() {
                    // Some packages have versions like ":1.02.208-2.fc43"
                    None
                } else {
                    Some(e.parse::<u64>().map_err(|err| {
                        Error::ParseError(format!("Invalid epoch in version '{}': {}", s, err))
                    })?)
                };
                (epoch, &r[1..])
            }
            None => (None, s),
        };

        let (version, release) = match rest.rfind('-') {
            Some(dash_pos) => {
                let (v, r) = rest.split_at(dash_pos);
                let release = &r[1..];
                (
                    v.to_string(),
                    (!release.is_empty()).then(|| release.to_string()),
                )
            }
            None => (rest.to_string(), None),
        };

        if version.is_empty() {
            return Err(Error::ParseError(format!(
                "Empty version component in '{}'",
                s
            )));
        }

        Ok(Self {
            epoch,
            version,
            release,
        })
    }

    /// Build a version from already separated components
    pub fn from_parts(epoch: Option<u64>, version: &str, release: Option<&str>) -> Self {
        Self {
            epoch,
            version: version.to_string(),
            release: release.map(str::to_string),
        }
    }

    /// Epoch with a missing epoch read as zero
    pub fn epoch_or_zero(&self) -> u64 {
        self.epoch.unwrap_or(0)
    }

    /// Compare two versions
    ///
    /// Missing epochs compare as zero; the release only participates when
    /// both sides carry one.
    pub fn compare(&self, other: &RpmVersion) -> Ordering {
        match self.epoch_or_zero().cmp(&other.epoch_or_zero()) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match rpmvercmp(&self.version, &other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (&self.release, &other.release) {
            (Some(a), Some(b)) => rpmvercmp(a, b),
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for RpmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.version)?;
        if let Some(ref release) = self.release {
            write!(f, "-{}", release)?;
        }
        Ok(())
    }
}

impl Ord for RpmVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RpmVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Segment-wise version string comparison
///
/// Both strings are split into maximal runs of digits or letters; any other
/// character only separates segments. Numeric segments compare numerically
/// (leading zeros ignored) and are newer than alphabetic ones. A `~` sorts
/// before everything, including the end of the string, so `1.0~rc1 < 1.0`.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0usize, 0usize);

    let is_sep = |c: u8| !c.is_ascii_alphanumeric() && c != b'~';

    while i < one.len() || j < two.len() {
        while i < one.len() && is_sep(one[i]) {
            i += 1;
        }
        while j < two.len() && is_sep(two[j]) {
            j += 1;
        }

        let tilde_one = one.get(i) == Some(&b'~');
        let tilde_two = two.get(j) == Some(&b'~');
        if tilde_one || tilde_two {
            if !tilde_one {
                return Ordering::Greater;
            }
            if !tilde_two {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        let (start_one, start_two) = (i, j);
        let numeric = one[i].is_ascii_digit();
        if numeric {
            while i < one.len() && one[i].is_ascii_digit() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < one.len() && one[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_alphabetic() {
                j += 1;
            }
        }

        // Segments of different types: numeric is always newer
        if start_two == j {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let mut seg_one = &one[start_one..i];
        let mut seg_two = &two[start_two..j];

        if numeric {
            while seg_one.first() == Some(&b'0') {
                seg_one = &seg_one[1..];
            }
            while seg_two.first() == Some(&b'0') {
                seg_two = &seg_two[1..];
            }
            match seg_one.len().cmp(&seg_two.len()) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        match seg_one.cmp(seg_two) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }

    let rest_one = i < one.len();
    let rest_two = j < two.len();
    match (rest_one, rest_two) {
        (false, false) => Ordering::Equal,
        (false, true) => Ordering::Less,
        _ => Ordering::Greater,
    }
}
