// src/transaction/problems.rs

//! Problems found while preparing a transaction
//!
//! Problems are data, not errors: every phase appends what it finds and
//! keeps going. The caller decides which kinds block the transaction.

use serde::Serialize;
use std::fmt;

/// Kind of a transaction problem
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display, strum_macros::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    BadArch,
    BadOs,
    AlreadyInstalled,
    BadRelocate,
    UnsatisfiedRequires,
    Conflict,
    /// Two packages of this transaction disagree about a file
    NewFileConflict,
    /// A package of this transaction disagrees with an installed file
    FileConflict,
    OldPackage,
    DiskSpace,
    DiskNodes,
}

/// A single problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub kind: ProblemKind,
    /// NEVR of the package the problem is reported against
    pub pkg_nevr: String,
    /// NEVR of the other package involved, if any
    pub alt_nevr: Option<String>,
    /// Dependency, path, relocation or mount point the problem is about
    pub subject: Option<String>,
    /// Missing bytes or inodes for disk problems
    pub amount: u64,
    /// The package named by `pkg_nevr` is installed, not part of the transaction
    pub installed: bool,
    /// Packages from the universe that would satisfy a missing requirement
    pub suggestions: Vec<String>,
}

impl Problem {
    pub fn new(kind: ProblemKind, pkg_nevr: impl Into<String>) -> Self {
        Self {
            kind,
            pkg_nevr: pkg_nevr.into(),
            alt_nevr: None,
            subject: None,
            amount: 0,
            installed: false,
            suggestions: Vec::new(),
        }
    }

    pub fn with_alt(mut self, alt_nevr: impl Into<String>) -> Self {
        self.alt_nevr = Some(alt_nevr.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    pub fn installed(mut self) -> Self {
        self.installed = true;
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// True for both kinds of file conflict
    pub fn is_file_conflict(&self) -> bool {
        matches!(
            self.kind,
            ProblemKind::FileConflict | ProblemKind::NewFileConflict
        )
    }
}

fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes.div_ceil(1024))
    } else {
        format!("{}MB", bytes.div_ceil(1024 * 1024))
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pkg = if self.installed {
            format!("(installed) {}", self.pkg_nevr)
        } else {
            self.pkg_nevr.clone()
        };
        let alt = self.alt_nevr.as_deref().unwrap_or("");
        let subject = self.subject.as_deref().unwrap_or("");

        match self.kind {
            ProblemKind::BadArch => {
                write!(f, "package {} is intended for a different architecture", pkg)
            }
            ProblemKind::BadOs => write!(
                f,
                "package {} is intended for a different operating system",
                pkg
            ),
            ProblemKind::AlreadyInstalled => write!(f, "package {} is already installed", pkg),
            ProblemKind::BadRelocate => {
                write!(f, "path {} in package {} is not relocatable", subject, pkg)
            }
            ProblemKind::UnsatisfiedRequires => {
                write!(f, "{} is needed by {}", subject, pkg)?;
                if !self.suggestions.is_empty() {
                    write!(f, " (suggested: {})", self.suggestions.join(", "))?;
                }
                Ok(())
            }
            ProblemKind::Conflict => write!(f, "{} conflicts with {}", subject, pkg),
            ProblemKind::NewFileConflict | ProblemKind::FileConflict => write!(
                f,
                "file {} from install of {} conflicts with file from package {}",
                subject, pkg, alt
            ),
            ProblemKind::OldPackage => write!(
                f,
                "package {} (which is newer than {}) is already installed",
                alt, pkg
            ),
            ProblemKind::DiskSpace => write!(
                f,
                "installing package {} needs {} on the {} filesystem",
                pkg,
                human_size(self.amount),
                subject
            ),
            ProblemKind::DiskNodes => write!(
                f,
                "installing package {} needs {} more inodes on the {} filesystem",
                pkg, self.amount, subject
            ),
        }
    }
}

/// Ordered collection of problems
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a problem, dropping exact duplicates
    pub fn push(&mut self, problem: Problem) {
        if !self.problems.contains(&problem) {
            self.problems.push(problem);
        }
    }

    pub fn extend(&mut self, other: ProblemSet) {
        for problem in other.problems {
            self.push(problem);
        }
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Problem> {
        self.problems.iter()
    }

    /// Problems of one kind
    pub fn of_kind(&self, kind: ProblemKind) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(move |p| p.kind == kind)
    }

    pub fn count(&self, kind: ProblemKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn file_conflicts(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(|p| p.is_file_conflict())
    }
}

impl<'a> IntoIterator for &'a ProblemSet {
    type Item = &'a Problem;
    type IntoIter = std::slice::Iter<'a, Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.iter()
    }
}

impl fmt::Display for ProblemSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for problem in &self.problems {
            writeln!(f, "\t{}", problem)?;
        }
        Ok(())
    }
}
