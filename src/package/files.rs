// src/package/files.rs

//! File lists carried by package headers
//!
//! Paths are stored split the way package headers store them: a table of
//! directory names (each ending in `/`) and, per file, an index into that
//! table plus a basename. Relocation only has to rewrite the directory
//! table.

use crate::hash::{HashAlgorithm, digests_equal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

const S_IFMT: u32 = 0o170000;
const S_IFSOCK: u32 = 0o140000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFBLK: u32 = 0o060000;
const S_IFDIR: u32 = 0o040000;
const S_IFCHR: u32 = 0o020000;
const S_IFIFO: u32 = 0o010000;

/// File type derived from the mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

impl FileKind {
    /// Classify a `st_mode` value
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            S_IFCHR => Self::CharDevice,
            S_IFBLK => Self::BlockDevice,
            S_IFIFO => Self::Fifo,
            S_IFSOCK => Self::Socket,
            // Headers without type bits describe regular files
            _ => Self::Regular,
        }
    }

    /// Type bits for this kind
    pub const fn mode_bits(self) -> u32 {
        match self {
            Self::Regular => S_IFREG,
            Self::Directory => S_IFDIR,
            Self::Symlink => S_IFLNK,
            Self::CharDevice => S_IFCHR,
            Self::BlockDevice => S_IFBLK,
            Self::Fifo => S_IFIFO,
            Self::Socket => S_IFSOCK,
        }
    }
}

/// Per-file attribute flags (`%config`, `%doc`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const NONE: FileFlags = FileFlags(0);
    pub const CONFIG: FileFlags = FileFlags(1 << 0);
    pub const DOC: FileFlags = FileFlags(1 << 1);
    pub const MISSINGOK: FileFlags = FileFlags(1 << 3);
    pub const NOREPLACE: FileFlags = FileFlags(1 << 4);
    pub const GHOST: FileFlags = FileFlags(1 << 6);
    pub const LICENSE: FileFlags = FileFlags(1 << 7);
    pub const README: FileFlags = FileFlags(1 << 8);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: FileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_config(self) -> bool {
        self.contains(Self::CONFIG)
    }

    /// Documentation in the broad sense: `%doc`, `%license`, `%readme`
    pub fn is_doc(self) -> bool {
        self.0 & (Self::DOC.0 | Self::LICENSE.0 | Self::README.0) != 0
    }
}

impl BitOr for FileFlags {
    type Output = FileFlags;

    fn bitor(self, rhs: FileFlags) -> FileFlags {
        FileFlags(self.0 | rhs.0)
    }
}

/// Recorded state of an installed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    #[default]
    Normal,
    /// Overwritten by a file from another package
    Replaced,
    /// Never laid down (excluded docs, languages, ...)
    NotInstalled,
    /// Lives on a shared network filesystem
    NetShared,
    /// Skipped because of its multilib color
    WrongColor,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Replaced => "replaced",
            Self::NotInstalled => "not_installed",
            Self::NetShared => "netshared",
            Self::WrongColor => "wrong_color",
        }
    }
}

/// One file of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Index into the owning `FileSet`'s directory table
    pub dir_index: usize,
    pub basename: String,
    pub mode: u32,
    pub size: u64,
    /// Hex digest for regular files
    pub digest: Option<String>,
    /// Target for symlinks
    pub link_to: Option<String>,
    pub flags: FileFlags,
    /// Multilib color (1 = ELF32, 2 = ELF64)
    #[serde(default)]
    pub color: u32,
    /// Languages the file belongs to; empty means every language
    #[serde(default)]
    pub langs: Vec<String>,
    #[serde(default)]
    pub state: FileState,
}

impl FileEntry {
    fn with_mode(mode: u32) -> Self {
        Self {
            dir_index: 0,
            basename: String::new(),
            mode,
            size: 0,
            digest: None,
            link_to: None,
            flags: FileFlags::NONE,
            color: 0,
            langs: Vec::new(),
            state: FileState::Normal,
        }
    }

    /// A regular file with its size and hex digest
    pub fn regular(size: u64, digest: impl Into<String>) -> Self {
        Self {
            size,
            digest: Some(digest.into()),
            ..Self::with_mode(S_IFREG | 0o644)
        }
    }

    /// A `%config` regular file
    pub fn config(size: u64, digest: impl Into<String>) -> Self {
        Self::regular(size, digest).with_flags(FileFlags::CONFIG)
    }

    /// A `%config(noreplace)` regular file
    pub fn noreplace(size: u64, digest: impl Into<String>) -> Self {
        Self::regular(size, digest).with_flags(FileFlags::CONFIG | FileFlags::NOREPLACE)
    }

    pub fn directory() -> Self {
        Self {
            size: 4096,
            ..Self::with_mode(S_IFDIR | 0o755)
        }
    }

    pub fn symlink(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            size: target.len() as u64,
            link_to: Some(target),
            ..Self::with_mode(S_IFLNK | 0o777)
        }
    }

    /// Add attribute flags
    pub fn with_flags(mut self, flags: FileFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    pub fn with_langs(mut self, langs: &[&str]) -> Self {
        self.langs = langs.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn with_state(mut self, state: FileState) -> Self {
        self.state = state;
        self
    }

    #[inline]
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    pub fn is_config(&self) -> bool {
        self.flags.is_config()
    }

    pub fn is_ghost(&self) -> bool {
        self.flags.contains(FileFlags::GHOST)
    }
}

/// A relocation request: files under `old_prefix` move to `new_prefix`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    pub old_prefix: String,
    pub new_prefix: String,
}

impl Relocation {
    pub fn new(old_prefix: impl Into<String>, new_prefix: impl Into<String>) -> Self {
        Self {
            old_prefix: trim_prefix(old_prefix.into()),
            new_prefix: trim_prefix(new_prefix.into()),
        }
    }

    /// Rewrite a directory name (with trailing `/`) if it lies under the old prefix
    fn apply(&self, dirname: &str) -> Option<String> {
        let rest = dirname.strip_prefix(self.old_prefix.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(format!("{}{}", self.new_prefix, rest))
    }
}

impl fmt::Display for Relocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.old_prefix, self.new_prefix)
    }
}

fn trim_prefix(mut prefix: String) -> String {
    while prefix.len() > 1 && prefix.ends_with('/') {
        prefix.pop();
    }
    prefix
}

/// The complete file list of a package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSet {
    /// Directory names, each ending in `/`
    pub dirnames: Vec<String>,
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub digest_algo: HashAlgorithm,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a file at an absolute path, interning its directory
    pub fn add(&mut self, path: &str, mut entry: FileEntry) -> usize {
        let (dir, base) = split_path(path);
        let dir_index = match self.dirnames.iter().position(|d| d == &dir) {
            Some(i) => i,
            None => {
                self.dirnames.push(dir);
                self.dirnames.len() - 1
            }
        };
        entry.dir_index = dir_index;
        entry.basename = base;
        self.files.push(entry);
        self.files.len() - 1
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FileEntry> {
        self.files.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &FileEntry)> {
        self.files.iter().enumerate()
    }

    /// Directory of file `index` (with trailing `/`)
    pub fn dirname(&self, index: usize) -> &str {
        self.files
            .get(index)
            .and_then(|f| self.dirnames.get(f.dir_index))
            .map(String::as_str)
            .unwrap_or("/")
    }

    /// Absolute path of file `index`
    pub fn path(&self, index: usize) -> String {
        match self.files.get(index) {
            Some(f) => format!("{}{}", self.dirname(index), f.basename),
            None => String::new(),
        }
    }

    /// True if some file has exactly this path
    pub fn contains_path(&self, path: &str) -> bool {
        let (dir, base) = split_path(path);
        self.files
            .iter()
            .any(|f| f.basename == base && self.dirnames.get(f.dir_index) == Some(&dir))
    }

    /// OR of every file color
    pub fn color(&self) -> u32 {
        self.files.iter().fold(0, |acc, f| acc | f.color)
    }

    /// Apply relocations to the directory table; the longest matching old
    /// prefix wins for each directory.
    pub fn relocate(&mut self, relocations: &[Relocation]) {
        if relocations.is_empty() {
            return;
        }
        for dir in &mut self.dirnames {
            let best = relocations
                .iter()
                .filter(|r| r.apply(dir).is_some())
                .max_by_key(|r| r.old_prefix.len());
            if let Some(new_dir) = best.and_then(|r| r.apply(dir)) {
                *dir = if new_dir.ends_with('/') {
                    new_dir
                } else {
                    format!("{}/", new_dir)
                };
            }
        }
    }

    /// Do file `a` of `self` and file `b` of `other` differ in content?
    ///
    /// Ghost files never differ. Different file types always differ; regular
    /// files compare digests and symlinks compare targets. Other types only
    /// compare by type.
    pub fn files_differ(&self, a: usize, other: &FileSet, b: usize) -> bool {
        let (Some(fa), Some(fb)) = (self.files.get(a), other.files.get(b)) else {
            return true;
        };
        if fa.is_ghost() || fb.is_ghost() {
            return false;
        }
        let kind = fa.kind();
        if kind != fb.kind() {
            return true;
        }
        match kind {
            FileKind::Regular => {
                if self.digest_algo != other.digest_algo {
                    return true;
                }
                match (&fa.digest, &fb.digest) {
                    (Some(da), Some(db)) => !digests_equal(da, db),
                    (None, None) => fa.size != fb.size,
                    _ => true,
                }
            }
            FileKind::Symlink => fa.link_to != fb.link_to,
            _ => false,
        }
    }
}

/// Split an absolute path into (`dir/`, basename)
pub fn split_path(path: &str) -> (String, String) {
    match path.rfind('/') {
        Some(pos) => (path[..=pos].to_string(), path[pos + 1..].to_string()),
        None => ("/".to_string(), path.to_string()),
    }
}
