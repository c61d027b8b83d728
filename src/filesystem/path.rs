// src/filesystem/path.rs

//! Mapping package paths below the install root
//!
//! Package paths are absolute (`/etc/foo.conf`) but every on-disk probe
//! happens below the configured root. Paths come from package headers, so
//! `..` components are rejected rather than resolved.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Turn an absolute package path into a relative one
///
/// `.` components and repeated slashes are dropped. The empty result is
/// allowed and stands for the root itself.
pub fn root_relative(path: &str) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();

    for component in Path::new(path.trim_start_matches('/')).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path.to_string()));
            }
        }
    }

    Ok(normalized)
}

/// Join a package path onto the install root
pub fn under_root(root: &Path, path: &str) -> Result<PathBuf> {
    Ok(root.join(root_relative(path)?))
}

/// Canonical spelling of a directory name: leading `/`, no trailing `/`
/// except for the root itself
pub fn normalize_dir(dirname: &str) -> String {
    let parts: Vec<&str> = dirname
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Split off the last component of a normalized directory
///
/// Returns `None` for the root.
pub fn split_last(dir: &str) -> Option<(String, String)> {
    if dir == "/" {
        return None;
    }
    let pos = dir.rfind('/')?;
    let parent = if pos == 0 {
        "/".to_string()
    } else {
        dir[..pos].to_string()
    };
    Some((parent, dir[pos + 1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_relative() {
        assert_eq!(
            root_relative("/usr/bin/foo").unwrap(),
            PathBuf::from("usr/bin/foo")
        );
        assert_eq!(
            root_relative("//usr/./lib/").unwrap(),
            PathBuf::from("usr/lib")
        );
        assert_eq!(root_relative("/").unwrap(), PathBuf::new());
    }

    #[test]
    fn test_root_relative_rejects_traversal() {
        assert!(root_relative("/usr/../../etc/passwd").is_err());
        assert!(under_root(Path::new("/srv/root"), "../x").is_err());
    }

    #[test]
    fn test_under_root() {
        assert_eq!(
            under_root(Path::new("/srv/root"), "/etc/hosts").unwrap(),
            PathBuf::from("/srv/root/etc/hosts")
        );
    }

    #[test]
    fn test_normalize_and_split() {
        assert_eq!(normalize_dir("/usr/lib/"), "/usr/lib");
        assert_eq!(normalize_dir(""), "/");
        assert_eq!(normalize_dir("//"), "/");
        assert_eq!(
            split_last("/usr/lib"),
            Some(("/usr".to_string(), "lib".to_string()))
        );
        assert_eq!(split_last("/usr"), Some(("/".to_string(), "usr".to_string())));
        assert_eq!(split_last("/"), None);
    }
}
