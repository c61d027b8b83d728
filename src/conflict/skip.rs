// src/conflict/skip.rs

//! Policy pre-pass over element files

use super::{FileAction, FileActions};
use crate::config::ResolverConfig;
use crate::package::FileKind;
use crate::transaction::element::TransactionElement;
use tracing::debug;

/// Mark files that policy keeps off the disk
///
/// Added elements honor multilib color, netshared paths, install languages
/// and the doc/config exclusions; a packaged directory whose files were all
/// dropped here is dropped as well. Removed elements only honor netshared
/// paths.
pub fn skip_files(config: &ResolverConfig, element: &TransactionElement, actions: &mut FileActions) {
    let files = element.files();

    if element.is_removed() {
        for (i, _) in files.iter() {
            if config.is_netshared(&files.path(i)) {
                actions.set(i, FileAction::SkipNetShared);
            }
        }
        return;
    }

    let tscolor = config.transaction_color;
    let mut remaining = vec![0usize; files.dirnames.len()];
    let mut emptied = vec![false; files.dirnames.len()];
    for (_, file) in files.iter() {
        if let Some(count) = remaining.get_mut(file.dir_index) {
            *count += 1;
        }
    }

    for (i, file) in files.iter() {
        if tscolor != 0 && file.color != 0 && tscolor & file.color == 0 {
            actions.set(i, FileAction::SkipColor);
            continue;
        }

        let path = files.path(i);
        if config.is_netshared(&path) {
            actions.set(i, FileAction::SkipNetShared);
            continue;
        }

        let dropped = !config.lang_allowed(&file.langs)
            || (config.no_configs && file.is_config())
            || (config.exclude_docs && file.flags.is_doc());
        if dropped {
            debug!("{}: not installing {}", element.nevr(), path);
            actions.set(i, FileAction::SkipNoState);
            if let Some(count) = remaining.get_mut(file.dir_index) {
                *count = count.saturating_sub(1);
                emptied[file.dir_index] = true;
            }
        }
    }

    for (dir_index, dirname) in files.dirnames.iter().enumerate() {
        if remaining[dir_index] > 0 || !emptied[dir_index] {
            continue;
        }
        let dir_path = dirname.trim_end_matches('/');
        if dir_path.is_empty() {
            continue;
        }
        for (i, file) in files.iter() {
            if actions.get(i).is_skipping() || file.kind() != FileKind::Directory {
                continue;
            }
            if files.path(i) == dir_path {
                debug!("{}: dropping emptied directory {}", element.nevr(), dir_path);
                actions.set(i, FileAction::SkipNoState);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{FileEntry, FileFlags, PackageHeader};
    use crate::transaction::available::AvailableIndex;
    use std::sync::Arc;

    fn added(header: PackageHeader) -> TransactionElement {
        let header = Arc::new(header);
        let files = Arc::new(header.files.clone());
        let key = AvailableIndex::new().add(Arc::clone(&header), Arc::clone(&files));
        TransactionElement::added(header, files, key, false, Vec::new(), Vec::new())
    }

    fn run(config: &ResolverConfig, element: &TransactionElement) -> FileActions {
        let mut actions = FileActions::new(element.files().len());
        skip_files(config, element, &mut actions);
        actions
    }

    #[test]
    fn test_color_and_netshared() {
        let e = added(
            PackageHeader::builder("lib", "1-1")
                .file("/usr/lib/libx.so", FileEntry::regular(1, "aa").with_color(1))
                .file("/usr/lib64/libx.so", FileEntry::regular(1, "bb").with_color(2))
                .file("/mnt/nfs/data", FileEntry::regular(1, "cc"))
                .build()
                .unwrap(),
        );
        let config = ResolverConfig {
            transaction_color: 2,
            netshared_paths: vec!["/mnt/nfs".to_string()],
            ..Default::default()
        };
        let actions = run(&config, &e);
        assert_eq!(actions.get(0), FileAction::SkipColor);
        assert_eq!(actions.get(1), FileAction::Unknown);
        assert_eq!(actions.get(2), FileAction::SkipNetShared);
    }

    #[test]
    fn test_langs_docs_and_emptied_dirs() {
        let e = added(
            PackageHeader::builder("app", "1-1")
                .file("/usr/share/locale/de", FileEntry::directory())
                .file("/usr/share/locale/de/app.mo", FileEntry::regular(1, "aa").with_langs(&["de"]))
                .file("/usr/share/locale/en", FileEntry::directory())
                .file("/usr/share/locale/en/app.mo", FileEntry::regular(1, "bb").with_langs(&["en"]))
                .file(
                    "/usr/share/doc/app/README",
                    FileEntry::regular(1, "cc").with_flags(FileFlags::DOC),
                )
                .build()
                .unwrap(),
        );
        let config = ResolverConfig {
            install_langs: vec!["en_US".to_string()],
            exclude_docs: true,
            ..Default::default()
        };
        let actions = run(&config, &e);
        assert_eq!(actions.get(0), FileAction::SkipNoState);
        assert_eq!(actions.get(1), FileAction::SkipNoState);
        assert_eq!(actions.get(2), FileAction::Unknown);
        assert_eq!(actions.get(3), FileAction::Unknown);
        assert_eq!(actions.get(4), FileAction::SkipNoState);
    }

    #[test]
    fn test_removed_only_netshared() {
        let header = Arc::new(
            PackageHeader::builder("old", "1-1")
                .file("/mnt/nfs/x", FileEntry::regular(1, "aa").with_color(1))
                .file("/usr/share/doc/old/README", FileEntry::regular(1, "bb").with_flags(FileFlags::DOC))
                .build()
                .unwrap(),
        );
        let e = TransactionElement::removed(header, 3, None);
        let config = ResolverConfig {
            transaction_color: 2,
            exclude_docs: true,
            netshared_paths: vec!["/mnt/nfs".to_string()],
            ..Default::default()
        };
        let actions = run(&config, &e);
        assert_eq!(actions.get(0), FileAction::SkipNetShared);
        assert_eq!(actions.get(1), FileAction::Unknown);
    }
}
