//! Full catalog scans - permission-tolerant recursive directory walks.
//!
//! The walk collects directories only and never follows symlinks. Errors
//! shrink the result instead of aborting it: a root that cannot be opened is
//! skipped wholesale, and a directory whose children cannot be enumerated is
//! kept itself while descent stops there. Children of a directory are walked
//! in parallel with rayon.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::catalog::{Catalog, FolderEntry};

/// Scans the given roots into a fresh catalog.
///
/// An empty `roots` slice substitutes the platform default roots. This call
/// is synchronous and can take minutes on large trees; run it off any thread
/// serving queries.
pub fn scan(roots: &[PathBuf], case_insensitive: bool) -> Catalog {
    let roots = effective_roots(roots);
    let mut catalog = Catalog::new(case_insensitive);
    for root in &roots {
        match fs::symlink_metadata(root) {
            Ok(metadata) if metadata.file_type().is_dir() => {}
            Ok(_) => {
                log::warn!("scan root {} is not a directory; skipped", root.display());
                continue;
            }
            Err(error) => {
                log::warn!("scan root {} inaccessible: {}; skipped", root.display(), error);
                continue;
            }
        }
        for entry in walk(root) {
            catalog.insert(entry);
        }
    }
    catalog
}

/// Resolves the configured roots, substituting platform defaults when empty.
pub fn effective_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    if roots.is_empty() {
        default_roots()
    } else {
        roots.to_vec()
    }
}

/// Platform default scan roots.
///
/// On Windows this probes the drive letters for present drives; drive-type
/// classification would need Win32 calls outside this core. Elsewhere the
/// filesystem root covers everything.
#[cfg(windows)]
pub fn default_roots() -> Vec<PathBuf> {
    (b'A'..=b'Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
        .filter(|drive| fs::metadata(drive).is_ok())
        .collect()
}

#[cfg(not(windows))]
pub fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("/")]
}

/// Walks one directory tree, returning the directory itself plus every
/// reachable subdirectory.
fn walk(path: &Path) -> Vec<FolderEntry> {
    let mut out = vec![FolderEntry::from_path(path, is_hidden(path))];

    let read_dir = match fs::read_dir(path) {
        Ok(iter) => iter,
        // Keep the directory itself; just stop descending here.
        Err(_) => return out,
    };

    let subdirs: Vec<PathBuf> = read_dir
        .filter_map(std::result::Result::ok)
        .filter(|entry| {
            entry
                .file_type()
                .map(|kind| kind.is_dir())
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect();

    let children: Vec<Vec<FolderEntry>> = subdirs
        .into_par_iter()
        .map(|subdir| walk(&subdir))
        .collect();
    out.extend(children.into_iter().flatten());
    out
}

/// Hidden detection: the hidden attribute on Windows, a dot prefix elsewhere.
#[cfg(windows)]
pub fn is_hidden(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    fs::symlink_metadata(path)
        .map(|metadata| metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn paths_of(catalog: &Catalog) -> Vec<String> {
        catalog.iter().map(|e| e.full_path.clone()).collect()
    }

    #[test]
    fn childless_root_yields_exactly_the_root() {
        let temp = TempDir::new().unwrap();
        let catalog = scan(&[temp.path().to_path_buf()], false);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains(&temp.path().to_string_lossy()));
    }

    #[test]
    fn nested_directories_are_collected() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::create_dir(temp.path().join("c")).unwrap();

        let catalog = scan(&[temp.path().to_path_buf()], false);
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn files_are_not_indexed() {
        let temp = TempDir::new().unwrap();
        File::create(temp.path().join("note.txt")).unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let catalog = scan(&[temp.path().to_path_buf()], false);
        let paths = paths_of(&catalog);
        assert_eq!(catalog.len(), 2);
        assert!(paths.iter().all(|p| !p.ends_with("note.txt")));
    }

    #[test]
    fn inaccessible_root_is_skipped() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("good")).unwrap();
        let missing = temp.path().join("does-not-exist");

        let catalog = scan(&[missing, temp.path().join("good")], false);
        assert_eq!(catalog.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_keeps_itself_but_not_children() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir_all(locked.join("invisible")).unwrap();
        fs::create_dir(temp.path().join("open")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        if fs::read_dir(&locked).is_ok() {
            // Running as root; permission bits are not enforced.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let catalog = scan(&[temp.path().to_path_buf()], false);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let paths = paths_of(&catalog);
        assert!(paths.iter().any(|p| p.ends_with("locked")));
        assert!(paths.iter().any(|p| p.ends_with("open")));
        assert!(!paths.iter().any(|p| p.ends_with("invisible")));
    }

    #[cfg(unix)]
    #[test]
    fn dot_directories_are_marked_hidden() {
        let temp = TempDir::new().unwrap();
        // Scan a non-hidden subdirectory: the TempDir itself is created with
        // a `.tmp` prefix and would otherwise count as hidden too.
        let root = temp.path().join("root");
        fs::create_dir(&root).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::create_dir(root.join("src")).unwrap();

        let catalog = scan(&[root], false);
        let hidden: Vec<_> = catalog
            .iter()
            .filter(|e| e.hidden)
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(hidden, vec![".git"]);
    }

    #[test]
    fn symlinked_directories_are_not_followed() {
        #[cfg(unix)]
        {
            let temp = TempDir::new().unwrap();
            fs::create_dir(temp.path().join("real")).unwrap();
            std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link"))
                .unwrap();

            let catalog = scan(&[temp.path().to_path_buf()], false);
            let paths = paths_of(&catalog);
            // DirEntry::file_type does not follow symlinks, so the link is
            // not classified as a directory.
            assert!(!paths.iter().any(|p| p.ends_with("link")));
        }
    }
}
