//! Path inventory (§4.4): the per-session record of what exists locally and
//! remotely, the sets derived from comparing the two, and the "just
//! received" suppression set.

use crate::event::{Event, EventKind};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct PathInventory {
    pub shared_folder: PathBuf,
    pub local_rel_paths: HashSet<String>,
    pub local_empty_folders: HashSet<String>,
    pub remote_rel_paths: HashSet<String>,
    pub remote_empty_folders: HashSet<String>,
    pub matched: HashSet<String>,
    pub local_only: HashSet<String>,
    pub remote_only: HashSet<String>,
    just_received: HashSet<Event>,
}

impl PathInventory {
    /// Walks `shared_folder` and records every file and every empty
    /// directory as a relative path.
    pub fn new(shared_folder: impl Into<PathBuf>) -> io::Result<Self> {
        let shared_folder = shared_folder.into();
        let (files, empty_dirs) = walk(&shared_folder, &shared_folder)?;
        Ok(Self {
            shared_folder,
            local_rel_paths: files,
            local_empty_folders: empty_dirs,
            remote_rel_paths: HashSet::new(),
            remote_empty_folders: HashSet::new(),
            matched: HashSet::new(),
            local_only: HashSet::new(),
            remote_only: HashSet::new(),
            just_received: HashSet::new(),
        })
    }

    pub fn calc_matched_files(&mut self) {
        self.matched = self
            .local_rel_paths
            .intersection(&self.remote_rel_paths)
            .cloned()
            .collect();
        self.local_only = self
            .local_rel_paths
            .difference(&self.remote_rel_paths)
            .cloned()
            .collect();
        self.remote_only = self
            .remote_rel_paths
            .difference(&self.local_rel_paths)
            .cloned()
            .collect();
    }

    /// Lifts a set of relative paths into event tuples, for the reconciler
    /// to dispatch uniformly with events from the coalescer.
    pub fn list_to_event(paths: &HashSet<String>, kind: EventKind, is_dir: bool) -> Vec<Event> {
        paths
            .iter()
            .map(|p| Event::new(p.clone(), None, is_dir, kind))
            .collect()
    }

    /// After a directory move, adds (`add = true`) or removes (`add =
    /// false`) every file under `root` from the local inventory. Walks
    /// `root` itself, not the whole shared folder (§11 OQ-2).
    pub fn update_local_files_from_dir(&mut self, root: &str, add: bool) -> io::Result<()> {
        let abs_root = self.shared_folder.join(root);
        if !abs_root.is_dir() {
            return Ok(());
        }
        let (files, _empty_dirs) = walk(&self.shared_folder, &abs_root)?;
        for rel in files {
            if add {
                self.local_rel_paths.insert(rel);
            } else {
                self.local_rel_paths.remove(&rel);
            }
        }
        Ok(())
    }

    pub fn add_just_received(&mut self, event: Event) {
        self.just_received.insert(event);
    }

    /// Removes `event` from the just-received set if present, returning
    /// whether it was there.
    pub fn take_just_received(&mut self, event: &Event) -> bool {
        self.just_received.remove(event)
    }

    pub fn clear_just_received(&mut self) {
        self.just_received.clear();
    }
}

/// Recursively walks `root` (which must be inside or equal to
/// `shared_folder`), returning relative-path sets of files and of empty
/// directories, both stripped of the `shared_folder` prefix.
fn walk(shared_folder: &Path, root: &Path) -> io::Result<(HashSet<String>, HashSet<String>)> {
    let mut files = HashSet::new();
    let mut empty_dirs = HashSet::new();
    if !root.is_dir() {
        return Ok((files, empty_dirs));
    }
    walk_into(shared_folder, root, &mut files, &mut empty_dirs)?;
    Ok((files, empty_dirs))
}

fn walk_into(
    shared_folder: &Path,
    dir: &Path,
    files: &mut HashSet<String>,
    empty_dirs: &mut HashSet<String>,
) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let rel = relativize(shared_folder, &path);
            if fs::read_dir(&path)?.next().is_none() {
                empty_dirs.insert(rel);
            }
            walk_into(shared_folder, &path, files, empty_dirs)?;
        } else if file_type.is_file() {
            files.insert(relativize(shared_folder, &path));
        }
    }
    Ok(())
}

fn relativize(shared_folder: &Path, path: &Path) -> String {
    path.strip_prefix(shared_folder)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn new_records_files_and_empty_directories() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"yo").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();

        let inv = PathInventory::new(dir.path()).unwrap();
        assert!(inv.local_rel_paths.contains("a.txt"));
        assert!(inv.local_rel_paths.contains("sub/b.txt"));
        assert!(inv.local_empty_folders.contains("empty"));
        assert!(!inv.local_empty_folders.contains("sub"));
    }

    #[test]
    fn calc_matched_files_computes_set_differences() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("shared.txt"), b"x").unwrap();
        fs::write(dir.path().join("local_only.txt"), b"x").unwrap();

        let mut inv = PathInventory::new(dir.path()).unwrap();
        inv.remote_rel_paths.insert("shared.txt".into());
        inv.remote_rel_paths.insert("remote_only.txt".into());
        inv.calc_matched_files();

        assert_eq!(inv.matched, HashSet::from(["shared.txt".to_string()]));
        assert_eq!(inv.local_only, HashSet::from(["local_only.txt".to_string()]));
        assert_eq!(inv.remote_only, HashSet::from(["remote_only.txt".to_string()]));
    }

    #[test]
    fn update_local_files_from_dir_walks_the_passed_root_only() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("moved")).unwrap();
        fs::write(dir.path().join("moved/inner.txt"), b"x").unwrap();
        fs::write(dir.path().join("unrelated.txt"), b"x").unwrap();

        // Construct inventory before `moved/` existed, as if the directory
        // just appeared via a move.
        fs::remove_dir_all(dir.path().join("moved")).unwrap();
        let mut inv = PathInventory::new(dir.path()).unwrap();
        assert!(!inv.local_rel_paths.contains("unrelated.txt.moved-marker"));

        fs::create_dir(dir.path().join("moved")).unwrap();
        fs::write(dir.path().join("moved/inner.txt"), b"x").unwrap();
        inv.update_local_files_from_dir("moved", true).unwrap();

        assert!(inv.local_rel_paths.contains("moved/inner.txt"));
    }

    #[test]
    fn just_received_is_consumed_exactly_once() {
        let dir = TempDir::new().unwrap();
        let mut inv = PathInventory::new(dir.path()).unwrap();
        let ev = Event::created("a.txt", false);
        inv.add_just_received(ev.clone());
        assert!(inv.take_just_received(&ev));
        assert!(!inv.take_just_received(&ev));
    }

    #[test]
    fn list_to_event_lifts_paths_uniformly() {
        let paths: HashSet<String> = ["a.txt".to_string(), "b.txt".to_string()].into();
        let events = PathInventory::list_to_event(&paths, EventKind::Created, false);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::Created && !e.is_dir));
    }
}
