//! Provenance-tagged file-system metadata.
//!
//! A [`FileSystemInfo`] remembers where its fields came from — a raw
//! attribute query, a directory-enumeration record, or an open-handle
//! query — and [`FileSystemInfo::refresh`] re-derives them from that same
//! source. An entry produced by enumeration refreshes purely by path, and
//! a target that has vanished flips `exists` to false while keeping the
//! last-known field values readable.

use std::time::SystemTime;

use crate::error::FsError;
use crate::paths;
use crate::storage::{FileAttributes, FileInfo, FindData, HandleFileInfo, Storage};

/// Where an entry's metadata was sourced from; drives how `refresh`
/// re-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoSource {
    /// Path-based attribute query.
    Attributes,
    /// A record out of a directory enumeration.
    FindResult,
    /// An open-handle query (adds volume serial and link count).
    Handle,
}

/// Which children an enumeration yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Files,
    Directories,
}

/// Whether an enumeration descends into subdirectories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOption {
    TopDirectoryOnly,
    AllDirectories,
}

/// Lazily-populated metadata snapshot for one file-system entry.
///
/// Snapshots go stale the moment they are produced; nothing here watches
/// the file system. Call [`FileSystemInfo::refresh`] to re-query.
#[derive(Debug, Clone)]
pub struct FileSystemInfo {
    path: String,
    name: String,
    exists: bool,
    attributes: FileAttributes,
    creation_time: SystemTime,
    last_access_time: SystemTime,
    last_write_time: SystemTime,
    len: u64,
    volume_serial: Option<u32>,
    link_count: Option<u32>,
    source: InfoSource,
}

fn name_of(path: &str) -> String {
    paths::get_file_or_directory_name(path)
        .unwrap_or(path)
        .to_owned()
}

impl FileSystemInfo {
    /// Snapshot from a path-based attribute query.
    pub fn from_path<S: Storage>(storage: &S, path: &str) -> Result<Self, FsError> {
        let info = storage.get_file_info(&paths::add_extended_prefix(path, false))?;
        Ok(FileSystemInfo {
            path: path.to_owned(),
            name: name_of(path),
            exists: true,
            attributes: info.attributes,
            creation_time: info.creation_time,
            last_access_time: info.last_access_time,
            last_write_time: info.last_write_time,
            len: info.len,
            volume_serial: None,
            link_count: None,
            source: InfoSource::Attributes,
        })
    }

    /// Snapshot from one directory-enumeration record.
    pub fn from_find_result(parent: &str, find: &FindData) -> Self {
        FileSystemInfo {
            path: paths::combine(parent, Some(&find.name)),
            name: find.name.clone(),
            exists: true,
            attributes: find.attributes,
            creation_time: find.creation_time,
            last_access_time: find.last_access_time,
            last_write_time: find.last_write_time,
            len: find.len,
            volume_serial: None,
            link_count: None,
            source: InfoSource::FindResult,
        }
    }

    /// Snapshot through an open handle. The resolved final path is
    /// re-spelled with the caller's volume prefix; device-namespace
    /// targets, which cannot resolve a final path, keep the path they were
    /// asked about.
    pub fn from_handle<S: Storage>(storage: &S, path: &str) -> Result<Self, FsError> {
        let info = storage.get_handle_info(&paths::add_extended_prefix(path, false))?;
        Ok(Self::build_from_handle(path, info))
    }

    fn build_from_handle(path: &str, info: HandleFileInfo) -> Self {
        let resolved_path = match &info.final_path {
            Some(final_path) => paths::replace_casing(path, final_path),
            None => path.to_owned(),
        };
        FileSystemInfo {
            name: name_of(&resolved_path),
            path: resolved_path,
            exists: true,
            attributes: info.attributes,
            creation_time: info.creation_time,
            last_access_time: info.last_access_time,
            last_write_time: info.last_write_time,
            len: info.len,
            volume_serial: Some(info.volume_serial),
            link_count: Some(info.link_count),
            source: InfoSource::Handle,
        }
    }

    /// Re-query from the original provenance, by stored path alone.
    ///
    /// A vanished target sets `exists` to false and leaves the previously
    /// cached values in place; it does not raise.
    pub fn refresh<S: Storage>(&mut self, storage: &S) -> Result<(), FsError> {
        let probe = paths::add_extended_prefix(&self.path, false).into_owned();
        match self.source {
            InfoSource::Attributes | InfoSource::FindResult => {
                match storage.try_get_file_info(&probe)? {
                    Some(info) => self.apply(&info),
                    None => self.exists = false,
                }
            }
            InfoSource::Handle => match storage.get_handle_info(&probe) {
                Ok(info) => {
                    let refreshed = Self::build_from_handle(&self.path, info);
                    *self = refreshed;
                }
                Err(FsError::NotFound { .. }) => self.exists = false,
                Err(other) => return Err(other),
            },
        }
        Ok(())
    }

    fn apply(&mut self, info: &FileInfo) {
        self.exists = true;
        self.attributes = info.attributes;
        self.creation_time = info.creation_time;
        self.last_access_time = info.last_access_time;
        self.last_write_time = info.last_write_time;
        self.len = info.len;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn attributes(&self) -> FileAttributes {
        self.attributes
    }

    pub fn creation_time(&self) -> SystemTime {
        self.creation_time
    }

    pub fn last_access_time(&self) -> SystemTime {
        self.last_access_time
    }

    pub fn last_write_time(&self) -> SystemTime {
        self.last_write_time
    }

    /// File length; zero for directories.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    /// Volume serial number; populated by handle provenance only.
    pub fn volume_serial(&self) -> Option<u32> {
        self.volume_serial
    }

    /// Hard-link count; populated by handle provenance only.
    pub fn link_count(&self) -> Option<u32> {
        self.link_count
    }

    pub fn source(&self) -> InfoSource {
        self.source
    }

    /// Enumerate this directory's children, filtered by kind, DOS wildcard
    /// pattern, and attribute exclusion.
    ///
    /// The sequence is produced lazily and every call starts a fresh,
    /// independent enumeration. An entry carrying any excluded attribute
    /// bit is neither yielded nor descended into — which is how a hidden
    /// subtree stays invisible to a recursive file listing.
    pub fn children<'a, S: Storage>(
        &self,
        storage: &'a S,
        kind: ChildKind,
        pattern: &str,
        option: SearchOption,
        exclude: FileAttributes,
    ) -> Result<Children<'a, S>, FsError> {
        if !self.is_directory() {
            return Err(FsError::InvalidArgument {
                message: format!("cannot enumerate children of a file: {:?}", self.path),
            });
        }
        let iter = storage.enumerate_directory(&self.path)?;
        Ok(Children {
            storage,
            kind,
            pattern: pattern.to_owned(),
            option,
            exclude,
            stack: vec![Frame {
                directory: self.path.clone(),
                iter,
            }],
        })
    }
}

struct Frame<'a> {
    directory: String,
    iter: Box<dyn Iterator<Item = Result<FindData, FsError>> + 'a>,
}

/// Depth-first child enumeration; see [`FileSystemInfo::children`].
pub struct Children<'a, S: Storage> {
    storage: &'a S,
    kind: ChildKind,
    pattern: String,
    option: SearchOption,
    exclude: FileAttributes,
    stack: Vec<Frame<'a>>,
}

impl<'a, S: Storage> Iterator for Children<'a, S> {
    type Item = Result<FileSystemInfo, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = match self.stack.last_mut() {
                None => return None,
                Some(frame) => match frame.iter.next() {
                    None => {
                        self.stack.pop();
                        continue;
                    }
                    Some(Err(error)) => return Some(Err(error)),
                    Some(Ok(entry)) => (entry, frame.directory.clone()),
                },
            };
            let (entry, directory) = item;
            if entry.attributes.intersects(self.exclude) {
                continue;
            }
            if entry.is_directory() && self.option == SearchOption::AllDirectories {
                let child = paths::combine(&directory, Some(&entry.name));
                match self.storage.enumerate_directory(&child) {
                    Ok(iter) => self.stack.push(Frame {
                        directory: child,
                        iter,
                    }),
                    Err(error) => return Some(Err(error)),
                }
            }
            let wanted = match self.kind {
                ChildKind::Files => !entry.is_directory(),
                ChildKind::Directories => entry.is_directory(),
            };
            if wanted && paths::matches_dos_pattern(&entry.name, &self.pattern) {
                return Some(Ok(FileSystemInfo::from_find_result(&directory, &entry)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn fixture() -> MemoryStorage {
        let storage = MemoryStorage::new()
            .with_volume("C:\\", "\\\\?\\Volume{f0000000-0000-0000-0000-00000000000f}\\");
        storage.create_dir_all("C:\\data\\sub").unwrap();
        storage.create_dir_all("C:\\data\\hidden").unwrap();
        storage.write_file("C:\\data\\a.txt", b"aaa").unwrap();
        storage.write_file("C:\\data\\b.log", b"bb").unwrap();
        storage.write_file("C:\\data\\sub\\c.txt", b"c").unwrap();
        storage.write_file("C:\\data\\hidden\\d.txt", b"d").unwrap();
        storage
            .set_attributes(
                "C:\\data\\hidden",
                FileAttributes::DIRECTORY | FileAttributes::HIDDEN,
            )
            .unwrap();
        storage
    }

    #[test]
    fn test_from_path_provenance() {
        let storage = fixture();
        let info = FileSystemInfo::from_path(&storage, "C:\\data\\a.txt").unwrap();
        assert_eq!(info.source(), InfoSource::Attributes);
        assert_eq!(info.name(), "a.txt");
        assert_eq!(info.len(), 3);
        assert!(info.exists());
        assert!(info.volume_serial().is_none());
    }

    #[test]
    fn test_from_handle_adds_serial_and_casing() {
        let storage = fixture();
        let info = FileSystemInfo::from_handle(&storage, "c:\\data\\a.txt").unwrap();
        assert_eq!(info.source(), InfoSource::Handle);
        assert!(info.volume_serial().is_some());
        assert_eq!(info.link_count(), Some(1));
        // True on-disk casing, caller's drive spelling.
        assert_eq!(info.path(), "c:\\data\\a.txt");
    }

    #[test]
    fn test_refresh_picks_up_changes() {
        let storage = fixture();
        let mut info = FileSystemInfo::from_path(&storage, "C:\\data\\a.txt").unwrap();
        storage.write_file("C:\\data\\a.txt", b"aaaaaa").unwrap();
        info.refresh(&storage).unwrap();
        assert_eq!(info.len(), 6);
    }

    #[test]
    fn test_refresh_after_delete_keeps_last_known() {
        let storage = fixture();
        let mut info = FileSystemInfo::from_path(&storage, "C:\\data\\a.txt").unwrap();
        storage.delete_file("C:\\data\\a.txt").unwrap();
        info.refresh(&storage).unwrap();
        assert!(!info.exists());
        // Last-known values stay readable.
        assert_eq!(info.len(), 3);
        assert_eq!(info.name(), "a.txt");
    }

    #[test]
    fn test_find_result_refreshes_by_path() {
        let storage = fixture();
        let parent = FileSystemInfo::from_path(&storage, "C:\\data").unwrap();
        let mut entries: Vec<FileSystemInfo> = parent
            .children(
                &storage,
                ChildKind::Files,
                "a.*",
                SearchOption::TopDirectoryOnly,
                FileAttributes::empty(),
            )
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &mut entries[0];
        assert_eq!(entry.source(), InfoSource::FindResult);
        storage.write_file("C:\\data\\a.txt", b"grown").unwrap();
        entry.refresh(&storage).unwrap();
        assert_eq!(entry.len(), 5);
    }

    #[test]
    fn test_children_pattern_and_kind_filters() {
        let storage = fixture();
        let parent = FileSystemInfo::from_path(&storage, "C:\\data").unwrap();
        let names: Vec<String> = parent
            .children(
                &storage,
                ChildKind::Files,
                "*.txt",
                SearchOption::TopDirectoryOnly,
                FileAttributes::empty(),
            )
            .unwrap()
            .map(|r| r.unwrap().name().to_owned())
            .collect();
        assert_eq!(names, vec!["a.txt"]);

        let mut dirs: Vec<String> = parent
            .children(
                &storage,
                ChildKind::Directories,
                "*",
                SearchOption::TopDirectoryOnly,
                FileAttributes::empty(),
            )
            .unwrap()
            .map(|r| r.unwrap().name().to_owned())
            .collect();
        dirs.sort();
        assert_eq!(dirs, vec!["hidden", "sub"]);
    }

    #[test]
    fn test_recursive_enumeration_skips_excluded_subtrees() {
        let storage = fixture();
        let parent = FileSystemInfo::from_path(&storage, "C:\\data").unwrap();
        let mut names: Vec<String> = parent
            .children(
                &storage,
                ChildKind::Files,
                "*.txt",
                SearchOption::AllDirectories,
                FileAttributes::HIDDEN,
            )
            .unwrap()
            .map(|r| r.unwrap().name().to_owned())
            .collect();
        names.sort();
        // d.txt is not itself hidden, but it lives under a hidden
        // directory and must not surface.
        assert_eq!(names, vec!["a.txt", "c.txt"]);
    }

    #[test]
    fn test_children_are_restartable() {
        let storage = fixture();
        let parent = FileSystemInfo::from_path(&storage, "C:\\data").unwrap();
        let count = |storage: &MemoryStorage| {
            parent
                .children(
                    storage,
                    ChildKind::Files,
                    "*",
                    SearchOption::TopDirectoryOnly,
                    FileAttributes::empty(),
                )
                .unwrap()
                .count()
        };
        assert_eq!(count(&storage), 2);
        assert_eq!(count(&storage), 2);
    }

    #[test]
    fn test_children_of_file_is_a_contract_error() {
        let storage = fixture();
        let info = FileSystemInfo::from_path(&storage, "C:\\data\\a.txt").unwrap();
        assert!(matches!(
            info.children(
                &storage,
                ChildKind::Files,
                "*",
                SearchOption::TopDirectoryOnly,
                FileAttributes::empty(),
            ),
            Err(FsError::InvalidArgument { .. })
        ));
    }
}
