//! In-memory [`Storage`] backend.
//!
//! Simulates a multi-volume Windows namespace: registered volumes with
//! canonical GUID-style names, case-insensitive but case-preserving
//! directory trees, attributes, timestamps, named alternate streams, DOS
//! device aliases, and the hidden per-drive directory variables. The
//! service layer runs against it unchanged, which is what makes the
//! multi-drive semantics exercisable on any host.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use crate::error::{os_code, FsError};
use crate::paths;
use crate::storage::{
    Access, CreationMode, FileAttributes, FileInfo, FileStream, FindData, HandleFileInfo,
    ShareMode, Storage, StreamInformation, VolumeInformation,
};

#[derive(Debug, Clone)]
enum NodeKind {
    File {
        data: Vec<u8>,
        streams: BTreeMap<String, Vec<u8>>,
    },
    Directory {
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    attributes: FileAttributes,
    creation_time: SystemTime,
    last_access_time: SystemTime,
    last_write_time: SystemTime,
    deny_access: bool,
    kind: NodeKind,
}

impl Node {
    fn new_file(name: &str, data: Vec<u8>) -> Self {
        let now = SystemTime::now();
        Node {
            name: name.to_owned(),
            attributes: FileAttributes::ARCHIVE,
            creation_time: now,
            last_access_time: now,
            last_write_time: now,
            deny_access: false,
            kind: NodeKind::File {
                data,
                streams: BTreeMap::new(),
            },
        }
    }

    fn new_directory(name: &str) -> Self {
        let now = SystemTime::now();
        Node {
            name: name.to_owned(),
            attributes: FileAttributes::DIRECTORY,
            creation_time: now,
            last_access_time: now,
            last_write_time: now,
            deny_access: false,
            kind: NodeKind::Directory {
                children: Vec::new(),
            },
        }
    }

    fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    fn len(&self) -> u64 {
        match &self.kind {
            NodeKind::File { data, .. } => data.len() as u64,
            NodeKind::Directory { .. } => 0,
        }
    }

    fn file_info(&self) -> FileInfo {
        FileInfo {
            attributes: self.attributes,
            creation_time: self.creation_time,
            last_access_time: self.last_access_time,
            last_write_time: self.last_write_time,
            len: self.len(),
        }
    }
}

#[derive(Debug)]
struct Volume {
    mount_roots: Vec<String>,
    canonical_name: String,
    mount_points: Vec<String>,
    info: VolumeInformation,
    root: Node,
}

#[derive(Debug)]
struct State {
    volumes: Vec<Volume>,
    hidden_drive_directories: HashMap<char, String>,
    process_directory: String,
    dos_devices: BTreeMap<String, Vec<String>>,
}

/// [`Storage`] over an in-memory volume set. Cloning shares the state.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip an extended prefix down to the form the mount-root table is keyed
/// by. Volume-GUID spellings keep their prefix — that *is* their canonical
/// form.
fn effective_path(path: &str) -> Cow<'_, str> {
    if !paths::is_extended(path) {
        return Cow::Borrowed(path);
    }
    let tail = &path[4..];
    let tb = tail.as_bytes();
    if tb.len() >= 4 && tb[..3].eq_ignore_ascii_case(b"UNC") && matches!(tb[3], b'\\' | b'/') {
        return Cow::Owned(format!(r"\\{}", &tail[4..]));
    }
    if tail.len() >= 2 && tail.as_bytes()[0].is_ascii_alphabetic() && tail.as_bytes()[1] == b':' {
        return Cow::Borrowed(tail);
    }
    Cow::Borrowed(path)
}

fn split_segments(remainder: &str) -> Vec<String> {
    remainder
        .split(['\\', '/'])
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl State {
    /// Find the volume and in-volume segments a path refers to.
    fn locate(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<(usize, Vec<String>), FsError> {
        let lookup = effective_path(path);
        let mut best: Option<(usize, usize)> = None;
        for (index, volume) in self.volumes.iter().enumerate() {
            for root in volume
                .mount_roots
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(volume.canonical_name.as_str()))
            {
                if lookup.len() >= root.len()
                    && lookup.as_bytes()[..root.len()].eq_ignore_ascii_case(root.as_bytes())
                    && best.map_or(true, |(_, len)| root.len() > len)
                {
                    best = Some((index, root.len()));
                }
            }
        }
        match best {
            Some((index, root_len)) => Ok((index, split_segments(&lookup[root_len..]))),
            None => Err(FsError::NotFound {
                operation,
                path: path.to_owned(),
            }),
        }
    }
}

fn find_node<'a>(mut node: &'a Node, segments: &[String]) -> Option<&'a Node> {
    for segment in segments {
        match &node.kind {
            NodeKind::Directory { children } => {
                node = children
                    .iter()
                    .find(|child| child.name.eq_ignore_ascii_case(segment))?;
            }
            NodeKind::File { .. } => return None,
        }
    }
    Some(node)
}

fn find_node_mut<'a>(mut node: &'a mut Node, segments: &[String]) -> Option<&'a mut Node> {
    for segment in segments {
        match &mut node.kind {
            NodeKind::Directory { children } => {
                node = children
                    .iter_mut()
                    .find(|child| child.name.eq_ignore_ascii_case(segment))?;
            }
            NodeKind::File { .. } => return None,
        }
    }
    Some(node)
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            state: Arc::new(Mutex::new(State {
                volumes: Vec::new(),
                hidden_drive_directories: HashMap::new(),
                process_directory: "C:\\".to_owned(),
                dos_devices: BTreeMap::new(),
            })),
        }
    }

    /// Register a volume reachable at `mount_root` (e.g. `C:\`) under the
    /// given canonical name (e.g. `\\?\Volume{...}\`).
    pub fn with_volume(self, mount_root: &str, canonical_name: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let serial = 0x1000 + state.volumes.len() as u32;
            let mut root = Node::new_directory("");
            root.attributes =
                FileAttributes::DIRECTORY | FileAttributes::HIDDEN | FileAttributes::SYSTEM;
            state.volumes.push(Volume {
                mount_roots: vec![ensure_trailing_separator(mount_root)],
                canonical_name: ensure_trailing_separator(canonical_name),
                mount_points: Vec::new(),
                info: VolumeInformation {
                    name: format!("Volume {}", mount_root.trim_end_matches(['\\', '/'])),
                    serial_number: serial,
                    max_component_length: 255,
                    file_system: "NTFS".to_owned(),
                    features: (crate::storage::FileSystemFeatures::CASE_PRESERVED_NAMES
                        | crate::storage::FileSystemFeatures::UNICODE_ON_DISK
                        | crate::storage::FileSystemFeatures::NAMED_STREAMS
                        | crate::storage::FileSystemFeatures::SUPPORTS_REPARSE_POINTS)
                        .bits(),
                },
                root,
            });
        }
        self
    }

    pub fn with_process_directory(self, directory: &str) -> Self {
        self.state.lock().unwrap().process_directory = directory.to_owned();
        self
    }

    pub fn with_hidden_drive_directory(self, drive: char, directory: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .hidden_drive_directories
            .insert(drive.to_ascii_uppercase(), directory.to_owned());
        self
    }

    pub fn with_dos_device(self, name: &str, targets: &[&str]) -> Self {
        self.state.lock().unwrap().dos_devices.insert(
            name.to_owned(),
            targets.iter().map(|t| (*t).to_owned()).collect(),
        );
        self
    }

    /// Record a mount-point directory reported for `volume_root`.
    pub fn with_mount_point(self, volume_root: &str, mount_point: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let root = ensure_trailing_separator(volume_root);
            if let Some(volume) = state
                .volumes
                .iter_mut()
                .find(|v| v.mount_roots.iter().any(|r| r.eq_ignore_ascii_case(&root)))
            {
                volume.mount_points.push(mount_point.to_owned());
            }
        }
        self
    }

    /// Create every missing directory along `path`. Fixture convenience.
    pub fn create_dir_all(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.state.lock().unwrap();
        let (volume, segments) = state.locate("CreateDirectory", path)?;
        let mut node = &mut state.volumes[volume].root;
        for segment in &segments {
            let children = match &mut node.kind {
                NodeKind::Directory { children } => children,
                NodeKind::File { .. } => {
                    return Err(FsError::AlreadyExists {
                        operation: "CreateDirectory",
                        path: path.to_owned(),
                    })
                }
            };
            if !children
                .iter()
                .any(|child| child.name.eq_ignore_ascii_case(segment))
            {
                children.push(Node::new_directory(segment));
            }
            node = children
                .iter_mut()
                .find(|child| child.name.eq_ignore_ascii_case(segment))
                .unwrap();
        }
        Ok(())
    }

    /// Create or replace a file with the given contents. The parent
    /// directory must exist.
    pub fn write_file(&self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let mut state = self.state.lock().unwrap();
        let (volume, segments) = state.locate("WriteFile", path)?;
        let (name, parent_segments) = match segments.split_last() {
            Some((name, parents)) => (name.clone(), parents.to_vec()),
            None => {
                return Err(FsError::AccessDenied {
                    operation: "WriteFile",
                    path: path.to_owned(),
                })
            }
        };
        let parent = find_node_mut(&mut state.volumes[volume].root, &parent_segments)
            .filter(|n| n.is_directory())
            .ok_or_else(|| FsError::NotFound {
                operation: "WriteFile",
                path: path.to_owned(),
            })?;
        let NodeKind::Directory { children } = &mut parent.kind else {
            unreachable!()
        };
        match children
            .iter_mut()
            .find(|child| child.name.eq_ignore_ascii_case(&name))
        {
            Some(existing) => match &mut existing.kind {
                NodeKind::File { data: old, .. } => {
                    *old = data.to_vec();
                    existing.last_write_time = SystemTime::now();
                }
                NodeKind::Directory { .. } => {
                    return Err(FsError::AlreadyExists {
                        operation: "WriteFile",
                        path: path.to_owned(),
                    })
                }
            },
            None => children.push(Node::new_file(&name, data.to_vec())),
        }
        Ok(())
    }

    /// Attach a named alternate data stream to an existing file.
    pub fn add_alternate_stream(
        &self,
        path: &str,
        stream_name: &str,
        data: &[u8],
    ) -> Result<(), FsError> {
        self.with_existing_node_mut("AddStream", path, |node| match &mut node.kind {
            NodeKind::File { streams, .. } => {
                streams.insert(stream_name.to_owned(), data.to_vec());
                Ok(())
            }
            NodeKind::Directory { .. } => Err(FsError::AccessDenied {
                operation: "AddStream",
                path: path.to_owned(),
            }),
        })
    }

    /// Mark an existing node with the reparse-point attribute.
    pub fn set_reparse_point(&self, path: &str) -> Result<(), FsError> {
        self.with_existing_node_mut("SetReparsePoint", path, |node| {
            node.attributes |= FileAttributes::REPARSE_POINT;
            Ok(())
        })
    }

    /// Make every metadata query against the node fail with access-denied.
    pub fn deny_access(&self, path: &str) -> Result<(), FsError> {
        self.with_existing_node_mut("DenyAccess", path, |node| {
            node.deny_access = true;
            Ok(())
        })
    }

    fn with_existing_node_mut<R>(
        &self,
        operation: &'static str,
        path: &str,
        f: impl FnOnce(&mut Node) -> Result<R, FsError>,
    ) -> Result<R, FsError> {
        let mut state = self.state.lock().unwrap();
        let (volume, segments) = state.locate(operation, path)?;
        let node = find_node_mut(&mut state.volumes[volume].root, &segments).ok_or_else(|| {
            FsError::NotFound {
                operation,
                path: path.to_owned(),
            }
        })?;
        f(node)
    }

    fn read_node_info(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<FileInfo, FsError> {
        let state = self.state.lock().unwrap();
        let (volume, segments) = state.locate(operation, path)?;
        let node = find_node(&state.volumes[volume].root, &segments).ok_or_else(|| {
            FsError::NotFound {
                operation,
                path: path.to_owned(),
            }
        })?;
        if node.deny_access {
            return Err(FsError::AccessDenied {
                operation,
                path: path.to_owned(),
            });
        }
        Ok(node.file_info())
    }
}

fn ensure_trailing_separator(path: &str) -> String {
    if path.ends_with(['\\', '/']) {
        path.to_owned()
    } else {
        format!("{path}\\")
    }
}

/// Open-file handle over the shared state; writes land back on flush/drop.
struct MemoryFileStream {
    storage: MemoryStorage,
    path: String,
    cursor: Cursor<Vec<u8>>,
    writable: bool,
    dirty: bool,
}

impl MemoryFileStream {
    fn store_back(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.storage
            .write_file(&self.path, self.cursor.get_ref())
            .map_err(|e| io::Error::other(e.to_string()))?;
        self.dirty = false;
        Ok(())
    }
}

impl Read for MemoryFileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemoryFileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "stream opened without write access",
            ));
        }
        self.dirty = true;
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.store_back()
    }
}

impl Seek for MemoryFileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl Drop for MemoryFileStream {
    fn drop(&mut self) {
        let _ = self.store_back();
    }
}

impl Storage for MemoryStorage {
    fn create_file_stream(
        &self,
        path: &str,
        mode: CreationMode,
        access: Access,
        _share: ShareMode,
    ) -> Result<Box<dyn FileStream>, FsError> {
        let existing = {
            let state = self.state.lock().unwrap();
            let (volume, segments) = state.locate("CreateFile", path)?;
            match find_node(&state.volumes[volume].root, &segments) {
                Some(node) => match &node.kind {
                    NodeKind::File { data, .. } => Some(data.clone()),
                    NodeKind::Directory { .. } => {
                        return Err(FsError::AccessDenied {
                            operation: "CreateFile",
                            path: path.to_owned(),
                        })
                    }
                },
                None => None,
            }
        };
        let data = match (mode, existing) {
            (CreationMode::CreateNew, Some(_)) => {
                return Err(FsError::AlreadyExists {
                    operation: "CreateFile",
                    path: path.to_owned(),
                })
            }
            (CreationMode::CreateNew | CreationMode::CreateAlways, _) => Vec::new(),
            (CreationMode::OpenExisting | CreationMode::TruncateExisting, None) => {
                return Err(FsError::NotFound {
                    operation: "CreateFile",
                    path: path.to_owned(),
                })
            }
            (CreationMode::TruncateExisting, Some(_)) => Vec::new(),
            (CreationMode::OpenExisting, Some(data)) => data,
            (CreationMode::OpenAlways, data) => data.unwrap_or_default(),
        };
        let writable = access.contains(Access::WRITE);
        if writable {
            // Materialize the node so an immediately dropped handle still
            // leaves the file behind, as CreateFileW would.
            self.write_file(path, &data)?;
        }
        Ok(Box::new(MemoryFileStream {
            storage: self.clone(),
            path: path.to_owned(),
            cursor: Cursor::new(data),
            writable,
            dirty: false,
        }))
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo, FsError> {
        self.read_node_info("GetFileInfo", path)
    }

    fn try_get_file_info(&self, path: &str) -> Result<Option<FileInfo>, FsError> {
        match self.read_node_info("GetFileInfo", path) {
            Ok(info) => Ok(Some(info)),
            Err(FsError::NotFound { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn get_handle_info(&self, path: &str) -> Result<HandleFileInfo, FsError> {
        let state = self.state.lock().unwrap();
        let (volume_index, segments) = state.locate("GetHandleInfo", path)?;
        let volume = &state.volumes[volume_index];
        let mut display = volume.mount_roots[0].clone();
        let mut node = &volume.root;
        for segment in &segments {
            let NodeKind::Directory { children } = &node.kind else {
                return Err(FsError::NotFound {
                    operation: "GetHandleInfo",
                    path: path.to_owned(),
                });
            };
            node = children
                .iter()
                .find(|child| child.name.eq_ignore_ascii_case(segment))
                .ok_or_else(|| FsError::NotFound {
                    operation: "GetHandleInfo",
                    path: path.to_owned(),
                })?;
            if !display.ends_with('\\') {
                display.push('\\');
            }
            display.push_str(&node.name);
        }
        if node.deny_access {
            return Err(FsError::AccessDenied {
                operation: "GetHandleInfo",
                path: path.to_owned(),
            });
        }
        Ok(HandleFileInfo {
            attributes: node.attributes,
            creation_time: node.creation_time,
            last_access_time: node.last_access_time,
            last_write_time: node.last_write_time,
            len: node.len(),
            volume_serial: volume.info.serial_number,
            link_count: 1,
            // Final paths come back in extended form with true on-disk
            // casing, the same shape the OS produces.
            final_path: Some(format!(r"\\?\{display}")),
        })
    }

    fn get_full_path_name(&self, path: &str) -> Result<String, FsError> {
        if paths::is_device(path) {
            return Ok(path.to_owned());
        }
        let normalized = paths::normalize_directory_separators(path);
        let root = match paths::get_root(&normalized) {
            Some(root) if !root.is_empty() => root.to_owned(),
            _ => {
                return Err(FsError::MalformedPath {
                    path: path.to_owned(),
                })
            }
        };
        let remainder = &normalized[root.len()..];
        let mut resolved: Vec<&str> = Vec::new();
        for segment in remainder.split('\\').filter(|s| !s.is_empty()) {
            match segment {
                "." => {}
                ".." => {
                    resolved.pop();
                }
                other => {
                    // Legacy normalization drops trailing dots and spaces
                    // from each component.
                    let trimmed = other.trim_end_matches([' ', '.']);
                    if !trimmed.is_empty() {
                        resolved.push(trimmed);
                    }
                }
            }
        }
        let mut out = ensure_trailing_separator(&root);
        out.push_str(&resolved.join("\\"));
        if normalized.ends_with('\\') && !out.ends_with('\\') {
            out.push('\\');
        }
        Ok(out)
    }

    fn get_short_path_name(&self, path: &str) -> Result<String, FsError> {
        // No 8.3 aliasing in the simulation; the normalized long form
        // doubles as the short form.
        self.get_full_path_name(path)
    }

    fn get_long_path_name(&self, path: &str) -> Result<String, FsError> {
        self.get_full_path_name(path)
    }

    fn set_attributes(&self, path: &str, attributes: FileAttributes) -> Result<(), FsError> {
        self.with_existing_node_mut("SetAttributes", path, |node| {
            // The directory bit is owned by the object, not the caller.
            let directory = node.attributes & FileAttributes::DIRECTORY;
            node.attributes = (attributes - FileAttributes::DIRECTORY) | directory;
            Ok(())
        })
    }

    fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.state.lock().unwrap();
        let (volume, segments) = state.locate("CreateDirectory", path)?;
        let (name, parent_segments) = match segments.split_last() {
            Some((name, parents)) => (name.clone(), parents.to_vec()),
            None => {
                return Err(FsError::AlreadyExists {
                    operation: "CreateDirectory",
                    path: path.to_owned(),
                })
            }
        };
        let parent = find_node_mut(&mut state.volumes[volume].root, &parent_segments)
            .filter(|node| node.is_directory())
            .ok_or_else(|| FsError::NotFound {
                operation: "CreateDirectory",
                path: path.to_owned(),
            })?;
        let NodeKind::Directory { children } = &mut parent.kind else {
            unreachable!()
        };
        if children
            .iter()
            .any(|child| child.name.eq_ignore_ascii_case(&name))
        {
            return Err(FsError::AlreadyExists {
                operation: "CreateDirectory",
                path: path.to_owned(),
            });
        }
        children.push(Node::new_directory(&name));
        Ok(())
    }

    fn remove_directory(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.state.lock().unwrap();
        let (volume, segments) = state.locate("RemoveDirectory", path)?;
        let (name, parent_segments) = match segments.split_last() {
            Some((name, parents)) => (name.clone(), parents.to_vec()),
            None => {
                return Err(FsError::AccessDenied {
                    operation: "RemoveDirectory",
                    path: path.to_owned(),
                })
            }
        };
        let parent = find_node_mut(&mut state.volumes[volume].root, &parent_segments)
            .ok_or_else(|| FsError::NotFound {
                operation: "RemoveDirectory",
                path: path.to_owned(),
            })?;
        let NodeKind::Directory { children } = &mut parent.kind else {
            return Err(FsError::NotFound {
                operation: "RemoveDirectory",
                path: path.to_owned(),
            });
        };
        let index = children
            .iter()
            .position(|child| child.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| FsError::NotFound {
                operation: "RemoveDirectory",
                path: path.to_owned(),
            })?;
        let target = &children[index];
        match &target.kind {
            NodeKind::File { .. } => {
                return Err(FsError::Os {
                    operation: "RemoveDirectory",
                    path: path.to_owned(),
                    code: os_code::DIRECTORY,
                })
            }
            NodeKind::Directory {
                children: grandchildren,
            } => {
                // A reparse point unlinks regardless of what it points at.
                if !grandchildren.is_empty()
                    && !target.attributes.contains(FileAttributes::REPARSE_POINT)
                {
                    return Err(FsError::Os {
                        operation: "RemoveDirectory",
                        path: path.to_owned(),
                        code: os_code::DIR_NOT_EMPTY,
                    });
                }
            }
        }
        children.remove(index);
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let mut state = self.state.lock().unwrap();
        let (volume, segments) = state.locate("DeleteFile", path)?;
        let (name, parent_segments) = match segments.split_last() {
            Some((name, parents)) => (name.clone(), parents.to_vec()),
            None => {
                return Err(FsError::AccessDenied {
                    operation: "DeleteFile",
                    path: path.to_owned(),
                })
            }
        };
        let parent = find_node_mut(&mut state.volumes[volume].root, &parent_segments)
            .ok_or_else(|| FsError::NotFound {
                operation: "DeleteFile",
                path: path.to_owned(),
            })?;
        let NodeKind::Directory { children } = &mut parent.kind else {
            return Err(FsError::NotFound {
                operation: "DeleteFile",
                path: path.to_owned(),
            });
        };
        let index = children
            .iter()
            .position(|child| child.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| FsError::NotFound {
                operation: "DeleteFile",
                path: path.to_owned(),
            })?;
        let target = &children[index];
        if target.is_directory() {
            return Err(FsError::AccessDenied {
                operation: "DeleteFile",
                path: path.to_owned(),
            });
        }
        if target.attributes.contains(FileAttributes::READONLY) {
            return Err(FsError::AccessDenied {
                operation: "DeleteFile",
                path: path.to_owned(),
            });
        }
        children.remove(index);
        Ok(())
    }

    fn copy_file(
        &self,
        existing: &str,
        new: &str,
        overwrite: bool,
        cancel: Option<&AtomicBool>,
    ) -> Result<(), FsError> {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(FsError::Os {
                    operation: "CopyFile",
                    path: new.to_owned(),
                    code: os_code::REQUEST_ABORTED,
                });
            }
        }
        let (data, attributes) = {
            let state = self.state.lock().unwrap();
            let (volume, segments) = state.locate("CopyFile", existing)?;
            let node = find_node(&state.volumes[volume].root, &segments).ok_or_else(|| {
                FsError::NotFound {
                    operation: "CopyFile",
                    path: existing.to_owned(),
                }
            })?;
            match &node.kind {
                NodeKind::File { data, .. } => (data.clone(), node.attributes),
                NodeKind::Directory { .. } => {
                    return Err(FsError::AccessDenied {
                        operation: "CopyFile",
                        path: existing.to_owned(),
                    })
                }
            }
        };
        {
            let state = self.state.lock().unwrap();
            let (volume, segments) = state.locate("CopyFile", new)?;
            if let Some(node) = find_node(&state.volumes[volume].root, &segments) {
                if !overwrite || node.is_directory() {
                    return Err(FsError::AlreadyExists {
                        operation: "CopyFile",
                        path: new.to_owned(),
                    });
                }
            }
        }
        self.write_file(new, &data)?;
        self.with_existing_node_mut("CopyFile", new, |node| {
            node.attributes = attributes;
            Ok(())
        })
    }

    fn enumerate_directory<'a>(
        &'a self,
        path: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<FindData, FsError>> + 'a>, FsError> {
        let state = self.state.lock().unwrap();
        let (volume, segments) = state.locate("FindFirstFile", path)?;
        let node = find_node(&state.volumes[volume].root, &segments).ok_or_else(|| {
            FsError::NotFound {
                operation: "FindFirstFile",
                path: path.to_owned(),
            }
        })?;
        let NodeKind::Directory { children } = &node.kind else {
            return Err(FsError::Os {
                operation: "FindFirstFile",
                path: path.to_owned(),
                code: os_code::DIRECTORY,
            });
        };
        let snapshot: Vec<FindData> = children
            .iter()
            .map(|child| FindData {
                name: child.name.clone(),
                attributes: child.attributes,
                creation_time: child.creation_time,
                last_access_time: child.last_access_time,
                last_write_time: child.last_write_time,
                len: child.len(),
            })
            .collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn alternate_streams(&self, path: &str) -> Result<Vec<StreamInformation>, FsError> {
        let state = self.state.lock().unwrap();
        let (volume, segments) = state.locate("EnumerateStreams", path)?;
        let node = find_node(&state.volumes[volume].root, &segments).ok_or_else(|| {
            FsError::NotFound {
                operation: "EnumerateStreams",
                path: path.to_owned(),
            }
        })?;
        match &node.kind {
            NodeKind::File { streams, .. } => Ok(streams
                .iter()
                .map(|(name, data)| StreamInformation {
                    name: format!(":{name}:$DATA"),
                    len: data.len() as u64,
                })
                .collect()),
            NodeKind::Directory { .. } => Ok(Vec::new()),
        }
    }

    fn volume_mount_root(&self, path: &str) -> Result<String, FsError> {
        let state = self.state.lock().unwrap();
        let (volume, _) = state.locate("GetVolumePathName", path)?;
        let volume = &state.volumes[volume];
        let lookup = effective_path(path);
        let best = volume
            .mount_roots
            .iter()
            .chain(std::iter::once(&volume.canonical_name))
            .filter(|root| {
                lookup.len() >= root.len()
                    && lookup.as_bytes()[..root.len()].eq_ignore_ascii_case(root.as_bytes())
            })
            .max_by_key(|root| root.len())
            .expect("located volume must have a matching root");
        Ok(best.clone())
    }

    fn canonical_volume_name(&self, mount_root: &str) -> Result<String, FsError> {
        let state = self.state.lock().unwrap();
        let root = ensure_trailing_separator(mount_root);
        state
            .volumes
            .iter()
            .find(|volume| {
                volume
                    .mount_roots
                    .iter()
                    .chain(std::iter::once(&volume.canonical_name))
                    .any(|r| r.eq_ignore_ascii_case(&root))
            })
            .map(|volume| volume.canonical_name.clone())
            .ok_or_else(|| FsError::NotFound {
                operation: "GetVolumeName",
                path: mount_root.to_owned(),
            })
    }

    fn volume_mount_points(&self, volume_root: &str) -> Result<Vec<String>, FsError> {
        let state = self.state.lock().unwrap();
        let root = ensure_trailing_separator(volume_root);
        state
            .volumes
            .iter()
            .find(|volume| {
                volume
                    .mount_roots
                    .iter()
                    .chain(std::iter::once(&volume.canonical_name))
                    .any(|r| r.eq_ignore_ascii_case(&root))
            })
            .map(|volume| volume.mount_points.clone())
            .ok_or_else(|| FsError::NotFound {
                operation: "FindVolumeMountPoint",
                path: volume_root.to_owned(),
            })
    }

    fn query_dos_device_names(&self, device: Option<&str>) -> Result<Vec<String>, FsError> {
        let state = self.state.lock().unwrap();
        match device {
            None => Ok(state.dos_devices.keys().cloned().collect()),
            Some(name) => state
                .dos_devices
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, targets)| targets.clone())
                .ok_or_else(|| FsError::NotFound {
                    operation: "QueryDosDevice",
                    path: name.to_owned(),
                }),
        }
    }

    fn logical_drive_strings(&self) -> Result<Vec<String>, FsError> {
        let state = self.state.lock().unwrap();
        let mut roots: Vec<String> = state
            .volumes
            .iter()
            .flat_map(|volume| volume.mount_roots.iter())
            .filter(|root| {
                let b = root.as_bytes();
                b.len() == 3 && b[0].is_ascii_alphabetic() && b[1] == b':'
            })
            .cloned()
            .collect();
        roots.sort();
        Ok(roots)
    }

    fn volume_information(&self, volume_root: &str) -> Result<VolumeInformation, FsError> {
        let state = self.state.lock().unwrap();
        let root = ensure_trailing_separator(volume_root);
        state
            .volumes
            .iter()
            .find(|volume| {
                volume
                    .mount_roots
                    .iter()
                    .chain(std::iter::once(&volume.canonical_name))
                    .any(|r| r.eq_ignore_ascii_case(&root))
            })
            .map(|volume| volume.info.clone())
            .ok_or_else(|| FsError::NotFound {
                operation: "GetVolumeInformation",
                path: volume_root.to_owned(),
            })
    }

    fn hidden_drive_directory(&self, drive: char) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .hidden_drive_directories
            .get(&drive.to_ascii_uppercase())
            .cloned()
    }

    fn process_current_directory(&self) -> Result<String, FsError> {
        Ok(self.state.lock().unwrap().process_directory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_volume_fixture() -> MemoryStorage {
        MemoryStorage::new()
            .with_volume("C:\\", "\\\\?\\Volume{c0000000-0000-0000-0000-000000000001}\\")
            .with_volume("D:\\", "\\\\?\\Volume{d0000000-0000-0000-0000-000000000002}\\")
    }

    #[test]
    fn test_roots_exist_and_are_directories() {
        let storage = two_volume_fixture();
        assert!(storage.directory_exists("C:\\"));
        assert!(storage.directory_exists("D:\\"));
        assert!(!storage.directory_exists("E:\\"));
    }

    #[test]
    fn test_write_and_read_back() {
        let storage = two_volume_fixture();
        storage.create_dir_all("C:\\Users\\Tester").unwrap();
        storage.write_file("C:\\Users\\Tester\\a.txt", b"hello").unwrap();
        let info = storage.get_file_info("C:\\Users\\Tester\\a.txt").unwrap();
        assert_eq!(info.len, 5);
        assert!(!info.is_directory());

        let mut stream = storage
            .create_file_stream(
                "C:\\Users\\Tester\\a.txt",
                CreationMode::OpenExisting,
                Access::READ,
                ShareMode::read_write_delete(),
            )
            .unwrap();
        let mut contents = String::new();
        stream.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn test_lookup_is_case_insensitive_but_preserving() {
        let storage = two_volume_fixture();
        storage.create_dir_all("C:\\Users\\MixedCase").unwrap();
        assert!(storage.directory_exists("c:\\users\\mixedcase"));
        let handle = storage.get_handle_info("c:\\users\\mixedcase").unwrap();
        assert_eq!(
            handle.final_path.as_deref(),
            Some("\\\\?\\C:\\Users\\MixedCase")
        );
    }

    #[test]
    fn test_canonical_name_shared_across_spellings() {
        let storage = two_volume_fixture();
        let by_drive = storage.canonical_volume_name("C:\\").unwrap();
        let by_guid = storage.canonical_volume_name(&by_drive).unwrap();
        assert_eq!(by_drive, by_guid);
    }

    #[test]
    fn test_full_path_name_collapses_dots() {
        let storage = two_volume_fixture();
        assert_eq!(
            storage.get_full_path_name("C:\\a\\.\\b\\..\\c").unwrap(),
            "C:\\a\\c"
        );
        assert_eq!(
            storage.get_full_path_name("C:\\a\\file. ").unwrap(),
            "C:\\a\\file"
        );
        // Extended paths skip legacy normalization entirely.
        assert_eq!(
            storage.get_full_path_name("\\\\?\\C:\\a\\file. ").unwrap(),
            "\\\\?\\C:\\a\\file. "
        );
    }

    #[test]
    fn test_try_get_distinguishes_missing_from_denied() {
        let storage = two_volume_fixture();
        storage.create_dir_all("C:\\secret").unwrap();
        storage.write_file("C:\\secret\\f.txt", b"x").unwrap();
        storage.deny_access("C:\\secret\\f.txt").unwrap();

        assert!(matches!(storage.try_get_file_info("C:\\missing"), Ok(None)));
        assert!(matches!(
            storage.try_get_file_info("C:\\secret\\f.txt"),
            Err(FsError::AccessDenied { .. })
        ));
    }

    #[test]
    fn test_remove_directory_contracts() {
        let storage = two_volume_fixture();
        storage.create_dir_all("C:\\a\\b").unwrap();
        storage.write_file("C:\\a\\b\\f.txt", b"x").unwrap();

        let err = storage.remove_directory("C:\\a\\b").unwrap_err();
        assert_eq!(err.os_code(), Some(os_code::DIR_NOT_EMPTY));

        let err = storage.remove_directory("C:\\a\\b\\f.txt").unwrap_err();
        assert_eq!(err.os_code(), Some(os_code::DIRECTORY));

        storage.delete_file("C:\\a\\b\\f.txt").unwrap();
        storage.remove_directory("C:\\a\\b").unwrap();
        assert!(!storage.directory_exists("C:\\a\\b"));
    }

    #[test]
    fn test_reparse_point_unlinks_with_children() {
        let storage = two_volume_fixture();
        storage.create_dir_all("C:\\link\\inner").unwrap();
        storage.set_reparse_point("C:\\link").unwrap();
        storage.remove_directory("C:\\link").unwrap();
        assert!(!storage.directory_exists("C:\\link"));
    }

    #[test]
    fn test_alternate_streams_decorated() {
        let storage = two_volume_fixture();
        storage.create_dir_all("C:\\s").unwrap();
        storage.write_file("C:\\s\\f.txt", b"primary").unwrap();
        storage
            .add_alternate_stream("C:\\s\\f.txt", "Zone.Identifier", b"[ZoneTransfer]")
            .unwrap();
        let streams = storage.alternate_streams("C:\\s\\f.txt").unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].name, ":Zone.Identifier:$DATA");
        assert_eq!(streams[0].len, 14);
    }

    #[test]
    fn test_extended_prefix_reaches_same_tree() {
        let storage = two_volume_fixture();
        storage.create_dir_all("C:\\deep").unwrap();
        assert!(storage.directory_exists("\\\\?\\C:\\deep"));
        let canonical = storage.canonical_volume_name("C:\\").unwrap();
        assert!(storage.directory_exists(&format!("{canonical}deep")));
    }
}
