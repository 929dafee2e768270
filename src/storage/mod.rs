//! Low-level storage access: one trait, thin operations, explicit failure
//! contracts.
//!
//! The [`Storage`] trait abstracts the OS primitives the service layer
//! composes, so the same service logic runs against different backends
//! (raw Win32, in-memory). Each operation wraps exactly one OS concern and
//! translates its failure signal into [`FsError`] carrying the operation
//! name and the path.

pub mod memory;
#[cfg(windows)]
pub mod windows;

use std::io::{Read, Seek, Write};
use std::sync::atomic::AtomicBool;
use std::time::SystemTime;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::FsError;

bitflags! {
    /// Win32 file attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const DEVICE = 0x0000_0040;
        const NORMAL = 0x0000_0080;
        const TEMPORARY = 0x0000_0100;
        const SPARSE_FILE = 0x0000_0200;
        const REPARSE_POINT = 0x0000_0400;
        const COMPRESSED = 0x0000_0800;
        const OFFLINE = 0x0000_1000;
        const NOT_CONTENT_INDEXED = 0x0000_2000;
        const ENCRYPTED = 0x0000_4000;
    }
}

bitflags! {
    /// Win32 volume feature bits, as reported per volume root.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FileSystemFeatures: u32 {
        const CASE_SENSITIVE_SEARCH = 0x0000_0001;
        const CASE_PRESERVED_NAMES = 0x0000_0002;
        const UNICODE_ON_DISK = 0x0000_0004;
        const PERSISTENT_ACLS = 0x0000_0008;
        const FILE_COMPRESSION = 0x0000_0010;
        const VOLUME_QUOTAS = 0x0000_0020;
        const SUPPORTS_SPARSE_FILES = 0x0000_0040;
        const SUPPORTS_REPARSE_POINTS = 0x0000_0080;
        const SUPPORTS_REMOTE_STORAGE = 0x0000_0100;
        const VOLUME_IS_COMPRESSED = 0x0000_8000;
        const SUPPORTS_OBJECT_IDS = 0x0001_0000;
        const SUPPORTS_ENCRYPTION = 0x0002_0000;
        const NAMED_STREAMS = 0x0004_0000;
        const READ_ONLY_VOLUME = 0x0008_0000;
        const SEQUENTIAL_WRITE_ONCE = 0x0010_0000;
        const SUPPORTS_TRANSACTIONS = 0x0020_0000;
        const SUPPORTS_HARD_LINKS = 0x0040_0000;
        const SUPPORTS_EXTENDED_ATTRIBUTES = 0x0080_0000;
        const SUPPORTS_OPEN_BY_FILE_ID = 0x0100_0000;
        const SUPPORTS_USN_JOURNAL = 0x0200_0000;
    }
}

bitflags! {
    /// Requested access for [`Storage::create_file_stream`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u32 {
        /// GENERIC_READ
        const READ = 0x8000_0000;
        /// GENERIC_WRITE
        const WRITE = 0x4000_0000;
    }
}

bitflags! {
    /// Sharing bits for [`Storage::create_file_stream`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShareMode: u32 {
        const READ = 0x0000_0001;
        const WRITE = 0x0000_0002;
        const DELETE = 0x0000_0004;
    }
}

impl ShareMode {
    pub fn read_write_delete() -> Self {
        ShareMode::READ | ShareMode::WRITE | ShareMode::DELETE
    }
}

/// How a missing or present target is treated on open, mirroring the Win32
/// creation dispositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CreationMode {
    /// Fail if the target already exists.
    CreateNew = 1,
    /// Create, truncating any existing target.
    CreateAlways = 2,
    /// Fail if the target doesn't exist.
    OpenExisting = 3,
    /// Open, creating the target if missing.
    OpenAlways = 4,
    /// Fail if missing, truncate if present.
    TruncateExisting = 5,
}

/// Attribute/size/time snapshot from a path-based query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub attributes: FileAttributes,
    pub creation_time: SystemTime,
    pub last_access_time: SystemTime,
    pub last_write_time: SystemTime,
    pub len: u64,
}

impl FileInfo {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

/// One record out of a directory enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindData {
    pub name: String,
    pub attributes: FileAttributes,
    pub creation_time: SystemTime,
    pub last_access_time: SystemTime,
    pub last_write_time: SystemTime,
    pub len: u64,
}

impl FindData {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

/// Result of an open-handle metadata query: everything a path query gives,
/// plus volume serial, link count, and the resolved final path.
///
/// `final_path` is `None` only for device-namespace targets, where the OS
/// cannot produce one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleFileInfo {
    pub attributes: FileAttributes,
    pub creation_time: SystemTime,
    pub last_access_time: SystemTime,
    pub last_write_time: SystemTime,
    pub len: u64,
    pub volume_serial: u32,
    pub link_count: u32,
    pub final_path: Option<String>,
}

/// Immutable snapshot of a volume's identity and capabilities; does not
/// refresh itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInformation {
    pub name: String,
    pub serial_number: u32,
    pub max_component_length: u32,
    pub file_system: String,
    pub features: u32,
}

impl VolumeInformation {
    pub fn features(&self) -> FileSystemFeatures {
        FileSystemFeatures::from_bits_retain(self.features)
    }
}

/// One alternate data stream: its decorated name (`:name:$DATA`) and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInformation {
    pub name: String,
    pub len: u64,
}

/// A readable/writable/seekable open file.
pub trait FileStream: Read + Write + Seek + Send {}
impl<T: Read + Write + Seek + Send> FileStream for T {}

/// The OS seam. Every method is a thin wrapper over one OS concern with a
/// single failure contract; composition lives in the service layer.
///
/// Paths handed to a `Storage` are already fully qualified — the service
/// resolves relative forms before calling down.
pub trait Storage: Send + Sync {
    /// Open a file stream with explicit access, sharing, and disposition.
    fn create_file_stream(
        &self,
        path: &str,
        mode: CreationMode,
        access: Access,
        share: ShareMode,
    ) -> Result<Box<dyn FileStream>, FsError>;

    /// Attribute/size/time query by path.
    fn get_file_info(&self, path: &str) -> Result<FileInfo, FsError>;

    /// Like [`Storage::get_file_info`], but not-found becomes `Ok(None)`.
    ///
    /// Access-denied still raises: "may legitimately not exist" is not
    /// "may legitimately be inaccessible".
    fn try_get_file_info(&self, path: &str) -> Result<Option<FileInfo>, FsError>;

    /// Open-handle metadata query, including final-path resolution.
    fn get_handle_info(&self, path: &str) -> Result<HandleFileInfo, FsError>;

    /// Resolve a path to its full form (lexical normalization, `.`/`..`
    /// collapse). Purely syntactic at the OS level; the target need not
    /// exist.
    fn get_full_path_name(&self, path: &str) -> Result<String, FsError>;

    /// The 8.3 short form of an existing path.
    fn get_short_path_name(&self, path: &str) -> Result<String, FsError>;

    /// The long form of an existing (possibly 8.3-mangled) path.
    fn get_long_path_name(&self, path: &str) -> Result<String, FsError>;

    fn set_attributes(&self, path: &str, attributes: FileAttributes) -> Result<(), FsError>;

    /// Create one directory; the parent must already exist.
    fn create_directory(&self, path: &str) -> Result<(), FsError>;

    /// Remove one empty directory (or unlink a reparse point).
    fn remove_directory(&self, path: &str) -> Result<(), FsError>;

    fn delete_file(&self, path: &str) -> Result<(), FsError>;

    /// Copy a file. With `overwrite` unset, an existing destination is an
    /// already-exists error. A cancellation flag, when supplied, is polled
    /// during the copy; cancellation surfaces as the OS aborted-request
    /// code.
    fn copy_file(
        &self,
        existing: &str,
        new: &str,
        overwrite: bool,
        cancel: Option<&AtomicBool>,
    ) -> Result<(), FsError>;

    /// Lazily enumerate the entries of one directory (no recursion, no
    /// `.`/`..` entries).
    fn enumerate_directory<'a>(
        &'a self,
        path: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<FindData, FsError>> + 'a>, FsError>;

    /// Walk a file's stream directory, yielding only alternate data
    /// streams (the unnamed primary stream and metadata streams are
    /// skipped).
    fn alternate_streams(&self, path: &str) -> Result<Vec<StreamInformation>, FsError>;

    /// The mount root through which `path` reaches its volume
    /// (`C:\users\x` → `C:\`).
    fn volume_mount_root(&self, path: &str) -> Result<String, FsError>;

    /// The canonical, spelling-independent volume name for a mount root
    /// (`C:\` → `\\?\Volume{...}\`).
    fn canonical_volume_name(&self, mount_root: &str) -> Result<String, FsError>;

    /// All mount-point directories hosted on the given volume.
    fn volume_mount_points(&self, volume_root: &str) -> Result<Vec<String>, FsError>;

    /// DOS device aliases: targets of one device, or — with `None` — every
    /// device name in the system namespace.
    fn query_dos_device_names(&self, device: Option<&str>) -> Result<Vec<String>, FsError>;

    /// Roots of all logical drives (`C:\`, `D:\`, ...).
    fn logical_drive_strings(&self) -> Result<Vec<String>, FsError>;

    /// Identity/capability snapshot of the volume at the given root.
    fn volume_information(&self, volume_root: &str) -> Result<VolumeInformation, FsError>;

    /// The per-drive working directory the OS keeps in its hidden `=X:`
    /// environment variables, if one is recorded.
    fn hidden_drive_directory(&self, drive: char) -> Option<String>;

    /// The process-wide current directory, used once to seed the tracker.
    fn process_current_directory(&self) -> Result<String, FsError>;

    /// Whether an existing directory sits at `path`.
    fn directory_exists(&self, path: &str) -> bool {
        matches!(self.try_get_file_info(path), Ok(Some(info)) if info.is_directory())
    }

    /// Whether an existing file (not a directory) sits at `path`.
    fn file_exists(&self, path: &str) -> bool {
        matches!(self.try_get_file_info(path), Ok(Some(info)) if !info.is_directory())
    }
}
