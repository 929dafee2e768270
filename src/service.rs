//! The composed file-service surface.
//!
//! [`FlexFileService`] ties the path grammar, the per-volume
//! current-directory tracker, and a [`Storage`] backend into the
//! [`FileService`] / [`ExtendedFileService`] traits consumers program
//! against. Relative paths are always resolved explicitly through the
//! tracker — the process-global current directory is never read or
//! written here.

use std::io::Read;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::current_directory::CurrentDirectory;
use crate::error::FsError;
use crate::info::FileSystemInfo;
use crate::paths::{self, PathFormat};
use crate::storage::{
    Access, CreationMode, FileAttributes, FileStream, ShareMode, Storage, StreamInformation,
    VolumeInformation,
};

/// The core file-system surface.
pub trait FileService: Send + Sync {
    /// The tracked current directory of the last-used volume.
    fn current_directory(&self) -> Result<String, FsError>;

    /// Record a new current directory; must be fully qualified.
    fn set_current_directory(&self, directory: &str) -> Result<(), FsError>;

    /// Resolve a path to its full form against the per-volume tracker.
    fn full_path(&self, path: &str) -> Result<String, FsError> {
        self.full_path_with_base(path, None)
    }

    /// Resolve a path against an explicit, fully-qualified base.
    ///
    /// A drive-rooted relative path (`C:foo`) only honors `base` when they
    /// share a drive; otherwise it resolves against that drive's own
    /// tracked directory. A current-drive-rooted path (`\foo`) resolves
    /// against the *root* of `base` (or of the tracked directory).
    fn full_path_with_base(&self, path: &str, base: Option<&str>) -> Result<String, FsError>;

    fn attributes(&self, path: &str) -> Result<FileAttributes, FsError>;

    fn set_attributes(&self, path: &str, attributes: FileAttributes) -> Result<(), FsError>;

    /// Create a directory and every missing intermediate segment.
    fn create_directory(&self, path: &str) -> Result<(), FsError>;

    /// Delete a directory; with `delete_children`, recursively empty it
    /// first. A reparse-point child is unlinked, never entered.
    fn delete_directory(&self, path: &str, delete_children: bool) -> Result<(), FsError>;

    fn delete_file(&self, path: &str) -> Result<(), FsError>;

    fn copy_file(&self, existing: &str, new: &str, overwrite: bool) -> Result<(), FsError>;

    fn create_file_stream(
        &self,
        path: &str,
        mode: CreationMode,
        access: Access,
        share: ShareMode,
    ) -> Result<Box<dyn FileStream>, FsError>;

    /// Metadata snapshot for a path (attribute-query provenance).
    fn path_info(&self, path: &str) -> Result<FileSystemInfo, FsError>;

    fn file_exists(&self, path: &str) -> bool;

    fn directory_exists(&self, path: &str) -> bool;

    /// SHA-256 of the file's primary stream, lowercase hex.
    fn file_hash(&self, path: &str) -> Result<String, FsError>;
}

/// Diagnostic extensions over [`FileService`]: resolution variants and
/// volume-level queries.
pub trait ExtendedFileService: FileService {
    /// The symlink-resolved, case-normalized path, re-spelled with the
    /// caller's volume prefix.
    fn final_path(&self, path: &str) -> Result<String, FsError>;

    fn short_path(&self, path: &str) -> Result<String, FsError>;

    fn long_path(&self, path: &str) -> Result<String, FsError>;

    /// Canonical volume name (`\\?\Volume{...}\`) for the volume reached
    /// through `path`.
    fn volume_name(&self, path: &str) -> Result<String, FsError>;

    /// The mount root through which `path` reaches its volume.
    fn mount_point(&self, path: &str) -> Result<String, FsError>;

    fn volume_mount_points(&self, volume_root: &str) -> Result<Vec<String>, FsError>;

    fn query_dos_device_names(&self, device: Option<&str>) -> Result<Vec<String>, FsError>;

    fn logical_drive_strings(&self) -> Result<Vec<String>, FsError>;

    fn volume_information(&self, volume_root: &str) -> Result<VolumeInformation, FsError>;

    fn alternate_streams(&self, path: &str) -> Result<Vec<StreamInformation>, FsError>;

    /// Metadata snapshot via an open handle (handle provenance): adds
    /// volume serial and link count, and resolves the final path.
    fn path_info_by_handle(&self, path: &str) -> Result<FileSystemInfo, FsError>;

    /// [`FileService::copy_file`] with a cooperative cancellation flag,
    /// polled while the copy runs.
    fn copy_file_cancellable(
        &self,
        existing: &str,
        new: &str,
        overwrite: bool,
        cancel: &AtomicBool,
    ) -> Result<(), FsError>;
}

/// [`FileService`] + [`ExtendedFileService`] over any [`Storage`] backend.
pub struct FlexFileService<S: Storage> {
    storage: Arc<S>,
    current: CurrentDirectory<S>,
}

impl<S: Storage> FlexFileService<S> {
    pub fn new(storage: S) -> Result<Self, FsError> {
        let storage = Arc::new(storage);
        let current = CurrentDirectory::new(Arc::clone(&storage))?;
        Ok(FlexFileService { storage, current })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The §-by-§ resolution: extended paths pass through, drive-rooted
    /// relatives bind to their own drive's tracked directory, rooted
    /// relatives bind to a root, plain relatives bind to a directory.
    fn resolve_full_path(&self, path: &str, base: Option<&str>) -> Result<String, FsError> {
        if paths::is_extended(path) {
            // An explicit extended-length path is never second-guessed.
            return Ok(path.to_owned());
        }
        if let Some(base) = base {
            if paths::is_partially_qualified(base) {
                return Err(FsError::InvalidArgument {
                    message: format!("base path must be fully qualified, got {base:?}"),
                });
            }
        }
        let combined = match paths::get_path_format(path) {
            PathFormat::Unknown => {
                return Err(FsError::MalformedPath {
                    path: path.to_owned(),
                })
            }
            PathFormat::DriveRooted => {
                let drive = path.as_bytes()[0];
                let rest = if path.len() > 2 { Some(&path[2..]) } else { None };
                let same_drive_base = base.filter(|b| {
                    paths::get_root(b).is_some_and(|root| {
                        let rb = root.as_bytes();
                        rb.len() >= 2 && rb[1] == b':' && rb[0].eq_ignore_ascii_case(&drive)
                    })
                });
                match same_drive_base {
                    Some(base) => paths::combine(base, rest),
                    None => {
                        let drive_root = format!("{}:\\", drive as char);
                        let tracked = self.current.get_current_directory(Some(&drive_root))?;
                        paths::combine(&tracked, rest)
                    }
                }
            }
            PathFormat::CurrentDriveRooted => {
                let root = match base {
                    Some(base) => paths::get_root(base)
                        .map(str::to_owned)
                        .ok_or_else(|| FsError::MalformedPath {
                            path: base.to_owned(),
                        })?,
                    None => {
                        let tracked = self.current.get_current_directory(None)?;
                        paths::get_root(&tracked)
                            .map(str::to_owned)
                            .ok_or_else(|| FsError::MalformedPath { path: tracked.clone() })?
                    }
                };
                paths::combine(&root, Some(&path[1..]))
            }
            PathFormat::CurrentDirectoryRelative => {
                let directory = match base {
                    Some(base) => base.to_owned(),
                    None => self.current.get_current_directory(None)?,
                };
                paths::combine(&directory, Some(path))
            }
            PathFormat::FullyQualified | PathFormat::Unc => path.to_owned(),
        };
        self.storage.get_full_path_name(&combined)
    }

    /// Resolve and add the extended prefix when the length calls for it.
    fn resolve_for_storage(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve_full_path(path, None)?;
        Ok(paths::add_extended_prefix(&full, false).into_owned())
    }

    fn delete_directory_resolved(&self, full: &str, delete_children: bool) -> Result<(), FsError> {
        let extended = paths::add_extended_prefix(full, true).into_owned();
        let info = self.storage.get_file_info(&extended)?;
        if !info.is_directory() {
            return Err(FsError::AlreadyExists {
                operation: "DeleteDirectory",
                path: full.to_owned(),
            });
        }
        if delete_children {
            let entries: Vec<_> = self
                .storage
                .enumerate_directory(&extended)?
                .collect::<Result<_, _>>()?;
            for entry in entries {
                let child = paths::combine(full, Some(&entry.name));
                let child_extended = paths::add_extended_prefix(&child, true).into_owned();
                if !entry.is_directory() {
                    self.storage.delete_file(&child_extended)?;
                } else if entry.attributes.contains(FileAttributes::REPARSE_POINT) {
                    // Unlink the link itself; its target is not ours to
                    // empty.
                    self.storage.remove_directory(&child_extended)?;
                } else {
                    self.delete_directory_resolved(&child, true)?;
                }
            }
        }
        self.storage.remove_directory(&extended)
    }
}

impl<S: Storage> FileService for FlexFileService<S> {
    fn current_directory(&self) -> Result<String, FsError> {
        self.current.get_current_directory(None)
    }

    fn set_current_directory(&self, directory: &str) -> Result<(), FsError> {
        self.current.set_current_directory(directory)
    }

    fn full_path_with_base(&self, path: &str, base: Option<&str>) -> Result<String, FsError> {
        self.resolve_full_path(path, base)
    }

    fn attributes(&self, path: &str) -> Result<FileAttributes, FsError> {
        let resolved = self.resolve_for_storage(path)?;
        Ok(self.storage.get_file_info(&resolved)?.attributes)
    }

    fn set_attributes(&self, path: &str, attributes: FileAttributes) -> Result<(), FsError> {
        let resolved = self.resolve_for_storage(path)?;
        self.storage.set_attributes(&resolved, attributes)
    }

    fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let full = self.resolve_full_path(path, None)?;
        let root = match paths::get_root(&full) {
            Some(root) if !root.is_empty() => root.to_owned(),
            _ => {
                return Err(FsError::MalformedPath { path: full });
            }
        };
        tracing::debug!("creating directory {full:?}");
        let remainder = full[root.len()..].to_owned();
        let mut current = root;
        for segment in remainder.split(['\\', '/']).filter(|s| !s.is_empty()) {
            current = paths::combine(&current, Some(segment));
            // The extended form is forced so near-limit and POSIX-only
            // names (trailing dot or space) survive the probe and create.
            let probe = paths::add_extended_prefix(&current, true);
            match self.storage.try_get_file_info(&probe)? {
                Some(info) if info.is_directory() => {}
                Some(_) => {
                    return Err(FsError::AlreadyExists {
                        operation: "CreateDirectory",
                        path: current,
                    })
                }
                None => self.storage.create_directory(&probe)?,
            }
        }
        Ok(())
    }

    fn delete_directory(&self, path: &str, delete_children: bool) -> Result<(), FsError> {
        let full = self.resolve_full_path(path, None)?;
        tracing::debug!("deleting directory {full:?} (children: {delete_children})");
        self.delete_directory_resolved(&full, delete_children)
    }

    fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let full = self.resolve_full_path(path, None)?;
        self.storage
            .delete_file(&paths::add_extended_prefix(&full, true))
    }

    fn copy_file(&self, existing: &str, new: &str, overwrite: bool) -> Result<(), FsError> {
        let source = self.resolve_for_storage(existing)?;
        let destination = self.resolve_for_storage(new)?;
        self.storage.copy_file(&source, &destination, overwrite, None)
    }

    fn create_file_stream(
        &self,
        path: &str,
        mode: CreationMode,
        access: Access,
        share: ShareMode,
    ) -> Result<Box<dyn FileStream>, FsError> {
        let resolved = self.resolve_for_storage(path)?;
        self.storage.create_file_stream(&resolved, mode, access, share)
    }

    fn path_info(&self, path: &str) -> Result<FileSystemInfo, FsError> {
        let full = self.resolve_full_path(path, None)?;
        FileSystemInfo::from_path(self.storage.as_ref(), &full)
    }

    fn file_exists(&self, path: &str) -> bool {
        match self.resolve_for_storage(path) {
            Ok(resolved) => self.storage.file_exists(&resolved),
            Err(_) => false,
        }
    }

    fn directory_exists(&self, path: &str) -> bool {
        match self.resolve_for_storage(path) {
            Ok(resolved) => self.storage.directory_exists(&resolved),
            Err(_) => false,
        }
    }

    fn file_hash(&self, path: &str) -> Result<String, FsError> {
        let mut stream = self.create_file_stream(
            path,
            CreationMode::OpenExisting,
            Access::READ,
            ShareMode::read_write_delete(),
        )?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let read = stream.read(&mut buf).map_err(|e| FsError::Os {
                operation: "ReadFile",
                path: path.to_owned(),
                code: e.raw_os_error().unwrap_or(0) as u32,
            })?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        let digest = hasher.finalize();
        Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl<S: Storage> ExtendedFileService for FlexFileService<S> {
    fn final_path(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve_full_path(path, None)?;
        let info = self
            .storage
            .get_handle_info(&paths::add_extended_prefix(&full, false))?;
        Ok(match info.final_path {
            Some(final_path) => paths::replace_casing(&full, &final_path),
            None => full,
        })
    }

    fn short_path(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve_full_path(path, None)?;
        self.storage.get_short_path_name(&full)
    }

    fn long_path(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve_full_path(path, None)?;
        self.storage.get_long_path_name(&full)
    }

    fn volume_name(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve_full_path(path, None)?;
        let mount_root = self.storage.volume_mount_root(&full)?;
        self.storage.canonical_volume_name(&mount_root)
    }

    fn mount_point(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve_full_path(path, None)?;
        self.storage.volume_mount_root(&full)
    }

    fn volume_mount_points(&self, volume_root: &str) -> Result<Vec<String>, FsError> {
        self.storage.volume_mount_points(volume_root)
    }

    fn query_dos_device_names(&self, device: Option<&str>) -> Result<Vec<String>, FsError> {
        self.storage.query_dos_device_names(device)
    }

    fn logical_drive_strings(&self) -> Result<Vec<String>, FsError> {
        self.storage.logical_drive_strings()
    }

    fn volume_information(&self, volume_root: &str) -> Result<VolumeInformation, FsError> {
        self.storage.volume_information(volume_root)
    }

    fn alternate_streams(&self, path: &str) -> Result<Vec<StreamInformation>, FsError> {
        let resolved = self.resolve_for_storage(path)?;
        self.storage.alternate_streams(&resolved)
    }

    fn path_info_by_handle(&self, path: &str) -> Result<FileSystemInfo, FsError> {
        let full = self.resolve_full_path(path, None)?;
        FileSystemInfo::from_handle(self.storage.as_ref(), &full)
    }

    fn copy_file_cancellable(
        &self,
        existing: &str,
        new: &str,
        overwrite: bool,
        cancel: &AtomicBool,
    ) -> Result<(), FsError> {
        let source = self.resolve_for_storage(existing)?;
        let destination = self.resolve_for_storage(new)?;
        self.storage
            .copy_file(&source, &destination, overwrite, Some(cancel))
    }
}
