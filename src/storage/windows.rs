//! Raw Win32 backend for the [`Storage`] trait.
//!
//! Every wrapper converts UTF-8 paths to UTF-16 at the boundary, checks the
//! call's specific failure signal, and translates it through
//! [`FsError::from_os_code`]. Handles are held in scope guards so they are
//! released on every path out, including errors. Calls that report their
//! required buffer size run inside a bounded growth loop — unbounded growth
//! on a misbehaving response is rejected rather than retried forever.

use std::ffi::c_void;
use std::fs::File;
use std::os::windows::io::{FromRawHandle, RawHandle};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ENVVAR_NOT_FOUND, ERROR_FILE_NOT_FOUND,
    ERROR_INSUFFICIENT_BUFFER, ERROR_MORE_DATA, ERROR_NO_MORE_FILES, ERROR_PATH_NOT_FOUND,
    FILETIME, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE, MAX_PATH,
};
use windows_sys::Win32::Storage::FileSystem::{
    BackupRead, BackupSeek, CopyFileExW, CreateDirectoryW, CreateFileW, DeleteFileW, FindClose,
    FindFirstFileW, FindFirstVolumeMountPointW, FindNextFileW, FindNextVolumeMountPointW,
    FindVolumeMountPointClose, GetFileAttributesExW, GetFileExInfoStandard,
    GetFileInformationByHandle, GetFinalPathNameByHandleW, GetFullPathNameW,
    GetLogicalDriveStringsW, GetLongPathNameW, GetShortPathNameW, GetVolumeInformationW,
    GetVolumeNameForVolumeMountPointW, GetVolumePathNameW, QueryDosDeviceW, RemoveDirectoryW,
    SetFileAttributesW, BACKUP_ALTERNATE_DATA, BY_HANDLE_FILE_INFORMATION,
    COPY_FILE_FAIL_IF_EXISTS, FILE_FLAG_BACKUP_SEMANTICS, FILE_SHARE_DELETE, FILE_SHARE_READ,
    FILE_SHARE_WRITE, LPPROGRESS_ROUTINE, OPEN_EXISTING, WIN32_FILE_ATTRIBUTE_DATA,
    WIN32_FIND_DATAW, WIN32_STREAM_ID,
};
use windows_sys::Win32::System::Environment::{GetCurrentDirectoryW, GetEnvironmentVariableW};

use crate::error::FsError;
use crate::paths;
use crate::storage::{
    Access, CreationMode, FileAttributes, FileInfo, FileStream, FindData, HandleFileInfo,
    ShareMode, Storage, StreamInformation, VolumeInformation,
};

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01 (Unix epoch).
const FILETIME_UNIX_DIFF_SECS: u64 = 11_644_473_600;

/// Buffer growth policy: a handful of attempts, hard-capped well under any
/// legitimate response size.
const MAX_GROWTH_ATTEMPTS: usize = 8;
const MAX_BUFFER_CHARS: usize = 8 * 1024 * 1024;

/// Progress-callback return values for `CopyFileExW`.
const PROGRESS_CONTINUE: u32 = 0;
const PROGRESS_CANCEL: u32 = 1;

/// [`Storage`] over the raw Win32 API.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsStorage;

impl WindowsStorage {
    pub fn new() -> Self {
        WindowsStorage
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    String::from_utf16_lossy(buf)
}

fn from_wide_nul(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    from_wide(&buf[..end])
}

/// Split a REG_MULTI_SZ style buffer (NUL-separated, double-NUL terminated).
fn split_multi_sz(buf: &[u16]) -> Vec<String> {
    buf.split(|&c| c == 0)
        .filter(|s| !s.is_empty())
        .map(from_wide)
        .collect()
}

fn filetime_to_system_time(ft: &FILETIME) -> SystemTime {
    let ticks = ((ft.dwHighDateTime as u64) << 32) | ft.dwLowDateTime as u64;
    let unix_ticks = ticks.saturating_sub(FILETIME_UNIX_DIFF_SECS * 10_000_000);
    UNIX_EPOCH
        + Duration::new(
            unix_ticks / 10_000_000,
            ((unix_ticks % 10_000_000) * 100) as u32,
        )
}

fn last_error(operation: &'static str, path: &str) -> FsError {
    FsError::from_os_code(operation, path, unsafe { GetLastError() })
}

/// Scope guard for a `CreateFileW` handle.
struct OwnedHandle(HANDLE);

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

/// Scope guard for a `FindFirstFileW` handle.
struct FindGuard(HANDLE);

impl Drop for FindGuard {
    fn drop(&mut self) {
        unsafe {
            FindClose(self.0);
        }
    }
}

/// Scope guard for a `FindFirstVolumeMountPointW` handle.
struct MountPointFindGuard(HANDLE);

impl Drop for MountPointFindGuard {
    fn drop(&mut self) {
        unsafe {
            FindVolumeMountPointClose(self.0);
        }
    }
}

fn open_metadata_handle(
    operation: &'static str,
    path: &str,
    access: u32,
) -> Result<OwnedHandle, FsError> {
    let wide = to_wide(path);
    let handle = unsafe {
        CreateFileW(
            wide.as_ptr(),
            access,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_BACKUP_SEMANTICS,
            ptr::null_mut(),
        )
    };
    if handle == INVALID_HANDLE_VALUE {
        return Err(last_error(operation, path));
    }
    Ok(OwnedHandle(handle))
}

/// Outcome of one attempt at filling a caller-sized buffer.
enum Fill {
    Done(usize),
    /// Retry with at least this many characters (`0` = just double).
    Grow(usize),
}

/// Run a required-size-reporting call inside the bounded growth loop.
fn with_growing_buffer<F>(
    operation: &'static str,
    path: &str,
    initial: usize,
    mut attempt: F,
) -> Result<Vec<u16>, FsError>
where
    F: FnMut(&mut [u16]) -> Result<Fill, u32>,
{
    let mut capacity = initial.max(1);
    for _ in 0..MAX_GROWTH_ATTEMPTS {
        let mut buf = vec![0u16; capacity];
        match attempt(&mut buf) {
            Ok(Fill::Done(len)) => {
                buf.truncate(len);
                return Ok(buf);
            }
            Ok(Fill::Grow(required)) => {
                capacity = required.max(capacity * 2);
            }
            Err(code) if code == ERROR_INSUFFICIENT_BUFFER || code == ERROR_MORE_DATA => {
                capacity *= 2;
            }
            Err(code) => return Err(FsError::from_os_code(operation, path, code)),
        }
        if capacity > MAX_BUFFER_CHARS {
            break;
        }
    }
    Err(FsError::Os {
        operation,
        path: path.to_owned(),
        code: ERROR_INSUFFICIENT_BUFFER,
    })
}

/// The shared convention of `GetFullPathNameW`-shaped calls: zero is an
/// error, a value beyond the buffer is the required size, anything else is
/// the number of characters written.
fn length_convention(ret: u32, buf_len: usize) -> Result<Fill, u32> {
    if ret == 0 {
        return Err(unsafe { GetLastError() });
    }
    let ret = ret as usize;
    if ret >= buf_len {
        Ok(Fill::Grow(ret + 1))
    } else {
        Ok(Fill::Done(ret))
    }
}

fn find_data_from_native(data: &WIN32_FIND_DATAW) -> FindData {
    FindData {
        name: from_wide_nul(&data.cFileName),
        attributes: FileAttributes::from_bits_retain(data.dwFileAttributes),
        creation_time: filetime_to_system_time(&data.ftCreationTime),
        last_access_time: filetime_to_system_time(&data.ftLastAccessTime),
        last_write_time: filetime_to_system_time(&data.ftLastWriteTime),
        len: ((data.nFileSizeHigh as u64) << 32) | data.nFileSizeLow as u64,
    }
}

/// Lazy directory enumeration over a `FindFirstFileW` handle.
struct DirectoryIter {
    guard: Option<FindGuard>,
    first: Option<WIN32_FIND_DATAW>,
    path: String,
}

impl Iterator for DirectoryIter {
    type Item = Result<FindData, FsError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let data = if let Some(first) = self.first.take() {
                first
            } else {
                let guard = self.guard.as_ref()?;
                let mut data: WIN32_FIND_DATAW = unsafe { std::mem::zeroed() };
                let ok = unsafe { FindNextFileW(guard.0, &mut data) };
                if ok == 0 {
                    let code = unsafe { GetLastError() };
                    self.guard = None;
                    if code == ERROR_NO_MORE_FILES {
                        return None;
                    }
                    return Some(Err(FsError::from_os_code(
                        "FindNextFile",
                        &self.path,
                        code,
                    )));
                }
                data
            };
            let entry = find_data_from_native(&data);
            if entry.name == "." || entry.name == ".." {
                continue;
            }
            return Some(Ok(entry));
        }
    }
}

unsafe extern "system" fn copy_progress(
    _total_file_size: i64,
    _total_bytes_transferred: i64,
    _stream_size: i64,
    _stream_bytes_transferred: i64,
    _stream_number: u32,
    _callback_reason: u32,
    _source: HANDLE,
    _destination: HANDLE,
    data: *const c_void,
) -> u32 {
    let cancel = unsafe { &*(data as *const AtomicBool) };
    if cancel.load(Ordering::Relaxed) {
        PROGRESS_CANCEL
    } else {
        PROGRESS_CONTINUE
    }
}

impl Storage for WindowsStorage {
    fn create_file_stream(
        &self,
        path: &str,
        mode: CreationMode,
        access: Access,
        share: ShareMode,
    ) -> Result<Box<dyn FileStream>, FsError> {
        let wide = to_wide(path);
        let mut desired = 0u32;
        if access.contains(Access::READ) {
            desired |= GENERIC_READ;
        }
        if access.contains(Access::WRITE) {
            desired |= GENERIC_WRITE;
        }
        let handle = unsafe {
            CreateFileW(
                wide.as_ptr(),
                desired,
                share.bits(),
                ptr::null(),
                mode as u32,
                0,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(last_error("CreateFile", path));
        }
        // The File takes over the handle and closes it on drop.
        let file = unsafe { File::from_raw_handle(handle as RawHandle) };
        Ok(Box::new(file))
    }

    fn get_file_info(&self, path: &str) -> Result<FileInfo, FsError> {
        let wide = to_wide(path);
        let mut data: WIN32_FILE_ATTRIBUTE_DATA = unsafe { std::mem::zeroed() };
        let ok = unsafe {
            GetFileAttributesExW(
                wide.as_ptr(),
                GetFileExInfoStandard,
                &mut data as *mut _ as *mut c_void,
            )
        };
        if ok == 0 {
            return Err(last_error("GetFileInfo", path));
        }
        Ok(FileInfo {
            attributes: FileAttributes::from_bits_retain(data.dwFileAttributes),
            creation_time: filetime_to_system_time(&data.ftCreationTime),
            last_access_time: filetime_to_system_time(&data.ftLastAccessTime),
            last_write_time: filetime_to_system_time(&data.ftLastWriteTime),
            len: ((data.nFileSizeHigh as u64) << 32) | data.nFileSizeLow as u64,
        })
    }

    fn try_get_file_info(&self, path: &str) -> Result<Option<FileInfo>, FsError> {
        match self.get_file_info(path) {
            Ok(info) => Ok(Some(info)),
            Err(FsError::NotFound { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    fn get_handle_info(&self, path: &str) -> Result<HandleFileInfo, FsError> {
        let handle = open_metadata_handle("GetHandleInfo", path, 0)?;
        let mut info: BY_HANDLE_FILE_INFORMATION = unsafe { std::mem::zeroed() };
        let ok = unsafe { GetFileInformationByHandle(handle.0, &mut info) };
        if ok == 0 {
            return Err(last_error("GetHandleInfo", path));
        }
        let final_path = match with_growing_buffer(
            "GetFinalPathName",
            path,
            MAX_PATH as usize + 1,
            |buf| {
                let ret = unsafe {
                    GetFinalPathNameByHandleW(handle.0, buf.as_mut_ptr(), buf.len() as u32, 0)
                };
                length_convention(ret, buf.len())
            },
        ) {
            Ok(buf) => Some(from_wide(&buf)),
            // Device-namespace objects (named pipes) don't support final
            // path resolution; everything else propagates.
            Err(error) if paths::is_device(path) => {
                tracing::debug!("final path unavailable for device path {path:?}: {error}");
                None
            }
            Err(error) => return Err(error),
        };
        Ok(HandleFileInfo {
            attributes: FileAttributes::from_bits_retain(info.dwFileAttributes),
            creation_time: filetime_to_system_time(&info.ftCreationTime),
            last_access_time: filetime_to_system_time(&info.ftLastAccessTime),
            last_write_time: filetime_to_system_time(&info.ftLastWriteTime),
            len: ((info.nFileSizeHigh as u64) << 32) | info.nFileSizeLow as u64,
            volume_serial: info.dwVolumeSerialNumber,
            link_count: info.nNumberOfLinks,
            final_path,
        })
    }

    fn get_full_path_name(&self, path: &str) -> Result<String, FsError> {
        let wide = to_wide(path);
        let buf = with_growing_buffer("GetFullPathName", path, MAX_PATH as usize + 1, |buf| {
            let ret = unsafe {
                GetFullPathNameW(
                    wide.as_ptr(),
                    buf.len() as u32,
                    buf.as_mut_ptr(),
                    ptr::null_mut(),
                )
            };
            length_convention(ret, buf.len())
        })?;
        Ok(from_wide(&buf))
    }

    fn get_short_path_name(&self, path: &str) -> Result<String, FsError> {
        let wide = to_wide(path);
        let buf = with_growing_buffer("GetShortPathName", path, MAX_PATH as usize + 1, |buf| {
            let ret =
                unsafe { GetShortPathNameW(wide.as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
            length_convention(ret, buf.len())
        })?;
        Ok(from_wide(&buf))
    }

    fn get_long_path_name(&self, path: &str) -> Result<String, FsError> {
        let wide = to_wide(path);
        let buf = with_growing_buffer("GetLongPathName", path, MAX_PATH as usize + 1, |buf| {
            let ret =
                unsafe { GetLongPathNameW(wide.as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
            length_convention(ret, buf.len())
        })?;
        Ok(from_wide(&buf))
    }

    fn set_attributes(&self, path: &str, attributes: FileAttributes) -> Result<(), FsError> {
        let wide = to_wide(path);
        let ok = unsafe { SetFileAttributesW(wide.as_ptr(), attributes.bits()) };
        if ok == 0 {
            return Err(last_error("SetAttributes", path));
        }
        Ok(())
    }

    fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let wide = to_wide(path);
        let ok = unsafe { CreateDirectoryW(wide.as_ptr(), ptr::null()) };
        if ok == 0 {
            return Err(last_error("CreateDirectory", path));
        }
        Ok(())
    }

    fn remove_directory(&self, path: &str) -> Result<(), FsError> {
        let wide = to_wide(path);
        let ok = unsafe { RemoveDirectoryW(wide.as_ptr()) };
        if ok == 0 {
            return Err(last_error("RemoveDirectory", path));
        }
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<(), FsError> {
        let wide = to_wide(path);
        let ok = unsafe { DeleteFileW(wide.as_ptr()) };
        if ok == 0 {
            return Err(last_error("DeleteFile", path));
        }
        Ok(())
    }

    fn copy_file(
        &self,
        existing: &str,
        new: &str,
        overwrite: bool,
        cancel: Option<&AtomicBool>,
    ) -> Result<(), FsError> {
        let wide_existing = to_wide(existing);
        let wide_new = to_wide(new);
        let flags = if overwrite { 0 } else { COPY_FILE_FAIL_IF_EXISTS };
        let routine: LPPROGRESS_ROUTINE = if cancel.is_some() {
            Some(copy_progress)
        } else {
            None
        };
        let data = cancel.map_or(ptr::null(), |flag| flag as *const AtomicBool as *const c_void);
        let ok = unsafe {
            CopyFileExW(
                wide_existing.as_ptr(),
                wide_new.as_ptr(),
                routine,
                data,
                ptr::null_mut(),
                flags,
            )
        };
        if ok == 0 {
            return Err(last_error("CopyFile", new));
        }
        Ok(())
    }

    fn enumerate_directory<'a>(
        &'a self,
        path: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<FindData, FsError>> + 'a>, FsError> {
        let pattern = paths::combine(path, Some("*"));
        let wide = to_wide(&pattern);
        let mut data: WIN32_FIND_DATAW = unsafe { std::mem::zeroed() };
        let handle = unsafe { FindFirstFileW(wide.as_ptr(), &mut data) };
        if handle == INVALID_HANDLE_VALUE {
            let code = unsafe { GetLastError() };
            if code == ERROR_FILE_NOT_FOUND {
                return Ok(Box::new(std::iter::empty()));
            }
            return Err(FsError::from_os_code("FindFirstFile", path, code));
        }
        Ok(Box::new(DirectoryIter {
            guard: Some(FindGuard(handle)),
            first: Some(data),
            path: path.to_owned(),
        }))
    }

    fn alternate_streams(&self, path: &str) -> Result<Vec<StreamInformation>, FsError> {
        let handle = open_metadata_handle("EnumerateStreams", path, GENERIC_READ)?;
        let mut streams = Vec::new();
        let mut context: *mut c_void = ptr::null_mut();
        // The stream directory header is the 20 meaningful leading bytes of
        // WIN32_STREAM_ID; the name follows as raw UTF-16.
        const STREAM_HEADER_BYTES: u32 = 20;
        let result = (|| {
            loop {
                let mut header: WIN32_STREAM_ID = unsafe { std::mem::zeroed() };
                let mut read = 0u32;
                let ok = unsafe {
                    BackupRead(
                        handle.0,
                        &mut header as *mut _ as *mut u8,
                        STREAM_HEADER_BYTES,
                        &mut read,
                        0,
                        1,
                        &mut context,
                    )
                };
                if ok == 0 {
                    return Err(last_error("EnumerateStreams", path));
                }
                if read == 0 {
                    return Ok(());
                }
                let mut name = String::new();
                if header.dwStreamNameSize > 0 {
                    let mut name_buf = vec![0u16; (header.dwStreamNameSize / 2) as usize];
                    let ok = unsafe {
                        BackupRead(
                            handle.0,
                            name_buf.as_mut_ptr() as *mut u8,
                            header.dwStreamNameSize,
                            &mut read,
                            0,
                            1,
                            &mut context,
                        )
                    };
                    if ok == 0 {
                        return Err(last_error("EnumerateStreams", path));
                    }
                    name = from_wide(&name_buf);
                }
                if header.dwStreamId == BACKUP_ALTERNATE_DATA {
                    streams.push(StreamInformation {
                        name,
                        len: header.Size as u64,
                    });
                }
                if header.Size != 0 {
                    let mut seeked_low = 0u32;
                    let mut seeked_high = 0u32;
                    unsafe {
                        BackupSeek(
                            handle.0,
                            header.Size as u32,
                            (header.Size >> 32) as u32,
                            &mut seeked_low,
                            &mut seeked_high,
                            &mut context,
                        );
                    }
                }
            }
        })();
        // Backup context must always be released, even after a failure.
        if !context.is_null() {
            let mut read = 0u32;
            unsafe {
                BackupRead(handle.0, ptr::null_mut(), 0, &mut read, 1, 0, &mut context);
            }
        }
        result.map(|()| streams)
    }

    fn volume_mount_root(&self, path: &str) -> Result<String, FsError> {
        let wide = to_wide(path);
        let buf = with_growing_buffer("GetVolumePathName", path, MAX_PATH as usize + 1, |buf| {
            let ok =
                unsafe { GetVolumePathNameW(wide.as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
            if ok == 0 {
                return Err(unsafe { GetLastError() });
            }
            let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
            Ok(Fill::Done(len))
        })?;
        Ok(from_wide(&buf))
    }

    fn canonical_volume_name(&self, mount_root: &str) -> Result<String, FsError> {
        // The API insists on a trailing separator.
        let root = if mount_root.ends_with(['\\', '/']) {
            mount_root.to_owned()
        } else {
            format!("{mount_root}\\")
        };
        let wide = to_wide(&root);
        // Volume GUID names are a fixed ~50 characters.
        let buf = with_growing_buffer("GetVolumeName", mount_root, 64, |buf| {
            let ok = unsafe {
                GetVolumeNameForVolumeMountPointW(wide.as_ptr(), buf.as_mut_ptr(), buf.len() as u32)
            };
            if ok == 0 {
                return Err(unsafe { GetLastError() });
            }
            let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
            Ok(Fill::Done(len))
        })?;
        Ok(from_wide(&buf))
    }

    fn volume_mount_points(&self, volume_root: &str) -> Result<Vec<String>, FsError> {
        let root = if volume_root.ends_with(['\\', '/']) {
            volume_root.to_owned()
        } else {
            format!("{volume_root}\\")
        };
        let wide = to_wide(&root);
        let mut buf = vec![0u16; MAX_PATH as usize + 1];
        let handle =
            unsafe { FindFirstVolumeMountPointW(wide.as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
        if handle == INVALID_HANDLE_VALUE {
            let code = unsafe { GetLastError() };
            if code == ERROR_NO_MORE_FILES || code == ERROR_FILE_NOT_FOUND || code == ERROR_PATH_NOT_FOUND
            {
                return Ok(Vec::new());
            }
            return Err(FsError::from_os_code(
                "FindVolumeMountPoint",
                volume_root,
                code,
            ));
        }
        let guard = MountPointFindGuard(handle);
        let mut points = vec![from_wide_nul(&buf)];
        loop {
            let ok =
                unsafe { FindNextVolumeMountPointW(guard.0, buf.as_mut_ptr(), buf.len() as u32) };
            if ok == 0 {
                let code = unsafe { GetLastError() };
                if code == ERROR_NO_MORE_FILES {
                    break;
                }
                return Err(FsError::from_os_code(
                    "FindVolumeMountPoint",
                    volume_root,
                    code,
                ));
            }
            points.push(from_wide_nul(&buf));
        }
        Ok(points)
    }

    fn query_dos_device_names(&self, device: Option<&str>) -> Result<Vec<String>, FsError> {
        let wide = device.map(to_wide);
        let name_ptr = wide.as_ref().map_or(ptr::null(), |w| w.as_ptr());
        let label = device.unwrap_or("*");
        // The full namespace enumeration runs to several hundred entries;
        // start big so the common case needs no retry.
        let initial = if device.is_none() { 64 * 1024 } else { 512 };
        let buf = with_growing_buffer("QueryDosDevice", label, initial, |buf| {
            let ret = unsafe { QueryDosDeviceW(name_ptr, buf.as_mut_ptr(), buf.len() as u32) };
            if ret == 0 {
                return Err(unsafe { GetLastError() });
            }
            Ok(Fill::Done(ret as usize))
        })?;
        Ok(split_multi_sz(&buf))
    }

    fn logical_drive_strings(&self) -> Result<Vec<String>, FsError> {
        let buf = with_growing_buffer("GetLogicalDriveStrings", "", 128, |buf| {
            let ret = unsafe { GetLogicalDriveStringsW(buf.len() as u32, buf.as_mut_ptr()) };
            length_convention(ret, buf.len())
        })?;
        Ok(split_multi_sz(&buf))
    }

    fn volume_information(&self, volume_root: &str) -> Result<VolumeInformation, FsError> {
        let root = if volume_root.ends_with(['\\', '/']) {
            volume_root.to_owned()
        } else {
            format!("{volume_root}\\")
        };
        let wide = to_wide(&root);
        let mut name = vec![0u16; MAX_PATH as usize + 1];
        let mut file_system = vec![0u16; MAX_PATH as usize + 1];
        let mut serial = 0u32;
        let mut max_component = 0u32;
        let mut flags = 0u32;
        let ok = unsafe {
            GetVolumeInformationW(
                wide.as_ptr(),
                name.as_mut_ptr(),
                name.len() as u32,
                &mut serial,
                &mut max_component,
                &mut flags,
                file_system.as_mut_ptr(),
                file_system.len() as u32,
            )
        };
        if ok == 0 {
            return Err(last_error("GetVolumeInformation", volume_root));
        }
        Ok(VolumeInformation {
            name: from_wide_nul(&name),
            serial_number: serial,
            max_component_length: max_component,
            file_system: from_wide_nul(&file_system),
            features: flags,
        })
    }

    fn hidden_drive_directory(&self, drive: char) -> Option<String> {
        let name = to_wide(&format!("={}:", drive.to_ascii_uppercase()));
        let mut buf = vec![0u16; MAX_PATH as usize + 1];
        let ret = unsafe {
            GetEnvironmentVariableW(name.as_ptr(), buf.as_mut_ptr(), buf.len() as u32)
        };
        if ret == 0 {
            let code = unsafe { GetLastError() };
            if code != ERROR_ENVVAR_NOT_FOUND {
                tracing::debug!("hidden drive variable query failed for {drive}: {code}");
            }
            return None;
        }
        if ret as usize >= buf.len() {
            buf = vec![0u16; ret as usize + 1];
            let ret = unsafe {
                GetEnvironmentVariableW(name.as_ptr(), buf.as_mut_ptr(), buf.len() as u32)
            };
            if ret == 0 {
                return None;
            }
        }
        Some(from_wide_nul(&buf))
    }

    fn process_current_directory(&self) -> Result<String, FsError> {
        let buf = with_growing_buffer("GetCurrentDirectory", "", MAX_PATH as usize + 1, |buf| {
            let ret = unsafe { GetCurrentDirectoryW(buf.len() as u32, buf.as_mut_ptr()) };
            length_convention(ret, buf.len())
        })?;
        Ok(from_wide(&buf))
    }
}
