//! Windows extended file-system library: path grammar, per-volume current
//! directories, and file metadata over raw OS calls.
//!
//! The layers, leaf to root:
//!
//! - [`paths`] — pure path-string classification and transformation.
//! - [`current_directory`] — one tracked working directory per volume,
//!   independent of the process-wide current directory.
//! - [`storage`] — the OS seam: a [`storage::Storage`] trait with a raw
//!   Win32 backend (Windows only) and an in-memory backend for tests and
//!   non-Windows hosts.
//! - [`service`] — the composed [`service::FileService`] /
//!   [`service::ExtendedFileService`] surface.
//! - [`info`] — provenance-tagged file-system metadata records.

pub mod current_directory;
pub mod error;
pub mod info;
pub mod paths;
pub mod service;
pub mod storage;

pub use error::{ExitCode, FsError};
pub use service::{ExtendedFileService, FileService, FlexFileService};
