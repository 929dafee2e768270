//! Real-filesystem checks against the Win32 backend. Windows-only; the
//! in-memory suites cover the same service logic everywhere else.
#![cfg(windows)]

use std::io::{Read, Write};

use flexfs::info::{ChildKind, SearchOption};
use flexfs::storage::windows::WindowsStorage;
use flexfs::storage::{Access, CreationMode, FileAttributes, ShareMode};
use flexfs::{ExtendedFileService, FileService, FlexFileService};

fn service() -> FlexFileService<WindowsStorage> {
    FlexFileService::new(WindowsStorage::new()).expect("service construction")
}

#[test]
fn test_full_path_against_tracked_directory() {
    let service = service();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap().to_owned();

    service.set_current_directory(&base).unwrap();
    let resolved = service.full_path("child.txt").unwrap();
    assert!(resolved.ends_with("child.txt"));
    assert!(resolved.len() > "child.txt".len());
    assert_eq!(resolved, service.full_path_with_base("child.txt", Some(&base)).unwrap());
}

#[test]
fn test_directory_create_enumerate_delete() {
    let service = service();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap().to_owned();

    let tree = format!("{base}\\a\\b\\c");
    service.create_directory(&tree).unwrap();
    assert!(service.directory_exists(&tree));

    let mut stream = service
        .create_file_stream(
            &format!("{base}\\a\\b\\f.txt"),
            CreationMode::CreateNew,
            Access::READ | Access::WRITE,
            ShareMode::read_write_delete(),
        )
        .unwrap();
    stream.write_all(b"windows bytes").unwrap();
    drop(stream);

    let root = service.path_info(&format!("{base}\\a")).unwrap();
    let names: Vec<String> = root
        .children(
            service.storage(),
            ChildKind::Files,
            "*.txt",
            SearchOption::AllDirectories,
            FileAttributes::empty(),
        )
        .unwrap()
        .map(|entry| entry.unwrap().name().to_owned())
        .collect();
    assert_eq!(names, vec!["f.txt"]);

    service.delete_directory(&format!("{base}\\a"), true).unwrap();
    assert!(!service.directory_exists(&format!("{base}\\a")));
}

#[test]
fn test_copy_and_hash_round_trip() {
    let service = service();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap().to_owned();

    let source = format!("{base}\\src.bin");
    let copy = format!("{base}\\dst.bin");
    let mut stream = service
        .create_file_stream(
            &source,
            CreationMode::CreateNew,
            Access::READ | Access::WRITE,
            ShareMode::read_write_delete(),
        )
        .unwrap();
    stream.write_all(b"same bytes either side").unwrap();
    drop(stream);

    service.copy_file(&source, &copy, false).unwrap();
    assert!(service.copy_file(&source, &copy, false).is_err());
    assert_eq!(
        service.file_hash(&source).unwrap(),
        service.file_hash(&copy).unwrap()
    );

    let mut read_back = String::new();
    service
        .create_file_stream(
            &copy,
            CreationMode::OpenExisting,
            Access::READ,
            ShareMode::read_write_delete(),
        )
        .unwrap()
        .read_to_string(&mut read_back)
        .unwrap();
    assert_eq!(read_back, "same bytes either side");
}

#[test]
fn test_final_path_restores_caller_drive_casing() {
    let service = service();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap().to_owned();

    // Query through a lower-cased drive spelling; the answer keeps it.
    let lowered = format!(
        "{}{}",
        base[..1].to_ascii_lowercase(),
        &base[1..]
    );
    let final_path = service.final_path(&lowered).unwrap();
    assert!(final_path.starts_with(&lowered[..2]));
    assert!(!final_path.starts_with("\\\\?\\"));
}

#[test]
fn test_volume_queries_on_system_drive() {
    let service = service();
    let drives = service.logical_drive_strings().unwrap();
    assert!(!drives.is_empty());

    let system = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_owned());
    let root = format!("{system}\\");
    let name = service.volume_name(&root).unwrap();
    assert!(name.starts_with("\\\\?\\Volume{"));
    assert_eq!(service.mount_point(&root).unwrap().to_ascii_uppercase(), root.to_ascii_uppercase());

    let devices = service.query_dos_device_names(None).unwrap();
    assert!(devices.len() > 10);
}

#[test]
fn test_extended_prefix_enables_trailing_dot_names() {
    let service = service();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_str().unwrap().to_owned();

    // Only the extended namespace can carry a trailing dot; the legacy
    // resolver would silently trim it.
    let awkward = format!("\\\\?\\{base}\\trailing.");
    service.create_directory(&awkward).unwrap();
    assert!(service.directory_exists(&awkward));
    service.delete_directory(&awkward, false).unwrap();
    assert!(!service.directory_exists(&awkward));
}
