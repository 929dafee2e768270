//! End-to-end service behavior over the in-memory backend: multi-drive
//! resolution, directory lifecycle, enumeration filtering, and the
//! metadata model, all driven through the public trait surface.

mod common;

use std::io::{Read, Seek, SeekFrom, Write};

use flexfs::error::FsError;
use flexfs::info::{ChildKind, SearchOption};
use flexfs::storage::{Access, CreationMode, FileAttributes, ShareMode, Storage};
use flexfs::{ExtendedFileService, FileService};

use common::{service_over, two_drive_storage};

#[test]
fn test_drive_relative_resolution_against_tracked_directories() {
    let storage = two_drive_storage();
    storage.create_dir_all("C:\\Users").unwrap();
    let service = service_over(&storage);
    service.set_current_directory("C:\\Users").unwrap();

    // A mismatched base never hijacks another drive's relative path.
    assert_eq!(
        service.full_path_with_base("C:a", Some("D:\\b")).unwrap(),
        "C:\\Users\\a"
    );
    // An untouched drive falls back to its root.
    assert_eq!(
        service.full_path_with_base("D:a", Some("C:\\b")).unwrap(),
        "D:\\a"
    );
}

#[test]
fn test_set_current_directory_rejects_relative_input() {
    let storage = two_drive_storage();
    let service = service_over(&storage);
    assert!(matches!(
        service.set_current_directory("a"),
        Err(FsError::InvalidArgument { .. })
    ));
}

#[test]
fn test_current_directory_survives_directory_removal() {
    let storage = two_drive_storage();
    storage.create_dir_all("C:\\work\\deep").unwrap();
    let service = service_over(&storage);
    service.set_current_directory("C:\\work\\deep").unwrap();
    storage.remove_directory("C:\\work\\deep").unwrap();
    assert_eq!(service.current_directory().unwrap(), "C:\\work");
}

#[test]
fn test_volume_identity_is_spelling_independent() {
    let storage = two_drive_storage();
    storage.create_dir_all("C:\\spot").unwrap();
    let service = service_over(&storage);

    let by_drive = service.volume_name("C:\\spot").unwrap();
    let by_guid = service.volume_name(&format!("{by_drive}spot")).unwrap();
    assert_eq!(by_drive, by_guid);
    assert!(by_drive.starts_with("\\\\?\\Volume{"));
}

#[test]
fn test_directory_lifecycle() {
    let storage = two_drive_storage();
    let service = service_over(&storage);

    service.create_directory("D:\\projects\\alpha\\src").unwrap();
    assert!(service.directory_exists("D:\\projects\\alpha\\src"));

    let mut stream = service
        .create_file_stream(
            "D:\\projects\\alpha\\src\\lib.rs",
            CreationMode::CreateNew,
            Access::READ | Access::WRITE,
            ShareMode::read_write_delete(),
        )
        .unwrap();
    stream.write_all(b"pub fn answer() -> u32 { 42 }").unwrap();
    stream.flush().unwrap();
    drop(stream);
    assert!(service.file_exists("D:\\projects\\alpha\\src\\lib.rs"));

    // Non-recursive delete refuses a populated tree, recursive takes it.
    assert!(service.delete_directory("D:\\projects", false).is_err());
    service.delete_directory("D:\\projects", true).unwrap();
    assert!(!service.directory_exists("D:\\projects"));
}

#[test]
fn test_stream_read_back_and_seek() {
    let storage = two_drive_storage();
    storage.write_file("C:\\notes.txt", b"0123456789").unwrap();
    let service = service_over(&storage);

    let mut stream = service
        .create_file_stream(
            "C:\\notes.txt",
            CreationMode::OpenExisting,
            Access::READ,
            ShareMode::read_write_delete(),
        )
        .unwrap();
    stream.seek(SeekFrom::Start(4)).unwrap();
    let mut rest = String::new();
    stream.read_to_string(&mut rest).unwrap();
    assert_eq!(rest, "456789");
}

#[test]
fn test_relative_paths_resolve_through_tracker_not_process() {
    let storage = two_drive_storage();
    storage.create_dir_all("C:\\base\\nested").unwrap();
    let service = service_over(&storage);
    service.set_current_directory("C:\\base").unwrap();

    service.create_directory("made-here").unwrap();
    assert!(storage.directory_exists("C:\\base\\made-here"));

    assert_eq!(
        service.full_path("nested\\..\\made-here").unwrap(),
        "C:\\base\\made-here"
    );
}

#[test]
fn test_recursive_file_listing_respects_hidden_exclusion() {
    let storage = two_drive_storage();
    storage.create_dir_all("C:\\scan\\visible").unwrap();
    storage.create_dir_all("C:\\scan\\shadow").unwrap();
    storage.write_file("C:\\scan\\top.txt", b"1").unwrap();
    storage.write_file("C:\\scan\\visible\\inner.txt", b"2").unwrap();
    storage.write_file("C:\\scan\\shadow\\buried.txt", b"3").unwrap();
    storage
        .set_attributes(
            "C:\\scan\\shadow",
            FileAttributes::DIRECTORY | FileAttributes::HIDDEN,
        )
        .unwrap();
    let service = service_over(&storage);

    let root = service.path_info("C:\\scan").unwrap();
    let mut names: Vec<String> = root
        .children(
            service.storage(),
            ChildKind::Files,
            "*.txt",
            SearchOption::AllDirectories,
            FileAttributes::HIDDEN,
        )
        .unwrap()
        .map(|entry| entry.unwrap().name().to_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["inner.txt", "top.txt"]);
}

#[test]
fn test_path_info_refresh_tracks_provenance() {
    let storage = two_drive_storage();
    storage.write_file("C:\\p.bin", b"12345").unwrap();
    let service = service_over(&storage);

    let mut info = service.path_info("C:\\p.bin").unwrap();
    assert_eq!(info.len(), 5);
    storage.delete_file("C:\\p.bin").unwrap();
    info.refresh(service.storage()).unwrap();
    assert!(!info.exists());
    assert_eq!(info.len(), 5);
}

#[test]
fn test_handle_info_keeps_caller_volume_spelling() {
    let storage = two_drive_storage();
    storage.create_dir_all("C:\\Case\\Sensitive").unwrap();
    let service = service_over(&storage);

    let info = service.path_info_by_handle("c:\\case\\sensitive").unwrap();
    assert_eq!(info.path(), "c:\\Case\\Sensitive");
    assert!(info.volume_serial().is_some());
}

#[test]
fn test_alternate_stream_enumeration() {
    let storage = two_drive_storage();
    storage.write_file("C:\\carrier.txt", b"primary").unwrap();
    storage
        .add_alternate_stream("C:\\carrier.txt", "Zone.Identifier", b"[ZoneTransfer]\r\nZoneId=3")
        .unwrap();
    storage
        .add_alternate_stream("C:\\carrier.txt", "notes", b"hello")
        .unwrap();
    let service = service_over(&storage);

    let mut streams = service.alternate_streams("C:\\carrier.txt").unwrap();
    streams.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0].name, ":Zone.Identifier:$DATA");
    assert_eq!(streams[1].name, ":notes:$DATA");
    assert_eq!(streams[1].len, 5);
}

#[test]
fn test_dos_device_and_drive_enumeration() {
    let storage = two_drive_storage()
        .with_dos_device("C:", &["\\Device\\HarddiskVolume1"])
        .with_dos_device("NUL", &["\\Device\\Null"])
        .with_dos_device("PIPE", &["\\Device\\NamedPipe"]);
    let service = service_over(&storage);

    let all = service.query_dos_device_names(None).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(
        service.query_dos_device_names(Some("nul")).unwrap(),
        vec!["\\Device\\Null"]
    );
    assert!(service.query_dos_device_names(Some("missing")).is_err());

    assert_eq!(
        service.logical_drive_strings().unwrap(),
        vec!["C:\\".to_string(), "D:\\".to_string()]
    );
}

#[test]
fn test_copy_preserves_content_and_hash() {
    let storage = two_drive_storage();
    storage.write_file("C:\\origin.dat", b"payload").unwrap();
    let service = service_over(&storage);

    service.copy_file("C:\\origin.dat", "D:\\copy.dat", false).unwrap();
    assert_eq!(
        service.file_hash("C:\\origin.dat").unwrap(),
        service.file_hash("D:\\copy.dat").unwrap()
    );
}

#[test]
fn test_access_denied_is_not_swallowed_by_existence_probe() {
    let storage = two_drive_storage();
    storage.create_dir_all("C:\\locked").unwrap();
    storage.write_file("C:\\locked\\f", b"x").unwrap();
    storage.deny_access("C:\\locked\\f").unwrap();
    let service = service_over(&storage);

    assert!(matches!(
        service.path_info("C:\\locked\\f"),
        Err(FsError::AccessDenied { .. })
    ));
}
