//! Shared fixtures for the integration suites.

use flexfs::storage::memory::MemoryStorage;
use flexfs::FlexFileService;

/// Two registered volumes (`C:\` and `D:\`), process directory at `C:\`.
pub fn two_drive_storage() -> MemoryStorage {
    MemoryStorage::new()
        .with_volume("C:\\", "\\\\?\\Volume{aaaa0000-1111-2222-3333-444455556666}\\")
        .with_volume("D:\\", "\\\\?\\Volume{bbbb0000-1111-2222-3333-444455556666}\\")
        .with_process_directory("C:\\")
}

pub fn service_over(storage: &MemoryStorage) -> FlexFileService<MemoryStorage> {
    FlexFileService::new(storage.clone()).expect("fixture service construction")
}
