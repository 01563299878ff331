//! Tests for the mmap-backed memory manager.

use super::*;

fn sizes(text: usize, read_only: usize, read_write: usize) -> SectionSizes {
    SectionSizes {
        text: (text, 16),
        read_only: (read_only, 8),
        read_write: (read_write, 8),
    }
}

#[test]
fn test_reserve_rounds_to_pages() {
    let mut manager = MmapMemoryManager::new();
    let page = manager.page_size();
    manager.reserve(&sizes(10, 0, page + 1)).unwrap();

    assert_eq!(manager.allocated_bytes(), 3 * page);
}

#[test]
fn test_allocations_are_aligned_and_disjoint() {
    let mut manager = MmapMemoryManager::new();
    manager.reserve(&sizes(64, 0, 0)).unwrap();

    let a = manager.allocate(SectionKind::Text, 3, 1).unwrap();
    let b = manager.allocate(SectionKind::Text, 16, 16).unwrap();

    assert_eq!(b as usize % 16, 0);
    assert!(b as usize >= a as usize + 3);
}

#[test]
fn test_allocate_without_reservation_fails() {
    let mut manager = MmapMemoryManager::new();
    manager.reserve(&sizes(16, 0, 0)).unwrap();

    let err = manager.allocate(SectionKind::ReadOnlyData, 8, 8).unwrap_err();
    assert!(matches!(err, JitError::Memory(_)));
}

#[test]
fn test_allocation_beyond_reservation_fails() {
    let mut manager = MmapMemoryManager::new();
    let page = manager.page_size();
    manager.reserve(&sizes(0, 0, 8)).unwrap();

    assert!(manager
        .allocate(SectionKind::ReadWriteData, page + 1, 8)
        .is_err());
}

#[test]
fn test_reserving_twice_fails() {
    let mut manager = MmapMemoryManager::new();
    manager.reserve(&sizes(16, 0, 0)).unwrap();
    assert!(manager.reserve(&sizes(16, 0, 0)).is_err());
}

#[test]
fn test_finalize_keeps_contents_readable() {
    let mut manager = MmapMemoryManager::new();
    manager.reserve(&sizes(0, 4, 4)).unwrap();
    let rodata = manager.allocate(SectionKind::ReadOnlyData, 4, 4).unwrap();
    let data = manager.allocate(SectionKind::ReadWriteData, 4, 4).unwrap();
    unsafe {
        std::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), rodata, 4);
        data.write(9);
    }

    manager.finalize().unwrap();

    assert!(manager.is_finalized());
    unsafe {
        assert_eq!(std::slice::from_raw_parts(rodata, 4), &[1, 2, 3, 4]);
        // Read-write data stays writable.
        data.write(10);
        assert_eq!(data.read(), 10);
    }
    assert!(manager.allocate(SectionKind::ReadWriteData, 1, 1).is_err());
}

#[test]
fn test_closure_factory() {
    let factory = || Box::new(MmapMemoryManager::new()) as Box<dyn MemoryManager>;
    let mut manager = factory.create();
    manager.reserve(&sizes(8, 0, 0)).unwrap();
    assert!(manager.allocated_bytes() > 0);
}

#[test]
fn test_protection_per_section() {
    assert_eq!(
        Protection::for_section(SectionKind::Text),
        Protection::ReadExecute
    );
    assert_eq!(
        Protection::for_section(SectionKind::ReadOnlyData),
        Protection::ReadOnly
    );
    assert_eq!(
        Protection::for_section(SectionKind::ReadWriteData),
        Protection::ReadWrite
    );
}
