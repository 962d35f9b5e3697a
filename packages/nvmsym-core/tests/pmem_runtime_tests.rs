//! Persistent-memory mapping model

mod common;

use common::*;
use nvmsym_core::config::HeuristicConfig;
use nvmsym_core::features::execution_state::AddressSpace;
use nvmsym_core::features::pmem_runtime::{
    Errno, GuestFault, InMemoryHost, MmanFatal, MmanModel, MAP_ANONYMOUS, MAP_PRIVATE, MAP_SHARED, PROT_READ,
    PROT_WRITE,
};
use pretty_assertions::assert_eq;

#[test]
fn test_page_refcounts_follow_map_and_unmap() {
    let (mut model, fd) = pmem_model(4);
    let mut space = AddressSpace::new();
    let prot = PROT_READ | PROT_WRITE;

    let first = model.mmap(&mut space, 0, 2 * PAGE, prot, MAP_SHARED, fd, 0).unwrap();
    assert_eq!(first, PMEM_BASE);
    assert_eq!(model.file(fd).unwrap().page_refs, vec![1, 1, 0, 0]);

    let second = model.mmap(&mut space, 0, 2 * PAGE, prot, MAP_SHARED, fd, 0).unwrap();
    assert_eq!(second, PMEM_BASE);
    assert_eq!(model.file(fd).unwrap().page_refs, vec![2, 2, 0, 0]);

    model.munmap(&mut space, first, 2 * PAGE).unwrap();
    assert_eq!(model.file(fd).unwrap().page_refs, vec![1, 1, 0, 0]);
    assert!(model.checker().checked.is_empty());

    model.munmap(&mut space, first, 2 * PAGE).unwrap();
    assert_eq!(model.file(fd).unwrap().page_refs, vec![0, 0, 0, 0]);
    assert_eq!(model.checker().checked, vec![PMEM_BASE, PMEM_BASE + PAGE]);

    assert_eq!(
        model.munmap(&mut space, first + PAGE, PAGE),
        Err(GuestFault::Fatal(MmanFatal::ZeroRefCount(1)))
    );
    // pmem mappings never touch the address space or the host
    assert!(space.is_empty());
    assert!(model.host().mappings().is_empty());
}

#[test]
fn test_unaligned_unmap_covers_enclosing_pages() {
    let (mut model, fd) = pmem_model(4);
    let mut space = AddressSpace::new();
    model.mmap(&mut space, 0, 3 * PAGE, PROT_READ, MAP_SHARED, fd, PAGE as i64).unwrap();
    assert_eq!(model.file(fd).unwrap().page_refs, vec![0, 1, 1, 1]);

    model.munmap(&mut space, PMEM_BASE + PAGE, PAGE + 1).unwrap();
    assert_eq!(model.file(fd).unwrap().page_refs, vec![0, 0, 0, 1]);
    assert_eq!(model.checker().checked.len(), 2);
}

#[test]
fn test_anonymous_and_host_mappings_become_fixed_objects() {
    let (mut model, _) = pmem_model(1);
    let mut space = AddressSpace::new();
    let anon = model
        .mmap(&mut space, 0, 3 * PAGE, PROT_READ, MAP_PRIVATE | MAP_ANONYMOUS, -1, 0)
        .unwrap();
    assert_eq!(space.len(), 3);

    let host_fd = model.open_host_file(17);
    assert!(!model.maps_persistent(host_fd));
    let mapped = model.mmap(&mut space, 0, PAGE, PROT_READ, MAP_SHARED, host_fd, 0).unwrap();
    assert_eq!(space.len(), 4);
    assert!(model.host().is_mapped(mapped));

    model.munmap(&mut space, anon, 3 * PAGE).unwrap();
    assert_eq!(space.len(), 1);
    assert!(!model.host().is_mapped(anon));
}

#[test]
fn test_guest_errors() {
    let (mut model, fd) = pmem_model(2);
    let mut space = AddressSpace::new();
    assert_eq!(
        model.mmap(&mut space, 0, 0, PROT_READ, MAP_SHARED, fd, 0),
        Err(GuestFault::Errno(Errno::Inval))
    );
    assert_eq!(
        model.mmap(&mut space, 0, PAGE, PROT_READ, MAP_SHARED, fd, -4096),
        Err(GuestFault::Errno(Errno::Inval))
    );
    assert_eq!(model.mlock(PMEM_BASE, PAGE), Err(GuestFault::Errno(Errno::Perm)));
    assert_eq!(model.munlock(PMEM_BASE, PAGE), Err(GuestFault::Errno(Errno::Perm)));
    assert_eq!(model.mprotect(PMEM_BASE, PAGE, PROT_READ), Ok(()));

    model.close(fd).unwrap();
    assert_eq!(
        model.mmap(&mut space, 0, PAGE, PROT_READ, MAP_SHARED, fd, 0),
        Err(GuestFault::Errno(Errno::BadFd))
    );
    // descriptors are reused lowest-first
    assert_eq!(model.open_host_file(5), fd);
}

#[test]
fn test_mapping_a_volatile_page_is_fatal() {
    let (mut model, fd) = pmem_model(2);
    let mut space = AddressSpace::new();
    model.checker_mut().volatile_pages.push(PMEM_BASE + PAGE);
    assert_eq!(
        model.mmap64(&mut space, 0, 2 * PAGE, PROT_READ, MAP_SHARED, fd, 0),
        Err(GuestFault::Fatal(MmanFatal::NotPmem(1)))
    );
}

#[test]
fn test_page_size_comes_from_config() {
    let config = HeuristicConfig::default().page_size(8192);
    let model = MmanModel::from_config(&config, InMemoryHost::new(8192), RecordingChecker::default());
    assert_eq!(model.page_size(), 8192);
}
