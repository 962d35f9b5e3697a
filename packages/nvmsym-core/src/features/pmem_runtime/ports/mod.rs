//! Collaborators of the POSIX model

use super::domain::Errno;

/// Real mappings for memory that is not backed by the pmem file
pub trait HostMapper {
    fn mmap(&mut self, start: u64, length: u64, prot: i32, flags: i32, fd: i32, offset: i64) -> Result<u64, Errno>;

    fn munmap(&mut self, start: u64, length: u64) -> Result<(), Errno>;
}

/// Persistence oracle consulted when the last mapping of a page goes away
pub trait PersistenceChecker {
    fn is_pmem(&self, address: u64, length: u64) -> bool;

    /// Report every unpersisted modification in `[address, address + length)`
    fn check_persisted(&mut self, address: u64, length: u64);
}
