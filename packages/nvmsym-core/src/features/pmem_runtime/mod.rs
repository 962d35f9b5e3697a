//! POSIX memory-mapping model for the guest
//!
//! `mmap`/`munmap` on the symbolic persistent-memory file keep a per-page
//! reference count and hand the last unmapping of each page to a
//! [`PersistenceChecker`]. Other mappings are delegated to a [`HostMapper`]
//! and mirrored into the state's address space.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use application::*;
pub use domain::{DiskFile, DiskFileId, Errno, GuestFault, GuestResult, MmanFatal};
pub use infrastructure::InMemoryHost;
pub use ports::{HostMapper, PersistenceChecker};
