/// Faults the POSIX model reports to the guest
use thiserror::Error;

/// Error numbers surfaced through the guest's `errno`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Errno {
    #[error("EPERM")]
    Perm,

    #[error("EBADF")]
    BadFd,

    #[error("ENOMEM")]
    NoMem,

    #[error("EINVAL")]
    Inval,
}

impl Errno {
    /// Linux numeric value
    pub fn code(&self) -> i32 {
        match self {
            Errno::Perm => 1,
            Errno::BadFd => 9,
            Errno::NoMem => 12,
            Errno::Inval => 22,
        }
    }
}

/// Misuse of the persistent-memory model that terminates the path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MmanFatal {
    #[error("mmap only supports symbolic files that are persistent files")]
    NotPersistentFile,

    #[error("pmem file not opened prior to mapping")]
    NotOpened,

    #[error("mmap invoked without a page-aligned offset ({0})")]
    UnalignedOffset(u64),

    #[error("trying to map beyond the file size ({end} > {size})")]
    BeyondFileSize { end: u64, size: u64 },

    #[error("munmap invoked on [{start:#x}, {end:#x}) that's not fully included in the pmem file")]
    NotEnclosed { start: u64, end: u64 },

    #[error("munmap invoked on page {0} with ref count already equal to 0")]
    ZeroRefCount(u64),

    #[error("page {0} of the pmem file is not persistent memory")]
    NotPmem(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuestFault {
    #[error("errno {0}")]
    Errno(#[from] Errno),

    #[error("fatal: {0}")]
    Fatal(#[from] MmanFatal),
}

pub type GuestResult<T> = std::result::Result<T, GuestFault>;
