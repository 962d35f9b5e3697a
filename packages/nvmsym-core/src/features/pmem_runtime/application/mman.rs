//! `mmap` family over the symbolic persistent-memory file
//!
//! Mapping the pmem file hands out pointers into its contents and counts
//! live mappings per page. When the last mapping of a page goes away the
//! page must still be persistent memory and is checked for unpersisted
//! stores. Every other mapping goes to the host and is mirrored into the
//! address space one fixed page at a time.

use std::collections::BTreeMap;
use tracing::warn;

use crate::config::HeuristicConfig;
use crate::features::execution_state::AddressSpace;
use crate::features::pmem_runtime::domain::{
    DiskFile, DiskFileId, Errno, GuestFault, GuestResult, MmanFatal,
};
use crate::features::pmem_runtime::ports::{HostMapper, PersistenceChecker};

pub const PROT_NONE: i32 = 0x0;
pub const PROT_READ: i32 = 0x1;
pub const PROT_WRITE: i32 = 0x2;

pub const MAP_SHARED: i32 = 0x01;
pub const MAP_PRIVATE: i32 = 0x02;
pub const MAP_FIXED: i32 = 0x10;
pub const MAP_ANONYMOUS: i32 = 0x20;

/// Lowest descriptor handed out; 0-2 are the standard streams
const FIRST_FD: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenFile {
    Disk(DiskFileId),
    Host(i32),
}

#[derive(Debug)]
pub struct MmanModel<H: HostMapper, P: PersistenceChecker> {
    page_size: u64,
    files: Vec<DiskFile>,
    fds: BTreeMap<i32, OpenFile>,
    sym_pmem: Option<DiskFileId>,
    host: H,
    checker: P,
    warned_mmap64: bool,
}

impl<H: HostMapper, P: PersistenceChecker> MmanModel<H, P> {
    pub fn new(page_size: u64, host: H, checker: P) -> Self {
        assert!(page_size.is_power_of_two(), "page size {} is not a power of two", page_size);
        Self {
            page_size,
            files: Vec::new(),
            fds: BTreeMap::new(),
            sym_pmem: None,
            host,
            checker,
            warned_mmap64: false,
        }
    }

    pub fn from_config(config: &HeuristicConfig, host: H, checker: P) -> Self {
        Self::new(config.page_size as u64, host, checker)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn checker(&self) -> &P {
        &self.checker
    }

    pub fn checker_mut(&mut self) -> &mut P {
        &mut self.checker
    }

    fn allocate_fd(&mut self, file: OpenFile) -> i32 {
        let fd = (FIRST_FD..)
            .find(|fd| !self.fds.contains_key(fd))
            .unwrap_or(FIRST_FD);
        self.fds.insert(fd, file);
        fd
    }

    /// Open the symbolic persistent file backed by `[contents, contents + size)`
    pub fn open_pmem_file(&mut self, name: &str, contents: u64, size: u64) -> i32 {
        let id = DiskFileId(self.files.len());
        self.files
            .push(DiskFile::new(name, contents, size, self.page_size).persistent());
        self.sym_pmem = Some(id);
        self.allocate_fd(OpenFile::Disk(id))
    }

    /// Open a symbolic file that is not persistent memory
    pub fn open_symbolic_file(&mut self, name: &str, contents: u64, size: u64) -> i32 {
        let id = DiskFileId(self.files.len());
        self.files.push(DiskFile::new(name, contents, size, self.page_size));
        self.allocate_fd(OpenFile::Disk(id))
    }

    /// Expose a concrete host descriptor to the guest
    pub fn open_host_file(&mut self, host_fd: i32) -> i32 {
        self.allocate_fd(OpenFile::Host(host_fd))
    }

    pub fn close(&mut self, fd: i32) -> GuestResult<()> {
        self.fds.remove(&fd).map(|_| ()).ok_or(Errno::BadFd.into())
    }

    pub fn file(&self, fd: i32) -> Option<&DiskFile> {
        match self.fds.get(&fd)? {
            OpenFile::Disk(id) => self.files.get(id.0),
            OpenFile::Host(_) => None,
        }
    }

    pub fn pmem_file(&self) -> Option<&DiskFile> {
        self.sym_pmem.and_then(|id| self.files.get(id.0))
    }

    /// Mapping `fd` yields NVM
    pub fn maps_persistent(&self, fd: i32) -> bool {
        matches!(self.fds.get(&fd), Some(OpenFile::Disk(id)) if Some(*id) == self.sym_pmem)
    }

    /// `length` rounded up to whole pages; `None` past the end of the address range
    fn round_up(&self, length: u64) -> Option<u64> {
        length.div_ceil(self.page_size).checked_mul(self.page_size)
    }

    /// Page addresses in `[start, start + length)`, stopping at the top of the address range
    fn pages(&self, start: u64, length: u64) -> impl Iterator<Item = u64> {
        let page_size = self.page_size;
        let end = start.saturating_add(length);
        std::iter::successors(Some(start), move |p| p.checked_add(page_size)).take_while(move |p| *p < end)
    }

    pub fn mmap(
        &mut self,
        space: &mut AddressSpace,
        start: u64,
        length: u64,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: i64,
    ) -> GuestResult<u64> {
        if length == 0 || offset < 0 || self.round_up(length).is_none() {
            return Err(Errno::Inval.into());
        }

        let mut host_fd = fd;
        if flags & MAP_ANONYMOUS == 0 {
            match self.fds.get(&fd).copied() {
                None => return Err(Errno::BadFd.into()),
                Some(OpenFile::Disk(id)) => return self.mmap_sym(id, length, offset as u64),
                Some(OpenFile::Host(h)) => host_fd = h,
            }
        }

        let address = self.host.mmap(start, length, prot, flags, host_fd, offset)?;
        warn!(
            start,
            length,
            prot,
            flags,
            fd,
            offset,
            address = %format!("{:#x}", address),
            "real mmap path"
        );
        for page in self.pages(address, length) {
            space.define_fixed_object(page, self.page_size);
        }
        Ok(address)
    }

    pub fn mmap64(
        &mut self,
        space: &mut AddressSpace,
        start: u64,
        length: u64,
        prot: i32,
        flags: i32,
        fd: i32,
        offset: i64,
    ) -> GuestResult<u64> {
        if !self.warned_mmap64 {
            warn!("mmap64 is modelled as mmap");
            self.warned_mmap64 = true;
        }
        self.mmap(space, start, length, prot, flags, fd, offset)
    }

    fn mmap_sym(&mut self, id: DiskFileId, length: u64, offset: u64) -> GuestResult<u64> {
        if Some(id) != self.sym_pmem {
            return Err(MmanFatal::NotPersistentFile.into());
        }
        let page_size = self.page_size;
        let Some(actual_length) = self.round_up(length) else {
            return Err(Errno::Inval.into());
        };
        let Some(file) = self.files.get_mut(id.0) else {
            return Err(MmanFatal::NotOpened.into());
        };
        if file.contents == 0 || file.size == 0 {
            return Err(MmanFatal::NotOpened.into());
        }
        if offset % page_size != 0 {
            return Err(MmanFatal::UnalignedOffset(offset).into());
        }
        let end = offset.checked_add(actual_length).unwrap_or(u64::MAX);
        if end > file.size {
            return Err(MmanFatal::BeyondFileSize { end, size: file.size }.into());
        }

        let first = offset / page_size;
        let last = first + actual_length / page_size;
        for page in first..last {
            if !self.checker.is_pmem(file.contents + page * page_size, page_size) {
                return Err(MmanFatal::NotPmem(page).into());
            }
            file.page_refs[page as usize] += 1;
        }
        Ok(file.contents + offset)
    }

    pub fn munmap(&mut self, space: &mut AddressSpace, start: u64, length: u64) -> GuestResult<()> {
        if let Some(file) = self.pmem_file() {
            if file.overlaps(start, length) {
                return self.munmap_sym(start, length);
            }
        }

        warn!(start = %format!("{:#x}", start), length, "munmap of a host mapping");
        for page in self.pages(start, length) {
            space.undefine_fixed_object(page);
        }
        self.host.munmap(start, length).map_err(GuestFault::from)
    }

    fn munmap_sym(&mut self, start: u64, length: u64) -> GuestResult<()> {
        let page_size = self.page_size;
        let Some(file) = self.sym_pmem.and_then(|id| self.files.get_mut(id.0)) else {
            return Err(MmanFatal::NotOpened.into());
        };
        if !file.encloses(start, length) {
            return Err(MmanFatal::NotEnclosed {
                start,
                end: start.saturating_add(length),
            }
            .into());
        }

        let offset = start - file.contents;
        if offset % page_size != 0 || length % page_size != 0 {
            warn!("arguments passed to munmap are not page aligned; rounding to enclosing pages");
        }
        let first = offset / page_size;
        let last = first + length.div_ceil(page_size);
        for page in first..last {
            let refs = &mut file.page_refs[page as usize];
            if *refs == 0 {
                return Err(MmanFatal::ZeroRefCount(page).into());
            }
            *refs -= 1;
            if *refs == 0 {
                let address = file.contents + page * page_size;
                if !self.checker.is_pmem(address, page_size) {
                    return Err(MmanFatal::NotPmem(page).into());
                }
                self.checker.check_persisted(address, page_size);
            }
        }
        Ok(())
    }

    pub fn mlock(&mut self, _address: u64, _length: u64) -> GuestResult<()> {
        warn!("mlock ignored (EPERM)");
        Err(Errno::Perm.into())
    }

    pub fn munlock(&mut self, _address: u64, _length: u64) -> GuestResult<()> {
        warn!("munlock ignored (EPERM)");
        Err(Errno::Perm.into())
    }

    pub fn mprotect(&mut self, _address: u64, _length: u64, _prot: i32) -> GuestResult<()> {
        warn!("mprotect treated as a no-op");
        Ok(())
    }
}
