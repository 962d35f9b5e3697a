//! Host mapper that hands out addresses from a private range

use std::collections::BTreeMap;

use crate::features::pmem_runtime::domain::Errno;
use crate::features::pmem_runtime::ports::HostMapper;

#[derive(Debug, Clone)]
pub struct InMemoryHost {
    next: u64,
    page_size: u64,
    mappings: BTreeMap<u64, u64>,
}

impl InMemoryHost {
    pub const BASE: u64 = 0x7f00_0000_0000;

    pub fn new(page_size: u64) -> Self {
        Self {
            next: Self::BASE,
            page_size,
            mappings: BTreeMap::new(),
        }
    }

    pub fn mappings(&self) -> &BTreeMap<u64, u64> {
        &self.mappings
    }

    pub fn is_mapped(&self, address: u64) -> bool {
        self.mappings
            .range(..=address)
            .next_back()
            .map(|(start, len)| address < start + len)
            .unwrap_or(false)
    }
}

impl HostMapper for InMemoryHost {
    fn mmap(&mut self, _start: u64, length: u64, _prot: i32, _flags: i32, _fd: i32, _offset: i64) -> Result<u64, Errno> {
        if length == 0 {
            return Err(Errno::Inval);
        }
        let length = length
            .div_ceil(self.page_size)
            .checked_mul(self.page_size)
            .ok_or(Errno::NoMem)?;
        let address = self.next;
        self.next = self.next.checked_add(length).ok_or(Errno::NoMem)?;
        self.mappings.insert(address, length);
        Ok(address)
    }

    fn munmap(&mut self, start: u64, length: u64) -> Result<(), Errno> {
        if start % self.page_size != 0 {
            return Err(Errno::Inval);
        }
        let end = start.saturating_add(length);
        let covered: Vec<u64> = self.mappings.range(start..end).map(|(s, _)| *s).collect();
        for s in covered {
            self.mappings.remove(&s);
        }
        Ok(())
    }
}
