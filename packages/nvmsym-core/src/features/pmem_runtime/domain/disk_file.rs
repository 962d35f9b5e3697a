//! Files known to the POSIX model

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DiskFileId(pub usize);

/// A file whose contents live in guest memory
#[derive(Debug, Clone, Serialize)]
pub struct DiskFile {
    pub name: String,
    /// Guest address of the first content byte; 0 while not opened
    pub contents: u64,
    pub size: u64,
    pub symbolic: bool,
    pub persistent: bool,
    /// Live mappings of each page
    pub page_refs: Vec<u32>,
}

impl DiskFile {
    pub fn new(name: impl Into<String>, contents: u64, size: u64, page_size: u64) -> Self {
        Self {
            name: name.into(),
            contents,
            size,
            symbolic: true,
            persistent: false,
            page_refs: vec![0; size.div_ceil(page_size) as usize],
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn end(&self) -> u64 {
        self.contents + self.size
    }

    pub fn overlaps(&self, start: u64, length: u64) -> bool {
        self.contents < start.saturating_add(length) && start < self.end()
    }

    pub fn encloses(&self, start: u64, length: u64) -> bool {
        self.contents <= start && start.saturating_add(length) <= self.end()
    }

    pub fn mapped_pages(&self) -> usize {
        self.page_refs.iter().filter(|r| **r > 0).count()
    }
}
