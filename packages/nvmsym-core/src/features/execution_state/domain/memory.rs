//! Memory objects and their per-state contents

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::expr::{ArrayRef, Expr, ExprRef, BYTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryObjectId(pub u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl MemoryObjectId {
    /// Process-wide unique id
    pub fn fresh() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MemoryObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MO{}", self.0)
    }
}

/// A contiguous allocation; identity is shared by every state that sees it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryObject {
    pub id: MemoryObjectId,
    pub address: u64,
    pub size: u64,
    pub name: String,
    /// Registered at a fixed host address (e.g. a real `mmap` page)
    pub is_fixed: bool,
}

pub type MemoryObjectRef = Arc<MemoryObject>;

impl MemoryObject {
    pub fn new(id: MemoryObjectId, address: u64, size: u64, name: impl Into<String>) -> MemoryObjectRef {
        Arc::new(Self {
            id,
            address,
            size,
            name: name.into(),
            is_fixed: false,
        })
    }

    pub fn fixed(id: MemoryObjectId, address: u64, size: u64) -> MemoryObjectRef {
        Arc::new(Self {
            id,
            address,
            size,
            name: format!("fixed@{:#x}", address),
            is_fixed: true,
        })
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address - self.address < self.size
    }

    pub fn offset_of(&self, address: u64) -> Option<u64> {
        self.contains(address).then(|| address - self.address)
    }
}

/// Byte contents of one object in one state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectState {
    bytes: Vec<ExprRef>,
    read_only: bool,
}

impl ObjectState {
    /// Zero-filled contents
    pub fn new(object: &MemoryObject) -> Self {
        let zero = Expr::constant(0, BYTE);
        Self {
            bytes: vec![zero; object.size as usize],
            read_only: false,
        }
    }

    /// Contents backed byte-for-byte by a symbolic array
    pub fn symbolic(object: &MemoryObject, array: &ArrayRef) -> Self {
        Self {
            bytes: (0..object.size as u32).map(|i| Expr::read(array, i)).collect(),
            read_only: false,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_read_only(&mut self, v: bool) {
        self.read_only = v;
    }

    pub fn read8(&self, offset: u64) -> Option<ExprRef> {
        self.bytes.get(offset as usize).cloned()
    }

    /// Returns false when out of bounds or read-only
    pub fn write8(&mut self, offset: u64, value: ExprRef) -> bool {
        if self.read_only {
            return false;
        }
        match self.bytes.get_mut(offset as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn bytes(&self) -> &[ExprRef] {
        &self.bytes
    }
}
