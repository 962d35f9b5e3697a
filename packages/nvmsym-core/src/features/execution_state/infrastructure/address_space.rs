//! Per-state address space
//!
//! Maps base addresses to memory objects and their contents. Contents are
//! shared between branched states and copied on first write.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::features::execution_state::domain::expr::{Expr, ExprRef};
use crate::features::execution_state::domain::memory::{
    MemoryObject, MemoryObjectId, MemoryObjectRef, ObjectState,
};

#[derive(Debug, Clone)]
struct Binding {
    object: MemoryObjectRef,
    state: Arc<ObjectState>,
}

#[derive(Debug, Clone, Default)]
pub struct AddressSpace {
    objects: BTreeMap<u64, Binding>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn bind_object(&mut self, object: MemoryObjectRef, state: ObjectState) {
        self.objects.insert(
            object.address,
            Binding {
                object,
                state: Arc::new(state),
            },
        );
    }

    pub fn unbind_object(&mut self, object: &MemoryObject) -> bool {
        match self.objects.get(&object.address) {
            Some(b) if b.object.id == object.id => {
                self.objects.remove(&object.address);
                true
            }
            _ => false,
        }
    }

    pub fn find_object(&self, id: MemoryObjectId) -> Option<(&MemoryObjectRef, &ObjectState)> {
        self.objects
            .values()
            .find(|b| b.object.id == id)
            .map(|b| (&b.object, b.state.as_ref()))
    }

    /// Object whose range contains `address`
    pub fn resolve_one(&self, address: u64) -> Option<(&MemoryObjectRef, &ObjectState)> {
        let (_, b) = self.objects.range(..=address).next_back()?;
        b.object
            .contains(address)
            .then(|| (&b.object, b.state.as_ref()))
    }

    /// Private copy of the contents of the object containing `address`
    pub fn get_writeable(&mut self, address: u64) -> Option<&mut ObjectState> {
        let (_, b) = self.objects.range_mut(..=address).next_back()?;
        if !b.object.contains(address) {
            return None;
        }
        Some(Arc::make_mut(&mut b.state))
    }

    pub fn read8(&self, address: u64) -> Option<ExprRef> {
        let (mo, os) = self.resolve_one(address)?;
        os.read8(address - mo.address)
    }

    pub fn write8(&mut self, address: u64, value: ExprRef) -> bool {
        let Some(base) = self.resolve_one(address).map(|(mo, _)| mo.address) else {
            return false;
        };
        match self.get_writeable(address) {
            Some(os) => os.write8(address - base, value),
            None => false,
        }
    }

    /// Register a host-backed object at a fixed address
    pub fn define_fixed_object(&mut self, address: u64, size: u64) -> MemoryObjectRef {
        let object = MemoryObject::fixed(MemoryObjectId::fresh(), address, size);
        let state = ObjectState::new(&object);
        self.bind_object(Arc::clone(&object), state);
        object
    }

    pub fn undefine_fixed_object(&mut self, address: u64) -> bool {
        match self.objects.get(&address) {
            Some(b) if b.object.is_fixed => {
                self.objects.remove(&address);
                true
            }
            _ => false,
        }
    }

    pub fn objects(&self) -> impl Iterator<Item = (&MemoryObjectRef, &ObjectState)> {
        self.objects.values().map(|b| (&b.object, b.state.as_ref()))
    }

    /// Both spaces bind exactly the same objects
    pub fn same_objects(&self, other: &AddressSpace) -> bool {
        self.objects.len() == other.objects.len()
            && self
                .objects
                .values()
                .zip(other.objects.values())
                .all(|(a, b)| a.object.id == b.object.id)
    }

    /// Fold `other` into `self`: every byte that differs becomes
    /// `select(in_self, mine, theirs)`
    ///
    /// Returns false, leaving `self` untouched, when the object sets differ.
    pub fn merge(&mut self, other: &AddressSpace, in_self: &ExprRef) -> bool {
        if !self.same_objects(other) {
            return false;
        }
        for (b, theirs) in self.objects.values_mut().zip(other.objects.values()) {
            if Arc::ptr_eq(&b.state, &theirs.state) || b.state == theirs.state {
                continue;
            }
            let mine = Arc::make_mut(&mut b.state);
            for (offset, their_byte) in theirs.state.bytes().iter().enumerate() {
                let Some(my_byte) = mine.read8(offset as u64) else {
                    continue;
                };
                if my_byte != *their_byte {
                    let merged = Expr::select(Arc::clone(in_self), my_byte, Arc::clone(their_byte));
                    mine.write8(offset as u64, merged);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::execution_state::domain::expr::{Array, BYTE};

    fn space_with(size: u64) -> (AddressSpace, MemoryObjectRef) {
        let mut space = AddressSpace::new();
        let mo = MemoryObject::new(MemoryObjectId::fresh(), 0x2000, size, "buf");
        space.bind_object(Arc::clone(&mo), ObjectState::new(&mo));
        (space, mo)
    }

    #[test]
    fn test_resolve_and_write() {
        let (mut space, mo) = space_with(8);
        assert_eq!(space.resolve_one(0x2007).map(|(m, _)| m.id), Some(mo.id));
        assert!(space.resolve_one(0x2008).is_none());
        assert!(space.resolve_one(0x1fff).is_none());
        assert!(space.write8(0x2003, Expr::constant(42, BYTE)));
        assert_eq!(space.read8(0x2003).and_then(|e| e.as_constant()), Some(42));
        assert!(!space.write8(0x3000, Expr::constant(1, BYTE)));
    }

    #[test]
    fn test_copy_on_write() {
        let (mut a, _) = space_with(4);
        let b = a.clone();
        a.write8(0x2000, Expr::constant(7, BYTE));
        assert_eq!(a.read8(0x2000).and_then(|e| e.as_constant()), Some(7));
        assert_eq!(b.read8(0x2000).and_then(|e| e.as_constant()), Some(0));
    }

    #[test]
    fn test_fixed_objects() {
        let mut space = AddressSpace::new();
        let mo = space.define_fixed_object(0x7000, 4096);
        assert!(mo.is_fixed);
        assert!(space.resolve_one(0x7fff).is_some());
        assert!(space.undefine_fixed_object(0x7000));
        assert!(!space.undefine_fixed_object(0x7000));
        assert!(space.is_empty());
    }

    #[test]
    fn test_merge_selects_differing_bytes() {
        let (mut a, _) = space_with(2);
        let mut b = a.clone();
        a.write8(0x2000, Expr::constant(1, BYTE));
        b.write8(0x2000, Expr::constant(2, BYTE));
        let cond = Expr::eq(Expr::constant(0, BYTE), Expr::read(&Array::new("c", 1), 0));
        assert!(a.merge(&b, &cond));
        let expected = Expr::select(cond, Expr::constant(1, BYTE), Expr::constant(2, BYTE));
        assert_eq!(a.read8(0x2000), Some(expected));
        assert_eq!(a.read8(0x2001).and_then(|e| e.as_constant()), Some(0));
    }

    #[test]
    fn test_merge_refuses_different_objects() {
        let (mut a, _) = space_with(2);
        let (b, _) = space_with(2);
        assert!(!a.merge(&b, &Expr::bool(true)));
    }
}
