//! Execution state: branching, forking, merging and threads

mod common;

use common::*;
use nvmsym_core::config::HeuristicKind;
use nvmsym_core::features::execution_state::domain::expr::BYTE;
use nvmsym_core::features::execution_state::{
    Array, Expr, MemoryObject, MemoryObjectId, ObjectState, PTree, ThreadUid,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;

#[test]
fn test_branch_copies_symbolics_independently() {
    let module = threaded_module();
    let (mut a, _) = state_for(&module, HeuristicKind::Dynamic);
    let m0 = MemoryObject::new(MemoryObjectId::fresh(), 0x1000, 4, "m0");
    let a0 = Array::new("a0", 4);
    a.add_symbolic(Arc::clone(&m0), Arc::clone(&a0)).unwrap();
    a.depth = 3;

    let mut b = a.branch();
    let m1 = MemoryObject::new(MemoryObjectId::fresh(), 0x2000, 4, "m1");
    let a1 = Array::new("a1", 4);
    b.add_symbolic(Arc::clone(&m1), Arc::clone(&a1)).unwrap();

    assert_eq!(a.symbolics().to_vec(), vec![(m0.clone(), a0.clone())]);
    assert_eq!(b.symbolics().to_vec(), vec![(m0, a0), (m1, a1)]);
    assert_eq!(b.depth, 4);
    assert_ne!(a.id(), b.id());
    assert_eq!(b.current_priority(), a.current_priority());
}

#[test]
fn test_fork_records_both_children_in_ptree() {
    let module = threaded_module();
    let (mut a, _) = state_for(&module, HeuristicKind::Static);
    let mut tree = PTree::new(a.id());
    a.ptree_node = Some(tree.root());

    let b = a.fork_into(&mut tree);
    let leaves: Vec<_> = tree.leaves().into_iter().map(|(_, s)| s).collect();
    assert_eq!(leaves, vec![a.id(), b.id()]);
    assert_ne!(a.ptree_node, b.ptree_node);

    if let Some(node) = b.ptree_node {
        tree.remove(node);
    }
    assert_eq!(tree.leaves().len(), 1);
}

#[test]
fn test_branches_merge_back_into_one_path() {
    let module = threaded_module();
    let (mut a, _) = state_for(&module, HeuristicKind::Dynamic);
    let input = Array::new("in", 1);
    let mo = MemoryObject::new(MemoryObjectId::fresh(), 0x3000, 1, "buf");
    a.bind_local(Arc::clone(&mo), ObjectState::new(&mo));

    let cond = Expr::eq(Expr::constant(1, BYTE), Expr::read(&input, 0));
    let mut b = a.branch();
    a.add_constraint(Arc::clone(&cond));
    b.add_constraint(Expr::not(cond));
    a.address_space.write8(0x3000, Expr::constant(7, BYTE));
    b.address_space.write8(0x3000, Expr::constant(9, BYTE));

    assert!(a.merge(&b));
    let byte = a.address_space.read8(0x3000).unwrap();
    assert!(matches!(&*byte, Expr::Select { .. }));
    assert!(a.constraints.is_empty());
}

#[test]
fn test_sleeping_thread_is_woken_by_notify() {
    let module = threaded_module();
    let (mut s, _) = state_for(&module, HeuristicKind::None);
    let worker = module.function_by_name("worker").unwrap();
    s.create_thread(1, worker).unwrap();
    let wl = s.get_waiting_list();

    s.sleep_thread(wl);
    let t1 = ThreadUid::new(1, 1);
    assert_eq!(s.current_thread_id(), t1);
    assert!(!s.threads[&ThreadUid::MAIN].enabled);

    assert!(s.notify_one(wl, ThreadUid::MAIN));
    assert!(s.threads[&ThreadUid::MAIN].enabled);
    assert_eq!(s.notify_all(wl), 0);
}

#[test]
fn test_stack_string_lists_innermost_first() {
    let fx = nvm_store_module();
    let (mut s, _) = state_for(&fx.module, HeuristicKind::Dynamic);
    s.step_instruction(fx.call_g);
    s.step_instruction(fx.store);
    s.push_frame(fx.call_g, fx.g);
    assert_eq!(s.current_priority(), 1);

    let stack = s.stack_string();
    let lines: Vec<&str> = stack.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("#0") && lines[0].contains("in g"));
    assert!(lines[1].starts_with("#1") && lines[1].contains("in main at main.c:11"));
    assert_eq!(s.covered_lines["main.c"].len(), 2);
}

proptest! {
    #[test]
    fn prop_branch_is_isolated(
        parent_inputs in 0usize..4,
        child_inputs in 0usize..6,
        bounds in proptest::collection::vec(1u64..200, 0..6),
    ) {
        let module = threaded_module();
        let (mut a, _) = state_for(&module, HeuristicKind::None);
        for i in 0..parent_inputs {
            let mo = MemoryObject::new(MemoryObjectId::fresh(), 0x1000 * (i as u64 + 1), 1, "p");
            a.add_symbolic(mo, Array::new(format!("p{}", i), 1)).unwrap();
        }
        let symbolics_before = a.symbolics().to_vec();
        let constraints_before = a.constraints.clone();
        let depth_before = a.depth;

        let mut b = a.branch();
        for i in 0..child_inputs {
            let mo = MemoryObject::new(MemoryObjectId::fresh(), 0x10_0000 + i as u64, 1, "c");
            b.add_symbolic(mo, Array::new(format!("c{}", i), 1)).unwrap();
        }
        for (i, bound) in bounds.iter().enumerate() {
            let x = Array::new(format!("x{}", i), 1);
            b.add_constraint(Expr::ult(Expr::read(&x, 0), Expr::constant(*bound, BYTE)));
        }

        prop_assert_eq!(a.symbolics().to_vec(), symbolics_before.clone());
        prop_assert!(a.constraints == constraints_before);
        prop_assert_eq!(a.depth, depth_before + 1);
        prop_assert_eq!(b.depth, depth_before + 1);
        prop_assert_eq!(b.symbolics().len(), symbolics_before.len() + child_inputs);
        prop_assert_eq!(b.constraints.len(), bounds.len());
    }
}
