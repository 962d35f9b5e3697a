//! Root-cause deduplication, masking and reporting

mod common;

use common::*;
use nvmsym_core::config::HeuristicKind;
use nvmsym_core::features::root_cause::{RootCauseLocation, RootCauseManager, RootCauseReason};
use nvmsym_core::shared::models::{FunctionId, ValueId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[test]
fn test_same_location_dedups_and_records_masking() {
    let fx = nvm_store_module();
    let (mut s, mgr) = state_for(&fx.module, HeuristicKind::Dynamic);
    s.step_instruction(fx.call_g);
    s.step_instruction(fx.store);
    s.push_frame(fx.call_g, fx.g);

    let mut mgr = mgr.lock();
    let id1 = mgr.get_id(&s, fx.alloc, fx.store, RootCauseReason::Unpersisted);
    let id2 = mgr.get_id_with_masked(
        &s,
        fx.alloc,
        fx.store,
        RootCauseReason::Unpersisted,
        &BTreeSet::from([id1]),
    );

    assert_eq!(id1, id2);
    assert_eq!(mgr.occurrences(id1), Some(2));
    assert!(mgr.get(id1).unwrap().masked_set().contains(&id1));

    let text = mgr.get_root_cause_string(id1);
    assert!(text.contains("PM_Unpersisted"));
    assert!(text.contains("g.c:2"));
    assert!(text.contains("main.c:10"));
}

#[test]
fn test_different_stack_is_a_different_root_cause() {
    let fx = nvm_store_module();
    let (mut s, mgr) = state_for(&fx.module, HeuristicKind::Static);
    let mut mgr = mgr.lock();
    let outer = mgr.get_id(&s, fx.alloc, fx.store, RootCauseReason::Unpersisted);
    s.push_frame(fx.call_g, fx.g);
    let inner = mgr.get_id(&s, fx.alloc, fx.store, RootCauseReason::Unpersisted);
    let flush = mgr.get_id(&s, fx.alloc, fx.store, RootCauseReason::UnnecessaryFlush);

    assert_eq!((outer, inner, flush), (1, 2, 3));
    assert_eq!(mgr.total_occurrences(), 3);
}

#[test]
fn test_summary_reports_bugs_in_id_order() {
    let mut mgr = RootCauseManager::new();
    let loc = |inst: u32, reason| RootCauseLocation::new(ValueId(1), ValueId(inst), vec![(None, FunctionId(0))], reason);
    let a = mgr.get_id_for(loc(10, RootCauseReason::Unpersisted));
    let b = mgr.get_id_for(loc(11, RootCauseReason::FlushOnUnmodified));
    mgr.get_id_for(loc(11, RootCauseReason::FlushOnUnmodified));
    mgr.add_masked(b, [a]);
    mgr.mark_as_bug(b);
    mgr.mark_as_bug(a);

    let summary = mgr.get_summary();
    let headers: Vec<&str> = summary.lines().filter(|l| l.starts_with("[Bug #")).collect();
    assert_eq!(headers, vec!["[Bug #1] 1 occurrence(s)", "[Bug #2] 2 occurrence(s)"]);
    assert!(summary.contains("masked root causes: #1"));

    let json = mgr.summary_json();
    assert_eq!(json["total_occurrences"], 3);
    assert_eq!(json["bugs"][1]["reason"], "PM_FlushOnUnmodified");
    assert_eq!(json["bugs"][1]["masked"][0], 1);
}

proptest! {
    #[test]
    fn prop_ids_are_stable_and_monotonic(insts in proptest::collection::vec(0u32..8, 1..40)) {
        let mut mgr = RootCauseManager::new();
        let mut first_seen: Vec<(u32, u64)> = Vec::new();
        let mut max_id = 0;
        for inst in &insts {
            let id = mgr.get_id_for(RootCauseLocation::new(
                ValueId(0),
                ValueId(*inst),
                Vec::new(),
                RootCauseReason::Unpersisted,
            ));
            match first_seen.iter().find(|(i, _)| i == inst).map(|(_, known)| *known) {
                Some(known) => prop_assert_eq!(id, known),
                None => {
                    prop_assert_eq!(id, max_id + 1);
                    max_id = id;
                    first_seen.push((*inst, id));
                }
            }
        }
        prop_assert_eq!(mgr.len(), first_seen.len());
        prop_assert_eq!(mgr.total_occurrences(), insts.len() as u64);
        let counted: u64 = (1..=max_id).filter_map(|id| mgr.occurrences(id)).sum();
        prop_assert_eq!(counted, insts.len() as u64);
    }
}
