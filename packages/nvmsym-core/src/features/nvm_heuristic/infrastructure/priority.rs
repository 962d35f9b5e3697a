//! Instruction priorities
//!
//! `priority(i) = weight(i) + max over successors s of priority(s)`.
//! Loops are condensed first: every member of a strongly connected component
//! gets the summed weight of the component plus the best priority reachable
//! outside it, which is the least fixpoint that stays finite on cycles.

use rustc_hash::FxHashMap;

use crate::shared::models::{FunctionId, InstId, KModule};
use crate::shared::utils::tarjan_scc;

pub fn compute_priorities(
    module: &KModule,
    function: FunctionId,
    weights: &FxHashMap<InstId, u64>,
) -> FxHashMap<InstId, u64> {
    let insts: Vec<InstId> = module.instructions_of(function).map(|i| i.id).collect();
    let successors: FxHashMap<InstId, Vec<InstId>> = insts
        .iter()
        .map(|i| (*i, module.successors(*i)))
        .collect();
    let edges: Vec<(InstId, InstId)> = successors
        .iter()
        .flat_map(|(i, succs)| succs.iter().map(move |s| (*i, *s)))
        .collect();

    let scc = tarjan_scc(insts.iter().copied(), &edges);

    let mut component_priority = vec![0u64; scc.components.len()];
    for (idx, component) in scc.components.iter().enumerate() {
        let own = component
            .iter()
            .map(|i| weights.get(i).copied().unwrap_or(0))
            .fold(0u64, u64::saturating_add);
        let best_successor = component
            .iter()
            .flat_map(|i| successors.get(i).into_iter().flatten())
            .filter_map(|s| {
                let c = scc.component_of[s];
                (c != idx).then(|| component_priority[c])
            })
            .max()
            .unwrap_or(0);
        component_priority[idx] = own.saturating_add(best_successor);
    }

    insts
        .into_iter()
        .map(|i| (i, component_priority[scc.component_of[&i]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::ModuleBuilder;

    #[test]
    fn test_straight_line_accumulates() {
        let mut mb = ModuleBuilder::new("m");
        let f = mb.declare_function("f", &[]);
        let (a, b, r);
        {
            let mut fb = mb.define(f);
            a = fb.alloca("a");
            b = fb.alloca("b");
            r = fb.ret(None);
        }
        let module = mb.build().unwrap();
        let weights: FxHashMap<InstId, u64> = [(a, 2), (b, 3)].into_iter().collect();
        let prios = compute_priorities(&module, f, &weights);

        assert_eq!(prios[&a], 5);
        assert_eq!(prios[&b], 3);
        assert_eq!(prios[&r], 0);
    }

    #[test]
    fn test_loop_members_share_priority() {
        let mut mb = ModuleBuilder::new("m");
        let f = mb.declare_function("f", &[]);
        let c = mb.constant("c");
        let (body_inst, exit_inst, back);
        {
            let mut fb = mb.define(f);
            fb.block("entry");
            let body = fb.add_block("body");
            let exit = fb.add_block("exit");
            fb.br(body);
            fb.position_at_end(body);
            body_inst = fb.alloca("x");
            back = fb.cond_br(c, body, exit);
            fb.position_at_end(exit);
            exit_inst = fb.alloca("y");
            fb.ret(None);
        }
        let module = mb.build().unwrap();
        let weights: FxHashMap<InstId, u64> = [(body_inst, 1), (exit_inst, 4)].into_iter().collect();
        let prios = compute_priorities(&module, f, &weights);

        assert_eq!(prios[&body_inst], 5);
        assert_eq!(prios[&back], 5);
        assert_eq!(prios[&exit_inst], 4);
        let entry = module.first_instruction(f).unwrap();
        assert_eq!(prios[&entry], 5);
    }
}
