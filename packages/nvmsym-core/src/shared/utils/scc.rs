//! Strongly Connected Component Detection
//!
//! Tarjan's algorithm, used in three places:
//! - copy-edge cycle collapse in the Andersen solver
//! - loop condensation when computing instruction priorities
//! - callee-first ordering of the call graph for the static heuristic
//!
//! Components are emitted in reverse topological order of the condensation:
//! every component appears after all components it has edges into.
//!
//! # References
//! - Tarjan, R. "Depth-First Search and Linear Graph Algorithms" (1972)

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::min;
use std::hash::Hash;

/// Result of SCC detection
#[derive(Debug, Clone)]
pub struct SccResult<T> {
    /// All components, sinks first
    pub components: Vec<Vec<T>>,

    /// Node to index into `components`
    pub component_of: FxHashMap<T, usize>,

    /// Node to component representative (minimum member)
    pub node_to_rep: FxHashMap<T, T>,

    /// Nodes on a cycle (component of size > 1, or a self-loop)
    pub cyclic: FxHashSet<T>,

    pub stats: SccStats,
}

#[derive(Debug, Clone, Default)]
pub struct SccStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub scc_count: usize,
    pub largest_scc: usize,
    pub collapsed_nodes: usize,
}

impl<T: Copy + Eq + Hash> SccResult<T> {
    pub fn rep(&self, node: T) -> T {
        self.node_to_rep.get(&node).copied().unwrap_or(node)
    }

    pub fn same_component(&self, a: T, b: T) -> bool {
        match (self.component_of.get(&a), self.component_of.get(&b)) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        }
    }
}

/// Tarjan's SCC algorithm, iterative so deep CFGs cannot overflow the stack
///
/// `nodes` fixes the DFS root order; nodes only mentioned by edges are
/// visited afterwards in edge order.
///
/// Time: O(V + E)
/// Space: O(V)
pub fn tarjan_scc<T>(nodes: impl IntoIterator<Item = T>, edges: &[(T, T)]) -> SccResult<T>
where
    T: Copy + Eq + Hash + Ord,
{
    let mut adj: FxHashMap<T, Vec<T>> = FxHashMap::default();
    let mut order: Vec<T> = Vec::new();
    let mut seen: FxHashSet<T> = FxHashSet::default();

    for n in nodes {
        if seen.insert(n) {
            order.push(n);
        }
    }
    for &(src, dst) in edges {
        adj.entry(src).or_default().push(dst);
        for n in [src, dst] {
            if seen.insert(n) {
                order.push(n);
            }
        }
    }

    let mut state = TarjanState::default();
    for &root in &order {
        if !state.index.contains_key(&root) {
            tarjan_visit(root, &adj, &mut state);
        }
    }

    let self_loops: FxHashSet<T> = edges
        .iter()
        .filter(|(src, dst)| src == dst)
        .map(|(src, _)| *src)
        .collect();

    let mut component_of = FxHashMap::default();
    let mut node_to_rep = FxHashMap::default();
    let mut cyclic = FxHashSet::default();
    let mut collapsed = 0;
    let mut cycles = 0;

    for (idx, scc) in state.sccs.iter().enumerate() {
        let Some(&rep) = scc.iter().min() else {
            continue;
        };
        let is_cycle = scc.len() > 1 || self_loops.contains(&rep);
        if is_cycle {
            cycles += 1;
            collapsed += scc.len() - 1;
        }
        for &member in scc {
            component_of.insert(member, idx);
            node_to_rep.insert(member, rep);
            if is_cycle {
                cyclic.insert(member);
            }
        }
    }

    let largest = state.sccs.iter().map(Vec::len).max().unwrap_or(0);

    SccResult {
        stats: SccStats {
            total_nodes: order.len(),
            total_edges: edges.len(),
            scc_count: cycles,
            largest_scc: largest,
            collapsed_nodes: collapsed,
        },
        components: state.sccs,
        component_of,
        node_to_rep,
        cyclic,
    }
}

struct TarjanState<T> {
    index: FxHashMap<T, usize>,
    lowlink: FxHashMap<T, usize>,
    on_stack: FxHashSet<T>,
    stack: Vec<T>,
    current_index: usize,
    sccs: Vec<Vec<T>>,
}

impl<T> Default for TarjanState<T> {
    fn default() -> Self {
        Self {
            index: FxHashMap::default(),
            lowlink: FxHashMap::default(),
            on_stack: FxHashSet::default(),
            stack: Vec::new(),
            current_index: 0,
            sccs: Vec::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> TarjanState<T> {
    fn open(&mut self, v: T) {
        self.index.insert(v, self.current_index);
        self.lowlink.insert(v, self.current_index);
        self.current_index += 1;
        self.stack.push(v);
        self.on_stack.insert(v);
    }

    fn lower(&mut self, v: T, candidate: usize) {
        let low = min(self.lowlink[&v], candidate);
        self.lowlink.insert(v, low);
    }
}

fn tarjan_visit<T: Copy + Eq + Hash>(root: T, adj: &FxHashMap<T, Vec<T>>, state: &mut TarjanState<T>) {
    // (node, index of next successor to look at)
    let mut frames: Vec<(T, usize)> = vec![(root, 0)];
    state.open(root);

    while let Some(&(v, next)) = frames.last() {
        let succs = adj.get(&v).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(&w) = succs.get(next) {
            if let Some(top) = frames.last_mut() {
                top.1 += 1;
            }
            if !state.index.contains_key(&w) {
                state.open(w);
                frames.push((w, 0));
            } else if state.on_stack.contains(&w) {
                let w_index = state.index[&w];
                state.lower(v, w_index);
            }
            continue;
        }

        frames.pop();
        if let Some(&(parent, _)) = frames.last() {
            let v_low = state.lowlink[&v];
            state.lower(parent, v_low);
        }

        if state.lowlink[&v] == state.index[&v] {
            let mut scc = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack.remove(&w);
                scc.push(w);
                if w == v {
                    break;
                }
            }
            state.sccs.push(scc);
        }
    }
}
