//! # Loop Analysis
//!
//! Natural-loop detection by strongly connected components: Tarjan's
//! algorithm over the CFG, restricted to a shrinking live set. Every SCC of
//! two or more blocks, or a single block with a self-edge, is a loop; its
//! header is the member entered from outside. Removing the header and
//! re-running inside the SCC uncovers the nested loops, giving a forest per
//! function.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{BlockId, FunctionId, Module};

/// One discovered loop.
#[derive(Debug)]
pub struct LoopInfo {
    pub header: BlockId,
    /// All member blocks, header included, in id order
    pub blocks: Vec<BlockId>,
    /// Index of the enclosing loop in the forest
    pub parent: Option<usize>,
    /// 1 for outermost loops
    pub depth: usize,
}

/// The nesting forest of one function's loops, outermost first within each
/// nest.
#[derive(Debug)]
pub struct LoopForest {
    loops: Vec<LoopInfo>,
    innermost: FxHashMap<BlockId, usize>,
}

impl LoopForest {
    pub fn compute(module: &Module, func: FunctionId) -> Self {
        let mut forest = Self {
            loops: Vec::new(),
            innermost: FxHashMap::default(),
        };
        let live: FxHashSet<BlockId> = module.func(func).blocks().iter().copied().collect();
        let mut known_headers = FxHashSet::default();
        forest.discover(module, &live, None, &mut known_headers);
        forest
    }

    pub fn loops(&self) -> &[LoopInfo] {
        &self.loops
    }

    /// The innermost loop containing a block.
    pub fn loop_of(&self, block: BlockId) -> Option<&LoopInfo> {
        self.innermost.get(&block).map(|&i| &self.loops[i])
    }

    /// Nesting depth of a block; 0 outside any loop.
    pub fn depth_of(&self, block: BlockId) -> usize {
        self.loop_of(block).map_or(0, |l| l.depth)
    }

    fn discover(
        &mut self,
        module: &Module,
        live: &FxHashSet<BlockId>,
        parent: Option<usize>,
        known_headers: &mut FxHashSet<BlockId>,
    ) {
        for scc in tarjan_sccs(module, live) {
            let single_self_loop =
                scc.len() == 1 && module.block(scc[0]).succs().contains(&scc[0]);
            if scc.len() == 1 && !single_self_loop {
                continue;
            }
            let members: FxHashSet<BlockId> = scc.iter().copied().collect();
            let mut candidates: Vec<BlockId> = scc
                .iter()
                .copied()
                .filter(|&b| {
                    module
                        .block(b)
                        .preds()
                        .iter()
                        .any(|p| !members.contains(p))
                })
                .collect();
            candidates.sort_unstable();
            // Keep headers stable across nesting rounds: once a block has
            // been a header, it stays the preferred choice
            let header = candidates
                .iter()
                .copied()
                .find(|b| known_headers.contains(b))
                .or_else(|| candidates.first().copied())
                .unwrap_or_else(|| panic!("loop with no entering edge in the flow graph"));
            known_headers.insert(header);

            let mut blocks = scc.clone();
            blocks.sort_unstable();
            let depth = parent.map_or(1, |p| self.loops[p].depth + 1);
            let index = self.loops.len();
            self.loops.push(LoopInfo {
                header,
                blocks,
                parent,
                depth,
            });
            for &member in &scc {
                self.innermost.insert(member, index);
            }

            let inner: FxHashSet<BlockId> =
                members.iter().copied().filter(|&b| b != header).collect();
            if !inner.is_empty() {
                self.discover(module, &inner, Some(index), known_headers);
            }
        }
    }
}

/// Tarjan's algorithm over the subgraph induced by `live`. Roots are taken
/// in id order so the component order is deterministic.
fn tarjan_sccs(module: &Module, live: &FxHashSet<BlockId>) -> Vec<Vec<BlockId>> {
    struct State<'a> {
        module: &'a Module,
        live: &'a FxHashSet<BlockId>,
        index: FxHashMap<BlockId, usize>,
        lowlink: FxHashMap<BlockId, usize>,
        stack: Vec<BlockId>,
        on_stack: FxHashSet<BlockId>,
        next: usize,
        sccs: Vec<Vec<BlockId>>,
    }

    fn strongconnect(st: &mut State<'_>, v: BlockId) {
        st.index.insert(v, st.next);
        st.lowlink.insert(v, st.next);
        st.next += 1;
        st.stack.push(v);
        st.on_stack.insert(v);

        for &w in st.module.block(v).succs() {
            if !st.live.contains(&w) {
                continue;
            }
            if !st.index.contains_key(&w) {
                strongconnect(st, w);
                let low = st.lowlink[&w].min(st.lowlink[&v]);
                st.lowlink.insert(v, low);
            } else if st.on_stack.contains(&w) {
                let low = st.index[&w].min(st.lowlink[&v]);
                st.lowlink.insert(v, low);
            }
        }

        if st.lowlink[&v] == st.index[&v] {
            let mut scc = Vec::new();
            loop {
                let w = st
                    .stack
                    .pop()
                    .unwrap_or_else(|| panic!("component stack underflow"));
                st.on_stack.remove(&w);
                scc.push(w);
                if w == v {
                    break;
                }
            }
            st.sccs.push(scc);
        }
    }

    let mut state = State {
        module,
        live,
        index: FxHashMap::default(),
        lowlink: FxHashMap::default(),
        stack: Vec::new(),
        on_stack: FxHashSet::default(),
        next: 0,
        sccs: Vec::new(),
    };
    let mut roots: Vec<BlockId> = live.iter().copied().collect();
    roots.sort_unstable();
    for root in roots {
        if !state.index.contains_key(&root) {
            strongconnect(&mut state, root);
        }
    }
    state.sccs
}
