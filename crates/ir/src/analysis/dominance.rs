//! # Dominance Analysis
//!
//! Dominator tree and dominance frontiers via the Cooper-Harvey-Kennedy
//! iterative algorithm: reverse-postorder numbering, then fixpoint
//! refinement of immediate dominators with the two-finger intersect.
//!
//! [`PostDominance`] runs the identical algorithm on the transposed graph,
//! rooted at a virtual exit fed by every return block, giving
//! post-dominators and the reverse dominance frontier used as a
//! control-dependence proxy. The virtual exit never shows up in the
//! results: a return block reports itself as its own chain end, and so does
//! a block whose paths reunite only beyond the returns.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::instruction::InstKind;
use crate::{BlockId, FunctionId, Module};

/// Forward dominance for one function, rooted at its entry block.
///
/// The entry block is its own immediate dominator; blocks unreachable from
/// the root have no entry in the tree.
#[derive(Debug)]
pub struct Dominance {
    core: DomCore,
}

impl Dominance {
    pub fn compute(module: &Module, func: FunctionId) -> Self {
        let entry = module.func(func).entry();
        let succs = |block: BlockId| module.block(block).succs().to_vec();
        let preds = |block: BlockId| module.block(block).preds().to_vec();
        Self {
            core: DomCore::compute(&[entry], &succs, &preds),
        }
    }

    /// The immediate dominator; the entry maps to itself, unreachable
    /// blocks to nothing.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.core.idom(block)
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.core.idom(block).is_some()
    }

    /// Reflexive dominance over reachable blocks.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.core.dominates(a, b)
    }

    pub fn strictly_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a != b && self.core.dominates(a, b)
    }

    pub fn frontier(&self, block: BlockId) -> &FxHashSet<BlockId> {
        self.core.frontier(block)
    }

    /// Reachable blocks in reverse postorder from the entry.
    pub fn rpo(&self) -> &[BlockId] {
        &self.core.rpo
    }
}

/// Post-dominance for one function, rooted at a virtual exit that joins
/// every return block.
#[derive(Debug)]
pub struct PostDominance {
    core: DomCore,
    exits: Vec<BlockId>,
}

impl PostDominance {
    /// # Panics
    /// Panics when no block of the function ends in a return; the verifier
    /// rejects such functions before any pass asks for post-dominance.
    pub fn compute(module: &Module, func: FunctionId) -> Self {
        let exits: Vec<BlockId> = module
            .func(func)
            .blocks()
            .iter()
            .copied()
            .filter(|&b| {
                module
                    .terminator(b)
                    .is_some_and(|t| matches!(module.inst(t).kind, InstKind::Ret))
            })
            .collect();
        assert!(
            !exits.is_empty(),
            "post-dominance requires a return block in '{}'",
            module.func(func).name
        );
        // Transposed graph: walk edges backwards from the returns
        let succs = |block: BlockId| module.block(block).preds().to_vec();
        let preds = |block: BlockId| module.block(block).succs().to_vec();
        Self {
            core: DomCore::compute(&exits, &succs, &preds),
            exits,
        }
    }

    /// Every block ending in a return, in function block order.
    pub fn exits(&self) -> &[BlockId] {
        &self.exits
    }

    /// The immediate post-dominator. A return block maps to itself, as does
    /// a block whose paths only rejoin beyond distinct returns; blocks that
    /// cannot reach a return have none.
    pub fn ipdom(&self, block: BlockId) -> Option<BlockId> {
        self.core.idom(block)
    }

    pub fn post_dominates(&self, a: BlockId, b: BlockId) -> bool {
        self.core.dominates(a, b)
    }

    /// The reverse dominance frontier: the blocks whose branch decides
    /// whether `block` executes.
    pub fn reverse_frontier(&self, block: BlockId) -> &FxHashSet<BlockId> {
        self.core.frontier(block)
    }
}

/// The direction-independent computation, parameterized over the edge
/// functions of the (possibly transposed) graph.
///
/// Internally every root points at a shared virtual super-root, stored as
/// `None`; [`DomCore::idom`] folds that back into the block itself, so
/// callers never see the virtual node.
#[derive(Debug)]
struct DomCore {
    idom: FxHashMap<BlockId, Option<BlockId>>,
    frontiers: FxHashMap<BlockId, FxHashSet<BlockId>>,
    rpo: Vec<BlockId>,
    empty: FxHashSet<BlockId>,
}

impl DomCore {
    fn compute(
        roots: &[BlockId],
        succs: &dyn Fn(BlockId) -> Vec<BlockId>,
        preds: &dyn Fn(BlockId) -> Vec<BlockId>,
    ) -> Self {
        let rpo = reverse_postorder(roots, succs);
        let mut rpo_number = FxHashMap::default();
        for (i, &block) in rpo.iter().enumerate() {
            rpo_number.insert(block, i);
        }

        let root_set: FxHashSet<BlockId> = roots.iter().copied().collect();
        let mut idom: FxHashMap<BlockId, Option<BlockId>> = FxHashMap::default();
        for &root in roots {
            idom.insert(root, None);
        }

        let mut changed = true;
        while changed {
            changed = false;
            for &block in &rpo {
                if root_set.contains(&block) {
                    continue;
                }
                let block_preds = preds(block);
                let mut new_idom = None;
                for &pred in &block_preds {
                    if idom.contains_key(&pred) {
                        new_idom = Some(pred);
                        break;
                    }
                }
                let Some(first) = new_idom else {
                    continue;
                };
                let mut current = Some(first);
                for &pred in &block_preds {
                    if pred != first && idom.contains_key(&pred) {
                        current = intersect(Some(pred), current, &idom, &rpo_number);
                    }
                }
                if idom.get(&block) != Some(&current) {
                    idom.insert(block, current);
                    changed = true;
                }
            }
        }

        let frontiers = compute_frontiers(&rpo, &idom, preds);
        Self {
            idom,
            frontiers,
            rpo,
            empty: FxHashSet::default(),
        }
    }

    fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(&block).map(|&up| up.unwrap_or(block))
    }

    fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut runner = b;
        loop {
            if runner == a {
                return true;
            }
            match self.idom.get(&runner) {
                Some(&Some(up)) => runner = up,
                // Hit the virtual root or an unreachable block
                _ => return false,
            }
        }
    }

    fn frontier(&self, block: BlockId) -> &FxHashSet<BlockId> {
        self.frontiers.get(&block).unwrap_or(&self.empty)
    }
}

/// Cooper's two-finger walk to the nearest common dominator; `None` is the
/// virtual super-root above every real block.
fn intersect(
    mut b1: Option<BlockId>,
    mut b2: Option<BlockId>,
    idom: &FxHashMap<BlockId, Option<BlockId>>,
    rpo_number: &FxHashMap<BlockId, usize>,
) -> Option<BlockId> {
    while b1 != b2 {
        match (b1, b2) {
            (Some(a), Some(b)) => {
                if rpo_number[&a] > rpo_number[&b] {
                    b1 = idom[&a];
                } else {
                    b2 = idom[&b];
                }
            }
            (Some(a), None) => b1 = idom[&a],
            (None, Some(b)) => b2 = idom[&b],
            (None, None) => break,
        }
    }
    b1
}

fn reverse_postorder(roots: &[BlockId], succs: &dyn Fn(BlockId) -> Vec<BlockId>) -> Vec<BlockId> {
    let mut visited = FxHashSet::default();
    let mut postorder = Vec::new();

    fn dfs(
        block: BlockId,
        succs: &dyn Fn(BlockId) -> Vec<BlockId>,
        visited: &mut FxHashSet<BlockId>,
        postorder: &mut Vec<BlockId>,
    ) {
        if !visited.insert(block) {
            return;
        }
        for succ in succs(block) {
            dfs(succ, succs, visited, postorder);
        }
        postorder.push(block);
    }

    for &root in roots {
        dfs(root, succs, &mut visited, &mut postorder);
    }
    postorder.reverse();
    postorder
}

/// For each join block, walk every predecessor's dominator chain up to the
/// join's immediate dominator; the join is in the frontier of every node
/// visited on the way. A walk that reaches the virtual super-root stops
/// after tagging the real root it passed through.
fn compute_frontiers(
    rpo: &[BlockId],
    idom: &FxHashMap<BlockId, Option<BlockId>>,
    preds: &dyn Fn(BlockId) -> Vec<BlockId>,
) -> FxHashMap<BlockId, FxHashSet<BlockId>> {
    let mut frontiers: FxHashMap<BlockId, FxHashSet<BlockId>> = FxHashMap::default();
    for &block in rpo {
        frontiers.entry(block).or_default();
    }
    for &block in rpo {
        let block_preds = preds(block);
        if block_preds.len() < 2 {
            continue;
        }
        let Some(&block_idom) = idom.get(&block) else {
            continue;
        };
        for &pred in &block_preds {
            if !idom.contains_key(&pred) {
                continue;
            }
            let mut runner = Some(pred);
            while let Some(r) = runner {
                if runner == block_idom {
                    break;
                }
                frontiers.entry(r).or_default().insert(block);
                runner = idom[&r];
            }
        }
    }
    frontiers
}
