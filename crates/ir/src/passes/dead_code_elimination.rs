//! # Dead Code Elimination
//!
//! Marks the instructions whose effects a caller can observe, then deletes
//! everything else. Liveness seeds are returns, every call (callees are
//! assumed to have effects), and every store except those writing straight
//! to the result of a stack allocation; a store through a computed address
//! stays, since the pointer may have escaped. The closure then pulls in
//! operand definitions, the incoming-edge terminators of live phis, the
//! branches live blocks are control-dependent on (via the reverse
//! dominance frontier), and the stores that feed a live load from the same
//! stack slot.
//!
//! A conditional branch left unmarked decides nothing observable: it is
//! rewritten as a jump to the nearest post-dominator still holding live
//! instructions, which removes empty diamonds and effect-free loops
//! outright. Unconditional jumps are structural and never deleted here;
//! blocks orphaned by the rewrites keep theirs until CFG simplification
//! drops the blocks themselves.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::PostDominance;
use crate::instruction::{InstData, InstKind};
use crate::passes::FunctionPass;
use crate::{BlockId, FunctionId, InstId, Module, Value};

#[derive(Debug, Default)]
pub struct DeadCodeElimination;

impl DeadCodeElimination {
    pub const fn new() -> Self {
        Self
    }
}

impl FunctionPass for DeadCodeElimination {
    fn run(&mut self, module: &mut Module, func: FunctionId) -> bool {
        let pdom = PostDominance::compute(module, func);
        let live = mark_live(module, func, &pdom);
        sweep(module, func, &pdom, &live)
    }

    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }
}

/// The base pointer a load address derives from.
fn address_root(module: &Module, mut address: Value) -> Value {
    while let Value::Inst(inst) = address {
        if module.inst(inst).kind != InstKind::GetElementPtr {
            break;
        }
        address = module.inst(inst).operands()[0];
    }
    address
}

/// The stack slot `value` names directly, if any.
fn local_slot(module: &Module, value: Value) -> Option<InstId> {
    match value {
        Value::Inst(inst) if module.inst(inst).kind == InstKind::Alloca => Some(inst),
        _ => None,
    }
}

fn mark_live(module: &Module, func: FunctionId, pdom: &PostDominance) -> FxHashSet<InstId> {
    let mut live = FxHashSet::default();
    let mut worklist: Vec<InstId> = Vec::new();
    let mark = |live: &mut FxHashSet<InstId>, worklist: &mut Vec<InstId>, inst: InstId| {
        if live.insert(inst) {
            worklist.push(inst);
        }
    };

    // Stores straight to a stack slot, grouped by slot for the load closure
    let mut slot_stores: FxHashMap<InstId, Vec<InstId>> = FxHashMap::default();

    for &block in module.func(func).blocks() {
        for &inst in module.block(block).insts() {
            match module.inst(inst).kind {
                InstKind::Ret | InstKind::Call => mark(&mut live, &mut worklist, inst),
                InstKind::Store => {
                    let (_, address) = module.inst(inst).store_parts();
                    match local_slot(module, address) {
                        Some(slot) => slot_stores.entry(slot).or_default().push(inst),
                        None => mark(&mut live, &mut worklist, inst),
                    }
                }
                _ => {}
            }
        }
        // Control flow into or inside a region that never reaches the exit
        // is outside the post-dominance tree; keep it untouched.
        let escapes = pdom.ipdom(block).is_none()
            || module
                .block(block)
                .succs()
                .iter()
                .any(|&s| pdom.ipdom(s).is_none());
        if escapes {
            if let Some(term) = module.terminator(block) {
                mark(&mut live, &mut worklist, term);
            }
        }
    }

    while let Some(inst) = worklist.pop() {
        for &operand in module.inst(inst).operands() {
            if let Value::Inst(def) = operand {
                mark(&mut live, &mut worklist, def);
            }
        }
        match module.inst(inst).kind {
            InstKind::Phi => {
                for (_, pred) in module.inst(inst).phi_incoming() {
                    let term = module
                        .terminator(pred)
                        .unwrap_or_else(|| panic!("phi predecessor {pred:?} unterminated"));
                    mark(&mut live, &mut worklist, term);
                }
            }
            InstKind::Load => {
                let root = address_root(module, module.inst(inst).load_address());
                if let Some(slot) = local_slot(module, root) {
                    if let Some(stores) = slot_stores.get(&slot) {
                        for &store in stores {
                            mark(&mut live, &mut worklist, store);
                        }
                    }
                }
            }
            _ => {}
        }
        if let Some(block) = module.inst(inst).parent() {
            for &decider in pdom.reverse_frontier(block) {
                let term = module
                    .terminator(decider)
                    .unwrap_or_else(|| panic!("frontier block {decider:?} unterminated"));
                mark(&mut live, &mut worklist, term);
            }
        }
    }
    live
}

fn sweep(
    module: &mut Module,
    func: FunctionId,
    pdom: &PostDominance,
    live: &FxHashSet<InstId>,
) -> bool {
    let mut changed = false;

    // Unmarked conditional branches jump past everything they used to guard
    let blocks: Vec<BlockId> = module.func(func).blocks().to_vec();
    for &block in &blocks {
        let Some(term) = module.terminator(block) else {
            continue;
        };
        if live.contains(&term) || !matches!(module.inst(term).kind, InstKind::Branch) {
            continue;
        }
        let target = nearest_live_post_dominator(module, pdom, live, block);
        module.remove_inst(term);
        let jump = module.create_inst(InstData::new(
            InstKind::Jump,
            module.types.void(),
            [Value::Block(target)],
        ));
        module.push_inst(block, jump);
        changed = true;
    }

    // Jumps are structural; dead ones fall with their block later
    let dead: Vec<InstId> = blocks
        .iter()
        .flat_map(|&b| module.block(b).insts().iter().copied())
        .filter(|&i| !live.contains(&i) && !matches!(module.inst(i).kind, InstKind::Jump))
        .collect();
    if !dead.is_empty() {
        module.remove_insts(&dead);
        changed = true;
    }
    changed
}

/// First block at or above `block`'s immediate post-dominator that holds a
/// live instruction. The exit's return is always live, so the walk ends.
fn nearest_live_post_dominator(
    module: &Module,
    pdom: &PostDominance,
    live: &FxHashSet<InstId>,
    block: BlockId,
) -> BlockId {
    let mut at = pdom
        .ipdom(block)
        .unwrap_or_else(|| panic!("dead branch in {block:?} outside the post-dominance tree"));
    loop {
        if module.block(at).insts().iter().any(|i| live.contains(i)) {
            return at;
        }
        let up = pdom
            .ipdom(at)
            .filter(|&up| up != at)
            .unwrap_or_else(|| panic!("no live post-dominator above {block:?}"));
        at = up;
    }
}
