//! # Function Inlining
//!
//! Replaces calls to small functions with a copy of their body. A callee
//! qualifies when it is defined, is not `main`, has at most
//! [`MAX_INLINE_BLOCKS`] blocks and a single return block, and cannot reach
//! itself through the call graph. Each site splits the calling block after
//! the call, splices a fresh copy of the callee between the halves, and
//! redirects the call's uses to the copied return value. Rounds repeat
//! until no site remains, so calls copied in from a callee's body are
//! themselves inlined; functions left without callers are then deleted.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::instruction::{InstData, InstKind};
use crate::passes::ModulePass;
use crate::{BlockId, FunctionId, InstId, Module, TypeId, Value};

/// Largest callee body worth copying into a caller.
const MAX_INLINE_BLOCKS: usize = 8;

#[derive(Debug, Default)]
pub struct Inlining;

impl Inlining {
    pub const fn new() -> Self {
        Self
    }
}

impl ModulePass for Inlining {
    fn run(&mut self, module: &mut Module) -> bool {
        let mut changed = false;
        loop {
            let candidates = collect_candidates(module);
            let mut round = false;
            for &callee in &candidates {
                let sites: Vec<InstId> = module
                    .uses_of(Value::Func(callee))
                    .iter()
                    .filter(|u| u.index == 0)
                    .map(|u| u.user)
                    .filter(|&user| matches!(module.inst(user).kind, InstKind::Call))
                    .collect();
                for call in sites {
                    inline_site(module, call, callee);
                    round = true;
                }
            }
            if !round {
                break;
            }
            changed = true;
        }
        let candidates = collect_candidates(module);
        changed | drop_uncalled(module, &candidates)
    }

    fn name(&self) -> &'static str {
        "inlining"
    }
}

fn collect_candidates(module: &Module) -> Vec<FunctionId> {
    module
        .functions()
        .filter(|&f| {
            let data = module.func(f);
            !data.external
                && data.name != "main"
                && data.blocks().len() <= MAX_INLINE_BLOCKS
                && single_return(module, f)
                && !is_recursive(module, f)
        })
        .collect()
}

fn single_return(module: &Module, func: FunctionId) -> bool {
    let rets = module
        .func(func)
        .blocks()
        .iter()
        .filter(|&&b| {
            module
                .terminator(b)
                .is_some_and(|t| matches!(module.inst(t).kind, InstKind::Ret))
        })
        .count();
    rets == 1
}

fn callees_of(module: &Module, func: FunctionId) -> Vec<FunctionId> {
    let mut out = Vec::new();
    for &block in module.func(func).blocks() {
        for &inst in module.block(block).insts() {
            if matches!(module.inst(inst).kind, InstKind::Call) {
                if let Value::Func(g) = module.inst(inst).callee() {
                    out.push(g);
                }
            }
        }
    }
    out
}

/// Whether `func` can reach itself through calls.
fn is_recursive(module: &Module, func: FunctionId) -> bool {
    let mut stack = callees_of(module, func);
    let mut seen: FxHashSet<FunctionId> = FxHashSet::default();
    while let Some(g) = stack.pop() {
        if g == func {
            return true;
        }
        if seen.insert(g) && !module.func(g).external {
            stack.extend(callees_of(module, g));
        }
    }
    false
}

/// Splices a copy of `callee` in place of one call.
fn inline_site(module: &mut Module, call: InstId, callee: FunctionId) {
    let (caller_block, pos) = module
        .position(call)
        .unwrap_or_else(|| panic!("inlining a detached call {call:?}"));
    let caller = module.block(caller_block).function();
    let args: Vec<Value> = module.inst(call).call_args().to_vec();
    let cont = module.split_block(caller_block, pos + 1);

    let callee_entry = module.func(callee).entry();
    let callee_blocks: Vec<BlockId> = module.func(callee).blocks().to_vec();
    let mut map: FxHashMap<Value, Value> = FxHashMap::default();
    for &block in &callee_blocks {
        let clone = module.create_block(caller, None);
        map.insert(Value::Block(block), Value::Block(clone));
    }
    let params: Vec<_> = module.func(callee).args().to_vec();
    for (param, arg) in params.into_iter().zip(args) {
        map.insert(Value::Arg(param), arg);
    }

    // Copy every instruction except the return, detached and still naming
    // the callee's values; the remap below redirects each slot through the
    // map once all copies exist, which keeps phi back references simple.
    let mut order: Vec<(BlockId, InstId)> = Vec::new();
    let mut ret_value = None;
    for &block in &callee_blocks {
        let target = map[&Value::Block(block)].expect_block();
        for inst in module.block(block).insts().to_vec() {
            if matches!(module.inst(inst).kind, InstKind::Ret) {
                ret_value = module.inst(inst).ret_value();
                continue;
            }
            let (kind, ty, operands): (InstKind, TypeId, Vec<Value>) = {
                let data = module.inst(inst);
                (data.kind, data.ty, data.operands().to_vec())
            };
            let clone = module.create_inst(InstData::new(kind, ty, operands));
            map.insert(Value::Inst(inst), Value::Inst(clone));
            order.push((target, clone));
        }
    }
    for &(_, clone) in &order {
        let operands: Vec<Value> = module.inst(clone).operands().to_vec();
        for (index, old) in operands.into_iter().enumerate() {
            if let Some(&new) = map.get(&old) {
                module.set_operand(clone, index, new);
            }
        }
    }
    for (block, inst) in order {
        module.push_inst(block, inst);
    }

    // The copied return block lost its terminator; fall through to the
    // second half of the split caller block.
    for &block in &callee_blocks {
        let clone = map[&Value::Block(block)].expect_block();
        if module.terminator(clone).is_none() {
            let jump = module.create_inst(InstData::new(
                InstKind::Jump,
                module.types.void(),
                [Value::Block(cont)],
            ));
            module.push_inst(clone, jump);
        }
    }

    let result = ret_value.map(|v| map.get(&v).copied().unwrap_or(v));
    match result {
        Some(value) => module.replace_inst(call, value),
        None => module.remove_inst(call),
    }
    let entry_clone = map[&Value::Block(callee_entry)].expect_block();
    let enter = module.create_inst(InstData::new(
        InstKind::Jump,
        module.types.void(),
        [Value::Block(entry_clone)],
    ));
    module.push_inst(caller_block, enter);
}

/// Deletes qualifying functions whose last call site was just inlined,
/// including chains that only called each other.
fn drop_uncalled(module: &mut Module, candidates: &[FunctionId]) -> bool {
    let mut changed = false;
    let mut remaining = candidates.to_vec();
    loop {
        let mut removed = false;
        remaining.retain(|&f| {
            if module.uses_of(Value::Func(f)).is_empty() {
                module.remove_function(f);
                removed = true;
                false
            } else {
                true
            }
        });
        if !removed {
            break;
        }
        changed = true;
    }
    changed
}
