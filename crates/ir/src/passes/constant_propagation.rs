//! # Constant Propagation and Branch Folding
//!
//! Three cooperating rewrites, iterated to a fixpoint per function:
//!
//! 1. A forward scan per block folds arithmetic, comparisons, and casts
//!    whose operands are literal constants, and tracks the last constant
//!    stored to each directly addressed stack slot or global so later loads
//!    fold too. The tracking is block-local and deliberately blunt about
//!    aliasing: a call wipes the whole map (anything may write through an
//!    escaped pointer), as does a store through a computed address.
//! 2. A branch whose condition became a literal constant is rewritten to an
//!    unconditional jump; the abandoned edge is removed from the discarded
//!    successor's phis, which collapse when a single incoming pair remains.
//! 3. Blocks no longer reachable from the entry are deleted, after live
//!    phis are pruned of their incoming edges.
//!
//! Integer folding wraps in two's complement; division and remainder by
//! zero are left in place untouched.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::instruction::{CastOp, InstData, InstKind};
use crate::module::ConstKind;
use crate::passes::FunctionPass;
use crate::{BlockId, FunctionId, GlobalId, InstId, Module, Value};

#[derive(Debug, Default)]
pub struct ConstantPropagation;

impl ConstantPropagation {
    pub const fn new() -> Self {
        Self
    }
}

impl FunctionPass for ConstantPropagation {
    fn run(&mut self, module: &mut Module, func: FunctionId) -> bool {
        let mut modified = false;
        loop {
            let mut changed = fold_constants(module, func);
            changed |= fold_branches(module, func);
            changed |= remove_unreachable(module, func);
            if !changed {
                break;
            }
            modified = true;
        }
        modified
    }

    fn name(&self) -> &'static str {
        "constant-propagation"
    }
}

/// A directly addressed memory location the block scan can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MemKey {
    Slot(InstId),
    Global(GlobalId),
}

fn direct_key(module: &Module, address: Value) -> Option<MemKey> {
    match address {
        Value::Inst(inst) if matches!(module.inst(inst).kind, InstKind::Alloca) => {
            Some(MemKey::Slot(inst))
        }
        Value::Global(global) => Some(MemKey::Global(global)),
        _ => None,
    }
}

fn fold_constants(module: &mut Module, func: FunctionId) -> bool {
    let mut changed = false;
    let blocks: Vec<BlockId> = module.func(func).blocks().to_vec();
    for block in blocks {
        let mut stored: FxHashMap<MemKey, Value> = FxHashMap::default();
        let insts: Vec<InstId> = module.block(block).insts().to_vec();
        for inst in insts {
            match module.inst(inst).kind {
                InstKind::Binary(_) | InstKind::Cmp(_) | InstKind::Cast(_) => {
                    if let Some(folded) = fold_inst(module, inst) {
                        module.replace_inst(inst, folded);
                        changed = true;
                    }
                }
                InstKind::Store => {
                    let (value, address) = module.inst(inst).store_parts();
                    match direct_key(module, address) {
                        Some(key) if value.is_const() => {
                            stored.insert(key, value);
                        }
                        Some(key) => {
                            stored.remove(&key);
                        }
                        // A store through a computed address may hit anything
                        None => stored.clear(),
                    }
                }
                InstKind::Load => {
                    let address = module.inst(inst).load_address();
                    if let Some(key) = direct_key(module, address) {
                        if let Some(&known) = stored.get(&key) {
                            module.replace_inst(inst, known);
                            changed = true;
                        }
                    }
                }
                InstKind::Call => stored.clear(),
                _ => {}
            }
        }
    }
    changed
}

/// Folds one arithmetic, comparison, or cast instruction if its operands
/// are literal constants. Returns the replacement value.
fn fold_inst(module: &mut Module, inst: InstId) -> Option<Value> {
    let data = module.inst(inst);
    match data.kind {
        InstKind::Binary(op) => {
            let lhs = const_kind(module, data.operands()[0])?;
            let rhs = const_kind(module, data.operands()[1])?;
            match (lhs, rhs) {
                (ConstKind::Int(a), ConstKind::Int(b)) => {
                    let v = op.eval_i32(a as i32, b as i32)?;
                    Some(Value::Const(module.const_i32(v)))
                }
                (ConstKind::Float(a), ConstKind::Float(b)) => {
                    let v = op.eval_f32(a, b)?;
                    Some(Value::Const(module.const_float(v)))
                }
                _ => None,
            }
        }
        InstKind::Cmp(op) => {
            let lhs = const_kind(module, data.operands()[0])?;
            let rhs = const_kind(module, data.operands()[1])?;
            let v = match (lhs, rhs) {
                (ConstKind::Int(a), ConstKind::Int(b)) => op.eval_i32(a as i32, b as i32),
                (ConstKind::Float(a), ConstKind::Float(b)) => op.eval_f32(a, b),
                _ => return None,
            };
            Some(Value::Const(module.const_bool(v)))
        }
        InstKind::Cast(op) => {
            let operand = const_kind(module, data.operands()[0])?;
            match (op, operand) {
                (CastOp::Zext, ConstKind::Int(v)) => Some(Value::Const(module.const_i32(v as i32))),
                (CastOp::IntToFloat, ConstKind::Int(v)) => {
                    Some(Value::Const(module.const_float(v as i32 as f32)))
                }
                (CastOp::FloatToInt, ConstKind::Float(v)) => {
                    Some(Value::Const(module.const_i32(v as i32)))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn const_kind(module: &Module, value: Value) -> Option<ConstKind> {
    value.as_const().map(|c| module.constant(c).kind)
}

fn fold_branches(module: &mut Module, func: FunctionId) -> bool {
    let mut changed = false;
    let blocks: Vec<BlockId> = module.func(func).blocks().to_vec();
    for block in blocks {
        let Some(term) = module.terminator(block) else {
            continue;
        };
        if !matches!(module.inst(term).kind, InstKind::Branch) {
            continue;
        }
        let (cond, then_bb, else_bb) = module.inst(term).branch_parts();
        let Some(ConstKind::Int(v)) = const_kind(module, cond) else {
            continue;
        };
        let (keep, dead) = if v != 0 {
            (then_bb, else_bb)
        } else {
            (else_bb, then_bb)
        };

        module.remove_inst(term);
        // One edge into `dead` went away with the branch; its phis lose the
        // matching pair. With both targets equal this still removes exactly
        // one of the two pairs.
        let pruned = prune_phi_pair(module, dead, block);
        let jump = module.create_inst(InstData::new(
            InstKind::Jump,
            module.types.void(),
            [Value::Block(keep)],
        ));
        module.push_inst(block, jump);
        for phi in pruned {
            collapse_if_trivial(module, phi);
        }
        changed = true;
    }
    changed
}

/// Removes one incoming pair for `pred` from every phi in `block`,
/// returning the phis touched.
fn prune_phi_pair(module: &mut Module, block: BlockId, pred: BlockId) -> Vec<InstId> {
    let phis: Vec<InstId> = module
        .block(block)
        .insts()
        .iter()
        .copied()
        .filter(|&i| matches!(module.inst(i).kind, InstKind::Phi))
        .collect();
    let mut touched = Vec::new();
    for phi in phis {
        if module.remove_phi_incoming(phi, pred) {
            touched.push(phi);
        }
    }
    touched
}

/// A phi left with a single incoming pair is the pair's value. A phi whose
/// surviving value is itself sits in a region with no outside entry; it is
/// left for unreachable-block removal rather than collapsed.
fn collapse_if_trivial(module: &mut Module, phi: InstId) {
    if module.inst(phi).operands().len() == 2 {
        let value = module.inst(phi).operands()[0];
        if value != Value::Inst(phi) {
            module.replace_inst(phi, value);
        }
    }
}

fn remove_unreachable(module: &mut Module, func: FunctionId) -> bool {
    let entry = module.func(func).entry();
    let mut reachable = FxHashSet::default();
    let mut stack = vec![entry];
    while let Some(block) = stack.pop() {
        if !reachable.insert(block) {
            continue;
        }
        stack.extend(module.block(block).succs().iter().copied());
    }

    let dead: Vec<BlockId> = module
        .func(func)
        .blocks()
        .iter()
        .copied()
        .filter(|b| !reachable.contains(b))
        .collect();
    if dead.is_empty() {
        return false;
    }

    // Live phis drop every pair fed from a dying block before the batch
    // removal severs the edges
    let mut touched = Vec::new();
    for &d in &dead {
        let phis: Vec<InstId> = module
            .uses_of(Value::Block(d))
            .iter()
            .map(|u| u.user)
            .filter(|&user| {
                matches!(module.inst(user).kind, InstKind::Phi)
                    && module
                        .inst(user)
                        .parent()
                        .is_some_and(|p| reachable.contains(&p))
            })
            .collect();
        for phi in phis {
            while module.remove_phi_incoming(phi, d) {}
            touched.push(phi);
        }
    }
    // A phi fed from several dying blocks is collected once per block
    touched.sort_unstable();
    touched.dedup();
    for phi in touched {
        collapse_if_trivial(module, phi);
    }
    module.remove_blocks(&dead);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BinaryOp, CmpOp};
    use crate::Builder;

    #[test]
    fn arithmetic_on_literals_folds_and_redirects_uses() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty)]);
        let x = b.arg_values(func)[0];
        let three = b.const_i32(3);
        let four = b.const_i32(4);
        let t = b.binary(BinaryOp::Add, three, four);
        let u = b.binary(BinaryOp::Mul, t, x);
        b.ret(Some(u));
        let mut module = b.finish();

        assert!(ConstantPropagation::new().run(&mut module, func));
        let entry = module.func(func).entry();
        // The add is gone and the multiply reads the literal 7
        assert_eq!(module.block(entry).insts().len(), 2);
        let mul = module.block(entry).insts()[0];
        let seven = module.const_i32(7);
        assert_eq!(module.inst(mul).operands()[0], Value::Const(seven));
        assert_eq!(module.validate(), Ok(()));
    }

    #[test]
    fn chains_fold_in_one_forward_scan() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[]);
        let two = b.const_i32(2);
        let three = b.const_i32(3);
        let a = b.binary(BinaryOp::Add, two, three);
        let c = b.binary(BinaryOp::Mul, a, a);
        let d = b.cmp(CmpOp::Lt, c, two);
        let e = b.cast(CastOp::Zext, d);
        b.ret(Some(e));
        let mut module = b.finish();

        assert!(ConstantPropagation::new().run(&mut module, func));
        let entry = module.func(func).entry();
        assert_eq!(module.block(entry).insts().len(), 1);
        let ret = module.terminator(entry).expect("ret");
        let zero = module.const_i32(0);
        assert_eq!(module.inst(ret).ret_value(), Some(Value::Const(zero)));
    }

    #[test]
    fn division_by_zero_is_left_alone() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[]);
        let one = b.const_i32(1);
        let zero = b.const_i32(0);
        let q = b.binary(BinaryOp::Div, one, zero);
        b.ret(Some(q));
        let mut module = b.finish();

        assert!(!ConstantPropagation::new().run(&mut module, func));
        let entry = module.func(func).entry();
        assert_eq!(module.block(entry).insts().len(), 2);
    }

    #[test]
    fn loads_fold_from_tracked_slots_until_a_call_intervenes() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[]);
        let slot = b.alloca(i32_ty);
        let five = b.const_i32(5);
        b.store(five, slot);
        let first = b.load(slot);
        let getint = b.scopes().find_func("getint").unwrap();
        b.call(getint, &[]);
        let second = b.load(slot);
        let sum = b.binary(BinaryOp::Add, first, second);
        b.ret(Some(sum));
        let mut module = b.finish();

        assert!(ConstantPropagation::new().run(&mut module, func));
        let entry = module.func(func).entry();
        let insts = module.block(entry).insts().to_vec();
        // alloca, store, call, load, add, ret: first load folded, second kept
        assert_eq!(insts.len(), 6);
        let add = insts[4];
        assert_eq!(module.inst(add).operands()[0], five);
        assert!(matches!(
            module.inst(add).operands()[1],
            Value::Inst(load) if matches!(module.inst(load).kind, InstKind::Load)
        ));
    }

    #[test]
    fn stores_through_computed_addresses_clear_the_tracking() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let arr_ty = b.array_type(i32_ty, 4);
        let func = b.begin_function("f", i32_ty, &[]);
        let slot = b.alloca(i32_ty);
        let arr = b.alloca(arr_ty);
        let five = b.const_i32(5);
        let zero = b.const_i32(0);
        b.store(five, slot);
        let cell = b.gep(arr, &[zero, zero]);
        b.store(zero, cell);
        let loaded = b.load(slot);
        b.ret(Some(loaded));
        let mut module = b.finish();

        assert!(!ConstantPropagation::new().run(&mut module, func));
    }

    #[test]
    fn constant_branches_fold_and_prune_the_dead_side() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[]);
        let then_bb = b.create_block(Some("then"));
        let else_bb = b.create_block(Some("else"));
        let merge = b.create_block(Some("merge"));
        let one = b.const_i32(1);
        let two = b.const_i32(2);

        let cond = b.const_bool(false);
        b.branch(cond, then_bb, else_bb);
        b.switch_to_block(then_bb);
        b.jump(merge);
        b.switch_to_block(else_bb);
        b.jump(merge);
        b.switch_to_block(merge);
        let phi = b.phi(i32_ty, &[(one, then_bb), (two, else_bb)]);
        b.ret(Some(phi));
        let mut module = b.finish();

        assert!(ConstantPropagation::new().run(&mut module, func));
        let entry = module.func(func).entry();
        // The false arm wins: entry jumps straight to else, then is gone,
        // and the phi collapsed to the literal 2
        let term = module.terminator(entry).expect("jump");
        assert!(matches!(module.inst(term).kind, InstKind::Jump));
        assert_eq!(module.inst(term).jump_target(), else_bb);
        assert_eq!(module.func(func).blocks().len(), 3);
        assert!(!module.func(func).blocks().contains(&then_bb));
        let ret = module.terminator(merge).expect("ret");
        assert_eq!(module.inst(ret).ret_value(), Some(two));
        assert_eq!(module.validate(), Ok(()));
    }

    #[test]
    fn rerunning_at_the_fixpoint_changes_nothing() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[]);
        let then_bb = b.create_block(Some("then"));
        let else_bb = b.create_block(Some("else"));
        let three = b.const_i32(3);
        let four = b.const_i32(4);
        let t = b.binary(BinaryOp::Add, three, four);
        let cond = b.cmp(CmpOp::Gt, t, three);
        b.branch(cond, then_bb, else_bb);
        b.switch_to_block(then_bb);
        b.ret(Some(t));
        b.switch_to_block(else_bb);
        b.ret(Some(four));
        let mut module = b.finish();

        assert!(ConstantPropagation::new().run(&mut module, func));
        assert!(!ConstantPropagation::new().run(&mut module, func));
    }
}
