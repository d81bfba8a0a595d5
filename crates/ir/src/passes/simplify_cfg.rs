//! # CFG Simplification
//!
//! Structural cleanup after the value-level passes, iterated together to a
//! fixpoint:
//!
//! - blocks with no predecessors (other than the entry) are deleted, after
//!   pruning their edges out of successor phis;
//! - a block with a single predecessor merges into it when that
//!   predecessor has no other successor;
//! - a phi with a single incoming pair is the pair's value;
//! - a block holding nothing but a jump is bypassed, its predecessors
//!   retargeted straight to the jump's destination. A forwarder into a
//!   block with phis is kept when a predecessor already reaches that
//!   block directly, since one predecessor must not carry two pairs with
//!   different values.

use rustc_hash::FxHashSet;

use crate::instruction::InstKind;
use crate::passes::FunctionPass;
use crate::{BlockId, FunctionId, InstId, Module, Use, Value};

#[derive(Debug, Default)]
pub struct SimplifyCfg;

impl SimplifyCfg {
    pub const fn new() -> Self {
        Self
    }
}

impl FunctionPass for SimplifyCfg {
    fn run(&mut self, module: &mut Module, func: FunctionId) -> bool {
        let mut modified = false;
        loop {
            let mut changed = remove_orphan_blocks(module, func);
            changed |= merge_straight_pairs(module, func);
            changed |= collapse_trivial_phis(module, func);
            changed |= bypass_forwarders(module, func);
            if !changed {
                break;
            }
            modified = true;
        }
        modified
    }

    fn name(&self) -> &'static str {
        "simplify-cfg"
    }
}

/// The leading run of phis in a block.
fn phis_of(module: &Module, block: BlockId) -> Vec<InstId> {
    module
        .block(block)
        .insts()
        .iter()
        .copied()
        .take_while(|&i| matches!(module.inst(i).kind, InstKind::Phi))
        .collect()
}

/// Deletes non-entry blocks that no edge reaches. A removal can orphan a
/// successor later in the layout; the pass fixpoint catches stragglers.
fn remove_orphan_blocks(module: &mut Module, func: FunctionId) -> bool {
    let entry = module.func(func).entry();
    let mut changed = false;
    let mut removed: FxHashSet<BlockId> = FxHashSet::default();
    let blocks = module.func(func).blocks().to_vec();
    for block in blocks {
        if block == entry || removed.contains(&block) || !module.block(block).preds().is_empty() {
            continue;
        }
        let phi_users: Vec<InstId> = module
            .uses_of(Value::Block(block))
            .iter()
            .map(|u| u.user)
            .filter(|&user| matches!(module.inst(user).kind, InstKind::Phi))
            .collect();
        for phi in phi_users {
            while module.remove_phi_incoming(phi, block) {}
        }
        module.remove_block(block);
        removed.insert(block);
        changed = true;
    }
    changed
}

/// Merges a single-predecessor block into its predecessor when the
/// predecessor jumps nowhere else.
fn merge_straight_pairs(module: &mut Module, func: FunctionId) -> bool {
    let entry = module.func(func).entry();
    let mut changed = false;
    let mut removed: FxHashSet<BlockId> = FxHashSet::default();
    let blocks = module.func(func).blocks().to_vec();
    for child in blocks {
        if child == entry || removed.contains(&child) {
            continue;
        }
        let &[pred] = module.block(child).preds() else {
            continue;
        };
        if pred == child || module.block(pred).succs().len() != 1 {
            continue;
        }
        // The lone incoming edge makes every phi trivial
        let phis = phis_of(module, child);
        if phis
            .iter()
            .any(|&phi| module.inst(phi).operands()[0] == Value::Inst(phi))
        {
            // A phi fed by itself marks a cycle no edge enters; the region
            // belongs to unreachable-block removal, not to merging.
            continue;
        }
        for phi in phis {
            let value = module.inst(phi).operands()[0];
            module.replace_inst(phi, value);
        }
        let jump = module
            .terminator(pred)
            .unwrap_or_else(|| panic!("merging into unterminated block {pred:?}"));
        module.remove_inst(jump);
        for inst in module.block(child).insts().to_vec() {
            module.detach_inst(inst);
            module.push_inst(pred, inst);
        }
        if !module.uses_of(Value::Block(child)).is_empty() {
            module.replace_all_uses(Value::Block(child), Value::Block(pred));
        }
        module.remove_block(child);
        removed.insert(child);
        changed = true;
    }
    changed
}

/// Replaces every single-pair phi with its value, except a phi feeding
/// itself, which only occurs in regions no edge enters.
fn collapse_trivial_phis(module: &mut Module, func: FunctionId) -> bool {
    let mut changed = false;
    let blocks = module.func(func).blocks().to_vec();
    for block in blocks {
        for phi in phis_of(module, block) {
            if module.inst(phi).operands().len() == 2 {
                let value = module.inst(phi).operands()[0];
                if value != Value::Inst(phi) {
                    module.replace_inst(phi, value);
                    changed = true;
                }
            }
        }
    }
    changed
}

/// One incoming CFG edge, as the terminator slot that creates it.
fn edge_uses(module: &Module, block: BlockId) -> Vec<Use> {
    module
        .uses_of(Value::Block(block))
        .iter()
        .copied()
        .filter(|u| match module.inst(u.user).kind {
            InstKind::Jump => u.index == 0,
            InstKind::Branch => u.index == 1 || u.index == 2,
            _ => false,
        })
        .collect()
}

/// Retargets edges around blocks that only jump somewhere else.
fn bypass_forwarders(module: &mut Module, func: FunctionId) -> bool {
    let entry = module.func(func).entry();
    let mut changed = false;
    let mut removed: FxHashSet<BlockId> = FxHashSet::default();
    let blocks = module.func(func).blocks().to_vec();
    for block in blocks {
        if block == entry || removed.contains(&block) {
            continue;
        }
        let &[only] = module.block(block).insts() else {
            continue;
        };
        if !matches!(module.inst(only).kind, InstKind::Jump) {
            continue;
        }
        let target = module.inst(only).jump_target();
        if target == block {
            continue;
        }
        let edges = edge_uses(module, block);
        if edges.is_empty() {
            continue;
        }

        let target_phis = phis_of(module, target);
        if !target_phis.is_empty() {
            let doubled = edges.iter().any(|u| {
                let pred = module
                    .inst(u.user)
                    .parent()
                    .unwrap_or_else(|| panic!("edge from detached terminator"));
                module.block(pred).succs().contains(&target)
            });
            if doubled {
                continue;
            }
        }

        let carried: Vec<(InstId, Value)> = target_phis
            .iter()
            .map(|&phi| {
                let value = module
                    .inst(phi)
                    .phi_incoming()
                    .find(|&(_, b)| b == block)
                    .map(|(v, _)| v)
                    .unwrap_or_else(|| panic!("phi misses a pair for {block:?}"));
                (phi, value)
            })
            .collect();
        for edge in edges {
            let pred = module
                .inst(edge.user)
                .parent()
                .unwrap_or_else(|| panic!("edge from detached terminator"));
            module.set_operand(edge.user, edge.index, Value::Block(target));
            for &(phi, value) in &carried {
                module.add_phi_incoming(phi, value, pred);
            }
        }
        for (phi, _) in carried {
            module.remove_phi_incoming(phi, block);
        }
        module.remove_block(block);
        removed.insert(block);
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{BinaryOp, CmpOp};
    use crate::Builder;

    #[test]
    fn orphan_chains_are_swept_and_the_rest_merges() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[]);
        let exitb = b.create_block(Some("exit"));
        let o1 = b.create_block(None);
        let o2 = b.create_block(None);
        let one = b.const_i32(1);
        let two = b.const_i32(2);
        let entry = b.module().func(func).entry();

        b.jump(exitb);
        b.switch_to_block(o1);
        b.jump(o2);
        b.switch_to_block(o2);
        b.jump(exitb);
        b.switch_to_block(exitb);
        let phi = b.phi(i32_ty, &[(one, entry), (two, o2)]);
        b.ret(Some(phi));
        let mut module = b.finish();
        assert_eq!(module.validate(), Ok(()));

        assert!(SimplifyCfg::new().run(&mut module, func));
        // Orphans fall, the phi collapses, and the exit merges into entry
        assert_eq!(module.func(func).blocks(), &[entry]);
        let ret = module.terminator(entry).expect("ret");
        assert_eq!(module.inst(ret).ret_value(), Some(one));
        assert_eq!(module.validate(), Ok(()));
        assert!(!SimplifyCfg::new().run(&mut module, func));
    }

    #[test]
    fn straight_line_chains_become_one_block() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty)]);
        let x = b.arg_values(func)[0];
        let b1 = b.create_block(None);
        let b2 = b.create_block(None);
        let one = b.const_i32(1);

        b.jump(b1);
        b.switch_to_block(b1);
        let bumped = b.binary(BinaryOp::Add, x, one);
        b.jump(b2);
        b.switch_to_block(b2);
        b.ret(Some(bumped));
        let mut module = b.finish();

        assert!(SimplifyCfg::new().run(&mut module, func));
        let entry = module.func(func).entry();
        assert_eq!(module.func(func).blocks(), &[entry]);
        let kinds: Vec<InstKind> = module
            .block(entry)
            .insts()
            .iter()
            .map(|&i| module.inst(i).kind)
            .collect();
        assert_eq!(kinds, vec![InstKind::Binary(BinaryOp::Add), InstKind::Ret]);
        assert_eq!(module.validate(), Ok(()));
    }

    #[test]
    fn forwarders_into_phi_free_blocks_vanish() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty)]);
        let x = b.arg_values(func)[0];
        let f1 = b.create_block(None);
        let f2 = b.create_block(None);
        let join = b.create_block(Some("join"));
        let zero = b.const_i32(0);
        let cond = b.cmp(CmpOp::Gt, x, zero);
        b.branch(cond, f1, f2);
        b.switch_to_block(f1);
        b.jump(join);
        b.switch_to_block(f2);
        b.jump(join);
        b.switch_to_block(join);
        b.ret(Some(x));
        let mut module = b.finish();

        assert!(SimplifyCfg::new().run(&mut module, func));
        let entry = module.func(func).entry();
        assert_eq!(module.func(func).blocks(), &[entry, join]);
        let term = module.terminator(entry).expect("branch");
        let (_, then_bb, else_bb) = module.inst(term).branch_parts();
        assert_eq!((then_bb, else_bb), (join, join));
        assert_eq!(module.validate(), Ok(()));
    }

    #[test]
    fn a_cycle_feeding_its_own_phi_survives_without_a_collapse() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[]);
        let pre = b.create_block(Some("pre"));
        let header = b.create_block(Some("header"));
        let latch = b.create_block(Some("latch"));
        let zero = b.const_i32(0);

        b.ret(Some(zero));
        b.switch_to_block(pre);
        b.jump(header);
        b.switch_to_block(header);
        let p = b.phi(i32_ty, &[(zero, pre)]);
        b.jump(latch);
        b.switch_to_block(latch);
        b.jump(header);
        let mut module = b.finish();
        let p_id = p.as_inst().unwrap();
        module.add_phi_incoming(p_id, p, latch);
        assert_eq!(module.validate(), Ok(()));

        // Nothing jumps to pre, so the sweep deletes it and the phi keeps
        // only the pair naming itself; the cycle must be left standing
        // rather than merged into a value that does not exist
        assert!(SimplifyCfg::new().run(&mut module, func));
        let entry = module.func(func).entry();
        assert_eq!(module.func(func).blocks(), &[entry, header]);
        assert!(matches!(module.inst(p_id).kind, InstKind::Phi));
        let pairs: Vec<(Value, BlockId)> = module.inst(p_id).phi_incoming().collect();
        assert_eq!(pairs, vec![(p, header)]);
        assert_eq!(module.validate(), Ok(()));
        assert!(!SimplifyCfg::new().run(&mut module, func));
    }

    #[test]
    fn a_forwarder_that_would_double_a_phi_edge_is_kept() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty)]);
        let x = b.arg_values(func)[0];
        let m = b.create_block(Some("m"));
        let other = b.create_block(Some("other"));
        let out = b.create_block(Some("out"));
        let zero = b.const_i32(0);
        let five = b.const_i32(5);
        let entry = b.module().func(func).entry();

        let cond = b.cmp(CmpOp::Gt, x, zero);
        b.branch(cond, m, other);
        b.switch_to_block(m);
        let p = b.phi(i32_ty, &[(five, entry)]);
        b.jump(out);
        b.switch_to_block(other);
        b.jump(out);
        b.switch_to_block(out);
        let q = b.phi(i32_ty, &[(p, m), (zero, other)]);
        b.ret(Some(q));
        let mut module = b.finish();
        assert_eq!(module.validate(), Ok(()));

        assert!(SimplifyCfg::new().run(&mut module, func));
        // p collapses and m is bypassed; other must then survive, because
        // entry already feeds out and q's pairs would clash
        assert_eq!(module.func(func).blocks(), &[entry, other, out]);
        let q_id = q.as_inst().unwrap();
        let pairs: Vec<(Value, BlockId)> = module.inst(q_id).phi_incoming().collect();
        assert_eq!(pairs, vec![(zero, other), (five, entry)]);
        assert_eq!(module.validate(), Ok(()));
        assert!(!SimplifyCfg::new().run(&mut module, func));
    }
}
