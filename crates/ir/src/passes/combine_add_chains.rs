//! # Add Chain Combining
//!
//! Collapses a run of repeated additions (or subtractions) of one value
//! into a multiply. A chain is `x1 = seed op b; x2 = x1 op b; ...;
//! xk = x(k-1) op b` where every intermediate feeds only the first operand
//! of the next link and every second operand is the same `b`. For three or
//! more links the whole run is `seed op (b * k)`, two instructions, so the
//! rewrite always shrinks the block. An addition chain seeded by its own
//! addend is a pure tally of `b`; the seed folds into the count and only
//! the multiply remains. Integer chains only.

use rustc_hash::FxHashSet;

use crate::instruction::{BinaryOp, InstData, InstKind};
use crate::passes::FunctionPass;
use crate::{FunctionId, InstId, Module, Value};

/// Shortest run worth rewriting. Two links would be replaced by two
/// instructions and gain nothing.
const MIN_CHAIN: usize = 3;

#[derive(Debug, Default)]
pub struct CombineAddChains;

impl CombineAddChains {
    pub const fn new() -> Self {
        Self
    }
}

impl FunctionPass for CombineAddChains {
    fn run(&mut self, module: &mut Module, func: FunctionId) -> bool {
        let mut changed = false;
        let mut removed: FxHashSet<InstId> = FxHashSet::default();
        let insts: Vec<InstId> = module
            .func(func)
            .blocks()
            .iter()
            .flat_map(|&b| module.block(b).insts().iter().copied())
            .collect();
        for inst in insts {
            if removed.contains(&inst) {
                continue;
            }
            let Some(chain) = Chain::ending_at(module, inst) else {
                continue;
            };
            if chain.is_extended(module) {
                // An inner link; the walk from the true end covers it
                continue;
            }
            chain.rewrite(module, &mut removed);
            changed = true;
        }
        changed
    }

    fn name(&self) -> &'static str {
        "combine-add-chains"
    }
}

struct Chain {
    op: BinaryOp,
    seed: Value,
    addend: Value,
    /// First link through chain end, in order.
    links: Vec<InstId>,
}

impl Chain {
    /// Walks backward from `end` through single-use first operands sharing
    /// the opcode and second operand. Returns None below [`MIN_CHAIN`].
    fn ending_at(module: &Module, end: InstId) -> Option<Self> {
        let data = module.inst(end);
        let op = match data.kind {
            InstKind::Binary(op @ (BinaryOp::Add | BinaryOp::Sub)) => op,
            _ => return None,
        };
        if data.ty != module.types.i32() {
            return None;
        }
        let addend = data.operands()[1];
        let mut links = vec![end];
        let mut head = data.operands()[0];
        while let Value::Inst(prev) = head {
            let prev_data = module.inst(prev);
            let joins = prev_data.kind == InstKind::Binary(op)
                && prev_data.operands()[1] == addend
                && module.uses_of(head).len() == 1;
            if !joins {
                break;
            }
            links.push(prev);
            head = prev_data.operands()[0];
        }
        if links.len() < MIN_CHAIN {
            return None;
        }
        links.reverse();
        Some(Self {
            op,
            seed: head,
            addend,
            links,
        })
    }

    /// True when the end itself is the first operand of a longer run, in
    /// which case this walk found a suffix of it.
    fn is_extended(&self, module: &Module) -> bool {
        let end = self.links[self.links.len() - 1];
        let uses = module.uses_of(Value::Inst(end));
        let [only] = uses else {
            return false;
        };
        if only.index != 0 {
            return false;
        }
        let user = module.inst(only.user);
        user.kind == InstKind::Binary(self.op)
            && user.ty == module.types.i32()
            && user.operands()[1] == self.addend
    }

    fn rewrite(self, module: &mut Module, removed: &mut FxHashSet<InstId>) {
        let end = self.links[self.links.len() - 1];
        let ty = module.inst(end).ty;
        // A chain seeded by its own addend tallies one extra occurrence
        let tally = self.op == BinaryOp::Add && self.seed == self.addend;
        let n = self.links.len() + usize::from(tally);
        let count = Value::Const(module.const_i32(n as i32));
        let mul = module.create_inst(InstData::new(
            InstKind::Binary(BinaryOp::Mul),
            ty,
            [self.addend, count],
        ));
        module.insert_before(end, mul);
        let replacement = if tally {
            mul
        } else {
            let folded = module.create_inst(InstData::new(
                InstKind::Binary(self.op),
                ty,
                [self.seed, Value::Inst(mul)],
            ));
            module.insert_before(end, folded);
            folded
        };
        module.replace_inst(end, Value::Inst(replacement));
        removed.insert(end);
        // The inner links lost their only user
        for &link in self.links.iter().rev().skip(1) {
            if module.uses_of(Value::Inst(link)).is_empty() {
                module.remove_inst(link);
                removed.insert(link);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;

    fn chained(op: BinaryOp, len: usize) -> (Module, FunctionId) {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty), (Some("y"), i32_ty)]);
        let args = b.arg_values(func);
        let mut acc = args[0];
        for _ in 0..len {
            acc = b.binary(op, acc, args[1]);
        }
        b.ret(Some(acc));
        (b.finish(), func)
    }

    fn entry_ops(module: &Module, func: FunctionId) -> Vec<InstKind> {
        let entry = module.func(func).entry();
        module
            .block(entry)
            .insts()
            .iter()
            .map(|&i| module.inst(i).kind)
            .collect()
    }

    #[test]
    fn three_additions_become_a_multiply_and_one_add() {
        let (mut module, func) = chained(BinaryOp::Add, 3);
        assert!(CombineAddChains::new().run(&mut module, func));
        assert_eq!(
            entry_ops(&module, func),
            vec![
                InstKind::Binary(BinaryOp::Mul),
                InstKind::Binary(BinaryOp::Add),
                InstKind::Ret,
            ]
        );
        let entry = module.func(func).entry();
        let mul = module.block(entry).insts()[0];
        let count = module.inst(mul).operands()[1].as_const().expect("count");
        assert_eq!(module.constant(count).as_int(), Some(3));
        assert_eq!(module.validate(), Ok(()));
    }

    #[test]
    fn long_subtraction_chains_combine_too() {
        let (mut module, func) = chained(BinaryOp::Sub, 5);
        assert!(CombineAddChains::new().run(&mut module, func));
        assert_eq!(
            entry_ops(&module, func),
            vec![
                InstKind::Binary(BinaryOp::Mul),
                InstKind::Binary(BinaryOp::Sub),
                InstKind::Ret,
            ]
        );
        let entry = module.func(func).entry();
        let mul = module.block(entry).insts()[0];
        let count = module.inst(mul).operands()[1].as_const().expect("count");
        assert_eq!(module.constant(count).as_int(), Some(5));
    }

    #[test]
    fn pure_self_addition_folds_into_one_multiply() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty)]);
        let x = b.arg_values(func)[0];
        let t1 = b.binary(BinaryOp::Add, x, x);
        let t2 = b.binary(BinaryOp::Add, t1, x);
        let t3 = b.binary(BinaryOp::Add, t2, x);
        b.ret(Some(t3));
        let mut module = b.finish();

        // x+x+x+x is x*4, not x + x*3
        assert!(CombineAddChains::new().run(&mut module, func));
        assert_eq!(
            entry_ops(&module, func),
            vec![InstKind::Binary(BinaryOp::Mul), InstKind::Ret]
        );
        let entry = module.func(func).entry();
        let mul = module.block(entry).insts()[0];
        assert_eq!(module.inst(mul).operands()[0], x);
        let count = module.inst(mul).operands()[1].as_const().expect("count");
        assert_eq!(module.constant(count).as_int(), Some(4));
        assert_eq!(module.validate(), Ok(()));
    }

    #[test]
    fn two_links_are_not_worth_a_multiply() {
        let (mut module, func) = chained(BinaryOp::Add, 2);
        assert!(!CombineAddChains::new().run(&mut module, func));
        assert_eq!(entry_ops(&module, func).len(), 3);
    }

    #[test]
    fn a_second_use_of_an_inner_link_breaks_the_chain() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty), (Some("y"), i32_ty)]);
        let args = b.arg_values(func);
        let t1 = b.binary(BinaryOp::Add, args[0], args[1]);
        let t2 = b.binary(BinaryOp::Add, t1, args[1]);
        let t3 = b.binary(BinaryOp::Add, t2, args[1]);
        let sum = b.binary(BinaryOp::Add, t1, t3);
        b.ret(Some(sum));
        let mut module = b.finish();

        // t1 feeds both t2 and sum, so no link below t2 is single use
        assert!(!CombineAddChains::new().run(&mut module, func));
        assert_eq!(entry_ops(&module, func).len(), 5);
    }

    #[test]
    fn mixed_opcodes_do_not_join() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty), (Some("y"), i32_ty)]);
        let args = b.arg_values(func);
        let t1 = b.binary(BinaryOp::Add, args[0], args[1]);
        let t2 = b.binary(BinaryOp::Sub, t1, args[1]);
        let t3 = b.binary(BinaryOp::Sub, t2, args[1]);
        b.ret(Some(t3));
        let mut module = b.finish();

        assert!(!CombineAddChains::new().run(&mut module, func));
    }

    #[test]
    fn rerunning_at_the_fixpoint_changes_nothing() {
        let (mut module, func) = chained(BinaryOp::Add, 4);
        assert!(CombineAddChains::new().run(&mut module, func));
        assert!(!CombineAddChains::new().run(&mut module, func));
    }
}
