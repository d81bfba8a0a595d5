//! Randomized checks of the use-def bookkeeping and the constant folder.
//!
//! Every mutation below goes through the public mutators, which are supposed
//! to keep operand slots and use records in exact bijection no matter the
//! order they are applied in. The validator re-derives the invariants from
//! scratch after every step.

use proptest::prelude::*;
use tern_ir::{
    BinaryOp, Builder, ConstKind, InstData, InstId, InstKind, Module, PassManager, Value,
};

/// A single block computing `a + b + b + ...`, `len` additions deep.
fn chain_module(len: usize) -> (Module, Vec<InstId>) {
    let mut b = Builder::new();
    let i32_ty = b.i32_type();
    let func = b.begin_function("main", i32_ty, &[(Some("a"), i32_ty), (Some("b"), i32_ty)]);
    let args = b.arg_values(func);
    let mut last = args[0];
    let mut chain = Vec::with_capacity(len);
    for _ in 0..len {
        last = b.binary(BinaryOp::Add, last, args[1]);
        let Value::Inst(inst) = last else { unreachable!() };
        chain.push(inst);
    }
    b.ret(Some(last));
    (b.finish(), chain)
}

proptest! {
    #[test]
    fn mutation_storms_keep_the_use_def_bijection(
        len in 3usize..12,
        steps in proptest::collection::vec((0u8..5, any::<u8>(), any::<i32>()), 1..50),
    ) {
        let (mut module, mut chain) = chain_module(len);
        let main = module.func_by_name("main").unwrap();
        let entry = module.func(main).entry();
        let i32_ty = module.types.i32();

        for (sel, pick, literal) in steps {
            if chain.is_empty() {
                break;
            }
            let at = pick as usize % chain.len();
            let target = chain[at];
            match sel {
                0 => {
                    let constant = Value::Const(module.const_i32(literal));
                    module.replace_all_uses(Value::Inst(target), constant);
                }
                1 => {
                    let constant = Value::Const(module.const_i32(literal));
                    module.set_operand(target, pick as usize % 2, constant);
                }
                2 => {
                    if module.uses_of(Value::Inst(target)).is_empty() {
                        module.remove_inst(target);
                        chain.remove(at);
                    }
                }
                3 => {
                    let lhs = Value::Const(module.const_i32(literal));
                    let rhs = Value::Const(module.const_i32(literal.wrapping_add(1)));
                    let fresh = module.create_inst(InstData::new(
                        InstKind::Binary(BinaryOp::Add),
                        i32_ty,
                        [lhs, rhs],
                    ));
                    module.insert_before_terminator(entry, fresh);
                    chain.push(fresh);
                }
                4 => {
                    module.detach_inst(target);
                    module.insert_before_terminator(entry, target);
                }
                _ => unreachable!(),
            }
            assert_eq!(module.validate(), Ok(()));
        }

        // The storm never breaks rendering either
        assert!(module.to_string().contains("define i32 @main"));
    }

    #[test]
    fn literal_arithmetic_folds_exactly_or_not_at_all(
        a in any::<i32>(),
        b in any::<i32>(),
        sel in 0usize..5,
    ) {
        let ops = [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div, BinaryOp::Rem];
        let op = ops[sel];
        let mut builder = Builder::new();
        let i32_ty = builder.i32_type();
        builder.begin_function("main", i32_ty, &[]);
        let lhs = builder.const_i32(a);
        let rhs = builder.const_i32(b);
        let out = builder.binary(op, lhs, rhs);
        builder.ret(Some(out));
        let mut module = builder.finish();

        PassManager::standard_pipeline().optimize(&mut module);

        let main = module.func_by_name("main").unwrap();
        let entry = module.func(main).entry();
        let expected = match op {
            BinaryOp::Add => Some(a.wrapping_add(b)),
            BinaryOp::Sub => Some(a.wrapping_sub(b)),
            BinaryOp::Mul => Some(a.wrapping_mul(b)),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => None,
            BinaryOp::Div => Some(a.wrapping_div(b)),
            BinaryOp::Rem => Some(a.wrapping_rem(b)),
            _ => unreachable!(),
        };
        match expected {
            Some(folded) => {
                assert_eq!(module.block(entry).insts().len(), 1);
                let ret = module.terminator(entry).unwrap();
                let value = module.inst(ret).ret_value().unwrap();
                let Value::Const(id) = value else { panic!("return did not fold") };
                assert_eq!(module.constant(id).kind, ConstKind::Int(i64::from(folded)));
            }
            // Division by zero is left in place for the runtime to trap on
            None => {
                assert_eq!(module.block(entry).insts().len(), 2);
                let kept = module.block(entry).insts()[0];
                assert!(matches!(module.inst(kept).kind, InstKind::Binary(_)));
            }
        }
    }
}
