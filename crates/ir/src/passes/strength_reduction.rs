//! # Strength Reduction
//!
//! Rewrites an integer multiply by a literal power of two (2 or larger,
//! either side) as a left shift by its log2. Division and remainder are
//! left alone: a shift-based rewrite needs a sign correction on negative
//! operands to keep truncation-toward-zero semantics, and the correction
//! costs more than it saves on the target.

use crate::instruction::{BinaryOp, InstData, InstKind};
use crate::module::ConstKind;
use crate::passes::FunctionPass;
use crate::{FunctionId, InstId, Module, Value};

#[derive(Debug, Default)]
pub struct StrengthReduction;

impl StrengthReduction {
    pub const fn new() -> Self {
        Self
    }
}

impl FunctionPass for StrengthReduction {
    fn run(&mut self, module: &mut Module, func: FunctionId) -> bool {
        let mut changed = false;
        let blocks = module.func(func).blocks().to_vec();
        for block in blocks {
            let insts: Vec<InstId> = module.block(block).insts().to_vec();
            for inst in insts {
                changed |= reduce_multiply(module, inst);
            }
        }
        changed
    }

    fn name(&self) -> &'static str {
        "strength-reduction"
    }
}

fn reduce_multiply(module: &mut Module, inst: InstId) -> bool {
    let data = module.inst(inst);
    if !matches!(data.kind, InstKind::Binary(BinaryOp::Mul)) || data.ty != module.types.i32() {
        return false;
    }
    let lhs = data.operands()[0];
    let rhs = data.operands()[1];
    // A multiply of two literals belongs to the constant folder
    let (other, amount) = match (power_of_two(module, lhs), power_of_two(module, rhs)) {
        (None, Some(shift)) => (lhs, shift),
        (Some(shift), None) => (rhs, shift),
        _ => return false,
    };
    let amount = Value::Const(module.const_i32(amount));
    let ty = module.inst(inst).ty;
    let shl = module.create_inst(InstData::new(
        InstKind::Binary(BinaryOp::Shl),
        ty,
        [other, amount],
    ));
    module.insert_before(inst, shl);
    module.replace_inst(inst, Value::Inst(shl));
    true
}

/// The shift amount when `value` is a literal integer power of two >= 2.
fn power_of_two(module: &Module, value: Value) -> Option<i32> {
    let c = value.as_const()?;
    match module.constant(c).kind {
        ConstKind::Int(v) => {
            let v = v as i32;
            if v >= 2 && (v & (v - 1)) == 0 {
                Some(v.trailing_zeros() as i32)
            } else {
                None
            }
        }
        _ => None,
    }
}
