//! # Structural Validation
//!
//! A whole-module consistency check run by tests and debug builds between
//! passes. It re-derives every invariant the mutators are supposed to
//! maintain: use-def symmetry, terminator placement, edge consistency, phi
//! shape, and operand typing. Validation never mutates; it reports the
//! first violation found.

use crate::instruction::InstKind;
use crate::types::TypeKind;
use crate::{BlockId, FunctionId, InstId, Module, Use, Value};

impl Module {
    /// Checks the whole module, returning a description of the first
    /// inconsistency.
    pub fn validate(&self) -> Result<(), String> {
        for func in self.functions() {
            self.validate_function(func)?;
        }
        Ok(())
    }

    fn validate_function(&self, func: FunctionId) -> Result<(), String> {
        let data = self.func(func);
        if data.external {
            if !data.blocks().is_empty() {
                return Err(format!("external function '{}' has a body", data.name));
            }
            return Ok(());
        }
        if data.blocks().is_empty() {
            return Err(format!("function '{}' has no blocks", data.name));
        }
        let mut saw_ret = false;
        for &block in data.blocks() {
            self.validate_block(func, block)?;
            if let Some(term) = self.terminator(block) {
                saw_ret |= matches!(self.inst(term).kind, InstKind::Ret);
            }
        }
        if !saw_ret {
            return Err(format!("function '{}' never returns", data.name));
        }
        Ok(())
    }

    fn validate_block(&self, func: FunctionId, block: BlockId) -> Result<(), String> {
        let data = self.block(block);
        let name = || format!("{block:?} in '{}'", self.func(func).name);
        if data.function() != func {
            return Err(format!("{} is listed under the wrong function", name()));
        }

        // Terminator placement: exactly one, and last
        let term = match self.terminator(block) {
            Some(t) => t,
            None => return Err(format!("{} has no terminator", name())),
        };
        for &inst in data.insts() {
            if self.inst(inst).is_terminator() && inst != term {
                return Err(format!("{} has a terminator before its end", name()));
            }
        }

        // Edge consistency against the terminator's target slots
        let targets = self.inst(term).successor_targets();
        if data.succs() != targets.as_slice() {
            return Err(format!("{} successor list disagrees with terminator", name()));
        }
        for &succ in data.succs() {
            let expect = data.succs().iter().filter(|&&s| s == succ).count();
            let got = self.block(succ).preds().iter().filter(|&&p| p == block).count();
            if expect != got {
                return Err(format!(
                    "edge multiplicity mismatch between {} and {succ:?}",
                    name()
                ));
            }
        }
        for &pred in data.preds() {
            if !self.block(pred).succs().contains(&block) {
                return Err(format!("{} lists a predecessor without an edge", name()));
            }
        }

        // Phi shape: contiguous prefix, one incoming pair per predecessor edge
        let mut past_phis = false;
        for &inst in data.insts() {
            let is_phi = matches!(self.inst(inst).kind, InstKind::Phi);
            if is_phi && past_phis {
                return Err(format!("{} has a phi after ordinary instructions", name()));
            }
            past_phis |= !is_phi;
            if is_phi {
                let incoming: Vec<BlockId> =
                    self.inst(inst).phi_incoming().map(|(_, b)| b).collect();
                let mut expect = data.preds().to_vec();
                let mut got = incoming;
                expect.sort_unstable();
                got.sort_unstable();
                if expect != got {
                    return Err(format!(
                        "phi {inst:?} in {} does not cover its predecessor edges",
                        name()
                    ));
                }
            }
        }

        for &inst in data.insts() {
            self.validate_inst(func, block, inst)?;
        }
        Ok(())
    }

    fn validate_inst(&self, func: FunctionId, block: BlockId, inst: InstId) -> Result<(), String> {
        let data = self.inst(inst);
        if data.parent() != Some(block) {
            return Err(format!("{inst:?} parent disagrees with its position"));
        }

        // Every operand slot is mirrored by a use record, and refers to an
        // entity of the same function
        for (index, &value) in data.operands().iter().enumerate() {
            let record = Use::new(inst, index);
            let count = self.uses_of(value).iter().filter(|&&u| u == record).count();
            if count != 1 {
                return Err(format!(
                    "operand {index} of {inst:?} has {count} use records"
                ));
            }
            match value {
                Value::Inst(other) => {
                    let parent = match self.inst(other).parent() {
                        Some(p) => p,
                        None => {
                            return Err(format!("{inst:?} reads detached instruction {other:?}"))
                        }
                    };
                    if self.block(parent).function() != func {
                        return Err(format!("{inst:?} reads across function boundaries"));
                    }
                    if !self.inst(other).produces_value(&self.types) {
                        return Err(format!("{inst:?} reads a void result"));
                    }
                }
                Value::Arg(arg) => {
                    if self.arg(arg).function() != func {
                        return Err(format!("{inst:?} reads another function's argument"));
                    }
                }
                Value::Block(b) => {
                    if self.block(b).function() != func {
                        return Err(format!("{inst:?} targets another function's block"));
                    }
                    if !block_slot_allowed(data.kind, index) {
                        return Err(format!(
                            "{inst:?} holds a label in data operand {index}"
                        ));
                    }
                }
                Value::Const(_) | Value::Global(_) => {}
                Value::Func(_) => {
                    if !matches!(data.kind, InstKind::Call) || index != 0 {
                        return Err(format!(
                            "{inst:?} holds a function outside a callee slot"
                        ));
                    }
                }
            }
            if !matches!(value, Value::Block(_)) && block_slot_required(data.kind, index) {
                return Err(format!("{inst:?} target slot {index} is not a label"));
            }
        }

        // Use records held by this instruction's result point back at it
        for &record in data.uses() {
            let user = self.inst(record.user);
            let held = user.operands().get(record.index).copied();
            if held != Some(Value::Inst(inst)) {
                return Err(format!("stale use record {record:?} on {inst:?}"));
            }
        }

        self.validate_inst_types(func, inst)
    }

    fn validate_inst_types(&self, func: FunctionId, inst: InstId) -> Result<(), String> {
        let data = self.inst(inst);
        let types = &self.types;
        let operand_ty = |i: usize| self.value_type(data.operands()[i]);
        match data.kind {
            InstKind::Binary(op) => {
                if operand_ty(0) != data.ty || operand_ty(1) != data.ty {
                    return Err(format!("{inst:?} operand types differ from result"));
                }
                let float = types.is_float(data.ty);
                if !(types.is_int(data.ty) || float) {
                    return Err(format!("{inst:?} arithmetic on non-scalar type"));
                }
                if float && op.float_mnemonic().is_none() {
                    return Err(format!("{inst:?} shifts a float"));
                }
            }
            InstKind::Cmp(_) => {
                if data.ty != types.bool() {
                    return Err(format!("{inst:?} comparison does not produce i1"));
                }
                if operand_ty(0) != operand_ty(1) {
                    return Err(format!("{inst:?} compares mixed types"));
                }
            }
            InstKind::Alloca => {
                if types.pointee(data.ty).is_none() {
                    return Err(format!("{inst:?} alloca result is not a pointer"));
                }
            }
            InstKind::Load => {
                if types.pointee(operand_ty(0)) != Some(data.ty) {
                    return Err(format!("{inst:?} load type disagrees with address"));
                }
            }
            InstKind::Store => {
                if types.pointee(operand_ty(1)) != Some(operand_ty(0)) {
                    return Err(format!("{inst:?} store type disagrees with address"));
                }
            }
            InstKind::GetElementPtr => {
                let mut pointee = match types.pointee(operand_ty(0)) {
                    Some(p) => p,
                    None => return Err(format!("{inst:?} indexes a non-pointer")),
                };
                for (i, &idx) in data.operands()[1..].iter().enumerate() {
                    if !types.is_int(self.value_type(idx)) {
                        return Err(format!("{inst:?} has a non-integer index"));
                    }
                    if i > 0 {
                        pointee = match types.element(pointee) {
                            Some(e) => e,
                            None => {
                                return Err(format!("{inst:?} steps into a non-array type"))
                            }
                        };
                    }
                }
                if types.pointee(data.ty) != Some(pointee) {
                    return Err(format!("{inst:?} result type disagrees with its steps"));
                }
            }
            InstKind::Cast(op) => {
                use crate::instruction::CastOp;
                let ok = match op {
                    CastOp::Zext => operand_ty(0) == types.bool() && data.ty == types.i32(),
                    CastOp::IntToFloat => {
                        operand_ty(0) == types.i32() && data.ty == types.float()
                    }
                    CastOp::FloatToInt => {
                        types.is_float(operand_ty(0)) && data.ty == types.i32()
                    }
                };
                if !ok {
                    return Err(format!("{inst:?} cast between unsupported types"));
                }
            }
            InstKind::Call => {
                let callee = match data.callee() {
                    Value::Func(f) => f,
                    other => return Err(format!("{inst:?} calls non-function {other:?}")),
                };
                let fn_ty = self.func(callee).ty;
                if types.result_of(fn_ty) != data.ty {
                    return Err(format!("{inst:?} result disagrees with callee"));
                }
                let (params, variadic) = types.params_of(fn_ty);
                let args = data.call_args();
                if args.len() < params.len() || (!variadic && args.len() != params.len()) {
                    return Err(format!("{inst:?} argument count mismatch"));
                }
                for (i, &param) in params.iter().enumerate() {
                    if self.value_type(args[i]) != param {
                        return Err(format!("{inst:?} argument {i} type mismatch"));
                    }
                }
            }
            InstKind::Phi => {
                if data.operands().is_empty() || data.operands().len() % 2 != 0 {
                    return Err(format!("{inst:?} phi operand list is malformed"));
                }
                for (value, _) in data.phi_incoming() {
                    if self.value_type(value) != data.ty {
                        return Err(format!("{inst:?} phi incoming type mismatch"));
                    }
                }
            }
            InstKind::Jump => {}
            InstKind::Branch => {
                if operand_ty(0) != types.bool() {
                    return Err(format!("{inst:?} branches on a non-i1 value"));
                }
            }
            InstKind::Ret => {
                let expected = types.result_of(self.func(func).ty);
                match data.ret_value() {
                    Some(v) => {
                        if self.value_type(v) != expected {
                            return Err(format!("{inst:?} returns the wrong type"));
                        }
                    }
                    None => {
                        if !matches!(types.kind(expected), TypeKind::Void) {
                            return Err(format!("{inst:?} returns void from a non-void function"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Whether operand `index` of `kind` may hold a label.
const fn block_slot_allowed(kind: InstKind, index: usize) -> bool {
    match kind {
        InstKind::Jump => index == 0,
        InstKind::Branch => index == 1 || index == 2,
        InstKind::Phi => index % 2 == 1,
        _ => false,
    }
}

/// Whether operand `index` of `kind` must hold a label.
const fn block_slot_required(kind: InstKind, index: usize) -> bool {
    block_slot_allowed(kind, index)
}
