//! # Instructions
//!
//! Instructions are stored in a module-wide arena and identified by
//! [`InstId`](crate::InstId). Each instruction owns a flat operand list of
//! [`Value`]s; positional layouts (phi pairs, branch targets, call callees)
//! are documented on [`InstKind`]. Terminators are ordinary instructions and
//! sit last in their block.
//!
//! Operand slots and use lists are only written through
//! [`Module`](crate::Module) methods, which keep the two in lockstep.

use smallvec::SmallVec;

use crate::types::TypeKind;
use crate::{BlockId, TypeId, TypeStore, Use, Value};

/// Integer and float arithmetic. Float instructions reuse these opcodes;
/// the result type distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
}

impl BinaryOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "sdiv",
            Self::Rem => "srem",
            Self::Shl => "shl",
            Self::Shr => "ashr",
        }
    }

    /// The float spelling of the opcode, or None for integer-only opcodes.
    pub const fn float_mnemonic(self) -> Option<&'static str> {
        Some(match self {
            Self::Add => "fadd",
            Self::Sub => "fsub",
            Self::Mul => "fmul",
            Self::Div => "fdiv",
            Self::Rem => "frem",
            Self::Shl | Self::Shr => return None,
        })
    }

    pub const fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul)
    }

    /// Evaluates the opcode on i32 with two's-complement wraparound.
    ///
    /// Returns None for division or remainder by zero; those sites are left
    /// untouched by folding. Shift amounts are taken modulo 32.
    pub const fn eval_i32(self, lhs: i32, rhs: i32) -> Option<i32> {
        Some(match self {
            Self::Add => lhs.wrapping_add(rhs),
            Self::Sub => lhs.wrapping_sub(rhs),
            Self::Mul => lhs.wrapping_mul(rhs),
            Self::Div => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            Self::Rem => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            Self::Shl => lhs.wrapping_shl(rhs as u32),
            Self::Shr => lhs.wrapping_shr(rhs as u32),
        })
    }

    /// Evaluates the opcode on f32. Shifts have no float form.
    pub fn eval_f32(self, lhs: f32, rhs: f32) -> Option<f32> {
        Some(match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
            Self::Div => lhs / rhs,
            Self::Rem => lhs % rhs,
            Self::Shl | Self::Shr => return None,
        })
    }
}

/// Comparison predicates. Orderings are signed for integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "slt",
            Self::Le => "sle",
            Self::Gt => "sgt",
            Self::Ge => "sge",
        }
    }

    pub const fn float_mnemonic(self) -> &'static str {
        match self {
            Self::Eq => "oeq",
            Self::Ne => "one",
            Self::Lt => "olt",
            Self::Le => "ole",
            Self::Gt => "ogt",
            Self::Ge => "oge",
        }
    }

    pub const fn eval_i32(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }

    pub fn eval_f32(self, lhs: f32, rhs: f32) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// Conversions between the scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    /// i1 to i32 zero extension (comparison results used as integers)
    Zext,
    /// Signed i32 to float
    IntToFloat,
    /// Float to signed i32, truncating toward zero
    FloatToInt,
}

impl CastOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Zext => "zext",
            Self::IntToFloat => "sitofp",
            Self::FloatToInt => "fptosi",
        }
    }
}

/// The operation an instruction performs.
///
/// Operand layouts:
/// - `Binary`, `Cmp`: `[lhs, rhs]`
/// - `Alloca`: no operands; the result type is a pointer to the slot
/// - `Load`: `[address]`
/// - `Store`: `[value, address]`
/// - `GetElementPtr`: `[base, index…]`, one index per array dimension stepped
/// - `Cast`: `[value]`
/// - `Call`: `[callee, arg…]`
/// - `Phi`: `[value0, block0, value1, block1, …]`
/// - `Jump`: `[target]`
/// - `Branch`: `[condition, then_target, else_target]`
/// - `Ret`: `[]` or `[value]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstKind {
    Binary(BinaryOp),
    Cmp(CmpOp),
    Alloca,
    Load,
    Store,
    GetElementPtr,
    Cast(CastOp),
    Call,
    Phi,
    Jump,
    Branch,
    Ret,
}

impl InstKind {
    pub const fn is_terminator(self) -> bool {
        matches!(self, Self::Jump | Self::Branch | Self::Ret)
    }
}

/// One instruction in the arena.
///
/// `ty` is the result type, or void for stores and terminators. `parent` is
/// the block currently holding the instruction, or None while detached.
#[derive(Debug, Clone)]
pub struct InstData {
    pub kind: InstKind,
    pub ty: TypeId,
    pub(crate) operands: SmallVec<[Value; 4]>,
    pub(crate) uses: Vec<Use>,
    pub(crate) parent: Option<BlockId>,
}

impl InstData {
    pub fn new(kind: InstKind, ty: TypeId, operands: impl IntoIterator<Item = Value>) -> Self {
        Self {
            kind,
            ty,
            operands: operands.into_iter().collect(),
            uses: Vec::new(),
            parent: None,
        }
    }

    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub const fn parent(&self) -> Option<BlockId> {
        self.parent
    }

    pub const fn is_terminator(&self) -> bool {
        self.kind.is_terminator()
    }

    /// Returns true if the instruction defines a value other instructions
    /// can use. Void calls do not.
    pub fn produces_value(&self, types: &TypeStore) -> bool {
        match self.kind {
            InstKind::Store | InstKind::Jump | InstKind::Branch | InstKind::Ret => false,
            InstKind::Call => !matches!(types.kind(self.ty), TypeKind::Void),
            _ => true,
        }
    }

    /// The incoming (value, block) pairs of a phi.
    ///
    /// # Panics
    /// Panics if the instruction is not a phi.
    pub fn phi_incoming(&self) -> impl Iterator<Item = (Value, BlockId)> + '_ {
        assert!(
            matches!(self.kind, InstKind::Phi),
            "phi_incoming on {:?}",
            self.kind
        );
        self.operands.chunks_exact(2).map(|pair| (pair[0], pair[1].expect_block()))
    }

    /// The target of a jump.
    pub fn jump_target(&self) -> BlockId {
        assert!(
            matches!(self.kind, InstKind::Jump),
            "jump_target on {:?}",
            self.kind
        );
        self.operands[0].expect_block()
    }

    /// The (condition, then, else) triple of a conditional branch.
    pub fn branch_parts(&self) -> (Value, BlockId, BlockId) {
        assert!(
            matches!(self.kind, InstKind::Branch),
            "branch_parts on {:?}",
            self.kind
        );
        (
            self.operands[0],
            self.operands[1].expect_block(),
            self.operands[2].expect_block(),
        )
    }

    /// The returned value, or None for a void return.
    pub fn ret_value(&self) -> Option<Value> {
        assert!(
            matches!(self.kind, InstKind::Ret),
            "ret_value on {:?}",
            self.kind
        );
        self.operands.first().copied()
    }

    /// The callee of a call.
    pub fn callee(&self) -> Value {
        assert!(
            matches!(self.kind, InstKind::Call),
            "callee on {:?}",
            self.kind
        );
        self.operands[0]
    }

    /// The arguments of a call, callee excluded.
    pub fn call_args(&self) -> &[Value] {
        assert!(
            matches!(self.kind, InstKind::Call),
            "call_args on {:?}",
            self.kind
        );
        &self.operands[1..]
    }

    /// The (value, address) pair of a store.
    pub fn store_parts(&self) -> (Value, Value) {
        assert!(
            matches!(self.kind, InstKind::Store),
            "store_parts on {:?}",
            self.kind
        );
        (self.operands[0], self.operands[1])
    }

    /// The address operand of a load.
    pub fn load_address(&self) -> Value {
        assert!(
            matches!(self.kind, InstKind::Load),
            "load_address on {:?}",
            self.kind
        );
        self.operands[0]
    }

    /// The block targets a terminator transfers control to, in operand
    /// order. Empty for returns.
    ///
    /// # Panics
    /// Panics if the instruction is not a terminator.
    pub fn successor_targets(&self) -> SmallVec<[BlockId; 2]> {
        match self.kind {
            InstKind::Jump => SmallVec::from_slice(&[self.operands[0].expect_block()]),
            InstKind::Branch => SmallVec::from_slice(&[
                self.operands[1].expect_block(),
                self.operands[2].expect_block(),
            ]),
            InstKind::Ret => SmallVec::new(),
            other => panic!("successor_targets on {other:?}"),
        }
    }
}
