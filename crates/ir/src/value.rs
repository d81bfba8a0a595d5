//! # Values and Uses
//!
//! A [`Value`] names anything an instruction operand can refer to: the result
//! of another instruction, a function argument, an interned constant, a
//! global variable, a function, or a basic block (branch targets and phi
//! incoming blocks are ordinary operands here).
//!
//! A [`Use`] records one operand slot of one instruction. Every definition
//! keeps a list of its uses, and the module keeps that list in exact
//! correspondence with the operand slots that mention the definition: one
//! `Use` per slot, no more, no fewer. All rewriting goes through the module
//! so the two sides can never drift apart.

use crate::{ArgId, BlockId, ConstId, FunctionId, GlobalId, InstId};

/// Anything an operand slot can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// The result of an instruction
    Inst(InstId),
    /// A formal argument of the enclosing function
    Arg(ArgId),
    /// An interned constant
    Const(ConstId),
    /// A global variable (its address)
    Global(GlobalId),
    /// A function (as a call's callee)
    Func(FunctionId),
    /// A basic block (as a branch target or phi incoming block)
    Block(BlockId),
}

impl Value {
    pub const fn as_inst(self) -> Option<InstId> {
        match self {
            Self::Inst(id) => Some(id),
            _ => None,
        }
    }

    pub const fn as_const(self) -> Option<ConstId> {
        match self {
            Self::Const(id) => Some(id),
            _ => None,
        }
    }

    pub const fn as_block(self) -> Option<BlockId> {
        match self {
            Self::Block(id) => Some(id),
            _ => None,
        }
    }

    pub const fn as_func(self) -> Option<FunctionId> {
        match self {
            Self::Func(id) => Some(id),
            _ => None,
        }
    }

    pub const fn is_const(self) -> bool {
        matches!(self, Self::Const(_))
    }

    /// Expects a block value.
    ///
    /// # Panics
    /// Panics if the value is not a block. Branch targets and phi incoming
    /// slots hold blocks by construction, so anything else is a corrupted
    /// operand list.
    pub fn expect_block(self) -> BlockId {
        match self {
            Self::Block(id) => id,
            other => panic!("expected block value, found {other:?}"),
        }
    }
}

/// One operand slot of one instruction.
///
/// `user` is the instruction holding the slot and `index` is the position in
/// its operand list. The pair identifies the slot uniquely, so a definition's
/// use list can be edited in place when operands are rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: InstId,
    pub index: usize,
}

impl Use {
    pub const fn new(user: InstId, index: usize) -> Self {
        Self { user, index }
    }
}
