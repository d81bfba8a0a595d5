//! # Basic Blocks
//!
//! A block is an ordered list of instruction ids. When the last instruction
//! is a jump, branch, or return, the block is terminated; predecessor and
//! successor lists are derived from inserted terminators and maintained by
//! the module on every terminator edit.
//!
//! Edge lists keep one entry per terminator target slot, so a branch with
//! both sides aimed at the same block contributes that block twice. Phi
//! operands rely on this multiplicity.

use crate::{BlockId, FunctionId, InstId, Use};

/// One basic block in the arena.
#[derive(Debug, Clone)]
pub struct BlockData {
    /// Optional label for rendering; unnamed blocks print positionally
    pub name: Option<String>,
    /// The enclosing function
    pub(crate) function: FunctionId,
    pub(crate) insts: Vec<InstId>,
    pub(crate) preds: Vec<BlockId>,
    pub(crate) succs: Vec<BlockId>,
    pub(crate) uses: Vec<Use>,
}

impl BlockData {
    pub(crate) fn new(function: FunctionId, name: Option<String>) -> Self {
        Self {
            name,
            function,
            insts: Vec::new(),
            preds: Vec::new(),
            succs: Vec::new(),
            uses: Vec::new(),
        }
    }

    pub const fn function(&self) -> FunctionId {
        self.function
    }

    /// The instructions of the block in execution order.
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    /// Predecessor blocks, one entry per incoming terminator target slot.
    pub fn preds(&self) -> &[BlockId] {
        &self.preds
    }

    /// Successor blocks, one entry per target slot of the terminator.
    pub fn succs(&self) -> &[BlockId] {
        &self.succs
    }

    /// Operand slots referring to this block (terminator targets and phi
    /// incoming slots).
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    pub fn first_inst(&self) -> Option<InstId> {
        self.insts.first().copied()
    }

    pub fn last_inst(&self) -> Option<InstId> {
        self.insts.last().copied()
    }
}
