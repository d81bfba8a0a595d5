//! # Functions
//!
//! A function owns an ordered list of blocks (the first is the entry) and a
//! list of formal arguments. External functions are runtime declarations
//! with no body; they can be called but never inlined or optimized.

use crate::{ArgId, BlockId, FunctionId, TypeId, Use};

/// One function in the arena.
#[derive(Debug, Clone)]
pub struct FunctionData {
    pub name: String,
    /// The interned function type carrying result and parameter types
    pub ty: TypeId,
    /// True for runtime declarations without a body
    pub external: bool,
    pub(crate) args: Vec<ArgId>,
    pub(crate) blocks: Vec<BlockId>,
    pub(crate) uses: Vec<Use>,
}

impl FunctionData {
    pub(crate) fn new(name: String, ty: TypeId, external: bool) -> Self {
        Self {
            name,
            ty,
            external,
            args: Vec::new(),
            blocks: Vec::new(),
            uses: Vec::new(),
        }
    }

    pub fn args(&self) -> &[ArgId] {
        &self.args
    }

    /// The blocks of the function in layout order, entry first.
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Call sites referring to this function.
    pub fn uses(&self) -> &[Use] {
        &self.uses
    }

    /// The entry block.
    ///
    /// # Panics
    /// Panics on external functions, which have no body.
    pub fn entry(&self) -> BlockId {
        *self
            .blocks
            .first()
            .unwrap_or_else(|| panic!("function '{}' has no entry block", self.name))
    }
}

/// One formal argument of a function.
#[derive(Debug, Clone)]
pub struct ArgData {
    pub name: Option<String>,
    pub ty: TypeId,
    pub(crate) function: FunctionId,
    pub(crate) index: usize,
    pub(crate) uses: Vec<Use>,
}

impl ArgData {
    pub(crate) fn new(
        name: Option<String>,
        ty: TypeId,
        function: FunctionId,
        index: usize,
    ) -> Self {
        Self {
            name,
            ty,
            function,
            index,
            uses: Vec::new(),
        }
    }

    pub const fn function(&self) -> FunctionId {
        self.function
    }

    /// Zero-based position in the argument list.
    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn uses(&self) -> &[Use] {
        &self.uses
    }
}
