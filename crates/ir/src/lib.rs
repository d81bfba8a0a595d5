//! # Tern Intermediate Representation (IR)
//!
//! This crate is the middle end of the Tern compiler: the in-memory IR the
//! AST visitor lowers into, the analyses that describe it, and the
//! optimization passes that rewrite it in place before the backend consumes
//! it.
//!
//! ## Design Principles
//!
//! The design is inspired by LLVM IR:
//!
//! 1. **Control Flow Graph (CFG)**: functions are directed graphs of basic
//!    blocks, each ending in exactly one terminator (branch or return)
//! 2. **Explicit def-use tracking**: every operand slot is mirrored by a
//!    `Use` record in the referenced value's use list, so rewrites like
//!    `replace_all_uses` are O(uses), not O(module)
//! 3. **Arena ownership**: the [`Module`] owns every type, constant,
//!    global, function, block, and instruction; everything else holds
//!    typed ids into the module's arenas. Freed slots are tombstoned and
//!    any access through a stale id aborts
//!
//! ## Architecture
//!
//! ```text
//! Module
//!   types:     TypeStore (interned)
//!   constants: interned by (type, payload)
//!   globals:   IndexVec<GlobalId, GlobalData>
//!   functions: IndexVec<FunctionId, FunctionData>
//!     blocks:  ordered Vec<BlockId>, entry first
//!       insts: ordered Vec<InstId>, terminator last
//! ```
//!
//! ## Error Handling
//!
//! Contract violations (double insertion, removal from a foreign block,
//! operand type mismatches, stale-id access) indicate a defect in a
//! collaborator or an earlier pass. They panic immediately; there is no
//! partial rollback. Source-program errors never reach this crate.

pub use basic_block::BlockData;
pub use builder::Builder;
pub use function::{ArgData, FunctionData};
pub use instruction::{BinaryOp, CastOp, CmpOp, InstData, InstKind};
pub use module::{ConstData, ConstKind, GlobalData, Initializer, Module};
pub use passes::{FunctionPass, ModulePass, PassManager};
pub use scopes::Scopes;
pub use types::{TypeKind, TypeStore};
pub use value::{Use, Value};

pub mod analysis;
pub mod basic_block;
pub mod builder;
pub mod function;
pub mod instruction;
pub mod module;
pub mod passes;
pub mod printer;
pub mod runtime;
pub mod scopes;
pub mod types;
pub mod value;
pub mod verifier;

// --- Core Identifiers ---

index_vec::define_index_type! {
    /// Unique identifier for an interned type within a module
    pub struct TypeId = u32;
}

index_vec::define_index_type! {
    /// Unique identifier for a function within a module
    pub struct FunctionId = u32;
}

index_vec::define_index_type! {
    /// Unique identifier for a basic block within a module
    pub struct BlockId = u32;
}

index_vec::define_index_type! {
    /// Unique identifier for an instruction within a module
    pub struct InstId = u32;
}

index_vec::define_index_type! {
    /// Unique identifier for an interned constant within a module
    pub struct ConstId = u32;
}

index_vec::define_index_type! {
    /// Unique identifier for a global variable within a module
    pub struct GlobalId = u32;
}

index_vec::define_index_type! {
    /// Unique identifier for a function argument within a module
    pub struct ArgId = u32;
}

/// Helper function to create indentation for the textual form
pub(crate) fn indent_str(level: usize) -> String {
    "  ".repeat(level)
}
