//! # CFG Analyses
//!
//! Read-only analyses over a function's control-flow graph. Results are
//! snapshots: any pass that rewrites the graph must recompute them.

pub mod dominance;
pub mod loops;

pub use dominance::{Dominance, PostDominance};
pub use loops::{LoopForest, LoopInfo};
