//! # Optimization Passes
//!
//! The pass pipeline that rewrites a module in place. Function passes run
//! per function and iterate to a fixpoint; inlining runs once over the whole
//! module first, since it moves code across function boundaries. Every pass
//! reports whether it changed anything. Analyses are per-iteration
//! snapshots: the driver surveys the CFG afresh at the top of each round,
//! and a pass that needs dominance or loop structure recomputes it from the
//! graph it is about to rewrite.
//!
//! Progress is monotonic by construction: passes only fold, shrink, or
//! simplify, so the per-function loop terminates.

pub mod combine_add_chains;
pub mod constant_propagation;
pub mod dead_code_elimination;
pub mod inlining;
pub mod simplify_cfg;
pub mod strength_reduction;

pub use combine_add_chains::CombineAddChains;
pub use constant_propagation::ConstantPropagation;
pub use dead_code_elimination::DeadCodeElimination;
pub use inlining::Inlining;
pub use simplify_cfg::SimplifyCfg;
pub use strength_reduction::StrengthReduction;

use crate::analysis::{Dominance, LoopForest};
use crate::{FunctionId, Module};

/// An optimization over one function body.
pub trait FunctionPass {
    /// Applies the pass, returning true if the function was modified.
    fn run(&mut self, module: &mut Module, func: FunctionId) -> bool;

    /// The name of this pass for debugging.
    fn name(&self) -> &'static str;
}

/// An optimization over the whole module.
pub trait ModulePass {
    /// Applies the pass, returning true if the module was modified.
    fn run(&mut self, module: &mut Module) -> bool;

    fn name(&self) -> &'static str;
}

/// Runs a sequence of passes over a module.
#[derive(Default)]
pub struct PassManager {
    module_passes: Vec<Box<dyn ModulePass>>,
    function_passes: Vec<Box<dyn FunctionPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module_pass<P: ModulePass + 'static>(mut self, pass: P) -> Self {
        self.module_passes.push(Box::new(pass));
        self
    }

    pub fn add_function_pass<P: FunctionPass + 'static>(mut self, pass: P) -> Self {
        self.function_passes.push(Box::new(pass));
        self
    }

    /// The default pipeline: inline small calls, then iterate the scalar
    /// and control-flow optimizations per function until none fires.
    pub fn standard_pipeline() -> Self {
        Self::new()
            .add_module_pass(Inlining::new())
            .add_function_pass(ConstantPropagation::new())
            .add_function_pass(CombineAddChains::new())
            .add_function_pass(StrengthReduction::new())
            .add_function_pass(DeadCodeElimination::new())
            .add_function_pass(SimplifyCfg::new())
    }

    /// Runs the module passes once, then the function passes to a fixpoint
    /// on every defined function. Returns true if anything changed.
    pub fn optimize(&mut self, module: &mut Module) -> bool {
        let mut modified = false;
        for pass in &mut self.module_passes {
            if pass.run(module) {
                modified = true;
                log::debug!("module pass '{}' made changes", pass.name());
            }
            check_consistency(module, pass.name());
        }

        let funcs: Vec<FunctionId> = module
            .functions()
            .filter(|&f| !module.func(f).external)
            .collect();
        for func in funcs {
            loop {
                let dom = Dominance::compute(module, func);
                let loops = LoopForest::compute(module, func);
                log::debug!(
                    "optimizing '{}': {} reachable blocks, {} loops",
                    module.func(func).name,
                    dom.rpo().len(),
                    loops.loops().len()
                );

                let mut changed = false;
                for pass in &mut self.function_passes {
                    if pass.run(module, func) {
                        changed = true;
                        log::debug!(
                            "pass '{}' modified '{}'",
                            pass.name(),
                            module.func(func).name
                        );
                    }
                    check_consistency(module, pass.name());
                }
                if !changed {
                    break;
                }
                modified = true;
            }
        }
        modified
    }
}

/// Debug-build structural check after every pass; a pass that corrupts the
/// graph fails here instead of confusing the next one.
fn check_consistency(module: &Module, pass: &str) {
    if cfg!(debug_assertions) {
        if let Err(err) = module.validate() {
            panic!("IR inconsistent after pass '{pass}': {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::instruction::BinaryOp;
    use crate::Builder;

    struct CountingPass {
        fires: Rc<Cell<usize>>,
    }

    impl FunctionPass for CountingPass {
        fn run(&mut self, _module: &mut Module, _func: FunctionId) -> bool {
            // Report a change on the first sweep only
            self.fires.set(self.fires.get() + 1);
            self.fires.get() == 1
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn driver_iterates_until_no_pass_fires() {
        let mut b = Builder::new();
        let i32_ty = b.i32_type();
        let func = b.begin_function("f", i32_ty, &[(Some("x"), i32_ty)]);
        let x = b.arg_values(func)[0];
        let sum = b.binary(BinaryOp::Add, x, x);
        b.ret(Some(sum));
        let mut module = b.finish();

        let fires = Rc::new(Cell::new(0));
        let mut pm = PassManager::new().add_function_pass(CountingPass {
            fires: Rc::clone(&fires),
        });
        assert!(pm.optimize(&mut module));
        // One sweep that changed, one that confirmed the fixpoint
        assert_eq!(fires.get(), 2);
    }

    #[test]
    fn external_functions_are_skipped() {
        let b = Builder::new();
        let mut module = b.finish();
        let mut pm = PassManager::standard_pipeline();
        assert!(!pm.optimize(&mut module));
    }
}
