//! A compilation context holding a function together with the control-flow
//! analyses passes compute over it.
//!
//! Keeping the analyses out of `Function` avoids borrow tangles when passes
//! mutate the body while consulting the graphs, and makes the cache
//! discipline explicit: any mutation of block structure or terminators must
//! be followed by `invalidate_analysis` (or a recompute) before the caches
//! are trusted again.

use crate::dominator_tree::DominatorTree;
use crate::flowgraph::ControlFlowGraph;
use crate::ir::Function;
use crate::verifier::{verify_function, VerifierResult};

/// Persistent data structures and compilation pipeline.
pub struct Context {
    /// The function we're compiling.
    pub func: Function,

    /// The control flow graph of `func`.
    pub cfg: ControlFlowGraph,

    /// Dominator tree for `func`.
    pub domtree: DominatorTree,
}

impl Context {
    /// Allocate a new compilation context for `func`.
    ///
    /// The returned instance's analyses are not computed yet.
    pub fn for_function(func: Function) -> Self {
        Self {
            func,
            cfg: ControlFlowGraph::new(),
            domtree: DominatorTree::new(),
        }
    }

    /// Compute the control flow graph, if it isn't valid already.
    pub fn compute_cfg(&mut self) {
        if !self.cfg.is_valid() {
            self.cfg.compute(&self.func);
        }
    }

    /// Compute the dominator tree, computing the control flow graph first
    /// if necessary.
    pub fn compute_domtree(&mut self) {
        self.compute_cfg();
        if !self.domtree.is_valid() {
            self.domtree.compute(&self.func, &self.cfg);
        }
    }

    /// Invalidate all cached analyses. Call after mutating block structure
    /// or terminators.
    pub fn invalidate_analysis(&mut self) {
        self.cfg.clear();
        self.domtree.clear();
    }

    /// Run the verifier on the function.
    pub fn verify(&self) -> VerifierResult<()> {
        verify_function(&self.func)
    }
}
