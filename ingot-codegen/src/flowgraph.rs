//! A control flow graph represented as mappings of blocks to their
//! predecessors and successors.
//!
//! Successors are block references; predecessors also carry the branch
//! instruction that creates the edge, since most consumers want to know
//! which terminator they arrived from. Both sides are derived from the
//! branch targets of the function's instructions, so the terminators stay
//! the single source of truth: the graph is a cache that must be recomputed
//! after any retargeting.

use crate::ir::{Block, Function, Inst};
use ingot_entity::SecondaryMap;
use smallvec::SmallVec;

/// A basic block denoted by its enclosing block and the branch instruction
/// that enters the successor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockPredecessor {
    /// Enclosing block key.
    pub block: Block,
    /// The branch instruction at the end of the edge.
    pub inst: Inst,
}

impl BlockPredecessor {
    /// Convenient method to construct a new BlockPredecessor.
    pub fn new(block: Block, inst: Inst) -> Self {
        Self { block, inst }
    }
}

/// A container for the successors and predecessors of some block.
#[derive(Clone, Default, Debug)]
struct CFGNode {
    /// Branches and jumps that can reach this block.
    predecessors: Vec<BlockPredecessor>,
    /// Blocks that are the targets of branches and jumps in this block,
    /// without duplicates, in branch order.
    successors: SmallVec<[Block; 2]>,
}

/// The control flow graph maintains a mapping of blocks to their
/// predecessors and successors.
pub struct ControlFlowGraph {
    data: SecondaryMap<Block, CFGNode>,
    valid: bool,
}

impl ControlFlowGraph {
    /// Allocate a new blank control flow graph.
    pub fn new() -> Self {
        Self {
            data: SecondaryMap::new(),
            valid: false,
        }
    }

    /// Clear all data structures in this control flow graph.
    pub fn clear(&mut self) {
        self.data.clear();
        self.valid = false;
    }

    /// Allocate and compute the control flow graph for `func`.
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    /// Compute the control flow graph of `func`.
    ///
    /// This will clear and overwrite any information already stored in this
    /// data structure.
    pub fn compute(&mut self, func: &Function) {
        self.clear();
        self.data.resize(func.dfg.num_blocks());
        for block in func.layout.blocks() {
            self.compute_block(func, block);
        }
        self.valid = true;
    }

    fn compute_block(&mut self, func: &Function, block: Block) {
        for inst in func.layout.block_insts(block) {
            for dest in func.dfg[inst].branch_targets() {
                self.add_edge(block, inst, dest);
            }
        }
    }

    fn invalidate_block_successors(&mut self, block: Block) {
        let successors = core::mem::take(&mut self.data[block].successors);
        for succ in successors {
            self.data[succ]
                .predecessors
                .retain(|p| p.block != block);
        }
    }

    /// Recompute the control flow graph of `block`.
    ///
    /// This is for use after modifying instructions within a specific
    /// block. It recomputes all edges from `block` while leaving edges to
    /// `block` intact.
    pub fn recompute_block(&mut self, func: &Function, block: Block) {
        debug_assert!(self.is_valid());
        self.invalidate_block_successors(block);
        self.compute_block(func, block);
    }

    fn add_edge(&mut self, from: Block, from_inst: Inst, to: Block) {
        if !self.data[from].successors.contains(&to) {
            self.data[from].successors.push(to);
        }
        let pred = BlockPredecessor::new(from, from_inst);
        if !self.data[to].predecessors.contains(&pred) {
            self.data[to].predecessors.push(pred);
        }
    }

    /// Get an iterator over the CFG predecessors to `block`.
    pub fn pred_iter(&self, block: Block) -> impl Iterator<Item = BlockPredecessor> + '_ {
        self.data[block].predecessors.iter().copied()
    }

    /// Get an iterator over the CFG successors to `block`.
    pub fn succ_iter(&self, block: Block) -> impl Iterator<Item = Block> + '_ {
        debug_assert!(self.is_valid());
        self.data[block].successors.iter().copied()
    }

    /// Check if the CFG is in a valid state.
    ///
    /// Note that this doesn't perform any kind of validity checks. It
    /// simply checks if the `compute()` method has been called since the
    /// last `clear()`. It does not check that the CFG is consistent with
    /// the function.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ControlFlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::condcodes::CondCode;
    use crate::ir::types::I32;
    use crate::ir::{Builder, Module, Signature};

    #[test]
    fn empty() {
        let func = Function::new("f");
        ControlFlowGraph::with_function(&func);
    }

    #[test]
    fn no_predecessors() {
        let mut module = Module::new("m");
        let mut b = Builder::new(&mut module);
        let fr = b.new_function("f", Signature::new());
        for _ in 0..3 {
            let block = b.new_block();
            b.set_block(block);
            b.ret(None);
        }

        let func = &module.functions[fr];
        let cfg = ControlFlowGraph::with_function(func);
        for block in func.layout.blocks() {
            assert_eq!(cfg.pred_iter(block).count(), 0);
            assert_eq!(cfg.succ_iter(block).count(), 0);
        }
    }

    #[test]
    fn branches_and_jumps() {
        let mut module = Module::new("m");
        let mut b = Builder::new(&mut module);
        let mut sig = Signature::new();
        sig.add_param("cond", I32);
        let fr = b.new_function("f", sig);
        let cond = b.func().param_value(0);

        let block0 = b.new_block();
        let block1 = b.new_block();
        let block2 = b.new_block();

        b.set_block(block0);
        let zero = b.iconst(I32, 0);
        let br_block0_block2 = b.cjump(CondCode::NotEqual, cond, zero, block2, block1);

        b.set_block(block1);
        let jmp_block1_block2 = b.jump(block2);

        b.set_block(block2);
        b.ret(None);

        {
            let func = &module.functions[fr];
            let cfg = ControlFlowGraph::with_function(func);

            let block1_predecessors: Vec<_> = cfg.pred_iter(block1).collect();
            let block2_predecessors: Vec<_> = cfg.pred_iter(block2).collect();
            let block0_successors: Vec<_> = cfg.succ_iter(block0).collect();
            let block1_successors: Vec<_> = cfg.succ_iter(block1).collect();

            assert_eq!(block1_predecessors.len(), 1);
            assert_eq!(block2_predecessors.len(), 2);
            assert!(block1_predecessors
                .contains(&BlockPredecessor::new(block0, br_block0_block2)));
            assert!(block2_predecessors
                .contains(&BlockPredecessor::new(block0, br_block0_block2)));
            assert!(block2_predecessors
                .contains(&BlockPredecessor::new(block1, jmp_block1_block2)));
            assert_eq!(block0_successors, [block2, block1]);
            assert_eq!(block1_successors, [block2]);
        }

        // Retarget the jump in block1 and recompute only that block.
        let func = &mut module.functions[fr];
        let mut cfg = ControlFlowGraph::with_function(func);
        func.dfg.change_branch_target(jmp_block1_block2, block2, block0);
        cfg.recompute_block(func, block1);

        let block2_predecessors: Vec<_> = cfg.pred_iter(block2).collect();
        let block0_predecessors: Vec<_> = cfg.pred_iter(block0).collect();
        assert_eq!(block2_predecessors.len(), 1);
        assert!(block0_predecessors
            .contains(&BlockPredecessor::new(block1, jmp_block1_block2)));
    }
}
