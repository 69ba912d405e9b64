//! A Dominator Tree represented as mappings of Blocks to their immediate
//! dominator.

use crate::flowgraph::{BlockPredecessor, ControlFlowGraph};
use crate::ir::{Block, Function};
use core::cmp;
use core::cmp::Ordering;
use core::mem;
use ingot_entity::{PackedOption, SecondaryMap};

/// RPO numbers are not first assigned in a contiguous way but as multiples
/// of STRIDE, to leave room for modifications of the dominator tree.
const STRIDE: u32 = 4;

/// Special RPO numbers used during `compute_postorder`.
const DONE: u32 = 1;
const SEEN: u32 = 2;

/// Dominator tree node. We keep one of these per block.
#[derive(Clone, Default)]
struct DomNode {
    /// Number of this node in a reverse post-order traversal of the CFG,
    /// starting from 1. This number is monotonic in the reverse postorder
    /// but not contiguous, since we leave holes for localized modifications
    /// of the dominator tree. Unreachable nodes get number 0, all others
    /// are positive.
    rpo_number: u32,

    /// The immediate dominator of this block.
    ///
    /// This is `None` for unreachable blocks and the entry block which
    /// doesn't have an immediate dominator.
    idom: PackedOption<Block>,
}

/// The dominator tree for a single function.
pub struct DominatorTree {
    nodes: SecondaryMap<Block, DomNode>,

    /// CFG post-order of all reachable blocks.
    postorder: Vec<Block>,

    /// Scratch memory used by `compute_postorder()`.
    stack: Vec<Block>,

    valid: bool,
}

/// Methods for querying the dominator tree.
impl DominatorTree {
    /// Is `block` reachable from the entry block?
    pub fn is_reachable(&self, block: Block) -> bool {
        self.nodes[block].rpo_number != 0
    }

    /// Get the CFG post-order of blocks that was used to compute the
    /// dominator tree.
    ///
    /// Note that this post-order is not updated automatically when the CFG
    /// is modified. It is computed from scratch and cached by `compute()`.
    pub fn cfg_postorder(&self) -> &[Block] {
        debug_assert!(self.is_valid());
        &self.postorder
    }

    /// Returns the immediate dominator of `block`.
    ///
    /// A block is said to *dominate* `block` if all control flow paths from
    /// the function entry to `block` must go through it; the *immediate*
    /// dominator is the dominator closest to `block`. All other dominators
    /// also dominate the immediate dominator.
    ///
    /// This returns `None` if `block` is not reachable from the entry
    /// block, or if it is the entry block which has no dominators.
    pub fn idom(&self, block: Block) -> Option<Block> {
        self.nodes[block].idom.into()
    }

    /// Compare two blocks relative to the reverse post-order.
    pub fn rpo_cmp_block(&self, a: Block, b: Block) -> Ordering {
        self.nodes[a].rpo_number.cmp(&self.nodes[b].rpo_number)
    }

    /// Returns `true` if `a` dominates `b` at block granularity.
    ///
    /// This means that every control-flow path from the function entry to
    /// `b` must go through `a`. Dominance is ill defined for unreachable
    /// blocks; this returns `false` if either block is unreachable.
    ///
    /// A block is considered to dominate itself. For a constant-time
    /// version of this query, compute a [`DominatorTreePreorder`].
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let rpo_a = self.nodes[a].rpo_number;
        let mut finger = b;
        // Run a finger up the dominator tree from b until we see a.
        while rpo_a < self.nodes[finger].rpo_number {
            match self.idom(finger) {
                Some(idom) => finger = idom,
                None => return false,
            }
        }
        a == finger
    }

    /// Compute the common dominator of two basic blocks.
    ///
    /// Both basic blocks are assumed to be reachable.
    fn common_dominator(&self, mut a: Block, mut b: Block) -> Block {
        loop {
            match self.rpo_cmp_block(a, b) {
                Ordering::Less => {
                    // `a` comes before `b` in the RPO. Move `b` up.
                    b = self.nodes[b].idom.expect("unreachable basic block?");
                }
                Ordering::Greater => {
                    // `b` comes before `a` in the RPO. Move `a` up.
                    a = self.nodes[a].idom.expect("unreachable basic block?");
                }
                Ordering::Equal => break,
            }
        }
        debug_assert_eq!(a, b, "unreachable block passed to common_dominator?");
        a
    }
}

impl DominatorTree {
    /// Allocate a new blank dominator tree. Use `compute` to compute the
    /// dominator tree for a function.
    pub fn new() -> Self {
        Self {
            nodes: SecondaryMap::new(),
            postorder: Vec::new(),
            stack: Vec::new(),
            valid: false,
        }
    }

    /// Allocate and compute a dominator tree.
    pub fn with_function(func: &Function, cfg: &ControlFlowGraph) -> Self {
        let mut domtree = Self::new();
        domtree.compute(func, cfg);
        domtree
    }

    /// Reset and compute a CFG post-order and dominator tree.
    pub fn compute(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        debug_assert!(cfg.is_valid());
        self.compute_postorder(func);
        self.compute_domtree(func, cfg);
        self.valid = true;
    }

    /// Clear the data structures used to represent the dominator tree. This
    /// will leave the tree in a state where `is_valid()` returns false.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.postorder.clear();
        debug_assert!(self.stack.is_empty());
        self.valid = false;
    }

    /// Check if the dominator tree is in a valid state.
    ///
    /// Note that this doesn't perform any kind of validity checks. It
    /// simply checks if the `compute()` method has been called since the
    /// last `clear()`. It does not check that the dominator tree is
    /// consistent with the CFG.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Reset all internal data structures and compute a post-order of the
    /// control flow graph.
    ///
    /// This leaves `rpo_number == 1` for all reachable blocks, 0 for
    /// unreachable ones.
    fn compute_postorder(&mut self, func: &Function) {
        self.clear();
        self.nodes.resize(func.dfg.num_blocks());

        // During this algorithm only, use `rpo_number` to hold the
        // following state:
        //
        //   0:    block has not yet been reached in the pre-order.
        //   SEEN: block has been pushed on the stack but successors not yet
        //         pushed.
        //   DONE: Successors pushed.

        match func.layout.entry_block() {
            Some(block) => {
                self.stack.push(block);
                self.nodes[block].rpo_number = SEEN;
            }
            None => return,
        }

        while let Some(block) = self.stack.pop() {
            match self.nodes[block].rpo_number {
                SEEN => {
                    // This is the first time we pop the block, so we need
                    // to scan its successors and then revisit it.
                    self.nodes[block].rpo_number = DONE;
                    self.stack.push(block);
                    self.push_successors(func, block);
                }
                DONE => {
                    // This is the second time we pop the block, so all
                    // successors have been processed.
                    self.postorder.push(block);
                }
                _ => unreachable!(),
            }
        }
    }

    /// Push `block` successors onto `self.stack`, filtering out those that
    /// have already been seen.
    ///
    /// The successors are pushed in program order, which gives a
    /// split-invariant post-order: splitting a block in two leaves the
    /// post-order unchanged except for the new block header at the split
    /// point.
    fn push_successors(&mut self, func: &Function, block: Block) {
        for inst in func.layout.block_insts(block) {
            for succ in func.dfg[inst].branch_targets() {
                self.push_if_unseen(succ);
            }
        }
    }

    /// Push `block` onto `self.stack` if it has not already been seen.
    fn push_if_unseen(&mut self, block: Block) {
        if self.nodes[block].rpo_number == 0 {
            self.nodes[block].rpo_number = SEEN;
            self.stack.push(block);
        }
    }

    /// Build a dominator tree from a control flow graph using Keith D.
    /// Cooper's "Simple, Fast Dominator Algorithm."
    fn compute_domtree(&mut self, func: &Function, cfg: &ControlFlowGraph) {
        // During this algorithm, `rpo_number` has the following values:
        //
        // 0: block is not reachable.
        // 1: block is reachable, but has not yet been visited during the
        //    first pass. This is set by `compute_postorder`.
        // 2+: block is reachable and has an assigned RPO number.

        // We'll be iterating over a reverse post-order of the CFG, skipping
        // the entry block.
        let (entry_block, postorder) = match self.postorder.as_slice().split_last() {
            Some((&eb, rest)) => (eb, rest),
            None => return,
        };
        debug_assert_eq!(Some(entry_block), func.layout.entry_block());

        // Do a first pass where we assign RPO numbers to all reachable
        // nodes.
        self.nodes[entry_block].rpo_number = 2 * STRIDE;
        for (rpo_idx, &block) in postorder.iter().rev().enumerate() {
            // Update the current node and give it an RPO number. The entry
            // block got 2, the rest start at 3 by multiples of STRIDE to
            // leave room for future dominator tree modifications.
            //
            // Since `compute_idom` will only look at nodes with an assigned
            // RPO number, the function will never see an uninitialized
            // predecessor. Due to the nature of the post-order traversal,
            // every node we visit will have at least one predecessor that
            // has previously been visited during this RPO.
            self.nodes[block] = DomNode {
                idom: self.compute_idom(block, cfg).into(),
                rpo_number: (rpo_idx as u32 + 3) * STRIDE,
            }
        }

        // Now that we have RPO numbers for everything and initial immediate
        // dominator estimates, iterate until convergence.
        //
        // If the function is free of irreducible control flow, this will
        // exit after one iteration.
        let mut changed = true;
        while changed {
            changed = false;
            for &block in postorder.iter().rev() {
                let idom = self.compute_idom(block, cfg).into();
                if self.nodes[block].idom != idom {
                    self.nodes[block].idom = idom;
                    changed = true;
                }
            }
        }
    }

    // Compute the immediate dominator for `block` using the current `idom`
    // states for the reachable nodes.
    fn compute_idom(&self, block: Block, cfg: &ControlFlowGraph) -> Block {
        // Get an iterator with just the reachable, already visited
        // predecessors to `block`. Note that during the first pass,
        // `rpo_number` is 1 for reachable blocks that haven't been visited
        // yet, 0 for unreachable blocks.
        let mut reachable_preds = cfg
            .pred_iter(block)
            .map(|BlockPredecessor { block: pred, .. }| pred)
            .filter(|&pred| self.nodes[pred].rpo_number > 1);

        // The RPO must visit at least one predecessor before this node.
        let mut idom = reachable_preds
            .next()
            .expect("block node must have one reachable predecessor");

        for pred in reachable_preds {
            idom = self.common_dominator(idom, pred);
        }

        idom
    }
}

impl Default for DominatorTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional pre-order information that can be computed for a dominator
/// tree.
///
/// This data structure is computed from a `DominatorTree` and provides:
///
/// - A forward traversable dominator tree through the `children()`
///   iterator.
/// - An ordering of blocks according to a dominator tree pre-order.
/// - Constant time dominance checks at the block granularity.
///
/// The information in this auxiliary data structure is not easy to update
/// when the control flow graph changes, which is why it is kept separate.
pub struct DominatorTreePreorder {
    nodes: SecondaryMap<Block, ExtraNode>,

    // Scratch memory used by `compute()`.
    stack: Vec<Block>,
}

#[derive(Default, Clone)]
struct ExtraNode {
    /// First child node in the domtree.
    child: PackedOption<Block>,

    /// Next sibling node in the domtree. This linked list is ordered
    /// according to the CFG RPO.
    sibling: PackedOption<Block>,

    /// Sequence number for this node in a pre-order traversal of the
    /// dominator tree. Unreachable blocks have number 0, the entry block
    /// is 1.
    pre_number: u32,

    /// Maximum `pre_number` for the sub-tree of the dominator tree that is
    /// rooted at this node. This is always >= `pre_number`.
    pre_max: u32,
}

/// Creating and computing the dominator tree pre-order.
impl DominatorTreePreorder {
    /// Create a new blank `DominatorTreePreorder`.
    pub fn new() -> Self {
        Self {
            nodes: SecondaryMap::new(),
            stack: Vec::new(),
        }
    }

    /// Recompute this data structure to match `domtree`.
    pub fn compute(&mut self, domtree: &DominatorTree) {
        self.nodes.clear();
        debug_assert_eq!(self.stack.len(), 0);

        // Step 1: Populate the child and sibling links.
        //
        // By following the CFG post-order and pushing to the front of the
        // lists, we make sure that sibling lists are ordered according to
        // the CFG reverse post-order.
        for &block in domtree.cfg_postorder() {
            if let Some(idom) = domtree.idom(block) {
                let sib = mem::replace(&mut self.nodes[idom].child, block.into());
                self.nodes[block].sibling = sib;
            } else {
                // The only block without an immediate dominator is the
                // entry.
                self.stack.push(block);
            }
        }

        // Step 2. Assign pre-order numbers from a DFS of the dominator
        // tree.
        debug_assert!(self.stack.len() <= 1);
        let mut n = 0;
        while let Some(block) = self.stack.pop() {
            n += 1;
            let node = &mut self.nodes[block];
            node.pre_number = n;
            node.pre_max = n;
            if let Some(n) = node.sibling.expand() {
                self.stack.push(n);
            }
            if let Some(n) = node.child.expand() {
                self.stack.push(n);
            }
        }

        // Step 3. Propagate the `pre_max` numbers up the tree. The CFG
        // post-order is topologically ordered w.r.t. dominance so a node
        // comes after all its dominator tree children.
        for &block in domtree.cfg_postorder() {
            if let Some(idom) = domtree.idom(block) {
                let pre_max = cmp::max(self.nodes[block].pre_max, self.nodes[idom].pre_max);
                self.nodes[idom].pre_max = pre_max;
            }
        }
    }
}

impl Default for DominatorTreePreorder {
    fn default() -> Self {
        Self::new()
    }
}

/// An iterator that enumerates the direct children of a block in the
/// dominator tree.
pub struct ChildIter<'a> {
    dtpo: &'a DominatorTreePreorder,
    next: PackedOption<Block>,
}

impl Iterator for ChildIter<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let n = self.next.expand();
        if let Some(block) = n {
            self.next = self.dtpo.nodes[block].sibling;
        }
        n
    }
}

/// Query interface for the dominator tree pre-order.
impl DominatorTreePreorder {
    /// Get an iterator over the direct children of `block` in the
    /// dominator tree, ordered according to the CFG reverse post-order.
    pub fn children(&self, block: Block) -> ChildIter {
        ChildIter {
            dtpo: self,
            next: self.nodes[block].child,
        }
    }

    /// Fast, constant time dominance check with block granularity.
    ///
    /// This computes the same result as `domtree.dominates(a, b)`, but in
    /// guaranteed fast constant time.
    ///
    /// A block is considered to dominate itself.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let na = &self.nodes[a];
        let nb = &self.nodes[b];
        na.pre_number != 0 && na.pre_number <= nb.pre_number && na.pre_max >= nb.pre_max
    }

    /// Compare two blocks according to the dominator pre-order.
    pub fn pre_cmp_block(&self, a: Block, b: Block) -> Ordering {
        self.nodes[a].pre_number.cmp(&self.nodes[b].pre_number)
    }
}

/// Dominance frontiers for SSA construction and related passes.
///
/// The dominance frontier of a block `b` is the set of blocks where `b`'s
/// dominance stops: blocks with a predecessor dominated by `b` that are not
/// themselves strictly dominated by `b`. These are exactly the join points
/// where a definition in `b` needs a phi.
pub struct DominanceFrontier {
    frontiers: SecondaryMap<Block, Vec<Block>>,
}

impl DominanceFrontier {
    /// Compute the dominance frontiers of all reachable blocks.
    ///
    /// Uses the frontier pass of the same Cooper-Harvey-Kennedy paper the
    /// dominator tree construction comes from: for every join point, walk
    /// each predecessor's dominator chain up to the join's immediate
    /// dominator, adding the join to every frontier along the way.
    pub fn compute(cfg: &ControlFlowGraph, domtree: &DominatorTree) -> Self {
        let mut frontiers = SecondaryMap::new();
        for &block in domtree.cfg_postorder() {
            let preds: Vec<Block> = {
                let mut preds: Vec<Block> = cfg
                    .pred_iter(block)
                    .map(|p| p.block)
                    .filter(|&p| domtree.is_reachable(p))
                    .collect();
                preds.sort_unstable();
                preds.dedup();
                preds
            };
            if preds.len() < 2 {
                continue;
            }
            let idom = domtree.idom(block);
            for pred in preds {
                let mut runner = Some(pred);
                while runner != idom {
                    let r = match runner {
                        Some(r) => r,
                        None => break,
                    };
                    let frontier: &mut Vec<Block> = &mut frontiers[r];
                    if !frontier.contains(&block) {
                        frontier.push(block);
                    }
                    runner = domtree.idom(r);
                }
            }
        }
        Self { frontiers }
    }

    /// The dominance frontier of `block`.
    pub fn frontier(&self, block: Block) -> &[Block] {
        &self.frontiers[block]
    }
}
