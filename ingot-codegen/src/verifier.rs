//! A verifier for ensuring that functions are well formed.
//! It verifies:
//!
//! block integrity
//!
//! - All blocks are non-empty.
//! - All instructions reachable from a block belong to it.
//! - The last instruction of every block is a terminator, and no other
//!   instruction is.
//! - Block names are unique within their function.
//!
//! control flow graph integrity
//!
//! - The predecessors of every block are exactly the blocks whose
//!   terminators target it.
//! - Every phi has one input per predecessor of its block, and nothing
//!   else.
//!
//! type checking
//!
//! - Binop operands and result share one type.
//! - Comparison operands of a cjmp share one type.
//! - Load and store addresses are of pointer type.
//! - Phi inputs have the phi's type.
//! - A returned value matches the function's declared return type.
//!
//! SSA form
//!
//! - Every use is dominated by its definition: the defining block strictly
//!   dominates the using block, or the definition precedes the use within
//!   one block. A phi's use of an input is located at the end of the
//!   corresponding predecessor, which is what makes loop-carried values
//!   legal.
//! - No use of an undefined value.

use crate::dominator_tree::{DominatorTree, DominatorTreePreorder};
use crate::flowgraph::ControlFlowGraph;
use crate::ir::{
    AnyEntity, Block, Function, Inst, InstructionData, Module, SourceLoc, Value, ValueDef,
};
use core::cmp::Ordering;
use core::fmt;
use log::debug;
use std::collections::HashSet;

/// A verifier error.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct VerifierError {
    /// The entity causing the verifier error.
    pub location: AnyEntity,
    /// Error message.
    pub message: String,
    /// Source location of the offending instruction, when one was
    /// recorded.
    pub srcloc: SourceLoc,
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.srcloc.is_default() {
            write!(f, "{}: {}", self.location, self.message)
        } else {
            write!(f, "{} {}: {}", self.location, self.srcloc, self.message)
        }
    }
}

/// A list of verifier errors.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl VerifierErrors {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Are there no errors?
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert into a result: `Ok` when empty.
    pub fn into_result(self) -> VerifierResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn report(&mut self, location: impl Into<AnyEntity>, message: String) {
        self.0.push(VerifierError {
            location: location.into(),
            message,
            srcloc: SourceLoc::default(),
        });
    }

    fn report_at(&mut self, location: impl Into<AnyEntity>, srcloc: SourceLoc, message: String) {
        self.0.push(VerifierError {
            location: location.into(),
            message,
            srcloc,
        });
    }
}

impl fmt::Display for VerifierErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for err in &self.0 {
            writeln!(f, "- {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for VerifierErrors {}

/// Verifier result: either no errors, or the collected list.
pub type VerifierResult<T> = Result<T, VerifierErrors>;

/// Verify every function in `module`.
pub fn verify_module(module: &Module) -> VerifierResult<()> {
    let mut errors = VerifierErrors::new();
    for func in module.functions.values() {
        if let Err(e) = verify_function(func) {
            errors.0.extend(e.0);
        }
    }
    errors.into_result()
}

/// Verify `func` and collect all errors found.
pub fn verify_function(func: &Function) -> VerifierResult<()> {
    debug!("verifying function {}", func.name);
    let mut errors = VerifierErrors::new();
    let verifier = Verifier { func };
    verifier.run(&mut errors);
    errors.into_result()
}

struct Verifier<'a> {
    func: &'a Function,
}

impl Verifier<'_> {
    fn run(&self, errors: &mut VerifierErrors) {
        self.block_integrity(errors);
        // Broken termination makes the derived control flow meaningless,
        // so stop before the CFG-based checks.
        if !errors.is_empty() {
            return;
        }
        let cfg = ControlFlowGraph::with_function(self.func);
        self.cfg_integrity(&cfg, errors);
        self.phi_integrity(&cfg, errors);
        self.typecheck(errors);
        let domtree = DominatorTree::with_function(self.func, &cfg);
        let mut preorder = DominatorTreePreorder::new();
        preorder.compute(&domtree);
        self.ssa_form(&domtree, &preorder, errors);
    }

    fn block_integrity(&self, errors: &mut VerifierErrors) {
        let func = self.func;
        if func.layout.entry_block().is_none() {
            errors.report(AnyEntity::Function, "function has no entry block".into());
        }
        let mut names = HashSet::new();
        for block in func.layout.blocks() {
            if !names.insert(func.dfg.block_name(block)) {
                errors.report(
                    block,
                    format!("duplicate block name {}", func.dfg.block_name(block)),
                );
            }
            let mut insts = func.layout.block_insts(block).peekable();
            if insts.peek().is_none() {
                errors.report(block, "block is empty".into());
                continue;
            }
            while let Some(inst) = insts.next() {
                let data = &func.dfg[inst];
                let last = insts.peek().is_none();
                if last && !data.is_terminator() {
                    errors.report(
                        inst,
                        format!("block ends in {} which is not a terminator", data.opcode()),
                    );
                }
                if !last && data.is_terminator() {
                    errors.report(
                        inst,
                        format!("terminator {} in the middle of a block", data.opcode()),
                    );
                }
            }
        }
    }

    /// Check that the cached predecessor lists agree with a fresh scan of
    /// the terminators. The flowgraph derives both sides from the same
    /// instructions, so this guards against stale caches and detached
    /// instructions rather than against the flowgraph itself.
    fn cfg_integrity(&self, cfg: &ControlFlowGraph, errors: &mut VerifierErrors) {
        let func = self.func;
        for block in func.layout.blocks() {
            let mut expected: Vec<Block> = Vec::new();
            for pred in func.layout.blocks() {
                let branches_here = func
                    .layout
                    .block_insts(pred)
                    .any(|inst| func.dfg[inst].branch_targets().contains(&block));
                if branches_here {
                    expected.push(pred);
                }
            }
            let mut actual: Vec<Block> = cfg.pred_iter(block).map(|p| p.block).collect();
            actual.sort_unstable();
            actual.dedup();
            expected.sort_unstable();
            if actual != expected {
                errors.report(
                    block,
                    format!(
                        "predecessor list {actual:?} does not match branch targets {expected:?}"
                    ),
                );
            }
            for succ in cfg.succ_iter(block) {
                if !func.layout.is_block_inserted(succ) {
                    errors.report(block, format!("successor {succ} is not in the layout"));
                }
            }
        }
    }

    fn phi_integrity(&self, cfg: &ControlFlowGraph, errors: &mut VerifierErrors) {
        let func = self.func;
        for block in func.layout.blocks() {
            let mut preds: Vec<Block> = cfg.pred_iter(block).map(|p| p.block).collect();
            preds.sort_unstable();
            preds.dedup();
            for inst in func.layout.block_insts(block) {
                let InstructionData::Phi { ty, args } = &func.dfg[inst] else {
                    continue;
                };
                let mut keys: Vec<Block> = args.iter().map(|(b, _)| *b).collect();
                let before_dedup = keys.len();
                keys.sort_unstable();
                keys.dedup();
                if keys.len() != before_dedup {
                    errors.report(inst, "phi has duplicate predecessor entries".into());
                }
                if keys != preds {
                    errors.report(
                        inst,
                        format!("phi inputs {keys:?} do not cover predecessors {preds:?}"),
                    );
                }
                for (pred, value) in args {
                    let value_ty = func.dfg.value_type(*value);
                    if value_ty != *ty {
                        errors.report(
                            inst,
                            format!(
                                "phi input for {} has type {value_ty}, expected {ty}",
                                func.dfg.block_name(*pred)
                            ),
                        );
                    }
                }
            }
        }
    }

    fn typecheck(&self, errors: &mut VerifierErrors) {
        let func = self.func;
        for block in func.layout.blocks() {
            for inst in func.layout.block_insts(block) {
                match &func.dfg[inst] {
                    InstructionData::Binop { ty, args, .. } => {
                        for &arg in args {
                            let arg_ty = func.dfg.value_type(arg);
                            if arg_ty != *ty {
                                errors.report(
                                    inst,
                                    format!("binop operand has type {arg_ty}, expected {ty}"),
                                );
                            }
                        }
                    }
                    InstructionData::CJump { args, .. } => {
                        let a = func.dfg.value_type(args[0]);
                        let b = func.dfg.value_type(args[1]);
                        if a != b {
                            errors.report(
                                inst,
                                format!("cjmp compares {a} against {b}"),
                            );
                        }
                    }
                    InstructionData::Load { addr, .. } => {
                        let addr_ty = func.dfg.value_type(*addr);
                        if !addr_ty.is_ptr() {
                            errors.report(
                                inst,
                                format!("load address has type {addr_ty}, expected ptr"),
                            );
                        }
                    }
                    InstructionData::Store { addr, .. } => {
                        let addr_ty = func.dfg.value_type(*addr);
                        if !addr_ty.is_ptr() {
                            errors.report(
                                inst,
                                format!("store address has type {addr_ty}, expected ptr"),
                            );
                        }
                    }
                    InstructionData::Return { arg } => {
                        match (arg.expand(), func.signature.ret) {
                            (Some(value), Some(ret_ty)) => {
                                let value_ty = func.dfg.value_type(value);
                                if value_ty != ret_ty {
                                    errors.report(
                                        inst,
                                        format!("returns {value_ty}, function declares {ret_ty}"),
                                    );
                                }
                            }
                            (Some(_), None) => {
                                errors.report(
                                    inst,
                                    "returns a value from a void function".into(),
                                );
                            }
                            (None, Some(ret_ty)) => {
                                errors.report(
                                    inst,
                                    format!("missing return value of type {ret_ty}"),
                                );
                            }
                            (None, None) => {}
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn ssa_form(
        &self,
        domtree: &DominatorTree,
        preorder: &DominatorTreePreorder,
        errors: &mut VerifierErrors,
    ) {
        let func = self.func;
        for block in func.layout.blocks() {
            if !domtree.is_reachable(block) {
                // Dominance is not defined off the reachable subgraph.
                continue;
            }
            for inst in func.layout.block_insts(block) {
                if let InstructionData::Phi { args, .. } = &func.dfg[inst] {
                    for &(pred, value) in args {
                        // The use happens at the end of the predecessor.
                        if let Some(pred_end) = func.layout.last_inst(pred) {
                            self.check_use(value, pred_end, pred, preorder, errors);
                        }
                    }
                } else {
                    for value in func.dfg[inst].arguments() {
                        self.check_use(value, inst, block, preorder, errors);
                    }
                }
            }
        }
    }

    /// Check that the definition of `value` dominates its use by
    /// `user`, located in `user_block`.
    fn check_use(
        &self,
        value: Value,
        user: Inst,
        user_block: Block,
        preorder: &DominatorTreePreorder,
        errors: &mut VerifierErrors,
    ) {
        let func = self.func;
        let def_inst = match func.dfg.value_def(value) {
            // Parameters and variable addresses are defined on entry, which
            // dominates everything.
            ValueDef::Param(_) | ValueDef::Global(_) => return,
            ValueDef::Inst(def_inst) => def_inst,
        };

        if let InstructionData::Undefined { .. } = func.dfg[def_inst] {
            errors.report_at(
                user,
                func.srclocs[user],
                format!("{value} used uninitialized"),
            );
        }

        let def_block = match func.layout.inst_block(def_inst) {
            Some(def_block) => def_block,
            None => {
                errors.report(user, format!("{value} defined by a detached instruction"));
                return;
            }
        };
        let dominates = if def_block == user_block {
            func.layout.cmp(def_inst, user) == Ordering::Less
        } else {
            preorder.dominates(def_block, user_block)
        };
        if !dominates {
            errors.report_at(
                user,
                func.srclocs[user],
                format!("uses {value} which does not dominate it"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::condcodes::CondCode;
    use crate::ir::types::{I32, PTR};
    use crate::ir::{BinaryOp, Builder, Module, Signature};

    fn build_simple_module() -> Module {
        let mut module = Module::new("m");
        let mut sig = Signature::returning(I32);
        sig.add_param("a", I32);
        sig.add_param("b", I32);
        let mut b = Builder::new(&mut module);
        b.new_function("add", sig);
        let x = b.func().param_value(0);
        let y = b.func().param_value(1);
        let entry = b.new_named_block("entry");
        b.set_block(entry);
        let sum = b.binop(BinaryOp::Add, I32, x, y);
        b.ret(Some(sum));
        module
    }

    #[test]
    fn simple_module_verifies() {
        let module = build_simple_module();
        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn missing_terminator() {
        let mut module = Module::new("m");
        let mut b = Builder::new(&mut module);
        b.new_function("f", Signature::new());
        let entry = b.new_named_block("entry");
        b.set_block(entry);
        b.iconst(I32, 1);

        let errors = verify_module(&module).unwrap_err();
        assert!(errors.0[0].message.contains("not a terminator"));
    }

    #[test]
    fn terminator_in_the_middle() {
        let mut module = Module::new("m");
        let mut b = Builder::new(&mut module);
        b.new_function("f", Signature::new());
        let entry = b.new_named_block("entry");
        b.set_block(entry);
        b.ret(None);
        b.ret(None);

        let errors = verify_module(&module).unwrap_err();
        assert!(errors.0[0].message.contains("middle of a block"));
    }

    #[test]
    fn phi_covers_predecessors() {
        let mut module = Module::new("m");
        let mut sig = Signature::returning(I32);
        sig.add_param("a", I32);
        let mut b = Builder::new(&mut module);
        b.new_function("f", sig);
        let a = b.func().param_value(0);

        let entry = b.new_named_block("entry");
        let left = b.new_named_block("left");
        let right = b.new_named_block("right");
        let join = b.new_named_block("join");

        b.set_block(entry);
        let zero = b.iconst(I32, 0);
        b.cjump(CondCode::Equal, a, zero, left, right);
        b.set_block(left);
        let one = b.iconst(I32, 1);
        b.jump(join);
        b.set_block(right);
        let two = b.iconst(I32, 2);
        b.jump(join);
        b.set_block(join);
        let phi = b.phi(I32, vec![(left, one), (right, two)]);
        b.ret(Some(phi));

        assert!(verify_module(&module).is_ok());

        // Dropping one input breaks phi completeness.
        let mut module = Module::new("m");
        let mut sig = Signature::returning(I32);
        sig.add_param("a", I32);
        let mut b = Builder::new(&mut module);
        b.new_function("f", sig);
        let a = b.func().param_value(0);
        let entry = b.new_named_block("entry");
        let left = b.new_named_block("left");
        let right = b.new_named_block("right");
        let join = b.new_named_block("join");
        b.set_block(entry);
        let zero = b.iconst(I32, 0);
        b.cjump(CondCode::Equal, a, zero, left, right);
        b.set_block(left);
        let one = b.iconst(I32, 1);
        b.jump(join);
        b.set_block(right);
        b.jump(join);
        b.set_block(join);
        let phi = b.phi(I32, vec![(left, one)]);
        b.ret(Some(phi));

        let errors = verify_module(&module).unwrap_err();
        assert!(errors
            .0
            .iter()
            .any(|e| e.message.contains("do not cover predecessors")));
    }

    #[test]
    fn loop_carried_phi_is_legal() {
        let mut module = Module::new("m");
        let mut sig = Signature::returning(I32);
        sig.add_param("n", I32);
        let mut b = Builder::new(&mut module);
        b.new_function("count", sig);
        let n = b.func().param_value(0);

        let entry = b.new_named_block("entry");
        let header = b.new_named_block("header");
        let body = b.new_named_block("body");
        let exit = b.new_named_block("exit");

        b.set_block(entry);
        let zero = b.iconst(I32, 0);
        b.jump(header);

        b.set_block(body);
        let one = b.iconst(I32, 1);
        b.jump(header);

        b.set_block(header);
        // The phi uses `next` before it is defined below; that is exactly
        // what phis are for.
        let i = b.phi(I32, vec![(entry, zero)]);
        b.cjump(CondCode::LessThan, i, n, body, exit);

        b.set_block(exit);
        b.ret(Some(i));

        // Patch the body to feed i+1 back through the phi.
        let fr = module.function_by_name("count").unwrap();
        let func = &mut module.functions[fr];
        let next = {
            let add = func.dfg.make_inst(InstructionData::Binop {
                op: BinaryOp::Add,
                ty: I32,
                args: [i, one],
            });
            // Insert before the jump that ends `body`.
            let jump = func.layout.last_inst(body).unwrap();
            func.layout.remove_inst(jump);
            func.layout.append_inst(add, body);
            func.layout.append_inst(jump, body);
            func.dfg.inst_result(add).unwrap()
        };
        let phi_inst = func.layout.first_inst(header).unwrap();
        let mut phi_data = func.dfg[phi_inst].clone();
        if let InstructionData::Phi { args, .. } = &mut phi_data {
            args.push((body, next));
        }
        func.dfg.replace_inst_args(phi_inst, phi_data);

        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn use_does_not_dominate() {
        let mut module = Module::new("m");
        let mut sig = Signature::returning(I32);
        sig.add_param("a", I32);
        let mut b = Builder::new(&mut module);
        b.new_function("f", sig);
        let a = b.func().param_value(0);

        let entry = b.new_named_block("entry");
        let left = b.new_named_block("left");
        let right = b.new_named_block("right");

        b.set_block(entry);
        let zero = b.iconst(I32, 0);
        b.cjump(CondCode::Equal, a, zero, left, right);

        // `left` computes a value, `right` uses it; neither dominates the
        // other.
        b.set_block(left);
        let one = b.iconst(I32, 1);
        b.ret(Some(one));

        b.set_block(right);
        let bad = b.binop(BinaryOp::Add, I32, one, a);
        b.ret(Some(bad));

        let errors = verify_module(&module).unwrap_err();
        assert!(errors
            .0
            .iter()
            .any(|e| e.message.contains("does not dominate")));
    }

    #[test]
    fn undefined_use_is_reported() {
        let mut module = Module::new("m");
        let mut b = Builder::new(&mut module);
        b.new_function("f", Signature::returning(I32));
        let entry = b.new_named_block("entry");
        b.set_block(entry);
        b.set_srcloc(SourceLoc::new(0x42));
        let u = b.undef(I32);
        b.ret(Some(u));

        let errors = verify_module(&module).unwrap_err();
        let err = errors
            .0
            .iter()
            .find(|e| e.message.contains("used uninitialized"))
            .unwrap();
        assert_eq!(err.srcloc, SourceLoc::new(0x42));
    }

    #[test]
    fn type_mismatches() {
        let mut module = Module::new("m");
        let mut sig = Signature::new();
        sig.add_param("p", I32);
        let mut b = Builder::new(&mut module);
        b.new_function("f", sig);
        let p = b.func().param_value(0);
        let entry = b.new_named_block("entry");
        b.set_block(entry);
        // Load through a non-pointer address.
        b.load(I32, p);
        let addr = b.undef(PTR);
        let _ = addr;
        b.ret(None);

        let errors = verify_module(&module).unwrap_err();
        assert!(errors
            .0
            .iter()
            .any(|e| e.message.contains("expected ptr")));
    }
}
