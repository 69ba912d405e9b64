//! Construction of IR.
//!
//! The `Builder` keeps a current function and a current block and appends
//! every emitted instruction to that block, in emission order. Because
//! operands are `Value` indices handed out by the same function's arenas,
//! an instruction can only ever name values that already exist, which is
//! the use-before-def discipline SSA construction needs.

use crate::ir::condcodes::CondCode;
use crate::ir::entities::{Block, FuncRef, Inst, Value, Variable};
use crate::ir::function::{Function, Signature};
use crate::ir::instructions::{BinaryOp, InstructionData};
use crate::ir::module::Module;
use crate::ir::sourceloc::SourceLoc;
use crate::ir::types::Type;
use log::trace;

/// A builder inserting instructions into a module's functions.
pub struct Builder<'a> {
    module: &'a mut Module,
    func: Option<FuncRef>,
    block: Option<Block>,
    srcloc: SourceLoc,
}

impl<'a> Builder<'a> {
    /// Create a builder appending into `module`.
    pub fn new(module: &'a mut Module) -> Self {
        Self {
            module,
            func: None,
            block: None,
            srcloc: SourceLoc::default(),
        }
    }

    /// The module being built.
    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    /// The current function.
    ///
    /// Panics if no function has been created or selected yet.
    pub fn func(&self) -> &Function {
        &self.module.functions[self.func.expect("no current function")]
    }

    /// The current function, mutable edition.
    pub fn func_mut(&mut self) -> &mut Function {
        &mut self.module.functions[self.func.expect("no current function")]
    }

    /// Create a new function in the module and make it current.
    pub fn new_function(&mut self, name: impl Into<String>, signature: Signature) -> FuncRef {
        let func = self
            .module
            .add_function(Function::with_signature(name, signature));
        self.set_function(func);
        func
    }

    /// Switch to an existing function. The current block becomes its entry
    /// block, if it has one.
    pub fn set_function(&mut self, func: FuncRef) {
        self.block = self.module.functions[func].layout.entry_block();
        self.func = Some(func);
    }

    /// Create a new block with a fresh name and append it to the current
    /// function's layout.
    pub fn new_block(&mut self) -> Block {
        let func = self.func_mut();
        let block = func.dfg.make_auto_block();
        func.layout.append_block(block);
        block
    }

    /// Create a new block with the given name and append it to the current
    /// function's layout.
    pub fn new_named_block(&mut self, name: impl Into<String>) -> Block {
        let func = self.func_mut();
        let block = func.dfg.make_block(name);
        func.layout.append_block(block);
        block
    }

    /// Make `block` the insertion point for subsequent instructions.
    pub fn set_block(&mut self, block: Block) {
        self.block = Some(block);
    }

    /// The current block, if one is selected.
    pub fn current_block(&self) -> Option<Block> {
        self.block
    }

    /// Set the source location attached to subsequently emitted
    /// instructions.
    pub fn set_srcloc(&mut self, loc: SourceLoc) {
        self.srcloc = loc;
    }

    /// Append an instruction to the current block.
    ///
    /// Panics if no block is selected; that is a front-end bug, not a
    /// recoverable condition.
    pub fn emit(&mut self, data: InstructionData) -> Inst {
        let block = self.block.expect("no current block");
        let srcloc = self.srcloc;
        let func = self.func_mut();
        let inst = func.dfg.make_inst(data);
        func.layout.append_inst(inst, block);
        if !srcloc.is_default() {
            func.srclocs[inst] = srcloc;
        }
        trace!("emit {} into {}", inst, func.dfg.block_name(block));
        inst
    }

    /// Emit an instruction and return its result value.
    fn emit_result(&mut self, data: InstructionData) -> Value {
        let inst = self.emit(data);
        self.func()
            .dfg
            .inst_result(inst)
            .expect("instruction has no result")
    }

    /// Emit an integer constant.
    pub fn iconst(&mut self, ty: Type, imm: i64) -> Value {
        self.emit_result(InstructionData::Const { ty, imm })
    }

    /// Emit a binary operation.
    pub fn binop(&mut self, op: BinaryOp, ty: Type, a: Value, b: Value) -> Value {
        self.emit_result(InstructionData::Binop {
            op,
            ty,
            args: [a, b],
        })
    }

    /// Emit a load of type `ty` from `addr`.
    pub fn load(&mut self, ty: Type, addr: Value) -> Value {
        self.emit_result(InstructionData::Load { ty, addr })
    }

    /// Emit a store of `value` to `addr`.
    pub fn store(&mut self, value: Value, addr: Value) -> Inst {
        self.emit(InstructionData::Store { value, addr })
    }

    /// Emit a phi with the given inputs.
    pub fn phi(&mut self, ty: Type, args: Vec<(Block, Value)>) -> Value {
        self.emit_result(InstructionData::Phi { ty, args })
    }

    /// Emit an unconditional jump.
    pub fn jump(&mut self, destination: Block) -> Inst {
        self.emit(InstructionData::Jump { destination })
    }

    /// Emit a conditional jump.
    pub fn cjump(
        &mut self,
        cond: CondCode,
        a: Value,
        b: Value,
        then_dest: Block,
        else_dest: Block,
    ) -> Inst {
        self.emit(InstructionData::CJump {
            cond,
            args: [a, b],
            then_dest,
            else_dest,
        })
    }

    /// Emit a return, with or without a value.
    pub fn ret(&mut self, arg: Option<Value>) -> Inst {
        self.emit(InstructionData::Return { arg: arg.into() })
    }

    /// Emit an undefined value of type `ty`.
    pub fn undef(&mut self, ty: Type) -> Value {
        self.emit_result(InstructionData::Undefined { ty })
    }

    /// Materialize the address of the module variable `var` in the current
    /// function.
    pub fn global(&mut self, var: Variable) -> Value {
        let name = self.module.variables[var].name.clone();
        self.func_mut().dfg.make_global(var, name)
    }
}

/// Split `block` in two before `before`.
///
/// The instructions from `before` to the end of the block move into a fresh
/// block, which keeps the original block's position in the control flow:
/// the original block is terminated with a jump to the new one, and the
/// moved instructions are re-parented. Returns the new block.
pub fn split_block(func: &mut Function, block: Block, before: Inst) -> Block {
    debug_assert_eq!(
        func.layout.inst_block(before),
        Some(block),
        "split point not in block"
    );
    let new_block = func.dfg.make_auto_block();
    func.layout.append_block(new_block);

    let mut suffix = Vec::new();
    let mut cursor = Some(before);
    while let Some(inst) = cursor {
        suffix.push(inst);
        cursor = func.layout.next_inst(inst);
    }
    for inst in &suffix {
        func.layout.remove_inst(*inst);
    }
    for inst in suffix {
        func.layout.append_inst(inst, new_block);
    }

    let jump = func.dfg.make_inst(InstructionData::Jump {
        destination: new_block,
    });
    func.layout.append_inst(jump, block);
    new_block
}
