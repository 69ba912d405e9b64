//! Data flow graph tracking instructions, values, and blocks.

use crate::ir::entities::{Block, Inst, Value, Variable};
use crate::ir::instructions::InstructionData;
use crate::ir::types::{Type, PTR};
use core::ops::Index;
use ingot_entity::{PackedOption, PrimaryMap, SecondaryMap};

/// Contents of a basic block, apart from the instructions it holds (those
/// are ordered by the function's `Layout`).
#[derive(Clone, Debug)]
pub struct BlockData {
    /// Block name, unique within the function.
    pub name: String,
}

/// Where a value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    /// Result of an instruction.
    Inst(Inst),
    /// Function parameter with the given index.
    Param(usize),
    /// Address of a module-level variable.
    Global(Variable),
}

/// Internal table entry for a value.
#[derive(Clone, Debug)]
enum ValueData {
    Inst { ty: Type, inst: Inst },
    Param { ty: Type, num: u32 },
    Global { var: Variable, name: String },
}

/// A data flow graph defines all instructions and values in a function as
/// well as their defining points and uses.
///
/// The layout of blocks and of the instructions within them is kept
/// separately in the function's `Layout`, so the graph itself is pure
/// def-use information: everything is stored in arenas owned here and
/// referenced by index, which keeps references stable under mutation and
/// avoids ownership cycles between defs and use lists.
#[derive(Clone, Debug, Default)]
pub struct DataFlowGraph {
    /// Data about all of the instructions in the function.
    insts: PrimaryMap<Inst, InstructionData>,

    /// Result value of each instruction, if it has one.
    results: SecondaryMap<Inst, PackedOption<Value>>,

    /// Definition site and type of each value.
    values: PrimaryMap<Value, ValueData>,

    /// Instructions using each value, in creation order. Kept exact: an
    /// instruction appears once per operand slot referencing the value.
    uses: SecondaryMap<Value, Vec<Inst>>,

    /// Basic blocks. Order lives in the layout.
    blocks: PrimaryMap<Block, BlockData>,

    /// Counter backing auto-generated block names.
    next_block_name: u32,
}

impl DataFlowGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions created.
    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    /// Number of values created.
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// Number of blocks created.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Create a new basic block with the given name.
    ///
    /// Name uniqueness is the caller's responsibility; the verifier reports
    /// collisions.
    pub fn make_block(&mut self, name: impl Into<String>) -> Block {
        self.blocks.push(BlockData { name: name.into() })
    }

    /// Create a new basic block with a fresh auto-generated name.
    pub fn make_auto_block(&mut self) -> Block {
        let name = format!("block{}", self.next_block_name);
        self.next_block_name += 1;
        self.make_block(name)
    }

    /// The name of `block`.
    pub fn block_name(&self, block: Block) -> &str {
        &self.blocks[block].name
    }

    /// Iterate over all blocks in creation order.
    pub fn blocks(&self) -> ingot_entity::Keys<Block> {
        self.blocks.keys()
    }

    /// Create an instruction from `data`, recording its operand uses and
    /// allocating a result value if the instruction produces one.
    pub fn make_inst(&mut self, data: InstructionData) -> Inst {
        let inst = self.insts.next_key();
        for arg in data.arguments() {
            debug_assert!(self.values.is_valid(arg), "operand of {} not defined", inst);
            self.uses[arg].push(inst);
        }
        let result_ty = data.result_type();
        let inst = self.insts.push(data);
        if let Some(ty) = result_ty {
            let value = self.values.push(ValueData::Inst { ty, inst });
            self.results[inst] = value.into();
        }
        inst
    }

    /// The result value of `inst`, if it produces one.
    pub fn inst_result(&self, inst: Inst) -> Option<Value> {
        self.results[inst].expand()
    }

    /// Mutable access to the contents of `inst`.
    ///
    /// Use [`DataFlowGraph::change_branch_target`] or
    /// [`DataFlowGraph::replace_inst_args`] instead when rewriting operands
    /// so use lists stay exact; this accessor is for in-place edits that
    /// leave operands alone.
    pub fn inst_data_mut(&mut self, inst: Inst) -> &mut InstructionData {
        &mut self.insts[inst]
    }

    /// Rewrite the branch targets of `inst` from `old` to `new`.
    ///
    /// This only edits the instruction; callers own the control-flow caches
    /// and must recompute them.
    pub fn change_branch_target(&mut self, inst: Inst, old: Block, new: Block) {
        self.insts[inst].change_target(old, new);
    }

    /// Replace the operands of `inst` with a rewritten copy of its data,
    /// updating use lists on both sides.
    pub fn replace_inst_args(&mut self, inst: Inst, data: InstructionData) {
        debug_assert_eq!(self.insts[inst].opcode(), data.opcode());
        for arg in self.insts[inst].arguments() {
            let list = &mut self.uses[arg];
            if let Some(pos) = list.iter().position(|&i| i == inst) {
                list.swap_remove(pos);
            }
        }
        for arg in data.arguments() {
            self.uses[arg].push(inst);
        }
        self.insts[inst] = data;
    }

    /// Create a parameter value of type `ty` at position `num`.
    pub fn make_param(&mut self, ty: Type, num: usize) -> Value {
        self.values.push(ValueData::Param {
            ty,
            num: num as u32,
        })
    }

    /// Create a value holding the address of the module-level variable
    /// `var`. Its type is `ptr`. The variable's name is recorded so the
    /// textual IR can print it without a module in hand.
    pub fn make_global(&mut self, var: Variable, name: impl Into<String>) -> Value {
        self.values.push(ValueData::Global {
            var,
            name: name.into(),
        })
    }

    /// The name a value goes by in the textual IR: the parameter or
    /// variable name where one exists, the `vNN` entity name otherwise.
    pub fn display_value(&self, value: Value, params: &[crate::ir::function::Param]) -> String {
        match &self.values[value] {
            ValueData::Param { num, .. } => params
                .get(*num as usize)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| value.to_string()),
            ValueData::Global { name, .. } => name.clone(),
            ValueData::Inst { .. } => value.to_string(),
        }
    }

    /// The type of `value`.
    pub fn value_type(&self, value: Value) -> Type {
        match self.values[value] {
            ValueData::Inst { ty, .. } | ValueData::Param { ty, .. } => ty,
            ValueData::Global { .. } => PTR,
        }
    }

    /// Where `value` is defined.
    pub fn value_def(&self, value: Value) -> ValueDef {
        match self.values[value] {
            ValueData::Inst { inst, .. } => ValueDef::Inst(inst),
            ValueData::Param { num, .. } => ValueDef::Param(num as usize),
            ValueData::Global { var, .. } => ValueDef::Global(var),
        }
    }

    /// The instructions currently using `value`.
    pub fn value_uses(&self, value: Value) -> &[Inst] {
        &self.uses[value]
    }

    /// Check that `value` is a key allocated by this graph.
    pub fn value_is_valid(&self, value: Value) -> bool {
        self.values.is_valid(value)
    }

    /// Iterate over all instructions in creation order.
    pub fn insts(&self) -> ingot_entity::Keys<Inst> {
        self.insts.keys()
    }
}

/// Allow immutable access to instructions via indexing: `dfg[inst]`.
impl Index<Inst> for DataFlowGraph {
    type Output = InstructionData;

    fn index(&self, inst: Inst) -> &InstructionData {
        &self.insts[inst]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instructions::BinaryOp;
    use crate::ir::types::I32;

    #[test]
    fn results_and_uses() {
        let mut dfg = DataFlowGraph::new();
        let c = dfg.make_inst(InstructionData::Const { ty: I32, imm: 3 });
        let cv = dfg.inst_result(c).unwrap();
        assert_eq!(dfg.value_type(cv), I32);
        assert_eq!(dfg.value_def(cv), ValueDef::Inst(c));

        let add = dfg.make_inst(InstructionData::Binop {
            op: BinaryOp::Add,
            ty: I32,
            args: [cv, cv],
        });
        assert_eq!(dfg.value_uses(cv), &[add, add]);
        assert!(dfg.inst_result(add).is_some());
    }

    #[test]
    fn params_and_globals() {
        let mut dfg = DataFlowGraph::new();
        let p = dfg.make_param(I32, 0);
        assert_eq!(dfg.value_def(p), ValueDef::Param(0));

        let var = Variable::from_u32(0);
        let g = dfg.make_global(var, "data");
        assert_eq!(dfg.value_type(g), PTR);
        assert_eq!(dfg.value_def(g), ValueDef::Global(var));
        assert_eq!(dfg.display_value(g, &[]), "data");
    }

    #[test]
    fn rewriting_args_keeps_use_lists_exact() {
        let mut dfg = DataFlowGraph::new();
        let a = dfg.make_inst(InstructionData::Const { ty: I32, imm: 1 });
        let b = dfg.make_inst(InstructionData::Const { ty: I32, imm: 2 });
        let av = dfg.inst_result(a).unwrap();
        let bv = dfg.inst_result(b).unwrap();

        let add = dfg.make_inst(InstructionData::Binop {
            op: BinaryOp::Add,
            ty: I32,
            args: [av, av],
        });
        dfg.replace_inst_args(
            add,
            InstructionData::Binop {
                op: BinaryOp::Add,
                ty: I32,
                args: [av, bv],
            },
        );
        assert_eq!(dfg.value_uses(av), &[add]);
        assert_eq!(dfg.value_uses(bv), &[add]);
    }

    #[test]
    fn auto_block_names() {
        let mut dfg = DataFlowGraph::new();
        let b0 = dfg.make_auto_block();
        let b1 = dfg.make_auto_block();
        assert_eq!(dfg.block_name(b0), "block0");
        assert_eq!(dfg.block_name(b1), "block1");
    }
}
