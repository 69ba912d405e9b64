//! Converting IR to text.
//!
//! The `write` module provides the debugging form of modules and functions:
//! `module <name>` followed by function definitions, blocks indented one
//! level, instructions indented two, with two spaces per level.

use crate::ir::dfg::DataFlowGraph;
use crate::ir::function::{Function, Param};
use crate::ir::instructions::InstructionData;
use crate::ir::module::Module;
use crate::ir::Block;
use core::fmt::{self, Write};

/// Write `module` to `w` in the textual form.
pub fn write_module(w: &mut dyn Write, module: &Module) -> fmt::Result {
    writeln!(w, "module {}", module.name)?;
    for data in module.variables.values() {
        writeln!(w)?;
        writeln!(w, "variable {} {}", data.name, data.size)?;
    }
    for func in module.functions.values() {
        writeln!(w)?;
        write_function(w, func)?;
    }
    Ok(())
}

/// Write `func` to `w` in the textual form.
pub fn write_function(w: &mut dyn Write, func: &Function) -> fmt::Result {
    match func.signature.ret {
        Some(ty) => write!(w, "function {} {}(", ty, func.name)?,
        None => write!(w, "function void {}(", func.name)?,
    }
    for (i, param) in func.signature.params.iter().enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        write!(w, "{} {}", param.ty, param.name)?;
    }
    writeln!(w, ")")?;
    for block in func.layout.blocks() {
        write_block(w, func, block)?;
    }
    Ok(())
}

fn write_block(w: &mut dyn Write, func: &Function, block: Block) -> fmt::Result {
    writeln!(w, "  {}:", func.dfg.block_name(block))?;
    for inst in func.layout.block_insts(block) {
        writeln!(
            w,
            "    {}",
            display_inst(&func.dfg, &func.signature.params, inst)
        )?;
    }
    Ok(())
}

/// Render one instruction the way it appears inside a block.
pub fn display_inst(dfg: &DataFlowGraph, params: &[Param], inst: crate::ir::Inst) -> String {
    let val = |v| dfg.display_value(v, params);
    let block_name = |b| dfg.block_name(b).to_string();
    let result = dfg
        .inst_result(inst)
        .map(|r| r.to_string())
        .unwrap_or_default();
    match &dfg[inst] {
        InstructionData::Const { ty, imm } => format!("{ty} {result} = {imm}"),
        InstructionData::Binop { op, ty, args } => {
            format!("{ty} {result} = {} {op} {}", val(args[0]), val(args[1]))
        }
        InstructionData::Load { ty, addr } => format!("{ty} {result} = load {}", val(*addr)),
        InstructionData::Store { value, addr } => {
            format!("store {}, {}", val(*value), val(*addr))
        }
        InstructionData::Phi { ty, args } => {
            let mut s = format!("{ty} {result} = phi [");
            for (i, (block, value)) in args.iter().enumerate() {
                if i != 0 {
                    s.push_str(", ");
                }
                s.push_str(&format!("{}: {}", block_name(*block), val(*value)));
            }
            s.push(']');
            s
        }
        InstructionData::Jump { destination } => format!("jmp {}", block_name(*destination)),
        InstructionData::CJump {
            cond,
            args,
            then_dest,
            else_dest,
        } => format!(
            "cjmp {} {cond} {} {} {}",
            val(args[0]),
            val(args[1]),
            block_name(*then_dest),
            block_name(*else_dest)
        ),
        InstructionData::Return { arg } => match arg.expand() {
            Some(v) => format!("return {}", val(v)),
            None => "return".to_string(),
        },
        InstructionData::Undefined { ty } => format!("{ty} {result} = undefined"),
        InstructionData::Exit => "exit".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::builder::Builder;
    use crate::ir::instructions::BinaryOp;
    use crate::ir::types::I32;
    use crate::ir::{InstructionData, Module, Signature};

    #[test]
    fn basic_function() {
        let mut module = Module::new("m");
        let mut sig = Signature::returning(I32);
        sig.add_param("a", I32);
        sig.add_param("b", I32);

        let mut b = Builder::new(&mut module);
        let func = b.new_function("add", sig);
        let a = b.func().param_value(0);
        let bb = b.func().param_value(1);
        let entry = b.new_named_block("entry");
        b.set_block(entry);
        let sum = b.binop(BinaryOp::Add, I32, a, bb);
        b.emit(InstructionData::Return { arg: sum.into() });

        let text = module.functions[func].to_string();
        assert_eq!(
            text,
            "function i32 add(i32 a, i32 b)\n  entry:\n    i32 v2 = a + b\n    return v2\n"
        );
    }

    #[test]
    fn module_header() {
        let mut module = Module::new("demo");
        module.declare_variable("counter", 4);
        let text = module.to_string();
        assert_eq!(text, "module demo\n\nvariable counter 4\n");
    }
}
