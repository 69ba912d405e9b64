//! Representation of ingot IR.
//!
//! The IR is a typed SSA graph: a [`Module`] owns global variables and
//! [`Function`]s; a function owns its blocks and instructions through the
//! [`DataFlowGraph`] and orders them with the [`Layout`]; every instruction
//! result and parameter is a [`Value`] with a tracked set of uses.

pub mod builder;
pub mod condcodes;
pub mod dfg;
pub mod entities;
pub mod function;
pub mod instructions;
pub mod layout;
pub mod module;
pub mod sourceloc;
pub mod types;
pub mod write;

pub use self::builder::{split_block, Builder};
pub use self::condcodes::CondCode;
pub use self::dfg::{DataFlowGraph, ValueDef};
pub use self::entities::{AnyEntity, Block, FuncRef, Inst, Value, Variable};
pub use self::function::{Function, Param, Signature};
pub use self::instructions::{BinaryOp, InstructionData, Opcode};
pub use self::layout::{Layout, ProgramPoint};
pub use self::module::{Module, VariableData};
pub use self::sourceloc::SourceLoc;
pub use self::types::Type;
