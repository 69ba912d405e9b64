//! Instruction data and opcodes.
//!
//! Instructions are a tagged sum type so that passes can dispatch with an
//! exhaustive `match` instead of virtual calls. The variants deliberately
//! stay small: operands are entity references, and the only heap allocation
//! is the phi input list.

use crate::ir::condcodes::CondCode;
use crate::ir::entities::{Block, Value};
use crate::ir::types::Type;
use core::fmt;
use ingot_entity::packed_option::PackedOption;
use smallvec::SmallVec;

/// Integer binary operations.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
        })
    }
}

/// An instruction opcode, used for diagnostics and coarse dispatch.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    /// Produce an integer constant.
    Const,
    /// Integer binary operation.
    Binop,
    /// Load from memory.
    Load,
    /// Store to memory.
    Store,
    /// SSA join.
    Phi,
    /// Unconditional jump.
    Jump,
    /// Conditional jump.
    CJump,
    /// Return from the function.
    Return,
    /// Produce an undefined value.
    Undefined,
    /// End the function without producing a value.
    Exit,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Self::Const => "const",
            Self::Binop => "binop",
            Self::Load => "load",
            Self::Store => "store",
            Self::Phi => "phi",
            Self::Jump => "jmp",
            Self::CJump => "cjmp",
            Self::Return => "return",
            Self::Undefined => "undefined",
            Self::Exit => "exit",
        })
    }
}

/// Contents of an instruction.
#[derive(Clone, PartialEq, Debug)]
pub enum InstructionData {
    /// An integer constant of the given type.
    Const {
        /// Result type.
        ty: Type,
        /// The constant.
        imm: i64,
    },
    /// A binary operation. Both operands and the result share `ty`.
    Binop {
        /// The operation.
        op: BinaryOp,
        /// Operand and result type.
        ty: Type,
        /// Left and right operands.
        args: [Value; 2],
    },
    /// Load a value of type `ty` from the address `addr`, which must be of
    /// pointer type.
    Load {
        /// Loaded type.
        ty: Type,
        /// Address operand.
        addr: Value,
    },
    /// Store `value` to the address `addr`, which must be of pointer type.
    Store {
        /// Stored value.
        value: Value,
        /// Address operand.
        addr: Value,
    },
    /// SSA join: select one input value depending on the predecessor block
    /// control arrived from. The input list carries one entry per
    /// predecessor.
    Phi {
        /// Result type; every input must have it too.
        ty: Type,
        /// `(predecessor, value)` inputs in insertion order.
        args: Vec<(Block, Value)>,
    },
    /// Unconditional jump. Terminator.
    Jump {
        /// Target block.
        destination: Block,
    },
    /// Compare two operands of equal type and jump to one of two targets.
    /// Terminator.
    CJump {
        /// Comparison to apply.
        cond: CondCode,
        /// Left and right operands.
        args: [Value; 2],
        /// Target when the comparison holds.
        then_dest: Block,
        /// Target when it does not.
        else_dest: Block,
    },
    /// Return from the function, optionally with a value. Terminator.
    Return {
        /// Returned value, if any.
        arg: PackedOption<Value>,
    },
    /// Produce a value that may not be used; the verifier rejects any use.
    Undefined {
        /// Claimed type.
        ty: Type,
    },
    /// End the function without returning a value. Terminator.
    Exit,
}

impl InstructionData {
    /// The opcode of this instruction.
    pub fn opcode(&self) -> Opcode {
        match *self {
            Self::Const { .. } => Opcode::Const,
            Self::Binop { .. } => Opcode::Binop,
            Self::Load { .. } => Opcode::Load,
            Self::Store { .. } => Opcode::Store,
            Self::Phi { .. } => Opcode::Phi,
            Self::Jump { .. } => Opcode::Jump,
            Self::CJump { .. } => Opcode::CJump,
            Self::Return { .. } => Opcode::Return,
            Self::Undefined { .. } => Opcode::Undefined,
            Self::Exit => Opcode::Exit,
        }
    }

    /// Does this instruction end its block?
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. } | Self::CJump { .. } | Self::Return { .. } | Self::Exit
        )
    }

    /// Is this a phi?
    pub fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    /// The type of the value this instruction produces, if it produces one.
    pub fn result_type(&self) -> Option<Type> {
        match *self {
            Self::Const { ty, .. }
            | Self::Binop { ty, .. }
            | Self::Load { ty, .. }
            | Self::Phi { ty, .. }
            | Self::Undefined { ty } => Some(ty),
            _ => None,
        }
    }

    /// All value operands of this instruction, in a fixed order. Phi inputs
    /// appear in their insertion order.
    pub fn arguments(&self) -> SmallVec<[Value; 3]> {
        match self {
            Self::Const { .. } | Self::Jump { .. } | Self::Undefined { .. } | Self::Exit => {
                SmallVec::new()
            }
            Self::Binop { args, .. } | Self::CJump { args, .. } => SmallVec::from_slice(args),
            Self::Load { addr, .. } => smallvec::smallvec![*addr],
            Self::Store { value, addr } => smallvec::smallvec![*value, *addr],
            Self::Phi { args, .. } => args.iter().map(|(_, v)| *v).collect(),
            Self::Return { arg } => arg.expand().into_iter().collect(),
        }
    }

    /// Blocks this instruction can transfer control to. Empty for
    /// non-branching instructions.
    pub fn branch_targets(&self) -> SmallVec<[Block; 2]> {
        match *self {
            Self::Jump { destination } => smallvec::smallvec![destination],
            Self::CJump {
                then_dest,
                else_dest,
                ..
            } => smallvec::smallvec![then_dest, else_dest],
            _ => SmallVec::new(),
        }
    }

    /// Rewrite every branch target equal to `old` into `new`.
    ///
    /// Panics if this is not a branching instruction; retargeting anything
    /// else is a pass bug.
    pub fn change_target(&mut self, old: Block, new: Block) {
        match self {
            Self::Jump { destination } => {
                if *destination == old {
                    *destination = new;
                }
            }
            Self::CJump {
                then_dest,
                else_dest,
                ..
            } => {
                if *then_dest == old {
                    *then_dest = new;
                }
                if *else_dest == old {
                    *else_dest = new;
                }
            }
            _ => panic!("change_target on non-branch {}", self.opcode()),
        }
    }

    /// For a phi, the input value selected when control arrives from
    /// `pred`.
    pub fn phi_value_for(&self, pred: Block) -> Option<Value> {
        match self {
            Self::Phi { args, .. } => args.iter().find(|(b, _)| *b == pred).map(|(_, v)| *v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::I32;
    use ingot_entity::EntityRef;

    #[test]
    fn terminators() {
        let jump = InstructionData::Jump {
            destination: Block::new(0),
        };
        assert!(jump.is_terminator());
        assert!(jump.result_type().is_none());
        assert_eq!(jump.branch_targets().as_slice(), &[Block::new(0)]);

        let konst = InstructionData::Const { ty: I32, imm: 7 };
        assert!(!konst.is_terminator());
        assert_eq!(konst.result_type(), Some(I32));
    }

    #[test]
    fn retarget_cjump() {
        let b0 = Block::new(0);
        let b1 = Block::new(1);
        let b2 = Block::new(2);
        let mut br = InstructionData::CJump {
            cond: CondCode::Equal,
            args: [Value::new(0), Value::new(1)],
            then_dest: b0,
            else_dest: b1,
        };
        br.change_target(b1, b2);
        assert_eq!(br.branch_targets().as_slice(), &[b0, b2]);
    }

    #[test]
    fn phi_lookup() {
        let b0 = Block::new(0);
        let b1 = Block::new(1);
        let phi = InstructionData::Phi {
            ty: I32,
            args: vec![(b0, Value::new(4)), (b1, Value::new(5))],
        };
        assert_eq!(phi.phi_value_for(b1), Some(Value::new(5)));
        assert_eq!(phi.phi_value_for(Block::new(9)), None);
        assert_eq!(phi.arguments().len(), 2);
    }
}
