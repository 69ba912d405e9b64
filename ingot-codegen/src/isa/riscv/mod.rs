//! RISC-V target support.
//!
//! Only the relocation registry lives here for now; RISC-V instruction
//! classes plug into the same encoding framework the thumb target uses.

pub mod relocations;

use crate::isa::TargetIsa;

/// The riscv ISA definition.
pub static ISA: TargetIsa = TargetIsa {
    name: "riscv",
    relocations: relocations::RELOCATIONS,
};
