//! Target ISA support.
//!
//! A `TargetIsa` bundles everything the target-independent layers need to
//! know about one instruction set. At this level that is deliberately
//! little: a name and the registry of relocation kinds the linker patches
//! object files with. The instruction classes themselves live in the
//! per-target submodules and reach the rest of the toolchain only through
//! the [`MachInst`](crate::binemit::MachInst) trait.
//!
//! The registries are `'static` tables built at compile time; there is no
//! way to register a kind at run time, which keeps the object-file format's
//! kind names a closed set.

pub mod riscv;
pub mod thumb;

use crate::binemit::RelocKind;
use target_lexicon::{Architecture, Triple};
use thiserror::Error;

/// The looked-up target does not exist or carries no relocation registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LookupError {
    /// There is no support for this target.
    #[error("unsupported target: {0}")]
    Unsupported(String),
}

/// Properties of a target instruction set architecture.
pub struct TargetIsa {
    name: &'static str,
    relocations: &'static [RelocKind],
}

impl TargetIsa {
    /// The name of this ISA.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// All relocation kinds of this ISA.
    pub fn relocations(&self) -> &'static [RelocKind] {
        self.relocations
    }

    /// Look up a relocation kind by its object-file name.
    pub fn reloc_by_name(&self, name: &str) -> Option<&'static RelocKind> {
        self.relocations.iter().find(|kind| kind.name == name)
    }
}

/// Look up the ISA for a target triple.
pub fn lookup(triple: &Triple) -> Result<&'static TargetIsa, LookupError> {
    match triple.architecture {
        Architecture::Arm(_) => Ok(&thumb::ISA),
        Architecture::Riscv32(_) | Architecture::Riscv64(_) => Ok(&riscv::ISA),
        _ => Err(LookupError::Unsupported(triple.to_string())),
    }
}

/// Look up an ISA by name: a bare architecture name like `"arm"` or
/// `"riscv"`, or a full target triple.
pub fn lookup_by_name(name: &str) -> Result<&'static TargetIsa, LookupError> {
    match name {
        "arm" | "thumb" => Ok(&thumb::ISA),
        "riscv" | "riscv32" => Ok(&riscv::ISA),
        _ => {
            let triple: Triple = name
                .parse()
                .map_err(|_| LookupError::Unsupported(name.to_string()))?;
            lookup(&triple)
        }
    }
}
