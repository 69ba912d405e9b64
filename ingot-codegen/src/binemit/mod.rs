//! Binary machine code emission.
//!
//! The `binemit` module contains the target-independent half of turning
//! instructions into bytes: the bit-level primitives instructions encode
//! through, the relocation kinds that patch symbol-dependent bits after
//! linking, and the `CodeSink` abstraction through which encoded bytes and
//! relocations leave the code generator.

pub mod bits;
pub mod reloc;

pub use self::bits::{align_up, wrap_negative, BitView, Token};
pub use self::reloc::{CodeOffset, RelocApplyFn, RelocError, RelocKind};

use core::fmt;
use smallvec::SmallVec;
use thiserror::Error;

/// Instruction operand validation or field packing failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// An immediate operand does not fit its field.
    #[error("operand {operand} value {value} does not fit in {bits} bits")]
    OperandOutOfRange {
        /// Name of the operand.
        operand: &'static str,
        /// The value that was given.
        value: i64,
        /// Width of the encoded field.
        bits: u32,
    },
    /// An operand violates an alignment requirement.
    #[error("operand {operand} value {value} must be a multiple of {align}")]
    Misaligned {
        /// Name of the operand.
        operand: &'static str,
        /// The value that was given.
        value: i64,
        /// Required alignment.
        align: u32,
    },
    /// A register operand is not encodable in this instruction.
    #[error("register r{reg} is not encodable as operand {operand}")]
    InvalidRegister {
        /// Name of the operand.
        operand: &'static str,
        /// The register number.
        reg: u8,
    },
}

/// Abstract interface for adding bytes and relocations to a code section.
///
/// A `CodeSink` will receive all of the machine code for a section. It also
/// accepts relocations, which are locations in the section that need to be
/// fixed up when linking.
pub trait CodeSink {
    /// Get the current position.
    fn offset(&self) -> CodeOffset;

    /// Add 1 byte to the section.
    fn put1(&mut self, _: u8);

    /// Add 2 bytes to the section in little-endian order.
    fn put2(&mut self, x: u16) {
        self.put1(x as u8);
        self.put1((x >> 8) as u8);
    }

    /// Add 4 bytes to the section in little-endian order.
    fn put4(&mut self, x: u32) {
        self.put2(x as u16);
        self.put2((x >> 16) as u16);
    }

    /// Add a relocation for `symbol` of the named kind at `offset`.
    fn reloc(&mut self, symbol: &str, kind: &'static str, offset: CodeOffset);
}

/// A machine instruction that can encode itself.
///
/// Implementations declare their operands as struct fields, validate them
/// before packing any bit field, and report symbolic operands through
/// `relocations`. The `Display` implementation renders the assembler
/// syntax.
pub trait MachInst: fmt::Display {
    /// Encode this instruction to bytes.
    ///
    /// Operand validation happens first; no bytes are produced for an
    /// invalid instruction.
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError>;

    /// Relocations for symbolic operands, as `(symbol, kind name)` pairs.
    /// They are registered at the instruction's start offset.
    fn relocations(&self) -> SmallVec<[(String, &'static str); 1]> {
        SmallVec::new()
    }
}

/// Emit one instruction into `sink`: register its relocations at the
/// current offset, then append its encoding.
pub fn emit_inst(inst: &dyn MachInst, sink: &mut dyn CodeSink) -> Result<(), EncodingError> {
    let start = sink.offset();
    let bytes = inst.encode()?;
    for (symbol, kind) in inst.relocations() {
        sink.reloc(&symbol, kind, start);
    }
    for b in bytes {
        sink.put1(b);
    }
    Ok(())
}

/// A `CodeSink` that writes into a plain byte vector and collects
/// relocations, for tests and one-off encodings.
#[derive(Default)]
pub struct VecCodeSink {
    /// The bytes emitted so far.
    pub bytes: Vec<u8>,
    /// The relocations registered so far.
    pub relocs: Vec<(String, &'static str, CodeOffset)>,
}

impl CodeSink for VecCodeSink {
    fn offset(&self) -> CodeOffset {
        self.bytes.len() as CodeOffset
    }

    fn put1(&mut self, x: u8) {
        self.bytes.push(x);
    }

    fn reloc(&mut self, symbol: &str, kind: &'static str, offset: CodeOffset) {
        self.relocs.push((symbol.to_string(), kind, offset));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_defaults_are_little_endian() {
        let mut sink = VecCodeSink::default();
        sink.put2(0xbeef);
        sink.put4(0x1234_5678);
        assert_eq!(sink.bytes, [0xef, 0xbe, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(sink.offset(), 6);
    }
}
