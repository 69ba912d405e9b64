//! Thumb instruction classes.
//!
//! This is not a catalogue of the thumb instruction set; it is the set of
//! forms the back-end emits, each one an exercise of the encoding
//! framework: operand validation, token field packing, and relocation
//! emission for symbolic operands.

use super::{Reg, ThumbToken};
use crate::binemit::{EncodingError, MachInst};
use core::fmt;
use smallvec::SmallVec;

fn check_low(operand: &'static str, reg: Reg) -> Result<(), EncodingError> {
    if reg.is_low() {
        Ok(())
    } else {
        Err(EncodingError::InvalidRegister {
            operand,
            reg: reg.num(),
        })
    }
}

/// Condition field of the conditional branch forms.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cond {
    /// Equal.
    Eq = 0b0000,
    /// Not equal.
    Ne = 0b0001,
    /// Signed greater than or equal.
    Ge = 0b1010,
    /// Signed less than.
    Lt = 0b1011,
    /// Signed greater than.
    Gt = 0b1100,
    /// Signed less than or equal.
    Le = 0b1101,
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
        })
    }
}

/// `b <label>`: unconditional branch, patched via `wrap_new11`.
pub struct B {
    /// Branch target symbol.
    pub target: String,
}

impl MachInst for B {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        let mut tok = ThumbToken::new();
        tok.set_bits(11, 16, 0b11100);
        Ok(tok.encode())
    }

    fn relocations(&self) -> SmallVec<[(String, &'static str); 1]> {
        smallvec::smallvec![(self.target.clone(), "wrap_new11")]
    }
}

impl fmt::Display for B {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "b {}", self.target)
    }
}

/// `b<cond> <label>`: conditional branch, patched via `rel8`.
pub struct Bcc {
    /// Branch condition.
    pub cond: Cond,
    /// Branch target symbol.
    pub target: String,
}

impl MachInst for Bcc {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        let mut tok = ThumbToken::new();
        tok.set_bits(8, 12, self.cond as u32);
        tok.set_bits(12, 16, 0b1101);
        Ok(tok.encode())
    }

    fn relocations(&self) -> SmallVec<[(String, &'static str); 1]> {
        smallvec::smallvec![(self.target.clone(), "rel8")]
    }
}

impl fmt::Display for Bcc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "b{} {}", self.cond, self.target)
    }
}

/// `bl <label>`: branch with link, two tokens, patched via
/// `bl_imm11_imm10`.
pub struct Bl {
    /// Call target symbol.
    pub target: String,
}

impl MachInst for Bl {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        let mut first = ThumbToken::new();
        first.set_bits(11, 16, 0b11110);
        let mut second = ThumbToken::new();
        second.set_bit(11, true);
        second.set_bit(12, true);
        second.set_bit(13, true);
        second.set_bit(14, true);
        second.set_bit(15, true);
        let mut bytes = first.encode();
        bytes.extend_from_slice(&second.encode());
        Ok(bytes)
    }

    fn relocations(&self) -> SmallVec<[(String, &'static str); 1]> {
        smallvec::smallvec![(self.target.clone(), "bl_imm11_imm10")]
    }
}

impl fmt::Display for Bl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bl {}", self.target)
    }
}

/// `movs <rd>, #<imm8>`: move immediate.
pub struct Mov {
    /// Destination register.
    pub rd: Reg,
    /// Immediate value.
    pub imm: u32,
}

impl MachInst for Mov {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        check_low("rd", self.rd)?;
        if self.imm > 0xff {
            return Err(EncodingError::OperandOutOfRange {
                operand: "imm",
                value: i64::from(self.imm),
                bits: 8,
            });
        }
        let mut tok = ThumbToken::new();
        tok.set_bits(0, 8, self.imm);
        tok.set_bits(8, 11, u32::from(self.rd.num()));
        tok.set_bits(11, 16, 0b00100);
        Ok(tok.encode())
    }
}

impl fmt::Display for Mov {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "movs {}, #{}", self.rd, self.imm)
    }
}

/// `adds <rd>, <rn>, <rm>` / `subs <rd>, <rn>, <rm>`: three-register
/// arithmetic.
pub struct AddSub3 {
    /// Destination register.
    pub rd: Reg,
    /// First operand.
    pub rn: Reg,
    /// Second operand.
    pub rm: Reg,
    /// True for subtraction.
    pub subtract: bool,
}

impl MachInst for AddSub3 {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        check_low("rd", self.rd)?;
        check_low("rn", self.rn)?;
        check_low("rm", self.rm)?;
        let mut tok = ThumbToken::new();
        tok.set_rd(u32::from(self.rd.num()));
        tok.set_bits(3, 6, u32::from(self.rn.num()));
        tok.set_bits(6, 9, u32::from(self.rm.num()));
        tok.set_bits(9, 16, if self.subtract { 0b0001101 } else { 0b0001100 });
        Ok(tok.encode())
    }
}

impl fmt::Display for AddSub3 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mnemonic = if self.subtract { "subs" } else { "adds" };
        write!(f, "{mnemonic} {}, {}, {}", self.rd, self.rn, self.rm)
    }
}

/// `muls <rdm>, <rn>, <rdm>`: multiply.
///
/// The destination doubles as the second factor. `rdm` lives in bits
/// `[0, 3)` and `rn` in bits `[3, 6)`.
pub struct Mul {
    /// Destination register, also the second factor.
    pub rdm: Reg,
    /// First factor.
    pub rn: Reg,
}

impl MachInst for Mul {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        check_low("rdm", self.rdm)?;
        check_low("rn", self.rn)?;
        let mut tok = ThumbToken::new();
        tok.set_rd(u32::from(self.rdm.num()));
        tok.set_bits(3, 6, u32::from(self.rn.num()));
        tok.set_bits(6, 16, 0b0100001101);
        Ok(tok.encode())
    }
}

impl fmt::Display for Mul {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "muls {}, {}", self.rdm, self.rn)
    }
}

/// `ldr <rt>, <label>`: load a word from a PC-relative literal, patched
/// via `lit_add_8`.
pub struct LdrPc {
    /// Destination register.
    pub rt: Reg,
    /// Literal symbol.
    pub label: String,
}

impl MachInst for LdrPc {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        check_low("rt", self.rt)?;
        let mut tok = ThumbToken::new();
        tok.set_bits(8, 11, u32::from(self.rt.num()));
        tok.set_bits(11, 16, 0b01001);
        Ok(tok.encode())
    }

    fn relocations(&self) -> SmallVec<[(String, &'static str); 1]> {
        smallvec::smallvec![(self.label.clone(), "lit_add_8")]
    }
}

impl fmt::Display for LdrPc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ldr {}, {}", self.rt, self.label)
    }
}

/// `dcd`: emit a literal data word, absolute-relocated when symbolic.
pub enum Dcd {
    /// A literal word.
    Imm(u32),
    /// The address of a symbol, filled in by the linker via `abs32`.
    Sym(String),
}

impl MachInst for Dcd {
    fn encode(&self) -> Result<SmallVec<[u8; 4]>, EncodingError> {
        let word = match self {
            Self::Imm(v) => *v,
            Self::Sym(_) => 0,
        };
        Ok(SmallVec::from_slice(&word.to_le_bytes()))
    }

    fn relocations(&self) -> SmallVec<[(String, &'static str); 1]> {
        match self {
            Self::Imm(_) => SmallVec::new(),
            Self::Sym(symbol) => smallvec::smallvec![(symbol.clone(), "abs32")],
        }
    }
}

impl fmt::Display for Dcd {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Imm(v) => write!(f, "dcd {v}"),
            Self::Sym(symbol) => write!(f, "dcd ={symbol}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binemit::{emit_inst, VecCodeSink};
    use crate::isa::thumb::{R0, R1, R2};

    #[test]
    fn reference_encodings() {
        // Encodings checked against the ARMv7-M reference manual.
        let cases: Vec<(Box<dyn MachInst>, &[u8])> = vec![
            (
                Box::new(Mov { rd: R0, imm: 5 }),
                &[0x05, 0x20], // movs r0, #5
            ),
            (
                Box::new(AddSub3 {
                    rd: R2,
                    rn: R0,
                    rm: R1,
                    subtract: false,
                }),
                &[0x42, 0x18], // adds r2, r0, r1
            ),
            (
                Box::new(AddSub3 {
                    rd: R2,
                    rn: R0,
                    rm: R1,
                    subtract: true,
                }),
                &[0x42, 0x1a], // subs r2, r0, r1
            ),
            (
                Box::new(B {
                    target: "x".into(),
                }),
                &[0x00, 0xe0],
            ),
            (
                Box::new(Bcc {
                    cond: Cond::Eq,
                    target: "x".into(),
                }),
                &[0x00, 0xd0],
            ),
            (
                Box::new(Bcc {
                    cond: Cond::Ne,
                    target: "x".into(),
                }),
                &[0x00, 0xd1],
            ),
            (
                Box::new(Bl {
                    target: "x".into(),
                }),
                &[0x00, 0xf0, 0x00, 0xf8],
            ),
            (
                Box::new(LdrPc {
                    rt: R1,
                    label: "lit".into(),
                }),
                &[0x00, 0x49], // ldr r1, <literal>
            ),
            (Box::new(Dcd::Imm(0xdeadbeef)), &[0xef, 0xbe, 0xad, 0xde]),
        ];
        for (inst, expected) in cases {
            assert_eq!(
                inst.encode().unwrap().as_slice(),
                expected,
                "encoding of `{inst}`"
            );
        }
    }

    #[test]
    fn mul_operand_order() {
        // muls r0, r1, r0: rdm = r0 in bits [0, 3), rn = r1 in bits
        // [3, 6). Reference encoding 0x4348.
        let inst = Mul { rdm: R0, rn: R1 };
        assert_eq!(inst.encode().unwrap().as_slice(), &[0x48, 0x43]);

        // And the swapped order: muls r1, r0, r1 is 0x4341.
        let inst = Mul { rdm: R1, rn: R0 };
        assert_eq!(inst.encode().unwrap().as_slice(), &[0x41, 0x43]);
    }

    #[test]
    fn validation_precedes_encoding() {
        let err = Mov { rd: R0, imm: 300 }.encode().unwrap_err();
        assert_eq!(
            err,
            EncodingError::OperandOutOfRange {
                operand: "imm",
                value: 300,
                bits: 8
            }
        );

        let err = Mul {
            rdm: Reg::new(8),
            rn: R0,
        }
        .encode()
        .unwrap_err();
        assert_eq!(
            err,
            EncodingError::InvalidRegister {
                operand: "rdm",
                reg: 8
            }
        );
    }

    #[test]
    fn emitting_registers_relocs_at_start_offset() {
        let mut sink = VecCodeSink::default();
        emit_inst(
            &Mov { rd: R0, imm: 1 },
            &mut sink,
        )
        .unwrap();
        emit_inst(
            &Bl {
                target: "callee".into(),
            },
            &mut sink,
        )
        .unwrap();
        assert_eq!(sink.bytes.len(), 6);
        assert_eq!(sink.relocs, vec![("callee".to_string(), "bl_imm11_imm10", 2)]);
    }

    #[test]
    fn syntax() {
        assert_eq!(Mov { rd: R0, imm: 5 }.to_string(), "movs r0, #5");
        assert_eq!(
            Bcc {
                cond: Cond::Le,
                target: "end".into()
            }
            .to_string(),
            "ble end"
        );
        assert_eq!(Dcd::Sym("a".into()).to_string(), "dcd =a");
    }
}
