//! Assembling encoded instructions into an object file.

use crate::objectfile::ObjectFile;
use ingot_codegen::binemit::{CodeOffset, CodeSink};

/// A `CodeSink` that appends into one section of an [`ObjectFile`] and
/// registers the relocations instructions request.
///
/// This is the seam between the encoding framework and the object model:
/// back-ends encode through
/// [`emit_inst`](ingot_codegen::binemit::emit_inst) with a `SectionSink`
/// for the section they are filling, and the resulting object file is
/// ready for the linker.
pub struct SectionSink<'a> {
    object: &'a mut ObjectFile,
    section: String,
}

impl<'a> SectionSink<'a> {
    /// Create a sink appending to `section` of `object`, creating the
    /// section if needed.
    pub fn new(object: &'a mut ObjectFile, section: &str) -> Self {
        object.get_section(section);
        Self {
            object,
            section: section.to_string(),
        }
    }

    /// Define `name` at the current offset.
    pub fn define_symbol(&mut self, name: &str) -> Result<(), crate::objectfile::ObjectError> {
        let offset = u64::from(self.offset());
        self.object.add_symbol(name, offset, &self.section)
    }
}

impl CodeSink for SectionSink<'_> {
    fn offset(&self) -> CodeOffset {
        self.object
            .section(&self.section)
            .map(|s| s.size() as CodeOffset)
            .unwrap_or(0)
    }

    fn put1(&mut self, x: u8) {
        self.object.get_section(&self.section).add_data(&[x]);
    }

    fn reloc(&mut self, symbol: &str, kind: &'static str, offset: CodeOffset) {
        self.object
            .add_relocation(symbol, u64::from(offset), kind, &self.section);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_codegen::binemit::emit_inst;
    use ingot_codegen::isa::thumb::instructions::{Bl, Mov};
    use ingot_codegen::isa::thumb::R0;

    #[test]
    fn assembles_into_section() {
        let mut obj = ObjectFile::new();
        {
            let mut sink = SectionSink::new(&mut obj, ".text");
            sink.define_symbol("start").unwrap();
            emit_inst(&Mov { rd: R0, imm: 7 }, &mut sink).unwrap();
            emit_inst(
                &Bl {
                    target: "callee".into(),
                },
                &mut sink,
            )
            .unwrap();
        }
        assert_eq!(obj.section(".text").unwrap().data(), &[0x07, 0x20, 0x00, 0xf0, 0x00, 0xf8]);
        assert_eq!(obj.symbols().len(), 1);
        let reloc = &obj.relocations()[0];
        assert_eq!(
            (reloc.symbol.as_str(), reloc.kind.as_str(), reloc.offset),
            ("callee", "bl_imm11_imm10", 2)
        );
    }
}
