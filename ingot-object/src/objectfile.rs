//! The relocatable object file model.
//!
//! An object file is the unit the assembler produces and the linker
//! consumes: named sections of bytes, symbols naming offsets inside
//! sections, and relocations recording the byte ranges that still depend
//! on unresolved symbol addresses.
//!
//! Equality is deep and shaped like the meaning of the file: section data
//! compares in order, while the symbol and relocation tables compare as
//! sets. The textual serialization round-trips through that equality.

use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building or reading an object file.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// A symbol was defined twice in one file.
    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
    /// The textual form was not valid JSON.
    #[error("malformed object file: {0}")]
    Json(#[from] serde_json::Error),
    /// A section's `data` field was not valid hex.
    #[error("section {0} has malformed hex data")]
    BadHex(String),
    /// A section's `size` field disagrees with its data.
    #[error("section {section} declares size {declared} but has {actual} bytes")]
    SizeMismatch {
        /// Section name.
        section: String,
        /// The declared size.
        declared: u64,
        /// The actual payload size.
        actual: u64,
    },
}

/// A named contiguous byte region.
///
/// Sections are append-only while code is being assembled into them; the
/// linker assigns the base address when it places the section in a memory
/// region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name.
    pub name: String,
    data: Vec<u8>,
    /// Base address, assigned by the linker.
    pub base: Option<u64>,
}

impl Section {
    /// Create a new empty section.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
            base: None,
        }
    }

    /// Append bytes to this section.
    pub fn add_data(&mut self, data: &[u8]) {
        self.data.extend_from_slice(data);
    }

    /// The section contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the section contents, for relocation patching.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Current size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A named location: a section plus an offset into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Containing section.
    pub section: String,
    /// Offset within the section.
    pub offset: u64,
}

/// A deferred edit to section bytes, resolved once the named symbol's
/// final address is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relocation {
    /// The symbol whose value gets patched in.
    pub symbol: String,
    /// Section containing the relocation site.
    pub section: String,
    /// Offset of the site within the section.
    pub offset: u64,
    /// Relocation kind name, resolved against the target's registry.
    pub kind: String,
}

/// A relocatable object file.
#[derive(Debug, Clone, Default)]
pub struct ObjectFile {
    sections: IndexMap<String, Section>,
    symbols: Vec<Symbol>,
    relocations: Vec<Relocation>,
}

impl ObjectFile {
    /// Create a new empty object file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the section `name`, creating it empty if it does not exist yet.
    pub fn get_section(&mut self, name: &str) -> &mut Section {
        self.sections
            .entry(name.to_string())
            .or_insert_with(|| Section::new(name))
    }

    /// Look up a section without creating it.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// Iterate over sections in creation order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    /// Define `name` at `offset` within `section`.
    ///
    /// A name can be defined only once per file.
    pub fn add_symbol(
        &mut self,
        name: &str,
        offset: u64,
        section: &str,
    ) -> Result<(), ObjectError> {
        if self.find_symbol(name).is_some() {
            return Err(ObjectError::DuplicateSymbol(name.to_string()));
        }
        self.get_section(section);
        self.symbols.push(Symbol {
            name: name.to_string(),
            section: section.to_string(),
            offset,
        });
        Ok(())
    }

    /// Record a relocation for `symbol` at `offset` within `section`.
    ///
    /// The symbol does not have to be defined in this file; whether it
    /// resolves is the linker's business.
    pub fn add_relocation(&mut self, symbol: &str, offset: u64, kind: &str, section: &str) {
        self.get_section(section);
        self.relocations.push(Relocation {
            symbol: symbol.to_string(),
            section: section.to_string(),
            offset,
            kind: kind.to_string(),
        });
    }

    /// Find the definition of `name` in this file.
    pub fn find_symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// The absolute value of `name`: its section's base address plus its
    /// offset. Before linking, sections sit at base zero.
    pub fn symbol_value(&self, name: &str) -> Option<u64> {
        let symbol = self.find_symbol(name)?;
        let base = self.section(&symbol.section)?.base.unwrap_or(0);
        Some(base + symbol.offset)
    }

    /// All symbols, in definition order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// All relocations, in registration order.
    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// Drop all relocations. The linker calls this once every site has
    /// been patched.
    pub(crate) fn clear_relocations(&mut self) {
        self.relocations.clear();
    }
}

fn set_eq<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x))
}

impl PartialEq for ObjectFile {
    fn eq(&self, other: &Self) -> bool {
        // Section data is order-sensitive within each section, but the
        // symbol and relocation tables are sets.
        self.sections.len() == other.sections.len()
            && self
                .sections
                .iter()
                .all(|(name, section)| other.sections.get(name) == Some(section))
            && set_eq(&self.symbols, &other.symbols)
            && set_eq(&self.relocations, &other.relocations)
    }
}

impl Eq for ObjectFile {}

#[derive(Serialize, Deserialize)]
struct SectionDoc {
    name: String,
    size: u64,
    data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct ObjectDoc {
    sections: Vec<SectionDoc>,
    symbols: Vec<Symbol>,
    relocations: Vec<Relocation>,
}

fn to_hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for byte in data {
        s.push_str(&format!("{byte:02x}"));
    }
    s
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Serialize `obj` to its textual form.
pub fn serialize(obj: &ObjectFile) -> String {
    let doc = ObjectDoc {
        sections: obj
            .sections
            .values()
            .map(|s| SectionDoc {
                name: s.name.clone(),
                size: s.size(),
                data: to_hex(s.data()),
                base: s.base,
            })
            .collect(),
        symbols: obj.symbols.clone(),
        relocations: obj.relocations.clone(),
    };
    serde_json::to_string_pretty(&doc).expect("object files always serialize")
}

/// Deserialize the textual form produced by [`serialize`].
pub fn deserialize(text: &str) -> Result<ObjectFile, ObjectError> {
    let doc: ObjectDoc = serde_json::from_str(text)?;
    let mut obj = ObjectFile::new();
    for section_doc in doc.sections {
        let data = from_hex(&section_doc.data)
            .ok_or_else(|| ObjectError::BadHex(section_doc.name.clone()))?;
        if data.len() as u64 != section_doc.size {
            return Err(ObjectError::SizeMismatch {
                section: section_doc.name,
                declared: section_doc.size,
                actual: data.len() as u64,
            });
        }
        let section = obj.get_section(&section_doc.name);
        section.add_data(&data);
        section.base = section_doc.base;
    }
    for symbol in doc.symbols {
        obj.add_symbol(&symbol.name, symbol.offset, &symbol.section)?;
    }
    for reloc in doc.relocations {
        obj.add_relocation(&reloc.symbol, reloc.offset, &reloc.kind, &reloc.section);
    }
    Ok(obj)
}
