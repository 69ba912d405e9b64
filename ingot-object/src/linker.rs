//! The linker.
//!
//! Linking proceeds in the classic order: merge the input files section by
//! section, reject duplicate symbol definitions, place the merged sections
//! into the layout's memory regions, resolve every symbol to its absolute
//! address, and patch every relocation site. The output is a fresh object
//! file with placed sections, a resolved symbol table, and no relocations
//! left.
//!
//! The target name selects the relocation registry and nothing else.

use crate::layout::{Layout, Placement};
use crate::objectfile::{ObjectFile, ObjectError};
use ingot_codegen::binemit::{align_up, RelocError};
use ingot_codegen::isa::{self, LookupError};
use log::debug;
use thiserror::Error;

/// Errors detected while linking.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A symbol is defined in more than one input file.
    #[error("symbol {0} is defined in multiple object files")]
    DuplicateSymbol(String),
    /// A relocation references a symbol no input file defines.
    #[error("undefined symbol: {0}")]
    UndefinedSymbol(String),
    /// A relocation names a kind the target does not register.
    #[error("unknown relocation kind {kind} for symbol {symbol}")]
    UnknownRelocation {
        /// The referenced symbol.
        symbol: String,
        /// The unknown kind name.
        kind: String,
    },
    /// A relocation or symbol names a section that does not exist.
    #[error("unknown section {0}")]
    UnknownSection(String),
    /// The displacement at a relocation site does not fit its encoding.
    #[error("relocation {kind} for {symbol} at {section}+{offset:#x} failed: {source}")]
    RelocationOutOfRange {
        /// The referenced symbol.
        symbol: String,
        /// Section of the site.
        section: String,
        /// Offset of the site within its section.
        offset: u64,
        /// The relocation kind.
        kind: String,
        /// The range failure.
        #[source]
        source: RelocError,
    },
    /// The sections placed in a region need more bytes than it has.
    #[error("section {section} overflows memory region {region}")]
    RegionOverflow {
        /// The region that ran out of space.
        region: String,
        /// The section that did not fit.
        section: String,
    },
    /// The target name does not resolve to an ISA.
    #[error(transparent)]
    UnsupportedTarget(#[from] LookupError),
    /// An error from the object model, such as a merge conflict.
    #[error(transparent)]
    Object(#[from] ObjectError),
}

/// Link `objects` under `layout` for `target`.
///
/// Inputs are consumed immutably; the returned image is a fresh object
/// file. Given identical inputs the output is byte-identical.
pub fn link(objects: &[ObjectFile], layout: &Layout, target: &str) -> Result<ObjectFile, LinkError> {
    let isa = isa::lookup_by_name(target)?;
    debug!(
        "linking {} object files for {}",
        objects.len(),
        isa.name()
    );

    // Step 1: merge sections, translating symbol and relocation offsets by
    // the base each input's section data lands at.
    let mut dest = ObjectFile::new();
    for obj in objects {
        let mut bases = Vec::new();
        for section in obj.sections() {
            let merged = dest.get_section(&section.name);
            bases.push((section.name.clone(), merged.size()));
            merged.add_data(section.data());
        }
        let base_of = |name: &str| {
            bases
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, base)| *base)
                .unwrap_or(0)
        };
        // Step 2: duplicate definitions surface here, since the merged
        // file keeps one symbol table.
        for symbol in obj.symbols() {
            let offset = symbol.offset + base_of(&symbol.section);
            dest.add_symbol(&symbol.name, offset, &symbol.section)
                .map_err(|err| match err {
                    ObjectError::DuplicateSymbol(name) => LinkError::DuplicateSymbol(name),
                    other => LinkError::Object(other),
                })?;
        }
        for reloc in obj.relocations() {
            let offset = reloc.offset + base_of(&reloc.section);
            dest.add_relocation(&reloc.symbol, offset, &reloc.kind, &reloc.section);
        }
    }

    // Step 3: walk the layout, placing sections region by region. Sections
    // no region mentions go sequentially from address zero afterwards.
    let mut placed: Vec<String> = Vec::new();
    for region in &layout.memories {
        let mut cursor = region.location;
        for placement in &region.placements {
            match placement {
                Placement::Align(n) => {
                    cursor = align_up(cursor, *n);
                }
                Placement::Section(name) => {
                    let Some(section) = dest.section(name) else {
                        debug!("layout names section {name} which no input provides");
                        continue;
                    };
                    let size = section.size();
                    if cursor + size > region.location + region.size {
                        return Err(LinkError::RegionOverflow {
                            region: region.name.clone(),
                            section: name.clone(),
                        });
                    }
                    debug!("placing {name} at {cursor:#x} in {}", region.name);
                    dest.get_section(name).base = Some(cursor);
                    cursor += size;
                    placed.push(name.clone());
                }
            }
        }
    }
    let unplaced: Vec<String> = dest
        .sections()
        .filter(|s| !placed.iter().any(|p| p == &s.name))
        .map(|s| s.name.clone())
        .collect();
    let mut cursor = 0;
    for name in unplaced {
        let section = dest.get_section(&name);
        section.base = Some(cursor);
        debug!("placing {name} at {cursor:#x}");
        cursor += section.size();
    }

    // Step 4 and 5: with every section based, each symbol's value is its
    // section base plus offset; resolve and patch every relocation site.
    struct Patch {
        section: String,
        offset: u64,
        sym_value: u64,
        site_value: u64,
        kind: &'static ingot_codegen::binemit::RelocKind,
        symbol: String,
        kind_name: String,
    }
    let mut patches = Vec::new();
    for reloc in dest.relocations() {
        let kind = isa
            .reloc_by_name(&reloc.kind)
            .ok_or_else(|| LinkError::UnknownRelocation {
                symbol: reloc.symbol.clone(),
                kind: reloc.kind.clone(),
            })?;
        let sym_value = dest
            .symbol_value(&reloc.symbol)
            .ok_or_else(|| LinkError::UndefinedSymbol(reloc.symbol.clone()))?;
        let site_section = dest
            .section(&reloc.section)
            .ok_or_else(|| LinkError::UnknownSection(reloc.section.clone()))?;
        let site_value = site_section.base.unwrap_or(0) + reloc.offset;
        patches.push(Patch {
            section: reloc.section.clone(),
            offset: reloc.offset,
            sym_value,
            site_value,
            kind,
            symbol: reloc.symbol.clone(),
            kind_name: reloc.kind.clone(),
        });
    }
    for patch in patches {
        debug!(
            "patching {} for {} at {}+{:#x}",
            patch.kind_name, patch.symbol, patch.section, patch.offset
        );
        let section = dest.get_section(&patch.section);
        let offset = patch.offset as usize;
        let data = &mut section.data_mut()[offset..];
        (patch.kind.apply)(patch.sym_value, patch.site_value, data).map_err(|source| {
            LinkError::RelocationOutOfRange {
                symbol: patch.symbol,
                section: patch.section,
                offset: patch.offset,
                kind: patch.kind_name,
                source,
            }
        })?;
    }

    // Step 6: the image keeps the placed sections and resolved symbols;
    // every relocation has been applied.
    dest.clear_relocations();
    Ok(dest)
}
