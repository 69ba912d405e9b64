//! Relocatable object files and the linker.
//!
//! This crate is the back half of the toolchain: assembled machine code
//! arrives here as [`ObjectFile`]s full of sections, symbols, and
//! relocations; a [`Layout`] says which memory regions the sections belong
//! in; and [`link`] merges, places, resolves, and patches everything into a
//! single loadable image.
//!
//! The [`SectionSink`] bridges from `ingot-codegen`'s encoding framework:
//! it implements `CodeSink` by appending into a section and registering the
//! relocations instructions ask for.

#![deny(missing_docs)]

pub mod layout;
pub mod linker;
pub mod objectfile;
pub mod sink;

pub use crate::layout::{Layout, LayoutError, MemoryRegion, Placement};
pub use crate::linker::{link, LinkError};
pub use crate::objectfile::{
    deserialize, serialize, ObjectError, ObjectFile, Relocation, Section, Symbol,
};
pub use crate::sink::SectionSink;
