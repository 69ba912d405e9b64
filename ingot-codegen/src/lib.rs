//! The ingot code generator nucleus.
//!
//! This crate holds the pieces that every front-end and back-end of the
//! toolchain meets in the middle on:
//!
//! - the typed SSA intermediate representation ([`ir`]), built with a
//!   [`ir::Builder`] and checked by the [`verifier`];
//! - control-flow analyses over it: the [`flowgraph::ControlFlowGraph`] and
//!   the [`dominator_tree::DominatorTree`] family;
//! - the bit-level instruction encoding framework ([`binemit`]) together
//!   with the relocation kinds each target registers ([`isa`]).
//!
//! Object files and the linker live in the `ingot-object` crate, which
//! consumes the relocation registries defined here.

#![deny(missing_docs)]

pub use crate::context::Context;
pub use crate::verifier::{verify_function, verify_module};

pub mod binemit;
pub mod dominator_tree;
pub mod flowgraph;
pub mod ir;
pub mod isa;
pub mod verifier;

mod context;

/// Version number of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
