//! Module representation: the unit front-ends hand to the code generator.

use crate::ir::entities::{FuncRef, Variable};
use crate::ir::function::Function;
use core::fmt;
use ingot_entity::PrimaryMap;

/// A module-level variable: a named chunk of mutable storage.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableData {
    /// Variable name, also its symbol name at link time.
    pub name: String,
    /// Storage size in bytes.
    pub size: u32,
}

/// A compilation unit: global variables and functions, in declaration
/// order. The module owns everything it contains.
pub struct Module {
    /// Module name.
    pub name: String,

    /// Global variables.
    pub variables: PrimaryMap<Variable, VariableData>,

    /// Function definitions.
    pub functions: PrimaryMap<FuncRef, Function>,
}

impl Module {
    /// Create a new empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: PrimaryMap::new(),
            functions: PrimaryMap::new(),
        }
    }

    /// Declare a global variable of `size` bytes.
    pub fn declare_variable(&mut self, name: impl Into<String>, size: u32) -> Variable {
        self.variables.push(VariableData {
            name: name.into(),
            size,
        })
    }

    /// Add a function definition.
    pub fn add_function(&mut self, func: Function) -> FuncRef {
        self.functions.push(func)
    }

    /// Find a function by name.
    pub fn function_by_name(&self, name: &str) -> Option<FuncRef> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(fr, _)| fr)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        crate::ir::write::write_module(f, self)
    }
}
