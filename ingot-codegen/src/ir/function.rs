//! Function representation.

use crate::ir::dfg::DataFlowGraph;
use crate::ir::entities::Value;
use crate::ir::layout::Layout;
use crate::ir::sourceloc::SourceLoc;
use crate::ir::types::Type;
use crate::ir::Inst;
use core::fmt;
use ingot_entity::SecondaryMap;

/// A named function parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    /// Parameter name, used by the textual IR.
    pub name: String,
    /// Parameter type.
    pub ty: Type,
}

/// A function signature: the parameter list and the optional return type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Signature {
    /// Parameters in declaration order.
    pub params: Vec<Param>,
    /// Return type, if the function returns a value.
    pub ret: Option<Type>,
}

impl Signature {
    /// Create a signature with no parameters and no return value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signature returning `ty`.
    pub fn returning(ty: Type) -> Self {
        Self {
            params: Vec::new(),
            ret: Some(ty),
        }
    }

    /// Add a named parameter and return its index.
    pub fn add_param(&mut self, name: impl Into<String>, ty: Type) -> usize {
        self.params.push(Param {
            name: name.into(),
            ty,
        });
        self.params.len() - 1
    }
}

/// A function definition.
///
/// The function owns everything about its body: the data flow graph holds
/// the instructions and values, the layout orders them, and the source
/// location table maps instructions back to the front-end's positions.
/// Control-flow analyses over the body are caches owned by a
/// [`Context`](crate::Context), not by the function itself.
pub struct Function {
    /// Name of this function, also its symbol name at link time.
    pub name: String,

    /// Signature of this function.
    pub signature: Signature,

    /// Data flow graph: instructions and values.
    pub dfg: DataFlowGraph,

    /// Layout of blocks and instructions.
    pub layout: Layout,

    /// Source locations of instructions.
    pub srclocs: SecondaryMap<Inst, SourceLoc>,

    /// Values bound to the signature parameters, in order.
    params: Vec<Value>,
}

impl Function {
    /// Create a function with the given name and an empty signature.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_signature(name, Signature::new())
    }

    /// Create a function with the given name and signature, materializing a
    /// value for every parameter.
    pub fn with_signature(name: impl Into<String>, signature: Signature) -> Self {
        let mut dfg = DataFlowGraph::new();
        let params = signature
            .params
            .iter()
            .enumerate()
            .map(|(num, p)| dfg.make_param(p.ty, num))
            .collect();
        Self {
            name: name.into(),
            signature,
            dfg,
            layout: Layout::new(),
            srclocs: SecondaryMap::new(),
            params,
        }
    }

    /// Add a parameter to the signature and return its value.
    pub fn add_param(&mut self, name: impl Into<String>, ty: Type) -> Value {
        let num = self.signature.add_param(name, ty);
        let value = self.dfg.make_param(ty, num);
        self.params.push(value);
        value
    }

    /// The value of parameter `num`.
    pub fn param_value(&self, num: usize) -> Value {
        self.params[num]
    }

    /// Values of all parameters, in order.
    pub fn param_values(&self) -> &[Value] {
        &self.params
    }

    /// Is the function body empty?
    pub fn is_empty(&self) -> bool {
        self.layout.entry_block().is_none()
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        crate::ir::write::write_function(f, self)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (self as &dyn fmt::Display).fmt(f)
    }
}
