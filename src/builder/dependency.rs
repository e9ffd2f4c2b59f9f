//! The intermediate form produced at construction time.
//!
//! Bodies are built from [`PendingInstruction`]s that refer to entities
//! symbolically, through [`Dependency`] values. Indices do not exist yet;
//! they are assigned by [`super::resolver`] once the reachable set of
//! entities is known.

use std::fmt;

use super::context::{Local, Target};
use crate::parser::instruction::Immediate;
use crate::parser::module::{FunctionType, GlobalType, MemoryType, TableType, ValueType};
use crate::registry::InstructionDef;

/// Arena slot of a function inside its [`super::ModuleBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryId(pub(crate) usize);

/// Handle to a function, carrying its signature so call sites can be
/// checked without going back to the builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncRef {
    pub(crate) id: FuncId,
    pub(crate) ty: FunctionType,
}

impl FuncRef {
    pub fn id(&self) -> FuncId {
        self.id
    }

    pub fn ty(&self) -> &FunctionType {
        &self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalRef {
    pub(crate) id: GlobalId,
    pub(crate) ty: GlobalType,
}

impl GlobalRef {
    pub fn ty(&self) -> GlobalType {
        self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRef {
    pub(crate) id: TableId,
    pub(crate) ty: TableType,
}

impl TableRef {
    pub fn ty(&self) -> TableType {
        self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRef {
    pub(crate) id: MemoryId,
    pub(crate) ty: MemoryType,
}

impl MemoryRef {
    pub fn ty(&self) -> MemoryType {
        self.ty
    }
}

/// A forward reference from an instruction to something that will only get
/// an index at build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    Function(FuncId),
    Global(GlobalId),
    Table(TableId),
    Memory(MemoryId),
    Type(FunctionType),
    /// Structural marker: the instruction accesses the (single) memory.
    HasMemory,
    /// Structural marker: the function is referenced by `ref.func` in code
    /// and must be declared in an element segment.
    HasRefTo(FuncId),
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Function(id) => write!(f, "function #{}", id.0),
            Dependency::Global(id) => write!(f, "global #{}", id.0),
            Dependency::Table(id) => write!(f, "table #{}", id.0),
            Dependency::Memory(id) => write!(f, "memory #{}", id.0),
            Dependency::Type(ty) => write!(f, "type {ty}"),
            Dependency::HasMemory => write!(f, "memory marker"),
            Dependency::HasRefTo(id) => write!(f, "ref.func marker for function #{}", id.0),
        }
    }
}

/// Arguments captured at construction time and handed back to the
/// instruction's resolve step.
#[derive(Debug, Clone)]
pub enum ResolveArgs {
    Immediate(Immediate),
    Block {
        ty: FunctionType,
        body: Vec<PendingInstruction>,
    },
    If {
        ty: FunctionType,
        then: Vec<PendingInstruction>,
        else_: Option<Vec<PendingInstruction>>,
    },
}

/// One constructed but unresolved instruction. Immutable once created.
#[derive(Debug, Clone)]
pub struct PendingInstruction {
    pub def: &'static InstructionDef,
    /// Dependencies in the order the resolve step expects them. For
    /// structured instructions this includes the flattened dependencies of
    /// every nested instruction.
    pub deps: Vec<Dependency>,
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
    pub args: ResolveArgs,
}

impl PendingInstruction {
    pub fn name(&self) -> &'static str {
        self.def.name
    }
}

/// Call-site arguments for an instruction's create step.
#[derive(Debug, Clone)]
pub enum CallArgs {
    None,
    /// A literal immediate: constants, `v128.const`, shuffle lanes.
    Immediate(Immediate),
    Local(Local),
    Global(GlobalRef),
    Func(FuncRef),
    CallIndirect {
        table: TableRef,
        ty: FunctionType,
    },
    Table(TableRef),
    TableCopy {
        dst: TableRef,
        src: TableRef,
    },
    /// Memory access; `align` defaults to the natural alignment (log2).
    MemArg {
        offset: u32,
        align: Option<u32>,
    },
    Lane(u8),
    Branch(Target),
    BrTable {
        targets: Vec<Target>,
        default: Target,
    },
    /// A value type operand: `ref.null` and typed `select`.
    Type(ValueType),
    Block {
        ty: FunctionType,
        body: Vec<PendingInstruction>,
    },
    If {
        ty: FunctionType,
        then: Vec<PendingInstruction>,
        else_: Option<Vec<PendingInstruction>>,
    },
}

/// What a create step reports back to the context.
#[derive(Debug, Clone)]
pub struct Created {
    pub params: Vec<ValueType>,
    pub results: Vec<ValueType>,
    pub deps: Vec<Dependency>,
    pub args: ResolveArgs,
    /// Control never falls through (`br`, `return`, `unreachable`, ...).
    pub diverges: bool,
}

impl Created {
    pub fn new(params: &[ValueType], results: &[ValueType], args: ResolveArgs) -> Created {
        Created {
            params: params.to_vec(),
            results: results.to_vec(),
            deps: Vec::new(),
            args,
            diverges: false,
        }
    }

    pub fn with_deps(mut self, deps: Vec<Dependency>) -> Created {
        self.deps = deps;
        self
    }

    pub fn diverging(mut self) -> Created {
        self.diverges = true;
        self
    }
}

/// Flattens the dependencies of a sequence, in resolution order.
pub fn flatten_deps(body: &[PendingInstruction]) -> impl Iterator<Item = &Dependency> {
    body.iter().flat_map(|p| p.deps.iter())
}
