//! Create steps: the construction-time half of each instruction.
//!
//! A create step looks at the call-site arguments and the current context,
//! and reports the instruction's stack effect, its dependencies and what the
//! resolve step will need later. It never mutates the context; the context
//! applies the reported effect itself.

use super::{InstructionDef, Signature};
use crate::builder::{flatten_deps, BuildError, CallArgs, Created, Dependency, LocalContext, ResolveArgs};
use crate::parser::instruction::{Immediate, ImmediateKind, MemArg};
use crate::parser::module::{FunctionType, ValueType};

fn no_immediate() -> ResolveArgs {
    ResolveArgs::Immediate(Immediate::None)
}

fn describe(args: &CallArgs) -> &'static str {
    match args {
        CallArgs::None => "no arguments",
        CallArgs::Immediate(_) => "an immediate",
        CallArgs::Local(_) => "a local",
        CallArgs::Global(_) => "a global",
        CallArgs::Func(_) => "a function",
        CallArgs::CallIndirect { .. } => "an indirect call target",
        CallArgs::Table(_) => "a table",
        CallArgs::TableCopy { .. } => "a table pair",
        CallArgs::MemArg { .. } => "a memory argument",
        CallArgs::Lane(_) => "a lane index",
        CallArgs::Branch(_) => "a branch target",
        CallArgs::BrTable { .. } => "a branch table",
        CallArgs::Type(_) => "a value type",
        CallArgs::Block { .. } => "a block body",
        CallArgs::If { .. } => "if/else bodies",
    }
}

fn unexpected(def: &InstructionDef, args: &CallArgs) -> BuildError {
    BuildError::invalid_arguments(def.name, format!("does not take {}", describe(args)))
}

fn signature(def: &InstructionDef) -> Result<Signature, BuildError> {
    def.signature
        .ok_or_else(|| BuildError::invalid_arguments(def.name, "has no fixed signature"))
}

/// Block types with params or several results are encoded as a type index.
pub fn needs_type_index(ty: &FunctionType) -> bool {
    !ty.params.is_empty() || ty.results.len() > 1
}

fn block_deps<'a>(ty: &FunctionType, bodies: impl Iterator<Item = &'a Dependency>) -> Vec<Dependency> {
    let mut deps = Vec::new();
    if needs_type_index(ty) {
        deps.push(Dependency::Type(ty.clone()));
    }
    deps.extend(bodies.cloned());
    deps
}

// Fixed-signature instructions ------------------------------------------------

pub fn create_plain(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::None = args else {
        return Err(unexpected(def, &args));
    };
    let (params, results) = signature(def)?;
    Ok(Created::new(params, results, no_immediate()))
}

/// `unreachable`: no operands, and control never continues.
pub fn create_trap(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    Ok(create_plain(def, ctx, args)?.diverging())
}

/// Constants: the literal must have the immediate's shape.
pub fn create_const(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Immediate(imm) = args else {
        return Err(unexpected(def, &args));
    };
    if !imm.matches(def.immediate) {
        return Err(BuildError::invalid_arguments(def.name, format!("literal{imm} has the wrong type")));
    }
    let (params, results) = signature(def)?;
    Ok(Created::new(params, results, ResolveArgs::Immediate(imm)))
}

pub fn create_shuffle(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Immediate(Immediate::Shuffle(lanes)) = args else {
        return Err(unexpected(def, &args));
    };
    if let Some(&lane) = lanes.iter().find(|&&lane| lane >= 32) {
        return Err(BuildError::InvalidLane {
            instruction: def.name.to_string(),
            lane,
            lanes: 32,
        });
    }
    let (params, results) = signature(def)?;
    Ok(Created::new(params, results, ResolveArgs::Immediate(Immediate::Shuffle(lanes))))
}

pub fn create_lane(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Lane(lane) = args else {
        return Err(unexpected(def, &args));
    };
    let ImmediateKind::Lane { lanes } = def.immediate else {
        return Err(BuildError::invalid_arguments(def.name, "has no lane immediate"));
    };
    if lane >= lanes {
        return Err(BuildError::InvalidLane {
            instruction: def.name.to_string(),
            lane,
            lanes,
        });
    }
    let (params, results) = signature(def)?;
    Ok(Created::new(params, results, ResolveArgs::Immediate(Immediate::Lane(lane))))
}

pub fn create_fence(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::None = args else {
        return Err(unexpected(def, &args));
    };
    Ok(Created::new(&[], &[], ResolveArgs::Immediate(Immediate::Reserved)))
}

// Memory ----------------------------------------------------------------------

/// Loads, stores and atomics. Alignment defaults to natural; larger is
/// rejected, and atomics must be exactly naturally aligned.
pub fn create_memory_access(
    def: &InstructionDef,
    _ctx: &LocalContext,
    args: CallArgs,
) -> Result<Created, BuildError> {
    let (offset, align) = match args {
        CallArgs::None => (0, None),
        CallArgs::MemArg { offset, align } => (offset, align),
        other => return Err(unexpected(def, &other)),
    };
    let ImmediateKind::MemArg { natural } = def.immediate else {
        return Err(BuildError::invalid_arguments(def.name, "has no memory argument"));
    };
    let align = align.unwrap_or(natural);
    if align > natural || (def.opcode.is_atomic() && align != natural) {
        return Err(BuildError::BadAlignment {
            instruction: def.name.to_string(),
            align,
            natural,
        });
    }
    let (params, results) = signature(def)?;
    let memarg = MemArg { align, offset };
    Ok(Created::new(params, results, ResolveArgs::Immediate(Immediate::MemArg(memarg)))
        .with_deps(vec![Dependency::HasMemory]))
}

/// `memory.size`, `memory.grow`, `memory.fill`, `memory.copy`: the memory
/// index is filled in at resolution.
pub fn create_memory(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    Ok(create_plain(def, ctx, args)?.with_deps(vec![Dependency::HasMemory]))
}

// Variables -------------------------------------------------------------------

pub fn create_local_get(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Local(local) = args else {
        return Err(unexpected(def, &args));
    };
    let ty = ctx.local_type(local)?;
    Ok(Created::new(&[], &[ty], ResolveArgs::Immediate(Immediate::Index(local.index()))))
}

pub fn create_local_set(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Local(local) = args else {
        return Err(unexpected(def, &args));
    };
    let ty = ctx.local_type(local)?;
    Ok(Created::new(&[ty], &[], ResolveArgs::Immediate(Immediate::Index(local.index()))))
}

pub fn create_local_tee(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Local(local) = args else {
        return Err(unexpected(def, &args));
    };
    let ty = ctx.local_type(local)?;
    Ok(Created::new(&[ty], &[ty], ResolveArgs::Immediate(Immediate::Index(local.index()))))
}

pub fn create_global_get(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Global(global) = args else {
        return Err(unexpected(def, &args));
    };
    Ok(Created::new(&[], &[global.ty.value_type], no_immediate()).with_deps(vec![Dependency::Global(global.id)]))
}

pub fn create_global_set(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Global(global) = args else {
        return Err(unexpected(def, &args));
    };
    if !global.ty.mutable {
        return Err(BuildError::ImmutableGlobal);
    }
    Ok(Created::new(&[global.ty.value_type], &[], no_immediate()).with_deps(vec![Dependency::Global(global.id)]))
}

// Calls and branches ----------------------------------------------------------

pub fn create_call(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Func(func) = args else {
        return Err(unexpected(def, &args));
    };
    Ok(Created::new(&func.ty.params, &func.ty.results, no_immediate())
        .with_deps(vec![Dependency::Function(func.id)]))
}

pub fn create_call_indirect(
    def: &InstructionDef,
    _ctx: &LocalContext,
    args: CallArgs,
) -> Result<Created, BuildError> {
    let CallArgs::CallIndirect { table, ty } = args else {
        return Err(unexpected(def, &args));
    };
    if table.ty.ref_type != ValueType::FuncRef {
        return Err(BuildError::invalid_arguments(def.name, "table does not hold funcref"));
    }
    let mut params = ty.params.clone();
    params.push(ValueType::I32);
    Ok(Created::new(&params, &ty.results, no_immediate())
        .with_deps(vec![Dependency::Table(table.id), Dependency::Type(ty)]))
}

pub fn create_return(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::None = args else {
        return Err(unexpected(def, &args));
    };
    Ok(Created::new(ctx.return_types(), &[], no_immediate()).diverging())
}

pub fn create_br(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Branch(target) = args else {
        return Err(unexpected(def, &args));
    };
    let (depth, types) = ctx.resolve_target(target)?;
    Ok(Created::new(types, &[], ResolveArgs::Immediate(Immediate::Index(depth))).diverging())
}

pub fn create_br_if(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Branch(target) = args else {
        return Err(unexpected(def, &args));
    };
    let (depth, types) = ctx.resolve_target(target)?;
    let mut params = types.to_vec();
    params.push(ValueType::I32);
    Ok(Created::new(&params, types, ResolveArgs::Immediate(Immediate::Index(depth))))
}

/// Every target is checked on its own against the operands under the
/// index; all of them must agree on arity.
pub fn create_br_table(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::BrTable { targets, default } = args else {
        return Err(unexpected(def, &args));
    };
    let (default_depth, default_types) = ctx.resolve_target(default)?;
    let mut labels = Vec::with_capacity(targets.len());
    for target in targets {
        let (depth, types) = ctx.resolve_target(target)?;
        if types.len() != default_types.len() {
            return Err(BuildError::invalid_arguments(
                def.name,
                format!("target {target} has arity {}, default has {}", types.len(), default_types.len()),
            ));
        }
        ctx.check_top(def.name, types, 1)?;
        labels.push(depth);
    }
    let mut params = default_types.to_vec();
    params.push(ValueType::I32);
    let imm = Immediate::BrTable {
        labels,
        default: default_depth,
    };
    Ok(Created::new(&params, &[], ResolveArgs::Immediate(imm)).diverging())
}

// Parametric ------------------------------------------------------------------

/// `drop` takes whatever is on top.
pub fn create_drop(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::None = args else {
        return Err(unexpected(def, &args));
    };
    let ty = ctx.peek_type(0).unwrap_or(ValueType::I32);
    Ok(Created::new(&[ty], &[], no_immediate()))
}

/// Untyped `select`: operand type inferred from the stack, numeric or
/// vector only.
pub fn create_select(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::None = args else {
        return Err(unexpected(def, &args));
    };
    let ty = ctx.peek_type(1).unwrap_or(ValueType::I32);
    if ty.is_ref() {
        return Err(BuildError::invalid_operand(
            def.name,
            "reference operands need select.typed",
        ));
    }
    Ok(Created::new(&[ty, ty, ValueType::I32], &[ty], no_immediate()))
}

pub fn create_select_typed(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Type(ty) = args else {
        return Err(unexpected(def, &args));
    };
    Ok(Created::new(
        &[ty, ty, ValueType::I32],
        &[ty],
        ResolveArgs::Immediate(Immediate::ValueTypes(vec![ty])),
    ))
}

// References ------------------------------------------------------------------

pub fn create_ref_null(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Type(ty) = args else {
        return Err(unexpected(def, &args));
    };
    if !ty.is_ref() {
        return Err(BuildError::invalid_arguments(def.name, format!("{ty} is not a reference type")));
    }
    Ok(Created::new(&[], &[ty], ResolveArgs::Immediate(Immediate::RefType(ty))))
}

pub fn create_ref_is_null(def: &InstructionDef, ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::None = args else {
        return Err(unexpected(def, &args));
    };
    let ty = match ctx.peek_type(0) {
        Some(ty) if ty.is_ref() => ty,
        _ => ValueType::FuncRef,
    };
    Ok(Created::new(&[ty], &[ValueType::I32], no_immediate()))
}

/// `ref.func` also marks the function as referenced from code, so the
/// builder declares it in an element segment.
pub fn create_ref_func(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Func(func) = args else {
        return Err(unexpected(def, &args));
    };
    Ok(Created::new(&[], &[ValueType::FuncRef], no_immediate())
        .with_deps(vec![Dependency::Function(func.id), Dependency::HasRefTo(func.id)]))
}

// Tables ----------------------------------------------------------------------

fn table_arg(def: &InstructionDef, args: CallArgs) -> Result<crate::builder::TableRef, BuildError> {
    match args {
        CallArgs::Table(table) => Ok(table),
        other => Err(unexpected(def, &other)),
    }
}

pub fn create_table_get(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let table = table_arg(def, args)?;
    Ok(Created::new(&[ValueType::I32], &[table.ty.ref_type], no_immediate())
        .with_deps(vec![Dependency::Table(table.id)]))
}

pub fn create_table_set(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let table = table_arg(def, args)?;
    Ok(Created::new(&[ValueType::I32, table.ty.ref_type], &[], no_immediate())
        .with_deps(vec![Dependency::Table(table.id)]))
}

pub fn create_table_size(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let table = table_arg(def, args)?;
    Ok(Created::new(&[], &[ValueType::I32], no_immediate()).with_deps(vec![Dependency::Table(table.id)]))
}

pub fn create_table_grow(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let table = table_arg(def, args)?;
    Ok(
        Created::new(&[table.ty.ref_type, ValueType::I32], &[ValueType::I32], no_immediate())
            .with_deps(vec![Dependency::Table(table.id)]),
    )
}

pub fn create_table_fill(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let table = table_arg(def, args)?;
    Ok(
        Created::new(&[ValueType::I32, table.ty.ref_type, ValueType::I32], &[], no_immediate())
            .with_deps(vec![Dependency::Table(table.id)]),
    )
}

pub fn create_table_copy(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::TableCopy { dst, src } = args else {
        return Err(unexpected(def, &args));
    };
    if dst.ty.ref_type != src.ty.ref_type {
        return Err(BuildError::invalid_arguments(
            def.name,
            format!("cannot copy {} elements into a {} table", src.ty.ref_type, dst.ty.ref_type),
        ));
    }
    Ok(Created::new(&[ValueType::I32; 3], &[], no_immediate())
        .with_deps(vec![Dependency::Table(dst.id), Dependency::Table(src.id)]))
}

// Structured control ----------------------------------------------------------

/// `block` and `loop`. The body has already been checked by the context;
/// its dependencies are carried along, after the block type's own.
pub fn create_block(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::Block { ty, body } = args else {
        return Err(unexpected(def, &args));
    };
    let deps = block_deps(&ty, flatten_deps(&body));
    Ok(Created::new(&ty.params, &ty.results, ResolveArgs::Block { ty: ty.clone(), body }).with_deps(deps))
}

pub fn create_if(def: &InstructionDef, _ctx: &LocalContext, args: CallArgs) -> Result<Created, BuildError> {
    let CallArgs::If { ty, then, else_ } = args else {
        return Err(unexpected(def, &args));
    };
    let else_deps = else_.iter().flat_map(|body| flatten_deps(body));
    let deps = block_deps(&ty, flatten_deps(&then).chain(else_deps));
    let mut params = ty.params.clone();
    params.push(ValueType::I32);
    Ok(Created::new(&params, &ty.results, ResolveArgs::If { ty: ty.clone(), then, else_ }).with_deps(deps))
}
