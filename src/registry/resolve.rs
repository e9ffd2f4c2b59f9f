//! Resolve steps: turn captured arguments plus assigned indices into the
//! final [`Immediate`].
//!
//! `indices` holds one entry per dependency of the pending instruction, in
//! the order its create step listed them.

use super::create::needs_type_index;
use super::InstructionDef;
use crate::builder::{BuildError, PendingInstruction, ResolveArgs};
use crate::parser::instruction::{BlockType, Immediate, Instruction};
use crate::parser::module::FunctionType;

fn expect_deps(def: &InstructionDef, indices: &[u32], n: usize) -> Result<(), BuildError> {
    if indices.len() != n {
        return Err(BuildError::UnresolvedDependency(format!(
            "{} expects {n} resolved dependencies, got {}",
            def.name,
            indices.len()
        )));
    }
    Ok(())
}

fn captured<'a>(def: &InstructionDef, args: &'a ResolveArgs) -> Result<&'a Immediate, BuildError> {
    match args {
        ResolveArgs::Immediate(imm) => Ok(imm),
        _ => Err(BuildError::invalid_arguments(def.name, "captured a body instead of an immediate")),
    }
}

/// Instructions whose immediate is fully known at construction time.
pub fn resolve_immediate(def: &InstructionDef, indices: &[u32], args: &ResolveArgs) -> Result<Immediate, BuildError> {
    expect_deps(def, indices, 0)?;
    captured(def, args).cloned()
}

/// Memory accesses depend on the memory only to pull it into the module;
/// the memarg does not encode an index.
pub fn resolve_memory_access(
    def: &InstructionDef,
    indices: &[u32],
    args: &ResolveArgs,
) -> Result<Immediate, BuildError> {
    expect_deps(def, indices, 1)?;
    captured(def, args).cloned()
}

/// Single entity index: `call`, `global.*`, `table.*`, `memory.size`, ...
pub fn resolve_index(def: &InstructionDef, indices: &[u32], _args: &ResolveArgs) -> Result<Immediate, BuildError> {
    expect_deps(def, indices, 1)?;
    Ok(Immediate::Index(indices[0]))
}

/// `ref.func`: the function index; the second dependency is the
/// declaration marker.
pub fn resolve_ref_func(def: &InstructionDef, indices: &[u32], _args: &ResolveArgs) -> Result<Immediate, BuildError> {
    expect_deps(def, indices, 2)?;
    Ok(Immediate::Index(indices[0]))
}

pub fn resolve_call_indirect(
    def: &InstructionDef,
    indices: &[u32],
    _args: &ResolveArgs,
) -> Result<Immediate, BuildError> {
    expect_deps(def, indices, 2)?;
    Ok(Immediate::CallIndirect {
        table_index: indices[0],
        type_index: indices[1],
    })
}

/// `memory.copy` copies within the one memory it depends on.
pub fn resolve_memory_copy(
    def: &InstructionDef,
    indices: &[u32],
    _args: &ResolveArgs,
) -> Result<Immediate, BuildError> {
    expect_deps(def, indices, 1)?;
    Ok(Immediate::IndexPair(indices[0], indices[0]))
}

pub fn resolve_table_copy(
    def: &InstructionDef,
    indices: &[u32],
    _args: &ResolveArgs,
) -> Result<Immediate, BuildError> {
    expect_deps(def, indices, 2)?;
    Ok(Immediate::IndexPair(indices[0], indices[1]))
}

/// Splits off the block type's own index, if it has one.
fn block_type<'a>(
    def: &InstructionDef,
    ty: &FunctionType,
    indices: &'a [u32],
) -> Result<(BlockType, &'a [u32]), BuildError> {
    if needs_type_index(ty) {
        let (&type_index, rest) = indices
            .split_first()
            .ok_or_else(|| BuildError::UnresolvedDependency(format!("{} block type {ty}", def.name)))?;
        return Ok((BlockType::FuncType(type_index), rest));
    }
    let block_type = match ty.results.first() {
        Some(&result) => BlockType::Value(result),
        None => BlockType::Empty,
    };
    Ok((block_type, indices))
}

/// `block` and `loop`.
pub fn resolve_block(def: &InstructionDef, indices: &[u32], args: &ResolveArgs) -> Result<Immediate, BuildError> {
    let ResolveArgs::Block { ty, body } = args else {
        return Err(BuildError::invalid_arguments(def.name, "did not capture a block body"));
    };
    let (block_type, rest) = block_type(def, ty, indices)?;
    Ok(Immediate::Block {
        block_type,
        body: resolve_sequence(body, rest)?,
    })
}

pub fn resolve_if(def: &InstructionDef, indices: &[u32], args: &ResolveArgs) -> Result<Immediate, BuildError> {
    let ResolveArgs::If { ty, then, else_ } = args else {
        return Err(BuildError::invalid_arguments(def.name, "did not capture if bodies"));
    };
    let (block_type, rest) = block_type(def, ty, indices)?;
    let then_len: usize = then.iter().map(|p| p.deps.len()).sum();
    if rest.len() < then_len {
        return Err(BuildError::UnresolvedDependency(format!(
            "{} bodies need more than {} indices",
            def.name,
            rest.len()
        )));
    }
    let (then_indices, else_indices) = rest.split_at(then_len);
    let then = resolve_sequence(then, then_indices)?;
    let else_ = match else_ {
        Some(body) => Some(resolve_sequence(body, else_indices)?),
        None => {
            expect_deps(def, else_indices, 0)?;
            None
        }
    };
    Ok(Immediate::If { block_type, then, else_ })
}

/// Resolves a body against the flattened indices of all its dependencies.
/// Every index must be consumed.
pub fn resolve_sequence(body: &[PendingInstruction], indices: &[u32]) -> Result<Vec<Instruction>, BuildError> {
    let mut out = Vec::with_capacity(body.len());
    let mut rest = indices;
    for pending in body {
        let n = pending.deps.len();
        if rest.len() < n {
            return Err(BuildError::UnresolvedDependency(format!(
                "{} has {n} dependencies but only {} indices remain",
                pending.name(),
                rest.len()
            )));
        }
        let (own, tail) = rest.split_at(n);
        let immediate = (pending.def.resolve)(pending.def, own, &pending.args)?;
        out.push(Instruction::new(pending.name(), immediate));
        rest = tail;
    }
    if !rest.is_empty() {
        return Err(BuildError::UnresolvedDependency(format!(
            "{} indices left over after resolving the body",
            rest.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{CallArgs, Dependency, LocalContext};
    use crate::parser::module::ValueType::{I32, I64};
    use crate::registry::registry;

    fn pending(name: &str, args: CallArgs, ctx: &LocalContext) -> PendingInstruction {
        let def = registry().lookup(name).unwrap();
        let created = (def.create)(def, ctx, args).unwrap();
        PendingInstruction {
            def,
            deps: created.deps,
            params: created.params,
            results: created.results,
            args: created.args,
        }
    }

    #[test]
    fn test_sequence_slices_indices_per_instruction() {
        let ctx = LocalContext::for_function(&FunctionType::new(&[], &[]));
        let body = vec![
            pending("i32.const", CallArgs::Immediate(Immediate::I32(4)), &ctx),
            pending("memory.size", CallArgs::None, &ctx),
            pending("i32.add", CallArgs::None, &ctx),
            pending("memory.grow", CallArgs::None, &ctx),
        ];
        assert_eq!(body[1].deps, vec![Dependency::HasMemory]);
        let out = resolve_sequence(&body, &[0, 0]).unwrap();
        assert_eq!(out[0], Instruction::new("i32.const", Immediate::I32(4)));
        assert_eq!(out[1], Instruction::new("memory.size", Immediate::Index(0)));
        assert_eq!(out[3], Instruction::new("memory.grow", Immediate::Index(0)));
    }

    #[test]
    fn test_index_count_must_match() {
        let ctx = LocalContext::for_function(&FunctionType::new(&[], &[]));
        let body = vec![pending("memory.size", CallArgs::None, &ctx)];
        assert!(matches!(
            resolve_sequence(&body, &[]),
            Err(BuildError::UnresolvedDependency(_))
        ));
        assert!(matches!(
            resolve_sequence(&body, &[0, 1]),
            Err(BuildError::UnresolvedDependency(_))
        ));
    }

    #[test]
    fn test_block_type_encoding() {
        let def = registry().lookup("block").unwrap();
        let single = ResolveArgs::Block {
            ty: FunctionType::new(&[], &[I64]),
            body: vec![],
        };
        assert_eq!(
            resolve_block(def, &[], &single).unwrap(),
            Immediate::Block {
                block_type: BlockType::Value(I64),
                body: vec![]
            }
        );
        let multi = ResolveArgs::Block {
            ty: FunctionType::new(&[I32], &[I32, I32]),
            body: vec![],
        };
        assert_eq!(
            resolve_block(def, &[7], &multi).unwrap(),
            Immediate::Block {
                block_type: BlockType::FuncType(7),
                body: vec![]
            }
        );
    }
}
