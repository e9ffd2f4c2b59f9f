//! Index assignment for reachable entities.

use std::collections::HashMap;

use super::dependency::{flatten_deps, Dependency, FuncId, GlobalId, MemoryId, PendingInstruction, TableId};
use super::error::BuildError;
use crate::parser::instruction::Instruction;
use crate::parser::module::FunctionType;
use crate::registry::resolve::resolve_sequence;

/// Final indices of everything that made it into the module.
#[derive(Debug, Default)]
pub(crate) struct IndexTable {
    pub functions: HashMap<FuncId, u32>,
    pub globals: HashMap<GlobalId, u32>,
    pub tables: HashMap<TableId, u32>,
    pub memories: HashMap<MemoryId, u32>,
    pub types: HashMap<FunctionType, u32>,
}

fn lookup<K: std::hash::Hash + Eq>(map: &HashMap<K, u32>, key: &K, dep: &Dependency) -> Result<u32, BuildError> {
    map.get(key)
        .copied()
        .ok_or_else(|| BuildError::UnresolvedDependency(dep.to_string()))
}

impl IndexTable {
    /// Index of one dependency. The structural markers carry no index of
    /// their own and resolve to 0.
    pub fn index(&self, dep: &Dependency) -> Result<u32, BuildError> {
        match dep {
            Dependency::Function(id) => lookup(&self.functions, id, dep),
            Dependency::Global(id) => lookup(&self.globals, id, dep),
            Dependency::Table(id) => lookup(&self.tables, id, dep),
            Dependency::Memory(id) => lookup(&self.memories, id, dep),
            Dependency::Type(ty) => lookup(&self.types, ty, dep),
            Dependency::HasMemory | Dependency::HasRefTo(_) => Ok(0),
        }
    }

    pub fn type_index(&self, ty: &FunctionType) -> Result<u32, BuildError> {
        lookup(&self.types, ty, &Dependency::Type(ty.clone()))
    }

    /// Resolves a body: every dependency, in order, to its index, then each
    /// instruction's resolve step over its own slice.
    pub fn resolve_body(&self, body: &[PendingInstruction]) -> Result<Vec<Instruction>, BuildError> {
        let indices = flatten_deps(body)
            .map(|dep| self.index(dep))
            .collect::<Result<Vec<_>, _>>()?;
        resolve_sequence(body, &indices)
    }
}
