//! Module construction.
//!
//! A [`ModuleBuilder`] owns every entity declared for one module: functions,
//! imports, globals, tables and memories. Function bodies are built through a
//! [`LocalContext`], which checks each instruction against the operand stack
//! as it is appended and records references to other entities as
//! [`Dependency`] values. Nothing has an index until [`ModuleBuilder::build`]:
//! it walks the dependency graph from the exports and start function, numbers
//! the reachable entities and resolves every body into a [`Module`].
//!
//! ```ignore
//! let mut b = ModuleBuilder::new();
//! let add5 = b.func(FunctionType::new(&[I32, I32], &[I32]), |c| {
//!     let x = c.param(0)?;
//!     let y = c.param(1)?;
//!     let sum = c.binary("i32.add", x, y)?;
//!     c.binary("i32.add", sum, 5)?;
//!     Ok(())
//! })?;
//! let module = b.build(&ModuleConfig::new().export("f", &add5))?;
//! ```

mod const_expr;
mod context;
mod dependency;
mod error;
mod ops;
mod resolver;

pub use const_expr::ConstExpr;
pub use context::{FrameKind, Input, Label, Local, LocalContext, StackVar, Target};
pub use dependency::{
    flatten_deps, CallArgs, Created, Dependency, FuncId, FuncRef, GlobalId, GlobalRef, MemoryId, MemoryRef,
    PendingInstruction, ResolveArgs, TableId, TableRef,
};
pub use error::BuildError;

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use self::resolver::IndexTable;
use crate::parser::instruction::{Immediate, Instruction};
use crate::parser::module::{
    Data, DataMode, Element, ElementMode, Export, ExportKind, Function, FunctionType, Global, GlobalType, Import,
    ImportDesc, MemoryType, Module, TableType, ValueType,
};

const PAGE_SIZE: u64 = 65536;

#[derive(Debug, Clone)]
struct ImportName {
    module: String,
    name: String,
}

#[derive(Debug)]
enum FuncBody {
    /// Declared ahead of its definition, e.g. for recursion.
    Pending,
    Defined {
        locals: Vec<ValueType>,
        body: Vec<PendingInstruction>,
    },
    Imported(ImportName),
}

#[derive(Debug)]
struct FuncEntry {
    ty: FunctionType,
    body: FuncBody,
}

#[derive(Debug)]
enum GlobalInit {
    Defined(ConstExpr),
    Imported(ImportName),
}

#[derive(Debug)]
struct GlobalEntry {
    ty: GlobalType,
    init: GlobalInit,
}

#[derive(Debug)]
struct TableEntry {
    ty: TableType,
    elements: Option<Vec<ConstExpr>>,
    import: Option<ImportName>,
}

#[derive(Debug)]
struct MemoryEntry {
    ty: MemoryType,
    data: Option<Vec<u8>>,
    import: Option<ImportName>,
}

/// Anything that can be exported.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Function(FuncRef),
    Global(GlobalRef),
    Table(TableRef),
    Memory(MemoryRef),
}

impl Entity {
    fn dependency(&self) -> Dependency {
        match self {
            Entity::Function(f) => Dependency::Function(f.id),
            Entity::Global(g) => Dependency::Global(g.id),
            Entity::Table(t) => Dependency::Table(t.id),
            Entity::Memory(m) => Dependency::Memory(m.id),
        }
    }
}

impl From<&FuncRef> for Entity {
    fn from(f: &FuncRef) -> Entity {
        Entity::Function(f.clone())
    }
}

impl From<FuncRef> for Entity {
    fn from(f: FuncRef) -> Entity {
        Entity::Function(f)
    }
}

impl From<GlobalRef> for Entity {
    fn from(g: GlobalRef) -> Entity {
        Entity::Global(g)
    }
}

impl From<TableRef> for Entity {
    fn from(t: TableRef) -> Entity {
        Entity::Table(t)
    }
}

impl From<MemoryRef> for Entity {
    fn from(m: MemoryRef) -> Entity {
        Entity::Memory(m)
    }
}

/// Roots of the module: exports, in order, and the start function.
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    exports: Vec<(String, Entity)>,
    start: Option<FuncRef>,
}

impl ModuleConfig {
    pub fn new() -> ModuleConfig {
        ModuleConfig::default()
    }

    pub fn export(mut self, name: impl Into<String>, entity: impl Into<Entity>) -> ModuleConfig {
        self.exports.push((name.into(), entity.into()));
        self
    }

    pub fn start(mut self, func: &FuncRef) -> ModuleConfig {
        self.start = Some(func.clone());
        self
    }
}

#[derive(Debug, Default)]
pub struct ModuleBuilder {
    funcs: Vec<FuncEntry>,
    globals: Vec<GlobalEntry>,
    tables: Vec<TableEntry>,
    memories: Vec<MemoryEntry>,
}

impl ModuleBuilder {
    pub fn new() -> ModuleBuilder {
        ModuleBuilder::default()
    }

    // Functions ---------------------------------------------------------------

    /// Reserves a function whose body is supplied later with
    /// [`define_func`](Self::define_func).
    pub fn declare_func(&mut self, ty: FunctionType) -> FuncRef {
        self.push_func(ty, FuncBody::Pending)
    }

    pub fn define_func<F>(&mut self, func: &FuncRef, build: F) -> Result<(), BuildError>
    where
        F: FnOnce(&mut LocalContext) -> Result<(), BuildError>,
    {
        let entry = self
            .funcs
            .get(func.id.0)
            .filter(|e| e.ty == func.ty)
            .ok_or_else(|| BuildError::invalid_arguments("define_func", "function belongs to another builder"))?;
        if !matches!(entry.body, FuncBody::Pending) {
            return Err(BuildError::invalid_arguments(
                "define_func",
                format!("function {} already has a body", func.id.0),
            ));
        }
        let body = build_body(&func.ty, build)?;
        self.funcs[func.id.0].body = body;
        Ok(())
    }

    /// Builds a function body; on error nothing is added to the module.
    pub fn func<F>(&mut self, ty: FunctionType, build: F) -> Result<FuncRef, BuildError>
    where
        F: FnOnce(&mut LocalContext) -> Result<(), BuildError>,
    {
        let body = build_body(&ty, build)?;
        Ok(self.push_func(ty, body))
    }

    pub fn import_func(&mut self, module: &str, name: &str, ty: FunctionType) -> FuncRef {
        self.push_func(ty, FuncBody::Imported(import_name(module, name)))
    }

    fn push_func(&mut self, ty: FunctionType, body: FuncBody) -> FuncRef {
        let id = FuncId(self.funcs.len());
        self.funcs.push(FuncEntry { ty: ty.clone(), body });
        FuncRef { id, ty }
    }

    // Globals -----------------------------------------------------------------

    pub fn global(&mut self, init: impl Into<ConstExpr>, mutable: bool) -> Result<GlobalRef, BuildError> {
        let init = init.into();
        self.check_const(&init)?;
        let ty = GlobalType {
            value_type: init.ty(),
            mutable,
        };
        Ok(self.push_global(ty, GlobalInit::Defined(init)))
    }

    pub fn import_global(&mut self, module: &str, name: &str, ty: GlobalType) -> GlobalRef {
        self.push_global(ty, GlobalInit::Imported(import_name(module, name)))
    }

    fn push_global(&mut self, ty: GlobalType, init: GlobalInit) -> GlobalRef {
        let id = GlobalId(self.globals.len());
        self.globals.push(GlobalEntry { ty, init });
        GlobalRef { id, ty }
    }

    /// Constant expressions may only read imported globals.
    fn check_const(&self, expr: &ConstExpr) -> Result<(), BuildError> {
        expr.check()?;
        if let ConstExpr::GlobalGet(global) = expr {
            match self.globals.get(global.id.0) {
                Some(GlobalEntry {
                    init: GlobalInit::Imported(_),
                    ..
                }) => {}
                _ => {
                    return Err(BuildError::invalid_arguments(
                        "global.get",
                        "constant expressions can only read imported globals",
                    ))
                }
            }
        }
        Ok(())
    }

    // Tables and memories -----------------------------------------------------

    /// A table, optionally initialised from slot 0 with `elements`.
    pub fn table(&mut self, ty: TableType, elements: Option<Vec<ConstExpr>>) -> Result<TableRef, BuildError> {
        self.push_table(ty, elements, None)
    }

    pub fn import_table(&mut self, module: &str, name: &str, ty: TableType) -> Result<TableRef, BuildError> {
        self.push_table(ty, None, Some(import_name(module, name)))
    }

    fn push_table(
        &mut self,
        ty: TableType,
        elements: Option<Vec<ConstExpr>>,
        import: Option<ImportName>,
    ) -> Result<TableRef, BuildError> {
        if !ty.ref_type.is_ref() {
            return Err(BuildError::invalid_arguments(
                "table",
                format!("{} is not a reference type", ty.ref_type),
            ));
        }
        for expr in elements.iter().flatten() {
            self.check_const(expr)?;
            if expr.ty() != ty.ref_type {
                return Err(BuildError::invalid_arguments(
                    "table",
                    format!("{} element in a {} table", expr.ty(), ty.ref_type),
                ));
            }
        }
        let count = elements.as_ref().map_or(0, Vec::len);
        if count as u64 > ty.limits.min as u64 {
            return Err(BuildError::invalid_arguments(
                "table",
                format!("{count} elements do not fit in {} slots", ty.limits.min),
            ));
        }
        let id = TableId(self.tables.len());
        self.tables.push(TableEntry { ty, elements, import });
        Ok(TableRef { id, ty })
    }

    /// A memory, optionally initialised from address 0 with `data`.
    pub fn memory(&mut self, ty: MemoryType, data: Option<Vec<u8>>) -> Result<MemoryRef, BuildError> {
        self.push_memory(ty, data, None)
    }

    pub fn import_memory(
        &mut self,
        module: &str,
        name: &str,
        ty: MemoryType,
        data: Option<Vec<u8>>,
    ) -> Result<MemoryRef, BuildError> {
        self.push_memory(ty, data, Some(import_name(module, name)))
    }

    fn push_memory(
        &mut self,
        ty: MemoryType,
        data: Option<Vec<u8>>,
        import: Option<ImportName>,
    ) -> Result<MemoryRef, BuildError> {
        if ty.shared && ty.limits.max.is_none() {
            return Err(BuildError::invalid_arguments("memory", "shared memory needs a maximum"));
        }
        let len = data.as_ref().map_or(0, Vec::len) as u64;
        if len > ty.limits.min as u64 * PAGE_SIZE {
            return Err(BuildError::invalid_arguments(
                "memory",
                format!("{len} bytes of data do not fit in {} pages", ty.limits.min),
            ));
        }
        let id = MemoryId(self.memories.len());
        self.memories.push(MemoryEntry { ty, data, import });
        Ok(MemoryRef { id, ty })
    }

    // Build -------------------------------------------------------------------

    /// Computes the entities reachable from `config`, assigns their indices
    /// and resolves every body into a frozen [`Module`].
    pub fn build(&self, config: &ModuleConfig) -> Result<Module, BuildError> {
        let mut seen = HashSet::new();
        for (name, _) in &config.exports {
            if !seen.insert(name.as_str()) {
                return Err(BuildError::DuplicateExport(name.clone()));
            }
        }

        let reach = self.reachable(config)?;
        debug!(
            "reachable: {} of {} functions, {} of {} globals, {} of {} tables, {} of {} memories",
            reach.funcs.len(),
            self.funcs.len(),
            reach.globals.len(),
            self.globals.len(),
            reach.tables.len(),
            self.tables.len(),
            reach.memories.len(),
            self.memories.len()
        );

        let order = Order::new(self, &reach);
        let indices = self.assign_indices(&order)?;
        self.assemble(config, &reach, &order, &indices)
    }

    /// Closure over dependency edges starting at the exports and start.
    fn reachable(&self, config: &ModuleConfig) -> Result<Reach, BuildError> {
        let mut reach = Reach::default();
        let mut queue: VecDeque<Dependency> = config.exports.iter().map(|(_, e)| e.dependency()).collect();
        if let Some(start) = &config.start {
            queue.push_back(Dependency::Function(start.id));
        }
        let mut needs_memory = false;

        while let Some(dep) = queue.pop_front() {
            match dep {
                Dependency::Function(id) => {
                    if !reach.funcs.insert(id) {
                        continue;
                    }
                    let entry = self.func_entry(id)?;
                    match &entry.body {
                        FuncBody::Defined { body, .. } => queue.extend(flatten_deps(body).cloned()),
                        FuncBody::Imported(_) => {}
                        FuncBody::Pending => return Err(BuildError::UndefinedFunction(id.0)),
                    }
                }
                Dependency::Global(id) => {
                    if !reach.globals.insert(id) {
                        continue;
                    }
                    let entry = self
                        .globals
                        .get(id.0)
                        .ok_or_else(|| BuildError::UnresolvedDependency(dep.to_string()))?;
                    if let GlobalInit::Defined(init) = &entry.init {
                        queue.extend(init.deps());
                    }
                }
                Dependency::Table(id) => {
                    if !reach.tables.insert(id) {
                        continue;
                    }
                    let entry = self
                        .tables
                        .get(id.0)
                        .ok_or_else(|| BuildError::UnresolvedDependency(dep.to_string()))?;
                    queue.extend(entry.elements.iter().flatten().filter_map(ConstExpr::deps));
                }
                Dependency::Memory(id) => {
                    if id.0 >= self.memories.len() {
                        return Err(BuildError::UnresolvedDependency(dep.to_string()));
                    }
                    reach.memories.insert(id);
                }
                Dependency::Type(_) => {}
                Dependency::HasMemory => needs_memory = true,
                Dependency::HasRefTo(id) => {
                    if !reach.declared_refs.contains(&id) {
                        reach.declared_refs.push(id);
                    }
                }
            }
        }

        if needs_memory && reach.memories.is_empty() {
            if self.memories.is_empty() {
                return Err(BuildError::MissingMemory);
            }
            reach.memories.insert(MemoryId(0));
        }
        Ok(reach)
    }

    fn func_entry(&self, id: FuncId) -> Result<&FuncEntry, BuildError> {
        self.funcs
            .get(id.0)
            .ok_or_else(|| BuildError::UnresolvedDependency(Dependency::Function(id).to_string()))
    }

    fn assign_indices(&self, order: &Order) -> Result<IndexTable, BuildError> {
        let mut indices = IndexTable::default();
        indices.functions = numbered(&order.funcs);
        indices.globals = numbered(&order.globals);
        indices.tables = numbered(&order.tables);
        indices.memories = numbered(&order.memories);

        // signatures first, in function-index order, then block and
        // call_indirect types in body order
        let mut types = Vec::new();
        for &id in &order.funcs {
            types.push(self.func_entry(id)?.ty.clone());
        }
        for &id in &order.funcs {
            if let FuncBody::Defined { body, .. } = &self.func_entry(id)?.body {
                for dep in flatten_deps(body) {
                    if let Dependency::Type(ty) = dep {
                        types.push(ty.clone());
                    }
                }
            }
        }
        for ty in types {
            let next = indices.types.len() as u32;
            indices.types.entry(ty).or_insert(next);
        }
        Ok(indices)
    }

    fn assemble(
        &self,
        config: &ModuleConfig,
        reach: &Reach,
        order: &Order,
        indices: &IndexTable,
    ) -> Result<Module, BuildError> {
        let mut module = Module::default();

        let mut types: Vec<(u32, &FunctionType)> = indices.types.iter().map(|(ty, &i)| (i, ty)).collect();
        types.sort_by_key(|&(i, _)| i);
        module.types = types.into_iter().map(|(_, ty)| ty.clone()).collect();

        for &id in &order.funcs {
            let entry = self.func_entry(id)?;
            let type_index = indices.type_index(&entry.ty)?;
            match &entry.body {
                FuncBody::Imported(import) => module.imports.push(Import {
                    module: import.module.clone(),
                    name: import.name.clone(),
                    desc: ImportDesc::Function(type_index),
                }),
                FuncBody::Defined { locals, body } => module.functions.push(Function {
                    type_index,
                    locals: locals.clone(),
                    body: indices.resolve_body(body)?,
                }),
                FuncBody::Pending => return Err(BuildError::UndefinedFunction(id.0)),
            }
        }
        for &id in &order.tables {
            let entry = &self.tables[id.0];
            match &entry.import {
                Some(import) => module.imports.push(import_of(import, ImportDesc::Table(entry.ty))),
                None => module.tables.push(entry.ty),
            }
        }
        for &id in &order.memories {
            let entry = &self.memories[id.0];
            match &entry.import {
                Some(import) => module.imports.push(import_of(import, ImportDesc::Memory(entry.ty))),
                None => module.memories.push(entry.ty),
            }
        }
        for &id in &order.globals {
            let entry = &self.globals[id.0];
            match &entry.init {
                GlobalInit::Imported(import) => module.imports.push(import_of(import, ImportDesc::Global(entry.ty))),
                GlobalInit::Defined(init) => module.globals.push(Global {
                    global_type: entry.ty,
                    init: init.resolve(indices)?,
                }),
            }
        }

        for (name, entity) in &config.exports {
            let dep = entity.dependency();
            let kind = match entity {
                Entity::Function(_) => ExportKind::Function,
                Entity::Global(_) => ExportKind::Global,
                Entity::Table(_) => ExportKind::Table,
                Entity::Memory(_) => ExportKind::Memory,
            };
            module.exports.push(Export {
                name: name.clone(),
                kind,
                index: indices.index(&dep)?,
            });
        }
        if let Some(start) = &config.start {
            module.start = Some(indices.index(&Dependency::Function(start.id))?);
        }

        let zero = || vec![Instruction::new("i32.const", Immediate::I32(0))];
        for &id in &order.tables {
            let entry = &self.tables[id.0];
            if let Some(elements) = &entry.elements {
                module.elements.push(Element {
                    mode: ElementMode::Active {
                        table_index: indices.index(&Dependency::Table(id))?,
                        offset: zero(),
                    },
                    ref_type: entry.ty.ref_type,
                    init: elements
                        .iter()
                        .map(|e| e.resolve(indices))
                        .collect::<Result<Vec<_>, _>>()?,
                });
            }
        }
        if !reach.declared_refs.is_empty() {
            let init = reach
                .declared_refs
                .iter()
                .map(|&id| {
                    let index = indices.index(&Dependency::Function(id))?;
                    Ok(vec![Instruction::new("ref.func", Immediate::Index(index))])
                })
                .collect::<Result<Vec<_>, BuildError>>()?;
            module.elements.push(Element {
                mode: ElementMode::Declarative,
                ref_type: ValueType::FuncRef,
                init,
            });
        }

        for &id in &order.memories {
            if let Some(data) = &self.memories[id.0].data {
                module.data.push(Data {
                    mode: DataMode::Active {
                        memory_index: indices.index(&Dependency::Memory(id))?,
                        offset: zero(),
                    },
                    init: data.clone(),
                });
            }
        }

        debug!(
            "built module: {} types, {} imports, {} functions, {} exports",
            module.types.len(),
            module.imports.len(),
            module.functions.len(),
            module.exports.len()
        );
        Ok(module)
    }
}

fn build_body<F>(ty: &FunctionType, build: F) -> Result<FuncBody, BuildError>
where
    F: FnOnce(&mut LocalContext) -> Result<(), BuildError>,
{
    let mut ctx = LocalContext::for_function(ty);
    build(&mut ctx)?;
    let (locals, body) = ctx.finish_function()?;
    Ok(FuncBody::Defined { locals, body })
}

fn import_name(module: &str, name: &str) -> ImportName {
    ImportName {
        module: module.to_string(),
        name: name.to_string(),
    }
}

fn import_of(import: &ImportName, desc: ImportDesc) -> Import {
    Import {
        module: import.module.clone(),
        name: import.name.clone(),
        desc,
    }
}

fn numbered<K: Copy + Eq + std::hash::Hash>(ids: &[K]) -> HashMap<K, u32> {
    ids.iter().enumerate().map(|(i, &id)| (id, i as u32)).collect()
}

#[derive(Debug, Default)]
struct Reach {
    funcs: HashSet<FuncId>,
    globals: HashSet<GlobalId>,
    tables: HashSet<TableId>,
    memories: HashSet<MemoryId>,
    /// Functions named by `ref.func` in code, in first-seen order.
    declared_refs: Vec<FuncId>,
}

/// Reachable entities in index order: imports first, then definitions, each
/// in declaration order.
struct Order {
    funcs: Vec<FuncId>,
    globals: Vec<GlobalId>,
    tables: Vec<TableId>,
    memories: Vec<MemoryId>,
}

impl Order {
    fn new(b: &ModuleBuilder, reach: &Reach) -> Order {
        fn split<T, I>(
            entries: &[T],
            reached: impl Fn(usize) -> bool,
            imported: impl Fn(&T) -> bool,
            id: impl Fn(usize) -> I,
        ) -> Vec<I> {
            let mut ids = Vec::new();
            let mut defined = Vec::new();
            for (i, entry) in entries.iter().enumerate() {
                if !reached(i) {
                    continue;
                }
                if imported(entry) {
                    ids.push(id(i));
                } else {
                    defined.push(id(i));
                }
            }
            ids.extend(defined);
            ids
        }

        Order {
            funcs: split(
                &b.funcs,
                |i| reach.funcs.contains(&FuncId(i)),
                |e| matches!(e.body, FuncBody::Imported(_)),
                FuncId,
            ),
            globals: split(
                &b.globals,
                |i| reach.globals.contains(&GlobalId(i)),
                |e| matches!(e.init, GlobalInit::Imported(_)),
                GlobalId,
            ),
            tables: split(
                &b.tables,
                |i| reach.tables.contains(&TableId(i)),
                |e| e.import.is_some(),
                TableId,
            ),
            memories: split(
                &b.memories,
                |i| reach.memories.contains(&MemoryId(i)),
                |e| e.import.is_some(),
                MemoryId,
            ),
        }
    }
}
