//! Typed shorthands over [`LocalContext::instr`].
//!
//! Each helper names its operands explicitly and returns the produced
//! value, so bodies read close to the stack code they emit. Anything not
//! covered here can still be built with [`LocalContext::instr`].

use super::context::{Input, Local, LocalContext, StackVar, Target};
use super::dependency::{CallArgs, FuncRef, GlobalRef, TableRef};
use super::error::BuildError;
use crate::parser::instruction::Immediate;
use crate::parser::module::{FunctionType, ValueType};

fn single(name: &str, mut vars: Vec<StackVar>) -> Result<StackVar, BuildError> {
    match vars.pop() {
        Some(var) if vars.is_empty() => Ok(var),
        _ => Err(BuildError::invalid_operand(name, "does not produce exactly one value")),
    }
}

impl LocalContext {
    fn constant(&mut self, name: &str, imm: Immediate) -> Result<StackVar, BuildError> {
        let vars = self.instr(name, CallArgs::Immediate(imm), &[])?;
        single(name, vars)
    }

    pub fn i32_const(&mut self, value: i32) -> Result<StackVar, BuildError> {
        self.constant("i32.const", Immediate::I32(value))
    }

    pub fn i64_const(&mut self, value: i64) -> Result<StackVar, BuildError> {
        self.constant("i64.const", Immediate::I64(value))
    }

    pub fn f32_const(&mut self, value: f32) -> Result<StackVar, BuildError> {
        self.constant("f32.const", Immediate::F32(value))
    }

    pub fn f64_const(&mut self, value: f64) -> Result<StackVar, BuildError> {
        self.constant("f64.const", Immediate::F64(value))
    }

    /// `v128.const` from its little-endian bytes.
    pub fn v128_const(&mut self, bytes: [u8; 16]) -> Result<StackVar, BuildError> {
        self.constant("v128.const", Immediate::V128(bytes))
    }

    // Variables ---------------------------------------------------------------

    pub fn local_get(&mut self, local: Local) -> Result<StackVar, BuildError> {
        let vars = self.instr("local.get", CallArgs::Local(local), &[])?;
        single("local.get", vars)
    }

    pub fn local_set(&mut self, local: Local, value: impl Into<Input>) -> Result<(), BuildError> {
        self.instr("local.set", CallArgs::Local(local), &[value.into()])?;
        Ok(())
    }

    pub fn local_tee(&mut self, local: Local, value: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.instr("local.tee", CallArgs::Local(local), &[value.into()])?;
        single("local.tee", vars)
    }

    pub fn global_get(&mut self, global: GlobalRef) -> Result<StackVar, BuildError> {
        let vars = self.instr("global.get", CallArgs::Global(global), &[])?;
        single("global.get", vars)
    }

    pub fn global_set(&mut self, global: GlobalRef, value: impl Into<Input>) -> Result<(), BuildError> {
        self.instr("global.set", CallArgs::Global(global), &[value.into()])?;
        Ok(())
    }

    // Calls and branches ------------------------------------------------------

    /// Calls `func`; `args` are the call's operands in order, or empty when
    /// they are already on the stack.
    pub fn call(&mut self, func: &FuncRef, args: &[Input]) -> Result<Vec<StackVar>, BuildError> {
        self.instr("call", CallArgs::Func(func.clone()), args)
    }

    /// Indirect call through `table`; the last operand is the table slot.
    pub fn call_indirect(
        &mut self,
        table: TableRef,
        ty: FunctionType,
        args: &[Input],
    ) -> Result<Vec<StackVar>, BuildError> {
        self.instr("call_indirect", CallArgs::CallIndirect { table, ty }, args)
    }

    pub fn return_(&mut self, values: &[Input]) -> Result<(), BuildError> {
        self.instr("return", CallArgs::None, values)?;
        Ok(())
    }

    pub fn unreachable(&mut self) -> Result<(), BuildError> {
        self.emit("unreachable", &[])?;
        Ok(())
    }

    pub fn nop(&mut self) -> Result<(), BuildError> {
        self.emit("nop", &[])?;
        Ok(())
    }

    /// Branches to `target`, passing the label's values from the stack.
    pub fn br(&mut self, target: impl Into<Target>) -> Result<(), BuildError> {
        self.instr("br", CallArgs::Branch(target.into()), &[])?;
        Ok(())
    }

    /// Conditional branch. The label's values stay on the stack for the
    /// fallthrough path and are returned.
    pub fn br_if(&mut self, target: impl Into<Target>, cond: impl Into<Input>) -> Result<Vec<StackVar>, BuildError> {
        self.instr("br_if", CallArgs::Branch(target.into()), &[cond.into()])
    }

    pub fn br_table(
        &mut self,
        targets: &[Target],
        default: impl Into<Target>,
        index: impl Into<Input>,
    ) -> Result<(), BuildError> {
        let args = CallArgs::BrTable {
            targets: targets.to_vec(),
            default: default.into(),
        };
        self.instr("br_table", args, &[index.into()])?;
        Ok(())
    }

    // Parametric --------------------------------------------------------------

    pub fn drop(&mut self, value: impl Into<Input>) -> Result<(), BuildError> {
        self.emit("drop", &[value.into()])?;
        Ok(())
    }

    pub fn select(
        &mut self,
        a: impl Into<Input>,
        b: impl Into<Input>,
        cond: impl Into<Input>,
    ) -> Result<StackVar, BuildError> {
        let vars = self.emit("select", &[a.into(), b.into(), cond.into()])?;
        single("select", vars)
    }

    /// `select` with an explicit operand type; required for references.
    pub fn select_typed(
        &mut self,
        ty: ValueType,
        a: impl Into<Input>,
        b: impl Into<Input>,
        cond: impl Into<Input>,
    ) -> Result<StackVar, BuildError> {
        let vars = self.instr("select.typed", CallArgs::Type(ty), &[a.into(), b.into(), cond.into()])?;
        single("select.typed", vars)
    }

    // References --------------------------------------------------------------

    pub fn ref_null(&mut self, ty: ValueType) -> Result<StackVar, BuildError> {
        let vars = self.instr("ref.null", CallArgs::Type(ty), &[])?;
        single("ref.null", vars)
    }

    pub fn ref_func(&mut self, func: &FuncRef) -> Result<StackVar, BuildError> {
        let vars = self.instr("ref.func", CallArgs::Func(func.clone()), &[])?;
        single("ref.func", vars)
    }

    pub fn ref_is_null(&mut self, value: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.emit("ref.is_null", &[value.into()])?;
        single("ref.is_null", vars)
    }

    // Memory ------------------------------------------------------------------

    /// A naturally aligned load such as `i32.load` or `i64.load8_u`.
    pub fn load(&mut self, name: &str, offset: u32, addr: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.instr(name, CallArgs::MemArg { offset, align: None }, &[addr.into()])?;
        single(name, vars)
    }

    pub fn store(
        &mut self,
        name: &str,
        offset: u32,
        addr: impl Into<Input>,
        value: impl Into<Input>,
    ) -> Result<(), BuildError> {
        self.instr(name, CallArgs::MemArg { offset, align: None }, &[addr.into(), value.into()])?;
        Ok(())
    }

    pub fn memory_size(&mut self) -> Result<StackVar, BuildError> {
        let vars = self.emit("memory.size", &[])?;
        single("memory.size", vars)
    }

    /// Grows memory by `delta` pages; yields the old size or -1.
    pub fn memory_grow(&mut self, delta: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.emit("memory.grow", &[delta.into()])?;
        single("memory.grow", vars)
    }

    pub fn memory_copy(
        &mut self,
        dst: impl Into<Input>,
        src: impl Into<Input>,
        len: impl Into<Input>,
    ) -> Result<(), BuildError> {
        self.emit("memory.copy", &[dst.into(), src.into(), len.into()])?;
        Ok(())
    }

    pub fn memory_fill(
        &mut self,
        dst: impl Into<Input>,
        value: impl Into<Input>,
        len: impl Into<Input>,
    ) -> Result<(), BuildError> {
        self.emit("memory.fill", &[dst.into(), value.into(), len.into()])?;
        Ok(())
    }

    // Tables ------------------------------------------------------------------

    pub fn table_get(&mut self, table: TableRef, index: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.instr("table.get", CallArgs::Table(table), &[index.into()])?;
        single("table.get", vars)
    }

    pub fn table_set(
        &mut self,
        table: TableRef,
        index: impl Into<Input>,
        value: impl Into<Input>,
    ) -> Result<(), BuildError> {
        self.instr("table.set", CallArgs::Table(table), &[index.into(), value.into()])?;
        Ok(())
    }

    pub fn table_size(&mut self, table: TableRef) -> Result<StackVar, BuildError> {
        let vars = self.instr("table.size", CallArgs::Table(table), &[])?;
        single("table.size", vars)
    }

    pub fn table_grow(
        &mut self,
        table: TableRef,
        init: impl Into<Input>,
        delta: impl Into<Input>,
    ) -> Result<StackVar, BuildError> {
        let vars = self.instr("table.grow", CallArgs::Table(table), &[init.into(), delta.into()])?;
        single("table.grow", vars)
    }

    pub fn table_fill(
        &mut self,
        table: TableRef,
        start: impl Into<Input>,
        value: impl Into<Input>,
        len: impl Into<Input>,
    ) -> Result<(), BuildError> {
        self.instr(
            "table.fill",
            CallArgs::Table(table),
            &[start.into(), value.into(), len.into()],
        )?;
        Ok(())
    }

    pub fn table_copy(
        &mut self,
        dst: TableRef,
        src: TableRef,
        dst_start: impl Into<Input>,
        src_start: impl Into<Input>,
        len: impl Into<Input>,
    ) -> Result<(), BuildError> {
        self.instr(
            "table.copy",
            CallArgs::TableCopy { dst, src },
            &[dst_start.into(), src_start.into(), len.into()],
        )?;
        Ok(())
    }

    // SIMD and atomics --------------------------------------------------------

    pub fn extract_lane(&mut self, name: &str, lane: u8, vector: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.instr(name, CallArgs::Lane(lane), &[vector.into()])?;
        single(name, vars)
    }

    pub fn replace_lane(
        &mut self,
        name: &str,
        lane: u8,
        vector: impl Into<Input>,
        value: impl Into<Input>,
    ) -> Result<StackVar, BuildError> {
        let vars = self.instr(name, CallArgs::Lane(lane), &[vector.into(), value.into()])?;
        single(name, vars)
    }

    pub fn shuffle(&mut self, lanes: [u8; 16], a: impl Into<Input>, b: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.instr(
            "i8x16.shuffle",
            CallArgs::Immediate(Immediate::Shuffle(lanes)),
            &[a.into(), b.into()],
        )?;
        single("i8x16.shuffle", vars)
    }

    pub fn atomic_fence(&mut self) -> Result<(), BuildError> {
        self.emit("atomic.fence", &[])?;
        Ok(())
    }

    // Generic -----------------------------------------------------------------

    pub fn unary(&mut self, name: &str, a: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.emit(name, &[a.into()])?;
        single(name, vars)
    }

    pub fn binary(&mut self, name: &str, a: impl Into<Input>, b: impl Into<Input>) -> Result<StackVar, BuildError> {
        let vars = self.emit(name, &[a.into(), b.into()])?;
        single(name, vars)
    }
}
