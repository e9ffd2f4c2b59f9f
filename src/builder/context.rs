//! Per-body construction state and the stack type checker.
//!
//! A [`LocalContext`] is created for each function body. It tracks the
//! operand stack as typed [`StackVar`]s and the nesting of control frames,
//! and checks every instruction against both as it is appended. Nested
//! blocks get the same context back in their closure; the frame stack is
//! explicit, nothing is threaded through globals.

use std::fmt;
use std::iter;
use std::mem;

use tracing::trace;

use super::dependency::{CallArgs, GlobalRef, PendingInstruction};
use super::error::BuildError;
use crate::parser::instruction::{Immediate, ImmediateKind};
use crate::parser::module::{format_types, FunctionType, ValueType};
use crate::registry::{registry, InstructionDef};

/// One value on the operand stack. Ids are unique within a body, so a var
/// identifies a specific value, not just a stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StackVar {
    id: u32,
    ty: ValueType,
}

impl StackVar {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }
}

impl fmt::Display for StackVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}:{}", self.id, self.ty)
    }
}

/// A parameter or declared local of the function being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Local {
    index: u32,
    ty: ValueType,
}

impl Local {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }
}

/// Identity of a control frame, handed to the closure that builds its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A branch target: an enclosing frame's label, or a relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Label(Label),
    Depth(u32),
}

impl From<Label> for Target {
    fn from(label: Label) -> Target {
        Target::Label(label)
    }
}

impl From<u32> for Target {
    fn from(depth: u32) -> Target {
        Target::Depth(depth)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Label(label) => write!(f, "{label}"),
            Target::Depth(depth) => write!(f, "depth {depth}"),
        }
    }
}

/// An operand for [`LocalContext::instr`].
///
/// `Stack` and `Var` take a value that is already on the stack; the others
/// are materialised with `local.get`, `global.get` or a constant right
/// before the instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    Stack,
    Var(StackVar),
    Local(Local),
    Global(GlobalRef),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Input {
    fn on_stack(&self) -> bool {
        matches!(self, Input::Stack | Input::Var(_))
    }
}

impl From<StackVar> for Input {
    fn from(var: StackVar) -> Input {
        Input::Var(var)
    }
}

impl From<Local> for Input {
    fn from(local: Local) -> Input {
        Input::Local(local)
    }
}

impl From<GlobalRef> for Input {
    fn from(global: GlobalRef) -> Input {
        Input::Global(global)
    }
}

impl From<i32> for Input {
    fn from(v: i32) -> Input {
        Input::I32(v)
    }
}

impl From<i64> for Input {
    fn from(v: i64) -> Input {
        Input::I64(v)
    }
}

impl From<f32> for Input {
    fn from(v: f32) -> Input {
        Input::F32(v)
    }
}

impl From<f64> for Input {
    fn from(v: f64) -> Input {
        Input::F64(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

impl FrameKind {
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Function => "function",
            FrameKind::Block => "block",
            FrameKind::Loop => "loop",
            FrameKind::If => "if",
            FrameKind::Else => "else",
        }
    }
}

#[derive(Debug)]
struct Frame {
    label: Label,
    kind: FrameKind,
    start_types: Vec<ValueType>,
    end_types: Vec<ValueType>,
    unreachable: bool,
    /// Operand stack height when the frame was entered.
    height: usize,
    /// Body of the enclosing construct, restored when this frame closes.
    outer_body: Vec<PendingInstruction>,
}

impl Frame {
    fn label_types(&self) -> &[ValueType] {
        match self.kind {
            FrameKind::Loop => &self.start_types,
            _ => &self.end_types,
        }
    }
}

pub struct LocalContext {
    body: Vec<PendingInstruction>,
    stack: Vec<StackVar>,
    frame: Frame,
    /// Enclosing frames, outermost first.
    outer: Vec<Frame>,
    locals: Vec<ValueType>,
    param_count: usize,
    next_var: u32,
    next_label: u32,
}

impl LocalContext {
    pub(crate) fn for_function(ty: &FunctionType) -> LocalContext {
        LocalContext {
            body: Vec::new(),
            stack: Vec::new(),
            frame: Frame {
                label: Label(0),
                kind: FrameKind::Function,
                start_types: Vec::new(),
                end_types: ty.results.clone(),
                unreachable: false,
                height: 0,
                outer_body: Vec::new(),
            },
            outer: Vec::new(),
            locals: ty.params.clone(),
            param_count: ty.params.len(),
            next_var: 0,
            next_label: 1,
        }
    }

    /// Checks the final stack against the function's results and returns
    /// the declared (non-parameter) locals and the body.
    pub(crate) fn finish_function(mut self) -> Result<(Vec<ValueType>, Vec<PendingInstruction>), BuildError> {
        if !self.outer.is_empty() {
            return Err(BuildError::UnbalancedStack {
                construct: "function".to_string(),
                expected: "closed blocks".to_string(),
                actual: format!("{} open frames", self.outer.len()),
            });
        }
        self.check_end()?;
        let locals = self.locals.split_off(self.param_count);
        Ok((locals, self.body))
    }

    // Locals ------------------------------------------------------------------

    pub fn param(&self, index: u32) -> Result<Local, BuildError> {
        let i = index as usize;
        if i >= self.param_count {
            return Err(BuildError::invalid_arguments(
                "param",
                format!("index {index} but the function has {} parameters", self.param_count),
            ));
        }
        Ok(Local {
            index,
            ty: self.locals[i],
        })
    }

    pub fn params(&self) -> Vec<Local> {
        self.locals[..self.param_count]
            .iter()
            .enumerate()
            .map(|(i, &ty)| Local { index: i as u32, ty })
            .collect()
    }

    /// Declares a new local.
    pub fn local(&mut self, ty: ValueType) -> Local {
        self.locals.push(ty);
        Local {
            index: (self.locals.len() - 1) as u32,
            ty,
        }
    }

    /// Type of a local, rejecting handles that do not belong to this body.
    pub fn local_type(&self, local: Local) -> Result<ValueType, BuildError> {
        match self.locals.get(local.index as usize) {
            Some(&ty) if ty == local.ty => Ok(ty),
            _ => Err(BuildError::UnknownLocal {
                index: local.index,
                ty: local.ty,
            }),
        }
    }

    // Stack inspection --------------------------------------------------------

    /// The whole operand stack, bottom first.
    pub fn stack(&self) -> &[StackVar] {
        &self.stack
    }

    /// Types of the values pushed inside the current frame.
    pub fn frame_types(&self) -> Vec<ValueType> {
        self.stack[self.frame.height..].iter().map(|v| v.ty).collect()
    }

    pub fn is_unreachable(&self) -> bool {
        self.frame.unreachable
    }

    /// Number of frames enclosing the current one.
    pub fn depth(&self) -> usize {
        self.outer.len()
    }

    pub fn label(&self) -> Label {
        self.frame.label
    }

    pub fn body(&self) -> &[PendingInstruction] {
        &self.body
    }

    /// Result types of the function being built.
    pub fn return_types(&self) -> &[ValueType] {
        match self.outer.first() {
            Some(function) => &function.end_types,
            None => &self.frame.end_types,
        }
    }

    /// Type of the value `depth` slots below the top, if it belongs to the
    /// current frame.
    pub fn peek_type(&self, depth: usize) -> Option<ValueType> {
        let available = self.stack.len() - self.frame.height;
        if depth < available {
            Some(self.stack[self.stack.len() - 1 - depth].ty)
        } else {
            None
        }
    }

    /// Relative depth and label types of a branch target.
    pub fn resolve_target(&self, target: Target) -> Result<(u32, &[ValueType]), BuildError> {
        let mut frames = iter::once(&self.frame).chain(self.outer.iter().rev());
        let found = match target {
            Target::Label(label) => frames
                .enumerate()
                .find(|(_, f)| f.label == label),
            Target::Depth(depth) => frames.nth(depth as usize).map(|f| (depth as usize, f)),
        };
        let (depth, frame) = found.ok_or_else(|| BuildError::UnknownLabel(target.to_string()))?;
        Ok((depth as u32, frame.label_types()))
    }

    /// Checks that the `types.len()` values below the top `skip` ones match
    /// `types`, without popping. In unreachable code, slots below the frame
    /// height match any type, but values pushed since must still agree.
    pub fn check_top(&self, instruction: &str, types: &[ValueType], skip: usize) -> Result<(), BuildError> {
        let available = self.stack.len() - self.frame.height;
        if !self.frame.unreachable && available < skip + types.len() {
            return Err(self.type_error(instruction, types));
        }
        let mismatch = types.iter().rev().enumerate().any(|(i, &ty)| {
            let depth = skip + i;
            depth < available && self.stack[self.stack.len() - 1 - depth].ty != ty
        });
        if mismatch {
            return Err(self.type_error(instruction, types));
        }
        Ok(())
    }

    // Stack effects -----------------------------------------------------------

    fn type_error(&self, instruction: &str, expected: &[ValueType]) -> BuildError {
        BuildError::StackType {
            instruction: instruction.to_string(),
            expected: format_types(expected),
            actual: format_types(&self.frame_types()),
        }
    }

    fn fresh(&mut self, ty: ValueType) -> StackVar {
        let var = StackVar { id: self.next_var, ty };
        self.next_var += 1;
        var
    }

    fn push_types(&mut self, types: &[ValueType]) -> Vec<StackVar> {
        let vars: Vec<StackVar> = types.iter().map(|&ty| self.fresh(ty)).collect();
        self.stack.extend(&vars);
        vars
    }

    /// Pops `types` (last one on top). Mismatches and underflow are errors
    /// unless the current frame is unreachable.
    fn pop_types(&mut self, instruction: &str, types: &[ValueType]) -> Result<(), BuildError> {
        self.check_top(instruction, types, 0)?;
        let available = self.stack.len() - self.frame.height;
        let keep = self.stack.len() - types.len().min(available);
        self.stack.truncate(keep);
        Ok(())
    }

    fn set_unreachable(&mut self) {
        self.stack.truncate(self.frame.height);
        self.frame.unreachable = true;
    }

    /// Runs an instruction's create step, applies its stack effect and
    /// appends it to the body.
    pub fn push_instruction(
        &mut self,
        def: &'static InstructionDef,
        args: CallArgs,
    ) -> Result<Vec<StackVar>, BuildError> {
        let created = (def.create)(def, self, args)?;
        self.pop_types(def.name, &created.params)?;
        let results = self.push_types(&created.results);
        trace!(
            "{}: [{}] -> [{}]",
            def.name,
            format_types(&created.params),
            format_types(&created.results)
        );
        self.body.push(PendingInstruction {
            def,
            deps: created.deps,
            params: created.params,
            results: created.results,
            args: created.args,
        });
        if created.diverges {
            self.set_unreachable();
        }
        Ok(results)
    }

    /// Appends instruction `name`, first materialising explicit `inputs`.
    ///
    /// `inputs` is either empty (all operands already on the stack) or lists
    /// the operands in order. On-stack operands come first; a `Var` must sit
    /// exactly in its operand slot, which also rejects a var that was already
    /// consumed. On error the body and stack are left as they were.
    pub fn instr(&mut self, name: &str, args: CallArgs, inputs: &[Input]) -> Result<Vec<StackVar>, BuildError> {
        let def = registry().lookup(name)?;
        if matches!(def.immediate, ImmediateKind::Block | ImmediateKind::If) {
            return Err(BuildError::invalid_arguments(
                def.name,
                "structured instructions are built with block, loop, if_ or if_else",
            ));
        }
        let (body_len, stack_len) = (self.body.len(), self.stack.len());
        let result = self
            .bind_inputs(def.name, inputs)
            .and_then(|()| self.push_instruction(def, args));
        if result.is_err() {
            self.body.truncate(body_len);
            self.stack.truncate(stack_len);
        }
        result
    }

    /// Appends an instruction that takes no immediate.
    pub fn emit(&mut self, name: &str, inputs: &[Input]) -> Result<Vec<StackVar>, BuildError> {
        self.instr(name, CallArgs::None, inputs)
    }

    fn bind_inputs(&mut self, name: &str, inputs: &[Input]) -> Result<(), BuildError> {
        let split = inputs.iter().position(|i| !i.on_stack()).unwrap_or(inputs.len());
        if inputs[split..].iter().any(Input::on_stack) {
            return Err(BuildError::invalid_operand(
                name,
                "stack operands must precede explicit ones",
            ));
        }

        for (i, input) in inputs[..split].iter().enumerate() {
            if let Input::Var(var) = input {
                let slot = (self.stack.len() + i).checked_sub(split);
                let in_place = slot
                    .filter(|&s| s >= self.frame.height)
                    .and_then(|s| self.stack.get(s))
                    .map_or(false, |v| v == var);
                if !in_place {
                    return Err(BuildError::invalid_operand(
                        name,
                        format!("{var} is not at operand position {i} (already consumed or out of order)"),
                    ));
                }
            }
        }

        for input in &inputs[split..] {
            self.materialise(*input)?;
        }
        Ok(())
    }

    fn materialise(&mut self, input: Input) -> Result<(), BuildError> {
        let (name, args) = match input {
            Input::Stack | Input::Var(_) => return Ok(()),
            Input::Local(local) => ("local.get", CallArgs::Local(local)),
            Input::Global(global) => ("global.get", CallArgs::Global(global)),
            Input::I32(v) => ("i32.const", CallArgs::Immediate(Immediate::I32(v))),
            Input::I64(v) => ("i64.const", CallArgs::Immediate(Immediate::I64(v))),
            Input::F32(v) => ("f32.const", CallArgs::Immediate(Immediate::F32(v))),
            Input::F64(v) => ("f64.const", CallArgs::Immediate(Immediate::F64(v))),
        };
        let def = registry().lookup(name)?;
        self.push_instruction(def, args)?;
        Ok(())
    }

    // Structured control ------------------------------------------------------

    pub fn block<F>(&mut self, ty: FunctionType, body: F) -> Result<Vec<StackVar>, BuildError>
    where
        F: FnOnce(&mut LocalContext, Label) -> Result<(), BuildError>,
    {
        self.structured("block", FrameKind::Block, ty, body)
    }

    pub fn loop_<F>(&mut self, ty: FunctionType, body: F) -> Result<Vec<StackVar>, BuildError>
    where
        F: FnOnce(&mut LocalContext, Label) -> Result<(), BuildError>,
    {
        self.structured("loop", FrameKind::Loop, ty, body)
    }

    /// `if` without `else`: the false edge passes the inputs through
    /// unchanged, so the block type must map its params to themselves.
    pub fn if_<F>(&mut self, ty: FunctionType, then: F) -> Result<Vec<StackVar>, BuildError>
    where
        F: FnOnce(&mut LocalContext, Label) -> Result<(), BuildError>,
    {
        if ty.params != ty.results {
            return Err(BuildError::UnbalancedStack {
                construct: "if without else".to_string(),
                expected: format_types(&ty.results),
                actual: format_types(&ty.params),
            });
        }
        let def = registry().lookup("if")?;
        self.rollback_on_error(|c| {
            c.pop_condition(&ty)?;
            let label = c.enter(FrameKind::If, &ty);
            then(c, label)?;
            let then = c.exit()?;
            c.finish(def, CallArgs::If { ty, then, else_: None })
        })
    }

    pub fn if_else<F, G>(&mut self, ty: FunctionType, then: F, else_: G) -> Result<Vec<StackVar>, BuildError>
    where
        F: FnOnce(&mut LocalContext, Label) -> Result<(), BuildError>,
        G: FnOnce(&mut LocalContext, Label) -> Result<(), BuildError>,
    {
        let def = registry().lookup("if")?;
        self.rollback_on_error(|c| {
            c.pop_condition(&ty)?;
            let label = c.enter(FrameKind::If, &ty);
            then(c, label)?;
            let then = c.switch_to_else()?;
            else_(c, label)?;
            let else_ = c.exit()?;
            c.finish(
                def,
                CallArgs::If {
                    ty,
                    then,
                    else_: Some(else_),
                },
            )
        })
    }

    fn structured<F>(
        &mut self,
        name: &'static str,
        kind: FrameKind,
        ty: FunctionType,
        body: F,
    ) -> Result<Vec<StackVar>, BuildError>
    where
        F: FnOnce(&mut LocalContext, Label) -> Result<(), BuildError>,
    {
        let def = registry().lookup(name)?;
        self.rollback_on_error(|c| {
            c.pop_types(name, &ty.params)?;
            let label = c.enter(kind, &ty);
            body(c, label)?;
            let body = c.exit()?;
            c.finish(def, CallArgs::Block { ty, body })
        })
    }

    /// Runs a structured construct. On failure every frame it opened is
    /// closed again and the enclosing body and stack are put back as they
    /// were before the construct started.
    fn rollback_on_error<T>(
        &mut self,
        build: impl FnOnce(&mut LocalContext) -> Result<T, BuildError>,
    ) -> Result<T, BuildError> {
        let depth = self.outer.len();
        let stack = self.stack.clone();
        let body_len = self.body.len();
        let result = build(self);
        if result.is_err() {
            while self.outer.len() > depth {
                let Some(parent) = self.outer.pop() else { break };
                let frame = mem::replace(&mut self.frame, parent);
                self.body = frame.outer_body;
            }
            self.body.truncate(body_len);
            self.stack = stack;
        }
        result
    }

    fn pop_condition(&mut self, ty: &FunctionType) -> Result<(), BuildError> {
        let mut inputs = ty.params.clone();
        inputs.push(ValueType::I32);
        self.pop_types("if", &inputs)
    }

    fn enter(&mut self, kind: FrameKind, ty: &FunctionType) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        let frame = Frame {
            label,
            kind,
            start_types: ty.params.clone(),
            end_types: ty.results.clone(),
            unreachable: false,
            height: self.stack.len(),
            outer_body: mem::take(&mut self.body),
        };
        let parent = mem::replace(&mut self.frame, frame);
        self.outer.push(parent);
        self.push_types(&ty.params);
        label
    }

    /// The values left in the frame must be exactly its end types. In an
    /// unreachable frame the missing leading end types count as present, but
    /// whatever was pushed after the divergence must still match the tail.
    fn check_end(&mut self) -> Result<(), BuildError> {
        let actual = self.frame_types();
        let balanced = if self.frame.unreachable {
            self.frame.end_types.ends_with(&actual)
        } else {
            actual == self.frame.end_types
        };
        if !balanced {
            return Err(BuildError::UnbalancedStack {
                construct: self.frame.kind.name().to_string(),
                expected: format_types(&self.frame.end_types),
                actual: format_types(&actual),
            });
        }
        self.stack.truncate(self.frame.height);
        Ok(())
    }

    fn exit(&mut self) -> Result<Vec<PendingInstruction>, BuildError> {
        self.check_end()?;
        let parent = self
            .outer
            .pop()
            .ok_or_else(|| BuildError::UnknownLabel(self.frame.label.to_string()))?;
        let frame = mem::replace(&mut self.frame, parent);
        Ok(mem::replace(&mut self.body, frame.outer_body))
    }

    fn switch_to_else(&mut self) -> Result<Vec<PendingInstruction>, BuildError> {
        self.check_end()?;
        self.frame.kind = FrameKind::Else;
        self.frame.unreachable = false;
        let start = self.frame.start_types.clone();
        self.push_types(&start);
        Ok(mem::take(&mut self.body))
    }

    fn finish(&mut self, def: &'static InstructionDef, args: CallArgs) -> Result<Vec<StackVar>, BuildError> {
        let created = (def.create)(def, self, args)?;
        let results = self.push_types(&created.results);
        self.body.push(PendingInstruction {
            def,
            deps: created.deps,
            params: created.params,
            results: created.results,
            args: created.args,
        });
        Ok(results)
    }
}
