//! Common test utilities shared between integration tests

#![allow(dead_code)]

use std::fmt;
use std::fs;

use base64::{engine::general_purpose, Engine as _};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use wasmforge::encoder::EncodeError;
use wasmforge::parser::instruction::{Immediate, Instruction};
use wasmforge::parser::module::{ExportKind, Module};
use wasmforge::parser::DecodeError;
use wasmforge::Engine;

// =======================================================================
// Fixtures
// =======================================================================

#[derive(Debug)]
pub struct Base64DecodedBytes(pub Vec<u8>);

impl<'de> Deserialize<'de> for Base64DecodedBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD.decode(s).map_err(de::Error::custom)?;
        Ok(Base64DecodedBytes(decoded))
    }
}

#[derive(Deserialize)]
pub struct Fixtures {
    pub modules: Vec<ModuleFixture>,
    pub malformed: Vec<MalformedFixture>,
}

/// A valid binary module.
#[derive(Deserialize)]
pub struct ModuleFixture {
    pub name: String,
    pub bin: Base64DecodedBytes,
    pub exports: Vec<String>,
    /// The bytes are exactly what the encoder would write for them.
    pub canonical: bool,
}

/// A binary the decoder must reject, and a fragment of the expected message.
#[derive(Deserialize)]
pub struct MalformedFixture {
    pub name: String,
    pub bin: Base64DecodedBytes,
    pub error: String,
}

pub fn load_fixtures() -> Fixtures {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/modules.json");
    let json = fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {path}: {e}"));
    serde_json::from_str(&json).unwrap_or_else(|e| panic!("failed to parse {path}: {e}"))
}

pub fn module_fixture(name: &str) -> ModuleFixture {
    load_fixtures()
        .modules
        .into_iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no module fixture named {name}"))
}

pub fn malformed_fixture(name: &str) -> MalformedFixture {
    load_fixtures()
        .malformed
        .into_iter()
        .find(|m| m.name == name)
        .unwrap_or_else(|| panic!("no malformed fixture named {name}"))
}

// =======================================================================
// A tiny engine
// =======================================================================

/// Stands in for a real host: decodes the module and interprets a small
/// i32 subset of the instruction set.
#[derive(Default)]
pub struct MiniEngine {
    pub instantiated: usize,
}

#[derive(Debug)]
pub enum HostError {
    Encode(EncodeError),
    Decode(DecodeError),
    Trap(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Encode(e) => write!(f, "encode: {e}"),
            HostError::Decode(e) => write!(f, "decode: {e}"),
            HostError::Trap(msg) => write!(f, "trap: {msg}"),
        }
    }
}

impl From<EncodeError> for HostError {
    fn from(e: EncodeError) -> HostError {
        HostError::Encode(e)
    }
}

impl From<DecodeError> for HostError {
    fn from(e: DecodeError) -> HostError {
        HostError::Decode(e)
    }
}

fn trap(msg: impl Into<String>) -> HostError {
    HostError::Trap(msg.into())
}

pub struct MiniInstance {
    module: Module,
}

impl Engine for MiniEngine {
    type Instance = MiniInstance;
    type Error = HostError;

    fn instantiate(&mut self, bytes: &[u8]) -> Result<MiniInstance, HostError> {
        let module = Module::from_bytes(bytes)?;
        self.instantiated += 1;
        Ok(MiniInstance { module })
    }
}

impl MiniInstance {
    pub fn invoke(&self, name: &str, args: &[i32]) -> Result<Vec<i32>, HostError> {
        let export = self
            .module
            .export(name)
            .filter(|e| e.kind == ExportKind::Function)
            .ok_or_else(|| trap(format!("no exported function {name}")))?;
        self.call(export.index, args.to_vec())
    }

    fn call(&self, index: u32, args: Vec<i32>) -> Result<Vec<i32>, HostError> {
        let imported = self.module.imported_function_count();
        if index < imported {
            return Err(trap("imported functions are not supported"));
        }
        let func = self
            .module
            .functions
            .get((index - imported) as usize)
            .ok_or_else(|| trap(format!("no function {index}")))?;
        let ty = self
            .module
            .function_type(index)
            .ok_or_else(|| trap(format!("no type for function {index}")))?;

        let mut locals = args;
        locals.resize(ty.params.len() + func.locals.len(), 0);
        let mut stack = Vec::new();
        self.run(&func.body, &mut locals, &mut stack)?;
        let split = stack
            .len()
            .checked_sub(ty.results.len())
            .ok_or_else(|| trap("stack underflow at return"))?;
        Ok(stack.split_off(split))
    }

    fn run(&self, body: &[Instruction], locals: &mut [i32], stack: &mut Vec<i32>) -> Result<(), HostError> {
        for instruction in body {
            match (instruction.name, &instruction.immediate) {
                ("nop", _) => {}
                ("drop", _) => {
                    pop(stack)?;
                }
                ("i32.const", Immediate::I32(v)) => stack.push(*v),
                ("local.get", Immediate::Index(i)) => stack.push(local(locals, *i)?),
                ("local.set", Immediate::Index(i)) => {
                    let v = pop(stack)?;
                    *local_mut(locals, *i)? = v;
                }
                ("local.tee", Immediate::Index(i)) => {
                    let v = pop(stack)?;
                    *local_mut(locals, *i)? = v;
                    stack.push(v);
                }
                ("i32.add", _) => binop(stack, i32::wrapping_add)?,
                ("i32.sub", _) => binop(stack, i32::wrapping_sub)?,
                ("i32.mul", _) => binop(stack, i32::wrapping_mul)?,
                ("call", Immediate::Index(f)) => {
                    let params = self
                        .module
                        .function_type(*f)
                        .ok_or_else(|| trap(format!("no type for function {f}")))?
                        .params
                        .len();
                    let split = stack
                        .len()
                        .checked_sub(params)
                        .ok_or_else(|| trap("stack underflow at call"))?;
                    let args = stack.split_off(split);
                    let results = self.call(*f, args)?;
                    stack.extend(results);
                }
                _ => return Err(trap(format!("unsupported instruction {instruction}"))),
            }
        }
        Ok(())
    }
}

fn pop(stack: &mut Vec<i32>) -> Result<i32, HostError> {
    stack.pop().ok_or_else(|| trap("stack underflow"))
}

fn binop(stack: &mut Vec<i32>, op: fn(i32, i32) -> i32) -> Result<(), HostError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    stack.push(op(a, b));
    Ok(())
}

fn local(locals: &[i32], index: u32) -> Result<i32, HostError> {
    locals
        .get(index as usize)
        .copied()
        .ok_or_else(|| trap(format!("no local {index}")))
}

fn local_mut(locals: &mut [i32], index: u32) -> Result<&mut i32, HostError> {
    locals
        .get_mut(index as usize)
        .ok_or_else(|| trap(format!("no local {index}")))
}
