//! The instruction registry.
//!
//! A static table of [`InstructionDef`]s, built once on first use and never
//! mutated afterwards. Each definition carries what every layer of the crate
//! needs to know about one instruction:
//!
//! - the mnemonic and opcode (single byte, or prefix plus LEB128 subcode),
//!   used by the binary encoder and decoder;
//! - the [`ImmediateKind`], which tells the codec what follows the opcode;
//! - a `create` step, run at construction time, which computes the stack
//!   effect and the entity [`Dependency`]s of one use of the instruction;
//! - a `resolve` step, run once indices are known, which turns the captured
//!   arguments and the assigned indices into the final [`Immediate`].
//!
//! Adding an instruction class means appending definitions in [`table`];
//! nothing else dispatches on mnemonics.
//!
//! [`Dependency`]: crate::builder::Dependency

pub mod create;
pub mod resolve;
pub mod table;

use std::collections::{HashMap, HashSet};
use std::fmt;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;

use crate::builder::{BuildError, CallArgs, Created, LocalContext, ResolveArgs};
use crate::parser::encoding;
use crate::parser::instruction::{Immediate, ImmediateKind};
use crate::parser::module::ValueType;

/// Fixed `(params, results)` of instructions whose stack effect never varies.
pub type Signature = (&'static [ValueType], &'static [ValueType]);

/// Construction-time step: stack effect, dependencies and captured arguments.
pub type CreateFn = fn(&InstructionDef, &LocalContext, CallArgs) -> Result<Created, BuildError>;

/// Resolution-time step: assigned dependency indices to final immediate.
pub type ResolveFn = fn(&InstructionDef, &[u32], &ResolveArgs) -> Result<Immediate, BuildError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Single(u8),
    Prefixed(u8, u32),
}

impl Opcode {
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match *self {
            Opcode::Single(byte) => buf.push(byte),
            Opcode::Prefixed(prefix, subcode) => {
                buf.push(prefix);
                encoding::write_vu32(buf, subcode);
            }
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Opcode::Prefixed(encoding::PREFIX_ATOMIC, _))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Single(byte) => write!(f, "{byte:#04x}"),
            Opcode::Prefixed(prefix, subcode) => write!(f, "{prefix:#04x} {subcode:#x}"),
        }
    }
}

pub struct InstructionDef {
    pub name: &'static str,
    pub opcode: Opcode,
    pub immediate: ImmediateKind,
    pub signature: Option<Signature>,
    pub create: CreateFn,
    pub resolve: ResolveFn,
}

impl fmt::Debug for InstructionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionDef")
            .field("name", &self.name)
            .field("opcode", &self.opcode)
            .field("immediate", &self.immediate)
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Result of looking up a first opcode byte.
#[derive(Debug, Clone, Copy)]
pub enum OpcodeEntry<'a> {
    Instruction(&'a InstructionDef),
    /// The byte opens an extended space; a subcode follows.
    Prefix(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("invalid instruction name {0:?}")]
    UnknownMnemonic(String),

    #[error("invalid opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("invalid opcode {prefix:#04x} {subcode:#x}")]
    UnknownSubcode { prefix: u8, subcode: u32 },
}

pub struct Registry {
    defs: Vec<InstructionDef>,
    by_name: HashMap<&'static str, usize>,
    by_opcode: HashMap<u8, usize>,
    by_subcode: HashMap<(u8, u32), usize>,
    prefixes: HashSet<u8>,
}

impl Registry {
    /// Indexes `defs` by mnemonic and opcode. A repeated key keeps the first
    /// definition.
    pub fn new(defs: Vec<InstructionDef>) -> Registry {
        let mut by_name = HashMap::with_capacity(defs.len());
        let mut by_opcode = HashMap::new();
        let mut by_subcode = HashMap::new();
        let mut prefixes = HashSet::new();

        for (i, def) in defs.iter().enumerate() {
            by_name.entry(def.name).or_insert(i);
            match def.opcode {
                Opcode::Single(byte) => {
                    by_opcode.entry(byte).or_insert(i);
                }
                Opcode::Prefixed(prefix, subcode) => {
                    prefixes.insert(prefix);
                    by_subcode.entry((prefix, subcode)).or_insert(i);
                }
            }
        }

        Registry {
            defs,
            by_name,
            by_opcode,
            by_subcode,
            prefixes,
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&InstructionDef, LookupError> {
        self.by_name
            .get(name)
            .map(|&i| &self.defs[i])
            .ok_or_else(|| LookupError::UnknownMnemonic(name.to_string()))
    }

    pub fn lookup_opcode(&self, byte: u8) -> Result<OpcodeEntry<'_>, LookupError> {
        if self.prefixes.contains(&byte) {
            return Ok(OpcodeEntry::Prefix(byte));
        }
        self.by_opcode
            .get(&byte)
            .map(|&i| OpcodeEntry::Instruction(&self.defs[i]))
            .ok_or(LookupError::UnknownOpcode(byte))
    }

    pub fn lookup_subcode(&self, prefix: u8, subcode: u32) -> Result<&InstructionDef, LookupError> {
        self.by_subcode
            .get(&(prefix, subcode))
            .map(|&i| &self.defs[i])
            .ok_or(LookupError::UnknownSubcode { prefix, subcode })
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstructionDef> {
        self.defs.iter()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new(table::definitions());
    debug!("instruction registry: {} definitions", registry.len());
    registry
});

/// The process-wide registry.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_unique() {
        let reg = registry();
        assert_eq!(reg.by_name.len(), reg.len(), "duplicate mnemonic in table");
        let opcodes = reg.by_opcode.len() + reg.by_subcode.len();
        assert_eq!(opcodes, reg.len(), "duplicate opcode in table");
    }

    #[test]
    fn test_prefix_bytes_are_not_instructions() {
        let reg = registry();
        for prefix in [encoding::PREFIX_MISC, encoding::PREFIX_SIMD, encoding::PREFIX_ATOMIC] {
            assert!(matches!(reg.lookup_opcode(prefix), Ok(OpcodeEntry::Prefix(p)) if p == prefix));
        }
    }

    #[test]
    fn test_lookup_by_name_and_opcode_agree() {
        let reg = registry();
        for def in reg.iter() {
            let found = match def.opcode {
                Opcode::Single(byte) => match reg.lookup_opcode(byte) {
                    Ok(OpcodeEntry::Instruction(found)) => found,
                    other => panic!("{}: {other:?}", def.name),
                },
                Opcode::Prefixed(prefix, subcode) => reg.lookup_subcode(prefix, subcode).unwrap(),
            };
            assert_eq!(found.name, def.name);
            assert_eq!(reg.lookup(def.name).unwrap().opcode, def.opcode);
        }
    }

    #[test]
    fn test_lookup_errors_name_missing_keys() {
        let reg = registry();
        assert_eq!(
            reg.lookup("i32.bogus").unwrap_err().to_string(),
            "invalid instruction name \"i32.bogus\""
        );
        assert_eq!(reg.lookup_opcode(0xFF).unwrap_err().to_string(), "invalid opcode 0xff");
        assert_eq!(
            reg.lookup_subcode(0xFD, 0x3FF).unwrap_err().to_string(),
            "invalid opcode 0xfd 0x3ff"
        );
    }

    #[test]
    fn test_opcode_encoding() {
        let mut buf = Vec::new();
        Opcode::Prefixed(0xFC, 17).encode(&mut buf);
        Opcode::Single(0x6A).encode(&mut buf);
        assert_eq!(buf, vec![0xFC, 0x11, 0x6A]);
        assert_eq!(Opcode::Prefixed(0xFD, 0x105).to_string(), "0xfd 0x105");
    }
}
