use thiserror::Error;

use crate::parser::module::ValueType;
use crate::registry::LookupError;

/// Errors raised while constructing or building a module. All of them abort
/// the current build; nothing partial is left behind in the builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("type mismatch in {instruction}: expected [{expected}], stack has [{actual}]")]
    StackType {
        instruction: String,
        expected: String,
        actual: String,
    },

    #[error("unbalanced stack at end of {construct}: expected [{expected}], got [{actual}]")]
    UnbalancedStack {
        construct: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    UnknownInstruction(#[from] LookupError),

    #[error("unresolved dependency: {0}")]
    UnresolvedDependency(String),

    #[error("unknown branch target {0}")]
    UnknownLabel(String),

    #[error("local {index} of type {ty} is not declared in this function")]
    UnknownLocal { index: u32, ty: ValueType },

    #[error("cannot set immutable global")]
    ImmutableGlobal,

    #[error("invalid alignment 2^{align} for {instruction} (natural alignment 2^{natural})")]
    BadAlignment {
        instruction: String,
        align: u32,
        natural: u32,
    },

    #[error("lane {lane} out of range for {instruction} ({lanes} lanes)")]
    InvalidLane { instruction: String, lane: u8, lanes: u8 },

    #[error("invalid operand for {instruction}: {reason}")]
    InvalidOperand { instruction: String, reason: String },

    #[error("invalid arguments for {instruction}: {reason}")]
    InvalidArguments { instruction: String, reason: String },

    #[error("duplicate export name {0:?}")]
    DuplicateExport(String),

    #[error("function {0} was declared but never defined")]
    UndefinedFunction(usize),

    #[error("code accesses memory but the module declares none")]
    MissingMemory,
}

impl BuildError {
    pub(crate) fn invalid_operand(instruction: &str, reason: impl Into<String>) -> BuildError {
        BuildError::InvalidOperand {
            instruction: instruction.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_arguments(instruction: &str, reason: impl Into<String>) -> BuildError {
        BuildError::InvalidArguments {
            instruction: instruction.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_both_shapes() {
        let err = BuildError::UnbalancedStack {
            construct: "block".to_string(),
            expected: "i32".to_string(),
            actual: "i32 i64".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unbalanced stack at end of block: expected [i32], got [i32 i64]"
        );

        let err: BuildError = LookupError::UnknownSubcode {
            prefix: 0xFE,
            subcode: 0x99,
        }
        .into();
        assert_eq!(err.to_string(), "invalid opcode 0xfe 0x99");
    }
}
