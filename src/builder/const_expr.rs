//! Constant expressions for global initialisers and table elements.

use super::dependency::{Dependency, FuncRef, GlobalRef};
use super::error::BuildError;
use super::resolver::IndexTable;
use crate::parser::instruction::{Immediate, Instruction};
use crate::parser::module::ValueType;

/// A constant initializer for globals and table slots.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    V128([u8; 16]),
    RefNull(ValueType),
    RefFunc(FuncRef),
    /// Only immutable globals may be read in a constant expression.
    GlobalGet(GlobalRef),
}

impl ConstExpr {
    pub fn ty(&self) -> ValueType {
        match self {
            ConstExpr::I32(_) => ValueType::I32,
            ConstExpr::I64(_) => ValueType::I64,
            ConstExpr::F32(_) => ValueType::F32,
            ConstExpr::F64(_) => ValueType::F64,
            ConstExpr::V128(_) => ValueType::V128,
            ConstExpr::RefNull(ty) => *ty,
            ConstExpr::RefFunc(_) => ValueType::FuncRef,
            ConstExpr::GlobalGet(global) => global.ty.value_type,
        }
    }

    pub(crate) fn check(&self) -> Result<(), BuildError> {
        match self {
            ConstExpr::RefNull(ty) if !ty.is_ref() => Err(BuildError::invalid_arguments(
                "ref.null",
                format!("{ty} is not a reference type"),
            )),
            ConstExpr::GlobalGet(global) if global.ty.mutable => Err(BuildError::invalid_arguments(
                "global.get",
                "constant expressions cannot read mutable globals",
            )),
            _ => Ok(()),
        }
    }

    /// Entities the expression refers to. A `ref.func` here declares the
    /// function by itself, so no marker is needed.
    pub(crate) fn deps(&self) -> Option<Dependency> {
        match self {
            ConstExpr::RefFunc(func) => Some(Dependency::Function(func.id)),
            ConstExpr::GlobalGet(global) => Some(Dependency::Global(global.id)),
            _ => None,
        }
    }

    pub(crate) fn resolve(&self, indices: &IndexTable) -> Result<Vec<Instruction>, BuildError> {
        let instruction = match self {
            ConstExpr::I32(v) => Instruction::new("i32.const", Immediate::I32(*v)),
            ConstExpr::I64(v) => Instruction::new("i64.const", Immediate::I64(*v)),
            ConstExpr::F32(v) => Instruction::new("f32.const", Immediate::F32(*v)),
            ConstExpr::F64(v) => Instruction::new("f64.const", Immediate::F64(*v)),
            ConstExpr::V128(bytes) => Instruction::new("v128.const", Immediate::V128(*bytes)),
            ConstExpr::RefNull(ty) => Instruction::new("ref.null", Immediate::RefType(*ty)),
            ConstExpr::RefFunc(func) => {
                let index = indices.index(&Dependency::Function(func.id))?;
                Instruction::new("ref.func", Immediate::Index(index))
            }
            ConstExpr::GlobalGet(global) => {
                let index = indices.index(&Dependency::Global(global.id))?;
                Instruction::new("global.get", Immediate::Index(index))
            }
        };
        Ok(vec![instruction])
    }
}

impl From<i32> for ConstExpr {
    fn from(v: i32) -> ConstExpr {
        ConstExpr::I32(v)
    }
}

impl From<i64> for ConstExpr {
    fn from(v: i64) -> ConstExpr {
        ConstExpr::I64(v)
    }
}

impl From<f32> for ConstExpr {
    fn from(v: f32) -> ConstExpr {
        ConstExpr::F32(v)
    }
}

impl From<f64> for ConstExpr {
    fn from(v: f64) -> ConstExpr {
        ConstExpr::F64(v)
    }
}

impl From<&FuncRef> for ConstExpr {
    fn from(func: &FuncRef) -> ConstExpr {
        ConstExpr::RefFunc(func.clone())
    }
}
