//! The instruction table.
//!
//! One entry per instruction: mnemonic, opcode, immediate shape, and the
//! create and resolve steps. Most numeric instructions share
//! [`create_plain`] and differ only in their signature, so they are listed
//! as runs of consecutive opcodes.

use super::create::*;
use super::resolve::*;
use super::{CreateFn, InstructionDef, Opcode, ResolveFn, Signature};
use crate::parser::encoding::{PREFIX_ATOMIC, PREFIX_MISC, PREFIX_SIMD};
use crate::parser::instruction::ImmediateKind;
use crate::parser::module::ValueType;

const NONE: &[ValueType] = &[];
const I32: &[ValueType] = &[ValueType::I32];
const I64: &[ValueType] = &[ValueType::I64];
const F32: &[ValueType] = &[ValueType::F32];
const F64: &[ValueType] = &[ValueType::F64];
const V128: &[ValueType] = &[ValueType::V128];
const I32_I32: &[ValueType] = &[ValueType::I32, ValueType::I32];
const I64_I64: &[ValueType] = &[ValueType::I64, ValueType::I64];
const F32_F32: &[ValueType] = &[ValueType::F32, ValueType::F32];
const F64_F64: &[ValueType] = &[ValueType::F64, ValueType::F64];
const V128_V128: &[ValueType] = &[ValueType::V128, ValueType::V128];
const V128_V128_V128: &[ValueType] = &[ValueType::V128, ValueType::V128, ValueType::V128];
const I32_I32_I32: &[ValueType] = &[ValueType::I32, ValueType::I32, ValueType::I32];
const I32_I64: &[ValueType] = &[ValueType::I32, ValueType::I64];
const I32_F32: &[ValueType] = &[ValueType::I32, ValueType::F32];
const I32_F64: &[ValueType] = &[ValueType::I32, ValueType::F64];
const I32_V128: &[ValueType] = &[ValueType::I32, ValueType::V128];
const V128_I32: &[ValueType] = &[ValueType::V128, ValueType::I32];
const V128_I64: &[ValueType] = &[ValueType::V128, ValueType::I64];
const V128_F32: &[ValueType] = &[ValueType::V128, ValueType::F32];
const V128_F64: &[ValueType] = &[ValueType::V128, ValueType::F64];
const I32_I32_I64: &[ValueType] = &[ValueType::I32, ValueType::I32, ValueType::I64];
const I32_I64_I64: &[ValueType] = &[ValueType::I32, ValueType::I64, ValueType::I64];

/// Width slots shared by every atomic family: (64-bit operand, natural alignment).
const ATOMIC_SHAPES: [(bool, u32); 7] = [
    (false, 2),
    (true, 3),
    (false, 0),
    (false, 1),
    (true, 0),
    (true, 1),
    (true, 2),
];

#[derive(Clone, Copy)]
enum AtomicFamily {
    Load,
    Store,
    Rmw,
    Cmpxchg,
}

impl AtomicFamily {
    fn signature(self, wide: bool) -> Signature {
        match (self, wide) {
            (AtomicFamily::Load, false) => (I32, I32),
            (AtomicFamily::Load, true) => (I32, I64),
            (AtomicFamily::Store, false) => (I32_I32, NONE),
            (AtomicFamily::Store, true) => (I32_I64, NONE),
            (AtomicFamily::Rmw, false) => (I32_I32, I32),
            (AtomicFamily::Rmw, true) => (I32_I64, I64),
            (AtomicFamily::Cmpxchg, false) => (I32_I32_I32, I32),
            (AtomicFamily::Cmpxchg, true) => (I32_I64_I64, I64),
        }
    }
}

struct Table(Vec<InstructionDef>);

impl Table {
    fn add(
        &mut self,
        name: &'static str,
        opcode: Opcode,
        immediate: ImmediateKind,
        signature: Option<Signature>,
        create: CreateFn,
        resolve: ResolveFn,
    ) {
        self.0.push(InstructionDef {
            name,
            opcode,
            immediate,
            signature,
            create,
            resolve,
        });
    }

    fn plain(&mut self, name: &'static str, opcode: Opcode, signature: Signature) {
        self.add(
            name,
            opcode,
            ImmediateKind::None,
            Some(signature),
            create_plain,
            resolve_immediate,
        );
    }

    /// Consecutive opcodes sharing one signature.
    fn run(&mut self, first: Opcode, names: &[&'static str], signature: Signature) {
        for (i, &name) in names.iter().enumerate() {
            let opcode = match first {
                Opcode::Single(byte) => Opcode::Single(byte + i as u8),
                Opcode::Prefixed(prefix, subcode) => Opcode::Prefixed(prefix, subcode + i as u32),
            };
            self.plain(name, opcode, signature);
        }
    }

    fn memory_access(&mut self, name: &'static str, opcode: Opcode, natural: u32, signature: Signature) {
        self.add(
            name,
            opcode,
            ImmediateKind::MemArg { natural },
            Some(signature),
            create_memory_access,
            resolve_memory_access,
        );
    }

    fn constant(&mut self, name: &'static str, opcode: Opcode, immediate: ImmediateKind, result: &'static [ValueType]) {
        self.add(
            name,
            opcode,
            immediate,
            Some((NONE, result)),
            create_const,
            resolve_immediate,
        );
    }

    fn lane(&mut self, name: &'static str, subcode: u32, lanes: u8, signature: Signature) {
        self.add(
            name,
            simd(subcode),
            ImmediateKind::Lane { lanes },
            Some(signature),
            create_lane,
            resolve_immediate,
        );
    }

    fn atomic_family(&mut self, family: AtomicFamily, first: u32, names: [&'static str; 7]) {
        for (i, (name, (wide, natural))) in names.into_iter().zip(ATOMIC_SHAPES).enumerate() {
            self.memory_access(name, atomic(first + i as u32), natural, family.signature(wide));
        }
    }
}

fn op(byte: u8) -> Opcode {
    Opcode::Single(byte)
}

fn misc(subcode: u32) -> Opcode {
    Opcode::Prefixed(PREFIX_MISC, subcode)
}

fn simd(subcode: u32) -> Opcode {
    Opcode::Prefixed(PREFIX_SIMD, subcode)
}

fn atomic(subcode: u32) -> Opcode {
    Opcode::Prefixed(PREFIX_ATOMIC, subcode)
}

pub fn definitions() -> Vec<InstructionDef> {
    let mut t = Table(Vec::with_capacity(512));
    control(&mut t);
    variables(&mut t);
    memory(&mut t);
    numeric(&mut t);
    vector(&mut t);
    atomics(&mut t);
    t.0
}

fn control(t: &mut Table) {
    use ImmediateKind as K;

    t.add("unreachable", op(0x00), K::None, Some((NONE, NONE)), create_trap, resolve_immediate);
    t.plain("nop", op(0x01), (NONE, NONE));
    t.add("block", op(0x02), K::Block, None, create_block, resolve_block);
    t.add("loop", op(0x03), K::Block, None, create_block, resolve_block);
    t.add("if", op(0x04), K::If, None, create_if, resolve_if);
    t.add("br", op(0x0C), K::Index, None, create_br, resolve_immediate);
    t.add("br_if", op(0x0D), K::Index, None, create_br_if, resolve_immediate);
    t.add("br_table", op(0x0E), K::BrTable, None, create_br_table, resolve_immediate);
    t.add("return", op(0x0F), K::None, None, create_return, resolve_immediate);
    t.add("call", op(0x10), K::Index, None, create_call, resolve_index);
    t.add("call_indirect", op(0x11), K::CallIndirect, None, create_call_indirect, resolve_call_indirect);

    t.add("drop", op(0x1A), K::None, None, create_drop, resolve_immediate);
    t.add("select", op(0x1B), K::None, None, create_select, resolve_immediate);
    t.add("select.typed", op(0x1C), K::SelectTypes, None, create_select_typed, resolve_immediate);

    t.add("ref.null", op(0xD0), K::RefType, None, create_ref_null, resolve_immediate);
    t.add("ref.is_null", op(0xD1), K::None, None, create_ref_is_null, resolve_immediate);
    t.add("ref.func", op(0xD2), K::Index, None, create_ref_func, resolve_ref_func);
}

fn variables(t: &mut Table) {
    use ImmediateKind as K;

    t.add("local.get", op(0x20), K::Index, None, create_local_get, resolve_immediate);
    t.add("local.set", op(0x21), K::Index, None, create_local_set, resolve_immediate);
    t.add("local.tee", op(0x22), K::Index, None, create_local_tee, resolve_immediate);
    t.add("global.get", op(0x23), K::Index, None, create_global_get, resolve_index);
    t.add("global.set", op(0x24), K::Index, None, create_global_set, resolve_index);

    t.add("table.get", op(0x25), K::Index, None, create_table_get, resolve_index);
    t.add("table.set", op(0x26), K::Index, None, create_table_set, resolve_index);
    t.add("table.copy", misc(0x0E), K::IndexPair, None, create_table_copy, resolve_table_copy);
    t.add("table.grow", misc(0x0F), K::Index, None, create_table_grow, resolve_index);
    t.add("table.size", misc(0x10), K::Index, None, create_table_size, resolve_index);
    t.add("table.fill", misc(0x11), K::Index, None, create_table_fill, resolve_index);
}

fn memory(t: &mut Table) {
    use ImmediateKind as K;

    t.memory_access("i32.load", op(0x28), 2, (I32, I32));
    t.memory_access("i64.load", op(0x29), 3, (I32, I64));
    t.memory_access("f32.load", op(0x2A), 2, (I32, F32));
    t.memory_access("f64.load", op(0x2B), 3, (I32, F64));
    t.memory_access("i32.load8_s", op(0x2C), 0, (I32, I32));
    t.memory_access("i32.load8_u", op(0x2D), 0, (I32, I32));
    t.memory_access("i32.load16_s", op(0x2E), 1, (I32, I32));
    t.memory_access("i32.load16_u", op(0x2F), 1, (I32, I32));
    t.memory_access("i64.load8_s", op(0x30), 0, (I32, I64));
    t.memory_access("i64.load8_u", op(0x31), 0, (I32, I64));
    t.memory_access("i64.load16_s", op(0x32), 1, (I32, I64));
    t.memory_access("i64.load16_u", op(0x33), 1, (I32, I64));
    t.memory_access("i64.load32_s", op(0x34), 2, (I32, I64));
    t.memory_access("i64.load32_u", op(0x35), 2, (I32, I64));
    t.memory_access("i32.store", op(0x36), 2, (I32_I32, NONE));
    t.memory_access("i64.store", op(0x37), 3, (I32_I64, NONE));
    t.memory_access("f32.store", op(0x38), 2, (I32_F32, NONE));
    t.memory_access("f64.store", op(0x39), 3, (I32_F64, NONE));
    t.memory_access("i32.store8", op(0x3A), 0, (I32_I32, NONE));
    t.memory_access("i32.store16", op(0x3B), 1, (I32_I32, NONE));
    t.memory_access("i64.store8", op(0x3C), 0, (I32_I64, NONE));
    t.memory_access("i64.store16", op(0x3D), 1, (I32_I64, NONE));
    t.memory_access("i64.store32", op(0x3E), 2, (I32_I64, NONE));

    t.add("memory.size", op(0x3F), K::Index, Some((NONE, I32)), create_memory, resolve_index);
    t.add("memory.grow", op(0x40), K::Index, Some((I32, I32)), create_memory, resolve_index);
    t.add(
        "memory.copy",
        misc(0x0A),
        K::IndexPair,
        Some((I32_I32_I32, NONE)),
        create_memory,
        resolve_memory_copy,
    );
    t.add("memory.fill", misc(0x0B), K::Index, Some((I32_I32_I32, NONE)), create_memory, resolve_index);
}

fn numeric(t: &mut Table) {
    use ImmediateKind as K;

    t.constant("i32.const", op(0x41), K::I32, I32);
    t.constant("i64.const", op(0x42), K::I64, I64);
    t.constant("f32.const", op(0x43), K::F32, F32);
    t.constant("f64.const", op(0x44), K::F64, F64);

    t.plain("i32.eqz", op(0x45), (I32, I32));
    t.run(
        op(0x46),
        &[
            "i32.eq", "i32.ne", "i32.lt_s", "i32.lt_u", "i32.gt_s", "i32.gt_u", "i32.le_s", "i32.le_u", "i32.ge_s",
            "i32.ge_u",
        ],
        (I32_I32, I32),
    );
    t.plain("i64.eqz", op(0x50), (I64, I32));
    t.run(
        op(0x51),
        &[
            "i64.eq", "i64.ne", "i64.lt_s", "i64.lt_u", "i64.gt_s", "i64.gt_u", "i64.le_s", "i64.le_u", "i64.ge_s",
            "i64.ge_u",
        ],
        (I64_I64, I32),
    );
    t.run(
        op(0x5B),
        &["f32.eq", "f32.ne", "f32.lt", "f32.gt", "f32.le", "f32.ge"],
        (F32_F32, I32),
    );
    t.run(
        op(0x61),
        &["f64.eq", "f64.ne", "f64.lt", "f64.gt", "f64.le", "f64.ge"],
        (F64_F64, I32),
    );

    t.run(op(0x67), &["i32.clz", "i32.ctz", "i32.popcnt"], (I32, I32));
    t.run(
        op(0x6A),
        &[
            "i32.add", "i32.sub", "i32.mul", "i32.div_s", "i32.div_u", "i32.rem_s", "i32.rem_u", "i32.and", "i32.or",
            "i32.xor", "i32.shl", "i32.shr_s", "i32.shr_u", "i32.rotl", "i32.rotr",
        ],
        (I32_I32, I32),
    );
    t.run(op(0x79), &["i64.clz", "i64.ctz", "i64.popcnt"], (I64, I64));
    t.run(
        op(0x7C),
        &[
            "i64.add", "i64.sub", "i64.mul", "i64.div_s", "i64.div_u", "i64.rem_s", "i64.rem_u", "i64.and", "i64.or",
            "i64.xor", "i64.shl", "i64.shr_s", "i64.shr_u", "i64.rotl", "i64.rotr",
        ],
        (I64_I64, I64),
    );
    t.run(
        op(0x8B),
        &["f32.abs", "f32.neg", "f32.ceil", "f32.floor", "f32.trunc", "f32.nearest", "f32.sqrt"],
        (F32, F32),
    );
    t.run(
        op(0x92),
        &["f32.add", "f32.sub", "f32.mul", "f32.div", "f32.min", "f32.max", "f32.copysign"],
        (F32_F32, F32),
    );
    t.run(
        op(0x99),
        &["f64.abs", "f64.neg", "f64.ceil", "f64.floor", "f64.trunc", "f64.nearest", "f64.sqrt"],
        (F64, F64),
    );
    t.run(
        op(0xA0),
        &["f64.add", "f64.sub", "f64.mul", "f64.div", "f64.min", "f64.max", "f64.copysign"],
        (F64_F64, F64),
    );

    t.plain("i32.wrap_i64", op(0xA7), (I64, I32));
    t.run(op(0xA8), &["i32.trunc_f32_s", "i32.trunc_f32_u"], (F32, I32));
    t.run(op(0xAA), &["i32.trunc_f64_s", "i32.trunc_f64_u"], (F64, I32));
    t.run(op(0xAC), &["i64.extend_i32_s", "i64.extend_i32_u"], (I32, I64));
    t.run(op(0xAE), &["i64.trunc_f32_s", "i64.trunc_f32_u"], (F32, I64));
    t.run(op(0xB0), &["i64.trunc_f64_s", "i64.trunc_f64_u"], (F64, I64));
    t.run(op(0xB2), &["f32.convert_i32_s", "f32.convert_i32_u"], (I32, F32));
    t.run(op(0xB4), &["f32.convert_i64_s", "f32.convert_i64_u"], (I64, F32));
    t.plain("f32.demote_f64", op(0xB6), (F64, F32));
    t.run(op(0xB7), &["f64.convert_i32_s", "f64.convert_i32_u"], (I32, F64));
    t.run(op(0xB9), &["f64.convert_i64_s", "f64.convert_i64_u"], (I64, F64));
    t.plain("f64.promote_f32", op(0xBB), (F32, F64));
    t.plain("i32.reinterpret_f32", op(0xBC), (F32, I32));
    t.plain("i64.reinterpret_f64", op(0xBD), (F64, I64));
    t.plain("f32.reinterpret_i32", op(0xBE), (I32, F32));
    t.plain("f64.reinterpret_i64", op(0xBF), (I64, F64));
    t.run(op(0xC0), &["i32.extend8_s", "i32.extend16_s"], (I32, I32));
    t.run(op(0xC2), &["i64.extend8_s", "i64.extend16_s", "i64.extend32_s"], (I64, I64));

    t.run(misc(0x00), &["i32.trunc_sat_f32_s", "i32.trunc_sat_f32_u"], (F32, I32));
    t.run(misc(0x02), &["i32.trunc_sat_f64_s", "i32.trunc_sat_f64_u"], (F64, I32));
    t.run(misc(0x04), &["i64.trunc_sat_f32_s", "i64.trunc_sat_f32_u"], (F32, I64));
    t.run(misc(0x06), &["i64.trunc_sat_f64_s", "i64.trunc_sat_f64_u"], (F64, I64));
}

fn vector(t: &mut Table) {
    use ImmediateKind as K;

    t.memory_access("v128.load", simd(0x00), 4, (I32, V128));
    t.memory_access("v128.store", simd(0x0B), 4, (I32_V128, NONE));
    t.constant("v128.const", simd(0x0C), K::V128, V128);
    t.add(
        "i8x16.shuffle",
        simd(0x0D),
        K::Shuffle,
        Some((V128_V128, V128)),
        create_shuffle,
        resolve_immediate,
    );
    t.plain("i8x16.swizzle", simd(0x0E), (V128_V128, V128));

    t.run(simd(0x0F), &["i8x16.splat", "i16x8.splat", "i32x4.splat"], (I32, V128));
    t.plain("i64x2.splat", simd(0x12), (I64, V128));
    t.plain("f32x4.splat", simd(0x13), (F32, V128));
    t.plain("f64x2.splat", simd(0x14), (F64, V128));

    t.lane("i8x16.extract_lane_s", 0x15, 16, (V128, I32));
    t.lane("i8x16.extract_lane_u", 0x16, 16, (V128, I32));
    t.lane("i8x16.replace_lane", 0x17, 16, (V128_I32, V128));
    t.lane("i16x8.extract_lane_s", 0x18, 8, (V128, I32));
    t.lane("i16x8.extract_lane_u", 0x19, 8, (V128, I32));
    t.lane("i16x8.replace_lane", 0x1A, 8, (V128_I32, V128));
    t.lane("i32x4.extract_lane", 0x1B, 4, (V128, I32));
    t.lane("i32x4.replace_lane", 0x1C, 4, (V128_I32, V128));
    t.lane("i64x2.extract_lane", 0x1D, 2, (V128, I64));
    t.lane("i64x2.replace_lane", 0x1E, 2, (V128_I64, V128));
    t.lane("f32x4.extract_lane", 0x1F, 4, (V128, F32));
    t.lane("f32x4.replace_lane", 0x20, 4, (V128_F32, V128));
    t.lane("f64x2.extract_lane", 0x21, 2, (V128, F64));
    t.lane("f64x2.replace_lane", 0x22, 2, (V128_F64, V128));

    t.run(
        simd(0x23),
        &[
            "i8x16.eq",
            "i8x16.ne",
            "i8x16.lt_s",
            "i8x16.lt_u",
            "i8x16.gt_s",
            "i8x16.gt_u",
            "i8x16.le_s",
            "i8x16.le_u",
            "i8x16.ge_s",
            "i8x16.ge_u",
            "i16x8.eq",
            "i16x8.ne",
            "i16x8.lt_s",
            "i16x8.lt_u",
            "i16x8.gt_s",
            "i16x8.gt_u",
            "i16x8.le_s",
            "i16x8.le_u",
            "i16x8.ge_s",
            "i16x8.ge_u",
            "i32x4.eq",
            "i32x4.ne",
            "i32x4.lt_s",
            "i32x4.lt_u",
            "i32x4.gt_s",
            "i32x4.gt_u",
            "i32x4.le_s",
            "i32x4.le_u",
            "i32x4.ge_s",
            "i32x4.ge_u",
            "f32x4.eq",
            "f32x4.ne",
            "f32x4.lt",
            "f32x4.gt",
            "f32x4.le",
            "f32x4.ge",
            "f64x2.eq",
            "f64x2.ne",
            "f64x2.lt",
            "f64x2.gt",
            "f64x2.le",
            "f64x2.ge",
        ],
        (V128_V128, V128),
    );

    t.plain("v128.not", simd(0x4D), (V128, V128));
    t.run(
        simd(0x4E),
        &["v128.and", "v128.andnot", "v128.or", "v128.xor"],
        (V128_V128, V128),
    );
    t.plain("v128.bitselect", simd(0x52), (V128_V128_V128, V128));
    t.plain("v128.any_true", simd(0x53), (V128, I32));

    // i8x16
    t.run(simd(0x60), &["i8x16.abs", "i8x16.neg", "i8x16.popcnt"], (V128, V128));
    t.run(simd(0x63), &["i8x16.all_true", "i8x16.bitmask"], (V128, I32));
    t.run(
        simd(0x6E),
        &[
            "i8x16.add",
            "i8x16.add_sat_s",
            "i8x16.add_sat_u",
            "i8x16.sub",
            "i8x16.sub_sat_s",
            "i8x16.sub_sat_u",
        ],
        (V128_V128, V128),
    );
    t.run(
        simd(0x76),
        &["i8x16.min_s", "i8x16.min_u", "i8x16.max_s", "i8x16.max_u"],
        (V128_V128, V128),
    );
    t.plain("i8x16.avgr_u", simd(0x7B), (V128_V128, V128));

    // i16x8
    t.run(simd(0x80), &["i16x8.abs", "i16x8.neg"], (V128, V128));
    t.run(simd(0x83), &["i16x8.all_true", "i16x8.bitmask"], (V128, I32));
    t.plain("i16x8.add", simd(0x8E), (V128_V128, V128));
    t.plain("i16x8.sub", simd(0x91), (V128_V128, V128));
    t.plain("i16x8.mul", simd(0x95), (V128_V128, V128));

    // i32x4
    t.run(simd(0xA0), &["i32x4.abs", "i32x4.neg"], (V128, V128));
    t.run(simd(0xA3), &["i32x4.all_true", "i32x4.bitmask"], (V128, I32));
    t.run(simd(0xAB), &["i32x4.shl", "i32x4.shr_s", "i32x4.shr_u"], (V128_I32, V128));
    t.plain("i32x4.add", simd(0xAE), (V128_V128, V128));
    t.plain("i32x4.sub", simd(0xB1), (V128_V128, V128));
    t.run(
        simd(0xB5),
        &["i32x4.mul", "i32x4.min_s", "i32x4.min_u", "i32x4.max_s", "i32x4.max_u"],
        (V128_V128, V128),
    );

    // i64x2
    t.run(simd(0xC0), &["i64x2.abs", "i64x2.neg"], (V128, V128));
    t.run(simd(0xC3), &["i64x2.all_true", "i64x2.bitmask"], (V128, I32));
    t.plain("i64x2.add", simd(0xCE), (V128_V128, V128));
    t.plain("i64x2.sub", simd(0xD1), (V128_V128, V128));
    t.plain("i64x2.mul", simd(0xD5), (V128_V128, V128));

    // f32x4, f64x2
    t.run(simd(0xE0), &["f32x4.abs", "f32x4.neg"], (V128, V128));
    t.plain("f32x4.sqrt", simd(0xE3), (V128, V128));
    t.run(
        simd(0xE4),
        &["f32x4.add", "f32x4.sub", "f32x4.mul", "f32x4.div", "f32x4.min", "f32x4.max"],
        (V128_V128, V128),
    );
    t.run(simd(0xEC), &["f64x2.abs", "f64x2.neg"], (V128, V128));
    t.plain("f64x2.sqrt", simd(0xEF), (V128, V128));
    t.run(
        simd(0xF0),
        &["f64x2.add", "f64x2.sub", "f64x2.mul", "f64x2.div", "f64x2.min", "f64x2.max"],
        (V128_V128, V128),
    );

    // relaxed SIMD
    t.plain("i8x16.relaxed_swizzle", simd(0x100), (V128_V128, V128));
    t.run(
        simd(0x105),
        &[
            "f32x4.relaxed_madd",
            "f32x4.relaxed_nmadd",
            "f64x2.relaxed_madd",
            "f64x2.relaxed_nmadd",
        ],
        (V128_V128_V128, V128),
    );
}

fn atomics(t: &mut Table) {
    t.memory_access("memory.atomic.notify", atomic(0x00), 2, (I32_I32, I32));
    t.memory_access("memory.atomic.wait32", atomic(0x01), 2, (I32_I32_I64, I32));
    t.memory_access("memory.atomic.wait64", atomic(0x02), 3, (I32_I64_I64, I32));
    t.add(
        "atomic.fence",
        atomic(0x03),
        ImmediateKind::Reserved,
        Some((NONE, NONE)),
        create_fence,
        resolve_immediate,
    );

    t.atomic_family(
        AtomicFamily::Load,
        0x10,
        [
            "i32.atomic.load",
            "i64.atomic.load",
            "i32.atomic.load8_u",
            "i32.atomic.load16_u",
            "i64.atomic.load8_u",
            "i64.atomic.load16_u",
            "i64.atomic.load32_u",
        ],
    );
    t.atomic_family(
        AtomicFamily::Store,
        0x17,
        [
            "i32.atomic.store",
            "i64.atomic.store",
            "i32.atomic.store8",
            "i32.atomic.store16",
            "i64.atomic.store8",
            "i64.atomic.store16",
            "i64.atomic.store32",
        ],
    );
    t.atomic_family(
        AtomicFamily::Rmw,
        0x1E,
        [
            "i32.atomic.rmw.add",
            "i64.atomic.rmw.add",
            "i32.atomic.rmw8.add_u",
            "i32.atomic.rmw16.add_u",
            "i64.atomic.rmw8.add_u",
            "i64.atomic.rmw16.add_u",
            "i64.atomic.rmw32.add_u",
        ],
    );
    t.atomic_family(
        AtomicFamily::Rmw,
        0x25,
        [
            "i32.atomic.rmw.sub",
            "i64.atomic.rmw.sub",
            "i32.atomic.rmw8.sub_u",
            "i32.atomic.rmw16.sub_u",
            "i64.atomic.rmw8.sub_u",
            "i64.atomic.rmw16.sub_u",
            "i64.atomic.rmw32.sub_u",
        ],
    );
    t.atomic_family(
        AtomicFamily::Rmw,
        0x2C,
        [
            "i32.atomic.rmw.and",
            "i64.atomic.rmw.and",
            "i32.atomic.rmw8.and_u",
            "i32.atomic.rmw16.and_u",
            "i64.atomic.rmw8.and_u",
            "i64.atomic.rmw16.and_u",
            "i64.atomic.rmw32.and_u",
        ],
    );
    t.atomic_family(
        AtomicFamily::Rmw,
        0x33,
        [
            "i32.atomic.rmw.or",
            "i64.atomic.rmw.or",
            "i32.atomic.rmw8.or_u",
            "i32.atomic.rmw16.or_u",
            "i64.atomic.rmw8.or_u",
            "i64.atomic.rmw16.or_u",
            "i64.atomic.rmw32.or_u",
        ],
    );
    t.atomic_family(
        AtomicFamily::Rmw,
        0x3A,
        [
            "i32.atomic.rmw.xor",
            "i64.atomic.rmw.xor",
            "i32.atomic.rmw8.xor_u",
            "i32.atomic.rmw16.xor_u",
            "i64.atomic.rmw8.xor_u",
            "i64.atomic.rmw16.xor_u",
            "i64.atomic.rmw32.xor_u",
        ],
    );
    t.atomic_family(
        AtomicFamily::Rmw,
        0x41,
        [
            "i32.atomic.rmw.xchg",
            "i64.atomic.rmw.xchg",
            "i32.atomic.rmw8.xchg_u",
            "i32.atomic.rmw16.xchg_u",
            "i64.atomic.rmw8.xchg_u",
            "i64.atomic.rmw16.xchg_u",
            "i64.atomic.rmw32.xchg_u",
        ],
    );
    t.atomic_family(
        AtomicFamily::Cmpxchg,
        0x48,
        [
            "i32.atomic.rmw.cmpxchg",
            "i64.atomic.rmw.cmpxchg",
            "i32.atomic.rmw8.cmpxchg_u",
            "i32.atomic.rmw16.cmpxchg_u",
            "i64.atomic.rmw8.cmpxchg_u",
            "i64.atomic.rmw16.cmpxchg_u",
            "i64.atomic.rmw32.cmpxchg_u",
        ],
    );
}
