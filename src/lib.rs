//! A type-checked WebAssembly module builder and binary codec.
//!
//! wasmforge assembles WebAssembly 2.0 modules from Rust: function bodies are
//! written instruction by instruction against a live operand stack, entities
//! refer to each other by handle, and only what is reachable from the exports
//! and start function ends up in the emitted binary.
//!
//! # Modules
//!
//! - [`builder`] -- [`ModuleBuilder`], the per-body [`LocalContext`] stack checker and the resolver.
//! - [`registry`] -- The static instruction table driving construction, encoding and decoding.
//! - [`parser`] -- Binary format decoder. Reads `.wasm` bytes into a [`parser::module::Module`].
//! - [`encoder`] -- Binary encoder. Serialises a `Module` back to `.wasm` bytes.
//! - [`engine`] -- The [`Engine`] trait a host implements to instantiate modules.
//!
//! # Example
//!
//! Build a module exporting `f(x, y) = x + y + 5` and round-trip it:
//!
//! ```
//! use wasmforge::{ModuleBuilder, ModuleConfig, Module};
//! use wasmforge::parser::module::{FunctionType, ValueType::I32};
//!
//! let mut b = ModuleBuilder::new();
//! let f = b.func(FunctionType::new(&[I32, I32], &[I32]), |c| {
//!     let x = c.param(0)?;
//!     let y = c.param(1)?;
//!     let sum = c.binary("i32.add", x, y)?;
//!     c.binary("i32.add", sum, 5)?;
//!     Ok(())
//! }).unwrap();
//!
//! let module = b.build(&ModuleConfig::new().export("f", &f)).unwrap();
//! let bytes = module.to_bytes().unwrap();
//! assert_eq!(Module::from_bytes(&bytes).unwrap(), module);
//! ```
//!
//! # Specification
//!
//! Targets the [WebAssembly 2.0 specification](https://webassembly.github.io/spec/core/)
//! binary format, plus SIMD, relaxed SIMD fused multiply-add and the threads
//! proposal's atomics and shared memories.

pub mod builder;
pub mod encoder;
pub mod engine;
pub mod parser;
pub mod registry;

pub use builder::{BuildError, LocalContext, ModuleBuilder, ModuleConfig};
pub use engine::Engine;
pub use parser::module::Module;
