//! The hand-off point to a WebAssembly host.
//!
//! wasmforge only produces and reads modules. Running them is left to an
//! external engine, which plugs in by implementing [`Engine`];
//! [`Module::instantiate`](crate::parser::module::Module::instantiate)
//! encodes the module and passes the bytes through.

use crate::encoder::EncodeError;

pub trait Engine {
    /// Whatever the host hands back for a live module.
    type Instance;

    /// Host failures. Encoding errors raised before the host is reached are
    /// converted into this type.
    type Error: From<EncodeError>;

    fn instantiate(&mut self, bytes: &[u8]) -> Result<Self::Instance, Self::Error>;
}
