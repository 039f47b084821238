//! Engine registry and typed parameter bounds.

mod info;
mod registry;

pub use info::{EngineParameters, ParamBounds};
pub use registry::{EngineRegistry, RegistryError, builtin, lookup, tokenizer_model};
