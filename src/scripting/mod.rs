//! # Scripting
//!
//! Typed, composable business-logic scripts executed by pluggable engines.

pub mod engine;
pub mod loader;
pub mod parameter;
pub mod resolver;
pub mod script;

pub use engine::{CompiledScript, JsonLogicEngine, ScriptEngine, ScriptEngineRegistry};
pub use loader::ScriptLoader;
pub use parameter::{Parameter, ParameterType};
pub use resolver::{InMemoryScriptResolver, ScriptResolver, StorageScriptResolver};
pub use script::Script;
