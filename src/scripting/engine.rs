//! # Script engines
//!
//! A script engine turns source code into a compiled script once, and the compiled script
//! is evaluated as many times as needed against a JSON object of bindings. Engines are
//! looked up by language name in a [`ScriptEngineRegistry`].
//!
//! The built-in [`JsonLogicEngine`] evaluates JSONLogic with structure preservation, so a
//! script written as an object literal yields one value per key:
//!
//! ```json
//! {"total": {"+": [{"var": "a"}, {"var": "b"}]}, "valid": {">": [{"var": "a"}, 0]}}
//! ```

use crate::error::{KernelError, Result};
use async_trait::async_trait;
use datalogic_rs::{CompiledLogic, DataLogic};
use log::{debug, info};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Language name of the built-in JSONLogic engine
pub const JSONLOGIC: &str = "jsonlogic";

/// Script compiled by an engine, ready for evaluation
#[async_trait]
pub trait CompiledScript: Send + Sync {
    /// Evaluate against a JSON object of bindings
    async fn eval(&self, bindings: &Value) -> Result<Value>;
}

/// Compiler for one scripting language
pub trait ScriptEngine: Send + Sync {
    /// Language name, matched case-insensitively
    fn language(&self) -> &str;

    fn compile(&self, name: &str, code: &str) -> Result<Arc<dyn CompiledScript>>;
}

/// JSONLogic engine backed by DataLogic
pub struct JsonLogicEngine {
    datalogic: Arc<DataLogic>,
}

impl Default for JsonLogicEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonLogicEngine {
    pub fn new() -> Self {
        Self {
            datalogic: Arc::new(DataLogic::with_preserve_structure()),
        }
    }
}

impl ScriptEngine for JsonLogicEngine {
    fn language(&self) -> &str {
        JSONLOGIC
    }

    fn compile(&self, name: &str, code: &str) -> Result<Arc<dyn CompiledScript>> {
        let logic: Value = serde_json::from_str(code).map_err(|e| {
            KernelError::ScriptParsing(format!("Script {} is not valid JSON: {}", name, e))
        })?;

        debug!("Compiling JSONLogic script {}: {}", name, logic);
        let compiled = self.datalogic.compile(&logic).map_err(|e| {
            KernelError::ScriptParsing(format!("Failed to compile script {}: {}", name, e))
        })?;

        Ok(Arc::new(JsonLogicScript {
            name: name.to_string(),
            datalogic: Arc::clone(&self.datalogic),
            compiled,
        }))
    }
}

struct JsonLogicScript {
    name: String,
    datalogic: Arc<DataLogic>,
    compiled: Arc<CompiledLogic>,
}

/// Evaluation runs on the tokio blocking pool.
/// A timeout around [`CompiledScript::eval`] stops the wait, but an evaluation already
/// started finishes in the background.
#[async_trait]
impl CompiledScript for JsonLogicScript {
    async fn eval(&self, bindings: &Value) -> Result<Value> {
        let datalogic = Arc::clone(&self.datalogic);
        let compiled = Arc::clone(&self.compiled);
        let bindings = Arc::new(bindings.clone());

        let result = tokio::task::spawn_blocking(move || {
            datalogic
                .evaluate(&compiled, bindings)
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| {
            KernelError::script_execution(
                format!("Evaluation of script {} did not complete: {}", self.name, e),
                None,
            )
        })?;

        result.map_err(|e| {
            KernelError::script_execution(
                format!("Failed to evaluate script {}: {}", self.name, e),
                None,
            )
        })
    }
}

/// Script engines by language
pub struct ScriptEngineRegistry {
    engines: HashMap<String, Arc<dyn ScriptEngine>>,
}

impl Default for ScriptEngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngineRegistry {
    /// Registry holding the built-in JSONLogic engine
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(JsonLogicEngine::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Register an engine, replacing any engine of the same language
    pub fn register(&mut self, engine: Arc<dyn ScriptEngine>) {
        let language = engine.language().to_lowercase();
        info!("Registering script engine for {}", language);
        self.engines.insert(language, engine);
    }

    pub fn get(&self, language: &str) -> Result<Arc<dyn ScriptEngine>> {
        self.engines
            .get(&language.to_lowercase())
            .cloned()
            .ok_or_else(|| KernelError::EngineNotFound(language.to_string()))
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }
}
