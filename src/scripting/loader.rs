use crate::error::Result;
use crate::scripting::engine::ScriptEngineRegistry;
use crate::scripting::resolver::ScriptResolver;
use crate::scripting::script::Script;
use dashmap::DashMap;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

/// Loads scripts by name and version, caching parsed scripts
///
/// Every call to [`ScriptLoader::load`] returns a fresh copy with unbound parameters.
pub struct ScriptLoader {
    resolver: Arc<dyn ScriptResolver>,
    registry: Arc<ScriptEngineRegistry>,
    cache: DashMap<(String, i32), Script>,
    timeout: Option<Duration>,
}

impl ScriptLoader {
    pub fn new(resolver: Arc<dyn ScriptResolver>, registry: Arc<ScriptEngineRegistry>) -> Self {
        Self {
            resolver,
            registry,
            cache: DashMap::new(),
            timeout: None,
        }
    }

    /// Bound the execution time of loaded scripts
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ScriptEngineRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn load(&self, name: &str, version: i32) -> Result<Script> {
        let mut chain = vec![(name.to_string(), version)];
        self.load_included(name, version, &mut chain)
    }

    pub(crate) fn load_included(
        &self,
        name: &str,
        version: i32,
        chain: &mut Vec<(String, i32)>,
    ) -> Result<Script> {
        let key = (name.to_string(), version);
        if let Some(script) = self.cache.get(&key) {
            return Ok(script.clone());
        }

        debug!("Loading script {} v{}", name, version);
        let xml = self.resolver.resolve(name, version)?;
        let item = self.resolver.item_path(name);
        let script = Script::parse(name, Some(version), item, &xml, self, chain)?;
        self.cache.insert(key, script.clone());
        Ok(script)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
