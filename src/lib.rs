/*!
# Cristal-rs

The persistence and scripting core of a description-driven business-process kernel.

## Overview

Business entities are **items**, identified by a UUID. Every item owns a tree of **local
objects** (properties, lifecycle, audit trail events, outcomes, viewpoints, collections and
jobs) addressed by cluster paths such as `Property/Name` or `Outcome/Invoice/0/12`.

Local objects are kept by pluggable **cluster storages**. A storage manager routes reads and
writes to the storages that support each cluster, and a transactional layer adds per-item
write locks and commit/abort semantics on top of any storage.

Business logic runs in **scripts**: typed, composable units executed by a script engine
chosen by language name. JSONLogic is supported out of the box.

## Key Components

* **ClusterStorage**: The contract every storage backend implements
* **MemoryOnlyClusterStorage**: Concurrent in-memory storage, also used as object cache
* **XmlClusterStorage**: One XML file per local object below a root directory
* **ClusterStorageManager**: Routes requests to capable storages, with optional caching
* **TransactionalStorage**: Exclusive item locks and pending-write logs per transaction
* **Script**: Typed inputs and outputs, includes, engine-agnostic execution
* **KernelConfig**: JSON configuration of the storage stack and scripting

## Usage Example

```rust,no_run
use cristal_rs::{KernelConfig, ItemPath, Property, Result};

fn main() -> Result<()> {
    let config = KernelConfig::from_json(r#"{ "storages": [{ "type": "memory" }] }"#)?;
    let storage = config.build_transactional()?;

    let item = ItemPath::new();
    let key = storage.begin()?;
    storage.put(&item, &Property::new("Name", "Widget").into(), Some(&key))?;
    storage.commit(&key)?;

    let name = storage.get(&item, "Property/Name", None)?;
    println!("Stored {:?}", name.as_property());
    Ok(())
}
```

## Scripts

```rust,no_run
use cristal_rs::{InMemoryScriptResolver, KernelConfig, Result};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let resolver = InMemoryScriptResolver::new();
    resolver.add(
        "Adder",
        0,
        r#"<cristalscript>
             <param name="a" type="integer"/>
             <output name="sum" type="integer"/>
             <script language="jsonlogic"><![CDATA[{"+":[{"var":"a"},1]}]]></script>
           </cristalscript>"#,
    );

    let loader = KernelConfig::default().build_script_loader(Arc::new(resolver));
    let mut script = loader.load("Adder", 0)?;
    script.set_input_param_value("a", json!(41))?;
    assert_eq!(script.execute().await?, json!(42));
    Ok(())
}
```
*/

pub mod config;
pub mod error;
pub mod lookup;
pub mod persistency;
pub mod retry;
pub mod scripting;

// Re-export all public APIs for easier access
pub use config::{KernelConfig, ScriptingConfig, StorageConfig};
pub use error::{ErrorInfo, KernelError, Result};
pub use lookup::ItemPath;
pub use persistency::{
    Capability, ClusterStorage, ClusterStorageManager, ClusterType, Collection, CollectionMember,
    Event, Job, Lifecycle, LocalObject, MemoryOnlyClusterStorage, Outcome, Property,
    TransactionEntry, TransactionKey, TransactionalStorage, Viewpoint, XmlClusterStorage,
    XmlStorageConfig,
};
pub use retry::RetryConfig;
pub use scripting::{
    CompiledScript, InMemoryScriptResolver, JsonLogicEngine, Parameter, ParameterType, Script,
    ScriptEngine, ScriptEngineRegistry, ScriptLoader, ScriptResolver, StorageScriptResolver,
};
