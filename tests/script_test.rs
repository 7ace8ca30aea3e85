use async_trait::async_trait;
use chrono::Utc;
use cristal_rs::{
    ClusterStorage, CompiledScript, InMemoryScriptResolver, ItemPath, Job, KernelConfig,
    KernelError, MemoryOnlyClusterStorage, Outcome, Result, ScriptEngine, ScriptEngineRegistry,
    ScriptLoader, StorageScriptResolver, Viewpoint,
};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Engine whose scripts count their evaluations and return the count
struct CountingEngine {
    runs: Arc<AtomicUsize>,
}

struct CountingScript {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl CompiledScript for CountingScript {
    async fn eval(&self, _bindings: &Value) -> Result<Value> {
        Ok(json!(self.runs.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

impl ScriptEngine for CountingEngine {
    fn language(&self) -> &str {
        "counting"
    }

    fn compile(&self, _name: &str, _code: &str) -> Result<Arc<dyn CompiledScript>> {
        Ok(Arc::new(CountingScript {
            runs: Arc::clone(&self.runs),
        }))
    }
}

// Engine whose scripts never finish in time
struct SlowEngine;

struct SlowScript;

#[async_trait]
impl CompiledScript for SlowScript {
    async fn eval(&self, _bindings: &Value) -> Result<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Value::Null)
    }
}

impl ScriptEngine for SlowEngine {
    fn language(&self) -> &str {
        "slow"
    }

    fn compile(&self, _name: &str, _code: &str) -> Result<Arc<dyn CompiledScript>> {
        Ok(Arc::new(SlowScript))
    }
}

fn jsonlogic_loader(scripts: &[(&str, &str)]) -> ScriptLoader {
    let resolver = InMemoryScriptResolver::new();
    for (name, xml) in scripts {
        resolver.add(name, 0, *xml);
    }
    KernelConfig::default().build_script_loader(Arc::new(resolver))
}

#[tokio::test]
async fn test_include_outputs_feed_the_including_script() {
    init_logger();
    let loader = jsonlogic_loader(&[
        (
            "Tax",
            r#"<cristalscript>
                 <param name="net" type="decimal"/>
                 <output name="tax" type="decimal"/>
                 <script language="jsonlogic"><![CDATA[{"*": [{"var": "net"}, 0.25]}]]></script>
               </cristalscript>"#,
        ),
        (
            "Invoice",
            r#"<cristalscript>
                 <param name="net" type="decimal"/>
                 <include name="Tax" version="0"/>
                 <output name="gross" type="decimal"/>
                 <output name="taxed" type="boolean"/>
                 <script language="jsonlogic"><![CDATA[{
                   "gross": {"+": [{"var": "net"}, {"var": "tax"}]},
                   "taxed": {">": [{"var": "tax"}, 0]}
                 }]]></script>
               </cristalscript>"#,
        ),
    ]);

    let mut script = loader.load("Invoice", 0).unwrap();
    assert_eq!(script.includes().len(), 1);
    assert_eq!(script.input_params().len(), 1);
    assert!(script.all_input_params().contains_key("net"));

    let mut inputs = Map::new();
    inputs.insert("net".to_string(), json!(10));
    let result = script.evaluate(&inputs).await.unwrap();
    assert_eq!(result, json!({"gross": 12.5, "taxed": true}));
}

#[tokio::test]
async fn test_missing_output_is_reported() {
    init_logger();
    let loader = jsonlogic_loader(&[(
        "Split",
        r#"<cristalscript>
             <output name="a" type="integer"/>
             <output name="b" type="integer"/>
             <script language="jsonlogic"><![CDATA[{"a": 1}]]></script>
           </cristalscript>"#,
    )]);

    let script = loader.load("Split", 0).unwrap();
    assert!(matches!(
        script.execute().await,
        Err(KernelError::Parameter(_))
    ));
}

#[tokio::test]
async fn test_shared_includes_run_once() {
    init_logger();
    let runs = Arc::new(AtomicUsize::new(0));
    let mut registry = ScriptEngineRegistry::new();
    registry.register(Arc::new(CountingEngine {
        runs: Arc::clone(&runs),
    }));

    let resolver = InMemoryScriptResolver::new();
    let counting = |includes: &[&str]| {
        let includes: String = includes
            .iter()
            .map(|name| format!(r#"<include name="{}" version="0"/>"#, name))
            .collect();
        format!(
            r#"<cristalscript>{}<script language="counting">count</script></cristalscript>"#,
            includes
        )
    };
    resolver.add("Base", 0, counting(&[]));
    resolver.add("Left", 0, counting(&["Base"]));
    resolver.add("Right", 0, counting(&["Base"]));
    resolver.add("Top", 0, counting(&["Left", "Right"]));

    let loader = ScriptLoader::new(Arc::new(resolver), Arc::new(registry));
    let script = loader.load("Top", 0).unwrap();

    // Base, Left, Right, then Top itself
    assert_eq!(script.execute().await.unwrap(), json!(4));
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_script_timeout() {
    init_logger();
    let mut registry = ScriptEngineRegistry::new();
    registry.register(Arc::new(SlowEngine));

    let resolver = InMemoryScriptResolver::new();
    resolver.add(
        "Slow",
        0,
        r#"<cristalscript><script language="slow">wait</script></cristalscript>"#,
    );
    let loader = ScriptLoader::new(Arc::new(resolver), Arc::new(registry))
        .with_timeout(Some(Duration::from_millis(20)));

    let script = loader.load("Slow", 0).unwrap();
    let error = script.execute().await.unwrap_err();
    assert!(matches!(error, KernelError::Timeout(_)));
    assert!(error.retryable());
}

#[tokio::test]
async fn test_stored_script_with_execution_environment() {
    init_logger();
    let storage = Arc::new(MemoryOnlyClusterStorage::new());
    let resource = ItemPath::new();
    let xml = r#"<cristalscript>
        <param name="item" type="item"/>
        <param name="agent" type="item"/>
        <param name="job" type="object"/>
        <output name="summary" type="string"/>
        <script language="jsonlogic"><![CDATA[{"cat": [{"var": "job.stepName"}, " on ", {"var": "item"}]}]]></script>
      </cristalscript>"#;
    storage
        .put(&resource, &Outcome::new("Script", 0, 7, xml).into(), None)
        .unwrap();
    storage
        .put(
            &resource,
            &Viewpoint::new(resource, "Script", 0, "2", 7).into(),
            None,
        )
        .unwrap();

    let resolver = StorageScriptResolver::new(storage);
    resolver.register("Describe", resource);
    let loader = KernelConfig::default().build_script_loader(Arc::new(resolver));

    let mut script = loader.load("Describe", 2).unwrap();
    assert_eq!(script.item_path(), Some(&resource));

    let item = ItemPath::new();
    let job = Job {
        id: 1,
        item_path: item,
        step_name: "Approve".to_string(),
        step_path: "workflow/domain/Approve".to_string(),
        step_type: "ElementaryActivity".to_string(),
        transition: "Done".to_string(),
        origin_state: "Waiting".to_string(),
        target_state: "Finished".to_string(),
        agent_role: Some("Manager".to_string()),
        agent_path: None,
        creation_date: Utc::now(),
    };
    script
        .set_act_exec_environment(&item, &ItemPath::new(), Some(&job))
        .unwrap();

    assert_eq!(
        script.execute().await.unwrap(),
        json!(format!("Approve on {}", item))
    );
}
