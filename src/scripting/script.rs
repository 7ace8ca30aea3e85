//! # Scripts
//!
//! A script is a unit of business logic with typed inputs and outputs, written in any
//! language a registered engine understands. Scripts are stored as `<cristalscript>`
//! documents:
//!
//! ```xml
//! <cristalscript>
//!   <param name="a" type="integer"/>
//!   <output name="sum" type="integer"/>
//!   <include name="Helper" version="0"/>
//!   <script language="jsonlogic" name="Adder"><![CDATA[{"+":[{"var":"a"},1]}]]></script>
//! </cristalscript>
//! ```
//!
//! Included scripts run before the script that includes them, share its bindings, and add
//! their named outputs to those bindings.

use crate::error::{ErrorInfo, KernelError, Result};
use crate::lookup::ItemPath;
use crate::persistency::object::Job;
use crate::scripting::engine::{CompiledScript, ScriptEngineRegistry};
use crate::scripting::loader::ScriptLoader;
use crate::scripting::parameter::{Parameter, ParameterType};
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Names bound by [`Script::set_act_exec_environment`]
pub const ITEM_PARAM: &str = "item";
pub const AGENT_PARAM: &str = "agent";
pub const JOB_PARAM: &str = "job";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "cristalscript")]
struct ScriptXml {
    #[serde(rename = "param", default)]
    params: Vec<ParamXml>,
    #[serde(rename = "output", default)]
    outputs: Vec<ParamXml>,
    #[serde(rename = "include", default)]
    includes: Vec<IncludeXml>,
    script: ScriptBodyXml,
}

#[derive(Debug, Serialize, Deserialize)]
struct ParamXml {
    #[serde(rename = "@name", default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(rename = "@type")]
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IncludeXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@version")]
    version: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ScriptBodyXml {
    #[serde(rename = "@language")]
    language: String,
    #[serde(rename = "@name", default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(rename = "$text", default)]
    code: String,
}

#[derive(Clone)]
pub struct Script {
    name: String,
    version: Option<i32>,
    item_path: Option<ItemPath>,
    language: String,
    code: String,
    compiled: Arc<dyn CompiledScript>,
    inputs: IndexMap<String, Parameter>,
    outputs: Vec<Parameter>,
    includes: Vec<Script>,
    timeout: Option<Duration>,
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("language", &self.language)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("includes", &self.includes)
            .finish()
    }
}

impl Script {
    /// Build an ad hoc script without parameters
    pub fn new(language: &str, code: &str, registry: &ScriptEngineRegistry) -> Result<Self> {
        let engine = registry.get(language)?;
        let compiled = engine.compile("<expression>", code)?;
        Ok(Self {
            name: String::new(),
            version: None,
            item_path: None,
            language: engine.language().to_string(),
            code: code.to_string(),
            compiled,
            inputs: IndexMap::new(),
            outputs: Vec::new(),
            includes: Vec::new(),
            timeout: None,
        })
    }

    /// Parse a stored script, resolving its includes through `loader`
    pub fn from_xml(
        name: &str,
        version: i32,
        item_path: Option<ItemPath>,
        xml: &str,
        loader: &ScriptLoader,
    ) -> Result<Self> {
        let mut chain = vec![(name.to_string(), version)];
        Self::parse(name, Some(version), item_path, xml, loader, &mut chain)
    }

    /// Parse a script document; `chain` holds the includes being resolved, outermost first
    pub(crate) fn parse(
        name: &str,
        version: Option<i32>,
        item_path: Option<ItemPath>,
        xml: &str,
        loader: &ScriptLoader,
        chain: &mut Vec<(String, i32)>,
    ) -> Result<Self> {
        let doc: ScriptXml = quick_xml::de::from_str(xml).map_err(|e| {
            KernelError::ScriptParsing(format!("Script {} is not a valid document: {}", name, e))
        })?;

        let engine = loader.registry().get(&doc.script.language)?;
        let code = doc.script.code.trim().to_string();
        let compiled = engine.compile(name, &code)?;

        let mut script = Self {
            name: name.to_string(),
            version,
            item_path,
            language: engine.language().to_string(),
            code,
            compiled,
            inputs: IndexMap::new(),
            outputs: Vec::new(),
            includes: Vec::new(),
            timeout: loader.timeout(),
        };

        for param in doc.params {
            if param.name.is_empty() {
                return Err(KernelError::ScriptParsing(format!(
                    "Script {} declares an input without a name",
                    name
                )));
            }
            script.add_input_param(param.name, param.kind.parse()?);
        }
        for output in doc.outputs {
            script
                .add_output_param(output.name, output.kind.parse()?)
                .map_err(|e| KernelError::ScriptParsing(e.to_string()))?;
        }

        for include in doc.includes {
            let link = (include.name.clone(), include.version);
            if chain.contains(&link) {
                let cycle: Vec<String> = chain
                    .iter()
                    .chain(std::iter::once(&link))
                    .map(|(n, v)| format!("{}:{}", n, v))
                    .collect();
                return Err(KernelError::ScriptParsing(format!(
                    "Include cycle: {}",
                    cycle.join(" -> ")
                )));
            }
            chain.push(link);
            let included = loader.load_included(&include.name, include.version, chain);
            chain.pop();
            script.includes.push(included?);
        }

        debug!(
            "Parsed script {} ({} inputs, {} outputs, {} includes)",
            script.name,
            script.inputs.len(),
            script.outputs.len(),
            script.includes.len()
        );
        Ok(script)
    }

    /// Write the script back as a `<cristalscript>` document
    pub fn to_xml(&self) -> Result<String> {
        let doc = ScriptXml {
            params: self
                .inputs
                .values()
                .map(|p| ParamXml {
                    name: p.name.clone(),
                    kind: p.kind.name().to_string(),
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|p| ParamXml {
                    name: p.name.clone(),
                    kind: p.kind.name().to_string(),
                })
                .collect(),
            includes: self
                .includes
                .iter()
                .map(|s| IncludeXml {
                    name: s.name.clone(),
                    version: s.version.unwrap_or(0),
                })
                .collect(),
            script: ScriptBodyXml {
                language: self.language.clone(),
                name: (!self.name.is_empty()).then(|| self.name.clone()),
                code: self.code.clone(),
            },
        };
        quick_xml::se::to_string(&doc).map_err(KernelError::from_xml_se)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declare an input, replacing any input of the same name
    pub fn add_input_param(&mut self, name: impl Into<String>, kind: ParameterType) {
        let name = name.into();
        self.inputs.insert(name.clone(), Parameter::new(name, kind));
    }

    /// Declare an output
    ///
    /// Only a script with a single output may leave it anonymous.
    pub fn add_output_param(&mut self, name: impl Into<String>, kind: ParameterType) -> Result<()> {
        let name = name.into();
        if self.outputs.iter().any(|o| o.name == name) {
            return Err(KernelError::Parameter(format!(
                "Script {} already declares output '{}'",
                self.name, name
            )));
        }
        let anonymous = name.is_empty() || self.outputs.iter().any(Parameter::is_anonymous);
        if !self.outputs.is_empty() && anonymous {
            return Err(KernelError::Parameter(format!(
                "Script {} has several outputs, all of them must be named",
                self.name
            )));
        }
        self.outputs.push(Parameter::new(name, kind));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn item_path(&self) -> Option<&ItemPath> {
        self.item_path.as_ref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn input_params(&self) -> &IndexMap<String, Parameter> {
        &self.inputs
    }

    /// Inputs of this script and of every included script
    ///
    /// When several scripts declare the same name, the declaration closest to this script
    /// is listed.
    pub fn all_input_params(&self) -> IndexMap<String, Parameter> {
        let mut all = self.inputs.clone();
        for include in &self.includes {
            for (name, param) in include.all_input_params() {
                all.entry(name).or_insert(param);
            }
        }
        all
    }

    pub fn output_params(&self) -> &[Parameter] {
        &self.outputs
    }

    pub fn includes(&self) -> &[Script] {
        &self.includes
    }

    /// Bind an input on every script of the include tree that declares it
    ///
    /// The value is checked against every declaration before any is bound, so a rejected
    /// value leaves the whole tree unchanged. Returns false when no script declares the
    /// parameter.
    pub fn set_input_param_value(&mut self, name: &str, value: Value) -> Result<bool> {
        if !self.check_input_value(name, &value)? {
            return Ok(false);
        }
        self.bind_input(name, &value);
        Ok(true)
    }

    fn check_input_value(&self, name: &str, value: &Value) -> Result<bool> {
        let mut found = false;
        if let Some(param) = self.inputs.get(name) {
            param.check(value).map_err(|e| in_script(&self.name, e))?;
            found = true;
        }
        for include in &self.includes {
            found |= include.check_input_value(name, value)?;
        }
        Ok(found)
    }

    fn bind_input(&mut self, name: &str, value: &Value) {
        if let Some(param) = self.inputs.get_mut(name) {
            param.value = Some(value.clone());
        }
        for include in &mut self.includes {
            include.bind_input(name, value);
        }
    }

    /// Bind the item, agent and job of an activity execution where declared
    pub fn set_act_exec_environment(
        &mut self,
        item: &ItemPath,
        agent: &ItemPath,
        job: Option<&Job>,
    ) -> Result<()> {
        self.set_input_param_value(ITEM_PARAM, Value::String(item.to_string()))?;
        self.set_input_param_value(AGENT_PARAM, Value::String(agent.to_string()))?;
        if let Some(job) = job {
            self.set_input_param_value(JOB_PARAM, job_bindings(job))?;
        }
        Ok(())
    }

    /// Bind the given inputs, then execute
    ///
    /// Inputs no script declares are skipped.
    pub async fn evaluate(&mut self, inputs: &Map<String, Value>) -> Result<Value> {
        for (name, value) in inputs {
            if !self.set_input_param_value(name, value.clone())? {
                debug!("Script {} has no input named {}", self.name, name);
            }
        }
        self.execute().await
    }

    /// Run the included scripts then this one, returning the outputs
    pub async fn execute(&self) -> Result<Value> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.run())
                .await
                .map_err(|_| {
                    KernelError::Timeout(format!(
                        "Script {} did not finish within {:?}",
                        self.name, timeout
                    ))
                })?,
            None => self.run().await,
        }
    }

    async fn run(&self) -> Result<Value> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for include in &self.includes {
            include.collect_execution_order(&mut order, &mut seen);
        }

        // every script needs its own inputs bound, agreeing with the shared value
        let mut bindings = Map::new();
        for script in order.iter().copied().chain(std::iter::once(self)) {
            script.add_inputs(&self.name, &mut bindings)?;
        }

        for include in order {
            debug!("Script {}: running include {}", self.name, include.name);
            let result = include.eval_once(&bindings).await.map_err(|e| {
                KernelError::script_execution(
                    format!("Include {} of script {} failed", include.name, self.name),
                    Some(e),
                )
            })?;
            include.bind_outputs(result, &mut bindings);
        }

        info!("Executing script {}", self.name);
        self.eval_once(&bindings).await
    }

    /// Add the inputs declared by this script to the bindings of `root`
    fn add_inputs(&self, root: &str, bindings: &mut Map<String, Value>) -> Result<()> {
        for (name, param) in &self.inputs {
            let Some(value) = &param.value else {
                return Err(KernelError::Parameter(if self.name == root {
                    format!("Script {}: input parameter '{}' was not set", root, name)
                } else {
                    format!(
                        "Script {}: input parameter '{}' of include {} was not set",
                        root, name, self.name
                    )
                }));
            };
            param.check(value).map_err(|e| in_script(&self.name, e))?;
            match bindings.get(name) {
                Some(shared) => {
                    if shared != value {
                        return Err(KernelError::Parameter(format!(
                            "Script {}: included scripts disagree on input parameter '{}'",
                            root, name
                        )));
                    }
                }
                None => {
                    bindings.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Included scripts in depth-first order, each once
    fn collect_execution_order<'a>(
        &'a self,
        order: &mut Vec<&'a Script>,
        seen: &mut HashSet<(String, Option<i32>)>,
    ) {
        if !seen.insert((self.name.clone(), self.version)) {
            return;
        }
        for include in &self.includes {
            include.collect_execution_order(order, seen);
        }
        order.push(self);
    }

    async fn eval_once(&self, bindings: &Map<String, Value>) -> Result<Value> {
        let result = self
            .compiled
            .eval(&Value::Object(bindings.clone()))
            .await?;
        self.check_outputs(result)
    }

    fn check_outputs(&self, result: Value) -> Result<Value> {
        match self.outputs.as_slice() {
            [] => Ok(result),
            [output] => {
                self.check_output(output, &result)?;
                Ok(result)
            }
            outputs => {
                let Value::Object(mut values) = result else {
                    return Err(KernelError::Parameter(format!(
                        "Script {} declares {} outputs but returned {}",
                        self.name,
                        outputs.len(),
                        result
                    )));
                };
                let mut checked = Map::new();
                for output in outputs {
                    let value = values.remove(&output.name).ok_or_else(|| {
                        KernelError::Parameter(format!(
                            "Script {} did not return output '{}'",
                            self.name, output.name
                        ))
                    })?;
                    self.check_output(output, &value)?;
                    checked.insert(output.name.clone(), value);
                }
                Ok(Value::Object(checked))
            }
        }
    }

    fn check_output(&self, output: &Parameter, value: &Value) -> Result<()> {
        output.check(value).map_err(|e| in_script(&self.name, e))?;

        if output.kind == ParameterType::ErrorInfo && !value.is_null() {
            let errors: ErrorInfo =
                serde_json::from_value(value.clone()).map_err(KernelError::from_serde)?;
            if errors.is_fatal() {
                return Err(KernelError::script_execution(
                    format!("Script {} reported a fatal error: {}", self.name, errors),
                    None,
                ));
            }
        }
        Ok(())
    }

    /// Add the named outputs of a result to the shared bindings
    fn bind_outputs(&self, result: Value, bindings: &mut Map<String, Value>) {
        match self.outputs.as_slice() {
            [] => {}
            [output] => {
                if !output.is_anonymous() {
                    bindings.insert(output.name.clone(), result);
                }
            }
            _ => {
                if let Value::Object(values) = result {
                    bindings.extend(values);
                }
            }
        }
    }
}

fn job_bindings(job: &Job) -> Value {
    json!({
        "id": job.id,
        "itemPath": job.item_path.to_string(),
        "stepName": job.step_name,
        "stepPath": job.step_path,
        "stepType": job.step_type,
        "transition": job.transition,
        "originState": job.origin_state,
        "targetState": job.target_state,
        "agentRole": job.agent_role,
        "agentPath": job.agent_path.map(|p| p.to_string()),
        "creationDate": job.creation_date.to_rfc3339(),
    })
}

fn in_script(script: &str, error: KernelError) -> KernelError {
    match error {
        KernelError::Parameter(message) if !script.is_empty() => {
            KernelError::Parameter(format!("Script {}: {}", script, message))
        }
        other => other,
    }
}
