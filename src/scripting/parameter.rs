use crate::error::{ErrorInfo, KernelError, Result};
use crate::lookup::ItemPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Declared type of a script parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Decimal,
    Boolean,
    Object,
    Array,
    #[serde(rename = "error")]
    ErrorInfo,
    /// UUID of an item, passed as a string
    Item,
    Any,
}

impl ParameterType {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Decimal => "decimal",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
            ParameterType::Array => "array",
            ParameterType::ErrorInfo => "error",
            ParameterType::Item => "item",
            ParameterType::Any => "any",
        }
    }

    /// Whether `value` can be bound to a parameter of this type
    ///
    /// Null is accepted by every type.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Decimal => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Object => value.is_object(),
            ParameterType::Array => value.is_array(),
            ParameterType::ErrorInfo => {
                value.is_object() && serde_json::from_value::<ErrorInfo>(value.clone()).is_ok()
            }
            ParameterType::Item => value
                .as_str()
                .is_some_and(|s| s.parse::<ItemPath>().is_ok()),
            ParameterType::Any => true,
        }
    }
}

impl FromStr for ParameterType {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(ParameterType::String),
            "integer" => Ok(ParameterType::Integer),
            "decimal" => Ok(ParameterType::Decimal),
            "boolean" => Ok(ParameterType::Boolean),
            "object" => Ok(ParameterType::Object),
            "array" => Ok(ParameterType::Array),
            "error" => Ok(ParameterType::ErrorInfo),
            "item" => Ok(ParameterType::Item),
            "any" => Ok(ParameterType::Any),
            other => Err(KernelError::ScriptParsing(format!(
                "Unknown parameter type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input or output of a script
///
/// An output parameter may be anonymous, in which case its name is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            kind,
            value: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Bind a value after checking it against the declared type
    pub fn set_value(&mut self, value: Value) -> Result<()> {
        self.check(&value)?;
        self.value = Some(value);
        Ok(())
    }

    /// Type-check a value for this parameter
    pub fn check(&self, value: &Value) -> Result<()> {
        if self.kind.accepts(value) {
            Ok(())
        } else {
            Err(KernelError::Parameter(format!(
                "Parameter '{}' expects {} but got {}",
                self.name, self.kind, value
            )))
        }
    }
}
