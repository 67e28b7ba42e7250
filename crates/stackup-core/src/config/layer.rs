//! Configuration layers and their precedence ranks

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Where a layer came from. The declaration order is the precedence order,
/// lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerOrigin {
    /// Values compiled into the tool plus the captured process environment
    Builtin,
    /// Config of the application template directory (`--template`)
    AppTemplate,
    /// The `default` section of the config file
    Base,
    /// The named deployment section of the config file
    Deployment,
    /// Values from the env file
    EnvFile,
    /// `--set key=value` overrides
    Cli,
    /// `--region`, `--profile`, `--role` and `--stack`
    Pinned,
}

impl LayerOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            LayerOrigin::Builtin => "builtin",
            LayerOrigin::AppTemplate => "app-template",
            LayerOrigin::Base => "base",
            LayerOrigin::Deployment => "deployment",
            LayerOrigin::EnvFile => "env-file",
            LayerOrigin::Cli => "cli",
            LayerOrigin::Pinned => "pinned",
        }
    }
}

impl fmt::Display for LayerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One immutable source of configuration values
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    origin: LayerOrigin,
    name: String,
    values: Map<String, Value>,
}

impl ConfigLayer {
    /// Wrap a parsed document. Fails unless the root is a mapping.
    pub fn new(origin: LayerOrigin, name: impl Into<String>, root: Value) -> Result<Self> {
        let name = name.into();
        match root {
            Value::Object(values) => Ok(Self {
                origin,
                name,
                values,
            }),
            Value::Null => Ok(Self {
                origin,
                name,
                values: Map::new(),
            }),
            other => Err(Error::config(
                name,
                format!("expected a mapping at the root, found {}", type_name(&other)),
            )),
        }
    }

    pub fn empty(origin: LayerOrigin, name: impl Into<String>) -> Self {
        Self {
            origin,
            name: name.into(),
            values: Map::new(),
        }
    }

    pub fn origin(&self) -> LayerOrigin {
        self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

/// Short type name used in diagnostics
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
