//! The merged configuration tree and typed accessors over it

use super::keypath::{get_in, set_in, KeyPath, Segment};
use crate::error::{Error, Result};
use crate::options::DEFAULT_DEPLOYMENT;
use crate::stack::StackIdentity;
use serde_json::{Map, Value};
use std::time::Duration;

/// Key holding deployable units
pub const UNITS_KEY: &str = "lambdas";

const RESOLVED: &str = "resolved configuration";

/// Single merged configuration tree. The root is always a mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    root: Value,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_map(Map::new())
    }
}

impl ResolvedConfig {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self {
            root: Value::Object(map),
        }
    }

    pub fn into_map(self) -> Map<String, Value> {
        match self.root {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Replace the whole tree. Used after an engine hook returns a new tree.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            _ => Err(Error::config(RESOLVED, "root must be a mapping")),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    /// Look up a key-path. `None` is absence; an explicit null is `Some(Value::Null)`.
    pub fn get_path(&self, path: &KeyPath) -> Option<&Value> {
        get_in(&self.root, path.segments())
    }

    /// Convenience lookup from text; an unparsable path is treated as absent
    pub fn get(&self, path: &str) -> Option<&Value> {
        KeyPath::parse(path).ok().and_then(|p| self.get_path(&p))
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn set_path(&mut self, path: &KeyPath, value: Value) -> bool {
        set_in(&mut self.root, path.segments(), value)
    }

    pub fn deployment(&self) -> &str {
        self.get_str("deployment").unwrap_or(DEFAULT_DEPLOYMENT)
    }

    pub fn stack_name(&self) -> Result<String> {
        match self.get("stackName") {
            Some(Value::String(name)) if !name.trim().is_empty() => Ok(name.clone()),
            Some(Value::String(_)) | None | Some(Value::Null) => Err(Error::config(
                RESOLVED,
                "stackName is not set (add it to config.yml or pass --stack)",
            )),
            Some(_) => Err(Error::config(RESOLVED, "stackName must be a string")),
        }
    }

    /// Stack name plus region/profile/role context. Role is never defaulted.
    pub fn stack_identity(&self) -> Result<StackIdentity> {
        let optional = |key: &str| -> Result<Option<String>> {
            match self.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) if s.is_empty() => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(Error::config(RESOLVED, format!("{} must be a string", key))),
            }
        };

        Ok(StackIdentity {
            stack_name: self.stack_name()?,
            region: optional("region")?,
            profile: optional("profile")?,
            role: optional("role")?,
        })
    }

    /// Bucket used for compiled templates and packaged units:
    /// `system_bucket`, else the `internal` bucket alias.
    pub fn system_bucket(&self) -> Result<String> {
        self.get_str("system_bucket")
            .or_else(|| self.get_str("buckets.internal"))
            .map(str::to_string)
            .ok_or_else(|| {
                Error::config(
                    RESOLVED,
                    "no deployment bucket: set buckets.internal or system_bucket",
                )
            })
    }

    /// Resolve a bucket alias declared under `buckets`; unknown names pass through
    pub fn resolve_bucket(&self, name: &str) -> String {
        let path = KeyPath::from_keys(["buckets", name]);
        match self.get_path(&path) {
            Some(Value::String(bucket)) => bucket.clone(),
            _ => name.to_string(),
        }
    }

    /// Capabilities acknowledged on create/update
    pub fn capabilities(&self) -> Vec<String> {
        match self.get("capabilities") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Poll interval and maximum wait budget
    pub fn poll_settings(&self) -> (Duration, Duration) {
        let secs = |key: &str, fallback: u64| {
            self.get(key)
                .and_then(Value::as_u64)
                .unwrap_or(fallback)
        };
        (
            Duration::from_secs(secs("poll.interval_seconds", 5).max(1)),
            Duration::from_secs(secs("poll.max_wait_seconds", 1800)),
        )
    }

    /// Names of the deployable units in declaration order.
    /// Units are a mapping keyed by name, or a sequence of mappings with `name`.
    pub fn unit_names(&self) -> Vec<String> {
        match self.root.get(UNITS_KEY) {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Key-path of one unit's configuration
    pub fn unit_path(&self, unit: &str) -> Option<KeyPath> {
        match self.root.get(UNITS_KEY) {
            Some(Value::Object(map)) if map.contains_key(unit) => {
                Some(KeyPath::from_keys([UNITS_KEY, unit]))
            }
            Some(Value::Array(items)) => items
                .iter()
                .position(|item| item.get("name").and_then(Value::as_str) == Some(unit))
                .map(|index| {
                    let mut path = KeyPath::from_keys([UNITS_KEY]);
                    path.push(Segment::Index(index));
                    path
                }),
            _ => None,
        }
    }

    pub fn unit(&self, unit: &str) -> Option<&Value> {
        self.unit_path(unit).and_then(|path| self.get_path(&path))
    }
}
