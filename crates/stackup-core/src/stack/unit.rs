//! Code-only update of one deployable unit
//!
//! The fully expanded template is searched for the unit's function resource,
//! matched by `FunctionName` when several functions are declared. Its name and
//! code location are read from the resource; the stack itself is never touched.

use super::controller::Outcome;
use super::StackIdentity;
use crate::error::{Error, Result};
use crate::gateway::{BundleRef, StackGateway};
use crate::package::BundleInfo;
use crate::template::CompiledTemplate;
use serde_yaml::Value;

const FUNCTION_TYPES: &[&str] = &["AWS::Lambda::Function", "AWS::Serverless::Function"];

/// Where the unit's code lives and which function runs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionTarget {
    pub logical_id: String,
    pub function_name: String,
    pub bundle: BundleRef,
}

/// Find the function resource for `unit` in `compiled`.
/// Values that are not plain strings (e.g. `!Sub`) fall back to the defaults.
pub fn locate_function(
    compiled: &CompiledTemplate,
    unit: &str,
    default_name: &str,
    bundle: &BundleInfo,
) -> Result<FunctionTarget> {
    let doc = compiled.validate_syntax()?;
    let resources = doc
        .get("Resources")
        .and_then(Value::as_mapping)
        .ok_or_else(|| Error::config(compiled.name(), "template has no Resources mapping"))?;

    let functions: Vec<(String, &Value)> = resources
        .iter()
        .filter(|(_, resource)| {
            resource
                .get("Type")
                .and_then(Value::as_str)
                .is_some_and(|t| FUNCTION_TYPES.contains(&t))
        })
        .map(|(id, resource)| (yaml_key(id), resource))
        .collect();

    let (logical_id, resource) = match functions.as_slice() {
        [] => {
            return Err(Error::config(
                compiled.name(),
                format!("no function resource found for unit '{}'", unit),
            ))
        }
        [only] => only.clone(),
        many => {
            // pick the one that names the expected function
            let named: Vec<_> = many
                .iter()
                .filter(|(_, r)| property(r, &["FunctionName"]) == Some(default_name))
                .collect();
            match named.as_slice() {
                [one] => (*one).clone(),
                _ => {
                    return Err(Error::config(
                        compiled.name(),
                        format!(
                            "no single function named '{}' for unit '{}' among {} functions, found {}",
                            default_name,
                            unit,
                            many.len(),
                            named.len()
                        ),
                    ))
                }
            }
        }
    };

    let function_name = property(resource, &["FunctionName"])
        .unwrap_or(default_name)
        .to_string();
    let bucket = property(resource, &["Code", "S3Bucket"])
        .unwrap_or(&bundle.bucket)
        .to_string();
    let key = property(resource, &["Code", "S3Key"])
        .unwrap_or(&bundle.key)
        .to_string();

    Ok(FunctionTarget {
        logical_id,
        function_name,
        bundle: BundleRef { bucket, key },
    })
}

/// Upload the bundle and point the function at it
pub async fn update_unit_code(
    gateway: &dyn StackGateway,
    identity: &StackIdentity,
    target: &FunctionTarget,
    bytes: Vec<u8>,
) -> Result<Outcome> {
    tracing::info!(
        function = %target.function_name,
        bucket = %target.bundle.bucket,
        key = %target.bundle.key,
        "Uploading unit bundle"
    );
    gateway
        .upload_artifact(identity, &target.bundle.bucket, &target.bundle.key, bytes)
        .await?;
    gateway
        .update_function_code(identity, &target.function_name, &target.bundle)
        .await?;
    Ok(Outcome::UnitUpdated {
        function_name: target.function_name.clone(),
        bucket: target.bundle.bucket.clone(),
        key: target.bundle.key.clone(),
    })
}

fn property<'v>(resource: &'v Value, path: &[&str]) -> Option<&'v str> {
    let mut current = resource.get("Properties")?;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

fn yaml_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
