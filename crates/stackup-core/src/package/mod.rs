//! Packaging of deployable units
//!
//! A packager turns `lambdas.<unit>.source` into a code bundle and reports
//! where it should be uploaded. `inject` writes that build metadata back into
//! the unit's configuration so templates can reference it.

pub mod zip;

pub use self::zip::ZipPackager;

use crate::config::{KeyPath, ResolvedConfig};
use crate::error::{Error, Result};
use serde_json::Value;
use std::path::PathBuf;

/// Build metadata of one packaged unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleInfo {
    pub unit: String,
    /// File name of the bundle, e.g. `api.zip`
    pub bundle_name: String,
    /// Lowercase hex SHA-256 of the bundle bytes
    pub bundle_hash: String,
    pub bucket: String,
    pub key: String,
    /// Local copy of the bundle
    pub path: PathBuf,
}

impl BundleInfo {
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| Error::io(&self.path, e))
    }
}

pub trait ArtifactPackager: Send + Sync {
    fn package(&self, unit: &str, config: &ResolvedConfig) -> Result<BundleInfo>;
}

/// Default function name for a unit
pub fn default_function_name(config: &ResolvedConfig, unit: &str) -> Result<String> {
    Ok(format!("{}-{}", config.stack_name()?, unit))
}

/// Object key under which a bundle is stored
pub fn bundle_key(config: &ResolvedConfig, unit: &str, hash: &str) -> Result<String> {
    Ok(format!(
        "{}-{}/lambdas/{}/{}.zip",
        config.stack_name()?,
        config.deployment(),
        hash,
        unit
    ))
}

/// Units that need packaging: declared units without a prebuilt `remote`
pub fn units_to_package(config: &ResolvedConfig) -> Vec<String> {
    config
        .unit_names()
        .into_iter()
        .filter(|unit| {
            let prebuilt = config
                .unit(unit)
                .and_then(|u| u.get("remote"))
                .is_some_and(|remote| !remote.is_null());
            if prebuilt {
                tracing::debug!(unit = %unit, "Unit has a remote artifact, skipping packaging");
            }
            !prebuilt
        })
        .collect()
}

/// Package every unit that needs it
pub fn package_all(
    packager: &dyn ArtifactPackager,
    config: &ResolvedConfig,
) -> Result<Vec<BundleInfo>> {
    units_to_package(config)
        .iter()
        .map(|unit| packager.package(unit, config))
        .collect()
}

/// Write `bucket`, `remote`, `hash`, `bundle` and `functionName` into
/// `lambdas.<unit>`. An explicit `functionName` is kept.
pub fn inject(config: &mut ResolvedConfig, info: &BundleInfo) -> Result<()> {
    let unit_path = config
        .unit_path(&info.unit)
        .ok_or_else(|| Error::unresolved(format!("lambdas.{}", info.unit)))?;
    let default_name = default_function_name(config, &info.unit)?;
    let has_name = config
        .get_path(&unit_path.child("functionName"))
        .is_some_and(|v| !v.is_null());

    let mut fields = vec![
        ("bucket", Value::String(info.bucket.clone())),
        ("remote", Value::String(info.key.clone())),
        ("hash", Value::String(info.bundle_hash.clone())),
        ("bundle", Value::String(info.bundle_name.clone())),
    ];
    if !has_name {
        fields.push(("functionName", Value::String(default_name)));
    }

    for (key, value) in fields {
        let path: KeyPath = unit_path.child(key);
        if !config.set_path(&path, value) {
            return Err(Error::package(
                &info.unit,
                format!("cannot write {} into the unit configuration", path),
            ));
        }
    }
    Ok(())
}

/// Fill in `functionName` for units that were not packaged
pub fn inject_function_names(config: &mut ResolvedConfig) -> Result<()> {
    for unit in config.unit_names() {
        let Some(unit_path) = config.unit_path(&unit) else {
            continue;
        };
        let name_path = unit_path.child("functionName");
        if config.get_path(&name_path).is_some_and(|v| !v.is_null()) {
            continue;
        }
        let name = default_function_name(config, &unit)?;
        config.set_path(&name_path, Value::String(name));
    }
    Ok(())
}
