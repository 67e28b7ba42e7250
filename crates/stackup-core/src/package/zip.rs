//! Deterministic zip packaging
//!
//! Entries are added in sorted path order with a fixed timestamp and fixed
//! permissions, so identical sources always hash identically.

use super::{bundle_key, ArtifactPackager, BundleInfo};
use crate::config::ResolvedConfig;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub struct ZipPackager {
    cwd: PathBuf,
    dist_dir: PathBuf,
}

impl ZipPackager {
    /// `cwd` anchors relative `source` paths; bundles are written to `dist_dir`
    pub fn new(cwd: impl Into<PathBuf>, dist_dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            dist_dir: dist_dir.into(),
        }
    }

    /// Zip a directory tree or a single file into memory
    pub fn build_zip(unit: &str, source: &Path) -> Result<Vec<u8>> {
        let files = collect_files(unit, source)?;
        if files.is_empty() {
            return Err(Error::package(
                unit,
                format!("{} contains no files", source.display()),
            ));
        }

        let zip_err = |e: zip::result::ZipError| Error::package(unit, e.to_string());
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        let mut zip_buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut zip_buffer));
            for (entry_name, full_path) in &files {
                let content = std::fs::read(full_path).map_err(|e| Error::io(full_path, e))?;
                zip.start_file(entry_name.as_str(), options).map_err(zip_err)?;
                zip.write_all(&content)
                    .map_err(|e| Error::package(unit, e.to_string()))?;
            }
            zip.finish().map_err(zip_err)?;
        }

        Ok(zip_buffer)
    }
}

impl ArtifactPackager for ZipPackager {
    fn package(&self, unit: &str, config: &ResolvedConfig) -> Result<BundleInfo> {
        let unit_config = config
            .unit(unit)
            .ok_or_else(|| Error::unresolved(format!("lambdas.{}", unit)))?;
        let source = unit_config
            .get("source")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::package(unit, "no `source` set (or set `remote` for a prebuilt artifact)"))?;
        let source = self.cwd.join(source);

        let bytes = Self::build_zip(unit, &source)?;
        let bundle_hash = hex::encode(Sha256::digest(&bytes));
        let bundle_name = format!("{}.zip", unit);

        std::fs::create_dir_all(&self.dist_dir).map_err(|e| Error::io(&self.dist_dir, e))?;
        let path = self.dist_dir.join(&bundle_name);
        std::fs::write(&path, &bytes).map_err(|e| Error::io(&path, e))?;

        let bucket = match unit_config.get("bucket").and_then(|v| v.as_str()) {
            Some(alias) => config.resolve_bucket(alias),
            None => config.system_bucket()?,
        };
        let key = bundle_key(config, unit, &bundle_hash)?;

        tracing::debug!(
            unit,
            hash = %bundle_hash,
            bytes = bytes.len(),
            path = %path.display(),
            "Packaged unit"
        );

        Ok(BundleInfo {
            unit: unit.to_string(),
            bundle_name,
            bundle_hash,
            bucket,
            key,
            path,
        })
    }
}

/// `(entry name, file path)` pairs in sorted order. Entry names use `/`.
fn collect_files(unit: &str, source: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !source.exists() {
        return Err(Error::package(
            unit,
            format!("source {} does not exist", source.display()),
        ));
    }

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| unit.to_string());
        return Ok(vec![(name, source.to_path_buf())]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::package(unit, e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::package(unit, e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((name, entry.path().to_path_buf()));
    }
    Ok(files)
}
