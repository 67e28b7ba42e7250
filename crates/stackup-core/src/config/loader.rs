//! Layer loading: config file sections, env file, CLI overrides
//!
//! The config file is a mapping whose top-level keys are deployment names.
//! `default` is the base layer; the selected deployment's section overrides it.

use super::envfile::parse_env_file;
use super::keypath::{set_in, KeyPath};
use super::layer::{type_name, ConfigLayer, LayerOrigin};
use crate::context::StartupContext;
use crate::error::{Error, Result};
use crate::options::{DeployOptions, DEFAULT_DEPLOYMENT};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

/// Folder holding the project's config when none is given
pub const DEFAULT_CONFIG_DIR: &str = ".stackup";
pub const CONFIG_FILE_NAME: &str = "config.yml";
pub const TEMPLATE_FILE_NAME: &str = "cloudformation.template.yml";
pub const COMPILED_FILE_NAME: &str = "cloudformation.yml";
pub const ENV_FILE_NAME: &str = ".env";
pub const DIST_DIR: &str = "dist";

/// Resolved locations of every file an invocation touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub env_file: PathBuf,
    /// True when the env file was named explicitly and must exist
    pub env_file_required: bool,
    pub template: PathBuf,
    pub compiled: PathBuf,
    pub dist_dir: PathBuf,
    /// Application template directory, if one was given
    pub app_template_dir: Option<PathBuf>,
}

impl ProjectPaths {
    pub fn from_options(ctx: &StartupContext, opts: &DeployOptions) -> Self {
        let config_dir = ctx.resolve(
            opts.config_dir
                .as_deref()
                .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_DIR)),
        );
        let in_config_dir = |explicit: &Option<PathBuf>, default_name: &str| match explicit {
            Some(path) => ctx.resolve(path),
            None => config_dir.join(default_name),
        };

        let app_template_dir = opts.app_template.as_deref().map(|dir| ctx.resolve(dir));
        // the project's own template wins; the application template fills in
        let template = match (&opts.template_path, &app_template_dir) {
            (None, Some(app_dir)) if !config_dir.join(TEMPLATE_FILE_NAME).is_file() => {
                app_dir.join(TEMPLATE_FILE_NAME)
            }
            _ => in_config_dir(&opts.template_path, TEMPLATE_FILE_NAME),
        };

        Self {
            config_file: in_config_dir(&opts.config_path, CONFIG_FILE_NAME),
            env_file: in_config_dir(&opts.env_file, ENV_FILE_NAME),
            env_file_required: opts.env_file.is_some(),
            template,
            compiled: config_dir.join(COMPILED_FILE_NAME),
            dist_dir: ctx.resolve(Path::new(DIST_DIR)),
            config_dir,
            app_template_dir,
        }
    }
}

/// Values compiled into the tool plus the captured environment
pub fn builtin_layer(ctx: &StartupContext, deployment: &str) -> ConfigLayer {
    let env: Map<String, Value> = ctx
        .env()
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let root = json!({
        "deployment": deployment,
        "region": "us-east-1",
        "capabilities": ["CAPABILITY_IAM", "CAPABILITY_NAMED_IAM"],
        "env": env,
        "poll": {
            "interval_seconds": 5,
            "max_wait_seconds": 1800
        }
    });

    ConfigLayer::new(LayerOrigin::Builtin, "builtin defaults", root)
        .unwrap_or_else(|_| ConfigLayer::empty(LayerOrigin::Builtin, "builtin defaults"))
}

/// Top-level deployment sections of a config document
fn document_sections(source_name: &str, content: &str) -> Result<Map<String, Value>> {
    let document: Value = serde_yaml::from_str(content)
        .map_err(|e| Error::config(source_name, e.to_string()))?;

    match document {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::config(
            source_name,
            format!(
                "expected deployment sections at the root, found {}",
                type_name(&other)
            ),
        )),
    }
}

/// Split a config document into its base and deployment layers
pub fn parse_config_document(
    source_name: &str,
    content: &str,
    deployment: &str,
) -> Result<Vec<ConfigLayer>> {
    let mut sections = document_sections(source_name, content)?;

    let mut layers = Vec::new();
    let base = sections.remove(DEFAULT_DEPLOYMENT).unwrap_or(Value::Null);
    layers.push(ConfigLayer::new(
        LayerOrigin::Base,
        format!("{} [{}]", source_name, DEFAULT_DEPLOYMENT),
        base,
    )?);

    if deployment != DEFAULT_DEPLOYMENT {
        let section = sections.remove(deployment).ok_or_else(|| {
            Error::config(
                source_name,
                format!("deployment '{}' not found", deployment),
            )
        })?;
        layers.push(ConfigLayer::new(
            LayerOrigin::Deployment,
            format!("{} [{}]", source_name, deployment),
            section,
        )?);
    }

    Ok(layers)
}

/// Layers of an application template's config document. The `default`
/// section always comes first; a deployment section is optional here.
pub fn parse_app_template_document(
    source_name: &str,
    content: &str,
    deployment: &str,
) -> Result<Vec<ConfigLayer>> {
    let mut sections = document_sections(source_name, content)?;

    let mut layers = vec![ConfigLayer::new(
        LayerOrigin::AppTemplate,
        format!("{} [{}]", source_name, DEFAULT_DEPLOYMENT),
        sections.remove(DEFAULT_DEPLOYMENT).unwrap_or(Value::Null),
    )?];
    if deployment != DEFAULT_DEPLOYMENT {
        if let Some(section) = sections.remove(deployment) {
            layers.push(ConfigLayer::new(
                LayerOrigin::AppTemplate,
                format!("{} [{}]", source_name, deployment),
                section,
            )?);
        }
    }
    Ok(layers)
}

/// Read `<dir>/config.yml` of an application template; absent means no layers
pub fn load_app_template_config(dir: &Path, deployment: &str) -> Result<Vec<ConfigLayer>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        tracing::debug!(?path, "Application template has no config, skipping");
        return Ok(Vec::new());
    }
    tracing::debug!(?path, deployment, "Loading application template config");
    let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
    parse_app_template_document(&path.display().to_string(), &content, deployment)
}

/// Read the config file's base and deployment layers
pub fn load_config_file(path: &Path, deployment: &str) -> Result<Vec<ConfigLayer>> {
    tracing::debug!(?path, deployment, "Loading config file");
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_config_document(&path.display().to_string(), &content, deployment)
}

/// Read the env file layer. A missing default env file yields `None`.
pub fn load_env_file(path: &Path, required: bool) -> Result<Option<ConfigLayer>> {
    if !path.is_file() {
        if required {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "env file not found"),
            ));
        }
        tracing::debug!(?path, "No env file found, skipping");
        return Ok(None);
    }

    tracing::debug!(?path, "Loading env file");
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let name = path.display().to_string();
    let vars = parse_env_file(&name, &content)?;
    let env: Map<String, Value> = vars.into_iter().map(|(k, v)| (k, Value::String(v))).collect();

    ConfigLayer::new(LayerOrigin::EnvFile, name, json!({ "env": env })).map(Some)
}

/// Build the layer for `key.path=value` overrides.
/// Values are read as YAML, so numbers, booleans and flow collections keep their type.
pub fn cli_layer(overrides: &[String]) -> Result<ConfigLayer> {
    let mut root = Value::Object(Map::new());

    for entry in overrides {
        let (path, raw) = entry
            .split_once('=')
            .ok_or_else(|| Error::config("--set", format!("'{}' is not key=value", entry)))?;
        let path = KeyPath::parse(path).map_err(|e| Error::config("--set", e.to_string()))?;
        let value = parse_override_value(raw);
        if !set_in(&mut root, path.segments(), value) {
            return Err(Error::config(
                "--set",
                format!("cannot assign '{}': sequence indexes are not supported here", path),
            ));
        }
    }

    ConfigLayer::new(LayerOrigin::Cli, "--set", root)
}

fn parse_override_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Region, profile, role and stack flags. Applied after every other layer.
pub fn pinned_layer(opts: &DeployOptions) -> ConfigLayer {
    let mut root = Map::new();
    let pins = [
        ("stackName", &opts.stack),
        ("region", &opts.region),
        ("profile", &opts.profile),
        ("role", &opts.role),
    ];
    for (key, value) in pins {
        if let Some(value) = value {
            root.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    ConfigLayer::new(LayerOrigin::Pinned, "command line flags", Value::Object(root))
        .unwrap_or_else(|_| ConfigLayer::empty(LayerOrigin::Pinned, "command line flags"))
}

/// Load every layer for one invocation, lowest precedence first
pub fn load_layers(
    ctx: &StartupContext,
    opts: &DeployOptions,
    paths: &ProjectPaths,
) -> Result<Vec<ConfigLayer>> {
    let deployment = opts.deployment_name();

    let mut layers = vec![builtin_layer(ctx, deployment)];
    if let Some(dir) = &paths.app_template_dir {
        layers.extend(load_app_template_config(dir, deployment)?);
    }
    layers.extend(load_config_file(&paths.config_file, deployment)?);
    if let Some(env_layer) = load_env_file(&paths.env_file, paths.env_file_required)? {
        layers.push(env_layer);
    }
    layers.push(cli_layer(&opts.set)?);
    layers.push(pinned_layer(opts));

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const CONFIG: &str = r#"
default:
  stackName: x
  buckets:
    internal: b
  lambdas:
    api:
      memory: 128
staging:
  stackName: y
empty:
"#;

    #[test]
    fn test_default_deployment_only_base() {
        let layers = parse_config_document("config.yml", CONFIG, "default").unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].origin(), LayerOrigin::Base);
        assert_eq!(layers[0].values()["stackName"], "x");
    }

    #[test]
    fn test_named_deployment_adds_layer() {
        let layers = parse_config_document("config.yml", CONFIG, "staging").unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].origin(), LayerOrigin::Deployment);
        assert_eq!(layers[1].values()["stackName"], "y");
    }

    #[test]
    fn test_empty_deployment_section_allowed() {
        let layers = parse_config_document("config.yml", CONFIG, "empty").unwrap();
        assert!(layers[1].is_empty());
    }

    #[test]
    fn test_unknown_deployment_fails() {
        let err = parse_config_document("config.yml", CONFIG, "prod").unwrap_err();
        assert!(err.to_string().contains("deployment 'prod' not found"));
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            parse_config_document("c", "- a\n- b\n", "default").unwrap_err(),
            Error::ConfigFormat { .. }
        ));
        assert!(matches!(
            parse_config_document("c", "default: [1, 2]\n", "default").unwrap_err(),
            Error::ConfigFormat { .. }
        ));
        assert!(matches!(
            parse_config_document("c", "default: {a: [}\n", "default").unwrap_err(),
            Error::ConfigFormat { .. }
        ));
    }

    #[test]
    fn test_cli_layer_typed_values() {
        let layer = cli_layer(&[
            "lambdas.api.memory=512".to_string(),
            "tags=[a, b]".to_string(),
            "enabled=true".to_string(),
            "name=plain text".to_string(),
            "blank=".to_string(),
        ])
        .unwrap();
        let v = layer.values();
        assert_eq!(v["lambdas"]["api"]["memory"], 512);
        assert_eq!(v["tags"], json!(["a", "b"]));
        assert_eq!(v["enabled"], true);
        assert_eq!(v["name"], "plain text");
        assert_eq!(v["blank"], "");
    }

    #[test]
    fn test_cli_layer_rejects_bad_entries() {
        assert!(cli_layer(&["novalue".to_string()]).is_err());
        assert!(cli_layer(&["a..b=1".to_string()]).is_err());
    }

    #[test]
    fn test_pinned_layer_only_set_flags() {
        let opts = DeployOptions {
            region: Some("eu-central-1".into()),
            stack: Some("override".into()),
            ..Default::default()
        };
        let layer = pinned_layer(&opts);
        assert_eq!(layer.values()["region"], "eu-central-1");
        assert_eq!(layer.values()["stackName"], "override");
        assert!(!layer.values().contains_key("role"));
    }

    #[test]
    fn test_builtin_layer_exposes_env() {
        let mut env = BTreeMap::new();
        env.insert("CI".to_string(), "1".to_string());
        let ctx = StartupContext::new("/w", env);
        let layer = builtin_layer(&ctx, "prod");
        assert_eq!(layer.values()["env"]["CI"], "1");
        assert_eq!(layer.values()["deployment"], "prod");
    }

    #[test]
    fn test_paths_default_to_config_dir() {
        let ctx = StartupContext::new("/w", BTreeMap::new());
        let paths = ProjectPaths::from_options(&ctx, &DeployOptions::default());
        assert_eq!(paths.config_file, PathBuf::from("/w/.stackup/config.yml"));
        assert_eq!(paths.template, PathBuf::from("/w/.stackup/cloudformation.template.yml"));
        assert_eq!(paths.compiled, PathBuf::from("/w/.stackup/cloudformation.yml"));
        assert!(!paths.env_file_required);

        let opts = DeployOptions {
            env_file: Some(PathBuf::from("prod.env")),
            ..Default::default()
        };
        let paths = ProjectPaths::from_options(&ctx, &opts);
        assert_eq!(paths.env_file, PathBuf::from("/w/prod.env"));
        assert!(paths.env_file_required);
    }

    #[test]
    fn test_app_template_document_layers() {
        let doc = "default:\n  memory: 128\nprod:\n  memory: 1024\n";
        let layers = parse_app_template_document("app/config.yml", doc, "prod").unwrap();
        assert_eq!(layers.len(), 2);
        assert!(layers.iter().all(|l| l.origin() == LayerOrigin::AppTemplate));
        assert_eq!(layers[1].values()["memory"], 1024);

        // unlike the project config, a missing deployment section is fine
        let layers = parse_app_template_document("app/config.yml", doc, "staging").unwrap();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].values()["memory"], 128);
    }

    #[test]
    fn test_app_template_ranks_below_project() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("app")).unwrap();
        std::fs::write(
            root.join("app/config.yml"),
            "default:\n  stackName: from-app\n  region: ap-south-1\n  lambdas:\n    api:\n      memory: 128\n",
        )
        .unwrap();
        std::fs::write(root.join("app/cloudformation.template.yml"), "Resources: {}\n").unwrap();
        std::fs::create_dir_all(root.join(".stackup")).unwrap();
        std::fs::write(
            root.join(".stackup/config.yml"),
            "default:\n  stackName: mine\n  lambdas:\n    api:\n      source: src/api\n",
        )
        .unwrap();

        let ctx = StartupContext::new(root, BTreeMap::new());
        let opts = DeployOptions {
            app_template: Some(PathBuf::from("app")),
            ..Default::default()
        };
        let paths = ProjectPaths::from_options(&ctx, &opts);
        assert_eq!(paths.app_template_dir, Some(root.join("app")));
        assert_eq!(paths.template, root.join("app/cloudformation.template.yml"));

        let layers = load_layers(&ctx, &opts, &paths).unwrap();
        let resolved = crate::config::resolve(&layers).unwrap();
        assert_eq!(resolved.get_str("stackName"), Some("mine"));
        assert_eq!(resolved.get_str("region"), Some("ap-south-1"));
        assert_eq!(resolved.get("lambdas.api.memory"), Some(&json!(128)));
        assert_eq!(resolved.get_str("lambdas.api.source"), Some("src/api"));

        // once the project has its own template, it is used instead
        std::fs::write(root.join(".stackup/cloudformation.template.yml"), "Resources: {}\n").unwrap();
        let paths = ProjectPaths::from_options(&ctx, &opts);
        assert_eq!(paths.template, root.join(".stackup/cloudformation.template.yml"));
    }

    #[test]
    fn test_app_template_without_config_adds_no_layers() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_app_template_config(dir.path(), "default").unwrap().is_empty());
    }

    #[test]
    fn test_default_env_file_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_env_file(&dir.path().join(".env"), false).unwrap(), None);
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_env_file(&dir.path().join("prod.env"), true).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_env_file_values_land_under_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# tokens\nAPI_TOKEN=abc\nexport REGION=\"eu-west-1\"\n").unwrap();

        let layer = load_env_file(&path, false).unwrap().unwrap();
        assert_eq!(layer.origin(), LayerOrigin::EnvFile);
        assert_eq!(layer.values()["env"]["API_TOKEN"], "abc");
        assert_eq!(layer.values()["env"]["REGION"], "eu-west-1");
    }

    #[test]
    fn test_cli_overrides_beat_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join(".stackup")).unwrap();
        std::fs::write(root.join(".stackup/config.yml"), "default:\n  stackName: s\n").unwrap();
        std::fs::write(root.join(".stackup/.env"), "TOKEN=from-file\nOTHER=kept\n").unwrap();

        let mut env = BTreeMap::new();
        env.insert("TOKEN".to_string(), "from-process".to_string());
        let ctx = StartupContext::new(root, env);
        let opts = DeployOptions {
            set: vec!["env.TOKEN=from-cli".to_string()],
            ..Default::default()
        };
        let paths = ProjectPaths::from_options(&ctx, &opts);
        let resolved = crate::config::resolve(&load_layers(&ctx, &opts, &paths).unwrap()).unwrap();
        assert_eq!(resolved.get_str("env.TOKEN"), Some("from-cli"));
        assert_eq!(resolved.get_str("env.OTHER"), Some("kept"));

        // without the override the env file beats the process environment
        let plain = DeployOptions::default();
        let resolved = crate::config::resolve(&load_layers(&ctx, &plain, &paths).unwrap()).unwrap();
        assert_eq!(resolved.get_str("env.TOKEN"), Some("from-file"));
    }
}
