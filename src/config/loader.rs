use crate::config::schema::CheckerConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` when given, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<CheckerConfig> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = CheckerConfig::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Loads `path` and every file it `extends`, merges them key by key and
    /// validates the result. Keys a file sets always win over its parent,
    /// even when the value equals the built-in default.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<CheckerConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        let mut document = Self::load_with_inheritance(path, &mut visited)?;

        if let Value::Object(map) = &mut document {
            map.remove("extends");
        }

        let config: CheckerConfig = serde_json::from_value(document)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        Ok(config)
    }

    fn load_with_inheritance(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
        let path = fs::canonicalize(path)
            .with_context(|| format!("Failed to canonicalize path: {}", path.display()))?;

        if visited.contains(&path) {
            anyhow::bail!("Circular inheritance detected involving {}", path.display());
        }
        visited.insert(path.clone());

        let document = Self::load_file(&path)?;

        let parent = document
            .get("extends")
            .and_then(Value::as_str)
            .map(str::to_owned);

        match parent {
            Some(parent_path_str) => {
                let parent_path = path
                    .parent()
                    .context("Cannot determine parent directory")?
                    .join(parent_path_str);

                let parent_document = Self::load_with_inheritance(&parent_path, visited)?;
                Ok(Self::merge_documents(parent_document, document))
            }
            None => Ok(document),
        }
    }

    fn load_file(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let document: Value = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", path.display()),
        };

        if !document.is_object() {
            anyhow::bail!("Config file must contain a table/object: {}", path.display());
        }
        Ok(document)
    }

    /// Tables merge recursively; any other child value replaces the parent's.
    fn merge_documents(parent: Value, child: Value) -> Value {
        match (parent, child) {
            (Value::Object(mut parent), Value::Object(child)) => {
                for (key, child_value) in child {
                    let merged = match parent.remove(&key) {
                        Some(parent_value) => Self::merge_documents(parent_value, child_value),
                        None => child_value,
                    };
                    parent.insert(key, merged);
                }
                Value::Object(parent)
            }
            (_, child) => child,
        }
    }
}
