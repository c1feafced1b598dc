//! Load the configuration document and apply environment overrides.
//!
//! # Design
//! - Precedence: built-in defaults, then the JSON file, then `ANISHELF_*` variables.
//! - Environment access is injected so overrides stay testable without touching
//!   process state.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;
use crate::validate::validate;

/// Prefix shared by every override variable.
pub const ENV_PREFIX: &str = "ANISHELF_";

/// Load configuration from `path` (or defaults) with overrides from the process environment.
///
/// # Errors
///
/// Returns an error when the file cannot be read or parsed, an override is malformed,
/// or the merged document fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<AppConfig> {
    load_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` to resolve override variables.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<F>(path: Option<&Path>, env: F) -> ConfigResult<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_document(path)?,
        None => AppConfig::default(),
    };
    apply_env_overrides(&mut config, env)?;
    validate(&config)?;
    Ok(config)
}

/// Apply `ANISHELF_*` overrides onto `config`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when a numeric or boolean override does not parse.
pub fn apply_env_overrides<F>(config: &mut AppConfig, env: F) -> ConfigResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| env(&format!("{ENV_PREFIX}{name}"));

    if let Some(value) = var("USERNAME") {
        config.session.username = value;
    }
    if let Some(value) = var("PASSWORD") {
        config.session.password = value;
    }
    if let Some(value) = var("REPLAY_PATH") {
        config.session.replay_path = Some(PathBuf::from(value));
    }
    if let Some(value) = var("COOLDOWN_SECS") {
        config.pipeline.cooldown_secs = value.parse().map_err(|_| {
            ConfigError::invalid("pipeline", "cooldown_secs", Some(value.clone()), "not_an_integer")
        })?;
    }
    if let Some(value) = var("TEMPLATE") {
        config.rename.template = value;
    }
    if let Some(value) = var("TARGET_ROOT") {
        config.rename.target_root = PathBuf::from(value);
    }
    if let Some(value) = var("RENAME_MODE") {
        config.rename.mode = value.parse()?;
    }
    if let Some(value) = var("DRY_RUN") {
        config.rename.dry_run = parse_bool(&value)
            .ok_or_else(|| ConfigError::invalid("rename", "dry_run", Some(value), "not_a_boolean"))?;
    }
    if let Some(value) = var("STORE_PATH") {
        config.store.path = Some(PathBuf::from(value));
    }
    if let Some(value) = var("LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Some(value) = var("LOG_FORMAT") {
        config.logging.format = Some(value);
    }
    Ok(())
}

fn read_document(path: &Path) -> ConfigResult<AppConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded configuration document");
    Ok(config)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RenameMode;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn file_values_are_overridden_by_env() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("anishelf.json");
        fs::write(
            &path,
            r#"{"session":{"username":"file-user"},"pipeline":{"cooldown_secs":60}}"#,
        )?;

        let env = env_from(&[
            ("ANISHELF_USERNAME", "env-user"),
            ("ANISHELF_RENAME_MODE", "copy"),
            ("ANISHELF_DRY_RUN", "yes"),
        ]);
        let config = load_with_env(Some(path.as_path()), env)?;
        assert_eq!(config.session.username, "env-user");
        assert_eq!(config.pipeline.cooldown_secs, 60);
        assert_eq!(config.rename.mode, RenameMode::Copy);
        assert!(config.rename.dry_run);
        Ok(())
    }

    #[test]
    fn malformed_override_is_rejected() {
        let result = load_with_env(None, env_from(&[("ANISHELF_COOLDOWN_SECS", "soon")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidField {
                field: "cooldown_secs",
                reason: "not_an_integer",
                ..
            })
        ));
    }

    #[test]
    fn missing_file_reports_io_error() {
        let result = load_with_env(Some(Path::new("/nonexistent/anishelf.json")), |_| None);
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn invalid_json_reports_parse_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.json");
        fs::write(&path, "{")?;
        assert!(matches!(
            load_with_env(Some(path.as_path()), |_| None),
            Err(ConfigError::Parse { .. })
        ));
        Ok(())
    }
}
