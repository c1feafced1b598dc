//! Field-level validation of a loaded configuration document.

use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;

/// Check every field that has constraints beyond its type.
///
/// # Errors
///
/// Returns the first [`ConfigError::InvalidField`] encountered.
pub fn validate(config: &AppConfig) -> ConfigResult<()> {
    let pipeline = &config.pipeline;
    for (field, value) in [
        ("queue_capacity", pipeline.queue_capacity),
        ("fetch_workers", pipeline.fetch_workers),
        ("hash_workers", pipeline.hash_workers),
        ("hash_chunk_workers", pipeline.hash_chunk_workers),
        ("search_workers", pipeline.search_workers),
        ("resolution_workers", pipeline.resolution_workers),
        ("rename_workers", pipeline.rename_workers),
    ] {
        ensure_positive("pipeline", field, value)?;
    }

    if config.rename.template.trim().is_empty() {
        return Err(ConfigError::invalid("rename", "template", None, "must_not_be_empty"));
    }
    if config.rename.target_root.as_os_str().is_empty() {
        return Err(ConfigError::invalid("rename", "target_root", None, "must_not_be_empty"));
    }

    for extension in &config.scan.extensions {
        if extension.is_empty() || extension.starts_with('.') || extension.contains('/') {
            return Err(ConfigError::invalid(
                "scan",
                "extensions",
                Some(extension.clone()),
                "must_be_bare_extension",
            ));
        }
    }

    if config.logging.level.trim().is_empty() {
        return Err(ConfigError::invalid("logging", "level", None, "must_not_be_empty"));
    }
    if let Some(format) = &config.logging.format
        && !matches!(format.as_str(), "json" | "pretty")
    {
        return Err(ConfigError::invalid(
            "logging",
            "format",
            Some(format.clone()),
            "unknown_format",
        ));
    }
    Ok(())
}

fn ensure_positive(section: &'static str, field: &'static str, value: usize) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(section, field, Some(value.to_string()), "must_be_positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> ConfigResult<()> {
        validate(&AppConfig::default())
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.search_workers = 0;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidField {
                section: "pipeline",
                field: "search_workers",
                reason: "must_be_positive",
                ..
            })
        ));
    }

    #[test]
    fn dotted_extensions_are_rejected() {
        let mut config = AppConfig::default();
        config.scan.extensions = vec![".mkv".into()];
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidField { field: "extensions", .. })
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let mut config = AppConfig::default();
        config.logging.format = Some("xml".into());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidField { field: "format", .. })
        ));
    }

    #[test]
    fn blank_template_is_rejected() {
        let mut config = AppConfig::default();
        config.rename.template = "  ".into();
        assert!(validate(&config).is_err());
    }
}
