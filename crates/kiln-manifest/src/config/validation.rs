//! Declaration file validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Manifest;

/// Validate a manifest.
///
/// Structural graph problems (duplicates, undeclared dependencies, cycles)
/// are reported by the engine when the graph is built.
pub fn validate_manifest(manifest: &Manifest) -> Result<()> {
    debug!("validating manifest");
    validate_settings(manifest)?;
    validate_targets(manifest)?;
    debug!("manifest validation passed");
    Ok(())
}

fn validate_settings(manifest: &Manifest) -> Result<()> {
    let settings = &manifest.settings;

    if settings.jobs < 1 {
        return Err(ConfigError::InvalidValue {
            field: "settings.jobs".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if settings.shell.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "settings.shell".to_string(),
            message: "shell cannot be empty".to_string(),
        }
        .into());
    }

    if let Some(default) = &settings.default {
        if manifest.target(default).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "settings.default".to_string(),
                message: format!("'{}' is not a declared target", default),
            }
            .into());
        }
    }

    Ok(())
}

fn validate_targets(manifest: &Manifest) -> Result<()> {
    if !manifest.targets.is_empty() {
        debug!(count = manifest.targets.len(), "validating targets");
    }
    for (i, target) in manifest.targets.iter().enumerate() {
        if target.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("target[{}].name", i),
                message: "target name cannot be empty".to_string(),
            }
            .into());
        }

        if target.phony && !target.outputs.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("target[{}].outputs", i),
                message: format!("phony target '{}' cannot declare outputs", target.name),
            }
            .into());
        }

        if let Some(output) = target
            .outputs
            .iter()
            .find(|o| o.trim().is_empty() || **o == target.name)
        {
            return Err(ConfigError::InvalidValue {
                field: format!("target[{}].outputs", i),
                message: format!("'{}' is not a valid extra output of '{}'", output, target.name),
            }
            .into());
        }

        if target.command.is_some() && target.shell.is_some() {
            return Err(ConfigError::InvalidValue {
                field: format!("target[{}]", i),
                message: format!(
                    "'{}' sets both command and shell; use one",
                    target.name
                ),
            }
            .into());
        }

        if let Some(argv) = &target.command {
            if argv.first().map_or(true, |program| program.is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("target[{}].command", i),
                    message: "command must name a program".to_string(),
                }
                .into());
            }
        }

        if target.shell.as_deref().is_some_and(|line| line.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                field: format!("target[{}].shell", i),
                message: "shell command cannot be empty".to_string(),
            }
            .into());
        }
    }

    Ok(())
}
