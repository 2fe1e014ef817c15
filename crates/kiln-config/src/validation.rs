//! Pluggable config validation strategies
//!
//! Separates filesystem validation (for CLI use) from schema validation (for library use).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::build::BuildOptions;
use crate::error::{ConfigError, Result};

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    fn validate(&self, config: &BuildOptions) -> Result<()>;
}

/// Schema-only validation (no filesystem checks)
///
/// # Example
///
/// ```
/// use kiln_config::{BuildOptions, SchemaValidator, ConfigValidator};
///
/// let config = BuildOptions::default().with_entry("src/main.ts");
/// SchemaValidator.validate(&config).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &BuildOptions) -> Result<()> {
        if config.entries.is_empty() {
            return Err(ConfigError::NoEntries);
        }

        for alias in &config.aliases {
            if alias.find.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: "alias `find` cannot be empty".to_string(),
                    hint: Some("Every alias needs a non-empty prefix such as \"@\"".to_string()),
                });
            }
            if alias.replacement.as_os_str().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: format!("alias `{}` has an empty replacement", alias.find),
                    hint: None,
                });
            }
        }

        for external in &config.external {
            if external.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: "external package names cannot be empty".to_string(),
                    hint: Some("Remove empty strings from the 'external' array".to_string()),
                });
            }
        }

        for plugin in &config.plugins {
            if plugin.name.trim().is_empty() {
                return Err(ConfigError::SchemaValidation {
                    message: "plugin name cannot be empty".to_string(),
                    hint: Some("Use one of: framework, component, jsx, define".to_string()),
                });
            }
        }

        let mut names = HashSet::new();
        for target in &config.targets {
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::SchemaValidation {
                    message: format!("target `{}` is declared more than once", target.name),
                    hint: Some("Give every entry in `build.targets` a unique name".to_string()),
                });
            }
            if target.manual_chunks.keys().any(|chunk| chunk.trim().is_empty()) {
                return Err(ConfigError::SchemaValidation {
                    message: format!("target `{}` has a manual chunk with an empty name", target.name),
                    hint: None,
                });
            }
        }

        Ok(())
    }
}

/// Filesystem validator (for CLI use)
///
/// Runs the schema checks, then verifies that every entry exists under `root`.
pub struct FsValidator {
    root: PathBuf,
}

impl FsValidator {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &BuildOptions) -> Result<()> {
        SchemaValidator.validate(config)?;

        for entry in &config.entries {
            let path = self.root.join(entry);
            if !path.is_file() {
                return Err(ConfigError::EntryNotFound { path });
            }
        }

        Ok(())
    }
}

/// Convenience function for schema-only validation
pub fn validate_schema(config: &BuildOptions) -> Result<()> {
    SchemaValidator.validate(config)
}

/// Convenience function for filesystem validation
pub fn validate_fs(config: &BuildOptions, root: impl AsRef<Path>) -> Result<()> {
    FsValidator::new(root).validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{PluginOptions, TargetOptions};
    use std::fs;
    use tempfile::TempDir;

    fn base() -> BuildOptions {
        BuildOptions::default().with_entry("src/main.ts")
    }

    #[test]
    fn schema_validator_rejects_empty_entries() {
        let result = SchemaValidator.validate(&BuildOptions::default());
        assert!(matches!(result.unwrap_err(), ConfigError::NoEntries));
    }

    #[test]
    fn schema_validator_accepts_valid_config() {
        assert!(SchemaValidator.validate(&base().with_alias("@", "src")).is_ok());
    }

    #[test]
    fn schema_validator_rejects_empty_alias_find() {
        let result = SchemaValidator.validate(&base().with_alias("  ", "src"));
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::SchemaValidation { .. }
        ));
    }

    #[test]
    fn schema_validator_rejects_empty_external() {
        let mut config = base();
        config.external = vec!["vue".to_string(), "   ".to_string()];
        assert!(matches!(
            SchemaValidator.validate(&config).unwrap_err(),
            ConfigError::SchemaValidation { .. }
        ));
    }

    #[test]
    fn schema_validator_rejects_unnamed_plugin() {
        let config = base().with_plugin(PluginOptions::named(""));
        assert!(SchemaValidator.validate(&config).is_err());
    }

    #[test]
    fn schema_validator_rejects_duplicate_target_names() {
        let config = base()
            .with_target(TargetOptions::new("app", "dist"))
            .with_target(TargetOptions::new("app", "public/app"));
        let err = SchemaValidator.validate(&config).unwrap_err();
        assert!(err.to_string().contains("`app`"));
    }

    #[test]
    fn schema_validator_rejects_empty_chunk_name() {
        let config =
            base().with_target(TargetOptions::new("app", "dist").with_manual_chunk("", ["vue"]));
        assert!(SchemaValidator.validate(&config).is_err());
    }

    #[test]
    fn fs_validator_checks_entries_exist() {
        let dir = TempDir::new().unwrap();
        let err = validate_fs(&base(), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EntryNotFound { .. }));

        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/main.ts"), "export {}").unwrap();
        assert!(validate_fs(&base(), dir.path()).is_ok());
    }

    #[test]
    fn validate_schema_helper_works() {
        assert!(validate_schema(&base()).is_ok());
    }
}
