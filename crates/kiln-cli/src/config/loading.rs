//! Layered configuration loading.
//!
//! Priority, lowest first:
//! 1. built-in defaults
//! 2. the config file (`kiln.toml`, or the `kiln` field of `package.json`),
//!    with the requested profile folded in
//! 3. `KILN_*` environment variables, `__` separating nested keys
//!    (`KILN_BUILD__SOURCEMAP=true`, `KILN_SETTINGS__PARALLEL_JOBS=4`)
//! 4. command-line flags

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use kiln_config::discovery::read_config_value;
use kiln_config::{ConfigDiscovery, ConfigError, KilnConfig, validate_schema};
use serde_json::{Map, Value, json};

use super::{Project, resolve_path};
use crate::cli::ProjectArgs;
use crate::error::{CliError, Result};

const ENV_PREFIX: &str = "KILN_";

/// Flags that override configuration values. Unset flags leave the
/// configuration alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub sourcemap: bool,
    pub force: bool,
    pub jobs: Option<usize>,
    pub debounce_ms: Option<u64>,
}

impl CliOverrides {
    fn to_value(&self) -> Value {
        let mut root = Map::new();
        let mut build = Map::new();
        if self.sourcemap {
            build.insert("sourcemap".into(), json!(true));
        }
        if self.force {
            build.insert("optimize_deps".into(), json!({ "force": true }));
        }
        if !build.is_empty() {
            root.insert("build".into(), Value::Object(build));
        }
        if let Some(jobs) = self.jobs {
            root.insert("settings".into(), json!({ "parallel_jobs": jobs }));
        }
        if let Some(ms) = self.debounce_ms {
            root.insert("dev".into(), json!({ "debounce_ms": ms }));
        }
        Value::Object(root)
    }
}

/// Find, layer and validate the project configuration.
pub fn load_project(args: &ProjectArgs, overrides: &CliOverrides) -> Result<Project> {
    let cwd = std::env::current_dir()?;
    let search_root = args
        .root
        .as_deref()
        .map(|root| resolve_path(root, &cwd))
        .unwrap_or_else(|| cwd.clone());

    let config_path = match &args.config {
        Some(path) => {
            let path = resolve_path(path, &cwd);
            if !path.is_file() {
                return Err(CliError::FileNotFound(path));
            }
            path
        }
        None => ConfigDiscovery::new(&search_root)
            .find()
            .ok_or(ConfigError::NotFound)?,
    };
    let base_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| search_root.clone());

    let file_config = file_layer(&config_path)?
        .extract::<KilnConfig>()
        .map_err(invalid)?
        .materialize_profile(args.profile.as_deref())?;

    let config: KilnConfig = Figment::from(Serialized::defaults(file_config))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .merge(Serialized::defaults(overrides.to_value()))
        .extract()
        .map_err(invalid)?;

    validate_schema(&config.build)?;

    let project_root = resolve_path(&config.build.root, &base_dir);
    let site = config.load_site_config(&project_root)?;
    tracing::debug!(
        config = %config_path.display(),
        profile = ?args.profile,
        site = site.is_some(),
        "configuration loaded"
    );

    Ok(Project {
        config,
        base_dir,
        config_path,
        site,
    })
}

fn file_layer(path: &Path) -> Result<Figment> {
    let defaults = Figment::from(Serialized::defaults(KilnConfig::default()));
    let is_package_json = path.file_name().is_some_and(|n| n == "package.json");
    Ok(if is_package_json {
        defaults.merge(Serialized::defaults(read_config_value(path)?))
    } else {
        defaults.merge(Toml::file(path))
    })
}

fn invalid(err: figment::Error) -> CliError {
    ConfigError::InvalidValue {
        field: "configuration".to_string(),
        hint: Some(err.to_string()),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn project(toml: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kiln.toml"), toml).unwrap();
        dir
    }

    fn args(dir: &TempDir) -> ProjectArgs {
        ProjectArgs {
            root: Some(dir.path().to_path_buf()),
            ..Default::default()
        }
    }

    const BASE: &str = r#"
[build]
entries = ["src/main.ts"]
sourcemap = false

[[build.targets]]
name = "standalone"
out_dir = "dist"

[profiles.production.build]
strict_cycles = true
"#;

    #[test]
    fn loads_file_over_defaults() {
        let dir = project(BASE);
        let project = load_project(&args(&dir), &CliOverrides::default()).unwrap();
        assert_eq!(project.config.build.entries, vec![PathBuf::from("src/main.ts")]);
        assert_eq!(project.config.build.targets[0].name, "standalone");
        assert_eq!(project.base_dir, dir.path());
        assert!(project.site.is_none());
        assert!(!project.config.build.strict_cycles);
    }

    #[test]
    fn profile_and_flags_layer_on_top() {
        let dir = project(BASE);
        let mut args = args(&dir);
        args.profile = Some("production".into());
        let overrides = CliOverrides {
            sourcemap: true,
            force: true,
            jobs: Some(2),
            debounce_ms: Some(25),
        };

        let project = load_project(&args, &overrides).unwrap();
        assert!(project.config.build.strict_cycles);
        assert!(project.config.build.sourcemap);
        assert!(project.config.build.optimize_deps.force);
        assert_eq!(project.config.settings.parallel_jobs, Some(2));
        assert_eq!(project.dev().debounce_ms, 25);
        assert_eq!(project.config.build.targets.len(), 1);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let dir = project(BASE);
        let mut args = args(&dir);
        args.profile = Some("staging".into());
        let err = load_project(&args, &CliOverrides::default()).unwrap_err();
        assert!(matches!(
            err,
            CliError::Config(ConfigError::UnknownProfile(ref name)) if name == "staging"
        ));
    }

    #[test]
    fn package_json_field_is_discovered() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "app", "kiln": { "build": { "entries": ["src/main.js"] } } }"#,
        )
        .unwrap();
        let project = load_project(&args(&dir), &CliOverrides::default()).unwrap();
        assert_eq!(project.config.build.entries, vec![PathBuf::from("src/main.js")]);
        assert!(project.config_path.ends_with("package.json"));
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = load_project(&args(&dir), &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::NotFound)));
    }

    #[test]
    fn schema_violations_fail_loading() {
        let dir = project("[build]\nentries = []\n");
        let err = load_project(&args(&dir), &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigError::NoEntries)));
    }

    #[test]
    fn site_config_is_read_relative_to_the_root() {
        let dir = project(
            "site_config = \"sites/common_site_config.json\"\n[build]\nentries = [\"src/main.ts\"]\n",
        );
        fs::create_dir_all(dir.path().join("sites")).unwrap();
        fs::write(
            dir.path().join("sites/common_site_config.json"),
            r#"{ "webserver_port": 8000 }"#,
        )
        .unwrap();
        let project = load_project(&args(&dir), &CliOverrides::default()).unwrap();
        assert_eq!(project.site.unwrap().webserver_port, Some(8000));
    }
}
