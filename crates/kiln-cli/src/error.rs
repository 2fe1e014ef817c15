//! Error handling for the `kiln` binary.
//!
//! Commands return [`CliError`]; `main` turns it into a [`miette::Report`]
//! with [`cli_error_to_miette`] so bundler diagnostics keep their code and help.

use std::path::PathBuf;

use kiln_bundler::BuildFailure;
use miette::{MietteDiagnostic, Report};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be found, parsed or validated
    #[error("configuration error: {0}")]
    Config(#[from] kiln_config::ConfigError),

    /// A build reached `Failed`
    #[error(transparent)]
    Build(#[from] BuildFailure),

    /// Bundler error outside a build run (e.g. target resolution in `check`)
    #[error(transparent)]
    Bundler(#[from] kiln_bundler::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Custom(String),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

/// Context helpers for fallible CLI operations.
pub trait ResultExt<T> {
    /// Report a missing file as [`CliError::FileNotFound`] for `path`.
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T>;

    /// Prefix the error message.
    fn context(self, msg: impl std::fmt::Display) -> Result<T>;
}

impl<T, E: Into<CliError>> ResultExt<T> for std::result::Result<T, E> {
    fn with_path(self, path: impl AsRef<std::path::Path>) -> Result<T> {
        self.map_err(|e| match e.into() {
            CliError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                CliError::FileNotFound(path.as_ref().to_path_buf())
            }
            other => other,
        })
    }

    fn context(self, msg: impl std::fmt::Display) -> Result<T> {
        self.map_err(|e| {
            let err: CliError = e.into();
            CliError::Custom(format!("{}: {}", msg, err))
        })
    }
}

/// Convert a CLI error into a miette report.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Build(failure) => Report::new(failure),
        CliError::Bundler(err) => Report::new(err),
        CliError::Config(err) => {
            let mut diagnostic =
                MietteDiagnostic::new(format!("configuration error: {err}")).with_code("kiln::config");
            if let Some(hint) = err.hint() {
                diagnostic = diagnostic.with_help(hint);
            }
            Report::new(diagnostic)
        }
        CliError::Watch(err) => Report::new(
            MietteDiagnostic::new(format!("file watcher error: {err}"))
                .with_help("Check that the watched directories exist and are readable."),
        ),
        other => miette::miette!("{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_bundler::{BuildPhase, Error};

    #[test]
    fn build_failure_keeps_bundler_code() {
        let failure = BuildFailure {
            phase: BuildPhase::Resolving,
            error: Error::InvalidConfig("bad".into()),
        };
        let report = cli_error_to_miette(CliError::from(failure));
        assert_eq!(report.code().unwrap().to_string(), "kiln::config");
        assert_eq!(
            report.to_string(),
            "build failed during resolving: invalid configuration: bad"
        );
    }

    #[test]
    fn config_errors_carry_hints() {
        let report = cli_error_to_miette(CliError::from(kiln_config::ConfigError::NotFound));
        assert!(report.help().unwrap().to_string().contains("kiln.toml"));
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let err = result.with_path("/project/kiln.toml").unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(ref p) if p.ends_with("kiln.toml")));
    }

    #[test]
    fn context_prefixes_the_message() {
        let result: std::result::Result<(), CliError> = Err(CliError::Custom("boom".into()));
        let err = result.context("watching src").unwrap_err();
        assert_eq!(err.to_string(), "watching src: boom");
    }
}
