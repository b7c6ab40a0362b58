//! CLI module for the `sysconf` tool
//!
//! Validation, diffing, export, analysis, and field encryption work on
//! files directly. Backup commands operate on a sled store directory.

pub mod commands;
pub mod output;

pub use commands::{BackupCommands, Cli, Commands};
pub use output::OutputFormat;

use sysconf_core::ConfigError;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// Validation failed with errors
    ValidationError = 1,
    /// Validation passed with warnings
    ValidationWarning = 2,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    pub fn from_validation_result(has_errors: bool, has_warnings: bool) -> Self {
        if has_errors {
            ExitCode::ValidationError
        } else if has_warnings {
            ExitCode::ValidationWarning
        } else {
            ExitCode::Success
        }
    }

    /// Classify a failed command
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(config_err) = err.downcast_ref::<ConfigError>() {
            return match config_err {
                ConfigError::Io(_) => ExitCode::FileError,
                ConfigError::ValidationFailed(_) => ExitCode::ValidationError,
                e if e.is_user_error() => ExitCode::InvalidInput,
                _ => ExitCode::InternalError,
            };
        }
        if err.downcast_ref::<std::io::Error>().is_some() {
            return ExitCode::FileError;
        }
        ExitCode::InternalError
    }
}

/// Run a parsed command line and return the exit code
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let settings = commands::load_settings(cli.settings.as_deref())?;

    match cli.command {
        Commands::Validate { config, format, strict } => {
            commands::execute_validate(&config, format, strict)
        }
        Commands::Diff { from, to, format } => commands::execute_diff(&from, &to, format),
        Commands::Export {
            config,
            to,
            sensitive,
            section,
            fields,
            exclude,
            env_prefix,
            compact,
            output,
        } => {
            let options = commands::export_options(sensitive, section, fields, exclude, env_prefix, compact);
            commands::execute_export(&config, to, &options, output.as_deref())
        }
        Commands::Analyze {
            config,
            environment,
            format,
        } => commands::execute_analyze(&config, environment.unwrap_or(settings.environment), format),
        Commands::Encrypt {
            config,
            password,
            metadata,
            output,
        } => commands::execute_encrypt(&config, &password, &metadata, output.as_deref(), &settings),
        Commands::Decrypt {
            config,
            password,
            metadata,
            output,
        } => commands::execute_decrypt(&config, &password, &metadata, output.as_deref()),
        Commands::Template {
            environment,
            to,
            output,
        } => commands::execute_template(environment, to, output.as_deref()),
        Commands::Backup { command } => commands::execute_backup(command, &settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_conversion() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::ValidationError), 1);
        assert_eq!(i32::from(ExitCode::InternalError), 10);
    }

    #[test]
    fn test_exit_code_from_validation_result() {
        assert_eq!(ExitCode::from_validation_result(false, false), ExitCode::Success);
        assert_eq!(ExitCode::from_validation_result(false, true), ExitCode::ValidationWarning);
        assert_eq!(ExitCode::from_validation_result(true, true), ExitCode::ValidationError);
    }

    #[test]
    fn test_exit_code_from_error() {
        let user = anyhow::Error::new(ConfigError::UnknownFormat("ini".to_string()));
        assert_eq!(ExitCode::from_error(&user), ExitCode::InvalidInput);

        let missing = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
            .context("failed to read 'app.json'");
        assert_eq!(ExitCode::from_error(&missing), ExitCode::FileError);

        let internal = anyhow::Error::new(ConfigError::Metrics("registry".to_string()));
        assert_eq!(ExitCode::from_error(&internal), ExitCode::InternalError);
    }
}
