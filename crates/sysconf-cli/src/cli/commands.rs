//! CLI command definitions and execution

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use sysconf_core::backup::{BackupFilter, BackupManager, BackupOptions, BackupType, RestoreOptions};
use sysconf_core::codec::{self, ExportOptions, ExportScope, Format, SensitiveHandling};
use sysconf_core::encryption::{self, EncryptionMetadata};
use sysconf_core::profile::render_template;
use sysconf_core::{analyze, default_document, diff, ConfigError, ConfigValidator, ConfigValue, EngineSettings, Environment};
use sysconf_storage::SledStorage;
use tracing::{debug, info};

use super::output::{self, OutputFormat, ValidationOutput};
use super::ExitCode;

/// System configuration tool
///
/// Validate, compare, export, analyze, encrypt, and back up configuration
/// documents.
#[derive(Parser, Debug)]
#[command(name = "sysconf")]
#[command(about = "Validate, version, back up, and analyze system configuration", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Engine settings file (TOML)
    #[arg(long, global = true, env = "SYSCONF_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Show the changes that turn one file into another
    Diff {
        #[arg(long)]
        from: PathBuf,

        #[arg(long)]
        to: PathBuf,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Convert a configuration file to another format
    Export {
        #[arg(short, long)]
        config: PathBuf,

        /// Target format: json, yaml, toml, env, xml
        #[arg(short, long, value_parser = parse_format)]
        to: Format,

        /// What to do with sensitive fields
        #[arg(long, value_enum, default_value = "mask")]
        sensitive: SensitiveArg,

        /// Export a single top-level section
        #[arg(long, conflicts_with = "fields")]
        section: Option<String>,

        /// Export only these dotted paths (repeatable, `*` allowed)
        #[arg(long = "field")]
        fields: Vec<String>,

        /// Drop these dotted paths (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Prefix for ENV keys
        #[arg(long)]
        env_prefix: Option<String>,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score a configuration and list recommendations
    Analyze {
        #[arg(short, long)]
        config: PathBuf,

        /// Defaults to the environment in the engine settings
        #[arg(short, long, value_parser = parse_environment)]
        environment: Option<Environment>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Encrypt sensitive fields
    Encrypt {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, env = "SYSCONF_PASSWORD", hide_env_values = true)]
        password: String,

        /// Where to write the encryption metadata (JSON)
        #[arg(long)]
        metadata: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decrypt fields listed in an encryption metadata file
    Decrypt {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, env = "SYSCONF_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        metadata: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render the defaults with an environment template applied
    Template {
        #[arg(value_parser = parse_environment)]
        environment: Environment,

        #[arg(short, long, value_parser = parse_format, default_value = "json")]
        to: Format,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage backups in a store directory
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Snapshot a configuration file
    Create {
        /// Backup store directory
        #[arg(long)]
        store: PathBuf,

        #[arg(short, long)]
        config: PathBuf,

        /// Gzip the payload
        #[arg(long)]
        compress: bool,

        /// Strip sensitive fields from the snapshot
        #[arg(long)]
        omit_sensitive: bool,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long, default_value = "cli", env = "USER")]
        user: String,
    },

    /// List backups, newest first
    List {
        #[arg(long)]
        store: PathBuf,

        #[arg(long = "type", value_parser = parse_backup_type)]
        backup_type: Option<BackupType>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Write a backup's configuration out, after checking its checksum
    Restore {
        #[arg(long)]
        store: PathBuf,

        id: String,

        /// Current configuration; diffed against and snapshotted first
        #[arg(long)]
        current: Option<PathBuf>,

        /// Skip the pre-restore snapshot
        #[arg(long)]
        no_pre_restore: bool,

        #[arg(short, long, value_parser = parse_format, default_value = "json")]
        to: Format,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check a backup's checksum and payload
    Verify {
        #[arg(long)]
        store: PathBuf,

        id: String,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum SensitiveArg {
    Include,
    Omit,
    Mask,
}

impl From<SensitiveArg> for SensitiveHandling {
    fn from(arg: SensitiveArg) -> Self {
        match arg {
            SensitiveArg::Include => SensitiveHandling::Include,
            SensitiveArg::Omit => SensitiveHandling::Omit,
            SensitiveArg::Mask => SensitiveHandling::Mask,
        }
    }
}

fn parse_format(s: &str) -> Result<Format, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

fn parse_environment(s: &str) -> Result<Environment, String> {
    s.parse().map_err(|e: ConfigError| e.to_string())
}

fn parse_backup_type(s: &str) -> Result<BackupType, String> {
    match s {
        "manual" => Ok(BackupType::Manual),
        "scheduled" => Ok(BackupType::Scheduled),
        "pre-import" => Ok(BackupType::PreImport),
        "pre-restore" => Ok(BackupType::PreRestore),
        other => Err(format!("unknown backup type: {}", other)),
    }
}

pub fn load_settings(path: Option<&Path>) -> anyhow::Result<EngineSettings> {
    match path {
        Some(path) => EngineSettings::load(path)
            .with_context(|| format!("failed to load settings from '{}'", path.display())),
        None => Ok(EngineSettings::from_env()),
    }
}

/// Read and parse a document, picking the format from the extension
pub fn load_document(path: &Path) -> anyhow::Result<ConfigValue> {
    let format = Format::from_path(path)
        .ok_or_else(|| ConfigError::UnknownFormat(path.display().to_string()))?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let doc = codec::parse(&text, format)
        .with_context(|| format!("failed to parse '{}' as {}", path.display(), format))?;
    debug!(path = %path.display(), format = %format, "Document loaded");
    Ok(doc)
}

fn write_output(output: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("failed to write '{}'", path.display()))?;
            info!(path = %path.display(), bytes = text.len(), "Output written");
        }
        None => {
            print!("{}", text);
            if !text.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

pub fn export_options(
    sensitive: SensitiveArg,
    section: Option<String>,
    fields: Vec<String>,
    exclude: Vec<String>,
    env_prefix: Option<String>,
    compact: bool,
) -> ExportOptions {
    let scope = match (section, fields.is_empty()) {
        (Some(section), _) => ExportScope::Section(section),
        (None, false) => ExportScope::Fields(fields),
        (None, true) => ExportScope::Full,
    };
    let mut options = ExportOptions::default()
        .with_scope(scope)
        .with_sensitive(sensitive.into());
    for path in exclude {
        options = options.excluding(path);
    }
    if let Some(prefix) = env_prefix {
        options = options.with_env_prefix(prefix);
    }
    if compact {
        options = options.compact();
    }
    options
}

pub fn execute_validate(config: &Path, format: OutputFormat, strict: bool) -> anyhow::Result<ExitCode> {
    let doc = load_document(config)?;
    let result = ConfigValidator::new().validate(&doc);
    ValidationOutput::from_result(&result).render(format)?;

    Ok(ExitCode::from_validation_result(
        output::has_blocking(&result, strict),
        !result.warnings.is_empty(),
    ))
}

pub fn execute_diff(from: &Path, to: &Path, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let before = load_document(from)?;
    let after = load_document(to)?;
    let changes = diff(&before, &after);
    output::render_changes(&changes, format)?;
    Ok(ExitCode::Success)
}

pub fn execute_export(
    config: &Path,
    to: Format,
    options: &ExportOptions,
    out: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let doc = load_document(config)?;
    let text = codec::serialize(&doc, to, options)?;
    write_output(out, &text)?;
    Ok(ExitCode::Success)
}

pub fn execute_analyze(config: &Path, environment: Environment, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let doc = load_document(config)?;
    let report = analyze(&doc, environment);
    output::render_report(&report, format)?;
    Ok(ExitCode::Success)
}

pub fn execute_encrypt(
    config: &Path,
    password: &str,
    metadata_path: &Path,
    out: Option<&Path>,
    settings: &EngineSettings,
) -> anyhow::Result<ExitCode> {
    let doc = load_document(config)?;
    let (encrypted, metadata) = encryption::encrypt(&doc, password, &settings.encryption)?;
    std::fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("failed to write '{}'", metadata_path.display()))?;
    write_output(out, &encrypted.to_json_pretty())?;
    eprintln!(
        "{} {} field(s) encrypted",
        "+".green(),
        metadata.encrypted_fields.len()
    );
    Ok(ExitCode::Success)
}

pub fn execute_decrypt(
    config: &Path,
    password: &str,
    metadata_path: &Path,
    out: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let doc = load_document(config)?;
    let text = std::fs::read_to_string(metadata_path)
        .with_context(|| format!("failed to read '{}'", metadata_path.display()))?;
    let metadata: EncryptionMetadata = serde_json::from_str(&text)
        .map_err(|e| ConfigError::parse_error(format!("invalid encryption metadata: {}", e)))?;
    let decrypted = encryption::decrypt(&doc, password, &metadata)?;
    write_output(out, &decrypted.to_json_pretty())?;
    Ok(ExitCode::Success)
}

pub fn execute_template(environment: Environment, to: Format, out: Option<&Path>) -> anyhow::Result<ExitCode> {
    let doc = render_template(environment)?;
    let text = codec::serialize(&doc, to, &ExportOptions::default())?;
    write_output(out, &text)?;
    Ok(ExitCode::Success)
}

fn open_store(store: &Path, settings: &EngineSettings) -> anyhow::Result<BackupManager> {
    let storage = SledStorage::open(store)
        .with_context(|| format!("failed to open backup store '{}'", store.display()))?;
    Ok(BackupManager::new(Arc::new(storage), settings.backup.clone()))
}

pub async fn execute_backup(command: BackupCommands, settings: &EngineSettings) -> anyhow::Result<ExitCode> {
    match command {
        BackupCommands::Create {
            store,
            config,
            compress,
            omit_sensitive,
            tags,
            description,
            user,
        } => {
            let doc = load_document(&config)?;
            let backups = open_store(&store, settings)?;
            let mut options = BackupOptions::new(BackupType::Manual, user).with_tags(tags);
            if compress {
                options = options.compressed();
            }
            if omit_sensitive {
                options = options.without_sensitive();
            }
            if let Some(description) = description {
                options = options.with_description(description);
            }
            let backup = backups.create_backup(&doc, &options).await?;
            println!("{} {} ({})", "+".green(), backup.id, backup.name);
            Ok(ExitCode::Success)
        }
        BackupCommands::List {
            store,
            backup_type,
            tags,
            limit,
            format,
        } => {
            let backups = open_store(&store, settings)?;
            let mut filter = BackupFilter::new();
            if let Some(backup_type) = backup_type {
                filter = filter.with_type(backup_type);
            }
            for tag in tags {
                filter = filter.with_tag(tag);
            }
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            let listed = backups.list_backups(&filter).await?;
            output::render_backups(&listed, format)?;
            Ok(ExitCode::Success)
        }
        BackupCommands::Restore {
            store,
            id,
            current,
            no_pre_restore,
            to,
            output: out,
        } => {
            let backups = open_store(&store, settings)?;
            let current_doc = match &current {
                Some(path) => load_document(path)?,
                None => default_document(),
            };
            let options = RestoreOptions {
                create_pre_restore_backup: current.is_some() && !no_pre_restore,
                restored_by: "cli".to_string(),
            };
            let outcome = backups.restore_from_backup(&id, &current_doc, &options).await?;
            let text = codec::serialize(&outcome.configuration, to, &ExportOptions::default())?;
            write_output(out.as_deref(), &text)?;
            if let Some(pre) = &outcome.pre_restore_backup_id {
                eprintln!("{} pre-restore backup {}", "+".green(), pre);
            }
            eprintln!("{} {} change(s) from current", "+".green(), outcome.changes.len());
            Ok(ExitCode::Success)
        }
        BackupCommands::Verify { store, id } => {
            let backups = open_store(&store, settings)?;
            if backups.verify_backup(&id).await? {
                println!("{} backup {} is intact", "+".green(), id);
                Ok(ExitCode::Success)
            } else {
                println!("{} backup {} failed verification", "x".red(), id);
                Ok(ExitCode::ValidationError)
            }
        }
    }
}
