//! Stowage CLI - command line access to local and cloud storage.
//!
//! Paths are either local filesystem paths or `cloud://<provider>/<path>`
//! URIs, where `<provider>` is a provider type (`s3`, `azure`, `gcp`,
//! `minio`, `sftp`) or a configured provider id.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use stowage_common::ProviderKind;
use stowage_fs::Storage;
use stowage_storage::MemoryProviderRegistry;

use crate::config::CliConfig;

#[derive(Parser)]
#[command(name = "stowage")]
#[command(about = "Stowage - unified local and cloud file operations")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: <config_dir>/stowage/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a directory.
    Ls {
        /// Local path or cloud URI.
        path: String,
    },

    /// Print a file to stdout.
    Cat {
        /// Local path or cloud URI.
        path: String,
    },

    /// Upload a local file.
    Put {
        /// Local source file.
        source: PathBuf,

        /// Destination path or cloud URI.
        dest: String,
    },

    /// Copy a file between any two locations.
    Cp {
        /// Source path or cloud URI.
        source: String,

        /// Destination path or cloud URI.
        dest: String,
    },

    /// Delete a file.
    Rm {
        /// Local path or cloud URI.
        path: String,
    },

    /// Check whether a file exists.
    Exists {
        /// Local path or cloud URI.
        path: String,
    },

    /// Upload a local directory tree to a provider.
    Migrate {
        /// Local directory.
        dir: PathBuf,

        /// Provider type: s3, azure, gcp, minio or sftp.
        provider: ProviderKind,

        /// Destination path inside the provider.
        #[arg(default_value = "")]
        base: String,
    },

    /// Probe a provider by type or id.
    Test {
        /// Provider type or id.
        provider: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = CliConfig::load(cli.config.as_deref())?;
    let providers = Arc::new(MemoryProviderRegistry::with_records(config.providers));
    let storage = config
        .storage
        .build(providers)
        .context("Failed to initialize storage")?;

    match cli.command {
        Commands::Ls { path } => cmd_ls(&storage, &path).await,
        Commands::Cat { path } => cmd_cat(&storage, &path).await,
        Commands::Put { source, dest } => cmd_put(&storage, &source, &dest).await,
        Commands::Cp { source, dest } => cmd_cp(&storage, &source, &dest).await,
        Commands::Rm { path } => cmd_rm(&storage, &path).await,
        Commands::Exists { path } => cmd_exists(&storage, &path).await,
        Commands::Migrate {
            dir,
            provider,
            base,
        } => cmd_migrate(&storage, &dir, provider, &base).await,
        Commands::Test { provider } => cmd_test(&storage, &provider).await,
    }
}

/// List directory contents.
async fn cmd_ls(storage: &Storage, path: &str) -> Result<()> {
    let entries = storage
        .list_files(path)
        .await
        .with_context(|| format!("Failed to list {}", path))?;

    if entries.is_empty() {
        println!("Directory is empty.");
        return Ok(());
    }

    for entry in entries {
        let modified = entry.modified_at.format("%Y-%m-%d %H:%M");
        if entry.is_directory {
            println!("  [DIR]  {}  {}/", modified, entry.path);
        } else {
            println!("  [FILE] {}  {} ({} bytes)", modified, entry.path, entry.size);
        }
    }

    Ok(())
}

/// Print a file.
async fn cmd_cat(storage: &Storage, path: &str) -> Result<()> {
    let content = storage
        .read_file(path)
        .await
        .with_context(|| format!("Failed to read {}", path))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;

    Ok(())
}

/// Upload a local file.
async fn cmd_put(storage: &Storage, source: &Path, dest: &str) -> Result<()> {
    info!("Uploading {} to {}", source.display(), dest);

    let content = tokio::fs::read(source)
        .await
        .with_context(|| format!("Failed to read source file {}", source.display()))?;

    storage
        .write_file(dest, &content)
        .await
        .with_context(|| format!("Failed to write {}", dest))?;

    println!("Uploaded {} ({} bytes)", dest, content.len());

    Ok(())
}

/// Copy a file.
async fn cmd_cp(storage: &Storage, source: &str, dest: &str) -> Result<()> {
    storage
        .copy_file(source, dest)
        .await
        .with_context(|| format!("Failed to copy {} to {}", source, dest))?;

    println!("Copied {} -> {}", source, dest);

    Ok(())
}

/// Delete a file.
async fn cmd_rm(storage: &Storage, path: &str) -> Result<()> {
    if !storage.delete_file(path).await {
        anyhow::bail!("Failed to delete {}", path);
    }

    println!("Deleted {}", path);

    Ok(())
}

/// Check existence; exits non-zero when the file is absent.
async fn cmd_exists(storage: &Storage, path: &str) -> Result<()> {
    let exists = storage.file_exists(path).await;
    println!("{}", exists);

    if !exists {
        std::process::exit(1);
    }

    Ok(())
}

/// Migrate a directory tree.
async fn cmd_migrate(storage: &Storage, dir: &Path, provider: ProviderKind, base: &str) -> Result<()> {
    info!("Migrating {} to {}", dir.display(), provider);

    let report = storage
        .migrate_to_cloud(dir, provider, base)
        .await
        .context("Migration failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.success {
        std::process::exit(2);
    }

    Ok(())
}

/// Probe a provider.
async fn cmd_test(storage: &Storage, provider: &str) -> Result<()> {
    let health = storage
        .test_connection(provider)
        .await
        .with_context(|| format!("Connection test for '{}' failed", provider))?;

    println!("Connection OK");
    println!("  Provider: {}", health.provider);
    println!("  Latency: {} ms", health.latency_ms);
    println!("  Detail: {}", health.detail);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::parse_from(["stowage", "migrate", "./exports", "GCS", "archive/2024", "-v"]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Migrate {
                dir,
                provider,
                base,
            } => {
                assert_eq!(dir, PathBuf::from("./exports"));
                assert_eq!(provider, ProviderKind::Gcp);
                assert_eq!(base, "archive/2024");
            }
            _ => panic!("expected migrate"),
        }
    }

    #[test]
    fn test_parse_global_config() {
        let cli = Cli::parse_from(["stowage", "--config", "/etc/stowage.json", "ls", "cloud://s3/in"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/stowage.json")));
        assert!(matches!(cli.command, Commands::Ls { path } if path == "cloud://s3/in"));
    }
}
