//! Adapters for the external tool that owns the target schema.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::SchemaLoaderConfig;
use crate::core::traits::SchemaLoader;
use crate::error::{MigrateError, Result};

/// Environment variable naming the target environment for the commands.
pub const TARGET_ENV_VAR: &str = "TARGET_ENV";

/// Runs configured argv commands, without a shell.
#[derive(Debug, Clone)]
pub struct CommandSchemaLoader {
    load_command: Vec<String>,
    migrate_command: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandSchemaLoader {
    pub fn new(config: &SchemaLoaderConfig) -> Self {
        Self {
            load_command: config.load_command.clone(),
            migrate_command: config.migrate_command.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    async fn run(&self, what: &str, argv: &[String], target_env: &str) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            info!("No {} command configured, skipping", what);
            return Ok(());
        };

        info!("Running {} command: {}", what, argv.join(" "));
        let mut command = Command::new(program);
        command
            .args(args)
            .env(TARGET_ENV_VAR, target_env)
            .stdin(Stdio::null());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|e| MigrateError::SchemaLoad(format!("failed to start '{}': {}", program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("{} output:\n{}", what, stdout.trim_end());
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(MigrateError::SchemaLoad(format!(
                "{} command exited with {}: {}",
                what,
                output.status,
                stderr.trim()
            )))
        }
    }
}

#[async_trait]
impl SchemaLoader for CommandSchemaLoader {
    async fn load_schema(&self, target_env: &str) -> Result<()> {
        self.run("schema load", &self.load_command, target_env).await
    }

    async fn run_migrations(&self, target_env: &str) -> Result<()> {
        self.run("migration", &self.migrate_command, target_env).await
    }
}

/// Used when no schema tool is configured; the target schema must already
/// be in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSchemaLoader;

#[async_trait]
impl SchemaLoader for NoopSchemaLoader {
    async fn load_schema(&self, target_env: &str) -> Result<()> {
        info!("No schema loader configured; assuming {} schema is current", target_env);
        Ok(())
    }

    async fn run_migrations(&self, _target_env: &str) -> Result<()> {
        Ok(())
    }
}

/// The loader a configuration asks for.
pub fn from_config(config: Option<&SchemaLoaderConfig>) -> Box<dyn SchemaLoader> {
    match config {
        Some(c) => Box::new(CommandSchemaLoader::new(c)),
        None => Box::new(NoopSchemaLoader),
    }
}
