//! Configuration validation.

use super::{Config, DatabaseConfig};
use crate::config::options::parse_placeholder;
use crate::drivers::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let migration = &config.migration;

    let source = environment(config, "source_env", &migration.source_env)?;
    let target = environment(config, "target_env", &migration.target_env)?;

    if !source.is_mysql() {
        return Err(MigrateError::Config(format!(
            "source environment '{}' must be of type 'mysql' or 'mariadb', got '{}'",
            migration.source_env, source.r#type
        )));
    }
    if !target.is_postgres() {
        return Err(MigrateError::Config(format!(
            "target environment '{}' must be of type 'postgres', got '{}'",
            migration.target_env, target.r#type
        )));
    }

    if source.host == target.host
        && source.port() == target.port()
        && source.database == target.database
    {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    if let Some(mode) = &target.ssl_mode {
        SslMode::parse(mode)?;
    }

    if migration.page_size == 0 {
        return Err(MigrateError::Config(
            "migration.page_size must be at least 1".into(),
        ));
    }

    parse_placeholder(&migration.zero_timestamp_placeholder)?;

    if let Some(loader) = &config.schema_loader {
        if !migration.skip_schema && loader.load_command.is_empty() {
            return Err(MigrateError::Config(
                "schema_loader.load_command is required unless migration.skip_schema is set"
                    .into(),
            ));
        }
    }

    Ok(())
}

fn environment<'a>(config: &'a Config, key: &str, name: &str) -> Result<&'a DatabaseConfig> {
    if name.is_empty() {
        return Err(MigrateError::Config(format!("migration.{} is required", key)));
    }
    let env = config.environments.get(name).ok_or_else(|| {
        MigrateError::Config(format!(
            "migration.{} refers to unknown environment '{}'",
            key, name
        ))
    })?;
    if env.host.is_empty() {
        return Err(MigrateError::Config(format!("environments.{}.host is required", name)));
    }
    if env.database.is_empty() {
        return Err(MigrateError::Config(format!(
            "environments.{}.database is required",
            name
        )));
    }
    if env.user.is_empty() {
        return Err(MigrateError::Config(format!("environments.{}.user is required", name)));
    }
    Ok(env)
}
