//! Resolved, immutable options for one run.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};

use super::Config;
use crate::error::{MigrateError, Result};

/// Command-line overrides applied on top of the file configuration.
///
/// Boolean flags can only switch a behavior on; `keep_indexes` switches
/// index suppression off.
#[derive(Debug, Clone, Default)]
pub struct OptionOverrides {
    pub dry_run: bool,
    pub drop_triggers: bool,
    pub keep_indexes: bool,
    pub skip_schema: bool,
    pub skip_migration_step: bool,
    pub show_progress: bool,
    /// Replaces the configured allowlist when non-empty.
    pub only: Vec<String>,
    /// Added to the configured denylist.
    pub except: Vec<String>,
    pub page_size: Option<usize>,
}

/// Options for one run. Built once, then passed by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOptions {
    pub source_env: String,
    pub target_env: String,
    pub drop_triggers: bool,
    pub drop_indexes: bool,
    pub skip_schema: bool,
    pub skip_migration_step: bool,
    pub dry_run: bool,
    pub table_allowlist: BTreeSet<String>,
    pub table_denylist: BTreeSet<String>,
    pub page_size: usize,
    pub show_progress: bool,
    pub zero_timestamp_placeholder: NaiveDateTime,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            source_env: String::new(),
            target_env: String::new(),
            drop_triggers: false,
            drop_indexes: true,
            skip_schema: false,
            skip_migration_step: false,
            dry_run: false,
            table_allowlist: BTreeSet::new(),
            table_denylist: BTreeSet::new(),
            page_size: 10_000,
            show_progress: false,
            zero_timestamp_placeholder: NaiveDateTime::default(),
        }
    }
}

impl MigrationOptions {
    /// Merge the file configuration with command-line overrides.
    pub fn resolve(config: &Config, overrides: &OptionOverrides) -> Result<Self> {
        let m = &config.migration;

        let table_allowlist = if overrides.only.is_empty() {
            m.include_tables.iter().cloned().collect()
        } else {
            overrides.only.iter().cloned().collect()
        };
        let table_denylist = m
            .exclude_tables
            .iter()
            .chain(overrides.except.iter())
            .cloned()
            .collect();

        let page_size = overrides.page_size.unwrap_or(m.page_size);
        if page_size == 0 {
            return Err(MigrateError::Config("page size must be at least 1".into()));
        }

        Ok(Self {
            source_env: m.source_env.clone(),
            target_env: m.target_env.clone(),
            drop_triggers: m.drop_triggers || overrides.drop_triggers,
            drop_indexes: m.drop_indexes && !overrides.keep_indexes,
            skip_schema: m.skip_schema || overrides.skip_schema,
            skip_migration_step: m.skip_migration_step || overrides.skip_migration_step,
            dry_run: m.dry_run || overrides.dry_run,
            table_allowlist,
            table_denylist,
            page_size,
            show_progress: m.show_progress || overrides.show_progress,
            zero_timestamp_placeholder: parse_placeholder(&m.zero_timestamp_placeholder)?,
        })
    }

    /// Whether a table passes the allowlist and denylist.
    pub fn includes(&self, table: &str) -> bool {
        (self.table_allowlist.is_empty() || self.table_allowlist.contains(table))
            && !self.table_denylist.contains(table)
    }

    /// Keep only the tables this run covers, preserving order.
    pub fn select<'a>(&self, tables: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        tables
            .into_iter()
            .filter(|t| self.includes(t))
            .cloned()
            .collect()
    }
}

/// Parse a placeholder timestamp: `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.
pub fn parse_placeholder(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|_| {
            MigrateError::Config(format!(
                "migration.zero_timestamp_placeholder '{}' is not a valid timestamp",
                value
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
environments:
  legacy:
    type: mysql
    host: mysql.internal
    database: app
    user: deploy
  production:
    type: postgres
    host: pg.internal
    database: app
    user: deploy
migration:
  source_env: legacy
  target_env: production
  include_tables: [users, orders]
  exclude_tables: [schema_migrations]
"#;

    #[test]
    fn test_resolve_defaults() {
        let config = Config::from_yaml(YAML).unwrap();
        let opts = MigrationOptions::resolve(&config, &OptionOverrides::default()).unwrap();
        assert_eq!(opts.page_size, 10_000);
        assert!(opts.drop_indexes);
        assert!(!opts.drop_triggers);
        assert!(!opts.dry_run);
        assert_eq!(opts.zero_timestamp_placeholder, NaiveDateTime::default());
        assert!(opts.includes("users"));
        assert!(!opts.includes("sessions"));
    }

    #[test]
    fn test_resolve_overrides() {
        let config = Config::from_yaml(YAML).unwrap();
        let overrides = OptionOverrides {
            dry_run: true,
            keep_indexes: true,
            only: vec!["sessions".into()],
            except: vec!["users".into()],
            page_size: Some(500),
            ..Default::default()
        };
        let opts = MigrationOptions::resolve(&config, &overrides).unwrap();
        assert!(opts.dry_run);
        assert!(!opts.drop_indexes);
        assert_eq!(opts.page_size, 500);
        assert!(opts.includes("sessions"));
        assert!(!opts.includes("orders"));
        assert!(opts.table_denylist.contains("schema_migrations"));
    }

    #[test]
    fn test_denylist_wins_over_allowlist() {
        let opts = MigrationOptions {
            table_allowlist: ["users".to_string()].into_iter().collect(),
            table_denylist: ["users".to_string()].into_iter().collect(),
            ..Default::default()
        };
        assert!(!opts.includes("users"));
    }

    #[test]
    fn test_select_keeps_order() {
        let opts = MigrationOptions {
            table_denylist: ["b".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let tables = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        assert_eq!(opts.select(&tables), vec!["c", "a"]);
    }

    #[test]
    fn test_parse_placeholder() {
        let ts = parse_placeholder("2000-01-01").unwrap();
        assert_eq!(ts.to_string(), "2000-01-01 00:00:00");
        assert!(parse_placeholder("0000-00-00 00:00:00").is_err());
    }

    #[test]
    fn test_zero_page_size_override() {
        let config = Config::from_yaml(YAML).unwrap();
        let overrides = OptionOverrides {
            page_size: Some(0),
            ..Default::default()
        };
        assert!(MigrationOptions::resolve(&config, &overrides).is_err());
    }
}
