//! Store configuration and the schema-version lifecycle.
//!
//! A [`StoreConfig`] names the database file, the schema version the
//! application expects and a few connection settings. [`StoreConfig::open`]
//! compares that version with the one stamped in the file
//! (`PRAGMA user_version`) and creates or migrates the tables accordingly.
//!
//! # Example YAML
//!
//! ```yaml
//! path: data/app.db
//! version: 3
//! foreign_keys: true
//! marshal_mode: strict
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use entity_schema_core::{EntityDef, Registry};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::convert::MarshalMode;
use crate::database::Database;
use crate::error::{Result, SqliteError};

/// Path understood as "no file, keep everything in memory".
pub const MEMORY_PATH: &str = ":memory:";

fn default_foreign_keys() -> bool {
    true
}

/// Connection settings and expected schema version.
///
/// # Examples
///
/// ```
/// use entity_schema_sqlite::{MarshalMode, StoreConfig};
///
/// let config: StoreConfig = serde_yaml::from_str("path: app.db\nversion: 2\n").unwrap();
/// assert_eq!(config.version, 2);
/// assert!(config.foreign_keys);
/// assert_eq!(config.marshal_mode, MarshalMode::Lenient);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    /// Schema version the entity declarations correspond to.
    pub version: u32,
    /// Whether `REFERENCES` clauses are enforced.
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
    #[serde(default)]
    pub marshal_mode: MarshalMode,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>, version: u32) -> Self {
        Self {
            path: path.into(),
            version,
            foreign_keys: default_foreign_keys(),
            marshal_mode: MarshalMode::default(),
        }
    }

    pub fn in_memory(version: u32) -> Self {
        Self::new(MEMORY_PATH, version)
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](SqliteError::IoError) if the file cannot be read,
    /// or [`YamlError`](SqliteError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// Opens the database and brings its schema to [`version`](Self::version).
    ///
    /// A fresh file (version 0) gets every table created, an older file is
    /// migrated additively, and a file at the configured version is left
    /// alone. The configured version is stamped afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidVersion`] for a configured version of 0,
    /// [`SqliteError::VersionDowngrade`] if the file carries a newer version
    /// than configured, or the error of the create/migrate step.
    pub fn open(&self, registry: Arc<Registry>, entities: &[Arc<EntityDef>]) -> Result<Database> {
        if self.version == 0 {
            return Err(SqliteError::InvalidVersion(self.version));
        }
        let conn = if self.is_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&self.path)?
        };
        let switch = if self.foreign_keys { "ON" } else { "OFF" };
        conn.execute_batch(&format!("PRAGMA foreign_keys = {switch};"))?;

        let found: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let expected = i64::from(self.version);
        let db = Database::with_registry(conn, registry).with_mode(self.marshal_mode);

        if found > expected {
            return Err(SqliteError::VersionDowngrade {
                found,
                expected: self.version,
            });
        }
        if found == expected {
            return Ok(db);
        }

        let report = if found == 0 {
            db.create_tables(entities)?
        } else {
            db.migrate(entities)?
        };
        db.connection()
            .execute_batch(&format!("PRAGMA user_version = {};", self.version))?;
        info!(
            from = found,
            to = self.version,
            tables = report.tables_created.len(),
            columns = report.columns_added.len(),
            "schema version updated"
        );
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
path: data/app.db
version: 3
foreign_keys: false
marshal_mode: strict
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config: StoreConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.path, PathBuf::from("data/app.db"));
        assert_eq!(config.version, 3);
        assert!(!config.foreign_keys);
        assert_eq!(config.marshal_mode, MarshalMode::Strict);
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: StoreConfig = serde_yaml::from_str("path: ':memory:'\nversion: 1\n").unwrap();
        assert!(config.is_memory());
        assert!(config.foreign_keys);
        assert_eq!(config.marshal_mode, MarshalMode::Lenient);
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.yml");

        let original: StoreConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        original.save(&path).unwrap();
        assert_eq!(StoreConfig::load(&path).unwrap(), original);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = StoreConfig::load(dir.path().join("absent.yml")).unwrap_err();
        assert!(matches!(err, SqliteError::IoError(_)));
    }

    #[test]
    fn test_open_rejects_version_zero() {
        let err = StoreConfig::in_memory(0)
            .open(Arc::new(Registry::new()), &[])
            .unwrap_err();
        assert!(matches!(err, SqliteError::InvalidVersion(0)));
    }

    #[test]
    fn test_open_in_memory_applies_pragmas() {
        let db = StoreConfig::in_memory(4)
            .open(Arc::new(Registry::new()), &[])
            .unwrap();
        let conn = db.connection();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        let foreign_keys: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 4);
        assert_eq!(foreign_keys, 1);
    }
}
