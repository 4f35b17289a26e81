use crate::error::Result;
use crate::schema::{parse_schema, SchemaDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the directory of the default store.
pub const DATA_DIR_ENV: &str = "BURROW_DATA_DIR";

/// File name of the default store.
pub const DEFAULT_FILE_NAME: &str = "default.burrow";

/// Options for opening a [`Database`](super::Database).
///
/// Can be built in code or loaded from YAML:
///
/// ```yaml
/// path: data/app.burrow
/// schema_path: schema.yaml
/// busy_timeout_ms: 2000
/// delete_if_migration_needed: true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub path: PathBuf,
    /// Schema file to load when no schema is set in code.
    pub schema_path: Option<PathBuf>,
    #[serde(skip)]
    pub schema: Option<SchemaDefinition>,
    pub busy_timeout_ms: u64,
    pub read_only: bool,
    /// Wipe stored objects instead of failing when the schema changed unsafely.
    pub delete_if_migration_needed: bool,
    /// Idle reader connections kept open for queries.
    pub reader_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: default_path(),
            schema_path: None,
            schema: None,
            busy_timeout_ms: 5_000,
            read_only: false,
            delete_if_migration_needed: false,
            reader_pool_size: 4,
        }
    }
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Config {
            path: path.into(),
            ..Config::default()
        }
    }

    /// Load a config file. Relative paths inside it resolve against the
    /// file's own directory.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if config.path.is_relative() {
            config.path = base.join(&config.path);
        }
        if let Some(schema_path) = &config.schema_path {
            if schema_path.is_relative() {
                config.schema_path = Some(base.join(schema_path));
            }
        }
        Ok(config)
    }

    pub fn schema(mut self, schema: SchemaDefinition) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = Some(path.into());
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn delete_if_migration_needed(mut self, delete: bool) -> Self {
        self.delete_if_migration_needed = delete;
        self
    }

    pub fn reader_pool_size(mut self, size: usize) -> Self {
        self.reader_pool_size = size;
        self
    }

    pub fn busy_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// The configured schema, loading `schema_path` if no schema was set in code.
    pub fn resolve_schema(&self) -> Result<Option<SchemaDefinition>> {
        if let Some(schema) = &self.schema {
            schema.validate()?;
            return Ok(Some(schema.clone()));
        }
        match &self.schema_path {
            Some(path) => Ok(Some(parse_schema(path)?)),
            None => Ok(None),
        }
    }
}

/// `$BURROW_DATA_DIR/default.burrow`, or `./default.burrow` when unset.
pub fn default_path() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(DEFAULT_FILE_NAME),
        _ => PathBuf::from(DEFAULT_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builder() {
        let config = Config::new("x.burrow")
            .busy_timeout(Duration::from_millis(250))
            .read_only(true)
            .delete_if_migration_needed(true);
        assert_eq!(config.path, PathBuf::from("x.burrow"));
        assert_eq!(config.busy_timeout_duration(), Duration::from_millis(250));
        assert!(config.read_only);
        assert!(config.delete_if_migration_needed);
        assert_eq!(config.reader_pool_size, 4);
    }

    #[test]
    fn test_from_yaml_file_resolves_relative_paths() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("burrow.yaml");
        std::fs::write(
            &config_path,
            "path: data/app.burrow\nschema_path: schema.yaml\nbusy_timeout_ms: 100\n",
        )
        .unwrap();

        let config = Config::from_yaml_file(&config_path).unwrap();
        assert_eq!(config.path, tmp.path().join("data/app.burrow"));
        assert_eq!(config.schema_path, Some(tmp.path().join("schema.yaml")));
        assert_eq!(config.busy_timeout_ms, 100);
        assert!(!config.read_only);
    }

    #[test]
    fn test_default_path_names_the_default_file() {
        let path = default_path();
        assert_eq!(path.file_name().unwrap(), DEFAULT_FILE_NAME);
        assert_eq!(Config::default().path, path);
    }

    #[test]
    fn test_resolve_schema_from_file() {
        let tmp = TempDir::new().unwrap();
        let schema_path = tmp.path().join("schema.yaml");
        std::fs::write(&schema_path, crate::object::testing::SCHEMA).unwrap();

        let schema = Config::new(tmp.path().join("a.burrow"))
            .schema_file(&schema_path)
            .resolve_schema()
            .unwrap()
            .unwrap();
        assert!(schema.classes.contains_key("Dog"));
        assert!(Config::new("a.burrow").resolve_schema().unwrap().is_none());
    }
}
