use crate::error::{BurrowError, Result};
use crate::object::ObjectId;
use crate::schema::SchemaDefinition;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// A connection to the store file. Owns the table layout: objects, link rows,
/// the version counter and the schema history.
pub struct StoreDb {
    conn: Connection,
}

impl StoreDb {
    /// Open (or create) the store file for writing and ensure the tables exist.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            log::warn!("Store {} is not in WAL mode ({mode})", path.display());
        }
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let db = StoreDb { conn };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Open an additional connection used only for snapshot reads.
    pub fn open_reader(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        Ok(StoreDb { conn })
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL,
                schema_yaml TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                description TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS objects (
                class TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (class, id)
            );

            CREATE TABLE IF NOT EXISTS links (
                class TEXT NOT NULL,
                id TEXT NOT NULL,
                property TEXT NOT NULL,
                position INTEGER NOT NULL,
                target_class TEXT NOT NULL,
                target_id TEXT NOT NULL,
                PRIMARY KEY (class, id, property, position)
            );

            CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_class, target_id);

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO meta (key, value) VALUES ('version', 0);
            ",
        )?;
        Ok(())
    }

    // ── Schema State ─────────────────────────────────────────────────

    /// Get the most recent schema hash and YAML.
    pub fn get_last_schema(&self) -> Result<Option<(String, String)>> {
        let result = self
            .conn
            .query_row(
                "SELECT hash, schema_yaml FROM schema_history ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(result)
    }

    /// Record a new schema version.
    pub fn record_schema(&self, hash: &str, yaml: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO schema_history (hash, schema_yaml) VALUES (?1, ?2)",
            params![hash, yaml],
        )?;
        Ok(())
    }

    /// Record a migration.
    pub fn record_migration(&self, description: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO migrations (description) VALUES (?1)",
            params![description],
        )?;
        Ok(())
    }

    /// Create expression indexes for `indexed` properties and drop stale ones.
    pub fn sync_indexes(&self, schema: &SchemaDefinition) -> Result<()> {
        let mut wanted = Vec::new();
        for (class_name, class) in &schema.classes {
            for (prop_name, prop) in &class.properties {
                if prop.indexed && !prop.property_type.is_link() {
                    wanted.push((format!("idx_prop_{class_name}_{prop_name}"), class_name, prop_name));
                }
            }
        }

        let existing: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_prop_%'",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<std::result::Result<_, _>>()?
        };

        for name in &existing {
            if !wanted.iter().any(|(w, _, _)| w == name) {
                self.conn.execute_batch(&format!("DROP INDEX IF EXISTS {name}"))?;
            }
        }

        // Names are schema identifiers ([A-Za-z][A-Za-z0-9_]*), safe to inline.
        for (name, class_name, prop_name) in &wanted {
            self.conn.execute_batch(&format!(
                "CREATE INDEX IF NOT EXISTS {name} ON objects(json_extract(data_json, '$.{prop_name}')) WHERE class = '{class_name}'"
            ))?;
        }
        Ok(())
    }

    // ── Version ──────────────────────────────────────────────────────

    pub fn get_version(&self) -> Result<u64> {
        let version: i64 = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )?;
        Ok(version as u64)
    }

    /// Increment the version counter. Called once per committed write transaction.
    pub fn bump_version(&self) -> Result<u64> {
        self.conn.execute(
            "UPDATE meta SET value = value + 1 WHERE key = 'version'",
            [],
        )?;
        self.get_version()
    }

    // ── Objects ──────────────────────────────────────────────────────

    pub fn object_exists(&self, class: &str, id: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM objects WHERE class = ?1 AND id = ?2",
                params![class, id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert or update an object row. Updating keeps the row's insertion position.
    pub fn upsert_object(&self, class: &str, id: &str, data: &serde_json::Value) -> Result<()> {
        let data_json = serde_json::to_string(data)?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO objects (class, id, data_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(class, id) DO UPDATE SET
                data_json = excluded.data_json,
                updated_at = excluded.updated_at",
            params![class, id, data_json, now],
        )?;
        Ok(())
    }

    pub fn get_object(&self, class: &str, id: &str) -> Result<Option<ObjectRecord>> {
        let result = self
            .conn
            .query_row(
                "SELECT class, id, data_json, created_at, updated_at FROM objects
                 WHERE class = ?1 AND id = ?2",
                params![class, id],
                ObjectRecord::from_row,
            )
            .optional()?;
        Ok(result)
    }

    /// List all objects of a class in insertion order.
    pub fn list_objects(&self, class: &str) -> Result<Vec<ObjectRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT class, id, data_json, created_at, updated_at FROM objects
             WHERE class = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![class], ObjectRecord::from_row)?;

        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }
        Ok(objects)
    }

    /// Fetch several objects of one class by id.
    pub fn get_objects(&self, class: &str, ids: &[ObjectId]) -> Result<Vec<ObjectRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT class, id, data_json, created_at, updated_at FROM objects
             WHERE class = ? AND id IN ({placeholders})"
        );
        let mut params: Vec<&str> = Vec::with_capacity(ids.len() + 1);
        params.push(class);
        params.extend(ids.iter().map(|i| i.as_str()));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), ObjectRecord::from_row)?;
        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }
        Ok(objects)
    }

    pub fn count_objects(&self, class: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM objects WHERE class = ?1",
            params![class],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete an object row and its outgoing links.
    pub fn delete_object(&self, class: &str, id: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM objects WHERE class = ?1 AND id = ?2",
            params![class, id],
        )?;
        self.conn.execute(
            "DELETE FROM links WHERE class = ?1 AND id = ?2",
            params![class, id],
        )?;
        Ok(())
    }

    /// Remove all objects and links.
    pub fn delete_all(&self) -> Result<()> {
        self.conn.execute_batch("DELETE FROM objects; DELETE FROM links;")?;
        Ok(())
    }

    // ── Links ────────────────────────────────────────────────────────

    /// Replace the link rows of one property of one object.
    pub fn replace_links(
        &self,
        class: &str,
        id: &str,
        property: &str,
        target_class: &str,
        targets: &[ObjectId],
    ) -> Result<()> {
        self.conn.execute(
            "DELETE FROM links WHERE class = ?1 AND id = ?2 AND property = ?3",
            params![class, id, property],
        )?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO links (class, id, property, position, target_class, target_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, target) in targets.iter().enumerate() {
            stmt.execute(params![
                class,
                id,
                property,
                position as i64,
                target_class,
                target.as_str()
            ])?;
        }
        Ok(())
    }

    /// Find all link rows pointing at the given object.
    pub fn find_incoming_links(&self, target_class: &str, target_id: &str) -> Result<Vec<LinkRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT class, id, property FROM links
             WHERE target_class = ?1 AND target_id = ?2
             ORDER BY class, id, property",
        )?;
        let rows = stmt.query_map(params![target_class, target_id], |row| {
            Ok(LinkRecord {
                class: row.get(0)?,
                id: row.get(1)?,
                property: row.get(2)?,
            })
        })?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    // ── Transaction Support ──────────────────────────────────────────

    /// Begin a write transaction, taking the database write lock immediately.
    pub fn begin_write(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    /// Begin a read transaction; the snapshot is fixed by its first read.
    pub fn begin_read(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN DEFERRED")?;
        Ok(())
    }

    pub fn commit_transaction(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback_transaction(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // ── Compiled Queries ─────────────────────────────────────────────

    /// Run a compiled object query; columns must be (class, id, data_json, created_at, updated_at).
    pub fn query_objects(
        &self,
        sql: &str,
        params: &[rusqlite::types::Value],
    ) -> Result<Vec<ObjectRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| BurrowError::Query(format!("Failed to prepare query: {e}")))?;
        let rows = stmt.query_map(params_from_iter(params.iter()), ObjectRecord::from_row)?;
        let mut objects = Vec::new();
        for row in rows {
            objects.push(row?);
        }
        Ok(objects)
    }

    /// Run a compiled query returning a single value.
    pub fn query_value(
        &self,
        sql: &str,
        params: &[rusqlite::types::Value],
    ) -> Result<rusqlite::types::Value> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| BurrowError::Query(format!("Failed to prepare query: {e}")))?;
        let value = stmt.query_row(params_from_iter(params.iter()), |row| row.get(0))?;
        Ok(value)
    }
}

/// A row of the objects table
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub class: String,
    pub id: String,
    pub data_json: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ObjectRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(ObjectRecord {
            class: row.get(0)?,
            id: row.get(1)?,
            data_json: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    pub fn parse_data(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.data_json)?)
    }
}

/// An object holding at least one link in `property` to some target
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRecord {
    pub class: String,
    pub id: String,
    pub property: String,
}
