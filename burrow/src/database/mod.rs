mod config;
mod transaction;

pub use config::{default_path, Config, DATA_DIR_ENV, DEFAULT_FILE_NAME};
pub use transaction::{DeletePlan, LinkRef, ObjectRef, ReadTransaction, WriteTransaction};

use crate::error::{BurrowError, Result};
use crate::migration::{backfill, diff_schemas, unsafe_migrations, SchemaMigration};
use crate::notification::{ChangeSet, NotificationToken, ObserverRegistry};
use crate::object::{Link, List, Object, ObjectId};
use crate::query::{Query, SortDescriptor};
use crate::results::Results;
use crate::schema::{canonical_yaml, hash_schema, parse_schema_str, PropertyType, SchemaDefinition};
use crate::storage::{ObjectRecord, StoreDb};
use crate::validation::{validate_object, ValidationResult};
use crate::value::Value;
use crate::watcher::{store_file_names, FileWatcher};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::ThreadId;

/// A handle to an open store. Cheap to clone and safe to share across threads;
/// every handle for the same file in a process shares one engine.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
    /// Set on handles opened read-only over an engine that can write.
    read_only: bool,
}

/// Connection of a [`ReadTransaction`] shared with the results it created.
/// Emptied when the snapshot ends.
pub(crate) type Snapshot = Arc<Mutex<Option<StoreDb>>>;

pub(crate) struct Inner {
    path: PathBuf,
    config: Config,
    schema: SchemaDefinition,
    schema_hash: String,
    /// `None` for read-only handles. Reentrant so the thread holding a write
    /// transaction can also query through it and see its own writes.
    writer: Option<ReentrantMutex<StoreDb>>,
    write_owner: Mutex<Option<ThreadId>>,
    readers: Mutex<Vec<StoreDb>>,
    observers: Arc<ObserverRegistry>,
    seen_version: AtomicU64,
    watcher: Mutex<Option<FileWatcher>>,
}

fn registry() -> &'static Mutex<HashMap<PathBuf, Weak<Inner>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<PathBuf, Weak<Inner>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Absolute form of a store path, resolving symlinks in the directory part.
fn normalize_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let file_name = absolute
        .file_name()
        .ok_or_else(|| BurrowError::Other(format!("Invalid store path: {}", path.display())))?
        .to_os_string();
    let parent = absolute.parent().unwrap_or_else(|| Path::new("/"));
    let parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
    Ok(parent.join(file_name))
}

/// Summary of a store, as reported by `burrow status`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub path: PathBuf,
    pub version: u64,
    pub schema_hash: String,
    pub read_only: bool,
    pub classes: BTreeMap<String, u64>,
    pub observers: usize,
}

/// An object that failed validation against the current schema.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub class: String,
    pub id: ObjectId,
    pub result: ValidationResult,
}

impl Database {
    /// Open the store described by `config`. Opening a path that is already
    /// open in this process returns the existing handle.
    pub fn open(config: Config) -> Result<Self> {
        let path = normalize_path(&config.path)?;
        let schema = config.resolve_schema()?;

        let mut registry = registry().lock();
        registry.retain(|_, weak| weak.strong_count() > 0);

        if let Some(inner) = registry.get(&path).and_then(Weak::upgrade) {
            if let Some(schema) = &schema {
                if *schema != inner.schema {
                    return Err(BurrowError::SchemaMismatch(format!(
                        "{} is already open with a different schema",
                        path.display()
                    )));
                }
            }
            if inner.writer.is_none() && !config.read_only {
                return Err(BurrowError::ReadOnly(format!(
                    "{} is already open read-only",
                    path.display()
                )));
            }
            log::debug!("Reusing open store {}", path.display());
            return Ok(Database {
                inner,
                read_only: config.read_only,
            });
        }

        let read_only = config.read_only;
        let inner = Arc::new(Inner::open(path.clone(), config, schema)?);
        registry.insert(path, Arc::downgrade(&inner));
        Ok(Database { inner, read_only })
    }

    /// Open the store at [`default_path`].
    pub fn open_default(schema: SchemaDefinition) -> Result<Self> {
        Database::open(Config::default().schema(schema))
    }

    pub fn default_path() -> PathBuf {
        default_path()
    }

    /// Remove a store file and its WAL companions. Missing files are fine; a
    /// store still open in this process is not.
    pub fn delete_files(path: &Path) -> Result<()> {
        let normalized = normalize_path(path)?;
        if registry()
            .lock()
            .get(&normalized)
            .is_some_and(|weak| weak.strong_count() > 0)
        {
            return Err(BurrowError::Other(format!(
                "Cannot delete {}: the store is open",
                path.display()
            )));
        }

        let dir = normalized.parent().unwrap_or_else(|| Path::new("."));
        for name in store_file_names(&normalized) {
            match std::fs::remove_file(dir.join(&name)) {
                Ok(()) => log::debug!("Deleted {}", dir.join(&name).display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.inner.schema
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only || self.inner.writer.is_none()
    }

    /// The committed version of the store, bumped by every write transaction.
    pub fn version(&self) -> Result<u64> {
        self.with_store(None, |store| store.get_version())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// All objects of `T`, in insertion order.
    pub fn objects<T: Object>(&self) -> Result<Results<T>> {
        self.schema().class(T::CLASS_NAME)?;
        Ok(Results::new(self.clone(), None, Query::new(T::CLASS_NAME)))
    }

    /// Objects of `T` matching `predicate`, e.g. `"name contains 'x'"`.
    pub fn objects_where<T: Object>(&self, predicate: &str) -> Result<Results<T>> {
        self.objects::<T>()?.filter(predicate)
    }

    pub fn objects_where_with_args<T: Object>(
        &self,
        predicate: &str,
        args: &[Value],
    ) -> Result<Results<T>> {
        self.objects::<T>()?.filter_with_args(predicate, args)
    }

    pub fn object_for_id<T: Object>(&self, id: &ObjectId) -> Result<Option<T>> {
        self.with_store(None, |store| {
            store
                .get_object(T::CLASS_NAME, id.as_str())?
                .map(|record| decode(&record))
                .transpose()
        })
    }

    pub fn object_for_primary_key<T: Object>(&self, key: impl Into<Value>) -> Result<Option<T>> {
        let class = self.schema().class(T::CLASS_NAME)?;
        if class.primary_key.is_none() {
            return Err(BurrowError::Schema(format!(
                "Class '{}' has no primary key",
                T::CLASS_NAME
            )));
        }
        let id = match key.into() {
            Value::String(s) => ObjectId::new(s),
            Value::Int(n) => ObjectId::new(n.to_string()),
            other => {
                return Err(BurrowError::Query(format!(
                    "Primary keys are strings or ints, got {}",
                    other.type_name()
                )))
            }
        };
        self.object_for_id(&id)
    }

    /// The objects of a to-many link, in list order. Ids whose object no
    /// longer exists are skipped.
    pub fn resolve<T: Object>(&self, list: &List<T>) -> Result<Vec<T>> {
        let records = self.with_store(None, |store| store.get_objects(T::CLASS_NAME, list.ids()))?;
        let by_id: HashMap<&str, &ObjectRecord> =
            records.iter().map(|r| (r.id.as_str(), r)).collect();
        list.ids()
            .iter()
            .filter_map(|id| by_id.get(id.as_str()))
            .map(|record| decode(record))
            .collect()
    }

    pub fn resolve_link<T: Object>(&self, link: &Link<T>) -> Result<Option<T>> {
        match link.id() {
            Some(id) => self.object_for_id(id),
            None => Ok(None),
        }
    }

    /// Objects of class `O` whose link `property` points at `target`.
    pub fn linking_objects<O: Object, T: Object>(
        &self,
        target: &T,
        property: &str,
    ) -> Result<Results<O>> {
        let id = target
            .object_id()
            .ok_or_else(|| BurrowError::Unmanaged(T::CLASS_NAME.to_string()))?;
        let prop = self
            .schema()
            .class(O::CLASS_NAME)?
            .property(property)
            .ok_or_else(|| {
                BurrowError::Query(format!(
                    "Class '{}' has no property '{property}'",
                    O::CLASS_NAME
                ))
            })?;
        if !prop.property_type.is_link() || prop.target.as_deref() != Some(T::CLASS_NAME) {
            return Err(BurrowError::Query(format!(
                "'{}.{property}' is not a link to '{}'",
                O::CLASS_NAME,
                T::CLASS_NAME
            )));
        }
        let mut query = Query::new(O::CLASS_NAME);
        query.filter_linking_to(property, id);
        Ok(Results::new(self.clone(), None, query))
    }

    // ── Transactions ─────────────────────────────────────────────────

    /// Start a write transaction, waiting for any other writer to finish.
    /// Fails with [`BurrowError::NestedTransaction`] if this thread already
    /// holds one.
    pub fn begin_write(&self) -> Result<WriteTransaction<'_>> {
        let writer = match &self.inner.writer {
            Some(writer) if !self.read_only => writer,
            _ => return Err(BurrowError::ReadOnly(self.inner.path.display().to_string())),
        };
        let me = std::thread::current().id();
        if *self.inner.write_owner.lock() == Some(me) {
            return Err(BurrowError::NestedTransaction);
        }

        let guard = writer.lock();
        *self.inner.write_owner.lock() = Some(me);
        if let Err(e) = guard.begin_write() {
            *self.inner.write_owner.lock() = None;
            return Err(e);
        }
        Ok(WriteTransaction::new(self, guard))
    }

    /// Run `body` in a write transaction. Commits when it returns `Ok`; rolls
    /// back when it returns `Err` or panics.
    pub fn write<R, E, F>(&self, body: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut WriteTransaction<'_>) -> std::result::Result<R, E>,
        E: From<BurrowError>,
    {
        let mut tx = self.begin_write()?;
        match body(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    log::warn!("Rollback failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// Run `body` against one snapshot of committed data, so several queries
    /// agree with each other.
    pub fn read<R, F>(&self, body: F) -> Result<R>
    where
        F: FnOnce(&ReadTransaction) -> Result<R>,
    {
        let reader = self.inner.take_reader()?;
        reader.begin_read()?;
        let snapshot = ReadTransaction::new(self.clone(), reader)?;
        let result = body(&snapshot);
        snapshot.finish();
        result
    }

    // ── Notifications ────────────────────────────────────────────────

    /// Call `callback` after every commit. Keep the token alive for as long
    /// as the callback should run.
    pub fn observe<F>(&self, callback: F) -> NotificationToken
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        self.inner.observers.register(None, Arc::new(callback))
    }

    /// Like [`observe`](Self::observe), but only for commits touching `T`.
    pub fn observe_class<T: Object, F>(&self, callback: F) -> NotificationToken
    where
        F: Fn(&ChangeSet) + Send + Sync + 'static,
    {
        self.inner
            .observers
            .register(Some(T::CLASS_NAME.to_string()), Arc::new(callback))
    }

    /// Check for commits made by other processes and notify observers if
    /// there were any.
    pub fn refresh(&self) -> Result<bool> {
        let version = self.version()?;
        let previous = self.inner.seen_version.fetch_max(version, Ordering::SeqCst);
        if version > previous {
            log::debug!("Store changed externally: version {previous} -> {version}");
            self.inner.observers.notify(&ChangeSet::external(version));
            return Ok(true);
        }
        Ok(false)
    }

    /// Start watching the store file for changes by other processes.
    pub fn watch(&self) -> Result<()> {
        let mut watcher = self.inner.watcher.lock();
        if watcher.is_none() {
            *watcher = Some(FileWatcher::start(&self.inner.path)?);
            log::debug!("Watching {}", self.inner.path.display());
        }
        Ok(())
    }

    /// Drain watcher events; refreshes if the store file changed. Returns
    /// whether observers were notified.
    pub fn process_watcher_events(&self) -> Result<bool> {
        let events = match self.inner.watcher.lock().as_ref() {
            Some(watcher) => watcher.drain(),
            None => return Ok(false),
        };
        if events.is_empty() {
            return Ok(false);
        }
        self.refresh()
    }

    // ── Dynamic API ──────────────────────────────────────────────────

    /// Insert an object given as JSON. Returns its id.
    pub fn insert_dynamic(&self, class: &str, data: serde_json::Value) -> Result<ObjectId> {
        self.write(|tx| tx.insert_json(class, data))
    }

    /// Fetch an object as JSON, with its id under `_id`.
    pub fn get_dynamic(&self, class: &str, id: &str) -> Result<Option<serde_json::Value>> {
        self.schema().class(class)?;
        self.with_store(None, |store| {
            store.get_object(class, id)?.map(|r| to_json(&r)).transpose()
        })
    }

    /// Query objects of `class` as JSON.
    pub fn query_dynamic(
        &self,
        class: &str,
        predicate: Option<&str>,
        sort: &[SortDescriptor],
    ) -> Result<Vec<serde_json::Value>> {
        let query = self.dynamic_query(class, predicate, sort)?;
        let (sql, params) = query.select_sql(false, None, 0);
        let records = self.with_store(None, |store| store.query_objects(&sql, &params))?;
        records.iter().map(to_json).collect()
    }

    pub fn count_dynamic(&self, class: &str, predicate: Option<&str>) -> Result<u64> {
        let query = self.dynamic_query(class, predicate, &[])?;
        let (sql, params) = query.count_sql();
        let value = self.with_store(None, |store| store.query_value(&sql, &params))?;
        match value {
            rusqlite::types::Value::Integer(n) => Ok(n as u64),
            other => Err(BurrowError::Other(format!("Unexpected count result {other:?}"))),
        }
    }

    fn dynamic_query(
        &self,
        class: &str,
        predicate: Option<&str>,
        sort: &[SortDescriptor],
    ) -> Result<Query> {
        self.schema().class(class)?;
        let mut query = Query::new(class);
        if let Some(predicate) = predicate {
            query.filter(self.schema(), predicate, &[])?;
        }
        if !sort.is_empty() {
            query.sort_by(self.schema(), sort)?;
        }
        Ok(query)
    }

    pub fn delete_dynamic(&self, class: &str, id: &str) -> Result<()> {
        self.write(|tx| tx.delete_by_id(class, &ObjectId::new(id)))
    }

    /// What [`delete_dynamic`](Self::delete_dynamic) would remove, unlink or
    /// be blocked by, without changing anything.
    pub fn plan_delete(&self, class: &str, id: &str) -> Result<DeletePlan> {
        self.with_store(None, |store| {
            transaction::plan_delete(self.schema(), store, class, &ObjectId::new(id))
        })
    }

    /// Re-check every stored object against the schema.
    pub fn validate_all(&self) -> Result<Vec<ValidationIssue>> {
        let schema = self.schema();
        let mut issues = Vec::new();
        self.with_store(None, |store| {
            for (class_name, class) in &schema.classes {
                for record in store.list_objects(class_name)? {
                    let data = record.parse_data()?;
                    let result = validate_object(class_name, class, &data, false);
                    if !result.is_ok() || result.has_warnings() {
                        issues.push(ValidationIssue {
                            class: class_name.clone(),
                            id: ObjectId::new(record.id),
                            result,
                        });
                    }
                }
            }
            Ok(())
        })?;
        Ok(issues)
    }

    pub fn status(&self) -> Result<StoreStatus> {
        let schema = self.schema();
        self.with_store(None, |store| {
            let mut classes = BTreeMap::new();
            for class_name in schema.classes.keys() {
                classes.insert(class_name.clone(), store.count_objects(class_name)?);
            }
            Ok(StoreStatus {
                path: self.inner.path.clone(),
                version: store.get_version()?,
                schema_hash: self.inner.schema_hash.clone(),
                read_only: self.is_read_only(),
                classes,
                observers: self.inner.observers.len(),
            })
        })
    }

    /// Changes between the stored schema and `schema`, without applying them.
    pub fn pending_migrations(&self, schema: &SchemaDefinition) -> Result<Vec<SchemaMigration>> {
        Ok(diff_schemas(self.schema(), schema))
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Run `f` against the right connection: a live pinned snapshot if given,
    /// the writer when this thread holds the write transaction, otherwise a
    /// pooled reader.
    pub(crate) fn with_store<R>(
        &self,
        pinned: Option<&Snapshot>,
        f: impl FnOnce(&StoreDb) -> Result<R>,
    ) -> Result<R> {
        if let Some(pinned) = pinned {
            let snapshot = pinned.lock();
            if let Some(store) = snapshot.as_ref() {
                return f(store);
            }
        }
        if let Some(writer) = &self.inner.writer {
            if *self.inner.write_owner.lock() == Some(std::thread::current().id()) {
                return f(&*writer.lock());
            }
        }
        let reader = self.inner.take_reader()?;
        let result = f(&reader);
        self.inner.return_reader(reader);
        result
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.path)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

impl Inner {
    fn open(path: PathBuf, config: Config, schema: Option<SchemaDefinition>) -> Result<Self> {
        let timeout = config.busy_timeout_duration();

        let (writer, reader, schema) = if config.read_only {
            if !path.exists() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} does not exist", path.display()),
                )
                .into());
            }
            let reader = StoreDb::open_reader(&path, timeout)?;
            let schema = check_read_only_schema(&reader, schema)?;
            (None, reader, schema)
        } else {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let writer = StoreDb::open(&path, timeout)?;
            let schema = prepare_schema(&writer, schema, config.delete_if_migration_needed)?;
            let reader = StoreDb::open_reader(&path, timeout)?;
            (Some(ReentrantMutex::new(writer)), reader, schema)
        };

        let version = reader.get_version()?;
        let schema_hash = hash_schema(&schema)?;
        log::debug!(
            "Opened {} at version {version} ({} classes{})",
            path.display(),
            schema.classes.len(),
            if config.read_only { ", read-only" } else { "" }
        );

        Ok(Inner {
            path,
            config,
            schema,
            schema_hash,
            writer,
            write_owner: Mutex::new(None),
            readers: Mutex::new(vec![reader]),
            observers: Arc::new(ObserverRegistry::default()),
            seen_version: AtomicU64::new(version),
            watcher: Mutex::new(None),
        })
    }

    fn take_reader(&self) -> Result<StoreDb> {
        if let Some(reader) = self.readers.lock().pop() {
            return Ok(reader);
        }
        StoreDb::open_reader(&self.path, self.config.busy_timeout_duration())
    }

    fn return_reader(&self, reader: StoreDb) {
        let mut readers = self.readers.lock();
        if readers.len() < self.config.reader_pool_size.max(1) {
            readers.push(reader);
        }
    }

    /// Bookkeeping after a write transaction committed and released the lock.
    pub(crate) fn committed(&self, changes: ChangeSet) {
        self.seen_version
            .fetch_max(changes.version, Ordering::SeqCst);
        self.observers.notify(&changes);
    }

    pub(crate) fn release_write(&self) {
        *self.write_owner.lock() = None;
    }
}

/// Reconcile the configured schema with the one stored in the file, running
/// migrations as needed. Returns the schema the handle will use.
fn prepare_schema(
    writer: &StoreDb,
    configured: Option<SchemaDefinition>,
    delete_if_migration_needed: bool,
) -> Result<SchemaDefinition> {
    let stored = writer.get_last_schema()?;

    let (schema, stored) = match (configured, stored) {
        (None, None) => {
            return Err(BurrowError::Schema(
                "The store has no schema yet; open it with one".to_string(),
            ))
        }
        (None, Some((_, yaml))) => return parse_schema_str(&yaml),
        (Some(schema), stored) => (schema, stored),
    };
    let new_hash = hash_schema(&schema)?;

    let migrations = match &stored {
        Some((hash, _)) if *hash == new_hash => return Ok(schema),
        Some((_, yaml)) => diff_schemas(&parse_schema_str(yaml)?, &schema),
        None => Vec::new(),
    };
    let blocking: Vec<String> = unsafe_migrations(&migrations)
        .iter()
        .map(|m| m.describe())
        .collect();

    if !blocking.is_empty() && !delete_if_migration_needed {
        return Err(BurrowError::MigrationRequired(blocking));
    }

    writer.begin_write()?;
    let applied = (|| -> Result<()> {
        if blocking.is_empty() {
            let rewritten = backfill(writer, &schema, &migrations)?;
            for migration in &migrations {
                writer.record_migration(&migration.describe())?;
            }
            if !migrations.is_empty() {
                log::debug!(
                    "Applied {} schema change(s), rewrote {rewritten} object(s)",
                    migrations.len()
                );
            }
        } else {
            log::warn!(
                "Deleting all objects for incompatible schema change: {}",
                blocking.join("; ")
            );
            writer.delete_all()?;
            writer.record_migration(&format!("Deleted all objects: {}", blocking.join("; ")))?;
        }
        writer.record_schema(&new_hash, &canonical_yaml(&schema)?)?;
        writer.sync_indexes(&schema)?;
        writer.bump_version()?;
        Ok(())
    })();

    match applied {
        Ok(()) => {
            writer.commit_transaction()?;
            Ok(schema)
        }
        Err(e) => {
            if let Err(rollback) = writer.rollback_transaction() {
                log::warn!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

fn check_read_only_schema(
    reader: &StoreDb,
    configured: Option<SchemaDefinition>,
) -> Result<SchemaDefinition> {
    let stored = reader.get_last_schema()?;
    match (configured, stored) {
        (None, None) => Err(BurrowError::Schema(
            "The store has no schema yet; open it with one".to_string(),
        )),
        (None, Some((_, yaml))) => parse_schema_str(&yaml),
        (Some(_), None) => Err(BurrowError::MigrationRequired(vec![
            "The store has no schema and is opened read-only".to_string(),
        ])),
        (Some(schema), Some((hash, yaml))) => {
            if hash_schema(&schema)? == hash {
                return Ok(schema);
            }
            let migrations = diff_schemas(&parse_schema_str(&yaml)?, &schema);
            if migrations.is_empty() {
                return Ok(schema);
            }
            Err(BurrowError::MigrationRequired(
                migrations.iter().map(|m| m.describe()).collect(),
            ))
        }
    }
}

/// Build a typed object from a stored row.
pub(crate) fn decode<T: Object>(record: &ObjectRecord) -> Result<T> {
    let mut obj: T = serde_json::from_str(&record.data_json)?;
    obj.set_object_id(Some(ObjectId::new(record.id.as_str())));
    Ok(obj)
}

/// A stored row as JSON with its id under `_id`.
pub(crate) fn to_json(record: &ObjectRecord) -> Result<serde_json::Value> {
    let mut data = record.parse_data()?;
    if let Some(map) = data.as_object_mut() {
        map.insert("_id".to_string(), serde_json::Value::String(record.id.clone()));
    }
    Ok(data)
}

/// Map a SQL aggregate result back to a property value.
pub(crate) fn sql_to_value(value: rusqlite::types::Value, ty: PropertyType) -> Option<Value> {
    use rusqlite::types::Value as Sql;
    match (value, ty) {
        (Sql::Null, _) => None,
        (Sql::Integer(n), PropertyType::Date) => crate::value::millis_to_date(n).map(Value::Date),
        (Sql::Real(f), PropertyType::Date) => {
            crate::value::millis_to_date(f as i64).map(Value::Date)
        }
        (Sql::Integer(n), PropertyType::Float) => Some(Value::Float(n as f64)),
        (Sql::Integer(n), _) => Some(Value::Int(n)),
        (Sql::Real(f), PropertyType::Int) => Some(Value::Int(f as i64)),
        (Sql::Real(f), _) => Some(Value::Float(f)),
        (Sql::Text(s), _) => Some(Value::String(s)),
        (Sql::Blob(_), _) => None,
    }
}

#[cfg(test)]
mod tests;
