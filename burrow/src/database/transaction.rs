use super::{decode, Database, Snapshot};
use crate::error::{BurrowError, Result};
use crate::notification::ChangeSet;
use crate::object::{Object, ObjectId};
use crate::query::Query;
use crate::results::Results;
use crate::schema::{ClassDefinition, OnDeletePolicy, PropertyType, SchemaDefinition};
use crate::storage::StoreDb;
use crate::validation::{extract_links, validate_and_prepare};
use parking_lot::{Mutex, ReentrantMutexGuard};
use serde::Serialize;
use std::sync::Arc;

/// Exclusive write access to a store. Changes become visible to other
/// readers only on [`commit`](Self::commit); dropping the transaction
/// without committing rolls everything back.
pub struct WriteTransaction<'db> {
    db: &'db Database,
    store: ReentrantMutexGuard<'db, StoreDb>,
    changes: ChangeSet,
    finished: bool,
}

impl<'db> WriteTransaction<'db> {
    pub(super) fn new(db: &'db Database, store: ReentrantMutexGuard<'db, StoreDb>) -> Self {
        WriteTransaction {
            db,
            store,
            changes: ChangeSet::default(),
            finished: false,
        }
    }

    /// Insert a standalone object, or store the current fields of a managed
    /// one. Assigns the object's identity on insert.
    pub fn add<T: Object>(&mut self, obj: &mut T) -> Result<()> {
        self.put(obj, false)
    }

    /// Like [`add`](Self::add), but a standalone object whose primary key
    /// already exists overwrites the stored object instead of failing.
    pub fn add_or_update<T: Object>(&mut self, obj: &mut T) -> Result<()> {
        self.put(obj, true)
    }

    fn put<T: Object>(&mut self, obj: &mut T, update: bool) -> Result<()> {
        let data = serde_json::to_value(&*obj)?;
        let id = self.write_object(T::CLASS_NAME, obj.object_id().cloned(), data, update)?;
        obj.set_object_id(Some(id));
        Ok(())
    }

    /// Insert an object given as JSON. Returns its id.
    pub fn insert_json(&mut self, class: &str, data: serde_json::Value) -> Result<ObjectId> {
        self.write_object(class, None, data, false)
    }

    fn write_object(
        &mut self,
        class_name: &str,
        existing: Option<ObjectId>,
        mut data: serde_json::Value,
        update: bool,
    ) -> Result<ObjectId> {
        let schema = self.db.schema();
        let class = schema.class(class_name)?;
        validate_and_prepare(class_name, class, &mut data)?;
        self.check_link_targets(class_name, class, &data)?;

        let store: &StoreDb = &self.store;
        let (id, inserted) = match (&class.primary_key, existing) {
            (Some(pk), existing) => {
                let key = primary_key_id(class_name, pk, &data)?;
                match existing {
                    Some(current) if current != key => {
                        return Err(BurrowError::Validation(format!(
                            "Cannot change primary key of {class_name} '{current}' to '{key}'"
                        )))
                    }
                    Some(_) => {
                        require_exists(store, class_name, &key)?;
                        (key, false)
                    }
                    None => {
                        let exists = store.object_exists(class_name, key.as_str())?;
                        if exists && !update {
                            return Err(BurrowError::DuplicatePrimaryKey {
                                class: class_name.to_string(),
                                key: key.to_string(),
                            });
                        }
                        (key, !exists)
                    }
                }
            }
            (None, Some(id)) => {
                require_exists(store, class_name, &id)?;
                (id, false)
            }
            (None, None) => (ObjectId::generate(class.auto_id()), true),
        };

        store.upsert_object(class_name, id.as_str(), &data)?;
        for (property, target, ids) in extract_links(class, &data) {
            store.replace_links(class_name, id.as_str(), property, target, &ids)?;
        }

        if inserted {
            self.changes.record_insert(class_name, &id);
        } else {
            self.changes.record_modify(class_name, &id);
        }
        Ok(id)
    }

    fn check_link_targets(
        &self,
        class_name: &str,
        class: &ClassDefinition,
        data: &serde_json::Value,
    ) -> Result<()> {
        for (property, target, ids) in extract_links(class, data) {
            for id in &ids {
                if !self.store.object_exists(target, id.as_str())? {
                    return Err(BurrowError::Validation(format!(
                        "'{class_name}.{property}' links to missing {target} '{id}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Delete a managed object, applying each incoming link's delete policy.
    pub fn delete<T: Object>(&mut self, obj: &T) -> Result<()> {
        let id = obj
            .object_id()
            .ok_or_else(|| BurrowError::Unmanaged(T::CLASS_NAME.to_string()))?;
        self.delete_by_id(T::CLASS_NAME, id)
    }

    /// Delete every object of `T`. Returns how many were deleted, including
    /// objects removed by cascades.
    pub fn delete_all<T: Object>(&mut self) -> Result<usize> {
        self.db.schema().class(T::CLASS_NAME)?;
        let ids: Vec<String> = self
            .store
            .list_objects(T::CLASS_NAME)?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let mut deleted = 0;
        for id in ids {
            if self.store.object_exists(T::CLASS_NAME, &id)? {
                deleted += self.delete_object(T::CLASS_NAME, &ObjectId::new(id))?;
            }
        }
        Ok(deleted)
    }

    pub fn delete_by_id(&mut self, class_name: &str, id: &ObjectId) -> Result<()> {
        self.delete_object(class_name, id).map(|_| ())
    }

    /// The plan is worked out first so an `error` policy anywhere aborts
    /// before anything is modified. Returns the number of objects deleted.
    fn delete_object(&mut self, class_name: &str, id: &ObjectId) -> Result<usize> {
        let schema = self.db.schema();
        let store: &StoreDb = &self.store;
        let plan = plan_delete(schema, store, class_name, id)?;

        if let Some(link) = plan.blocked_by.first() {
            return Err(BurrowError::ReferentialIntegrity(format!(
                "{} '{}' still links to '{}' through '{}'",
                link.class, link.id, link.target, link.property
            )));
        }

        for link in &plan.unlinked {
            let Some(record) = store.get_object(&link.class, &link.id)? else {
                continue;
            };
            let property = schema.class(&link.class)?.property(&link.property);
            let property_type = property.map(|p| p.property_type);
            let target_class = property.and_then(|p| p.target.clone()).unwrap_or_default();

            let mut data = record.parse_data()?;
            let remaining = match (property_type, data.get_mut(&link.property)) {
                (Some(PropertyType::List), Some(serde_json::Value::Array(items))) => {
                    items.retain(|v| v.as_str() != Some(link.target.as_str()));
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(ObjectId::new)
                        .collect()
                }
                (_, Some(value)) => {
                    *value = serde_json::Value::Null;
                    Vec::new()
                }
                (_, None) => Vec::new(),
            };
            store.upsert_object(&link.class, &link.id, &data)?;
            store.replace_links(&link.class, &link.id, &link.property, &target_class, &remaining)?;
            self.changes
                .record_modify(&link.class, &ObjectId::new(link.id.as_str()));
        }

        for object in &plan.deleted {
            store.delete_object(&object.class, object.id.as_str())?;
            self.changes.record_delete(&object.class, &object.id);
        }
        log::debug!(
            "Deleted {} object(s) starting at {class_name} '{id}'",
            plan.deleted.len()
        );
        Ok(plan.deleted.len())
    }

    /// Objects of `T`, including this transaction's uncommitted writes.
    pub fn objects<T: Object>(&self) -> Result<Results<T>> {
        self.db.objects::<T>()
    }

    pub fn objects_where<T: Object>(&self, predicate: &str) -> Result<Results<T>> {
        self.db.objects_where::<T>(predicate)
    }

    pub fn object_for_id<T: Object>(&self, id: &ObjectId) -> Result<Option<T>> {
        self.store
            .get_object(T::CLASS_NAME, id.as_str())?
            .map(|record| decode(&record))
            .transpose()
    }

    /// Changes made so far.
    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    /// Make the changes durable and visible, then notify observers.
    pub fn commit(mut self) -> Result<()> {
        let version = self.store.bump_version()?;
        self.store.commit_transaction()?;
        self.finished = true;

        let mut changes = std::mem::take(&mut self.changes);
        changes.version = version;
        let db = self.db;
        drop(self);

        log::debug!("Committed version {version}");
        db.inner.committed(changes);
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.store.rollback_transaction()
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            match self.store.rollback_transaction() {
                Ok(()) => log::debug!("Write transaction rolled back"),
                Err(e) => log::warn!("Rollback failed: {e}"),
            }
        }
        self.db.inner.release_write();
    }
}

/// What deleting one object does, worked out before anything changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeletePlan {
    /// The object itself followed by everything removed through `cascade` links.
    pub deleted: Vec<ObjectRef>,
    /// Links from surviving objects that get cleared.
    pub unlinked: Vec<LinkRef>,
    /// `error`-policy links from surviving objects. Any entry aborts the delete.
    pub blocked_by: Vec<LinkRef>,
}

impl DeletePlan {
    pub fn is_blocked(&self) -> bool {
        !self.blocked_by.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRef {
    pub class: String,
    pub id: ObjectId,
}

/// `class`/`id` links to the object `target` through `property`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRef {
    pub class: String,
    pub id: String,
    pub property: String,
    pub target: ObjectId,
}

/// Follow incoming links from `class_name`/`id`, applying each link
/// property's delete policy.
pub(super) fn plan_delete(
    schema: &SchemaDefinition,
    store: &StoreDb,
    class_name: &str,
    id: &ObjectId,
) -> Result<DeletePlan> {
    schema.class(class_name)?;
    require_exists(store, class_name, id)?;

    let mut plan = DeletePlan {
        deleted: vec![ObjectRef {
            class: class_name.to_string(),
            id: id.clone(),
        }],
        ..DeletePlan::default()
    };
    let mut blocked = Vec::new();
    let mut unlinked = Vec::new();
    let mut i = 0;
    while i < plan.deleted.len() {
        let target = plan.deleted[i].clone();
        i += 1;
        for link in store.find_incoming_links(&target.class, target.id.as_str())? {
            let policy = schema
                .class(&link.class)?
                .property(&link.property)
                .ok_or_else(|| {
                    BurrowError::Schema(format!(
                        "Stored link '{}.{}' is not in the schema",
                        link.class, link.property
                    ))
                })?
                .effective_on_delete();
            let source = ObjectRef {
                class: link.class.clone(),
                id: ObjectId::new(link.id.as_str()),
            };
            let link = LinkRef {
                class: link.class,
                id: link.id,
                property: link.property,
                target: target.id.clone(),
            };
            match policy {
                OnDeletePolicy::Cascade => {
                    if !plan.deleted.contains(&source) {
                        plan.deleted.push(source);
                    }
                }
                OnDeletePolicy::Error => blocked.push(link),
                OnDeletePolicy::Nullify => unlinked.push(link),
            }
        }
    }

    let survives = |link: &LinkRef| {
        !plan
            .deleted
            .iter()
            .any(|o| o.class == link.class && o.id.as_str() == link.id)
    };
    let blocked_by: Vec<LinkRef> = blocked.into_iter().filter(|l| survives(l)).collect();
    let unlinked: Vec<LinkRef> = unlinked.into_iter().filter(|l| survives(l)).collect();
    plan.blocked_by = blocked_by;
    plan.unlinked = unlinked;
    Ok(plan)
}

fn require_exists(store: &StoreDb, class_name: &str, id: &ObjectId) -> Result<()> {
    if store.object_exists(class_name, id.as_str())? {
        Ok(())
    } else {
        Err(BurrowError::NotFound {
            class: class_name.to_string(),
            id: id.to_string(),
        })
    }
}

/// The object id for a primary key value: the string itself, or an int's
/// decimal form.
fn primary_key_id(class_name: &str, pk: &str, data: &serde_json::Value) -> Result<ObjectId> {
    match data.get(pk) {
        Some(serde_json::Value::String(s)) => Ok(ObjectId::new(s.as_str())),
        Some(serde_json::Value::Number(n)) if n.is_i64() => Ok(ObjectId::new(n.to_string())),
        _ => Err(BurrowError::Validation(format!(
            "Primary key '{class_name}.{pk}' must be a string or int"
        ))),
    }
}

/// A consistent snapshot of committed data for several reads.
pub struct ReadTransaction {
    db: Database,
    conn: Snapshot,
}

impl ReadTransaction {
    pub(super) fn new(db: Database, reader: StoreDb) -> Result<Self> {
        // The snapshot is fixed by the first read.
        let version = reader.get_version()?;
        log::debug!("Read snapshot at version {version}");
        Ok(ReadTransaction {
            db,
            conn: Arc::new(Mutex::new(Some(reader))),
        })
    }

    pub fn objects<T: Object>(&self) -> Result<Results<T>> {
        self.db.schema().class(T::CLASS_NAME)?;
        Ok(Results::new(
            self.db.clone(),
            Some(Arc::clone(&self.conn)),
            Query::new(T::CLASS_NAME),
        ))
    }

    pub fn objects_where<T: Object>(&self, predicate: &str) -> Result<Results<T>> {
        self.objects::<T>()?.filter(predicate)
    }

    pub fn object_for_id<T: Object>(&self, id: &ObjectId) -> Result<Option<T>> {
        self.db.with_store(Some(&self.conn), |store| {
            store
                .get_object(T::CLASS_NAME, id.as_str())?
                .map(|record| decode(&record))
                .transpose()
        })
    }

    pub fn version(&self) -> Result<u64> {
        self.db.with_store(Some(&self.conn), |store| store.get_version())
    }

    /// End the snapshot and hand the connection back to the pool. Results
    /// still holding it fall back to the latest committed data.
    pub(super) fn finish(self) {
        let Some(reader) = self.conn.lock().take() else {
            return;
        };
        match reader.commit_transaction() {
            Ok(()) => self.db.inner.return_reader(reader),
            Err(e) => log::warn!("Failed to end read snapshot: {e}"),
        }
    }
}
