use crate::object::ObjectId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// Per-class ids touched by a commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassChanges {
    pub inserted: Vec<ObjectId>,
    pub modified: Vec<ObjectId>,
    pub deleted: Vec<ObjectId>,
}

impl ClassChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Summary of one committed write transaction, delivered to observers.
///
/// An `external` change set reports a commit made by another process: only
/// the new version is known, so it carries no per-object detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub version: u64,
    pub external: bool,
    pub classes: BTreeMap<String, ClassChanges>,
}

impl ChangeSet {
    pub(crate) fn external(version: u64) -> Self {
        ChangeSet {
            version,
            external: true,
            classes: BTreeMap::new(),
        }
    }

    pub(crate) fn record_insert(&mut self, class: &str, id: &ObjectId) {
        let entry = self.classes.entry(class.to_string()).or_default();
        if !entry.inserted.contains(id) {
            entry.inserted.push(id.clone());
        }
    }

    pub(crate) fn record_modify(&mut self, class: &str, id: &ObjectId) {
        let entry = self.classes.entry(class.to_string()).or_default();
        if !entry.inserted.contains(id) && !entry.modified.contains(id) {
            entry.modified.push(id.clone());
        }
    }

    pub(crate) fn record_delete(&mut self, class: &str, id: &ObjectId) {
        let entry = self.classes.entry(class.to_string()).or_default();
        entry.modified.retain(|m| m != id);
        // Inserted and deleted within the same transaction: never visible.
        if let Some(pos) = entry.inserted.iter().position(|i| i == id) {
            entry.inserted.remove(pos);
        } else if !entry.deleted.contains(id) {
            entry.deleted.push(id.clone());
        }
        if entry.is_empty() {
            self.classes.remove(class);
        }
    }

    /// Whether this change may affect objects of `class`.
    pub fn touches(&self, class: &str) -> bool {
        self.external || self.classes.get(class).is_some_and(|c| !c.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.external && self.classes.values().all(ClassChanges::is_empty)
    }

    pub fn for_class(&self, class: &str) -> Option<&ClassChanges> {
        self.classes.get(class)
    }
}

type Callback = Arc<dyn Fn(&ChangeSet) + Send + Sync>;

struct Observer {
    id: u64,
    class: Option<String>,
    callback: Callback,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    observers: Vec<Observer>,
}

/// Commit observers registered on one database handle.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    state: Mutex<RegistryState>,
}

impl ObserverRegistry {
    pub(crate) fn register(
        self: &Arc<Self>,
        class: Option<String>,
        callback: Callback,
    ) -> NotificationToken {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.observers.push(Observer {
            id,
            class,
            callback,
        });
        NotificationToken {
            registry: Arc::downgrade(self),
            id,
        }
    }

    fn unregister(&self, id: u64) {
        self.state.lock().observers.retain(|o| o.id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Call every interested observer. The registry lock is not held while
    /// callbacks run, so they may register or drop tokens themselves.
    pub(crate) fn notify(&self, changes: &ChangeSet) {
        let callbacks: Vec<Callback> = {
            let state = self.state.lock();
            state
                .observers
                .iter()
                .filter(|o| match &o.class {
                    Some(class) => changes.touches(class),
                    None => true,
                })
                .map(|o| Arc::clone(&o.callback))
                .collect()
        };
        log::debug!(
            "Notifying {} observer(s) of version {}",
            callbacks.len(),
            changes.version
        );
        for callback in callbacks {
            callback(changes);
        }
    }
}

/// Keeps an observer registered. Dropping the token unregisters it.
#[must_use = "the observer is removed as soon as the token is dropped"]
pub struct NotificationToken {
    registry: Weak<ObserverRegistry>,
    id: u64,
}

impl NotificationToken {
    /// Unregister now rather than at drop.
    pub fn invalidate(self) {}
}

impl Drop for NotificationToken {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for NotificationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationToken").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_change_set_bookkeeping() {
        let mut changes = ChangeSet::default();
        let a = ObjectId::new("a");
        let b = ObjectId::new("b");

        changes.record_insert("Dog", &a);
        changes.record_modify("Dog", &a);
        changes.record_modify("Dog", &b);
        assert_eq!(changes.for_class("Dog").unwrap().inserted, vec![a.clone()]);
        assert_eq!(changes.for_class("Dog").unwrap().modified, vec![b.clone()]);

        changes.record_delete("Dog", &a);
        changes.record_delete("Dog", &b);
        let dog = changes.for_class("Dog").unwrap();
        assert!(dog.inserted.is_empty());
        assert_eq!(dog.deleted, vec![b]);
        assert!(changes.touches("Dog"));
        assert!(!changes.touches("Person"));
    }

    #[test]
    fn test_insert_then_delete_leaves_nothing() {
        let mut changes = ChangeSet::default();
        let a = ObjectId::new("a");
        changes.record_insert("Dog", &a);
        changes.record_delete("Dog", &a);
        assert!(changes.is_empty());
        assert!(ChangeSet::external(3).touches("Dog"));
    }

    #[test]
    fn test_token_drop_unregisters() {
        let registry = Arc::new(ObserverRegistry::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let token = registry.register(
            Some("Dog".into()),
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let mut changes = ChangeSet::default();
        changes.record_insert("Person", &ObjectId::new("p"));
        registry.notify(&changes);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        changes.record_insert("Dog", &ObjectId::new("d"));
        registry.notify(&changes);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(token);
        assert_eq!(registry.len(), 0);
        registry.notify(&changes);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
