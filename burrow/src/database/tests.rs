use super::*;
use crate::object::testing::{Dog, Person};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tempfile::TempDir;

const SCHEMA: &str = r#"
classes:
  Dog:
    properties:
      name: { type: string, default: "" }
      age: { type: int, default: 0 }
  Person:
    properties:
      name: { type: string }
      dogs: { type: list, target: Dog }
      best_friend: { type: object, target: Dog, optional: true }
  Owner:
    primary_key: email
    properties:
      email: { type: string }
      name: { type: string, default: "" }
  Kennel:
    properties:
      name: { type: string }
      dogs: { type: list, target: Dog, on_delete: error }
  Tag:
    properties:
      label: { type: string }
      dog: { type: object, target: Dog, on_delete: cascade }
"#;

macro_rules! record {
    ($name:ident, $class:literal { $($field:ident: $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        struct $name {
            #[serde(skip)]
            _id: Option<ObjectId>,
            $($field: $ty,)*
        }

        impl Object for $name {
            const CLASS_NAME: &'static str = $class;

            fn object_id(&self) -> Option<&ObjectId> {
                self._id.as_ref()
            }

            fn set_object_id(&mut self, id: Option<ObjectId>) {
                self._id = id;
            }
        }
    };
}

record!(Owner, "Owner" { email: String, name: String });
record!(Kennel, "Kennel" { name: String, dogs: List<Dog> });
record!(Tag, "Tag" { label: String, dog: Link<Dog> });

fn schema() -> SchemaDefinition {
    parse_schema_str(SCHEMA).unwrap()
}

fn open_at(path: &Path) -> Database {
    Database::open(Config::new(path).schema(schema())).unwrap()
}

fn open() -> (TempDir, Database) {
    let tmp = TempDir::new().unwrap();
    let db = open_at(&tmp.path().join("test.burrow"));
    (tmp, db)
}

fn add_dog(db: &Database, name: &str, age: i64) -> Dog {
    let mut dog = Dog::new(name, age);
    db.write(|tx| tx.add(&mut dog)).unwrap();
    dog
}

fn dog_count(db: &Database) -> usize {
    db.objects::<Dog>().unwrap().count().unwrap()
}

#[test]
fn test_add_assigns_identity_and_persists() {
    let (_tmp, db) = open();
    let mut dog = Dog::new("Rex", 9);
    assert!(!dog.is_managed());

    db.write(|tx| tx.add(&mut dog)).unwrap();
    let id = dog.object_id().cloned().unwrap();

    let results = db.objects_where::<Dog>("name contains 'x'").unwrap();
    assert!(results.count().unwrap() >= 1);
    let stored: Dog = db.object_for_id(&id).unwrap().unwrap();
    assert_eq!(stored, dog);
    assert_eq!(db.version().unwrap(), 2);
}

#[test]
fn test_re_adding_managed_object_updates_in_place() {
    let (_tmp, db) = open();
    let mut dog = add_dog(&db, "Rex", 9);
    dog.age = 10;
    db.write(|tx| tx.add(&mut dog)).unwrap();

    assert_eq!(dog_count(&db), 1);
    let stored: Dog = db.objects::<Dog>().unwrap().first().unwrap().unwrap();
    assert_eq!(stored.age, 10);
}

#[test]
fn test_open_is_idempotent_per_path() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("shared.burrow");
    let a = open_at(&path);
    let b = open_at(&path);
    assert!(Arc::ptr_eq(&a.inner, &b.inner));

    add_dog(&a, "Rex", 9);
    assert_eq!(dog_count(&b), 1);

    let mut other = schema();
    other.classes.remove("Tag");
    let err = Database::open(Config::new(&path).schema(other)).unwrap_err();
    assert!(matches!(err, BurrowError::SchemaMismatch(_)));

    // A handle opened without a schema shares the open one.
    let c = Database::open(Config::new(&path)).unwrap();
    assert!(Arc::ptr_eq(&a.inner, &c.inner));
}

#[test]
fn test_failed_body_rolls_back() {
    let (_tmp, db) = open();
    let result: std::result::Result<(), BurrowError> = db.write(|tx| {
        tx.add(&mut Dog::new("Ghost", 1))?;
        Err(BurrowError::Other("changed my mind".into()))
    });
    assert!(result.is_err());
    assert_eq!(dog_count(&db), 0);
    assert_eq!(db.version().unwrap(), 1);
}

#[test]
fn test_panicking_body_rolls_back() {
    let (_tmp, db) = open();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = db.write(|tx| -> Result<()> {
            tx.add(&mut Dog::new("Ghost", 1))?;
            panic!("boom");
        });
    }));
    assert!(outcome.is_err());
    assert_eq!(dog_count(&db), 0);

    add_dog(&db, "Rex", 9);
    assert_eq!(dog_count(&db), 1);
}

#[test]
fn test_dropped_transaction_rolls_back() {
    let (_tmp, db) = open();
    {
        let mut tx = db.begin_write().unwrap();
        tx.add(&mut Dog::new("Ghost", 1)).unwrap();
    }
    assert_eq!(dog_count(&db), 0);
}

#[test]
fn test_nested_write_is_rejected() {
    let (_tmp, db) = open();
    let inner: Result<()> = db.write(|_tx| match db.begin_write() {
        Err(BurrowError::NestedTransaction) => Ok(()),
        Err(e) => Err(e),
        Ok(_) => Err(BurrowError::Other("nested write was allowed".into())),
    });
    inner.unwrap();

    let nested: Result<()> = db.write(|_| db.write(|_| Ok(())));
    assert!(matches!(nested, Err(BurrowError::NestedTransaction)));
}

#[test]
fn test_transaction_sees_own_writes_others_do_not() {
    let (_tmp, db) = open();
    let mut tx = db.begin_write().unwrap();
    tx.add(&mut Dog::new("Rex", 9)).unwrap();
    assert_eq!(tx.objects::<Dog>().unwrap().count().unwrap(), 1);

    let other = db.clone();
    let seen = std::thread::spawn(move || dog_count(&other)).join().unwrap();
    assert_eq!(seen, 0);

    tx.commit().unwrap();
    assert_eq!(dog_count(&db), 1);
}

#[test]
fn test_background_read_sees_commit() {
    let (_tmp, db) = open();
    add_dog(&db, "Rex", 9);

    let handle = db.clone();
    let count = std::thread::spawn(move || {
        handle
            .objects_where::<Dog>("name contains 'Rex'")
            .unwrap()
            .count()
            .unwrap()
    })
    .join()
    .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_readers_never_see_partial_commits() {
    let (_tmp, db) = open();
    let writer = db.clone();
    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let finished = Arc::clone(&done);

    let writes = std::thread::spawn(move || {
        for i in 0..25 {
            writer
                .write(|tx| {
                    tx.add(&mut Dog::new(&format!("a{i}"), i))?;
                    tx.add(&mut Dog::new(&format!("b{i}"), i))
                })
                .unwrap();
        }
        finished.store(true, Ordering::SeqCst);
    });

    let all = db.objects::<Dog>().unwrap();
    while !done.load(Ordering::SeqCst) {
        assert_eq!(all.count().unwrap() % 2, 0);
    }
    writes.join().unwrap();
    assert_eq!(all.count().unwrap(), 50);
}

#[test]
fn test_read_snapshot_is_stable() {
    let (_tmp, db) = open();
    add_dog(&db, "Rex", 9);

    db.read(|snap| {
        let dogs = snap.objects::<Dog>()?;
        assert_eq!(dogs.count()?, 1);

        let writer = db.clone();
        std::thread::spawn(move || add_dog(&writer, "Fido", 3))
            .join()
            .unwrap();

        assert_eq!(dogs.count()?, 1);
        assert_eq!(snap.objects_where::<Dog>("age < 5")?.count()?, 0);
        Ok(())
    })
    .unwrap();

    assert_eq!(dog_count(&db), 2);
}

#[test]
fn test_results_kept_past_a_read_block_see_later_commits() {
    let (_tmp, db) = open();
    add_dog(&db, "Rex", 9);

    let (dogs, version) = db
        .read(|snap| Ok((snap.objects::<Dog>()?, snap.version()?)))
        .unwrap();
    assert_eq!(dogs.count().unwrap(), 1);

    add_dog(&db, "Fido", 3);
    assert_eq!(dogs.count().unwrap(), 2);
    assert_eq!(db.version().unwrap(), version + 1);
}

#[test]
fn test_delete_files() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("gone.burrow");
    Database::delete_files(&path).unwrap();

    let db = open_at(&path);
    add_dog(&db, "Rex", 9);
    assert!(Database::delete_files(&path).is_err());
    drop(db);

    Database::delete_files(&path).unwrap();
    assert!(!path.exists());
    let db = open_at(&path);
    assert_eq!(dog_count(&db), 0);
}

#[test]
fn test_primary_keys() {
    let (_tmp, db) = open();
    let mut alice = Owner {
        email: "a@x.io".into(),
        name: "Alice".into(),
        ..Default::default()
    };
    db.write(|tx| tx.add(&mut alice)).unwrap();
    assert_eq!(alice.object_id().unwrap().as_str(), "a@x.io");

    let mut dup = Owner {
        email: "a@x.io".into(),
        name: "Impostor".into(),
        ..Default::default()
    };
    let err = db.write(|tx| tx.add(&mut dup)).unwrap_err();
    assert!(matches!(err, BurrowError::DuplicatePrimaryKey { .. }));

    db.write(|tx| tx.add_or_update(&mut dup)).unwrap();
    let stored: Owner = db.object_for_primary_key("a@x.io").unwrap().unwrap();
    assert_eq!(stored.name, "Impostor");
    assert_eq!(db.objects::<Owner>().unwrap().count().unwrap(), 1);

    alice.email = "b@x.io".into();
    let err = db.write(|tx| tx.add(&mut alice)).unwrap_err();
    assert!(matches!(err, BurrowError::Validation(_)));
    assert!(db.object_for_primary_key::<Dog>("x").is_err());
}

#[test]
fn test_links_must_point_at_stored_objects() {
    let (_tmp, db) = open();
    let mut person = Person::new("Tim");
    person.dogs.push_id(ObjectId::new("nope"));
    let err = db.write(|tx| tx.add(&mut person)).unwrap_err();
    assert!(matches!(err, BurrowError::Validation(_)));

    let standalone = Dog::new("Rex", 9);
    assert!(matches!(
        Person::new("Tim").dogs.push(&standalone),
        Err(BurrowError::Unmanaged(_))
    ));
}

#[test]
fn test_resolve_keeps_list_order() {
    let (_tmp, db) = open();
    let rex = add_dog(&db, "Rex", 9);
    let fido = add_dog(&db, "Fido", 3);

    let mut tim = Person::new("Tim");
    tim.dogs.push(&fido).unwrap();
    tim.dogs.push(&rex).unwrap();
    tim.best_friend.set(&rex).unwrap();
    db.write(|tx| tx.add(&mut tim)).unwrap();

    let stored: Person = db.objects::<Person>().unwrap().first().unwrap().unwrap();
    let dogs = db.resolve(&stored.dogs).unwrap();
    assert_eq!(
        dogs.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        vec!["Fido", "Rex"]
    );
    assert_eq!(db.resolve_link(&stored.best_friend).unwrap().unwrap().name, "Rex");
}

#[test]
fn test_delete_nullifies_links_by_default() {
    let (_tmp, db) = open();
    let rex = add_dog(&db, "Rex", 9);
    let fido = add_dog(&db, "Fido", 3);
    let mut tim = Person::new("Tim");
    tim.dogs.push(&rex).unwrap();
    tim.dogs.push(&fido).unwrap();
    tim.best_friend.set(&rex).unwrap();
    db.write(|tx| tx.add(&mut tim)).unwrap();

    db.write(|tx| tx.delete(&rex)).unwrap();

    let tim: Person = db.objects::<Person>().unwrap().first().unwrap().unwrap();
    assert_eq!(tim.dogs.ids(), &[fido.object_id().cloned().unwrap()]);
    assert!(!tim.best_friend.is_set());
    assert_eq!(
        db.objects_where::<Person>("dogs.@count == 1").unwrap().count().unwrap(),
        1
    );

    // Deleting the person leaves its dogs alone.
    db.write(|tx| tx.delete(&tim)).unwrap();
    assert_eq!(dog_count(&db), 1);
}

#[test]
fn test_delete_policy_error_and_cascade() {
    let (_tmp, db) = open();
    let rex = add_dog(&db, "Rex", 9);
    let fido = add_dog(&db, "Fido", 3);

    let mut kennel = Kennel {
        name: "Home".into(),
        ..Default::default()
    };
    kennel.dogs.push(&rex).unwrap();
    let mut tag = Tag {
        label: "good boy".into(),
        dog: Link::to(&fido).unwrap(),
        ..Default::default()
    };
    db.write(|tx| {
        tx.add(&mut kennel)?;
        tx.add(&mut tag)
    })
    .unwrap();

    let err = db.write(|tx| tx.delete(&rex)).unwrap_err();
    assert!(matches!(err, BurrowError::ReferentialIntegrity(_)));
    assert_eq!(dog_count(&db), 2);

    db.write(|tx| tx.delete(&fido)).unwrap();
    assert_eq!(db.objects::<Tag>().unwrap().count().unwrap(), 0);

    let deleted = db.write(|tx| {
        tx.delete(&kennel)?;
        tx.delete_all::<Dog>()
    });
    assert_eq!(deleted.unwrap(), 1);
    assert_eq!(dog_count(&db), 0);
}

#[test]
fn test_plan_delete_follows_policies_without_writing() {
    let (_tmp, db) = open();
    let rex = add_dog(&db, "Rex", 9);
    let fido = add_dog(&db, "Fido", 3);
    let rex_id = rex.object_id().cloned().unwrap();
    let fido_id = fido.object_id().cloned().unwrap();

    let mut kennel = Kennel {
        name: "Home".into(),
        ..Default::default()
    };
    kennel.dogs.push(&rex).unwrap();
    let mut tim = Person::new("Tim");
    tim.dogs.push(&rex).unwrap();
    let mut tag = Tag {
        label: "good boy".into(),
        dog: Link::to(&fido).unwrap(),
        ..Default::default()
    };
    db.write(|tx| {
        tx.add(&mut kennel)?;
        tx.add(&mut tim)?;
        tx.add(&mut tag)
    })
    .unwrap();
    let version = db.version().unwrap();

    let plan = db.plan_delete("Dog", rex_id.as_str()).unwrap();
    assert!(plan.is_blocked());
    assert_eq!(
        plan.deleted,
        vec![ObjectRef {
            class: "Dog".into(),
            id: rex_id.clone()
        }]
    );
    assert_eq!(
        plan.blocked_by,
        vec![LinkRef {
            class: "Kennel".into(),
            id: kennel.object_id().unwrap().to_string(),
            property: "dogs".into(),
            target: rex_id.clone(),
        }]
    );
    assert_eq!(plan.unlinked.len(), 1);
    assert_eq!(plan.unlinked[0].class, "Person");

    let plan = db.plan_delete("Dog", fido_id.as_str()).unwrap();
    assert!(!plan.is_blocked());
    assert!(plan.unlinked.is_empty());
    assert_eq!(
        plan.deleted.iter().map(|o| o.class.as_str()).collect::<Vec<_>>(),
        vec!["Dog", "Tag"]
    );

    assert_eq!(db.version().unwrap(), version);
    assert_eq!(dog_count(&db), 2);
    assert!(matches!(
        db.plan_delete("Dog", "missing"),
        Err(BurrowError::NotFound { .. })
    ));
}

#[test]
fn test_delete_unmanaged_or_missing() {
    let (_tmp, db) = open();
    let err = db.write(|tx| tx.delete(&Dog::new("Rex", 9))).unwrap_err();
    assert!(matches!(err, BurrowError::Unmanaged(_)));

    let rex = add_dog(&db, "Rex", 9);
    db.write(|tx| tx.delete(&rex)).unwrap();
    let err = db.write(|tx| tx.delete(&rex)).unwrap_err();
    assert!(matches!(err, BurrowError::NotFound { .. }));
}

#[test]
fn test_observers_fire_once_per_commit() {
    let (_tmp, db) = open();
    let commits = Arc::new(AtomicUsize::new(0));
    let dog_commits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&commits);
    let token = db.observe(move |changes| {
        assert!(!changes.external);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&dog_commits);
    let _dog_token = db.observe_class::<Dog, _>(move |changes| {
        assert_eq!(changes.for_class("Dog").unwrap().inserted.len(), 1);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    add_dog(&db, "Rex", 9);
    db.write(|tx| tx.add(&mut Person::new("Tim"))).unwrap();
    assert_eq!(commits.load(Ordering::SeqCst), 2);
    assert_eq!(dog_commits.load(Ordering::SeqCst), 1);

    drop(token);
    add_dog(&db, "Fido", 3);
    assert_eq!(commits.load(Ordering::SeqCst), 2);
    assert_eq!(dog_commits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_observer_may_read_the_store() {
    let (_tmp, db) = open();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let reader = db.clone();
    let _token = db.observe(move |_| {
        counter.store(dog_count(&reader), Ordering::SeqCst);
    });
    add_dog(&db, "Rex", 9);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_refresh_detects_external_commits() {
    let (_tmp, db) = open();
    let external = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&external);
    let _token = db.observe(move |changes| {
        if changes.external {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    assert!(!db.refresh().unwrap());
    add_dog(&db, "Rex", 9);
    assert!(!db.refresh().unwrap());

    // Another process writing the same file.
    let other = StoreDb::open(db.path(), Duration::from_secs(1)).unwrap();
    other.bump_version().unwrap();

    assert!(db.refresh().unwrap());
    assert!(!db.refresh().unwrap());
    assert_eq!(external.load(Ordering::SeqCst), 1);
    assert!(!db.process_watcher_events().unwrap());
}

#[test]
fn test_safe_migration_backfills() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("migrate.burrow");
    let db = open_at(&path);
    let rex = add_dog(&db, "Rex", 9);
    drop(db);

    let v2 = parse_schema_str(&SCHEMA.replace(
        "      age: { type: int, default: 0 }\n",
        "      age: { type: int, default: 0 }\n      breed: { type: string, default: mutt }\n",
    ))
    .unwrap();

    let db = Database::open(Config::new(&path).schema(v2)).unwrap();
    let stored = db
        .get_dynamic("Dog", rex.object_id().unwrap().as_str())
        .unwrap()
        .unwrap();
    assert_eq!(stored["breed"], serde_json::json!("mutt"));
    assert_eq!(stored["name"], serde_json::json!("Rex"));
}

#[test]
fn test_unsafe_migration_is_refused_unless_wiping() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("migrate.burrow");
    let db = open_at(&path);
    add_dog(&db, "Rex", 9);
    drop(db);

    let mut v2 = schema();
    v2.classes.get_mut("Dog").unwrap().properties.remove("age");

    let err = Database::open(Config::new(&path).schema(v2.clone())).unwrap_err();
    match err {
        BurrowError::MigrationRequired(changes) => {
            assert_eq!(changes, vec!["Property 'Dog.age' removed".to_string()]);
        }
        other => panic!("expected MigrationRequired, got {other}"),
    }

    let db = Database::open(
        Config::new(&path)
            .schema(v2)
            .delete_if_migration_needed(true),
    )
    .unwrap();
    assert_eq!(db.count_dynamic("Dog", None).unwrap(), 0);
}

#[test]
fn test_open_without_schema_uses_stored_one() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("stored.burrow");
    assert!(matches!(
        Database::open(Config::new(&path)),
        Err(BurrowError::Schema(_))
    ));

    let db = open_at(&path);
    add_dog(&db, "Rex", 9);
    drop(db);

    let db = Database::open(Config::new(&path)).unwrap();
    assert_eq!(db.schema(), &schema());
    assert_eq!(dog_count(&db), 1);
}

#[test]
fn test_read_only_handle() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ro.burrow");
    assert!(Database::open(Config::new(&path).read_only(true)).is_err());

    let db = open_at(&path);
    add_dog(&db, "Rex", 9);
    drop(db);

    let db = Database::open(Config::new(&path).read_only(true)).unwrap();
    assert!(db.is_read_only());
    assert_eq!(dog_count(&db), 1);
    let err = db.write(|tx| tx.add(&mut Dog::new("Fido", 3))).unwrap_err();
    assert!(matches!(err, BurrowError::ReadOnly(_)));
}

#[test]
fn test_read_only_handle_over_a_writable_store() {
    let (_tmp, db) = open();
    add_dog(&db, "Rex", 9);

    let ro = Database::open(Config::new(db.path()).read_only(true)).unwrap();
    assert!(ro.is_read_only());
    assert!(!db.is_read_only());
    assert_eq!(dog_count(&ro), 1);

    let err = ro.write(|tx| tx.add(&mut Dog::new("Fido", 3))).unwrap_err();
    assert!(matches!(err, BurrowError::ReadOnly(_)));
    assert!(matches!(
        ro.insert_dynamic("Dog", serde_json::json!({ "name": "Fido" })),
        Err(BurrowError::ReadOnly(_))
    ));
    assert!(ro.clone().is_read_only());

    add_dog(&db, "Fido", 3);
    assert_eq!(dog_count(&ro), 2);
}

#[test]
fn test_writable_open_over_a_read_only_store_is_refused() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ro.burrow");
    drop(open_at(&path));

    let ro = Database::open(Config::new(&path).read_only(true)).unwrap();
    assert!(matches!(
        Database::open(Config::new(&path)),
        Err(BurrowError::ReadOnly(_))
    ));
    drop(ro);
    assert!(!Database::open(Config::new(&path)).unwrap().is_read_only());
}

#[test]
fn test_keyword_named_properties_are_queryable() {
    let tmp = TempDir::new().unwrap();
    let schema = parse_schema_str(
        "classes: { Flag: { properties: { all: { type: bool, default: false }, none: { type: int, default: 0 } } } }",
    )
    .unwrap();
    let db = Database::open(Config::new(tmp.path().join("flags.burrow")).schema(schema)).unwrap();
    db.insert_dynamic("Flag", serde_json::json!({ "all": true, "none": 2 }))
        .unwrap();
    db.insert_dynamic("Flag", serde_json::json!({ "all": false }))
        .unwrap();

    assert_eq!(db.count_dynamic("Flag", Some("all == true")).unwrap(), 1);
    assert_eq!(db.count_dynamic("Flag", Some("none > 0")).unwrap(), 1);
    assert_eq!(
        db.count_dynamic("Flag", Some("NOT all == true AND none IN {0, 1}"))
            .unwrap(),
        1
    );
}

#[test]
fn test_dynamic_api() {
    let (_tmp, db) = open();
    let id = db
        .insert_dynamic("Dog", serde_json::json!({ "name": "Rex" }))
        .unwrap();
    db.insert_dynamic("Dog", serde_json::json!({ "name": "Fido", "age": 3 }))
        .unwrap();

    let rex = db.get_dynamic("Dog", id.as_str()).unwrap().unwrap();
    assert_eq!(
        rex,
        serde_json::json!({ "_id": id.as_str(), "name": "Rex", "age": 0 })
    );

    let sorted = db
        .query_dynamic("Dog", None, &[SortDescriptor::new("name", true)])
        .unwrap();
    assert_eq!(sorted[0]["name"], serde_json::json!("Fido"));
    assert_eq!(db.count_dynamic("Dog", Some("age > 1")).unwrap(), 1);

    assert!(matches!(
        db.insert_dynamic("Dog", serde_json::json!({ "name": 5 })),
        Err(BurrowError::Validation(_))
    ));
    assert!(db.insert_dynamic("Cat", serde_json::json!({})).is_err());

    db.delete_dynamic("Dog", id.as_str()).unwrap();
    assert!(db.get_dynamic("Dog", id.as_str()).unwrap().is_none());

    let status = db.status().unwrap();
    assert_eq!(status.classes["Dog"], 1);
    assert_eq!(status.classes["Person"], 0);
    assert!(!status.read_only);
    assert!(db.validate_all().unwrap().is_empty());
}

#[test]
fn test_watcher_picks_up_commits_from_another_connection() {
    let (_tmp, db) = open();
    add_dog(&db, "Rex", 9);
    db.watch().unwrap();

    let external = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&external);
    let _token = db.observe(move |changes| {
        if changes.external {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let other = StoreDb::open(db.path(), Duration::from_secs(1)).unwrap();
    other.begin_write().unwrap();
    other
        .upsert_object("Dog", "fido", &serde_json::json!({ "name": "Fido", "age": 3 }))
        .unwrap();
    other.bump_version().unwrap();
    other.commit_transaction().unwrap();

    // Events arrive after the debounce window; allow a slow file system.
    let mut notified = false;
    for _ in 0..50 {
        std::thread::sleep(Duration::from_millis(100));
        if db.process_watcher_events().unwrap() {
            notified = true;
            break;
        }
    }
    assert!(notified);
    assert_eq!(external.load(Ordering::SeqCst), 1);
    assert_eq!(dog_count(&db), 2);
    assert!(!db.process_watcher_events().unwrap());
}

#[test]
fn test_watching_own_commits_notifies_nobody() {
    let (_tmp, db) = open();
    db.watch().unwrap();
    db.watch().unwrap();

    let external = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&external);
    let _token = db.observe(move |changes| {
        if changes.external {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    add_dog(&db, "Rex", 9);
    std::thread::sleep(Duration::from_millis(300));
    assert!(!db.process_watcher_events().unwrap());
    assert_eq!(external.load(Ordering::SeqCst), 0);
}
