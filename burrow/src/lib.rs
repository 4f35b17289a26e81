//! Burrow is an embedded object database on top of SQLite.
//!
//! Classes are declared in a YAML schema, records are typed structs
//! implementing [`Object`] (usually generated by `burrow-codegen`), writes
//! happen in [`WriteTransaction`]s and reads go through lazy, chainable
//! [`Results`].
//!
//! ```no_run
//! # use burrow::{Database, Object, ObjectId, parse_schema_str};
//! # #[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
//! # struct Dog { #[serde(skip)] _id: Option<ObjectId>, name: String, age: i64 }
//! # impl Object for Dog {
//! #     const CLASS_NAME: &'static str = "Dog";
//! #     fn object_id(&self) -> Option<&ObjectId> { self._id.as_ref() }
//! #     fn set_object_id(&mut self, id: Option<ObjectId>) { self._id = id; }
//! # }
//! # fn main() -> burrow::Result<()> {
//! let schema = parse_schema_str("classes: { Dog: { properties: { name: { type: string }, age: { type: int } } } }")?;
//! let db = Database::open_default(schema)?;
//!
//! let mut rex = Dog { name: "Rex".into(), age: 9, ..Default::default() };
//! db.write(|tx| tx.add(&mut rex))?;
//!
//! let old_dogs = db.objects_where::<Dog>("name contains 'x'")?.filter("age > 8")?;
//! println!("{} old dogs", old_dogs.count()?);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod error;
pub mod migration;
pub mod notification;
pub mod object;
pub mod query;
pub mod results;
pub mod schema;
pub mod storage;
pub mod validation;
pub mod value;
pub mod watcher;

pub use database::{
    Config, Database, DeletePlan, ReadTransaction, StoreStatus, ValidationIssue, WriteTransaction,
};
pub use error::{BurrowError, Result};
pub use notification::{ChangeSet, ClassChanges, NotificationToken};
pub use object::{Link, List, Object, ObjectId};
pub use query::SortDescriptor;
pub use results::Results;
pub use schema::{parse_schema, parse_schema_str, SchemaDefinition};
pub use value::Value;
