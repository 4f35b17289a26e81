// Object model - identities, the Object trait, and link containers

use crate::error::{BurrowError, Result};
use crate::schema::AutoIdStrategy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// Identity of a managed object within its class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        ObjectId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn generate(strategy: AutoIdStrategy) -> Self {
        ObjectId(match strategy {
            AutoIdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            AutoIdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            AutoIdStrategy::Nanoid => nanoid::nanoid!(),
        })
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        ObjectId(s.to_string())
    }
}

/// A typed record class stored in a [`Database`](crate::Database).
///
/// Implementations are normally generated by `burrow-codegen` from schema.yaml.
/// A value whose `object_id()` is `None` is standalone: it lives only in memory
/// until it is added inside a write transaction, which assigns its identity.
/// Field changes to a managed value persist only when it is added again inside
/// a write transaction.
pub trait Object: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Name of the class in the schema.
    const CLASS_NAME: &'static str;

    fn object_id(&self) -> Option<&ObjectId>;

    fn set_object_id(&mut self, id: Option<ObjectId>);

    fn is_managed(&self) -> bool {
        self.object_id().is_some()
    }
}

fn managed_id<T: Object>(obj: &T) -> Result<ObjectId> {
    obj.object_id()
        .cloned()
        .ok_or_else(|| BurrowError::Unmanaged(T::CLASS_NAME.to_string()))
}

/// An ordered to-many link. Stores the ids of the linked objects.
pub struct List<T> {
    ids: Vec<ObjectId>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> List<T> {
    pub fn new() -> Self {
        List {
            ids: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObjectId> {
        self.ids.iter()
    }

    pub fn push_id(&mut self, id: ObjectId) {
        self.ids.push(id);
    }

    pub fn remove(&mut self, index: usize) -> Option<ObjectId> {
        if index < self.ids.len() {
            Some(self.ids.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl<T: Object> List<T> {
    /// Append a managed object. Standalone objects have no identity to link to.
    pub fn push(&mut self, obj: &T) -> Result<()> {
        let id = managed_id(obj)?;
        self.ids.push(id);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, obj: &T) -> Result<()> {
        if index > self.ids.len() {
            return Err(BurrowError::Other(format!(
                "List index {index} out of bounds (len {})",
                self.ids.len()
            )));
        }
        let id = managed_id(obj)?;
        self.ids.insert(index, id);
        Ok(())
    }

    /// Remove the first occurrence of `obj`. Returns whether it was present.
    pub fn remove_object(&mut self, obj: &T) -> bool {
        let Some(id) = obj.object_id() else {
            return false;
        };
        match self.ids.iter().position(|i| i == id) {
            Some(pos) => {
                self.ids.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, obj: &T) -> bool {
        obj.object_id()
            .map(|id| self.ids.contains(id))
            .unwrap_or(false)
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        List::new()
    }
}

impl<T> Clone for List<T> {
    fn clone(&self) -> Self {
        List {
            ids: self.ids.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for List<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl<T> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.ids).finish()
    }
}

impl<T> Serialize for List<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.ids.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for List<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let ids = Option::<Vec<ObjectId>>::deserialize(deserializer)?.unwrap_or_default();
        Ok(List {
            ids,
            _marker: PhantomData,
        })
    }
}

/// A to-one link, possibly empty.
pub struct Link<T> {
    id: Option<ObjectId>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Link<T> {
    pub fn empty() -> Self {
        Link {
            id: None,
            _marker: PhantomData,
        }
    }

    pub fn from_id(id: ObjectId) -> Self {
        Link {
            id: Some(id),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.id.is_some()
    }

    pub fn clear(&mut self) {
        self.id = None;
    }
}

impl<T: Object> Link<T> {
    pub fn to(obj: &T) -> Result<Self> {
        Ok(Link::from_id(managed_id(obj)?))
    }

    pub fn set(&mut self, obj: &T) -> Result<()> {
        self.id = Some(managed_id(obj)?);
        Ok(())
    }
}

impl<T> Default for Link<T> {
    fn default() -> Self {
        Link::empty()
    }
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Link {
            id: self.id.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Link<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({:?})", self.id)
    }
}

impl<T> Serialize for Link<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.id.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Link<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Link {
            id: Option::<ObjectId>::deserialize(deserializer)?,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-written record types shared by the crate's unit tests.

    use super::*;

    pub const SCHEMA: &str = r#"
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
"#;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Dog {
        #[serde(skip)]
        pub _id: Option<ObjectId>,
        #[serde(default)]
        pub name: String,
        #[serde(default)]
        pub age: i64,
    }

    impl Dog {
        pub fn new(name: &str, age: i64) -> Self {
            Dog {
                _id: None,
                name: name.to_string(),
                age,
            }
        }
    }

    impl Object for Dog {
        const CLASS_NAME: &'static str = "Dog";

        fn object_id(&self) -> Option<&ObjectId> {
            self._id.as_ref()
        }

        fn set_object_id(&mut self, id: Option<ObjectId>) {
            self._id = id;
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct Person {
        #[serde(skip)]
        pub _id: Option<ObjectId>,
        #[serde(default)]
        pub name: String,
        #[serde(default)]
        pub dogs: List<Dog>,
        #[serde(default)]
        pub best_friend: Link<Dog>,
    }

    impl Person {
        pub fn new(name: &str) -> Self {
            Person {
                name: name.to_string(),
                ..Default::default()
            }
        }
    }

    impl Object for Person {
        const CLASS_NAME: &'static str = "Person";

        fn object_id(&self) -> Option<&ObjectId> {
            self._id.as_ref()
        }

        fn set_object_id(&mut self, id: Option<ObjectId>) {
            self._id = id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{Dog, Person};
    use super::*;

    #[test]
    fn test_push_requires_managed_object() {
        let mut person = Person::new("Tim");
        let dog = Dog::new("Rex", 9);

        let err = person.dogs.push(&dog).unwrap_err();
        assert!(matches!(err, BurrowError::Unmanaged(class) if class == "Dog"));
        assert!(person.dogs.is_empty());
    }

    #[test]
    fn test_list_operations() {
        let mut list: List<Dog> = List::new();
        let mut a = Dog::new("A", 1);
        a.set_object_id(Some(ObjectId::new("a")));
        let mut b = Dog::new("B", 2);
        b.set_object_id(Some(ObjectId::new("b")));

        list.push(&a).unwrap();
        list.insert(0, &b).unwrap();
        list.push(&a).unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list.ids()[0].as_str(), "b");
        assert!(list.contains(&a));

        assert!(list.remove_object(&a));
        assert_eq!(
            list.ids().iter().map(|i| i.as_str()).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
        assert!(list.insert(5, &a).is_err());
    }

    #[test]
    fn test_list_serializes_as_ids() {
        let mut list: List<Dog> = List::new();
        list.push_id(ObjectId::new("x1"));
        list.push_id(ObjectId::new("x2"));
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json, serde_json::json!(["x1", "x2"]));

        let back: List<Dog> = serde_json::from_value(json).unwrap();
        assert_eq!(back, list);

        let from_null: List<Dog> = serde_json::from_value(serde_json::Value::Null).unwrap();
        assert!(from_null.is_empty());
    }

    #[test]
    fn test_link_serializes_as_optional_id() {
        let link: Link<Dog> = Link::from_id(ObjectId::new("rex"));
        assert_eq!(serde_json::to_value(&link).unwrap(), serde_json::json!("rex"));
        let empty: Link<Dog> = Link::empty();
        assert!(serde_json::to_value(&empty).unwrap().is_null());
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ObjectId::generate(AutoIdStrategy::Ulid);
        let b = ObjectId::generate(AutoIdStrategy::Ulid);
        assert_ne!(a, b);
        assert_eq!(ObjectId::generate(AutoIdStrategy::Uuid).as_str().len(), 36);
        assert!(!ObjectId::generate(AutoIdStrategy::Nanoid).as_str().is_empty());
    }
}
