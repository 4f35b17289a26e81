use crate::database::{decode, sql_to_value, Database, Snapshot};
use crate::error::{BurrowError, Result};
use crate::object::{Object, ObjectId};
use crate::query::{AggregateFn, Query, SortDescriptor};
use crate::storage::StoreDb;
use crate::value::Value;
use std::marker::PhantomData;

/// A lazy view over the objects of one class matching a query.
///
/// Nothing is read when a `Results` is built or refined. Every read
/// ([`count`](Self::count), [`to_vec`](Self::to_vec), ...) runs one SQL
/// statement against the latest committed snapshot, or against the snapshot
/// of the [`ReadTransaction`](crate::ReadTransaction) that created it while
/// that snapshot is open. Results kept past the end of a
/// [`Database::read`] block read the latest committed data.
pub struct Results<T> {
    db: Database,
    pinned: Option<Snapshot>,
    query: Query,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Results<T> {
    fn clone(&self) -> Self {
        Results {
            db: self.db.clone(),
            pinned: self.pinned.clone(),
            query: self.query.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Results<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Results").field("query", &self.query).finish()
    }
}

impl<T: Object> Results<T> {
    pub(crate) fn new(db: Database, pinned: Option<Snapshot>, query: Query) -> Self {
        Results {
            db,
            pinned,
            query,
            _marker: PhantomData,
        }
    }

    fn with_store<R>(&self, f: impl FnOnce(&StoreDb) -> Result<R>) -> Result<R> {
        self.db.with_store(self.pinned.as_ref(), f)
    }

    /// Refine with another predicate, ANDed with the existing ones.
    pub fn filter(&self, predicate: &str) -> Result<Results<T>> {
        self.filter_with_args(predicate, &[])
    }

    /// Refine with a predicate using `$0`, `$1`, ... placeholders.
    pub fn filter_with_args(&self, predicate: &str, args: &[Value]) -> Result<Results<T>> {
        let mut refined = self.clone();
        refined.query.filter(self.db.schema(), predicate, args)?;
        Ok(refined)
    }

    /// Order by one property. Replaces any previous ordering.
    pub fn sorted(&self, property: &str, ascending: bool) -> Result<Results<T>> {
        self.sorted_by(&[SortDescriptor::new(property, ascending)])
    }

    pub fn sorted_by(&self, descriptors: &[SortDescriptor]) -> Result<Results<T>> {
        let mut sorted = self.clone();
        sorted.query.sort_by(self.db.schema(), descriptors)?;
        Ok(sorted)
    }

    pub fn count(&self) -> Result<usize> {
        let (sql, params) = self.query.count_sql();
        match self.with_store(|store| store.query_value(&sql, &params))? {
            rusqlite::types::Value::Integer(n) => Ok(n as usize),
            other => Err(BurrowError::Other(format!("Unexpected count result {other:?}"))),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.get(0)?.is_none())
    }

    pub fn get(&self, index: usize) -> Result<Option<T>> {
        self.fetch_one(false, index as u64)
    }

    pub fn first(&self) -> Result<Option<T>> {
        self.fetch_one(false, 0)
    }

    pub fn last(&self) -> Result<Option<T>> {
        self.fetch_one(true, 0)
    }

    fn fetch_one(&self, reverse: bool, offset: u64) -> Result<Option<T>> {
        let (sql, params) = self.query.select_sql(reverse, Some(1), offset);
        let records = self.with_store(|store| store.query_objects(&sql, &params))?;
        records.first().map(decode).transpose()
    }

    /// Read every matching object.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let (sql, params) = self.query.select_sql(false, None, 0);
        let records = self.with_store(|store| store.query_objects(&sql, &params))?;
        records.iter().map(decode).collect()
    }

    pub fn ids(&self) -> Result<Vec<ObjectId>> {
        let (sql, params) = self.query.select_sql(false, None, 0);
        let records = self.with_store(|store| store.query_objects(&sql, &params))?;
        Ok(records.into_iter().map(|r| ObjectId::new(r.id)).collect())
    }

    /// Smallest value of a numeric or date property; `None` when empty.
    pub fn min(&self, property: &str) -> Result<Option<Value>> {
        self.aggregate(AggregateFn::Min, property)
    }

    pub fn max(&self, property: &str) -> Result<Option<Value>> {
        self.aggregate(AggregateFn::Max, property)
    }

    /// Sum of a numeric property; zero when empty.
    pub fn sum(&self, property: &str) -> Result<Value> {
        Ok(self
            .aggregate(AggregateFn::Sum, property)?
            .unwrap_or(Value::Int(0)))
    }

    pub fn average(&self, property: &str) -> Result<Option<f64>> {
        Ok(self
            .aggregate(AggregateFn::Avg, property)?
            .and_then(|v| v.as_f64()))
    }

    fn aggregate(&self, func: AggregateFn, property: &str) -> Result<Option<Value>> {
        let (sql, params, ty) = self.query.aggregate_sql(self.db.schema(), func, property)?;
        let raw = self.with_store(|store| store.query_value(&sql, &params))?;
        let ty = if func == AggregateFn::Avg {
            crate::schema::PropertyType::Float
        } else {
            ty
        };
        Ok(sql_to_value(raw, ty))
    }
}
