mod compile;
mod parser;

pub use compile::{compile_predicate, property_expr, SqlFragment};
pub use parser::{
    parse_predicate, Aggregate, Comparison, KeyPath, Operand, Operator, Predicate, Quantifier,
};

use crate::error::{BurrowError, Result};
use crate::object::ObjectId;
use crate::schema::{PropertyType, SchemaDefinition};
use crate::value::Value;
use rusqlite::types::Value as SqlValue;

const COLUMNS: &str = "o.class, o.id, o.data_json, o.created_at, o.updated_at";

/// One sort key of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub property: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn new(property: impl Into<String>, ascending: bool) -> Self {
        SortDescriptor {
            property: property.into(),
            ascending,
        }
    }
}

/// The SQL aggregate functions exposed on result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Min,
    Max,
    Sum,
    Avg,
}

/// A compiled, composable query over one class: a conjunction of predicate
/// fragments plus an ordering. Building never touches the store.
#[derive(Debug, Clone)]
pub struct Query {
    class: String,
    conditions: Vec<SqlFragment>,
    sort: Vec<(SortDescriptor, String)>,
}

impl Query {
    pub fn new(class: impl Into<String>) -> Self {
        Query {
            class: class.into(),
            conditions: Vec::new(),
            sort: Vec::new(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// AND a predicate onto the query.
    pub fn filter(&mut self, schema: &SchemaDefinition, predicate: &str, args: &[Value]) -> Result<()> {
        let parsed = parse_predicate(predicate, args)?;
        let fragment = compile_predicate(schema, &self.class, &parsed)?;
        self.conditions.push(fragment);
        Ok(())
    }

    /// Restrict to objects whose `property` links to the given target.
    pub fn filter_linking_to(&mut self, property: &str, target_id: &ObjectId) {
        self.conditions.push(SqlFragment {
            sql: "EXISTS (SELECT 1 FROM links lk WHERE lk.class = o.class AND lk.id = o.id \
                  AND lk.property = ? AND lk.target_id = ?)"
                .to_string(),
            params: vec![
                SqlValue::Text(property.to_string()),
                SqlValue::Text(target_id.as_str().to_string()),
            ],
        });
    }

    /// Replace the ordering. Ties, and unsorted queries, keep insertion order.
    pub fn sort_by(&mut self, schema: &SchemaDefinition, descriptors: &[SortDescriptor]) -> Result<()> {
        let mut sort = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let (expr, _) = property_expr(schema, &self.class, &descriptor.property)?;
            sort.push((descriptor.clone(), expr));
        }
        self.sort = sort;
        Ok(())
    }

    fn where_clause(&self) -> (String, Vec<SqlValue>) {
        let mut sql = String::from("o.class = ?");
        let mut params = vec![SqlValue::Text(self.class.clone())];
        for condition in &self.conditions {
            sql.push_str(" AND (");
            sql.push_str(&condition.sql);
            sql.push(')');
            params.extend(condition.params.iter().cloned());
        }
        (sql, params)
    }

    fn order_clause(&self, reverse: bool) -> String {
        let mut keys: Vec<String> = self
            .sort
            .iter()
            .map(|(d, expr)| {
                let ascending = d.ascending != reverse;
                format!("{expr} {}", if ascending { "ASC" } else { "DESC" })
            })
            .collect();
        keys.push(format!("o.rowid {}", if reverse { "DESC" } else { "ASC" }));
        keys.join(", ")
    }

    /// SELECT for matching objects. `reverse` flips the ordering.
    pub fn select_sql(
        &self,
        reverse: bool,
        limit: Option<u64>,
        offset: u64,
    ) -> (String, Vec<SqlValue>) {
        let (where_sql, mut params) = self.where_clause();
        let mut sql = format!(
            "SELECT {COLUMNS} FROM objects o WHERE {where_sql} ORDER BY {}",
            self.order_clause(reverse)
        );
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(SqlValue::Integer(limit as i64));
            params.push(SqlValue::Integer(offset as i64));
        }
        (sql, params)
    }

    pub fn count_sql(&self) -> (String, Vec<SqlValue>) {
        let (where_sql, params) = self.where_clause();
        (
            format!("SELECT COUNT(*) FROM objects o WHERE {where_sql}"),
            params,
        )
    }

    /// Aggregate over a numeric property of the matching objects. Also returns
    /// the property's type so the caller can decode the result.
    pub fn aggregate_sql(
        &self,
        schema: &SchemaDefinition,
        func: AggregateFn,
        property: &str,
    ) -> Result<(String, Vec<SqlValue>, PropertyType)> {
        let (expr, ty) = property_expr(schema, &self.class, property)?;
        if !ty.is_numeric() {
            return Err(BurrowError::Query(format!(
                "Cannot aggregate non-numeric property '{}.{property}' ({})",
                self.class,
                ty.name()
            )));
        }
        if func == AggregateFn::Sum && ty == PropertyType::Date {
            return Err(BurrowError::Query(format!(
                "Cannot sum date property '{}.{property}'",
                self.class
            )));
        }
        let selected = match func {
            AggregateFn::Min => format!("MIN({expr})"),
            AggregateFn::Max => format!("MAX({expr})"),
            AggregateFn::Sum => format!("TOTAL({expr})"),
            AggregateFn::Avg => format!("AVG({expr})"),
        };
        let (where_sql, params) = self.where_clause();
        Ok((
            format!("SELECT {selected} FROM objects o WHERE {where_sql}"),
            params,
            ty,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::testing::SCHEMA;
    use crate::schema::parse_schema_str;

    #[test]
    fn test_filters_are_anded() {
        let schema = parse_schema_str(SCHEMA).unwrap();
        let mut query = Query::new("Dog");
        query.filter(&schema, "name contains 'x'", &[]).unwrap();
        query.filter(&schema, "age > 8", &[]).unwrap();

        let (sql, params) = query.count_sql();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM objects o WHERE o.class = ? \
             AND (json_extract(o.data_json, '$.name') GLOB ?) \
             AND (json_extract(o.data_json, '$.age') > ?)"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_order_clause_and_reverse() {
        let schema = parse_schema_str(SCHEMA).unwrap();
        let mut query = Query::new("Dog");
        query
            .sort_by(&schema, &[SortDescriptor::new("age", false)])
            .unwrap();

        let (sql, _) = query.select_sql(false, None, 0);
        assert!(sql.ends_with("ORDER BY json_extract(o.data_json, '$.age') DESC, o.rowid ASC"));
        let (sql, params) = query.select_sql(true, Some(1), 0);
        assert!(sql.contains("ORDER BY json_extract(o.data_json, '$.age') ASC, o.rowid DESC LIMIT"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_sort_and_aggregate_need_scalars() {
        let schema = parse_schema_str(SCHEMA).unwrap();
        let mut query = Query::new("Person");
        assert!(query.sort_by(&schema, &[SortDescriptor::new("dogs", true)]).is_err());
        assert!(query.aggregate_sql(&schema, AggregateFn::Sum, "name").is_err());
        assert!(Query::new("Dog")
            .aggregate_sql(&schema, AggregateFn::Avg, "age")
            .is_ok());
    }
}
