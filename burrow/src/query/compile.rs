//! Translates a parsed [`Predicate`] into a SQL boolean expression over the
//! `objects` table, checking every key path and literal against the schema.
//!
//! The root object is always aliased `o`. Scalar properties are read with
//! `json_extract(o.data_json, '$.prop')`; link traversals become `EXISTS`
//! subqueries over the `links` table.

use super::parser::{Aggregate, Comparison, Operand, Operator, Predicate, Quantifier};
use crate::error::{BurrowError, Result};
use crate::schema::{PropertyDefinition, PropertyType, SchemaDefinition};
use crate::value::{parse_date_millis, Value};
use rusqlite::types::Value as SqlValue;

/// A compiled predicate: SQL text with positional `?` parameters in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

pub fn compile_predicate(
    schema: &SchemaDefinition,
    class_name: &str,
    predicate: &Predicate,
) -> Result<SqlFragment> {
    schema.class(class_name)?;
    let mut compiler = Compiler {
        schema,
        params: Vec::new(),
        next_alias: 0,
    };
    let sql = compiler.predicate(predicate, class_name, "o")?;
    Ok(SqlFragment {
        sql,
        params: compiler.params,
    })
}

/// SQL expression reading a scalar property of the root object, for ORDER BY
/// and aggregate queries.
pub fn property_expr(
    schema: &SchemaDefinition,
    class_name: &str,
    property: &str,
) -> Result<(String, PropertyType)> {
    let prop = lookup(schema, class_name, property)?;
    if prop.property_type.is_link() {
        return Err(BurrowError::Query(format!(
            "'{class_name}.{property}' is a link and has no scalar value"
        )));
    }
    Ok((json_path("o", property), prop.property_type))
}

fn lookup<'s>(
    schema: &'s SchemaDefinition,
    class_name: &str,
    property: &str,
) -> Result<&'s PropertyDefinition> {
    schema.class(class_name)?.property(property).ok_or_else(|| {
        BurrowError::Query(format!("Class '{class_name}' has no property '{property}'"))
    })
}

fn json_path(alias: &str, property: &str) -> String {
    // Property names are validated identifiers, so inlining them is safe.
    format!("json_extract({alias}.data_json, '$.{property}')")
}

struct Compiler<'s> {
    schema: &'s SchemaDefinition,
    params: Vec<SqlValue>,
    next_alias: usize,
}

impl<'s> Compiler<'s> {
    fn alias(&mut self) -> usize {
        self.next_alias += 1;
        self.next_alias
    }

    fn predicate(&mut self, predicate: &Predicate, class_name: &str, alias: &str) -> Result<String> {
        match predicate {
            Predicate::True => Ok("1".to_string()),
            Predicate::False => Ok("0".to_string()),
            Predicate::And(a, b) => {
                let left = self.predicate(a, class_name, alias)?;
                let right = self.predicate(b, class_name, alias)?;
                Ok(format!("({left} AND {right})"))
            }
            Predicate::Or(a, b) => {
                let left = self.predicate(a, class_name, alias)?;
                let right = self.predicate(b, class_name, alias)?;
                Ok(format!("({left} OR {right})"))
            }
            Predicate::Not(inner) => {
                let inner = self.predicate(inner, class_name, alias)?;
                Ok(format!("NOT COALESCE({inner}, 0)"))
            }
            Predicate::Comparison(c) => {
                self.path(c, class_name, alias, &c.path.segments, Some(c.quantifier))
            }
        }
    }

    /// Walk the key path one segment at a time. `quantifier` is `Some` until
    /// the first link hop consumes it.
    fn path(
        &mut self,
        c: &Comparison,
        class_name: &str,
        alias: &str,
        segments: &[String],
        quantifier: Option<Quantifier>,
    ) -> Result<String> {
        let name = &segments[0];
        let prop = lookup(self.schema, class_name, name)?;
        let rest = &segments[1..];

        if rest.is_empty() {
            if matches!(quantifier, Some(Quantifier::All | Quantifier::None)) {
                return Err(BurrowError::Query(format!(
                    "ALL and NONE need a key path through a link, got '{}'",
                    c.path.segments.join(".")
                )));
            }
            if let Some(aggregate) = &c.path.aggregate {
                return self.aggregate(c, class_name, alias, name, prop, aggregate);
            }
            return self.terminal(c, class_name, alias, name, prop);
        }

        if !prop.property_type.is_link() {
            return Err(BurrowError::Query(format!(
                "'{class_name}.{name}' is not a link and has no property '{}'",
                rest[0]
            )));
        }
        let target = link_target(class_name, name, prop)?;

        let n = self.alias();
        let (l, t) = (format!("l{n}"), format!("t{n}"));
        let inner = self.path(c, target, &t, rest, None)?;
        let join = format!(
            "SELECT 1 FROM links {l} JOIN objects {t} ON {t}.class = {l}.target_class AND {t}.id = {l}.target_id \
             WHERE {l}.class = {alias}.class AND {l}.id = {alias}.id AND {l}.property = '{name}'"
        );

        Ok(match quantifier.unwrap_or_default() {
            Quantifier::Any => format!("EXISTS ({join} AND {inner})"),
            Quantifier::None => format!("NOT EXISTS ({join} AND {inner})"),
            Quantifier::All => format!("NOT EXISTS ({join} AND NOT COALESCE({inner}, 0))"),
        })
    }

    fn terminal(
        &mut self,
        c: &Comparison,
        class_name: &str,
        alias: &str,
        name: &str,
        prop: &PropertyDefinition,
    ) -> Result<String> {
        let label = format!("{class_name}.{name}");
        match prop.property_type {
            PropertyType::Object => self.link_comparison(c, &json_path(alias, name), &label),
            PropertyType::List => self.list_membership(c, alias, name, &label),
            ty => self.scalar(c, &json_path(alias, name), ty, &label),
        }
    }

    /// `owner == nil`, `owner != $0` and friends on a to-one link.
    fn link_comparison(&mut self, c: &Comparison, expr: &str, label: &str) -> Result<String> {
        let value = single_operand(c, label)?;
        let negate = match c.operator {
            Operator::Eq => false,
            Operator::Ne => true,
            op => {
                return Err(BurrowError::Query(format!(
                    "Operator {op:?} is not supported on link '{label}'"
                )))
            }
        };
        match value {
            Value::Null if negate => Ok(format!("{expr} IS NOT NULL")),
            Value::Null => Ok(format!("{expr} IS NULL")),
            Value::Link(id) => {
                self.params.push(SqlValue::Text(id.as_str().to_string()));
                Ok(if negate {
                    format!("{expr} IS NOT ?")
                } else {
                    format!("{expr} = ?")
                })
            }
            other => Err(type_mismatch(label, "object", other)),
        }
    }

    /// `dogs == $0`: whether the list holds the given object.
    fn list_membership(
        &mut self,
        c: &Comparison,
        alias: &str,
        name: &str,
        label: &str,
    ) -> Result<String> {
        let value = single_operand(c, label)?;
        let Value::Link(id) = value else {
            return Err(BurrowError::Query(format!(
                "List '{label}' can only be compared with an object; use {label}.@count for sizes"
            )));
        };
        let negate = match c.operator {
            Operator::Eq => false,
            Operator::Ne => true,
            op => {
                return Err(BurrowError::Query(format!(
                    "Operator {op:?} is not supported on list '{label}'"
                )))
            }
        };
        let n = self.alias();
        self.params.push(SqlValue::Text(id.as_str().to_string()));
        let exists = format!(
            "EXISTS (SELECT 1 FROM links l{n} WHERE l{n}.class = {alias}.class AND l{n}.id = {alias}.id \
             AND l{n}.property = '{name}' AND l{n}.target_id = ?)"
        );
        Ok(if negate {
            format!("NOT {exists}")
        } else {
            exists
        })
    }

    fn aggregate(
        &mut self,
        c: &Comparison,
        class_name: &str,
        alias: &str,
        name: &str,
        prop: &PropertyDefinition,
        aggregate: &Aggregate,
    ) -> Result<String> {
        if prop.property_type != PropertyType::List {
            return Err(BurrowError::Query(format!(
                "Collection operators need a list property, '{class_name}.{name}' is {}",
                prop.property_type.name()
            )));
        }
        let target = link_target(class_name, name, prop)?;
        let n = self.alias();
        let (l, t) = (format!("l{n}"), format!("t{n}"));
        let owner = format!(
            "{l}.class = {alias}.class AND {l}.id = {alias}.id AND {l}.property = '{name}'"
        );

        let (func, field) = match aggregate {
            Aggregate::Count => {
                let expr = format!("(SELECT COUNT(*) FROM links {l} WHERE {owner})");
                return self.scalar(c, &expr, PropertyType::Int, &format!("{class_name}.{name}.@count"));
            }
            Aggregate::Min(f) => ("MIN", f),
            Aggregate::Max(f) => ("MAX", f),
            Aggregate::Sum(f) => ("SUM", f),
            Aggregate::Avg(f) => ("AVG", f),
        };

        let field_prop = lookup(self.schema, target, field)?;
        if !field_prop.property_type.is_numeric() {
            return Err(BurrowError::Query(format!(
                "@{} needs a numeric property, '{target}.{field}' is {}",
                func.to_lowercase(),
                field_prop.property_type.name()
            )));
        }
        let value_expr = json_path(&t, field);
        let selected = match func {
            "SUM" => format!("COALESCE(SUM({value_expr}), 0)"),
            _ => format!("{func}({value_expr})"),
        };
        let result_type = if func == "AVG" {
            PropertyType::Float
        } else {
            field_prop.property_type
        };
        let expr = format!(
            "(SELECT {selected} FROM links {l} JOIN objects {t} ON {t}.class = {l}.target_class \
             AND {t}.id = {l}.target_id WHERE {owner})"
        );
        let label = format!("{class_name}.{name}.@{}.{field}", func.to_lowercase());
        self.scalar(c, &expr, result_type, &label)
    }

    fn scalar(&mut self, c: &Comparison, expr: &str, ty: PropertyType, label: &str) -> Result<String> {
        let ci = c.case_insensitive;
        if ci && ty != PropertyType::String {
            return Err(BurrowError::Query(format!(
                "[c] only applies to string properties, '{label}' is {}",
                ty.name()
            )));
        }
        let lhs = if ci {
            format!("lower({expr})")
        } else {
            expr.to_string()
        };

        match (&c.operand, c.operator) {
            (Operand::Value(Value::Null), Operator::Eq) => Ok(format!("{expr} IS NULL")),
            (Operand::Value(Value::Null), Operator::Ne) => Ok(format!("{expr} IS NOT NULL")),
            (Operand::Value(Value::Null), op) => Err(BurrowError::Query(format!(
                "Operator {op:?} cannot compare '{label}' with nil"
            ))),

            (Operand::Value(value), op) if op.is_string_op() => {
                if ty != PropertyType::String {
                    return Err(BurrowError::Query(format!(
                        "Operator {op:?} needs a string property, '{label}' is {}",
                        ty.name()
                    )));
                }
                let Value::String(s) = value else {
                    return Err(type_mismatch(label, "string", value));
                };
                let s = if ci { s.to_ascii_lowercase() } else { s.clone() };
                let pattern = match op {
                    Operator::Contains => format!("*{}*", glob_escape(&s)),
                    Operator::BeginsWith => format!("{}*", glob_escape(&s)),
                    Operator::EndsWith => format!("*{}", glob_escape(&s)),
                    _ => s.replace('[', "[[]"),
                };
                self.params.push(SqlValue::Text(pattern));
                Ok(format!("{lhs} GLOB ?"))
            }

            (Operand::List(values), Operator::In) => {
                if values.is_empty() {
                    return Ok("0".to_string());
                }
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    let v = coerce(ty, value, ci, label)?;
                    self.params.push(v);
                    placeholders.push("?");
                }
                Ok(format!("{lhs} IN ({})", placeholders.join(", ")))
            }

            (Operand::List(values), Operator::Between) => {
                if ty == PropertyType::Bool {
                    return Err(BurrowError::Query(format!(
                        "BETWEEN is not supported on bool '{label}'"
                    )));
                }
                let low = coerce(ty, &values[0], ci, label)?;
                let high = coerce(ty, &values[1], ci, label)?;
                self.params.push(low);
                self.params.push(high);
                Ok(format!("{lhs} BETWEEN ? AND ?"))
            }

            (Operand::Value(value), op) => {
                if ty == PropertyType::Bool && !matches!(op, Operator::Eq | Operator::Ne) {
                    return Err(BurrowError::Query(format!(
                        "Operator {op:?} is not supported on bool '{label}'"
                    )));
                }
                let sql_op = match op {
                    Operator::Eq => "=",
                    Operator::Ne => "IS NOT",
                    Operator::Lt => "<",
                    Operator::Le => "<=",
                    Operator::Gt => ">",
                    Operator::Ge => ">=",
                    other => {
                        return Err(BurrowError::Query(format!(
                            "Operator {other:?} needs a {{...}} list operand"
                        )))
                    }
                };
                let v = coerce(ty, value, ci, label)?;
                self.params.push(v);
                Ok(format!("{lhs} {sql_op} ?"))
            }

            (Operand::List(_), op) => Err(BurrowError::Query(format!(
                "Operator {op:?} does not take a list operand"
            ))),
        }
    }
}

fn link_target<'p>(class_name: &str, name: &str, prop: &'p PropertyDefinition) -> Result<&'p str> {
    prop.target.as_deref().ok_or_else(|| {
        BurrowError::Schema(format!("Link property '{class_name}.{name}' has no target"))
    })
}

fn single_operand<'c>(c: &'c Comparison, label: &str) -> Result<&'c Value> {
    match &c.operand {
        Operand::Value(v) => Ok(v),
        Operand::List(_) => Err(BurrowError::Query(format!(
            "Operator {:?} with a list operand is not supported on '{label}'",
            c.operator
        ))),
    }
}

fn type_mismatch(label: &str, expected: &str, got: &Value) -> BurrowError {
    BurrowError::Query(format!(
        "'{label}' is {expected}, cannot compare with {} {got}",
        got.type_name()
    ))
}

/// Convert a literal to the stored representation of a property type.
fn coerce(ty: PropertyType, value: &Value, ci: bool, label: &str) -> Result<SqlValue> {
    match (ty, value) {
        (PropertyType::String, Value::String(s)) if ci => Ok(SqlValue::Text(s.to_ascii_lowercase())),
        (PropertyType::String, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        (PropertyType::Int, Value::Int(n)) => Ok(SqlValue::Integer(*n)),
        (PropertyType::Int | PropertyType::Float, Value::Float(f)) => Ok(SqlValue::Real(*f)),
        (PropertyType::Float, Value::Int(n)) => Ok(SqlValue::Integer(*n)),
        (PropertyType::Bool, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (PropertyType::Date, Value::Date(_)) => Ok(value.to_sql()),
        (PropertyType::Date, Value::Int(n)) => Ok(SqlValue::Integer(*n)),
        (PropertyType::Date, Value::String(s)) => parse_date_millis(s)
            .map(SqlValue::Integer)
            .ok_or_else(|| BurrowError::Query(format!("'{s}' is not a date (for '{label}')"))),
        (ty, other) => Err(type_mismatch(label, ty.name(), other)),
    }
}

/// Escape GLOB metacharacters so the text matches literally.
fn glob_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '*' => out.push_str("[*]"),
            '?' => out.push_str("[?]"),
            '[' => out.push_str("[[]"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::testing::SCHEMA;
    use crate::query::parser::parse_predicate;
    use crate::schema::parse_schema_str;
    use pretty_assertions::assert_eq;

    fn compile(class: &str, predicate: &str, args: &[Value]) -> Result<SqlFragment> {
        let schema = parse_schema_str(SCHEMA).unwrap();
        let parsed = parse_predicate(predicate, args)?;
        compile_predicate(&schema, class, &parsed)
    }

    #[test]
    fn test_scalar_comparison() {
        let frag = compile("Dog", "age > 8", &[]).unwrap();
        assert_eq!(frag.sql, "json_extract(o.data_json, '$.age') > ?");
        assert_eq!(frag.params, vec![SqlValue::Integer(8)]);
    }

    #[test]
    fn test_contains_is_literal_glob() {
        let frag = compile("Dog", "name CONTAINS[c] 'R*x'", &[]).unwrap();
        assert_eq!(frag.sql, "lower(json_extract(o.data_json, '$.name')) GLOB ?");
        assert_eq!(frag.params, vec![SqlValue::Text("*r[*]x*".into())]);
    }

    #[test]
    fn test_params_follow_sql_order() {
        let frag = compile("Dog", "name == 'a' OR (age BETWEEN {1, 3} AND NOT age == 2)", &[]).unwrap();
        assert_eq!(
            frag.params,
            vec![
                SqlValue::Text("a".into()),
                SqlValue::Integer(1),
                SqlValue::Integer(3),
                SqlValue::Integer(2)
            ]
        );
        assert_eq!(frag.sql.matches('?').count(), 4);
    }

    #[test]
    fn test_link_path_becomes_exists() {
        let frag = compile("Person", "ALL dogs.age >= 2", &[]).unwrap();
        assert!(frag.sql.starts_with("NOT EXISTS (SELECT 1 FROM links l1 JOIN objects t1"));
        assert!(frag.sql.contains("l1.property = 'dogs'"));
        assert!(frag.sql.contains("json_extract(t1.data_json, '$.age') >= ?"));
    }

    #[test]
    fn test_type_errors_at_build_time() {
        assert!(compile("Dog", "age CONTAINS 'x'", &[]).is_err());
        assert!(compile("Dog", "name > 3", &[]).is_err());
        assert!(compile("Dog", "color == 'brown'", &[]).is_err());
        assert!(compile("Dog", "age.years == 1", &[]).is_err());
        assert!(compile("Dog", "ALL age == 1", &[]).is_err());
        assert!(compile("Person", "dogs.@avg.name > 1", &[]).is_err());
        assert!(compile("Person", "name.@count > 1", &[]).is_err());
        assert!(compile("Cat", "name == 'x'", &[]).is_err());
    }

    #[test]
    fn test_nil_and_link_comparisons() {
        let frag = compile("Person", "best_friend == nil", &[]).unwrap();
        assert_eq!(frag.sql, "json_extract(o.data_json, '$.best_friend') IS NULL");

        let id = crate::object::ObjectId::new("rex");
        let frag = compile("Person", "dogs == $0", &[Value::Link(id)]).unwrap();
        assert!(frag.sql.starts_with("EXISTS (SELECT 1 FROM links l1"));
        assert_eq!(frag.params, vec![SqlValue::Text("rex".into())]);

        assert!(compile("Person", "best_friend == 'rex'", &[]).is_err());
    }

    #[test]
    fn test_count_and_sum() {
        let frag = compile("Person", "dogs.@count > 1", &[]).unwrap();
        assert!(frag.sql.starts_with("(SELECT COUNT(*) FROM links l1"));

        let frag = compile("Person", "dogs.@sum.age == 10", &[]).unwrap();
        assert!(frag.sql.contains("COALESCE(SUM(json_extract(t1.data_json, '$.age')), 0)"));
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let frag = compile("Dog", "age IN {}", &[]).unwrap();
        assert_eq!(frag.sql, "0");
        assert!(frag.params.is_empty());
    }
}
