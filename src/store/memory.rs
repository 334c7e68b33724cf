use anyhow::{bail, Result};
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::model::{Instance, Value};
use crate::query::{EntityQuery, ProjectedColumn, Projection, QueryExecutor};
use crate::values::{DataRecord, RecordField};

/// In-process data source: rows per entity set, queried through
/// [`QueryExecutor`]. Every executed query is kept for inspection.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Vec<Instance>>>,
    executed: RwLock<Vec<EntityQuery>>,
    failure: RwLock<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entity_set: &str, row: Instance) {
        self.tables
            .write()
            .entry(entity_set.to_string())
            .or_default()
            .push(row);
    }

    /// Apply `change` to every row whose `column` equals `value`. Returns the
    /// number of rows changed.
    pub fn update(&self, entity_set: &str, column: &str, value: &Value, change: impl Fn(&mut Instance)) -> usize {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(entity_set) else {
            return 0;
        };
        let mut count = 0;
        for row in rows.iter_mut().filter(|row| matches_value(row.get(column), value)) {
            change(row);
            count += 1;
        }
        count
    }

    /// Remove every row whose `column` equals `value`
    pub fn delete(&self, entity_set: &str, column: &str, value: &Value) -> usize {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(entity_set) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|row| !matches_value(row.get(column), value));
        before - rows.len()
    }

    pub fn rows(&self, entity_set: &str) -> Vec<Instance> {
        self.tables.read().get(entity_set).cloned().unwrap_or_default()
    }

    pub fn executed_queries(&self) -> Vec<EntityQuery> {
        self.executed.read().clone()
    }

    /// Make the next query fail with `message`
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }
}

impl QueryExecutor for InMemoryStore {
    fn execute(&self, query: &EntityQuery) -> Result<Vec<DataRecord>> {
        self.executed.write().push(query.clone());
        if let Some(message) = self.failure.write().take() {
            bail!(message);
        }
        debug!("Executing against in-memory store: {}", query.text);

        let tables = self.tables.read();
        let Some(rows) = tables.get(&query.entity_set) else {
            return Ok(Vec::new());
        };
        let mut results = Vec::new();
        for row in rows {
            if !query.entity_types.iter().any(|t| *t == row.class) {
                continue;
            }
            let matches = query.predicates.iter().all(|predicate| {
                query
                    .parameter(&predicate.parameter)
                    .is_some_and(|value| matches_value(row.get(&predicate.column), &Value::from(value.clone())))
            });
            if !matches {
                continue;
            }
            let record = DataRecord::from_instance(row);
            results.push(match &query.projection {
                Projection::Entity => record,
                Projection::Row(columns) => project(&record, columns),
            });
        }
        Ok(results)
    }
}

/// SQL-style equality: null never matches
fn matches_value(field: Option<&Value>, value: &Value) -> bool {
    match field {
        Some(field) if !field.is_null() && !value.is_null() => field.same_as(value),
        _ => false,
    }
}

fn project(record: &DataRecord, columns: &[ProjectedColumn]) -> DataRecord {
    let mut row = DataRecord::new();
    for column in columns {
        let field = match (&column.nested, record.get_by_name(&column.name)) {
            (Some(nested), Some(RecordField::Record(inner))) => RecordField::Record(project(inner, nested)),
            (None, Some(RecordField::Value(value))) => RecordField::Value(value.clone()),
            _ => RecordField::Value(Value::Null),
        };
        row.push(column.name.clone(), field);
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QuerySource;
    use serde_json::json;

    fn order(id: i64, owner: i64, total: f64) -> Instance {
        Instance::new("Order")
            .with("Id", id)
            .with("OwnerId", owner)
            .with("Total", total)
    }

    fn orders_of(owner: i64) -> EntityQuery {
        let source = QuerySource {
            container: "Model",
            entity_set: "Orders",
            namespace: "Model",
            entity_type: "Order",
        };
        EntityQuery::related(source, vec!["Order".to_string()], &[("OwnerId".to_string(), json!(owner))])
    }

    #[test]
    fn test_rows_are_filtered_by_predicates() {
        let store = InMemoryStore::new();
        store.insert("Orders", order(10, 1, 9.5));
        store.insert("Orders", order(11, 2, 20.0));
        store.insert("Orders", order(12, 1, 3.0));

        let rows = store.execute(&orders_of(1)).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value("Id"), Value::from(10));
        assert_eq!(store.executed_queries().len(), 1);
    }

    #[test]
    fn test_deleted_and_updated_rows() {
        let store = InMemoryStore::new();
        store.insert("Orders", order(10, 1, 9.5));
        store.insert("Orders", order(12, 1, 3.0));

        assert_eq!(store.update("Orders", "Id", &Value::from(12), |row| row.set("Total", 4.0)), 1);
        assert_eq!(store.delete("Orders", "Id", &Value::from(10)), 1);

        let rows = store.execute(&orders_of(1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("Total"), Value::from(4.0));
    }

    #[test]
    fn test_injected_failure_hits_the_next_query_only() {
        let store = InMemoryStore::new();
        store.fail_next("connection reset");

        assert!(store.execute(&orders_of(1)).is_err());
        assert!(store.execute(&orders_of(1)).unwrap().is_empty());
    }
}
