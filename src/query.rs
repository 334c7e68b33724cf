use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{EntryError, Result};
use crate::values::{DataRecord, PropertyValue, PropertyValues};

/// Runs entity queries against a data source.
pub trait QueryExecutor: Send + Sync {
    /// Rows matching the query, shaped by its projection
    fn execute(&self, query: &EntityQuery) -> anyhow::Result<Vec<DataRecord>>;
}

/// A column of a row projection; complex columns carry their nested row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    pub name: String,
    pub nested: Option<Vec<ProjectedColumn>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Whole entity rows
    Entity,
    /// Only the listed columns
    Row(Vec<ProjectedColumn>),
}

/// `X.[column] = @parameter`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub column: String,
    pub parameter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub value: serde_json::Value,
}

/// Query over one entity set, restricted to some entity types and filtered
/// by column equality. `text` is the rendered query; the structured fields
/// describe the same query for executors that do not parse text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityQuery {
    pub text: String,
    pub entity_set: String,
    pub entity_types: Vec<String>,
    pub projection: Projection,
    pub predicates: Vec<Predicate>,
    pub parameters: Vec<QueryParameter>,
}

/// Bracket-quote an identifier, doubling any closing bracket.
pub fn quote_identifier(identifier: &str) -> String {
    format!("[{}]", identifier.replace(']', "]]"))
}

/// Where an entity type lives: container, entity set and namespace.
#[derive(Debug, Clone, Copy)]
pub struct QuerySource<'a> {
    pub container: &'a str,
    pub entity_set: &'a str,
    pub namespace: &'a str,
    pub entity_type: &'a str,
}

impl QuerySource<'_> {
    fn render(&self) -> String {
        format!(
            "(SELECT VALUE TREAT (Y AS {}.{}) FROM {}.{} AS Y) AS X",
            quote_identifier(self.namespace),
            quote_identifier(self.entity_type),
            quote_identifier(self.container),
            quote_identifier(self.entity_set)
        )
    }
}

impl EntityQuery {
    /// Select the stored values of one entity, shaped like `template`.
    ///
    /// Every property of the template becomes a column; complex properties
    /// become nested `ROW(...)` columns. A null complex value in the template
    /// leaves nothing to shape the nested row from, so it is an error.
    pub fn database_values(
        source: QuerySource<'_>,
        entity_types: Vec<String>,
        template: &PropertyValues,
        key: &[(String, serde_json::Value)],
    ) -> Result<Self> {
        let columns = row_columns(template, source.entity_type)?;
        let (predicates, parameters) = equality_filter(key);
        let text = format!(
            "SELECT {} FROM {} WHERE {}",
            render_row("X", &columns),
            source.render(),
            render_filter(&predicates)
        );
        Ok(Self {
            text,
            entity_set: source.entity_set.to_string(),
            entity_types,
            projection: Projection::Row(columns),
            predicates,
            parameters,
        })
    }

    /// Select whole entities whose `filter` columns equal the given values.
    pub fn related(
        source: QuerySource<'_>,
        entity_types: Vec<String>,
        filter: &[(String, serde_json::Value)],
    ) -> Self {
        let (predicates, parameters) = equality_filter(filter);
        let text = format!(
            "SELECT VALUE X FROM {} WHERE {}",
            source.render(),
            render_filter(&predicates)
        );
        Self {
            text,
            entity_set: source.entity_set.to_string(),
            entity_types,
            projection: Projection::Entity,
            predicates,
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.iter().find(|p| p.name == name).map(|p| &p.value)
    }
}

fn row_columns(template: &PropertyValues, entity_type: &str) -> Result<Vec<ProjectedColumn>> {
    let mut columns = Vec::new();
    for name in template.property_names() {
        let item = template.get_item(name)?;
        let nested = if item.is_complex() {
            match item.value {
                PropertyValue::Nested(values) => Some(row_columns(&values, entity_type)?),
                PropertyValue::Value(_) => {
                    return Err(EntryError::ComplexPropertyIsNull {
                        property: name.clone(),
                        class: entity_type.to_string(),
                    })
                }
            }
        } else {
            None
        };
        columns.push(ProjectedColumn {
            name: name.clone(),
            nested,
        });
    }
    Ok(columns)
}

fn render_row(prefix: &str, columns: &[ProjectedColumn]) -> String {
    columns
        .iter()
        .map(|column| {
            let quoted = quote_identifier(&column.name);
            match &column.nested {
                Some(nested) => format!("ROW({}) AS {quoted}", render_row(&format!("{prefix}.{quoted}"), nested)),
                None => format!("{prefix}.{quoted}"),
            }
        })
        .join(", ")
}

fn equality_filter(pairs: &[(String, serde_json::Value)]) -> (Vec<Predicate>, Vec<QueryParameter>) {
    pairs
        .iter()
        .enumerate()
        .map(|(i, (column, value))| {
            let parameter = format!("p{i}");
            (
                Predicate {
                    column: column.clone(),
                    parameter: parameter.clone(),
                },
                QueryParameter {
                    name: parameter,
                    value: value.clone(),
                },
            )
        })
        .unzip()
}

fn render_filter(predicates: &[Predicate]) -> String {
    predicates
        .iter()
        .map(|p| format!("X.{} = @{}", quote_identifier(&p.column), p.parameter))
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{person, registry};
    use serde_json::json;

    fn people() -> QuerySource<'static> {
        QuerySource {
            container: "PeopleContext",
            entity_set: "People",
            namespace: "Model",
            entity_type: "Person",
        }
    }

    #[test]
    fn test_identifiers_are_bracket_quoted() {
        assert_eq!(quote_identifier("Name"), "[Name]");
        assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_database_values_query_mirrors_the_complex_shape() {
        let template = PropertyValues::from_object(registry(), &person(1, "Alice", 30)).unwrap();

        let query = EntityQuery::database_values(
            people(),
            vec!["Employee".to_string(), "Person".to_string()],
            &template,
            &[("Id".to_string(), json!(1))],
        )
        .unwrap();

        assert_eq!(
            query.text,
            "SELECT X.[Id], X.[Name], X.[Age], ROW(X.[Home].[Street], X.[Home].[City], X.[Home].[Zip], \
             ROW(X.[Home].[Location].[Lat], X.[Home].[Location].[Lon]) AS [Location]) AS [Home], X.[Notes] \
             FROM (SELECT VALUE TREAT (Y AS [Model].[Person]) FROM [PeopleContext].[People] AS Y) AS X \
             WHERE X.[Id] = @p0"
        );
        assert_eq!(query.parameter("p0"), Some(&json!(1)));
        assert!(matches!(query.projection, Projection::Row(ref columns) if columns.len() == 5));
    }

    #[test]
    fn test_related_query_filters_on_join_columns() {
        let source = QuerySource {
            entity_set: "Orders",
            entity_type: "Order",
            ..people()
        };

        let query = EntityQuery::related(
            source,
            vec!["Order".to_string()],
            &[("OwnerId".to_string(), json!(1))],
        );

        assert_eq!(
            query.text,
            "SELECT VALUE X FROM (SELECT VALUE TREAT (Y AS [Model].[Order]) FROM [PeopleContext].[Orders] AS Y) AS X \
             WHERE X.[OwnerId] = @p0"
        );
        assert_eq!(query.projection, Projection::Entity);
    }
}
