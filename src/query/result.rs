use crate::driver::{DriverError, RawResult};
use crate::types::Value;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// One result row. Values keep the column order reported by the driver;
/// look values up by column name, not position.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Value of the named column. Exact match wins, then an ASCII case-insensitive match.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))?;
        self.values.get(idx)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Normalized response to a single statement
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(Vec<Row>),
    Affected { count: u64, parameters: Vec<Value> },
}

impl QueryResult {
    /// Number of rows returned; zero for DML
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Rows(rows) => rows.len(),
            QueryResult::Affected { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rows(&self) -> Option<&[Row]> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Affected { .. } => None,
        }
    }

    pub fn into_rows(self) -> Option<Vec<Row>> {
        match self {
            QueryResult::Rows(rows) => Some(rows),
            QueryResult::Affected { .. } => None,
        }
    }

    /// Affected row count for DML
    pub fn count(&self) -> Option<u64> {
        match self {
            QueryResult::Affected { count, .. } => Some(*count),
            QueryResult::Rows(_) => None,
        }
    }

    /// Parameters the DML statement was executed with
    pub fn parameters(&self) -> Option<&[Value]> {
        match self {
            QueryResult::Affected { parameters, .. } => Some(parameters),
            QueryResult::Rows(_) => None,
        }
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QueryResult::Rows(rows) => rows.serialize(serializer),
            QueryResult::Affected { count, parameters } => {
                let mut s = serializer.serialize_struct("Affected", 2)?;
                s.serialize_field("count", count)?;
                s.serialize_field("parameters", parameters)?;
                s.end()
            }
        }
    }
}

/// Map a raw driver response onto the uniform result shape.
///
/// Row-returning responses become `Rows`, sharing one column list across
/// rows. Count responses become `Affected` and carry `parameters` back to the
/// caller. A row whose width disagrees with the column list is rejected.
pub fn normalize(raw: RawResult, parameters: Vec<Value>) -> Result<QueryResult, DriverError> {
    match raw {
        RawResult::Count(count) => Ok(QueryResult::Affected { count, parameters }),
        RawResult::Rows { columns, rows } => {
            let columns: Arc<[String]> = columns.into();
            rows.into_iter()
                .enumerate()
                .map(|(i, values)| {
                    if values.len() != columns.len() {
                        return Err(DriverError::Statement(format!(
                            "row {} has {} values but {} columns were reported",
                            i,
                            values.len(),
                            columns.len()
                        )));
                    }
                    Ok(Row {
                        columns: columns.clone(),
                        values,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(QueryResult::Rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn game_rows() -> RawResult {
        RawResult::Rows {
            columns: vec!["host_year".into(), "nation_code".into(), "medal".into()],
            rows: vec![
                vec![Value::Integer(2004), Value::Text("NGR".into()), Value::Text("A".into())],
                vec![Value::Integer(2008), Value::Text("KOR".into()), Value::Null],
            ],
        }
    }

    #[test]
    fn test_rows_keep_driver_column_order() {
        let result = normalize(game_rows(), vec![]).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.count(), None);
        assert_eq!(result.parameters(), None);

        let rows = result.rows().unwrap();
        assert_eq!(rows[0].columns(), &["host_year", "nation_code", "medal"]);
        let pairs: Vec<(&str, &Value)> = rows[1].iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("host_year", &Value::Integer(2008)),
                ("nation_code", &Value::Text("KOR".into())),
                ("medal", &Value::Null),
            ]
        );
    }

    #[test]
    fn test_lookup_by_name() {
        let result = normalize(game_rows(), vec![]).unwrap();
        let row = &result.rows().unwrap()[0];
        assert_eq!(row.get("nation_code"), Some(&Value::Text("NGR".into())));
        assert_eq!(row.get("HOST_YEAR"), Some(&Value::Integer(2004)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_count_echoes_parameters() {
        let params = vec![Value::Integer(2001), Value::Text("NGR".into())];
        let result = normalize(RawResult::Count(1), params.clone()).unwrap();
        assert_eq!(result.count(), Some(1));
        assert_eq!(result.parameters(), Some(params.as_slice()));
        assert!(result.rows().is_none());
        assert!(result.is_empty());
    }

    #[test]
    fn test_row_width_mismatch_is_rejected() {
        let raw = RawResult::Rows {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![Value::Integer(1)]],
        };
        assert!(matches!(normalize(raw, vec![]), Err(DriverError::Statement(_))));
    }

    #[test]
    fn test_empty_select_is_rows_shape() {
        let raw = RawResult::Rows {
            columns: vec!["a".into()],
            rows: vec![],
        };
        let result = normalize(raw, vec![]).unwrap();
        assert_eq!(result, QueryResult::Rows(vec![]));
    }

    #[test]
    fn test_serialize_json() {
        let rows = normalize(game_rows(), vec![]).unwrap();
        assert_eq!(
            serde_json::to_string(&rows).unwrap(),
            r#"[{"host_year":2004,"nation_code":"NGR","medal":"A"},{"host_year":2008,"nation_code":"KOR","medal":null}]"#
        );

        let affected = normalize(RawResult::Count(1), vec![Value::Integer(7)]).unwrap();
        assert_eq!(
            serde_json::to_string(&affected).unwrap(),
            r#"{"count":1,"parameters":[7]}"#
        );
    }
}
