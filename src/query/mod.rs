pub mod parameter_parser;
pub mod result;

pub use parameter_parser::ParameterParser;
pub use result::{normalize, QueryResult, Row};

use crate::types::Value;
use crate::{Result, SqlPoolError};

/// SQL text plus its positional parameters, checked before dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    sql: String,
    params: Vec<Value>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(SqlPoolError::InvalidParameter("empty SQL statement".to_string()));
        }

        let expected = ParameterParser::count_parameters(&sql);
        if expected != params.len() {
            return Err(SqlPoolError::InvalidParameter(format!(
                "statement binds {} parameters but {} were supplied",
                expected,
                params.len()
            )));
        }

        Ok(Self { sql, params })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn into_params(self) -> Vec<Value> {
        self.params
    }
}
