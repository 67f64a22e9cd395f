use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Date format used when a `Date` is rendered or bound as text
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single SQL value, used both for statement parameters and for row cells
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Parses a loosely typed literal: integers, `YYYY-MM-DD` dates and `null`
/// become typed values, anything else is text.
impl FromStr for Value {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("null") {
            return Ok(Value::Null);
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Value::Integer(i));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
            return Ok(Value::Date(d));
        }
        Ok(Value::Text(s.to_string()))
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.collect_str(&d.format(DATE_FORMAT)),
            Value::Blob(b) => serializer.serialize_bytes(b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        assert_eq!("42".parse::<Value>().unwrap(), Value::Integer(42));
        assert_eq!("NULL".parse::<Value>().unwrap(), Value::Null);
        assert_eq!(
            "2024-03-01".parse::<Value>().unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!("NGR".parse::<Value>().unwrap(), Value::Text("NGR".to_string()));
        assert_eq!(
            "test error string".parse::<Value>().unwrap(),
            Value::Text("test error string".to_string())
        );
    }

    #[test]
    fn test_display_matches_parameter_listing() {
        let params: Vec<Value> = vec![
            2001.into(),
            "NGR".into(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().into(),
            Option::<i64>::None.into(),
        ];
        let rendered: Vec<String> = params.iter().map(ToString::to_string).collect();
        assert_eq!(rendered.join(","), "2001,NGR,2024-03-01,NULL");
    }

    #[test]
    fn test_serialize_json() {
        let json = serde_json::to_string(&vec![
            Value::Integer(1),
            Value::Text("A".into()),
            Value::Null,
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        ])
        .unwrap();
        assert_eq!(json, r#"[1,"A",null,"2024-03-01"]"#);
    }
}
