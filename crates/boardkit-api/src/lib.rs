use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod change;
pub mod error;
pub mod page;

pub use change::{ChangeEvent, ChangeOperation};
pub use error::ApiError;
pub use page::{PageAddress, PageParams, PageResult, Pagination, QueryKey, ViewKind};

/// A single backend row: column name to value.
pub type Row = HashMap<String, Value>;

/// Dynamic value for records coming from the backend
///
/// Rows arrive as JSON-like maps, so every column of every record can be
/// expressed with this type. Dates travel as RFC3339 (or `YYYY-MM-DD`) strings
/// and are parsed on demand with [`Value::as_datetime`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Null,
}

impl Value {
    /// Create a Value from a serde_json::Value
    pub fn from_json_value(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from_json_value).collect())
            }
            serde_json::Value::Object(obj) => Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_json_value(v)))
                    .collect(),
            ),
        }
    }

    /// Get string value, returning None if not a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Parse a string value as a UTC timestamp.
    ///
    /// Accepts full RFC3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let s = self.as_str()?;
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&chrono::Utc));
        }
        chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Value::String(dt.to_rfc3339())
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Identifier-like rendering used for ids and filter values.
    ///
    /// Strings are returned as is, integers are formatted, objects yield their
    /// `id` entry. Everything else has no key form.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Object(obj) => obj.get("id").and_then(Value::as_key),
            _ => None,
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::Integer(u as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(map: HashMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json_value(v)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => serde_json::Value::String(s),
            Value::Integer(i) => serde_json::Value::Number(serde_json::Number::from(i)),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(Into::into).collect())
            }
            Value::Object(obj) => {
                serde_json::Value::Object(obj.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Null => serde_json::Value::Null,
        }
    }
}

impl TryFrom<Value> for String {
    type Error = ApiError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ApiError::Decode {
                message: format!("expected a string, got {}", other.to_json_string()),
            }),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = ApiError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_i64().ok_or_else(|| ApiError::Decode {
            message: format!("expected an integer, got {}", value.to_json_string()),
        })
    }
}

/// Convert a row into a JSON object, e.g. for decoding into a typed record.
pub fn row_to_json(row: &Row) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
            .collect(),
    )
}

/// Convert a JSON object into a row. Non-objects yield an empty row.
pub fn json_to_row(value: serde_json::Value) -> Row {
    match value {
        serde_json::Value::Object(obj) => obj
            .into_iter()
            .map(|(k, v)| (k, Value::from_json_value(v)))
            .collect(),
        _ => Row::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let v = Value::Boolean(true);
        assert_eq!(v.as_bool(), Some(true));
        assert_eq!(v.as_i64(), None);

        let v = Value::Integer(42);
        assert_eq!(v.as_i64(), Some(42));
        assert_eq!(v.as_f64(), Some(42.0));
        assert_eq!(v.as_key(), Some("42".to_string()));

        let v = Value::String("hello".to_string());
        assert_eq!(v.as_str(), Some("hello"));

        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_value_as_datetime() {
        let v = Value::from("2024-03-05T10:00:00Z");
        let dt = v.as_datetime().unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-05T10:00:00+00:00");

        let v = Value::from("2024-03-05");
        assert_eq!(
            v.as_datetime().unwrap().date_naive().to_string(),
            "2024-03-05"
        );

        assert!(Value::from("not a date").as_datetime().is_none());
        assert!(Value::Integer(5).as_datetime().is_none());
    }

    #[test]
    fn test_object_key_uses_id() {
        let mut member = HashMap::new();
        member.insert("id".to_string(), Value::from("u-1"));
        member.insert("name".to_string(), Value::from("Ada"));
        assert_eq!(Value::Object(member).as_key(), Some("u-1".to_string()));
        assert_eq!(Value::Array(vec![]).as_key(), None);
    }

    #[test]
    fn test_value_from() {
        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);

        let v: Value = Some(42).into();
        assert_eq!(v, Value::Integer(42));

        let v: Value = vec!["a", "b"].into();
        assert_eq!(v, Value::Array(vec![Value::from("a"), Value::from("b")]));
    }

    #[test]
    fn test_row_json_conversion() {
        let json = serde_json::json!({
            "id": "7",
            "tags": [{"id": 1, "name": "urgent"}],
            "due_date": null,
        });
        let row = json_to_row(json.clone());
        assert_eq!(row.get("id"), Some(&Value::from("7")));
        assert_eq!(row.get("due_date"), Some(&Value::Null));
        assert_eq!(row_to_json(&row), json);
    }

    #[test]
    fn test_try_from_reports_decode_error() {
        let err = String::try_from(Value::Integer(3)).unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
        assert_eq!(i64::try_from(Value::Integer(3)).unwrap(), 3);
    }
}
