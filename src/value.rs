//! Value types flowing through the extraction pipeline.
//!
//! A [`Value`] is classified exactly once, at the boundary where raw
//! extraction JSON enters the core. Downstream code branches on the
//! variant instead of re-sniffing loosely typed data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A row of structured data (one rent-roll unit, one unit type, ...).
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A value proposed for one field, or a whole row / list of rows for
/// row-oriented write targets.
///
/// # Examples
///
/// ```
/// use terrafact::Value;
///
/// let v = Value::from_json(&serde_json::json!(0.055));
/// assert!(v.is_scalar());
///
/// let row = Value::from_json(&serde_json::json!({"unit_number": "101"}));
/// assert!(row.is_row());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// A boolean flag.
    Bool(bool),
    /// A whole number.
    Int(i64),
    /// An exact decimal (money, rates, percentages).
    Number(Decimal),
    /// Free text.
    Text(String),
    /// A structured object representing a whole row.
    Row(Row),
    /// A list of whole rows.
    RowList(Vec<Row>),
    /// Explicitly absent.
    Null,
}

impl Value {
    /// Classifies raw extraction JSON into a tagged value.
    ///
    /// This is the single decision point: objects become [`Value::Row`],
    /// arrays of objects become [`Value::RowList`], everything else is a
    /// scalar. Arrays containing non-objects degrade to their JSON text.
    #[must_use]
    pub fn from_json(raw: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match raw {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Ok(d) = n.to_string().parse::<Decimal>() {
                    Self::Number(d)
                } else {
                    Self::Text(n.to_string())
                }
            }
            Json::String(s) => Self::Text(s.clone()),
            Json::Object(map) => Self::Row(map.clone()),
            Json::Array(items) => {
                let rows: Option<Vec<Row>> = items
                    .iter()
                    .map(|item| match item {
                        Json::Object(map) => Some(map.clone()),
                        _ => None,
                    })
                    .collect();
                match rows {
                    Some(rows) => Self::RowList(rows),
                    None => Self::Text(raw.to_string()),
                }
            }
        }
    }

    /// Returns true for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for [`Value::Row`].
    pub const fn is_row(&self) -> bool {
        matches!(self, Self::Row(_))
    }

    /// Returns true for [`Value::RowList`].
    pub const fn is_row_list(&self) -> bool {
        matches!(self, Self::RowList(_))
    }

    /// Returns true for any non-row, non-null variant.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int(_) | Self::Number(_) | Self::Text(_)
        )
    }

    /// The row, when this is a [`Value::Row`].
    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Self::Row(map) => Some(map),
            _ => None,
        }
    }

    /// The rows, when this is a [`Value::RowList`].
    pub fn as_row_list(&self) -> Option<&[Row]> {
        match self {
            Self::RowList(rows) => Some(rows),
            _ => None,
        }
    }

    /// The canonical string rendering used for fact literals and for
    /// degraded (string) storage of scalars.
    #[must_use]
    pub fn to_literal(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Number(d) => d.to_string(),
            Self::Text(s) => s.trim().to_string(),
            Self::Row(map) => serde_json::Value::Object(map.clone()).to_string(),
            Self::RowList(rows) => serde_json::Value::Array(
                rows.iter()
                    .map(|r| serde_json::Value::Object(r.clone()))
                    .collect(),
            )
            .to_string(),
            Self::Null => String::new(),
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::Row(_) => "row",
            Self::RowList(_) => "row_list",
            Self::Null => "null",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Row(map) => write!(f, "row[{} fields]", map.len()),
            Self::RowList(rows) => write!(f, "row_list[{}]", rows.len()),
            Self::Null => write!(f, "null"),
            other => write!(f, "{}", other.to_literal()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Value::from_json(&json!(true)), Value::Bool(true));
        assert_eq!(Value::from_json(&json!(42)), Value::Int(42));
        assert_eq!(Value::from_json(&json!("hi")), Value::Text("hi".into()));
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
    }

    #[test]
    fn test_from_json_float_is_decimal() {
        let v = Value::from_json(&json!(0.055));
        assert_eq!(v, Value::Number("0.055".parse().unwrap()));
    }

    #[test]
    fn test_from_json_object_is_row() {
        let v = Value::from_json(&json!({"unit_number": "101", "rent": 1500}));
        let row = v.as_row().unwrap();
        assert_eq!(row["unit_number"], "101");
    }

    #[test]
    fn test_from_json_array_of_objects_is_row_list() {
        let v = Value::from_json(&json!([{"a": 1}, {"a": 2}]));
        assert_eq!(v.as_row_list().unwrap().len(), 2);
    }

    #[test]
    fn test_from_json_mixed_array_degrades_to_text() {
        let v = Value::from_json(&json!([1, {"a": 1}]));
        assert!(matches!(v, Value::Text(_)));
    }

    #[test]
    fn test_to_literal() {
        assert_eq!(Value::Int(42).to_literal(), "42");
        assert_eq!(Value::Text("  x ".into()).to_literal(), "x");
        assert_eq!(Value::Bool(false).to_literal(), "false");
        assert_eq!(Value::Null.to_literal(), "");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Value::Int(7)), "7");
        let row = Value::from_json(&json!({"a": 1, "b": 2}));
        assert_eq!(format!("{row}"), "row[2 fields]");
    }

    #[test]
    fn test_serialization_round_trip() {
        let v = Value::Number("1234.56".parse().unwrap());
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
