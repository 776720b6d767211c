use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{SchemaError, SchemaResult};

/// Whether a field must carry a value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Required,
    #[default]
    Optional,
}

/// The outcome of loading one field.
///
/// Together with the field's [`Presence`] this gives the three legal states
/// of a loaded field: required-and-present, optional-and-present, and
/// optional-and-absent. A required field that loads as `Absent` invalidates
/// its parent.
#[derive(Clone, Debug, PartialEq)]
pub enum Loaded {
    /// The sentinel says the field was set; this is its value (possibly an
    /// empty collection).
    Present(Value),
    /// The field was never set, was deleted, or has expired.
    Absent,
}

impl Loaded {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }

    pub fn into_option(self) -> Option<Value> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }
}

impl From<Option<Value>> for Loaded {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }
}

/// Treat JSON `null` the same as a missing value.
pub(crate) fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Short name of a JSON value's kind, used in type-mismatch errors.
pub fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn is_finite(number: &Number) -> bool {
    number.as_f64().is_some_and(f64::is_finite)
}

/// Decimal representation written to the store. Floats keep their
/// fractional part (`2.0`), so they load back as floats.
pub(crate) fn encode_number(number: &Number) -> String {
    number.to_string()
}

pub(crate) fn decode_number(key: &str, raw: &str) -> SchemaResult<Value> {
    if let Ok(int) = raw.parse::<i64>() {
        return Ok(Value::from(int));
    }
    if let Ok(uint) = raw.parse::<u64>() {
        return Ok(Value::from(uint));
    }
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| SchemaError::Corrupt {
            key: key.to_string(),
            reason: format!("not a finite number: {raw:?}"),
        })
}

pub(crate) fn decode_count(key: &str, raw: &str) -> SchemaResult<u64> {
    raw.parse::<u64>().map_err(|_| SchemaError::Corrupt {
        key: key.to_string(),
        reason: format!("not a collection size: {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_counts_as_absent() {
        assert!(present(Some(&Value::Null)).is_none());
        assert!(present(None).is_none());
        assert_eq!(present(Some(&json!(0))), Some(&json!(0)));
    }

    #[test]
    fn numbers_keep_their_representation() {
        let float = json!(2.0);
        let encoded = encode_number(float.as_number().unwrap());
        assert_eq!(encoded, "2.0");
        assert_eq!(decode_number("k", &encoded).unwrap(), float);

        assert_eq!(decode_number("k", "-7").unwrap(), json!(-7));
        assert_eq!(decode_number("k", "18446744073709551615").unwrap(), json!(u64::MAX));
        assert_eq!(decode_number("k", "0.25").unwrap(), json!(0.25));
    }

    #[test]
    fn non_numeric_is_corrupt() {
        let err = decode_number("k", "abc").unwrap_err();
        assert!(matches!(err, SchemaError::Corrupt { .. }));
        assert!(decode_number("k", "inf").is_err());
        assert!(decode_count("k", "-1").is_err());
        assert_eq!(decode_count("k", "3").unwrap(), 3);
    }

    #[test]
    fn loaded_conversions() {
        assert_eq!(Loaded::from(None), Loaded::Absent);
        let loaded = Loaded::from(Some(json!("x")));
        assert!(loaded.is_present());
        assert_eq!(loaded.as_value(), Some(&json!("x")));
        assert_eq!(loaded.into_option(), Some(json!("x")));
    }

    #[test]
    fn kind_names() {
        assert_eq!(kind_name(&json!(null)), "null");
        assert_eq!(kind_name(&json!([1])), "array");
        assert_eq!(kind_name(&json!({})), "object");
    }
}
