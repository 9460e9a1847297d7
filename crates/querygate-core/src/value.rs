//! Scalar cell values produced by the executor.

use std::fmt;

use serde::Serialize;

/// One cell of a result row.
///
/// Serializes to a plain JSON scalar: `null`, a number, a string, or a bool.
/// `Timestamp` carries an ISO-8601 rendering of the database value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Text form used in CSV output. NULL becomes an empty field.
    pub fn to_field(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "NULL"),
            Scalar::Integer(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) | Scalar::Timestamp(s) => write!(f, "{}", s),
            Scalar::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Integer(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_to_plain_json_scalars() {
        let cells = vec![
            Scalar::Null,
            Scalar::Integer(42),
            Scalar::Float(1.5),
            Scalar::Text("widget".to_string()),
            Scalar::Boolean(true),
            Scalar::Timestamp("2024-03-01T12:00:00".to_string()),
        ];
        let json = serde_json::to_string(&cells).unwrap();
        assert_eq!(
            json,
            r#"[null,42,1.5,"widget",true,"2024-03-01T12:00:00"]"#
        );
    }

    #[test]
    fn test_display_and_field() {
        assert_eq!(Scalar::Null.to_string(), "NULL");
        assert_eq!(Scalar::Null.to_field(), "");
        assert_eq!(Scalar::Float(2.25).to_string(), "2.25");
        assert_eq!(Scalar::Boolean(false).to_field(), "false");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Scalar::from(None::<i64>), Scalar::Null);
        assert_eq!(Scalar::from(Some(7_i64)), Scalar::Integer(7));
        assert!(Scalar::from(None::<String>).is_null());
    }
}
