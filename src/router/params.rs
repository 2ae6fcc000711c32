//! Route parameter types and per-request coercion.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type a handler declares for a path parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Int,
    Float,
}

/// Why a declared parameter type was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTypeRejection {
    /// `int|string` and friends: the coercion target would be ambiguous.
    Union,
    /// Anything other than string, int, or float.
    Unsupported,
}

impl ParamType {
    /// Parses a declared type name such as `"int"` or `"string"`.
    pub fn from_declaration(declared: &str) -> Result<Self, ParamTypeRejection> {
        let declared = declared.trim();
        if declared.contains('|') {
            return Err(ParamTypeRejection::Union);
        }
        match declared.to_ascii_lowercase().as_str() {
            "string" | "str" => Ok(Self::String),
            "int" | "integer" => Ok(Self::Int),
            "float" | "double" => Ok(Self::Float),
            _ => Err(ParamTypeRejection::Unsupported),
        }
    }

    /// Converts a raw path segment to this type.
    ///
    /// # Errors
    ///
    /// - [`RouteParamError::Missing`] for an empty segment.
    /// - [`RouteParamError::InvalidInt`] / [`RouteParamError::InvalidFloat`]
    ///   when the segment does not parse.
    pub fn coerce(self, name: &str, raw: &str) -> Result<ParamValue, RouteParamError> {
        if raw.is_empty() {
            return Err(RouteParamError::Missing {
                name: name.to_owned(),
            });
        }
        match self {
            Self::String => Ok(ParamValue::Str(raw.to_owned())),
            Self::Int => raw
                .parse::<i64>()
                .map(ParamValue::Int)
                .map_err(|_| RouteParamError::InvalidInt {
                    name: name.to_owned(),
                    value: raw.to_owned(),
                }),
            Self::Float => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(ParamValue::Float(v)),
                _ => Err(RouteParamError::InvalidFloat {
                    name: name.to_owned(),
                    value: raw.to_owned(),
                }),
            },
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
        })
    }
}

/// A coerced path parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Per-request parameter errors, rendered as `400 Bad Request`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteParamError {
    #[error("route parameter `{name}` is missing")]
    Missing { name: String },

    #[error("route parameter `{name}` must be an integer, got `{value}`")]
    InvalidInt { name: String, value: String },

    #[error("route parameter `{name}` must be a number, got `{value}`")]
    InvalidFloat { name: String, value: String },
}

/// Coerced path parameters in URL template order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteParams {
    values: Vec<(String, ParamValue)>,
}

impl RouteParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations() {
        assert_eq!(ParamType::from_declaration("int"), Ok(ParamType::Int));
        assert_eq!(ParamType::from_declaration(" String "), Ok(ParamType::String));
        assert_eq!(ParamType::from_declaration("float"), Ok(ParamType::Float));
        assert_eq!(
            ParamType::from_declaration("int|string"),
            Err(ParamTypeRejection::Union)
        );
        assert_eq!(
            ParamType::from_declaration("array"),
            Err(ParamTypeRejection::Unsupported)
        );
    }

    #[test]
    fn coercion() {
        assert_eq!(ParamType::Int.coerce("id", "42"), Ok(ParamValue::Int(42)));
        assert_eq!(ParamType::Int.coerce("id", "-7"), Ok(ParamValue::Int(-7)));
        assert_eq!(ParamType::Float.coerce("p", "2.5"), Ok(ParamValue::Float(2.5)));
        assert_eq!(
            ParamType::String.coerce("slug", "hello"),
            Ok(ParamValue::Str("hello".into()))
        );
    }

    #[test]
    fn coercion_failures_are_errors_not_defaults() {
        assert_eq!(
            ParamType::Int.coerce("id", "42abc"),
            Err(RouteParamError::InvalidInt {
                name: "id".into(),
                value: "42abc".into()
            })
        );
        assert!(matches!(
            ParamType::Float.coerce("p", "inf"),
            Err(RouteParamError::InvalidFloat { .. })
        ));
        assert_eq!(
            ParamType::String.coerce("slug", ""),
            Err(RouteParamError::Missing { name: "slug".into() })
        );
    }

    #[test]
    fn params_preserve_order_and_types() {
        let mut params = RouteParams::new();
        params.push("category", ParamValue::Str("books".into()));
        params.push("id", ParamValue::Int(9));
        let names: Vec<&str> = params.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["category", "id"]);
        assert_eq!(params.get_str("category"), Some("books"));
        assert_eq!(params.get_int("id"), Some(9));
        assert_eq!(params.get_int("category"), None);
        assert_eq!(params.get_float("missing"), None);
    }
}
