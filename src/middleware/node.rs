//! Declarative middleware trees.
//!
//! A route's gate is a [`MiddlewareNode`]: a single middleware reference or
//! an `All` / `Any` / `Custom` combinator over further nodes. Trees are built
//! either in code (`MiddlewareNode::all([...])`) or parsed from a JSON
//! declaration with [`MiddlewareNode::from_declaration`]:
//!
//! | Declaration                          | Node                         |
//! |--------------------------------------|------------------------------|
//! | `"auth"`                             | `All([Single(auth)])`        |
//! | `["auth", "admin"]`                  | `All([auth, admin])`         |
//! | `{"any": ["admin", "owner"]}`        | `Any([admin, owner])`        |
//! | `{"all": ["auth"], "any": [...]}`    | `Custom { all, any }`        |
//!
//! A bare reference or bare list at the top level is an implicit `All`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MiddlewareError;

/// Stable identifier a middleware is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MiddlewareId(String);

impl MiddlewareId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MiddlewareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MiddlewareId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MiddlewareId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Which list a validation error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    All,
    Any,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ListKind::All => "All",
            ListKind::Any => "Any",
        })
    }
}

/// A middleware gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareNode {
    Single(MiddlewareId),
    /// Every child must pass; the first non-pass result is returned.
    All(Vec<MiddlewareNode>),
    /// One child must pass; if none does, the last child's result is returned.
    Any(Vec<MiddlewareNode>),
    /// `all` runs first and must pass before `any` runs.
    Custom {
        all: Option<Vec<MiddlewareNode>>,
        any: Option<Vec<MiddlewareNode>>,
    },
}

impl MiddlewareNode {
    pub fn single(id: impl Into<MiddlewareId>) -> Self {
        Self::Single(id.into())
    }

    pub fn all<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<MiddlewareNode>,
    {
        Self::All(children.into_iter().map(Into::into).collect())
    }

    pub fn any<I>(children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<MiddlewareNode>,
    {
        Self::Any(children.into_iter().map(Into::into).collect())
    }

    /// A node combinator passed for the matching branch contributes its
    /// children; anything else stays nested as a single entry.
    pub fn custom(all: Option<MiddlewareNode>, any: Option<MiddlewareNode>) -> Self {
        Self::Custom {
            all: all.map(|node| match node {
                MiddlewareNode::All(children) => children,
                other => vec![other],
            }),
            any: any.map(|node| match node {
                MiddlewareNode::Any(children) => children,
                other => vec![other],
            }),
        }
    }

    /// Parses a JSON middleware declaration.
    ///
    /// # Errors
    ///
    /// Any shape violation is reported as a configuration error; see
    /// [`MiddlewareError`] for the individual kinds.
    pub fn from_declaration(value: &Value) -> Result<Self, MiddlewareError> {
        let node = match value {
            Value::String(id) => Self::All(vec![Self::single(id.as_str())]),
            Value::Array(items) => Self::All(parse_list(ListKind::All, items)?),
            Value::Object(_) => parse_object(value)?,
            other => {
                return Err(MiddlewareError::InvalidShape {
                    found: json_kind(other),
                });
            }
        };
        node.validate()?;
        Ok(node)
    }

    /// Checks list non-emptiness and uniqueness throughout the tree.
    pub fn validate(&self) -> Result<(), MiddlewareError> {
        match self {
            Self::Single(_) => Ok(()),
            Self::All(children) => validate_list(ListKind::All, children),
            Self::Any(children) => validate_list(ListKind::Any, children),
            Self::Custom { all: None, any: None } => Err(MiddlewareError::EmptyCustom),
            Self::Custom { all, any } => {
                if let Some(children) = all {
                    validate_list(ListKind::All, children)?;
                }
                if let Some(children) = any {
                    validate_list(ListKind::Any, children)?;
                }
                Ok(())
            }
        }
    }

    /// Every middleware id referenced anywhere in the tree, depth first.
    pub fn references(&self) -> Vec<&MiddlewareId> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a MiddlewareId>) {
        match self {
            Self::Single(id) => out.push(id),
            Self::All(children) | Self::Any(children) => {
                children.iter().for_each(|c| c.collect_references(out));
            }
            Self::Custom { all, any } => {
                for children in [all, any].into_iter().flatten() {
                    children.iter().for_each(|c| c.collect_references(out));
                }
            }
        }
    }
}

impl From<&str> for MiddlewareNode {
    fn from(id: &str) -> Self {
        Self::single(id)
    }
}

impl From<MiddlewareId> for MiddlewareNode {
    fn from(id: MiddlewareId) -> Self {
        Self::Single(id)
    }
}

fn validate_list(kind: ListKind, children: &[MiddlewareNode]) -> Result<(), MiddlewareError> {
    if children.is_empty() {
        return Err(MiddlewareError::EmptyList { kind });
    }
    for (i, child) in children.iter().enumerate() {
        if children[..i].contains(child) {
            return Err(MiddlewareError::DuplicateEntry {
                kind,
                entry: describe(child),
            });
        }
        child.validate()?;
    }
    Ok(())
}

fn parse_list(kind: ListKind, items: &[Value]) -> Result<Vec<MiddlewareNode>, MiddlewareError> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(id) => Ok(MiddlewareNode::single(id.as_str())),
            Value::Object(_) => parse_object(item),
            other => Err(MiddlewareError::NonStringEntry {
                kind,
                index,
                found: other.to_string(),
            }),
        })
        .collect()
}

fn parse_object(value: &Value) -> Result<MiddlewareNode, MiddlewareError> {
    let Value::Object(map) = value else {
        return Err(MiddlewareError::InvalidShape {
            found: json_kind(value),
        });
    };

    if let Some(key) = map.keys().find(|k| *k != "all" && *k != "any") {
        return Err(MiddlewareError::InvalidCustomKey { key: key.clone() });
    }

    let branch = |key: &str, kind: ListKind| -> Result<Option<Vec<MiddlewareNode>>, MiddlewareError> {
        match map.get(key) {
            None => Ok(None),
            Some(Value::Array(items)) => parse_list(kind, items).map(Some),
            Some(Value::String(id)) => Ok(Some(vec![MiddlewareNode::single(id.as_str())])),
            Some(other) => Err(MiddlewareError::InvalidShape {
                found: json_kind(other),
            }),
        }
    };

    match (branch("all", ListKind::All)?, branch("any", ListKind::Any)?) {
        (None, None) => Err(MiddlewareError::EmptyCustom),
        (Some(all), None) => Ok(MiddlewareNode::All(all)),
        (None, Some(any)) => Ok(MiddlewareNode::Any(any)),
        (all, any) => Ok(MiddlewareNode::Custom { all, any }),
    }
}

fn describe(node: &MiddlewareNode) -> String {
    match node {
        MiddlewareNode::Single(id) => id.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn parse(value: Value) -> Result<MiddlewareNode, MiddlewareError> {
        MiddlewareNode::from_declaration(&value)
    }

    // ── accepted shapes ───────────────────────────────────────────────────────

    #[test]
    fn bare_reference_is_implicit_all() {
        assert_eq!(
            parse(json!("auth")).unwrap(),
            MiddlewareNode::all(["auth"])
        );
    }

    #[test]
    fn bare_list_is_implicit_all() {
        assert_eq!(
            parse(json!(["auth", "admin"])).unwrap(),
            MiddlewareNode::all(["auth", "admin"])
        );
    }

    #[test]
    fn single_keyed_objects_become_combinators() {
        assert_eq!(
            parse(json!({"any": ["admin", "owner"]})).unwrap(),
            MiddlewareNode::any(["admin", "owner"])
        );
        assert_eq!(
            parse(json!({"all": ["auth"]})).unwrap(),
            MiddlewareNode::all(["auth"])
        );
    }

    #[test]
    fn both_keys_make_custom() {
        let node = parse(json!({"all": ["auth"], "any": ["admin", {"all": ["owner", "verified"]}]}))
            .unwrap();
        assert_eq!(
            node,
            MiddlewareNode::Custom {
                all: Some(vec![MiddlewareNode::single("auth")]),
                any: Some(vec![
                    MiddlewareNode::single("admin"),
                    MiddlewareNode::all(["owner", "verified"]),
                ]),
            }
        );
        let ids: Vec<&str> = node.references().iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["auth", "admin", "owner", "verified"]);
    }

    // ── rejected shapes ───────────────────────────────────────────────────────

    #[test]
    fn empty_list_is_rejected() {
        let err = parse(json!([])).unwrap_err();
        assert_eq!(err.to_string(), "middleware list `All` must not be empty");

        let err = parse(json!({"any": []})).unwrap_err();
        assert_eq!(err.to_string(), "middleware list `Any` must not be empty");
    }

    #[test]
    fn duplicate_entry_is_rejected() {
        let err = parse(json!({"any": ["admin", "owner", "admin"]})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "middleware list `Any` contains duplicate entry `admin`"
        );
    }

    #[test]
    fn non_string_entry_is_rejected() {
        let err = parse(json!(["auth", 42])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "middleware list `All` has a non-string entry at index 1: 42"
        );
        assert!(matches!(
            parse(json!(["auth", ["nested"]])),
            Err(MiddlewareError::NonStringEntry { index: 1, .. })
        ));
    }

    #[test]
    fn unknown_custom_key_is_rejected() {
        let err = parse(json!({"all": ["auth"], "every": ["x"]})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "custom middleware branches must be keyed `all` or `any`, found `every`"
        );
    }

    #[test]
    fn empty_custom_is_rejected() {
        assert!(matches!(parse(json!({})), Err(MiddlewareError::EmptyCustom)));
        assert!(matches!(
            MiddlewareNode::Custom { all: None, any: None }.validate(),
            Err(MiddlewareError::EmptyCustom)
        ));
    }

    #[test]
    fn scalar_declaration_is_rejected() {
        assert!(matches!(
            parse(json!(true)),
            Err(MiddlewareError::InvalidShape { found: "a boolean" })
        ));
    }

    #[test]
    fn nested_lists_are_validated() {
        let node = MiddlewareNode::all([
            MiddlewareNode::single("auth"),
            MiddlewareNode::any(Vec::<MiddlewareNode>::new()),
        ]);
        assert!(matches!(
            node.validate(),
            Err(MiddlewareError::EmptyList { kind: ListKind::Any })
        ));
    }

    #[test]
    fn custom_builder_unwraps_combinator_branches() {
        let node = MiddlewareNode::custom(
            Some(MiddlewareNode::all(["auth"])),
            Some(MiddlewareNode::any(["admin", "owner"])),
        );
        assert_eq!(
            node,
            MiddlewareNode::Custom {
                all: Some(vec![MiddlewareNode::single("auth")]),
                any: Some(vec![
                    MiddlewareNode::single("admin"),
                    MiddlewareNode::single("owner")
                ]),
            }
        );
    }

    #[test]
    fn custom_builder_nests_mismatched_combinators() {
        let node = MiddlewareNode::custom(
            Some(MiddlewareNode::any(["admin", "owner"])),
            Some(MiddlewareNode::all(["auth", "csrf"])),
        );
        assert_eq!(
            node,
            MiddlewareNode::Custom {
                all: Some(vec![MiddlewareNode::any(["admin", "owner"])]),
                any: Some(vec![MiddlewareNode::all(["auth", "csrf"])]),
            }
        );
    }

    #[test]
    fn serde_round_trip_preserves_tree() {
        let node = MiddlewareNode::custom(
            Some(MiddlewareNode::single("auth")),
            Some(MiddlewareNode::any(["admin", "owner"])),
        );
        let json = serde_json::to_string(&node).unwrap();
        let back: MiddlewareNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }
}
