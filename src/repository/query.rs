//! Query shapes and the cache keys derived from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field equality filters.
///
/// Fields are kept sorted, so two criteria built in different orders
/// produce the same cache key. An array value matches any of its elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Criteria(BTreeMap<String, Value>);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the serialized entity `record` satisfies every filter.
    pub fn matches(&self, record: &Value) -> bool {
        self.0.iter().all(|(field, expected)| {
            let actual = record.get(field).unwrap_or(&Value::Null);
            match expected {
                Value::Array(options) => options.contains(actual),
                _ => actual == expected,
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

/// Sort fields in priority order.
///
/// Unlike [`Criteria`], order is significant and kept as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderBy(Vec<(String, Direction)>);

impl OrderBy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.0.push((field.into(), Direction::Asc));
        self
    }

    #[must_use]
    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.0.push((field.into(), Direction::Desc));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Direction)> {
        self.0.iter().map(|(f, d)| (f.as_str(), *d))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Which repository operation a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    One,
    All,
    OneBy,
    AllBy,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::One => "one",
            Self::All => "all",
            Self::OneBy => "oneBy",
            Self::AllBy => "allBy",
        }
    }
}

/// Deterministic cache key for a repository query.
///
/// # Examples
///
/// ```rust
/// use routegate::repository::{Criteria, OrderBy, RepositoryQueryKey};
///
/// let a = Criteria::new().with("role", "admin").with("active", true);
/// let b = Criteria::new().with("active", true).with("role", "admin");
/// let order = OrderBy::new().desc("created");
///
/// let key = RepositoryQueryKey::all_by("user", &a, &order, Some(10), None);
/// assert_eq!(key, RepositoryQueryKey::all_by("user", &b, &order, Some(10), None));
/// assert_eq!(
///     key.as_str(),
///     r#"repo:user:allBy:{"active":true,"role":"admin"}:[["created","DESC"]]:10:-"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryQueryKey {
    kind: QueryKind,
    key: String,
}

impl RepositoryQueryKey {
    pub fn one(entity: &str, id: &impl fmt::Display) -> Self {
        Self::build(QueryKind::One, entity, &[id.to_string()])
    }

    pub fn all(entity: &str) -> Self {
        Self::build(QueryKind::All, entity, &[])
    }

    pub fn one_by(entity: &str, criteria: &Criteria, order_by: &OrderBy) -> Self {
        Self::build(
            QueryKind::OneBy,
            entity,
            &[encode(criteria), encode(order_by)],
        )
    }

    pub fn all_by(
        entity: &str,
        criteria: &Criteria,
        order_by: &OrderBy,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Self {
        Self::build(
            QueryKind::AllBy,
            entity,
            &[
                encode(criteria),
                encode(order_by),
                bound(limit),
                bound(offset),
            ],
        )
    }

    /// Pattern matching every key of `entity`.
    pub fn entity_pattern(entity: &str) -> String {
        format!("repo:{entity}:*")
    }

    fn build(kind: QueryKind, entity: &str, parts: &[String]) -> Self {
        let mut key = format!("repo:{entity}:{}", kind.as_str());
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        Self { kind, key }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for RepositoryQueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

// Maps and vectors of strings and JSON values always serialize.
fn encode<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn bound(value: Option<usize>) -> String {
    value.map_or_else(|| "-".to_owned(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn keys_per_kind() {
        assert_eq!(RepositoryQueryKey::one("user", &7).as_str(), "repo:user:one:7");
        assert_eq!(RepositoryQueryKey::all("user").as_str(), "repo:user:all");
        let key = RepositoryQueryKey::one_by(
            "user",
            &Criteria::new().with("email", "a@b.c"),
            &OrderBy::new(),
        );
        assert_eq!(key.as_str(), r#"repo:user:oneBy:{"email":"a@b.c"}:[]"#);
        assert_eq!(key.kind(), QueryKind::OneBy);
    }

    #[test]
    fn keys_deduplicate_in_hash_sets() {
        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(RepositoryQueryKey::one("user", &7)));
        assert!(!seen.insert(RepositoryQueryKey::one("user", &7)));
        assert!(seen.insert(RepositoryQueryKey::all("user")));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn order_by_sequence_changes_the_key() {
        let criteria = Criteria::new();
        let a = OrderBy::new().asc("name").desc("age");
        let b = OrderBy::new().desc("age").asc("name");
        assert_ne!(
            RepositoryQueryKey::all_by("user", &criteria, &a, None, None),
            RepositoryQueryKey::all_by("user", &criteria, &b, None, None)
        );
    }

    #[test]
    fn limit_and_offset_are_part_of_the_key() {
        let c = Criteria::new();
        let o = OrderBy::new();
        let first = RepositoryQueryKey::all_by("user", &c, &o, Some(10), Some(0));
        let second = RepositoryQueryKey::all_by("user", &c, &o, Some(10), Some(10));
        assert_ne!(first, second);
        assert!(second.as_str().ends_with(":10:10"));
    }

    #[test]
    fn nested_values_are_canonical() {
        let a = Criteria::new().with("meta", json!({"b": 1, "a": 2}));
        let b = Criteria::new().with("meta", json!({"a": 2, "b": 1}));
        assert_eq!(
            RepositoryQueryKey::one_by("doc", &a, &OrderBy::new()),
            RepositoryQueryKey::one_by("doc", &b, &OrderBy::new())
        );
    }

    #[test]
    fn criteria_matching() {
        let record = json!({"id": 1, "role": "admin", "active": true});
        assert!(Criteria::new().matches(&record));
        assert!(Criteria::new().with("role", "admin").matches(&record));
        assert!(!Criteria::new().with("role", "user").matches(&record));
        assert!(
            Criteria::new()
                .with("role", json!(["user", "admin"]))
                .matches(&record)
        );
        assert!(Criteria::new().with("deleted_at", Value::Null).matches(&record));
    }
}
