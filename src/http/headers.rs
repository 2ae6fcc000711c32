//! Ordered header list with case-insensitive name lookup.

use std::fmt;

/// A case-insensitive, multi-value HTTP header list.
///
/// Insertion order is preserved so responses serialize headers in the order
/// the dispatch layer added them.
///
/// # Examples
///
/// ```
/// use routegate::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Set-Cookie", "a=1");
/// headers.append("Set-Cookie", "b=2");
/// headers.set("Location", "/login");
/// headers.set("location", "/access-denied");
///
/// assert_eq!(headers.get("LOCATION"), Some("/access-denied"));
/// assert_eq!(headers.get_all("set-cookie").count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Adds a value, keeping any existing values for the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces every value stored under `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes every entry named `name`, returning `true` if any existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.append("Authorization", "Bearer abc");
        assert_eq!(h.get("authorization"), Some("Bearer abc"));
        assert!(h.contains("AUTHORIZATION"));
        assert!(!h.contains("x-missing"));
    }

    #[test]
    fn value_outlives_the_lookup_name() {
        let mut h = Headers::new();
        h.append("Content-Length", "12");
        let value = {
            let name = String::from("content-length");
            h.get(&name)
        };
        assert_eq!(value, Some("12"));
    }

    #[test]
    fn set_replaces_all_previous_values() {
        let mut h = Headers::new();
        h.append("X-Trace", "1");
        h.append("x-trace", "2");
        h.set("X-Trace", "3");
        assert_eq!(h.get_all("x-trace").collect::<Vec<_>>(), vec!["3"]);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn display_renders_wire_format_in_order() {
        let mut h = Headers::new();
        h.append("A", "1");
        h.append("B", "2");
        assert_eq!(h.to_string(), "A: 1\r\nB: 2\r\n");
    }
}
