//! In-process [`EntityStore`] with staged writes.

use std::cmp::Ordering;
use std::sync::Mutex;

use serde_json::Value;

use super::{
    Criteria, Direction, Entity, EntityStore, OrderBy, RepositoryError, RepositoryResult,
};

enum Pending<E: Entity> {
    Persist(E),
    Remove(E::Id),
}

struct State<E: Entity> {
    rows: Vec<E>,
    pending: Vec<Pending<E>>,
}

/// Rows kept in insertion order; `persist` / `remove` are staged until
/// [`flush`](EntityStore::flush).
pub struct InMemoryStore<E: Entity> {
    state: Mutex<State<E>>,
}

impl<E: Entity> InMemoryStore<E> {
    pub fn new() -> Self {
        Self::with_rows(Vec::new())
    }

    /// A store already holding `rows` (as if persisted and flushed).
    pub fn with_rows(rows: Vec<E>) -> Self {
        Self {
            state: Mutex::new(State {
                rows,
                pending: Vec::new(),
            }),
        }
    }

    /// Number of flushed rows.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<E>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // Flushed rows matching `criteria`, sorted by `order_by`.
    fn select(&self, criteria: &Criteria, order_by: &OrderBy) -> RepositoryResult<Vec<E>> {
        let rows = self.lock().rows.clone();
        let mut selected = Vec::with_capacity(rows.len());
        for row in rows {
            let record = serde_json::to_value(&row).map_err(|source| {
                RepositoryError::Serialization {
                    entity: E::NAME,
                    source,
                }
            })?;
            if criteria.matches(&record) {
                selected.push((record, row));
            }
        }
        if !order_by.is_empty() {
            selected.sort_by(|(a, _), (b, _)| compare_records(a, b, order_by));
        }
        Ok(selected.into_iter().map(|(_, row)| row).collect())
    }
}

impl<E: Entity> Default for InMemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> EntityStore<E> for InMemoryStore<E> {
    fn find(&self, id: &E::Id) -> RepositoryResult<Option<E>> {
        Ok(self.lock().rows.iter().find(|row| row.id() == *id).cloned())
    }

    fn find_one_by(&self, criteria: &Criteria, order_by: &OrderBy) -> RepositoryResult<Option<E>> {
        Ok(self.select(criteria, order_by)?.into_iter().next())
    }

    fn find_by(
        &self,
        criteria: &Criteria,
        order_by: &OrderBy,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> RepositoryResult<Vec<E>> {
        Ok(self
            .select(criteria, order_by)?
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn find_all(&self) -> RepositoryResult<Vec<E>> {
        Ok(self.lock().rows.clone())
    }

    fn persist(&self, entity: E) -> RepositoryResult<()> {
        self.lock().pending.push(Pending::Persist(entity));
        Ok(())
    }

    fn remove(&self, id: &E::Id) -> RepositoryResult<()> {
        self.lock().pending.push(Pending::Remove(id.clone()));
        Ok(())
    }

    fn flush(&self) -> RepositoryResult<()> {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        for op in pending {
            match op {
                Pending::Persist(entity) => {
                    let id = entity.id();
                    match state.rows.iter().position(|row| row.id() == id) {
                        Some(index) => state.rows[index] = entity,
                        None => state.rows.push(entity),
                    }
                }
                Pending::Remove(id) => state.rows.retain(|row| row.id() != id),
            }
        }
        Ok(())
    }
}

fn compare_records(a: &Value, b: &Value, order_by: &OrderBy) -> Ordering {
    for (field, direction) in order_by.iter() {
        let ordering = compare_values(
            a.get(field).unwrap_or(&Value::Null),
            b.get(field).unwrap_or(&Value::Null),
        );
        let ordering = match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// Nulls sort first; values of different kinds compare equal.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        id: u32,
        title: String,
        year: u32,
        genre: Option<String>,
    }

    impl Entity for Book {
        const NAME: &'static str = "book";
        type Id = u32;

        fn id(&self) -> u32 {
            self.id
        }
    }

    fn book(id: u32, title: &str, year: u32, genre: Option<&str>) -> Book {
        Book {
            id,
            title: title.into(),
            year,
            genre: genre.map(Into::into),
        }
    }

    fn store() -> InMemoryStore<Book> {
        InMemoryStore::with_rows(vec![
            book(1, "Dune", 1965, Some("sf")),
            book(2, "Emma", 1815, None),
            book(3, "Hyperion", 1989, Some("sf")),
            book(4, "Ubik", 1969, Some("sf")),
        ])
    }

    #[test]
    fn writes_are_invisible_until_flush() {
        let store = store();
        store.persist(book(5, "Solaris", 1961, Some("sf"))).unwrap();
        store.remove(&1).unwrap();
        assert_eq!(store.len(), 4);
        assert!(store.find(&5).unwrap().is_none());

        store.flush().unwrap();
        assert_eq!(store.len(), 4);
        assert!(store.find(&1).unwrap().is_none());
        assert_eq!(store.find(&5).unwrap().unwrap().title, "Solaris");
    }

    #[test]
    fn persist_existing_id_replaces() {
        let store = store();
        store.persist(book(2, "Emma (2nd ed.)", 1816, None)).unwrap();
        store.flush().unwrap();
        assert_eq!(store.len(), 4);
        assert_eq!(store.find(&2).unwrap().unwrap().year, 1816);
    }

    #[test]
    fn find_by_filters_sorts_and_pages() {
        let store = store();
        let sf = Criteria::new().with("genre", "sf");
        let newest = OrderBy::new().desc("year");

        let ids: Vec<u32> = store
            .find_by(&sf, &newest, None, None)
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, [3, 4, 1]);

        let ids: Vec<u32> = store
            .find_by(&sf, &newest, Some(1), Some(1))
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, [4]);
    }

    #[test]
    fn find_one_by_respects_order() {
        let store = store();
        let oldest = store
            .find_one_by(&Criteria::new(), &OrderBy::new().asc("year"))
            .unwrap()
            .unwrap();
        assert_eq!(oldest.title, "Emma");

        let none = store
            .find_one_by(&Criteria::new().with("genre", "poetry"), &OrderBy::new())
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn null_criteria_matches_missing_values() {
        let store = store();
        let untagged = store
            .find_by(&Criteria::new().with("genre", Value::Null), &OrderBy::new(), None, None)
            .unwrap();
        assert_eq!(untagged, vec![book(2, "Emma", 1815, None)]);
    }
}
