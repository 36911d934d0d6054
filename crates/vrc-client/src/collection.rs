//! Versioned entity collections.
//!
//! A [`Collection`] is the single source of truth for one entity type. It
//! keeps records in arrival order and exposes two views over the same
//! storage:
//!
//! - **dense** access: [`count`](Collection::count) then
//!   [`at`](Collection::at) for indices `0..count`
//! - **cursor** access: [`first`](Collection::first) then repeated
//!   [`next`](Collection::next) until `None`
//!
//! Index order is stable between two reads iff [`version`](Collection::version)
//! did not change between them. Every add, remove, or field change bumps the
//! version exactly once per applied delta.

use std::collections::HashMap;

use vrc_core::error::Result;
use vrc_core::{EntityKind, Id};

/// A record whose fields are set from `key=value` pairs.
pub trait Fields: Clone + PartialEq {
    /// Keys applied before the rest of a delta, whatever their position.
    const LEADING: &'static [&'static str] = &[];

    /// Apply one field. Unknown keys are ignored; malformed values fail.
    fn apply_field(&mut self, key: &str, value: &str) -> Result<()>;
}

/// A server-owned record identified by an [`Id`].
pub trait Entity: Fields {
    /// The entity type, used for logging and events.
    const KIND: EntityKind;

    /// Create an empty record for a newly announced id.
    fn new(id: Id) -> Self;

    /// The record's identifier.
    fn id(&self) -> &Id;
}

/// Apply every field to a copy of `record`, committing only if all succeed.
///
/// Returns whether the committed record differs from the previous one.
pub(crate) fn apply_all<'a, T, I>(record: &mut T, fields: I) -> Result<bool>
where
    T: Fields,
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut updated = record.clone();
    let (leading, rest): (Vec<_>, Vec<_>) = fields
        .into_iter()
        .partition(|(key, _)| T::LEADING.iter().any(|leading| *leading == *key));
    for (key, value) in leading.into_iter().chain(rest) {
        updated.apply_field(key, value)?;
    }
    if updated == *record {
        Ok(false)
    } else {
        *record = updated;
        Ok(true)
    }
}

/// Ordered, versioned storage for one entity type.
#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    index: HashMap<Id, usize>,
    version: u32,
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Collection<T> {
    /// Create an empty collection at version 0.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            version: 0,
        }
    }

    /// The collection's change counter.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Number of records.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dense access. `at(count())` and beyond return `None`.
    pub fn at(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Identifier of the record at a dense index.
    pub fn id_at(&self, index: usize) -> Option<&Id> {
        self.at(index).map(Entity::id)
    }

    /// Dense index of a record.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Look up a record by id. Dangling ids return `None`.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.index_of(id).and_then(|i| self.items.get(i))
    }

    /// Whether a record with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Cursor access: the first id, or `None` when empty.
    pub fn first(&self) -> Option<&Id> {
        self.id_at(0)
    }

    /// Cursor access: the id after `prev`.
    ///
    /// Returns `None` when `prev` was the last id or is no longer present.
    pub fn next(&self, prev: &str) -> Option<&Id> {
        self.index_of(prev).and_then(|i| self.id_at(i + 1))
    }

    /// Iterate records in dense order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterate ids in dense order.
    pub fn ids(&self) -> impl Iterator<Item = &Id> {
        self.items.iter().map(Entity::id)
    }

    /// Create or update a record from `key=value` fields.
    ///
    /// All-or-nothing: if any field fails to parse the record is untouched.
    /// A new id is appended even when it carries no fields.
    pub(crate) fn upsert<'a, I>(&mut self, id: Id, fields: I) -> Result<bool>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        match self.index_of(id.as_str()) {
            Some(i) => {
                let changed = apply_all(&mut self.items[i], fields)?;
                if changed {
                    self.bump();
                }
                Ok(changed)
            }
            None => {
                let mut record = T::new(id.clone());
                apply_all(&mut record, fields)?;
                self.index.insert(id, self.items.len());
                self.items.push(record);
                self.bump();
                Ok(true)
            }
        }
    }

    /// Remove a record. Unknown ids are a no-op.
    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let Some(i) = self.index.remove(id) else {
            return false;
        };
        self.items.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        self.bump();
        true
    }

    /// Remove every record.
    pub(crate) fn clear(&mut self) -> bool {
        if self.items.is_empty() {
            return false;
        }
        self.items.clear();
        self.index.clear();
        self.bump();
        true
    }

    /// Bump the version without touching records (e.g. selection change).
    pub(crate) fn touch(&mut self) {
        self.bump();
    }

    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

impl<'a, T: Entity> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A versioned singleton record (session, headset, phone).
#[derive(Debug, Clone, Default)]
pub struct Singleton<T> {
    value: T,
    version: u32,
}

impl<T: Fields + Default> Singleton<T> {
    /// The current record.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// The record's change counter.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Apply fields all-or-nothing, bumping the version on change.
    pub(crate) fn apply<'a, I>(&mut self, fields: I) -> Result<bool>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let changed = apply_all(&mut self.value, fields)?;
        if changed {
            self.version = self.version.wrapping_add(1);
        }
        Ok(changed)
    }

    /// Reset to defaults, bumping the version if anything was set.
    pub(crate) fn reset(&mut self) -> bool {
        let blank = T::default();
        if self.value == blank {
            return false;
        }
        self.value = blank;
        self.version = self.version.wrapping_add(1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrc_core::protocol::parse_num;
    use vrc_core::Error;

    #[derive(Debug, Clone, PartialEq)]
    struct Widget {
        id: Id,
        name: String,
        size: u32,
    }

    impl Fields for Widget {
        fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
            match key {
                "name" => self.name = value.to_string(),
                "size" => self.size = parse_num(key, value)?,
                _ => {}
            }
            Ok(())
        }
    }

    impl Entity for Widget {
        const KIND: EntityKind = EntityKind::Playsound;

        fn new(id: Id) -> Self {
            Widget {
                id,
                name: String::new(),
                size: 0,
            }
        }

        fn id(&self) -> &Id {
            &self.id
        }
    }

    fn id(n: u8) -> Id {
        Id::parse(&format!("{:032}", n)).unwrap()
    }

    fn populated() -> Collection<Widget> {
        let mut c = Collection::new();
        for n in 1..=3 {
            c.upsert(id(n), [("name", "w")]).unwrap();
        }
        c
    }

    #[test]
    fn upsert_appends_and_bumps_once() {
        let mut c: Collection<Widget> = Collection::new();
        assert!(c.upsert(id(1), [("name", "a"), ("size", "3")]).unwrap());
        assert_eq!(c.version(), 1);
        assert_eq!(c.count(), 1);
        assert_eq!(c.at(0).unwrap().size, 3);
    }

    #[test]
    fn unchanged_update_keeps_version() {
        let mut c: Collection<Widget> = Collection::new();
        c.upsert(id(1), [("name", "a")]).unwrap();
        assert!(!c.upsert(id(1), [("name", "a")]).unwrap());
        assert_eq!(c.version(), 1);
    }

    #[test]
    fn malformed_field_is_all_or_nothing() {
        let mut c: Collection<Widget> = Collection::new();
        c.upsert(id(1), [("name", "a"), ("size", "1")]).unwrap();

        let err = c
            .upsert(id(1), [("name", "b"), ("size", "huge")])
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));

        let w = c.get(id(1).as_str()).unwrap();
        assert_eq!(w.name, "a");
        assert_eq!(w.size, 1);
        assert_eq!(c.version(), 1);

        // A malformed first delta never creates the record.
        assert!(c.upsert(id(2), [("size", "x")]).is_err());
        assert!(!c.contains(id(2).as_str()));
    }

    #[test]
    fn dense_and_cursor_views_agree() {
        let c = populated();
        let dense: Vec<&Id> = (0..c.count()).filter_map(|i| c.id_at(i)).collect();

        let mut cursor = Vec::new();
        let mut next = c.first();
        while let Some(id) = next {
            cursor.push(id);
            next = c.next(id.as_str());
        }

        assert_eq!(dense, cursor);
        assert_eq!(dense.len(), 3);
    }

    #[test]
    fn one_past_last_is_none() {
        let c = populated();
        assert!(c.at(c.count()).is_none());
        assert!(c.id_at(c.count()).is_none());
        assert!(c.next(id(3).as_str()).is_none());
    }

    #[test]
    fn remove_preserves_order_and_index() {
        let mut c = populated();
        let before = c.version();
        assert!(c.remove(id(2).as_str()));
        assert_eq!(c.version(), before + 1);
        assert_eq!(c.id_at(0), Some(&id(1)));
        assert_eq!(c.id_at(1), Some(&id(3)));
        assert_eq!(c.index_of(id(3).as_str()), Some(1));
        assert_eq!(c.next(id(1).as_str()), Some(&id(3)));

        // Unknown id: no-op, no bump.
        assert!(!c.remove(id(9).as_str()));
        assert_eq!(c.version(), before + 1);
    }

    #[test]
    fn clear_bumps_only_when_non_empty() {
        let mut c = populated();
        let v = c.version();
        assert!(c.clear());
        assert_eq!(c.version(), v + 1);
        assert!(!c.clear());
        assert_eq!(c.version(), v + 1);
        assert!(c.first().is_none());
    }

    #[test]
    fn dangling_lookups_return_none() {
        let c = populated();
        assert!(c.get("nope").is_none());
        assert!(c.next("nope").is_none());
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Knob {
        level: u32,
    }

    impl Fields for Knob {
        fn apply_field(&mut self, key: &str, value: &str) -> Result<()> {
            if key == "level" {
                self.level = parse_num(key, value)?;
            }
            Ok(())
        }
    }

    #[test]
    fn singleton_versioning() {
        let mut s: Singleton<Knob> = Singleton::default();
        assert!(s.apply([("level", "4")]).unwrap());
        assert!(!s.apply([("level", "4")]).unwrap());
        assert!(s.apply([("level", "x")]).is_err());
        assert_eq!(s.get().level, 4);
        assert_eq!(s.version(), 1);
        assert!(s.reset());
        assert_eq!(s.version(), 2);
        assert!(!s.reset());
    }
}
