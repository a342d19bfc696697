use std::{
    any::{type_name, TypeId},
    hash::Hash,
};

use anyhow::{ensure, Result};
use bimap::{BiMap, Overwritten};

/// A one-to-one association kept in both directions.
///
/// Keys and values must be distinct types, so that a lookup is never
/// ambiguous about which side it addresses.
#[derive(Debug, Clone)]
pub struct DualMap<K, V>
where
    K: Eq + Hash,
    V: Eq + Hash,
{
    inner: BiMap<K, V>,
}

/// Pairs removed by an insert because they conflicted with the new pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Displaced<K, V> {
    /// The pair that previously held the inserted key.
    pub by_key: Option<(K, V)>,
    /// The pair that previously held the inserted value.
    pub by_value: Option<(K, V)>,
}

impl<K, V> From<Overwritten<K, V>> for Displaced<K, V> {
    fn from(overwritten: Overwritten<K, V>) -> Self {
        let (by_key, by_value) = match overwritten {
            Overwritten::Neither => (None, None),
            Overwritten::Left(k, v) | Overwritten::Pair(k, v) => (Some((k, v)), None),
            Overwritten::Right(k, v) => (None, Some((k, v))),
            Overwritten::Both(by_key, by_value) => (Some(by_key), Some(by_value)),
        };
        Self { by_key, by_value }
    }
}

impl<K, V> DualMap<K, V>
where
    K: Eq + Hash + 'static,
    V: Eq + Hash + 'static,
{
    pub fn new() -> Result<Self> {
        ensure!(
            TypeId::of::<K>() != TypeId::of::<V>(),
            "DualMap key and value types must differ (both are {})",
            type_name::<K>()
        );
        Ok(Self { inner: BiMap::new() })
    }

    /// Associates `key` with `value`, removing any pair that held either one.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) -> Displaced<K, V> {
        self.inner.insert(key, value).into()
    }

    #[inline]
    pub fn get_by_key(&self, key: &K) -> Option<&V> { self.inner.get_by_left(key) }

    #[inline]
    pub fn get_by_value(&self, value: &V) -> Option<&K> { self.inner.get_by_right(value) }

    #[inline]
    pub fn len(&self) -> usize { self.inner.len() }

    /// Iterates over the key → value direction, in no particular order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ { self.inner.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_synchronized(map: &DualMap<u32, String>) {
        assert_eq!(map.iter().count(), map.len());
        for (k, v) in map.iter() {
            assert_eq!(map.get_by_key(k), Some(v));
            assert_eq!(map.get_by_value(v), Some(k));
        }
    }

    #[test]
    fn test_rejects_same_types() {
        assert!(DualMap::<String, String>::new().is_err());
        assert!(DualMap::<u32, u32>::new().is_err());
        assert!(DualMap::<u32, String>::new().is_ok());
    }

    #[test]
    fn test_lookup_both_directions() {
        let mut map = DualMap::<u32, String>::new().unwrap();
        assert_eq!(map.insert(0x1000, "Foo".to_string()), Displaced { by_key: None, by_value: None });
        map.insert(0x2000, "Bar".to_string());
        assert_eq!(map.get_by_key(&0x1000).map(String::as_str), Some("Foo"));
        assert_eq!(map.get_by_value(&"Bar".to_string()), Some(&0x2000));
        assert_eq!(map.get_by_key(&0x3000), None);
        assert_eq!(map.len(), 2);
        assert_synchronized(&map);
    }

    #[test]
    fn test_insert_displaces_conflicts() {
        let mut map = DualMap::<u32, String>::new().unwrap();
        map.insert(1, "a".to_string());
        map.insert(2, "b".to_string());

        // Key 1 moves to "b": both (1, "a") and (2, "b") go away.
        let displaced = map.insert(1, "b".to_string());
        assert_eq!(displaced.by_key, Some((1, "a".to_string())));
        assert_eq!(displaced.by_value, Some((2, "b".to_string())));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get_by_key(&2), None);
        assert_eq!(map.get_by_value(&"a".to_string()), None);
        assert_synchronized(&map);
    }

    #[test]
    fn test_reinsert_reports_one_side() {
        let mut map = DualMap::<u32, String>::new().unwrap();
        map.insert(1, "a".to_string());
        let displaced = map.insert(1, "a".to_string());
        assert_eq!(displaced, Displaced { by_key: Some((1, "a".to_string())), by_value: None });

        // Only the value is taken: the old key loses its name.
        let displaced = map.insert(2, "a".to_string());
        assert_eq!(displaced, Displaced { by_key: None, by_value: Some((1, "a".to_string())) });
        assert_eq!(map.get_by_key(&1), None);
        assert_eq!(map.get_by_value(&"a".to_string()), Some(&2));
        assert_eq!(map.len(), 1);
        assert_synchronized(&map);
    }
}
