//! Canonical route values and fingerprint-keyed route collections
//!
//! Every set operation the reconciler performs on routes goes through the
//! fingerprint `"<table>#<destination>#<gateway>"`. Two entries are the same
//! route exactly when their fingerprints match.

use std::collections::BTreeMap;
use std::fmt;

use crate::crd::Route;

/// A single route in a specific kernel table
#[derive(Clone, Debug, Default)]
pub struct RouteEntry {
    pub destination: String,
    pub gateway: String,
    pub table: i64,
}

impl RouteEntry {
    pub fn new(destination: impl Into<String>, gateway: impl Into<String>, table: i64) -> Self {
        Self {
            destination: destination.into(),
            gateway: gateway.into(),
            table,
        }
    }

    /// Build an entry from an NRT spec route and the NRT's table id
    pub fn from_route(route: &Route, table: i64) -> Self {
        Self::new(route.destination.clone(), route.gateway.clone(), table)
    }

    pub fn fingerprint(&self) -> String {
        format!("{}#{}#{}", self.table, self.destination, self.gateway)
    }
}

impl PartialEq for RouteEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for RouteEntry {}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} table {}",
            self.destination, self.gateway, self.table
        )
    }
}

/// Routes keyed by fingerprint, iterated in fingerprint order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteEntryMap {
    entries: BTreeMap<String, RouteEntry>,
}

impl RouteEntryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; an entry with the same fingerprint is overwritten
    pub fn append_entry(&mut self, entry: RouteEntry) {
        self.entries.insert(entry.fingerprint(), entry);
    }

    pub fn append_route(&mut self, route: &Route, table: i64) {
        self.append_entry(RouteEntry::from_route(route, table));
    }

    /// Collect the routes of one NRT, all in the same table
    pub fn from_routes<'a>(routes: impl IntoIterator<Item = &'a Route>, table: i64) -> Self {
        let mut map = Self::new();
        for route in routes {
            map.append_route(route, table);
        }
        map
    }

    /// Merge every entry of `other` into `self`
    pub fn extend(&mut self, other: &RouteEntryMap) {
        for entry in other.iter() {
            self.append_entry(entry.clone());
        }
    }

    pub fn contains(&self, entry: &RouteEntry) -> bool {
        self.entries.contains_key(&entry.fingerprint())
    }

    pub fn remove(&mut self, entry: &RouteEntry) -> Option<RouteEntry> {
        self.entries.remove(&entry.fingerprint())
    }

    /// Entries of `self` whose fingerprint is absent from `other`
    pub fn difference(&self, other: &RouteEntryMap) -> RouteEntryMap {
        let entries = self
            .entries
            .iter()
            .filter(|(fp, _)| !other.entries.contains_key(*fp))
            .map(|(fp, e)| (fp.clone(), e.clone()))
            .collect();
        RouteEntryMap { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RouteEntry> for RouteEntryMap {
    fn from_iter<I: IntoIterator<Item = RouteEntry>>(iter: I) -> Self {
        let mut map = Self::new();
        for entry in iter {
            map.append_entry(entry);
        }
        map
    }
}

impl IntoIterator for RouteEntryMap {
    type Item = RouteEntry;
    type IntoIter = std::collections::btree_map::IntoValues<String, RouteEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let e = RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100);
        assert_eq!(e.fingerprint(), "100#10.0.0.0/24#192.168.1.1");
    }

    #[test]
    fn test_equality_follows_fingerprint() {
        let a = RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100);
        let b = RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100);
        let other_table = RouteEntry::new("10.0.0.0/24", "192.168.1.1", 101);
        let other_gw = RouteEntry::new("10.0.0.0/24", "192.168.1.2", 100);
        let other_dst = RouteEntry::new("10.0.1.0/24", "192.168.1.1", 100);

        assert_eq!(a, b);
        assert_ne!(a, other_table);
        assert_ne!(a, other_gw);
        assert_ne!(a, other_dst);
    }

    #[test]
    fn test_append_entry_is_idempotent() {
        let mut map = RouteEntryMap::new();
        map.append_entry(RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100));
        map.append_entry(RouteEntry::new("10.0.0.0/24", "192.168.1.1", 100));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_append_route_uses_owner_table() {
        let mut map = RouteEntryMap::new();
        map.append_route(&Route::new("10.0.0.0/24", "192.168.1.1"), 100);
        map.append_route(&Route::new("10.0.0.0/24", "192.168.1.1"), 200);
        assert_eq!(map.len(), 2);
        assert!(map.contains(&RouteEntry::new("10.0.0.0/24", "192.168.1.1", 200)));
    }

    #[test]
    fn test_difference() {
        let applied = RouteEntryMap::from_routes(
            &[
                Route::new("10.0.0.0/24", "192.168.1.1"),
                Route::new("10.0.1.0/24", "192.168.1.1"),
            ],
            100,
        );
        let desired =
            RouteEntryMap::from_routes(&[Route::new("10.0.0.0/24", "192.168.1.1")], 100);

        let erased = applied.difference(&desired);
        assert_eq!(
            erased.fingerprints().collect::<Vec<_>>(),
            vec!["100#10.0.1.0/24#192.168.1.1"]
        );
        assert!(desired.difference(&applied).is_empty());
    }

    #[test]
    fn test_remove_and_extend() {
        let mut global = RouteEntryMap::new();
        let a = RouteEntryMap::from_routes(&[Route::new("10.0.0.0/24", "192.168.1.1")], 100);
        let b = RouteEntryMap::from_routes(
            &[
                Route::new("10.0.0.0/24", "192.168.1.1"),
                Route::new("10.0.2.0/24", "192.168.1.1"),
            ],
            100,
        );
        global.extend(&a);
        global.extend(&b);
        assert_eq!(global.len(), 2);

        let removed = global.remove(&RouteEntry::new("10.0.2.0/24", "192.168.1.1", 100));
        assert!(removed.is_some());
        assert_eq!(global.len(), 1);
    }
}
