//! Typed object directory shared by every pipeline stage.
//!
//! Each entity kind lives in its own [`Arena`]: a `SlotMap` for O(1) keyed
//! access, a name index for O(1) lookup by external id, and an insertion-order
//! list. Iteration always follows insertion order, because tie-breaks in the
//! track binder and the route planner depend on it.
//!
//! Cross-entity relations are stored as keys and resolved here; no entity
//! holds a reference to another.

use crate::id::*;
use crate::order::{Goods, GoodsLocation, ProductionOrder};
use crate::sim::Ticks;
use crate::station::Workstation;
use crate::task::{Leg, RoutedSegment};
use crate::track::Track;
use crate::vehicle::Vehicle;
use slotmap::{Key, SecondaryMap, SlotMap};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// Storage for one entity kind, keyed by a typed slotmap key and by name.
#[derive(Debug, Clone)]
pub struct Arena<K: Key, T> {
    items: SlotMap<K, T>,
    names: SecondaryMap<K, String>,
    by_name: HashMap<String, K>,
    order: Vec<K>,
}

impl<K: Key, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key, T> Arena<K, T> {
    pub fn new() -> Self {
        Self {
            items: SlotMap::with_key(),
            names: SecondaryMap::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register `value` under `name`. Returns `None` (and stores nothing) if
    /// the name is already taken in this arena.
    pub fn register(&mut self, name: impl Into<String>, value: T) -> Option<K> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return None;
        }
        let key = self.items.insert(value);
        self.names.insert(key, name.clone());
        self.by_name.insert(name, key);
        self.order.push(key);
        Some(key)
    }

    /// Remove an entity by key, returning it if it was present.
    pub fn unregister(&mut self, key: K) -> Option<T> {
        let value = self.items.remove(key)?;
        if let Some(name) = self.names.remove(key) {
            self.by_name.remove(&name);
        }
        self.order.retain(|&k| k != key);
        Some(value)
    }

    /// Remove an entity by name. Returns false if the name was unknown.
    pub fn unregister_by_name(&mut self, name: &str) -> bool {
        match self.by_name.get(name).copied() {
            Some(key) => self.unregister(key).is_some(),
            None => false,
        }
    }

    pub fn get(&self, key: K) -> Option<&T> {
        self.items.get(key)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    pub fn key_of(&self, name: &str) -> Option<K> {
        self.by_name.get(name).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.key_of(name).and_then(|k| self.items.get(k))
    }

    pub fn name_of(&self, key: K) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: K) -> bool {
        self.items.contains_key(key)
    }

    /// Snapshot of all keys in insertion order. Safe to hold while mutating.
    pub fn keys(&self) -> Vec<K> {
        self.order.clone()
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.order
            .iter()
            .filter_map(move |&k| self.items.get(k).map(|v| (k, v)))
    }

    /// Iterate values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The single shared mutable store: one arena per entity kind plus the
/// logical clock. Fields are public so stages can borrow two arenas at once.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub orders: Arena<OrderKey, ProductionOrder>,
    pub goods: Arena<GoodsKey, Goods>,
    pub legs: Arena<LegKey, Leg>,
    pub segments: Arena<SegmentKey, RoutedSegment>,
    pub tracks: Arena<TrackKey, Track>,
    pub vehicles: Arena<VehicleKey, Vehicle>,
    pub stations: Arena<StationKey, Workstation>,
    /// Goods removed at their terminal station, kept for reporting.
    delivered: Vec<Goods>,
    clock: Ticks,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    pub fn clock(&self) -> Ticks {
        self.clock
    }

    pub fn set_clock(&mut self, t: Ticks) {
        self.clock = t;
    }

    pub fn advance_clock(&mut self, dt: Ticks) {
        self.clock += dt;
    }

    // -----------------------------------------------------------------------
    // Cross-kind helpers
    // -----------------------------------------------------------------------

    /// Find the live goods belonging to an order, if any.
    pub fn goods_for_order(&self, order_no: OrderNo) -> Option<GoodsKey> {
        self.goods
            .iter()
            .find(|(_, g)| g.order_no == order_no)
            .map(|(k, _)| k)
    }

    /// Find the registered order with the given number.
    pub fn order_by_no(&self, order_no: OrderNo) -> Option<OrderKey> {
        self.orders
            .iter()
            .find(|(_, o)| o.order_no == order_no)
            .map(|(k, _)| k)
    }

    /// Move a goods item out of the live arena into the delivered archive.
    /// Returns false if the key was unknown.
    pub fn deliver(&mut self, key: GoodsKey, station: StationKey) -> bool {
        match self.goods.unregister(key) {
            Some(mut goods) => {
                goods.location = GoodsLocation::Delivered(station);
                self.delivered.push(goods);
                true
            }
            None => false,
        }
    }

    /// Goods that reached their terminal station, in delivery order.
    pub fn delivered(&self) -> &[Goods] {
        &self.delivered
    }

    /// Axis coordinate of a station as seen from a track.
    pub fn station_coord(&self, track: TrackKey, station: StationKey) -> Option<i32> {
        let track = self.tracks.get(track)?;
        let station = self.stations.get(station)?;
        Some(track.axis.coord(station.position))
    }

    /// Display name for a station key, falling back to `"?"`.
    pub fn station_name(&self, key: StationKey) -> &str {
        self.stations.name_of(key).unwrap_or("?")
    }

    /// Display name for a vehicle key, falling back to `"?"`.
    pub fn vehicle_name(&self, key: VehicleKey) -> &str {
        self.vehicles.name_of(key).unwrap_or("?")
    }

    /// Display name for a track key, falling back to `"?"`.
    pub fn track_name(&self, key: TrackKey) -> &str {
        self.tracks.name_of(key).unwrap_or("?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup_by_name() {
        let mut arena: Arena<StationKey, u32> = Arena::new();
        let k = arena.register("1LD", 7).unwrap();
        assert_eq!(arena.get(k), Some(&7));
        assert_eq!(arena.key_of("1LD"), Some(k));
        assert_eq!(arena.get_by_name("1LD"), Some(&7));
        assert_eq!(arena.name_of(k), Some("1LD"));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn duplicate_name_is_a_no_op() {
        let mut arena: Arena<StationKey, u32> = Arena::new();
        arena.register("1LD", 1).unwrap();
        assert!(arena.register("1LD", 2).is_none());
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get_by_name("1LD"), Some(&1));
    }

    #[test]
    fn unregister_absent_returns_false() {
        let mut arena: Arena<StationKey, u32> = Arena::new();
        assert!(!arena.unregister_by_name("nope"));
        let k = arena.register("a", 1).unwrap();
        assert!(arena.unregister_by_name("a"));
        assert!(arena.unregister(k).is_none());
        assert!(arena.key_of("a").is_none());
    }

    #[test]
    fn iteration_follows_insertion_order_after_reuse() {
        let mut arena: Arena<StationKey, &str> = Arena::new();
        let a = arena.register("a", "a").unwrap();
        arena.register("b", "b").unwrap();
        arena.unregister(a);
        // The freed slot is reused, but order must stay b, c.
        arena.register("c", "c").unwrap();
        let names: Vec<&str> = arena.values().copied().collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(arena.keys().len(), 2);
    }

    #[test]
    fn name_can_be_reused_after_unregister() {
        let mut arena: Arena<StationKey, u32> = Arena::new();
        let k = arena.register("x", 1).unwrap();
        arena.unregister(k);
        assert!(arena.register("x", 2).is_some());
    }

    #[test]
    fn clock_set_and_advance() {
        let mut reg = Registry::new();
        assert_eq!(reg.clock(), 0);
        reg.set_clock(100);
        reg.advance_clock(10);
        assert_eq!(reg.clock(), 110);
    }
}
