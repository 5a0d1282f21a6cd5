//! Location-aware connection balancer.
//!
//! Connections are grouped into per-location buckets. Each bucket is a
//! circular list of connections stored in a flat arena (`next` indices plus
//! a free list, so deletions reuse slots). Selection walks the bucket
//! round-robin from a lookup pointer; new endpoints splice all of their
//! connections as one contiguous range after the insertion pointer, which is
//! what makes deletion of a whole endpoint a single linear scan.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::error::Error as ClientError;

const DEFAULT_LOCATION: &str = "&&def";
const MIN_CONNS_PER_ENDPOINT: usize = 1;

/// Capabilities the grid needs from a connection.
pub trait BalancedItem: Send + Sync + 'static {
    fn id(&self) -> u64;
    fn alive(&self) -> bool;
    fn close(&self);
}

#[derive(Debug, Error)]
pub enum GridError {
    #[error("connection create failed: {0}")]
    ConnCreate(#[source] ClientError),
    #[error("unknown location")]
    UnknownLocation,
    #[error("empty location")]
    EmptyLocation,
    #[error("no such id")]
    NoSuchId,
}

/// Initial parameters for [`Grid`].
#[derive(Debug, Clone, Default)]
pub struct GridConfig {
    /// Ordered location preference for selection. Empty preference makes the
    /// grid ignore locations entirely.
    pub location_preference: Vec<String>,
    /// How many connections to spawn per endpoint on `add`.
    pub connections_per_endpoint: usize,
    /// Collapse every endpoint into one default bucket.
    pub ignore_locations: bool,
}

struct Slot<C> {
    conn: Arc<C>,
    next: usize,
}

struct Bucket<C> {
    slots: Vec<Option<Slot<C>>>,
    free: Vec<usize>,
    lookup: usize,
    insert: usize,
    size: usize,
}

impl<C: BalancedItem> Bucket<C> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            lookup: 0,
            insert: 0,
            size: 0,
        }
    }

    fn slot(&self, idx: usize) -> &Slot<C> {
        self.slots[idx].as_ref().expect("slot index points to a live slot")
    }

    fn alloc(&mut self, conn: Arc<C>) -> usize {
        let slot = Slot { conn, next: 0 };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                idx
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    fn set_next(&mut self, idx: usize, next: usize) {
        self.slots[idx]
            .as_mut()
            .expect("slot index points to a live slot")
            .next = next;
    }

    /// Round-robin lookup: walks at most `size` nodes from the lookup
    /// pointer and returns the first alive connection, advancing the
    /// pointer past it.
    fn lookup_alive(&mut self) -> Option<Arc<C>> {
        let mut ptr = self.lookup;
        for _ in 0..self.size {
            let slot = self.slot(ptr);
            let next = slot.next;
            if slot.conn.alive() {
                let conn = slot.conn.clone();
                self.lookup = next;
                return Some(conn);
            }
            ptr = next;
        }
        None
    }

    /// Splices `conns` as one contiguous range right after the insertion
    /// pointer and moves the pointer to the last inserted node.
    fn insert_range(&mut self, conns: Vec<Arc<C>>) {
        debug_assert!(!conns.is_empty());
        let count = conns.len();
        let mut indices = Vec::with_capacity(count);
        for conn in conns {
            indices.push(self.alloc(conn));
        }
        for window in indices.windows(2) {
            self.set_next(window[0], window[1]);
        }
        let first = indices[0];
        let last = *indices.last().expect("range is non-empty");

        if self.size == 0 {
            self.set_next(last, first);
            self.lookup = first;
        } else {
            let after = self.slot(self.insert).next;
            self.set_next(self.insert, first);
            self.set_next(last, after);
        }
        self.insert = last;
        self.size += count;
    }
}

/// Fixed-level load balancer that picks connections grouped by location.
pub struct Grid<C: BalancedItem> {
    buckets: Mutex<HashMap<String, Bucket<C>>>,

    preference: Vec<String>,
    preference_set: HashSet<String>,

    conns_per_endpoint: usize,
    ignore_locations: bool,
}

impl<C: BalancedItem> Grid<C> {
    pub fn new(mut cfg: GridConfig) -> Self {
        if cfg.location_preference.is_empty() {
            cfg.ignore_locations = true;
        }
        if cfg.connections_per_endpoint < MIN_CONNS_PER_ENDPOINT {
            cfg.connections_per_endpoint = MIN_CONNS_PER_ENDPOINT;
        }

        let preference_set = cfg.location_preference.iter().cloned().collect();
        Self {
            buckets: Mutex::new(HashMap::new()),
            preference: cfg.location_preference,
            preference_set,
            conns_per_endpoint: cfg.connections_per_endpoint,
            ignore_locations: cfg.ignore_locations,
        }
    }

    fn bucket_key<'a>(&self, location: &'a str) -> &'a str {
        if self.ignore_locations {
            DEFAULT_LOCATION
        } else {
            location
        }
    }

    /// Selects a balanced connection.
    ///
    /// Locations are tried in preference order first; locations outside the
    /// preference set are tried afterwards in no particular order. Within a
    /// location connections are selected round-robin, skipping dead ones.
    /// Returns `None` when nothing is alive anywhere.
    pub fn get_conn(&self) -> Option<Arc<C>> {
        let mut buckets = self.buckets.lock();

        if self.ignore_locations {
            return buckets.get_mut(DEFAULT_LOCATION)?.lookup_alive();
        }

        for location in &self.preference {
            if let Some(bucket) = buckets.get_mut(location) {
                if let Some(conn) = bucket.lookup_alive() {
                    return Some(conn);
                }
            }
        }

        for (location, bucket) in buckets.iter_mut() {
            if !self.preference_set.contains(location) {
                if let Some(conn) = bucket.lookup_alive() {
                    return Some(conn);
                }
            }
        }

        None
    }

    /// Creates the configured number of connections for one endpoint and
    /// links them into `location` as one contiguous range. If any creation
    /// fails, connections created so far are closed and the call fails.
    pub fn add<F>(&self, location: &str, mut create: F) -> Result<(), GridError>
    where
        F: FnMut() -> Result<Arc<C>, ClientError>,
    {
        let mut conns = Vec::with_capacity(self.conns_per_endpoint);
        for _ in 0..self.conns_per_endpoint {
            match create() {
                Ok(conn) => conns.push(conn),
                Err(err) => {
                    for conn in &conns {
                        conn.close();
                    }
                    return Err(GridError::ConnCreate(err));
                }
            }
        }

        let mut buckets = self.buckets.lock();
        buckets
            .entry(self.bucket_key(location).to_string())
            .or_insert_with(Bucket::new)
            .insert_range(conns);

        Ok(())
    }

    /// Removes and closes all connections of the endpoint identified by `id`
    /// within `location`. Linear search from the insertion pointer; the
    /// endpoint's connections form one contiguous range, so finding the
    /// first is enough to cross the whole range.
    pub fn delete(&self, location: &str, id: u64) -> Result<(), GridError> {
        let mut buckets = self.buckets.lock();
        let key = self.bucket_key(location);
        let bucket = buckets.get_mut(key).ok_or(GridError::UnknownLocation)?;

        if bucket.size == 0 {
            return Err(GridError::EmptyLocation);
        }

        if bucket.size == self.conns_per_endpoint {
            // Connections of exactly one endpoint left.
            if bucket.slot(bucket.insert).conn.id() != id {
                return Err(GridError::NoSuchId);
            }
            let bucket = buckets.remove(key).expect("bucket exists");
            for slot in bucket.slots.into_iter().flatten() {
                slot.conn.close();
            }
            return Ok(());
        }

        // prev and ptr start at a boundary between endpoint ranges.
        let mut prev = bucket.insert;
        let mut ptr = bucket.slot(prev).next;

        for _ in 0..bucket.size {
            if bucket.slot(ptr).conn.id() == id {
                // Found the first connection of the range; cross it.
                let mut removed = Vec::with_capacity(self.conns_per_endpoint);
                let mut end = ptr;
                for _ in 0..self.conns_per_endpoint {
                    removed.push(end);
                    end = bucket.slot(end).next;
                }
                bucket.set_next(prev, end);

                // Warp lookup and insert pointers to the range's successor
                // if they lay inside the removed range.
                if bucket.slot(bucket.insert).conn.id() == id {
                    bucket.insert = end;
                }
                if bucket.slot(bucket.lookup).conn.id() == id {
                    bucket.lookup = end;
                }

                for idx in removed {
                    let slot = bucket.slots[idx].take().expect("removed slot is live");
                    slot.conn.close();
                    bucket.free.push(idx);
                }
                bucket.size -= self.conns_per_endpoint;

                return Ok(());
            }

            prev = ptr;
            ptr = bucket.slot(ptr).next;
        }

        Err(GridError::NoSuchId)
    }
}
