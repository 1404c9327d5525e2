//! Routing table module
//!
//! Known peers grouped into bounded buckets by their distance from the local
//! identifier.

use crate::dht::config::NetworkConfig;
use crate::dht::node_id::{digit_count, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::SocketAddr;
use tracing::trace;

/// Pointer to a known peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Identifier of the peer
    pub id: NodeId,
    /// Address the peer listens on
    pub host: SocketAddr,
}

impl Route {
    /// Create a new route
    pub fn new(id: NodeId, host: SocketAddr) -> Self {
        Self { id, host }
    }
}

/// Result of offering a route to the table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored in a free slot
    Inserted,
    /// Already known; moved to most-recently-seen
    Refreshed,
    /// Stored after evicting the least-recently-seen route of a full bucket
    Evicted(Route),
    /// The local id, or an id of the wrong width
    Rejected,
}

/// A bucket in the routing table, least-recently-seen route first
#[derive(Debug, Clone)]
pub struct Bucket {
    routes: VecDeque<Route>,
    capacity: usize,
}

impl Bucket {
    /// Create an empty bucket with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            routes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a route, evicting the least-recently-seen one if the bucket is full
    pub fn insert(&mut self, route: Route) -> InsertOutcome {
        if let Some(pos) = self.routes.iter().position(|r| r.id == route.id) {
            self.routes.remove(pos);
            self.routes.push_back(route);
            return InsertOutcome::Refreshed;
        }

        if self.is_full() {
            let evicted = self.routes.pop_front();
            self.routes.push_back(route);
            return match evicted {
                Some(old) => InsertOutcome::Evicted(old),
                None => InsertOutcome::Inserted,
            };
        }

        self.routes.push_back(route);
        InsertOutcome::Inserted
    }

    /// Remove a route by id
    pub fn remove(&mut self, id: &NodeId) -> Option<Route> {
        let pos = self.routes.iter().position(|r| r.id == *id)?;
        self.routes.remove(pos)
    }

    /// Find a route by id
    pub fn find(&self, id: &NodeId) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == *id)
    }

    /// Slot view of the bucket: occupied slots first, then empty ones
    pub fn slots(&self) -> Vec<Option<&Route>> {
        (0..self.capacity).map(|i| self.routes.get(i)).collect()
    }

    /// Iterate routes from least to most recently seen
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// The route that would be evicted next
    pub fn least_recently_seen(&self) -> Option<&Route> {
        self.routes.front()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.routes.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Distance-bucketed routing table with `hashLength / base` rows of `base` slots
#[derive(Debug)]
pub struct RoutingTable {
    local_id: NodeId,
    base: usize,
    /// Base-`base` digits in one identifier
    digit_width: usize,
    local_digits: Vec<usize>,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Create an empty routing table shaped by `config`
    pub fn new(local_id: NodeId, config: &NetworkConfig) -> Self {
        let digit_width = digit_count(config.hash_length, config.base);
        let local_digits = local_id.digits(config.base, digit_width);
        let buckets = (0..config.bucket_count())
            .map(|_| Bucket::new(config.bucket_size()))
            .collect();

        Self {
            local_id,
            base: config.base,
            digit_width,
            local_digits,
            buckets,
        }
    }

    /// The identifier distances are measured from
    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Add or refresh a route
    pub fn insert(&mut self, route: Route) -> InsertOutcome {
        let Some(index) = self.bucket_index(&route.id) else {
            trace!("Rejected route {} for the routing table", route.id);
            return InsertOutcome::Rejected;
        };
        let outcome = self.buckets[index].insert(route);
        trace!("Bucket {} insert outcome: {:?}", index, outcome);
        outcome
    }

    /// Remove a route by id
    pub fn remove(&mut self, id: &NodeId) -> Option<Route> {
        let index = self.bucket_index(id)?;
        self.buckets[index].remove(id)
    }

    /// Find a route by id
    pub fn find(&self, id: &NodeId) -> Option<&Route> {
        let index = self.bucket_index(id)?;
        self.buckets[index].find(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Up to `limit` known routes, nearest to `target` by XOR distance first
    pub fn lookup(&self, target: &NodeId, limit: usize) -> Vec<Route> {
        let mut routes = self.routes();
        routes.sort_by_key(|r| r.id.distance(target));
        routes.truncate(limit);
        routes
    }

    /// Get all routes in the table
    pub fn routes(&self) -> Vec<Route> {
        self.buckets
            .iter()
            .flat_map(|b| b.routes().cloned())
            .collect()
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket_size(&self) -> usize {
        self.base
    }

    pub fn capacity(&self) -> usize {
        self.bucket_count() * self.bucket_size()
    }

    /// Get the number of routes in the table
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }

    /// Row for `id`: the most significant differing digit, scaled onto the row count.
    /// `None` for the local id itself or for an id of a different width.
    pub fn bucket_index(&self, id: &NodeId) -> Option<usize> {
        if id.bit_len() != self.local_id.bit_len() {
            return None;
        }
        let digits = id.digits(self.base, self.digit_width);
        let position = digits
            .iter()
            .zip(self.local_digits.iter())
            .position(|(theirs, ours)| theirs != ours)?;
        Some(position * self.buckets.len() / self.digit_width)
    }
}
