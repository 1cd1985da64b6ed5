//! The route Network - a keyed, undirected graph of stations.
//!
//! Vertices live in one owned table keyed by a caller-supplied extraction
//! function; edges reference keys only. Each edge carries the ordered
//! polyline of intermediate waypoints between its two endpoints (the
//! endpoints themselves are not part of the list).
//!
//! # Symmetry
//!
//! Inserting `A -> B` with waypoints `P` also stores `B -> A` with
//! `reverse(P)`, so a train can walk the same track in either direction.
//!
//! # Determinism
//!
//! Both tables are `BTreeMap`s. Iteration order, and therefore the
//! tie-break between equal-cost shortest paths, follows key order.

use crate::station::{Station, StationId};
use crate::vector::{polyline_length, Vector};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by [`Network`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Vertex {0} already exists in the network")]
    VertexExists(String),

    #[error("Vertex {0} does not exist in the network")]
    VertexMissing(String),

    #[error("Vertices {0} and {1} are not connected")]
    NotConnected(String, String),

    #[error("No path from {0} to {1}")]
    NoPath(String, String),
}

impl NetworkError {
    fn missing<K: Debug>(key: &K) -> Self {
        Self::VertexMissing(format!("{:?}", key))
    }

    fn not_connected<K: Debug>(a: &K, b: &K) -> Self {
        Self::NotConnected(format!("{:?}", a), format!("{:?}", b))
    }
}

/// Anything with a position on the map, used to weigh edges by track length.
pub trait Located {
    fn location(&self) -> Vector;
}

impl<T: Located + ?Sized> Located for Arc<T> {
    fn location(&self) -> Vector {
        (**self).location()
    }
}

/// How [`Network::shortest_path_by`] weighs an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCost {
    /// Length of the polyline from one vertex through the waypoints to the other
    TrackLength,

    /// Every edge costs 1
    Hops,
}

/// The route graph trains walk: stations keyed by id.
pub type StationNetwork = Network<Arc<Station>, StationId>;

/// Keyed undirected graph whose edges are waypoint polylines.
pub struct Network<V, K> {
    vertices: BTreeMap<K, V>,
    edges: BTreeMap<K, BTreeMap<K, Vec<Vector>>>,
    hash: fn(&V) -> K,
}

impl<V, K> Network<V, K>
where
    K: Ord + Clone + Debug,
{
    /// Creates an empty network using `hash` to derive vertex keys.
    pub fn new(hash: fn(&V) -> K) -> Self {
        Self {
            vertices: BTreeMap::new(),
            edges: BTreeMap::new(),
            hash,
        }
    }

    /// Key under which `vertex` is (or would be) stored.
    pub fn key_of(&self, vertex: &V) -> K {
        (self.hash)(vertex)
    }

    pub fn insert_vertex(&mut self, vertex: V) -> Result<(), NetworkError> {
        let key = self.key_of(&vertex);
        if self.vertices.contains_key(&key) {
            return Err(NetworkError::VertexExists(format!("{:?}", key)));
        }

        self.edges.insert(key.clone(), BTreeMap::new());
        self.vertices.insert(key, vertex);
        Ok(())
    }

    /// Inserts every vertex, stopping at the first failure.
    pub fn insert_vertices<I: IntoIterator<Item = V>>(&mut self, vertices: I) -> Result<(), NetworkError> {
        for vertex in vertices {
            self.insert_vertex(vertex)?;
        }
        Ok(())
    }

    /// Connects `a` and `b`. Both must already be in the network.
    ///
    /// `points` is stored for `a -> b` and its reverse for `b -> a`.
    pub fn insert_edge(&mut self, a: &V, b: &V, points: Vec<Vector>) -> Result<(), NetworkError> {
        let (ka, kb) = (self.key_of(a), self.key_of(b));
        self.insert_edge_by_key(&ka, &kb, points)
    }

    /// Same as [`Network::insert_edge`], addressed by key.
    pub fn insert_edge_by_key(&mut self, a: &K, b: &K, points: Vec<Vector>) -> Result<(), NetworkError> {
        self.require(a)?;
        self.require(b)?;
        self.store_symmetric(a, b, points);
        Ok(())
    }

    pub fn vertex(&self, key: &K) -> Result<&V, NetworkError> {
        self.vertices.get(key).ok_or_else(|| NetworkError::missing(key))
    }

    /// Returns the stored vertex sharing `value`'s key.
    pub fn vertex_of(&self, value: &V) -> Result<&V, NetworkError> {
        self.vertex(&self.key_of(value))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.vertices.contains_key(key)
    }

    /// All vertices in key order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.vertices.values()
    }

    /// Replaces the stored vertex with the same key.
    pub fn update_vertex(&mut self, vertex: V) -> Result<(), NetworkError> {
        let key = self.key_of(&vertex);
        match self.vertices.get_mut(&key) {
            Some(slot) => {
                *slot = vertex;
                Ok(())
            }
            None => Err(NetworkError::missing(&key)),
        }
    }

    /// Removes the vertex and every edge touching it.
    pub fn delete_vertex(&mut self, vertex: &V) -> Result<V, NetworkError> {
        let key = self.key_of(vertex);
        let removed = self
            .vertices
            .remove(&key)
            .ok_or_else(|| NetworkError::missing(&key))?;

        self.edges.remove(&key);
        for adjacency in self.edges.values_mut() {
            adjacency.remove(&key);
        }
        Ok(removed)
    }

    /// Adjacency of `vertex`: neighbour key to waypoints.
    pub fn edges_of(&self, vertex: &V) -> Result<&BTreeMap<K, Vec<Vector>>, NetworkError> {
        let key = self.key_of(vertex);
        self.edges.get(&key).ok_or_else(|| NetworkError::missing(&key))
    }

    /// Waypoints of the direct edge `a -> b`. No transitive search.
    pub fn are_connected(&self, a: &V, b: &V) -> Result<&[Vector], NetworkError> {
        let (ka, kb) = (self.key_of(a), self.key_of(b));
        self.waypoints(&ka, &kb)
    }

    /// Same as [`Network::are_connected`], addressed by key.
    pub fn waypoints(&self, a: &K, b: &K) -> Result<&[Vector], NetworkError> {
        let adjacency = self.edges.get(a).ok_or_else(|| NetworkError::missing(a))?;
        self.require(b)?;

        adjacency
            .get(b)
            .map(|points| points.as_slice())
            .ok_or_else(|| NetworkError::not_connected(a, b))
    }

    /// Replaces the waypoints of an existing edge, in both directions.
    pub fn update_edge(&mut self, a: &V, b: &V, points: Vec<Vector>) -> Result<(), NetworkError> {
        let (ka, kb) = (self.key_of(a), self.key_of(b));
        self.waypoints(&ka, &kb)?;
        self.store_symmetric(&ka, &kb, points);
        Ok(())
    }

    /// Removes the edge in both directions.
    pub fn delete_edge(&mut self, a: &V, b: &V) -> Result<(), NetworkError> {
        let (ka, kb) = (self.key_of(a), self.key_of(b));
        self.waypoints(&ka, &kb)?;

        if let Some(adjacency) = self.edges.get_mut(&ka) {
            adjacency.remove(&kb);
        }
        if let Some(adjacency) = self.edges.get_mut(&kb) {
            adjacency.remove(&ka);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        let directed: usize = self.edges.values().map(|adjacency| adjacency.len()).sum();
        let loops = self
            .edges
            .iter()
            .filter(|(key, adjacency)| adjacency.contains_key(*key))
            .count();
        (directed - loops) / 2 + loops
    }

    /// Shortest path counting every edge as 1.
    pub fn shortest_path_hops(&self, a: &V, b: &V) -> Result<Vec<V>, NetworkError>
    where
        V: Clone,
    {
        let (ka, kb) = (self.key_of(a), self.key_of(b));
        let keys = self.dijkstra(&ka, &kb, |_, _, _| 1.0)?;
        self.collect(keys)
    }

    fn require(&self, key: &K) -> Result<(), NetworkError> {
        if self.vertices.contains_key(key) {
            Ok(())
        } else {
            Err(NetworkError::missing(key))
        }
    }

    fn store_symmetric(&mut self, a: &K, b: &K, points: Vec<Vector>) {
        // A loop is a single slot; storing the reverse would overwrite it
        if a == b {
            if let Some(adjacency) = self.edges.get_mut(a) {
                adjacency.insert(b.clone(), points);
            }
            return;
        }

        let mut reversed = points.clone();
        reversed.reverse();

        if let Some(adjacency) = self.edges.get_mut(a) {
            adjacency.insert(b.clone(), points);
        }
        if let Some(adjacency) = self.edges.get_mut(b) {
            adjacency.insert(a.clone(), reversed);
        }
    }

    fn collect(&self, keys: Vec<K>) -> Result<Vec<V>, NetworkError>
    where
        V: Clone,
    {
        keys.iter().map(|key| self.vertex(key).cloned()).collect()
    }

    /// Single-source shortest path from `src`, halting once `dst` is settled.
    ///
    /// On equal cost the heap settles the smaller key first, and a
    /// predecessor is only replaced by a strictly cheaper route.
    fn dijkstra<F>(&self, src: &K, dst: &K, edge_cost: F) -> Result<Vec<K>, NetworkError>
    where
        F: Fn(&K, &K, &[Vector]) -> f64,
    {
        self.require(src)?;
        self.require(dst)?;

        let mut dist: BTreeMap<K, f64> = BTreeMap::new();
        let mut prev: BTreeMap<K, K> = BTreeMap::new();
        let mut settled: BTreeSet<K> = BTreeSet::new();
        let mut heap = BinaryHeap::new();

        dist.insert(src.clone(), 0.0);
        heap.push(Frontier { cost: 0.0, key: src.clone() });

        while let Some(Frontier { cost, key }) = heap.pop() {
            if !settled.insert(key.clone()) {
                continue;
            }

            if &key == dst {
                let mut path = vec![key];
                while let Some(step) = path.last().and_then(|k| prev.get(k)) {
                    path.push(step.clone());
                }
                path.reverse();
                return Ok(path);
            }

            let Some(adjacency) = self.edges.get(&key) else {
                continue;
            };

            for (neighbour, points) in adjacency {
                if settled.contains(neighbour) {
                    continue;
                }

                let candidate = cost + edge_cost(&key, neighbour, points);
                let known = dist.get(neighbour).copied().unwrap_or(f64::INFINITY);
                if candidate < known {
                    dist.insert(neighbour.clone(), candidate);
                    prev.insert(neighbour.clone(), key.clone());
                    heap.push(Frontier {
                        cost: candidate,
                        key: neighbour.clone(),
                    });
                }
            }
        }

        Err(NetworkError::NoPath(format!("{:?}", src), format!("{:?}", dst)))
    }
}

impl<V, K> Network<V, K>
where
    V: Clone + Located,
    K: Ord + Clone + Debug,
{
    /// Shortest path by track length, as the ordered vertex list `a ..= b`.
    pub fn shortest_path(&self, a: &V, b: &V) -> Result<Vec<V>, NetworkError> {
        self.shortest_path_by(a, b, PathCost::TrackLength)
    }

    pub fn shortest_path_by(&self, a: &V, b: &V, cost: PathCost) -> Result<Vec<V>, NetworkError> {
        if cost == PathCost::Hops {
            return self.shortest_path_hops(a, b);
        }

        let (ka, kb) = (self.key_of(a), self.key_of(b));
        let keys = self.dijkstra(&ka, &kb, |from, to, points| {
            match (self.vertices.get(from), self.vertices.get(to)) {
                (Some(u), Some(v)) => polyline_length(&u.location(), points, &v.location()),
                _ => f64::INFINITY,
            }
        })?;
        self.collect(keys)
    }
}

/// Heap entry. The ordering is flipped so the `BinaryHeap` pops the cheapest
/// entry first, and among equal costs the smallest key.
struct Frontier<K> {
    cost: f64,
    key: K,
}

impl<K: Ord> Ord for Frontier<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl<K: Ord> PartialOrd for Frontier<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> PartialEq for Frontier<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Frontier<K> {}
