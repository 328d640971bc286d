//! Rendezvous (highest-random-weight) hashing over a set of named nodes.
//!
//! A [`Rendezvous`] table maps arbitrary byte keys onto node names so that
//! every participant with the same node list picks the same node for the same
//! key, and membership changes move as few keys as possible. Node name hashes
//! are precomputed once; per-lookup weights are derived with a cheap
//! xorshift-multiply step over `key_hash ^ node_hash`.
//!
//! The replica rule is argmax-plus-wraparound: the primary node is the one
//! with the highest weight, additional replicas are the following nodes in
//! index order, wrapping at the end of the list. Both the mixer constants and
//! the replica rule are part of the wire contract shared by all instances
//! that cooperate on one shard set.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use thiserror::Error;
use xxhash_rust::xxh64::xxh64;

/// A hash function suitable for hash-based lookups, e.g. [`xxh64_hasher`].
pub type Hasher = fn(&[u8]) -> u64;

/// The default [`Hasher`]: 64-bit xxHash with seed 0.
pub fn xxh64_hasher(input: &[u8]) -> u64 {
    xxh64(input, 0)
}

#[derive(Debug, Error)]
pub enum HrwError {
    #[error("duplicated node name: {0}")]
    DuplicateName(String),
}

/// Abstract interface for consistent hashing, implemented by [`Rendezvous`].
pub trait ConsistentHashing: Send + Sync {
    /// Returns the node names in insertion order.
    fn node_names(&self) -> Vec<String>;

    /// Returns the number of nodes.
    fn nodes_count(&self) -> usize;

    /// Returns the most suitable node for a key, or `None` on an empty table.
    fn get(&self, key: &[u8]) -> Option<String>;

    /// Returns the `min(max(replicas, 1), nodes_count)` most suitable
    /// distinct nodes for a key.
    fn get_n(&self, key: &[u8], replicas: usize) -> HashSet<String>;
}

#[derive(Default, Debug)]
struct Nodes {
    names: Vec<String>,
    hashes: Vec<u64>,
    index: HashMap<String, usize>,
}

/// A rendezvous hashing table.
///
/// Mutation (`add`/`remove`) is serialized by an internal lock; lookups take
/// the same lock briefly. During a partitioning run the table is read-only.
pub struct Rendezvous {
    hasher: Hasher,
    nodes: Mutex<Nodes>,
}

impl std::fmt::Debug for Rendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rendezvous")
            .field("hasher", &self.hasher)
            .field("nodes", &self.nodes)
            .finish()
    }
}

impl Rendezvous {
    /// Creates a table from a seed list of node names.
    ///
    /// Fails with [`HrwError::DuplicateName`] if any name repeats.
    pub fn new<S, I>(hasher: Hasher, nodes: I) -> Result<Self, HrwError>
    where
        S: AsRef<str>,
        I: IntoIterator<Item = S>,
    {
        let mut inner = Nodes::default();

        for node in nodes {
            let node = node.as_ref();
            if inner.index.contains_key(node) {
                return Err(HrwError::DuplicateName(node.to_string()));
            }
            inner.index.insert(node.to_string(), inner.names.len());
            inner.names.push(node.to_string());
            inner.hashes.push(hasher(node.as_bytes()));
        }

        Ok(Self {
            hasher,
            nodes: Mutex::new(inner),
        })
    }

    /// Adds a node to the table. Adding an existing name is a no-op.
    pub fn add(&self, node: &str) {
        let mut inner = self.nodes.lock();
        if inner.index.contains_key(node) {
            return;
        }
        let idx = inner.names.len();
        inner.index.insert(node.to_string(), idx);
        inner.names.push(node.to_string());
        inner.hashes.push((self.hasher)(node.as_bytes()));
    }

    /// Removes a node by swapping it with the last entry. Removing a missing
    /// name is a no-op. Indices of all other nodes except the swapped one are
    /// stable.
    pub fn remove(&self, node: &str) {
        let mut inner = self.nodes.lock();
        let Some(idx) = inner.index.remove(node) else {
            return;
        };
        inner.names.swap_remove(idx);
        inner.hashes.swap_remove(idx);
        if idx < inner.names.len() {
            let moved = inner.names[idx].clone();
            inner.index.insert(moved, idx);
        }
    }
}

impl ConsistentHashing for Rendezvous {
    fn node_names(&self) -> Vec<String> {
        self.nodes.lock().names.clone()
    }

    fn nodes_count(&self) -> usize {
        self.nodes.lock().names.len()
    }

    fn get(&self, key: &[u8]) -> Option<String> {
        let inner = self.nodes.lock();
        let indices = best_indices(&inner, self.hasher, key, 1);
        indices.first().map(|&i| inner.names[i].clone())
    }

    fn get_n(&self, key: &[u8], replicas: usize) -> HashSet<String> {
        let inner = self.nodes.lock();
        best_indices(&inner, self.hasher, key, replicas)
            .into_iter()
            .map(|i| inner.names[i].clone())
            .collect()
    }
}

/// Indices of the best nodes for a key: argmax of the mixed weight, then the
/// following `replicas - 1` indices wrapping around.
fn best_indices(nodes: &Nodes, hasher: Hasher, key: &[u8], replicas: usize) -> Vec<usize> {
    let count = nodes.names.len();

    match count {
        0 => return Vec::new(),
        1 => return vec![0],
        _ => {}
    }
    if replicas >= count {
        return (0..count).collect();
    }
    let replicas = replicas.max(1);

    let key_hash = hasher(key);

    let mut max_idx = 0;
    let mut max_weight = xorshift_mult64(key_hash ^ nodes.hashes[0]);
    for (i, &node_hash) in nodes.hashes.iter().enumerate().skip(1) {
        let weight = xorshift_mult64(key_hash ^ node_hash);
        if weight > max_weight {
            max_idx = i;
            max_weight = weight;
        }
    }

    let mut indices = Vec::with_capacity(replicas);
    for _ in 0..replicas {
        indices.push(max_idx);
        max_idx += 1;
        if max_idx >= count {
            max_idx = 0;
        }
    }
    indices
}

/// Cheap integer mixer used to derive per-node weights.
///
/// The constants are fixed: changing them desynchronizes instances that share
/// a shard set.
fn xorshift_mult64(mut x: u64) -> u64 {
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    x.wrapping_mul(2685821657736338717)
}
