use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::node::{NodeId, NodeSession};
use crate::constants::{DHT_BUCKETS, DHT_K, DHT_MAX_UNIDENTIFIED};

#[derive(Debug)]
struct Bucket {
    nodes: VecDeque<NodeSession>,
    replacement_cache: VecDeque<NodeSession>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            nodes: VecDeque::with_capacity(DHT_K),
            replacement_cache: VecDeque::with_capacity(DHT_K),
        }
    }

    /// Inserts a verified node. A known id moves to the tail as most
    /// recently seen; a full bucket parks the node in the replacement cache.
    fn add(&mut self, node: NodeSession) -> bool {
        if let Some(pos) = self.nodes.iter().position(|n| n.id == node.id) {
            if let Some(mut existing) = self.nodes.remove(pos) {
                existing.addr = node.addr;
                existing.verified = true;
                existing.touch();
                self.nodes.push_back(existing);
            }
            return true;
        }

        if self.nodes.len() < DHT_K {
            self.nodes.push_back(node);
            return true;
        }

        self.replacement_cache.retain(|n| n.id != node.id);
        if self.replacement_cache.len() >= DHT_K {
            self.replacement_cache.pop_front();
        }
        self.replacement_cache.push_back(node);

        false
    }

    fn remove_addr(&mut self, addr: &SocketAddr) -> Option<NodeSession> {
        let pos = self.nodes.iter().position(|n| &n.addr == addr)?;
        let removed = self.nodes.remove(pos);

        if let Some(replacement) = self.replacement_cache.pop_back() {
            self.nodes.push_back(replacement);
        }

        removed
    }

    fn get_by_addr(&self, addr: &SocketAddr) -> Option<&NodeSession> {
        self.nodes.iter().find(|n| &n.addr == addr)
    }

    fn get_by_addr_mut(&mut self, addr: &SocketAddr) -> Option<&mut NodeSession> {
        self.nodes.iter_mut().find(|n| &n.addr == addr)
    }
}

/// Nodes known only by address, oldest first.
#[derive(Debug, Default)]
struct NodePool {
    nodes: HashMap<SocketAddr, NodeSession>,
    order: VecDeque<SocketAddr>,
}

impl NodePool {
    fn entry(&mut self, addr: SocketAddr) -> &mut NodeSession {
        if !self.nodes.contains_key(&addr) {
            while self.nodes.len() >= DHT_MAX_UNIDENTIFIED {
                let Some(oldest) = self.order.pop_front() else {
                    break;
                };
                if self.nodes.remove(&oldest).is_some() {
                    trace!(addr = %oldest, "dht node pool full, dropping oldest");
                }
            }
            trace!(%addr, "new dht node");
            self.order.push_back(addr);
        }
        self.nodes.entry(addr).or_insert_with(|| NodeSession::new(addr))
    }

    fn remove(&mut self, addr: &SocketAddr) -> Option<NodeSession> {
        let node = self.nodes.remove(addr)?;
        self.order.retain(|a| a != addr);
        Some(node)
    }
}

/// Kademlia routing table plus a pool of nodes we only know by address.
///
/// Identified nodes live in 160 buckets of [`DHT_K`] entries keyed by the
/// XOR distance to our own id. Addresses handed to [`admit`](Self::admit)
/// wait in the pool until the node answers and [`verify`](Self::verify)
/// promotes it. The pool holds at most [`DHT_MAX_UNIDENTIFIED`] addresses.
pub struct RoutingTable {
    our_id: NodeId,
    buckets: Vec<RwLock<Bucket>>,
    unidentified: RwLock<NodePool>,
}

impl RoutingTable {
    pub fn new(our_id: NodeId) -> Self {
        let buckets = (0..DHT_BUCKETS)
            .map(|_| RwLock::new(Bucket::new()))
            .collect();

        Self {
            our_id,
            buckets,
            unidentified: RwLock::new(NodePool::default()),
        }
    }

    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    /// Up to K identified nodes, nearest to `target` first.
    pub fn find_node(&self, target: &NodeId) -> Vec<NodeSession> {
        let mut nodes: Vec<(NodeSession, [u8; 20])> = Vec::new();

        for bucket in &self.buckets {
            let bucket = bucket.read();
            for node in &bucket.nodes {
                if let Some(id) = node.id {
                    nodes.push((node.clone(), id.distance(target)));
                }
            }
        }

        nodes.sort_by(|a, b| a.1.cmp(&b.1));
        nodes.truncate(DHT_K);
        nodes.into_iter().map(|(n, _)| n).collect()
    }

    /// Returns the session for `addr`, creating an unverified address-only
    /// one if the address is new. Calling it twice yields the same node.
    pub fn admit(&self, addr: SocketAddr) -> NodeSession {
        if let Some(node) = self.find_by_addr(&addr) {
            return node;
        }

        self.unidentified.write().entry(addr).clone()
    }

    /// Like [`admit`](Self::admit) for a node another node told us about,
    /// so its id is already known. It still has to answer before it is used.
    pub fn admit_node(&self, id: NodeId, addr: SocketAddr) -> NodeSession {
        if id == self.our_id {
            return NodeSession::with_id(id, addr);
        }
        if let Some(node) = self.find_by_addr(&addr) {
            return node;
        }

        let mut pool = self.unidentified.write();
        let node = pool.entry(addr);
        node.id.get_or_insert(id);
        node.clone()
    }

    /// Up to `limit` unverified nodes worth querying for `target`: those
    /// with a known id nearest first, then bare addresses oldest first.
    pub fn find_unidentified(&self, target: &NodeId, limit: usize) -> Vec<NodeSession> {
        let pool = self.unidentified.read();

        let mut with_id: Vec<(NodeSession, [u8; 20])> = pool
            .nodes
            .values()
            .filter_map(|node| node.id.map(|id| (node.clone(), id.distance(target))))
            .collect();
        with_id.sort_by(|a, b| a.1.cmp(&b.1));

        let bare = pool
            .order
            .iter()
            .filter_map(|addr| pool.nodes.get(addr))
            .filter(|node| node.id.is_none())
            .cloned();

        with_id
            .into_iter()
            .map(|(node, _)| node)
            .chain(bare)
            .take(limit)
            .collect()
    }

    /// The node at `addr` answered with `id`: it moves into its bucket as a
    /// verified, freshly seen node.
    pub fn verify(&self, addr: SocketAddr, id: NodeId) {
        self.unidentified.write().remove(&addr);

        if id == self.our_id {
            return;
        }

        let mut node = NodeSession::with_id(id, addr);
        node.verified = true;

        let bucket_idx = self.our_id.bucket_index(&id);
        let added = self.buckets[bucket_idx].write().add(node);
        if !added {
            trace!(%addr, bucket = bucket_idx, "bucket full, node cached");
        }
    }

    /// Records an unanswered query. Nodes that keep failing are evicted and
    /// replaced from the bucket's replacement cache.
    pub fn mark_failed(&self, addr: &SocketAddr) {
        for bucket in &self.buckets {
            let mut bucket = bucket.write();
            if let Some(node) = bucket.get_by_addr_mut(addr) {
                node.fail();
                if node.is_bad() {
                    debug!(%addr, "evicting dht node");
                    bucket.remove_addr(addr);
                }
                return;
            }
        }

        let mut pool = self.unidentified.write();
        if let Some(node) = pool.nodes.get_mut(addr) {
            node.fail();
            if node.is_bad() {
                pool.remove(addr);
            }
        }
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<NodeSession> {
        self.find_by_addr(addr)
            .or_else(|| self.unidentified.read().nodes.get(addr).cloned())
    }

    /// Identified nodes held in buckets.
    pub fn node_count(&self) -> usize {
        self.buckets.iter().map(|b| b.read().nodes.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.node_count() + self.unidentified.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_by_addr(&self, addr: &SocketAddr) -> Option<NodeSession> {
        self.buckets
            .iter()
            .find_map(|bucket| bucket.read().get_by_addr(addr).cloned())
    }
}
