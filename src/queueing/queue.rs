//! Ordered, de-duplicating player queue.
//!
//! Strict insertion order, one entry per player, safe under concurrent
//! callers. `snapshot` hands out node handles so an iterating loop can
//! remove entries without racing a concurrent removal: a node unlinks at
//! most once.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::players::types::Player;

pub struct QueueNode {
    pub player: Arc<Player>,
    linked: AtomicBool,
}

impl QueueNode {
    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Added { position: usize, length: usize },
    AlreadyQueued,
    CapReached,
}

pub struct PlayerQueue {
    inner: Mutex<QueueInner>,
}

struct QueueInner {
    order: VecDeque<Arc<QueueNode>>,
    index: HashMap<String, Arc<QueueNode>>,
}

impl PlayerQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                order: VecDeque::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// Appends `player` unless present or the queue already holds `cap`
    /// entries. Reports the 1-indexed position on success.
    pub fn enqueue(&self, player: Arc<Player>, cap: usize) -> EnqueueOutcome {
        let mut inner = self.inner.lock().unwrap();
        if inner.index.contains_key(&player.stable_id) {
            return EnqueueOutcome::AlreadyQueued;
        }
        if inner.order.len() >= cap {
            return EnqueueOutcome::CapReached;
        }
        let node = Arc::new(QueueNode {
            player: Arc::clone(&player),
            linked: AtomicBool::new(true),
        });
        inner.order.push_back(Arc::clone(&node));
        inner.index.insert(player.stable_id.clone(), node);
        EnqueueOutcome::Added {
            position: inner.order.len(),
            length: inner.order.len(),
        }
    }

    /// Removes by player identity.
    pub fn try_remove(&self, player: &Player) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.index.remove(&player.stable_id) {
            Some(node) => {
                node.linked.store(false, Ordering::Release);
                inner.order.retain(|n| !Arc::ptr_eq(n, &node));
                true
            }
            None => false,
        }
    }

    /// Removes through a node handle; succeeds only if the node is still
    /// linked, so two concurrent removals settle on one winner.
    pub fn try_remove_node(&self, node: &Arc<QueueNode>) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if !node.is_linked() {
            return false;
        }
        node.linked.store(false, Ordering::Release);
        inner.index.remove(&node.player.stable_id);
        inner.order.retain(|n| !Arc::ptr_eq(n, node));
        true
    }

    pub fn contains(&self, player: &Player) -> bool {
        self.inner.lock().unwrap().index.contains_key(&player.stable_id)
    }

    /// Point-in-time iteration order.
    pub fn snapshot(&self) -> Vec<Arc<QueueNode>> {
        self.inner.lock().unwrap().order.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().order.is_empty()
    }
}

impl Default for PlayerQueue {
    fn default() -> Self {
        Self::new()
    }
}
