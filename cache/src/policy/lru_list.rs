use std::{collections::HashMap, hash::Hash};

use generational_arena::{Arena, Index};

use super::Candidate;

#[derive(Debug)]
pub(super) struct Node<K> {
  pub(crate) key: K,
  pub(crate) weight: u64,
  /// The global access stamp of the last touch. Stamps strictly decrease
  /// from head to tail.
  pub(crate) stamp: u64,
  pub(crate) next: Option<Index>,
  pub(crate) prev: Option<Index>,
}

// A self-contained, weight-aware LRU list helper.
#[derive(Debug)]
pub(super) struct LruList<K: Eq + Hash + Clone> {
  // Arena stores all nodes contiguously.
  pub(crate) nodes: Arena<Node<K>>,
  // HashMap for O(1) lookup of a key to its node index in the arena.
  pub(crate) lookup: HashMap<K, Index>,
  // Head is the most-recently-used item.
  pub(crate) head: Option<Index>,
  // Tail is the least-recently-used item.
  pub(crate) tail: Option<Index>,
  // Total weight of all items in the list.
  pub(crate) current_weight: u64,
}

impl<K: Eq + Hash + Clone> LruList<K> {
  pub fn new() -> Self {
    Self {
      nodes: Arena::new(),
      lookup: HashMap::new(),
      head: None,
      tail: None,
      current_weight: 0,
    }
  }

  // Helper to unlink a node from the list.
  // This is a private method as it doesn't handle arena/map removal.
  fn unlink(&mut self, index: Index) {
    let node = &self.nodes[index];
    let prev_node_idx = node.prev;
    let next_node_idx = node.next;

    if let Some(prev_idx) = prev_node_idx {
      self.nodes[prev_idx].next = next_node_idx;
    } else {
      self.head = next_node_idx;
    }

    if let Some(next_idx) = next_node_idx {
      self.nodes[next_idx].prev = prev_node_idx;
    } else {
      self.tail = prev_node_idx;
    }
  }

  // Helper to push a node to the front (making it the new head).
  // This is a private method as it assumes the node is already in the arena.
  fn push_front_node(&mut self, index: Index) {
    let old_head_idx = self.head;
    self.nodes[index].next = old_head_idx;
    self.nodes[index].prev = None;
    self.head = Some(index);

    if let Some(old_head) = old_head_idx {
      self.nodes[old_head].prev = Some(index);
    }

    if self.tail.is_none() {
      self.tail = Some(index);
    }
  }

  pub fn contains(&self, key: &K) -> bool {
    self.lookup.contains_key(key)
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.lookup.len()
  }

  #[cfg(test)]
  pub fn current_total_weight(&self) -> u64 {
    self.current_weight
  }

  /// Inserts `key` at the head, or moves it there and updates its weight.
  pub fn push_front(&mut self, key: K, weight: u64, stamp: u64) {
    if let Some(&index) = self.lookup.get(&key) {
      let old_weight = self.nodes[index].weight;
      self.current_weight = self.current_weight.saturating_sub(old_weight) + weight;
      self.nodes[index].weight = weight;
      self.move_to_front(&key, stamp);
    } else {
      let new_node = Node {
        key: key.clone(),
        weight,
        stamp,
        next: None,
        prev: None,
      };
      let index = self.nodes.insert(new_node);
      self.lookup.insert(key, index);
      self.current_weight += weight;
      self.push_front_node(index);
    }
  }

  /// Changes the weight of `key` in place. Unknown keys are ignored.
  pub fn set_weight(&mut self, key: &K, weight: u64) {
    if let Some(&index) = self.lookup.get(key) {
      let node = &mut self.nodes[index];
      self.current_weight = self.current_weight.saturating_sub(node.weight) + weight;
      node.weight = weight;
    }
  }

  /// Marks `key` as the most recently used. Unknown keys are ignored.
  pub fn move_to_front(&mut self, key: &K, stamp: u64) {
    if let Some(&index) = self.lookup.get(key) {
      self.nodes[index].stamp = stamp;
      if self.head != Some(index) {
        self.unlink(index);
        self.push_front_node(index);
      }
    }
  }

  pub fn peek_back(&self) -> Option<Candidate<K>> {
    let node = self.nodes.get(self.tail?)?;
    Some(Candidate {
      key: node.key.clone(),
      weight: node.weight,
      stamp: node.stamp,
    })
  }

  pub fn remove(&mut self, key: &K) -> Option<u64> {
    let index = self.lookup.remove(key)?;
    self.unlink(index);
    let node = self.nodes.remove(index)?;
    self.current_weight = self.current_weight.saturating_sub(node.weight);
    Some(node.weight)
  }

  pub fn clear(&mut self) {
    self.nodes.clear();
    self.lookup.clear();
    self.head = None;
    self.tail = None;
    self.current_weight = 0;
  }

  // A helper for tests, to get the order of keys from head to tail.
  #[cfg(test)]
  pub(crate) fn keys_as_vec(&self) -> Vec<K> {
    let mut keys = Vec::new();
    let mut current = self.head;
    while let Some(index) = current {
      keys.push(self.nodes[index].key.clone());
      current = self.nodes[index].next;
    }
    keys
  }
}
