//! Self-adjusting binary search tree
//!
//! Classic bottom-up splay tree over an index arena (no unsafe, no Rc).
//! Every successful lookup splays the accessed node to the root, so hot keys
//! cluster near the top and the structurally coldest node drifts toward the
//! end of a level-order traversal.

use std::collections::VecDeque;

struct Node<K, V> {
    key: K,
    value: V,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
}

pub struct SplayTree<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
}

impl<K: Ord + Clone, V> SplayTree<K, V> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert or overwrite; either way the key ends up at the root
    pub fn insert(&mut self, key: K, value: V) {
        let Some(mut current) = self.root else {
            self.root = Some(self.alloc(key, value, None));
            return;
        };

        loop {
            let next = {
                let node = self.node(current);
                match key.cmp(&node.key) {
                    std::cmp::Ordering::Equal => {
                        self.node_mut(current).value = value;
                        self.splay(current);
                        return;
                    }
                    std::cmp::Ordering::Less => node.left,
                    std::cmp::Ordering::Greater => node.right,
                }
            };

            match next {
                Some(child) => current = child,
                None => {
                    let idx = self.alloc(key.clone(), value, Some(current));
                    let parent = self.node_mut(current);
                    if key < parent.key {
                        parent.left = Some(idx);
                    } else {
                        parent.right = Some(idx);
                    }
                    self.splay(idx);
                    return;
                }
            }
        }
    }

    /// Look up a key and splay it to the root on a hit
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = self.find(key)?;
        self.splay(idx);
        Some(&mut self.node_mut(idx).value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.find(key)?;
        self.splay(idx);

        let left = self.node(idx).left;
        let right = self.node(idx).right;
        if let Some(l) = left {
            self.node_mut(l).parent = None;
        }
        if let Some(r) = right {
            self.node_mut(r).parent = None;
        }

        // Join: splay the maximum of the left subtree to its root, then hang
        // the right subtree off it.
        self.root = match (left, right) {
            (None, r) => r,
            (Some(l), None) => Some(l),
            (Some(l), Some(r)) => {
                let mut max = l;
                while let Some(next) = self.node(max).right {
                    max = next;
                }
                self.splay(max);
                self.node_mut(max).right = Some(r);
                self.node_mut(r).parent = Some(max);
                Some(max)
            }
        };

        self.len -= 1;
        self.free.push(idx);
        self.slots[idx].take().map(|node| node.value)
    }

    /// Breadth-first traversal, left child before right
    pub fn level_order(&self) -> impl Iterator<Item = (&K, &V)> {
        self.level_order_indices()
            .into_iter()
            .map(|idx| {
                let node = self.node(idx);
                (&node.key, &node.value)
            })
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Key of the last node in level order, used as the eviction victim
    pub fn last_level_order_key(&self) -> Option<K> {
        self.level_order_indices()
            .last()
            .map(|idx| self.node(*idx).key.clone())
    }

    fn level_order_indices(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.len);
        let mut queue = VecDeque::new();
        if let Some(root) = self.root {
            queue.push_back(root);
        }
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            let node = self.node(idx);
            if let Some(l) = node.left {
                queue.push_back(l);
            }
            if let Some(r) = node.right {
                queue.push_back(r);
            }
        }
        order
    }

    fn find(&self, key: &K) -> Option<usize> {
        let mut current = self.root;
        while let Some(idx) = current {
            let node = self.node(idx);
            current = match key.cmp(&node.key) {
                std::cmp::Ordering::Equal => return Some(idx),
                std::cmp::Ordering::Less => node.left,
                std::cmp::Ordering::Greater => node.right,
            };
        }
        None
    }

    fn alloc(&mut self, key: K, value: V, parent: Option<usize>) -> usize {
        self.len += 1;
        let node = Node {
            key,
            value,
            left: None,
            right: None,
            parent,
        };
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    // Index accessors: slot validity is an internal invariant; every index
    // handed around comes from alloc and dies in remove.
    fn node(&self, idx: usize) -> &Node<K, V> {
        self.slots[idx].as_ref().expect("splay node index valid")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.slots[idx].as_mut().expect("splay node index valid")
    }

    /// Bottom-up splay: zig / zig-zig / zig-zag until `target` is a root
    fn splay(&mut self, target: usize) {
        while let Some(parent) = self.node(target).parent {
            match self.node(parent).parent {
                None => self.rotate_up(target),
                Some(grand) => {
                    let target_is_left = self.node(parent).left == Some(target);
                    let parent_is_left = self.node(grand).left == Some(parent);
                    if target_is_left == parent_is_left {
                        self.rotate_up(parent);
                        self.rotate_up(target);
                    } else {
                        self.rotate_up(target);
                        self.rotate_up(target);
                    }
                }
            }
        }
        self.root = Some(target);
    }

    /// Rotate `child` above its parent, preserving BST order
    fn rotate_up(&mut self, child: usize) {
        let Some(parent) = self.node(child).parent else {
            return;
        };
        let grand = self.node(parent).parent;

        if self.node(parent).left == Some(child) {
            let inner = self.node(child).right;
            self.node_mut(parent).left = inner;
            if let Some(inner) = inner {
                self.node_mut(inner).parent = Some(parent);
            }
            self.node_mut(child).right = Some(parent);
        } else {
            let inner = self.node(child).left;
            self.node_mut(parent).right = inner;
            if let Some(inner) = inner {
                self.node_mut(inner).parent = Some(parent);
            }
            self.node_mut(child).left = Some(parent);
        }

        self.node_mut(parent).parent = Some(child);
        self.node_mut(child).parent = grand;

        match grand {
            Some(grand) => {
                if self.node(grand).left == Some(parent) {
                    self.node_mut(grand).left = Some(child);
                } else {
                    self.node_mut(grand).right = Some(child);
                }
            }
            None => self.root = Some(child),
        }
    }
}

impl<K: Ord + Clone, V> Default for SplayTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut tree = SplayTree::new();
        for key in [5, 2, 8, 1, 9] {
            tree.insert(key, key * 10);
        }

        assert_eq!(tree.len(), 5);
        assert_eq!(tree.get_mut(&8), Some(&mut 80));
        assert_eq!(tree.get_mut(&42), None);
    }

    #[test]
    fn test_insert_overwrites_existing_key() {
        let mut tree = SplayTree::new();
        tree.insert(1, "old");
        tree.insert(1, "new");

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get_mut(&1), Some(&mut "new"));
    }

    #[test]
    fn test_access_splays_to_root() {
        let mut tree = SplayTree::new();
        for key in 0..16 {
            tree.insert(key, ());
        }

        tree.get_mut(&3);
        let first = tree.level_order().next().map(|(k, _)| *k);
        assert_eq!(first, Some(3));
    }

    #[test]
    fn test_remove_preserves_remaining_keys() {
        let mut tree = SplayTree::new();
        for key in [5, 2, 8, 1, 9, 3] {
            tree.insert(key, key);
        }

        assert_eq!(tree.remove(&5), Some(5));
        assert_eq!(tree.remove(&5), None);
        assert_eq!(tree.len(), 5);

        for key in [2, 8, 1, 9, 3] {
            assert!(tree.contains(&key), "lost key {key}");
        }
    }

    #[test]
    fn test_remove_all_empties_tree() {
        let mut tree = SplayTree::new();
        for key in 0..32 {
            tree.insert(key, key);
        }
        for key in 0..32 {
            assert_eq!(tree.remove(&key), Some(key));
        }
        assert!(tree.is_empty());
        assert_eq!(tree.last_level_order_key(), None);
    }

    #[test]
    fn test_level_order_visits_every_node() {
        let mut tree = SplayTree::new();
        for key in [4, 7, 1, 9, 3, 6] {
            tree.insert(key, ());
        }

        let mut seen: Vec<i32> = tree.level_order().map(|(k, _)| *k).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 3, 4, 6, 7, 9]);
    }

    #[test]
    fn test_arena_slot_reuse() {
        let mut tree = SplayTree::new();
        for round in 0..4 {
            for key in 0..8 {
                tree.insert(round * 8 + key, ());
            }
            for key in 0..8 {
                tree.remove(&(round * 8 + key));
            }
        }
        assert!(tree.is_empty());
        // Slots come back off the free list instead of growing the arena.
        assert!(tree.slots.len() <= 8);
    }
}
