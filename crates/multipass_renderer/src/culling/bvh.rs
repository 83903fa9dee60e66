//! Dynamic bounding-volume tree
//!
//! Binary AABB tree with incremental insertion by surface-area cost. Every refit walks
//! back to the root rotating subtrees whose heights differ by more than one, so the
//! tree stays logarithmic whatever the insertion order. Leaves store their proxy's
//! bounds grown by a margin, so objects moving a little do not restructure the tree.
//! Nodes live in a slot map; leaf keys stay stable across updates.

use crate::foundation::collections::{BvhNodeKey, ProxyKey, SlotMap};
use crate::geometry::AABB;

/// Leaf or branch payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvhNodeKind {
    /// Leaf referencing one culling proxy
    Leaf(ProxyKey),
    /// Branch with exactly two children
    Branch(BvhNodeKey, BvhNodeKey),
}

/// Single node in the tree
#[derive(Debug, Clone)]
pub struct BvhNode {
    /// Bounds of everything below this node (fattened for leaves)
    pub aabb: AABB,
    /// Leaf or branch payload
    pub kind: BvhNodeKind,
    parent: Option<BvhNodeKey>,
    /// 0 for leaves
    height: usize,
}

impl BvhNode {
    /// Check if this node is a leaf
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, BvhNodeKind::Leaf(_))
    }
}

/// Dynamic AABB tree
#[derive(Debug, Clone)]
pub struct BoundingVolumeTree {
    nodes: SlotMap<BvhNodeKey, BvhNode>,
    root: Option<BvhNodeKey>,
    margin: f32,
    leaf_count: usize,
}

impl Default for BoundingVolumeTree {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl BoundingVolumeTree {
    /// Create an empty tree; `margin` fattens every leaf box
    pub fn new(margin: f32) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            margin: margin.max(0.0),
            leaf_count: 0,
        }
    }

    /// Root node, `None` when empty
    pub fn root(&self) -> Option<BvhNodeKey> {
        self.root
    }

    /// Node lookup
    pub fn node(&self, key: BvhNodeKey) -> Option<&BvhNode> {
        self.nodes.get(key)
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.leaf_count
    }

    /// Check if the tree has no leaves
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Insert a leaf for `proxy` bounded by `aabb`
    pub fn insert(&mut self, proxy: ProxyKey, aabb: AABB) -> BvhNodeKey {
        let leaf = self.nodes.insert(BvhNode {
            aabb: aabb.inflated(self.margin),
            kind: BvhNodeKind::Leaf(proxy),
            parent: None,
            height: 0,
        });
        self.attach(leaf);
        self.leaf_count += 1;
        leaf
    }

    /// Remove a leaf, returning its proxy
    pub fn remove(&mut self, leaf: BvhNodeKey) -> Option<ProxyKey> {
        let proxy = match self.nodes.get(leaf)?.kind {
            BvhNodeKind::Leaf(proxy) => proxy,
            BvhNodeKind::Branch(..) => return None,
        };
        self.detach(leaf);
        self.nodes.remove(leaf);
        self.leaf_count -= 1;
        Some(proxy)
    }

    /// Update a leaf's bounds; returns `true` if the leaf had to be reinserted
    pub fn update(&mut self, leaf: BvhNodeKey, aabb: AABB) -> bool {
        let Some(node) = self.nodes.get(leaf) else {
            return false;
        };
        if !node.is_leaf() || node.aabb.contains(&aabb) {
            return false;
        }

        self.detach(leaf);
        let fat = aabb.inflated(self.margin);
        if let Some(node) = self.nodes.get_mut(leaf) {
            node.aabb = fat;
        }
        self.attach(leaf);
        true
    }

    /// Depth-first walk; `visit` gets each node's bounds plus the proxy for leaves and
    /// returns whether to descend into a branch's children
    pub fn walk(&self, mut visit: impl FnMut(&AABB, Option<ProxyKey>) -> bool) {
        let Some(root) = self.root else {
            return;
        };

        let mut stack = vec![root];
        while let Some(key) = stack.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            match node.kind {
                BvhNodeKind::Leaf(proxy) => {
                    visit(&node.aabb, Some(proxy));
                }
                BvhNodeKind::Branch(left, right) => {
                    if visit(&node.aabb, None) {
                        stack.push(right);
                        stack.push(left);
                    }
                }
            }
        }
    }

    /// Height of the tree (0 when empty, 1 for a single leaf)
    pub fn height(&self) -> usize {
        self.root.map_or(0, |root| self.nodes[root].height + 1)
    }

    /// Link an unparented leaf into the tree next to the cheapest sibling
    fn attach(&mut self, leaf: BvhNodeKey) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            return;
        };
        let leaf_aabb = self.nodes[leaf].aabb;

        let mut index = root;
        while let BvhNodeKind::Branch(left, right) = self.nodes[index].kind {
            let area = self.nodes[index].aabb.surface_area();
            let combined_area = self.nodes[index].aabb.merged(&leaf_aabb).surface_area();

            // Cost of making a new parent for this node and the leaf
            let cost = 2.0 * combined_area;
            // Minimum cost of pushing the leaf further down
            let inheritance_cost = 2.0 * (combined_area - area);

            let child_cost = |child: BvhNodeKey| {
                let node = &self.nodes[child];
                let merged = node.aabb.merged(&leaf_aabb).surface_area();
                if node.is_leaf() {
                    merged + inheritance_cost
                } else {
                    merged - node.aabb.surface_area() + inheritance_cost
                }
            };
            let cost_left = child_cost(left);
            let cost_right = child_cost(right);

            if cost < cost_left && cost < cost_right {
                break;
            }
            index = if cost_left < cost_right { left } else { right };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let merged = self.nodes[sibling].aabb.merged(&leaf_aabb);
        let new_parent = self.nodes.insert(BvhNode {
            aabb: merged,
            kind: BvhNodeKind::Branch(sibling, leaf),
            parent: old_parent,
            height: self.nodes[sibling].height + 1,
        });
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        match old_parent {
            Some(parent) => self.replace_child(parent, sibling, new_parent),
            None => self.root = Some(new_parent),
        }
        self.refit(Some(new_parent));
    }

    /// Unlink a leaf from the tree; its sibling takes the parent's place
    fn detach(&mut self, leaf: BvhNodeKey) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }
        let Some(parent) = self.nodes.get(leaf).and_then(|n| n.parent) else {
            return;
        };

        let sibling = match self.nodes[parent].kind {
            BvhNodeKind::Branch(left, right) => if left == leaf { right } else { left },
            BvhNodeKind::Leaf(_) => return,
        };
        let grandparent = self.nodes[parent].parent;
        self.nodes.remove(parent);
        self.nodes[sibling].parent = grandparent;
        self.nodes[leaf].parent = None;

        match grandparent {
            Some(grandparent) => {
                self.replace_child(grandparent, parent, sibling);
                self.refit(Some(grandparent));
            }
            None => self.root = Some(sibling),
        }
    }

    fn replace_child(&mut self, parent: BvhNodeKey, old: BvhNodeKey, new: BvhNodeKey) {
        if let BvhNodeKind::Branch(left, right) = &mut self.nodes[parent].kind {
            if *left == old {
                *left = new;
            } else if *right == old {
                *right = new;
            }
        }
    }

    /// Rebalance and recompute branch bounds from `start` up to the root
    fn refit(&mut self, start: Option<BvhNodeKey>) {
        let mut current = start;
        while let Some(key) = current {
            let key = self.balance(key);
            self.update_branch(key);
            current = self.nodes[key].parent;
        }
    }

    /// Bounds and height of a branch from its children
    fn update_branch(&mut self, key: BvhNodeKey) {
        if let BvhNodeKind::Branch(left, right) = self.nodes[key].kind {
            let (left, right) = (&self.nodes[left], &self.nodes[right]);
            let aabb = left.aabb.merged(&right.aabb);
            let height = 1 + left.height.max(right.height);
            let node = &mut self.nodes[key];
            node.aabb = aabb;
            node.height = height;
        }
    }

    /// Rotate the taller child of `key` up when its children differ in height by more
    /// than one; returns the node now at `key`'s place
    fn balance(&mut self, key: BvhNodeKey) -> BvhNodeKey {
        let BvhNodeKind::Branch(left, right) = self.nodes[key].kind else {
            return key;
        };
        let left_height = self.nodes[left].height;
        let right_height = self.nodes[right].height;
        if right_height > left_height + 1 {
            self.rotate_up(key, right)
        } else if left_height > right_height + 1 {
            self.rotate_up(key, left)
        } else {
            key
        }
    }

    /// Make the branch `child` the parent of `key`. The child keeps its taller subtree and
    /// hands the shorter one down to `key`.
    fn rotate_up(&mut self, key: BvhNodeKey, child: BvhNodeKey) -> BvhNodeKey {
        let BvhNodeKind::Branch(first, second) = self.nodes[child].kind else {
            return key;
        };
        let (kept, moved) = if self.nodes[first].height >= self.nodes[second].height {
            (first, second)
        } else {
            (second, first)
        };

        let parent = self.nodes[key].parent;
        match parent {
            Some(parent) => self.replace_child(parent, key, child),
            None => self.root = Some(child),
        }
        self.nodes[child].parent = parent;
        self.nodes[child].kind = BvhNodeKind::Branch(key, kept);
        self.nodes[key].parent = Some(child);
        self.replace_child(key, child, moved);
        self.nodes[moved].parent = Some(key);

        self.update_branch(key);
        self.update_branch(child);
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn unit_box_at(x: f32) -> AABB {
        AABB::from_center_extents(Vec3::new(x, 0.0, 0.0), Vec3::repeat(0.5))
    }

    fn proxy_keys(count: usize) -> Vec<ProxyKey> {
        let mut keys = SlotMap::<ProxyKey, ()>::with_key();
        (0..count).map(|_| keys.insert(())).collect()
    }

    fn collect_leaves(tree: &BoundingVolumeTree) -> Vec<ProxyKey> {
        let mut leaves = Vec::new();
        tree.walk(|_, proxy| {
            if let Some(proxy) = proxy {
                leaves.push(proxy);
            }
            true
        });
        leaves
    }

    fn max_balanced_height(leaves: usize) -> usize {
        2 * (leaves as f32).log2().ceil() as usize + 1
    }

    /// Parent links, stored heights, bounds and AVL balance of every branch
    fn assert_well_formed(tree: &BoundingVolumeTree) {
        let Some(root) = tree.root else {
            return;
        };
        assert_eq!(tree.nodes[root].parent, None);
        for (key, node) in &tree.nodes {
            if let BvhNodeKind::Branch(left, right) = node.kind {
                let (l, r) = (&tree.nodes[left], &tree.nodes[right]);
                assert_eq!(l.parent, Some(key));
                assert_eq!(r.parent, Some(key));
                assert_eq!(node.height, 1 + l.height.max(r.height));
                assert!(l.height.abs_diff(r.height) <= 1, "unbalanced branch");
                assert!(node.aabb.contains(&l.aabb) && node.aabb.contains(&r.aabb));
            }
        }
    }

    #[test]
    fn test_empty_tree_walk_visits_nothing() {
        let tree = BoundingVolumeTree::default();
        let mut visited = 0;
        tree.walk(|_, _| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_insert_and_remove_keep_every_leaf_reachable() {
        let mut tree = BoundingVolumeTree::new(0.0);
        let proxies = proxy_keys(16);
        let leaves: Vec<_> = proxies
            .iter()
            .enumerate()
            .map(|(i, proxy)| tree.insert(*proxy, unit_box_at(i as f32 * 2.0)))
            .collect();

        assert_eq!(tree.len(), 16);
        assert_eq!(collect_leaves(&tree).len(), 16);
        assert!(tree.height() <= max_balanced_height(16), "height {}", tree.height());
        assert_well_formed(&tree);

        for leaf in leaves.iter().step_by(2) {
            assert!(tree.remove(*leaf).is_some());
        }
        assert_well_formed(&tree);
        let remaining = collect_leaves(&tree);
        assert_eq!(remaining.len(), 8);
        assert!(remaining.iter().all(|p| proxies.iter().skip(1).step_by(2).any(|q| q == p)));
    }

    #[test]
    fn test_sequential_row_stays_logarithmic() {
        let mut tree = BoundingVolumeTree::new(0.1);
        let proxies = proxy_keys(1024);
        let leaves: Vec<_> = proxies
            .iter()
            .enumerate()
            .map(|(i, proxy)| tree.insert(*proxy, unit_box_at(i as f32)))
            .collect();

        assert_eq!(tree.len(), 1024);
        assert!(tree.height() <= max_balanced_height(1024), "height {}", tree.height());
        assert_well_formed(&tree);

        // Drain one end and move the rest far away
        for leaf in &leaves[..512] {
            tree.remove(*leaf);
        }
        for (i, leaf) in leaves[512..].iter().enumerate() {
            tree.update(*leaf, unit_box_at(-(i as f32) * 3.0 - 100.0));
        }
        assert_eq!(collect_leaves(&tree).len(), 512);
        assert!(tree.height() <= max_balanced_height(512), "height {}", tree.height());
        assert_well_formed(&tree);
    }

    #[test]
    fn test_root_bounds_cover_all_leaves() {
        let mut tree = BoundingVolumeTree::new(0.0);
        for (i, proxy) in proxy_keys(5).into_iter().enumerate() {
            tree.insert(proxy, unit_box_at(i as f32 * 10.0));
        }
        let root = tree.root().and_then(|r| tree.node(r)).map(|n| n.aabb);
        let root = root.unwrap();
        assert!(root.contains(&unit_box_at(0.0)));
        assert!(root.contains(&unit_box_at(40.0)));
    }

    #[test]
    fn test_small_move_stays_in_fat_box() {
        let mut tree = BoundingVolumeTree::new(0.5);
        let proxy = proxy_keys(1)[0];
        let leaf = tree.insert(proxy, unit_box_at(0.0));

        assert!(!tree.update(leaf, unit_box_at(0.2)));
        assert!(tree.update(leaf, unit_box_at(5.0)));
        // Leaf key survives reinsertion
        assert_eq!(tree.node(leaf).map(|n| n.kind), Some(BvhNodeKind::Leaf(proxy)));
        assert!(tree.node(leaf).unwrap().aabb.contains(&unit_box_at(5.0)));
    }
}
