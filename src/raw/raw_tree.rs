use core::borrow::Borrow;
use core::fmt;

use tracing::trace;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{Bucket, InternalNode, LeafNode, Node, SearchResult};
use crate::order::Order;

/// The core B+Tree implementation backing `BPlusTree`.
///
/// All nodes live in one arena. Children are owned through the arena and
/// reached top-down; `parent`, `prev` and `next` are plain handles.
pub(crate) struct RawBPlusTree<K, V> {
    /// Arena storing all tree nodes.
    nodes: Arena<Node<K, V>>,
    /// Handle to the root. A leaf until the first split.
    root: Handle,
    /// Branching factor.
    order: Order,
    /// Total number of stored values across all buckets.
    len: usize,
    /// Number of distinct keys.
    key_count: usize,
    /// Debug number handed to the next node created.
    next_id: u64,
}

impl<K, V> RawBPlusTree<K, V> {
    /// Creates a tree holding a single empty root leaf.
    pub(crate) fn new(order: Order) -> Self {
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::Leaf(LeafNode::new(1)));
        Self {
            nodes,
            root,
            order,
            len: 0,
            key_count: 0,
            next_id: 2,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) const fn order(&self) -> Order {
        self.order
    }

    /// Returns the number of stored values.
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Returns the number of distinct keys.
    pub(crate) const fn key_count(&self) -> usize {
        self.key_count
    }

    /// Drops every node and starts over with an empty root leaf. Node ids
    /// keep counting up.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        let id = self.next_id();
        self.root = self.nodes.alloc(Node::Leaf(LeafNode::new(id)));
        self.len = 0;
        self.key_count = 0;
    }

    pub(crate) const fn root(&self) -> Handle {
        self.root
    }

    /// Returns a reference to a node by handle.
    pub(crate) fn node(&self, handle: Handle) -> &Node<K, V> {
        self.nodes.get(handle)
    }

    /// Number of live nodes.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of levels, counting the leaf level.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(0);
            height += 1;
        }
        height
    }

    /// Follows first-child pointers down from the root.
    pub(crate) fn leftmost_leaf(&self) -> Handle {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(0);
        }
        current
    }

    /// Follows last-child pointers down from the root.
    pub(crate) fn rightmost_leaf(&self) -> Handle {
        let mut current = self.root;
        while let Node::Internal(internal) = self.nodes.get(current) {
            current = internal.child(internal.child_count() - 1);
        }
        current
    }

    /// Walks the leaf chain and hands every value to `f`, in scan order.
    pub(crate) fn for_each_value_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V),
    {
        let mut current = Some(self.leftmost_leaf());
        while let Some(handle) = current {
            let leaf = self.nodes.get_mut(handle).as_leaf_mut();
            for (key, bucket) in leaf.entries_mut() {
                for value in bucket.as_mut_slice() {
                    f(key, value);
                }
            }
            current = leaf.next();
        }
    }

    /// Position of `child` in `parent`'s child list.
    fn child_index(&self, parent: Handle, child: Handle) -> usize {
        match self.nodes.get(parent).as_internal().position_of(child) {
            Some(index) => index,
            None => panic!("node {child:?} is not a child of its parent {parent:?}"),
        }
    }

    /// Points every child of `handle` back at it.
    fn reparent_children(&mut self, handle: Handle) {
        for i in 0..self.nodes.get(handle).as_internal().child_count() {
            let child = self.nodes.get(handle).as_internal().child(i);
            self.nodes.get_mut(child).set_parent(Some(handle));
        }
    }

    /// Replaces a key-less internal root by its only child.
    fn collapse_root(&mut self) {
        while let Some(child) = match self.nodes.get(self.root) {
            Node::Internal(root) => root.sole_child(),
            Node::Leaf(_) => None,
        } {
            trace!(old_root = ?self.root, new_root = ?child, "collapsing root");
            self.nodes.free(self.root);
            self.nodes.get_mut(child).set_parent(None);
            self.root = child;
        }
    }
}

impl<K: Ord + Clone, V> RawBPlusTree<K, V> {
    /// Descends from the root with `find` until a leaf is reached.
    fn descend<Q>(&self, key: &Q) -> Handle
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        loop {
            match self.nodes.get(current) {
                Node::Internal(internal) => current = internal.child(internal.find(key)),
                Node::Leaf(_) => return current,
            }
        }
    }

    /// Returns every value stored under `key`, oldest first.
    pub(crate) fn retrieve<Q>(&self, key: &Q) -> Option<&[V]>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf = self.nodes.get(self.descend(key)).as_leaf();
        match leaf.search(key) {
            SearchResult::Found(idx) => Some(leaf.bucket(idx).as_slice()),
            SearchResult::NotFound(_) => None,
        }
    }

    /// Position of the first key `>= key`, following the leaf chain past the
    /// end of the descent leaf if needed.
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> Option<(Handle, usize)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let handle = self.descend(key);
        let leaf = self.nodes.get(handle).as_leaf();
        let idx = leaf.lower_bound(key);
        if idx < leaf.key_count() {
            return Some((handle, idx));
        }

        let mut next = leaf.next();
        while let Some(handle) = next {
            let leaf = self.nodes.get(handle).as_leaf();
            if leaf.key_count() > 0 {
                return Some((handle, 0));
            }
            next = leaf.next();
        }
        None
    }

    /// Inserts `value` under `key`. An existing key gets the value appended
    /// to its bucket; nothing is ever overwritten.
    pub(crate) fn insert(&mut self, key: K, value: V) {
        let leaf_handle = self.descend(&key);
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        self.len += 1;

        match leaf.search(&key) {
            SearchResult::Found(idx) => {
                leaf.bucket_mut(idx).push(value);
            }
            SearchResult::NotFound(idx) => {
                leaf.insert(idx, key, Bucket::new(value));
                self.key_count += 1;
                self.split_while_overflowing(leaf_handle);
            }
        }
    }

    /// Splits `node` while it holds `m` keys, promoting each separator into
    /// the parent and moving up. Stops at the first parent with room, or
    /// after growing a new root.
    fn split_while_overflowing(&mut self, mut node: Handle) {
        while self.nodes.get(node).is_overflowing(self.order) {
            debug_assert_eq!(self.nodes.get(node).key_count(), self.order.get());

            let (separator, right) = self.split_node(node);
            match self.nodes.get(node).parent() {
                None => {
                    self.grow_root(node, separator, right);
                    return;
                }
                Some(parent) => {
                    let index = self.child_index(parent, node);
                    self.nodes.get_mut(parent).as_internal_mut().insert_child(index, separator, right);
                    self.nodes.get_mut(right).set_parent(Some(parent));
                    node = parent;
                }
            }
        }
    }

    /// Splits one overflowing node in place. The node keeps the left half;
    /// the returned handle is the new right half.
    fn split_node(&mut self, node: Handle) -> (K, Handle) {
        let right_id = self.next_id();
        let order = self.order;

        match self.nodes.get_mut(node) {
            Node::Leaf(leaf) => {
                let (separator, mut right) = leaf.split(order, right_id);
                let old_next = leaf.next();
                right.set_prev(Some(node));
                right.set_next(old_next);

                let right_handle = self.nodes.alloc(Node::Leaf(right));
                self.nodes.get_mut(node).as_leaf_mut().set_next(Some(right_handle));
                if let Some(old_next) = old_next {
                    self.nodes.get_mut(old_next).as_leaf_mut().set_prev(Some(right_handle));
                }

                trace!(left = ?node, right = ?right_handle, "split leaf");
                (separator, right_handle)
            }
            Node::Internal(internal) => {
                let (median, right) = internal.split(order, right_id);
                let right_handle = self.nodes.alloc(Node::Internal(right));
                self.reparent_children(right_handle);

                trace!(left = ?node, right = ?right_handle, "split internal node");
                (median, right_handle)
            }
        }
    }

    /// Puts a new root above a split root.
    fn grow_root(&mut self, left: Handle, separator: K, right: Handle) {
        let mut root = InternalNode::new(self.next_id());
        root.push_first_child(left);
        root.push_child(separator, right);

        let root_handle = self.nodes.alloc(Node::Internal(root));
        self.nodes.get_mut(left).set_parent(Some(root_handle));
        self.nodes.get_mut(right).set_parent(Some(root_handle));
        self.root = root_handle;

        trace!(root = ?root_handle, "grew new root");
    }

    /// Removes the most recently inserted value under `key`.
    pub(crate) fn remove_latest<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let leaf_handle = self.descend(key);
        let leaf = self.nodes.get_mut(leaf_handle).as_leaf_mut();
        let SearchResult::Found(idx) = leaf.search(key) else {
            return None;
        };

        let bucket = leaf.bucket_mut(idx);
        let value = bucket.pop_latest()?;
        self.len -= 1;
        if !bucket.is_empty() {
            return Some(value);
        }

        leaf.remove(idx);
        self.key_count -= 1;
        self.rebalance_from(leaf_handle);
        Some(value)
    }

    /// Restores the minimum fill from `node` upwards after it lost a key.
    ///
    /// Order of preference: borrow from the left sibling, borrow from the
    /// right sibling, merge into the left sibling, merge with the right
    /// sibling. A borrow ends the walk; a merge moves on to the parent.
    /// A borrow leaves the parent's key count unchanged, so the walk stops
    /// there even when an even-order split left the parent at the threshold.
    fn rebalance_from(&mut self, mut node: Handle) {
        let order = self.order;

        loop {
            let current = self.nodes.get(node);
            let Some(parent) = current.parent() else {
                break;
            };
            if !current.is_underflowed(order) {
                break;
            }

            let index = self.child_index(parent, node);
            let siblings = self.nodes.get(parent).as_internal();
            let left = index.checked_sub(1).map(|i| siblings.child(i));
            let right = (index + 1 < siblings.child_count()).then(|| siblings.child(index + 1));

            if let Some(left) = left.filter(|&h| !self.nodes.get(h).is_nearly_underflowed(order)) {
                self.borrow_from_left(node, left, parent, index);
                break;
            }
            if let Some(right) = right.filter(|&h| !self.nodes.get(h).is_nearly_underflowed(order)) {
                self.borrow_from_right(node, right, parent, index);
                break;
            }

            let merged = match (left, right) {
                (Some(left), _) => self.merge(left, node, parent, index - 1),
                (None, Some(right)) => self.merge(node, right, parent, index),
                (None, None) => unreachable!("non-root node {node:?} has no siblings"),
            };

            // Even orders: an internal merge can land on exactly `m` keys.
            // Splitting it hands the parent its separator back.
            if self.nodes.get(merged).is_overflowing(order) {
                self.split_while_overflowing(merged);
                break;
            }

            node = parent;
        }

        self.collapse_root();
    }

    /// Moves the left sibling's last entry to the front of `node`.
    fn borrow_from_left(&mut self, node: Handle, left: Handle, parent: Handle, index: usize) {
        if self.nodes.get(node).is_leaf() {
            let Some((key, bucket)) = self.nodes.get_mut(left).as_leaf_mut().pop() else {
                unreachable!("lending leaf {left:?} is empty");
            };
            self.nodes.get_mut(parent).as_internal_mut().set_key(index - 1, key.clone());
            self.nodes.get_mut(node).as_leaf_mut().push_front(key, bucket);
        } else {
            // Push-through: the parent separator comes down, the sibling's
            // last key goes up.
            let Some((left_key, child)) = self.nodes.get_mut(left).as_internal_mut().pop_child() else {
                unreachable!("lending node {left:?} has no keys");
            };
            let separator = self.nodes.get_mut(parent).as_internal_mut().set_key(index - 1, left_key);
            self.nodes.get_mut(node).as_internal_mut().push_child_front(separator, child);
            self.nodes.get_mut(child).set_parent(Some(node));
        }

        trace!(node = ?node, sibling = ?left, "borrowed from left sibling");
    }

    /// Moves the right sibling's first entry to the back of `node`.
    fn borrow_from_right(&mut self, node: Handle, right: Handle, parent: Handle, index: usize) {
        if self.nodes.get(node).is_leaf() {
            let right_leaf = self.nodes.get_mut(right).as_leaf_mut();
            let Some((key, bucket)) = right_leaf.pop_front() else {
                unreachable!("lending leaf {right:?} is empty");
            };
            let new_first = right_leaf.key(0).clone();
            self.nodes.get_mut(parent).as_internal_mut().set_key(index, new_first);
            self.nodes.get_mut(node).as_leaf_mut().push(key, bucket);
        } else {
            let Some((right_key, child)) = self.nodes.get_mut(right).as_internal_mut().pop_child_front() else {
                unreachable!("lending node {right:?} has no keys");
            };
            let separator = self.nodes.get_mut(parent).as_internal_mut().set_key(index, right_key);
            self.nodes.get_mut(node).as_internal_mut().push_child(separator, child);
            self.nodes.get_mut(child).set_parent(Some(node));
        }

        trace!(node = ?node, sibling = ?right, "borrowed from right sibling");
    }

    /// Folds `right` into `left`, dropping the separator at `separator_index`
    /// from the parent. Returns the surviving node.
    fn merge(&mut self, left: Handle, right: Handle, parent: Handle, separator_index: usize) -> Handle {
        let (separator, removed) = self.nodes.get_mut(parent).as_internal_mut().remove_child(separator_index);
        debug_assert_eq!(removed, right);

        match self.nodes.take(right) {
            Node::Leaf(right_leaf) => {
                let left_leaf = self.nodes.get_mut(left).as_leaf_mut();
                left_leaf.merge_with_right(right_leaf);
                if let Some(next) = left_leaf.next() {
                    self.nodes.get_mut(next).as_leaf_mut().set_prev(Some(left));
                }
            }
            Node::Internal(right_internal) => {
                self.nodes.get_mut(left).as_internal_mut().merge_with_right(separator, right_internal);
                self.reparent_children(left);
            }
        }

        trace!(left = ?left, right = ?right, "merged siblings");
        left
    }
}

impl<K: Ord + fmt::Debug, V> RawBPlusTree<K, V> {
    /// Checks every structural invariant and returns a description of each
    /// violation found.
    pub(crate) fn violations(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(parent) = self.nodes.get(self.root).parent() {
            errors.push(format!("root {:?} has parent {parent:?}", self.root));
        }
        if let Node::Internal(root) = self.nodes.get(self.root) {
            if root.key_count() == 0 {
                errors.push(format!("internal root {:?} has no keys", self.root));
            }
        }

        // 1. Validate tree structure and collect all leaves
        let mut leaves: Vec<Handle> = Vec::new();
        let mut leaf_depth: Option<usize> = None;
        let reachable = self.validate_node(
            self.root,
            None,
            0,
            (None, None),
            &mut leaf_depth,
            &mut leaves,
            &mut errors,
        );

        if reachable != self.nodes.len() {
            errors.push(format!("{} nodes allocated but {reachable} reachable", self.nodes.len()));
        }

        // 2. Validate leaf chain matches collected leaves
        self.validate_leaf_chain(&leaves, &mut errors);

        // 3. Validate counters
        let keys: usize = leaves.iter().map(|&h| self.nodes.get(h).as_leaf().key_count()).sum();
        let values: usize = leaves
            .iter()
            .flat_map(|&h| self.nodes.get(h).as_leaf().buckets())
            .map(Bucket::len)
            .sum();
        if keys != self.key_count {
            errors.push(format!("key_count mismatch: stored={}, actual={keys}", self.key_count));
        }
        if values != self.len {
            errors.push(format!("len mismatch: stored={}, actual={values}", self.len));
        }

        errors
    }

    /// Returns the number of nodes reachable from `handle`.
    #[allow(clippy::too_many_arguments)]
    fn validate_node(
        &self,
        handle: Handle,
        expected_parent: Option<Handle>,
        depth: usize,
        bounds: (Option<&K>, Option<&K>),
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<Handle>,
        errors: &mut Vec<String>,
    ) -> usize {
        let node = self.nodes.get(handle);
        let keys = node.keys();

        if node.parent() != expected_parent {
            errors.push(format!(
                "node {handle:?} has parent {:?}, expected {expected_parent:?}",
                node.parent()
            ));
        }
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            errors.push(format!("keys not strictly sorted at {handle:?}: {keys:?}"));
        }
        let (lower, upper) = bounds;
        for key in keys {
            if lower.is_some_and(|lower| key < lower) || upper.is_some_and(|upper| key >= upper) {
                errors.push(format!("key {key:?} at {handle:?} outside [{lower:?}, {upper:?})"));
            }
        }
        if node.is_overflowing(self.order) {
            errors.push(format!("node {handle:?} holds {} keys, order is {}", keys.len(), self.order));
        }
        if expected_parent.is_some() && (keys.is_empty() || keys.len() < self.order.min_keys()) {
            errors.push(format!("non-root node {handle:?} holds only {} keys", keys.len()));
        }

        match node {
            Node::Leaf(leaf) => {
                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        errors.push(format!("leaf {handle:?} at depth {depth}, expected {expected}"));
                    }
                    Some(_) => {}
                }
                if leaf.buckets().len() != leaf.key_count() {
                    errors.push(format!("leaf {handle:?} has {} buckets for {} keys", leaf.buckets().len(), leaf.key_count()));
                }
                if leaf.buckets().iter().any(Bucket::is_empty) {
                    errors.push(format!("leaf {handle:?} has an empty bucket"));
                }
                leaves.push(handle);
                1
            }
            Node::Internal(internal) => {
                if internal.child_count() != internal.key_count() + 1 {
                    errors.push(format!(
                        "internal {handle:?} has {} children for {} keys",
                        internal.child_count(),
                        internal.key_count()
                    ));
                }
                let mut reachable = 1;
                for (i, &child) in internal.children().iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { internal.keys().get(i - 1) };
                    let child_upper = internal.keys().get(i).or(upper);
                    reachable += self.validate_node(
                        child,
                        Some(handle),
                        depth + 1,
                        (child_lower, child_upper),
                        leaf_depth,
                        leaves,
                        errors,
                    );
                }
                reachable
            }
        }
    }

    fn validate_leaf_chain(&self, leaves: &[Handle], errors: &mut Vec<String>) {
        if leaves.first() != Some(&self.leftmost_leaf()) {
            errors.push(format!("leftmost leaf {:?} is not the first leaf", self.leftmost_leaf()));
        }
        if leaves.last() != Some(&self.rightmost_leaf()) {
            errors.push(format!("rightmost leaf {:?} is not the last leaf", self.rightmost_leaf()));
        }

        for (i, &handle) in leaves.iter().enumerate() {
            let leaf = self.nodes.get(handle).as_leaf();
            let expected_prev = i.checked_sub(1).map(|p| leaves[p]);
            let expected_next = leaves.get(i + 1).copied();
            if leaf.prev() != expected_prev {
                errors.push(format!(
                    "leaf chain prev mismatch at {handle:?}: expected {expected_prev:?}, got {:?}",
                    leaf.prev()
                ));
            }
            if leaf.next() != expected_next {
                errors.push(format!(
                    "leaf chain next mismatch at {handle:?}: expected {expected_next:?}, got {:?}",
                    leaf.next()
                ));
            }
            if let Some(next) = expected_next {
                let next_leaf = self.nodes.get(next).as_leaf();
                if let (Some(last), Some(first)) = (leaf.keys().last(), next_leaf.keys().first()) {
                    if last >= first {
                        errors.push(format!("leaf chain out of order between {handle:?} and {next:?}"));
                    }
                }
            }
        }
    }
}
