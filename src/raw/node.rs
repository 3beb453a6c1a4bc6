use core::borrow::Borrow;
use core::mem;

use smallvec::SmallVec;

use super::handle::Handle;
use crate::order::Order;

/// Inline capacity of the key and slot vectors. The default order never spills
/// to the heap, even while a node transiently holds `m` keys.
pub(crate) const INLINE_KEYS: usize = 8;

type Keys<K> = SmallVec<[K; INLINE_KEYS]>;
type Children = SmallVec<[Handle; INLINE_KEYS + 1]>;
type Buckets<V> = SmallVec<[Bucket<V>; INLINE_KEYS]>;

/// Values stored under one key, oldest first. Never empty while it is
/// reachable from a leaf.
#[derive(Clone, Debug)]
pub(crate) struct Bucket<V>(SmallVec<[V; 1]>);

impl<V> Bucket<V> {
    pub(crate) fn new(value: V) -> Self {
        let mut values = SmallVec::new();
        values.push(value);
        Self(values)
    }

    pub(crate) fn push(&mut self, value: V) {
        self.0.push(value);
    }

    /// Removes the most recently inserted value.
    pub(crate) fn pop_latest(&mut self) -> Option<V> {
        self.0.pop()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn as_slice(&self) -> &[V] {
        &self.0
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [V] {
        &mut self.0
    }
}

#[allow(clippy::large_enum_variant)]
pub(crate) enum Node<K, V> {
    Internal(InternalNode<K>),
    Leaf(LeafNode<K, V>),
}

// Internal nodes hold separators and `keys.len() + 1` child handles.
// Child `i` holds keys `< keys[i]`; the last child holds keys `>= keys.last()`.
pub(crate) struct InternalNode<K> {
    id: u64,
    parent: Option<Handle>,
    keys: Keys<K>,
    children: Children,
}

// Leaf nodes hold every key exactly once, each with its bucket of values.
pub(crate) struct LeafNode<K, V> {
    id: u64,
    parent: Option<Handle>,
    prev: Option<Handle>,
    next: Option<Handle>,
    keys: Keys<K>,
    buckets: Buckets<V>,
}

/// Outcome of a binary search over a leaf's keys.
pub(crate) enum SearchResult {
    Found(usize),
    /// Insertion point that keeps the keys sorted.
    NotFound(usize),
}

impl<K, V> Node<K, V> {
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    // The accessors below panic on the wrong variant; callers know the level.
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("node #{} is internal, not a leaf", self.id()),
        }
    }

    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match self {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("node is internal, not a leaf"),
        }
    }

    pub(crate) fn as_internal(&self) -> &InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("node #{} is a leaf, not internal", self.id()),
        }
    }

    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K> {
        match self {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("node is a leaf, not internal"),
        }
    }

    /// Debug number assigned when the node was created.
    pub(crate) fn id(&self) -> u64 {
        match self {
            Node::Internal(internal) => internal.id,
            Node::Leaf(leaf) => leaf.id,
        }
    }

    pub(crate) fn keys(&self) -> &[K] {
        match self {
            Node::Internal(internal) => &internal.keys,
            Node::Leaf(leaf) => &leaf.keys,
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys().len()
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        match self {
            Node::Internal(internal) => internal.parent,
            Node::Leaf(leaf) => leaf.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Handle>) {
        match self {
            Node::Internal(internal) => internal.parent = parent,
            Node::Leaf(leaf) => leaf.parent = parent,
        }
    }

    /// `m - 1` keys: one more insert triggers a split.
    pub(crate) fn is_full(&self, order: Order) -> bool {
        self.key_count() == order.max_keys()
    }

    /// Holds `m` keys and must split before the operation returns.
    pub(crate) fn is_overflowing(&self, order: Order) -> bool {
        self.key_count() > order.max_keys()
    }

    /// At or below `⌊m/2⌋ - 1` keys.
    pub(crate) fn is_underflowed(&self, order: Order) -> bool {
        self.key_count() <= order.min_keys()
    }

    /// At or below `⌊m/2⌋` keys; lending a key would underflow it.
    pub(crate) fn is_nearly_underflowed(&self, order: Order) -> bool {
        self.key_count() <= order.split_point()
    }
}

impl<K> InternalNode<K> {
    /// Creates an empty internal node. Callers push the first child.
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            parent: None,
            keys: SmallVec::new(),
            children: SmallVec::new(),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children[index]
    }

    pub(crate) fn children(&self) -> &[Handle] {
        &self.children
    }

    /// Index of `child` among this node's children.
    pub(crate) fn position_of(&self, child: Handle) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Index of the child to descend into for `key`: the slot of the first
    /// separator strictly greater than `key`, or the last slot.
    #[inline]
    pub(crate) fn find<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() <= key)
    }

    /// Inserts `key` at `index` with `child` to its right.
    pub(crate) fn insert_child(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children.insert(index + 1, child);
    }

    /// Removes the key at `index` and the child to its right.
    pub(crate) fn remove_child(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Pushes the first child of a fresh node.
    pub(crate) fn push_first_child(&mut self, child: Handle) {
        debug_assert!(self.children.is_empty(), "first child pushed twice");
        self.children.push(child);
    }

    pub(crate) fn push_child(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children.push(child);
    }

    /// Pushes a key and child to the front.
    pub(crate) fn push_child_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children.insert(0, child);
    }

    /// Pops the last key and the last child.
    pub(crate) fn pop_child(&mut self) -> Option<(K, Handle)> {
        let key = self.keys.pop()?;
        let child = self.children.pop()?;
        Some((key, child))
    }

    /// Pops the first key and the first child.
    pub(crate) fn pop_child_front(&mut self) -> Option<(K, Handle)> {
        if self.keys.is_empty() {
            return None;
        }
        let key = self.keys.remove(0);
        let child = self.children.remove(0);
        Some((key, child))
    }

    /// Replaces the separator at `index`, returning the old one.
    pub(crate) fn set_key(&mut self, index: usize, key: K) -> K {
        mem::replace(&mut self.keys[index], key)
    }

    /// Takes the only child of a key-less node.
    pub(crate) fn sole_child(&self) -> Option<Handle> {
        match self.children.as_slice() {
            [only] if self.keys.is_empty() => Some(*only),
            _ => None,
        }
    }

    /// Splits around the median `keys[⌊m/2⌋]`, which is removed and returned.
    /// The new node takes the keys and children to the right of the median.
    pub(crate) fn split(&mut self, order: Order, right_id: u64) -> (K, InternalNode<K>) {
        let mid = order.split_point();
        debug_assert!(self.keys.len() > mid, "split of a node that is not overflowing");

        let mut right = InternalNode::new(right_id);
        right.keys = self.keys.drain(mid + 1..).collect();
        right.children = self.children.drain(mid + 1..).collect();

        let median = match self.keys.pop() {
            Some(median) => median,
            None => unreachable!("median exists when keys.len() > mid"),
        };
        (median, right)
    }

    /// Appends `separator` and then everything in `right`.
    pub(crate) fn merge_with_right(&mut self, separator: K, mut right: InternalNode<K>) {
        self.keys.push(separator);
        self.keys.append(&mut right.keys);
        self.children.append(&mut right.children);
    }
}

impl<K, V> LeafNode<K, V> {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            parent: None,
            prev: None,
            next: None,
            keys: SmallVec::new(),
            buckets: SmallVec::new(),
        }
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn prev(&self) -> Option<Handle> {
        self.prev
    }

    pub(crate) fn set_prev(&mut self, prev: Option<Handle>) {
        self.prev = prev;
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: Option<Handle>) {
        self.next = next;
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    #[inline]
    pub(crate) fn bucket(&self, index: usize) -> &Bucket<V> {
        &self.buckets[index]
    }

    pub(crate) fn bucket_mut(&mut self, index: usize) -> &mut Bucket<V> {
        &mut self.buckets[index]
    }

    pub(crate) fn buckets(&self) -> &[Bucket<V>] {
        &self.buckets
    }

    /// Pairs every key with its bucket, mutably.
    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = (&K, &mut Bucket<V>)> {
        self.keys.iter().zip(self.buckets.iter_mut())
    }

    /// Searches for a key in this leaf.
    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q) -> SearchResult
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match self.keys.binary_search_by(|k| k.borrow().cmp(key)) {
            Ok(idx) => SearchResult::Found(idx),
            Err(idx) => SearchResult::NotFound(idx),
        }
    }

    /// Index of the first key `>= key`.
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() < key)
    }

    /// Inserts a key and its bucket at the given position.
    pub(crate) fn insert(&mut self, index: usize, key: K, bucket: Bucket<V>) {
        self.keys.insert(index, key);
        self.buckets.insert(index, bucket);
    }

    /// Removes the key and bucket at the given position.
    pub(crate) fn remove(&mut self, index: usize) -> (K, Bucket<V>) {
        let key = self.keys.remove(index);
        let bucket = self.buckets.remove(index);
        (key, bucket)
    }

    /// Pushes a key and bucket to the end.
    pub(crate) fn push(&mut self, key: K, bucket: Bucket<V>) {
        self.keys.push(key);
        self.buckets.push(bucket);
    }

    /// Pushes a key and bucket to the front.
    pub(crate) fn push_front(&mut self, key: K, bucket: Bucket<V>) {
        self.keys.insert(0, key);
        self.buckets.insert(0, bucket);
    }

    /// Pops the last key and bucket.
    pub(crate) fn pop(&mut self) -> Option<(K, Bucket<V>)> {
        let key = self.keys.pop()?;
        let bucket = self.buckets.pop()?;
        Some((key, bucket))
    }

    /// Pops the first key and bucket.
    pub(crate) fn pop_front(&mut self) -> Option<(K, Bucket<V>)> {
        if self.keys.is_empty() {
            return None;
        }
        Some(self.remove(0))
    }

    /// Splits off everything from `keys[⌊m/2⌋]` onwards into a new leaf and
    /// returns a copy of the new leaf's first key as the separator. The caller
    /// relinks the leaf chain.
    pub(crate) fn split(&mut self, order: Order, right_id: u64) -> (K, LeafNode<K, V>)
    where
        K: Clone,
    {
        let mid = order.split_point();
        debug_assert!(self.keys.len() > mid, "split of a leaf that is not overflowing");

        let mut right = LeafNode::new(right_id);
        right.keys = self.keys.drain(mid..).collect();
        right.buckets = self.buckets.drain(mid..).collect();

        let separator = right.keys[0].clone();
        (separator, right)
    }

    /// Appends everything in `right` and takes over its `next` link.
    pub(crate) fn merge_with_right(&mut self, mut right: LeafNode<K, V>) {
        self.keys.append(&mut right.keys);
        self.buckets.append(&mut right.buckets);
        self.next = right.next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(m: usize) -> Order {
        Order::new(m).unwrap()
    }

    fn leaf_with(keys: &[i32]) -> LeafNode<i32, i32> {
        let mut leaf = LeafNode::new(1);
        for &k in keys {
            leaf.push(k, Bucket::new(k * 10));
        }
        leaf
    }

    fn handles(n: usize) -> Vec<Handle> {
        (0..n).map(Handle::from_index).collect()
    }

    #[test]
    fn capacity_predicates() {
        let m = order(5);
        let node: Node<i32, i32> = Node::Leaf(leaf_with(&[1]));
        assert!(node.is_underflowed(m));
        assert!(node.is_nearly_underflowed(m));

        let node: Node<i32, i32> = Node::Leaf(leaf_with(&[1, 2]));
        assert!(!node.is_underflowed(m));
        assert!(node.is_nearly_underflowed(m));

        let node: Node<i32, i32> = Node::Leaf(leaf_with(&[1, 2, 3, 4]));
        assert!(node.is_full(m));
        assert!(!node.is_overflowing(m));
        assert!(node.parent().is_none());

        let node: Node<i32, i32> = Node::Leaf(leaf_with(&[1, 2, 3, 4, 5]));
        assert!(node.is_overflowing(m));
    }

    #[test]
    fn find_uses_right_most_pointer_rule() {
        let mut internal: InternalNode<i32> = InternalNode::new(1);
        let h = handles(3);
        internal.push_first_child(h[0]);
        internal.push_child(10, h[1]);
        internal.push_child(20, h[2]);

        assert_eq!(internal.find(&5), 0);
        assert_eq!(internal.find(&10), 1);
        assert_eq!(internal.find(&15), 1);
        assert_eq!(internal.find(&20), 2);
        assert_eq!(internal.find(&99), 2);
        assert_eq!(internal.position_of(h[2]), Some(2));
    }

    #[test]
    fn leaf_split_copies_separator() {
        let mut left = leaf_with(&[1, 2, 3, 4, 5]);
        let (separator, right) = left.split(order(5), 2);

        assert_eq!(separator, 3);
        assert_eq!(left.keys(), &[1, 2]);
        assert_eq!(right.keys(), &[3, 4, 5]);
        assert_eq!(right.bucket(0).as_slice(), &[30]);
    }

    #[test]
    fn internal_split_removes_median() {
        let mut node: InternalNode<i32> = InternalNode::new(1);
        let h = handles(6);
        node.push_first_child(h[0]);
        for (i, key) in [10, 20, 30, 40, 50].into_iter().enumerate() {
            node.push_child(key, h[i + 1]);
        }

        let (median, right) = node.split(order(5), 2);
        assert_eq!(median, 30);
        assert_eq!(node.keys(), &[10, 20]);
        assert_eq!(node.children(), &h[..3]);
        assert_eq!(right.keys(), &[40, 50]);
        assert_eq!(right.children(), &h[3..]);
    }

    #[test]
    fn internal_split_with_even_order_leaves_short_right_half() {
        let mut node: InternalNode<i32> = InternalNode::new(1);
        let h = handles(5);
        node.push_first_child(h[0]);
        for (i, key) in [10, 20, 30, 40].into_iter().enumerate() {
            node.push_child(key, h[i + 1]);
        }

        let (median, right) = node.split(order(4), 2);
        assert_eq!(median, 30);
        assert_eq!(node.keys(), &[10, 20]);
        assert_eq!(right.keys(), &[40]);
        assert_eq!(right.child_count(), 2);
    }

    #[test]
    fn internal_merge_pulls_separator_down() {
        let h = handles(4);
        let mut left: InternalNode<i32> = InternalNode::new(1);
        left.push_first_child(h[0]);
        left.push_child(10, h[1]);
        let mut right: InternalNode<i32> = InternalNode::new(2);
        right.push_first_child(h[2]);
        right.push_child(30, h[3]);

        left.merge_with_right(20, right);
        assert_eq!(left.keys(), &[10, 20, 30]);
        assert_eq!(left.children(), &h[..]);
        assert_eq!(left.key_count() + 1, left.child_count());
    }

    #[test]
    fn sole_child_only_for_keyless_nodes() {
        let h = handles(2);
        let mut node: InternalNode<i32> = InternalNode::new(1);
        node.push_first_child(h[0]);
        assert_eq!(node.sole_child(), Some(h[0]));

        node.push_child(5, h[1]);
        assert_eq!(node.sole_child(), None);
        assert_eq!(node.remove_child(0), (5, h[1]));
        assert_eq!(node.sole_child(), Some(h[0]));
    }

    #[test]
    fn bucket_pops_latest_first() {
        let mut bucket = Bucket::new("a");
        bucket.push("b");
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket.pop_latest(), Some("b"));
        assert_eq!(bucket.as_slice(), &["a"]);
        assert_eq!(bucket.pop_latest(), Some("a"));
        assert!(bucket.is_empty());
    }

    #[test]
    fn leaf_lower_bound_and_search() {
        let leaf = leaf_with(&[2, 4, 6]);
        assert_eq!(leaf.lower_bound(&1), 0);
        assert_eq!(leaf.lower_bound(&4), 1);
        assert_eq!(leaf.lower_bound(&5), 2);
        assert_eq!(leaf.lower_bound(&7), 3);
        assert!(matches!(leaf.search(&6), SearchResult::Found(2)));
        assert!(matches!(leaf.search(&3), SearchResult::NotFound(1)));
    }
}
