use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;
use core::slice;

use crate::order::Order;
use crate::raw::{Handle, RawBPlusTree};

/// An ordered, multi-valued map based on a [B+ tree].
///
/// Every key maps to a *bucket*: the values inserted under that key, oldest
/// first. Inserting an existing key appends to its bucket and never replaces
/// anything. Deleting a key pops the newest value, and the key disappears once
/// its bucket is empty.
///
/// All values live in the leaves, which are linked in both directions, so a
/// full scan is a walk along the leaf chain rather than a tree traversal.
///
/// The branching factor is fixed at construction through [`Order`].
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, Order};
///
/// let mut tree = BPlusTree::new(Order::new(4).unwrap());
/// tree.insert(2, "Bravo");
/// tree.insert(1, "Alfa");
/// tree.insert(2, "Bravo2");
///
/// assert_eq!(tree.retrieve(&2), Some(&["Bravo", "Bravo2"][..]));
/// assert_eq!(tree.len(), 3);
/// assert_eq!(tree.key_count(), 2);
///
/// // Deleting pops the most recent value first.
/// assert!(tree.delete(&2));
/// assert_eq!(tree.retrieve(&2), Some(&["Bravo"][..]));
///
/// let keys: Vec<_> = tree.iter().map(|(k, _)| *k).collect();
/// assert_eq!(keys, [1, 2]);
/// ```
///
/// [B+ tree]: https://en.wikipedia.org/wiki/B%2B_tree
pub struct BPlusTree<K, V> {
    raw: RawBPlusTree<K, V>,
}

impl<K, V> BPlusTree<K, V> {
    /// Makes a new, empty tree with branching factor `order`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Order};
    ///
    /// let tree: BPlusTree<u64, u64> = BPlusTree::new(Order::new(3).unwrap());
    /// assert!(tree.is_empty());
    /// assert_eq!(tree.height(), 1);
    /// ```
    #[must_use]
    pub fn new(order: Order) -> Self {
        Self {
            raw: RawBPlusTree::new(order),
        }
    }

    /// Returns the branching factor.
    #[must_use]
    pub const fn order(&self) -> Order {
        self.raw.order()
    }

    /// Returns the number of stored values, counting every bucket entry.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns the number of distinct keys.
    #[must_use]
    pub const fn key_count(&self) -> usize {
        self.raw.key_count()
    }

    /// Returns `true` if the tree holds no values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Number of levels from the root down to the leaves, inclusive. An empty
    /// tree has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Number of live nodes, internal and leaf.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.raw.node_count()
    }

    /// Removes every key, leaving a single empty root leaf.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Returns a view of the first leaf of the chain, or `None` if the tree
    /// holds no keys.
    #[must_use]
    pub fn leftmost_leaf(&self) -> Option<LeafRef<'_, K, V>> {
        self.leaf_ref(self.raw.leftmost_leaf())
    }

    /// Returns a view of the last leaf of the chain, or `None` if the tree
    /// holds no keys.
    #[must_use]
    pub fn rightmost_leaf(&self) -> Option<LeafRef<'_, K, V>> {
        self.leaf_ref(self.raw.rightmost_leaf())
    }

    fn leaf_ref(&self, handle: Handle) -> Option<LeafRef<'_, K, V>> {
        if self.raw.key_count() == 0 {
            return None;
        }
        Some(LeafRef {
            tree: &self.raw,
            handle,
        })
    }

    /// Gets an iterator over `(key, bucket)` pairs in ascending key order.
    ///
    /// The iterator is double-ended: `iter().rev()` walks the leaf chain
    /// backwards.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let tree: BPlusTree<_, _> = [(3, 'c'), (1, 'a'), (2, 'b')].into_iter().collect();
    /// let backwards: Vec<_> = tree.iter().rev().map(|(k, _)| *k).collect();
    /// assert_eq!(backwards, [3, 2, 1]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        let back_leaf = self.raw.rightmost_leaf();
        let back_index = self.raw.node(back_leaf).key_count().saturating_sub(1);
        Iter {
            tree: Some(&self.raw),
            front_leaf: Some(self.raw.leftmost_leaf()),
            front_index: 0,
            back_leaf: Some(back_leaf),
            back_index,
            remaining: self.raw.key_count(),
        }
    }

    /// Gets an iterator over every `(key, value)` pair: keys ascending, and
    /// values in insertion order within a key.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let tree: BPlusTree<_, _> = [(2, 20), (1, 10), (2, 21)].into_iter().collect();
    /// let pairs: Vec<_> = tree.pairs().collect();
    /// assert_eq!(pairs, [(&1, &10), (&2, &20), (&2, &21)]);
    /// ```
    pub fn pairs(&self) -> Pairs<'_, K, V> {
        Pairs {
            entries: self.iter(),
            current: None,
            remaining: self.raw.len(),
        }
    }

    /// Calls `f` on every stored value, in scan order, allowing it to be
    /// rewritten in place. Keys cannot change.
    pub fn for_each_value_mut<F>(&mut self, f: F)
    where
        F: FnMut(&K, &mut V),
    {
        self.raw.for_each_value_mut(f);
    }

    pub(crate) fn raw(&self) -> &RawBPlusTree<K, V> {
        &self.raw
    }
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Inserts `value` under `key`. An existing key keeps its earlier values
    /// and gets `value` appended to its bucket.
    ///
    /// # Complexity
    ///
    /// O(log n) node visits, each doing O(m) work.
    pub fn insert(&mut self, key: K, value: V) {
        self.raw.insert(key, value);
    }

    /// Returns the bucket stored under `key`, oldest value first.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::default();
    /// tree.insert("k", 1);
    /// assert_eq!(tree.retrieve("k"), Some(&[1][..]));
    /// assert_eq!(tree.retrieve("missing"), None);
    /// ```
    pub fn retrieve<Q>(&self, key: &Q) -> Option<&[V]>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.retrieve(key)
    }

    /// Returns `true` if at least one value is stored under `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.retrieve(key).is_some()
    }

    /// Removes the most recently inserted value under `key`. Returns `false`
    /// if the key is absent.
    pub fn delete<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_latest(key).is_some()
    }

    /// Removes and returns the most recently inserted value under `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::default();
    /// tree.insert(7, "first");
    /// tree.insert(7, "second");
    /// assert_eq!(tree.remove_latest(&7), Some("second"));
    /// assert_eq!(tree.remove_latest(&7), Some("first"));
    /// assert_eq!(tree.remove_latest(&7), None);
    /// ```
    pub fn remove_latest<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.remove_latest(key)
    }

    /// Gets an iterator over `(key, bucket)` pairs starting at the first key
    /// `>= key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let tree: BPlusTree<_, _> = (0..10).map(|k| (k * 10, k)).collect();
    /// let next_three: Vec<_> = tree.iter_from(&25).take(3).map(|(k, _)| *k).collect();
    /// assert_eq!(next_three, [30, 40, 50]);
    /// ```
    pub fn iter_from<Q>(&self, key: &Q) -> RangeFrom<'_, K, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let Some((front_leaf, front_index)) = self.raw.lower_bound(key) else {
            return RangeFrom::default();
        };
        let back_leaf = self.raw.rightmost_leaf();
        let back_index = self.raw.node(back_leaf).key_count().saturating_sub(1);
        RangeFrom {
            tree: Some(&self.raw),
            front_leaf,
            front_index,
            back_leaf,
            back_index,
            finished: false,
        }
    }
}

impl<K: Ord + fmt::Debug, V> BPlusTree<K, V> {
    /// Checks every structural invariant: sorted keys, slot counts, non-empty
    /// buckets, equal leaf depth, parent links, fill bounds, separator bounds,
    /// the leaf chain in both directions, and the stored counters.
    ///
    /// # Panics
    ///
    /// Panics with a list of every violation found.
    pub fn validate(&self) {
        let violations = self.raw.violations();
        assert!(
            violations.is_empty(),
            "B+ tree invariant violations:\n{}",
            violations.join("\n")
        );
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Default for BPlusTree<K, V> {
    /// Creates an empty tree of [`Order::DEFAULT`].
    fn default() -> Self {
        Self::new(Order::DEFAULT)
    }
}

impl<K: Ord + Clone, V> FromIterator<(K, V)> for BPlusTree<K, V> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut tree = BPlusTree::default();
        tree.extend(iter);
        tree
    }
}

impl<K: Ord + Clone, V> Extend<(K, V)> for BPlusTree<K, V> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a [V]);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

/// A read-only view of one leaf and its place in the leaf chain.
///
/// Obtained from [`BPlusTree::leftmost_leaf`] or [`BPlusTree::rightmost_leaf`].
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, Order};
///
/// let mut tree = BPlusTree::new(Order::new(3).unwrap());
/// for k in 0..6 {
///     tree.insert(k, ());
/// }
///
/// let mut keys = Vec::new();
/// let mut leaf = tree.leftmost_leaf();
/// while let Some(current) = leaf {
///     keys.extend_from_slice(current.keys());
///     leaf = current.next_leaf();
/// }
/// assert_eq!(keys, [0, 1, 2, 3, 4, 5]);
/// ```
pub struct LeafRef<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    handle: Handle,
}

impl<'a, K, V> LeafRef<'a, K, V> {
    /// The keys held by this leaf, ascending.
    #[must_use]
    pub fn keys(&self) -> &'a [K] {
        self.tree.node(self.handle).as_leaf().keys()
    }

    /// The bucket at position `index`, oldest value first.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn bucket(&self, index: usize) -> &'a [V] {
        self.tree.node(self.handle).as_leaf().bucket(index).as_slice()
    }

    /// Pairs every key in this leaf with its bucket.
    pub fn entries(self) -> impl DoubleEndedIterator<Item = (&'a K, &'a [V])> + ExactSizeIterator {
        let leaf = self.tree.node(self.handle).as_leaf();
        leaf.keys().iter().zip(leaf.buckets().iter().map(|bucket| bucket.as_slice()))
    }

    /// The following leaf in key order.
    #[must_use]
    pub fn next_leaf(&self) -> Option<LeafRef<'a, K, V>> {
        let handle = self.tree.node(self.handle).as_leaf().next()?;
        Some(LeafRef { tree: self.tree, handle })
    }

    /// The preceding leaf in key order.
    #[must_use]
    pub fn prev_leaf(&self) -> Option<LeafRef<'a, K, V>> {
        let handle = self.tree.node(self.handle).as_leaf().prev()?;
        Some(LeafRef { tree: self.tree, handle })
    }

    /// Debug number assigned to this leaf when it was created.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.tree.node(self.handle).id()
    }
}

impl<K, V> Clone for LeafRef<'_, K, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V> Copy for LeafRef<'_, K, V> {}

impl<K: fmt::Debug, V> fmt::Debug for LeafRef<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafRef").field("id", &self.id()).field("keys", &self.keys()).finish()
    }
}

/// An iterator over the `(key, bucket)` pairs of a `BPlusTree`.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTree`].
///
/// [`iter`]: BPlusTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    tree: Option<&'a RawBPlusTree<K, V>>,
    front_leaf: Option<Handle>,
    front_index: usize,
    back_leaf: Option<Handle>,
    back_index: usize,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a [V]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let tree = self.tree?;
        let leaf = tree.node(self.front_leaf?).as_leaf();
        let key = leaf.key(self.front_index);
        let bucket = leaf.bucket(self.front_index).as_slice();

        self.remaining -= 1;
        self.front_index += 1;

        // Move to next leaf if needed
        if self.front_index >= leaf.key_count() {
            self.front_leaf = leaf.next();
            self.front_index = 0;
        }

        Some((key, bucket))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let tree = self.tree?;
        let leaf = tree.node(self.back_leaf?).as_leaf();
        let key = leaf.key(self.back_index);
        let bucket = leaf.bucket(self.back_index).as_slice();

        self.remaining -= 1;

        // Move to previous element/leaf
        if self.back_index == 0 {
            self.back_leaf = leaf.prev();
            if let Some(prev) = self.back_leaf {
                self.back_index = tree.node(prev).key_count().saturating_sub(1);
            }
        } else {
            self.back_index -= 1;
        }

        Some((key, bucket))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter { ..*self }
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

impl<K, V> Default for Iter<'_, K, V> {
    /// Creates an empty `bplus_tree::Iter`.
    ///
    /// ```
    /// # use bplus_index::bplus_tree;
    /// let iter: bplus_tree::Iter<'_, u8, u8> = Default::default();
    /// assert_eq!(iter.len(), 0);
    /// ```
    fn default() -> Self {
        Iter {
            tree: None,
            front_leaf: None,
            front_index: 0,
            back_leaf: None,
            back_index: 0,
            remaining: 0,
        }
    }
}

/// An iterator over the `(key, bucket)` pairs of a `BPlusTree` from a lower
/// bound to the end.
///
/// This `struct` is created by the [`iter_from`] method on [`BPlusTree`].
///
/// [`iter_from`]: BPlusTree::iter_from
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct RangeFrom<'a, K, V> {
    tree: Option<&'a RawBPlusTree<K, V>>,
    front_leaf: Handle,
    front_index: usize,
    back_leaf: Handle,
    back_index: usize,
    /// Set once front and back have met.
    finished: bool,
}

impl<'a, K, V> RangeFrom<'a, K, V> {
    fn is_last(&self) -> bool {
        self.front_leaf == self.back_leaf && self.front_index == self.back_index
    }
}

impl<'a, K, V> Iterator for RangeFrom<'a, K, V> {
    type Item = (&'a K, &'a [V]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let tree = self.tree?;
        let is_last = self.is_last();
        let leaf = tree.node(self.front_leaf).as_leaf();
        let key = leaf.key(self.front_index);
        let bucket = leaf.bucket(self.front_index).as_slice();

        self.front_index += 1;
        if self.front_index >= leaf.key_count() {
            if let Some(next) = leaf.next() {
                self.front_leaf = next;
                self.front_index = 0;
            }
        }

        self.finished = is_last;
        Some((key, bucket))
    }
}

impl<K, V> DoubleEndedIterator for RangeFrom<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let tree = self.tree?;
        let is_last = self.is_last();
        let leaf = tree.node(self.back_leaf).as_leaf();
        let key = leaf.key(self.back_index);
        let bucket = leaf.bucket(self.back_index).as_slice();

        if self.back_index == 0 {
            if let Some(prev) = leaf.prev() {
                self.back_leaf = prev;
                self.back_index = tree.node(prev).key_count().saturating_sub(1);
            }
        } else {
            self.back_index -= 1;
        }

        self.finished = is_last;
        Some((key, bucket))
    }
}

impl<K, V> FusedIterator for RangeFrom<'_, K, V> {}

impl<K, V> fmt::Debug for RangeFrom<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeFrom").field("finished", &self.finished).finish()
    }
}

impl<K, V> Default for RangeFrom<'_, K, V> {
    fn default() -> Self {
        let placeholder = Handle::from_index(0);
        RangeFrom {
            tree: None,
            front_leaf: placeholder,
            front_index: 0,
            back_leaf: placeholder,
            back_index: 0,
            finished: true,
        }
    }
}

/// An iterator over every `(key, value)` pair of a `BPlusTree`.
///
/// This `struct` is created by the [`pairs`] method on [`BPlusTree`].
///
/// [`pairs`]: BPlusTree::pairs
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Pairs<'a, K, V> {
    entries: Iter<'a, K, V>,
    current: Option<(&'a K, slice::Iter<'a, V>)>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Pairs<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((key, values)) = &mut self.current {
                if let Some(value) = values.next() {
                    self.remaining -= 1;
                    return Some((*key, value));
                }
            }
            let (key, bucket) = self.entries.next()?;
            self.current = Some((key, bucket.iter()));
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Pairs<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Pairs<'_, K, V> {}

impl<K, V> fmt::Debug for Pairs<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pairs").field("remaining", &self.remaining).finish()
    }
}
