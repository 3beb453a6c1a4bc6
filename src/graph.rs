//! Text renderings of a tree's shape, for debugging and documentation.
//!
//! [`LevelDump`] prints one line per node in breadth-first order.
//! [`Dot`] emits Graphviz source: record-shaped nodes, solid edges from each
//! child pointer, and dashed edges along the leaf chain. Rendering the DOT
//! source to an image is left to `dot` itself.

use std::collections::VecDeque;
use std::fmt::{self, Display, Write};

use crate::bplus_tree::BPlusTree;
use crate::raw::{Handle, Node, RawBPlusTree};

/// Breadth-first listing of every node: depth, `|`-joined keys, node id and
/// parent id. Nodes holding `m - 1` keys are marked `(full)`.
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, Order};
/// use bplus_index::graph::LevelDump;
///
/// let mut tree = BPlusTree::new(Order::new(3).unwrap());
/// for k in [1, 2, 3] {
///     tree.insert(k, ());
/// }
/// let dump = LevelDump::new(&tree).to_string();
/// assert_eq!(dump.lines().next(), Some("0 2\t#3\tparent -> -"));
/// assert_eq!(dump.lines().count(), 3);
/// ```
pub struct LevelDump<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
}

impl<'a, K, V> LevelDump<'a, K, V> {
    #[must_use]
    pub fn new(tree: &'a BPlusTree<K, V>) -> Self {
        Self { tree: tree.raw() }
    }
}

impl<K: Display, V> Display for LevelDump<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree;
        for (handle, depth) in breadth_first(tree) {
            let node = tree.node(handle);
            write!(f, "{depth} ")?;
            write_joined(f, node.keys(), "|")?;
            write!(f, "\t#{}\tparent -> ", node.id())?;
            match node.parent() {
                Some(parent) => write!(f, "#{}", tree.node(parent).id())?,
                None => f.write_char('-')?,
            }
            if node.is_full(tree.order()) {
                f.write_str(" (full)")?;
            }
            f.write_char('\n')?;
        }
        Ok(())
    }
}

/// Graphviz source for the whole tree.
///
/// Leaf records show each key above its bucket. Internal records alternate
/// child ports `f0, f2, ...` with keys in `f1, f3, ...`.
pub struct Dot<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    name: &'a str,
}

impl<'a, K, V> Dot<'a, K, V> {
    /// `name` becomes the graph identifier.
    #[must_use]
    pub fn new(tree: &'a BPlusTree<K, V>, name: &'a str) -> Self {
        Self { tree: tree.raw(), name }
    }
}

impl<K: Display, V: Display> Display for Dot<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.tree;
        writeln!(f, "digraph \"{}\" {{", Escaped(self.name))?;
        writeln!(f, "    node [shape=record, height=.1];")?;

        let mut leaves = Vec::new();
        for (handle, _) in breadth_first(tree) {
            let node = tree.node(handle);
            write!(f, "    node{} [label=\"", node.id())?;
            match node {
                Node::Internal(internal) => {
                    for (i, key) in internal.keys().iter().enumerate() {
                        write!(f, "<f{}> |<f{}> {}|", i * 2, i * 2 + 1, Escaped(key))?;
                    }
                    write!(f, "<f{}> ", internal.key_count() * 2)?;
                }
                Node::Leaf(leaf) => {
                    for (i, (key, bucket)) in leaf.keys().iter().zip(leaf.buckets()).enumerate() {
                        write!(f, "<f{}> |{{<f{}> {}|{{", i * 2, i * 2 + 1, Escaped(key))?;
                        for (j, value) in bucket.as_slice().iter().enumerate() {
                            if j > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{}", Escaped(value))?;
                        }
                        f.write_str("}}|")?;
                    }
                    write!(f, "<f{}> ", leaf.key_count() * 2)?;
                    leaves.push(handle);
                }
            }
            writeln!(f, "\"];")?;

            if let Node::Internal(internal) = node {
                for (i, &child) in internal.children().iter().enumerate() {
                    writeln!(f, "    \"node{}\":f{} -> \"node{}\";", node.id(), i * 2, tree.node(child).id())?;
                }
            }
        }

        for pair in leaves.windows(2) {
            writeln!(
                f,
                "    \"node{}\" -> \"node{}\" [style=dashed, constraint=false];",
                tree.node(pair[0]).id(),
                tree.node(pair[1]).id()
            )?;
        }

        f.write_str("}\n")
    }
}

/// Nodes with their depth, root first, each level left to right.
fn breadth_first<K, V>(tree: &RawBPlusTree<K, V>) -> Vec<(Handle, usize)> {
    let mut order = Vec::with_capacity(tree.node_count());
    let mut queue = VecDeque::from([(tree.root(), 0)]);
    while let Some((handle, depth)) = queue.pop_front() {
        if let Node::Internal(internal) = tree.node(handle) {
            queue.extend(internal.children().iter().map(|&child| (child, depth + 1)));
        }
        order.push((handle, depth));
    }
    order
}

fn write_joined<T: Display>(f: &mut fmt::Formatter<'_>, items: &[T], separator: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Escapes characters that are special inside a record label.
struct Escaped<T>(T);

impl<T: Display> Display for Escaped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.0.to_string();
        for c in text.chars() {
            if matches!(c, '{' | '}' | '|' | '<' | '>' | '"' | '\\') {
                f.write_char('\\')?;
            }
            f.write_char(c)?;
        }
        Ok(())
    }
}
