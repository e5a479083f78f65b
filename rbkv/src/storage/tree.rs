//! Red-black tree over a record store.
//!
//! The tree holds no state of its own between calls. Every operation starts
//! by reading `root_index` from the header and walks fresh record reads from
//! there. Each recolor, relink and rotation is written to the store before
//! the next step reads it back.
//!
//! Keys compare as `i32`. On insert, a key that is not less than the current
//! node descends right; an exact match is handled by the [`DuplicatePolicy`].

use std::cmp::Ordering;
use std::str::FromStr;

use crate::storage::io::{NodeStore, StoreError};
use crate::storage::node::{Color, NodeRef};
use crate::storage::record::{Field, Header, NodeRecord};

/// What an insert does when the key is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Overwrite the existing payload in place.
    #[default]
    Upsert,
    /// Refuse the insert and leave the store untouched.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upsert" => Ok(Self::Upsert),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown duplicate key policy '{other}'")),
        }
    }
}

/// Result of a successful insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was allocated at this index.
    Inserted(NodeRef),
    /// The key existed; its payload was replaced.
    Updated { node: NodeRef, previous: i32 },
}

/// A successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Found {
    pub payload: i32,
    pub node: NodeRef,
}

/// Shape summary returned by [`RbTree::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    /// Number of reachable nodes.
    pub nodes: usize,
    /// Black nodes on every root-to-sentinel path, counting the root.
    pub black_height: usize,
    /// Longest root-to-leaf path, in nodes.
    pub depth: usize,
}

/// Which child slot of a parent a node occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// A red-black tree borrowed over a record store.
pub struct RbTree<'a, S: NodeStore + ?Sized> {
    store: &'a mut S,
    policy: DuplicatePolicy,
}

impl<'a, S: NodeStore + ?Sized> RbTree<'a, S> {
    /// Create a tree handle with the default duplicate policy.
    pub fn new(store: &'a mut S) -> Self {
        Self::with_policy(store, DuplicatePolicy::default())
    }

    pub const fn with_policy(store: &'a mut S, policy: DuplicatePolicy) -> Self {
        Self { store, policy }
    }

    /// Read the header.
    pub fn header(&mut self) -> Result<Header, TreeError> {
        Ok(self.store.read_header()?)
    }

    /// The current root, re-read from the header.
    pub fn root(&mut self) -> Result<NodeRef, TreeError> {
        let root = self.header()?.root();
        // An out-of-range root index reads as the sentinel.
        Ok(if self.record(root)?.is_some() {
            root
        } else {
            NodeRef::NIL
        })
    }

    // ========== Node accessors ==========
    //
    // Each accessor is one store call. Reads on the sentinel yield the
    // sentinel (or Black); writes to the sentinel are ignored.

    fn record(&mut self, node: NodeRef) -> Result<Option<NodeRecord>, TreeError> {
        Ok(self.store.read_node(node)?)
    }

    fn left(&mut self, node: NodeRef) -> Result<NodeRef, TreeError> {
        Ok(self.record(node)?.map_or(NodeRef::NIL, |r| r.left))
    }

    fn right(&mut self, node: NodeRef) -> Result<NodeRef, TreeError> {
        Ok(self.record(node)?.map_or(NodeRef::NIL, |r| r.right))
    }

    fn parent(&mut self, node: NodeRef) -> Result<NodeRef, TreeError> {
        Ok(self.record(node)?.map_or(NodeRef::NIL, |r| r.parent))
    }

    fn color(&mut self, node: NodeRef) -> Result<Color, TreeError> {
        Ok(self.record(node)?.map_or(Color::Black, |r| r.color))
    }

    fn child(&mut self, node: NodeRef, side: Side) -> Result<NodeRef, TreeError> {
        match side {
            Side::Left => self.left(node),
            Side::Right => self.right(node),
        }
    }

    fn set_left(&mut self, node: NodeRef, child: NodeRef) -> Result<(), TreeError> {
        Ok(self.store.patch_field(node, Field::Left(child))?)
    }

    fn set_right(&mut self, node: NodeRef, child: NodeRef) -> Result<(), TreeError> {
        Ok(self.store.patch_field(node, Field::Right(child))?)
    }

    fn set_parent(&mut self, node: NodeRef, parent: NodeRef) -> Result<(), TreeError> {
        Ok(self.store.patch_field(node, Field::Parent(parent))?)
    }

    fn set_color(&mut self, node: NodeRef, color: Color) -> Result<(), TreeError> {
        Ok(self.store.patch_field(node, Field::Color(color))?)
    }

    fn set_child(&mut self, node: NodeRef, side: Side, child: NodeRef) -> Result<(), TreeError> {
        match side {
            Side::Left => self.set_left(node, child),
            Side::Right => self.set_right(node, child),
        }
    }

    /// Side of `parent` that `node` hangs from.
    fn side_of(&mut self, node: NodeRef, parent: NodeRef) -> Result<Side, TreeError> {
        Ok(if self.left(parent)? == node {
            Side::Left
        } else {
            Side::Right
        })
    }

    fn sibling(&mut self, node: NodeRef, parent: NodeRef) -> Result<NodeRef, TreeError> {
        let side = self.side_of(node, parent)?;
        self.child(parent, side.opposite())
    }

    // ========== Lookup ==========

    /// Walk down from the root to the node holding `key`.
    fn locate(&mut self, key: i32) -> Result<Option<NodeRecord>, TreeError> {
        let mut current = self.header()?.root();

        while let Some(record) = self.record(current)? {
            current = match key.cmp(&record.order_key) {
                Ordering::Equal => return Ok(Some(record)),
                Ordering::Less => record.left,
                Ordering::Greater => record.right,
            };
        }

        Ok(None)
    }

    /// Look up a key.
    ///
    /// A missing key is `Ok(None)`, not an error.
    pub fn find(&mut self, key: i32) -> Result<Option<Found>, TreeError> {
        Ok(self.locate(key)?.map(|record| Found {
            payload: record.payload,
            node: record.self_index,
        }))
    }

    pub fn contains(&mut self, key: i32) -> Result<bool, TreeError> {
        Ok(self.locate(key)?.is_some())
    }

    // ========== Insert ==========

    /// Insert a key, or apply the duplicate policy if it already exists.
    pub fn insert(&mut self, key: i32, payload: i32) -> Result<InsertOutcome, TreeError> {
        let root = self.root()?;

        if root.is_nil() {
            let node = self.allocate(NodeRecord::new(
                NodeRef::NIL,
                Color::Black,
                key,
                payload,
            ))?;
            self.store.write_root_index(node)?;
            tracing::debug!(key, %node, "inserted root");
            return Ok(InsertOutcome::Inserted(node));
        }

        let mut current = root;
        loop {
            let Some(record) = self.record(current)? else {
                return Err(TreeError::Corrupt(format!(
                    "walk for key {key} reached missing node {current}"
                )));
            };

            let side = match key.cmp(&record.order_key) {
                Ordering::Equal => return self.on_duplicate(&record, payload),
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };

            let next = match side {
                Side::Left => record.left,
                Side::Right => record.right,
            };

            if next.is_nil() {
                let mut new_record = NodeRecord::new(NodeRef::NIL, Color::Red, key, payload);
                new_record.parent = current;
                let node = self.allocate(new_record)?;
                self.set_child(current, side, node)?;
                tracing::debug!(key, %node, parent = %current, "inserted node");

                self.insert_fixup(node)?;
                return Ok(InsertOutcome::Inserted(node));
            }

            current = next;
        }
    }

    fn on_duplicate(
        &mut self,
        record: &NodeRecord,
        payload: i32,
    ) -> Result<InsertOutcome, TreeError> {
        match self.policy {
            DuplicatePolicy::Upsert => {
                self.store
                    .patch_field(record.self_index, Field::Payload(payload))?;
                tracing::debug!(key = record.order_key, node = %record.self_index, "updated payload");
                Ok(InsertOutcome::Updated {
                    node: record.self_index,
                    previous: record.payload,
                })
            }
            DuplicatePolicy::Reject => {
                tracing::warn!(key = record.order_key, "rejected duplicate key");
                Err(TreeError::DuplicateKey(record.order_key))
            }
        }
    }

    /// Write `record` to the next free slot and bump `node_count`.
    ///
    /// The record's `self_index` is overwritten with the assigned slot.
    fn allocate(&mut self, mut record: NodeRecord) -> Result<NodeRef, TreeError> {
        let header = self.header()?;
        let index = i32::try_from(header.node_count).map_err(|_| TreeError::CapacityExhausted)?;
        let next_count = header
            .node_count
            .checked_add(1)
            .ok_or(TreeError::CapacityExhausted)?;

        record.self_index = NodeRef::new(index);
        self.store.write_node(&record)?;
        self.store.write_node_count(next_count)?;
        Ok(record.self_index)
    }

    fn insert_fixup(&mut self, mut node: NodeRef) -> Result<(), TreeError> {
        loop {
            let parent = self.parent(node)?;
            if parent.is_nil() {
                self.set_color(node, Color::Black)?;
                return Ok(());
            }

            if self.color(parent)? == Color::Black {
                return Ok(());
            }

            // A red parent is never the root, so the grandparent is real.
            let grandparent = self.parent(parent)?;
            let parent_side = self.side_of(parent, grandparent)?;
            let uncle = self.child(grandparent, parent_side.opposite())?;

            if self.color(uncle)? == Color::Red {
                self.set_color(parent, Color::Black)?;
                self.set_color(uncle, Color::Black)?;
                self.set_color(grandparent, Color::Red)?;
                node = grandparent;
                continue;
            }

            // Straighten a zig-zag so node, parent and grandparent line up.
            let mut parent = parent;
            if self.side_of(node, parent)? != parent_side {
                match parent_side {
                    Side::Left => self.rotate_left(parent)?,
                    Side::Right => self.rotate_right(parent)?,
                }
                node = parent;
                parent = self.parent(node)?;
            }

            self.set_color(parent, Color::Black)?;
            self.set_color(grandparent, Color::Red)?;
            match parent_side {
                Side::Left => self.rotate_right(grandparent)?,
                Side::Right => self.rotate_left(grandparent)?,
            }
            return Ok(());
        }
    }

    // ========== Rotations ==========

    /// Rotate `node` down to the left; its right child takes its place.
    fn rotate_left(&mut self, node: NodeRef) -> Result<(), TreeError> {
        let pivot = self.right(node)?;
        let grandparent = self.parent(node)?;

        self.set_parent(pivot, grandparent)?;
        if !grandparent.is_nil() {
            let side = self.side_of(node, grandparent)?;
            self.set_child(grandparent, side, pivot)?;
        }

        let inner = self.left(pivot)?;
        self.set_right(node, inner)?;
        self.set_parent(inner, node)?;

        self.set_parent(node, pivot)?;
        self.set_left(pivot, node)?;

        if grandparent.is_nil() {
            self.store.write_root_index(pivot)?;
        }
        tracing::debug!(%node, %pivot, "rotated left");
        Ok(())
    }

    /// Rotate `node` down to the right; its left child takes its place.
    fn rotate_right(&mut self, node: NodeRef) -> Result<(), TreeError> {
        let pivot = self.left(node)?;
        let grandparent = self.parent(node)?;

        self.set_parent(pivot, grandparent)?;
        if !grandparent.is_nil() {
            let side = self.side_of(node, grandparent)?;
            self.set_child(grandparent, side, pivot)?;
        }

        let inner = self.right(pivot)?;
        self.set_left(node, inner)?;
        self.set_parent(inner, node)?;

        self.set_parent(node, pivot)?;
        self.set_right(pivot, node)?;

        if grandparent.is_nil() {
            self.store.write_root_index(pivot)?;
        }
        tracing::debug!(%node, %pivot, "rotated right");
        Ok(())
    }

    /// Rotate `node` so the child on the opposite side of `toward` rises.
    fn rotate_toward(&mut self, node: NodeRef, toward: Side) -> Result<(), TreeError> {
        match toward {
            Side::Left => self.rotate_left(node),
            Side::Right => self.rotate_right(node),
        }
    }

    // ========== Delete ==========

    /// Remove a key. Returns the removed payload, or `None` if the key was
    /// absent, in which case nothing is written.
    pub fn delete(&mut self, key: i32) -> Result<Option<i32>, TreeError> {
        let Some(target) = self.locate(key)? else {
            return Ok(None);
        };
        let removed = target.payload;

        let mut node = target.self_index;
        let mut left = target.left;
        let mut right = target.right;
        let mut color = target.color;

        if !left.is_nil() && !right.is_nil() {
            // Move the successor's entry up and delete its slot instead.
            let successor = self.minimum(right)?;
            self.store
                .patch_field(node, Field::OrderKey(successor.order_key))?;
            self.store
                .patch_field(node, Field::Payload(successor.payload))?;
            tracing::debug!(key, %node, successor = %successor.self_index, "spliced successor");

            node = successor.self_index;
            left = successor.left;
            right = successor.right;
            color = successor.color;
        }

        let child = if left.is_nil() { right } else { left };

        if color == Color::Red {
            self.replace(node, child)?;
        } else if self.color(child)? == Color::Red {
            self.set_color(child, Color::Black)?;
            self.replace(node, child)?;
        } else {
            // Black leaf: fix up while it is still linked, then detach it.
            self.delete_fixup(node)?;
            self.replace(node, NodeRef::NIL)?;
        }

        tracing::debug!(key, %node, "deleted node");
        Ok(Some(removed))
    }

    /// Leftmost record of the subtree rooted at `node`.
    fn minimum(&mut self, node: NodeRef) -> Result<NodeRecord, TreeError> {
        let mut record = self
            .record(node)?
            .ok_or_else(|| TreeError::Corrupt(format!("subtree root {node} is missing")))?;

        while let Some(next) = self.record(record.left)? {
            record = next;
        }
        Ok(record)
    }

    /// Put `replacement` where `node` hangs, rewriting the root if needed.
    fn replace(&mut self, node: NodeRef, replacement: NodeRef) -> Result<(), TreeError> {
        let parent = self.parent(node)?;
        self.set_parent(replacement, parent)?;

        if parent.is_nil() {
            self.store.write_root_index(replacement)?;
        } else {
            let side = self.side_of(node, parent)?;
            self.set_child(parent, side, replacement)?;
        }
        Ok(())
    }

    fn delete_fixup(&mut self, mut node: NodeRef) -> Result<(), TreeError> {
        loop {
            let parent = self.parent(node)?;
            if parent.is_nil() {
                return Ok(());
            }

            let side = self.side_of(node, parent)?;
            let mut sibling = self.sibling(node, parent)?;

            if self.color(sibling)? == Color::Red {
                self.set_color(parent, Color::Red)?;
                self.set_color(sibling, Color::Black)?;
                self.rotate_toward(parent, side)?;
                sibling = self.sibling(node, parent)?;
            }

            let parent_color = self.color(parent)?;
            let sibling_color = self.color(sibling)?;
            let near = self.child(sibling, side)?;
            let far = self.child(sibling, side.opposite())?;
            let near_color = self.color(near)?;
            let far_color = self.color(far)?;

            let sibling_all_black = sibling_color == Color::Black
                && near_color == Color::Black
                && far_color == Color::Black;

            if parent_color == Color::Black && sibling_all_black {
                self.set_color(sibling, Color::Red)?;
                node = parent;
                continue;
            }

            if parent_color == Color::Red && sibling_all_black {
                self.set_color(sibling, Color::Red)?;
                self.set_color(parent, Color::Black)?;
                return Ok(());
            }

            if sibling_color == Color::Black && far_color == Color::Black && near_color == Color::Red
            {
                self.set_color(sibling, Color::Red)?;
                self.set_color(near, Color::Black)?;
                self.rotate_toward(sibling, side.opposite())?;
                sibling = self.sibling(node, parent)?;
            }

            let far = self.child(sibling, side.opposite())?;
            let parent_color = self.color(parent)?;
            self.set_color(sibling, parent_color)?;
            self.set_color(parent, Color::Black)?;
            self.set_color(far, Color::Black)?;
            self.rotate_toward(parent, side)?;
            return Ok(());
        }
    }

    // ========== Traversal ==========

    /// All `(key, payload)` pairs in ascending key order.
    pub fn entries(&mut self) -> Result<Vec<(i32, i32)>, TreeError> {
        let node_count = self.slot_count()?;
        let mut out = Vec::new();
        let mut stack: Vec<NodeRecord> = Vec::new();
        let mut current = self.root()?;

        loop {
            while let Some(record) = self.record(current)? {
                stack.push(record);
                current = record.left;
                if stack.len() > node_count {
                    return Err(TreeError::Corrupt("cycle detected during traversal".into()));
                }
            }

            let Some(record) = stack.pop() else {
                return Ok(out);
            };
            out.push((record.order_key, record.payload));
            if out.len() > node_count {
                return Err(TreeError::Corrupt("cycle detected during traversal".into()));
            }
            current = record.right;
        }
    }

    fn slot_count(&mut self) -> Result<usize, TreeError> {
        Ok(usize::try_from(self.header()?.node_count).unwrap_or(usize::MAX))
    }

    pub fn keys(&mut self) -> Result<Vec<i32>, TreeError> {
        Ok(self.entries()?.into_iter().map(|(k, _)| k).collect())
    }

    pub fn values(&mut self) -> Result<Vec<i32>, TreeError> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Number of reachable nodes.
    pub fn len(&mut self) -> Result<usize, TreeError> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&mut self) -> Result<bool, TreeError> {
        Ok(self.root()?.is_nil())
    }

    // ========== Validation ==========

    /// Verify the red-black and structural invariants of every reachable node.
    pub fn check(&mut self) -> Result<TreeStats, TreeError> {
        let root = self.header()?.root();
        let Some(root_record) = self.record(root)? else {
            return Ok(TreeStats::default());
        };

        if root_record.color != Color::Black {
            return Err(TreeError::Corrupt(format!("root {root} is red")));
        }
        if !root_record.parent.is_nil() {
            return Err(TreeError::Corrupt(format!(
                "root {root} has parent {}",
                root_record.parent
            )));
        }

        let node_count = self.slot_count()?;
        let mut stats = TreeStats::default();
        let mut black_height = None;

        // (record, lower bound, upper bound, black nodes so far, depth)
        let mut stack = vec![(root_record, None::<i32>, None::<i32>, 0usize, 1usize)];

        while let Some((record, low, high, blacks, depth)) = stack.pop() {
            stats.nodes += 1;
            if stats.nodes > node_count {
                return Err(TreeError::Corrupt("more reachable nodes than slots".into()));
            }
            stats.depth = stats.depth.max(depth);

            let node = record.self_index;
            let key = record.order_key;
            if low.is_some_and(|low| key <= low) || high.is_some_and(|high| key >= high) {
                return Err(TreeError::Corrupt(format!(
                    "node {node} with key {key} is out of order"
                )));
            }

            let blacks = blacks + usize::from(record.color == Color::Black);

            for (child, child_low, child_high) in [
                (record.left, low, Some(key)),
                (record.right, Some(key), high),
            ] {
                match self.record(child)? {
                    None => match black_height {
                        None => black_height = Some(blacks),
                        Some(expected) if expected != blacks => {
                            return Err(TreeError::Corrupt(format!(
                                "black height {blacks} below node {node}, expected {expected}"
                            )));
                        }
                        Some(_) => {}
                    },
                    Some(child_record) => {
                        if child_record.parent != node {
                            return Err(TreeError::Corrupt(format!(
                                "node {child} has parent {} but hangs from {node}",
                                child_record.parent
                            )));
                        }
                        if record.color == Color::Red && child_record.color == Color::Red {
                            return Err(TreeError::Corrupt(format!(
                                "red node {child} has red parent {node}"
                            )));
                        }
                        stack.push((child_record, child_low, child_high, blacks, depth + 1));
                    }
                }
            }
        }

        stats.black_height = black_height.unwrap_or(0);
        Ok(stats)
    }
}

/// Errors that can occur during tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Record store error.
    Store(StoreError),
    /// Insert refused under [`DuplicatePolicy::Reject`].
    DuplicateKey(i32),
    /// No more record indices are available.
    CapacityExhausted,
    /// The persisted tree violates an invariant.
    Corrupt(String),
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::DuplicateKey(key) => write!(f, "key {key} already exists"),
            Self::CapacityExhausted => write!(f, "no record indices left"),
            Self::Corrupt(msg) => write!(f, "corrupt tree: {msg}"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::DuplicateKey(_) | Self::CapacityExhausted | Self::Corrupt(_) => None,
        }
    }
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
