//! configuration node tree
//!
//! All nodes of a [Tree] live in one arena and are addressed by [NodeId]. Every slot knows its
//! parent, objects own their members through ids. Ids stay valid for the lifetime of the tree:
//! replacing a node overwrites its slot instead of moving it, so anything that remembered the id
//! (or the path) observes the new content. Slots of whatever was replaced are not reused, a
//! resolved tree is [Tree::compact]ed once before it is handed out.
//!
//! Ids are only meaningful for the tree that handed them out. Passing a foreign id panics like an
//! out of bounds index would.
use crate::node_path::{NodePath, PARENT};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Value,
    Object,
    NodeReference,
    DerivedObject,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::Value => f.write_str("value"),
            NodeType::Object => f.write_str("object"),
            NodeType::NodeReference => f.write_str("reference"),
            NodeType::DerivedObject => f.write_str("derived object"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Opaque literal, never interpreted further
    Value(serde_json::Value),
    /// Members in insertion order
    Object(IndexMap<String, NodeId>),
    /// Placeholder for a copy of the node at this path
    NodeReference(NodePath),
    /// Placeholder for the merge of all bases with `config` on top
    DerivedObject(Derivation),
}

impl NodeKind {
    pub fn empty_object() -> Self {
        NodeKind::Object(IndexMap::new())
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Value(_) => NodeType::Value,
            NodeKind::Object(_) => NodeType::Object,
            NodeKind::NodeReference(_) => NodeType::NodeReference,
            NodeKind::DerivedObject(_) => NodeType::DerivedObject,
        }
    }
}

impl From<serde_json::Value> for NodeKind {
    fn from(value: serde_json::Value) -> Self {
        NodeKind::Value(value)
    }
}

impl From<NodePath> for NodeKind {
    fn from(value: NodePath) -> Self {
        NodeKind::NodeReference(value)
    }
}

impl From<Derivation> for NodeKind {
    fn from(value: Derivation) -> Self {
        NodeKind::DerivedObject(value)
    }
}

#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Derivation {
    /// Merged in listed order, later bases win
    pub bases: Vec<NodePath>,
    /// Override applied on top of all bases. The root is always an object.
    pub config: Tree,
}

#[derive(Debug, Clone)]
struct Slot {
    parent: Option<NodeId>,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct Tree {
    slots: Vec<Slot>,
    root: NodeId,
}

impl Default for Tree {
    /// A tree holding an empty root object
    fn default() -> Self {
        Tree::new(NodeKind::empty_object())
    }
}

impl Tree {
    pub fn new(root: NodeKind) -> Self {
        Self {
            slots: vec![Slot {
                parent: None,
                kind: root,
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub fn root_node(&self) -> NodeRef<'_> {
        self.node(self.root)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.slots[id.0].kind
    }

    pub fn node_type(&self, id: NodeId) -> NodeType {
        self.kind(id).node_type()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots[id.0].parent
    }

    /// Creates a detached node. It only becomes part of the tree through [Tree::set_member].
    pub fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot { parent: None, kind });
        id
    }

    /// Makes `child` a member of `object`
    ///
    /// An existing member with the same name is replaced at its position and detached. Returns
    /// the replaced member.
    ///
    /// # Panics
    ///
    /// Panics if `object` is not an object node.
    pub fn set_member(
        &mut self,
        object: NodeId,
        name: impl Into<String>,
        child: NodeId,
    ) -> Option<NodeId> {
        let NodeKind::Object(members) = &mut self.slots[object.0].kind else {
            panic!("set_member called on a non-object node");
        };

        let previous = members.insert(name.into(), child);
        if let Some(previous) = previous {
            self.slots[previous.0].parent = None;
        }
        self.slots[child.0].parent = Some(object);

        previous
    }

    /// Shorthand for [Tree::insert] followed by [Tree::set_member]
    pub fn add_member(&mut self, object: NodeId, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let child = self.insert(kind);
        self.set_member(object, name, child);
        child
    }

    pub fn member(&self, object: NodeId, name: &str) -> Option<NodeId> {
        match self.kind(object) {
            NodeKind::Object(members) => members.get(name).copied(),
            _ => None,
        }
    }

    pub fn members(&self, id: NodeId) -> impl Iterator<Item = (&str, NodeId)> {
        let members = match self.kind(id) {
            NodeKind::Object(members) => Some(members),
            _ => None,
        };

        members
            .into_iter()
            .flatten()
            .map(|(name, child)| (name.as_str(), *child))
    }

    /// Name under which the parent holds this node
    pub fn name(&self, id: NodeId) -> Option<&str> {
        let parent = self.parent(id)?;
        self.members(parent)
            .find(|(_, child)| *child == id)
            .map(|(name, _)| name)
    }

    /// Absolute path from the root to this node
    ///
    /// A node without a parent is addressed as `/`.
    pub fn node_path(&self, id: NodeId) -> NodePath {
        let mut names = vec![];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            match self.name(current) {
                Some(name) => names.push(name),
                None => break,
            }
            current = parent;
        }

        names.reverse();
        NodePath::new(format!("/{}", names.join("/")))
    }

    /// Looks up `path`, relative paths start at `from`
    ///
    /// Lookup never traverses through values or placeholders.
    pub fn node_at_path(&self, from: NodeId, path: &NodePath) -> Option<NodeId> {
        if !path.is_valid() {
            return None;
        }

        if path.is_root() {
            return Some(self.root);
        }

        let mut current = if path.is_absolute() { self.root } else { from };
        for name in path.node_names() {
            current = if name == PARENT {
                self.parent(current)?
            } else {
                self.member(current, name)?
            };
        }

        Some(current)
    }

    /// True if `ancestor` is on the parent chain of `id` (excluding `id` itself)
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            if parent == ancestor {
                return true;
            }
            current = parent;
        }

        false
    }

    pub fn is_fully_resolved(&self, id: NodeId) -> bool {
        match self.kind(id) {
            NodeKind::Value(_) => true,
            NodeKind::Object(members) => members.values().all(|child| self.is_fully_resolved(*child)),
            NodeKind::NodeReference(_) | NodeKind::DerivedObject(_) => false,
        }
    }

    pub fn is_empty_object(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Object(members) if members.is_empty())
    }

    /// Deep copy of a node as a standalone tree without parent
    pub fn subtree(&self, id: NodeId) -> Tree {
        let mut tree = Tree {
            slots: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.import(self, id);
        tree
    }

    /// Deep copy of a node of `other` into this arena, detached
    pub fn import(&mut self, other: &Tree, id: NodeId) -> NodeId {
        let NodeKind::Object(members) = other.kind(id) else {
            return self.insert(other.kind(id).clone());
        };

        let object = self.insert(NodeKind::empty_object());
        for (name, child) in members {
            let copy = self.import(other, *child);
            self.set_member(object, name.clone(), copy);
        }

        object
    }

    /// Overwrites the slot of `target` with a copy of `id` from `replacement`
    ///
    /// `target` keeps its id, parent and position. Members of the copy are reparented to
    /// `target`. The previous members of `target` stay in the arena, unreachable, until
    /// [Tree::compact].
    pub fn replace(&mut self, target: NodeId, replacement: &Tree, id: NodeId) {
        let NodeKind::Object(members) = replacement.kind(id) else {
            self.slots[target.0].kind = replacement.kind(id).clone();
            return;
        };

        self.slots[target.0].kind = NodeKind::empty_object();
        for (name, child) in members {
            let copy = self.import(replacement, *child);
            self.set_member(target, name.clone(), copy);
        }
    }

    /// Merges object `other_id` of `other` into object `target`
    ///
    /// For every member of `other` in order:
    /// - missing here: a copy is appended
    /// - object on both sides: merged recursively
    /// - otherwise: a copy replaces the member at its position
    ///
    /// Does nothing unless both nodes are objects.
    pub fn apply(&mut self, target: NodeId, other: &Tree, other_id: NodeId) {
        if self.node_type(target) != NodeType::Object {
            return;
        }

        let NodeKind::Object(other_members) = other.kind(other_id) else {
            return;
        };

        for (name, other_child) in other_members {
            match self.member(target, name) {
                Some(existing)
                    if self.node_type(existing) == NodeType::Object
                        && other.node_type(*other_child) == NodeType::Object =>
                {
                    self.apply(existing, other, *other_child);
                }
                _ => {
                    let copy = self.import(other, *other_child);
                    self.set_member(target, name.clone(), copy);
                }
            }
        }
    }

    /// Copy of the tree without slots that replacement left unreachable
    pub fn compact(&self) -> Tree {
        self.subtree(self.root)
    }
}

impl PartialEq for Tree {
    /// Structural equality of the roots, member order is ignored
    fn eq(&self, other: &Self) -> bool {
        self.root_node() == other.root_node()
    }
}

/// Borrowed handle to one node of a [Tree]
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a Tree,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    pub fn kind(&self) -> &'a NodeKind {
        self.tree.kind(self.id)
    }

    pub fn node_type(&self) -> NodeType {
        self.tree.node_type(self.id)
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.tree.parent(self.id).map(|id| self.tree.node(id))
    }

    pub fn name(&self) -> Option<&'a str> {
        self.tree.name(self.id)
    }

    pub fn node_path(&self) -> NodePath {
        self.tree.node_path(self.id)
    }

    pub fn member(&self, name: &str) -> Option<NodeRef<'a>> {
        self.tree.member(self.id, name).map(|id| self.tree.node(id))
    }

    pub fn members(&self) -> impl Iterator<Item = (&'a str, NodeRef<'a>)> + 'a {
        let tree = self.tree;
        tree.members(self.id)
            .map(move |(name, id)| (name, tree.node(id)))
    }

    pub fn node_at_path(&self, path: &NodePath) -> Option<NodeRef<'a>> {
        self.tree
            .node_at_path(self.id, path)
            .map(|id| self.tree.node(id))
    }

    pub fn value(&self) -> Option<&'a serde_json::Value> {
        match self.kind() {
            NodeKind::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn reference(&self) -> Option<&'a NodePath> {
        match self.kind() {
            NodeKind::NodeReference(path) => Some(path),
            _ => None,
        }
    }

    pub fn derivation(&self) -> Option<&'a Derivation> {
        match self.kind() {
            NodeKind::DerivedObject(derivation) => Some(derivation),
            _ => None,
        }
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.tree.is_fully_resolved(self.id)
    }

    /// Deep copy as a standalone tree
    pub fn to_tree(&self) -> Tree {
        self.tree.subtree(self.id)
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self.kind(), other.kind()) {
            (NodeKind::Value(a), NodeKind::Value(b)) => a == b,
            (NodeKind::Object(a), NodeKind::Object(b)) => {
                a.len() == b.len()
                    && a.keys().all(|name| match (self.member(name), other.member(name)) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    })
            }
            (NodeKind::NodeReference(a), NodeKind::NodeReference(b)) => a == b,
            (NodeKind::DerivedObject(a), NodeKind::DerivedObject(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// `{"a": {"b": 1, "c": "x"}, "d": true}`
    fn sample() -> Tree {
        let mut tree = Tree::default();
        let a = tree.add_member(tree.root(), "a", NodeKind::empty_object());
        tree.add_member(a, "b", json!(1).into());
        tree.add_member(a, "c", json!("x").into());
        tree.add_member(tree.root(), "d", json!(true).into());
        tree
    }

    fn names(tree: &Tree, id: NodeId) -> Vec<&str> {
        tree.members(id).map(|(name, _)| name).collect()
    }

    #[test]
    fn set_member_stamps_parent_and_keeps_position() {
        let mut tree = sample();
        let root = tree.root();
        let a = tree.member(root, "a").unwrap();
        assert_eq!(tree.parent(a), Some(root));

        let replacement = tree.insert(json!(2).into());
        let previous = tree.set_member(root, "a", replacement);

        assert_eq!(previous, Some(a));
        assert_eq!(tree.parent(a), None);
        assert_eq!(tree.parent(replacement), Some(root));
        assert_eq!(names(&tree, root), vec!["a", "d"]);
    }

    #[test]
    fn node_path_and_lookup() {
        let tree = sample();
        let root = tree.root();
        let a = tree.member(root, "a").unwrap();
        let b = tree.member(a, "b").unwrap();

        assert_eq!(tree.node_path(b).as_str(), "/a/b");
        assert_eq!(tree.node_path(root), NodePath::root());

        assert_eq!(tree.node_at_path(b, &"/a/c".into()), tree.member(a, "c"));
        assert_eq!(tree.node_at_path(b, &"../c".into()), tree.member(a, "c"));
        assert_eq!(tree.node_at_path(a, &"b".into()), Some(b));
        assert_eq!(tree.node_at_path(b, &"/".into()), Some(root));
        assert_eq!(tree.node_at_path(a, &"../..".into()), None);
        // no traversal through values
        assert_eq!(tree.node_at_path(root, &"/a/b/x".into()), None);
        assert_eq!(tree.node_at_path(root, &"/missing".into()), None);
    }

    #[test]
    fn subtree_is_a_detached_deep_copy() {
        let tree = sample();
        let a = tree.member(tree.root(), "a").unwrap();

        let mut copy = tree.subtree(a);
        assert_eq!(copy.parent(copy.root()), None);
        assert_eq!(copy.root_node(), tree.node(a));

        let copy_root = copy.root();
        copy.add_member(copy_root, "new", json!(0).into());
        assert!(tree.member(a, "new").is_none());
    }

    #[test]
    fn replace_keeps_slot_and_reparents() {
        let mut tree = sample();
        let root = tree.root();
        let d = tree.member(root, "d").unwrap();
        let a = tree.member(root, "a").unwrap();

        let source = tree.subtree(a);
        let slots = tree.slots.len();
        tree.replace(d, &source, source.root());

        // one new slot per copied member, the copied object itself reuses `d`
        assert_eq!(tree.slots.len(), slots + source.slots.len() - 1);
        assert_eq!(tree.member(root, "d"), Some(d));
        assert_eq!(tree.node_type(d), NodeType::Object);
        let b = tree.member(d, "b").unwrap();
        assert_eq!(tree.parent(b), Some(d));
        assert_eq!(tree.node_path(b).as_str(), "/d/b");
        assert_eq!(tree.node(d), tree.node(a));
    }

    #[test]
    fn apply_merges_recursively() {
        let mut base = sample();
        let mut overlay = Tree::default();
        let a = overlay.add_member(overlay.root(), "a", NodeKind::empty_object());
        overlay.add_member(a, "c", json!("y").into());
        overlay.add_member(a, "e", json!(5).into());
        overlay.add_member(overlay.root(), "d", NodeKind::empty_object());
        overlay.add_member(overlay.root(), "f", json!(null).into());

        let root = base.root();
        base.apply(root, &overlay, overlay.root());

        let merged = base.root_node();
        assert_eq!(names(&base, root), vec!["a", "d", "f"]);
        let merged_a = merged.member("a").unwrap();
        assert_eq!(merged_a.member("b").unwrap().value(), Some(&json!(1)));
        assert_eq!(merged_a.member("c").unwrap().value(), Some(&json!("y")));
        assert_eq!(merged_a.member("e").unwrap().value(), Some(&json!(5)));
        assert_eq!(merged.member("d").unwrap().node_type(), NodeType::Object);
    }

    #[test]
    fn apply_disjoint_is_commutative() {
        let mut left = Tree::default();
        left.add_member(left.root(), "x", json!(1).into());
        let mut right = Tree::default();
        right.add_member(right.root(), "y", json!(2).into());

        let mut left_then_right = Tree::default();
        let root = left_then_right.root();
        left_then_right.apply(root, &left, left.root());
        left_then_right.apply(root, &right, right.root());

        let mut right_then_left = Tree::default();
        let root = right_then_left.root();
        right_then_left.apply(root, &right, right.root());
        right_then_left.apply(root, &left, left.root());

        assert_eq!(left_then_right, right_then_left);
    }

    #[test]
    fn fully_resolved() {
        let mut tree = sample();
        assert!(tree.is_fully_resolved(tree.root()));

        let a = tree.member(tree.root(), "a").unwrap();
        tree.add_member(a, "r", NodePath::new("/d").into());
        assert!(!tree.is_fully_resolved(tree.root()));
        assert!(!tree.is_fully_resolved(a));
        assert!(tree.is_fully_resolved(tree.member(tree.root(), "d").unwrap()));
    }

    #[test]
    fn compact_drops_unreachable_slots() {
        let mut tree = sample();
        let root = tree.root();
        let a = tree.member(root, "a").unwrap();
        let source = tree.subtree(a);
        let d = tree.member(root, "d").unwrap();
        tree.replace(d, &source, source.root());
        let orphan = tree.insert(json!(0).into());
        assert_eq!(tree.parent(orphan), None);

        let compact = tree.compact();
        assert_eq!(compact, tree);
        assert!(compact.slots.len() < tree.slots.len());
    }
}
