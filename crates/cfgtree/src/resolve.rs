//! reference and derivation resolution
//!
//! Resolution rewrites placeholders in place until the tree holds nothing but values and objects.
//!
//! One *pass* walks the whole tree once and tries every placeholder:
//! - a `NodeReference` is replaced by a copy of its target. The copy may itself still contain
//!   placeholders, later passes take care of those.
//! - a `DerivedObject` waits until every base exists and is fully resolved, then becomes the
//!   merge of all bases (in order) with its own override on top.
//!
//! Each pass reports a [ResolutionStatus]. The driver ([resolve_references]) keeps running passes
//! while they make progress. A pass that changes nothing is retried once with the external trees
//! as additional lookup source. If that changes nothing either we give up.
//!
//! Lookups go to the tree holding the placeholder first. Externals are only asked when that
//! fails: absolute paths are looked up from each external root, relative paths from the node at
//! the placeholder's own location inside each external. When several externals match, the last
//! one wins.
use crate::node::{NodeId, NodeRef, NodeType, Tree};
use crate::node_path::NodePath;
use crate::visit::VisitNodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStatus {
    /// Nothing left to resolve
    Resolved,
    /// Progress was made, something is left
    PartiallyResolved,
    /// No progress
    Unchanged,
    /// Resolution can never succeed, see the recorded issue
    Error,
}

impl ResolutionStatus {
    /// Folds the status of one member into the status of its object
    fn update(self, member: ResolutionStatus) -> ResolutionStatus {
        use ResolutionStatus::*;

        match (self, member) {
            (Error, _) | (_, Error) => Error,
            (_, Resolved | PartiallyResolved) => PartiallyResolved,
            (aggregate, Unchanged) => aggregate,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ResolveIssue {
    #[error("base `{base}` of {path} is a {found}, not an object")]
    BaseNotAnObject {
        path: NodePath,
        base: NodePath,
        found: NodeType,
    },
    #[error("reference `{reference}` at {path} points at an enclosing node")]
    EnclosingReference { path: NodePath, reference: NodePath },
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("{issue}; unresolved: {}", format_paths(.unresolved))]
    Invalid {
        issue: ResolveIssue,
        unresolved: Vec<NodePath>,
    },
    #[error("no further progress possible; unresolved: {}", format_paths(.unresolved))]
    Stalled { unresolved: Vec<NodePath> },
    #[error("not resolved within {cycles} cycles; unresolved: {}", format_paths(.unresolved))]
    CyclesExhausted {
        cycles: usize,
        unresolved: Vec<NodePath>,
    },
}

impl ResolveError {
    /// Every placeholder still left in the tree when resolution stopped
    pub fn unresolved(&self) -> &[NodePath] {
        match self {
            ResolveError::Invalid { unresolved, .. }
            | ResolveError::Stalled { unresolved }
            | ResolveError::CyclesExhausted { unresolved, .. } => unresolved,
        }
    }
}

fn format_paths(paths: &[NodePath]) -> String {
    paths
        .iter()
        .map(NodePath::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs passes until the tree is fully resolved
///
/// On error the tree is left in whatever state the last pass produced and must not be used.
#[tracing::instrument(level = "debug", skip_all, fields(externals = externals.len()))]
pub fn resolve_references(
    tree: &mut Tree,
    externals: &[&Tree],
    max_cycles: usize,
) -> Result<(), ResolveError> {
    if tree.is_fully_resolved(tree.root()) {
        return Ok(());
    }

    for cycle in 0..max_cycles {
        let (status, issues) = resolve_pass(tree, &[]);
        tracing::debug!(cycle, ?status, "resolution pass");

        match status {
            ResolutionStatus::Resolved => return Ok(()),
            ResolutionStatus::PartiallyResolved => continue,
            ResolutionStatus::Error => return Err(invalid(tree, issues)),
            ResolutionStatus::Unchanged => {}
        }

        let (status, issues) = resolve_pass(tree, externals);
        tracing::debug!(cycle, ?status, "resolution pass with externals");

        match status {
            ResolutionStatus::Resolved => return Ok(()),
            ResolutionStatus::PartiallyResolved => continue,
            ResolutionStatus::Error => return Err(invalid(tree, issues)),
            ResolutionStatus::Unchanged => {
                return Err(ResolveError::Stalled {
                    unresolved: unresolved_paths(tree),
                })
            }
        }
    }

    Err(ResolveError::CyclesExhausted {
        cycles: max_cycles,
        unresolved: unresolved_paths(tree),
    })
}

fn invalid(tree: &Tree, issues: Vec<ResolveIssue>) -> ResolveError {
    let unresolved = unresolved_paths(tree);
    match issues.into_iter().next() {
        Some(issue) => ResolveError::Invalid { issue, unresolved },
        None => ResolveError::Stalled { unresolved },
    }
}

/// A single pass over the whole tree
pub fn resolve_pass(tree: &mut Tree, externals: &[&Tree]) -> (ResolutionStatus, Vec<ResolveIssue>) {
    let mut pass = Pass::new(externals);
    let root = tree.root();

    let status = match tree.node_type(root) {
        NodeType::Object => pass.resolve_object_references(tree, root),
        _ if tree.is_fully_resolved(root) => ResolutionStatus::Resolved,
        _ => ResolutionStatus::Unchanged,
    };

    (status, pass.issues)
}

/// Paths of all placeholders left in the tree
pub fn unresolved_paths(tree: &Tree) -> Vec<NodePath> {
    let mut paths = vec![];
    tree.root_node().visit_nodes(&mut |node: NodeRef| {
        if matches!(
            node.node_type(),
            NodeType::NodeReference | NodeType::DerivedObject
        ) {
            paths.push(node.node_path());
        }
    });
    paths
}

/// Where a referenced node was found
#[derive(Debug, Clone, Copy)]
enum Found {
    Local(NodeId),
    External(usize, NodeId),
}

impl Found {
    fn locate<'t>(self, tree: &'t Tree, externals: &[&'t Tree]) -> (&'t Tree, NodeId) {
        match self {
            Found::Local(id) => (tree, id),
            Found::External(index, id) => (externals[index], id),
        }
    }
}

#[derive(derive_new::new)]
struct Pass<'e> {
    externals: &'e [&'e Tree],
    #[new(default)]
    issues: Vec<ResolveIssue>,
}

impl<'e> Pass<'e> {
    fn log(&mut self, issue: ResolveIssue) -> ResolutionStatus {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
        ResolutionStatus::Error
    }

    fn resolve_object_references(&mut self, tree: &mut Tree, object: NodeId) -> ResolutionStatus {
        let members: Vec<NodeId> = tree.members(object).map(|(_, member)| member).collect();
        let mut status = ResolutionStatus::Unchanged;

        for member in members {
            // untouched members are neither progress nor a reason to wait
            if tree.is_fully_resolved(member) {
                continue;
            }

            let member_status = match tree.node_type(member) {
                NodeType::Value => ResolutionStatus::Resolved,
                NodeType::Object => self.resolve_object_references(tree, member),
                NodeType::NodeReference => self.resolve_node_reference(tree, member),
                NodeType::DerivedObject => self.resolve_derived_object_references(tree, member),
            };

            status = status.update(member_status);
            if status == ResolutionStatus::Error {
                return ResolutionStatus::Error;
            }
        }

        if tree.is_fully_resolved(object) {
            return ResolutionStatus::Resolved;
        }

        status
    }

    fn resolve_node_reference(&mut self, tree: &mut Tree, id: NodeId) -> ResolutionStatus {
        let Some(reference) = tree.node(id).reference().cloned() else {
            return ResolutionStatus::Unchanged;
        };
        let parent = tree.parent(id).unwrap_or(tree.root());

        let Some(found) = self.find_referenced_config_node(tree, &reference, id, parent) else {
            tracing::trace!(path=%tree.node_path(id), %reference, "reference target not found");
            return ResolutionStatus::Unchanged;
        };

        if let Found::Local(target) = found {
            if tree.is_ancestor(target, id) {
                return self.log(ResolveIssue::EnclosingReference {
                    path: tree.node_path(id),
                    reference,
                });
            }
        }

        let (source, target) = found.locate(tree, self.externals);
        let replacement = source.subtree(target);
        tree.replace(id, &replacement, replacement.root());
        tracing::trace!(path=%tree.node_path(id), %reference, "reference replaced");

        if tree.is_fully_resolved(id) {
            ResolutionStatus::Resolved
        } else {
            ResolutionStatus::PartiallyResolved
        }
    }

    fn resolve_derived_object_references(
        &mut self,
        tree: &mut Tree,
        id: NodeId,
    ) -> ResolutionStatus {
        let Some(derivation) = tree.node(id).derivation().cloned() else {
            return ResolutionStatus::Unchanged;
        };
        let parent = tree.parent(id).unwrap_or(tree.root());

        let mut bases = Vec::with_capacity(derivation.bases.len());
        for base in &derivation.bases {
            let Some(found) = self.find_referenced_config_node(tree, base, id, parent) else {
                tracing::trace!(path=%tree.node_path(id), %base, "base not found");
                return ResolutionStatus::Unchanged;
            };

            let (source, target) = found.locate(tree, self.externals);
            if !source.is_fully_resolved(target) {
                tracing::trace!(path=%tree.node_path(id), %base, "base not resolved yet");
                return ResolutionStatus::Unchanged;
            }

            if source.node_type(target) != NodeType::Object {
                let found = source.node_type(target);
                return self.log(ResolveIssue::BaseNotAnObject {
                    path: tree.node_path(id),
                    base: base.clone(),
                    found,
                });
            }

            bases.push(source.subtree(target));
        }

        let mut computed = Tree::default();
        let root = computed.root();
        for base in &bases {
            computed.apply(root, base, base.root());
        }

        let config = &derivation.config;
        if !config.is_empty_object(config.root()) {
            computed.apply(root, config, config.root());
        }

        tree.replace(id, &computed, root);
        tracing::trace!(path=%tree.node_path(id), "derived object computed");

        if tree.is_fully_resolved(id) {
            ResolutionStatus::Resolved
        } else {
            ResolutionStatus::PartiallyResolved
        }
    }

    fn find_referenced_config_node(
        &self,
        tree: &Tree,
        path: &NodePath,
        placeholder: NodeId,
        parent: NodeId,
    ) -> Option<Found> {
        // a placeholder naming its own location imports that node from an external
        let local = tree
            .node_at_path(parent, path)
            .filter(|&found| found != placeholder);
        if let Some(id) = local {
            return Some(Found::Local(id));
        }

        if self.externals.is_empty() {
            return None;
        }

        let mut found = None;
        if path.is_absolute() {
            for (index, external) in self.externals.iter().enumerate() {
                if let Some(id) = external.node_at_path(external.root(), path) {
                    found = Some(Found::External(index, id));
                }
            }
        } else {
            let parent_path = tree.node_path(parent);
            for (index, external) in self.externals.iter().enumerate() {
                let id = external
                    .node_at_path(external.root(), &parent_path)
                    .and_then(|anchor| external.node_at_path(anchor, path));
                if let Some(id) = id {
                    found = Some(Found::External(index, id));
                }
            }
        }

        found
    }
}
