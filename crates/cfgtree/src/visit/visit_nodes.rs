use super::Visit;
use crate::node::NodeRef;

/// Recursively visit all nodes, each object before its members
///
/// Override objects of derivations are separate trees and are not entered.
pub trait VisitNodes<'a> {
    fn visit_nodes(&self, visitor: &mut dyn Visit<NodeRef<'a>>);
}

impl<'a> VisitNodes<'a> for NodeRef<'a> {
    fn visit_nodes(&self, visitor: &mut dyn Visit<NodeRef<'a>>) {
        visitor.visit(*self);
        for (_, member) in self.members() {
            member.visit_nodes(visitor);
        }
    }
}
