//! # Chain graph
//!
//! The parent/children bookkeeping that lets `Cancel()` walk a lineage of
//! promises that may each carry a different value type `T`. Because the
//! graph is heterogeneous in `T`, it is represented as a small object-safe
//! trait (`ChainNode`) rather than a typed tree — every [`crate::value::Promise`]
//! implements it.
//!
//! Per the design notes (§9 of the spec): a parent holds its children only
//! weakly. While a promise is pending its handler closures already keep its
//! children alive (a closure registered on the parent captures a strong
//! handle to the result promise it must settle); once the parent settles,
//! those closures are dropped, and a weak `children` entry lets a finished
//! subtree be freed instead of being retained forever by a long-lived parent.
//! The child's `parent` back-reference is weak for the same reason, in the
//! other direction.

use std::rc::{Rc, Weak};

use crate::diagnostics;
use crate::error::CombinatorError;
use crate::id::PromiseId;
use crate::state::StateKind;

/// A node in the cancellation/chain graph, type-erased over its value type.
pub trait ChainNode {
    fn node_id(&self) -> PromiseId;
    fn node_name(&self) -> Option<&str>;
    fn state_kind(&self) -> StateKind;
    fn cancel_self(&self);
    fn parent_node(&self) -> Option<Rc<dyn ChainNode>>;
    fn set_parent_node(&self, parent: Weak<dyn ChainNode>);
    fn add_child_node(&self, child: Weak<dyn ChainNode>);
    fn child_nodes(&self) -> Vec<Weak<dyn ChainNode>>;
}

/// Attach `child` as a descendant of `parent` in the chain graph.
///
/// Refuses (with a minor warning, no effect) an attempt to make a promise its
/// own parent, or to close a direct two-node cycle. Reattaching an
/// already-parented child is tolerated with a warning — the most recent
/// attachment wins (invariant 6 of the data model).
pub fn attach_parent(child: &Rc<dyn ChainNode>, parent: &Rc<dyn ChainNode>) {
    if child.node_id() == parent.node_id() {
        let err = CombinatorError::SelfParent {
            child: child.node_id(),
            parent: parent.node_id(),
        };
        diagnostics::sink().on_warning_minor(&err.to_string());
        return;
    }

    if let Some(grandparent) = parent.parent_node() {
        if grandparent.node_id() == child.node_id() {
            diagnostics::sink().on_warning_minor(&format!(
                "refusing to attach promise {} as a parent of {}: would close a cycle",
                parent.node_id(),
                child.node_id()
            ));
            return;
        }
    }

    if child.parent_node().is_some() {
        diagnostics::sink().on_warning(&format!(
            "promise {} already had a parent; reattaching to {}",
            child.node_id(),
            parent.node_id()
        ));
    }

    child.set_parent_node(Rc::downgrade(parent));
    parent.add_child_node(Rc::downgrade(child));
}

/// `Cancel()`: walk from `leaf` up to the topmost still-pending ancestor,
/// then apply `CancelSelf` to the ordered sequence from that ancestor down
/// to `leaf`, inclusive.
pub fn cancel(leaf: &Rc<dyn ChainNode>) {
    let mut lineage: Vec<Rc<dyn ChainNode>> = vec![leaf.clone()];
    let mut current = leaf.clone();
    while let Some(parent) = current.parent_node() {
        lineage.push(parent.clone());
        current = parent;
    }
    // `lineage` is now [leaf, parent, grandparent, ..., root].

    let topmost_pending = lineage
        .iter()
        .rev()
        .find(|node| node.state_kind().is_pending())
        .cloned();

    let Some(topmost_pending) = topmost_pending else {
        return; // nothing pending anywhere in the lineage
    };

    let start = lineage
        .iter()
        .position(|n| n.node_id() == topmost_pending.node_id())
        .expect("topmost_pending was taken from lineage");

    for node in lineage[..=start].iter().rev() {
        node.cancel_self();
    }
}

/// `CancelSelfAndAllChildren()`: collect `root` plus every transitively
/// pending descendant, then `CancelSelf` each. Non-pending descendants (and
/// their subtrees) are pruned from the traversal.
pub fn cancel_self_and_all_children(root: &Rc<dyn ChainNode>) {
    let mut stack = vec![root.clone()];
    let mut collected = Vec::new();

    while let Some(node) = stack.pop() {
        if !node.state_kind().is_pending() && !Rc::ptr_eq(&node, root) {
            continue;
        }
        for child_weak in node.child_nodes() {
            if let Some(child) = child_weak.upgrade() {
                if child.state_kind().is_pending() {
                    stack.push(child);
                }
            }
        }
        collected.push(node);
    }

    for node in collected {
        node.cancel_self();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Promise;
    use crate::VoidPromise;

    fn node_of<T: 'static>(p: &Promise<T>) -> Rc<dyn ChainNode> {
        p.as_chain_node()
    }

    #[test]
    fn self_parent_is_refused() {
        let p = Promise::<i32>::pending();
        let node = node_of(&p);
        attach_parent(&node, &node);
        assert!(node.parent_node().is_none());
    }

    #[test]
    fn cancel_walks_pending_prefix_only() {
        let root = Promise::<i32>::pending();
        let mid = root.then_value(|x| x + 1);
        let leaf = mid.then_value(|x| x * 2);

        root.resolve(1); // root settles immediately; mid/leaf remain pending
        assert!(matches!(root.state_kind(), StateKind::Resolved));

        leaf.cancel();
        assert!(matches!(mid.state_kind(), StateKind::Cancelled));
        assert!(matches!(leaf.state_kind(), StateKind::Cancelled));
        // root already settled, so it is untouched by the cancel walk.
        assert!(matches!(root.state_kind(), StateKind::Resolved));
    }

    #[test]
    fn cancel_self_and_all_children_prunes_settled_subtrees() {
        let root = VoidPromise::pending();
        let settled_child = root.then(|()| VoidPromise::resolved(()));
        settled_child.resolve(());
        let pending_child = root.then(|()| VoidPromise::pending());

        root.cancel_self_and_all_children();
        assert!(matches!(root.state_kind(), StateKind::Cancelled));
        assert!(matches!(pending_child.state_kind(), StateKind::Cancelled));
        // settled_child had already resolved; it must not be disturbed.
        assert!(matches!(settled_child.state_kind(), StateKind::Resolved));
    }
}
