//! Tree traversal utilities for expression trees.
//!
//! # Walking
//!
//! [`walk`] visits every node depth-first, pre-order, calling
//! [`Visitor::enter`] before a node's children and [`Visitor::properties`]
//! once all of them have been visited. Each node receives the context value
//! produced by its parent's `enter`, so state flows top-down only and never
//! leaks between sibling branches. Returning [`Walk::Stop`] halts the whole
//! traversal immediately; nothing that was still scheduled is visited and
//! `walk` returns `false`.
//!
//! # Searching
//!
//! [`DfsIter`] and the [`ExpressionWalk`] extension trait cover read-only
//! search: [`find`](ExpressionWalk::find), [`find_all`](ExpressionWalk::find_all),
//! [`contains`](ExpressionWalk::contains) and [`count`](ExpressionWalk::count).
//!
//! # Rewriting
//!
//! [`modify`] rewrites a tree bottom-up. A node is rebuilt only when one of
//! its children changed by reference; every untouched subtree comes back as
//! the identical `Arc`, which keeps reference comparisons such as alias
//! matching valid across rewrites.

use crate::dispatch::{ChildRef, ChildValue};
use crate::error::{Error, Result};
use crate::expressions::{Expression, Node, Scalar};
use std::sync::Arc;

/// Position of a node inside its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// Slot name in the parent; `"root"` for the walk root
    pub name: &'static str,
    /// Position inside a list-valued slot
    pub index: Option<usize>,
}

impl SlotInfo {
    pub const ROOT: SlotInfo = SlotInfo {
        name: "root",
        index: None,
    };
}

/// Control value returned by [`Visitor::enter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Walk<C> {
    /// Visit the children, handing them this context
    Continue(C),
    /// Do not descend; properties are still reported with this context
    SkipChildren(C),
    /// Halt the traversal
    Stop,
}

/// Callbacks driven by [`walk`]
pub trait Visitor<C> {
    fn enter(&mut self, node: &Node, slot: SlotInfo, ctx: &C) -> Walk<C>;

    /// Called after every child of `node` has been visited, with the context
    /// `enter` produced for `node`.
    fn properties(&mut self, _node: &Node, _props: &[(&'static str, Scalar)], _ctx: &C) {}
}

/// Walk the tree rooted at `root`. Returns `false` if a visitor stopped it.
pub fn walk<C, V>(root: &Node, initial: C, visitor: &mut V) -> bool
where
    V: Visitor<C> + ?Sized,
{
    walk_node(root, SlotInfo::ROOT, &initial, visitor)
}

fn walk_node<C, V>(node: &Node, slot: SlotInfo, ctx: &C, visitor: &mut V) -> bool
where
    V: Visitor<C> + ?Sized,
{
    let (own, descend) = match visitor.enter(node, slot, ctx) {
        Walk::Continue(c) => (c, true),
        Walk::SkipChildren(c) => (c, false),
        Walk::Stop => return false,
    };

    if descend {
        for (name, child) in node.children() {
            match child {
                ChildRef::One(n) => {
                    if !walk_node(n, SlotInfo { name, index: None }, &own, visitor) {
                        return false;
                    }
                }
                ChildRef::Optional(Some(n)) => {
                    if !walk_node(n, SlotInfo { name, index: None }, &own, visitor) {
                        return false;
                    }
                }
                ChildRef::Optional(None) => {}
                ChildRef::List(nodes) => {
                    for (i, n) in nodes.iter().enumerate() {
                        let slot = SlotInfo {
                            name,
                            index: Some(i),
                        };
                        if !walk_node(n, slot, &own, visitor) {
                            return false;
                        }
                    }
                }
            }
        }
    }

    let props = node.plain_properties();
    visitor.properties(node, &props, &own);
    true
}

struct FnVisitor<F>(F);

impl<C, F> Visitor<C> for FnVisitor<F>
where
    F: FnMut(&Node, SlotInfo, &C) -> Walk<C>,
{
    fn enter(&mut self, node: &Node, slot: SlotInfo, ctx: &C) -> Walk<C> {
        (self.0)(node, slot, ctx)
    }
}

/// [`walk`] with a closure in place of a [`Visitor`]
pub fn walk_fn<C, F>(root: &Node, initial: C, f: F) -> bool
where
    F: FnMut(&Node, SlotInfo, &C) -> Walk<C>,
{
    walk(root, initial, &mut FnVisitor(f))
}

/// Depth-first pre-order iterator over a tree.
///
/// For `a + b` the order is `Binary`, `a`, `b`.
pub struct DfsIter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> DfsIter<'a> {
    pub fn new(root: &'a Node) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for DfsIter<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // Push in reverse so children come out in declared order
        let children: Vec<&'a Node> = node
            .children()
            .into_iter()
            .flat_map(|(_, child)| child.nodes())
            .collect();
        self.stack.extend(children.into_iter().rev());

        Some(node)
    }
}

/// Extension trait adding search helpers to [`Node`].
pub trait ExpressionWalk {
    /// Depth-first (pre-order) iterator over this node and all descendants
    fn dfs(&self) -> DfsIter<'_>;

    /// First node matching `predicate` in depth-first order
    fn find<F>(&self, predicate: F) -> Option<&Node>
    where
        F: Fn(&Expression) -> bool;

    /// All nodes matching `predicate` in depth-first order
    fn find_all<F>(&self, predicate: F) -> Vec<&Node>
    where
        F: Fn(&Expression) -> bool;

    fn contains<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Expression) -> bool;

    fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Expression) -> bool;

    /// Maximum depth below this node; a leaf has depth 0
    fn tree_depth(&self) -> usize;
}

impl ExpressionWalk for Node {
    fn dfs(&self) -> DfsIter<'_> {
        DfsIter::new(self)
    }

    fn find<F>(&self, predicate: F) -> Option<&Node>
    where
        F: Fn(&Expression) -> bool,
    {
        self.dfs().find(|n| predicate(n))
    }

    fn find_all<F>(&self, predicate: F) -> Vec<&Node>
    where
        F: Fn(&Expression) -> bool,
    {
        self.dfs().filter(|n| predicate(n)).collect()
    }

    fn contains<F>(&self, predicate: F) -> bool
    where
        F: Fn(&Expression) -> bool,
    {
        self.dfs().any(|n| predicate(n))
    }

    fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Expression) -> bool,
    {
        self.dfs().filter(|n| predicate(n)).count()
    }

    fn tree_depth(&self) -> usize {
        self.children()
            .iter()
            .flat_map(|(_, child)| child.nodes())
            .map(|child| child.tree_depth() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Rewrite a tree bottom-up.
///
/// `f` sees every node after its children have been rewritten. Returning
/// `Some(node)` substitutes it (return the argument itself to keep it),
/// returning `None` removes it: list elements are dropped, optional slots are
/// cleared, and a required slot fails with [`Error::Rewrite`]. Removing the
/// root yields `Ok(None)`. The replacement is not visited again.
pub fn modify<F>(root: &Node, mut f: F) -> Result<Option<Node>>
where
    F: FnMut(&Node) -> Option<Node>,
{
    modify_node(root, &mut |n: &Node| Ok(f(n)))
}

/// [`modify`] with a fallible callback; the first error aborts the rewrite.
pub fn try_modify<F>(root: &Node, mut f: F) -> Result<Option<Node>>
where
    F: FnMut(&Node) -> Result<Option<Node>>,
{
    modify_node(root, &mut f)
}

fn modify_node(
    node: &Node,
    f: &mut dyn FnMut(&Node) -> Result<Option<Node>>,
) -> Result<Option<Node>> {
    let mut changed = false;
    let mut values = Vec::new();

    for (name, child) in node.children() {
        let value = match child {
            ChildRef::One(n) => match modify_node(n, f)? {
                Some(new) => {
                    changed |= !Arc::ptr_eq(n, &new);
                    ChildValue::One(new)
                }
                None => {
                    return Err(Error::rewrite(format!(
                        "cannot remove required child '{}' of {}",
                        name,
                        node.type_tag()
                    )))
                }
            },
            ChildRef::Optional(Some(n)) => {
                let new = modify_node(n, f)?;
                changed |= !matches!(&new, Some(new) if Arc::ptr_eq(n, new));
                ChildValue::Optional(new)
            }
            ChildRef::Optional(None) => ChildValue::Optional(None),
            ChildRef::List(nodes) => {
                let mut out = Vec::with_capacity(nodes.len());
                for n in nodes {
                    match modify_node(n, f)? {
                        Some(new) => {
                            changed |= !Arc::ptr_eq(n, &new);
                            out.push(new);
                        }
                        None => changed = true,
                    }
                }
                ChildValue::List(out)
            }
        };
        values.push(value);
    }

    let current = if changed {
        Arc::new(node.with_children(values)?)
    } else {
        node.clone()
    };
    f(&current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::{node, And, Binary, BinaryOperator, Literal, Name, Not};

    fn sample() -> Node {
        // (1 + 2) AND NOT a
        node(And {
            operands: vec![
                node(Binary::new(
                    node(Literal::new(1)),
                    BinaryOperator::Add,
                    node(Literal::new(2)),
                )),
                node(Not {
                    operand: node(Name::new("a")),
                }),
            ],
        })
    }

    #[test]
    fn test_dfs_order() {
        let tree = sample();
        let tags: Vec<&str> = tree.dfs().map(|n| n.type_tag()).collect();
        assert_eq!(tags, vec!["And", "Binary", "Literal", "Literal", "Not", "Name"]);
    }

    #[test]
    fn test_walk_stop_skips_scheduled_siblings() {
        let tree = sample();
        let mut seen = Vec::new();
        let finished = walk_fn(&tree, (), |n, _, _| {
            seen.push(n.type_tag());
            if matches!(n.as_ref(), Expression::Binary(_)) {
                Walk::Stop
            } else {
                Walk::Continue(())
            }
        });
        assert!(!finished);
        assert_eq!(seen, vec!["And", "Binary"]);
    }

    #[test]
    fn test_walk_threads_context_per_branch() {
        let tree = sample();
        let mut depths = Vec::new();
        walk_fn(&tree, 0usize, |n, _, depth| {
            depths.push((n.type_tag(), *depth));
            Walk::Continue(depth + 1)
        });
        assert_eq!(depths[4], ("Not", 1));
        assert_eq!(depths[5], ("Name", 2));
    }

    #[test]
    fn test_properties_follow_children() {
        struct Recorder(Vec<String>);
        impl Visitor<()> for Recorder {
            fn enter(&mut self, node: &Node, slot: SlotInfo, _: &()) -> Walk<()> {
                self.0.push(format!("enter {} @{}", node.type_tag(), slot.name));
                Walk::Continue(())
            }
            fn properties(&mut self, node: &Node, props: &[(&'static str, Scalar)], _: &()) {
                self.0.push(format!("props {} {}", node.type_tag(), props.len()));
            }
        }

        let tree = node(Binary::new(
            node(Literal::new(1)),
            BinaryOperator::Eq,
            node(Literal::new(1)),
        ));
        let mut rec = Recorder(Vec::new());
        assert!(walk(&tree, (), &mut rec));
        assert_eq!(rec.0[0], "enter Binary @root");
        assert_eq!(rec.0.last().map(String::as_str), Some("props Binary 1"));
    }

    #[test]
    fn test_identity_modify_reuses_every_node() {
        let tree = sample();
        let out = modify(&tree, |n| Some(n.clone())).unwrap().unwrap();
        assert!(Arc::ptr_eq(&tree, &out));
    }

    #[test]
    fn test_remove_required_child_fails() {
        let tree = sample();
        let err = modify(&tree, |n| match n.as_ref() {
            Expression::Name(_) => None,
            _ => Some(n.clone()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("operand"), "{}", err);
    }

    #[test]
    fn test_remove_list_element_rebuilds_parent_only() {
        let tree = sample();
        let Expression::And(and) = tree.as_ref() else {
            unreachable!()
        };
        let kept = and.operands[1].clone();
        let out = modify(&tree, |n| match n.as_ref() {
            Expression::Binary(_) => None,
            _ => Some(n.clone()),
        })
        .unwrap()
        .unwrap();
        let Expression::And(new_and) = out.as_ref() else {
            panic!("expected And");
        };
        assert_eq!(new_and.operands.len(), 1);
        assert!(Arc::ptr_eq(&new_and.operands[0], &kept));
        assert!(!Arc::ptr_eq(&tree, &out));
    }

    #[test]
    fn test_tree_depth() {
        assert_eq!(sample().tree_depth(), 2);
    }
}
