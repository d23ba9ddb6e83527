//! AST transform helpers and convenience getters.
//!
//! Mutations are thin wrappers over [`crate::traversal::modify`], so every
//! subtree they do not touch is returned as the same `Arc`. Clause setters on
//! `Select` take a node and return a new node; non-SELECT input comes back
//! unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::expressions::*;
use crate::traversal::{modify, ExpressionWalk};

fn with_select(node: &Node, f: impl FnOnce(&mut Select)) -> Node {
    match node.as_ref() {
        Expression::Select(sel) => {
            let mut sel = sel.clone();
            f(&mut sel);
            Arc::new(Expression::Select(sel))
        }
        _ => node.clone(),
    }
}

// ---------------------------------------------------------------------------
// SELECT clauses
// ---------------------------------------------------------------------------

/// Add a condition to the WHERE clause of a SELECT.
///
/// An existing `And` gains one more operand; any other existing condition is
/// wrapped together with the new one.
pub fn add_where(node: &Node, condition: Node) -> Node {
    with_select(node, |sel| {
        sel.where_clause = Some(match sel.where_clause.take() {
            Some(existing) => match existing.as_ref() {
                Expression::And(and) => {
                    let mut operands = and.operands.clone();
                    operands.push(condition);
                    Arc::new(Expression::And(And { operands }))
                }
                _ => Arc::new(Expression::And(And {
                    operands: vec![existing, condition],
                })),
            },
            None => condition,
        });
    })
}

pub fn remove_where(node: &Node) -> Node {
    with_select(node, |sel| sel.where_clause = None)
}

pub fn set_distinct(node: &Node, distinct: bool) -> Node {
    with_select(node, |sel| sel.distinct = distinct)
}

pub fn set_limit(node: &Node, limit: i64) -> Node {
    with_select(node, |sel| sel.limit = Some(limit))
}

pub fn set_offset(node: &Node, offset: i64) -> Node {
    with_select(node, |sel| sel.offset = Some(offset))
}

// ---------------------------------------------------------------------------
// Renaming
// ---------------------------------------------------------------------------

/// Rename columns throughout the tree. Matching is case-sensitive.
pub fn rename_columns(root: &Node, mapping: &HashMap<String, String>) -> Result<Node> {
    rewrite(root, |n| match n.as_ref() {
        Expression::Column(col) => mapping.get(col.name_str()).map(|new_name| {
            Arc::new(Expression::Column(Column {
                name: node(Name::new(new_name.clone())),
                ..col.clone()
            }))
        }),
        _ => None,
    })
}

/// Rename only the columns read from `source` (aliases compared by id).
pub fn rename_source_columns(
    root: &Node,
    source: &Node,
    mapping: &HashMap<String, String>,
) -> Result<Node> {
    rewrite(root, |n| match n.as_ref() {
        Expression::Column(col)
            if col.source.as_ref().is_some_and(|s| same_source(s, source)) =>
        {
            mapping.get(col.name_str()).map(|new_name| {
                Arc::new(Expression::Column(Column {
                    name: node(Name::new(new_name.clone())),
                    ..col.clone()
                }))
            })
        }
        _ => None,
    })
}

/// Rename tables (the unqualified name part) throughout the tree.
pub fn rename_tables(root: &Node, mapping: &HashMap<String, String>) -> Result<Node> {
    rewrite(root, |n| match n.as_ref() {
        Expression::TableName(t) => name_text(&t.name)
            .and_then(|name| mapping.get(name))
            .map(|new_name| {
                Arc::new(Expression::TableName(TableName {
                    schema: t.schema.clone(),
                    name: node(Name::new(new_name.clone())),
                }))
            }),
        _ => None,
    })
}

/// Point every column read from `from` at `to` instead.
///
/// Used when a relation is replaced by another one (e.g. a staging table)
/// that exposes the same columns.
pub fn resource_columns(root: &Node, from: &Node, to: &Node) -> Result<Node> {
    rewrite(root, |n| match n.as_ref() {
        Expression::Column(col) if col.source.as_ref().is_some_and(|s| same_source(s, from)) => {
            Some(Arc::new(Expression::Column(col.resourced(to.clone()))))
        }
        Expression::Star(star)
            if star.source.as_ref().is_some_and(|s| same_source(s, from)) =>
        {
            Some(Arc::new(Expression::Star(Star {
                source: Some(to.clone()),
            })))
        }
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Generic replacement
// ---------------------------------------------------------------------------

/// Substitute nodes for which `replacer` returns `Some`, keep the rest.
fn rewrite<F>(root: &Node, mut replacer: F) -> Result<Node>
where
    F: FnMut(&Node) -> Option<Node>,
{
    let out = modify(root, |n| replacer(n).or_else(|| Some(n.clone())))?;
    Ok(out.unwrap_or_else(|| root.clone()))
}

/// Replace nodes matching `predicate` with `replacement` (shared for each match).
pub fn replace_nodes<F>(root: &Node, predicate: F, replacement: Node) -> Result<Node>
where
    F: Fn(&Expression) -> bool,
{
    rewrite(root, |n| predicate(n).then(|| replacement.clone()))
}

/// Remove all nodes matching `predicate`.
///
/// Matching list elements are dropped and matching optional children are
/// cleared; a match in a required slot is an error. Returns `None` when the
/// root itself matches.
pub fn remove_nodes<F>(root: &Node, predicate: F) -> Result<Option<Node>>
where
    F: Fn(&Expression) -> bool,
{
    modify(root, |n| (!predicate(n)).then(|| n.clone()))
}

// ---------------------------------------------------------------------------
// Convenience getters
// ---------------------------------------------------------------------------

/// All column names referenced in the tree, in depth-first order
pub fn get_column_names(root: &Node) -> Vec<String> {
    root.find_all(|e| matches!(e, Expression::Column(_)))
        .into_iter()
        .filter_map(|n| n.as_column().map(|c| c.name_str().to_string()))
        .collect()
}

/// Distinct table names referenced in the tree, in first-occurrence order
pub fn get_table_names(root: &Node) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for n in root.find_all(|e| matches!(e, Expression::TableName(_))) {
        if let Expression::TableName(t) = n.as_ref() {
            if let Some(name) = name_text(&t.name) {
                if !names.iter().any(|existing| existing == name) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

pub fn get_literals(root: &Node) -> Vec<&Node> {
    root.find_all(|e| matches!(e, Expression::Literal(_)))
}

pub fn get_functions(root: &Node) -> Vec<&Node> {
    root.find_all(|e| matches!(e, Expression::Function(_)))
}

pub fn node_count(root: &Node) -> usize {
    root.dfs().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{col, lit, select, table_ref};

    fn users_query() -> (Node, Node) {
        let users = table_ref(TableName::new(Some("dbo"), "Users"));
        let alias = users.alias();
        let query = select([col(&alias, "Id"), col(&alias, "UserId")])
            .from(users)
            .where_(col(&alias, "Id").eq(lit(1)))
            .build();
        (query, alias)
    }

    #[test]
    fn test_add_where_extends_conjunction() {
        let (query, alias) = users_query();
        let query = add_where(&query, col(&alias, "Active").eq(lit(true)).into_node());
        let query = add_where(&query, col(&alias, "Age").gt(lit(18)).into_node());
        let sel = query.as_select().unwrap();
        match sel.where_clause.as_deref() {
            Some(Expression::And(and)) => assert_eq!(and.operands.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn test_set_limit_and_distinct() {
        let (query, _) = users_query();
        let query = set_distinct(&set_limit(&query, 10), true);
        let sel = query.as_select().unwrap();
        assert_eq!(sel.limit, Some(10));
        assert!(sel.distinct);
        assert!(remove_where(&query).as_select().unwrap().where_clause.is_none());
    }

    #[test]
    fn test_rename_columns() {
        let (query, _) = users_query();
        let mut mapping = HashMap::new();
        mapping.insert("UserId".to_string(), "UserNewId".to_string());
        let renamed = rename_columns(&query, &mapping).unwrap();
        let names = get_column_names(&renamed);
        assert_eq!(names, vec!["Id", "UserNewId", "Id"]);

        let sel_before = query.as_select().unwrap();
        let sel_after = renamed.as_select().unwrap();
        assert!(Arc::ptr_eq(&sel_before.columns[0], &sel_after.columns[0]));
        assert!(Arc::ptr_eq(
            sel_before.from.as_ref().unwrap(),
            sel_after.from.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_rename_tables() {
        let (query, _) = users_query();
        let mut mapping = HashMap::new();
        mapping.insert("Users".to_string(), "Accounts".to_string());
        let renamed = rename_tables(&query, &mapping).unwrap();
        assert_eq!(get_table_names(&renamed), vec!["Accounts"]);
    }

    #[test]
    fn test_resource_columns() {
        let (query, alias) = users_query();
        let staging = node(Alias::named("s"));
        let moved = resource_columns(&query, &alias, &staging).unwrap();
        let sources: Vec<bool> = moved
            .find_all(|e| matches!(e, Expression::Column(_)))
            .iter()
            .filter_map(|n| n.as_column())
            .map(|c| Arc::ptr_eq(c.source.as_ref().unwrap(), &staging))
            .collect();
        assert_eq!(sources, vec![true, true, true]);
    }

    #[test]
    fn test_remove_nodes_in_required_slot_fails() {
        let (query, _) = users_query();
        assert!(remove_nodes(&query, |e| matches!(e, Expression::Literal(_))).is_err());
        let without_where = remove_nodes(&query, |e| {
            matches!(e, Expression::Binary(b) if b.op == BinaryOperator::Eq)
        })
        .unwrap()
        .unwrap();
        assert!(without_where.as_select().unwrap().where_clause.is_none());
    }

    #[test]
    fn test_node_count() {
        let (query, _) = users_query();
        assert!(node_count(&query) > 10);
        assert_eq!(get_literals(&query).len(), 1);
        assert!(get_functions(&query).is_empty());
    }
}
