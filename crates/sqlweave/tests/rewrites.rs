//! Structural rewrite tests: identity preservation and rewrite locality

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{join_query, users};
use sqlweave::builder::{lit, select};
use sqlweave::codec::{self, json};
use sqlweave::expressions::{Alias, Column, Expression, Name};
use sqlweave::traversal::ExpressionWalk;
use sqlweave::{
    generate, modify, node, remove_nodes, rename_columns, resource_columns, DialectType, Error, Node,
};

fn join_parts(query: &Node) -> (&Node, &Node, &Node) {
    let select = query.as_select().expect("a SELECT");
    let Some(Expression::Join(join)) = select.from.as_deref() else {
        panic!("expected a join");
    };
    (&join.left, &join.right, select.where_clause.as_ref().expect("a WHERE"))
}

#[test]
fn test_noop_rewrite_returns_the_same_tree() {
    let query = join_query();
    let mut visited = 0;
    let out = modify(&query, |n| {
        visited += 1;
        Some(n.clone())
    })
    .unwrap()
    .unwrap();
    assert!(Arc::ptr_eq(&out, &query));
    assert_eq!(visited, query.dfs().count());
}

#[test]
fn test_rename_and_drop_in_one_pass() {
    let query = join_query();
    let out = modify(&query, |n| match n.as_ref() {
        Expression::InList(_) => None,
        // references only; definitions inside the table nodes keep their names
        Expression::Column(c)
            if c.name_str() == "UserId" && c.source.as_ref().is_some_and(|s| s.as_alias().is_some()) =>
        {
            Some(node(Column {
                name: node(Name::new("UserNewId")),
                ..c.clone()
            }))
        }
        _ => Some(n.clone()),
    })
    .unwrap()
    .unwrap();

    assert_eq!(
        generate(&out, DialectType::TSQL).unwrap(),
        "SELECT [u].[Name], [o].[Total] FROM [dbo].[Users] AS [u] \
         INNER JOIN [dbo].[Orders] AS [o] ON [o].[UserNewId] = [u].[Id] \
         WHERE [u].[Name] = N'Ann' ORDER BY [o].[Total] DESC"
    );

    let (left, right, where_clause) = join_parts(&query);
    let (new_left, new_right, new_where) = join_parts(&out);
    assert!(Arc::ptr_eq(left, new_left), "Users reference was rebuilt");
    assert!(Arc::ptr_eq(right, new_right), "Orders reference was rebuilt");

    let (Expression::And(before), Expression::And(after)) = (where_clause.as_ref(), new_where.as_ref()) else {
        panic!("expected AND predicates");
    };
    assert_eq!(after.operands.len(), 1);
    assert!(Arc::ptr_eq(&before.operands[0], &after.operands[0]));

    let (old, new) = (query.as_select().unwrap(), out.as_select().unwrap());
    for (a, b) in old.columns.iter().zip(&new.columns) {
        assert!(Arc::ptr_eq(a, b));
    }
    assert!(Arc::ptr_eq(&old.order_by[0], &new.order_by[0]));
}

#[test]
fn test_removing_a_required_child_fails() {
    let query = join_query();
    let err = remove_nodes(&query, |e| matches!(e, Expression::TableRef(_))).unwrap_err();
    assert!(matches!(err, Error::Rewrite(_)), "{}", err);
    assert!(err.to_string().contains("'left' of Join"), "{}", err);
}

#[test]
fn test_removing_an_optional_child_clears_it() {
    let query = join_query();
    let out = remove_nodes(&query, |e| matches!(e, Expression::Join(_)))
        .unwrap()
        .unwrap();
    assert!(out.as_select().unwrap().from.is_none());
}

#[test]
fn test_removing_the_root_yields_none() {
    let query = select([lit(1)]).build();
    assert!(remove_nodes(&query, |e| matches!(e, Expression::Select(_)))
        .unwrap()
        .is_none());
}

#[test]
fn test_rename_columns_leaves_unmatched_trees_alone() {
    let u = users();
    let query = select([u.col("Name")]).from(&u).build();
    let mapping = HashMap::from([("Missing".to_string(), "Other".to_string())]);
    let out = rename_columns(&query, &mapping).unwrap();
    assert!(Arc::ptr_eq(&out, &query));
}

fn first_column_source(query: &Node) -> Node {
    let select = query.as_select().expect("a SELECT");
    let Expression::Column(column) = select.columns[0].as_ref() else {
        panic!("expected a column");
    };
    column.source.clone().expect("a qualified column")
}

fn columns_reading(tree: &Node, alias: &Node) -> usize {
    let id = alias.as_alias().expect("an alias").id;
    tree.dfs()
        .filter(|n| match n.as_ref() {
            Expression::Column(c) => c.source.as_ref().and_then(|s| s.as_alias()).is_some_and(|a| a.id == id),
            _ => false,
        })
        .count()
}

#[test]
fn test_resource_columns_reaches_every_column_after_decoding() {
    let query = join_query();
    let staging = node(Alias::named("z"));
    let expected = resource_columns(&query, &first_column_source(&query), &staging).unwrap();
    assert_eq!(columns_reading(&expected, &staging), 3);
    assert_eq!(
        generate(&expected, DialectType::TSQL).unwrap(),
        "SELECT [z].[Name], [o].[Total] FROM [dbo].[Users] AS [u] \
         INNER JOIN [dbo].[Orders] AS [o] ON [o].[UserId] = [z].[Id] \
         WHERE [z].[Name] = N'Ann' AND [o].[UserId] IN (1, 2) ORDER BY [o].[Total] DESC"
    );

    let decoded = [
        codec::decode(&codec::encode(&query)).unwrap(),
        json::from_json(&json::to_json(&query).unwrap()).unwrap(),
    ];
    for tree in decoded {
        let moved = resource_columns(&tree, &first_column_source(&tree), &staging).unwrap();
        assert_eq!(columns_reading(&moved, &staging), 3);
        assert_eq!(moved, expected);
    }
}
