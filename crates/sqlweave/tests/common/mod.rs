#![allow(dead_code)]
//! Shared table definitions and queries for the integration tests

use once_cell::sync::Lazy;
use sqlweave::builder::{lit, select, table, table_ref_as, Source};
use sqlweave::expressions::{node, SqlType, TableName, TypeKind};
use sqlweave::Node;

pub fn nvarchar(size: i64) -> Node {
    node(SqlType::new(TypeKind::NVarChar, Some(size)).expect("valid size"))
}

pub static USERS: Lazy<Node> = Lazy::new(|| {
    table(Some("dbo"), "Users")
        .identity("Id", SqlType::of(TypeKind::Int))
        .column("Name", nvarchar(100), false)
        .column("Email", nvarchar(200), true)
        .primary_key(&["Id"], true)
        .unique(&["Email"])
        .build()
        .expect("valid Users table")
});

pub static ORDERS: Lazy<Node> = Lazy::new(|| {
    table(Some("dbo"), "Orders")
        .identity("Id", SqlType::of(TypeKind::Int))
        .column("UserId", SqlType::of(TypeKind::Int), false)
        .column(
            "Total",
            node(SqlType::decimal(10, 2).expect("valid decimal")),
            false,
        )
        .primary_key(&["Id"], true)
        .foreign_key(&["UserId"], TableName::new(Some("dbo"), "Users"), &["Id"])
        .build()
        .expect("valid Orders table")
});

pub fn users() -> Source {
    table_ref_as(USERS.clone(), "u")
}

pub fn orders() -> Source {
    table_ref_as(ORDERS.clone(), "o")
}

/// Two inner-joined tables with a WHERE equality, an IN list and an ORDER BY
pub fn join_query() -> Node {
    let u = users();
    let o = orders();
    select([u.col("Name"), o.col("Total")])
        .from(&u)
        .inner_join(&o, o.col("UserId").eq(u.col("Id")))
        .where_(u.col("Name").eq(lit("Ann")))
        .where_(o.col("UserId").in_list([lit(1), lit(2)]))
        .order_by([o.col("Total").desc()])
        .build()
}
