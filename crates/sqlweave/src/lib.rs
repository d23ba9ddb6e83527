//! Sqlweave - SQL expression trees rendered for several database dialects
//!
//! This library lets callers build SQL statements as immutable trees, rewrite
//! them structurally, serialize them, and render them as text for SQL Server,
//! MySQL or PostgreSQL.
//!
//! # Architecture
//!
//! 1. **Expressions** - the closed set of node kinds, shared through [`Node`]
//! 2. **Dispatch / traversal** - ordered child and property access, the
//!    read-only walker and the identity-preserving modifier
//! 3. **Codec** - flat item lists with JSON, XML and row projections
//! 4. **Generator** - one renderer configured per dialect
//! 5. **Transforms** - tree-to-tree rewrites such as MERGE emulation
//!
//! ```
//! use sqlweave::builder::{lit, select, table_ref, table};
//! use sqlweave::expressions::{SqlType, TypeKind};
//! use sqlweave::DialectType;
//!
//! let users = table(Some("dbo"), "Users")
//!     .identity("Id", SqlType::of(TypeKind::Int))
//!     .column("Name", SqlType::of(TypeKind::NVarChar), false)
//!     .primary_key(&["Id"], true)
//!     .build()
//!     .unwrap();
//! let u = table_ref(users);
//! let sql = select([u.col("Name")])
//!     .from(&u)
//!     .where_(u.col("Id").eq(lit(1)))
//!     .to_sql(DialectType::PostgreSQL)
//!     .unwrap();
//! assert_eq!(sql, r#"SELECT "t0"."Name" FROM "public"."Users" AS "t0" WHERE "t0"."Id" = 1"#);
//! ```

pub mod ast_transforms;
pub mod builder;
pub mod codec;
pub mod dialects;
pub mod dispatch;
pub mod error;
pub mod expressions;
pub mod generator;
pub mod helper;
pub mod schema;
pub mod transforms;
pub mod traversal;

pub use ast_transforms::{
    add_where, get_column_names, get_functions, get_literals, get_table_names, node_count,
    remove_nodes, remove_where, rename_columns, rename_tables, replace_nodes, resource_columns,
};
pub use codec::{PlainItem, PlainRow};
pub use dialects::{Dialect, DialectImpl, DialectType};
pub use error::{Error, Result};
pub use expressions::{checked, node, Expression, Node, Scalar};
pub use generator::{Generator, GeneratorConfig};
pub use helper::{constraint_name, find_new_name, name_sequence};
pub use schema::{Catalog, ColumnKey, ForeignKeyRef, RowReader};
pub use transforms::{emulate_merge, merge_for_dialect};
pub use traversal::{modify, try_modify, walk, walk_fn, DfsIter, ExpressionWalk, Visitor, Walk};

/// Render a tree as SQL text for one dialect.
///
/// # Arguments
/// * `node` - A statement, a `Batch` of statements, or a bare expression
/// * `dialect` - The target dialect
pub fn generate(node: &Node, dialect: DialectType) -> Result<String> {
    Dialect::get(dialect).generate(node)
}

/// Render a tree for a dialect given by name (`tsql`, `mysql`, `postgres`, ...).
pub fn generate_by_name(node: &Node, dialect: &str) -> Result<String> {
    let dialect: DialectType = dialect.parse()?;
    generate(node, dialect)
}
