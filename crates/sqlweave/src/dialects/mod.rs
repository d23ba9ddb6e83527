//! SQL dialects
//!
//! Each dialect supplies a [`GeneratorConfig`] describing its surface syntax
//! and an optional per-node rewrite applied before rendering (function
//! spellings and the like). The shared [`Generator`] does the rest.

mod mysql;
mod postgres;
mod tsql;

pub use mysql::MySQLDialect;
pub use postgres::PostgresDialect;
pub use tsql::TSQLDialect;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::expressions::{node, Expression, Function, Node};
use crate::generator::{Generator, GeneratorConfig};
use crate::traversal::try_modify;

/// Supported target dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectType {
    /// Microsoft SQL Server
    TSQL,
    MySQL,
    PostgreSQL,
}

impl DialectType {
    pub const ALL: [DialectType; 3] = [DialectType::TSQL, DialectType::MySQL, DialectType::PostgreSQL];
}

impl fmt::Display for DialectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectType::TSQL => write!(f, "TSQL"),
            DialectType::MySQL => write!(f, "MySQL"),
            DialectType::PostgreSQL => write!(f, "PostgreSQL"),
        }
    }
}

impl FromStr for DialectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tsql" | "mssql" | "sqlserver" => Ok(DialectType::TSQL),
            "mysql" => Ok(DialectType::MySQL),
            "postgres" | "postgresql" => Ok(DialectType::PostgreSQL),
            _ => Err(Error::unsupported(format!("dialect '{}'", s), "any")),
        }
    }
}

/// Per-dialect behavior
pub trait DialectImpl: Send + Sync {
    fn dialect_type(&self) -> DialectType;

    fn generator_config(&self) -> GeneratorConfig;

    /// Rewrite one node for this dialect.
    ///
    /// Called bottom-up for every node before rendering; return the argument
    /// unchanged to keep it.
    fn transform_expr(&self, expr: &Node) -> Result<Node> {
        Ok(expr.clone())
    }
}

/// Replace the name of a function call according to `renames` (matched
/// case-insensitively). Other nodes are returned as they are.
pub(crate) fn rename_function(expr: &Node, renames: &[(&str, &str)]) -> Node {
    if let Expression::Function(f) = expr.as_ref() {
        if let Some((_, to)) = renames
            .iter()
            .find(|(from, _)| f.name.eq_ignore_ascii_case(from))
        {
            return node(Function {
                name: to.to_string(),
                ..f.clone()
            });
        }
    }
    expr.clone()
}

/// A dialect handle: transformation rules plus generator configuration
pub struct Dialect {
    inner: Box<dyn DialectImpl>,
    config: GeneratorConfig,
}

impl Dialect {
    pub fn get(dialect_type: DialectType) -> Self {
        let inner: Box<dyn DialectImpl> = match dialect_type {
            DialectType::TSQL => Box::new(TSQLDialect),
            DialectType::MySQL => Box::new(MySQLDialect),
            DialectType::PostgreSQL => Box::new(PostgresDialect),
        };
        let config = inner.generator_config();
        Self { inner, config }
    }

    pub fn dialect_type(&self) -> DialectType {
        self.inner.dialect_type()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Replace the generator configuration, e.g. one loaded from JSON
    pub fn with_config(mut self, config: GeneratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Apply this dialect's node rewrites to a whole tree
    pub fn transform(&self, root: &Node) -> Result<Node> {
        try_modify(root, |n| self.inner.transform_expr(n).map(Some))?
            .ok_or_else(|| Error::rewrite("dialect transform removed the root"))
    }

    /// Transform and render a tree
    pub fn generate(&self, root: &Node) -> Result<String> {
        let transformed = self.transform(root)?;
        debug!(dialect = %self.dialect_type(), kind = root.type_tag(), "generating SQL");
        Generator::new(self.config.clone()).generate(&transformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expressions::{Column, Literal, SqlType, TypeKind};
    use std::sync::Arc;

    fn call(name: &str) -> Node {
        node(Function {
            args: vec![node(Literal::new("x"))],
            name: name.to_string(),
            distinct: false,
        })
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("postgres".parse::<DialectType>().unwrap(), DialectType::PostgreSQL);
        assert_eq!("MSSQL".parse::<DialectType>().unwrap(), DialectType::TSQL);
        assert!("oracle".parse::<DialectType>().is_err());
    }

    #[test]
    fn test_function_spelling_per_dialect() {
        let tree = call("len");
        assert_eq!(Dialect::get(DialectType::TSQL).generate(&tree).unwrap(), "len(N'x')");
        assert_eq!(
            Dialect::get(DialectType::MySQL).generate(&tree).unwrap(),
            "CHAR_LENGTH('x')"
        );
        assert_eq!(
            Dialect::get(DialectType::PostgreSQL).generate(&tree).unwrap(),
            "LENGTH('x')"
        );
    }

    #[test]
    fn test_transform_keeps_untouched_trees() {
        let tree = node(Column::new(None, "Id", SqlType::of(TypeKind::Int), false));
        let out = Dialect::get(DialectType::MySQL).transform(&tree).unwrap();
        assert!(Arc::ptr_eq(&tree, &out));
    }

    #[test]
    fn test_with_config_overrides_quoting() {
        let config = GeneratorConfig::from_json(r#"{"identifier_quote_style": "double_quote"}"#).unwrap();
        let dialect = Dialect::get(DialectType::TSQL).with_config(config);
        let column = node(Column::new(None, "Id", SqlType::of(TypeKind::Int), false));
        assert_eq!(dialect.generate(&column).unwrap(), "\"Id\"");
    }
}
