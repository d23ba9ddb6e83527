//! T-SQL (SQL Server) Dialect
//!
//! The generator defaults are SQL Server's, so this mostly names them:
//! - Square brackets for identifiers, `N'...'` string literals
//! - TOP / OFFSET ... FETCH instead of LIMIT
//! - `IDENTITY(1, 1)`, named default constraints, CLUSTERED keywords
//! - `#name` temp tables, OBJECT_ID existence checks
//! - Native MERGE, OUTPUT and IF ... BEGIN ... END

use super::{rename_function, DialectImpl, DialectType};
use crate::error::Result;
use crate::expressions::Node;
use crate::generator::GeneratorConfig;

const FUNCTION_RENAMES: &[(&str, &str)] = &[
    ("LENGTH", "LEN"),
    ("CHAR_LENGTH", "LEN"),
    ("NOW", "GETDATE"),
    ("IFNULL", "ISNULL"),
];

/// T-SQL (SQL Server) dialect
pub struct TSQLDialect;

impl DialectImpl for TSQLDialect {
    fn dialect_type(&self) -> DialectType {
        DialectType::TSQL
    }

    fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            dialect: DialectType::TSQL,
            ..Default::default()
        }
    }

    fn transform_expr(&self, expr: &Node) -> Result<Node> {
        Ok(rename_function(expr, FUNCTION_RENAMES))
    }
}
