//! PostgreSQL Dialect
//!
//! Key differences from SQL Server:
//! - Double quotes for identifiers, `||` for concatenation
//! - LIMIT / OFFSET, TRUE / FALSE literals, `decode(..., 'hex')` for bytes
//! - `GENERATED BY DEFAULT AS IDENTITY`, separate CREATE INDEX statements
//! - Clustering through a trailing `CLUSTER ... USING ...`
//! - UPDATE ... FROM, DELETE ... USING, RETURNING
//! - `dbo` maps to `public`

use super::{rename_function, DialectImpl, DialectType};
use crate::error::Result;
use crate::expressions::Node;
use crate::generator::{
    BinaryLiteralStyle, BoolStyle, ClusterStyle, ConcatStyle, DateLiteralStyle, DmlJoinStyle,
    GeneratorConfig, IdentifierQuoteStyle, IdentityStyle, IndexPlacement, LimitStyle, OutputStyle,
    TempTableStyle,
};

const FUNCTION_RENAMES: &[(&str, &str)] = &[
    ("LEN", "LENGTH"),
    ("GETDATE", "NOW"),
    ("ISNULL", "COALESCE"),
    ("IFNULL", "COALESCE"),
];

/// PostgreSQL dialect
pub struct PostgresDialect;

impl DialectImpl for PostgresDialect {
    fn dialect_type(&self) -> DialectType {
        DialectType::PostgreSQL
    }

    fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            dialect: DialectType::PostgreSQL,
            identifier_quote_style: IdentifierQuoteStyle::DoubleQuote,
            bool_style: BoolStyle::Keyword,
            limit_style: LimitStyle::LimitOffset,
            concat_style: ConcatStyle::Pipes,
            identity_style: IdentityStyle::GeneratedByDefault,
            temp_table_style: TempTableStyle::Temp,
            index_placement: IndexPlacement::Separate,
            cluster_style: ClusterStyle::ClusterCommand,
            binary_literal_style: BinaryLiteralStyle::Decode,
            date_literal_style: DateLiteralStyle::Typed,
            dml_join_style: DmlJoinStyle::Using,
            output_style: OutputStyle::Returning,
            unicode_string_prefix: false,
            named_default_constraints: false,
            object_id_existence_check: false,
            supports_merge: false,
            supports_if: false,
            ..Default::default()
        }
        .with_schema("dbo", "public")
    }

    fn transform_expr(&self, expr: &Node) -> Result<Node> {
        Ok(rename_function(expr, FUNCTION_RENAMES))
    }
}
