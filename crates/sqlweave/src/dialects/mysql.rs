//! MySQL Dialect
//!
//! Key differences from SQL Server:
//! - Backticks for identifiers, backslash escapes in strings
//! - LIMIT / OFFSET, `CONCAT()` for concatenation
//! - `AUTO_INCREMENT`, indexes declared inside CREATE TABLE
//! - `TEMPORARY` tables, no schemas (`dbo` maps to none)
//! - Multi-table UPDATE / DELETE; no MERGE, IF, OUTPUT or FULL JOIN

use super::{rename_function, DialectImpl, DialectType};
use crate::error::Result;
use crate::expressions::Node;
use crate::generator::{
    BinaryLiteralStyle, BoolStyle, ClusterStyle, ConcatStyle, DateLiteralStyle, DmlJoinStyle,
    GeneratorConfig, IdentifierQuoteStyle, IdentityStyle, IndexPlacement, LimitStyle, OutputStyle,
    TempTableStyle,
};

const FUNCTION_RENAMES: &[(&str, &str)] = &[
    ("LEN", "CHAR_LENGTH"),
    ("GETDATE", "NOW"),
    ("ISNULL", "IFNULL"),
];

/// MySQL dialect
pub struct MySQLDialect;

impl DialectImpl for MySQLDialect {
    fn dialect_type(&self) -> DialectType {
        DialectType::MySQL
    }

    fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            dialect: DialectType::MySQL,
            identifier_quote_style: IdentifierQuoteStyle::Backtick,
            bool_style: BoolStyle::Keyword,
            limit_style: LimitStyle::LimitOffset,
            limit_required_for_offset: true,
            concat_style: ConcatStyle::Function,
            identity_style: IdentityStyle::AutoIncrement,
            temp_table_style: TempTableStyle::Temporary,
            index_placement: IndexPlacement::Inline,
            // InnoDB always clusters on the primary key
            cluster_style: ClusterStyle::Ignore,
            binary_literal_style: BinaryLiteralStyle::XQuote,
            date_literal_style: DateLiteralStyle::Typed,
            dml_join_style: DmlJoinStyle::MultiTable,
            output_style: OutputStyle::Unsupported,
            unicode_string_prefix: false,
            backslash_escapes: true,
            values_row_keyword: true,
            named_default_constraints: false,
            object_id_existence_check: false,
            supports_merge: false,
            supports_if: false,
            supports_full_join: false,
            ..Default::default()
        }
        .with_schema("dbo", "")
    }

    fn transform_expr(&self, expr: &Node) -> Result<Node> {
        Ok(rename_function(expr, FUNCTION_RENAMES))
    }
}
