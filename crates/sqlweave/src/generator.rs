//! SQL generator: renders expression trees as SQL text.
//!
//! A single [`Generator`] serves every dialect; all dialect differences are
//! carried by [`GeneratorConfig`]. Rendering is one pass over the tree after a
//! short pre-pass that assigns display names to anonymous aliases (`t0`, `t1`,
//! ... in first-occurrence order, skipping explicitly named aliases).
//!
//! Every node kind is matched explicitly in [`Generator::sql`], so a new kind
//! cannot be added without deciding how it renders.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::dialects::DialectType;
use crate::error::{Error, Result};
use crate::expressions::*;
use crate::helper::{constraint_name, name_sequence, to_hex};
use crate::traversal::ExpressionWalk;

/// Identifier quoting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierQuoteStyle {
    /// `[name]`
    Bracket,
    /// `` `name` ``
    Backtick,
    /// `"name"`
    DoubleQuote,
}

impl IdentifierQuoteStyle {
    pub fn quote(&self, name: &str) -> String {
        match self {
            IdentifierQuoteStyle::Bracket => format!("[{}]", name.replace(']', "]]")),
            IdentifierQuoteStyle::Backtick => format!("`{}`", name.replace('`', "``")),
            IdentifierQuoteStyle::DoubleQuote => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolStyle {
    /// `1` / `0`
    Numeric,
    /// `TRUE` / `FALSE`
    Keyword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStyle {
    /// `SELECT TOP n`, or `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    TopOffsetFetch,
    /// `LIMIT n OFFSET m`
    LimitOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatStyle {
    /// `a + b`
    Plus,
    /// `a || b`
    Pipes,
    /// `CONCAT(a, b)`
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStyle {
    /// `IDENTITY(1, 1)`
    Identity,
    /// `AUTO_INCREMENT`
    AutoIncrement,
    /// `GENERATED BY DEFAULT AS IDENTITY`
    GeneratedByDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempTableStyle {
    /// `CREATE TABLE [#name]`
    HashPrefix,
    /// `CREATE TEMPORARY TABLE name`
    Temporary,
    /// `CREATE TEMP TABLE name`
    Temp,
}

/// Where secondary indexes are declared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPlacement {
    /// Inside the `CREATE TABLE` body
    Inline,
    /// As separate `CREATE INDEX` statements
    Separate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStyle {
    /// `CLUSTERED` / `NONCLUSTERED` keywords on the index
    Keyword,
    /// A trailing `CLUSTER table USING index` statement
    ClusterCommand,
    /// Clustering is not expressible and is left out
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryLiteralStyle {
    /// `0x0AFF`
    ZeroX,
    /// `X'0AFF'`
    XQuote,
    /// `decode('0aff', 'hex')`
    Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateLiteralStyle {
    /// `CAST('2024-01-31' AS DATE)`
    Cast,
    /// `DATE '2024-01-31'`
    Typed,
}

/// How UPDATE and DELETE reach additional tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmlJoinStyle {
    /// `UPDATE t0 SET ... FROM T AS t0, s WHERE ...`
    FromClause,
    /// `UPDATE T AS t0 SET ... FROM s` / `DELETE FROM T AS t0 USING s`
    Using,
    /// `UPDATE T AS t0, s SET ...` / `DELETE t0 FROM T AS t0, s`
    MultiTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStyle {
    /// `OUTPUT INSERTED.col`
    Output,
    /// `RETURNING col`
    Returning,
    Unsupported,
}

/// Everything that distinguishes one dialect's SQL from another's
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub dialect: DialectType,
    pub identifier_quote_style: IdentifierQuoteStyle,
    pub bool_style: BoolStyle,
    pub limit_style: LimitStyle,
    /// `OFFSET` alone is invalid and needs a maximal `LIMIT`
    pub limit_required_for_offset: bool,
    pub concat_style: ConcatStyle,
    pub identity_style: IdentityStyle,
    pub temp_table_style: TempTableStyle,
    pub index_placement: IndexPlacement,
    pub cluster_style: ClusterStyle,
    pub binary_literal_style: BinaryLiteralStyle,
    pub date_literal_style: DateLiteralStyle,
    pub dml_join_style: DmlJoinStyle,
    pub output_style: OutputStyle,
    /// Prefix string literals with `N`
    pub unicode_string_prefix: bool,
    /// Backslash is an escape character inside string literals
    pub backslash_escapes: bool,
    /// Rows of a VALUES relation are written `ROW(...)`
    pub values_row_keyword: bool,
    /// Column defaults are named constraints (`CONSTRAINT DF_... DEFAULT (...)`)
    pub named_default_constraints: bool,
    /// Existence checks use `IF OBJECT_ID(...)` instead of `IF [NOT] EXISTS`
    pub object_id_existence_check: bool,
    pub supports_merge: bool,
    pub supports_if: bool,
    pub supports_full_join: bool,
    /// Logical schema name to dialect schema name; an empty target drops the schema
    pub schema_map: BTreeMap<String, String>,
    /// Schema assumed for unqualified tables where one is required
    pub default_schema: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dialect: DialectType::TSQL,
            identifier_quote_style: IdentifierQuoteStyle::Bracket,
            bool_style: BoolStyle::Numeric,
            limit_style: LimitStyle::TopOffsetFetch,
            limit_required_for_offset: false,
            concat_style: ConcatStyle::Plus,
            identity_style: IdentityStyle::Identity,
            temp_table_style: TempTableStyle::HashPrefix,
            index_placement: IndexPlacement::Separate,
            cluster_style: ClusterStyle::Keyword,
            binary_literal_style: BinaryLiteralStyle::ZeroX,
            date_literal_style: DateLiteralStyle::Cast,
            dml_join_style: DmlJoinStyle::FromClause,
            output_style: OutputStyle::Output,
            unicode_string_prefix: true,
            backslash_escapes: false,
            values_row_keyword: false,
            named_default_constraints: true,
            object_id_existence_check: true,
            supports_merge: true,
            supports_if: true,
            supports_full_join: true,
            schema_map: BTreeMap::new(),
            default_schema: None,
        }
    }
}

impl GeneratorConfig {
    /// Load a configuration from JSON; absent fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn with_schema(mut self, logical: &str, physical: &str) -> Self {
        self.schema_map
            .insert(logical.to_string(), physical.to_string());
        self
    }
}

/// Renders trees according to a [`GeneratorConfig`]
pub struct Generator {
    config: GeneratorConfig,
    aliases: HashMap<i64, String>,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

impl Generator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            aliases: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Render a statement, a batch of statements, or a bare expression
    pub fn generate(&mut self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expression::Batch(batch) => {
                let mut parts = Vec::with_capacity(batch.statements.len());
                for statement in &batch.statements {
                    self.assign_aliases(statement);
                    parts.push(self.sql(statement)?);
                }
                Ok(join_statements(&parts))
            }
            _ => {
                self.assign_aliases(node);
                self.sql(node)
            }
        }
    }

    fn assign_aliases(&mut self, root: &Node) {
        self.aliases.clear();
        let aliases: Vec<&Alias> = root.dfs().filter_map(|n| n.as_alias()).collect();
        let explicit: HashSet<&str> = aliases.iter().filter_map(|a| a.name.as_deref()).collect();
        let mut next = name_sequence("t");
        for alias in aliases {
            if self.aliases.contains_key(&alias.id) {
                continue;
            }
            let name = match &alias.name {
                Some(name) => name.clone(),
                None => loop {
                    let candidate = next();
                    if !explicit.contains(candidate.as_str()) {
                        break candidate;
                    }
                },
            };
            self.aliases.insert(alias.id, name);
        }
    }

    fn alias_name(&self, alias: &Alias) -> String {
        self.aliases
            .get(&alias.id)
            .cloned()
            .or_else(|| alias.name.clone())
            .unwrap_or_else(|| format!("a{}", alias.id))
    }

    fn quote(&self, name: &str) -> String {
        self.config.identifier_quote_style.quote(name)
    }

    fn unsupported(&self, feature: &str) -> Error {
        Error::unsupported(feature, self.config.dialect.to_string())
    }

    fn mapped_schema(&self, schema: &str) -> Option<String> {
        let mapped = self
            .config
            .schema_map
            .get(schema)
            .map(String::as_str)
            .unwrap_or(schema);
        (!mapped.is_empty()).then(|| mapped.to_string())
    }

    fn schema_of(&self, name: &TableName) -> Option<String> {
        name.schema
            .as_ref()
            .and_then(name_text)
            .and_then(|s| self.mapped_schema(s))
    }

    fn table_name_sql(&self, name: &TableName) -> String {
        let table = self.quote(name_text(&name.name).unwrap_or_default());
        match self.schema_of(name) {
            Some(schema) => format!("{}.{}", self.quote(&schema), table),
            None => table,
        }
    }

    fn temp_name_sql(&self, name: &str) -> String {
        match self.config.temp_table_style {
            TempTableStyle::HashPrefix => self.quote(&format!("#{}", name)),
            _ => self.quote(name),
        }
    }

    /// Name of a table, temp table or table name node
    fn relation_name(&self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expression::TableName(name) => Ok(self.table_name_sql(name)),
            Expression::Table(table) => table
                .table_name()
                .map(|name| self.table_name_sql(name))
                .ok_or_else(|| Error::generate("table definition without a TableName")),
            Expression::TempTable(temp) => Ok(self.temp_name_sql(temp.name_str())),
            other => Err(Error::generate(format!(
                "expected a table, found {}",
                other.type_tag()
            ))),
        }
    }

    fn list(&self, nodes: &[Node]) -> Result<String> {
        Ok(nodes
            .iter()
            .map(|n| self.sql(n))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    fn column_names(&self, nodes: &[Node]) -> Result<String> {
        Ok(nodes
            .iter()
            .map(|n| match n.as_ref() {
                Expression::Column(c) => Ok(self.quote(c.name_str())),
                Expression::Name(n) => Ok(self.quote(&n.value)),
                other => Err(Error::generate(format!(
                    "expected a column name, found {}",
                    other.type_tag()
                ))),
            })
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    /// Render any node
    pub fn sql(&self, node: &Node) -> Result<String> {
        match node.as_ref() {
            Expression::Name(n) => Ok(self.quote(&n.value)),
            Expression::TableName(t) => Ok(self.table_name_sql(t)),
            Expression::Alias(a) => Ok(self.quote(&self.alias_name(a))),
            Expression::SqlType(t) => Ok(self.type_sql(t)),
            Expression::Column(c) => self.column_ref(c),
            Expression::Table(_) | Expression::TempTable(_) => self.relation_name(node),
            Expression::Index(_) | Expression::ForeignKey(_) => Err(Error::generate(format!(
                "{} can only be rendered inside CREATE TABLE",
                node.type_tag()
            ))),
            Expression::TableRef(r) => {
                let table = self.relation_name(&r.table)?;
                match &r.alias {
                    Some(alias) => Ok(format!("{} AS {}", table, self.sql(alias)?)),
                    None => Ok(table),
                }
            }
            Expression::DerivedTable(d) => {
                Ok(format!("({}) AS {}", self.sql(&d.query)?, self.sql(&d.alias)?))
            }
            Expression::ValuesTable(v) => self.values_table(v),
            Expression::Row(r) => Ok(format!("({})", self.list(&r.values)?)),
            Expression::Join(j) => self.join(j),
            Expression::Literal(l) => self.literal(&l.value),
            Expression::Star(s) => match &s.source {
                Some(source) => Ok(format!("{}.*", self.source_prefix(source)?)),
                None => Ok("*".to_string()),
            },
            Expression::Binary(b) => self.binary(b),
            Expression::And(a) => self.junction(&a.operands, " AND ", "(1 = 1)"),
            Expression::Or(o) => self.junction(&o.operands, " OR ", "(1 = 0)"),
            Expression::Not(n) => Ok(format!("NOT ({})", self.sql(&n.operand)?)),
            Expression::IsNull(i) => Ok(format!(
                "{} IS {}NULL",
                self.operand(&i.operand, 3, false)?,
                if i.negated { "NOT " } else { "" }
            )),
            Expression::InList(i) => {
                if i.items.is_empty() {
                    // IN () is not valid SQL in any dialect
                    return Ok(if i.negated { "(1 = 1)" } else { "(1 = 0)" }.to_string());
                }
                Ok(format!(
                    "{} {}IN ({})",
                    self.operand(&i.operand, 3, false)?,
                    if i.negated { "NOT " } else { "" },
                    self.list(&i.items)?
                ))
            }
            Expression::InSubquery(i) => Ok(format!(
                "{} {}IN ({})",
                self.operand(&i.operand, 3, false)?,
                if i.negated { "NOT " } else { "" },
                self.sql(&i.query)?
            )),
            Expression::Between(b) => Ok(format!(
                "{} {}BETWEEN {} AND {}",
                self.operand(&b.operand, 3, false)?,
                if b.negated { "NOT " } else { "" },
                self.operand(&b.low, 4, false)?,
                self.operand(&b.high, 4, false)?
            )),
            Expression::Exists(e) => Ok(format!("EXISTS ({})", self.sql(&e.query)?)),
            Expression::Function(f) => Ok(format!(
                "{}({}{})",
                f.name,
                if f.distinct { "DISTINCT " } else { "" },
                self.list(&f.args)?
            )),
            Expression::Cast(c) => Ok(format!(
                "CAST({} AS {})",
                self.sql(&c.operand)?,
                self.sql(&c.data_type)?
            )),
            Expression::Case(c) => self.case(c),
            Expression::CaseWhen(w) => Ok(format!(
                "WHEN {} THEN {}",
                self.sql(&w.condition)?,
                self.sql(&w.result)?
            )),
            Expression::AliasedExpr(a) => {
                Ok(format!("{} AS {}", self.sql(&a.expr)?, self.sql(&a.alias)?))
            }
            Expression::OrderBy(o) => Ok(format!(
                "{}{}",
                self.sql(&o.expr)?,
                if o.descending { " DESC" } else { "" }
            )),
            Expression::Select(s) => self.select(s),
            Expression::Values(v) => Ok(format!("VALUES {}", self.list(&v.rows)?)),
            Expression::Insert(i) => self.insert(i),
            Expression::Assignment(a) => self.assignment(a, false),
            Expression::Update(u) => self.update(u),
            Expression::Delete(d) => self.delete(d),
            Expression::Output(_) => Err(Error::generate(
                "Output can only be rendered as part of a statement",
            )),
            Expression::Merge(m) => self.merge(m),
            Expression::WhenMatched(_)
            | Expression::WhenNotMatched(_)
            | Expression::WhenNotMatchedBySource(_)
            | Expression::MergeUpdate(_)
            | Expression::MergeDelete(_)
            | Expression::MergeInsert(_) => Err(Error::generate(format!(
                "{} can only be rendered inside MERGE",
                node.type_tag()
            ))),
            Expression::CreateTable(c) => self.create_table(c),
            Expression::DropTable(d) => self.drop_table(d),
            Expression::IfStatement(i) => self.if_statement(i),
            Expression::Batch(b) => {
                let parts = b
                    .statements
                    .iter()
                    .map(|s| self.sql(s))
                    .collect::<Result<Vec<_>>>()?;
                Ok(join_statements(&parts))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn source_prefix(&self, source: &Node) -> Result<String> {
        match source.as_ref() {
            Expression::Alias(a) => Ok(self.quote(&self.alias_name(a))),
            Expression::TableName(_) | Expression::Table(_) | Expression::TempTable(_) => {
                self.relation_name(source)
            }
            other => Err(Error::generate(format!(
                "a column cannot be read from {}",
                other.type_tag()
            ))),
        }
    }

    fn column_ref(&self, column: &Column) -> Result<String> {
        let name = self.quote(column.name_str());
        match &column.source {
            Some(source) => Ok(format!("{}.{}", self.source_prefix(source)?, name)),
            None => Ok(name),
        }
    }

    /// Render `node` as an operand of an operator with precedence `parent`
    fn operand(&self, node: &Node, parent: u8, right: bool) -> Result<String> {
        let text = self.sql(node)?;
        let wrap = match node.as_ref() {
            Expression::Binary(b) => {
                let own = b.op.precedence();
                own < parent || (right && own == parent)
            }
            Expression::And(a) => a.operands.len() > 1,
            Expression::Or(o) => o.operands.len() > 1,
            Expression::Not(_)
            | Expression::IsNull(_)
            | Expression::InList(_)
            | Expression::InSubquery(_)
            | Expression::Between(_) => true,
            Expression::Select(_) => true,
            _ => false,
        };
        Ok(if wrap { format!("({})", text) } else { text })
    }

    fn binary(&self, b: &Binary) -> Result<String> {
        if b.op == BinaryOperator::Concat && self.config.concat_style == ConcatStyle::Function {
            return Ok(format!("CONCAT({}, {})", self.sql(&b.left)?, self.sql(&b.right)?));
        }
        let op = match b.op {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::Concat => match self.config.concat_style {
                ConcatStyle::Pipes => "||",
                _ => "+",
            },
        };
        let precedence = b.op.precedence();
        Ok(format!(
            "{} {} {}",
            self.operand(&b.left, precedence, false)?,
            op,
            self.operand(&b.right, precedence, true)?
        ))
    }

    fn junction(&self, operands: &[Node], sep: &str, empty: &str) -> Result<String> {
        match operands {
            [] => Ok(empty.to_string()),
            [single] => self.sql(single),
            many => Ok(many
                .iter()
                .map(|n| match n.as_ref() {
                    Expression::Or(o) if sep == " AND " && o.operands.len() > 1 => {
                        Ok(format!("({})", self.sql(n)?))
                    }
                    _ => self.sql(n),
                })
                .collect::<Result<Vec<_>>>()?
                .join(sep)),
        }
    }

    fn case(&self, c: &Case) -> Result<String> {
        let mut sql = String::from("CASE");
        if let Some(operand) = &c.operand {
            sql.push(' ');
            sql.push_str(&self.sql(operand)?);
        }
        for when in &c.whens {
            sql.push(' ');
            sql.push_str(&self.sql(when)?);
        }
        if let Some(otherwise) = &c.otherwise {
            sql.push_str(" ELSE ");
            sql.push_str(&self.sql(otherwise)?);
        }
        sql.push_str(" END");
        Ok(sql)
    }

    fn string_literal(&self, value: &str) -> String {
        let mut escaped = value.replace('\'', "''");
        if self.config.backslash_escapes {
            escaped = escaped.replace('\\', "\\\\");
        }
        if self.config.unicode_string_prefix {
            format!("N'{}'", escaped)
        } else {
            format!("'{}'", escaped)
        }
    }

    fn literal(&self, value: &Scalar) -> Result<String> {
        Ok(match value {
            Scalar::Null => "NULL".to_string(),
            Scalar::Bool(b) => match (self.config.bool_style, b) {
                (BoolStyle::Numeric, true) => "1".to_string(),
                (BoolStyle::Numeric, false) => "0".to_string(),
                (BoolStyle::Keyword, true) => "TRUE".to_string(),
                (BoolStyle::Keyword, false) => "FALSE".to_string(),
            },
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => {
                if !f.is_finite() {
                    return Err(Error::generate(format!("{} has no SQL literal form", f)));
                }
                let text = f.to_string();
                if text.contains('.') {
                    text
                } else {
                    format!("{}.0", text)
                }
            }
            Scalar::Text(s) => self.string_literal(s),
            Scalar::Bytes(bytes) => match self.config.binary_literal_style {
                BinaryLiteralStyle::ZeroX => format!("0x{}", to_hex(bytes).to_uppercase()),
                BinaryLiteralStyle::XQuote => format!("X'{}'", to_hex(bytes).to_uppercase()),
                BinaryLiteralStyle::Decode => format!("decode('{}', 'hex')", to_hex(bytes)),
            },
            Scalar::Date(d) => {
                let text = d.format("%Y-%m-%d");
                match self.config.date_literal_style {
                    DateLiteralStyle::Cast => format!("CAST('{}' AS DATE)", text),
                    DateLiteralStyle::Typed => format!("DATE '{}'", text),
                }
            }
            Scalar::Timestamp(ts) => match self.config.date_literal_style {
                DateLiteralStyle::Cast => format!(
                    "CAST('{}' AS DATETIME2)",
                    ts.format("%Y-%m-%dT%H:%M:%S%.f")
                ),
                DateLiteralStyle::Typed => {
                    format!("TIMESTAMP '{}'", ts.format("%Y-%m-%d %H:%M:%S%.f"))
                }
            },
        })
    }

    fn type_sql(&self, t: &SqlType) -> String {
        let sized = |name: &str, unbounded: &str| match t.size {
            Some(size) => format!("{}({})", name, size),
            None => unbounded.to_string(),
        };
        let decimal = |name: &str| match (t.precision, t.scale) {
            (Some(p), Some(s)) => format!("{}({}, {})", name, p, s),
            (Some(p), None) => format!("{}({})", name, p),
            _ => name.to_string(),
        };

        match self.config.dialect {
            DialectType::TSQL => match t.kind {
                TypeKind::Boolean => "BIT".to_string(),
                TypeKind::TinyInt => "TINYINT".to_string(),
                TypeKind::SmallInt => "SMALLINT".to_string(),
                TypeKind::Int => "INT".to_string(),
                TypeKind::BigInt => "BIGINT".to_string(),
                TypeKind::Decimal => decimal("DECIMAL"),
                TypeKind::Real => "REAL".to_string(),
                TypeKind::Double => "FLOAT".to_string(),
                TypeKind::Char => sized("CHAR", "CHAR"),
                TypeKind::VarChar => sized("VARCHAR", "VARCHAR(MAX)"),
                TypeKind::NChar => sized("NCHAR", "NCHAR"),
                TypeKind::NVarChar => sized("NVARCHAR", "NVARCHAR(MAX)"),
                TypeKind::Text => "NVARCHAR(MAX)".to_string(),
                TypeKind::Binary => sized("BINARY", "BINARY"),
                TypeKind::VarBinary => sized("VARBINARY", "VARBINARY(MAX)"),
                TypeKind::Date => "DATE".to_string(),
                TypeKind::Time => "TIME".to_string(),
                TypeKind::DateTime => "DATETIME2".to_string(),
                TypeKind::DateTimeOffset => "DATETIMEOFFSET".to_string(),
                TypeKind::Guid => "UNIQUEIDENTIFIER".to_string(),
            },
            DialectType::MySQL => match t.kind {
                TypeKind::Boolean => "BOOLEAN".to_string(),
                TypeKind::TinyInt => "TINYINT".to_string(),
                TypeKind::SmallInt => "SMALLINT".to_string(),
                TypeKind::Int => "INT".to_string(),
                TypeKind::BigInt => "BIGINT".to_string(),
                TypeKind::Decimal => decimal("DECIMAL"),
                TypeKind::Real => "FLOAT".to_string(),
                TypeKind::Double => "DOUBLE".to_string(),
                TypeKind::Char | TypeKind::NChar => sized("CHAR", "CHAR"),
                TypeKind::VarChar | TypeKind::NVarChar => sized("VARCHAR", "LONGTEXT"),
                TypeKind::Text => "LONGTEXT".to_string(),
                TypeKind::Binary => sized("BINARY", "BINARY"),
                TypeKind::VarBinary => sized("VARBINARY", "LONGBLOB"),
                TypeKind::Date => "DATE".to_string(),
                TypeKind::Time => "TIME".to_string(),
                TypeKind::DateTime | TypeKind::DateTimeOffset => "DATETIME(6)".to_string(),
                TypeKind::Guid => "CHAR(36)".to_string(),
            },
            DialectType::PostgreSQL => match t.kind {
                TypeKind::Boolean => "BOOLEAN".to_string(),
                TypeKind::TinyInt | TypeKind::SmallInt => "SMALLINT".to_string(),
                TypeKind::Int => "INT".to_string(),
                TypeKind::BigInt => "BIGINT".to_string(),
                TypeKind::Decimal => decimal("NUMERIC"),
                TypeKind::Real => "REAL".to_string(),
                TypeKind::Double => "DOUBLE PRECISION".to_string(),
                TypeKind::Char | TypeKind::NChar => sized("CHAR", "CHAR"),
                TypeKind::VarChar | TypeKind::NVarChar => sized("VARCHAR", "TEXT"),
                TypeKind::Text => "TEXT".to_string(),
                TypeKind::Binary | TypeKind::VarBinary => "BYTEA".to_string(),
                TypeKind::Date => "DATE".to_string(),
                TypeKind::Time => "TIME".to_string(),
                TypeKind::DateTime => "TIMESTAMP".to_string(),
                TypeKind::DateTimeOffset => "TIMESTAMPTZ".to_string(),
                TypeKind::Guid => "UUID".to_string(),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Relations
    // -----------------------------------------------------------------------

    fn values_table(&self, v: &ValuesTable) -> Result<String> {
        let rows = v
            .rows
            .iter()
            .map(|row| match row.as_ref() {
                Expression::Row(r) if self.config.values_row_keyword => {
                    Ok(format!("ROW({})", self.list(&r.values)?))
                }
                Expression::Row(_) => self.sql(row),
                other => Err(Error::generate(format!(
                    "VALUES rows must be Row nodes, found {}",
                    other.type_tag()
                ))),
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok(format!(
            "(VALUES {}) AS {} ({})",
            rows,
            self.sql(&v.alias)?,
            self.column_names(&v.columns)?
        ))
    }

    fn join(&self, j: &Join) -> Result<String> {
        if j.kind == JoinKind::Full && !self.config.supports_full_join {
            return Err(self.unsupported("FULL JOIN"));
        }
        let left = self.sql(&j.left)?;
        let right = match j.right.as_ref() {
            Expression::Join(_) => format!("({})", self.sql(&j.right)?),
            _ => self.sql(&j.right)?,
        };
        let keyword = match j.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        };
        match (&j.on, j.kind) {
            (_, JoinKind::Cross) => Ok(format!("{} {} {}", left, keyword, right)),
            (Some(on), _) => Ok(format!("{} {} {} ON {}", left, keyword, right, self.sql(on)?)),
            (None, _) => Err(Error::generate(format!("{} without an ON condition", keyword))),
        }
    }

    // -----------------------------------------------------------------------
    // Queries and DML
    // -----------------------------------------------------------------------

    fn select(&self, s: &Select) -> Result<String> {
        let mut sql = String::from("SELECT");
        if s.distinct {
            sql.push_str(" DISTINCT");
        }
        let top_style = self.config.limit_style == LimitStyle::TopOffsetFetch;
        if top_style && s.offset.is_none() {
            if let Some(limit) = s.limit {
                sql.push_str(&format!(" TOP {}", limit));
            }
        }
        sql.push(' ');
        if s.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.list(&s.columns)?);
        }
        if let Some(from) = &s.from {
            sql.push_str(" FROM ");
            sql.push_str(&self.sql(from)?);
        }
        if let Some(condition) = &s.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&self.sql(condition)?);
        }
        if !s.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.list(&s.group_by)?);
        }
        if let Some(having) = &s.having {
            sql.push_str(" HAVING ");
            sql.push_str(&self.sql(having)?);
        }
        if !s.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.list(&s.order_by)?);
        }

        match self.config.limit_style {
            LimitStyle::TopOffsetFetch => {
                if let Some(offset) = s.offset {
                    if s.order_by.is_empty() {
                        sql.push_str(" ORDER BY (SELECT NULL)");
                    }
                    sql.push_str(&format!(" OFFSET {} ROWS", offset));
                    if let Some(limit) = s.limit {
                        sql.push_str(&format!(" FETCH NEXT {} ROWS ONLY", limit));
                    }
                }
            }
            LimitStyle::LimitOffset => {
                match (s.limit, s.offset) {
                    (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
                    (None, Some(_)) if self.config.limit_required_for_offset => {
                        sql.push_str(" LIMIT 18446744073709551615")
                    }
                    _ => {}
                }
                if let Some(offset) = s.offset {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
        }
        Ok(sql)
    }

    /// Table and alias of an UPDATE / DELETE / INSERT target
    fn dml_target(&self, node: &Node) -> Result<(String, Option<String>)> {
        match node.as_ref() {
            Expression::TableRef(r) => {
                let alias = r.alias.as_ref().map(|a| self.sql(a)).transpose()?;
                Ok((self.relation_name(&r.table)?, alias))
            }
            _ => Ok((self.relation_name(node)?, None)),
        }
    }

    /// OUTPUT clause (before the source) and RETURNING clause (at the end)
    fn output_clause(&self, output: Option<&Node>, pseudo: &str) -> Result<(String, String)> {
        let Some(node) = output else {
            return Ok((String::new(), String::new()));
        };
        let Expression::Output(out) = node.as_ref() else {
            return Err(Error::generate(format!(
                "output slot holds {}, expected Output",
                node.type_tag()
            )));
        };
        let prefix = match self.config.output_style {
            OutputStyle::Unsupported => return Err(self.unsupported("OUTPUT / RETURNING")),
            OutputStyle::Output => Some(pseudo),
            OutputStyle::Returning => None,
        };
        let item = |n: &Node| -> Result<String> {
            let column = |c: &Column| match prefix {
                Some(p) => format!("{}.{}", p, self.quote(c.name_str())),
                None => self.quote(c.name_str()),
            };
            match n.as_ref() {
                Expression::Column(c) => Ok(column(c)),
                Expression::AliasedExpr(a) => match a.expr.as_ref() {
                    Expression::Column(c) => Ok(format!("{} AS {}", column(c), self.sql(&a.alias)?)),
                    _ => self.sql(n),
                },
                _ => self.sql(n),
            }
        };
        let items = out
            .items
            .iter()
            .map(item)
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok(match prefix {
            Some(_) => (format!(" OUTPUT {}", items), String::new()),
            None => (String::new(), format!(" RETURNING {}", items)),
        })
    }

    fn insert(&self, i: &Insert) -> Result<String> {
        let (table, _) = self.dml_target(&i.table)?;
        let mut sql = format!("INSERT INTO {}", table);
        if !i.columns.is_empty() {
            sql.push_str(&format!(" ({})", self.column_names(&i.columns)?));
        }
        let (output, returning) = self.output_clause(i.output.as_ref(), "INSERTED")?;
        sql.push_str(&output);
        sql.push(' ');
        sql.push_str(&self.sql(&i.source)?);
        sql.push_str(&returning);
        Ok(sql)
    }

    fn assignment(&self, a: &Assignment, qualified: bool) -> Result<String> {
        let column = match a.column.as_ref() {
            Expression::Column(c) if qualified => self.column_ref(c)?,
            Expression::Column(c) => self.quote(c.name_str()),
            Expression::Name(n) => self.quote(&n.value),
            other => {
                return Err(Error::generate(format!(
                    "cannot assign to {}",
                    other.type_tag()
                )))
            }
        };
        Ok(format!("{} = {}", column, self.sql(&a.value)?))
    }

    fn assignments(&self, nodes: &[Node], qualified: bool) -> Result<String> {
        if nodes.is_empty() {
            return Err(Error::generate("UPDATE without assignments"));
        }
        Ok(nodes
            .iter()
            .map(|n| match n.as_ref() {
                Expression::Assignment(a) => self.assignment(a, qualified),
                other => Err(Error::generate(format!(
                    "expected an Assignment, found {}",
                    other.type_tag()
                ))),
            })
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    fn where_sql(&self, condition: Option<&Node>) -> Result<String> {
        match condition {
            Some(c) => Ok(format!(" WHERE {}", self.sql(c)?)),
            None => Ok(String::new()),
        }
    }

    fn update(&self, u: &Update) -> Result<String> {
        let (table, alias) = self.dml_target(&u.target)?;
        let style = self.config.dml_join_style;
        let assignments = self.assignments(&u.assignments, style == DmlJoinStyle::MultiTable)?;
        let from = self.list(&u.from)?;
        let where_sql = self.where_sql(u.where_clause.as_ref())?;
        let (output, returning) = self.output_clause(u.output.as_ref(), "INSERTED")?;

        Ok(match style {
            DmlJoinStyle::FromClause => match alias {
                Some(alias) => format!(
                    "UPDATE {} SET {}{} FROM {} AS {}{}{}",
                    alias,
                    assignments,
                    output,
                    table,
                    alias,
                    prefixed(", ", &from),
                    where_sql
                ),
                None => format!(
                    "UPDATE {} SET {}{}{}{}",
                    table,
                    assignments,
                    output,
                    prefixed(" FROM ", &from),
                    where_sql
                ),
            },
            DmlJoinStyle::Using => format!(
                "UPDATE {}{} SET {}{}{}{}",
                table,
                alias.map(|a| format!(" AS {}", a)).unwrap_or_default(),
                assignments,
                prefixed(" FROM ", &from),
                where_sql,
                returning
            ),
            DmlJoinStyle::MultiTable => format!(
                "UPDATE {}{}{} SET {}{}",
                table,
                alias.map(|a| format!(" AS {}", a)).unwrap_or_default(),
                prefixed(", ", &from),
                assignments,
                where_sql
            ),
        })
    }

    fn delete(&self, d: &Delete) -> Result<String> {
        let (table, alias) = self.dml_target(&d.target)?;
        let from = self.list(&d.from)?;
        let where_sql = self.where_sql(d.where_clause.as_ref())?;
        let (output, returning) = self.output_clause(d.output.as_ref(), "DELETED")?;

        Ok(match (self.config.dml_join_style, alias) {
            (DmlJoinStyle::Using, alias) => format!(
                "DELETE FROM {}{}{}{}{}",
                table,
                alias.map(|a| format!(" AS {}", a)).unwrap_or_default(),
                prefixed(" USING ", &from),
                where_sql,
                returning
            ),
            (_, Some(alias)) => format!(
                "DELETE {}{} FROM {} AS {}{}{}",
                alias,
                output,
                table,
                alias,
                prefixed(", ", &from),
                where_sql
            ),
            (_, None) if from.is_empty() => {
                format!("DELETE FROM {}{}{}", table, output, where_sql)
            }
            (_, None) => format!(
                "DELETE {}{} FROM {}, {}{}",
                table, output, table, from, where_sql
            ),
        })
    }

    fn merge(&self, m: &Merge) -> Result<String> {
        if !self.config.supports_merge {
            return Err(self.unsupported("MERGE"));
        }
        let Expression::TableRef(target) = m.target.as_ref() else {
            return Err(Error::generate("MERGE target must be a table reference"));
        };
        let alias = target
            .alias
            .as_ref()
            .ok_or_else(|| Error::generate("MERGE target without an alias"))?;

        let mut sql = format!(
            "MERGE {} AS {} USING {} ON {}",
            self.relation_name(&target.table)?,
            self.sql(alias)?,
            self.sql(&m.source)?,
            self.sql(&m.on)?
        );
        if let Some(when) = &m.when_matched {
            let Expression::WhenMatched(w) = when.as_ref() else {
                return Err(Error::generate("when_matched must hold WhenMatched"));
            };
            sql.push_str(&self.merge_branch("WHEN MATCHED", w.condition.as_ref(), &w.action, false)?);
        }
        if let Some(when) = &m.when_not_matched {
            let Expression::WhenNotMatched(w) = when.as_ref() else {
                return Err(Error::generate("when_not_matched must hold WhenNotMatched"));
            };
            sql.push_str(&self.merge_branch(
                "WHEN NOT MATCHED BY TARGET",
                w.condition.as_ref(),
                &w.action,
                true,
            )?);
        }
        if let Some(when) = &m.when_not_matched_by_source {
            let Expression::WhenNotMatchedBySource(w) = when.as_ref() else {
                return Err(Error::generate(
                    "when_not_matched_by_source must hold WhenNotMatchedBySource",
                ));
            };
            sql.push_str(&self.merge_branch(
                "WHEN NOT MATCHED BY SOURCE",
                w.condition.as_ref(),
                &w.action,
                false,
            )?);
        }
        let (output, _) = self.output_clause(m.output.as_ref(), "INSERTED")?;
        sql.push_str(&output);
        sql.push(';');
        Ok(sql)
    }

    fn merge_branch(
        &self,
        keyword: &str,
        condition: Option<&Node>,
        action: &Node,
        insert: bool,
    ) -> Result<String> {
        let condition = match condition {
            Some(c) => format!(" AND {}", self.sql(c)?),
            None => String::new(),
        };
        let action = match (action.as_ref(), insert) {
            (Expression::MergeUpdate(u), false) => {
                format!("UPDATE SET {}", self.assignments(&u.assignments, false)?)
            }
            (Expression::MergeDelete(_), false) => "DELETE".to_string(),
            (Expression::MergeInsert(i), true) => {
                if i.columns.is_empty() {
                    format!("INSERT VALUES ({})", self.list(&i.values)?)
                } else {
                    format!(
                        "INSERT ({}) VALUES ({})",
                        self.column_names(&i.columns)?,
                        self.list(&i.values)?
                    )
                }
            }
            (other, _) => {
                return Err(Error::generate(format!(
                    "{} cannot be the action of {}",
                    other.type_tag(),
                    keyword
                )))
            }
        };
        Ok(format!(" {}{} THEN {}", keyword, condition, action))
    }

    // -----------------------------------------------------------------------
    // DDL and control flow
    // -----------------------------------------------------------------------

    /// String literal naming `schema.table` for OBJECT_ID checks
    fn object_ref(&self, name: &TableName) -> Result<String> {
        let table = name_text(&name.name).unwrap_or_default();
        let schema = self
            .schema_of(name)
            .or_else(|| self.config.default_schema.clone())
            .ok_or_else(|| {
                Error::generate(format!(
                    "existence check on table '{}' needs a schema",
                    table
                ))
            })?;
        Ok(self.string_literal(&format!(
            "{}.{}",
            self.quote(&schema),
            self.quote(table)
        )))
    }

    fn column_def(&self, column: &Node, default_name: Option<(&Option<String>, &str)>) -> Result<String> {
        let Expression::Column(c) = column.as_ref() else {
            return Err(Error::generate(format!(
                "expected a column definition, found {}",
                column.type_tag()
            )));
        };
        let mut sql = format!("{} {}", self.quote(c.name_str()), self.sql(&c.data_type)?);
        if c.identity && self.config.identity_style == IdentityStyle::Identity {
            sql.push_str(" IDENTITY(1, 1)");
        }
        sql.push_str(if c.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &c.default {
            let value = self.sql(default)?;
            match default_name {
                Some((schema, table)) if self.config.named_default_constraints => {
                    let name = constraint_name("DF", schema.as_deref(), table, &[c.name_str()]);
                    sql.push_str(&format!(" CONSTRAINT {} DEFAULT ({})", self.quote(&name), value));
                }
                _ if matches!(default.as_ref(), Expression::Literal(_)) => {
                    sql.push_str(&format!(" DEFAULT {}", value));
                }
                _ => sql.push_str(&format!(" DEFAULT ({})", value)),
            }
        }
        if c.identity {
            match self.config.identity_style {
                IdentityStyle::AutoIncrement => sql.push_str(" AUTO_INCREMENT"),
                IdentityStyle::GeneratedByDefault => {
                    sql.push_str(" GENERATED BY DEFAULT AS IDENTITY")
                }
                IdentityStyle::Identity => {}
            }
        }
        Ok(sql)
    }

    fn create_table(&self, c: &CreateTable) -> Result<String> {
        match c.table.as_ref() {
            Expression::Table(table) => self.create_base_table(table, c.if_not_exists),
            Expression::TempTable(temp) => self.create_temp_table(temp, c.if_not_exists),
            other => Err(Error::generate(format!(
                "CREATE TABLE needs a table definition, found {}",
                other.type_tag()
            ))),
        }
    }

    fn create_base_table(&self, table: &Table, if_not_exists: bool) -> Result<String> {
        let name = table
            .table_name()
            .ok_or_else(|| Error::generate("table definition without a TableName"))?;
        let schema = self.schema_of(name);
        let table_text = name_text(&name.name).unwrap_or_default();
        let full_name = self.table_name_sql(name);
        let key_name = |prefix: &str, index: &Index| {
            index.name.clone().unwrap_or_else(|| {
                constraint_name(prefix, schema.as_deref(), table_text, &index.column_names())
            })
        };

        let mut body = Vec::new();
        for column in &table.columns {
            body.push(self.column_def(column, Some((&schema, table_text)))?);
        }

        let other_clustered = table.indexes.iter().any(|i| {
            matches!(i.as_ref(), Expression::Index(index) if index.clustered && index.role != IndexRole::PrimaryKey)
        });
        let mut clustered_index: Option<String> = None;

        if let Some(pk) = table.primary_key() {
            let pk_name = pk
                .name
                .clone()
                .unwrap_or_else(|| constraint_name("PK", schema.as_deref(), table_text, &[]));
            let cluster = match self.config.cluster_style {
                ClusterStyle::Keyword if pk.clustered => " CLUSTERED",
                ClusterStyle::Keyword if other_clustered => " NONCLUSTERED",
                _ => "",
            };
            if pk.clustered {
                clustered_index = Some(pk_name.clone());
            }
            body.push(format!(
                "CONSTRAINT {} PRIMARY KEY{} ({})",
                self.quote(&pk_name),
                cluster,
                self.column_names(&pk.columns)?
            ));
        }

        let mut separate = Vec::new();
        for node in &table.indexes {
            let Expression::Index(index) = node.as_ref() else {
                continue;
            };
            let (prefix, unique) = match index.role {
                IndexRole::PrimaryKey => continue,
                IndexRole::Unique => ("UX", "UNIQUE "),
                IndexRole::NonUnique => ("IX", ""),
            };
            let index_name = key_name(prefix, index);
            if index.clustered {
                clustered_index = Some(index_name.clone());
            }
            let columns = self.column_names(&index.columns)?;
            match self.config.index_placement {
                IndexPlacement::Inline => body.push(format!(
                    "{}INDEX {} ({})",
                    unique,
                    self.quote(&index_name),
                    columns
                )),
                IndexPlacement::Separate => {
                    let cluster = match self.config.cluster_style {
                        ClusterStyle::Keyword if index.clustered => "CLUSTERED ",
                        _ => "",
                    };
                    let guard = if if_not_exists && !self.config.object_id_existence_check {
                        "IF NOT EXISTS "
                    } else {
                        ""
                    };
                    separate.push(format!(
                        "CREATE {}{}INDEX {}{} ON {} ({})",
                        unique,
                        cluster,
                        guard,
                        self.quote(&index_name),
                        full_name,
                        columns
                    ));
                }
            }
        }

        for node in &table.foreign_keys {
            let Expression::ForeignKey(fk) = node.as_ref() else {
                continue;
            };
            let Expression::TableName(references) = fk.references.as_ref() else {
                return Err(Error::generate("foreign key must reference a TableName"));
            };
            let columns: Vec<&str> = fk
                .columns
                .iter()
                .map(|c| name_text(c).unwrap_or_default())
                .collect();
            let fk_name = fk.name.clone().unwrap_or_else(|| {
                let mut parts = vec![name_text(&references.name).unwrap_or_default()];
                parts.extend(columns.iter().copied());
                constraint_name("FK", schema.as_deref(), table_text, &parts)
            });
            body.push(format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote(&fk_name),
                self.column_names(&fk.columns)?,
                self.table_name_sql(references),
                self.column_names(&fk.referenced_columns)?
            ));
        }

        let guard = if if_not_exists && !self.config.object_id_existence_check {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let mut statements = vec![format!(
            "CREATE TABLE {}{} ({})",
            guard,
            full_name,
            body.join(", ")
        )];
        statements.extend(separate);
        if self.config.cluster_style == ClusterStyle::ClusterCommand {
            if let Some(index_name) = clustered_index {
                statements.push(format!("CLUSTER {} USING {}", full_name, self.quote(&index_name)));
            }
        }

        if if_not_exists && self.config.object_id_existence_check {
            return Ok(format!(
                "IF OBJECT_ID({}, N'U') IS NULL\nBEGIN\n{};\nEND",
                self.object_ref(name)?,
                join_statements(&statements)
            ));
        }
        Ok(join_statements(&statements))
    }

    fn create_temp_table(&self, temp: &TempTable, if_not_exists: bool) -> Result<String> {
        let name = self.temp_name_sql(temp.name_str());
        let body = temp
            .columns
            .iter()
            .map(|c| self.column_def(c, None))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        Ok(match self.config.temp_table_style {
            TempTableStyle::HashPrefix => {
                let create = format!("CREATE TABLE {} ({})", name, body);
                if if_not_exists {
                    format!(
                        "IF OBJECT_ID({}) IS NULL {}",
                        self.string_literal(&format!("tempdb..#{}", temp.name_str())),
                        create
                    )
                } else {
                    create
                }
            }
            TempTableStyle::Temporary => format!(
                "CREATE TEMPORARY TABLE {}{} ({})",
                if if_not_exists { "IF NOT EXISTS " } else { "" },
                name,
                body
            ),
            TempTableStyle::Temp => format!(
                "CREATE TEMP TABLE {}{} ({})",
                if if_not_exists { "IF NOT EXISTS " } else { "" },
                name,
                body
            ),
        })
    }

    fn drop_table(&self, d: &DropTable) -> Result<String> {
        let if_exists = if d.if_exists { "IF EXISTS " } else { "" };
        let name = match d.table.as_ref() {
            Expression::TempTable(temp) => {
                let name = self.temp_name_sql(temp.name_str());
                return Ok(match self.config.temp_table_style {
                    TempTableStyle::HashPrefix if d.if_exists => format!(
                        "IF OBJECT_ID({}) IS NOT NULL DROP TABLE {}",
                        self.string_literal(&format!("tempdb..#{}", temp.name_str())),
                        name
                    ),
                    TempTableStyle::HashPrefix => format!("DROP TABLE {}", name),
                    TempTableStyle::Temporary => {
                        format!("DROP TEMPORARY TABLE {}{}", if_exists, name)
                    }
                    TempTableStyle::Temp => format!("DROP TABLE {}{}", if_exists, name),
                });
            }
            Expression::Table(table) => table
                .table_name()
                .ok_or_else(|| Error::generate("table definition without a TableName"))?,
            Expression::TableName(name) => name,
            other => {
                return Err(Error::generate(format!(
                    "DROP TABLE needs a table, found {}",
                    other.type_tag()
                )))
            }
        };

        let full_name = self.table_name_sql(name);
        if d.if_exists && self.config.object_id_existence_check {
            return Ok(format!(
                "IF OBJECT_ID({}, N'U') IS NOT NULL DROP TABLE {}",
                self.object_ref(name)?,
                full_name
            ));
        }
        Ok(format!("DROP TABLE {}{}", if_exists, full_name))
    }

    fn if_statement(&self, i: &IfStatement) -> Result<String> {
        if !self.config.supports_if {
            return Err(self.unsupported("IF statement"));
        }
        let block = |statements: &[Node]| -> Result<String> {
            if statements.is_empty() {
                return Err(Error::generate("IF branch without statements"));
            }
            let parts = statements
                .iter()
                .map(|s| self.sql(s))
                .collect::<Result<Vec<_>>>()?;
            Ok(terminated(join_statements(&parts)))
        };
        let mut sql = format!(
            "IF {}\nBEGIN\n{}\nEND",
            self.sql(&i.condition)?,
            block(&i.then)?
        );
        if !i.otherwise.is_empty() {
            sql.push_str(&format!("\nELSE\nBEGIN\n{}\nEND", block(&i.otherwise)?));
        }
        Ok(sql)
    }
}

fn prefixed(prefix: &str, text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("{}{}", prefix, text)
    }
}

fn terminated(mut text: String) -> String {
    if !text.ends_with(';') {
        text.push(';');
    }
    text
}

/// Join rendered statements with `;\n`, never doubling a terminator
pub fn join_statements(parts: &[String]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            if !out.ends_with(';') {
                out.push(';');
            }
            out.push('\n');
        }
        out.push_str(part);
    }
    out
}
