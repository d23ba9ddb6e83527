//! Fluent SQL Builder API
//!
//! Provides a programmatic way to construct expression trees. Every table
//! reference gets its own [`Alias`] node; columns point at that alias, which is
//! what lets rewrites and the generator tell two references to the same table
//! apart.
//!
//! # Design
//!
//! - **Expression helpers** ([`col`], [`lit`], [`null`], [`star`], [`func`],
//!   [`cast`], [`not`], [`and`], [`or`], [`exists`]) create leaf-level [`Expr`] values.
//! - **Sources** ([`table_ref`], [`table_ref_as`], [`derived`], [`values_table`])
//!   pair a relation with its alias.
//! - **Statement starters** ([`select`], [`insert_into`], [`update`], [`delete`],
//!   [`merge_into`], [`table`]) return fluent builder structs.
//!
//! # Examples
//!
//! ```
//! use sqlweave::builder::*;
//! use sqlweave::expressions::TableName;
//! use sqlweave::DialectType;
//!
//! let users = table_ref(TableName::new(Some("dbo"), "Users"));
//! let query = select([users.col("Id"), users.col("Name")])
//!     .from(&users)
//!     .where_(users.col("Age").gt(lit(18)))
//!     .order_by([users.col("Name").asc()])
//!     .limit(10)
//!     .build();
//!
//! assert_eq!(
//!     sqlweave::generate(&query, DialectType::PostgreSQL).unwrap(),
//!     r#"SELECT "t0"."Id", "t0"."Name" FROM "public"."Users" AS "t0" WHERE "t0"."Age" > 18 ORDER BY "t0"."Name" LIMIT 10"#
//! );
//! ```

use crate::dialects::DialectType;
use crate::error::{Error, Result};
use crate::expressions::*;

/// Anything that can stand where a node is expected
pub trait IntoNode {
    fn into_node(self) -> Node;
}

impl IntoNode for Node {
    fn into_node(self) -> Node {
        self
    }
}

impl IntoNode for &Node {
    fn into_node(self) -> Node {
        self.clone()
    }
}

impl IntoNode for Expr {
    fn into_node(self) -> Node {
        self.0
    }
}

impl IntoNode for Source {
    fn into_node(self) -> Node {
        self.relation
    }
}

impl IntoNode for &Source {
    fn into_node(self) -> Node {
        self.relation.clone()
    }
}

macro_rules! into_node_via_expression {
    ($($kind:ident),*) => {
        $(
            impl IntoNode for $kind {
                fn into_node(self) -> Node {
                    node(self)
                }
            }
        )*
    };
}

into_node_via_expression!(TableName, Table, TempTable, Select);

// ---------------------------------------------------------------------------
// Expression helpers
// ---------------------------------------------------------------------------

/// Column `name` read from the reference identified by `alias`.
///
/// The column is typed `NVARCHAR` with unbounded length; use
/// [`Source::col`] on a reference to a table definition to get the declared
/// type instead.
pub fn col(alias: &Node, name: &str) -> Expr {
    Expr(node(Column::new(
        Some(alias.clone()),
        name,
        SqlType::of(TypeKind::NVarChar),
        true,
    )))
}

/// Unqualified column reference
pub fn unqualified(name: &str) -> Expr {
    Expr(node(Column::new(None, name, SqlType::of(TypeKind::NVarChar), true)))
}

/// Literal value
pub fn lit(value: impl Into<Scalar>) -> Expr {
    Expr(node(Literal::new(value)))
}

pub fn null() -> Expr {
    Expr(node(Literal::null()))
}

/// Unqualified `*`
pub fn star() -> Expr {
    Expr(node(Star { source: None }))
}

/// Function call
pub fn func(name: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr(node(Function {
        args: args.into_iter().map(|a| a.0).collect(),
        name: name.to_string(),
        distinct: false,
    }))
}

pub fn cast(expr: Expr, data_type: Node) -> Expr {
    expr.cast(data_type)
}

pub fn not(expr: Expr) -> Expr {
    expr.not()
}

/// Conjunction of all operands (empty means always true)
pub fn and(operands: impl IntoIterator<Item = Expr>) -> Expr {
    Expr(node(And {
        operands: operands.into_iter().map(|e| e.0).collect(),
    }))
}

/// Disjunction of all operands (empty means always false)
pub fn or(operands: impl IntoIterator<Item = Expr>) -> Expr {
    Expr(node(Or {
        operands: operands.into_iter().map(|e| e.0).collect(),
    }))
}

pub fn exists(query: impl IntoNode) -> Expr {
    Expr(node(Exists {
        query: query.into_node(),
    }))
}

/// Start a `CASE` expression
pub fn case() -> CaseBuilder {
    CaseBuilder {
        operand: None,
        whens: Vec::new(),
        otherwise: None,
    }
}

/// Start a simple `CASE operand WHEN ...` expression
pub fn case_of(operand: Expr) -> CaseBuilder {
    CaseBuilder {
        operand: Some(operand.0),
        whens: Vec::new(),
        otherwise: None,
    }
}

/// An expression node with operator methods
#[derive(Debug, Clone)]
pub struct Expr(pub Node);

impl Expr {
    pub fn into_node(self) -> Node {
        self.0
    }

    /// Render this expression for `dialect`
    pub fn to_sql(&self, dialect: DialectType) -> Result<String> {
        crate::generate(&self.0, dialect)
    }

    fn binary(self, op: BinaryOperator, other: Expr) -> Expr {
        Expr(node(Binary::new(self.0, op, other.0)))
    }

    // -- Comparison operators --

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::GtEq, other)
    }

    pub fn like(self, pattern: Expr) -> Expr {
        self.binary(BinaryOperator::Like, pattern)
    }

    pub fn not_like(self, pattern: Expr) -> Expr {
        self.binary(BinaryOperator::NotLike, pattern)
    }

    // -- Arithmetic operators --

    pub fn add(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Add, other)
    }

    pub fn sub(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Sub, other)
    }

    pub fn mul(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Mul, other)
    }

    pub fn div(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Div, other)
    }

    pub fn modulo(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Mod, other)
    }

    /// String concatenation; spelled per dialect
    pub fn concat(self, other: Expr) -> Expr {
        self.binary(BinaryOperator::Concat, other)
    }

    // -- Logical operators --

    /// `self AND other`, extending `self` when it already is a conjunction
    pub fn and(self, other: Expr) -> Expr {
        match self.0.as_ref() {
            Expression::And(existing) => {
                let mut operands = existing.operands.clone();
                operands.push(other.0);
                Expr(node(And { operands }))
            }
            _ => Expr(node(And {
                operands: vec![self.0, other.0],
            })),
        }
    }

    /// `self OR other`, extending `self` when it already is a disjunction
    pub fn or(self, other: Expr) -> Expr {
        match self.0.as_ref() {
            Expression::Or(existing) => {
                let mut operands = existing.operands.clone();
                operands.push(other.0);
                Expr(node(Or { operands }))
            }
            _ => Expr(node(Or {
                operands: vec![self.0, other.0],
            })),
        }
    }

    pub fn not(self) -> Expr {
        Expr(node(Not { operand: self.0 }))
    }

    // -- Predicates --

    pub fn is_null(self) -> Expr {
        Expr(node(IsNull {
            operand: self.0,
            negated: false,
        }))
    }

    pub fn is_not_null(self) -> Expr {
        Expr(node(IsNull {
            operand: self.0,
            negated: true,
        }))
    }

    pub fn in_list(self, items: impl IntoIterator<Item = Expr>) -> Expr {
        Expr(node(InList {
            operand: self.0,
            items: items.into_iter().map(|e| e.0).collect(),
            negated: false,
        }))
    }

    pub fn not_in(self, items: impl IntoIterator<Item = Expr>) -> Expr {
        Expr(node(InList {
            operand: self.0,
            items: items.into_iter().map(|e| e.0).collect(),
            negated: true,
        }))
    }

    pub fn in_subquery(self, query: impl IntoNode) -> Expr {
        Expr(node(InSubquery {
            operand: self.0,
            query: query.into_node(),
            negated: false,
        }))
    }

    pub fn between(self, low: Expr, high: Expr) -> Expr {
        Expr(node(Between {
            operand: self.0,
            low: low.0,
            high: high.0,
            negated: false,
        }))
    }

    // -- Projection helpers --

    /// `self AS name`
    pub fn alias(self, name: &str) -> Expr {
        Expr(node(AliasedExpr {
            expr: self.0,
            alias: node(Name::new(name)),
        }))
    }

    pub fn cast(self, data_type: Node) -> Expr {
        Expr(node(Cast {
            operand: self.0,
            data_type,
        }))
    }

    pub fn asc(self) -> Expr {
        Expr(node(OrderBy {
            expr: self.0,
            descending: false,
        }))
    }

    pub fn desc(self) -> Expr {
        Expr(node(OrderBy {
            expr: self.0,
            descending: true,
        }))
    }
}

pub struct CaseBuilder {
    operand: Option<Node>,
    whens: Vec<Node>,
    otherwise: Option<Node>,
}

impl CaseBuilder {
    pub fn when(mut self, condition: Expr, result: Expr) -> Self {
        self.whens.push(node(CaseWhen {
            condition: condition.0,
            result: result.0,
        }));
        self
    }

    pub fn else_(mut self, result: Expr) -> Self {
        self.otherwise = Some(result.0);
        self
    }

    pub fn build(self) -> Expr {
        Expr(node(Case {
            operand: self.operand,
            whens: self.whens,
            otherwise: self.otherwise,
        }))
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// A relation together with the alias its columns are read through
#[derive(Debug, Clone)]
pub struct Source {
    relation: Node,
    alias: Node,
    table: Option<Node>,
}

impl Source {
    /// The alias node identifying this reference
    pub fn alias(&self) -> Node {
        self.alias.clone()
    }

    /// The relation node (`TableRef`, `DerivedTable` or `ValuesTable`)
    pub fn relation(&self) -> Node {
        self.relation.clone()
    }

    /// Column `name` read through this reference.
    ///
    /// When the reference points at a table definition that declares `name`,
    /// the declared column is re-sourced onto the alias and keeps its type.
    pub fn col(&self, name: &str) -> Expr {
        let declared = self.table.as_ref().and_then(|t| match t.as_ref() {
            Expression::Table(table) => table.column(name).cloned(),
            Expression::TempTable(temp) => temp.columns.iter().find_map(|c| match c.as_ref() {
                Expression::Column(column) if column.name_str() == name => Some(column.clone()),
                _ => None,
            }),
            _ => None,
        });
        match declared {
            Some(column) => Expr(node(column.resourced(self.alias.clone()))),
            None => col(&self.alias, name),
        }
    }

    /// `alias.*`
    pub fn star(&self) -> Expr {
        Expr(node(Star {
            source: Some(self.alias.clone()),
        }))
    }
}

fn reference(table: Node, alias: Alias) -> Source {
    let alias = node(alias);
    Source {
        relation: node(TableRef {
            table: table.clone(),
            alias: Some(alias.clone()),
        }),
        alias,
        table: Some(table),
    }
}

/// Reference a table with a fresh anonymous alias
pub fn table_ref(table: impl IntoNode) -> Source {
    reference(table.into_node(), Alias::auto())
}

/// Reference a table with an explicitly named alias
pub fn table_ref_as(table: impl IntoNode, alias: &str) -> Source {
    reference(table.into_node(), Alias::named(alias))
}

/// Use a query as a relation
pub fn derived(query: impl IntoNode) -> Source {
    let alias = node(Alias::auto());
    Source {
        relation: node(DerivedTable {
            query: query.into_node(),
            alias: alias.clone(),
        }),
        alias,
        table: None,
    }
}

/// Inline rows as a relation: `(VALUES ...) AS alias (columns...)`
pub fn values_table<R>(rows: impl IntoIterator<Item = R>, columns: &[&str], alias: &str) -> Result<Source>
where
    R: IntoIterator<Item = Expr>,
{
    let alias = node(Alias::named(alias));
    let rows = rows
        .into_iter()
        .map(|row| {
            node(Row {
                values: row.into_iter().map(|e| e.0).collect(),
            })
        })
        .collect();
    let relation = checked(ValuesTable {
        rows,
        alias: alias.clone(),
        columns: columns.iter().map(|c| node(Name::new(*c))).collect(),
    })?;
    Ok(Source {
        relation,
        alias,
        table: None,
    })
}

// ---------------------------------------------------------------------------
// SELECT
// ---------------------------------------------------------------------------

/// Start a SELECT with the given projection (empty means `*`)
pub fn select(columns: impl IntoIterator<Item = Expr>) -> SelectBuilder {
    SelectBuilder {
        select: Select {
            columns: columns.into_iter().map(|e| e.0).collect(),
            from: None,
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            distinct: false,
            limit: None,
            offset: None,
        },
    }
}

pub struct SelectBuilder {
    select: Select,
}

impl SelectBuilder {
    pub fn from(mut self, source: impl IntoNode) -> Self {
        self.select.from = Some(source.into_node());
        self
    }

    fn join(mut self, kind: JoinKind, right: Node, on: Option<Expr>) -> Self {
        self.select.from = Some(match self.select.from.take() {
            Some(left) => node(Join {
                left,
                right,
                on: on.map(|e| e.0),
                kind,
            }),
            None => right,
        });
        self
    }

    /// `INNER JOIN`; must follow [`SelectBuilder::from`]
    pub fn inner_join(self, source: impl IntoNode, on: Expr) -> Self {
        self.join(JoinKind::Inner, source.into_node(), Some(on))
    }

    pub fn left_join(self, source: impl IntoNode, on: Expr) -> Self {
        self.join(JoinKind::Left, source.into_node(), Some(on))
    }

    pub fn right_join(self, source: impl IntoNode, on: Expr) -> Self {
        self.join(JoinKind::Right, source.into_node(), Some(on))
    }

    pub fn full_join(self, source: impl IntoNode, on: Expr) -> Self {
        self.join(JoinKind::Full, source.into_node(), Some(on))
    }

    pub fn cross_join(self, source: impl IntoNode) -> Self {
        self.join(JoinKind::Cross, source.into_node(), None)
    }

    /// Add a WHERE condition; repeated calls are combined with AND
    pub fn where_(mut self, condition: Expr) -> Self {
        self.select.where_clause = Some(match self.select.where_clause.take() {
            Some(existing) => Expr(existing).and(condition).0,
            None => condition.0,
        });
        self
    }

    pub fn group_by(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        self.select.group_by.extend(exprs.into_iter().map(|e| e.0));
        self
    }

    pub fn having(mut self, condition: Expr) -> Self {
        self.select.having = Some(condition.0);
        self
    }

    /// Append ORDER BY terms; plain expressions sort ascending
    pub fn order_by(mut self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        for expr in exprs {
            let term = match expr.0.as_ref() {
                Expression::OrderBy(_) => expr.0,
                _ => expr.asc().0,
            };
            self.select.order_by.push(term);
        }
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.select.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: i64) -> Self {
        self.select.offset = Some(count);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.select.distinct = true;
        self
    }

    pub fn build(self) -> Node {
        node(self.select)
    }

    pub fn to_sql(self, dialect: DialectType) -> Result<String> {
        crate::generate(&self.build(), dialect)
    }
}

impl IntoNode for SelectBuilder {
    fn into_node(self) -> Node {
        self.build()
    }
}

// ---------------------------------------------------------------------------
// DML
// ---------------------------------------------------------------------------

fn output_node(items: Vec<Node>) -> Option<Node> {
    (!items.is_empty()).then(|| node(Output { items }))
}

fn assignment(alias: &Node, column: &str, value: Expr) -> Node {
    node(Assignment {
        column: col(alias, column).0,
        value: value.0,
    })
}

fn target_alias(target: &Source) -> Result<Node> {
    match target.relation.as_ref() {
        Expression::TableRef(_) => Ok(target.alias.clone()),
        other => Err(Error::construction(
            other.type_tag(),
            "data-modifying statements need a table reference as target",
        )),
    }
}

/// Start an `INSERT INTO table`
pub fn insert_into(table: impl IntoNode) -> InsertBuilder {
    InsertBuilder {
        table: table.into_node(),
        columns: Vec::new(),
        rows: Vec::new(),
        query: None,
        output: Vec::new(),
    }
}

pub struct InsertBuilder {
    table: Node,
    columns: Vec<Node>,
    rows: Vec<Node>,
    query: Option<Node>,
    output: Vec<Node>,
}

impl InsertBuilder {
    pub fn columns(mut self, names: &[&str]) -> Self {
        self.columns = names.iter().map(|n| node(Name::new(*n))).collect();
        self
    }

    /// Append one row of values
    pub fn values(mut self, row: impl IntoIterator<Item = Expr>) -> Self {
        self.rows.push(node(Row {
            values: row.into_iter().map(|e| e.0).collect(),
        }));
        self
    }

    /// Insert the result of a query instead of literal rows
    pub fn query(mut self, query: impl IntoNode) -> Self {
        self.query = Some(query.into_node());
        self
    }

    /// Columns of the inserted rows to return
    pub fn output(mut self, items: impl IntoIterator<Item = Expr>) -> Self {
        self.output.extend(items.into_iter().map(|e| e.0));
        self
    }

    pub fn build(self) -> Result<Node> {
        let source = match (self.query, self.rows.is_empty()) {
            (Some(query), true) => query,
            (None, false) => node(Values { rows: self.rows }),
            (Some(_), false) => {
                return Err(Error::construction(
                    Insert::TAG,
                    "both VALUES rows and a query were given",
                ))
            }
            (None, true) => return Err(Error::construction(Insert::TAG, "nothing to insert")),
        };
        checked(Insert {
            table: self.table,
            columns: self.columns,
            source,
            output: output_node(self.output),
        })
    }
}

/// Start an `UPDATE` of the referenced table
pub fn update(target: &Source) -> UpdateBuilder {
    UpdateBuilder {
        target: target.clone(),
        assignments: Vec::new(),
        from: Vec::new(),
        where_clause: None,
        output: Vec::new(),
    }
}

pub struct UpdateBuilder {
    target: Source,
    assignments: Vec<(String, Expr)>,
    from: Vec<Node>,
    where_clause: Option<Expr>,
    output: Vec<Node>,
}

impl UpdateBuilder {
    pub fn set(mut self, column: &str, value: Expr) -> Self {
        self.assignments.push((column.to_string(), value));
        self
    }

    /// Additional relation the assignments and condition may read from
    pub fn from(mut self, source: impl IntoNode) -> Self {
        self.from.push(source.into_node());
        self
    }

    pub fn where_(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn output(mut self, items: impl IntoIterator<Item = Expr>) -> Self {
        self.output.extend(items.into_iter().map(|e| e.0));
        self
    }

    pub fn build(self) -> Result<Node> {
        let alias = target_alias(&self.target)?;
        if self.assignments.is_empty() {
            return Err(Error::construction(Update::TAG, "no assignments"));
        }
        Ok(node(Update {
            target: self.target.relation,
            assignments: self
                .assignments
                .into_iter()
                .map(|(column, value)| assignment(&alias, &column, value))
                .collect(),
            from: self.from,
            where_clause: self.where_clause.map(|e| e.0),
            output: output_node(self.output),
        }))
    }
}

/// Start a `DELETE` from the referenced table
pub fn delete(target: &Source) -> DeleteBuilder {
    DeleteBuilder {
        target: target.clone(),
        from: Vec::new(),
        where_clause: None,
        output: Vec::new(),
    }
}

pub struct DeleteBuilder {
    target: Source,
    from: Vec<Node>,
    where_clause: Option<Expr>,
    output: Vec<Node>,
}

impl DeleteBuilder {
    pub fn from(mut self, source: impl IntoNode) -> Self {
        self.from.push(source.into_node());
        self
    }

    pub fn where_(mut self, condition: Expr) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn output(mut self, items: impl IntoIterator<Item = Expr>) -> Self {
        self.output.extend(items.into_iter().map(|e| e.0));
        self
    }

    pub fn build(self) -> Result<Node> {
        target_alias(&self.target)?;
        Ok(node(Delete {
            target: self.target.relation,
            from: self.from,
            where_clause: self.where_clause.map(|e| e.0),
            output: output_node(self.output),
        }))
    }
}

/// Start a `MERGE INTO target USING source ON on`
pub fn merge_into(target: &Source, source: &Source, on: Expr) -> MergeBuilder {
    MergeBuilder {
        target: target.clone(),
        source: source.relation(),
        on: on.0,
        when_matched: None,
        when_not_matched: None,
        when_not_matched_by_source: None,
        output: Vec::new(),
    }
}

pub struct MergeBuilder {
    target: Source,
    source: Node,
    on: Node,
    when_matched: Option<Node>,
    when_not_matched: Option<Node>,
    when_not_matched_by_source: Option<Node>,
    output: Vec<Node>,
}

impl MergeBuilder {
    fn update_action(&self, assignments: Vec<(&str, Expr)>) -> Node {
        node(MergeUpdate {
            assignments: assignments
                .into_iter()
                .map(|(column, value)| assignment(&self.target.alias, column, value))
                .collect(),
        })
    }

    pub fn when_matched_update(mut self, condition: Option<Expr>, assignments: Vec<(&str, Expr)>) -> Self {
        let action = self.update_action(assignments);
        self.when_matched = Some(node(WhenMatched {
            condition: condition.map(|e| e.0),
            action,
        }));
        self
    }

    pub fn when_matched_delete(mut self, condition: Option<Expr>) -> Self {
        self.when_matched = Some(node(WhenMatched {
            condition: condition.map(|e| e.0),
            action: node(MergeDelete {}),
        }));
        self
    }

    pub fn when_not_matched_insert(
        mut self,
        condition: Option<Expr>,
        columns: &[&str],
        values: impl IntoIterator<Item = Expr>,
    ) -> Self {
        self.when_not_matched = Some(node(WhenNotMatched {
            condition: condition.map(|e| e.0),
            action: node(MergeInsert {
                columns: columns.iter().map(|c| node(Name::new(*c))).collect(),
                values: values.into_iter().map(|e| e.0).collect(),
            }),
        }));
        self
    }

    pub fn when_not_matched_by_source_update(
        mut self,
        condition: Option<Expr>,
        assignments: Vec<(&str, Expr)>,
    ) -> Self {
        let action = self.update_action(assignments);
        self.when_not_matched_by_source = Some(node(WhenNotMatchedBySource {
            condition: condition.map(|e| e.0),
            action,
        }));
        self
    }

    pub fn when_not_matched_by_source_delete(mut self, condition: Option<Expr>) -> Self {
        self.when_not_matched_by_source = Some(node(WhenNotMatchedBySource {
            condition: condition.map(|e| e.0),
            action: node(MergeDelete {}),
        }));
        self
    }

    pub fn output(mut self, items: impl IntoIterator<Item = Expr>) -> Self {
        self.output.extend(items.into_iter().map(|e| e.0));
        self
    }

    pub fn build(self) -> Result<Node> {
        target_alias(&self.target)?;
        Ok(node(Merge {
            target: self.target.relation,
            source: self.source,
            on: self.on,
            when_matched: self.when_matched,
            when_not_matched: self.when_not_matched,
            when_not_matched_by_source: self.when_not_matched_by_source,
            output: output_node(self.output),
        }))
    }
}

// ---------------------------------------------------------------------------
// DDL
// ---------------------------------------------------------------------------

/// Start a table definition
pub fn table(schema: Option<&str>, name: &str) -> TableBuilder {
    let table_name = TableName::new(schema, name);
    TableBuilder {
        source: node(table_name.clone()),
        name: table_name,
        columns: Vec::new(),
        indexes: Vec::new(),
        foreign_keys: Vec::new(),
    }
}

pub struct TableBuilder {
    name: TableName,
    source: Node,
    columns: Vec<Node>,
    indexes: Vec<Node>,
    foreign_keys: Vec<Node>,
}

impl TableBuilder {
    fn push(mut self, column: Column) -> Self {
        self.columns.push(node(column));
        self
    }

    pub fn column(self, name: &str, data_type: Node, nullable: bool) -> Self {
        let column = Column::new(Some(self.source.clone()), name, data_type, nullable);
        self.push(column)
    }

    /// A non-nullable identity (auto-numbered) column
    pub fn identity(self, name: &str, data_type: Node) -> Self {
        let mut column = Column::new(Some(self.source.clone()), name, data_type, false);
        column.identity = true;
        self.push(column)
    }

    pub fn column_with_default(self, name: &str, data_type: Node, nullable: bool, default: Expr) -> Self {
        let mut column = Column::new(Some(self.source.clone()), name, data_type, nullable);
        column.default = Some(default.0);
        self.push(column)
    }

    pub fn primary_key(mut self, columns: &[&str], clustered: bool) -> Self {
        let mut index = Index::new(IndexRole::PrimaryKey, columns);
        index.clustered = clustered;
        self.indexes.push(node(index));
        self
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.indexes.push(node(Index::new(IndexRole::Unique, columns)));
        self
    }

    pub fn index(mut self, columns: &[&str]) -> Self {
        self.indexes.push(node(Index::new(IndexRole::NonUnique, columns)));
        self
    }

    /// Secondary index that also clusters the table
    pub fn clustered_index(mut self, columns: &[&str]) -> Self {
        self.indexes
            .push(node(Index::new(IndexRole::NonUnique, columns).clustered()));
        self
    }

    pub fn foreign_key(mut self, columns: &[&str], references: TableName, referenced: &[&str]) -> Self {
        self.foreign_keys
            .push(node(ForeignKey::new(columns, references, referenced)));
        self
    }

    /// Validate and build the `Table` node
    pub fn build(self) -> Result<Node> {
        let table = Table::new(self.name, self.columns, self.indexes, self.foreign_keys)?;
        checked(table)
    }
}

/// A temporary table with the given column definitions
pub fn temp_table(name: &str, columns: Vec<Node>) -> Result<Node> {
    Ok(node(TempTable::new(name, columns)?))
}

pub fn create_table(table: impl IntoNode, if_not_exists: bool) -> Node {
    node(CreateTable {
        table: table.into_node(),
        if_not_exists,
    })
}

pub fn drop_table(table: impl IntoNode, if_exists: bool) -> Node {
    node(DropTable {
        table: table.into_node(),
        if_exists,
    })
}

/// `IF condition BEGIN then END [ELSE BEGIN otherwise END]`
pub fn if_(condition: Expr, then: Vec<Node>, otherwise: Vec<Node>) -> Node {
    node(IfStatement {
        condition: condition.0,
        then,
        otherwise,
    })
}

pub fn batch(statements: Vec<Node>) -> Node {
    node(Batch { statements })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traversal::ExpressionWalk;
    use std::sync::Arc;

    fn users() -> Node {
        table(Some("dbo"), "Users")
            .identity("Id", SqlType::of(TypeKind::Int))
            .column("Name", node(SqlType::new(TypeKind::NVarChar, Some(100)).unwrap()), false)
            .primary_key(&["Id"], true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_select_renders_with_generated_aliases() {
        let users = table_ref(TableName::new(Some("dbo"), "Users"));
        let sql = select([users.col("Id")])
            .from(&users)
            .where_(users.col("Name").like(lit("A%")))
            .to_sql(DialectType::TSQL)
            .unwrap();
        assert_eq!(
            sql,
            "SELECT [t0].[Id] FROM [dbo].[Users] AS [t0] WHERE [t0].[Name] LIKE N'A%'"
        );
    }

    #[test]
    fn test_source_col_keeps_declared_type() {
        let source = table_ref(users());
        let column = source.col("Name");
        let Expression::Column(c) = column.0.as_ref() else {
            panic!("expected a column");
        };
        assert!(Arc::ptr_eq(c.source.as_ref().unwrap(), &source.alias()));
        let declared = Expression::from(SqlType::new(TypeKind::NVarChar, Some(100)).unwrap());
        assert_eq!(c.data_type.as_ref(), &declared);
    }

    #[test]
    fn test_where_calls_are_conjoined() {
        let users = table_ref(TableName::new(None, "Users"));
        let query = select(Vec::new())
            .from(&users)
            .where_(users.col("A").eq(lit(1)))
            .where_(users.col("B").eq(lit(2)))
            .build();
        let sel = query.as_select().unwrap();
        assert!(matches!(sel.where_clause.as_deref(), Some(Expression::And(a)) if a.operands.len() == 2));
    }

    #[test]
    fn test_join_without_from_becomes_from() {
        let a = table_ref(TableName::new(None, "A"));
        let query = select(Vec::new()).inner_join(&a, lit(true)).build();
        assert_eq!(query.count(|e| matches!(e, Expression::Join(_))), 0);
    }

    #[test]
    fn test_table_builder_rejects_second_clustered_index() {
        let err = table(None, "T")
            .column("A", SqlType::of(TypeKind::Int), false)
            .column("B", SqlType::of(TypeKind::Int), false)
            .primary_key(&["A"], true)
            .clustered_index(&["B"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("clustered"), "{}", err);
    }

    #[test]
    fn test_insert_requires_a_source() {
        assert!(insert_into(TableName::new(None, "T")).build().is_err());
        let insert = insert_into(TableName::new(None, "T"))
            .columns(&["A", "B"])
            .values([lit(1), lit(2)])
            .build()
            .unwrap();
        assert!(matches!(insert.as_ref(), Expression::Insert(_)));
        assert!(insert_into(TableName::new(None, "T"))
            .columns(&["A", "B"])
            .values([lit(1)])
            .build()
            .is_err());
    }

    #[test]
    fn test_update_needs_table_ref_target() {
        let derived_source = derived(select([lit(1)]));
        assert!(update(&derived_source).set("A", lit(1)).build().is_err());
    }
}
